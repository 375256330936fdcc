//! Оконная нарезка временных рядов: (история длины W -> горизонт длины H)

use std::collections::BTreeMap;

use crate::error::{Result, SeqlabError};

/// Одно наблюдение ряда
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: i64,
    pub values: Vec<f64>,
}

impl Observation {
    pub fn new(timestamp: i64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
}

/// Хронологический ряд одной сущности
#[derive(Debug, Clone)]
pub struct Series {
    pub entity: String,
    pub points: Vec<Observation>,
}

impl Series {
    /// Точки сортируются по времени при создании
    pub fn new(entity: impl Into<String>, mut points: Vec<Observation>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self {
            entity: entity.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Сколько окон даст ряд при данных W и H
    pub fn window_count(&self, window: usize, horizon: usize) -> usize {
        let need = window + horizon;
        if self.len() < need {
            0
        } else {
            self.len() - need + 1
        }
    }
}

/// Окно: история длины W и горизонт длины H сразу за ней, без зазора
#[derive(Debug, Clone)]
pub struct Window {
    pub entity: String,
    /// Индекс первой точки истории в исходном ряду
    pub start: usize,
    pub history: Vec<Observation>,
    pub horizon: Vec<Observation>,
}

impl Window {
    /// Индекс за последней точкой горизонта
    pub fn end(&self) -> usize {
        self.start + self.history.len() + self.horizon.len()
    }

    pub fn first_timestamp(&self) -> i64 {
        self.history.first().map(|p| p.timestamp).unwrap_or(0)
    }

    pub fn last_timestamp(&self) -> i64 {
        self.horizon.last().map(|p| p.timestamp).unwrap_or(0)
    }

    /// Последняя точка истории (конец окна)
    pub fn history_end(&self) -> &Observation {
        &self.history[self.history.len() - 1]
    }
}

/// Нарезает ряд на окна.
///
/// Ряды короче W+H пропускаются целиком (возвращается пустой список),
/// без дополнения.
pub fn slide(series: &Series, window: usize, horizon: usize) -> Result<Vec<Window>> {
    if window == 0 {
        return Err(SeqlabError::invalid("window", "must be at least 1"));
    }
    if horizon == 0 {
        return Err(SeqlabError::invalid("horizon", "must be at least 1"));
    }

    let n = series.len();
    let need = window + horizon;
    if n < need {
        return Ok(Vec::new());
    }

    let mut windows = Vec::with_capacity(n - need + 1);
    for start in 0..=(n - need) {
        windows.push(Window {
            entity: series.entity.clone(),
            start,
            history: series.points[start..start + window].to_vec(),
            horizon: series.points[start + window..start + need].to_vec(),
        });
    }
    Ok(windows)
}

/// Группирует записи в ряды по сущности, сортируя точки по времени
pub fn group_series<T, E, O>(items: &[T], entity: E, observation: O) -> Vec<Series>
where
    E: Fn(&T) -> &str,
    O: Fn(&T) -> Observation,
{
    let mut grouped: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    for item in items {
        grouped
            .entry(entity(item).to_string())
            .or_default()
            .push(observation(item));
    }
    grouped
        .into_iter()
        .map(|(entity, points)| Series::new(entity, points))
        .collect()
}
