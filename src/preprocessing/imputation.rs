//! Заполнение пропусков: медиана для числовых колонок, мода для категориальных

use std::collections::HashMap;

use crate::error::{Result, SeqlabError};

/// Импьютер, обучаемый на тренировочной части данных
pub struct Imputer {
    medians: Option<Vec<f64>>,
    modes: Option<Vec<String>>,
    is_fitted: bool,
}

impl Imputer {
    pub fn new() -> Self {
        Self {
            medians: None,
            modes: None,
            is_fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Вычисляет статистики по колонкам; колонка без единого значения дает ошибку
    pub fn fit(
        &mut self,
        numeric: &[Vec<Option<f64>>],
        categorical: &[Vec<Option<String>>],
    ) -> Result<()> {
        let mut medians = Vec::with_capacity(numeric.len());
        for (i, column) in numeric.iter().enumerate() {
            let values: Vec<f64> = column.iter().filter_map(|v| *v).collect();
            match median(&values) {
                Some(m) => medians.push(m),
                None => {
                    return Err(SeqlabError::invalid(
                        "numeric_columns",
                        format!("column {} has no values to impute from", i),
                    ))
                }
            }
        }

        let mut modes = Vec::with_capacity(categorical.len());
        for (i, column) in categorical.iter().enumerate() {
            match mode(column.iter().filter_map(|v| v.as_deref())) {
                Some(m) => modes.push(m),
                None => {
                    return Err(SeqlabError::invalid(
                        "categorical_columns",
                        format!("column {} has no values to impute from", i),
                    ))
                }
            }
        }

        self.medians = Some(medians);
        self.modes = Some(modes);
        self.is_fitted = true;
        Ok(())
    }

    pub fn transform_numeric(&self, numeric: &[Vec<Option<f64>>]) -> Result<Vec<Vec<f64>>> {
        let medians = self.medians()?;
        if numeric.len() != medians.len() {
            return Err(SeqlabError::invalid(
                "numeric_columns",
                format!("expected {} columns, got {}", medians.len(), numeric.len()),
            ));
        }
        Ok(numeric
            .iter()
            .zip(medians.iter())
            .map(|(column, m)| column.iter().map(|v| v.unwrap_or(*m)).collect())
            .collect())
    }

    pub fn transform_categorical(
        &self,
        categorical: &[Vec<Option<String>>],
    ) -> Result<Vec<Vec<String>>> {
        let modes = self.modes()?;
        if categorical.len() != modes.len() {
            return Err(SeqlabError::invalid(
                "categorical_columns",
                format!("expected {} columns, got {}", modes.len(), categorical.len()),
            ));
        }
        Ok(categorical
            .iter()
            .zip(modes.iter())
            .map(|(column, m)| {
                column
                    .iter()
                    .map(|v| v.clone().unwrap_or_else(|| m.clone()))
                    .collect()
            })
            .collect())
    }

    pub fn medians(&self) -> Result<&[f64]> {
        self.medians
            .as_deref()
            .ok_or(SeqlabError::NotFitted("Imputer"))
    }

    pub fn modes(&self) -> Result<&[String]> {
        self.modes
            .as_deref()
            .ok_or(SeqlabError::NotFitted("Imputer"))
    }
}

impl Default for Imputer {
    fn default() -> Self {
        Self::new()
    }
}

/// Медиана; для четного числа значений берется среднее двух центральных
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Самое частое значение; при равенстве побеждает встреченное раньше
pub fn mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for v in values {
        let entry = counts.entry(v).or_insert(0);
        if *entry == 0 {
            order.push(v);
        }
        *entry += 1;
    }

    let mut best: Option<&str> = None;
    let mut best_count = 0;
    for v in order {
        if counts[v] > best_count {
            best_count = counts[v];
            best = Some(v);
        }
    }
    best.map(|v| v.to_string())
}
