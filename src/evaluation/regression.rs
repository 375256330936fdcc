//! Метрики регрессии: RMSE и MAE по окнам и по сущностям

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};

/// Ошибки прогноза на наборе пар (факт, прогноз)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub samples: usize,
}

impl RegressionMetrics {
    pub fn from_pairs(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(SeqlabError::invalid(
                "predicted",
                format!("{} actuals vs {} predictions", actual.len(), predicted.len()),
            ));
        }
        if actual.is_empty() {
            return Err(SeqlabError::EmptyDataset);
        }

        let n = actual.len() as f64;
        let mut squared = 0.0;
        let mut absolute = 0.0;
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            let err = a - p;
            squared += err * err;
            absolute += err.abs();
        }
        Ok(Self {
            rmse: (squared / n).sqrt(),
            mae: absolute / n,
            samples: actual.len(),
        })
    }
}

/// Среднее по набору пооконных метрик; samples суммируются
pub fn average(metrics: &[RegressionMetrics]) -> Result<RegressionMetrics> {
    if metrics.is_empty() {
        return Err(SeqlabError::EmptyDataset);
    }
    let n = metrics.len() as f64;
    Ok(RegressionMetrics {
        rmse: metrics.iter().map(|m| m.rmse).sum::<f64>() / n,
        mae: metrics.iter().map(|m| m.mae).sum::<f64>() / n,
        samples: metrics.iter().map(|m| m.samples).sum(),
    })
}

/// Сводка регрессии одной сущности
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRegressionReport {
    pub entity: String,
    pub windows: usize,
    pub rmse: f64,
    pub mae: f64,
}

/// Средние по окнам метрики каждой сущности, отсортированные по убыванию
/// RMSE. Метрики считаются на каждом окне отдельно и усредняются.
pub fn by_entity(groups: &[(String, Vec<RegressionMetrics>)]) -> Result<Vec<EntityRegressionReport>> {
    let mut reports = Vec::with_capacity(groups.len());
    for (entity, windows) in groups {
        let mean = average(windows)?;
        reports.push(EntityRegressionReport {
            entity: entity.clone(),
            windows: windows.len(),
            rmse: mean.rmse,
            mae: mean.mae,
        });
    }
    reports.sort_by(|a, b| b.rmse.partial_cmp(&a.rmse).unwrap_or(std::cmp::Ordering::Equal));
    Ok(reports)
}
