//! Feature engineering: one-hot кодирование, производные признаки, индикаторы

#![allow(non_snake_case)]

use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};
use crate::types::Quote;

/// One-hot кодирование по словарю обучающей выборки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    categories: Vec<Vec<String>>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self {
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Словарь: отсортированные уникальные значения каждой колонки
    pub fn fit(&mut self, columns: &[Vec<String>]) -> Result<()> {
        let mut categories = Vec::with_capacity(columns.len());
        for column in columns {
            if column.is_empty() {
                return Err(SeqlabError::EmptyDataset);
            }
            let unique: BTreeSet<&str> = column.iter().map(|s| s.as_str()).collect();
            categories.push(unique.into_iter().map(str::to_string).collect());
        }
        self.categories = categories;
        self.is_fitted = true;
        Ok(())
    }

    /// Неизвестные словарю категории кодируются нулевой строкой
    pub fn transform(&self, columns: &[Vec<String>]) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(SeqlabError::NotFitted("OneHotEncoder"));
        }
        if columns.len() != self.categories.len() {
            return Err(SeqlabError::invalid(
                "categorical_columns",
                format!(
                    "expected {} columns, got {}",
                    self.categories.len(),
                    columns.len()
                ),
            ));
        }

        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut X = Array2::zeros((rows, self.width()));
        let mut offset = 0;
        for (j, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(SeqlabError::invalid(
                    "categorical_columns",
                    "columns have different lengths",
                ));
            }
            for (i, value) in column.iter().enumerate() {
                if let Some(pos) = self.categories[j].iter().position(|c| c == value) {
                    X[[i, offset + pos]] = 1.0;
                }
            }
            offset += self.categories[j].len();
        }
        Ok(X)
    }

    pub fn width(&self) -> usize {
        self.categories.iter().map(|c| c.len()).sum()
    }

    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    /// Имена признаков вида "Sex=male"
    pub fn feature_names(&self, column_names: &[String]) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for (column, categories) in column_names.iter().zip(self.categories.iter()) {
            for category in categories {
                names.push(format!("{}={}", column, category));
            }
        }
        names
    }
}

impl Default for OneHotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FeatureEngineer;

impl FeatureEngineer {
    /// FamilySize = SibSp + Parch + 1 и бинарный признак одиночества
    pub fn family_features(sibsp: &[f64], parch: &[f64]) -> Array2<f64> {
        let n = sibsp.len().min(parch.len());
        let mut X = Array2::zeros((n, 2));
        for i in 0..n {
            let family_size = sibsp[i] + parch[i] + 1.0;
            X[[i, 0]] = family_size;
            X[[i, 1]] = if family_size <= 1.0 { 1.0 } else { 0.0 };
        }
        X
    }

    pub fn family_feature_names() -> Vec<String> {
        vec!["FamilySize".to_string(), "IsAlone".to_string()]
    }

    /// Ряд признаков котировок одного символа: OHLCV, SMA цены, RSI, SMA объема.
    /// Котировки должны быть отсортированы по времени; строки прогрева
    /// индикаторов отбрасываются.
    pub fn quote_features(
        quotes: &[Quote],
        sma_period: usize,
        rsi_period: usize,
        volume_sma_period: usize,
    ) -> Vec<(i64, Vec<f64>)> {
        let closes: Vec<f64> = quotes.iter().map(|q| q.close).collect();
        let volumes: Vec<f64> = quotes.iter().map(|q| q.volume).collect();
        let sma_close = sma(&closes, sma_period);
        let rsi_close = rsi(&closes, rsi_period);
        let sma_volume = sma(&volumes, volume_sma_period);

        let mut rows = Vec::new();
        for (i, q) in quotes.iter().enumerate() {
            if let (Some(s), Some(r), Some(v)) = (sma_close[i], rsi_close[i], sma_volume[i]) {
                rows.push((
                    q.timestamp,
                    vec![q.open, q.high, q.low, q.close, q.volume, s, r, v],
                ));
            }
        }
        rows
    }

    pub fn quote_feature_names() -> Vec<String> {
        [
            "Open",
            "High",
            "Low",
            "Close",
            "Volume",
            "SMA_Close",
            "RSI",
            "SMA_Volume",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Индекс цены закрытия в векторе признаков котировки
    pub const CLOSE_INDEX: usize = 3;
}

/// Простая скользящая средняя; None до накопления полного периода
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// RSI по простым средним прироста и падения за период
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }
    for i in period..values.len() {
        let mut gains = 0.0;
        let mut losses = 0.0;
        for j in (i - period + 1)..=i {
            let change = values[j] - values[j - 1];
            if change > 0.0 {
                gains += change;
            } else {
                losses -= change;
            }
        }
        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;
        out[i] = Some(if avg_loss < 1e-10 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sma_known_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);
        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_abs_diff_eq!(result[2].unwrap(), 2.0);
        assert_abs_diff_eq!(result[3].unwrap(), 3.0);
        assert_abs_diff_eq!(result[4].unwrap(), 4.0);
    }

    #[test]
    fn test_rsi_bounds_and_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();

        let up = rsi(&rising, 14);
        let down = rsi(&falling, 14);
        for v in up.iter().chain(down.iter()).flatten() {
            assert!(*v >= 0.0 && *v <= 100.0);
        }
        assert_abs_diff_eq!(up[20].unwrap(), 100.0);
        assert_abs_diff_eq!(down[20].unwrap(), 0.0);
    }

    #[test]
    fn test_one_hot_vocabulary_and_unknown() {
        let columns = vec![vec![
            "S".to_string(),
            "C".to_string(),
            "S".to_string(),
            "Q".to_string(),
        ]];
        let mut encoder = OneHotEncoder::new();
        encoder.fit(&columns).unwrap();

        // Словарь отсортирован: C, Q, S
        assert_eq!(encoder.width(), 3);
        assert_eq!(encoder.categories()[0], vec!["C", "Q", "S"]);

        let encoded = encoder.transform(&columns).unwrap();
        assert_abs_diff_eq!(encoded[[0, 2]], 1.0);
        assert_abs_diff_eq!(encoded[[1, 0]], 1.0);

        // Неизвестная категория дает нулевую строку
        let unseen = encoder.transform(&[vec!["X".to_string()]]).unwrap();
        assert_abs_diff_eq!(unseen.row(0).sum(), 0.0);

        let names = encoder.feature_names(&["Embarked".to_string()]);
        assert_eq!(names, vec!["Embarked=C", "Embarked=Q", "Embarked=S"]);
    }

    #[test]
    fn test_family_features() {
        let X = FeatureEngineer::family_features(&[1.0, 0.0], &[2.0, 0.0]);
        assert_abs_diff_eq!(X[[0, 0]], 4.0);
        assert_abs_diff_eq!(X[[0, 1]], 0.0);
        assert_abs_diff_eq!(X[[1, 0]], 1.0);
        assert_abs_diff_eq!(X[[1, 1]], 1.0);
    }

    #[test]
    fn test_quote_features_drop_warmup() {
        let quotes: Vec<Quote> = (0..30)
            .map(|i| Quote {
                symbol: "TEST".to_string(),
                timestamp: i as i64 * 86_400,
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1_000.0 + i as f64,
            })
            .collect();

        let rows = FeatureEngineer::quote_features(&quotes, 10, 14, 5);
        // Первые 14 строк уходят на прогрев RSI
        assert_eq!(rows.len(), 30 - 14);
        assert_eq!(rows[0].1.len(), 8);
        assert_eq!(rows[0].0, 14 * 86_400);
    }
}
