//! Нормализация данных

#![allow(non_snake_case)]

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};

/// Вид масштабирования
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    /// (x - mean) / std
    Standard,
    /// (x - min) / (max - min)
    MinMax,
}

/// Статистики нормализации для экспорта в пакет модели
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerStats {
    pub kind: NormKind,
    pub offset: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Масштабирование признаков по статистикам обучающей выборки
pub struct Normalizer {
    kind: NormKind,
    offset: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
    is_fitted: bool,
}

impl Normalizer {
    pub fn new(kind: NormKind) -> Self {
        Self {
            kind,
            offset: None,
            scale: None,
            is_fitted: false,
        }
    }

    pub fn standard() -> Self {
        Self::new(NormKind::Standard)
    }

    pub fn min_max() -> Self {
        Self::new(NormKind::MinMax)
    }

    pub fn kind(&self) -> NormKind {
        self.kind
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn fit(&mut self, X: &Array2<f64>) -> Result<()> {
        if X.nrows() == 0 {
            return Err(SeqlabError::EmptyDataset);
        }

        match self.kind {
            NormKind::Standard => {
                // Среднее и стандартное отклонение по каждому признаку
                let mean = X
                    .mean_axis(Axis(0))
                    .ok_or(SeqlabError::EmptyDataset)?;
                let std = X.std_axis(Axis(0), 0.0);
                self.offset = Some(mean);
                self.scale = Some(std);
            }
            NormKind::MinMax => {
                let min = X.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
                let max = X.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
                let range = &max - &min;
                self.offset = Some(min);
                self.scale = Some(range);
            }
        }

        // Избегаем деления на ноль для вырожденных колонок
        if let Some(ref mut scale) = self.scale {
            for val in scale.iter_mut() {
                if *val < 1e-10 {
                    *val = 1.0;
                }
            }
        }

        self.is_fitted = true;
        Ok(())
    }

    pub fn transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        let (offset, scale) = self.params()?;

        let mut normalized = X.clone();
        for mut row in normalized.rows_mut() {
            for (i, val) in row.iter_mut().enumerate() {
                *val = (*val - offset[i]) / scale[i];
            }
        }

        Ok(normalized)
    }

    pub fn fit_transform(&mut self, X: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(X)?;
        self.transform(X)
    }

    /// Обратное преобразование в исходные единицы
    pub fn inverse_transform(&self, X: &Array2<f64>) -> Result<Array2<f64>> {
        let (offset, scale) = self.params()?;

        let mut restored = X.clone();
        for mut row in restored.rows_mut() {
            for (i, val) in row.iter_mut().enumerate() {
                *val = *val * scale[i] + offset[i];
            }
        }

        Ok(restored)
    }

    pub fn transform_value(&self, column: usize, value: f64) -> Result<f64> {
        let (offset, scale) = self.params()?;
        if column >= offset.len() {
            return Err(SeqlabError::invalid(
                "column",
                format!("index {} out of {} fitted columns", column, offset.len()),
            ));
        }
        Ok((value - offset[column]) / scale[column])
    }

    pub fn inverse_value(&self, column: usize, value: f64) -> Result<f64> {
        let (offset, scale) = self.params()?;
        if column >= offset.len() {
            return Err(SeqlabError::invalid(
                "column",
                format!("index {} out of {} fitted columns", column, offset.len()),
            ));
        }
        Ok(value * scale[column] + offset[column])
    }

    pub fn stats(&self) -> Result<NormalizerStats> {
        let (offset, scale) = self.params()?;
        Ok(NormalizerStats {
            kind: self.kind,
            offset: offset.to_vec(),
            scale: scale.to_vec(),
        })
    }

    fn params(&self) -> Result<(&Array1<f64>, &Array1<f64>)> {
        if !self.is_fitted {
            return Err(SeqlabError::NotFitted("Normalizer"));
        }
        let offset = self
            .offset
            .as_ref()
            .ok_or(SeqlabError::NotFitted("Normalizer"))?;
        let scale = self
            .scale
            .as_ref()
            .ok_or(SeqlabError::NotFitted("Normalizer"))?;
        Ok((offset, scale))
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::standard()
    }
}
