//! Хронологическое разбиение окон на train/validation/test по каждой сущности

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Result, SeqlabError};
use crate::windowing::{slide, Series, Window};

/// Доли разбиения таймлайна; остаток уходит в test
#[derive(Debug, Clone, Copy)]
pub struct SplitSpec {
    pub train_ratio: f64,
    pub validation_ratio: f64,
}

impl SplitSpec {
    pub fn new(train_ratio: f64, validation_ratio: f64) -> Result<Self> {
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            return Err(SeqlabError::invalid(
                "train_ratio",
                format!("must be in (0, 1), got {}", train_ratio),
            ));
        }
        if !(0.0..1.0).contains(&validation_ratio) {
            return Err(SeqlabError::invalid(
                "validation_ratio",
                format!("must be in [0, 1), got {}", validation_ratio),
            ));
        }
        if train_ratio + validation_ratio >= 1.0 {
            return Err(SeqlabError::invalid(
                "validation_ratio",
                "train and validation ratios must leave room for test",
            ));
        }
        Ok(Self {
            train_ratio,
            validation_ratio,
        })
    }

    pub fn two_way(train_ratio: f64) -> Result<Self> {
        Self::new(train_ratio, 0.0)
    }
}

/// Окна, разложенные по разделам
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub train: Vec<Window>,
    pub validation: Vec<Window>,
    pub test: Vec<Window>,
}

impl Partition {
    /// Режет таймлайн каждой сущности по долям и раскладывает окна.
    ///
    /// Окно попадает в раздел только если весь его диапазон (история и
    /// горизонт) лежит внутри диапазона раздела; окна через границу
    /// отбрасываются. Так максимальная метка времени train строго меньше
    /// минимальной метки test для каждой сущности.
    pub fn chronological(
        series_list: &[Series],
        window: usize,
        horizon: usize,
        spec: SplitSpec,
    ) -> Result<Partition> {
        let mut partition = Partition::default();
        let mut dropped = 0usize;

        for series in series_list {
            let windows = slide(series, window, horizon)?;
            if windows.is_empty() {
                continue;
            }
            let (train_end, validation_end) = cut_points(series.len(), spec);

            for w in windows {
                let end = w.end();
                if end <= train_end {
                    partition.train.push(w);
                } else if w.start >= train_end && end <= validation_end {
                    partition.validation.push(w);
                } else if w.start >= validation_end {
                    partition.test.push(w);
                } else {
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            tracing::debug!("Dropped {} windows crossing partition boundaries", dropped);
        }
        Ok(partition)
    }

    /// Перемешивает только тренировочные окна (после хронологического среза)
    pub fn shuffle_train(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.train.shuffle(&mut rng);
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

fn cut_points(n: usize, spec: SplitSpec) -> (usize, usize) {
    let train_end = (n as f64 * spec.train_ratio).floor() as usize;
    let validation_end =
        ((n as f64 * (spec.train_ratio + spec.validation_ratio)).floor() as usize).min(n);
    (train_end, validation_end)
}
