//! Модель направления цены: мультиномиальная регрессия по шагам горизонта

#![allow(non_snake_case)]

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::{MultiFittedLogisticRegression, MultiLogisticRegression};
use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{Result, SeqlabError};
use crate::evaluation::{ClassificationSummary, EntityClassReport};
use crate::ingest::{quotes_from_table, Table};
use crate::partition::{Partition, SplitSpec};
use crate::preprocessing::{FeatureEngineer, Normalizer};
use crate::types::{
    DirectionOptions, DirectionPrediction, DirectionReport, DirectionStep, LinearCoefficients,
    ModelBundle, Quote, DIRECTION_LABELS,
};
use crate::windowing::{Observation, Series, Window};

const SMA_PERIOD: usize = 10;
const RSI_PERIOD: usize = 14;
const VOLUME_SMA_PERIOD: usize = 5;

/// Сессия обучения классификатора движения цены.
///
/// На каждый шаг горизонта обучается отдельная мультиномиальная
/// логистическая регрессия поверх развернутого в строку окна признаков.
pub struct DirectionModel {
    options: DirectionOptions,
    normalizer: Normalizer,
    models: Vec<MultiFittedLogisticRegression<f64, usize>>,
    // Классы, встреченные в обучении каждого шага, в отсортированном
    // виде: столбцы коэффициентов и вероятностей идут в этом порядке
    step_classes: Vec<Vec<usize>>,
    is_trained: bool,
}

impl DirectionModel {
    pub fn new(options: DirectionOptions) -> Result<Self> {
        SplitSpec::new(options.train_ratio, options.validation_ratio)?;
        if options.window == 0 {
            return Err(SeqlabError::invalid("window", "must be at least 1"));
        }
        if options.horizon == 0 {
            return Err(SeqlabError::invalid("horizon", "must be at least 1"));
        }
        if options.move_threshold <= 0.0 {
            return Err(SeqlabError::invalid(
                "move_threshold",
                format!("{} is not positive", options.move_threshold),
            ));
        }

        Ok(Self {
            options,
            normalizer: Normalizer::standard(),
            models: Vec::new(),
            step_classes: Vec::new(),
            is_trained: false,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    pub fn train(&mut self, table: &Table) -> Result<DirectionReport> {
        let quotes = quotes_from_table(table)?;
        let series_list = quote_series(&quotes);

        let mut symbols = Vec::new();
        let mut skipped_symbols = Vec::new();
        for series in &series_list {
            if series.window_count(self.options.window, self.options.horizon) > 0 {
                symbols.push(series.entity.clone());
            } else {
                skipped_symbols.push(series.entity.clone());
            }
        }
        if !skipped_symbols.is_empty() {
            tracing::warn!("Skipped symbols with too little history: {:?}", skipped_symbols);
        }
        if symbols.is_empty() {
            let longest = series_list.iter().map(|s| s.len()).max().unwrap_or(0);
            return Err(SeqlabError::InsufficientData {
                required: self.options.window + self.options.horizon,
                actual: longest,
            });
        }

        let spec = SplitSpec::new(self.options.train_ratio, self.options.validation_ratio)?;
        let mut partition = Partition::chronological(
            &series_list,
            self.options.window,
            self.options.horizon,
            spec,
        )?;
        if let Some(seed) = self.options.shuffle_seed {
            partition.shuffle_train(seed);
        }
        if partition.train.is_empty() || partition.test.is_empty() {
            return Err(SeqlabError::invalid(
                "train_ratio",
                "split produced an empty train or test partition",
            ));
        }

        // Статистики нормализации по точкам тренировочных окон
        self.normalizer.fit(&history_timesteps(&partition.train))?;

        let X_train = self.design_matrix(&partition.train)?;
        let train_targets: Vec<Vec<usize>> = partition
            .train
            .iter()
            .map(|w| self.window_targets(w))
            .collect();

        // Одна модель на каждый шаг горизонта. Не каждый класс обязан
        // встретиться в целях шага, поэтому список фактических классов
        // сохраняется: fit сортирует различные метки и нумерует столбцы
        // вероятностей и коэффициентов по этому списку
        let mut models = Vec::with_capacity(self.options.horizon);
        let mut step_classes = Vec::with_capacity(self.options.horizon);
        for step in 0..self.options.horizon {
            let targets: Vec<usize> = train_targets.iter().map(|t| t[step]).collect();
            let mut classes = targets.clone();
            classes.sort_unstable();
            classes.dedup();

            let dataset = Dataset::new(X_train.clone(), Array1::from(targets));
            let model = MultiLogisticRegression::default()
                .max_iterations(self.options.max_iterations)
                .fit(&dataset)
                .map_err(|e| SeqlabError::Fit(e.to_string()))?;
            models.push(model);
            step_classes.push(classes);
        }

        // Оценка на тестовых окнах: пары (факт, прогноз) по всем шагам
        let X_test = self.design_matrix(&partition.test)?;
        let test_targets: Vec<Vec<usize>> = partition
            .test
            .iter()
            .map(|w| self.window_targets(w))
            .collect();

        let class_labels: Vec<String> = DIRECTION_LABELS.iter().map(|s| s.to_string()).collect();
        let mut all_pairs: Vec<(usize, usize)> = Vec::new();
        let mut symbol_pairs: BTreeMap<&str, Vec<(usize, usize)>> = BTreeMap::new();
        for (step, model) in models.iter().enumerate() {
            // predict возвращает исходные метки классов; индекс максимума
            // по столбцам вероятностей при неполном наборе классов сдвинут
            let predicted = model.predict(&X_test);
            for (i, w) in partition.test.iter().enumerate() {
                let truth = test_targets[i][step];
                all_pairs.push((truth, predicted[i]));
                symbol_pairs
                    .entry(w.entity.as_str())
                    .or_default()
                    .push((truth, predicted[i]));
            }
        }
        let mut symbol_windows: BTreeMap<&str, usize> = BTreeMap::new();
        for w in &partition.test {
            *symbol_windows.entry(w.entity.as_str()).or_insert(0) += 1;
        }

        let overall = ClassificationSummary::from_pairs(&class_labels, &all_pairs)?;
        let mut per_symbol = Vec::with_capacity(symbol_pairs.len());
        for (symbol, pairs) in &symbol_pairs {
            per_symbol.push(EntityClassReport {
                entity: symbol.to_string(),
                windows: symbol_windows.get(symbol).copied().unwrap_or(0),
                summary: ClassificationSummary::from_pairs(&class_labels, pairs)?,
            });
        }

        self.models = models;
        self.step_classes = step_classes;
        self.is_trained = true;

        // Прогноз по последнему окну каждого обученного символа;
        // пропущенные символы прогноз не получают
        let mut predictions = Vec::new();
        for series in &series_list {
            if series.window_count(self.options.window, self.options.horizon) > 0 {
                predictions.push(self.forecast_series(series)?);
            }
        }

        tracing::info!(
            "Direction model trained. Accuracy: {:.3} over {} test windows",
            overall.accuracy,
            partition.test.len()
        );

        Ok(DirectionReport {
            ingest: table.summary.clone(),
            symbols,
            skipped_symbols,
            train_windows: partition.train.len(),
            validation_windows: partition.validation.len(),
            test_windows: partition.test.len(),
            overall,
            per_symbol,
            predictions,
        })
    }

    /// Прогноз направления по свежим котировкам одного символа
    pub fn predict(&self, quotes: &[Quote]) -> Result<DirectionPrediction> {
        if !self.is_trained {
            return Err(SeqlabError::NotFitted("DirectionModel"));
        }
        if quotes.is_empty() {
            return Err(SeqlabError::EmptyDataset);
        }
        let series_list = quote_series(quotes);
        if series_list.len() != 1 {
            return Err(SeqlabError::invalid("quotes", "expected a single symbol"));
        }
        let series = &series_list[0];
        if series.len() < self.options.window {
            // Прогрев индикаторов съедает первые строки
            return Err(SeqlabError::InsufficientData {
                required: RSI_PERIOD + self.options.window,
                actual: quotes.len(),
            });
        }
        self.forecast_series(series)
    }

    pub fn bundle(&self) -> Result<ModelBundle> {
        if !self.is_trained || self.models.is_empty() {
            return Err(SeqlabError::NotFitted("DirectionModel"));
        }

        let coefficients = self
            .models
            .iter()
            .map(|m| {
                let params = m.params();
                LinearCoefficients {
                    intercept: m.intercept().to_vec(),
                    weights: (0..params.ncols())
                        .map(|c| params.column(c).to_vec())
                        .collect(),
                }
            })
            .collect();

        Ok(ModelBundle {
            kind: "direction".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            feature_names: FeatureEngineer::quote_feature_names(),
            preprocessing: serde_json::to_value(self.normalizer.stats()?)?,
            coefficients,
            metadata: serde_json::json!({
                "window": self.options.window,
                "horizon": self.options.horizon,
                "move_threshold": self.options.move_threshold,
                "classes": DIRECTION_LABELS,
                // Коды классов, которым соответствуют строки intercept
                // и weights каждого шага
                "step_classes": self.step_classes,
            }),
        })
    }

    /// Классы движения относительно последнего закрытия истории
    fn window_targets(&self, window: &Window) -> Vec<usize> {
        let baseline = window.history_end().values[FeatureEngineer::CLOSE_INDEX];
        window
            .horizon
            .iter()
            .map(|obs| {
                direction_class(
                    baseline,
                    obs.values[FeatureEngineer::CLOSE_INDEX],
                    self.options.move_threshold,
                )
            })
            .collect()
    }

    /// Нормализованная история окна, развернутая в одну строку
    fn window_features(&self, history: &[Observation]) -> Result<Vec<f64>> {
        let d = history.first().map(|o| o.values.len()).unwrap_or(0);
        let mut X = Array2::zeros((history.len(), d));
        for (i, obs) in history.iter().enumerate() {
            for (j, v) in obs.values.iter().enumerate() {
                X[[i, j]] = *v;
            }
        }
        let scaled = self.normalizer.transform(&X)?;
        Ok(scaled.iter().copied().collect())
    }

    fn design_matrix(&self, windows: &[Window]) -> Result<Array2<f64>> {
        let d = windows
            .first()
            .and_then(|w| w.history.first())
            .map(|o| o.values.len())
            .unwrap_or(0);
        let mut X = Array2::zeros((windows.len(), self.options.window * d));
        for (i, w) in windows.iter().enumerate() {
            let row = self.window_features(&w.history)?;
            for (j, v) in row.iter().enumerate() {
                X[[i, j]] = *v;
            }
        }
        Ok(X)
    }

    fn forecast_series(&self, series: &Series) -> Result<DirectionPrediction> {
        let window = self.options.window;
        if series.len() < window {
            return Err(SeqlabError::InsufficientData {
                required: window,
                actual: series.len(),
            });
        }
        let history = &series.points[series.len() - window..];
        let row = self.window_features(history)?;
        let mut X = Array2::zeros((1, row.len()));
        for (j, v) in row.iter().enumerate() {
            X[[0, j]] = *v;
        }

        let mut steps = Vec::with_capacity(self.models.len());
        for model in &self.models {
            // Код класса берет predict; индексировать вероятности кодом
            // нельзя, столбцов может быть меньше трех
            let class = model.predict(&X)[0];
            let probabilities = model.predict_probabilities(&X);
            steps.push(DirectionStep {
                class,
                label: DIRECTION_LABELS[class].to_string(),
                confidence: max_probability(probabilities.row(0)),
            });
        }

        Ok(DirectionPrediction {
            symbol: series.entity.clone(),
            window_end: series.points[series.len() - 1].timestamp,
            steps,
        })
    }
}

/// Ряды признаков по символам: котировки сортируются по времени,
/// индикаторы считаются внутри символа, прогрев отбрасывается
fn quote_series(quotes: &[Quote]) -> Vec<Series> {
    let mut by_symbol: BTreeMap<&str, Vec<&Quote>> = BTreeMap::new();
    for q in quotes {
        by_symbol.entry(q.symbol.as_str()).or_default().push(q);
    }

    by_symbol
        .into_iter()
        .map(|(symbol, mut group)| {
            group.sort_by_key(|q| q.timestamp);
            let owned: Vec<Quote> = group.into_iter().cloned().collect();
            let points = FeatureEngineer::quote_features(
                &owned,
                SMA_PERIOD,
                RSI_PERIOD,
                VOLUME_SMA_PERIOD,
            )
            .into_iter()
            .map(|(timestamp, values)| Observation::new(timestamp, values))
            .collect();
            Series::new(symbol, points)
        })
        .collect()
}

/// Класс движения: 0 вниз, 1 нейтрально, 2 вверх.
/// Изменение ровно на пороге считается нейтральным.
fn direction_class(baseline: f64, future: f64, threshold: f64) -> usize {
    if baseline.abs() < 1e-10 {
        return 1;
    }
    let change = (future - baseline) / baseline;
    if change > threshold {
        2
    } else if change < -threshold {
        0
    } else {
        1
    }
}

/// Вероятность предсказанного класса: максимум строки softmax
fn max_probability(probabilities: ArrayView1<f64>) -> f64 {
    probabilities.iter().copied().fold(0.0, f64::max)
}

fn history_timesteps(windows: &[Window]) -> Array2<f64> {
    let d = windows
        .first()
        .and_then(|w| w.history.first())
        .map(|o| o.values.len())
        .unwrap_or(0);
    let rows: usize = windows.iter().map(|w| w.history.len()).sum();
    let mut X = Array2::zeros((rows, d));
    let mut r = 0;
    for w in windows {
        for obs in &w.history {
            for (j, v) in obs.values.iter().enumerate() {
                X[[r, j]] = *v;
            }
            r += 1;
        }
    }
    X
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{quote_columns, read_table_from_str};
    use chrono::NaiveDate;

    /// Цена ходит ступенями: 4 дня на 100, 4 дня на 104.
    /// Переходы между ступенями дают движения около 4%.
    fn plateau_close(i: usize) -> f64 {
        if (i / 4) % 2 == 0 {
            100.0
        } else {
            104.0
        }
    }

    /// Цена никогда не падает: скачок на 2% раз в три дня, между ними плато
    fn rising_close(i: usize) -> f64 {
        100.0 * 1.02f64.powi((i / 3) as i32)
    }

    fn quotes_csv_shaped(symbols: &[&str], days: usize, close_at: fn(usize) -> f64) -> String {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut csv = String::from("Symbol,Date,Open,High,Low,Close,Volume\n");
        for symbol in symbols {
            for i in 0..days {
                let date = start + chrono::Duration::days(i as i64);
                let close = close_at(i);
                let volume = 1_000_000.0 + ((i % 8) as f64) * 1000.0;
                csv.push_str(&format!(
                    "{},{},{:.2},{:.2},{:.2},{:.2},{:.0}\n",
                    symbol,
                    date.format("%Y-%m-%d"),
                    close - 0.5,
                    close + 1.0,
                    close - 1.0,
                    close,
                    volume
                ));
            }
        }
        csv
    }

    fn quotes_csv(symbols: &[&str], days: usize) -> String {
        quotes_csv_shaped(symbols, days, plateau_close)
    }

    fn test_options() -> DirectionOptions {
        DirectionOptions {
            window: 6,
            horizon: 2,
            train_ratio: 0.8,
            validation_ratio: 0.0,
            move_threshold: 0.01,
            max_iterations: 200,
            shuffle_seed: Some(42),
        }
    }

    fn train_report(csv: &str, options: DirectionOptions) -> (DirectionModel, DirectionReport) {
        let table = read_table_from_str(csv, &quote_columns()).unwrap();
        let mut model = DirectionModel::new(options).unwrap();
        let report = model.train(&table).unwrap();
        (model, report)
    }

    #[test]
    fn test_direction_class_thresholds() {
        assert_eq!(direction_class(100.0, 102.0, 0.01), 2);
        assert_eq!(direction_class(100.0, 98.0, 0.01), 0);
        assert_eq!(direction_class(100.0, 100.5, 0.01), 1);
        // Изменение ровно на порог считается нейтральным
        assert_eq!(direction_class(100.0, 101.0, 0.01), 1);
        assert_eq!(direction_class(100.0, 99.0, 0.01), 1);
    }

    #[test]
    fn test_train_on_periodic_pattern() {
        let (model, report) = train_report(&quotes_csv(&["AAPL", "MSFT"], 120), test_options());

        assert_eq!(report.symbols, vec!["AAPL", "MSFT"]);
        assert!(report.skipped_symbols.is_empty());
        assert!(report.train_windows > 0);
        assert_eq!(report.validation_windows, 0);
        assert!(report.test_windows > 0);
        // Паттерн периодический, тестовые окна повторяют тренировочные
        assert!(report.overall.accuracy > 0.7);
        assert_eq!(report.per_symbol.len(), 2);
        assert_eq!(report.predictions.len(), 2);
        for prediction in &report.predictions {
            assert_eq!(prediction.steps.len(), 2);
            for step in &prediction.steps {
                assert!(step.confidence >= 0.0 && step.confidence <= 1.0);
                assert_eq!(step.label, DIRECTION_LABELS[step.class]);
            }
        }
        assert!(model.is_trained());
    }

    #[test]
    fn test_short_symbol_skipped() {
        let mut csv = quotes_csv(&["AAPL"], 120);
        // Слишком короткий ряд: прогрев индикаторов съест все строки
        let tiny = quotes_csv(&["TINY"], 10);
        csv.push_str(tiny.splitn(2, '\n').nth(1).unwrap());
        let (_, report) = train_report(&csv, test_options());

        assert_eq!(report.symbols, vec!["AAPL"]);
        assert_eq!(report.skipped_symbols, vec!["TINY"]);
    }

    #[test]
    fn test_skipped_symbol_gets_no_forecast() {
        let mut csv = quotes_csv(&["AAPL"], 120);
        // После прогрева у SHRT шесть точек: покрывают окно прогноза,
        // но не окно с горизонтом
        let short = quotes_csv(&["SHRT"], 20);
        csv.push_str(short.splitn(2, '\n').nth(1).unwrap());
        let (_, report) = train_report(&csv, test_options());

        assert_eq!(report.symbols, vec!["AAPL"]);
        assert_eq!(report.skipped_symbols, vec!["SHRT"]);
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.predictions[0].symbol, "AAPL");
    }

    #[test]
    fn test_never_falling_series_keeps_class_codes() {
        // В целях обучения нет класса "вниз": столбцов вероятностей два,
        // но коды классов в отчете обязаны сохранить значения 0/1/2
        let csv = quotes_csv_shaped(&["AAPL"], 120, rising_close);
        let (model, report) = train_report(&csv, test_options());

        assert_eq!(report.overall.confusion.row_sum(0), 0);
        assert_eq!(report.overall.confusion.column_sum(0), 0);
        assert_eq!(report.overall.per_class[0].support, 0);
        assert!(report.overall.accuracy > 0.7);

        assert_eq!(report.predictions.len(), 1);
        for step in &report.predictions[0].steps {
            assert_ne!(step.class, 0);
            assert_eq!(step.label, DIRECTION_LABELS[step.class]);
            assert!(step.confidence >= 0.0 && step.confidence <= 1.0);
        }

        // Пакет перечисляет фактические классы шагов
        let bundle = model.bundle().unwrap();
        assert_eq!(bundle.coefficients[0].intercept.len(), 2);
        assert_eq!(bundle.coefficients[0].weights.len(), 2);
        assert_eq!(
            bundle.metadata["step_classes"],
            serde_json::json!([[1, 2], [1, 2]])
        );
    }

    #[test]
    fn test_all_symbols_too_short() {
        let csv = quotes_csv(&["AAPL", "MSFT"], 16);
        let table = read_table_from_str(&csv, &quote_columns()).unwrap();
        let mut model = DirectionModel::new(test_options()).unwrap();
        assert!(matches!(
            model.train(&table),
            Err(SeqlabError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_predict_fresh_quotes() {
        let (model, _) = train_report(&quotes_csv(&["AAPL", "MSFT"], 120), test_options());

        let csv = quotes_csv(&["NVDA"], 40);
        let table = read_table_from_str(&csv, &quote_columns()).unwrap();
        let quotes = quotes_from_table(&table).unwrap();
        let prediction = model.predict(&quotes).unwrap();

        assert_eq!(prediction.symbol, "NVDA");
        assert_eq!(prediction.steps.len(), 2);
        assert_eq!(prediction.window_end, quotes.last().unwrap().timestamp);
    }

    #[test]
    fn test_predict_rejects_mixed_symbols() {
        let (model, _) = train_report(&quotes_csv(&["AAPL", "MSFT"], 120), test_options());
        let table =
            read_table_from_str(&quotes_csv(&["NVDA", "AMD"], 40), &quote_columns()).unwrap();
        let quotes = quotes_from_table(&table).unwrap();
        assert!(model.predict(&quotes).is_err());
    }

    #[test]
    fn test_invalid_options() {
        let mut options = test_options();
        options.move_threshold = 0.0;
        assert!(DirectionModel::new(options).is_err());

        let mut options = test_options();
        options.train_ratio = 1.2;
        assert!(DirectionModel::new(options).is_err());
    }

    #[test]
    fn test_bundle_per_step_models() {
        let (model, _) = train_report(&quotes_csv(&["AAPL", "MSFT"], 120), test_options());
        let bundle = model.bundle().unwrap();

        assert_eq!(bundle.kind, "direction");
        assert_eq!(bundle.coefficients.len(), 2);
        // Ступенчатый паттерн дает все три класса в каждом шаге
        assert_eq!(bundle.coefficients[0].intercept.len(), 3);
        assert_eq!(bundle.coefficients[0].weights.len(), 3);
        assert_eq!(
            bundle.metadata["step_classes"],
            serde_json::json!([[0, 1, 2], [0, 1, 2]])
        );
        // Окно из 6 точек по 8 признаков
        assert_eq!(bundle.coefficients[0].weights[0].len(), 48);
    }
}
