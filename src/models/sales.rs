//! Прогноз недельных продаж: линейная регрессия по шагам горизонта

#![allow(non_snake_case)]

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa::Dataset;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{Array1, Array2};

use crate::error::{Result, SeqlabError};
use crate::evaluation::{average, by_entity, RegressionMetrics};
use crate::ingest::{sales_from_table, Table};
use crate::partition::{Partition, SplitSpec};
use crate::preprocessing::Normalizer;
use crate::types::{
    HorizonSample, LinearCoefficients, ModelBundle, SalesForecast, SalesOptions, SalesRecord,
    SalesReport,
};
use crate::windowing::{group_series, Observation, Series, Window};

const WEEK_SECONDS: i64 = 7 * 24 * 3600;
const SALES_FEATURES: [&str; 6] = [
    "Weekly_Sales",
    "Holiday_Flag",
    "Temperature",
    "Fuel_Price",
    "CPI",
    "Unemployment",
];
/// Позиция Weekly_Sales в векторе признаков; цель делит статистики
/// нормализации с этой колонкой
const TARGET_INDEX: usize = 0;

/// Сессия прогноза продаж по магазинам.
///
/// Признаки и цель масштабируются min-max по тренировочным окнам,
/// метрики считаются в исходных долларах после обратного преобразования.
pub struct SalesModel {
    options: SalesOptions,
    normalizer: Normalizer,
    models: Vec<FittedLinearRegression<f64>>,
    is_trained: bool,
}

impl SalesModel {
    pub fn new(options: SalesOptions) -> Result<Self> {
        SplitSpec::new(options.train_ratio, options.validation_ratio)?;
        if options.window == 0 {
            return Err(SeqlabError::invalid("window", "must be at least 1"));
        }
        if options.horizon == 0 {
            return Err(SeqlabError::invalid("horizon", "must be at least 1"));
        }
        if options.min_stores == 0 {
            return Err(SeqlabError::invalid("min_stores", "must be at least 1"));
        }

        Ok(Self {
            options,
            normalizer: Normalizer::min_max(),
            models: Vec::new(),
            is_trained: false,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    pub fn train(&mut self, table: &Table) -> Result<SalesReport> {
        let records = sales_from_table(table)?;
        let series_list = store_series(&records);

        if series_list.len() < self.options.min_stores {
            return Err(SeqlabError::InsufficientData {
                required: self.options.min_stores,
                actual: series_list.len(),
            });
        }

        let mut stores = Vec::new();
        let mut skipped_stores = Vec::new();
        for series in &series_list {
            if series.window_count(self.options.window, self.options.horizon) > 0 {
                stores.push(series.entity.clone());
            } else {
                skipped_stores.push(series.entity.clone());
            }
        }
        if !skipped_stores.is_empty() {
            tracing::warn!("Skipped stores with too little history: {:?}", skipped_stores);
        }
        if stores.is_empty() {
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

        // Статистики масштабирования по всем точкам тренировочных окон,
        // включая горизонт: цель должна быть обратима в доллары
        self.normalizer.fit(&window_timesteps(&partition.train))?;

        let X_train = self.design_matrix(&partition.train)?;

        // Одна модель на каждый шаг горизонта
        let mut models = Vec::with_capacity(self.options.horizon);
        for step in 0..self.options.horizon {
            let targets = partition
                .train
                .iter()
                .map(|w| {
                    self.normalizer
                        .transform_value(TARGET_INDEX, w.horizon[step].values[TARGET_INDEX])
                })
                .collect::<Result<Vec<_>>>()?;
            let dataset = Dataset::new(X_train.clone(), Array1::from(targets));
            let model = LinearRegression::default()
                .fit(&dataset)
                .map_err(|e| SeqlabError::Fit(e.to_string()))?;
            models.push(model);
        }

        // Оценка на тестовых окнах в исходных единицах
        let X_test = self.design_matrix(&partition.test)?;
        let mut predicted_by_window: Vec<Vec<f64>> =
            (0..partition.test.len()).map(|_| Vec::new()).collect();
        for model in &models {
            let predictions = model.predict(&X_test);
            for (i, window) in predicted_by_window.iter_mut().enumerate() {
                window.push(self.normalizer.inverse_value(TARGET_INDEX, predictions[i])?);
            }
        }

        // Метрики каждого окна отдельно, затем средние по магазину и в целом
        let mut window_metrics = Vec::with_capacity(partition.test.len());
        let mut store_metrics: BTreeMap<&str, Vec<RegressionMetrics>> = BTreeMap::new();
        for (i, w) in partition.test.iter().enumerate() {
            let actual: Vec<f64> = w.horizon.iter().map(|o| o.values[TARGET_INDEX]).collect();
            let metrics = RegressionMetrics::from_pairs(&actual, &predicted_by_window[i])?;
            window_metrics.push(metrics);
            store_metrics
                .entry(w.entity.as_str())
                .or_default()
                .push(metrics);
        }

        let overall = average(&window_metrics)?;
        let groups: Vec<(String, Vec<RegressionMetrics>)> = store_metrics
            .into_iter()
            .map(|(store, metrics)| (store.to_string(), metrics))
            .collect();
        let per_store = by_entity(&groups)?;

        // Последнее тестовое окно каждого магазина как наглядный пример
        let mut last_window_by_store: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, w) in partition.test.iter().enumerate() {
            last_window_by_store.insert(w.entity.as_str(), i);
        }
        let samples = last_window_by_store
            .iter()
            .map(|(store, &i)| {
                let w = &partition.test[i];
                HorizonSample {
                    store: store.to_string(),
                    timestamps: w.horizon.iter().map(|o| o.timestamp).collect(),
                    actual: w.horizon.iter().map(|o| o.values[TARGET_INDEX]).collect(),
                    predicted: predicted_by_window[i].clone(),
                }
            })
            .collect();

        self.models = models;
        self.is_trained = true;
        tracing::info!(
            "Sales model trained. RMSE: {:.2}, MAE: {:.2}",
            overall.rmse,
            overall.mae
        );

        Ok(SalesReport {
            ingest: table.summary.clone(),
            stores,
            skipped_stores,
            train_windows: partition.train.len(),
            validation_windows: partition.validation.len(),
            test_windows: partition.test.len(),
            overall_rmse: overall.rmse,
            overall_mae: overall.mae,
            per_store,
            samples,
        })
    }

    /// Прогноз следующих H недель по последнему окну одного магазина
    pub fn forecast(&self, records: &[SalesRecord]) -> Result<SalesForecast> {
        if !self.is_trained {
            return Err(SeqlabError::NotFitted("SalesModel"));
        }
        if records.is_empty() {
            return Err(SeqlabError::EmptyDataset);
        }
        let series_list = store_series(records);
        if series_list.len() != 1 {
            return Err(SeqlabError::invalid("records", "expected a single store"));
        }
        let series = &series_list[0];
        if series.len() < self.options.window {
            return Err(SeqlabError::InsufficientData {
                required: self.options.window,
                actual: series.len(),
            });
        }

        let history = &series.points[series.len() - self.options.window..];
        let row = self.window_features(history)?;
        let mut X = Array2::zeros((1, row.len()));
        for (j, v) in row.iter().enumerate() {
            X[[0, j]] = *v;
        }

        let last_timestamp = series.points[series.len() - 1].timestamp;
        let mut predicted = Vec::with_capacity(self.models.len());
        let mut timestamps = Vec::with_capacity(self.models.len());
        for (step, model) in self.models.iter().enumerate() {
            let normalized = model.predict(&X);
            predicted.push(self.normalizer.inverse_value(TARGET_INDEX, normalized[0])?);
            timestamps.push(last_timestamp + ((step + 1) as i64) * WEEK_SECONDS);
        }

        Ok(SalesForecast {
            store: series.entity.clone(),
            timestamps,
            predicted,
        })
    }

    pub fn bundle(&self) -> Result<ModelBundle> {
        if !self.is_trained || self.models.is_empty() {
            return Err(SeqlabError::NotFitted("SalesModel"));
        }

        let coefficients = self
            .models
            .iter()
            .map(|m| LinearCoefficients {
                intercept: vec![m.intercept()],
                weights: vec![m.params().to_vec()],
            })
            .collect();

        Ok(ModelBundle {
            kind: "sales".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            feature_names: SALES_FEATURES.iter().map(|s| s.to_string()).collect(),
            preprocessing: serde_json::to_value(self.normalizer.stats()?)?,
            coefficients,
            metadata: serde_json::json!({
                "window": self.options.window,
                "horizon": self.options.horizon,
                "target": SALES_FEATURES[TARGET_INDEX],
            }),
        })
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
}

fn store_series(records: &[SalesRecord]) -> Vec<Series> {
    group_series(
        records,
        |r| r.store.as_str(),
        |r| {
            Observation::new(
                r.timestamp,
                vec![
                    r.weekly_sales,
                    r.holiday_flag,
                    r.temperature,
                    r.fuel_price,
                    r.cpi,
                    r.unemployment,
                ],
            )
        },
    )
}

/// Все точки тренировочных окон, история и горизонт, одной матрицей
fn window_timesteps(windows: &[Window]) -> Array2<f64> {
    let d = windows
        .first()
        .and_then(|w| w.history.first())
        .map(|o| o.values.len())
        .unwrap_or(0);
    let rows: usize = windows.iter().map(|w| w.history.len() + w.horizon.len()).sum();
    let mut X = Array2::zeros((rows, d));
    let mut r = 0;
    for w in windows {
        for obs in w.history.iter().chain(w.horizon.iter()) {
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
    use crate::ingest::{read_table_from_str, sales_columns};
    use chrono::NaiveDate;

    /// Периодические продажи с небольшим детерминированным дрожанием,
    /// чтобы матрица признаков не была вырожденной
    fn weekly_sales(store: usize, week: usize) -> f64 {
        40_000.0
            + (store as f64) * 1000.0
            + ((week % 4) as f64) * 2000.0
            + ((week * 37 + store * 11) % 7) as f64 * 3.0
    }

    fn sales_csv(stores: usize, weeks: usize) -> String {
        let start = NaiveDate::from_ymd_opt(2010, 2, 5).unwrap();
        let mut csv = String::from(
            "Store,Date,Weekly_Sales,Holiday_Flag,Temperature,Fuel_Price,CPI,Unemployment\n",
        );
        for s in 1..=stores {
            for i in 0..weeks {
                let date = start + chrono::Duration::days(7 * i as i64);
                let holiday = if i % 13 == 0 { 1.0 } else { 0.0 };
                let temperature = 50.0 + 15.0 * ((i % 26) as f64) / 26.0
                    + 0.01 * ((i * 29 + s * 13) % 11) as f64;
                let fuel = 2.5 + 0.05 * ((i % 10) as f64) + 0.001 * ((i * 31 + s) % 11) as f64;
                let cpi = 210.0 + 0.2 * ((i % 20) as f64) + 0.01 * ((i * 23 + s * 7) % 11) as f64;
                let unemployment =
                    7.5 + 0.1 * ((i % 5) as f64) + 0.001 * ((i * 41 + s * 3) % 11) as f64;
                csv.push_str(&format!(
                    "S{:02},{},{:.2},{},{:.3},{:.3},{:.3},{:.3}\n",
                    s,
                    date.format("%d-%m-%Y"),
                    weekly_sales(s, i),
                    holiday,
                    temperature,
                    fuel,
                    cpi,
                    unemployment
                ));
            }
        }
        csv
    }

    fn test_options() -> SalesOptions {
        SalesOptions {
            window: 6,
            horizon: 2,
            train_ratio: 0.7,
            validation_ratio: 0.15,
            min_stores: 10,
            shuffle_seed: Some(7),
        }
    }

    fn train_report(csv: &str, options: SalesOptions) -> (SalesModel, SalesReport) {
        let table = read_table_from_str(csv, &sales_columns()).unwrap();
        let mut model = SalesModel::new(options).unwrap();
        let report = model.train(&table).unwrap();
        (model, report)
    }

    #[test]
    fn test_train_periodic_sales() {
        let (model, report) = train_report(&sales_csv(10, 60), test_options());

        assert_eq!(report.stores.len(), 10);
        assert!(report.skipped_stores.is_empty());
        assert!(report.train_windows > 0);
        assert!(report.validation_windows > 0);
        assert!(report.test_windows > 0);
        assert!(report.overall_rmse.is_finite());
        assert!(report.overall_rmse >= report.overall_mae);
        // Продажи почти точно повторяют лаг в 4 недели
        assert!(report.overall_rmse < 3000.0);
        assert!(model.is_trained());
    }

    #[test]
    fn test_per_store_sorted_by_rmse() {
        let (_, report) = train_report(&sales_csv(10, 60), test_options());

        assert_eq!(report.per_store.len(), 10);
        for pair in report.per_store.windows(2) {
            assert!(pair[0].rmse >= pair[1].rmse);
        }
    }

    #[test]
    fn test_samples_one_per_store() {
        let (_, report) = train_report(&sales_csv(10, 60), test_options());

        assert_eq!(report.samples.len(), 10);
        for sample in &report.samples {
            assert_eq!(sample.actual.len(), 2);
            assert_eq!(sample.predicted.len(), 2);
            assert_eq!(sample.timestamps.len(), 2);
            // Горизонт идет по неделям
            assert_eq!(sample.timestamps[1] - sample.timestamps[0], WEEK_SECONDS);
        }
    }

    #[test]
    fn test_too_few_stores() {
        let table = read_table_from_str(&sales_csv(3, 60), &sales_columns()).unwrap();
        let mut model = SalesModel::new(test_options()).unwrap();
        assert!(matches!(
            model.train(&table),
            Err(SeqlabError::InsufficientData {
                required: 10,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_forecast_next_weeks() {
        let (model, _) = train_report(&sales_csv(10, 60), test_options());

        let table = read_table_from_str(&sales_csv(1, 20), &sales_columns()).unwrap();
        let records = sales_from_table(&table).unwrap();
        let forecast = model.forecast(&records).unwrap();

        assert_eq!(forecast.store, "S01");
        assert_eq!(forecast.predicted.len(), 2);
        let last = records.last().unwrap().timestamp;
        assert_eq!(forecast.timestamps, vec![last + WEEK_SECONDS, last + 2 * WEEK_SECONDS]);
        for value in &forecast.predicted {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn test_forecast_before_train_fails() {
        let model = SalesModel::new(test_options()).unwrap();
        let table = read_table_from_str(&sales_csv(1, 20), &sales_columns()).unwrap();
        let records = sales_from_table(&table).unwrap();
        assert!(matches!(
            model.forecast(&records),
            Err(SeqlabError::NotFitted(_))
        ));
    }

    #[test]
    fn test_bundle_per_step_models() {
        let (model, _) = train_report(&sales_csv(10, 60), test_options());
        let bundle = model.bundle().unwrap();

        assert_eq!(bundle.kind, "sales");
        assert_eq!(bundle.coefficients.len(), 2);
        // Окно из 6 недель по 6 признаков
        assert_eq!(bundle.coefficients[0].weights[0].len(), 36);
        assert_eq!(bundle.feature_names[TARGET_INDEX], "Weekly_Sales");
    }
}
