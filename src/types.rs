//! Типы данных: строки датасетов, конфигурация пайплайнов и отчеты

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::evaluation::{ClassificationSummary, EntityClassReport, EntityRegressionReport, RocPoint};

/// Метки классов направления движения цены (индекс = код класса)
pub const DIRECTION_LABELS: [&str; 3] = ["Down", "Neutral", "Up"];

/// Дневная котировка одной акции
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Недельные продажи одного магазина
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRecord {
    pub store: String,
    pub timestamp: i64,
    pub weekly_sales: f64,
    pub holiday_flag: f64,
    pub temperature: f64,
    pub fuel_price: f64,
    pub cpi: f64,
    pub unemployment: f64,
}

/// Схема табличного датасета выживаемости
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalSchema {
    pub id_column: String,
    pub target_column: String,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub class_labels: Vec<String>,
}

impl Default for SurvivalSchema {
    fn default() -> Self {
        Self {
            id_column: "PassengerId".to_string(),
            target_column: "Survived".to_string(),
            numeric_columns: vec![
                "Age".to_string(),
                "Fare".to_string(),
                "SibSp".to_string(),
                "Parch".to_string(),
            ],
            categorical_columns: vec![
                "Pclass".to_string(),
                "Sex".to_string(),
                "Embarked".to_string(),
            ],
            class_labels: vec!["Died".to_string(), "Survived".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalOptions {
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Производные признаки FamilySize/IsAlone (нужны колонки SibSp и Parch)
    #[serde(default)]
    pub family_features: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
}

impl Default for SurvivalOptions {
    fn default() -> Self {
        Self {
            train_ratio: default_train_ratio(),
            threshold: default_threshold(),
            family_features: false,
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionOptions {
    #[serde(default = "default_direction_window")]
    pub window: usize,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
    #[serde(default)]
    pub validation_ratio: f64,
    /// Порог значимого движения цены (доля, 0.01 = 1%)
    #[serde(default = "default_move_threshold")]
    pub move_threshold: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl Default for DirectionOptions {
    fn default() -> Self {
        Self {
            window: default_direction_window(),
            horizon: default_horizon(),
            train_ratio: default_train_ratio(),
            validation_ratio: 0.0,
            move_threshold: default_move_threshold(),
            max_iterations: default_max_iterations(),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOptions {
    #[serde(default = "default_sales_window")]
    pub window: usize,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    #[serde(default = "default_sales_train_ratio")]
    pub train_ratio: f64,
    #[serde(default = "default_sales_validation_ratio")]
    pub validation_ratio: f64,
    #[serde(default = "default_min_stores")]
    pub min_stores: usize,
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl Default for SalesOptions {
    fn default() -> Self {
        Self {
            window: default_sales_window(),
            horizon: default_horizon(),
            train_ratio: default_sales_train_ratio(),
            validation_ratio: default_sales_validation_ratio(),
            min_stores: default_min_stores(),
            shuffle_seed: None,
        }
    }
}

fn default_direction_window() -> usize { 20 }
fn default_sales_window() -> usize { 12 }
fn default_horizon() -> usize { 3 }
fn default_train_ratio() -> f64 { 0.8 }
fn default_sales_train_ratio() -> f64 { 0.7 }
fn default_sales_validation_ratio() -> f64 { 0.15 }
fn default_move_threshold() -> f64 { 0.01 }
fn default_threshold() -> f64 { 0.5 }
fn default_min_stores() -> usize { 10 }
fn default_max_iterations() -> u64 { 200 }

/// Сводка загрузки CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub rows: usize,
    pub dropped_rows: usize,
    #[serde(default)]
    pub missing_by_column: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalReport {
    pub ingest: IngestSummary,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub feature_names: Vec<String>,
    pub threshold: f64,
    pub summary: ClassificationSummary,
    pub roc: Vec<RocPoint>,
    pub auc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalPrediction {
    pub id: String,
    pub probability: f64,
    pub label: usize,
}

/// Прогноз направления для одного шага горизонта
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionStep {
    pub class: usize,
    pub label: String,
    pub confidence: f64,
}

/// Прогноз по последнему окну символа
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionPrediction {
    pub symbol: String,
    pub window_end: i64,
    pub steps: Vec<DirectionStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionReport {
    pub ingest: IngestSummary,
    pub symbols: Vec<String>,
    pub skipped_symbols: Vec<String>,
    pub train_windows: usize,
    pub validation_windows: usize,
    pub test_windows: usize,
    pub overall: ClassificationSummary,
    pub per_symbol: Vec<EntityClassReport>,
    pub predictions: Vec<DirectionPrediction>,
}

/// Пример прогноза: фактический и предсказанный горизонт одного окна
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonSample {
    pub store: String,
    pub timestamps: Vec<i64>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

/// Прогноз продаж магазина за пределами имеющихся данных
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesForecast {
    pub store: String,
    pub timestamps: Vec<i64>,
    pub predicted: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesReport {
    pub ingest: IngestSummary,
    pub stores: Vec<String>,
    pub skipped_stores: Vec<String>,
    pub train_windows: usize,
    pub validation_windows: usize,
    pub test_windows: usize,
    pub overall_rmse: f64,
    pub overall_mae: f64,
    /// Отсортировано по RMSE по убыванию (худшие магазины первыми)
    pub per_store: Vec<EntityRegressionReport>,
    pub samples: Vec<HorizonSample>,
}

/// Коэффициенты одной линейной/логистической модели
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub intercept: Vec<f64>,
    pub weights: Vec<Vec<f64>>,
}

/// Экспортируемый пакет обученной модели
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub kind: String,
    pub version: String,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub feature_names: Vec<String>,
    pub preprocessing: serde_json::Value,
    pub coefficients: Vec<LinearCoefficients>,
    pub metadata: serde_json::Value,
}

// --- Типы запросов/ответов API сервера ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalRequest {
    pub train_csv: String,
    #[serde(default)]
    pub test_csv: Option<String>,
    #[serde(default)]
    pub schema: Option<SurvivalSchema>,
    #[serde(default)]
    pub options: SurvivalOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalResponse {
    pub report: SurvivalReport,
    pub predictions: Option<Vec<SurvivalPrediction>>,
    pub bundle: ModelBundle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionRequest {
    pub csv: String,
    #[serde(default)]
    pub options: DirectionOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionResponse {
    pub report: DirectionReport,
    pub bundle: ModelBundle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRequest {
    pub csv: String,
    #[serde(default)]
    pub options: SalesOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesResponse {
    pub report: SalesReport,
    pub bundle: ModelBundle,
}
