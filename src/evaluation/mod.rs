/// Оценка качества моделей на отложенных окнах

pub mod classification;
pub mod regression;

pub use classification::{
    auc, roc_curve, ClassMetrics, ClassificationSummary, ConfusionMatrix, EntityClassReport,
    RocPoint,
};
pub use regression::{average, by_entity, EntityRegressionReport, RegressionMetrics};
