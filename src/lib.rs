//! Seqlab - конвейеры обучения на табличных и последовательных данных

pub mod error;
pub mod evaluation;
pub mod export;
pub mod ingest;
pub mod models;
pub mod partition;
pub mod preprocessing;
pub mod types;
pub mod windowing;

pub use types::*;
pub use models::*;
pub use preprocessing::*;

// Re-export для удобства
pub use error::{Result, SeqlabError};
pub use evaluation::{
    ClassificationSummary, ConfusionMatrix, EntityClassReport, EntityRegressionReport,
    RegressionMetrics, RocPoint,
};
pub use ingest::{
    quote_columns, read_table_from_path, read_table_from_str, sales_columns, ColumnKind,
    ColumnSpec, Table,
};
pub use partition::{Partition, SplitSpec};
pub use windowing::{Observation, Series, Window};
