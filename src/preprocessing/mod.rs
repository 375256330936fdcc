/// Модуль предобработки данных

pub mod feature_engineering;
pub mod imputation;
pub mod normalization;

pub use feature_engineering::{FeatureEngineer, OneHotEncoder};
pub use imputation::Imputer;
pub use normalization::{NormKind, Normalizer, NormalizerStats};
