//! Модель выживаемости: логистическая регрессия на табличных признаках

#![allow(non_snake_case)]

use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{s, Array1, Array2};

use crate::error::{Result, SeqlabError};
use crate::evaluation::{auc, roc_curve, ClassificationSummary};
use crate::ingest::{ColumnKind, ColumnSpec, Table};
use crate::preprocessing::{FeatureEngineer, Imputer, Normalizer, OneHotEncoder};
use crate::types::{
    LinearCoefficients, ModelBundle, SurvivalOptions, SurvivalPrediction, SurvivalReport,
    SurvivalSchema,
};

const MIN_ROWS: usize = 10;
const ROC_STEPS: usize = 100;

/// Сессия обучения бинарного классификатора выживаемости.
///
/// Статистики заполнения пропусков, словарь кодировщика и параметры
/// нормализации вычисляются только по тренировочной части строк.
pub struct SurvivalModel {
    schema: SurvivalSchema,
    options: SurvivalOptions,
    imputer: Imputer,
    normalizer: Normalizer,
    encoder: OneHotEncoder,
    model: Option<FittedLogisticRegression<f64, usize>>,
    feature_names: Vec<String>,
    is_trained: bool,
}

impl SurvivalModel {
    pub fn new(schema: SurvivalSchema, options: SurvivalOptions) -> Result<Self> {
        if !(options.train_ratio > 0.0 && options.train_ratio < 1.0) {
            return Err(SeqlabError::invalid(
                "train_ratio",
                format!("{} outside (0, 1)", options.train_ratio),
            ));
        }
        if !(0.0..=1.0).contains(&options.threshold) {
            return Err(SeqlabError::invalid(
                "threshold",
                format!("{} outside [0, 1]", options.threshold),
            ));
        }
        if schema.class_labels.len() != 2 {
            return Err(SeqlabError::invalid(
                "class_labels",
                "binary task needs exactly 2 labels",
            ));
        }
        if schema.numeric_columns.is_empty() && schema.categorical_columns.is_empty() {
            return Err(SeqlabError::invalid("schema", "no feature columns defined"));
        }

        Ok(Self {
            schema,
            options,
            imputer: Imputer::new(),
            normalizer: Normalizer::standard(),
            encoder: OneHotEncoder::new(),
            model: None,
            feature_names: Vec::new(),
            is_trained: false,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.is_trained
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Спецификация колонок CSV по схеме; колонка цели нужна только при обучении
    pub fn columns(schema: &SurvivalSchema, with_target: bool) -> Vec<ColumnSpec> {
        let mut specs = vec![ColumnSpec::optional(&schema.id_column, ColumnKind::Text)];
        if with_target {
            specs.push(ColumnSpec::required(&schema.target_column, ColumnKind::Float));
        }
        for name in &schema.numeric_columns {
            specs.push(ColumnSpec::required(name, ColumnKind::Float));
        }
        for name in &schema.categorical_columns {
            specs.push(ColumnSpec::required(name, ColumnKind::Text));
        }
        specs
    }

    pub fn train(&mut self, table: &Table) -> Result<SurvivalReport> {
        // Цель: только 0/1, строки без цели пропускаются
        let target_idx = table.column_index(&self.schema.target_column)?;
        let mut keep = Vec::with_capacity(table.len());
        let mut labels: Vec<usize> = Vec::with_capacity(table.len());
        let mut skipped = 0usize;
        for (i, row) in table.rows.iter().enumerate() {
            match row[target_idx].as_f64() {
                Some(v) if v == 0.0 || v == 1.0 => {
                    keep.push(i);
                    labels.push(v as usize);
                }
                Some(v) => {
                    return Err(SeqlabError::invalid(
                        "target_column",
                        format!("expected binary 0/1 target, got {}", v),
                    ))
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!("Skipped {} rows without target value", skipped);
        }

        let n = keep.len();
        if n < MIN_ROWS {
            return Err(SeqlabError::InsufficientData {
                required: MIN_ROWS,
                actual: n,
            });
        }

        // Порядок строк файла сохраняется, train берется из первых строк
        let split = (n as f64 * self.options.train_ratio).floor() as usize;
        if split == 0 || split == n {
            return Err(SeqlabError::invalid(
                "train_ratio",
                "split leaves an empty partition",
            ));
        }

        let (numeric, categorical) = self.extract_columns(table, Some(&keep))?;

        // Статистики предобработки только по тренировочным строкам
        let train_numeric: Vec<Vec<Option<f64>>> =
            numeric.iter().map(|c| c[..split].to_vec()).collect();
        let train_categorical: Vec<Vec<Option<String>>> =
            categorical.iter().map(|c| c[..split].to_vec()).collect();

        self.imputer.fit(&train_numeric, &train_categorical)?;
        let filled_train = self.imputer.transform_numeric(&train_numeric)?;
        let filled_train_cat = self.imputer.transform_categorical(&train_categorical)?;
        self.encoder.fit(&filled_train_cat)?;
        self.normalizer.fit(&columns_to_matrix(&filled_train, split))?;

        let family = self.family_indices()?;
        let mut names = self.schema.numeric_columns.clone();
        if family.is_some() {
            names.extend(FeatureEngineer::family_feature_names());
        }
        names.extend(self.encoder.feature_names(&self.schema.categorical_columns));
        self.feature_names = names;

        let X = self.build_features(&numeric, &categorical)?;

        // Обучение логистической регрессии
        let y_train = Array1::from(labels[..split].to_vec());
        let dataset = Dataset::new(X.slice(s![..split, ..]).to_owned(), y_train);
        let model = LogisticRegression::default()
            .max_iterations(self.options.max_iterations)
            .fit(&dataset)
            .map_err(|e| SeqlabError::Fit(e.to_string()))?;

        // Оценка на отложенных строках
        let X_val = X.slice(s![split.., ..]).to_owned();
        let probabilities = model.predict_probabilities(&X_val);
        let truth: Vec<usize> = labels[split..].to_vec();
        let scores: Vec<f64> = probabilities.to_vec();
        let pairs: Vec<(usize, usize)> = truth
            .iter()
            .zip(scores.iter())
            .map(|(&t, &p)| (t, (p >= self.options.threshold) as usize))
            .collect();

        let summary = ClassificationSummary::from_pairs(&self.schema.class_labels, &pairs)?;
        let roc = roc_curve(&truth, &scores, ROC_STEPS)?;
        let auc_value = auc(&roc);

        self.model = Some(model);
        self.is_trained = true;
        tracing::info!(
            "Survival model trained. Accuracy: {:.3}, AUC: {:.3}",
            summary.accuracy,
            auc_value
        );

        Ok(SurvivalReport {
            ingest: table.summary.clone(),
            train_rows: split,
            validation_rows: n - split,
            feature_names: self.feature_names.clone(),
            threshold: self.options.threshold,
            summary,
            roc,
            auc: auc_value,
        })
    }

    /// Вероятности и метки для таблицы без колонки цели
    pub fn predict(&self, table: &Table) -> Result<Vec<SurvivalPrediction>> {
        let model = self
            .model
            .as_ref()
            .ok_or(SeqlabError::NotFitted("SurvivalModel"))?;

        let id_idx = table.column_index(&self.schema.id_column)?;
        let (numeric, categorical) = self.extract_columns(table, None)?;
        let X = self.build_features(&numeric, &categorical)?;
        let probabilities = model.predict_probabilities(&X);

        Ok(table
            .rows
            .iter()
            .zip(probabilities.iter())
            .map(|(row, &p)| SurvivalPrediction {
                id: row[id_idx].as_text().unwrap_or_default().to_string(),
                probability: p,
                label: (p >= self.options.threshold) as usize,
            })
            .collect())
    }

    /// Пакет модели: коэффициенты и статистики предобработки
    pub fn bundle(&self) -> Result<ModelBundle> {
        let model = self
            .model
            .as_ref()
            .ok_or(SeqlabError::NotFitted("SurvivalModel"))?;

        let coefficients = vec![LinearCoefficients {
            intercept: vec![model.intercept()],
            weights: vec![model.params().to_vec()],
        }];
        let preprocessing = serde_json::json!({
            "imputer": {
                "medians": self.imputer.medians()?,
                "modes": self.imputer.modes()?,
            },
            "normalizer": self.normalizer.stats()?,
            "encoder": { "categories": self.encoder.categories() },
        });

        Ok(ModelBundle {
            kind: "survival".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now(),
            feature_names: self.feature_names.clone(),
            preprocessing,
            coefficients,
            metadata: serde_json::to_value(&self.schema)?,
        })
    }

    /// Колонки схемы как векторы значений; `keep` ограничивает набор строк
    fn extract_columns(
        &self,
        table: &Table,
        keep: Option<&[usize]>,
    ) -> Result<(Vec<Vec<Option<f64>>>, Vec<Vec<Option<String>>>)> {
        let collect_f64 = |idx: usize| -> Vec<Option<f64>> {
            match keep {
                Some(rows) => rows.iter().map(|&i| table.rows[i][idx].as_f64()).collect(),
                None => table.column_f64(idx),
            }
        };
        let collect_text = |idx: usize| -> Vec<Option<String>> {
            match keep {
                Some(rows) => rows
                    .iter()
                    .map(|&i| table.rows[i][idx].as_text().map(str::to_string))
                    .collect(),
                None => table
                    .column_text(idx)
                    .into_iter()
                    .map(|v| v.map(str::to_string))
                    .collect(),
            }
        };

        let mut numeric = Vec::with_capacity(self.schema.numeric_columns.len());
        for name in &self.schema.numeric_columns {
            numeric.push(collect_f64(table.column_index(name)?));
        }
        let mut categorical = Vec::with_capacity(self.schema.categorical_columns.len());
        for name in &self.schema.categorical_columns {
            categorical.push(collect_text(table.column_index(name)?));
        }
        Ok((numeric, categorical))
    }

    fn family_indices(&self) -> Result<Option<(usize, usize)>> {
        if !self.options.family_features {
            return Ok(None);
        }
        let sibsp = self.schema.numeric_columns.iter().position(|c| c == "SibSp");
        let parch = self.schema.numeric_columns.iter().position(|c| c == "Parch");
        match (sibsp, parch) {
            (Some(s), Some(p)) => Ok(Some((s, p))),
            _ => Err(SeqlabError::invalid(
                "family_features",
                "requires SibSp and Parch among numeric columns",
            )),
        }
    }

    /// Матрица признаков по уже обученной предобработке:
    /// нормализованные числовые, семейные признаки, one-hot категории
    fn build_features(
        &self,
        numeric: &[Vec<Option<f64>>],
        categorical: &[Vec<Option<String>>],
    ) -> Result<Array2<f64>> {
        let filled_numeric = self.imputer.transform_numeric(numeric)?;
        let filled_categorical = self.imputer.transform_categorical(categorical)?;

        let n = filled_numeric
            .first()
            .map(|c| c.len())
            .or_else(|| filled_categorical.first().map(|c| c.len()))
            .unwrap_or(0);
        if n == 0 {
            return Err(SeqlabError::EmptyDataset);
        }

        let num_d = filled_numeric.len();
        let family = self.family_indices()?;
        let fam_d = if family.is_some() { 2 } else { 0 };
        let onehot_d = self.encoder.width();

        let scaled = self.normalizer.transform(&columns_to_matrix(&filled_numeric, n))?;

        let mut X = Array2::zeros((n, num_d + fam_d + onehot_d));
        X.slice_mut(s![.., ..num_d]).assign(&scaled);
        if let Some((sibsp, parch)) = family {
            let block = FeatureEngineer::family_features(
                &filled_numeric[sibsp],
                &filled_numeric[parch],
            );
            X.slice_mut(s![.., num_d..num_d + 2]).assign(&block);
        }
        if onehot_d > 0 {
            let onehot = self.encoder.transform(&filled_categorical)?;
            X.slice_mut(s![.., num_d + fam_d..]).assign(&onehot);
        }
        Ok(X)
    }
}

fn columns_to_matrix(columns: &[Vec<f64>], rows: usize) -> Array2<f64> {
    let mut X = Array2::zeros((rows, columns.len()));
    for (j, column) in columns.iter().enumerate() {
        for (i, v) in column.iter().enumerate().take(rows) {
            X[[i, j]] = *v;
        }
    }
    X
}
