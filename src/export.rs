//! Экспорт результатов: CSV-файлы предсказаний и пакет модели

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::evaluation::EntityRegressionReport;
use crate::types::{ModelBundle, SurvivalPrediction};

/// Файл посылки: идентификатор и предсказанная метка
pub fn write_survival_submission<W: Write>(
    writer: W,
    predictions: &[SurvivalPrediction],
    id_column: &str,
    target_column: &str,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([id_column, target_column])?;
    for p in predictions {
        csv_writer.write_record([p.id.clone(), p.label.to_string()])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Вероятности вместе с метками для разбора порога
pub fn write_survival_probabilities<W: Write>(
    writer: W,
    predictions: &[SurvivalPrediction],
    id_column: &str,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([id_column, "Probability", "Label"])?;
    for p in predictions {
        csv_writer.write_record([
            p.id.clone(),
            format!("{:.4}", p.probability),
            p.label.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Метрики магазинов в порядке отчета (худшие первыми)
pub fn write_store_rmse<W: Write>(writer: W, reports: &[EntityRegressionReport]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["Store", "RMSE", "MAE", "Windows"])?;
    for r in reports {
        csv_writer.write_record([
            r.entity.clone(),
            format!("{:.2}", r.rmse),
            format!("{:.2}", r.mae),
            r.windows.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Пакет модели в JSON для переноса коэффициентов
pub fn write_bundle<W: Write>(writer: W, bundle: &ModelBundle) -> Result<()> {
    serde_json::to_writer_pretty(writer, bundle)?;
    Ok(())
}

pub fn write_survival_submission_to_path(
    path: &Path,
    predictions: &[SurvivalPrediction],
    id_column: &str,
    target_column: &str,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_survival_submission(file, predictions, id_column, target_column)
}

pub fn write_survival_probabilities_to_path(
    path: &Path,
    predictions: &[SurvivalPrediction],
    id_column: &str,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_survival_probabilities(file, predictions, id_column)
}

pub fn write_store_rmse_to_path(path: &Path, reports: &[EntityRegressionReport]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_store_rmse(file, reports)
}

pub fn write_bundle_to_path(path: &Path, bundle: &ModelBundle) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_bundle(file, bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinearCoefficients;

    fn predictions() -> Vec<SurvivalPrediction> {
        vec![
            SurvivalPrediction {
                id: "892".to_string(),
                probability: 0.12,
                label: 0,
            },
            SurvivalPrediction {
                id: "893".to_string(),
                probability: 0.9,
                label: 1,
            },
        ]
    }

    #[test]
    fn test_submission_format() {
        let mut buffer = Vec::new();
        write_survival_submission(&mut buffer, &predictions(), "PassengerId", "Survived")
            .unwrap();
        let content = String::from_utf8(buffer).unwrap();
        assert_eq!(content, "PassengerId,Survived\n892,0\n893,1\n");
    }

    #[test]
    fn test_probabilities_rounded() {
        let mut buffer = Vec::new();
        write_survival_probabilities(&mut buffer, &predictions(), "PassengerId").unwrap();
        let content = String::from_utf8(buffer).unwrap();
        assert!(content.contains("892,0.1200,0"));
        assert!(content.contains("893,0.9000,1"));
    }

    #[test]
    fn test_store_rmse_file() {
        let reports = vec![
            EntityRegressionReport {
                entity: "20".to_string(),
                windows: 5,
                rmse: 123456.789,
                mae: 98765.4,
            },
            EntityRegressionReport {
                entity: "4".to_string(),
                windows: 5,
                rmse: 1000.0,
                mae: 800.0,
            },
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store_rmse.csv");
        write_store_rmse_to_path(&path, &reports).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("Store,RMSE,MAE,Windows"));
        assert_eq!(lines.next(), Some("20,123456.79,98765.40,5"));
        assert_eq!(lines.next(), Some("4,1000.00,800.00,5"));
    }

    #[test]
    fn test_bundle_round_trip() {
        let bundle = ModelBundle {
            kind: "sales".to_string(),
            version: "0.1.0".to_string(),
            trained_at: chrono::Utc::now(),
            feature_names: vec!["Weekly_Sales".to_string()],
            preprocessing: serde_json::json!({"kind": "min_max"}),
            coefficients: vec![LinearCoefficients {
                intercept: vec![0.5],
                weights: vec![vec![1.0, 2.0]],
            }],
            metadata: serde_json::json!({"window": 12}),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        write_bundle_to_path(&path, &bundle).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: ModelBundle = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.kind, "sales");
        assert_eq!(parsed.coefficients[0].weights[0], vec![1.0, 2.0]);
    }
}
