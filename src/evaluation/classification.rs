//! Метрики классификации: матрица ошибок, precision/recall/F1, ROC и AUC

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};

/// Матрица ошибок K×K: строки по истинным классам, столбцы по предсказанным
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(classes: usize) -> Self {
        Self {
            classes,
            counts: vec![0; classes * classes],
        }
    }

    pub fn from_pairs(classes: usize, pairs: &[(usize, usize)]) -> Result<Self> {
        let mut matrix = Self::new(classes);
        for &(truth, predicted) in pairs {
            matrix.record(truth, predicted)?;
        }
        Ok(matrix)
    }

    pub fn record(&mut self, truth: usize, predicted: usize) -> Result<()> {
        if truth >= self.classes || predicted >= self.classes {
            return Err(SeqlabError::invalid(
                "class",
                format!(
                    "pair ({}, {}) out of range for {} classes",
                    truth, predicted, self.classes
                ),
            ));
        }
        self.counts[truth * self.classes + predicted] += 1;
        Ok(())
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn count(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.classes + predicted]
    }

    /// Сколько раз класс встретился как истинный
    pub fn row_sum(&self, class: usize) -> u64 {
        (0..self.classes).map(|p| self.count(class, p)).sum()
    }

    /// Сколько раз класс был предсказан
    pub fn column_sum(&self, class: usize) -> u64 {
        (0..self.classes).map(|t| self.count(t, class)).sum()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: u64 = (0..self.classes).map(|c| self.count(c, c)).sum();
        correct as f64 / total as f64
    }

    pub fn precision(&self, class: usize) -> f64 {
        let predicted = self.column_sum(class);
        if predicted == 0 {
            return 0.0;
        }
        self.count(class, class) as f64 / predicted as f64
    }

    pub fn recall(&self, class: usize) -> f64 {
        let actual = self.row_sum(class);
        if actual == 0 {
            return 0.0;
        }
        self.count(class, class) as f64 / actual as f64
    }

    pub fn f1(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }

    /// Строки матрицы для табличных отчетов
    pub fn rows(&self) -> Vec<Vec<u64>> {
        (0..self.classes)
            .map(|t| (0..self.classes).map(|p| self.count(t, p)).collect())
            .collect()
    }
}

/// Метрики одного класса
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Сводка классификации по набору пар (истина, предсказание)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub classes: Vec<String>,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
}

impl ClassificationSummary {
    pub fn from_pairs(classes: &[String], pairs: &[(usize, usize)]) -> Result<Self> {
        let confusion = ConfusionMatrix::from_pairs(classes.len(), pairs)?;
        let per_class = classes
            .iter()
            .enumerate()
            .map(|(c, name)| ClassMetrics {
                class: name.clone(),
                precision: confusion.precision(c),
                recall: confusion.recall(c),
                f1: confusion.f1(c),
                support: confusion.row_sum(c),
            })
            .collect();
        Ok(Self {
            classes: classes.to_vec(),
            accuracy: confusion.accuracy(),
            confusion,
            per_class,
        })
    }
}

/// Сводка классификации одной сущности
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityClassReport {
    pub entity: String,
    pub windows: usize,
    pub summary: ClassificationSummary,
}

/// Точка ROC-кривой
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

/// ROC по сетке порогов i/steps, i в [0, steps).
/// Предсказание положительно, когда score >= порога.
pub fn roc_curve(truth: &[usize], scores: &[f64], steps: usize) -> Result<Vec<RocPoint>> {
    if truth.len() != scores.len() {
        return Err(SeqlabError::invalid(
            "scores",
            format!("{} labels vs {} scores", truth.len(), scores.len()),
        ));
    }
    if truth.is_empty() {
        return Err(SeqlabError::EmptyDataset);
    }
    if steps < 2 {
        return Err(SeqlabError::invalid("steps", "need at least 2 thresholds"));
    }

    let mut points = Vec::with_capacity(steps);
    for i in 0..steps {
        let threshold = i as f64 / steps as f64;
        let mut tp = 0u64;
        let mut fp = 0u64;
        let mut tn = 0u64;
        let mut fn_ = 0u64;
        for (&t, &score) in truth.iter().zip(scores.iter()) {
            let predicted = score >= threshold;
            match (t != 0, predicted) {
                (true, true) => tp += 1,
                (true, false) => fn_ += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
            }
        }
        let tpr = if tp + fn_ == 0 {
            0.0
        } else {
            tp as f64 / (tp + fn_) as f64
        };
        let fpr = if fp + tn == 0 {
            0.0
        } else {
            fp as f64 / (fp + tn) as f64
        };
        points.push(RocPoint {
            threshold,
            fpr,
            tpr,
        });
    }
    Ok(points)
}

/// Трапециевидная аппроксимация площади под ROC-кривой.
/// Точки упорядочиваются по FPR, края (0,0) и (1,1) добавляются.
pub fn auc(points: &[RocPoint]) -> f64 {
    let mut curve: Vec<(f64, f64)> = points.iter().map(|p| (p.fpr, p.tpr)).collect();
    curve.push((0.0, 0.0));
    curve.push((1.0, 1.0));
    curve.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut area = 0.0;
    for pair in curve.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        area += (x1 - x0) * (y0 + y1) / 2.0;
    }
    area.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_row_sums_equal_true_label_counts() {
        let pairs = vec![
            (0, 0),
            (0, 1),
            (1, 1),
            (1, 1),
            (2, 0),
            (2, 2),
            (2, 2),
            (0, 0),
        ];
        let matrix = ConfusionMatrix::from_pairs(3, &pairs).unwrap();

        for class in 0..3 {
            let expected = pairs.iter().filter(|(t, _)| *t == class).count() as u64;
            assert_eq!(matrix.row_sum(class), expected);
        }
        assert_eq!(matrix.total(), pairs.len() as u64);
    }

    #[test]
    fn test_known_metrics() {
        // Матрица:  [[2, 1],
        //            [1, 4]]
        let pairs = vec![
            (0, 0),
            (0, 0),
            (0, 1),
            (1, 0),
            (1, 1),
            (1, 1),
            (1, 1),
            (1, 1),
        ];
        let matrix = ConfusionMatrix::from_pairs(2, &pairs).unwrap();

        assert_abs_diff_eq!(matrix.accuracy(), 6.0 / 8.0, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.precision(1), 4.0 / 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.recall(1), 4.0 / 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.f1(1), 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix.precision(0), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_absent_class_yields_zero_metrics() {
        let pairs = vec![(0, 0), (1, 0)];
        let matrix = ConfusionMatrix::from_pairs(3, &pairs).unwrap();
        assert_eq!(matrix.precision(2), 0.0);
        assert_eq!(matrix.recall(2), 0.0);
        assert_eq!(matrix.f1(2), 0.0);
    }

    #[test]
    fn test_out_of_range_pair_rejected() {
        assert!(ConfusionMatrix::from_pairs(2, &[(0, 2)]).is_err());
        assert!(ConfusionMatrix::from_pairs(2, &[(3, 0)]).is_err());
    }

    #[test]
    fn test_summary_shape() {
        let classes = vec![
            "Down".to_string(),
            "Neutral".to_string(),
            "Up".to_string(),
        ];
        let pairs = vec![(0, 0), (1, 1), (2, 2), (2, 1)];
        let summary = ClassificationSummary::from_pairs(&classes, &pairs).unwrap();

        assert_eq!(summary.per_class.len(), 3);
        assert_abs_diff_eq!(summary.accuracy, 0.75, epsilon = 1e-12);
        assert_eq!(summary.per_class[2].support, 2);
        assert_eq!(summary.per_class[0].class, "Down");
    }

    #[test]
    fn test_roc_perfect_scorer() {
        let truth = vec![0, 0, 1, 1];
        let scores = vec![0.1, 0.2, 0.8, 0.9];
        let points = roc_curve(&truth, &scores, 100).unwrap();

        assert_eq!(points.len(), 100);
        assert_abs_diff_eq!(auc(&points), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_roc_constant_scorer() {
        let truth = vec![0, 1, 0, 1, 0, 1];
        let scores = vec![0.5; 6];
        let points = roc_curve(&truth, &scores, 100).unwrap();
        assert_abs_diff_eq!(auc(&points), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_roc_rejects_mismatched_input() {
        assert!(roc_curve(&[0, 1], &[0.5], 100).is_err());
        assert!(roc_curve(&[], &[], 100).is_err());
        assert!(roc_curve(&[0, 1], &[0.1, 0.9], 1).is_err());
    }
}
