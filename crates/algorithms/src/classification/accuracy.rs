//! Accuracy assessment: confusion matrix, overall accuracy and kappa
//!
//! Rows of the matrix are reference (true) classes, columns are
//! predicted classes.

use super::random_forest::Classifier;
use super::sampling::SampleSet;
use lulc_core::{Error, Result};
use ndarray::Array2;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Square matrix of (true, predicted) pair counts
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    /// Tally `truth[i]` against `predicted[i]`.
    ///
    /// Fails with `EmptyTestSet` when there is nothing to tally.
    pub fn from_labels(truth: &[u8], predicted: &[u8], num_classes: usize) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(Error::InvalidParameter {
                name: "predicted",
                value: format!("{} labels", predicted.len()),
                reason: format!("expected one prediction per reference label ({})", truth.len()),
            });
        }
        if truth.is_empty() {
            return Err(Error::EmptyTestSet);
        }

        let mut counts = Array2::<u64>::zeros((num_classes, num_classes));
        for (&t, &p) in truth.iter().zip(predicted) {
            let (t, p) = (usize::from(t), usize::from(p));
            if t >= num_classes || p >= num_classes {
                return Err(Error::InvalidParameter {
                    name: "label",
                    value: format!("({}, {})", t, p),
                    reason: format!("class ids must be below {}", num_classes),
                });
            }
            counts[[t, p]] += 1;
        }
        Ok(Self { counts })
    }

    pub fn num_classes(&self) -> usize {
        self.counts.nrows()
    }

    /// Count of samples of class `truth` predicted as `predicted`
    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[[truth, predicted]]
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Rows as nested vectors, for serialization and display
    pub fn to_rows(&self) -> Vec<Vec<u64>> {
        self.counts.rows().into_iter().map(|r| r.to_vec()).collect()
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    /// Correctly classified samples
    pub fn trace(&self) -> u64 {
        self.counts.diag().sum()
    }

    /// Reference samples per class
    pub fn row_sums(&self) -> Vec<u64> {
        self.counts.rows().into_iter().map(|r| r.sum()).collect()
    }

    /// Predictions per class
    pub fn col_sums(&self) -> Vec<u64> {
        self.counts.columns().into_iter().map(|c| c.sum()).collect()
    }

    /// Fraction of samples on the diagonal
    pub fn overall_accuracy(&self) -> f64 {
        self.trace() as f64 / self.total() as f64
    }

    /// Cohen's kappa, (p_o - p_e) / (1 - p_e).
    ///
    /// When the expected agreement p_e is 1 (every sample in one class,
    /// predicted as that class) the ratio is undefined; this returns 1.0
    /// if observed agreement is perfect as well.
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        let p_o = self.trace() as f64 / n;
        let p_e: f64 = self
            .row_sums()
            .iter()
            .zip(self.col_sums())
            .map(|(&r, c)| r as f64 * c as f64)
            .sum::<f64>()
            / (n * n);

        if (1.0 - p_e).abs() < f64::EPSILON {
            return if (p_o - 1.0).abs() < f64::EPSILON { 1.0 } else { 0.0 };
        }
        (p_o - p_e) / (1.0 - p_e)
    }

    /// Per-class recall: diagonal over row sum; `None` for classes absent
    /// from the reference labels
    pub fn producers_accuracy(&self) -> Vec<Option<f64>> {
        self.row_sums()
            .iter()
            .enumerate()
            .map(|(i, &r)| (r > 0).then(|| self.counts[[i, i]] as f64 / r as f64))
            .collect()
    }

    /// Per-class precision: diagonal over column sum; `None` for classes
    /// never predicted
    pub fn consumers_accuracy(&self) -> Vec<Option<f64>> {
        self.col_sums()
            .iter()
            .enumerate()
            .map(|(j, &c)| (c > 0).then(|| self.counts[[j, j]] as f64 / c as f64))
            .collect()
    }
}

impl Serialize for ConfusionMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ConfusionMatrix", 2)?;
        s.serialize_field("num_classes", &self.num_classes())?;
        s.serialize_field("rows", &self.to_rows())?;
        s.end()
    }
}

/// Scalar summaries of one confusion matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub confusion_matrix: ConfusionMatrix,
    pub overall_accuracy: f64,
    pub kappa: f64,
    pub producers_accuracy: Vec<Option<f64>>,
    pub consumers_accuracy: Vec<Option<f64>>,
}

impl AccuracyReport {
    pub fn from_matrix(confusion_matrix: ConfusionMatrix) -> Self {
        Self {
            overall_accuracy: confusion_matrix.overall_accuracy(),
            kappa: confusion_matrix.kappa(),
            producers_accuracy: confusion_matrix.producers_accuracy(),
            consumers_accuracy: confusion_matrix.consumers_accuracy(),
            confusion_matrix,
        }
    }
}

/// Predict every test record and compare with its label
pub fn assess<C: Classifier + ?Sized>(classifier: &C, test: &SampleSet) -> Result<AccuracyReport> {
    if test.is_empty() {
        return Err(Error::EmptyTestSet);
    }
    let predicted = classifier.predict_samples(test)?;
    let matrix = ConfusionMatrix::from_labels(&test.labels(), &predicted, classifier.num_classes())?;

    for (class, &n) in matrix.row_sums().iter().enumerate() {
        if n == 0 {
            tracing::warn!(class, "class has no test samples; its producer's accuracy is undefined");
        }
    }

    Ok(AccuracyReport::from_matrix(matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_predictions() {
        let truth = [0, 0, 0, 1, 1, 1, 2, 2, 3, 3];
        let m = ConfusionMatrix::from_labels(&truth, &truth, 4).unwrap();

        assert_eq!(m.total(), 10);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { [3, 3, 2, 2][i] } else { 0 };
                assert_eq!(m.get(i, j), expected);
            }
        }
        assert_relative_eq!(m.overall_accuracy(), 1.0);
        assert_relative_eq!(m.kappa(), 1.0);
    }

    #[test]
    fn test_kappa_known_value() {
        // 2x2 textbook case: p_o = 0.7, p_e = 0.5
        let truth = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let predicted = [0, 0, 0, 0, 1, 1, 1, 1, 0, 0];
        let m = ConfusionMatrix::from_labels(&truth, &predicted, 2).unwrap();

        assert_eq!(m.to_rows(), vec![vec![4, 1], vec![2, 3]]);
        assert_relative_eq!(m.overall_accuracy(), 0.7);
        assert_relative_eq!(m.kappa(), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_single_class_perfect_kappa() {
        let labels = [1, 1, 1];
        let m = ConfusionMatrix::from_labels(&labels, &labels, 4).unwrap();
        assert_relative_eq!(m.kappa(), 1.0);
    }

    #[test]
    fn test_per_class_accuracies() {
        let truth = [0, 0, 1, 1];
        let predicted = [0, 1, 1, 1];
        let m = ConfusionMatrix::from_labels(&truth, &predicted, 3).unwrap();

        let producers = m.producers_accuracy();
        assert_relative_eq!(producers[0].unwrap(), 0.5);
        assert_relative_eq!(producers[1].unwrap(), 1.0);
        assert_eq!(producers[2], None);

        let consumers = m.consumers_accuracy();
        assert_relative_eq!(consumers[0].unwrap(), 1.0);
        assert_relative_eq!(consumers[1].unwrap(), 2.0 / 3.0);
        assert_eq!(consumers[2], None);
    }

    #[test]
    fn test_empty_and_mismatched_inputs() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[], &[], 4),
            Err(Error::EmptyTestSet)
        ));
        assert!(ConfusionMatrix::from_labels(&[0, 1], &[0], 4).is_err());
        assert!(ConfusionMatrix::from_labels(&[0], &[7], 4).is_err());
    }

    #[test]
    fn test_serializes_rows() {
        let m = ConfusionMatrix::from_labels(&[0, 1], &[0, 0], 2).unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["num_classes"], 2);
        assert_eq!(json["rows"], serde_json::json!([[1, 0], [1, 0]]));
    }
}
