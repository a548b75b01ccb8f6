//! Seeded train/test partitioning
//!
//! Each record gets an independent uniform key in [0, 1) drawn from a
//! generator seeded with the split seed. Records with a key below the
//! training fraction go to the training set, the rest to the test set.
//! The expected training share equals the fraction; the exact count
//! varies with the draw.

use super::sampling::SampleSet;
use lulc_core::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Training share and seed of a random split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Expected fraction of records used for training, in [0, 1]
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            seed: 0,
        }
    }
}

/// Disjoint training and test partitions of one sample set
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: SampleSet,
    pub test: SampleSet,
}

/// Copy of `samples` with every split key replaced by a fresh draw.
///
/// Keys are drawn in record order, so the same records and seed always
/// produce the same keys.
pub fn assign_split_keys(samples: &SampleSet, seed: u64) -> Result<SampleSet> {
    let mut rng = StdRng::seed_from_u64(seed);
    let records = samples
        .records()
        .iter()
        .map(|record| {
            let mut record = record.clone();
            record.split_key = Some(rng.gen::<f64>());
            record
        })
        .collect();
    SampleSet::from_records(samples.schema().to_vec(), records)
}

/// Partition `samples` into training and test sets.
///
/// A fraction of 1 puts every record in training and leaves the test set
/// empty; accuracy assessment then fails. Keys already present on the
/// records are overwritten.
pub fn split_samples(samples: &SampleSet, params: &SplitParams) -> Result<TrainTestSplit> {
    let fraction = params.train_fraction;
    if !(0.0..=1.0).contains(&fraction) {
        return Err(Error::InvalidParameter {
            name: "train_fraction",
            value: fraction.to_string(),
            reason: "must lie in [0, 1]".into(),
        });
    }

    let keyed = assign_split_keys(samples, params.seed)?;
    let schema = keyed.schema().to_vec();
    let (train, test): (Vec<_>, Vec<_>) = keyed
        .into_records()
        .into_iter()
        .partition(|r| r.split_key.is_some_and(|k| k < fraction));

    tracing::debug!(
        train = train.len(),
        test = test.len(),
        fraction,
        seed = params.seed,
        "split samples"
    );

    Ok(TrainTestSplit {
        train: SampleSet::from_records(schema.clone(), train)?,
        test: SampleSet::from_records(schema, test)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::sampling::{SampleLocation, SampleRecord};

    fn samples(n: usize) -> SampleSet {
        let records = (0..n)
            .map(|i| SampleRecord {
                features: vec![i as f64],
                label: (i % 4) as u8,
                split_key: None,
                location: SampleLocation {
                    row: i,
                    col: 0,
                    x: 0.5,
                    y: i as f64 + 0.5,
                },
            })
            .collect();
        SampleSet::from_records(vec!["B8".into()], records).unwrap()
    }

    fn rows(set: &SampleSet) -> Vec<usize> {
        set.records().iter().map(|r| r.location.row).collect()
    }

    #[test]
    fn test_same_seed_same_split() {
        let set = samples(200);
        let params = SplitParams { train_fraction: 0.7, seed: 42 };
        let a = split_samples(&set, &params).unwrap();
        let b = split_samples(&set, &params).unwrap();
        assert_eq!(rows(&a.train), rows(&b.train));
        assert_eq!(rows(&a.test), rows(&b.test));
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let set = samples(500);
        let split = split_samples(&set, &SplitParams { train_fraction: 0.7, seed: 3 }).unwrap();

        let mut all: Vec<usize> = rows(&split.train);
        all.extend(rows(&split.test));
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());

        let share = split.train.len() as f64 / 500.0;
        assert!((share - 0.7).abs() < 0.1, "training share {} far from 0.7", share);
    }

    #[test]
    fn test_keys_follow_fraction() {
        let split = split_samples(&samples(100), &SplitParams { train_fraction: 0.5, seed: 9 }).unwrap();
        assert!(split.train.records().iter().all(|r| r.split_key.unwrap() < 0.5));
        assert!(split.test.records().iter().all(|r| r.split_key.unwrap() >= 0.5));
    }

    #[test]
    fn test_edge_fractions() {
        let set = samples(20);
        let all = split_samples(&set, &SplitParams { train_fraction: 1.0, seed: 1 }).unwrap();
        assert_eq!(all.train.len(), 20);
        assert!(all.test.is_empty());

        let none = split_samples(&set, &SplitParams { train_fraction: 0.0, seed: 1 }).unwrap();
        assert!(none.train.is_empty());
        assert_eq!(none.test.len(), 20);
    }

    #[test]
    fn test_invalid_fraction() {
        let set = samples(5);
        for bad in [-0.1, 1.5, f64::NAN] {
            let params = SplitParams { train_fraction: bad, seed: 0 };
            assert!(matches!(
                split_samples(&set, &params),
                Err(Error::InvalidParameter { .. })
            ));
        }
    }
}
