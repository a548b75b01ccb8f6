//! CART classification tree with Gini impurity
//!
//! Nodes live in a flat arena; a split sends `x[feature] <= threshold`
//! to the left child. Trees grow from an explicit work stack, so depth
//! is bounded by memory rather than the call stack.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// Growth limits for one tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    /// Features tried at each split, drawn without replacement
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        class: u8,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted classification tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Pending {
    node: usize,
    indices: Vec<usize>,
    depth: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Count-weighted child impurity, n_left * gini_left + n_right * gini_right
    weighted_impurity: f64,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Class with the most votes; ties go to the lowest class id
pub(crate) fn majority(counts: &[usize]) -> u8 {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best as u8
}

fn class_counts(labels: &[u8], indices: &[usize], num_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; num_classes];
    for &i in indices {
        counts[usize::from(labels[i])] += 1;
    }
    counts
}

impl DecisionTree {
    /// Grow a tree on the rows of `features` listed in `indices`.
    ///
    /// `indices` may repeat rows (bootstrap draws). Labels must be below
    /// `num_classes`. The impurity decrease of every accepted split is
    /// added to `importance[feature]`.
    pub fn fit(
        features: ArrayView2<'_, f64>,
        labels: &[u8],
        indices: Vec<usize>,
        num_classes: usize,
        params: &TreeParams,
        rng: &mut StdRng,
        importance: &mut [f64],
    ) -> Self {
        let n_features = features.ncols();
        let max_features = params.max_features.clamp(1, n_features.max(1));

        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut stack = vec![Pending {
            node: 0,
            indices,
            depth: 0,
        }];

        while let Some(Pending {
            node,
            indices,
            depth,
        }) = stack.pop()
        {
            let counts = class_counts(labels, &indices, num_classes);
            let leaf = Node::Leaf {
                class: majority(&counts),
            };

            let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
            let too_deep = params.max_depth.is_some_and(|d| depth >= d);
            if pure || too_deep || indices.len() < params.min_samples_split.max(2) || n_features == 0 {
                nodes[node] = leaf;
                continue;
            }

            let parent = gini(&counts, indices.len()) * indices.len() as f64;
            let candidates = index::sample(rng, n_features, max_features);
            let best = candidates
                .iter()
                .filter_map(|f| best_threshold(features, labels, &indices, f, num_classes, params.min_samples_leaf))
                .fold(None::<BestSplit>, |best, split| match best {
                    Some(b) if b.weighted_impurity <= split.weighted_impurity => Some(b),
                    _ => Some(split),
                });

            let Some(split) = best.filter(|s| parent - s.weighted_impurity > 1e-12) else {
                nodes[node] = leaf;
                continue;
            };

            importance[split.feature] += parent - split.weighted_impurity;

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| features[[i, split.feature]] <= split.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { class: 0 });
            nodes.push(Node::Leaf { class: 0 });
            nodes[node] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            stack.push(Pending {
                node: right,
                indices: right_idx,
                depth: depth + 1,
            });
            stack.push(Pending {
                node: left,
                indices: left_idx,
                depth: depth + 1,
            });
        }

        Self { nodes }
    }

    /// Class of one feature vector.
    ///
    /// Panics if `features` is shorter than the feature count the tree was
    /// fitted on.
    pub fn predict(&self, features: &[f64]) -> u8 {
        let mut node = 0;
        loop {
            match self.nodes[node] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Longest root-to-leaf path, in edges
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = self.nodes[node] {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        deepest
    }
}

/// Best midpoint threshold on one feature, or `None` if the feature is
/// constant over `indices` or no cut respects `min_samples_leaf`.
fn best_threshold(
    features: ArrayView2<'_, f64>,
    labels: &[u8],
    indices: &[usize],
    feature: usize,
    num_classes: usize,
    min_samples_leaf: usize,
) -> Option<BestSplit> {
    let mut sorted: Vec<(f64, u8)> = indices
        .iter()
        .map(|&i| (features[[i, feature]], labels[i]))
        .collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = sorted.len();
    let min_leaf = min_samples_leaf.max(1);
    let mut right_counts = vec![0usize; num_classes];
    for &(_, label) in &sorted {
        right_counts[usize::from(label)] += 1;
    }
    let mut left_counts = vec![0usize; num_classes];

    let mut best: Option<BestSplit> = None;
    for i in 0..n.saturating_sub(1) {
        let (value, label) = sorted[i];
        left_counts[usize::from(label)] += 1;
        right_counts[usize::from(label)] -= 1;

        let next = sorted[i + 1].0;
        if value >= next {
            continue;
        }
        let n_left = i + 1;
        let n_right = n - n_left;
        if n_left < min_leaf || n_right < min_leaf {
            continue;
        }

        let weighted = gini(&left_counts, n_left) * n_left as f64 + gini(&right_counts, n_right) * n_right as f64;
        if best.as_ref().map_or(true, |b| weighted < b.weighted_impurity) {
            let mut threshold = value + (next - value) / 2.0;
            if threshold >= next {
                threshold = value;
            }
            best = Some(BestSplit {
                feature,
                threshold,
                weighted_impurity: weighted,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_features: 2,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    #[test]
    fn test_separable_data() {
        let x = array![[0.1, 5.0], [0.2, 5.0], [0.3, 5.0], [0.8, 5.0], [0.9, 5.0], [1.0, 5.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut rng = StdRng::seed_from_u64(1);
        let mut importance = vec![0.0; 2];

        let tree = DecisionTree::fit(x.view(), &y, (0..6).collect(), 2, &params(), &mut rng, &mut importance);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[0.25, 5.0]), 0);
        assert_eq!(tree.predict(&[0.95, 5.0]), 1);
        // Threshold is the midpoint between 0.3 and 0.8
        assert_eq!(tree.predict(&[0.55, 5.0]), 0);
        assert_eq!(tree.predict(&[0.56, 5.0]), 1);
        assert!(importance[0] > 0.0);
        assert_eq!(importance[1], 0.0);
    }

    #[test]
    fn test_identical_features_make_a_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [2, 1, 2];
        let mut rng = StdRng::seed_from_u64(0);
        let mut importance = vec![0.0];
        let tree = DecisionTree::fit(x.view(), &y, vec![0, 1, 2], 3, &params(), &mut rng, &mut importance);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.predict(&[1.0]), 2);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0]];
        let y = [0, 1, 0, 1, 0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(0);
        let mut importance = vec![0.0];
        let limited = TreeParams {
            max_depth: Some(2),
            ..params()
        };
        let tree = DecisionTree::fit(x.view(), &y, (0..8).collect(), 2, &limited, &mut rng, &mut importance);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [1, 0, 0, 0];
        let mut rng = StdRng::seed_from_u64(0);
        let mut importance = vec![0.0];
        let p = TreeParams {
            min_samples_leaf: 2,
            ..params()
        };
        let tree = DecisionTree::fit(x.view(), &y, (0..4).collect(), 2, &p, &mut rng, &mut importance);
        // The only pure cut would leave a single sample on the left
        assert_eq!(tree.predict(&[0.0]), 0);
    }

    #[test]
    fn test_majority_tie_goes_to_lowest_class() {
        assert_eq!(majority(&[0, 3, 3, 1]), 1);
        assert_eq!(majority(&[2, 2]), 0);
    }
}
