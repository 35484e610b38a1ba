//! Random forest of CART decision trees
//!
//! Trees are grown on bootstrap samples with Gini impurity. Each split
//! evaluates a random subset of the features present in the node and sends
//! samples with `value <= threshold` to the left child.

use std::collections::BTreeSet;

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use vulnsentry_core::{Label, Result, VulnError};

use crate::tfidf::{FeatureVector, Vocabulary};

/// Forest hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// `None` grows trees until they are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Fixed seed for reproducible training
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Single decision tree stored as a node arena; the root is node 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn predict(&self, vector: &FeatureVector) -> usize {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { class } => return *class,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if vector.get(*feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children always follow their parent in the arena, so a tree that
    /// passes this check cannot loop or index out of bounds.
    fn validate(&self, n_classes: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { class } if *class >= n_classes => {
                    return Err(format!("node {} votes for unknown class {}", index, class));
                }
                TreeNode::Split { left, right, .. }
                    if [*left, *right]
                        .iter()
                        .any(|&child| child <= index || child >= self.nodes.len()) =>
                {
                    return Err(format!("node {} has an out-of-range child", index));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    vectors: &'a [FeatureVector],
    targets: &'a [usize],
    n_classes: usize,
    max_features: usize,
    config: &'a ForestConfig,
    nodes: Vec<TreeNode>,
}

impl<'a> TreeBuilder<'a> {
    fn build(mut self, samples: Vec<usize>, rng: &mut StdRng) -> DecisionTree {
        self.grow(samples, 0, rng);
        DecisionTree { nodes: self.nodes }
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(&samples);
        let index = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            class: majority(&counts),
        });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_small = samples.len() < self.config.min_samples_split;
        let too_deep = self.config.max_depth.is_some_and(|max| depth >= max);
        if pure || too_small || too_deep {
            return index;
        }

        let Some(best) = self.best_split(&samples, rng) else {
            return index;
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&s| self.vectors[s].get(best.feature) <= best.threshold);

        let left = self.grow(left_samples, depth + 1, rng);
        let right = self.grow(right_samples, depth + 1, rng);
        self.nodes[index] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        index
    }

    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &s in samples {
            counts[self.targets[s]] += 1;
        }
        counts
    }

    /// Evaluate shuffled features until `max_features` of them yielded a
    /// valid split, keeping the lowest weighted Gini impurity.
    fn best_split(&self, samples: &[usize], rng: &mut StdRng) -> Option<Candidate> {
        let present: BTreeSet<usize> = samples
            .iter()
            .flat_map(|&s| self.vectors[s].entries().iter().map(|(f, _)| *f))
            .collect();
        let mut features: Vec<usize> = present.into_iter().collect();
        features.shuffle(rng);

        let mut best: Option<Candidate> = None;
        let mut evaluated = 0;
        for feature in features {
            if evaluated >= self.max_features {
                break;
            }
            let Some(candidate) = self.best_threshold(samples, feature) else {
                continue;
            };
            evaluated += 1;
            if best.as_ref().is_none_or(|b| candidate.impurity < b.impurity) {
                best = Some(candidate);
            }
        }
        best
    }

    fn best_threshold(&self, samples: &[usize], feature: usize) -> Option<Candidate> {
        let mut points: Vec<(f64, usize)> = samples
            .iter()
            .map(|&s| (self.vectors[s].get(feature), self.targets[s]))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total = points.len();
        let mut right_counts = vec![0usize; self.n_classes];
        for &(_, class) in &points {
            right_counts[class] += 1;
        }
        let mut left_counts = vec![0usize; self.n_classes];

        let mut best: Option<Candidate> = None;
        for i in 0..total - 1 {
            let (value, class) = points[i];
            left_counts[class] += 1;
            right_counts[class] -= 1;

            let next = points[i + 1].0;
            if value >= next {
                continue;
            }

            let n_left = i + 1;
            let n_right = total - n_left;
            let impurity = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / total as f64;

            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                let mid = value + (next - value) / 2.0;
                let threshold = if mid < next { mid } else { value };
                best = Some(Candidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Index of the largest count; ties go to the lowest index.
fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (index, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = index;
        }
    }
    best
}

/// Trained random forest classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    /// Vocabulary (training run) the forest was fitted against
    pub vocabulary_id: String,
    pub config: ForestConfig,
    /// Sorted distinct labels; leaves store indices into this list
    classes: Vec<Label>,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on `vectors` produced by `vocabulary`.
    pub fn fit(
        config: &ForestConfig,
        vectors: &[FeatureVector],
        labels: &[Label],
        vocabulary: &Vocabulary,
    ) -> Result<Self> {
        if config.n_trees == 0 {
            return Err(VulnError::InvalidConfig(
                "n_trees must be at least 1".to_string(),
            ));
        }
        if vectors.is_empty() {
            return Err(VulnError::EmptyTrainingSet);
        }
        if vectors.len() != labels.len() {
            return Err(VulnError::Dataset(format!(
                "{} feature vectors but {} labels",
                vectors.len(),
                labels.len()
            )));
        }
        if let Some(foreign) = vectors
            .iter()
            .find(|v| v.vocabulary_id != vocabulary.run_id)
        {
            return Err(VulnError::VocabularyMismatch {
                expected: vocabulary.run_id.clone(),
                found: foreign.vocabulary_id.clone(),
            });
        }

        let classes: Vec<Label> = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let targets: Vec<usize> = labels
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or_default())
            .collect();

        let n_features = vocabulary.len();
        let max_features = ((n_features as f64).sqrt().ceil() as usize).max(1);

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let n = vectors.len();
        let mut trees = Vec::with_capacity(config.n_trees);
        for _ in 0..config.n_trees {
            let mut tree_rng = StdRng::seed_from_u64(rng.random());
            let bootstrap: Vec<usize> = (0..n).map(|_| tree_rng.random_range(0..n)).collect();

            let builder = TreeBuilder {
                vectors,
                targets: &targets,
                n_classes: classes.len(),
                max_features,
                config,
                nodes: Vec::new(),
            };
            trees.push(builder.build(bootstrap, &mut tree_rng));
        }

        log::info!(
            "Trained random forest: {} trees, {} classes, {} samples, {} features",
            trees.len(),
            classes.len(),
            n,
            n_features
        );
        log::debug!(
            "Forest shape: {} nodes in total, deepest tree {} levels",
            trees.iter().map(DecisionTree::node_count).sum::<usize>(),
            trees.iter().map(DecisionTree::depth).max().unwrap_or_default()
        );

        Ok(Self {
            vocabulary_id: vocabulary.run_id.clone(),
            config: config.clone(),
            classes,
            n_features,
            trees,
        })
    }

    /// Check the structure of a forest read back from disk.
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() || self.classes.is_empty() {
            return Err(VulnError::ModelNotLoaded(
                "random forest has no trained trees".to_string(),
            ));
        }
        for (index, tree) in self.trees.iter().enumerate() {
            tree.validate(self.classes.len()).map_err(|detail| {
                VulnError::ModelNotLoaded(format!("classifier tree {} is corrupt: {}", index, detail))
            })?;
        }
        Ok(())
    }

    /// Majority vote over all trees. Ties go to the smallest label.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Label> {
        if self.trees.is_empty() || self.classes.is_empty() {
            return Err(VulnError::ModelNotLoaded(
                "random forest has no trained trees".to_string(),
            ));
        }
        if vector.vocabulary_id != self.vocabulary_id {
            return Err(VulnError::VocabularyMismatch {
                expected: self.vocabulary_id.clone(),
                found: vector.vocabulary_id.clone(),
            });
        }

        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(vector)] += 1;
        }
        Ok(self.classes[majority(&votes)].clone())
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }
}
