//! Small generated datasets for tests and offline runs.
//!
//! - [`path_graph`]: a path `0 - 1 - … - (N-1)` with labels in contiguous
//!   blocks, the smallest end-to-end fixture
//! - [`PlantedPartition`]: a stochastic block model whose features are
//!   correlated with the class, learnable by both model families

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Dataset, Mask};
use crate::autograd::Tensor;
use crate::error::{check_positive, GnnError, Result};
use crate::sparse::SparseMatrix;

/// Path graph over `num_nodes` nodes with seeded uniform features.
///
/// Labels are `i · C / N`; even nodes are training nodes, nodes `≡ 1 (mod 4)`
/// validation nodes and nodes `≡ 3 (mod 4)` test nodes.
///
/// # Errors
///
/// Returns `Config` if any size is zero or there are fewer nodes than classes.
pub fn path_graph(
    num_nodes: usize,
    num_features: usize,
    num_classes: usize,
    seed: u64,
) -> Result<Dataset> {
    check_positive("num_nodes", num_nodes)?;
    check_positive("num_features", num_features)?;
    check_positive("num_classes", num_classes)?;
    if num_nodes < num_classes {
        return Err(GnnError::config(
            "num_nodes",
            num_nodes,
            "at least one node per class",
        ));
    }

    let edges: Vec<[usize; 2]> = (1..num_nodes).map(|i| [i - 1, i]).collect();
    let adjacency = SparseMatrix::from_edge_index(&edges, num_nodes)?.symmetrize();

    let mut rng = StdRng::seed_from_u64(seed);
    let features: Vec<f32> = (0..num_nodes * num_features)
        .map(|_| rng.gen::<f32>())
        .collect();
    let labels = (0..num_nodes).map(|i| i * num_classes / num_nodes).collect();

    let pick = |keep: fn(usize) -> bool| Mask::new((0..num_nodes).map(keep).collect());
    Dataset::new(
        "path",
        Tensor::from_vec(features, &[num_nodes, num_features]),
        adjacency,
        labels,
        num_classes,
        pick(|i| i % 2 == 0),
        pick(|i| i % 4 == 1),
        pick(|i| i % 4 == 3),
    )
}

/// Stochastic block model with class-correlated binary features.
///
/// Nodes of the same class connect with probability `p_in`, nodes of
/// different classes with `p_out`. Feature `j` belongs to class `j mod C`
/// and is switched on with probability `signal` for nodes of that class and
/// `noise` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantedPartition {
    pub nodes_per_class: usize,
    pub num_classes: usize,
    pub num_features: usize,
    pub p_in: f64,
    pub p_out: f64,
    pub signal: f64,
    pub noise: f64,
    pub train_per_class: usize,
    pub num_val: usize,
    pub seed: u64,
}

impl Default for PlantedPartition {
    fn default() -> Self {
        Self {
            nodes_per_class: 40,
            num_classes: 3,
            num_features: 24,
            p_in: 0.15,
            p_out: 0.01,
            signal: 0.5,
            noise: 0.05,
            train_per_class: 10,
            num_val: 30,
            seed: 0,
        }
    }
}

impl PlantedPartition {
    /// Generate the dataset.
    ///
    /// Nodes are shuffled before the split: the first `train_per_class`
    /// nodes of every class train, the next `num_val` validate, the rest test.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a size is zero or a probability is outside [0, 1].
    pub fn generate(&self) -> Result<Dataset> {
        check_positive("nodes_per_class", self.nodes_per_class)?;
        check_positive("num_classes", self.num_classes)?;
        check_positive("num_features", self.num_features)?;
        for (name, p) in [
            ("p_in", self.p_in),
            ("p_out", self.p_out),
            ("signal", self.signal),
            ("noise", self.noise),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(GnnError::config(name, p, "a probability in [0, 1]"));
            }
        }

        let n = self.nodes_per_class * self.num_classes;
        let labels: Vec<usize> = (0..n).map(|i| i / self.nodes_per_class).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut edges = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                let p = if labels[i] == labels[j] {
                    self.p_in
                } else {
                    self.p_out
                };
                if rng.gen_bool(p) {
                    edges.push([i, j]);
                }
            }
        }
        let adjacency = SparseMatrix::from_edge_index(&edges, n)?.symmetrize();

        let mut features = Vec::with_capacity(n * self.num_features);
        for &y in &labels {
            for j in 0..self.num_features {
                let p = if j % self.num_classes == y {
                    self.signal
                } else {
                    self.noise
                };
                features.push(if rng.gen_bool(p) { 1.0 } else { 0.0 });
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let mut per_class = vec![0usize; self.num_classes];
        let (mut train, mut val, mut test) = (vec![false; n], vec![false; n], vec![false; n]);
        let mut val_left = self.num_val;
        for i in order {
            let c = labels[i];
            if per_class[c] < self.train_per_class {
                per_class[c] += 1;
                train[i] = true;
            } else if val_left > 0 {
                val_left -= 1;
                val[i] = true;
            } else {
                test[i] = true;
            }
        }

        Dataset::new(
            "planted_partition",
            Tensor::from_vec(features, &[n, self.num_features]),
            adjacency,
            labels,
            self.num_classes,
            Mask::new(train),
            Mask::new(val),
            Mask::new(test),
        )
    }
}
