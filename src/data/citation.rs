//! Citation network loader (Cora, CiteSeer).
//!
//! Reads the LINQS text format:
//!
//! - `<name>.content`: one paper per line,
//!   `<paper_id> <word_1> … <word_F> <class_label>` with binary word flags
//! - `<name>.cites`: one citation per line, `<cited_id> <citing_id>`
//!
//! Citations are treated as undirected edges. Citations that mention a
//! paper missing from the content file are skipped. Node order follows the
//! content file; class indices follow the sorted class names.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Dataset, Mask, Transform};
use crate::autograd::Tensor;
use crate::error::{GnnError, Result};
use crate::sparse::SparseMatrix;

/// Planetoid-style split sizes (Yang et al., 2016).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetoidSplit {
    /// Labelled training nodes per class
    pub train_per_class: usize,
    pub num_val: usize,
    pub num_test: usize,
    /// Seed of the node shuffle
    pub seed: u64,
}

impl Default for PlanetoidSplit {
    fn default() -> Self {
        Self {
            train_per_class: 20,
            num_val: 500,
            num_test: 1000,
            seed: 0,
        }
    }
}

impl PlanetoidSplit {
    /// Draw train/validation/test masks.
    ///
    /// Nodes are visited in a seeded random order: the first
    /// `train_per_class` nodes of every class go to training, then
    /// `num_val` of the remaining nodes to validation and `num_test` to
    /// test. Sizes clamp to the available nodes.
    #[must_use]
    pub fn masks(&self, labels: &[usize], num_classes: usize) -> (Mask, Mask, Mask) {
        let n = labels.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let mut per_class = vec![0usize; num_classes];
        let mut train = vec![false; n];
        let mut rest = Vec::with_capacity(n);
        for &i in &order {
            let c = labels[i];
            if c < num_classes && per_class[c] < self.train_per_class {
                per_class[c] += 1;
                train[i] = true;
            } else {
                rest.push(i);
            }
        }

        let mut val = vec![false; n];
        let mut test = vec![false; n];
        let (val_nodes, remaining) = rest.split_at(self.num_val.min(rest.len()));
        for &i in val_nodes {
            val[i] = true;
        }
        for &i in remaining.iter().take(self.num_test) {
            test[i] = true;
        }

        (Mask::new(train), Mask::new(val), Mask::new(test))
    }
}

/// Loader for one citation dataset directory.
#[derive(Debug, Clone)]
pub struct Citation {
    dir: PathBuf,
    name: String,
    split: PlanetoidSplit,
}

impl Citation {
    /// Loader for `<dir>/<name>.content` and `<dir>/<name>.cites`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.to_string(),
            split: PlanetoidSplit::default(),
        }
    }

    /// Use a custom split.
    #[must_use]
    pub fn with_split(mut self, split: PlanetoidSplit) -> Self {
        self.split = split;
        self
    }

    /// Load with the default split and apply `transforms`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a file cannot be read, `Parse` if it is malformed.
    pub fn load(dir: impl AsRef<Path>, name: &str, transforms: &[Transform]) -> Result<Dataset> {
        Self::new(dir, name).read(transforms)
    }

    /// Read both files, build the dataset and apply `transforms`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a file cannot be read, `Parse` if it is malformed.
    pub fn read(&self, transforms: &[Transform]) -> Result<Dataset> {
        let content_path = self.dir.join(format!("{}.content", self.name));
        let cites_path = self.dir.join(format!("{}.cites", self.name));

        let content = parse_content(&content_path, &fs::read_to_string(&content_path)?)?;
        let edges = parse_cites(
            &cites_path,
            &fs::read_to_string(&cites_path)?,
            &content.index,
        )?;

        let n = content.labels.len();
        let adjacency = SparseMatrix::from_edge_index(&edges, n)?.symmetrize();
        let num_classes = content.classes.len();
        let (train, val, test) = self.split.masks(&content.labels, num_classes);

        info!(
            dataset = %self.name,
            nodes = n,
            features = content.num_features,
            classes = num_classes,
            edges = adjacency.nnz() / 2,
            train = train.count(),
            val = val.count(),
            test = test.count(),
            "loaded citation dataset"
        );

        let features = Tensor::from_vec(content.features, &[n, content.num_features]);
        Dataset::new(
            self.name.clone(),
            features,
            adjacency,
            content.labels,
            num_classes,
            train,
            val,
            test,
        )?
        .transform(transforms)
    }
}

struct Content {
    index: HashMap<String, usize>,
    features: Vec<f32>,
    num_features: usize,
    labels: Vec<usize>,
    classes: Vec<String>,
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> GnnError {
    GnnError::Parse {
        file: path.display().to_string(),
        line,
        message: message.into(),
    }
}

fn parse_content(path: &Path, text: &str) -> Result<Content> {
    let mut index = HashMap::new();
    let mut features = Vec::new();
    let mut num_features = None;
    let mut raw_labels = Vec::new();

    for (lineno, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l)) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 3 {
            return Err(parse_error(path, lineno, "expected id, features and label"));
        }

        let width = fields.len() - 2;
        match num_features {
            None => num_features = Some(width),
            Some(f) if f != width => {
                return Err(parse_error(
                    path,
                    lineno,
                    format!("expected {f} features, found {width}"),
                ));
            }
            Some(_) => {}
        }

        let id = fields[0];
        if index.insert(id.to_string(), raw_labels.len()).is_some() {
            return Err(parse_error(path, lineno, format!("duplicate paper id {id}")));
        }
        for field in &fields[1..=width] {
            let value: f32 = field.parse().map_err(|_| {
                parse_error(path, lineno, format!("invalid feature value {field:?}"))
            })?;
            features.push(value);
        }
        raw_labels.push(fields[width + 1].to_string());
    }

    let num_features =
        num_features.ok_or_else(|| parse_error(path, 0, "no papers in content file"))?;
    let classes: Vec<String> = raw_labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let class_index: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let labels = raw_labels
        .iter()
        .map(|c| class_index[c.as_str()])
        .collect();

    Ok(Content {
        index,
        features,
        num_features,
        labels,
        classes,
    })
}

fn parse_cites(path: &Path, text: &str, index: &HashMap<String, usize>) -> Result<Vec<[usize; 2]>> {
    let mut edges = Vec::new();
    let mut skipped = 0usize;

    for (lineno, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l)) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => {}
            [cited, citing] => match (index.get(*citing), index.get(*cited)) {
                (Some(&src), Some(&dst)) => edges.push([src, dst]),
                _ => skipped += 1,
            },
            _ => {
                return Err(parse_error(path, lineno, "expected two paper ids"));
            }
        }
    }

    if skipped > 0 {
        debug!(skipped, "citations referencing unknown papers skipped");
    }
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LayerKind;
    use std::io::Write;

    fn write_dataset(dir: &Path, content: &str, cites: &str) {
        let mut f = fs::File::create(dir.join("toy.content")).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        let mut f = fs::File::create(dir.join("toy.cites")).unwrap();
        f.write_all(cites.as_bytes()).unwrap();
    }

    const CONTENT: &str = "\
p1\t1\t0\t0\tTheory
p2\t0\t1\t0\tNeural_Networks
p3\t0\t1\t1\tNeural_Networks
p4\t1\t1\t0\tTheory
";

    const CITES: &str = "\
p1\tp2
p2\tp3
p3\tp4
p9\tp1
";

    #[test]
    fn test_load_toy_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), CONTENT, CITES);

        let split = PlanetoidSplit {
            train_per_class: 1,
            num_val: 1,
            num_test: 1,
            seed: 3,
        };
        let ds = Citation::new(dir.path(), "toy")
            .with_split(split)
            .read(&[])
            .unwrap();

        assert_eq!(ds.num_nodes(), 4);
        assert_eq!(ds.num_features(), 3);
        assert_eq!(ds.num_classes(), 2);
        // Classes sort as Neural_Networks, Theory
        assert_eq!(ds.labels(), &[1, 0, 0, 1]);
        // Three undirected citations; the one to p9 is skipped
        assert_eq!(ds.num_edges(), 6);
        assert!(ds.operator().is_symmetric());
        assert_eq!(ds.features().row(2), &[0.0, 1.0, 1.0]);

        assert_eq!(ds.train_mask().count(), 2);
        assert_eq!(ds.val_mask().count(), 1);
        assert_eq!(ds.test_mask().count(), 1);
    }

    #[test]
    fn test_load_applies_transforms() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), CONTENT, CITES);

        let ds = Citation::load(
            dir.path(),
            "toy",
            &[Transform::LayerPreprocess(LayerKind::Gat)],
        )
        .unwrap();
        assert_eq!(ds.num_edges(), 6 + 4);
    }

    #[test]
    fn test_inconsistent_feature_width() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), "p1 1 0 A\np2 1 B\n", "");
        let err = Citation::load(dir.path(), "toy", &[]).unwrap_err();
        assert!(matches!(err, GnnError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_malformed_cites() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), CONTENT, "p1 p2 p3\n");
        let err = Citation::load(dir.path(), "toy", &[]).unwrap_err();
        assert!(matches!(err, GnnError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = Citation::load(dir.path(), "cora", &[]).unwrap_err();
        assert!(matches!(err, GnnError::Io(_)));
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let labels: Vec<usize> = (0..60).map(|i| i % 3).collect();
        let split = PlanetoidSplit {
            train_per_class: 5,
            num_val: 10,
            num_test: 100,
            seed: 42,
        };
        let (tr, va, te) = split.masks(&labels, 3);
        assert_eq!(tr.count(), 15);
        assert_eq!(va.count(), 10);
        // Test clamps to the 35 remaining nodes
        assert_eq!(te.count(), 35);
        assert!(tr.is_disjoint(&va) && tr.is_disjoint(&te) && va.is_disjoint(&te));

        for c in 0..3 {
            assert_eq!(tr.indices().iter().filter(|&&i| labels[i] == c).count(), 5);
        }
        assert_eq!(split.masks(&labels, 3), (tr, va, te));
    }
}
