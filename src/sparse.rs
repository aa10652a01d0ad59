//! Sparse propagation operators for graph convolution.
//!
//! Graph structure is stored in compressed sparse row (CSR) form. Row `i`
//! lists the neighbors `j` whose features flow into node `i` during message
//! passing, so `(A · X)_i = Σ_j A[i, j] · X_j`.
//!
//! # Example
//!
//! ```
//! use citegnn::sparse::SparseMatrix;
//!
//! // Path graph 0 - 1 - 2, made symmetric
//! let adj = SparseMatrix::from_edge_index(&[[0, 1], [1, 2]], 3)
//!     .unwrap()
//!     .symmetrize();
//! assert_eq!(adj.nnz(), 4);
//!
//! let filter = adj.gcn_filter();
//! assert_eq!(filter.nnz(), 7); // 4 edges + 3 self-loops
//! ```

use crate::error::{GnnError, Result};

/// Square or rectangular sparse matrix in CSR layout with `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    n_rows: usize,
    n_cols: usize,
    /// Row pointer array of length `n_rows + 1`
    indptr: Vec<usize>,
    /// Column index of every stored entry, sorted within each row
    indices: Vec<usize>,
    /// Value of every stored entry
    values: Vec<f32>,
}

impl SparseMatrix {
    /// Build a matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate coordinates are summed.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if any coordinate is out of bounds.
    pub fn from_triplets(
        n_rows: usize,
        n_cols: usize,
        triplets: &[(usize, usize, f32)],
    ) -> Result<Self> {
        for &(r, c, _) in triplets {
            if r >= n_rows {
                return Err(GnnError::shape("row index bound", n_rows, r));
            }
            if c >= n_cols {
                return Err(GnnError::shape("column index bound", n_cols, c));
            }
        }

        let mut sorted = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut indptr = vec![0usize; n_rows + 1];
        let mut indices = Vec::with_capacity(sorted.len());
        let mut values: Vec<f32> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            if last == Some((r, c)) {
                if let Some(acc) = values.last_mut() {
                    *acc += v;
                }
                continue;
            }
            indices.push(c);
            values.push(v);
            indptr[r + 1] += 1;
            last = Some((r, c));
        }

        for r in 0..n_rows {
            indptr[r + 1] += indptr[r];
        }

        Ok(Self {
            n_rows,
            n_cols,
            indptr,
            indices,
            values,
        })
    }

    /// Build a binary adjacency matrix from `[row, col]` pairs.
    ///
    /// Repeated pairs collapse into a single entry of weight 1.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if a node index is `>= num_nodes`.
    pub fn from_edge_index(edges: &[[usize; 2]], num_nodes: usize) -> Result<Self> {
        let triplets: Vec<(usize, usize, f32)> =
            edges.iter().map(|e| (e[0], e[1], 1.0)).collect();
        Ok(Self::from_triplets(num_nodes, num_nodes, &triplets)?.binarize())
    }

    /// Identity matrix of size `n`.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self {
            n_rows: n,
            n_cols: n,
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Whether the matrix is square.
    #[must_use]
    pub fn is_square(&self) -> bool {
        self.n_rows == self.n_cols
    }

    /// CSR row pointers.
    #[must_use]
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    /// Column indices of stored entries.
    #[must_use]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Stored values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Column indices and values of row `i`.
    #[must_use]
    pub fn row(&self, i: usize) -> (&[usize], &[f32]) {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        (&self.indices[start..end], &self.values[start..end])
    }

    /// Row index of every stored entry, in storage order.
    #[must_use]
    pub fn entry_rows(&self) -> Vec<usize> {
        let mut rows = Vec::with_capacity(self.nnz());
        for r in 0..self.n_rows {
            rows.extend(std::iter::repeat(r).take(self.indptr[r + 1] - self.indptr[r]));
        }
        rows
    }

    /// Value at `(i, j)`, zero if not stored.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        let (cols, vals) = self.row(i);
        cols.binary_search(&j).map_or(0.0, |k| vals[k])
    }

    /// Whether `(i, j)` is a stored entry.
    #[must_use]
    pub fn contains(&self, i: usize, j: usize) -> bool {
        i < self.n_rows && self.row(i).0.binary_search(&j).is_ok()
    }

    /// Same sparsity pattern with new values.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if `values.len() != nnz()`.
    pub fn with_values(&self, values: Vec<f32>) -> Result<Self> {
        if values.len() != self.nnz() {
            return Err(GnnError::shape("stored entries", self.nnz(), values.len()));
        }
        Ok(Self {
            values,
            ..self.clone()
        })
    }

    /// Replace every stored value with 1.
    #[must_use]
    pub fn binarize(mut self) -> Self {
        self.values.iter_mut().for_each(|v| *v = 1.0);
        self
    }

    /// Transpose.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.n_cols + 1];
        for &c in &self.indices {
            counts[c + 1] += 1;
        }
        for c in 0..self.n_cols {
            counts[c + 1] += counts[c];
        }

        let mut next = counts.clone();
        let mut indices = vec![0usize; self.nnz()];
        let mut values = vec![0.0f32; self.nnz()];
        for r in 0..self.n_rows {
            for k in self.indptr[r]..self.indptr[r + 1] {
                let c = self.indices[k];
                let dst = next[c];
                indices[dst] = r;
                values[dst] = self.values[k];
                next[c] += 1;
            }
        }

        Self {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr: counts,
            indices,
            values,
        }
    }

    /// Binary union of the pattern with its transpose, so every edge
    /// becomes undirected. Values are reset to 1.
    #[must_use]
    pub fn symmetrize(&self) -> Self {
        let t = self.transpose();
        let mut triplets = Vec::with_capacity(2 * self.nnz());
        for m in [self, &t] {
            for (r, c) in m.entry_rows().into_iter().zip(m.indices.iter().copied()) {
                triplets.push((r, c, 1.0));
            }
        }
        // Both operands are square with in-bound indices.
        Self::from_triplets(self.n_rows, self.n_cols, &triplets)
            .map_or_else(|_| self.clone(), Self::binarize)
    }

    /// Whether `A == A^T` (structure and values).
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.is_square() && *self == self.transpose()
    }

    fn triplets(&self) -> Vec<(usize, usize, f32)> {
        self.entry_rows()
            .into_iter()
            .zip(self.indices.iter().copied())
            .zip(self.values.iter().copied())
            .map(|((r, c), v)| (r, c, v))
            .collect()
    }

    /// Add unit self-loops where the diagonal is not already stored.
    ///
    /// Existing diagonal entries keep their value.
    #[must_use]
    pub fn add_self_loops(&self) -> Self {
        let n = self.n_rows.min(self.n_cols);
        let mut triplets = self.triplets();
        for i in 0..n {
            if !self.contains(i, i) {
                triplets.push((i, i, 1.0));
            }
        }
        Self::from_triplets(self.n_rows, self.n_cols, &triplets).unwrap_or_else(|_| self.clone())
    }

    /// `A + I`: one is added to every diagonal entry, stored or not.
    #[must_use]
    pub fn add_identity(&self) -> Self {
        let n = self.n_rows.min(self.n_cols);
        let mut triplets = self.triplets();
        triplets.extend((0..n).map(|i| (i, i, 1.0)));
        Self::from_triplets(self.n_rows, self.n_cols, &triplets).unwrap_or_else(|_| self.clone())
    }

    /// Weighted degree (row sum) of every node.
    #[must_use]
    pub fn degrees(&self) -> Vec<f32> {
        (0..self.n_rows)
            .map(|r| self.row(r).1.iter().sum())
            .collect()
    }

    /// Symmetric normalization `D^(-1/2) A D^(-1/2)`.
    ///
    /// Isolated nodes (zero degree) get a zero scaling factor.
    #[must_use]
    pub fn normalized_adjacency(&self) -> Self {
        let inv_sqrt: Vec<f32> = self
            .degrees()
            .iter()
            .map(|&d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
            .collect();

        let rows = self.entry_rows();
        let values = self
            .values
            .iter()
            .zip(rows.iter().zip(self.indices.iter()))
            .map(|(&v, (&r, &c))| {
                let col_scale = inv_sqrt.get(c).copied().unwrap_or(0.0);
                v * inv_sqrt[r] * col_scale
            })
            .collect();

        Self {
            values,
            ..self.clone()
        }
    }

    /// Renormalized GCN filter `D̃^(-1/2) (A + I) D̃^(-1/2)` (Kipf & Welling, 2017).
    #[must_use]
    pub fn gcn_filter(&self) -> Self {
        self.add_identity().normalized_adjacency()
    }

    /// Dense product `A · X` with `X` given row-major with `cols` columns.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != n_cols * cols`.
    #[must_use]
    pub fn matmul_dense(&self, x: &[f32], cols: usize) -> Vec<f32> {
        assert_eq!(
            x.len(),
            self.n_cols * cols,
            "sparse matmul: operand has {} values, expected {}",
            x.len(),
            self.n_cols * cols
        );

        let mut out = vec![0.0f32; self.n_rows * cols];
        for r in 0..self.n_rows {
            let dst = &mut out[r * cols..(r + 1) * cols];
            for k in self.indptr[r]..self.indptr[r + 1] {
                let v = self.values[k];
                let src = &x[self.indices[k] * cols..(self.indices[k] + 1) * cols];
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d += v * s;
                }
            }
        }
        out
    }

    /// Dense product `Aᵀ · G` without materializing the transpose.
    ///
    /// # Panics
    ///
    /// Panics if `g.len() != n_rows * cols`.
    #[must_use]
    pub fn transpose_matmul_dense(&self, g: &[f32], cols: usize) -> Vec<f32> {
        assert_eq!(g.len(), self.n_rows * cols, "sparse transpose matmul shape");

        let mut out = vec![0.0f32; self.n_cols * cols];
        for r in 0..self.n_rows {
            let src = &g[r * cols..(r + 1) * cols];
            for k in self.indptr[r]..self.indptr[r + 1] {
                let v = self.values[k];
                let c = self.indices[k];
                for (d, &s) in out[c * cols..(c + 1) * cols].iter_mut().zip(src) {
                    *d += v * s;
                }
            }
        }
        out
    }

    /// Convert to a dense row-major buffer.
    #[must_use]
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0f32; self.n_rows * self.n_cols];
        for r in 0..self.n_rows {
            let (cols, vals) = self.row(r);
            for (&c, &v) in cols.iter().zip(vals) {
                dense[r * self.n_cols + c] = v;
            }
        }
        dense
    }
}
