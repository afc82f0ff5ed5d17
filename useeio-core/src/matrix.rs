//! Labelled dense matrices and vectors.
//!
//! Every table in an EEIO model is keyed by sector codes on at least one axis.
//! [`LabeledMatrix`] pairs an [`ndarray::Array2`] with its row and column labels so
//! that products and assignments can verify label alignment before any arithmetic
//! is done. A label disagreement is always a [`EEIOError::DimensionMismatch`],
//! never a silent reindex.
//!
//! # Examples
//!
//! ```rust
//! use useeio_core::matrix::LabeledMatrix;
//!
//! let z = LabeledMatrix::from_rows(
//!     "Use",
//!     &["A/US", "B/US"],
//!     &["A/US", "B/US"],
//!     vec![vec![10.0, 5.0], vec![3.0, 2.0]],
//! )
//! .unwrap();
//! assert_eq!(z.get("B/US", "A/US"), Some(3.0));
//! assert_eq!(z.row_sums().to_vec(), vec![15.0, 5.0]);
//! ```

use crate::errors::{EEIOError, EEIOResult};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn ensure_unique(context: &str, labels: &[String]) -> EEIOResult<()> {
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(EEIOError::Configuration(format!(
                "duplicate label '{}' in {}",
                label, context
            )));
        }
    }
    Ok(())
}

fn to_labels(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

/// A dense matrix with string labels on both axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMatrix {
    name: String,
    rows: Vec<String>,
    cols: Vec<String>,
    values: Array2<f64>,
}

impl LabeledMatrix {
    /// Create a new matrix, checking that the labels match the shape and are unique
    pub fn new(
        name: impl Into<String>,
        rows: Vec<String>,
        cols: Vec<String>,
        values: Array2<f64>,
    ) -> EEIOResult<Self> {
        let name = name.into();
        if values.dim() != (rows.len(), cols.len()) {
            return Err(EEIOError::mismatch(
                format!("construction of {}", name),
                (rows.len(), cols.len()),
                values.dim(),
            ));
        }
        ensure_unique(&format!("rows of {}", name), &rows)?;
        ensure_unique(&format!("columns of {}", name), &cols)?;
        Ok(Self {
            name,
            rows,
            cols,
            values,
        })
    }

    pub fn zeros(name: impl Into<String>, rows: Vec<String>, cols: Vec<String>) -> EEIOResult<Self> {
        let values = Array2::zeros((rows.len(), cols.len()));
        Self::new(name, rows, cols, values)
    }

    /// Identity matrix over a single label set
    pub fn identity(name: impl Into<String>, labels: Vec<String>) -> EEIOResult<Self> {
        let values = Array2::eye(labels.len());
        Self::new(name, labels.clone(), labels, values)
    }

    /// Build from nested row vectors.
    pub fn from_rows(
        name: impl Into<String>,
        rows: &[&str],
        cols: &[&str],
        data: Vec<Vec<f64>>,
    ) -> EEIOResult<Self> {
        let name = name.into();
        if data.len() != rows.len() || data.iter().any(|r| r.len() != cols.len()) {
            return Err(EEIOError::mismatch(
                format!("construction of {}", name),
                (rows.len(), cols.len()),
                data.iter().map(|r| r.len()).collect::<Vec<_>>(),
            ));
        }
        let flat: Vec<f64> = data.into_iter().flatten().collect();
        let values = Array2::from_shape_vec((rows.len(), cols.len()), flat)
            .map_err(|e| EEIOError::Error(e.to_string()))?;
        Self::new(name, to_labels(rows), to_labels(cols), values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn cols(&self) -> &[String] {
        &self.cols
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    pub fn row_index(&self, label: &str) -> Option<usize> {
        self.rows.iter().position(|r| r == label)
    }

    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.cols.iter().position(|c| c == label)
    }

    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        Some(self.values[[self.row_index(row)?, self.col_index(col)?]])
    }

    pub fn set(&mut self, row: &str, col: &str, value: f64) -> EEIOResult<()> {
        match (self.row_index(row), self.col_index(col)) {
            (Some(i), Some(j)) => {
                self.values[[i, j]] = value;
                Ok(())
            }
            _ => Err(EEIOError::Error(format!(
                "cell ({}, {}) not found in {}",
                row, col, self.name
            ))),
        }
    }

    pub fn row(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        self.row_index(label).map(|i| self.values.row(i))
    }

    pub fn col(&self, label: &str) -> Option<ArrayView1<'_, f64>> {
        self.col_index(label).map(|j| self.values.column(j))
    }

    pub fn row_sums(&self) -> Array1<f64> {
        self.values.sum_axis(Axis(1))
    }

    pub fn col_sums(&self) -> Array1<f64> {
        self.values.sum_axis(Axis(0))
    }

    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Row sums as a vector labelled by this matrix's rows
    pub fn row_totals(&self, name: impl Into<String>) -> LabeledVector {
        LabeledVector {
            name: name.into(),
            labels: self.rows.clone(),
            values: self.row_sums(),
        }
    }

    /// Column sums as a vector labelled by this matrix's columns
    pub fn col_totals(&self, name: impl Into<String>) -> LabeledVector {
        LabeledVector {
            name: name.into(),
            labels: self.cols.clone(),
            values: self.col_sums(),
        }
    }

    pub fn transpose(&self) -> Self {
        Self {
            name: format!("t({})", self.name),
            rows: self.cols.clone(),
            cols: self.rows.clone(),
            values: self.values.t().to_owned(),
        }
    }

    /// Matrix product `self · other`.
    ///
    /// The column labels of `self` must equal the row labels of `other`, in order.
    pub fn dot(&self, other: &LabeledMatrix, name: impl Into<String>) -> EEIOResult<Self> {
        if self.cols != other.rows {
            return Err(EEIOError::mismatch(
                format!("product {} x {}", self.name, other.name),
                &self.cols,
                &other.rows,
            ));
        }
        Ok(Self {
            name: name.into(),
            rows: self.rows.clone(),
            cols: other.cols.clone(),
            values: self.values.dot(&other.values),
        })
    }

    /// Matrix-vector product `self · v`, labelled by this matrix's rows
    pub fn dot_vector(&self, v: &LabeledVector, name: impl Into<String>) -> EEIOResult<LabeledVector> {
        if self.cols != v.labels {
            return Err(EEIOError::mismatch(
                format!("product {} x {}", self.name, v.name),
                &self.cols,
                &v.labels,
            ));
        }
        Ok(LabeledVector {
            name: name.into(),
            labels: self.rows.clone(),
            values: self.values.dot(&v.values),
        })
    }

    /// Right-multiply by `diag(v)`, i.e. scale column `j` by `v[j]`
    pub fn scale_columns(&self, v: &LabeledVector, name: impl Into<String>) -> EEIOResult<Self> {
        if self.cols != v.labels {
            return Err(EEIOError::mismatch(
                format!("column scaling of {} by {}", self.name, v.name),
                &self.cols,
                &v.labels,
            ));
        }
        let mut values = self.values.clone();
        for (mut column, factor) in values.axis_iter_mut(Axis(1)).zip(v.values.iter()) {
            column *= *factor;
        }
        Ok(Self {
            name: name.into(),
            rows: self.rows.clone(),
            cols: self.cols.clone(),
            values,
        })
    }

    /// Elementwise `self - other` with identical labels
    pub fn subtract(&self, other: &LabeledMatrix, name: impl Into<String>) -> EEIOResult<Self> {
        self.ensure_same_labels(other)?;
        Ok(Self {
            name: name.into(),
            rows: self.rows.clone(),
            cols: self.cols.clone(),
            values: &self.values - &other.values,
        })
    }

    pub fn ensure_same_labels(&self, other: &LabeledMatrix) -> EEIOResult<()> {
        self.ensure_labels(&other.rows, &other.cols)
    }

    /// Check that the labels of this matrix are exactly `rows` and `cols`, in order
    pub fn ensure_labels(&self, rows: &[String], cols: &[String]) -> EEIOResult<()> {
        if self.rows != rows {
            return Err(EEIOError::mismatch(
                format!("row labels of {}", self.name),
                rows,
                &self.rows,
            ));
        }
        if self.cols != cols {
            return Err(EEIOError::mismatch(
                format!("column labels of {}", self.name),
                cols,
                &self.cols,
            ));
        }
        Ok(())
    }

    /// Add row `source` into row `target` and zero `source`
    pub fn merge_rows(&mut self, target: usize, source: usize) {
        let source_row = self.values.row(source).to_owned();
        let mut target_row = self.values.row_mut(target);
        target_row += &source_row;
        self.values.row_mut(source).fill(0.0);
    }

    /// Add column `source` into column `target` and zero `source`
    pub fn merge_cols(&mut self, target: usize, source: usize) {
        let source_col = self.values.column(source).to_owned();
        let mut target_col = self.values.column_mut(target);
        target_col += &source_col;
        self.values.column_mut(source).fill(0.0);
    }

    /// Remove the row with the given label, returning whether it was present
    pub fn remove_row(&mut self, label: &str) -> bool {
        match self.row_index(label) {
            Some(i) => {
                let keep: Vec<usize> = (0..self.nrows()).filter(|&r| r != i).collect();
                self.values = self.values.select(Axis(0), &keep);
                self.rows.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove the column with the given label, returning whether it was present
    pub fn remove_col(&mut self, label: &str) -> bool {
        match self.col_index(label) {
            Some(j) => {
                let keep: Vec<usize> = (0..self.ncols()).filter(|&c| c != j).collect();
                self.values = self.values.select(Axis(1), &keep);
                self.cols.remove(j);
                true
            }
            None => false,
        }
    }

    /// Select (and reorder) rows by label. Every label must exist.
    pub fn select_rows(&self, labels: &[String]) -> EEIOResult<Self> {
        let indices = labels
            .iter()
            .map(|l| {
                self.row_index(l).ok_or_else(|| {
                    EEIOError::mismatch(format!("row selection on {}", self.name), l, &self.rows)
                })
            })
            .collect::<EEIOResult<Vec<_>>>()?;
        Ok(Self {
            name: self.name.clone(),
            rows: labels.to_vec(),
            cols: self.cols.clone(),
            values: self.values.select(Axis(0), &indices),
        })
    }

    /// Select (and reorder) columns by label. Every label must exist.
    pub fn select_cols(&self, labels: &[String]) -> EEIOResult<Self> {
        let indices = labels
            .iter()
            .map(|l| {
                self.col_index(l).ok_or_else(|| {
                    EEIOError::mismatch(format!("column selection on {}", self.name), l, &self.cols)
                })
            })
            .collect::<EEIOResult<Vec<_>>>()?;
        Ok(Self {
            name: self.name.clone(),
            rows: self.rows.clone(),
            cols: labels.to_vec(),
            values: self.values.select(Axis(1), &indices),
        })
    }

    /// Stack `other` to the right of `self`; row labels must match
    pub fn hstack(&self, other: &LabeledMatrix, name: impl Into<String>) -> EEIOResult<Self> {
        if self.rows != other.rows {
            return Err(EEIOError::mismatch(
                format!("horizontal stack of {} and {}", self.name, other.name),
                &self.rows,
                &other.rows,
            ));
        }
        let values = concatenate(Axis(1), &[self.values.view(), other.values.view()])
            .map_err(|e| EEIOError::Error(e.to_string()))?;
        let cols = self.cols.iter().chain(other.cols.iter()).cloned().collect();
        Self::new(name, self.rows.clone(), cols, values)
    }

    /// Stack `other` below `self`; column labels must match
    pub fn vstack(&self, other: &LabeledMatrix, name: impl Into<String>) -> EEIOResult<Self> {
        if self.cols != other.cols {
            return Err(EEIOError::mismatch(
                format!("vertical stack of {} and {}", self.name, other.name),
                &self.cols,
                &other.cols,
            ));
        }
        let values = concatenate(Axis(0), &[self.values.view(), other.values.view()])
            .map_err(|e| EEIOError::Error(e.to_string()))?;
        let rows = self.rows.iter().chain(other.rows.iter()).cloned().collect();
        Self::new(name, rows, self.cols.clone(), values)
    }

    /// Replace the row labels; the new labels must be unique
    pub fn relabel_rows(&mut self, rows: Vec<String>) -> EEIOResult<()> {
        if rows.len() != self.rows.len() {
            return Err(EEIOError::mismatch(
                format!("row relabel of {}", self.name),
                self.rows.len(),
                rows.len(),
            ));
        }
        ensure_unique(&format!("rows of {}", self.name), &rows)?;
        self.rows = rows;
        Ok(())
    }

    pub fn relabel_cols(&mut self, cols: Vec<String>) -> EEIOResult<()> {
        if cols.len() != self.cols.len() {
            return Err(EEIOError::mismatch(
                format!("column relabel of {}", self.name),
                self.cols.len(),
                cols.len(),
            ));
        }
        ensure_unique(&format!("columns of {}", self.name), &cols)?;
        self.cols = cols;
        Ok(())
    }

    /// Largest absolute elementwise difference to another matrix with the same labels
    pub fn max_abs_diff(&self, other: &LabeledMatrix) -> EEIOResult<f64> {
        self.ensure_same_labels(other)?;
        Ok((&self.values - &other.values)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs())))
    }
}

/// A dense vector with string labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledVector {
    name: String,
    labels: Vec<String>,
    values: Array1<f64>,
}

impl LabeledVector {
    pub fn new(name: impl Into<String>, labels: Vec<String>, values: Array1<f64>) -> EEIOResult<Self> {
        let name = name.into();
        if labels.len() != values.len() {
            return Err(EEIOError::mismatch(
                format!("construction of {}", name),
                labels.len(),
                values.len(),
            ));
        }
        ensure_unique(&name, &labels)?;
        Ok(Self {
            name,
            labels,
            values,
        })
    }

    pub fn from_pairs(name: impl Into<String>, pairs: &[(&str, f64)]) -> EEIOResult<Self> {
        let labels = pairs.iter().map(|(l, _)| l.to_string()).collect();
        let values = pairs.iter().map(|(_, v)| *v).collect();
        Self::new(name, labels, values)
    }

    pub fn zeros(name: impl Into<String>, labels: Vec<String>) -> EEIOResult<Self> {
        let values = Array1::zeros(labels.len());
        Self::new(name, labels, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Array1<f64> {
        &mut self.values
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.index_of(label).map(|i| self.values[i])
    }

    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(|l| l.as_str())
            .zip(self.values.iter().copied())
    }

    pub fn ensure_labels(&self, labels: &[String]) -> EEIOResult<()> {
        if self.labels != labels {
            return Err(EEIOError::mismatch(
                format!("labels of {}", self.name),
                labels,
                &self.labels,
            ));
        }
        Ok(())
    }

    /// Add entry `source` into `target` and remove `source`.
    ///
    /// Returns `false` (and leaves the vector untouched) if either label is absent.
    pub fn merge_into(&mut self, target: &str, source: &str) -> bool {
        match (self.index_of(target), self.index_of(source)) {
            (Some(t), Some(s)) if t != s => {
                self.values[t] += self.values[s];
                let keep: Vec<usize> = (0..self.len()).filter(|&i| i != s).collect();
                self.values = self.values.select(Axis(0), &keep);
                self.labels.remove(s);
                true
            }
            _ => false,
        }
    }

    /// Replace entry `label` with new entries valued `original * shares[k]`
    pub fn split(&mut self, label: &str, new_labels: &[String], shares: &[f64]) -> EEIOResult<bool> {
        let Some(position) = self.index_of(label) else {
            return Ok(false);
        };
        if new_labels.len() != shares.len() {
            return Err(EEIOError::mismatch(
                format!("split of {} in {}", label, self.name),
                new_labels.len(),
                shares.len(),
            ));
        }
        let original = self.values[position];
        let mut labels = Vec::with_capacity(self.len() + new_labels.len() - 1);
        let mut values = Vec::with_capacity(labels.capacity());
        for (i, (l, v)) in self.labels.iter().zip(self.values.iter()).enumerate() {
            if i == position {
                labels.extend(new_labels.iter().cloned());
                values.extend(shares.iter().map(|s| original * s));
            } else {
                labels.push(l.clone());
                values.push(*v);
            }
        }
        ensure_unique(&self.name, &labels)?;
        self.labels = labels;
        self.values = Array1::from(values);
        Ok(true)
    }

    /// Reorder/extend to `labels`, filling entries absent from this vector with zero.
    ///
    /// Entries whose label is not in `labels` are dropped.
    pub fn reindex_fill_zero(&self, labels: &[String]) -> Self {
        let values = labels
            .iter()
            .map(|l| self.get(l).unwrap_or(0.0))
            .collect::<Array1<f64>>();
        Self {
            name: self.name.clone(),
            labels: labels.to_vec(),
            values,
        }
    }

    /// A square matrix with this vector on its diagonal
    pub fn diag(&self, name: impl Into<String>) -> LabeledMatrix {
        LabeledMatrix {
            name: name.into(),
            rows: self.labels.clone(),
            cols: self.labels.clone(),
            values: Array2::from_diag(&self.values),
        }
    }

    /// Interpret this vector as a single-column matrix
    pub fn to_column(&self, column: impl Into<String>) -> LabeledMatrix {
        let n = self.len();
        LabeledMatrix {
            name: self.name.clone(),
            rows: self.labels.clone(),
            cols: vec![column.into()],
            values: self.values.clone().into_shape((n, 1)).unwrap_or_else(|_| Array2::zeros((n, 1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_by_two() -> LabeledMatrix {
        LabeledMatrix::from_rows(
            "Use",
            &["X/US", "Y/US"],
            &["X/US", "Y/US"],
            vec![vec![10.0, 5.0], vec![3.0, 2.0]],
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_duplicate_labels() {
        let result = LabeledMatrix::new(
            "bad",
            vec!["a".into(), "a".into()],
            vec!["b".into()],
            Array2::zeros((2, 1)),
        );
        assert!(matches!(result, Err(EEIOError::Configuration(_))));
    }

    #[test]
    fn construction_rejects_wrong_shape() {
        let result = LabeledMatrix::new("bad", vec!["a".into()], vec!["b".into()], Array2::zeros((2, 1)));
        assert!(matches!(result, Err(EEIOError::DimensionMismatch { .. })));
    }

    #[test]
    fn merge_rows_and_remove() {
        let mut m = two_by_two();
        m.merge_rows(0, 1);
        assert_eq!(m.row("X/US").unwrap().to_vec(), vec![13.0, 7.0]);
        assert_eq!(m.row("Y/US").unwrap().to_vec(), vec![0.0, 0.0]);
        assert!(m.remove_row("Y/US"));
        assert!(!m.remove_row("Y/US"));
        assert_eq!(m.rows(), &["X/US".to_string()]);
        assert_eq!(m.values(), &array![[13.0, 7.0]]);
    }

    #[test]
    fn dot_checks_inner_labels() {
        let m = two_by_two();
        let other = LabeledMatrix::from_rows("O", &["Y/US", "X/US"], &["c"], vec![vec![1.0], vec![1.0]])
            .unwrap();
        assert!(matches!(
            m.dot(&other, "P"),
            Err(EEIOError::DimensionMismatch { .. })
        ));

        let aligned = other.select_rows(&["X/US".to_string(), "Y/US".to_string()]).unwrap();
        let product = m.dot(&aligned, "P").unwrap();
        assert_eq!(product.values(), &array![[15.0], [5.0]]);
    }

    #[test]
    fn scale_columns_matches_diag_product() {
        let m = two_by_two();
        let v = LabeledVector::from_pairs("v", &[("X/US", 2.0), ("Y/US", 0.5)]).unwrap();
        let scaled = m.scale_columns(&v, "S").unwrap();
        let via_diag = m.dot(&v.diag("diag"), "S").unwrap();
        assert_eq!(scaled.values(), via_diag.values());
    }

    #[test]
    fn stacking_keeps_labels() {
        let m = two_by_two();
        let fd = LabeledMatrix::from_rows("FD", &["X/US", "Y/US"], &["F01"], vec![vec![1.0], vec![2.0]])
            .unwrap();
        let wide = m.hstack(&fd, "wide").unwrap();
        assert_eq!(wide.ncols(), 3);
        assert_eq!(wide.get("Y/US", "F01"), Some(2.0));
        assert!(m.vstack(&fd, "bad").is_err());
    }

    #[test]
    fn vector_split_and_merge() {
        let mut v = LabeledVector::from_pairs("q", &[("A", 1.0), ("Z", 100.0), ("B", 2.0)]).unwrap();
        let new_labels = vec!["Z1".to_string(), "Z2".to_string()];
        assert!(v.split("Z", &new_labels, &[0.6, 0.4]).unwrap());
        assert_eq!(v.labels(), &["A", "Z1", "Z2", "B"].map(String::from));
        assert!((v.get("Z1").unwrap() - 60.0).abs() < 1e-12);
        assert!((v.get("Z2").unwrap() - 40.0).abs() < 1e-12);

        assert!(v.merge_into("Z1", "Z2"));
        assert!((v.get("Z1").unwrap() - 100.0).abs() < 1e-12);
        assert!(!v.merge_into("Z1", "Z2"));
    }

    #[test]
    fn reindex_fills_missing_with_zero() {
        let v = LabeledVector::from_pairs("d", &[("B", 5.0)]).unwrap();
        let domain = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let r = v.reindex_fill_zero(&domain);
        assert_eq!(r.values().to_vec(), vec![0.0, 5.0, 0.0]);
    }
}
