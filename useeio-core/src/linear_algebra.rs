//! Linear algebra utilities.
//!
//! Dense inversion is delegated to `nalgebra`'s LU decomposition. Matrices cross
//! the boundary as `ndarray` arrays so the rest of the crate only deals with one
//! array type.

use nalgebra::DMatrix;
use ndarray::Array2;

/// Result of a successful inversion
#[derive(Debug, Clone)]
pub struct Inverse {
    pub inverse: Array2<f64>,
    /// Estimate of `1 / (‖M‖₁ ‖M⁻¹‖₁)`, in `(0, 1]`
    pub reciprocal_condition: f64,
}

/// Induced 1-norm: the largest absolute column sum.
///
/// # Example
/// ```
/// use ndarray::array;
/// use useeio_core::linear_algebra::one_norm;
///
/// let m = array![[1.0, -4.0], [2.0, 1.0]];
/// assert!((one_norm(&m) - 5.0).abs() < 1e-12);
/// ```
pub fn one_norm(m: &Array2<f64>) -> f64 {
    m.columns()
        .into_iter()
        .map(|c| c.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn to_nalgebra(m: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = m.dim();
    DMatrix::from_fn(rows, cols, |i, j| m[[i, j]])
}

fn from_nalgebra(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Invert a square matrix.
///
/// Returns `None` if the matrix is not square, is singular, or the inverse
/// contains non-finite values.
pub fn invert(m: &Array2<f64>) -> Option<Inverse> {
    let (rows, cols) = m.dim();
    if rows != cols {
        return None;
    }
    if rows == 0 {
        return Some(Inverse {
            inverse: Array2::zeros((0, 0)),
            reciprocal_condition: 1.0,
        });
    }

    let inverse = to_nalgebra(m).lu().try_inverse()?;
    let inverse = from_nalgebra(&inverse);
    if inverse.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let norm_product = one_norm(m) * one_norm(&inverse);
    let reciprocal_condition = if norm_product > 0.0 {
        1.0 / norm_product
    } else {
        0.0
    };
    Some(Inverse {
        inverse,
        reciprocal_condition,
    })
}
