//! Leontief inverse.
//!
//! `L = (I - A)⁻¹` gives the total (direct plus indirect) output of every sector
//! required per unit of final demand. A singular or ill-conditioned `I - A` is a
//! [`EEIOError::Numeric`] error; no pseudo-inverse fallback is attempted.

use crate::errors::{EEIOError, EEIOResult};
use crate::linear_algebra::invert;
use crate::matrix::LabeledMatrix;
use ndarray::Array2;

/// Compute `L = (I - A)⁻¹`.
///
/// `a` must be square with identical row and column labels. `min_reciprocal_condition`
/// is the smallest accepted estimate of `1 / cond₁(I - A)`.
///
/// ```rust
/// use useeio_core::leontief::calculate_leontief_inverse;
/// use useeio_core::matrix::LabeledMatrix;
///
/// let a = LabeledMatrix::from_rows("A", &["X", "Y"], &["X", "Y"], vec![vec![0.0, 0.5], vec![0.0, 0.0]])
///     .unwrap();
/// let l = calculate_leontief_inverse(&a, "L", 1e-12).unwrap();
/// assert!((l.get("X", "Y").unwrap() - 0.5).abs() < 1e-12);
/// ```
pub fn calculate_leontief_inverse(
    a: &LabeledMatrix,
    name: &str,
    min_reciprocal_condition: f64,
) -> EEIOResult<LabeledMatrix> {
    if a.rows() != a.cols() {
        return Err(EEIOError::mismatch(
            format!("Leontief inverse of {}", a.name()),
            a.rows(),
            a.cols(),
        ));
    }
    if let Some(v) = a.values().iter().find(|v| !v.is_finite()) {
        return Err(EEIOError::numeric(
            format!("finite entries of {}", a.name()),
            *v,
        ));
    }

    let n = a.nrows();
    let i_minus_a = Array2::<f64>::eye(n) - a.values();
    let inverse = invert(&i_minus_a)
        .ok_or_else(|| EEIOError::numeric(format!("invertibility of I - {}", a.name()), 0.0))?;

    log::debug!(
        "Reciprocal condition of I - {}: {:e}",
        a.name(),
        inverse.reciprocal_condition
    );
    if inverse.reciprocal_condition < min_reciprocal_condition {
        return Err(EEIOError::numeric(
            format!("reciprocal condition of I - {}", a.name()),
            inverse.reciprocal_condition,
        ));
    }

    LabeledMatrix::new(name, a.rows().to_vec(), a.cols().to_vec(), inverse.inverse)
}

/// Largest absolute entry of `L · (I - A) - I`
pub fn leontief_residual(l: &LabeledMatrix, a: &LabeledMatrix) -> EEIOResult<f64> {
    l.ensure_same_labels(a)?;
    let n = a.nrows();
    let identity = Array2::<f64>::eye(n);
    let product = l.values().dot(&(&identity - a.values()));
    Ok((product - identity)
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs())))
}
