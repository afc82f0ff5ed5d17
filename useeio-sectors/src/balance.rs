//! RAS balancing.
//!
//! Iterative proportional fitting: rows are scaled to their targets, then
//! columns, until both sets of sums agree with the targets. Running out of
//! iterations is an error, never a silently accepted result.

use ndarray::{s, Array1, Array2, Axis};
use useeio_core::diagnostics::{Diagnostics, Stage};
use useeio_core::errors::{EEIOError, EEIOResult};
use useeio_core::matrix::LabeledMatrix;
use useeio_core::tables::IOTables;

/// Balanced matrix and convergence details
#[derive(Debug, Clone)]
pub struct RasOutcome {
    pub matrix: Array2<f64>,
    pub iterations: usize,
    /// Largest relative deviation of a row sum from its target
    pub max_deviation: f64,
}

fn relative_deviation(sums: &Array1<f64>, targets: &Array1<f64>) -> f64 {
    sums.iter()
        .zip(targets.iter())
        .map(|(s, t)| (s - t).abs() / t.abs().max(1.0))
        .fold(0.0, f64::max)
}

fn scale_factors(sums: &Array1<f64>, targets: &Array1<f64>) -> Array1<f64> {
    sums.iter()
        .zip(targets.iter())
        .map(|(s, t)| if *s == 0.0 { 1.0 } else { t / s })
        .collect()
}

/// Scale `matrix` so its row sums match `row_targets` and its column sums match
/// `col_targets`.
///
/// # Example
/// ```
/// use ndarray::array;
/// use useeio_sectors::balance::ras;
///
/// let m = array![[1.0, 1.0], [1.0, 1.0]];
/// let outcome = ras(&m, &array![3.0, 1.0], &array![2.0, 2.0], 1e-10, 100).unwrap();
/// let row_sums = outcome.matrix.sum_axis(ndarray::Axis(1));
/// assert!((row_sums[0] - 3.0).abs() < 1e-8);
/// ```
pub fn ras(
    matrix: &Array2<f64>,
    row_targets: &Array1<f64>,
    col_targets: &Array1<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> EEIOResult<RasOutcome> {
    let (nrows, ncols) = matrix.dim();
    if row_targets.len() != nrows || col_targets.len() != ncols {
        return Err(EEIOError::mismatch(
            "RAS targets",
            (nrows, ncols),
            (row_targets.len(), col_targets.len()),
        ));
    }
    let row_total = row_targets.sum();
    let col_total = col_targets.sum();
    let total_gap = (row_total - col_total).abs() / row_total.abs().max(1.0);
    if total_gap > tolerance {
        return Err(EEIOError::numeric("RAS row and column target totals", total_gap));
    }

    let mut balanced = matrix.clone();
    let mut deviation = f64::INFINITY;
    for iteration in 1..=max_iterations {
        let r = scale_factors(&balanced.sum_axis(Axis(1)), row_targets);
        for (mut row, factor) in balanced.axis_iter_mut(Axis(0)).zip(r.iter()) {
            row *= *factor;
        }
        let c = scale_factors(&balanced.sum_axis(Axis(0)), col_targets);
        for (mut col, factor) in balanced.axis_iter_mut(Axis(1)).zip(c.iter()) {
            col *= *factor;
        }

        deviation = relative_deviation(&balanced.sum_axis(Axis(1)), row_targets);
        if deviation <= tolerance {
            log::debug!("RAS converged after {} iterations", iteration);
            return Ok(RasOutcome {
                matrix: balanced,
                iterations: iteration,
                max_deviation: deviation,
            });
        }
    }
    Err(EEIOError::numeric(
        format!("RAS convergence within {} iterations", max_iterations),
        deviation,
    ))
}

fn rescale_like(domestic: &mut LabeledMatrix, unbalanced: &LabeledMatrix, balanced: &LabeledMatrix) -> EEIOResult<()> {
    domestic.ensure_same_labels(unbalanced)?;
    let ratios = ndarray::Zip::from(balanced.values())
        .and(unbalanced.values())
        .map_collect(|b, u| if *u == 0.0 { 1.0 } else { b / u });
    *domestic.values_mut() *= &ratios;
    Ok(())
}

/// Balance the full Use table after disaggregation.
///
/// The full table is `[Use | FD]` stacked on `[VA | 0]`. Row targets are commodity
/// output from the Make table followed by the current value added totals; column
/// targets are industry output from the Make table followed by the current final
/// demand totals. Domestic tables are rescaled cell-wise by balanced / unbalanced.
pub fn balance_disagg(
    tables: &mut IOTables,
    tolerance: f64,
    max_iterations: usize,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<RasOutcome> {
    let n_commodities = tables.use_transactions.nrows();
    let n_industries = tables.use_transactions.ncols();
    let n_value_added = tables.use_value_added.nrows();
    let n_final_demand = tables.final_demand.ncols();

    let top = tables
        .use_transactions
        .hstack(&tables.final_demand, "UseAndFinalDemand")?;
    let empty = LabeledMatrix::zeros(
        "Empty",
        tables.use_value_added.rows().to_vec(),
        tables.final_demand.cols().to_vec(),
    )?;
    let bottom = tables.use_value_added.hstack(&empty, "ValueAdded")?;
    let full = top.vstack(&bottom, "FullUse")?;

    // Commodity output by Make column sums, industry output by Make row sums
    let make_q = tables
        .make
        .select_cols(tables.use_transactions.rows())?
        .col_sums();
    let make_x = tables
        .make
        .select_rows(tables.use_transactions.cols())?
        .row_sums();
    let mut row_targets = Array1::<f64>::zeros(n_commodities + n_value_added);
    row_targets.slice_mut(s![..n_commodities]).assign(&make_q);
    row_targets
        .slice_mut(s![n_commodities..])
        .assign(&tables.use_value_added.row_sums());
    let mut col_targets = Array1::<f64>::zeros(n_industries + n_final_demand);
    col_targets.slice_mut(s![..n_industries]).assign(&make_x);
    col_targets
        .slice_mut(s![n_industries..])
        .assign(&tables.final_demand.col_sums());

    let outcome = ras(full.values(), &row_targets, &col_targets, tolerance, max_iterations)?;
    let balanced = &outcome.matrix;

    let unbalanced_use = tables.use_transactions.clone();
    let unbalanced_fd = tables.final_demand.clone();
    tables
        .use_transactions
        .values_mut()
        .assign(&balanced.slice(s![..n_commodities, ..n_industries]));
    tables
        .final_demand
        .values_mut()
        .assign(&balanced.slice(s![..n_commodities, n_industries..]));
    tables
        .use_value_added
        .values_mut()
        .assign(&balanced.slice(s![n_commodities.., ..n_industries]));

    rescale_like(&mut tables.domestic_use, &unbalanced_use, &tables.use_transactions)?;
    rescale_like(&mut tables.domestic_final_demand, &unbalanced_fd, &tables.final_demand)?;

    tables.mark_modified();
    diagnostics.info(
        Stage::Balancing,
        format!(
            "RAS converged in {} iterations (max deviation {:e})",
            outcome.iterations, outcome.max_deviation
        ),
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_ras_matches_targets() {
        let m = array![[10.0, 5.0, 5.0], [2.0, 8.0, 10.0], [4.0, 4.0, 2.0]];
        let rows = array![25.0, 20.0, 5.0];
        let cols = array![15.0, 20.0, 15.0];
        let outcome = ras(&m, &rows, &cols, 1e-10, 1000).unwrap();

        let row_sums = outcome.matrix.sum_axis(Axis(1));
        let col_sums = outcome.matrix.sum_axis(Axis(0));
        for (s, t) in row_sums.iter().zip(rows.iter()) {
            assert_abs_diff_eq!(s, t, epsilon = 1e-8);
        }
        for (s, t) in col_sums.iter().zip(cols.iter()) {
            assert_abs_diff_eq!(s, t, epsilon = 1e-8);
        }
        assert!(outcome.iterations > 1);
        // Positive entries stay positive
        assert!(outcome.matrix.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_inconsistent_targets_are_rejected() {
        let m = array![[1.0, 1.0], [1.0, 1.0]];
        let result = ras(&m, &array![1.0, 1.0], &array![5.0, 5.0], 1e-8, 100);
        assert!(matches!(result, Err(EEIOError::Numeric { .. })));
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        // A zero block that forces a nonzero target cannot converge
        let m = array![[1.0, 0.0], [0.0, 1.0]];
        let result = ras(&m, &array![2.0, 1.0], &array![1.0, 2.0], 1e-12, 50);
        match result {
            Err(EEIOError::Numeric { check, .. }) => assert!(check.contains("convergence")),
            other => panic!("expected convergence failure, got {:?}", other.map(|o| o.iterations)),
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let m = array![[1.0, 1.0]];
        assert!(matches!(
            ras(&m, &array![1.0, 1.0], &array![1.0, 1.0], 1e-8, 10),
            Err(EEIOError::DimensionMismatch { .. })
        ));
    }
}
