//! Breakdown of a sector's total impact by the sectors or flows it comes from.

use crate::model::EEIOModel;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use useeio_core::errors::{EEIOError, EEIOResult};
use useeio_core::matrix::LabeledMatrix;

/// One term of an impact breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Sector code or flow key
    pub label: String,
    pub amount: f64,
    /// Percentage of the total impact
    pub share: f64,
}

fn lookup(matrix: &LabeledMatrix, row: &str, col: &str) -> EEIOResult<f64> {
    matrix.get(row, col).ok_or_else(|| {
        EEIOError::Configuration(format!("{} has no entry ({}, {})", matrix.name(), row, col))
    })
}

fn ensure_current(model: &EEIOModel) -> EEIOResult<()> {
    if model.is_stale() {
        return Err(EEIOError::Configuration(format!(
            "model {} changed since its matrices were built",
            model.specs.model
        )));
    }
    Ok(())
}

/// Sort descending by amount and attach percentage shares
fn ranked(terms: Vec<(String, f64)>) -> Vec<Contribution> {
    let total: f64 = terms.iter().map(|(_, v)| v).sum();
    let mut contributions: Vec<Contribution> = terms
        .into_iter()
        .map(|(label, amount)| Contribution {
            label,
            amount,
            share: if total == 0.0 { 0.0 } else { amount / total * 100.0 },
        })
        .collect();
    contributions.sort_by(|a, b| b.amount.partial_cmp(&a.amount).unwrap_or(Ordering::Equal));
    contributions
}

/// Contribution of each sector `k` to the total `indicator` impact of `sector`:
/// `L[k, sector] · D[indicator, k]`.
///
/// The amounts sum to `N[indicator, sector]`.
pub fn sector_contribution_to_impact(
    model: &EEIOModel,
    sector: &str,
    indicator: &str,
) -> EEIOResult<Vec<Contribution>> {
    ensure_current(model)?;
    let l = &model.matrices.l;
    let d = &model.matrices.d;
    let terms = l
        .rows()
        .iter()
        .map(|k| Ok((k.clone(), lookup(l, k, sector)? * lookup(d, indicator, k)?)))
        .collect::<EEIOResult<Vec<_>>>()?;
    Ok(ranked(terms))
}

/// Contribution of each flow `f` to the total `indicator` impact of `sector`:
/// `M[f, sector] · C[indicator, f]`.
pub fn flow_contribution_to_impact(
    model: &EEIOModel,
    sector: &str,
    indicator: &str,
) -> EEIOResult<Vec<Contribution>> {
    ensure_current(model)?;
    let m = &model.matrices.m;
    let c = &model.matrices.c;
    let terms = m
        .rows()
        .iter()
        .map(|f| Ok((f.clone(), lookup(m, f, sector)? * lookup(c, indicator, f)?)))
        .collect::<EEIOResult<Vec<_>>>()?;
    Ok(ranked(terms))
}

/// Total `indicator` impact embodied in each tier-1 purchase:
/// `T[k, j] = A[k, j] · N[indicator, k]`.
///
/// Column `j` holds the impacts of the direct purchases of sector `j`.
pub fn total_impact_by_tier1_purchase(model: &EEIOModel, indicator: &str) -> EEIOResult<LabeledMatrix> {
    ensure_current(model)?;
    let a = &model.matrices.a;
    let n = &model.matrices.n;
    let intensity = n.row(indicator).ok_or_else(|| {
        EEIOError::Configuration(format!("indicator {} is not in the model", indicator))
    })?;
    if n.cols() != a.rows() {
        return Err(EEIOError::mismatch("tier-1 purchase impacts", a.rows(), n.cols()));
    }
    let mut values = a.values().clone();
    for (mut row, factor) in values.rows_mut().into_iter().zip(intensity.iter()) {
        row *= *factor;
    }
    LabeledMatrix::new(
        format!("Tier1_{}", indicator),
        a.rows().to_vec(),
        a.cols().to_vec(),
        values,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_shares() {
        let ranked = ranked(vec![
            ("1/US".to_string(), 1.0),
            ("2/US".to_string(), 3.0),
            ("3/US".to_string(), 0.0),
        ]);
        let labels: Vec<&str> = ranked.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["2/US", "1/US", "3/US"]);
        assert!((ranked[0].share - 75.0).abs() < 1e-12);
        assert!((ranked.iter().map(|c| c.share).sum::<f64>() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_ranked_zero_total() {
        let ranked = ranked(vec![("1/US".to_string(), 0.0)]);
        assert_eq!(ranked[0].share, 0.0);
    }
}
