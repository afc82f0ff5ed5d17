//! Characterization matrix `C` and the derived indicator matrices.
//!
//! | Matrix | Shape | Definition |
//! |--------|-------|------------|
//! | `D`    | indicator × sector | `C · B` |
//! | `M`    | flow × sector | `B · L` |
//! | `M_d`  | flow × sector | `B · L_d` |
//! | `N`    | indicator × sector | `C · M` |
//! | `N_d`  | indicator × sector | `C · M_d` |

use crate::diagnostics::{Diagnostics, Stage};
use crate::errors::EEIOResult;
use crate::matrix::LabeledMatrix;
use crate::satellite::flow_key;
use crate::specs::IndicatorSpec;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characterization factor of one flow for one indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFactor {
    /// Indicator name
    pub indicator: String,
    pub flowable: String,
    pub context: String,
    pub unit: String,
    pub amount: f64,
}

impl IndicatorFactor {
    pub fn new(indicator: &str, flowable: &str, context: &str, unit: &str, amount: f64) -> Self {
        Self {
            indicator: indicator.to_string(),
            flowable: flowable.to_string(),
            context: context.to_string(),
            unit: unit.to_string(),
            amount,
        }
    }

    pub fn flow_key(&self) -> String {
        flow_key(&self.flowable, &self.context, &self.unit)
    }
}

/// Build `C` (indicator × flow) over the flows of `B`.
///
/// Rows are indicator names in `indicators` order. Flows without a factor stay as
/// zero columns and are reported as unmapped; factors for flows outside `flows`
/// are ignored.
pub fn create_c_from_factors_and_b_flows(
    indicators: &[IndicatorSpec],
    factors: &[IndicatorFactor],
    flows: &[String],
    diagnostics: &mut Diagnostics,
) -> EEIOResult<LabeledMatrix> {
    let names: Vec<String> = indicators.iter().map(|i| i.name.clone()).collect();
    let row_index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    let col_index: HashMap<&str, usize> = flows
        .iter()
        .enumerate()
        .map(|(j, f)| (f.as_str(), j))
        .collect();

    let mut values = Array2::<f64>::zeros((names.len(), flows.len()));
    for factor in factors {
        let key = factor.flow_key();
        if let (Some(&i), Some(&j)) = (
            row_index.get(factor.indicator.as_str()),
            col_index.get(key.as_str()),
        ) {
            values[[i, j]] += factor.amount;
        }
    }

    for (j, flow) in flows.iter().enumerate() {
        if values.column(j).iter().all(|v| *v == 0.0) {
            diagnostics.debug(Stage::Indicators, format!("unmapped flow {}", flow));
        }
    }
    for (i, name) in names.iter().enumerate() {
        if values.row(i).iter().all(|v| *v == 0.0) {
            diagnostics.warn(
                Stage::Indicators,
                format!("indicator {} has no factors for any model flow", name),
            );
        }
    }

    LabeledMatrix::new("C", names, flows.to_vec(), values)
}

/// Flows of `flows` that have a nonzero factor for `indicator`
pub fn check_indicator_for_flows<'a>(
    c: &LabeledMatrix,
    indicator: &str,
    flows: &'a [String],
) -> Vec<&'a str> {
    flows
        .iter()
        .filter(|f| c.get(indicator, f).map_or(false, |v| v != 0.0))
        .map(|f| f.as_str())
        .collect()
}

/// `D`, `M`, `M_d`, `N` and `N_d` derived from `B`, `C`, `L` and `L_d`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorMatrices {
    pub d: LabeledMatrix,
    pub m: LabeledMatrix,
    pub m_d: LabeledMatrix,
    pub n: LabeledMatrix,
    pub n_d: LabeledMatrix,
}

pub fn derive_indicator_matrices(
    b: &LabeledMatrix,
    c: &LabeledMatrix,
    l: &LabeledMatrix,
    l_d: &LabeledMatrix,
) -> EEIOResult<IndicatorMatrices> {
    let d = c.dot(b, "D")?;
    let m = b.dot(l, "M")?;
    let m_d = b.dot(l_d, "M_d")?;
    let n = c.dot(&m, "N")?;
    let n_d = c.dot(&m_d, "N_d")?;
    Ok(IndicatorMatrices { d, m, m_d, n, n_d })
}
