//! Life-cycle inventory and impact results for a demand vector.
//!
//! | Tag      | Definition |
//! |----------|------------|
//! | `LCI_d`  | `(B · diag(s))ᵗ` |
//! | `LCIA_d` | `(D · diag(s))ᵗ` |
//! | `LCI_f`  | `(M · diag(d))ᵗ` |
//! | `LCIA_f` | `(N · diag(d))ᵗ` |
//!
//! where `d` is the demand vector and `s = L · d` the scaling vector. Domestic
//! calculations use `L_d`, `M_d` and `N_d` in place of `L`, `M` and `N`.

use crate::model::EEIOModel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use useeio_core::demand::format_demand_vector;
use useeio_core::errors::{EEIOError, EEIOResult};
use useeio_core::matrix::{LabeledMatrix, LabeledVector};

/// Which results a calculation produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Perspective {
    /// Impacts of each sector's own scaled activity
    Direct,
    /// Supply-chain impacts attributed to final demand
    Final,
    Both,
}

impl FromStr for Perspective {
    type Err = EEIOError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIRECT" => Ok(Perspective::Direct),
            "FINAL" => Ok(Perspective::Final),
            "BOTH" => Ok(Perspective::Both),
            _ => Err(EEIOError::InvalidPerspective(s.to_string())),
        }
    }
}

/// Key of one table in a [`CalculationResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResultTag {
    #[serde(rename = "LCI_d")]
    LciDirect,
    #[serde(rename = "LCIA_d")]
    LciaDirect,
    #[serde(rename = "LCI_f")]
    LciFinal,
    #[serde(rename = "LCIA_f")]
    LciaFinal,
}

impl ResultTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultTag::LciDirect => "LCI_d",
            ResultTag::LciaDirect => "LCIA_d",
            ResultTag::LciFinal => "LCI_f",
            ResultTag::LciaFinal => "LCIA_f",
        }
    }
}

impl fmt::Display for ResultTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sector × flow or sector × indicator tables keyed by tag
pub type CalculationResult = BTreeMap<ResultTag, LabeledMatrix>;

/// Demand for a calculation
#[derive(Debug, Clone, PartialEq)]
pub enum DemandInput {
    /// ID of a registered demand vector, e.g. `2012_US_Consumption_Complete`
    Named(String),
    /// Sector code to amount. Sectors left out are treated as zero.
    UserDefined(HashMap<String, f64>),
}

fn resolve_demand(model: &EEIOModel, demand: &DemandInput) -> EEIOResult<LabeledVector> {
    let domain = model.sector_domain();
    match demand {
        DemandInput::Named(id) => {
            let vector = model.demand_vectors.get(id).ok_or_else(|| {
                EEIOError::InvalidDemand(format!("no demand vector named {}", id))
            })?;
            Ok(vector.reindex_fill_zero(domain))
        }
        DemandInput::UserDefined(values) => format_demand_vector(values, domain),
    }
}

/// Production required to satisfy `demand`, `s = L · d`
pub fn get_scaling_vector(l: &LabeledMatrix, demand: &LabeledVector) -> EEIOResult<LabeledVector> {
    l.dot_vector(demand, "s")
}

pub fn calculate_lci_direct(b: &LabeledMatrix, s: &LabeledVector) -> EEIOResult<LabeledMatrix> {
    Ok(b.scale_columns(s, "B_s")?.transpose().renamed(ResultTag::LciDirect.as_str()))
}

pub fn calculate_lcia_direct(d: &LabeledMatrix, s: &LabeledVector) -> EEIOResult<LabeledMatrix> {
    Ok(d.scale_columns(s, "D_s")?.transpose().renamed(ResultTag::LciaDirect.as_str()))
}

pub fn calculate_lci_final(m: &LabeledMatrix, demand: &LabeledVector) -> EEIOResult<LabeledMatrix> {
    Ok(m.scale_columns(demand, "M_y")?.transpose().renamed(ResultTag::LciFinal.as_str()))
}

pub fn calculate_lcia_final(n: &LabeledMatrix, demand: &LabeledVector) -> EEIOResult<LabeledMatrix> {
    Ok(n.scale_columns(demand, "N_y")?.transpose().renamed(ResultTag::LciaFinal.as_str()))
}

/// Calculate LCI and LCIA results of `demand` from the given perspective.
///
/// `perspective` is one of `DIRECT`, `FINAL` or `BOTH` (case-insensitive). With
/// `use_domestic` the domestic matrices are used throughout. The call fails as a
/// whole: an invalid perspective or demand, or a model whose tables changed
/// since it was built, yields an error and no results.
///
/// # Example
/// ```no_run
/// use useeio::calculation::{calculate_eeio_model, DemandInput, ResultTag};
/// # let model: useeio::model::EEIOModel = unimplemented!();
///
/// let demand = DemandInput::Named("2012_US_Consumption_Complete".to_string());
/// let result = calculate_eeio_model(&model, "FINAL", &demand, false).unwrap();
/// let lcia = &result[&ResultTag::LciaFinal];
/// ```
pub fn calculate_eeio_model(
    model: &EEIOModel,
    perspective: &str,
    demand: &DemandInput,
    use_domestic: bool,
) -> EEIOResult<CalculationResult> {
    let perspective = Perspective::from_str(perspective)?;
    if model.is_stale() {
        return Err(EEIOError::Configuration(format!(
            "model {} changed since its matrices were built, rebuild before calculating",
            model.specs.model
        )));
    }
    let d = resolve_demand(model, demand)?;
    let matrices = &model.matrices;
    let (l, m, n) = if use_domestic {
        (&matrices.l_d, &matrices.m_d, &matrices.n_d)
    } else {
        (&matrices.l, &matrices.m, &matrices.n)
    };
    log::debug!(
        "Calculating {:?} results for {} (domestic: {})",
        perspective,
        d.name(),
        use_domestic
    );

    let mut result = CalculationResult::new();
    if matches!(perspective, Perspective::Direct | Perspective::Both) {
        let s = get_scaling_vector(l, &d)?;
        result.insert(ResultTag::LciDirect, calculate_lci_direct(&matrices.b, &s)?);
        result.insert(ResultTag::LciaDirect, calculate_lcia_direct(&matrices.d, &s)?);
    }
    if matches!(perspective, Perspective::Final | Perspective::Both) {
        result.insert(ResultTag::LciFinal, calculate_lci_final(m, &d)?);
        result.insert(ResultTag::LciaFinal, calculate_lcia_final(n, &d)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn sectors() -> Vec<String> {
        vec!["X/US".to_string(), "Y/US".to_string()]
    }

    #[test]
    fn test_perspective_parsing() {
        assert_eq!(Perspective::from_str("direct").unwrap(), Perspective::Direct);
        assert_eq!(Perspective::from_str("FINAL").unwrap(), Perspective::Final);
        assert_eq!(Perspective::from_str(" Both ").unwrap(), Perspective::Both);
        match Perspective::from_str("TOTAL") {
            Err(EEIOError::InvalidPerspective(p)) => assert_eq!(p, "TOTAL"),
            other => panic!("expected invalid perspective, got {:?}", other),
        }
    }

    #[test]
    fn test_result_tags_order() {
        let tags = [
            ResultTag::LciaFinal,
            ResultTag::LciDirect,
            ResultTag::LciFinal,
            ResultTag::LciaDirect,
        ];
        let mut sorted = tags.to_vec();
        sorted.sort();
        let names: Vec<String> = sorted.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["LCI_d", "LCIA_d", "LCI_f", "LCIA_f"]);
    }

    #[test]
    fn test_result_tags_serialize_by_name() {
        let json = serde_json::to_string(&ResultTag::LciaFinal).unwrap();
        assert_eq!(json, "\"LCIA_f\"");
        let totals = BTreeMap::from([(ResultTag::LciDirect, 1.5), (ResultTag::LciaFinal, 2.0)]);
        assert_eq!(
            serde_json::to_string(&totals).unwrap(),
            r#"{"LCI_d":1.5,"LCIA_f":2.0}"#
        );
        let parsed: ResultTag = serde_json::from_str("\"LCI_f\"").unwrap();
        assert_eq!(parsed, ResultTag::LciFinal);
    }

    #[test]
    fn test_direct_results_are_scaled_and_transposed() {
        let l = LabeledMatrix::from_rows(
            "L",
            &["X/US", "Y/US"],
            &["X/US", "Y/US"],
            vec![vec![1.0, 0.5], vec![0.0, 1.0]],
        )
        .unwrap();
        let d = LabeledVector::new("y", sectors(), ndarray::array![0.0, 10.0]).unwrap();
        let s = get_scaling_vector(&l, &d).unwrap();
        assert_eq!(s.values().to_vec(), vec![5.0, 10.0]);

        let b = LabeledMatrix::from_rows("B", &["CO2"], &["X/US", "Y/US"], vec![vec![2.0, 1.0]])
            .unwrap();
        let lci = calculate_lci_direct(&b, &s).unwrap();
        assert_eq!(lci.name(), "LCI_d");
        assert_eq!(lci.rows(), sectors().as_slice());
        assert_eq!(lci.cols(), &["CO2".to_string()]);
        assert!(is_close!(lci.get("X/US", "CO2").unwrap(), 10.0));
        assert!(is_close!(lci.get("Y/US", "CO2").unwrap(), 10.0));
    }

    #[test]
    fn test_final_results_use_demand() {
        let n = LabeledMatrix::from_rows("N", &["GHG"], &["X/US", "Y/US"], vec![vec![3.0, 4.0]])
            .unwrap();
        let d = LabeledVector::new("y", sectors(), ndarray::array![1.0, 2.0]).unwrap();
        let lcia = calculate_lcia_final(&n, &d).unwrap();
        assert!(is_close!(lcia.get("X/US", "GHG").unwrap(), 3.0));
        assert!(is_close!(lcia.get("Y/US", "GHG").unwrap(), 8.0));
    }

    #[test]
    fn test_misaligned_demand() {
        let n = LabeledMatrix::from_rows("N", &["GHG"], &["X/US", "Y/US"], vec![vec![3.0, 4.0]])
            .unwrap();
        let d = LabeledVector::new("y", vec!["Y/US".into(), "X/US".into()], ndarray::array![1.0, 2.0])
            .unwrap();
        assert!(matches!(
            calculate_lcia_final(&n, &d),
            Err(EEIOError::DimensionMismatch { .. })
        ));
    }
}
