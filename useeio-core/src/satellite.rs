//! Environmental satellite tables and the flow matrix `B`.
//!
//! A satellite table lists flow totals by sector in long format. Totals are
//! converted into coefficients per dollar of industry output and cast into a
//! flow × sector matrix.

use crate::diagnostics::{Diagnostics, Stage};
use crate::errors::EEIOResult;
use crate::io_transform::adjust_output_by_cpi;
use crate::matrix::LabeledMatrix;
use crate::sectors::SectorCode;
use crate::specs::Orientation;
use crate::tables::{year_label, IOTables};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Key of a flow, `Flowable/Context/Unit`
pub fn flow_key(flowable: &str, context: &str, unit: &str) -> String {
    format!("{}/{}/{}", flowable, context, unit)
}

/// A single flow total attributed to one sector for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTotal {
    pub flowable: String,
    pub context: String,
    pub unit: String,
    /// Industry code with location, e.g. `"221100/US"`
    pub sector: SectorCode,
    pub amount: f64,
    pub year: u16,
}

impl FlowTotal {
    pub fn new(flowable: &str, context: &str, unit: &str, sector: &str, amount: f64, year: u16) -> Self {
        Self {
            flowable: flowable.to_string(),
            context: context.to_string(),
            unit: unit.to_string(),
            sector: sector.to_string(),
            amount,
            year,
        }
    }

    pub fn flow_key(&self) -> String {
        flow_key(&self.flowable, &self.context, &self.unit)
    }
}

/// Flow totals from one source, e.g. a greenhouse gas inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteTable {
    pub name: String,
    pub totals: Vec<FlowTotal>,
}

impl SatelliteTable {
    pub fn new(name: &str, totals: Vec<FlowTotal>) -> Self {
        Self {
            name: name.to_string(),
            totals,
        }
    }

    /// Distinct flow keys in order of first appearance
    pub fn flow_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for total in &self.totals {
            let key = total.flow_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Keep only the latest reported year of every flow
    pub fn set_common_year_for_flow(&mut self) {
        let mut latest: HashMap<String, u16> = HashMap::new();
        for total in &self.totals {
            let entry = latest.entry(total.flow_key()).or_insert(total.year);
            *entry = (*entry).max(total.year);
        }
        self.totals
            .retain(|t| latest.get(&t.flow_key()) == Some(&t.year));
    }

    /// Sum totals that share flow, sector and year
    pub fn collapse_duplicates(&mut self) {
        let mut merged: Vec<FlowTotal> = Vec::with_capacity(self.totals.len());
        let mut index: HashMap<(String, SectorCode, u16), usize> = HashMap::new();
        for total in self.totals.drain(..) {
            let key = (total.flow_key(), total.sector.clone(), total.year);
            match index.get(&key) {
                Some(&i) => merged[i].amount += total.amount,
                None => {
                    index.insert(key, merged.len());
                    merged.push(total);
                }
            }
        }
        self.totals = merged;
    }

    pub fn total_amount(&self) -> f64 {
        self.totals.iter().map(|t| t.amount).sum()
    }
}

/// Industry output used to normalize flows reported for `year`.
///
/// Output of `year` is expressed in `io_year` dollars when both years are present
/// in the multi-year tables; otherwise IO-year industry output is used.
fn output_denominators(tables: &IOTables, year: u16, io_year: u16) -> EEIOResult<BTreeMap<SectorCode, f64>> {
    let years = tables.multi_year_industry_output.cols();
    let has_year = |y: u16| years.contains(&year_label(y));
    let output = if has_year(year) && has_year(io_year) {
        adjust_output_by_cpi(
            &tables.multi_year_industry_output,
            &tables.multi_year_industry_cpi,
            year,
            io_year,
        )?
    } else {
        tables.industry_output()
    };
    Ok(output.iter().map(|(k, v)| (k.to_string(), v)).collect())
}

/// Cast satellite totals into a flow × industry coefficient matrix.
///
/// Sectors that are not model industries are dropped with a warning. Flows keep
/// the order in which they first appear across `satellites`.
pub fn generate_flow_coefficients(
    satellites: &[SatelliteTable],
    tables: &IOTables,
    io_year: u16,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<LabeledMatrix> {
    let industries = tables.industry_codes();
    let mut flows: Vec<String> = Vec::new();
    for satellite in satellites {
        for key in satellite.flow_keys() {
            if !flows.contains(&key) {
                flows.push(key);
            }
        }
    }
    let flow_index: HashMap<&str, usize> = flows
        .iter()
        .enumerate()
        .map(|(i, f)| (f.as_str(), i))
        .collect();
    let industry_index: HashMap<&str, usize> = industries
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    let mut denominators: HashMap<u16, BTreeMap<SectorCode, f64>> = HashMap::new();
    let mut values = Array2::<f64>::zeros((flows.len(), industries.len()));
    for satellite in satellites {
        for total in &satellite.totals {
            let Some(&j) = industry_index.get(total.sector.as_str()) else {
                diagnostics.warn(
                    Stage::Satellite,
                    format!(
                        "{}: sector {} is not a model industry, dropping {}",
                        satellite.name,
                        total.sector,
                        total.flow_key()
                    ),
                );
                continue;
            };
            let key = total.flow_key();
            let i = flow_index[key.as_str()];
            if !denominators.contains_key(&total.year) {
                denominators.insert(total.year, output_denominators(tables, total.year, io_year)?);
            }
            let output = denominators
                .get(&total.year)
                .and_then(|d| d.get(&total.sector))
                .copied()
                .unwrap_or(0.0);
            if output != 0.0 {
                values[[i, j]] += total.amount / output;
            }
        }
    }
    LabeledMatrix::new("B", flows, industries, values)
}

/// Build the flow matrix `B`.
///
/// For commodity models the industry coefficients are re-attributed to
/// commodities through the market shares, `B · V_n`.
pub fn create_b_from_flow_data(
    satellites: &[SatelliteTable],
    tables: &IOTables,
    market_shares: &LabeledMatrix,
    orientation: Orientation,
    io_year: u16,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<LabeledMatrix> {
    let mut common: Vec<SatelliteTable> = satellites.to_vec();
    for satellite in common.iter_mut() {
        satellite.set_common_year_for_flow();
        satellite.collapse_duplicates();
    }
    let b = generate_flow_coefficients(&common, tables, io_year, diagnostics)?;
    diagnostics.info(
        Stage::Satellite,
        format!("B has {} flows over {} industries", b.nrows(), b.ncols()),
    );
    match orientation {
        Orientation::Commodity => b.dot(market_shares, "B"),
        Orientation::Industry => Ok(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_transform::generate_market_shares_from_make;
    use crate::tables::fixtures::two_sector_tables;
    use is_close::is_close;

    fn ghg() -> SatelliteTable {
        SatelliteTable::new(
            "GHG",
            vec![
                FlowTotal::new("CO2", "emission/air", "kg", "1/US", 50.0, 2012),
                FlowTotal::new("CO2", "emission/air", "kg", "2/US", 100.0, 2012),
                FlowTotal::new("CH4", "emission/air", "kg", "1/US", 10.0, 2010),
                FlowTotal::new("CH4", "emission/air", "kg", "1/US", 20.0, 2011),
            ],
        )
    }

    #[test]
    fn test_common_year_keeps_latest() {
        let mut s = ghg();
        s.set_common_year_for_flow();
        assert_eq!(s.totals.len(), 3);
        assert!(s
            .totals
            .iter()
            .filter(|t| t.flowable == "CH4")
            .all(|t| t.year == 2011));
    }

    #[test]
    fn test_collapse_duplicates() {
        let mut s = SatelliteTable::new(
            "water",
            vec![
                FlowTotal::new("Water", "resource/water", "kg", "1/US", 1.0, 2012),
                FlowTotal::new("Water", "resource/water", "kg", "1/US", 2.0, 2012),
            ],
        );
        s.collapse_duplicates();
        assert_eq!(s.totals.len(), 1);
        assert_eq!(s.totals[0].amount, 3.0);
    }

    #[test]
    fn test_industry_b() {
        let tables = two_sector_tables();
        let v_n = generate_market_shares_from_make(&tables).unwrap();
        let mut diagnostics = Diagnostics::new();
        let b = create_b_from_flow_data(
            &[ghg()],
            &tables,
            &v_n,
            Orientation::Industry,
            2012,
            &mut diagnostics,
        )
        .unwrap();
        // Industry outputs are 100 and 200
        assert!(is_close!(b.get("CO2/emission/air/kg", "1/US").unwrap(), 0.5));
        assert!(is_close!(b.get("CO2/emission/air/kg", "2/US").unwrap(), 0.5));
        assert!(is_close!(b.get("CH4/emission/air/kg", "1/US").unwrap(), 0.2));
        assert_eq!(b.get("CH4/emission/air/kg", "2/US"), Some(0.0));
    }

    #[test]
    fn test_commodity_b_uses_market_shares() {
        let tables = two_sector_tables();
        let v_n = generate_market_shares_from_make(&tables).unwrap();
        let mut diagnostics = Diagnostics::new();
        let b = create_b_from_flow_data(
            &[ghg()],
            &tables,
            &v_n,
            Orientation::Commodity,
            2012,
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(b.cols(), tables.commodity_codes().as_slice());
        // Commodity 2 is made 10/210 by industry 1 and 200/210 by industry 2
        let expected = 0.5 * 10.0 / 210.0 + 0.5 * 200.0 / 210.0;
        assert!(is_close!(b.get("CO2/emission/air/kg", "2/US").unwrap(), expected));
    }

    #[test]
    fn test_unknown_sector_is_dropped_with_warning() {
        let tables = two_sector_tables();
        let satellite = SatelliteTable::new(
            "GHG",
            vec![FlowTotal::new("CO2", "emission/air", "kg", "999/US", 5.0, 2012)],
        );
        let mut diagnostics = Diagnostics::new();
        let b = generate_flow_coefficients(&[satellite], &tables, 2012, &mut diagnostics).unwrap();
        assert_eq!(b.total(), 0.0);
        assert_eq!(diagnostics.warnings().count(), 1);
    }

    #[test]
    fn test_output_adjusted_to_io_year_dollars() {
        let tables = two_sector_tables();
        let years = vec!["2012".to_string(), "2017".to_string()];
        let industries = tables.industry_codes();
        let output = LabeledMatrix::new(
            "MultiYearIndustryOutput",
            industries.clone(),
            years.clone(),
            ndarray::array![[100.0, 150.0], [200.0, 200.0]],
        )
        .unwrap();
        let cpi = LabeledMatrix::new(
            "MultiYearIndustryCPI",
            industries,
            years,
            ndarray::array![[100.0, 150.0], [100.0, 100.0]],
        )
        .unwrap();
        let commodity_output = LabeledMatrix::new(
            "MultiYearCommodityOutput",
            tables.commodity_codes(),
            vec!["2012".into(), "2017".into()],
            ndarray::array![[90.0, 90.0], [210.0, 210.0]],
        )
        .unwrap();
        let commodity_cpi = LabeledMatrix::new(
            "MultiYearCommodityCPI",
            tables.commodity_codes(),
            vec!["2012".into(), "2017".into()],
            ndarray::array![[100.0, 100.0], [100.0, 100.0]],
        )
        .unwrap();
        let tables = tables
            .with_multi_year(output, commodity_output, cpi, commodity_cpi)
            .unwrap();

        let satellite = SatelliteTable::new(
            "GHG",
            vec![FlowTotal::new("CO2", "emission/air", "kg", "1/US", 50.0, 2017)],
        );
        let mut diagnostics = Diagnostics::new();
        let b = generate_flow_coefficients(&[satellite], &tables, 2012, &mut diagnostics).unwrap();
        // 150 in 2017 dollars is 100 in 2012 dollars
        assert!(is_close!(b.get("CO2/emission/air/kg", "1/US").unwrap(), 0.5));
    }
}
