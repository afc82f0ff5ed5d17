//! Economic tables of a model.
//!
//! [`IOTables`] holds every transaction table, the sector catalogs that label
//! them, and the multi-year output and price series. It is the mutable snapshot
//! that aggregation and disaggregation operate on. Each reshaping step bumps
//! [`IOTables::version`] so matrices derived from an earlier snapshot can be
//! detected as stale.

use crate::errors::{EEIOError, EEIOResult};
use crate::matrix::{LabeledMatrix, LabeledVector};
use crate::sectors::{Crosswalk, SectorCode, SectorTable};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Final demand column groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalDemandGroup {
    Household,
    Investment,
    ChangeInventories,
    Export,
    Import,
    Government,
}

/// Metadata of one final demand column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDemandSector {
    pub code_loc: SectorCode,
    pub name: String,
    pub group: FinalDemandGroup,
}

impl FinalDemandSector {
    pub fn new(code_loc: &str, name: &str, group: FinalDemandGroup) -> Self {
        Self {
            code_loc: code_loc.to_string(),
            name: name.to_string(),
            group,
        }
    }
}

/// Column label used for a year in the multi-year tables
pub fn year_label(year: u16) -> String {
    year.to_string()
}

/// Transaction tables and sector metadata of a model snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IOTables {
    version: u64,
    pub commodities: SectorTable,
    pub industries: SectorTable,
    pub final_demand_meta: Vec<FinalDemandSector>,
    /// Industry × commodity
    pub make: LabeledMatrix,
    /// Commodity × industry
    pub use_transactions: LabeledMatrix,
    /// Commodity × industry, imports removed
    pub domestic_use: LabeledMatrix,
    /// Value added component × industry
    pub use_value_added: LabeledMatrix,
    /// Commodity × final demand column
    pub final_demand: LabeledMatrix,
    pub domestic_final_demand: LabeledMatrix,
    /// Per commodity, in the units of the import column
    pub international_trade_adjustment: LabeledVector,
    /// Industry × year
    pub multi_year_industry_output: LabeledMatrix,
    /// Commodity × year
    pub multi_year_commodity_output: LabeledMatrix,
    /// Industry × year, IO year = 100
    pub multi_year_industry_cpi: LabeledMatrix,
    /// Commodity × year, IO year = 100
    pub multi_year_commodity_cpi: LabeledMatrix,
    pub crosswalk: Crosswalk,
}

impl IOTables {
    /// Assemble tables from the core transaction matrices.
    ///
    /// Domestic tables default to copies of the complete tables, the international
    /// trade adjustment to zero, and the multi-year series to a single `io_year`
    /// column holding the current outputs with a CPI of 100.
    pub fn new(
        commodities: SectorTable,
        industries: SectorTable,
        final_demand_meta: Vec<FinalDemandSector>,
        make: LabeledMatrix,
        use_transactions: LabeledMatrix,
        use_value_added: LabeledMatrix,
        final_demand: LabeledMatrix,
        io_year: u16,
    ) -> EEIOResult<Self> {
        let commodity_labels = commodities.code_locs();
        let industry_labels = industries.code_locs();
        let years = vec![year_label(io_year)];

        let commodity_output = use_transactions.row_sums() + final_demand.row_sums();
        let industry_output = use_transactions.col_sums() + use_value_added.col_sums();

        let multi_year_commodity_output = LabeledMatrix::new(
            "MultiYearCommodityOutput",
            commodity_labels.clone(),
            years.clone(),
            column_of(commodity_output.to_vec()),
        )?;
        let multi_year_industry_output = LabeledMatrix::new(
            "MultiYearIndustryOutput",
            industry_labels.clone(),
            years.clone(),
            column_of(industry_output.to_vec()),
        )?;
        let multi_year_commodity_cpi = LabeledMatrix::new(
            "MultiYearCommodityCPI",
            commodity_labels.clone(),
            years.clone(),
            Array2::from_elem((commodity_labels.len(), 1), 100.0),
        )?;
        let multi_year_industry_cpi = LabeledMatrix::new(
            "MultiYearIndustryCPI",
            industry_labels.clone(),
            years,
            Array2::from_elem((industry_labels.len(), 1), 100.0),
        )?;

        let tables = Self {
            version: 0,
            domestic_use: use_transactions.clone().renamed("DomesticUseTransactions"),
            domestic_final_demand: final_demand.clone().renamed("DomesticFinalDemand"),
            international_trade_adjustment: LabeledVector::zeros(
                "InternationalTradeAdjustment",
                commodity_labels,
            )?,
            commodities,
            industries,
            final_demand_meta,
            make,
            use_transactions,
            use_value_added,
            final_demand,
            multi_year_industry_output,
            multi_year_commodity_output,
            multi_year_industry_cpi,
            multi_year_commodity_cpi,
            crosswalk: Crosswalk::default(),
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Replace the domestic tables and international trade adjustment
    pub fn with_domestic(
        mut self,
        domestic_use: LabeledMatrix,
        domestic_final_demand: LabeledMatrix,
        international_trade_adjustment: LabeledVector,
    ) -> EEIOResult<Self> {
        self.domestic_use = domestic_use;
        self.domestic_final_demand = domestic_final_demand;
        self.international_trade_adjustment = international_trade_adjustment;
        self.validate()?;
        Ok(self)
    }

    /// Replace the multi-year output and CPI series
    pub fn with_multi_year(
        mut self,
        industry_output: LabeledMatrix,
        commodity_output: LabeledMatrix,
        industry_cpi: LabeledMatrix,
        commodity_cpi: LabeledMatrix,
    ) -> EEIOResult<Self> {
        self.multi_year_industry_output = industry_output;
        self.multi_year_commodity_output = commodity_output;
        self.multi_year_industry_cpi = industry_cpi;
        self.multi_year_commodity_cpi = commodity_cpi;
        self.validate()?;
        Ok(self)
    }

    pub fn with_crosswalk(mut self, crosswalk: Crosswalk) -> Self {
        self.crosswalk = crosswalk;
        self
    }

    /// Snapshot counter, incremented by every reshaping step
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn mark_modified(&mut self) {
        self.version += 1;
    }

    pub fn commodity_codes(&self) -> Vec<SectorCode> {
        self.commodities.code_locs()
    }

    pub fn industry_codes(&self) -> Vec<SectorCode> {
        self.industries.code_locs()
    }

    /// Commodity output `q`: row sums of Use plus row sums of final demand
    pub fn commodity_output(&self) -> LabeledVector {
        let mut q = self.use_transactions.row_totals("CommodityOutput");
        *q.values_mut() += &self.final_demand.row_sums();
        q
    }

    /// Industry output `x`: column sums of Use plus column sums of value added
    pub fn industry_output(&self) -> LabeledVector {
        let mut x = self.use_transactions.col_totals("IndustryOutput");
        *x.values_mut() += &self.use_value_added.col_sums();
        x
    }

    /// Final demand column codes belonging to the given groups, in table order
    pub fn final_demand_codes(&self, groups: &[FinalDemandGroup]) -> Vec<SectorCode> {
        self.final_demand_meta
            .iter()
            .filter(|m| groups.contains(&m.group))
            .map(|m| m.code_loc.clone())
            .collect()
    }

    /// Check that every table is labelled exactly by the current sector tables.
    pub fn validate(&self) -> EEIOResult<()> {
        let commodities = self.commodity_codes();
        let industries = self.industry_codes();

        self.make.ensure_labels(&industries, &commodities)?;
        self.use_transactions.ensure_labels(&commodities, &industries)?;
        self.domestic_use.ensure_labels(&commodities, &industries)?;
        self.use_value_added
            .ensure_labels(self.use_value_added.rows(), &industries)?;
        self.final_demand
            .ensure_labels(&commodities, self.final_demand.cols())?;
        self.domestic_final_demand
            .ensure_labels(&commodities, self.final_demand.cols())?;
        self.international_trade_adjustment
            .ensure_labels(&commodities)?;

        let years = self.multi_year_industry_output.cols();
        self.multi_year_industry_output
            .ensure_labels(&industries, years)?;
        self.multi_year_industry_cpi.ensure_labels(&industries, years)?;
        self.multi_year_commodity_output
            .ensure_labels(&commodities, years)?;
        self.multi_year_commodity_cpi
            .ensure_labels(&commodities, years)?;

        let fd_meta: Vec<&str> = self
            .final_demand_meta
            .iter()
            .map(|m| m.code_loc.as_str())
            .collect();
        if let Some(missing) = fd_meta
            .iter()
            .find(|code| self.final_demand.col_index(code).is_none())
        {
            return Err(EEIOError::mismatch(
                "final demand metadata",
                missing,
                self.final_demand.cols(),
            ));
        }
        Ok(())
    }
}

fn column_of(values: Vec<f64>) -> Array2<f64> {
    let n = values.len();
    Array2::from_shape_vec((n, 1), values).unwrap_or_else(|_| Array2::zeros((n, 1)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small two-sector tables shared by unit tests across the crate.

    use super::*;
    use crate::sectors::{Sector, SectorKind};

    pub fn two_sector_tables() -> IOTables {
        let commodities = SectorTable::new(
            SectorKind::Commodity,
            vec![
                Sector::new("1", "US", "Agriculture", "Primary"),
                Sector::new("2", "US", "Manufacturing", "Secondary"),
            ],
        )
        .unwrap();
        let industries = SectorTable::new(
            SectorKind::Industry,
            vec![
                Sector::new("1", "US", "Agriculture", "Primary"),
                Sector::new("2", "US", "Manufacturing", "Secondary"),
            ],
        )
        .unwrap();
        let sectors = ["1/US", "2/US"];
        let make = LabeledMatrix::from_rows(
            "MakeTransactions",
            &sectors,
            &sectors,
            vec![vec![90.0, 10.0], vec![0.0, 200.0]],
        )
        .unwrap();
        let use_transactions = LabeledMatrix::from_rows(
            "UseTransactions",
            &sectors,
            &sectors,
            vec![vec![10.0, 40.0], vec![20.0, 60.0]],
        )
        .unwrap();
        let value_added = LabeledMatrix::from_rows(
            "UseValueAdded",
            &["V001/US"],
            &sectors,
            vec![vec![70.0, 100.0]],
        )
        .unwrap();
        let final_demand = LabeledMatrix::from_rows(
            "FinalDemand",
            &sectors,
            &["F010/US", "F040/US"],
            vec![vec![40.0, 0.0], vec![100.0, 30.0]],
        )
        .unwrap();
        IOTables::new(
            commodities,
            industries,
            vec![
                FinalDemandSector::new("F010/US", "Household", FinalDemandGroup::Household),
                FinalDemandSector::new("F040/US", "Exports", FinalDemandGroup::Export),
            ],
            make,
            use_transactions,
            value_added,
            final_demand,
            2012,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::two_sector_tables;
    use super::*;

    #[test]
    fn outputs_are_derived_from_use() {
        let tables = two_sector_tables();
        let q = tables.commodity_output();
        let x = tables.industry_output();
        assert_eq!(q.values().to_vec(), vec![90.0, 210.0]);
        assert_eq!(x.values().to_vec(), vec![100.0, 200.0]);
        assert_eq!(
            tables.multi_year_industry_output.get("2/US", "2012"),
            Some(200.0)
        );
    }

    #[test]
    fn validation_detects_misaligned_tables() {
        let mut tables = two_sector_tables();
        tables.use_transactions = tables
            .use_transactions
            .select_rows(&["2/US".to_string(), "1/US".to_string()])
            .unwrap();
        assert!(matches!(
            tables.validate(),
            Err(EEIOError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn version_counts_modifications() {
        let mut tables = two_sector_tables();
        assert_eq!(tables.version(), 0);
        tables.mark_modified();
        tables.mark_modified();
        assert_eq!(tables.version(), 2);
    }

    #[test]
    fn final_demand_codes_by_group() {
        let tables = two_sector_tables();
        assert_eq!(
            tables.final_demand_codes(&[FinalDemandGroup::Export]),
            vec!["F040/US".to_string()]
        );
    }
}
