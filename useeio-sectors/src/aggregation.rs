//! Sector aggregation.
//!
//! An [`AggregationSpec`] names a target sector followed by the sectors merged
//! into it. Each merge runs in a fixed order:
//!
//! 1. transaction tables: merged rows and columns are added into the target and
//!    then dropped,
//! 2. sector catalogs: merged commodities and industries are removed,
//! 3. CPI and output series: CPI becomes the output-weighted average of the
//!    merged sectors (computed before the outputs are summed), then outputs are
//!    summed into the target,
//! 4. crosswalk: merged codes are re-pointed to the target.
//!
//! A sector that is absent from the model is skipped with a warning rather than
//! raising an error, so re-applying a spec that was already applied is a no-op.
//! A sector listed more than once is merged once. Merging a sector that is an
//! industry (or commodity) into a target that is not is a configuration error,
//! since its totals would have nowhere to go.

use useeio_core::diagnostics::{Diagnostics, Stage};
use useeio_core::errors::{EEIOError, EEIOResult};
use useeio_core::matrix::LabeledMatrix;
use useeio_core::satellite::SatelliteTable;
use useeio_core::sectors::split_code_loc;
use useeio_core::specs::AggregationSpec;
use useeio_core::tables::IOTables;

/// Which axes of a table are keyed by sector codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    /// Industry × commodity
    Make,
    /// Commodity × industry
    Use,
    /// Value added component × industry
    ValueAdded,
    /// Commodity × final demand column
    FinalDemand,
}

impl TableType {
    fn sector_rows(self) -> bool {
        matches!(self, TableType::Make | TableType::Use | TableType::FinalDemand)
    }

    fn sector_cols(self) -> bool {
        matches!(self, TableType::Make | TableType::Use | TableType::ValueAdded)
    }
}

/// Which axes of a table were merged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub rows_merged: bool,
    pub cols_merged: bool,
}

impl MergeOutcome {
    pub fn any(&self) -> bool {
        self.rows_merged || self.cols_merged
    }
}

/// Add the row and column of `remove` into those of `main` and zero them.
///
/// An axis is only merged when both sectors are found on it; nothing is dropped.
///
/// ```rust
/// use useeio_core::matrix::LabeledMatrix;
/// use useeio_sectors::aggregation::{aggregate_sector, TableType};
///
/// let mut z = LabeledMatrix::from_rows(
///     "Use",
///     &["X", "Y"],
///     &["X", "Y"],
///     vec![vec![10.0, 5.0], vec![3.0, 2.0]],
/// )
/// .unwrap();
/// let outcome = aggregate_sector(&mut z, "X", "Y", TableType::Use);
/// assert!(outcome.rows_merged && outcome.cols_merged);
/// assert_eq!(z.get("X", "X"), Some(20.0));
/// ```
pub fn aggregate_sector(
    table: &mut LabeledMatrix,
    main: &str,
    remove: &str,
    table_type: TableType,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    if table_type.sector_rows() {
        if let (Some(target), Some(source)) = (table.row_index(main), table.row_index(remove)) {
            table.merge_rows(target, source);
            outcome.rows_merged = true;
        }
    }
    if table_type.sector_cols() {
        if let (Some(target), Some(source)) = (table.col_index(main), table.col_index(remove)) {
            table.merge_cols(target, source);
            outcome.cols_merged = true;
        }
    }
    outcome
}

/// Drop the (already zeroed) row and column of `sector`
pub fn drop_sector(table: &mut LabeledMatrix, sector: &str, table_type: TableType) {
    if table_type.sector_rows() {
        table.remove_row(sector);
    }
    if table_type.sector_cols() {
        table.remove_col(sector);
    }
}

fn merge_and_drop(table: &mut LabeledMatrix, main: &str, remove: &str, table_type: TableType) -> MergeOutcome {
    let outcome = aggregate_sector(table, main, remove, table_type);
    drop_sector(table, remove, table_type);
    outcome
}

/// Output-weighted CPI of `main` and `others`, written into the row of `main`.
///
/// Must run before the outputs of `others` are added to `main`. A year whose
/// total output is zero keeps the CPI of `main`.
pub fn weight_cpi_by_output(
    cpi: &mut LabeledMatrix,
    output: &LabeledMatrix,
    main: &str,
    others: &[&str],
) {
    let Some(main_row) = cpi.row_index(main) else {
        return;
    };
    let mut members: Vec<(usize, usize)> = Vec::with_capacity(others.len() + 1);
    for s in std::iter::once(main).chain(others.iter().copied()) {
        if let (Some(r_cpi), Some(r_out)) = (cpi.row_index(s), output.row_index(s)) {
            if !members.contains(&(r_cpi, r_out)) {
                members.push((r_cpi, r_out));
            }
        }
    }

    for year in cpi.cols().to_vec() {
        let (Some(j_cpi), Some(j_out)) = (cpi.col_index(&year), output.col_index(&year)) else {
            continue;
        };
        let total: f64 = members
            .iter()
            .map(|&(_, r_out)| output.values()[[r_out, j_out]])
            .sum();
        if total == 0.0 {
            continue;
        }
        let weighted: f64 = members
            .iter()
            .map(|&(r_cpi, r_out)| cpi.values()[[r_cpi, j_cpi]] * output.values()[[r_out, j_out]] / total)
            .sum();
        cpi.values_mut()[[main_row, j_cpi]] = weighted;
    }
}

fn sum_series(series: &mut LabeledMatrix, main: &str, remove: &str) {
    if let (Some(target), Some(source)) = (series.row_index(main), series.row_index(remove)) {
        series.merge_rows(target, source);
    }
    series.remove_row(remove);
}

/// Re-label satellite totals of `merged` sectors to `target` and sum duplicates
pub fn aggregate_satellite(satellite: &mut SatelliteTable, target: &str, merged: &[&str]) -> usize {
    let mut relabelled = 0;
    for total in satellite.totals.iter_mut() {
        if merged.contains(&total.sector.as_str()) {
            total.sector = target.to_string();
            relabelled += 1;
        }
    }
    satellite.collapse_duplicates();
    relabelled
}

/// Apply one aggregation spec to `tables` and `satellites`.
///
/// The merge is staged on copies and only written back when every step
/// succeeds, so on error `tables` and `satellites` are unchanged. Returns the
/// number of sectors merged into the target.
pub fn aggregate_model(
    tables: &mut IOTables,
    satellites: &mut [SatelliteTable],
    spec: &AggregationSpec,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<usize> {
    let mut staged_tables = tables.clone();
    let mut staged_satellites = satellites.to_vec();
    let mut staged_diagnostics = Diagnostics::new();
    let merged = merge_sectors(
        &mut staged_tables,
        &mut staged_satellites,
        spec,
        &mut staged_diagnostics,
    )?;
    if merged > 0 {
        *tables = staged_tables;
        satellites.clone_from_slice(&staged_satellites);
    }
    diagnostics.extend(staged_diagnostics);
    Ok(merged)
}

fn merge_sectors(
    tables: &mut IOTables,
    satellites: &mut [SatelliteTable],
    spec: &AggregationSpec,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<usize> {
    let Some(target) = spec.target() else {
        diagnostics.warn(Stage::Aggregation, "aggregation spec without sectors skipped");
        return Ok(0);
    };
    if !tables.commodities.contains(target) && !tables.industries.contains(target) {
        diagnostics.warn(
            Stage::Aggregation,
            format!("target sector {} not found, aggregation skipped", target),
        );
        return Ok(0);
    }

    let mut merged: Vec<&str> = Vec::with_capacity(spec.merged().len());
    for s in spec.merged().iter().map(|s| s.as_str()) {
        if s == target || merged.contains(&s) {
            continue;
        }
        if tables.commodities.contains(s) || tables.industries.contains(s) {
            merged.push(s);
        } else {
            diagnostics.warn(
                Stage::Aggregation,
                format!("sector {} not found, not merged into {}", s, target),
            );
        }
    }
    if merged.is_empty() {
        return Ok(0);
    }
    for other in &merged {
        let axis = if tables.commodities.contains(other) && !tables.commodities.contains(target) {
            Some("a commodity")
        } else if tables.industries.contains(other) && !tables.industries.contains(target) {
            Some("an industry")
        } else {
            None
        };
        if let Some(axis) = axis {
            return Err(EEIOError::Configuration(format!(
                "cannot merge {} into {}: {} is not {}",
                other, target, target, axis
            )));
        }
    }

    // 1. Transaction tables
    for other in &merged {
        let outcome = merge_and_drop(&mut tables.make, target, other, TableType::Make);
        merge_and_drop(&mut tables.use_transactions, target, other, TableType::Use);
        merge_and_drop(&mut tables.domestic_use, target, other, TableType::Use);
        merge_and_drop(&mut tables.use_value_added, target, other, TableType::ValueAdded);
        merge_and_drop(&mut tables.final_demand, target, other, TableType::FinalDemand);
        merge_and_drop(
            &mut tables.domestic_final_demand,
            target,
            other,
            TableType::FinalDemand,
        );
        tables.international_trade_adjustment.merge_into(target, other);
        log::debug!(
            "Merged {} into {} (make rows: {}, make columns: {})",
            other,
            target,
            outcome.rows_merged,
            outcome.cols_merged
        );
    }

    // 2. Sector catalogs
    for other in &merged {
        tables.commodities.remove(other);
        tables.industries.remove(other);
    }

    // 3. CPI, then output
    weight_cpi_by_output(
        &mut tables.multi_year_industry_cpi,
        &tables.multi_year_industry_output,
        target,
        &merged,
    );
    weight_cpi_by_output(
        &mut tables.multi_year_commodity_cpi,
        &tables.multi_year_commodity_output,
        target,
        &merged,
    );
    for other in &merged {
        tables.multi_year_industry_cpi.remove_row(other);
        tables.multi_year_commodity_cpi.remove_row(other);
        sum_series(&mut tables.multi_year_industry_output, target, other);
        sum_series(&mut tables.multi_year_commodity_output, target, other);
    }

    // 4. Crosswalk
    let bare = |s: &str| split_code_loc(s).map(|(code, _)| code.to_string()).unwrap_or_else(|| s.to_string());
    let merged_codes: Vec<String> = merged.iter().map(|s| bare(s)).collect();
    let merged_refs: Vec<&str> = merged_codes.iter().map(|s| s.as_str()).collect();
    tables.crosswalk.aggregate(&bare(target), &merged_refs);

    for satellite in satellites.iter_mut() {
        aggregate_satellite(satellite, target, &merged);
    }

    tables.mark_modified();
    tables.validate()?;
    diagnostics.info(
        Stage::Aggregation,
        format!("merged {} into {}", merged.join(", "), target),
    );
    Ok(merged.len())
}

/// Apply aggregation specs in order
pub fn aggregate_all(
    tables: &mut IOTables,
    satellites: &mut [SatelliteTable],
    specs: &[AggregationSpec],
    diagnostics: &mut Diagnostics,
) -> EEIOResult<usize> {
    let mut total = 0;
    for spec in specs {
        total += aggregate_model(tables, satellites, spec, diagnostics)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use useeio_core::matrix::LabeledVector;
    use useeio_core::satellite::FlowTotal;
    use useeio_core::sectors::{Crosswalk, CrosswalkEntry, Sector, SectorKind, SectorTable};
    use useeio_core::tables::{FinalDemandGroup, FinalDemandSector};

    fn three_sector_tables() -> IOTables {
        let sectors = vec![
            Sector::new("A", "US", "Sector A", "Primary"),
            Sector::new("B", "US", "Sector B", "Secondary"),
            Sector::new("C", "US", "Sector C", "Tertiary"),
        ];
        let codes = ["A/US", "B/US", "C/US"];
        let make = LabeledMatrix::from_rows(
            "Make",
            &codes,
            &codes,
            vec![
                vec![100.0, 0.0, 0.0],
                vec![0.0, 50.0, 0.0],
                vec![0.0, 0.0, 150.0],
            ],
        )
        .unwrap();
        let use_transactions = LabeledMatrix::from_rows(
            "Use",
            &codes,
            &codes,
            vec![
                vec![10.0, 5.0, 20.0],
                vec![3.0, 2.0, 10.0],
                vec![7.0, 3.0, 30.0],
            ],
        )
        .unwrap();
        let value_added = LabeledMatrix::from_rows(
            "VA",
            &["V001/US"],
            &codes,
            vec![vec![80.0, 40.0, 90.0]],
        )
        .unwrap();
        let final_demand = LabeledMatrix::from_rows(
            "FD",
            &codes,
            &["F010/US"],
            vec![vec![65.0], vec![35.0], vec![110.0]],
        )
        .unwrap();
        let tables = IOTables::new(
            SectorTable::new(SectorKind::Commodity, sectors.clone()).unwrap(),
            SectorTable::new(SectorKind::Industry, sectors).unwrap(),
            vec![FinalDemandSector::new("F010/US", "Household", FinalDemandGroup::Household)],
            make,
            use_transactions,
            value_added,
            final_demand,
            2012,
        )
        .unwrap();
        let mut cpi = tables.multi_year_industry_cpi.clone();
        cpi.set("A/US", "2012", 110.0).unwrap();
        cpi.set("B/US", "2012", 80.0).unwrap();
        let commodity_cpi = tables.multi_year_commodity_cpi.clone();
        let industry_output = tables.multi_year_industry_output.clone();
        let commodity_output = tables.multi_year_commodity_output.clone();
        tables
            .with_multi_year(industry_output, commodity_output, cpi, commodity_cpi)
            .unwrap()
            .with_crosswalk(Crosswalk::new(vec![
                CrosswalkEntry {
                    naics: "1111".into(),
                    bea_sector: "1".into(),
                    bea_summary: "A".into(),
                    bea_detail: "A0".into(),
                    useeio: "A".into(),
                },
                CrosswalkEntry {
                    naics: "2222".into(),
                    bea_sector: "2".into(),
                    bea_summary: "B".into(),
                    bea_detail: "B0".into(),
                    useeio: "B".into(),
                },
            ]))
    }

    #[test]
    fn test_aggregate_sector_conserves_rows() {
        let mut use_table = LabeledMatrix::from_rows(
            "Use",
            &["X/US", "Y/US"],
            &["c1", "c2"],
            vec![vec![10.0, 5.0], vec![3.0, 2.0]],
        )
        .unwrap();
        let outcome = aggregate_sector(&mut use_table, "X/US", "Y/US", TableType::FinalDemand);
        assert!(outcome.rows_merged);
        assert!(!outcome.cols_merged);
        drop_sector(&mut use_table, "Y/US", TableType::FinalDemand);
        assert_eq!(use_table.row("X/US").unwrap().to_vec(), vec![13.0, 7.0]);
        assert!(use_table.row_index("Y/US").is_none());
    }

    #[test]
    fn test_missing_sector_is_noop() {
        let mut use_table = LabeledMatrix::from_rows("Use", &["X"], &["X"], vec![vec![1.0]]).unwrap();
        let before = use_table.clone();
        let outcome = aggregate_sector(&mut use_table, "X", "Z", TableType::Use);
        assert!(!outcome.any());
        assert_eq!(use_table, before);
    }

    #[test]
    fn test_aggregate_model() {
        let mut tables = three_sector_tables();
        let before = tables.clone();
        let mut satellites = vec![SatelliteTable::new(
            "GHG",
            vec![
                FlowTotal::new("CO2", "emission/air", "kg", "A/US", 1.0, 2012),
                FlowTotal::new("CO2", "emission/air", "kg", "B/US", 2.0, 2012),
            ],
        )];
        let mut diagnostics = Diagnostics::new();
        let merged = aggregate_model(
            &mut tables,
            &mut satellites,
            &AggregationSpec::new(&["A/US", "B/US"]),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(merged, 1);
        assert_eq!(tables.commodity_codes(), vec!["A/US", "C/US"]);
        assert_eq!(tables.industry_codes(), vec!["A/US", "C/US"]);
        assert_eq!(tables.version(), before.version() + 1);

        // Every unaffected column keeps its total
        assert_eq!(tables.use_transactions.get("A/US", "C/US"), Some(30.0));
        assert_eq!(tables.use_transactions.get("C/US", "A/US"), Some(10.0));
        assert_eq!(tables.use_transactions.get("A/US", "A/US"), Some(20.0));
        assert!(is_close!(tables.use_transactions.total(), before.use_transactions.total()));
        assert!(is_close!(tables.make.total(), before.make.total()));
        assert_eq!(tables.final_demand.get("A/US", "F010/US"), Some(100.0));
        assert_eq!(tables.use_value_added.get("V001/US", "A/US"), Some(120.0));

        // Outputs of 100 and 50 at CPI 110 and 80
        let cpi = tables.multi_year_industry_cpi.get("A/US", "2012").unwrap();
        assert!(is_close!(cpi, (110.0 * 100.0 + 80.0 * 50.0) / 150.0));
        assert_eq!(tables.multi_year_industry_output.get("A/US", "2012"), Some(150.0));

        assert_eq!(tables.crosswalk.naics_for("A"), vec!["1111", "2222"]);
        assert_eq!(satellites[0].totals.len(), 1);
        assert_eq!(satellites[0].totals[0].amount, 3.0);
    }

    #[test]
    fn test_repeated_sector_is_merged_once() {
        let mut tables = three_sector_tables();
        let before = tables.clone();
        let mut diagnostics = Diagnostics::new();
        let merged = aggregate_model(
            &mut tables,
            &mut [],
            &AggregationSpec::new(&["A/US", "B/US", "B/US"]),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(merged, 1);
        let cpi = tables.multi_year_industry_cpi.get("A/US", "2012").unwrap();
        assert!(is_close!(cpi, (110.0 * 100.0 + 80.0 * 50.0) / 150.0));
        assert_eq!(tables.multi_year_industry_output.get("A/US", "2012"), Some(150.0));
        assert!(is_close!(tables.use_transactions.total(), before.use_transactions.total()));
    }

    #[test]
    fn test_repeated_member_weights_cpi_once() {
        let mut cpi = LabeledMatrix::from_rows("CPI", &["A", "B"], &["2012"], vec![vec![100.0], vec![130.0]])
            .unwrap();
        let output = LabeledMatrix::from_rows("Out", &["A", "B"], &["2012"], vec![vec![20.0], vec![10.0]])
            .unwrap();
        weight_cpi_by_output(&mut cpi, &output, "A", &["B", "B", "A"]);
        assert!(is_close!(cpi.get("A", "2012").unwrap(), 110.0));
    }

    /// Commodities A, B and C but only industries A and B
    fn commodity_only_tables() -> IOTables {
        let sectors = vec![
            Sector::new("A", "US", "Sector A", "Primary"),
            Sector::new("B", "US", "Sector B", "Secondary"),
            Sector::new("C", "US", "Sector C", "Tertiary"),
        ];
        let commodities = ["A/US", "B/US", "C/US"];
        let industries = ["A/US", "B/US"];
        IOTables::new(
            SectorTable::new(SectorKind::Commodity, sectors.clone()).unwrap(),
            SectorTable::new(SectorKind::Industry, sectors[..2].to_vec()).unwrap(),
            vec![FinalDemandSector::new("F010/US", "Household", FinalDemandGroup::Household)],
            LabeledMatrix::from_rows(
                "Make",
                &industries,
                &commodities,
                vec![vec![90.0, 0.0, 10.0], vec![0.0, 200.0, 0.0]],
            )
            .unwrap(),
            LabeledMatrix::from_rows(
                "Use",
                &commodities,
                &industries,
                vec![vec![10.0, 20.0], vec![20.0, 60.0], vec![0.0, 20.0]],
            )
            .unwrap(),
            LabeledMatrix::from_rows("VA", &["V001/US"], &industries, vec![vec![70.0, 100.0]]).unwrap(),
            LabeledMatrix::from_rows("FD", &commodities, &["F010/US"], vec![vec![60.0], vec![120.0], vec![-10.0]])
                .unwrap(),
            2012,
        )
        .unwrap()
    }

    #[test]
    fn test_merge_into_commodity_only_target_is_rejected() {
        let mut tables = commodity_only_tables();
        let before = tables.clone();
        let mut diagnostics = Diagnostics::new();
        let result = aggregate_model(
            &mut tables,
            &mut [],
            &AggregationSpec::new(&["C/US", "B/US"]),
            &mut diagnostics,
        );
        assert!(matches!(result, Err(EEIOError::Configuration(_))));
        assert_eq!(tables, before);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_merge_commodity_only_source_conserves_totals() {
        let mut tables = commodity_only_tables();
        let before = tables.clone();
        let mut diagnostics = Diagnostics::new();
        let merged = aggregate_model(
            &mut tables,
            &mut [],
            &AggregationSpec::new(&["A/US", "C/US"]),
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(merged, 1);
        assert_eq!(tables.commodity_codes(), vec!["A/US", "B/US"]);
        assert_eq!(tables.industry_codes(), vec!["A/US", "B/US"]);
        assert_eq!(tables.make.get("A/US", "A/US"), Some(100.0));
        assert!(is_close!(tables.make.total(), before.make.total()));
        assert!(is_close!(tables.use_transactions.total(), before.use_transactions.total()));
        assert!(is_close!(tables.use_value_added.total(), before.use_value_added.total()));
    }

    #[test]
    fn test_reapplying_is_noop() {
        let mut tables = three_sector_tables();
        let spec = AggregationSpec::new(&["A/US", "B/US"]);
        let mut diagnostics = Diagnostics::new();
        aggregate_model(&mut tables, &mut [], &spec, &mut diagnostics).unwrap();
        let once = tables.clone();

        let merged = aggregate_model(&mut tables, &mut [], &spec, &mut diagnostics).unwrap();
        assert_eq!(merged, 0);
        assert_eq!(tables, once);
        assert!(diagnostics.warnings().count() >= 1);
    }

    #[test]
    fn test_zero_output_keeps_target_cpi() {
        let mut cpi = LabeledMatrix::from_rows("CPI", &["A", "B"], &["2012"], vec![vec![100.0], vec![120.0]])
            .unwrap();
        let output = LabeledMatrix::from_rows("Out", &["A", "B"], &["2012"], vec![vec![0.0], vec![0.0]])
            .unwrap();
        weight_cpi_by_output(&mut cpi, &output, "A", &["B"]);
        assert_eq!(cpi.get("A", "2012"), Some(100.0));
    }

    #[test]
    fn test_trade_adjustment_is_merged() {
        let mut tables = three_sector_tables();
        tables.international_trade_adjustment =
            LabeledVector::from_pairs("ITA", &[("A/US", 1.0), ("B/US", 2.0), ("C/US", 3.0)]).unwrap();
        let mut diagnostics = Diagnostics::new();
        aggregate_all(
            &mut tables,
            &mut [],
            &[AggregationSpec::new(&["C/US", "A/US"])],
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(tables.international_trade_adjustment.get("C/US"), Some(4.0));
        assert_eq!(tables.international_trade_adjustment.len(), 2);
    }
}
