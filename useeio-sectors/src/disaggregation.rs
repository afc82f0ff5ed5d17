//! Sector disaggregation.
//!
//! A [`DisaggregationSpec`] replaces one sector with several new sectors, at the
//! position of the original in every table. How the original row, column and
//! intersection cell are shared out is decided by an [`Allocation`]:
//!
//! - [`UniformAllocation`] copies the original row and column scaled by the
//!   default ratios and puts the intersection cell on the diagonal of the new
//!   block only, as `original / N` in every diagonal entry whatever the ratios.
//! - [`UserDefinedAllocation`] takes explicit `(row, column, share)` entries.
//!   A row or column fully covered by entries uses them as given; a partially
//!   covered one shares the remainder among the uncovered new sectors in
//!   proportion to the default ratios.
//!
//! After each table is split the new rows and columns are summed back and
//! compared with the original table. A difference beyond the conservation
//! tolerance is a [`EEIOError::Numeric`] error.

use crate::balance::balance_disagg;
use ndarray::Array2;
use std::collections::HashMap;
use useeio_core::diagnostics::{Diagnostics, Stage};
use useeio_core::errors::{EEIOError, EEIOResult};
use useeio_core::matrix::LabeledMatrix;
use useeio_core::satellite::{FlowTotal, SatelliteTable};
use useeio_core::sectors::{split_code_loc, Sector};
use useeio_core::specs::{AllocationEntry, AllocationMode, DisaggregationSpec, FlowAllocationEntry, Tolerances};
use useeio_core::tables::IOTables;

const SHARE_TOLERANCE: f64 = 1e-6;

/// Shares of an original sector's row, column and intersection cell.
///
/// All share vectors have one entry per new sector, in the order of the new codes.
pub trait Allocation {
    /// Number of new sectors
    fn len(&self) -> usize;

    /// Shares of the original row's cell in column `col`, one per new row
    fn row_shares(&self, col: &str) -> Vec<f64>;

    /// Shares of the original column's cell in row `row`, one per new column
    fn col_shares(&self, row: &str) -> Vec<f64>;

    /// Shares of the original intersection cell over the new × new block
    fn intersection(&self) -> Array2<f64>;
}

/// Every cell of the original row/column split by the same ratios
#[derive(Debug, Clone, PartialEq)]
pub struct UniformAllocation {
    ratios: Vec<f64>,
}

impl UniformAllocation {
    pub fn new(ratios: Vec<f64>) -> Self {
        Self { ratios }
    }

    pub fn equal(n: usize) -> Self {
        Self::new(vec![1.0 / n as f64; n])
    }
}

impl Allocation for UniformAllocation {
    fn len(&self) -> usize {
        self.ratios.len()
    }

    fn row_shares(&self, _col: &str) -> Vec<f64> {
        self.ratios.clone()
    }

    fn col_shares(&self, _row: &str) -> Vec<f64> {
        self.ratios.clone()
    }

    fn intersection(&self) -> Array2<f64> {
        let n = self.ratios.len();
        Array2::eye(n) / n.max(1) as f64
    }
}

/// Copies the original value to every new sector (used for price indices)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Replicate {
    n: usize,
}

impl Replicate {
    pub fn new(n: usize) -> Self {
        Self { n }
    }
}

impl Allocation for Replicate {
    fn len(&self) -> usize {
        self.n
    }

    fn row_shares(&self, _col: &str) -> Vec<f64> {
        vec![1.0; self.n]
    }

    fn col_shares(&self, _row: &str) -> Vec<f64> {
        vec![1.0; self.n]
    }

    fn intersection(&self) -> Array2<f64> {
        Array2::eye(self.n)
    }
}

/// Explicit allocation entries with default ratios filling the gaps
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedAllocation {
    ratios: Vec<f64>,
    rows: HashMap<String, Vec<f64>>,
    cols: HashMap<String, Vec<f64>>,
    intersection: Array2<f64>,
}

/// Complete partially specified shares with the remainder split by `ratios`.
///
/// `preassigned` is share already taken outside `partial`, e.g. by off-diagonal
/// intersection cells.
fn fill_shares(context: &str, partial: &[Option<f64>], ratios: &[f64], preassigned: f64) -> EEIOResult<Vec<f64>> {
    let covered: f64 = partial.iter().flatten().sum::<f64>() + preassigned;
    let remainder = 1.0 - covered;
    let uncovered: Vec<usize> = partial
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_none())
        .map(|(k, _)| k)
        .collect();

    if uncovered.is_empty() {
        if remainder.abs() > SHARE_TOLERANCE {
            return Err(EEIOError::Configuration(format!(
                "allocation for {} covers every new sector but sums to {}",
                context, covered
            )));
        }
    } else if remainder < -SHARE_TOLERANCE {
        return Err(EEIOError::Configuration(format!(
            "allocation for {} exceeds the original value ({})",
            context, covered
        )));
    }

    let weight: f64 = uncovered.iter().map(|&k| ratios[k]).sum();
    Ok(partial
        .iter()
        .enumerate()
        .map(|(k, p)| match p {
            Some(share) => *share,
            None if weight > 0.0 => remainder * ratios[k] / weight,
            None => remainder / uncovered.len() as f64,
        })
        .collect())
}

impl UserDefinedAllocation {
    /// Resolve `entries` against the new sector codes.
    ///
    /// Each entry must reference a new sector on at least one axis.
    pub fn new(entries: &[AllocationEntry], new_codes: &[String], ratios: Vec<f64>) -> EEIOResult<Self> {
        let n = new_codes.len();
        let position = |code: &str| new_codes.iter().position(|c| c == code);

        let mut rows: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        let mut cols: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        let mut diagonal: Vec<Option<f64>> = vec![None; n];
        let mut off_diagonal = Array2::<f64>::zeros((n, n));

        for entry in entries {
            if !(0.0..=1.0).contains(&entry.percent) {
                return Err(EEIOError::Configuration(format!(
                    "allocation share {} for ({}, {}) is outside [0, 1]",
                    entry.percent, entry.row, entry.col
                )));
            }
            match (position(&entry.row), position(&entry.col)) {
                (Some(k), None) => {
                    rows.entry(entry.col.clone()).or_insert_with(|| vec![None; n])[k] = Some(entry.percent)
                }
                (None, Some(l)) => {
                    cols.entry(entry.row.clone()).or_insert_with(|| vec![None; n])[l] = Some(entry.percent)
                }
                (Some(k), Some(l)) if k == l => diagonal[k] = Some(entry.percent),
                (Some(k), Some(l)) => off_diagonal[[k, l]] = entry.percent,
                (None, None) => {
                    return Err(EEIOError::Configuration(format!(
                        "allocation entry ({}, {}) does not reference a new sector",
                        entry.row, entry.col
                    )))
                }
            }
        }

        let rows = rows
            .into_iter()
            .map(|(col, partial)| {
                let shares = fill_shares(&format!("column {}", col), &partial, &ratios, 0.0)?;
                Ok((col, shares))
            })
            .collect::<EEIOResult<HashMap<_, _>>>()?;
        let cols = cols
            .into_iter()
            .map(|(row, partial)| {
                let shares = fill_shares(&format!("row {}", row), &partial, &ratios, 0.0)?;
                Ok((row, shares))
            })
            .collect::<EEIOResult<HashMap<_, _>>>()?;

        // Uncovered diagonal cells take what the listed block cells leave
        let diagonal = fill_shares("intersection", &diagonal, &ratios, off_diagonal.sum())?;
        let mut intersection = off_diagonal;
        for (k, share) in diagonal.iter().enumerate() {
            intersection[[k, k]] = *share;
        }

        Ok(Self {
            ratios,
            rows,
            cols,
            intersection,
        })
    }
}

impl Allocation for UserDefinedAllocation {
    fn len(&self) -> usize {
        self.ratios.len()
    }

    fn row_shares(&self, col: &str) -> Vec<f64> {
        self.rows.get(col).cloned().unwrap_or_else(|| self.ratios.clone())
    }

    fn col_shares(&self, row: &str) -> Vec<f64> {
        self.cols.get(row).cloned().unwrap_or_else(|| self.ratios.clone())
    }

    fn intersection(&self) -> Array2<f64> {
        self.intersection.clone()
    }
}

/// Check ratios: one per new sector, non-negative, summing to one
pub fn validate_ratios(ratios: &[f64], n: usize) -> EEIOResult<()> {
    if ratios.len() != n {
        return Err(EEIOError::Configuration(format!(
            "{} ratios given for {} new sectors",
            ratios.len(),
            n
        )));
    }
    if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) {
        return Err(EEIOError::Configuration(format!(
            "ratios must be non-negative: {:?}",
            ratios
        )));
    }
    let total: f64 = ratios.iter().sum();
    if (total - 1.0).abs() > SHARE_TOLERANCE {
        return Err(EEIOError::Configuration(format!(
            "ratios sum to {} instead of 1",
            total
        )));
    }
    Ok(())
}

/// Default split ratios of a spec.
///
/// Explicit ratios win; otherwise the diagonal Make allocation (each new industry
/// making its own commodity) is normalized; otherwise the split is equal.
pub fn default_ratios(spec: &DisaggregationSpec) -> EEIOResult<Vec<f64>> {
    let codes = &spec.disaggregated_sector_codes;
    let n = codes.len();
    if let Some(ratios) = &spec.ratios {
        validate_ratios(ratios, n)?;
        return Ok(ratios.clone());
    }

    let diagonal: Option<Vec<f64>> = codes
        .iter()
        .map(|code| {
            spec.make_allocation
                .iter()
                .find(|e| &e.row == code && &e.col == code)
                .map(|e| e.percent)
        })
        .collect();
    if let Some(diagonal) = diagonal {
        let total: f64 = diagonal.iter().sum();
        if total > 0.0 {
            let ratios: Vec<f64> = diagonal.iter().map(|v| v / total).collect();
            validate_ratios(&ratios, n)?;
            return Ok(ratios);
        }
    }
    Ok(vec![1.0 / n as f64; n])
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Old(usize),
    New(usize),
}

fn slots(labels: &[String], original: &str, new_codes: &[String], split: bool) -> (Vec<String>, Vec<Slot>, Option<usize>) {
    let position = if split {
        labels.iter().position(|l| l == original)
    } else {
        None
    };
    let mut new_labels = Vec::with_capacity(labels.len() + new_codes.len());
    let mut new_slots = Vec::with_capacity(new_labels.capacity());
    for (i, label) in labels.iter().enumerate() {
        if Some(i) == position {
            for (k, code) in new_codes.iter().enumerate() {
                new_labels.push(code.clone());
                new_slots.push(Slot::New(k));
            }
        } else {
            new_labels.push(label.clone());
            new_slots.push(Slot::Old(i));
        }
    }
    (new_labels, new_slots, position)
}

/// Replace the row and/or column of `original` with one per new sector.
///
/// A table that does not contain `original` on a split axis is returned unchanged
/// on that axis.
pub fn disaggregate_table(
    table: &LabeledMatrix,
    original: &str,
    new_codes: &[String],
    allocation: &dyn Allocation,
    split_rows: bool,
    split_cols: bool,
) -> EEIOResult<LabeledMatrix> {
    if allocation.len() != new_codes.len() {
        return Err(EEIOError::mismatch(
            format!("allocation of {} in {}", original, table.name()),
            new_codes.len(),
            allocation.len(),
        ));
    }
    let (rows, row_slots, r0) = slots(table.rows(), original, new_codes, split_rows);
    let (cols, col_slots, c0) = slots(table.cols(), original, new_codes, split_cols);

    let row_shares: Vec<Vec<f64>> = match r0 {
        Some(_) => table.cols().iter().map(|c| allocation.row_shares(c)).collect(),
        None => vec![],
    };
    let col_shares: Vec<Vec<f64>> = match c0 {
        Some(_) => table.rows().iter().map(|r| allocation.col_shares(r)).collect(),
        None => vec![],
    };
    let intersection = allocation.intersection();
    let v = table.values();
    let r0 = r0.unwrap_or(0);
    let c0 = c0.unwrap_or(0);

    let values = Array2::from_shape_fn((rows.len(), cols.len()), |(i, j)| {
        match (row_slots[i], col_slots[j]) {
            (Slot::Old(r), Slot::Old(c)) => v[[r, c]],
            (Slot::New(k), Slot::Old(c)) => v[[r0, c]] * row_shares[c][k],
            (Slot::Old(r), Slot::New(l)) => v[[r, c0]] * col_shares[r][l],
            (Slot::New(k), Slot::New(l)) => v[[r0, c0]] * intersection[[k, l]],
        }
    });
    LabeledMatrix::new(table.name(), rows, cols, values)
}

/// Sum the new rows/columns back into a single `original` row/column
pub fn collapse(
    table: &LabeledMatrix,
    original: &str,
    new_codes: &[String],
    rows: bool,
    cols: bool,
) -> EEIOResult<LabeledMatrix> {
    let mut collapsed = table.clone();
    let Some(first) = new_codes.first() else {
        return Ok(collapsed);
    };
    if rows {
        if let Some(target) = collapsed.row_index(first) {
            for other in &new_codes[1..] {
                if let Some(source) = collapsed.row_index(other) {
                    collapsed.merge_rows(target, source);
                }
            }
            for other in &new_codes[1..] {
                collapsed.remove_row(other);
            }
            let labels = relabel(collapsed.rows(), first, original);
            collapsed.relabel_rows(labels)?;
        }
    }
    if cols {
        if let Some(target) = collapsed.col_index(first) {
            for other in &new_codes[1..] {
                if let Some(source) = collapsed.col_index(other) {
                    collapsed.merge_cols(target, source);
                }
            }
            for other in &new_codes[1..] {
                collapsed.remove_col(other);
            }
            let labels = relabel(collapsed.cols(), first, original);
            collapsed.relabel_cols(labels)?;
        }
    }
    Ok(collapsed)
}

fn relabel(labels: &[String], from: &str, to: &str) -> Vec<String> {
    labels
        .iter()
        .map(|l| if l == from { to.to_string() } else { l.clone() })
        .collect()
}

/// Check that the split table sums back to the original within `tolerance`
/// (relative to the largest original entry)
pub fn check_conservation(
    before: &LabeledMatrix,
    after: &LabeledMatrix,
    original: &str,
    new_codes: &[String],
    rows: bool,
    cols: bool,
    tolerance: f64,
) -> EEIOResult<()> {
    let collapsed = collapse(after, original, new_codes, rows, cols)?;
    let difference = collapsed.max_abs_diff(before)?;
    let scale = before
        .values()
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    if difference > tolerance * scale {
        return Err(EEIOError::numeric(
            format!("conservation of {} after disaggregating {}", before.name(), original),
            difference,
        ));
    }
    Ok(())
}

fn split_and_check(
    table: &mut LabeledMatrix,
    original: &str,
    new_codes: &[String],
    allocation: &dyn Allocation,
    rows: bool,
    cols: bool,
    tolerance: f64,
) -> EEIOResult<()> {
    let split = disaggregate_table(table, original, new_codes, allocation, rows, cols)?;
    check_conservation(table, &split, original, new_codes, rows, cols, tolerance)?;
    *table = split;
    Ok(())
}

/// Split the totals of `original` in a satellite table.
///
/// Flows listed in `flow_allocation` use the listed shares; every other flow is
/// split by `ratios`. The satellite is left untouched on error.
pub fn disaggregate_satellite(
    satellite: &mut SatelliteTable,
    original: &str,
    new_codes: &[String],
    ratios: &[f64],
    flow_allocation: &[FlowAllocationEntry],
) -> EEIOResult<()> {
    let mut totals: Vec<FlowTotal> = Vec::with_capacity(satellite.totals.len() + new_codes.len());
    for total in &satellite.totals {
        if total.sector != original {
            totals.push(total.clone());
            continue;
        }
        let key = total.flow_key();
        let listed: Vec<&FlowAllocationEntry> = flow_allocation.iter().filter(|e| e.flow == key).collect();
        let shares: Vec<f64> = if listed.is_empty() {
            ratios.to_vec()
        } else {
            let shares: Vec<f64> = new_codes
                .iter()
                .map(|code| {
                    listed
                        .iter()
                        .filter(|e| &e.sector == code)
                        .map(|e| e.percent)
                        .sum()
                })
                .collect();
            let sum: f64 = shares.iter().sum();
            if (sum - 1.0).abs() > SHARE_TOLERANCE {
                return Err(EEIOError::Configuration(format!(
                    "flow allocation for {} sums to {}",
                    key, sum
                )));
            }
            shares
        };
        for (code, share) in new_codes.iter().zip(shares) {
            totals.push(FlowTotal {
                sector: code.clone(),
                amount: total.amount * share,
                ..total.clone()
            });
        }
    }
    satellite.totals = totals;
    Ok(())
}

fn new_sectors(template: &Sector, spec: &DisaggregationSpec) -> Vec<Sector> {
    spec.disaggregated_sector_codes
        .iter()
        .enumerate()
        .map(|(k, code_loc)| {
            let code = split_code_loc(code_loc).map_or(code_loc.as_str(), |(c, _)| c);
            let name = spec
                .disaggregated_sector_names
                .get(k)
                .cloned()
                .unwrap_or_else(|| format!("{} ({})", template.name, code));
            Sector {
                code: code.to_string(),
                code_loc: code_loc.clone(),
                name,
                category: template.category.clone(),
                unit: template.unit.clone(),
            }
        })
        .collect()
}

fn bare_code(code_loc: &str) -> String {
    split_code_loc(code_loc).map_or_else(|| code_loc.to_string(), |(c, _)| c.to_string())
}

/// Apply one disaggregation spec to `tables` and `satellites`.
///
/// The split is staged on copies and only written back when every step
/// succeeds, so on error `tables` and `satellites` are unchanged. Returns
/// `false` when the original sector is not in the model and nothing was changed.
pub fn disaggregate_model(
    tables: &mut IOTables,
    satellites: &mut [SatelliteTable],
    spec: &DisaggregationSpec,
    tolerances: &Tolerances,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<bool> {
    let mut staged_tables = tables.clone();
    let mut staged_satellites = satellites.to_vec();
    let mut staged_diagnostics = Diagnostics::new();
    let applied = split_sector(
        &mut staged_tables,
        &mut staged_satellites,
        spec,
        tolerances,
        &mut staged_diagnostics,
    )?;
    if applied {
        *tables = staged_tables;
        satellites.clone_from_slice(&staged_satellites);
    }
    diagnostics.extend(staged_diagnostics);
    Ok(applied)
}

fn split_sector(
    tables: &mut IOTables,
    satellites: &mut [SatelliteTable],
    spec: &DisaggregationSpec,
    tolerances: &Tolerances,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<bool> {
    let original = spec.original_sector_code.as_str();
    let new_codes = &spec.disaggregated_sector_codes;
    if new_codes.is_empty() {
        return Err(EEIOError::Configuration(format!(
            "disaggregation of {} lists no new sectors",
            original
        )));
    }
    let template = tables
        .commodities
        .get(original)
        .or_else(|| tables.industries.get(original))
        .cloned();
    let Some(template) = template else {
        diagnostics.warn(
            Stage::Disaggregation,
            format!("sector {} not found, disaggregation skipped", original),
        );
        return Ok(false);
    };
    if let Some(existing) = new_codes
        .iter()
        .find(|c| c.as_str() != original && (tables.commodities.contains(c) || tables.industries.contains(c)))
    {
        return Err(EEIOError::Configuration(format!(
            "new sector {} already exists in the model",
            existing
        )));
    }

    let ratios = default_ratios(spec)?;
    let (make_allocation, use_allocation): (Box<dyn Allocation>, Box<dyn Allocation>) = match spec.allocation {
        AllocationMode::Uniform => (
            Box::new(UniformAllocation::new(ratios.clone())),
            Box::new(UniformAllocation::new(ratios.clone())),
        ),
        AllocationMode::UserDefined => (
            Box::new(UserDefinedAllocation::new(&spec.make_allocation, new_codes, ratios.clone())?),
            Box::new(UserDefinedAllocation::new(&spec.use_allocation, new_codes, ratios.clone())?),
        ),
    };
    let uniform = UniformAllocation::new(ratios.clone());
    let tol = tolerances.conservation;

    split_and_check(&mut tables.make, original, new_codes, make_allocation.as_ref(), true, true, tol)?;
    split_and_check(&mut tables.use_transactions, original, new_codes, use_allocation.as_ref(), true, true, tol)?;
    split_and_check(&mut tables.domestic_use, original, new_codes, use_allocation.as_ref(), true, true, tol)?;
    split_and_check(&mut tables.use_value_added, original, new_codes, use_allocation.as_ref(), false, true, tol)?;
    split_and_check(&mut tables.final_demand, original, new_codes, use_allocation.as_ref(), true, false, tol)?;
    split_and_check(
        &mut tables.domestic_final_demand,
        original,
        new_codes,
        use_allocation.as_ref(),
        true,
        false,
        tol,
    )?;
    tables
        .international_trade_adjustment
        .split(original, new_codes, &ratios)?;

    split_and_check(&mut tables.multi_year_industry_output, original, new_codes, &uniform, true, false, tol)?;
    split_and_check(&mut tables.multi_year_commodity_output, original, new_codes, &uniform, true, false, tol)?;
    let replicate = Replicate::new(new_codes.len());
    tables.multi_year_industry_cpi =
        disaggregate_table(&tables.multi_year_industry_cpi, original, new_codes, &replicate, true, false)?;
    tables.multi_year_commodity_cpi =
        disaggregate_table(&tables.multi_year_commodity_cpi, original, new_codes, &replicate, true, false)?;

    let sectors = new_sectors(&template, spec);
    tables.commodities.replace_with(original, sectors.clone())?;
    tables.industries.replace_with(original, sectors)?;

    let mapping: Vec<(String, String)> = spec
        .naics_mapping
        .iter()
        .map(|(naics, code)| (naics.clone(), bare_code(code)))
        .collect();
    let bare_new: Vec<String> = new_codes.iter().map(|c| bare_code(c)).collect();
    tables
        .crosswalk
        .disaggregate(&bare_code(original), &bare_new, &mapping);

    for satellite in satellites.iter_mut() {
        disaggregate_satellite(satellite, original, new_codes, &ratios, &spec.flow_allocation)?;
    }

    tables.mark_modified();
    tables.validate()?;
    diagnostics.info(
        Stage::Disaggregation,
        format!("split {} into {}", original, new_codes.join(", ")),
    );

    if spec.balance {
        balance_disagg(tables, tolerances.ras, tolerances.ras_max_iterations, diagnostics)?;
    }
    Ok(true)
}

/// Apply disaggregation specs in order
pub fn disaggregate_all(
    tables: &mut IOTables,
    satellites: &mut [SatelliteTable],
    specs: &[DisaggregationSpec],
    tolerances: &Tolerances,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<usize> {
    let mut applied = 0;
    for spec in specs {
        if disaggregate_model(tables, satellites, spec, tolerances, diagnostics)? {
            applied += 1;
        }
    }
    Ok(applied)
}
