//! Coefficient matrices derived from the transaction tables.
//!
//! All functions here are pure: they read an [`IOTables`] snapshot (or matrices
//! derived from one) and return new labelled matrices. The naming follows the
//! usual input-output notation:
//!
//! | Symbol | Shape | Definition |
//! |--------|-------|------------|
//! | `U_n`  | commodity × industry | `Use · diag(x)⁻¹` |
//! | `V_n`  | industry × commodity | `Make · diag(q)⁻¹` (market shares) |
//! | `C_m`  | commodity × industry | `Makeᵗ · diag(x)⁻¹` (commodity mix) |
//! | `A`    | square | `U_n · V_n` (commodity) or `V_n · U_n` (industry) |

use crate::errors::{EEIOError, EEIOResult};
use crate::matrix::{LabeledMatrix, LabeledVector};
use crate::specs::Orientation;
use crate::tables::{year_label, IOTables};
use ndarray::{Array1, Axis};

/// Divide every column of `transactions` by the matching entry of `output`.
///
/// A column whose output is zero becomes all zeros rather than `NaN`.
///
/// ```rust
/// use useeio_core::io_transform::normalize_io_transactions;
/// use useeio_core::matrix::{LabeledMatrix, LabeledVector};
///
/// let z = LabeledMatrix::from_rows("Z", &["a", "b"], &["a", "b"], vec![vec![10.0, 0.0], vec![30.0, 0.0]])
///     .unwrap();
/// let x = LabeledVector::from_pairs("x", &[("a", 100.0), ("b", 0.0)]).unwrap();
/// let a = normalize_io_transactions(&z, &x, "A").unwrap();
/// assert_eq!(a.get("b", "a"), Some(0.3));
/// assert_eq!(a.get("a", "b"), Some(0.0));
/// ```
pub fn normalize_io_transactions(
    transactions: &LabeledMatrix,
    output: &LabeledVector,
    name: &str,
) -> EEIOResult<LabeledMatrix> {
    let inverse: Array1<f64> = output
        .values()
        .mapv(|v| if v == 0.0 { 0.0 } else { 1.0 / v });
    let inverse = LabeledVector::new(output.name(), output.labels().to_vec(), inverse)?;
    transactions.scale_columns(&inverse, name)
}

/// Direct requirements by industry, `U_n`, from the complete or domestic Use table
pub fn generate_direct_requirements_from_use(
    tables: &IOTables,
    domestic: bool,
) -> EEIOResult<LabeledMatrix> {
    let x = tables.industry_output();
    if domestic {
        normalize_io_transactions(&tables.domestic_use, &x, "U_d_n")
    } else {
        normalize_io_transactions(&tables.use_transactions, &x, "U_n")
    }
}

/// Market shares `V_n`: the share of each commodity's output made by each industry
pub fn generate_market_shares_from_make(tables: &IOTables) -> EEIOResult<LabeledMatrix> {
    let q = tables.commodity_output();
    normalize_io_transactions(&tables.make, &q, "V_n")
}

/// Commodity mix `C_m`: the share of each industry's output in each commodity.
///
/// Every column must sum to 1 within `tolerance`; otherwise the Make table is
/// inconsistent with industry output and a [`EEIOError::Numeric`] is returned
/// carrying the largest deviation.
pub fn generate_commodity_mix_matrix(tables: &IOTables, tolerance: f64) -> EEIOResult<LabeledMatrix> {
    let x = tables.industry_output();
    let c_m = normalize_io_transactions(&tables.make.transpose(), &x, "C_m")?;

    let deviation = c_m
        .col_sums()
        .iter()
        .fold(0.0_f64, |acc, s| acc.max((s - 1.0).abs()));
    if deviation > tolerance {
        return Err(EEIOError::numeric("commodity mix column sums", deviation));
    }
    Ok(c_m)
}

/// Combine normalized Use and market shares into the direct requirements matrix.
///
/// `b` is `U_n` (commodity × industry) and `d` is `V_n` (industry × commodity).
/// For a commodity model `A = b · d`; for an industry model `A = d · b`.
pub fn transform_direct_requirements_with_market_shares(
    b: &LabeledMatrix,
    d: &LabeledMatrix,
    orientation: Orientation,
    name: &str,
) -> EEIOResult<LabeledMatrix> {
    if b.cols() != d.rows() || d.cols() != b.rows() {
        return Err(EEIOError::mismatch(
            format!("direct requirements from {} and {}", b.name(), d.name()),
            (b.rows(), b.cols()),
            (d.cols(), d.rows()),
        ));
    }
    match orientation {
        Orientation::Commodity => b.dot(d, name),
        Orientation::Industry => d.dot(b, name),
    }
}

/// Transform commodity final demand to industry final demand, `V_n · F`
pub fn transform_final_demand_with_market_shares(
    final_demand: &LabeledMatrix,
    market_shares: &LabeledMatrix,
) -> EEIOResult<LabeledMatrix> {
    market_shares.dot(final_demand, final_demand.name())
}

/// Demand vector variant of [`transform_final_demand_with_market_shares`]
pub fn transform_demand_vector_with_market_shares(
    demand: &LabeledVector,
    market_shares: &LabeledMatrix,
) -> EEIOResult<LabeledVector> {
    market_shares.dot_vector(demand, demand.name())
}

/// `Use - Import` over the combined Use and final demand columns.
///
/// Import columns are forced to zero: imports are not part of domestic final demand.
pub fn generate_domestic_use(
    use_and_final_demand: &LabeledMatrix,
    imports: &LabeledMatrix,
    import_codes: &[String],
) -> EEIOResult<LabeledMatrix> {
    let mut domestic = use_and_final_demand.subtract(imports, "DomesticUse")?;
    for code in import_codes {
        if let Some(j) = domestic.col_index(code) {
            domestic.values_mut().column_mut(j).fill(0.0);
        }
    }
    Ok(domestic)
}

/// International trade adjustment per commodity: `Use[:, import] - Import[:, import]`
pub fn generate_international_trade_adjustment(
    use_and_final_demand: &LabeledMatrix,
    imports: &LabeledMatrix,
    import_codes: &[String],
) -> EEIOResult<LabeledVector> {
    use_and_final_demand.ensure_same_labels(imports)?;
    let complete = use_and_final_demand.select_cols(import_codes)?;
    let imported = imports.select_cols(import_codes)?;
    LabeledVector::new(
        "InternationalTradeAdjustment",
        complete.rows().to_vec(),
        (complete.values() - imported.values()).sum_axis(Axis(1)),
    )
}

/// Derive the domestic tables of `tables` from an import matrix.
///
/// `imports` is labelled like `[Use | FinalDemand]`; `import_codes` are the
/// final demand columns holding imports.
pub fn apply_import_matrix(
    tables: &mut IOTables,
    imports: &LabeledMatrix,
    import_codes: &[String],
) -> EEIOResult<()> {
    let use_and_fd = tables
        .use_transactions
        .hstack(&tables.final_demand, "UseAndFinalDemand")?;
    let domestic = generate_domestic_use(&use_and_fd, imports, import_codes)?;
    let ita = generate_international_trade_adjustment(&use_and_fd, imports, import_codes)?;

    let domestic_use = domestic
        .select_cols(tables.use_transactions.cols())?
        .renamed("DomesticUseTransactions");
    let domestic_final_demand = domestic
        .select_cols(tables.final_demand.cols())?
        .renamed("DomesticFinalDemand");

    tables.domestic_use = domestic_use;
    tables.domestic_final_demand = domestic_final_demand;
    tables.international_trade_adjustment = ita;
    tables.validate()
}

/// Commodity output of one year from industry output of that year, `C_m · x`
pub fn transform_industry_output_to_commodity_output(
    industry_output: &LabeledVector,
    commodity_mix: &LabeledMatrix,
) -> EEIOResult<LabeledVector> {
    commodity_mix.dot_vector(industry_output, "CommodityOutput")
}

/// Commodity CPI of one year as the market-share weighted industry CPI.
///
/// Commodities with no producing industry get a CPI of 100. At the IO year every
/// entry must lie within `tolerance` of 100.
pub fn transform_industry_cpi_to_commodity_cpi(
    industry_cpi: &LabeledVector,
    market_shares: &LabeledMatrix,
    year: u16,
    io_year: u16,
    tolerance: f64,
) -> EEIOResult<LabeledVector> {
    let mut cpi = market_shares
        .transpose()
        .dot_vector(industry_cpi, "CommodityCPI")?;
    cpi.values_mut()
        .mapv_inplace(|v| if v == 0.0 { 100.0 } else { v });

    if year == io_year {
        let deviation = cpi
            .values()
            .iter()
            .fold(0.0_f64, |acc, v| acc.max((v - 100.0).abs()));
        if deviation > tolerance {
            return Err(EEIOError::numeric("commodity CPI base-year check", deviation));
        }
    }
    Ok(cpi)
}

/// Fill the multi-year commodity output and CPI series from the industry series
pub fn derive_commodity_series(
    tables: &mut IOTables,
    commodity_mix: &LabeledMatrix,
    market_shares: &LabeledMatrix,
    io_year: u16,
    cpi_tolerance: f64,
) -> EEIOResult<()> {
    let industries = tables.industry_codes();
    let years = tables.multi_year_industry_output.cols().to_vec();
    let mut output = LabeledMatrix::zeros(
        "MultiYearCommodityOutput",
        tables.commodity_codes(),
        years.clone(),
    )?;
    let mut cpi = LabeledMatrix::zeros(
        "MultiYearCommodityCPI",
        tables.commodity_codes(),
        years.clone(),
    )?;

    for (j, year) in years.iter().enumerate() {
        let year_value: u16 = year.parse().map_err(|_| {
            EEIOError::Configuration(format!("multi-year column '{}' is not a year", year))
        })?;
        let x = column_vector(&tables.multi_year_industry_output, year, &industries)?;
        let q = transform_industry_output_to_commodity_output(&x, commodity_mix)?;
        output.values_mut().column_mut(j).assign(q.values());

        let industry_cpi = column_vector(&tables.multi_year_industry_cpi, year, &industries)?;
        let commodity_cpi = transform_industry_cpi_to_commodity_cpi(
            &industry_cpi,
            market_shares,
            year_value,
            io_year,
            cpi_tolerance,
        )?;
        cpi.values_mut()
            .column_mut(j)
            .assign(commodity_cpi.values());
    }

    tables.multi_year_commodity_output = output;
    tables.multi_year_commodity_cpi = cpi;
    tables.validate()
}

/// One year column of a multi-year table as a vector over `labels`
pub fn column_vector(table: &LabeledMatrix, year: &str, labels: &[String]) -> EEIOResult<LabeledVector> {
    let column = table.col(year).ok_or_else(|| {
        EEIOError::Configuration(format!("year {} not present in {}", year, table.name()))
    })?;
    let v = LabeledVector::new(table.name(), table.rows().to_vec(), column.to_owned())?;
    v.ensure_labels(labels)?;
    Ok(v)
}

/// Express the output of `output_year` in `reference_year` dollars.
///
/// Each entry is scaled by `CPI[reference_year] / CPI[output_year]`; a sector whose
/// CPI for `output_year` is zero is left unadjusted.
pub fn adjust_output_by_cpi(
    output: &LabeledMatrix,
    cpi: &LabeledMatrix,
    output_year: u16,
    reference_year: u16,
) -> EEIOResult<LabeledVector> {
    output.ensure_labels(cpi.rows(), output.cols())?;
    let labels = output.rows().to_vec();
    let amount = column_vector(output, &year_label(output_year), &labels)?;
    let cpi_year = column_vector(cpi, &year_label(output_year), &labels)?;
    let cpi_reference = column_vector(cpi, &year_label(reference_year), &labels)?;

    let values = amount
        .values()
        .iter()
        .zip(cpi_year.values().iter().zip(cpi_reference.values().iter()))
        .map(|(v, (c_year, c_ref))| if *c_year == 0.0 { *v } else { v * c_ref / c_year })
        .collect::<Array1<f64>>();
    LabeledVector::new(
        format!("{} in {} dollars", output.name(), reference_year),
        labels,
        values,
    )
}
