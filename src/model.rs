//! The model record and the build pipeline that produces it.
//!
//! A model is built in a declared order:
//!
//! 1. capability checks on the configuration
//! 2. validation of the raw tables against the sector catalogs
//! 3. aggregation specs, then disaggregation specs, each in the given order
//! 4. commodity output and CPI series from the commodity mix and market shares
//! 5. structural matrices `A`, `L`, `B`, `C` and their products
//! 6. demand vectors
//!
//! Any failure aborts the build. Reshaping a built model through
//! [`EEIOModel::aggregate`] or [`EEIOModel::disaggregate`] leaves the structural
//! matrices stale until [`EEIOModel::rebuild`] is called.

use serde::{Deserialize, Serialize};
use useeio_core::demand::{
    build_demand_registry, default_demand_vectors, DemandVectorMeta, DemandVectorRegistry,
};
use useeio_core::diagnostics::{Diagnostics, Stage};
use useeio_core::errors::{EEIOError, EEIOResult};
use useeio_core::indicators::{
    create_c_from_factors_and_b_flows, derive_indicator_matrices, IndicatorFactor,
};
use useeio_core::io_transform::{
    derive_commodity_series, generate_commodity_mix_matrix, generate_direct_requirements_from_use,
    generate_market_shares_from_make, transform_direct_requirements_with_market_shares,
};
use useeio_core::leontief::calculate_leontief_inverse;
use useeio_core::matrix::{LabeledMatrix, LabeledVector};
use useeio_core::satellite::{create_b_from_flow_data, SatelliteTable};
use useeio_core::sectors::SectorCode;
use useeio_core::specs::{
    AggregationSpec, DisaggregationSpec, ModelSpecs, ModelType, Orientation, PriceType,
};
use useeio_core::tables::IOTables;
use useeio_sectors::aggregation::aggregate_all;
use useeio_sectors::disaggregation::disaggregate_all;

/// Raw inputs supplied by the loading layer
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub tables: IOTables,
    pub satellites: Vec<SatelliteTable>,
    pub indicator_factors: Vec<IndicatorFactor>,
}

/// Structural matrices of one table snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralMatrices {
    /// Table version the matrices were derived from
    pub source_version: u64,
    /// Make table, industry × commodity
    pub v: LabeledMatrix,
    pub c_m: LabeledMatrix,
    pub v_n: LabeledMatrix,
    pub u_n: LabeledMatrix,
    pub u_d_n: LabeledMatrix,
    pub q: LabeledVector,
    pub x: LabeledVector,
    pub a: LabeledMatrix,
    pub a_d: LabeledMatrix,
    pub l: LabeledMatrix,
    pub l_d: LabeledMatrix,
    pub b: LabeledMatrix,
    pub c: LabeledMatrix,
    pub d: LabeledMatrix,
    pub m: LabeledMatrix,
    pub m_d: LabeledMatrix,
    pub n: LabeledMatrix,
    pub n_d: LabeledMatrix,
}

/// A built environmentally-extended input-output model
#[derive(Debug, Clone)]
pub struct EEIOModel {
    pub specs: ModelSpecs,
    pub tables: IOTables,
    pub satellites: Vec<SatelliteTable>,
    pub indicator_factors: Vec<IndicatorFactor>,
    pub matrices: StructuralMatrices,
    pub demand_vectors: DemandVectorRegistry,
    pub diagnostics: Diagnostics,
}

fn check_supported(specs: &ModelSpecs) -> EEIOResult<()> {
    if specs.model_type == ModelType::EeioIntegratedHybrid {
        return Err(EEIOError::not_yet_supported("Integrated hybrid (EEIO-IH) models"));
    }
    if let Some(year) = specs.currency_year {
        if year != specs.io_year {
            return Err(EEIOError::not_yet_supported(format!(
                "Price year adjustment from {} to {}",
                specs.io_year, year
            )));
        }
    }
    if !specs.aggregation.is_empty() && !specs.disaggregation.is_empty() {
        return Err(EEIOError::Configuration(
            "aggregation and disaggregation cannot be combined in one model".to_string(),
        ));
    }
    Ok(())
}

/// Derive every structural matrix from the current tables.
///
/// The commodity mix is checked before anything else is built so that an
/// inconsistent Make table never reaches the Leontief inverse.
pub fn construct_eeio_matrices(
    specs: &ModelSpecs,
    tables: &IOTables,
    satellites: &[SatelliteTable],
    indicator_factors: &[IndicatorFactor],
    diagnostics: &mut Diagnostics,
) -> EEIOResult<StructuralMatrices> {
    tables.validate()?;
    let tolerances = &specs.tolerances;

    let c_m = generate_commodity_mix_matrix(tables, tolerances.commodity_mix)?;
    let v_n = generate_market_shares_from_make(tables)?;
    let u_n = generate_direct_requirements_from_use(tables, false)?;
    let u_d_n = generate_direct_requirements_from_use(tables, true)?;

    let a = transform_direct_requirements_with_market_shares(&u_n, &v_n, specs.orientation, "A")?;
    let a_d =
        transform_direct_requirements_with_market_shares(&u_d_n, &v_n, specs.orientation, "A_d")?;
    diagnostics.info(
        Stage::IOTransform,
        format!("{:?} model A is {} x {}", specs.orientation, a.nrows(), a.ncols()),
    );

    let l = calculate_leontief_inverse(&a, "L", tolerances.min_reciprocal_condition)?;
    let l_d = calculate_leontief_inverse(&a_d, "L_d", tolerances.min_reciprocal_condition)?;
    diagnostics.info(Stage::Leontief, "calculated L and L_d");

    let b = create_b_from_flow_data(
        satellites,
        tables,
        &v_n,
        specs.orientation,
        specs.io_year,
        diagnostics,
    )?;
    let c = create_c_from_factors_and_b_flows(
        &specs.indicators,
        indicator_factors,
        b.rows(),
        diagnostics,
    )?;
    let derived = derive_indicator_matrices(&b, &c, &l, &l_d)?;
    diagnostics.info(
        Stage::Indicators,
        format!("{} indicators over {} flows", c.nrows(), c.ncols()),
    );

    Ok(StructuralMatrices {
        source_version: tables.version(),
        v: tables.make.clone().renamed("V"),
        c_m,
        v_n,
        u_n,
        u_d_n,
        q: tables.commodity_output().renamed("q"),
        x: tables.industry_output().renamed("x"),
        a,
        a_d,
        l,
        l_d,
        b,
        c,
        d: derived.d,
        m: derived.m,
        m_d: derived.m_d,
        n: derived.n,
        n_d: derived.n_d,
    })
}

fn derive_series(specs: &ModelSpecs, tables: &mut IOTables) -> EEIOResult<()> {
    let c_m = generate_commodity_mix_matrix(tables, specs.tolerances.commodity_mix)?;
    let v_n = generate_market_shares_from_make(tables)?;
    derive_commodity_series(tables, &c_m, &v_n, specs.io_year, specs.tolerances.cpi)
}

fn demand_registry(
    specs: &ModelSpecs,
    tables: &IOTables,
    matrices: &StructuralMatrices,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<DemandVectorRegistry> {
    let metas = if specs.demand_vectors.is_empty() {
        default_demand_vectors(specs.io_year, specs.primary_region())
    } else {
        specs
            .demand_vectors
            .iter()
            .map(DemandVectorMeta::from_spec)
            .collect::<EEIOResult<Vec<_>>>()?
    };
    let market_shares = match specs.orientation {
        Orientation::Industry => Some(&matrices.v_n),
        Orientation::Commodity => None,
    };
    build_demand_registry(tables, metas, market_shares, diagnostics)
}

/// Build a model from its configuration and raw inputs.
///
/// # Example
/// ```no_run
/// use useeio::model::{build_model, ModelInputs};
/// use useeio_core::specs::ModelSpecs;
///
/// # fn load() -> ModelInputs { unimplemented!() }
/// let specs = ModelSpecs::from_toml_str("model = \"USEEIOv2\"\nio_year = 2012").unwrap();
/// let model = build_model(specs, load()).unwrap();
/// println!("{}", model.matrices.l.nrows());
/// ```
pub fn build_model(specs: ModelSpecs, inputs: ModelInputs) -> EEIOResult<EEIOModel> {
    check_supported(&specs)?;
    let ModelInputs {
        mut tables,
        mut satellites,
        indicator_factors,
    } = inputs;
    let mut diagnostics = Diagnostics::new();

    log::info!("Building model {} for IO year {}", specs.model, specs.io_year);
    tables.validate()?;

    if !specs.aggregation.is_empty() {
        let merged = aggregate_all(&mut tables, &mut satellites, &specs.aggregation, &mut diagnostics)?;
        log::info!("Aggregation merged {} sectors", merged);
    }
    if !specs.disaggregation.is_empty() {
        let applied = disaggregate_all(
            &mut tables,
            &mut satellites,
            &specs.disaggregation,
            &specs.tolerances,
            &mut diagnostics,
        )?;
        log::info!("Applied {} disaggregation specs", applied);
    }

    derive_series(&specs, &mut tables)?;
    let matrices = construct_eeio_matrices(
        &specs,
        &tables,
        &satellites,
        &indicator_factors,
        &mut diagnostics,
    )?;
    let demand_vectors = demand_registry(&specs, &tables, &matrices, &mut diagnostics)?;
    log::info!(
        "Model {} built with {} sectors and {} demand vectors",
        specs.model,
        matrices.a.nrows(),
        demand_vectors.len()
    );

    Ok(EEIOModel {
        specs,
        tables,
        satellites,
        indicator_factors,
        matrices,
        demand_vectors,
        diagnostics,
    })
}

impl EEIOModel {
    /// Whether the tables changed since the structural matrices were built
    pub fn is_stale(&self) -> bool {
        self.matrices.source_version != self.tables.version()
    }

    /// Recompute the output series, structural matrices and demand vectors from
    /// the current tables
    pub fn rebuild(&mut self) -> EEIOResult<()> {
        derive_series(&self.specs, &mut self.tables)?;
        let matrices = construct_eeio_matrices(
            &self.specs,
            &self.tables,
            &self.satellites,
            &self.indicator_factors,
            &mut self.diagnostics,
        )?;
        let demand_vectors =
            demand_registry(&self.specs, &self.tables, &matrices, &mut self.diagnostics)?;
        self.matrices = matrices;
        self.demand_vectors = demand_vectors;
        log::info!("Rebuilt model {} at version {}", self.specs.model, self.tables.version());
        Ok(())
    }

    /// Merge sectors of the built model. The model is stale afterwards.
    ///
    /// On error the tables, satellites and specs are left as they were.
    pub fn aggregate(&mut self, spec: &AggregationSpec) -> EEIOResult<usize> {
        let merged = aggregate_all(
            &mut self.tables,
            &mut self.satellites,
            std::slice::from_ref(spec),
            &mut self.diagnostics,
        )?;
        self.specs.aggregation.push(spec.clone());
        Ok(merged)
    }

    /// Split a sector of the built model. The model is stale afterwards.
    ///
    /// On error the tables, satellites and specs are left as they were.
    pub fn disaggregate(&mut self, spec: &DisaggregationSpec) -> EEIOResult<bool> {
        let applied = disaggregate_all(
            &mut self.tables,
            &mut self.satellites,
            std::slice::from_ref(spec),
            &self.specs.tolerances,
            &mut self.diagnostics,
        )?;
        self.specs.disaggregation.push(spec.clone());
        Ok(applied > 0)
    }

    /// Named structural matrix, e.g. `"A"`, `"L_d"` or `"N"`
    pub fn matrix(&self, name: &str) -> Option<&LabeledMatrix> {
        let m = &self.matrices;
        let found = match name {
            "V" => &m.v,
            "C_m" => &m.c_m,
            "V_n" => &m.v_n,
            "U_n" => &m.u_n,
            "U_d_n" => &m.u_d_n,
            "A" => &m.a,
            "A_d" => &m.a_d,
            "L" => &m.l,
            "L_d" => &m.l_d,
            "B" => &m.b,
            "C" => &m.c,
            "D" => &m.d,
            "M" => &m.m,
            "M_d" => &m.m_d,
            "N" => &m.n,
            "N_d" => &m.n_d,
            _ => return None,
        };
        Some(found)
    }

    /// Sector codes indexing `A` and `L`
    pub fn sector_domain(&self) -> &[SectorCode] {
        self.matrices.l.rows()
    }

    /// Express a result matrix in `currency_year` dollars and the requested
    /// price type.
    ///
    /// Only the model's own IO year in producer prices is available; other
    /// requests return [`EEIOError::NotYetSupported`].
    pub fn adjust_result_matrix_price(
        &self,
        name: &str,
        currency_year: u16,
        purchaser_price: bool,
    ) -> EEIOResult<LabeledMatrix> {
        let matrix = self
            .matrix(name)
            .ok_or_else(|| EEIOError::Configuration(format!("no matrix named {}", name)))?;
        if purchaser_price || self.specs.price_type == PriceType::Purchaser {
            return Err(EEIOError::not_yet_supported("Purchaser price adjustment"));
        }
        if currency_year != self.specs.io_year {
            return Err(EEIOError::not_yet_supported(format!(
                "Price year adjustment of {} from {} to {}",
                name, self.specs.io_year, currency_year
            )));
        }
        Ok(matrix.clone())
    }
}
