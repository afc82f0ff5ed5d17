//! Demand vectors.
//!
//! Named demand vectors are prepared from the final demand tables and kept in a
//! [`DemandVectorRegistry`] under IDs of the form
//! `{year}_{location}_{type}_{system}`, e.g. `2012_US_Consumption_Complete`.
//! Caller-supplied vectors are validated against the sector domain of `L` and
//! reindexed onto it.

use crate::diagnostics::{Diagnostics, Stage};
use crate::errors::{EEIOError, EEIOResult};
use crate::io_transform::transform_demand_vector_with_market_shares;
use crate::matrix::{LabeledMatrix, LabeledVector};
use crate::specs::DemandVectorSpec;
use crate::tables::{FinalDemandGroup, IOTables};
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DemandType {
    /// All final demand, including exports and net of imports
    Production,
    /// Household, investment and government final demand
    Consumption,
    /// Household final demand only
    Household,
}

impl fmt::Display for DemandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DemandType::Production => "Production",
            DemandType::Consumption => "Consumption",
            DemandType::Household => "Household",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DemandType {
    type Err = EEIOError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Production" => Ok(DemandType::Production),
            "Consumption" => Ok(DemandType::Consumption),
            "Household" => Ok(DemandType::Household),
            other => Err(EEIOError::Configuration(format!(
                "unknown demand type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DemandSystem {
    Complete,
    Domestic,
}

impl fmt::Display for DemandSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemandSystem::Complete => write!(f, "Complete"),
            DemandSystem::Domestic => write!(f, "Domestic"),
        }
    }
}

impl FromStr for DemandSystem {
    type Err = EEIOError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Complete" | "complete" => Ok(DemandSystem::Complete),
            "Domestic" | "domestic" => Ok(DemandSystem::Domestic),
            other => Err(EEIOError::Configuration(format!(
                "unknown demand system '{}'",
                other
            ))),
        }
    }
}

/// Metadata of a registered demand vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandVectorMeta {
    pub name: String,
    pub demand_type: DemandType,
    pub system: DemandSystem,
    pub year: u16,
    pub location: String,
    pub id: String,
}

impl DemandVectorMeta {
    pub fn new(name: &str, demand_type: DemandType, system: DemandSystem, year: u16, location: &str) -> Self {
        Self {
            name: name.to_string(),
            demand_type,
            system,
            year,
            location: location.to_string(),
            id: demand_vector_id(year, location, demand_type, system),
        }
    }

    pub fn from_spec(spec: &DemandVectorSpec) -> EEIOResult<Self> {
        Ok(Self::new(
            &spec.name,
            spec.demand_type.parse()?,
            spec.system.parse()?,
            spec.year,
            &spec.location,
        ))
    }
}

/// `{year}_{location}_{type}_{system}`
pub fn demand_vector_id(year: u16, location: &str, demand_type: DemandType, system: DemandSystem) -> String {
    format!("{}_{}_{}_{}", year, location, demand_type, system)
}

/// Named demand vectors available to calculations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandVectorRegistry {
    entries: Vec<(DemandVectorMeta, LabeledVector)>,
}

impl DemandVectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a vector; an ID that is already present is skipped with a warning.
    ///
    /// Returns whether the vector was added.
    pub fn register(
        &mut self,
        meta: DemandVectorMeta,
        vector: LabeledVector,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        if self.contains(&meta.id) {
            diagnostics.warn(
                Stage::Demand,
                format!("demand vector {} is already registered, skipping", meta.id),
            );
            return false;
        }
        let vector = vector.renamed(meta.id.clone());
        self.entries.push((meta, vector));
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(m, _)| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&LabeledVector> {
        self.entries.iter().find(|(m, _)| m.id == id).map(|(_, v)| v)
    }

    pub fn meta(&self, id: &str) -> Option<&DemandVectorMeta> {
        self.entries.iter().find(|(m, _)| m.id == id).map(|(m, _)| m)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(m, _)| m.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sum_columns(table: &LabeledMatrix, codes: &[String], name: &str) -> EEIOResult<LabeledVector> {
    let selected = table.select_cols(codes)?;
    LabeledVector::new(name, selected.rows().to_vec(), selected.values().sum_axis(Axis(1)))
}

/// Commodity demand vector of the given type from the final demand tables
pub fn prepare_demand_vector(
    tables: &IOTables,
    demand_type: DemandType,
    system: DemandSystem,
) -> EEIOResult<LabeledVector> {
    let source = match system {
        DemandSystem::Complete => &tables.final_demand,
        DemandSystem::Domestic => &tables.domestic_final_demand,
    };
    let name = format!("{}_{}", demand_type, system);
    match demand_type {
        DemandType::Production => {
            let mut y = source.row_totals(name);
            if system == DemandSystem::Domestic {
                tables
                    .international_trade_adjustment
                    .ensure_labels(y.labels())?;
                *y.values_mut() += tables.international_trade_adjustment.values();
            }
            Ok(y)
        }
        DemandType::Consumption => {
            let codes = tables.final_demand_codes(&[
                FinalDemandGroup::Household,
                FinalDemandGroup::Investment,
                FinalDemandGroup::Government,
            ]);
            sum_columns(source, &codes, &name)
        }
        DemandType::Household => {
            let codes = tables.final_demand_codes(&[FinalDemandGroup::Household]);
            sum_columns(source, &codes, &name)
        }
    }
}

/// Default demand vectors: production and consumption, complete and domestic
pub fn default_demand_vectors(io_year: u16, location: &str) -> Vec<DemandVectorMeta> {
    let mut metas = Vec::new();
    for demand_type in [DemandType::Production, DemandType::Consumption] {
        for system in [DemandSystem::Complete, DemandSystem::Domestic] {
            let name = format!("{} {}", system, demand_type);
            metas.push(DemandVectorMeta::new(&name, demand_type, system, io_year, location));
        }
    }
    metas
}

/// Prepare and register the given demand vectors.
///
/// When `market_shares` is given the commodity vectors are transformed to
/// industries with `V_n · y`.
pub fn build_demand_registry(
    tables: &IOTables,
    metas: Vec<DemandVectorMeta>,
    market_shares: Option<&LabeledMatrix>,
    diagnostics: &mut Diagnostics,
) -> EEIOResult<DemandVectorRegistry> {
    let mut registry = DemandVectorRegistry::new();
    for meta in metas {
        let y = prepare_demand_vector(tables, meta.demand_type, meta.system)?;
        let y = match market_shares {
            Some(v_n) => transform_demand_vector_with_market_shares(&y, v_n)?,
            None => y,
        };
        diagnostics.debug(
            Stage::Demand,
            format!("prepared {} with total {:.3}", meta.id, y.total()),
        );
        registry.register(meta, y, diagnostics);
    }
    Ok(registry)
}

/// A user demand vector is valid when every value is finite and every sector is
/// in `domain`
pub fn is_demand_vector_valid(demand: &HashMap<String, f64>, domain: &[String]) -> bool {
    validate_demand_vector(demand, domain).is_ok()
}

pub fn validate_demand_vector(demand: &HashMap<String, f64>, domain: &[String]) -> EEIOResult<()> {
    let mut sectors: Vec<&String> = demand.keys().collect();
    sectors.sort();
    for sector in sectors {
        let value = demand[sector];
        if !value.is_finite() {
            return Err(EEIOError::InvalidDemand(format!(
                "value for {} is not numeric: {}",
                sector, value
            )));
        }
        if !domain.contains(sector) {
            return Err(EEIOError::InvalidDemand(format!(
                "sector {} is not in the model",
                sector
            )));
        }
    }
    Ok(())
}

/// Validate a user demand vector and reindex it onto `domain`, filling absent
/// sectors with zero
pub fn format_demand_vector(demand: &HashMap<String, f64>, domain: &[String]) -> EEIOResult<LabeledVector> {
    validate_demand_vector(demand, domain)?;
    let values = domain
        .iter()
        .map(|s| demand.get(s).copied().unwrap_or(0.0))
        .collect();
    LabeledVector::new("UserDemand", domain.to_vec(), values)
}
