//! Model specification
//!
//! [`ModelSpecs`] is the parsed form of a model configuration. Every struct uses
//! `#[serde(default)]` so partial documents fill the remaining fields with the
//! defaults below.
//!
//! ```rust
//! use useeio_core::specs::{ModelSpecs, Orientation};
//!
//! let specs = ModelSpecs::from_toml_str(
//!     r#"
//!     model = "USEEIOv2.0-s"
//!     io_year = 2012
//!     orientation = "Industry"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(specs.orientation, Orientation::Industry);
//! assert_eq!(specs.model_region_acronyms, vec!["US".to_string()]);
//! ```

use crate::errors::EEIOResult;
use serde::{Deserialize, Serialize};

/// Orientation of the direct requirements matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    /// Commodity-by-commodity, `A = U_n · V_n`
    Commodity,
    /// Industry-by-industry, `A = V_n · U_n`
    Industry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "EEIO")]
    Eeio,
    /// Integrated hybrid model with physical-unit sectors
    #[serde(rename = "EEIO-IH")]
    EeioIntegratedHybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceType {
    Producer,
    Purchaser,
}

/// Merge a list of sectors into the first one.
///
/// `sectors[0]` is retained; the remaining sectors are added into it and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub sectors: Vec<String>,
}

impl AggregationSpec {
    pub fn new(sectors: &[&str]) -> Self {
        Self {
            sectors: sectors.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.sectors.first().map(|s| s.as_str())
    }

    pub fn merged(&self) -> &[String] {
        self.sectors.get(1..).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationMode {
    /// Rows/columns are copied and scaled by ratios; the intersection is diagonal.
    Uniform,
    /// Explicit (row, column, percentage) allocations with default fill.
    UserDefined,
}

/// A single user-defined allocation: `percent` of the original cell goes to `(row, col)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub row: String,
    pub col: String,
    pub percent: f64,
}

impl AllocationEntry {
    pub fn new(row: &str, col: &str, percent: f64) -> Self {
        Self {
            row: row.to_string(),
            col: col.to_string(),
            percent,
        }
    }
}

/// Share of an environmental flow of the original sector attributed to a new sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowAllocationEntry {
    /// Flow key `Flowable/Context/Unit`
    pub flow: String,
    pub sector: String,
    pub percent: f64,
}

/// Split one sector into several new sectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisaggregationSpec {
    pub original_sector_code: String,
    pub disaggregated_sector_codes: Vec<String>,
    pub disaggregated_sector_names: Vec<String>,
    pub allocation: AllocationMode,
    /// Default split ratios, one per new sector. Equal split when absent.
    pub ratios: Option<Vec<f64>>,
    pub make_allocation: Vec<AllocationEntry>,
    pub use_allocation: Vec<AllocationEntry>,
    pub flow_allocation: Vec<FlowAllocationEntry>,
    /// NAICS code to new sector code
    pub naics_mapping: Vec<(String, String)>,
    /// Apply RAS balancing to the disaggregated Use table
    pub balance: bool,
}

impl Default for DisaggregationSpec {
    fn default() -> Self {
        Self {
            original_sector_code: String::new(),
            disaggregated_sector_codes: vec![],
            disaggregated_sector_names: vec![],
            allocation: AllocationMode::Uniform,
            ratios: None,
            make_allocation: vec![],
            use_allocation: vec![],
            flow_allocation: vec![],
            naics_mapping: vec![],
            balance: false,
        }
    }
}

/// Indicator metadata and the code used to select its characterization factors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSpec {
    pub name: String,
    pub code: String,
    pub group: String,
    pub unit: String,
    pub simple_unit: String,
    pub simple_name: String,
}

/// Additional demand vector requested by the model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandVectorSpec {
    pub name: String,
    /// `Production`, `Consumption` or `Household`
    pub demand_type: String,
    /// `Complete` or `Domestic`
    pub system: String,
    pub year: u16,
    pub location: String,
}

/// Numeric tolerances used by validation checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Allowed deviation of a commodity-mix column sum from 1
    pub commodity_mix: f64,
    /// Allowed deviation of an IO-year commodity CPI from 100
    pub cpi: f64,
    /// Relative tolerance for conservation checks after reshaping
    pub conservation: f64,
    /// Relative tolerance for RAS convergence
    pub ras: f64,
    pub ras_max_iterations: usize,
    /// Smallest acceptable reciprocal condition number of `I - A`
    pub min_reciprocal_condition: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            commodity_mix: 0.01,
            cpi: 0.3,
            conservation: 1e-6,
            ras: 1e-8,
            ras_max_iterations: 1000,
            min_reciprocal_condition: 1e-12,
        }
    }
}

/// Parsed model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpecs {
    pub model: String,
    pub io_year: u16,
    pub base_io_schema: u16,
    /// `Detail`, `Summary` or `Sector`
    pub base_io_level: String,
    pub model_region_acronyms: Vec<String>,
    pub model_type: ModelType,
    pub orientation: Orientation,
    pub price_type: PriceType,
    /// Dollar year of results. `None` keeps the IO year.
    pub currency_year: Option<u16>,
    pub aggregation: Vec<AggregationSpec>,
    pub disaggregation: Vec<DisaggregationSpec>,
    pub indicators: Vec<IndicatorSpec>,
    pub demand_vectors: Vec<DemandVectorSpec>,
    pub tolerances: Tolerances,
}

impl Default for ModelSpecs {
    fn default() -> Self {
        Self {
            model: "USEEIO".to_string(),
            io_year: 2012,
            base_io_schema: 2012,
            base_io_level: "Summary".to_string(),
            model_region_acronyms: vec!["US".to_string()],
            model_type: ModelType::Eeio,
            orientation: Orientation::Commodity,
            price_type: PriceType::Producer,
            currency_year: None,
            aggregation: vec![],
            disaggregation: vec![],
            indicators: vec![],
            demand_vectors: vec![],
            tolerances: Tolerances::default(),
        }
    }
}

impl ModelSpecs {
    /// Parse a TOML model configuration
    pub fn from_toml_str(document: &str) -> EEIOResult<Self> {
        Ok(toml::from_str(document)?)
    }

    /// Location acronym used for sector codes
    pub fn primary_region(&self) -> &str {
        self.model_region_acronyms
            .first()
            .map(|s| s.as_str())
            .unwrap_or("US")
    }
}
