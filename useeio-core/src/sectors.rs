//! Sector catalogs.
//!
//! A [`SectorTable`] is the ordered list of commodities or industries in a model.
//! Its order defines the row/column order of every matrix keyed by that
//! dimension. Lookups return `Option<usize>` rather than a sentinel index.

use crate::errors::{EEIOError, EEIOResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Sector key in `<BEA code>/<location>` form, e.g. `"221100/US"`.
pub type SectorCode = String;

/// Join a BEA code and a location acronym into a [`SectorCode`]
pub fn code_loc(code: &str, location: &str) -> SectorCode {
    format!("{}/{}", code, location)
}

/// Split a [`SectorCode`] into its BEA code and location parts
pub fn split_code_loc(code_loc: &str) -> Option<(&str, &str)> {
    code_loc.rsplit_once('/')
}

/// Which economic dimension a [`SectorTable`] catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectorKind {
    Commodity,
    Industry,
}

impl std::fmt::Display for SectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectorKind::Commodity => write!(f, "Commodities"),
            SectorKind::Industry => write!(f, "Industries"),
        }
    }
}

/// A single commodity or industry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    /// BEA code, e.g. `"221100"`
    pub code: String,
    /// Code joined with the location, e.g. `"221100/US"`
    pub code_loc: SectorCode,
    pub name: String,
    pub category: String,
    pub unit: String,
}

impl Sector {
    pub fn new(code: &str, location: &str, name: &str, category: &str) -> Self {
        Self {
            code: code.to_string(),
            code_loc: code_loc(code, location),
            name: name.to_string(),
            category: category.to_string(),
            unit: "USD".to_string(),
        }
    }
}

/// Ordered catalog of commodities or industries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTable {
    kind: SectorKind,
    sectors: Vec<Sector>,
}

impl SectorTable {
    /// Create a table, rejecting duplicate sector codes
    pub fn new(kind: SectorKind, sectors: Vec<Sector>) -> EEIOResult<Self> {
        let mut seen = HashSet::new();
        for s in &sectors {
            if !seen.insert(s.code_loc.as_str()) {
                return Err(EEIOError::Configuration(format!(
                    "duplicate sector code {} in {}",
                    s.code_loc, kind
                )));
            }
        }
        Ok(Self { kind, sectors })
    }

    pub fn kind(&self) -> SectorKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter()
    }

    /// Sector codes in model order
    pub fn code_locs(&self) -> Vec<SectorCode> {
        self.sectors.iter().map(|s| s.code_loc.clone()).collect()
    }

    pub fn index_of(&self, code_loc: &str) -> Option<usize> {
        self.sectors.iter().position(|s| s.code_loc == code_loc)
    }

    pub fn contains(&self, code_loc: &str) -> bool {
        self.index_of(code_loc).is_some()
    }

    pub fn get(&self, code_loc: &str) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.code_loc == code_loc)
    }

    /// Remove a sector, returning the removed record
    pub fn remove(&mut self, code_loc: &str) -> Option<Sector> {
        self.index_of(code_loc).map(|i| self.sectors.remove(i))
    }

    /// Replace one sector with several, at the same position.
    ///
    /// Returns the position of the replaced sector, or `None` if it was not present.
    pub fn replace_with(&mut self, code_loc: &str, replacements: Vec<Sector>) -> EEIOResult<Option<usize>> {
        let Some(position) = self.index_of(code_loc) else {
            return Ok(None);
        };
        for (k, r) in replacements.iter().enumerate() {
            if r.code_loc != code_loc && self.contains(&r.code_loc) {
                return Err(EEIOError::Configuration(format!(
                    "sector {} already exists in {}",
                    r.code_loc, self.kind
                )));
            }
            if replacements[..k].iter().any(|p| p.code_loc == r.code_loc) {
                return Err(EEIOError::Configuration(format!(
                    "sector {} is listed twice in the replacements",
                    r.code_loc
                )));
            }
        }
        self.sectors.splice(position..position + 1, replacements);
        Ok(Some(position))
    }
}

/// One row of the sector crosswalk linking NAICS codes to BEA and model codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrosswalkEntry {
    pub naics: String,
    pub bea_sector: String,
    pub bea_summary: String,
    pub bea_detail: String,
    /// Model sector code (without location)
    pub useeio: String,
}

/// Crosswalk between NAICS codes and model sectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Crosswalk {
    entries: Vec<CrosswalkEntry>,
}

impl Crosswalk {
    pub fn new(entries: Vec<CrosswalkEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CrosswalkEntry] {
        &self.entries
    }

    pub fn naics_for(&self, useeio_code: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.useeio == useeio_code)
            .map(|e| e.naics.as_str())
            .collect()
    }

    /// Re-point merged sector codes to the target and copy the target's BEA fields.
    ///
    /// Returns the number of entries updated.
    pub fn aggregate(&mut self, target: &str, merged: &[&str]) -> usize {
        let Some(template) = self.entries.iter().find(|e| e.useeio == target).cloned() else {
            return 0;
        };
        let mut updated = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| merged.contains(&e.useeio.as_str()))
        {
            entry.useeio = template.useeio.clone();
            entry.bea_sector = template.bea_sector.clone();
            entry.bea_summary = template.bea_summary.clone();
            entry.bea_detail = template.bea_detail.clone();
            updated += 1;
        }
        let mut seen = HashSet::new();
        self.entries
            .retain(|e| seen.insert((e.naics.clone(), e.useeio.clone())));
        updated
    }

    /// Re-point the original code to the new codes.
    ///
    /// NAICS codes listed in `mapping` take the mapped code; any other entry of the
    /// original sector takes the first new code.
    pub fn disaggregate(&mut self, original: &str, new_codes: &[String], mapping: &[(String, String)]) {
        let Some(fallback) = new_codes.first() else {
            return;
        };
        for entry in self.entries.iter_mut().filter(|e| e.useeio == original) {
            entry.useeio = mapping
                .iter()
                .find(|(naics, _)| *naics == entry.naics)
                .map(|(_, code)| code.clone())
                .unwrap_or_else(|| fallback.clone());
        }
    }
}
