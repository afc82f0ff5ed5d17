//! Structured build diagnostics.
//!
//! Pipeline stages record noteworthy but non-fatal events here (skipped
//! aggregation references, unmapped flows, balancing outcomes). Every record is
//! also forwarded to the `log` facade, so callers can either inspect the
//! collected list or rely on their logger. Recording a diagnostic never changes
//! what a stage computes.

use serde::{Deserialize, Serialize};

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
}

impl From<DiagnosticLevel> for log::Level {
    fn from(level: DiagnosticLevel) -> Self {
        match level {
            DiagnosticLevel::Debug => log::Level::Debug,
            DiagnosticLevel::Info => log::Level::Info,
            DiagnosticLevel::Warn => log::Level::Warn,
        }
    }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Aggregation,
    Disaggregation,
    Balancing,
    IOTransform,
    Leontief,
    Satellite,
    Indicators,
    Demand,
    Calculation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Aggregation => "aggregation",
            Stage::Disaggregation => "disaggregation",
            Stage::Balancing => "balancing",
            Stage::IOTransform => "io-transform",
            Stage::Leontief => "leontief",
            Stage::Satellite => "satellite",
            Stage::Indicators => "indicators",
            Stage::Demand => "demand",
            Stage::Calculation => "calculation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub stage: Stage,
    pub message: String,
}

/// Ordered collection of diagnostics emitted while building a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, level: DiagnosticLevel, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        let log_level: log::Level = level.into();
        log::log!(target: "useeio", log_level, "[{}] {}", stage, message);
        self.records.push(Diagnostic {
            level,
            stage,
            message,
        });
    }

    pub fn debug(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(DiagnosticLevel::Debug, stage, message);
    }

    pub fn info(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(DiagnosticLevel::Info, stage, message);
    }

    pub fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(DiagnosticLevel::Warn, stage, message);
    }

    /// Records for a single stage, in emission order
    pub fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |d| d.stage == stage)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warn)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append the records of another collection
    pub fn extend(&mut self, other: Diagnostics) {
        self.records.extend(other.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_keep_order_and_stage() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.info(Stage::Aggregation, "merged 2 sectors");
        diagnostics.warn(Stage::Indicators, "unmapped flow");
        diagnostics.debug(Stage::Aggregation, "dropped row");

        assert_eq!(diagnostics.len(), 3);
        let aggregation: Vec<_> = diagnostics.for_stage(Stage::Aggregation).collect();
        assert_eq!(aggregation.len(), 2);
        assert_eq!(aggregation[0].message, "merged 2 sectors");
        assert_eq!(diagnostics.warnings().count(), 1);
    }
}
