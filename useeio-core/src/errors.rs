use thiserror::Error;

/// Error type for invalid model construction or calculation.
///
/// Every variant is terminal for the build or calculation call that raised it.
/// There is no partially constructed model and no automatic retry.
#[derive(Error, Debug)]
pub enum EEIOError {
    #[error("{0}")]
    Error(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Dimension mismatch in {context}: expected {expected}, got {found}")]
    DimensionMismatch {
        context: String,
        expected: String,
        found: String,
    },
    #[error("Numeric check '{check}' failed with magnitude {magnitude:e}")]
    Numeric { check: String, magnitude: f64 },
    #[error("Invalid demand vector: {0}")]
    InvalidDemand(String),
    #[error("'{0}' is not a valid perspective. Expected one of DIRECT, FINAL or BOTH")]
    InvalidPerspective(String),
    #[error("{feature} is not yet supported")]
    NotYetSupported { feature: String },
    #[error("Could not parse model specification: {0}")]
    SpecParse(#[from] toml::de::Error),
}

impl EEIOError {
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl std::fmt::Debug,
        found: impl std::fmt::Debug,
    ) -> Self {
        EEIOError::DimensionMismatch {
            context: context.into(),
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }

    pub fn numeric(check: impl Into<String>, magnitude: f64) -> Self {
        EEIOError::Numeric {
            check: check.into(),
            magnitude,
        }
    }

    pub fn not_yet_supported(feature: impl Into<String>) -> Self {
        EEIOError::NotYetSupported {
            feature: feature.into(),
        }
    }
}

/// Convenience type for `Result<T, EEIOError>`.
pub type EEIOResult<T> = Result<T, EEIOError>;
