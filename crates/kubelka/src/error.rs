//! Error types for the kubelka library
//!
//! Physically undefined values (for example `b` where `a² < 1`) are not
//! errors: they travel through the pipeline as NaN.

use thiserror::Error;

use crate::optimize::SolverError;
use crate::pigment::Background;

/// Result type alias for kubelka operations
pub type Result<T> = std::result::Result<T, KmError>;

#[derive(Debug, Error)]
pub enum KmError {
    /// A selection yielded zero rows where at least one was required
    #[error("No value matching criteria: {0}")]
    EmptyResult(String),

    /// Concentration exclusion left no usable samples
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// An exclusion index has no corresponding concentration rank
    #[error("Concentration index {index} out of range for {available} unique concentrations")]
    ConcentrationIndexOutOfRange { index: i64, available: usize },

    /// Structural mismatch against the fixed pigment or quantity sets
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// Inverse optimization failed for a target after exhausting retries
    #[error("Max retries reached for {formula_code} ({background}) after {attempts} attempts")]
    MaxRetries {
        formula_code: String,
        background: Background,
        attempts: usize,
        #[source]
        source: SolverError,
    },
}

impl KmError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    /// Whether the error is isolated to a single target of a batch
    pub fn is_per_target(&self) -> bool {
        matches!(self, KmError::MaxRetries { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_result_message() {
        let error = KmError::EmptyResult("targets".to_string());
        assert_eq!(error.to_string(), "No value matching criteria: targets");
    }

    #[test]
    fn test_index_out_of_range_message() {
        let error = KmError::ConcentrationIndexOutOfRange {
            index: 1000,
            available: 3,
        };
        assert_eq!(
            error.to_string(),
            "Concentration index 1000 out of range for 3 unique concentrations"
        );
    }

    #[test]
    fn test_invalid_parameter_message() {
        let error = KmError::invalid_parameter("sample_weights[2]", -1.5);
        assert_eq!(error.to_string(), "Invalid parameter: sample_weights[2] = -1.5");
    }

    #[test]
    fn test_max_retries_keeps_source() {
        use std::error::Error as _;

        let error = KmError::MaxRetries {
            formula_code: "MU043".to_string(),
            background: Background::Light,
            attempts: 3,
            source: SolverError::NonFiniteObjective { iteration: 0 },
        };
        assert_eq!(
            error.to_string(),
            "Max retries reached for MU043 (L) after 3 attempts"
        );
        assert!(error.source().is_some());
        assert!(error.is_per_target());
    }
}
