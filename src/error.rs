use std::path::PathBuf;

use kubelka::KmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] KmError),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("No {0} found in input")]
    MissingInput(&'static str),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        AppError::Json {
            path: path.into(),
            source,
        }
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_is_transparent() {
        let error: AppError = KmError::InsufficientData("nothing left".to_string()).into();
        assert_eq!(error.to_string(), KmError::InsufficientData("nothing left".to_string()).to_string());
    }

    #[test]
    fn test_io_error_names_path() {
        let error = AppError::io(
            "measurements.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(error.to_string(), "Failed to access measurements.json: no such file");
    }

    #[test]
    fn test_missing_input() {
        let error = AppError::MissingInput("monochrome samples");
        assert_eq!(error.to_string(), "No monochrome samples found in input");
    }

    #[test]
    fn test_yaml_error_converts() {
        let yaml_error = serde_yaml::from_str::<u32>("[not a number").unwrap_err();
        let error: AppError = yaml_error.into();
        assert!(matches!(error, AppError::Config(_)));
        assert!(error.to_string().starts_with("Invalid configuration: "));
    }
}
