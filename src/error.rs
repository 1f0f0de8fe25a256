//! Error types for the OpenWeatherMap exporter

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the exporter
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Startup / Configuration Errors
    // =========================================================================
    /// Config file exists but could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    ConfigNotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is present but holds no settings
    #[error("Configuration file is empty: {}", .0.display())]
    ConfigEmpty(PathBuf),

    /// Config file is not valid YAML
    #[error(
        "Error in configuration {}{}: {message}",
        .path.display(),
        position_suffix(.position)
    )]
    ConfigSyntax {
        path: PathBuf,
        /// 1-based (line, column) when the parser reports one
        position: Option<(usize, usize)>,
        message: String,
    },

    /// A configuration value failed validation
    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// No API key in file or environment
    #[error("API key is required")]
    MissingApiKey,

    /// No locations configured
    #[error("No locations specified in configuration")]
    NoLocations,

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// Weather provider could not be reached
    #[error("Weather provider connection error: {0}")]
    ProviderConnection(#[source] reqwest::Error),

    /// Weather provider answered with a non-success status
    #[error("Weather provider returned {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    /// Weather provider response was malformed or incomplete
    #[error("Failed to parse weather provider response: {0}")]
    ProviderResponse(String),

    // =========================================================================
    // Metrics / Server Errors
    // =========================================================================
    /// Metric registration or update failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Scrape server failure
    #[error("Metrics server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn position_suffix(position: &Option<(usize, usize)>) -> String {
    match position {
        Some((line, column)) => format!(" at position ({}:{})", line, column),
        None => String::new(),
    }
}

impl Error {
    /// Whether this error must stop the process before it starts serving.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotReadable { .. }
                | Error::ConfigEmpty(_)
                | Error::ConfigSyntax { .. }
                | Error::InvalidValue { .. }
                | Error::MissingApiKey
                | Error::NoLocations
                | Error::Server(_)
        )
    }

    pub(crate) fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidValue {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_errors_are_fatal() {
        assert!(Error::MissingApiKey.is_fatal());
        assert!(Error::NoLocations.is_fatal());
        assert!(Error::ConfigEmpty(PathBuf::from("config.yaml")).is_fatal());
        assert!(Error::invalid("interval", "0", "must be greater than zero").is_fatal());
    }

    #[test]
    fn test_provider_errors_are_recoverable() {
        assert!(!Error::ProviderResponse("missing main.temp".to_string()).is_fatal());
        assert!(!Error::ProviderStatus {
            status: 404,
            body: "city not found".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_syntax_error_message_carries_position() {
        let err = Error::ConfigSyntax {
            path: PathBuf::from("config.yaml"),
            position: Some((3, 7)),
            message: "did not find expected node content".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("(3:7)"));
        assert!(msg.contains("config.yaml"));
    }
}
