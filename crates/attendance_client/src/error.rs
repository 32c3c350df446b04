//! crates/attendance_client/src/error.rs
//!
//! Errors raised while building the client or exporting reports. Store
//! operations themselves fail with `PortError`.

use attendance_core::PortError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid API URL '{0}': {1}")]
    InvalidUrl(String, String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Attachment '{0}' could not be decoded: {1}")]
    Attachment(String, String),

    /// The PDF document could not be laid out or serialized.
    #[error("Report export error: {0}")]
    Pdf(String),

    #[error("Store error: {0}")]
    Port(#[from] PortError),
}
