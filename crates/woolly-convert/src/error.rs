//! Error types for the conversion layer

use thiserror::Error;

/// Result type alias for conversion setup
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up devices and streams.
///
/// Launches themselves never fail; an unsupported conversion is an absent
/// entry in the dispatch tables.
#[derive(Error, Debug)]
pub enum Error {
    /// The device cannot run every kernel
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Configuration values are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor error from the quantization crate
    #[error(transparent)]
    Quants(#[from] woolly_quants::Error),
}
