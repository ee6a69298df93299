//! Error types for quantization descriptors

use thiserror::Error;

/// Result type alias for descriptor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving types or checking packed data
#[derive(Error, Debug)]
pub enum Error {
    /// Numeric tag is not a known element type
    #[error("Unknown ggml type tag: {0}")]
    UnknownType(u32),

    /// Name does not match any known element type
    #[error("Unknown ggml type name: {0}")]
    UnknownTypeName(String),

    /// Numeric code is not a known model file type
    #[error("Unknown ggml file type: {0}")]
    UnknownFileType(i32),

    /// The type has no block layout this crate models
    #[error("No block layout for type {0}")]
    NoLayout(&'static str),

    /// Row data length does not fit the block layout
    #[error("Invalid row data for {ty}: {nbytes} bytes is not a multiple of {type_size}")]
    InvalidRowData {
        ty: &'static str,
        nbytes: usize,
        type_size: usize,
    },

    /// A scale or plain value is NaN or infinite
    #[error("Non-finite value in {ty} data at block {block}")]
    NonFiniteValue {
        ty: &'static str,
        block: usize,
    },

    /// Codebook grids are malformed
    #[error("Invalid codebook: {0}")]
    InvalidCodebook(String),

    /// Codebook grids were already installed for this process
    #[error("Codebook grids are already installed")]
    CodebookAlreadyInstalled,
}
