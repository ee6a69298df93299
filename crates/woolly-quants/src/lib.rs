//! GGML quantization descriptors
//!
//! This crate describes the packed storage formats that the conversion layer
//! decodes: the element-type enumeration and its storage traits, the
//! fixed-layout block records, the constant value and sign tables, and the
//! process-wide lattice codebooks.

pub mod blocks;
pub mod codebook;
pub mod error;
pub mod ggml_type;
pub mod tables;
pub mod validate;

pub use codebook::{GridSet, GridTables};
pub use error::{Error, Result};
pub use ggml_type::{file_type_to_ggml_type, GgmlType, TypeTraits, QK4_0, QK_IQ1BN, QK_K};
pub use validate::{
    bf16_to_fp32_row, fp16_to_fp32_row, fp32_to_bf16_row, fp32_to_fp16_row, validate_row_data,
};
