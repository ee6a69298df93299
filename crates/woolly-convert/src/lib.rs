//! Woolly Convert - dequantization and float conversion
//!
//! This crate decodes packed GGML tensor data into dense `f32`, `f16` or
//! `bf16` arrays. Decoding runs as a grid of cooperative groups on a device
//! worker pool; launches are queued on a [`Stream`] and become visible after
//! the stream is synchronized.
//!
//! ```no_run
//! use woolly_convert::{get_to_fp32, DeviceBuffer, Stream, Device};
//! use woolly_quants::GgmlType;
//!
//! # fn main() -> woolly_convert::Result<()> {
//! let stream = Stream::new(Device::global()?)?;
//! let src = DeviceBuffer::from_vec(vec![0u8; 4 * 34]);
//! let dst = DeviceBuffer::<f32>::zeroed(128);
//! if let Some(decode) = get_to_fp32(GgmlType::Q8_0) {
//!     decode(&src, &dst, 1, 128, &stream);
//! }
//! stream.synchronize();
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod grid;
pub mod kernels;
pub mod launch;
pub mod store;
pub mod stream;

pub use buffer::DeviceBuffer;
pub use config::DeviceConfig;
pub use device::{Capabilities, Device};
pub use dispatch::{get_to_bf16, get_to_fp16, get_to_fp32, supported};
pub use error::{Error, Result};
pub use launch::ToTypeFn;
pub use store::{OutputPrecision, OutputStore, SourceScalar};
pub use stream::Stream;

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        get_to_bf16, get_to_fp16, get_to_fp32, supported, Device, DeviceBuffer, DeviceConfig, Error,
        OutputPrecision, Result, Stream, ToTypeFn,
    };
    pub use woolly_quants::GgmlType;
}
