//! Output-store strategies and plain source scalars
//!
//! Every kernel computes in `f32` and hands each finished value to
//! [`OutputStore::store`]; that is the only place a narrowing conversion
//! happens.

use byteorder::{ByteOrder, LittleEndian};
use half::{bf16, f16};
use woolly_quants::GgmlType;

/// Output precision of a decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPrecision {
    F32,
    F16,
    BF16,
}

/// Scalar type a kernel can write
pub trait OutputStore: Copy + Default + Send + Sync + 'static {
    const PRECISION: OutputPrecision;

    /// Convert a decoded value to the stored representation
    fn store(value: f32) -> Self;

    /// Widen a stored value back to `f32`
    fn widen(self) -> f32;
}

impl OutputStore for f32 {
    const PRECISION: OutputPrecision = OutputPrecision::F32;

    #[inline(always)]
    fn store(value: f32) -> Self {
        value
    }

    #[inline(always)]
    fn widen(self) -> f32 {
        self
    }
}

impl OutputStore for f16 {
    const PRECISION: OutputPrecision = OutputPrecision::F16;

    #[inline(always)]
    fn store(value: f32) -> Self {
        f16::from_f32(value)
    }

    #[inline(always)]
    fn widen(self) -> f32 {
        self.to_f32()
    }
}

impl OutputStore for bf16 {
    const PRECISION: OutputPrecision = OutputPrecision::BF16;

    #[inline(always)]
    fn store(value: f32) -> Self {
        bf16::from_f32(value)
    }

    #[inline(always)]
    fn widen(self) -> f32 {
        self.to_f32()
    }
}

/// Unquantized element stored little-endian in a byte buffer
pub trait SourceScalar: Send + Sync + 'static {
    const TYPE: GgmlType;
    const WIDTH: usize;

    fn read(bytes: &[u8]) -> f32;
}

impl SourceScalar for f32 {
    const TYPE: GgmlType = GgmlType::F32;
    const WIDTH: usize = 4;

    #[inline(always)]
    fn read(bytes: &[u8]) -> f32 {
        LittleEndian::read_f32(bytes)
    }
}

impl SourceScalar for f16 {
    const TYPE: GgmlType = GgmlType::F16;
    const WIDTH: usize = 2;

    #[inline(always)]
    fn read(bytes: &[u8]) -> f32 {
        f16::from_bits(LittleEndian::read_u16(bytes)).to_f32()
    }
}

impl SourceScalar for bf16 {
    const TYPE: GgmlType = GgmlType::BF16;
    const WIDTH: usize = 2;

    #[inline(always)]
    fn read(bytes: &[u8]) -> f32 {
        bf16::from_bits(LittleEndian::read_u16(bytes)).to_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_rounds_once() {
        // 1 + 2^-11 is a tie between two halves; nearest even keeps 1.0
        assert_eq!(f16::store(1.0 + 2f32.powi(-11)), f16::ONE);
        assert_eq!(bf16::store(0.1), bf16::from_f32(0.1));
        assert_eq!(f32::store(0.1), 0.1);
    }

    #[test]
    fn test_source_scalars_read_little_endian() {
        assert_eq!(f32::read(&1.5f32.to_le_bytes()), 1.5);
        assert_eq!(f16::read(&f16::from_f32(-2.0).to_le_bytes()), -2.0);
        assert_eq!(bf16::read(&bf16::from_f32(3.0).to_le_bytes()), 3.0);
    }
}
