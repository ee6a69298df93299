//! Row data validation and host-side float row conversion
//!
//! Loaders call [`validate_row_data`] on tensor payloads before handing them
//! to the conversion layer; a NaN block scale would otherwise poison every
//! element it covers without any error being raised downstream.

use byteorder::{ByteOrder, LittleEndian};
use half::slice::HalfFloatSliceExt;
use half::{bf16, f16};
use tracing::debug;

use crate::blocks::*;
use crate::error::{Error, Result};
use crate::ggml_type::GgmlType;

fn check_blocks<B, const N: usize>(
    ty: GgmlType,
    data: &[u8],
    scales: impl Fn(&B) -> [f32; N],
) -> Result<()>
where
    B: QuantBlock,
{
    let nblocks = data.len() / std::mem::size_of::<B>();
    for i in 0..nblocks {
        let block: B = block_at(data, i);
        if scales(&block).iter().any(|s| !s.is_finite()) {
            return Err(Error::NonFiniteValue { ty: ty.name(), block: i });
        }
    }
    Ok(())
}

fn check_plain(ty: GgmlType, data: &[u8], width: usize, finite: impl Fn(&[u8]) -> bool) -> Result<()> {
    match data.chunks_exact(width).position(|c| !finite(c)) {
        Some(i) => Err(Error::NonFiniteValue { ty: ty.name(), block: i }),
        None => Ok(()),
    }
}

/// Check a packed tensor payload for size consistency and non-finite scales.
///
/// Formats with per-row metadata cannot be checked without the row length;
/// their payloads are accepted as-is.
pub fn validate_row_data(ty: GgmlType, data: &[u8]) -> Result<()> {
    let traits = ty.traits().ok_or(Error::NoLayout(ty.name()))?;
    if traits.row_meta_size > 0 {
        debug!("Skipping validation of {} payload with row metadata", ty);
        return Ok(());
    }
    let stride = traits.type_size * traits.nrows;
    if data.len() % stride != 0 {
        return Err(Error::InvalidRowData {
            ty: ty.name(),
            nbytes: data.len(),
            type_size: stride,
        });
    }

    use GgmlType::*;
    match ty {
        F32 => check_plain(ty, data, 4, |c| LittleEndian::read_f32(c).is_finite()),
        F16 => check_plain(ty, data, 2, |c| f16::from_le_bytes([c[0], c[1]]).is_finite()),
        BF16 => check_plain(ty, data, 2, |c| bf16::from_le_bytes([c[0], c[1]]).is_finite()),
        F64 => check_plain(ty, data, 8, |c| LittleEndian::read_f64(c).is_finite()),

        Q4_0 => check_blocks(ty, data, |b: &BlockQ4_0| [b.d.to_f32()]),
        Q4_1 => check_blocks(ty, data, |b: &BlockQ4_1| [b.d.to_f32(), b.m.to_f32()]),
        Q5_0 => check_blocks(ty, data, |b: &BlockQ5_0| [b.d.to_f32()]),
        Q5_1 => check_blocks(ty, data, |b: &BlockQ5_1| [b.d.to_f32(), b.m.to_f32()]),
        Q6_0 => check_blocks(ty, data, |b: &BlockQ6_0| [b.d.to_f32()]),
        Q8_0 => check_blocks(ty, data, |b: &BlockQ8_0| [b.d.to_f32()]),
        Q8_1 => check_blocks(ty, data, |b: &BlockQ8_1| [b.d.to_f32(), b.s.to_f32()]),
        Q8_0_R8 => check_blocks(ty, data, |b: &BlockQ8_0R8| b.d.map(f16::to_f32)),

        Q2_K => check_blocks(ty, data, |b: &BlockQ2K| [b.d.to_f32(), b.dmin.to_f32()]),
        Q3_K => check_blocks(ty, data, |b: &BlockQ3K| [b.d.to_f32()]),
        Q4_K => check_blocks(ty, data, |b: &BlockQ4K| [b.d.to_f32(), b.dmin.to_f32()]),
        Q5_K => check_blocks(ty, data, |b: &BlockQ5K| [b.d.to_f32(), b.dmin.to_f32()]),
        Q6_K => check_blocks(ty, data, |b: &BlockQ6K| [b.d.to_f32()]),
        Q8_K => check_blocks(ty, data, |b: &BlockQ8K| [b.d]),

        IQ2_XXS => check_blocks(ty, data, |b: &BlockIq2Xxs| [b.d.to_f32()]),
        IQ2_XS => check_blocks(ty, data, |b: &BlockIq2Xs| [b.d.to_f32()]),
        IQ2_S => check_blocks(ty, data, |b: &BlockIq2S| [b.d.to_f32()]),
        IQ3_XXS => check_blocks(ty, data, |b: &BlockIq3Xxs| [b.d.to_f32()]),
        IQ3_S => check_blocks(ty, data, |b: &BlockIq3S| [b.d.to_f32()]),
        IQ1_S => check_blocks(ty, data, |b: &BlockIq1S| [b.d.to_f32()]),
        IQ1_M => check_blocks(ty, data, |b: &BlockIq1M| [b.block_scale().to_f32()]),
        IQ4_NL => check_blocks(ty, data, |b: &BlockIq4Nl| [b.d.to_f32()]),
        IQ4_XS => check_blocks(ty, data, |b: &BlockIq4Xs| [b.d.to_f32()]),

        IQ2_K => check_blocks(ty, data, |b: &BlockIq2K| [b.d.to_f32()]),
        IQ3_K => check_blocks(ty, data, |b: &BlockIq3K| [b.d.to_f32()]),
        IQ4_K => check_blocks(ty, data, |b: &BlockIq4K| [b.d.to_f32()]),
        IQ5_K => check_blocks(ty, data, |b: &BlockIq5K| [b.d.to_f32()]),
        IQ6_K => check_blocks(ty, data, |b: &BlockIq6K| [b.d.to_f32()]),

        _ => Ok(()),
    }
}

/// Widen a row of half floats
pub fn fp16_to_fp32_row(src: &[f16], dst: &mut [f32]) {
    let n = src.len().min(dst.len());
    src[..n].convert_to_f32_slice(&mut dst[..n]);
}

/// Narrow a row of floats to half precision, rounding to nearest even
pub fn fp32_to_fp16_row(src: &[f32], dst: &mut [f16]) {
    let n = src.len().min(dst.len());
    dst[..n].convert_from_f32_slice(&src[..n]);
}

pub fn bf16_to_fp32_row(src: &[bf16], dst: &mut [f32]) {
    let n = src.len().min(dst.len());
    src[..n].convert_to_f32_slice(&mut dst[..n]);
}

pub fn fp32_to_bf16_row(src: &[f32], dst: &mut [bf16]) {
    let n = src.len().min(dst.len());
    dst[..n].convert_from_f32_slice(&src[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[test]
    fn test_rejects_ragged_length() {
        let data = vec![0u8; 18 * 3 + 1];
        assert!(matches!(
            validate_row_data(GgmlType::Q4_0, &data),
            Err(Error::InvalidRowData { nbytes: 55, type_size: 18, .. })
        ));
    }

    #[test]
    fn test_rejects_nan_scale() {
        let mut blocks = vec![BlockQ4K::zeroed(); 3];
        blocks[2].dmin = f16::NAN;
        let data: &[u8] = bytemuck::cast_slice(blocks.as_slice());
        match validate_row_data(GgmlType::Q4_K, data) {
            Err(Error::NonFiniteValue { block, .. }) => assert_eq!(block, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_plain_float_checks() {
        let mut data = Vec::new();
        for v in [1.0f32, -2.5, f32::INFINITY] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        assert!(validate_row_data(GgmlType::F32, &data[..8]).is_ok());
        assert!(validate_row_data(GgmlType::F32, &data).is_err());
        assert!(validate_row_data(GgmlType::IQ4_KS, &[0u8; 7]).is_ok());
        assert!(matches!(validate_row_data(GgmlType::Q8_KV, &[]), Err(Error::NoLayout(_))));
    }

    #[test]
    fn test_row_helpers_round_to_nearest_even() {
        let src = [1.0f32, 0.1, 65504.0, 1e-8];
        let mut half = [f16::ZERO; 4];
        fp32_to_fp16_row(&src, &mut half);
        for (h, s) in half.iter().zip(src) {
            assert_eq!(*h, f16::from_f32(s));
        }
        let mut back = [0.0f32; 4];
        fp16_to_fp32_row(&half, &mut back);
        assert_eq!(back[0], 1.0);
        assert_eq!(back[2], 65504.0);

        let mut b = [bf16::ZERO; 4];
        fp32_to_bf16_row(&src, &mut b);
        bf16_to_fp32_row(&b, &mut back);
        assert_eq!(back[0], 1.0);
        assert_eq!(b[1], bf16::from_f32(0.1));
    }
}
