//! Type-dispatch tables
//!
//! Map an element type to the launch wrapper that decodes it into a given
//! output precision. An unsupported combination is `None`; callers either
//! fall back to another path or treat the type as unusable.

use half::{bf16, f16};
use woolly_quants::GgmlType;

use crate::launch::{self, ToTypeFn};
use crate::store::{OutputPrecision, OutputStore};

/// Lattice formats. Their launches are dropped until the grids are installed.
fn codebook_decoder<T: OutputStore>(ty: GgmlType) -> Option<ToTypeFn<T>> {
    use GgmlType::*;
    let f: ToTypeFn<T> = match ty {
        IQ2_XXS => launch::dequantize_iq2_xxs::<T>,
        IQ2_XS => launch::dequantize_iq2_xs::<T>,
        IQ2_S => launch::dequantize_iq2_s::<T>,
        IQ3_XXS => launch::dequantize_iq3_xxs::<T>,
        IQ3_S => launch::dequantize_iq3_s::<T>,
        IQ1_S => launch::dequantize_iq1_s::<T>,
        IQ1_M => launch::dequantize_iq1_m::<T>,
        _ => return None,
    };
    Some(f)
}

/// Quantized formats decoded the same way into `f32` and `f16`
fn quantized_decoder<T: OutputStore>(ty: GgmlType) -> Option<ToTypeFn<T>> {
    use GgmlType::*;
    let f: ToTypeFn<T> = match ty {
        Q4_0 => launch::dequantize_q4_0::<T>,
        Q4_1 => launch::dequantize_q4_1::<T>,
        Q5_0 => launch::dequantize_q5_0::<T>,
        Q5_1 => launch::dequantize_q5_1::<T>,
        Q6_0 => launch::dequantize_q6_0::<T>,
        Q8_1 => launch::dequantize_q8_1::<T>,
        Q2_K => launch::dequantize_q2_k::<T>,
        Q3_K => launch::dequantize_q3_k::<T>,
        Q4_K => launch::dequantize_q4_k::<T>,
        Q5_K => launch::dequantize_q5_k::<T>,
        Q6_K => launch::dequantize_q6_k::<T>,
        Q8_K => launch::dequantize_q8_k::<T>,
        IQ4_NL => launch::dequantize_iq4_nl::<T>,
        IQ4_XS => launch::dequantize_iq4_xs::<T>,
        IQ2_K => launch::dequantize_iq2_k::<T>,
        IQ3_K => launch::dequantize_iq3_k::<T>,
        IQ4_K => launch::dequantize_iq4_k::<T>,
        IQ5_K => launch::dequantize_iq5_k::<T>,
        IQ6_K => launch::dequantize_iq6_k::<T>,
        IQ4_KS => launch::dequantize_iq4_ks::<T>,
        IQ4_KSS => launch::dequantize_iq4_kss::<T>,
        IQ5_KS => launch::dequantize_iq5_ks::<T>,
        IQ2_KS => launch::dequantize_iq2_ks::<T>,
        IQ3_KS => launch::dequantize_iq3_ks::<T>,
        IQ1_BN => launch::dequantize_iq1_bn::<T>,
        IQ2_BN => launch::dequantize_iq2_bn::<T>,
        IQ1_KT => launch::dequantize_iq1_kt::<T>,
        IQ2_KT => launch::dequantize_iq2_kt::<T>,
        IQ3_KT => launch::dequantize_iq3_kt::<T>,
        IQ4_KT => launch::dequantize_iq4_kt::<T>,
        Q8_0_R8 => launch::dequantize_q8_0_r8::<T>,
        _ => return codebook_decoder(ty),
    };
    Some(f)
}

/// Decoder into `f32` for `ty`
pub fn get_to_fp32(ty: GgmlType) -> Option<ToTypeFn<f32>> {
    let f: ToTypeFn<f32> = match ty {
        GgmlType::F16 => launch::convert_unary::<f16, f32>,
        GgmlType::BF16 => launch::convert_unary::<bf16, f32>,
        GgmlType::Q8_0 => launch::dequantize_q8_0::<f32>,
        _ => return quantized_decoder(ty),
    };
    Some(f)
}

/// Decoder into `f16` for `ty`. Q8_0 goes through the staged kernel.
pub fn get_to_fp16(ty: GgmlType) -> Option<ToTypeFn<f16>> {
    let f: ToTypeFn<f16> = match ty {
        GgmlType::F32 => launch::convert_unary::<f32, f16>,
        GgmlType::BF16 => launch::convert_unary::<bf16, f16>,
        GgmlType::Q8_0 => launch::dequantize_q8_0_staged::<f16>,
        _ => return quantized_decoder(ty),
    };
    Some(f)
}

/// Decoder into `bf16` for `ty`. Only a subset of formats is covered.
pub fn get_to_bf16(ty: GgmlType) -> Option<ToTypeFn<bf16>> {
    use GgmlType::*;
    let f: ToTypeFn<bf16> = match ty {
        F32 => launch::convert_unary::<f32, bf16>,
        F16 => launch::convert_unary::<f16, bf16>,
        Q4_0 => launch::dequantize_q4_0::<bf16>,
        Q4_1 => launch::dequantize_q4_1::<bf16>,
        Q5_0 => launch::dequantize_q5_0::<bf16>,
        Q5_1 => launch::dequantize_q5_1::<bf16>,
        Q6_0 => launch::dequantize_q6_0::<bf16>,
        Q8_0 => launch::dequantize_q8_0_staged::<bf16>,
        IQ4_NL => launch::dequantize_iq4_nl::<bf16>,
        IQ1_KT => launch::dequantize_iq1_kt::<bf16>,
        IQ2_KT => launch::dequantize_iq2_kt::<bf16>,
        IQ3_KT => launch::dequantize_iq3_kt::<bf16>,
        IQ4_KT => launch::dequantize_iq4_kt::<bf16>,
        _ => return None,
    };
    Some(f)
}

/// Whether `ty` can be decoded into `precision`
pub fn supported(ty: GgmlType, precision: OutputPrecision) -> bool {
    match precision {
        OutputPrecision::F32 => get_to_fp32(ty).is_some(),
        OutputPrecision::F16 => get_to_fp16(ty).is_some(),
        OutputPrecision::BF16 => get_to_bf16(ty).is_some(),
    }
}
