//! Property tests: values quantized with reference encoders decode back
//! within the format's step size

use bytemuck::Zeroable;
use half::f16;
use proptest::prelude::*;
use woolly_convert::{get_to_fp16, get_to_fp32, DeviceBuffer, Stream};
use woolly_quants::blocks::{BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ8_0};
use woolly_quants::GgmlType;

fn decode_fp32(ty: GgmlType, src: Vec<u8>, n: usize) -> Vec<f32> {
    let stream = Stream::on_global_device().unwrap();
    let src = DeviceBuffer::from_vec(src);
    let dst = DeviceBuffer::<f32>::zeroed(n);
    get_to_fp32(ty).unwrap()(&src, &dst, 1, n, &stream);
    stream.synchronize();
    dst.to_vec()
}

fn amax(x: &[f32]) -> f32 {
    x.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

fn inverse(d: f32) -> f32 {
    if d == 0.0 {
        0.0
    } else {
        1.0 / d
    }
}

/// Symmetric 4-bit blocks; returns the bytes and each block's step
fn encode_q4_0(x: &[f32]) -> (Vec<u8>, Vec<f32>) {
    let mut bytes = Vec::new();
    let mut steps = Vec::new();
    for chunk in x.chunks(32) {
        let mut b = BlockQ4_0::zeroed();
        b.d = f16::from_f32(amax(chunk) / 7.0);
        let d = b.d.to_f32();
        let q = |v: f32| ((v * inverse(d)).round() as i32 + 8).clamp(0, 15) as u8;
        for j in 0..16 {
            b.qs[j] = q(chunk[j]) | (q(chunk[j + 16]) << 4);
        }
        bytes.extend_from_slice(bytemuck::bytes_of(&b));
        steps.push(d);
    }
    (bytes, steps)
}

fn encode_q4_1(x: &[f32]) -> (Vec<u8>, Vec<f32>) {
    let mut bytes = Vec::new();
    let mut steps = Vec::new();
    for chunk in x.chunks(32) {
        let min = chunk.iter().copied().fold(f32::INFINITY, f32::min);
        let max = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut b = BlockQ4_1::zeroed();
        b.d = f16::from_f32((max - min) / 15.0);
        b.m = f16::from_f32(min);
        let (d, m) = (b.d.to_f32(), b.m.to_f32());
        let q = |v: f32| ((v - m) * inverse(d)).round().clamp(0.0, 15.0) as u8;
        for j in 0..16 {
            b.qs[j] = q(chunk[j]) | (q(chunk[j + 16]) << 4);
        }
        bytes.extend_from_slice(bytemuck::bytes_of(&b));
        // the stored minimum is itself rounded
        steps.push(d + 2.0 * (m - min).abs());
    }
    (bytes, steps)
}

fn encode_q5_0(x: &[f32]) -> (Vec<u8>, Vec<f32>) {
    let mut bytes = Vec::new();
    let mut steps = Vec::new();
    for chunk in x.chunks(32) {
        let mut b = BlockQ5_0::zeroed();
        b.d = f16::from_f32(amax(chunk) / 15.0);
        let d = b.d.to_f32();
        let q = |v: f32| ((v * inverse(d)).round() as i32 + 16).clamp(0, 31) as u32;
        let mut qh = 0u32;
        for j in 0..16 {
            let (lo, hi) = (q(chunk[j]), q(chunk[j + 16]));
            b.qs[j] = ((lo & 0xf) | ((hi & 0xf) << 4)) as u8;
            qh |= ((lo >> 4) & 1) << j;
            qh |= ((hi >> 4) & 1) << (j + 16);
        }
        b.qh = qh.to_le_bytes();
        bytes.extend_from_slice(bytemuck::bytes_of(&b));
        steps.push(d);
    }
    (bytes, steps)
}

fn encode_q8_0(x: &[f32]) -> (Vec<u8>, Vec<f32>) {
    let mut bytes = Vec::new();
    let mut steps = Vec::new();
    for chunk in x.chunks(32) {
        let mut b = BlockQ8_0::zeroed();
        b.d = f16::from_f32(amax(chunk) / 127.0);
        let d = b.d.to_f32();
        for (q, &v) in b.qs.iter_mut().zip(chunk) {
            *q = (v * inverse(d)).round().clamp(-127.0, 127.0) as i8;
        }
        bytes.extend_from_slice(bytemuck::bytes_of(&b));
        steps.push(d);
    }
    (bytes, steps)
}

fn blocks() -> impl Strategy<Value = Vec<f32>> {
    (1usize..6).prop_flat_map(|n| prop::collection::vec(-8.0f32..8.0, 32 * n))
}

fn check(ty: GgmlType, x: &[f32], encode: fn(&[f32]) -> (Vec<u8>, Vec<f32>)) -> Result<(), TestCaseError> {
    let (bytes, steps) = encode(x);
    let y = decode_fp32(ty, bytes, x.len());
    for (i, (a, b)) in x.iter().zip(&y).enumerate() {
        let tol = 0.51 * steps[i / 32] + 1e-3 * a.abs() + 1e-6;
        prop_assert!((a - b).abs() <= tol, "{} element {}: {} decoded as {}", ty, i, a, b);
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_q4_0_within_step(x in blocks()) {
        check(GgmlType::Q4_0, &x, encode_q4_0)?;
    }

    #[test]
    fn prop_q4_1_within_step(x in blocks()) {
        check(GgmlType::Q4_1, &x, encode_q4_1)?;
    }

    #[test]
    fn prop_q5_0_within_step(x in blocks()) {
        check(GgmlType::Q5_0, &x, encode_q5_0)?;
    }

    #[test]
    fn prop_q8_0_within_step(x in blocks()) {
        check(GgmlType::Q8_0, &x, encode_q8_0)?;
    }

    #[test]
    fn prop_f16_output_is_rounded_f32_output(x in blocks()) {
        let (bytes, _) = encode_q8_0(&x);
        let wide = decode_fp32(GgmlType::Q8_0, bytes.clone(), x.len());

        let stream = Stream::on_global_device().unwrap();
        let src = DeviceBuffer::from_vec(bytes);
        let dst = DeviceBuffer::<f16>::zeroed(x.len());
        get_to_fp16(GgmlType::Q8_0).unwrap()(&src, &dst, 1, x.len(), &stream);
        stream.synchronize();

        for (w, h) in wide.iter().zip(dst.to_vec()) {
            prop_assert_eq!(f16::from_f32(*w), h);
        }
    }
}
