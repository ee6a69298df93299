//! Trellis formats
//!
//! A trellis block stores seeds rather than values: each lane starts a
//! linear congruential generator from its seed and emits eight consecutive
//! outputs. All generator arithmetic wraps modulo 2^32.

use half::f16;
use woolly_quants::blocks::{block_at, BlockIq1Kt, BlockIq2Kt, BlockIq3Kt, BlockIq4Kt};
use woolly_quants::tables::IQ4K_VALUES;

use super::{locate_superblock, meta_f32};
use crate::grid::{GroupOut, Lane, Shape};
use crate::store::OutputStore;

pub const THREADS: usize = 32;

/// Seeds below this offset are never produced by the encoder
const SEED_OFFSET: u32 = 4096;

const FOLDED_MUL: u32 = 0xCBAC_1FED;
const HALF_MUL: u32 = 89_226_354;
const HALF_ADD: u32 = 64_248_484;
const HALF_MASK: u32 = 0x8fff_8fff;
const HALF_XOR: u32 = 0x3b60_3b60;

/// Integer generator: step, then sum the four 6-bit byte lanes around zero
#[inline]
pub fn next_folded(state: &mut u32) -> i32 {
    *state = state.wrapping_mul(FOLDED_MUL);
    let lanes = (*state & 0x3f3f_3f3f).to_le_bytes();
    lanes.iter().map(|&b| b as i32).sum::<i32>() - 126
}

/// Half-precision generator: step, then add the two 16-bit lanes as halves.
/// The sum is rounded to half once.
#[inline]
pub fn next_half(state: &mut u32) -> f32 {
    *state = state.wrapping_mul(HALF_MUL).wrapping_add(HALF_ADD);
    let s = (*state & HALF_MASK) ^ HALF_XOR;
    let lo = f16::from_bits(s as u16).to_f32();
    let hi = f16::from_bits((s >> 16) as u16).to_f32();
    f16::from_f32(lo + hi).to_f32()
}

pub fn dequantize_iq1_kt<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 4, lane.group);
    let scale = meta_f32(meta, 0);
    let x = block_at::<BlockIq1Kt>(blocks, i);
    let ib = lane.thread;

    let sh = x.sh[ib / 4] as u32;
    let mut state = (x.ql[ib] as u32
        | (((x.qh[ib % 16] as u32) << (8 - 4 * (ib / 16))) & 0xf00)
        | ((sh << (8 - ib % 4)) & 0x1000))
        + SEED_OFFSET;
    let dl = scale * IQ4K_VALUES[(sh & 0xf) as usize] as f32;
    for j in 0..8 {
        out.put(8 * ib + j, dl * next_folded(&mut state) as f32);
    }
}

pub fn dequantize_iq2_kt<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 4, lane.group);
    let scale = meta_f32(meta, 0) * 1.05;
    let x = block_at::<BlockIq2Kt>(blocks, i);
    let ib = lane.thread;

    let mut state = x.ql[ib] as u32 + SEED_OFFSET;
    let ls = (x.scales[(ib / 4) % 4] >> (4 * (ib / 16))) & 0xf;
    let dl = scale * IQ4K_VALUES[ls as usize] as f32;
    for j in 0..8 {
        out.put(8 * ib + j, dl * next_folded(&mut state) as f32);
    }
}

pub fn dequantize_iq3_kt<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 4, lane.group);
    let scale = meta_f32(meta, 0) * 31.75 * 1.01;
    let x = block_at::<BlockIq3Kt>(blocks, i);
    let ib = lane.thread;

    let mut state = x.ql[ib] as u32 + SEED_OFFSET;
    let ls = (x.scales[(ib / 4) % 4] >> (4 * (ib / 16))) & 0xf;
    let dl = scale * ls as f32;
    let mask = 1u8 << (ib / 4);
    for j in 0..8 {
        let v = next_half(&mut state).abs();
        let sign = if x.qh[(8 * ib + j) % 32] & mask != 0 { -1.0 } else { 1.0 };
        out.put(8 * ib + j, dl * v * sign);
    }
}

pub fn dequantize_iq4_kt<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 8, lane.group);
    let d = meta_f32(meta, 0) * 31.75 * 1.01;
    let row_av = meta_f32(meta, 1);
    let x = block_at::<BlockIq4Kt>(blocks, i);

    let ib = lane.thread;
    let ib32 = ib / 4;
    let ig = ib % 4;
    let jj = 8 * ib32 + 2 * ig;
    let shb = x.shb(ib32);

    let offset = if shb & 1 != 0 { SEED_OFFSET + 32768 } else { SEED_OFFSET };
    let seed = |n: usize, bits: u32| {
        let low = x.ql(n) as u32;
        let mid = ((x.qh(n % 32) as u32) << (8 - 4 * (n / 32))) & 0xf00;
        let high = ((shb >> bits) & 7) << 12;
        low + mid + high + offset
    };
    let mut state1 = seed(jj, 8 + 6 * ig as u32);
    let mut state2 = seed(jj + 1, 8 + 6 * ig as u32 + 3);
    let dl = d * (((shb & 0xff) >> 1) as i32 - 64) as f32;
    for j in 0..4 {
        out.put(8 * ib + j, dl * next_half(&mut state1) + row_av);
        out.put(8 * ib + j + 4, dl * next_half(&mut state2) + row_av);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folded_first_value() {
        let mut state = SEED_OFFSET;
        assert_eq!(next_folded(&mut state), -47);
        assert_eq!(state, SEED_OFFSET.wrapping_mul(FOLDED_MUL));
    }

    #[test]
    fn test_folded_range() {
        let mut state = 12345;
        for _ in 0..1000 {
            let v = next_folded(&mut state);
            assert!((-126..=126).contains(&v));
        }
    }

    #[test]
    fn test_half_sequence() {
        let mut state = SEED_OFFSET;
        let values: Vec<f32> = (0..8).map(|_| next_half(&mut state)).collect();
        assert_eq!(
            values,
            vec![0.3359375, 0.294921875, -1.33984375, -0.486328125, 1.158203125, 0.345458984375, 0.0653076171875, -1.1767578125]
        );
    }

    #[test]
    fn test_half_is_representable() {
        let mut state = SEED_OFFSET;
        for _ in 0..1000 {
            let v = next_half(&mut state);
            assert_eq!(f16::from_f32(v).to_f32(), v);
        }
    }
}
