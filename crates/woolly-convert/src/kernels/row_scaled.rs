//! Formats carrying a per-row super-scale
//!
//! Each row starts with its scale (and for some formats more row metadata)
//! followed by the packed blocks, so a lane first locates its row and then
//! its block within the row.

use woolly_quants::blocks::{block_at, BlockIq1Bn, BlockIq2Bn, BlockIq2Ks, BlockIq3Ks, BlockIq4Ks, BlockIq4Kss, BlockIq5Ks};
use woolly_quants::tables::{IQ2NL_VALUES, IQ3NL_VALUES, IQ4K_VALUES, IQ5NL_VALUES};
use woolly_quants::QK_IQ1BN;

use super::{locate_superblock, meta_f16, meta_f32, split_row};
use crate::grid::{GroupOut, Lane, Shape};
use crate::store::OutputStore;

pub const THREADS: usize = 32;

/// BitNet blocks decoded by one group
const BN_BLOCKS_PER_GROUP: usize = 4;

/// Signed 7-bit scale with the table selector in bit 0
#[inline]
fn odd_scale(ls: u8) -> f32 {
    ((ls & 254) as i32 - 127) as f32
}

pub fn dequantize_iq4_ks<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 4, lane.group);
    let scale = meta_f32(meta, 0);
    let x = block_at::<BlockIq4Ks>(blocks, i);
    let il = lane.thread / 8;
    let ib = lane.thread % 8;
    let y = 32 * ib + 4 * il;

    let d = scale * odd_scale(x.scales[ib]);
    let values = &IQ4K_VALUES[((x.scales[ib] & 1) << 4) as usize..];
    for (j, &q) in x.qs[16 * ib + 4 * il..16 * ib + 4 * il + 4].iter().enumerate() {
        out.put(y + j, d * values[(q & 0xf) as usize] as f32);
        out.put(y + j + 16, d * values[(q >> 4) as usize] as f32);
    }
}

pub fn dequantize_iq4_kss<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 4, lane.group);
    let scale = meta_f32(meta, 0);
    let x = block_at::<BlockIq4Kss>(blocks, i);
    let il = lane.thread / 8;
    let ib = lane.thread % 8;
    let y = 32 * ib + 4 * il;

    // The scale is spread over bit 0 of each 16-bit half of the four words
    let q4 = &x.qs[4 * ib..4 * ib + 4];
    let s32 = (q4[0] & 0x0001_0001)
        | ((q4[1] & 0x0001_0001) << 2)
        | ((q4[2] & 0x0001_0001) << 4)
        | ((q4[3] & 0x0001_0001) << 6);
    let ls = ((s32 | (s32 >> 15)) & 0xff) as u8;
    let d = scale * odd_scale(ls);
    let values = &IQ4K_VALUES[((ls & 1) << 4) as usize..];

    let mut aux = q4[il] & 0xfffe_fffe;
    aux ^= aux >> 1;
    for (j, q) in aux.to_le_bytes().into_iter().enumerate() {
        out.put(y + j, d * values[(q & 0xf) as usize] as f32);
        out.put(y + j + 16, d * values[(q >> 4) as usize] as f32);
    }
}

pub fn dequantize_iq5_ks<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 4, lane.group);
    let scale = meta_f32(meta, 0);
    let x = block_at::<BlockIq5Ks>(blocks, i);
    let ib64 = lane.thread / 8;
    let il = lane.thread % 8;
    let y = 64 * ib64 + 2 * il;

    let (s1, s2) = (x.scales[2 * ib64], x.scales[2 * ib64 + 1]);
    let (dl1, dl2) = (scale * odd_scale(s1), scale * odd_scale(s2));
    let values1 = &IQ5NL_VALUES[((s1 & 1) << 5) as usize..];
    let values2 = &IQ5NL_VALUES[((s2 & 1) << 5) as usize..];

    let qs = &x.qs[32 * ib64 + 2 * il..];
    let qh = &x.qh[2 * il..];
    for j in 0..2 {
        let h1 = qh[j] >> (2 * ib64);
        let h2 = qh[j + 16] >> (2 * ib64);
        out.put(y + j, dl1 * values1[((qs[j] & 0xf) | ((h1 & 1) << 4)) as usize] as f32);
        out.put(y + j + 16, dl1 * values1[((qs[j + 16] & 0xf) | ((h2 & 1) << 4)) as usize] as f32);
        out.put(y + j + 32, dl2 * values2[((qs[j] >> 4) | ((h1 & 2) << 3)) as usize] as f32);
        out.put(y + j + 48, dl2 * values2[((qs[j + 16] >> 4) | ((h2 & 2) << 3)) as usize] as f32);
    }
}

/// 5-bit sub-block scale of the KS formats: the low nibble, fifth bit from
/// the upper byte of `extra`, centred on zero.
#[inline]
fn ks_scale(low: u8, extra: u16, s: usize) -> i32 {
    let high = (((extra >> (8 + s)) & 1) << 4) as i32;
    ((low & 0xf) as i32 | high) - 16
}

/// IQ2_KS packs the nibbles of consecutive sub-blocks into one byte
#[inline]
fn iq2_ks_nibble(scales: &[u8; 4], s: usize) -> u8 {
    scales[s / 2] >> (4 * (s % 2))
}

/// IQ3_KS keeps sub-blocks `s` and `s + 4` in the same byte
#[inline]
fn iq3_ks_nibble(scales: &[u8; 4], s: usize) -> u8 {
    scales[s % 4] >> (4 * (s / 4))
}

pub fn dequantize_iq2_ks<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 2, lane.group);
    let d = meta_f16(meta);
    let x = block_at::<BlockIq2Ks>(blocks, i);
    let ib128 = lane.thread / 16;
    let il = lane.thread % 16;
    let y = 128 * ib128 + 2 * il;

    let qs = &x.qs[32 * ib128 + 2 * il..];
    for s4 in 0..4 {
        let s = 4 * ib128 + s4;
        let dl = d * ks_scale(iq2_ks_nibble(&x.scales, s), x.extra, s) as f32;
        let shift = if (x.extra >> s) & 1 != 0 { 4 } else { 0 };
        for j in 0..2 {
            let q = ((qs[j] >> (2 * s4)) & 3) as usize;
            out.put(y + 32 * s4 + j, dl * IQ2NL_VALUES[q + shift] as f32);
        }
    }
}

pub fn dequantize_iq3_ks<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let (meta, blocks, i) = locate_superblock(src, shape, 2, lane.group);
    let d = meta_f16(meta);
    let x = block_at::<BlockIq3Ks>(blocks, i);
    let ib128 = lane.thread / 16;
    let il = lane.thread % 16;
    let y = 128 * ib128 + 2 * il;

    let qs = &x.qs[32 * ib128 + 2 * il..];
    let qh = &x.qh[2 * il..];
    for s4 in 0..4 {
        let s = 4 * ib128 + s4;
        let dl = d * ks_scale(iq3_ks_nibble(&x.scales, s), x.extra, s) as f32;
        let shift = if (x.extra >> s) & 1 != 0 { 8 } else { 0 };
        for j in 0..2 {
            let h = qh[j] >> (4 * ib128);
            let q = (((qs[j] >> (2 * s4)) & 3) | (((h >> s4) & 1) << 2)) as usize;
            out.put(y + 32 * s4 + j, dl * IQ3NL_VALUES[q + shift] as f32);
        }
    }
}

/// Powers of three that rotate the next ternary digit into the top of a byte
const K_MULT: [u8; 5] = [81, 27, 9, 3, 1];

/// Ternary digit of `byte` selected by `mult`, as -1, 0 or 1
#[inline]
fn ternary(byte: u8, mult: u8) -> i32 {
    let v = byte.wrapping_mul(mult) as i32;
    ((v + (v >> 1)) >> 7) - 1
}

/// Block index and row of a BitNet lane, or `None` past the last row
#[inline]
fn bn_block(shape: &Shape, lane: Lane) -> Option<(usize, usize)> {
    let nb = shape.n_per_row / QK_IQ1BN;
    let i = BN_BLOCKS_PER_GROUP * lane.group + lane.thread / 8;
    let row = i / nb;
    (row < shape.rows).then_some((row, i - row * nb))
}

pub fn dequantize_iq1_bn<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some((row, ib)) = bn_block(shape, lane) else {
        return;
    };
    let (meta, blocks) = split_row(src, shape, 2, row);
    let d = meta_f16(meta);
    let x = block_at::<BlockIq1Bn>(blocks, ib);

    // Every 16 values: 15 from three base-3 bytes, then one from `extra`
    let tid = lane.thread % 8;
    let i16 = tid / 2;
    let y = QK_IQ1BN * (lane.thread / 8) + 8 * tid;
    for j in 0..8 {
        let n = 8 * (tid % 2) + j;
        let v = if n < 15 {
            ternary(x.ql[3 * i16 + n / 5], K_MULT[n % 5])
        } else {
            ternary(x.extra, K_MULT[i16])
        };
        out.put(y + j, d * v as f32);
    }
}

pub fn dequantize_iq2_bn<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some((row, ib)) = bn_block(shape, lane) else {
        return;
    };
    let (meta, blocks) = split_row(src, shape, 4, row);
    let d = meta_f32(meta, 0);
    let x = block_at::<BlockIq2Bn>(blocks, ib);

    let tid = lane.thread % 8;
    let y = QK_IQ1BN * (lane.thread / 8);
    for l in 2 * tid..2 * tid + 2 {
        for s in 0..4 {
            let q = (x.qs[l] >> (2 * s)) & 3;
            out.put(y + l + 16 * s, d * q as f32 - d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ternary_digits() {
        // 178 = 2*81 + 0*27 + 1*9 + 2*3 + 1, scaled by 256/243 rounding up.
        // Multiplier 81 brings the last digit to the top, 1 the first.
        let byte = ((178u32 * 256 + 242) / 243) as u8;
        let digits: Vec<i32> = K_MULT.iter().map(|&m| ternary(byte, m)).collect();
        assert_eq!(digits, vec![0, 1, 0, -1, 1]);
    }

    #[test]
    fn test_odd_scale() {
        assert_eq!(odd_scale(127), -1.0);
        assert_eq!(odd_scale(128), 1.0);
        assert_eq!(odd_scale(255), 127.0);
    }

    #[test]
    fn test_ks_scale() {
        let scales = [0x31, 0x75, 0, 0];
        assert_eq!(ks_scale(iq3_ks_nibble(&scales, 0), 0, 0), 1 - 16);
        assert_eq!(ks_scale(iq3_ks_nibble(&scales, 4), 1 << 12, 4), (3 | 16) - 16);
        assert_eq!(ks_scale(iq3_ks_nibble(&scales, 1), 0, 1), 5 - 16);
    }

    #[test]
    fn test_iq2_ks_nibble_pairs() {
        let scales = [0x31, 0x75, 0xa9, 0xdb];
        let nibbles: Vec<u8> = (0..8).map(|s| iq2_ks_nibble(&scales, s) & 0xf).collect();
        assert_eq!(nibbles, vec![1, 3, 5, 7, 9, 0xa, 0xb, 0xd]);
        assert_eq!(ks_scale(iq2_ks_nibble(&scales, 1), 1 << 9, 1), (3 | 16) - 16);
    }

    #[test]
    fn test_bn_block_skips_rows_past_end() {
        let shape = Shape { rows: 3, n_per_row: 128, row_size: 2 + 26, k: 384 };
        let lane = |group, thread| Lane { group, thread };
        assert_eq!(bn_block(&shape, lane(0, 0)), Some((0, 0)));
        assert_eq!(bn_block(&shape, lane(0, 31)), Some((1, 1)));
        assert_eq!(bn_block(&shape, lane(1, 8)), Some((2, 1)));
        assert_eq!(bn_block(&shape, lane(1, 16)), None);
    }
}
