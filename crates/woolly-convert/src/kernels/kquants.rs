//! K-quant super-blocks
//!
//! One group decodes one 256-element super-block.

use woolly_quants::blocks::{block_at, BlockQ2K, BlockQ3K, BlockQ4K, BlockQ5K, BlockQ6K, BlockQ8K};

use crate::grid::{GroupOut, Lane, Shape};
use crate::store::OutputStore;

/// Lanes per group for Q4_K and Q8_K
pub const NARROW_THREADS: usize = 32;
/// Lanes per group for Q2_K, Q3_K, Q5_K and Q6_K
pub const WIDE_THREADS: usize = 64;

/// 6-bit scale and min `j` of the packed 12-byte Q4_K/Q5_K scale array
#[inline]
pub fn get_scale_min_k4(j: usize, q: &[u8; 12]) -> (u8, u8) {
    if j < 4 {
        (q[j] & 63, q[j + 4] & 63)
    } else {
        (
            (q[j + 4] & 0xf) | ((q[j - 4] >> 6) << 4),
            (q[j + 4] >> 4) | ((q[j] >> 6) << 4),
        )
    }
}

pub fn dequantize_q2_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockQ2K>(src, lane.group);
    let n = lane.thread / 32;
    let l = lane.thread - 32 * n;
    let is = 8 * n + l / 16;
    let q = x.qs[32 * n + l];
    let y = 128 * n + l;

    let dall = x.d.to_f32();
    let dmin = x.dmin.to_f32();
    for s in 0..4 {
        let sc = x.scales[is + 2 * s];
        let v = dall * (sc & 0xf) as f32 * ((q >> (2 * s)) & 3) as f32 - dmin * (sc >> 4) as f32;
        out.put(y + 32 * s, v);
    }
}

pub fn dequantize_q3_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockQ3K>(src, lane.group);
    let r = lane.thread / 4;
    let tid = r / 2;
    let is0 = r % 2;
    let l0 = 16 * is0 + 4 * (lane.thread % 4);
    let n = tid / 4;
    let j = tid - 4 * n;

    let m = 1u8 << (4 * n + j);
    let is = 8 * n + 2 * j + is0;
    let shift = 2 * j;

    let sc = &x.scales;
    let us = if is < 4 {
        (sc[is] & 0xf) | ((sc[is + 8] & 3) << 4)
    } else if is < 8 {
        (sc[is] & 0xf) | (((sc[is + 4] >> 2) & 3) << 4)
    } else if is < 12 {
        (sc[is - 8] >> 4) | (((sc[is] >> 4) & 3) << 4)
    } else {
        (sc[is - 8] >> 4) | (((sc[is - 4] >> 6) & 3) << 4)
    };
    let dl = x.d.to_f32() * (us as i32 - 32) as f32;

    let y = 128 * n + 32 * j;
    let q = &x.qs[32 * n..];
    for l in l0..l0 + 4 {
        let low = ((q[l] >> shift) & 3) as i32;
        let high = if x.hmask[l] & m != 0 { 0 } else { 4 };
        out.put(y + l, dl * (low - high) as f32);
    }
}

pub fn dequantize_q4_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockQ4K>(src, lane.group);
    let il = lane.thread / 8;
    let ir = lane.thread % 8;
    let is = 2 * il;
    let n = 4;
    let y = 64 * il + n * ir;

    let dall = x.d.to_f32();
    let dmin = x.dmin.to_f32();
    let (sc, m) = get_scale_min_k4(is, &x.scales);
    let (d1, m1) = (dall * sc as f32, dmin * m as f32);
    let (sc, m) = get_scale_min_k4(is + 1, &x.scales);
    let (d2, m2) = (dall * sc as f32, dmin * m as f32);

    let q = &x.qs[32 * il + n * ir..32 * il + n * ir + n];
    for (l, &b) in q.iter().enumerate() {
        out.put(y + l, d1 * (b & 0xf) as f32 - m1);
        out.put(y + l + 32, d2 * (b >> 4) as f32 - m2);
    }
}

pub fn dequantize_q5_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockQ5K>(src, lane.group);
    let il = lane.thread / 16;
    let ir = lane.thread % 16;
    let is = 2 * il;
    let y = 64 * il + 2 * ir;

    let dall = x.d.to_f32();
    let dmin = x.dmin.to_f32();
    let (sc, m) = get_scale_min_k4(is, &x.scales);
    let (d1, m1) = (dall * sc as f32, dmin * m as f32);
    let (sc, m) = get_scale_min_k4(is + 1, &x.scales);
    let (d2, m2) = (dall * sc as f32, dmin * m as f32);

    let ql = &x.qs[32 * il + 2 * ir..];
    let qh = &x.qh[2 * ir..];
    let hm = 1u8 << (2 * il);
    for l in 0..2 {
        let h1 = if qh[l] & hm != 0 { 16 } else { 0 };
        let h2 = if qh[l] & (hm << 1) != 0 { 16 } else { 0 };
        out.put(y + l, d1 * ((ql[l] & 0xf) + h1) as f32 - m1);
        out.put(y + l + 32, d2 * ((ql[l] >> 4) + h2) as f32 - m2);
    }
}

pub fn dequantize_q6_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockQ6K>(src, lane.group);
    let ip = lane.thread / 32;
    let il = lane.thread - 32 * ip;
    let is = 8 * ip + il / 16;
    let y = 128 * ip + il;

    let d = x.d.to_f32();
    let ql = &x.ql[64 * ip + il..];
    let qh = x.qh[32 * ip + il];
    let sc = &x.scales[is..];

    let q1 = ((ql[0] & 0xf) | ((qh & 3) << 4)) as i32 - 32;
    let q2 = ((ql[32] & 0xf) | (((qh >> 2) & 3) << 4)) as i32 - 32;
    let q3 = ((ql[0] >> 4) | (((qh >> 4) & 3) << 4)) as i32 - 32;
    let q4 = ((ql[32] >> 4) | (((qh >> 6) & 3) << 4)) as i32 - 32;
    out.put(y, d * sc[0] as f32 * q1 as f32);
    out.put(y + 32, d * sc[2] as f32 * q2 as f32);
    out.put(y + 64, d * sc[4] as f32 * q3 as f32);
    out.put(y + 96, d * sc[6] as f32 * q4 as f32);
}

pub fn dequantize_q8_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockQ8K>(src, lane.group);
    let y = 8 * lane.thread;
    for (j, &q) in x.qs[y..y + 8].iter().enumerate() {
        out.put(y + j, x.d * q as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_min_low_half() {
        let mut q = [0u8; 12];
        q[1] = 0xc5;
        q[5] = 0x7f;
        assert_eq!(get_scale_min_k4(1, &q), (0x05, 0x3f));
    }

    #[test]
    fn test_scale_min_high_half() {
        let mut q = [0u8; 12];
        q[9] = 0xa3; // low nibble 3 -> scale, high nibble 0xa -> min
        q[1] = 0x80; // top bits of scale 5 = 0b10
        q[5] = 0x40; // top bits of min 5 = 0b01
        assert_eq!(get_scale_min_k4(5, &q), (0x23, 0x1a));
    }
}
