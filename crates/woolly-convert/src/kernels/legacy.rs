//! Legacy 32-element blocks
//!
//! Q4_0 and Q4_1 have a dedicated kernel: 32 lanes cover eight blocks, each
//! lane decoding four bytes. The remaining legacy formats share the generic
//! kernel where a lane decodes one pair of elements.

use half::f16;
use woolly_quants::blocks::{
    block_at, BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ5_1, BlockQ6_0, BlockQ8_0, BlockQ8_1, QuantBlock,
};
use woolly_quants::QK4_0;

use crate::grid::{GroupOut, Lane, Shape, Staged, Staging};
use crate::store::OutputStore;

pub const Q4_THREADS: usize = 32;
pub const Q4_SPAN: usize = 256;

pub const GENERIC_THREADS: usize = 256;
pub const GENERIC_SPAN: usize = 2 * GENERIC_THREADS;

/// Elements one staged Q8_0 group decodes
pub const Q8_0_NE_ALIGN: usize = 2048;
pub const Q8_0_STAGED_THREADS: usize = 32;
/// Tile words holding one group's packed blocks
pub const Q8_0_TILE_WORDS: usize = Q8_0_NE_ALIGN / 4 + Q8_0_STAGED_THREADS;

const Q8_0_BLOCK_BYTES: usize = std::mem::size_of::<BlockQ8_0>();
const Q8_0_TILE_BYTES: usize = 4 * Q8_0_TILE_WORDS;

/// A 32-element block decoded two values at a time
pub trait LegacyBlock: QuantBlock {
    /// Values packed per quant byte
    const QR: usize;

    /// The pair of values at quant index `iqs`
    fn dequantize(&self, iqs: usize) -> (f32, f32);
}

impl LegacyBlock for BlockQ4_0 {
    const QR: usize = 2;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let d = self.d.to_f32();
        let q = self.qs[iqs];
        (((q & 0xf) as f32 - 8.0) * d, ((q >> 4) as f32 - 8.0) * d)
    }
}

impl LegacyBlock for BlockQ4_1 {
    const QR: usize = 2;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let (d, m) = (self.d.to_f32(), self.m.to_f32());
        let q = self.qs[iqs];
        ((q & 0xf) as f32 * d + m, (q >> 4) as f32 * d + m)
    }
}

/// Fifth bits of the pair at `iqs`, already in position 4
#[inline]
fn q5_high_bits(qh: [u8; 4], iqs: usize) -> (u8, u8) {
    let qh = u32::from_le_bytes(qh);
    let xh0 = (((qh >> iqs) << 4) & 0x10) as u8;
    let xh1 = ((qh >> (iqs + 12)) & 0x10) as u8;
    (xh0, xh1)
}

impl LegacyBlock for BlockQ5_0 {
    const QR: usize = 2;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let d = self.d.to_f32();
        let (xh0, xh1) = q5_high_bits(self.qh, iqs);
        let x = ((self.qs[iqs] & 0xf) | xh0) as f32;
        let y = ((self.qs[iqs] >> 4) | xh1) as f32;
        ((x - 16.0) * d, (y - 16.0) * d)
    }
}

impl LegacyBlock for BlockQ5_1 {
    const QR: usize = 2;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let (d, m) = (self.d.to_f32(), self.m.to_f32());
        let (xh0, xh1) = q5_high_bits(self.qh, iqs);
        let x = ((self.qs[iqs] & 0xf) | xh0) as f32;
        let y = ((self.qs[iqs] >> 4) | xh1) as f32;
        (x * d + m, y * d + m)
    }
}

impl LegacyBlock for BlockQ6_0 {
    const QR: usize = 2;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let d = self.d.to_f32();
        let h = self.qh[iqs % 8] >> (4 * (iqs / 8));
        let q = self.qs[iqs];
        let x = ((q & 0xf) | ((h << 4) & 0x30)) as i32 - 32;
        let y = ((q >> 4) | ((h << 2) & 0x30)) as i32 - 32;
        (x as f32 * d, y as f32 * d)
    }
}

impl LegacyBlock for BlockQ8_0 {
    const QR: usize = 1;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let d = self.d.to_f32();
        (self.qs[iqs] as f32 * d, self.qs[iqs + 1] as f32 * d)
    }
}

impl LegacyBlock for BlockQ8_1 {
    const QR: usize = 1;

    #[inline]
    fn dequantize(&self, iqs: usize) -> (f32, f32) {
        let d = self.d.to_f32();
        (self.qs[iqs] as f32 * d, self.qs[iqs + 1] as f32 * d)
    }
}

/// Pair-per-lane kernel shared by the legacy formats
pub fn dequantize_block<B: LegacyBlock, T: OutputStore>(
    src: &[u8],
    shape: &Shape,
    lane: Lane,
    out: &mut GroupOut<'_, T>,
) {
    let i = 2 * (GENERIC_THREADS * lane.group + lane.thread);
    if i >= shape.k {
        return;
    }
    let ib = i / QK4_0;
    let iqs = (i % QK4_0) / B::QR;
    let iybs = i - i % QK4_0;
    let y_offset = if B::QR == 1 { 1 } else { QK4_0 / 2 };

    let (x, y) = block_at::<B>(src, ib).dequantize(iqs);
    out.put_global(iybs + iqs, x);
    out.put_global(iybs + iqs + y_offset, y);
}

#[inline]
fn q4_lane(shape: &Shape, lane: Lane) -> Option<(usize, usize, usize)> {
    let il = lane.thread / 8;
    let ir = lane.thread % 8;
    let ib = 8 * lane.group + ir;
    (ib < shape.k / QK4_0).then_some((ib, il, 32 * ir + 4 * il))
}

pub fn dequantize_q4_0<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some((ib, il, y)) = q4_lane(shape, lane) else {
        return;
    };
    let x = block_at::<BlockQ4_0>(src, ib);
    let d = x.d.to_f32();
    let dm = -8.0 * d;
    for (l, &q) in x.qs[4 * il..4 * il + 4].iter().enumerate() {
        out.put(y + l, d * (q & 0xf) as f32 + dm);
        out.put(y + l + 16, d * (q >> 4) as f32 + dm);
    }
}

pub fn dequantize_q4_1<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some((ib, il, y)) = q4_lane(shape, lane) else {
        return;
    };
    let x = block_at::<BlockQ4_1>(src, ib);
    let (d, m) = (x.d.to_f32(), x.m.to_f32());
    for (l, &q) in x.qs[4 * il..4 * il + 4].iter().enumerate() {
        out.put(y + l, d * (q & 0xf) as f32 + m);
        out.put(y + l + 16, d * (q >> 4) as f32 + m);
    }
}

/// Little-endian word at `at`, zero-padded past the end of `src`
#[inline]
fn read_word(src: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    let end = (at + 4).min(src.len());
    if at < end {
        word[..end - at].copy_from_slice(&src[at..end]);
    }
    u32::from_le_bytes(word)
}

/// Load phase of the staged Q8_0 kernel: copy the group's packed bytes into
/// the tile a word per lane.
pub fn q8_0_load<const NEEDS_CHECK: bool>(src: &[u8], shape: &Shape, lane: Lane, tile: &mut Staging<'_>) {
    let base = Q8_0_TILE_BYTES * lane.group;
    let src_bytes = shape.k * Q8_0_BLOCK_BYTES / QK4_0;
    for ix0 in (0..Q8_0_TILE_WORDS).step_by(Q8_0_STAGED_THREADS) {
        let ix = ix0 + lane.thread;
        if NEEDS_CHECK && base + 4 * ix >= src_bytes {
            break;
        }
        tile.store(ix, read_word(src, base + 4 * ix));
    }
}

/// Consume phase of the staged Q8_0 kernel: each lane decodes pairs out of
/// the tile.
pub fn q8_0_consume<const NEEDS_CHECK: bool, T: OutputStore>(
    shape: &Shape,
    lane: Lane,
    tile: &Staged<'_>,
    out: &mut GroupOut<'_, T>,
) {
    for iy in (0..Q8_0_NE_ALIGN).step_by(2 * Q8_0_STAGED_THREADS) {
        let local = iy + 2 * lane.thread;
        if NEEDS_CHECK && Q8_0_NE_ALIGN * lane.group + local >= shape.k {
            return;
        }
        let b0 = Q8_0_BLOCK_BYTES * (local / QK4_0);
        let d = f16::from_bits(u16::from_le_bytes([tile.byte(b0), tile.byte(b0 + 1)])).to_f32();
        let q = b0 + 2 + 2 * (lane.thread % (QK4_0 / 2));
        out.put(local, tile.byte(q) as i8 as f32 * d);
        out.put(local + 1, tile.byte(q + 1) as i8 as f32 * d);
    }
}
