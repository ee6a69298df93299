//! Lattice codebook formats
//!
//! Each lane decodes eight elements: one grid entry (two for the 3-bit
//! formats) expanded with its sign bits. All of these kernels read the
//! process-wide grids. Launches check for them first, and a kernel that
//! still finds none decodes nothing.

use woolly_quants::blocks::{
    block_at, BlockIq1M, BlockIq1S, BlockIq2S, BlockIq2Xs, BlockIq2Xxs, BlockIq3S, BlockIq3Xxs,
};
use woolly_quants::codebook;
use woolly_quants::tables::{IQ1M_DELTA, IQ1S_DELTA, KMASK_IQ2XS, KSIGNS_IQ2XS};
use woolly_quants::QK_K;

use crate::grid::{GroupOut, Lane, Shape};
use crate::store::OutputStore;

pub const THREADS: usize = 32;

/// Entry `il` of sub-block `ib`, and the lane's first output index
#[inline]
fn lane_slot(lane: Lane) -> (usize, usize, usize) {
    let il = lane.thread / 8;
    let ib = lane.thread % 8;
    (il, ib, 32 * ib + 8 * il)
}

#[inline]
fn sign(signs: u8, j: usize) -> f32 {
    if signs & KMASK_IQ2XS[j] != 0 {
        -1.0
    } else {
        1.0
    }
}

#[inline]
fn put_signed<T: OutputStore>(out: &mut GroupOut<'_, T>, y: usize, d: f32, grid: &[u8], signs: u8, first: usize) {
    for (j, &g) in grid.iter().enumerate() {
        out.put(y + j, d * g as f32 * sign(signs, first + j));
    }
}

pub fn dequantize_iq2_xxs<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq2Xxs>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let q2 = &x.qs[4 * ib..4 * ib + 4];
    let index = (q2[il / 2] >> (8 * (il % 2))) as u8;
    let aux32 = q2[2] as u32 | ((q2[3] as u32) << 16);
    let d = x.d.to_f32() * (0.5 + (aux32 >> 28) as f32) * 0.25;
    let signs = KSIGNS_IQ2XS[((aux32 >> (7 * il)) & 127) as usize];
    put_signed(out, y, d, &grids.iq2xxs(index as usize), signs, 0);
}

pub fn dequantize_iq2_xs<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq2Xs>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let q2 = x.qs[4 * ib + il];
    let d = x.d.to_f32() * (0.5 + ((x.scales[ib] >> (4 * (il / 2))) & 0xf) as f32) * 0.25;
    let signs = KSIGNS_IQ2XS[(q2 >> 9) as usize];
    put_signed(out, y, d, &grids.iq2xs((q2 & 511) as usize), signs, 0);
}

pub fn dequantize_iq2_s<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq2S>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let index = x.qs[4 * ib + il] as usize | (((x.qh[ib] as usize) << (8 - 2 * il)) & 0x300);
    let d = x.d.to_f32() * (0.5 + ((x.scales[ib] >> (4 * (il / 2))) & 0xf) as f32) * 0.25;
    let signs = x.qs[QK_K / 8 + 4 * ib + il];
    put_signed(out, y, d, &grids.iq2s(index), signs, 0);
}

pub fn dequantize_iq3_xxs<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq3Xxs>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let q3 = &x.qs[8 * ib..];
    let gas = &x.qs[QK_K / 4 + 4 * ib..QK_K / 4 + 4 * ib + 4];
    let aux32 = u32::from_le_bytes([gas[0], gas[1], gas[2], gas[3]]);
    let d = x.d.to_f32() * (0.5 + (aux32 >> 28) as f32) * 0.5;
    let signs = KSIGNS_IQ2XS[((aux32 >> (7 * il)) & 127) as usize];
    put_signed(out, y, d, &grids.iq3xxs(q3[2 * il] as usize), signs, 0);
    put_signed(out, y + 4, d, &grids.iq3xxs(q3[2 * il + 1] as usize), signs, 4);
}

pub fn dequantize_iq3_s<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq3S>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let qs = &x.qs[8 * ib..];
    let qh = x.qh[ib] as usize;
    let index1 = qs[2 * il] as usize | ((qh << (8 - 2 * il)) & 256);
    let index2 = qs[2 * il + 1] as usize | ((qh << (7 - 2 * il)) & 256);
    let d = x.d.to_f32() * (1 + 2 * ((x.scales[ib / 2] >> (4 * (ib % 2))) & 0xf) as u32) as f32;
    let signs = x.signs[4 * ib + il];
    put_signed(out, y, d, &grids.iq3s(index1), signs, 0);
    put_signed(out, y + 4, d, &grids.iq3s(index2), signs, 4);
}

pub fn dequantize_iq1_s<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq1S>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let qh = x.qh[ib];
    let dl = x.d.to_f32() * (2 * ((qh >> 12) & 7) + 1) as f32;
    let delta = if qh & 0x8000 != 0 { -IQ1S_DELTA } else { IQ1S_DELTA };
    let index = x.qs[4 * ib + il] as usize | ((((qh >> (3 * il)) & 7) as usize) << 8);
    for (j, &g) in grids.iq1s(index).iter().enumerate() {
        out.put(y + j, dl * (g as f32 + delta));
    }
}

pub fn dequantize_iq1_m<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let Some(grids) = codebook::grids() else {
        return;
    };
    let x = block_at::<BlockIq1M>(src, lane.group);
    let (il, ib, y) = lane_slot(lane);

    let sc = x.scale_words();
    let d = x.block_scale().to_f32();
    let dl = d * (2 * ((sc[ib / 2] >> (6 * (ib % 2) + 3 * (il / 2))) & 7) + 1) as f32;

    let qh = x.qh[2 * ib + il / 2] >> (4 * (il % 2));
    let index = x.qs[4 * ib + il] as usize | (((qh & 7) as usize) << 8);
    let delta = if qh & 0x08 != 0 { -IQ1M_DELTA } else { IQ1M_DELTA };
    for (j, &g) in grids.iq1s(index).iter().enumerate() {
        out.put(y + j, dl * (g as f32 + delta));
    }
}
