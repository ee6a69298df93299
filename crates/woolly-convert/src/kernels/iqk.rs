//! Non-linear table formats with per-block scales
//!
//! Quants index a small table of signed levels; an `extra` bit per
//! sub-block selects a shifted copy of the table.

use woolly_quants::blocks::{block_at, BlockIq2K, BlockIq3K, BlockIq4K, BlockIq4Nl, BlockIq4Xs, BlockIq5K, BlockIq6K};
use woolly_quants::tables::{IQ2NL_VALUES, IQ3NL_VALUES, IQ4K_VALUES, IQ5NL_VALUES, IQ6NL_VALUES, KVALUES_IQ4NL};
use woolly_quants::QK4_0;

use crate::grid::{GroupOut, Lane, Shape};
use crate::store::OutputStore;

pub const THREADS: usize = 32;

pub fn dequantize_iq4_nl<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let il = lane.thread / 8;
    let ib = lane.thread % 8;
    let block = 8 * lane.group + ib;
    if block >= shape.k / QK4_0 {
        return;
    }
    let x = block_at::<BlockIq4Nl>(src, block);
    let y = 32 * ib + 4 * il;
    let d = x.d.to_f32();
    for (j, &q) in x.qs[4 * il..4 * il + 4].iter().enumerate() {
        out.put(y + j, d * KVALUES_IQ4NL[(q & 0xf) as usize] as f32);
        out.put(y + j + 16, d * KVALUES_IQ4NL[(q >> 4) as usize] as f32);
    }
}

pub fn dequantize_iq4_xs<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockIq4Xs>(src, lane.group);
    let il = lane.thread / 8;
    let ib = lane.thread % 8;
    let y = 32 * ib + 4 * il;

    let ls = ((x.scales_l[ib / 2] >> (4 * (ib % 2))) & 0xf) | ((((x.scales_h >> (2 * ib)) & 3) as u8) << 4);
    let d = x.d.to_f32() * (ls as i32 - 32) as f32;
    let q4 = &x.qs[16 * ib + 4 * il..16 * ib + 4 * il + 4];
    for (j, &q) in q4.iter().enumerate() {
        out.put(y + j, d * KVALUES_IQ4NL[(q & 0xf) as usize] as f32);
        out.put(y + j + 16, d * KVALUES_IQ4NL[(q >> 4) as usize] as f32);
    }
}

pub fn dequantize_iq2_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockIq2K>(src, lane.group);
    let ib128 = lane.thread / 16;
    let il = lane.thread % 16;
    let y = 128 * ib128 + 2 * il;

    let d = x.d.to_f32();
    let extra = x.extra >> (8 * ib128 + il / 8);
    let qs = &x.qs[32 * ib128 + 2 * il..];
    for s in 0..4 {
        let dl = d * (((x.scales[4 * ib128 + s] >> (4 * (il / 8))) & 0xf) as i32 - 8) as f32;
        let shift = if (extra >> (2 * s)) & 1 != 0 { 4 } else { 0 };
        for j in 0..2 {
            let q = ((qs[j] >> (2 * s)) & 3) as usize;
            out.put(y + 32 * s + j, dl * IQ2NL_VALUES[q + shift] as f32);
        }
    }
}

pub fn dequantize_iq3_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockIq3K>(src, lane.group);
    let ib128 = lane.thread / 16;
    let il = lane.thread % 16;
    let y = 128 * ib128 + 2 * il;

    let d = x.d.to_f32();
    let sh = x.scales_h >> (8 * ib128 + il / 8);
    let extra = x.extra >> (8 * ib128 + il / 8);
    let qs = &x.qs[32 * ib128 + 2 * il..];
    let qh = &x.qh[2 * il..];
    for s in 0..4 {
        let ls = 2 * ((x.scales_l[4 * ib128 + s] >> (4 * (il / 8))) & 0xf) as i32 + 1;
        let sign = if (sh >> (2 * s)) & 1 != 0 { -1 } else { 1 };
        let dl = d * (ls * sign) as f32;
        let shift = if (extra >> (2 * s)) & 1 != 0 { 8 } else { 0 };
        for j in 0..2 {
            let h = qh[j] >> (4 * (ib128 % 2));
            let q = (((qs[j] >> (2 * s)) & 3) | (((h >> s) & 1) << 2)) as usize;
            out.put(y + 32 * s + j, dl * IQ3NL_VALUES[q + shift] as f32);
        }
    }
}

pub fn dequantize_iq4_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockIq4K>(src, lane.group);
    let il = lane.thread / 8;
    let ib = lane.thread % 8;
    let y = 32 * ib + 4 * il;

    let d = x.d.to_f32();
    let sh = x.scales_h[ib / 2] >> (4 * (ib % 2));
    let d1 = d * (((x.scales_l[ib] & 0xf) | ((sh << 4) & 0x30)) as i32 - 32) as f32;
    let d2 = d * (((x.scales_l[ib] >> 4) | ((sh << 2) & 0x30)) as i32 - 32) as f32;
    let values1 = &IQ4K_VALUES[16 * ((x.extra >> (2 * ib)) & 1) as usize..];
    let values2 = &IQ4K_VALUES[16 * ((x.extra >> (2 * ib + 1)) & 1) as usize..];

    let q4 = &x.qs[16 * ib + 4 * il..16 * ib + 4 * il + 4];
    for (j, &q) in q4.iter().enumerate() {
        out.put(y + j, d1 * values1[(q & 0xf) as usize] as f32);
        out.put(y + j + 16, d2 * values2[(q >> 4) as usize] as f32);
    }
}

pub fn dequantize_iq5_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockIq5K>(src, lane.group);
    let ib64 = lane.thread / 8;
    let il = lane.thread % 8;
    let y = 64 * ib64 + 2 * il;

    let d = x.d.to_f32();
    let sh = x.scales_h[ib64];
    let sl = &x.scales_l[2 * ib64..2 * ib64 + 2];
    let dl = [
        d * (((sl[0] & 0xf) | ((sh << 4) & 0x30)) as i32 - 32) as f32,
        d * (((sl[0] >> 4) | ((sh << 2) & 0x30)) as i32 - 32) as f32,
        d * (((sl[1] & 0xf) | (sh & 0x30)) as i32 - 32) as f32,
        d * (((sl[1] >> 4) | ((sh >> 2) & 0x30)) as i32 - 32) as f32,
    ];
    let extra = x.extra >> (4 * ib64);
    let shift = |s: usize| if (extra >> s) & 1 != 0 { 32 } else { 0 };

    let qs = &x.qs[32 * ib64 + 2 * il..];
    let qh = &x.qh[2 * il..];
    for j in 0..2 {
        let h1 = qh[j] >> (2 * ib64);
        let h2 = qh[j + 16] >> (2 * ib64);
        let q = [
            (qs[j] & 0xf) | ((h1 & 1) << 4),
            (qs[j + 16] & 0xf) | ((h2 & 1) << 4),
            (qs[j] >> 4) | ((h1 & 2) << 3),
            (qs[j + 16] >> 4) | ((h2 & 2) << 3),
        ];
        for s in 0..4 {
            out.put(y + 16 * s + j, dl[s] * IQ5NL_VALUES[q[s] as usize + shift(s)] as f32);
        }
    }
}

pub fn dequantize_iq6_k<T: OutputStore>(src: &[u8], _shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let x = block_at::<BlockIq6K>(src, lane.group);
    let ib64 = lane.thread / 8;
    let il = lane.thread % 8;
    let y = 64 * ib64 + 2 * il;

    let d = x.d.to_f32();
    let extra = x.extra >> (4 * ib64);
    let qs = &x.qs[32 * ib64 + 2 * il..];
    let qh = &x.qh[32 * (ib64 / 2) + 2 * il..];
    for j in 0..2 {
        let h1 = qh[j] >> (4 * (ib64 % 2));
        let h2 = qh[j + 16] >> (4 * (ib64 % 2));
        let q = [
            (qs[j] & 0xf) | ((h1 & 0x03) << 4),
            (qs[j + 16] & 0xf) | ((h2 & 0x03) << 4),
            (qs[j] >> 4) | ((h1 & 0x0c) << 2),
            (qs[j + 16] >> 4) | ((h2 & 0x0c) << 2),
        ];
        for s in 0..4 {
            let dl = d * x.scales[4 * ib64 + s] as f32;
            let bump = ((extra >> s) & 1) as f32;
            out.put(y + 16 * s + j, dl * (IQ6NL_VALUES[q[s] as usize] as f32 + bump));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use half::f16;

    fn run_block<B: bytemuck::Pod, T: OutputStore>(
        block: &B,
        kernel: fn(&[u8], &Shape, Lane, &mut GroupOut<'_, T>),
    ) -> Vec<T> {
        let src = bytemuck::bytes_of(block);
        let shape = Shape { rows: 1, n_per_row: 256, row_size: src.len(), k: 256 };
        let mut dst = vec![T::default(); 256];
        crate::grid::run(crate::grid::LaunchConfig::for_elements(256, THREADS, 256), &mut dst, |lane, out| {
            kernel(src, &shape, lane, out)
        });
        dst
    }

    #[test]
    fn test_iq4_xs_scale_assembly() {
        let mut x = BlockIq4Xs::zeroed();
        x.d = f16::ONE;
        // sub-block 3: low nibble from scales_l[1] high half, high bits from scales_h bits 6..8
        x.scales_l[1] = 0x50;
        x.scales_h = 0b10 << 6;
        x.qs.fill(0x88);
        let y = run_block(&x, dequantize_iq4_xs::<f32>);
        let ls = (0x5 | (0b10 << 4)) - 32;
        assert_eq!(y[96], ls as f32 * KVALUES_IQ4NL[8] as f32);
        assert_eq!(y[127], ls as f32 * KVALUES_IQ4NL[8] as f32);
        assert_eq!(y[0], -32.0 * KVALUES_IQ4NL[8] as f32);
    }

    #[test]
    fn test_iq2_k_extra_selects_shifted_table() {
        let mut x = BlockIq2K::zeroed();
        x.d = f16::ONE;
        x.scales.fill(0x99); // every sub-scale 9 - 8 = 1
        x.extra = 1; // first 16-element sub-block uses the shifted levels
        let y = run_block(&x, dequantize_iq2_k::<f32>);
        assert_eq!(y[0], IQ2NL_VALUES[4] as f32);
        assert_eq!(y[15], IQ2NL_VALUES[4] as f32);
        assert_eq!(y[16], IQ2NL_VALUES[0] as f32);
    }

    #[test]
    fn test_iq6_k_extra_bumps_level() {
        let mut x = BlockIq6K::zeroed();
        x.d = f16::from_f32(0.5);
        x.scales.fill(2);
        x.extra = 0b0010;
        let y = run_block(&x, dequantize_iq6_k::<f32>);
        assert_eq!(y[0], IQ6NL_VALUES[0] as f32);
        assert_eq!(y[16], IQ6NL_VALUES[0] as f32 + 1.0);
    }
}
