//! Row-interleaved formats
//!
//! Q8_0_R8 stores eight rows together: block `ib` of the group holds the
//! eight per-row scales followed by the rows' quants interleaved four bytes
//! at a time.

use woolly_quants::blocks::{block_at, BlockQ8_0R8};
use woolly_quants::QK4_0;

use crate::grid::{GroupOut, Lane, Shape};
use crate::store::OutputStore;

pub const Q8_0_R8_ROWS: usize = 8;
pub const THREADS: usize = 8;
pub const SPAN: usize = QK4_0;

/// Position of element `j` of row `r % 8` inside an interleaved block
#[inline]
pub fn q8_0_r8_index(r: usize, j: usize) -> usize {
    let k = r % Q8_0_R8_ROWS;
    if j < 16 {
        32 * (j / 4) + 4 * k + j % 4
    } else {
        128 + 32 * ((j - 16) / 4) + 4 * k + (j - 16) % 4
    }
}

/// One group decodes one 32-element block of one row; each lane four values
pub fn dequantize_q8_0_r8<T: OutputStore>(src: &[u8], shape: &Shape, lane: Lane, out: &mut GroupOut<'_, T>) {
    let nb = shape.n_per_row / QK4_0;
    let r = lane.group / nb;
    let ib = lane.group % nb;

    let base = (r / Q8_0_R8_ROWS) * Q8_0_R8_ROWS * shape.row_size;
    let x = block_at::<BlockQ8_0R8>(&src[base..], ib);
    let d = x.d[r % Q8_0_R8_ROWS].to_f32();
    for j in 4 * lane.thread..4 * lane.thread + 4 {
        out.put(j, d * x.qs[q8_0_r8_index(r, j)] as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_interleave_is_a_permutation() {
        let seen: HashSet<usize> = (0..Q8_0_R8_ROWS)
            .flat_map(|r| (0..QK4_0).map(move |j| q8_0_r8_index(r, j)))
            .collect();
        assert_eq!(seen.len(), Q8_0_R8_ROWS * QK4_0);
        assert!(seen.iter().all(|&i| i < 256));
    }

    #[test]
    fn test_interleave_layout() {
        assert_eq!(q8_0_r8_index(0, 0), 0);
        assert_eq!(q8_0_r8_index(1, 0), 4);
        assert_eq!(q8_0_r8_index(0, 4), 32);
        assert_eq!(q8_0_r8_index(3, 17), 128 + 12 + 1);
    }
}
