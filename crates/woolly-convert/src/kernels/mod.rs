//! Per-format decode kernels
//!
//! Every kernel has the same shape: given the packed source, the tensor
//! shape and its lane identity, it decodes the elements that lane owns and
//! stores them through the group's output window. Kernels never allocate and
//! never fail; launch wrappers check extents before the grid runs.

pub mod codebook;
pub mod iqk;
pub mod kquants;
pub mod legacy;
pub mod plain;
pub mod repacked;
pub mod row_scaled;
pub mod trellis;

use byteorder::{ByteOrder, LittleEndian};
use half::f16;
use woolly_quants::QK_K;

use crate::grid::{GroupOut, Lane, Shape};

/// Decode kernel for one lane
pub type Kernel<T> = fn(&[u8], &Shape, Lane, &mut GroupOut<'_, T>);

/// Split row `row` into its super-scale bytes and its packed blocks
#[inline]
pub(crate) fn split_row<'a>(src: &'a [u8], shape: &Shape, meta_size: usize, row: usize) -> (&'a [u8], &'a [u8]) {
    let base = row * shape.row_size;
    src[base..base + shape.row_size].split_at(meta_size)
}

/// Row and in-row block index of super-block `group` for row-scaled formats
#[inline]
pub(crate) fn superblock_of(shape: &Shape, group: usize) -> (usize, usize) {
    let row = QK_K * group / shape.n_per_row;
    (row, group - row * shape.n_per_row / QK_K)
}

/// Row metadata, row blocks and in-row block index of super-block `group`
#[inline]
pub(crate) fn locate_superblock<'a>(
    src: &'a [u8],
    shape: &Shape,
    meta_size: usize,
    group: usize,
) -> (&'a [u8], &'a [u8], usize) {
    let (row, i) = superblock_of(shape, group);
    let (meta, blocks) = split_row(src, shape, meta_size, row);
    (meta, blocks, i)
}

#[inline]
pub(crate) fn meta_f32(meta: &[u8], index: usize) -> f32 {
    LittleEndian::read_f32(&meta[4 * index..])
}

#[inline]
pub(crate) fn meta_f16(meta: &[u8]) -> f32 {
    f16::from_bits(LittleEndian::read_u16(meta)).to_f32()
}
