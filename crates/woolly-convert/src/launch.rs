//! Grid launch wrappers
//!
//! One wrapper per kernel. A wrapper derives the grid geometry from the
//! element count, queues the decode on the stream and returns immediately.
//! Extents are checked when the job runs; a launch whose shape does not fit
//! the format or the buffers is logged and dropped without touching either
//! buffer. So is a codebook launch made before the grids are installed.

use tracing::{error, trace};
use woolly_quants::blocks::{BlockQ5_0, BlockQ5_1, BlockQ6_0, BlockQ8_0, BlockQ8_1};
use woolly_quants::{GgmlType, QK_K};

use crate::buffer::DeviceBuffer;
use crate::grid::{self, LaunchConfig, Shape};
use crate::kernels::legacy::{self, LegacyBlock};
use crate::kernels::{codebook, iqk, kquants, plain, repacked, row_scaled, trellis, Kernel};
use crate::store::{OutputStore, SourceScalar};
use crate::stream::Stream;

/// Signature shared by every launch wrapper
pub type ToTypeFn<T> = fn(&DeviceBuffer<u8>, &DeviceBuffer<T>, usize, usize, &Stream);

/// Validate a launch against the format and the buffers it reads and writes
fn checked_shape(ty: GgmlType, src_len: usize, dst_len: usize, rows: usize, n_per_row: usize) -> Option<Shape> {
    let Some(traits) = ty.traits() else {
        error!(ty = %ty, "Launch for a type without a block layout dropped");
        return None;
    };
    if ty.uses_codebook() && !woolly_quants::codebook::is_installed() {
        error!(ty = %ty, "Lattice grids are not installed; launch dropped");
        return None;
    }
    if n_per_row % traits.block_size != 0 {
        error!(
            ty = %ty,
            n_per_row,
            block_size = traits.block_size,
            "Row length is not a whole number of blocks; launch dropped"
        );
        return None;
    }
    if traits.nrows > 1 && rows % traits.nrows != 0 {
        error!(ty = %ty, rows, nrows = traits.nrows, "Row count does not fill the interleave; launch dropped");
        return None;
    }

    let row_size = traits.row_size(n_per_row);
    let (Some(src_needed), Some(k)) = (rows.checked_mul(row_size), rows.checked_mul(n_per_row)) else {
        error!(ty = %ty, rows, n_per_row, "Launch extent overflows; launch dropped");
        return None;
    };
    if src_len < src_needed || dst_len < k {
        error!(
            ty = %ty,
            src_len,
            src_needed,
            dst_len,
            k,
            "Buffers are shorter than the launch extent; launch dropped"
        );
        return None;
    }
    Some(Shape { rows, n_per_row, row_size, k })
}

/// Queue `body` on `stream` with the locked buffers, trimmed to the extent
fn enqueue<T, F>(
    ty: GgmlType,
    src: &DeviceBuffer<u8>,
    dst: &DeviceBuffer<T>,
    rows: usize,
    n_per_row: usize,
    stream: &Stream,
    body: F,
) where
    T: OutputStore,
    F: FnOnce(&[u8], &mut [T], Shape) + Send + 'static,
{
    let src = src.clone();
    let dst = dst.clone();
    stream.launch(ty.name(), move || {
        let src = src.read();
        let mut dst = dst.write();
        let Some(shape) = checked_shape(ty, src.len(), dst.len(), rows, n_per_row) else {
            return;
        };
        if shape.k == 0 {
            return;
        }
        body(&src, &mut dst[..shape.k], shape);
    });
}

/// Queue a single-phase kernel over `ceil(k / span)` groups
#[allow(clippy::too_many_arguments)]
fn launch_kernel<T: OutputStore>(
    ty: GgmlType,
    threads: usize,
    span: usize,
    kernel: Kernel<T>,
    src: &DeviceBuffer<u8>,
    dst: &DeviceBuffer<T>,
    rows: usize,
    n_per_row: usize,
    stream: &Stream,
) {
    enqueue(ty, src, dst, rows, n_per_row, stream, move |src, dst, shape| {
        let cfg = LaunchConfig::for_elements(shape.k, threads, span);
        trace!(ty = %ty, rows = shape.rows, groups = cfg.groups, threads, "Decoding");
        grid::run(cfg, dst, |lane, out| kernel(src, &shape, lane, out));
    });
}

/// Convert an unquantized source element-wise
pub fn convert_unary<S: SourceScalar, T: OutputStore>(
    src: &DeviceBuffer<u8>,
    dst: &DeviceBuffer<T>,
    rows: usize,
    n_per_row: usize,
    stream: &Stream,
) {
    launch_kernel(
        S::TYPE,
        plain::THREADS,
        plain::SPAN,
        plain::convert_unary::<S, T>,
        src,
        dst,
        rows,
        n_per_row,
        stream,
    );
}

/// Legacy formats through the pair-per-lane kernel
pub fn dequantize_block<B: LegacyBlock, T: OutputStore>(
    src: &DeviceBuffer<u8>,
    dst: &DeviceBuffer<T>,
    rows: usize,
    n_per_row: usize,
    stream: &Stream,
) {
    launch_kernel(
        B::TYPE,
        legacy::GENERIC_THREADS,
        legacy::GENERIC_SPAN,
        legacy::dequantize_block::<B, T>,
        src,
        dst,
        rows,
        n_per_row,
        stream,
    );
}

/// Q8_0 through the two-phase staged kernel. The bounds-checked flavour is
/// used only when the element count is not a multiple of the group span.
pub fn dequantize_q8_0_staged<T: OutputStore>(
    src: &DeviceBuffer<u8>,
    dst: &DeviceBuffer<T>,
    rows: usize,
    n_per_row: usize,
    stream: &Stream,
) {
    enqueue(GgmlType::Q8_0, src, dst, rows, n_per_row, stream, |src, dst, shape| {
        let cfg = LaunchConfig::for_elements(shape.k, legacy::Q8_0_STAGED_THREADS, legacy::Q8_0_NE_ALIGN);
        let aligned = shape.k % legacy::Q8_0_NE_ALIGN == 0;
        trace!(ty = "q8_0", rows = shape.rows, groups = cfg.groups, aligned, "Decoding staged");
        if aligned {
            grid::run_staged(
                cfg,
                legacy::Q8_0_TILE_WORDS,
                dst,
                |lane, tile| legacy::q8_0_load::<false>(src, &shape, lane, tile),
                |lane, tile, out| legacy::q8_0_consume::<false, T>(&shape, lane, tile, out),
            );
        } else {
            grid::run_staged(
                cfg,
                legacy::Q8_0_TILE_WORDS,
                dst,
                |lane, tile| legacy::q8_0_load::<true>(src, &shape, lane, tile),
                |lane, tile, out| legacy::q8_0_consume::<true, T>(&shape, lane, tile, out),
            );
        }
    });
}

macro_rules! launch_wrappers {
    ($($(#[$meta:meta])* $name:ident => $ty:ident, $threads:expr, $span:expr, $kernel:expr;)*) => {
        $(
            $(#[$meta])*
            pub fn $name<T: OutputStore>(
                src: &DeviceBuffer<u8>,
                dst: &DeviceBuffer<T>,
                rows: usize,
                n_per_row: usize,
                stream: &Stream,
            ) {
                launch_kernel(GgmlType::$ty, $threads, $span, $kernel, src, dst, rows, n_per_row, stream);
            }
        )*
    };
}

launch_wrappers! {
    dequantize_q4_0 => Q4_0, legacy::Q4_THREADS, legacy::Q4_SPAN, legacy::dequantize_q4_0::<T>;
    dequantize_q4_1 => Q4_1, legacy::Q4_THREADS, legacy::Q4_SPAN, legacy::dequantize_q4_1::<T>;

    dequantize_q2_k => Q2_K, kquants::WIDE_THREADS, QK_K, kquants::dequantize_q2_k::<T>;
    dequantize_q3_k => Q3_K, kquants::WIDE_THREADS, QK_K, kquants::dequantize_q3_k::<T>;
    dequantize_q4_k => Q4_K, kquants::NARROW_THREADS, QK_K, kquants::dequantize_q4_k::<T>;
    dequantize_q5_k => Q5_K, kquants::WIDE_THREADS, QK_K, kquants::dequantize_q5_k::<T>;
    dequantize_q6_k => Q6_K, kquants::WIDE_THREADS, QK_K, kquants::dequantize_q6_k::<T>;
    dequantize_q8_k => Q8_K, kquants::NARROW_THREADS, QK_K, kquants::dequantize_q8_k::<T>;

    dequantize_iq2_xxs => IQ2_XXS, codebook::THREADS, QK_K, codebook::dequantize_iq2_xxs::<T>;
    dequantize_iq2_xs => IQ2_XS, codebook::THREADS, QK_K, codebook::dequantize_iq2_xs::<T>;
    dequantize_iq2_s => IQ2_S, codebook::THREADS, QK_K, codebook::dequantize_iq2_s::<T>;
    dequantize_iq3_xxs => IQ3_XXS, codebook::THREADS, QK_K, codebook::dequantize_iq3_xxs::<T>;
    dequantize_iq3_s => IQ3_S, codebook::THREADS, QK_K, codebook::dequantize_iq3_s::<T>;
    dequantize_iq1_s => IQ1_S, codebook::THREADS, QK_K, codebook::dequantize_iq1_s::<T>;
    dequantize_iq1_m => IQ1_M, codebook::THREADS, QK_K, codebook::dequantize_iq1_m::<T>;

    dequantize_iq4_nl => IQ4_NL, iqk::THREADS, QK_K, iqk::dequantize_iq4_nl::<T>;
    dequantize_iq4_xs => IQ4_XS, iqk::THREADS, QK_K, iqk::dequantize_iq4_xs::<T>;
    dequantize_iq2_k => IQ2_K, iqk::THREADS, QK_K, iqk::dequantize_iq2_k::<T>;
    dequantize_iq3_k => IQ3_K, iqk::THREADS, QK_K, iqk::dequantize_iq3_k::<T>;
    dequantize_iq4_k => IQ4_K, iqk::THREADS, QK_K, iqk::dequantize_iq4_k::<T>;
    dequantize_iq5_k => IQ5_K, iqk::THREADS, QK_K, iqk::dequantize_iq5_k::<T>;
    dequantize_iq6_k => IQ6_K, iqk::THREADS, QK_K, iqk::dequantize_iq6_k::<T>;

    dequantize_iq4_ks => IQ4_KS, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq4_ks::<T>;
    dequantize_iq4_kss => IQ4_KSS, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq4_kss::<T>;
    dequantize_iq5_ks => IQ5_KS, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq5_ks::<T>;
    dequantize_iq2_ks => IQ2_KS, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq2_ks::<T>;
    dequantize_iq3_ks => IQ3_KS, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq3_ks::<T>;
    dequantize_iq1_bn => IQ1_BN, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq1_bn::<T>;
    dequantize_iq2_bn => IQ2_BN, row_scaled::THREADS, QK_K, row_scaled::dequantize_iq2_bn::<T>;

    dequantize_iq1_kt => IQ1_KT, trellis::THREADS, QK_K, trellis::dequantize_iq1_kt::<T>;
    dequantize_iq2_kt => IQ2_KT, trellis::THREADS, QK_K, trellis::dequantize_iq2_kt::<T>;
    dequantize_iq3_kt => IQ3_KT, trellis::THREADS, QK_K, trellis::dequantize_iq3_kt::<T>;
    dequantize_iq4_kt => IQ4_KT, trellis::THREADS, QK_K, trellis::dequantize_iq4_kt::<T>;

    dequantize_q8_0_r8 => Q8_0_R8, repacked::THREADS, repacked::SPAN, repacked::dequantize_q8_0_r8::<T>;
}

macro_rules! legacy_wrappers {
    ($($name:ident => $block:ty;)*) => {
        $(
            pub fn $name<T: OutputStore>(
                src: &DeviceBuffer<u8>,
                dst: &DeviceBuffer<T>,
                rows: usize,
                n_per_row: usize,
                stream: &Stream,
            ) {
                dequantize_block::<$block, T>(src, dst, rows, n_per_row, stream);
            }
        )*
    };
}

legacy_wrappers! {
    dequantize_q5_0 => BlockQ5_0;
    dequantize_q5_1 => BlockQ5_1;
    dequantize_q6_0 => BlockQ6_0;
    dequantize_q8_0 => BlockQ8_0;
    dequantize_q8_1 => BlockQ8_1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_shape_accepts_whole_blocks() {
        let shape = checked_shape(GgmlType::IQ4_KS, 2 * (4 + 136), 512, 2, 256).unwrap();
        assert_eq!(shape, Shape { rows: 2, n_per_row: 256, row_size: 140, k: 512 });
    }

    #[test]
    fn test_checked_shape_rejects_partial_blocks() {
        assert!(checked_shape(GgmlType::Q4_K, 1 << 20, 1 << 20, 1, 100).is_none());
        assert!(checked_shape(GgmlType::Q8_0, 34, 32, 1, 40).is_none());
    }

    #[test]
    fn test_checked_shape_rejects_short_buffers() {
        assert!(checked_shape(GgmlType::Q8_0, 33, 32, 1, 32).is_none());
        assert!(checked_shape(GgmlType::Q8_0, 34, 31, 1, 32).is_none());
        assert!(checked_shape(GgmlType::Q8_0, 34, 32, 1, 32).is_some());
    }

    #[test]
    fn test_checked_shape_interleave() {
        assert!(checked_shape(GgmlType::Q8_0_R8, 1 << 16, 1 << 16, 4, 32).is_none());
        assert!(checked_shape(GgmlType::Q8_0_R8, 8 * 34, 256, 8, 32).is_some());
    }

    #[test]
    fn test_checked_shape_zero_extent() {
        let shape = checked_shape(GgmlType::Q4_0, 0, 0, 0, 64).unwrap();
        assert_eq!(shape.k, 0);
    }
}
