//! Packed block records
//!
//! One `#[repr(C)]` record per decodable format. The records are plain old
//! data so they can be read straight out of a byte buffer; their sizes are
//! checked against the type traits at compile time.

use bytemuck::{Pod, Zeroable};
use half::f16;

use crate::ggml_type::{GgmlType, QK_K};

/// A fixed-layout packed block of one element type
pub trait QuantBlock: Pod {
    /// Element type whose blocks this record describes
    const TYPE: GgmlType;
    /// Logical elements decoded from one block
    const BLOCK_SIZE: usize;
}

/// Read block `index` from a packed byte slice.
///
/// Panics if the slice does not hold the block; launch extents are checked
/// before any kernel reads.
#[inline]
pub fn block_at<B: QuantBlock>(bytes: &[u8], index: usize) -> B {
    let size = std::mem::size_of::<B>();
    bytemuck::pod_read_unaligned(&bytes[index * size..(index + 1) * size])
}

macro_rules! quant_block {
    ($block:ident, $ty:ident, $qk:expr, $size:literal) => {
        impl QuantBlock for $block {
            const TYPE: GgmlType = GgmlType::$ty;
            const BLOCK_SIZE: usize = $qk;
        }

        const _: () = assert!(std::mem::size_of::<$block>() == $size);
    };
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ4_0 {
    pub d: f16,
    pub qs: [u8; 16],
}
quant_block!(BlockQ4_0, Q4_0, 32, 18);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ4_1 {
    pub d: f16,
    pub m: f16,
    pub qs: [u8; 16],
}
quant_block!(BlockQ4_1, Q4_1, 32, 20);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ5_0 {
    pub d: f16,
    pub qh: [u8; 4],
    pub qs: [u8; 16],
}
quant_block!(BlockQ5_0, Q5_0, 32, 22);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ5_1 {
    pub d: f16,
    pub m: f16,
    pub qh: [u8; 4],
    pub qs: [u8; 16],
}
quant_block!(BlockQ5_1, Q5_1, 32, 24);

/// 6-bit legacy block: low nibbles in `qs`, two high bits per element in `qh`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ6_0 {
    pub d: f16,
    pub qh: [u8; 8],
    pub qs: [u8; 16],
}
quant_block!(BlockQ6_0, Q6_0, 32, 26);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ8_0 {
    pub d: f16,
    pub qs: [i8; 32],
}
quant_block!(BlockQ8_0, Q8_0, 32, 34);

/// 8-bit block carrying `d * sum(qs)` alongside the scale
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ8_1 {
    pub d: f16,
    pub s: f16,
    pub qs: [i8; 32],
}
quant_block!(BlockQ8_1, Q8_1, 32, 36);

/// Eight Q8_0 rows interleaved four quants at a time
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ8_0R8 {
    pub d: [f16; 8],
    pub qs: [i8; 256],
}
quant_block!(BlockQ8_0R8, Q8_0_R8, 32, 272);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ2K {
    /// 4-bit scale and 4-bit min per 16 elements
    pub scales: [u8; 16],
    pub qs: [u8; 64],
    pub d: f16,
    pub dmin: f16,
}
quant_block!(BlockQ2K, Q2_K, QK_K, 84);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ3K {
    pub hmask: [u8; 32],
    pub qs: [u8; 64],
    /// Sixteen 6-bit scales
    pub scales: [u8; 12],
    pub d: f16,
}
quant_block!(BlockQ3K, Q3_K, QK_K, 110);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ4K {
    pub d: f16,
    pub dmin: f16,
    /// Eight 6-bit scale/min pairs
    pub scales: [u8; 12],
    pub qs: [u8; 128],
}
quant_block!(BlockQ4K, Q4_K, QK_K, 144);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ5K {
    pub d: f16,
    pub dmin: f16,
    pub scales: [u8; 12],
    pub qh: [u8; 32],
    pub qs: [u8; 128],
}
quant_block!(BlockQ5K, Q5_K, QK_K, 176);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ6K {
    pub ql: [u8; 128],
    pub qh: [u8; 64],
    pub scales: [i8; 16],
    pub d: f16,
}
quant_block!(BlockQ6K, Q6_K, QK_K, 210);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockQ8K {
    pub d: f32,
    pub qs: [i8; 256],
    pub bsums: [i16; 16],
}
quant_block!(BlockQ8K, Q8_K, QK_K, 292);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2Xxs {
    pub d: f16,
    pub qs: [u16; 32],
}
quant_block!(BlockIq2Xxs, IQ2_XXS, QK_K, 66);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2Xs {
    pub d: f16,
    pub qs: [u16; 32],
    pub scales: [u8; 8],
}
quant_block!(BlockIq2Xs, IQ2_XS, QK_K, 74);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2S {
    pub d: f16,
    /// Grid indices in the first half, sign bytes in the second
    pub qs: [u8; 64],
    pub qh: [u8; 8],
    pub scales: [u8; 8],
}
quant_block!(BlockIq2S, IQ2_S, QK_K, 82);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq3Xxs {
    pub d: f16,
    /// 64 grid indices followed by 8 scale-and-sign words
    pub qs: [u8; 96],
}
quant_block!(BlockIq3Xxs, IQ3_XXS, QK_K, 98);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq3S {
    pub d: f16,
    pub qs: [u8; 64],
    pub qh: [u8; 8],
    pub signs: [u8; 32],
    pub scales: [u8; 4],
}
quant_block!(BlockIq3S, IQ3_S, QK_K, 110);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq1S {
    pub d: f16,
    pub qs: [u8; 32],
    pub qh: [u16; 8],
}
quant_block!(BlockIq1S, IQ1_S, QK_K, 50);

/// IQ1_M has no dedicated scale field: the block scale is assembled from the
/// top nibble of each of the four `scales` words.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq1M {
    pub qs: [u8; 32],
    pub qh: [u8; 16],
    pub scales: [u8; 8],
}
quant_block!(BlockIq1M, IQ1_M, QK_K, 56);

impl BlockIq1M {
    /// The four scale words; bits 0..12 hold 3-bit sub-block scales
    #[inline]
    pub fn scale_words(&self) -> [u16; 4] {
        let s = &self.scales;
        [
            u16::from_le_bytes([s[0], s[1]]),
            u16::from_le_bytes([s[2], s[3]]),
            u16::from_le_bytes([s[4], s[5]]),
            u16::from_le_bytes([s[6], s[7]]),
        ]
    }

    /// Block scale gathered from the top nibble of each scale word
    #[inline]
    pub fn block_scale(&self) -> f16 {
        let sc = self.scale_words();
        f16::from_bits(
            (sc[0] >> 12) | ((sc[1] >> 8) & 0x00f0) | ((sc[2] >> 4) & 0x0f00) | (sc[3] & 0xf000),
        )
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4Nl {
    pub d: f16,
    pub qs: [u8; 16],
}
quant_block!(BlockIq4Nl, IQ4_NL, 32, 18);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4Xs {
    pub d: f16,
    pub scales_h: u16,
    pub scales_l: [u8; 4],
    pub qs: [u8; 128],
}
quant_block!(BlockIq4Xs, IQ4_XS, QK_K, 136);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2K {
    pub d: f16,
    pub extra: u16,
    pub scales: [u8; 8],
    pub qs: [u8; 64],
}
quant_block!(BlockIq2K, IQ2_K, QK_K, 76);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq3K {
    pub d: f16,
    pub extra: u16,
    pub scales_h: u16,
    pub scales_l: [u8; 8],
    pub qs: [u8; 64],
    pub qh: [u8; 32],
}
quant_block!(BlockIq3K, IQ3_K, QK_K, 110);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4K {
    pub d: f16,
    pub extra: u16,
    pub scales_h: [u8; 4],
    pub scales_l: [u8; 8],
    pub qs: [u8; 128],
}
quant_block!(BlockIq4K, IQ4_K, QK_K, 144);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq5K {
    pub d: f16,
    pub extra: u16,
    pub scales_h: [u8; 4],
    pub scales_l: [u8; 8],
    pub qs: [u8; 128],
    pub qh: [u8; 32],
}
quant_block!(BlockIq5K, IQ5_K, QK_K, 176);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq6K {
    pub d: f16,
    pub extra: u16,
    pub scales: [i8; 16],
    pub qs: [u8; 128],
    pub qh: [u8; 64],
}
quant_block!(BlockIq6K, IQ6_K, QK_K, 212);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4Ks {
    pub scales: [u8; 8],
    pub qs: [u8; 128],
}
quant_block!(BlockIq4Ks, IQ4_KS, QK_K, 136);

/// Scales are hidden in the low bit of each 16-bit half of `qs`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4Kss {
    pub qs: [u32; 32],
}
quant_block!(BlockIq4Kss, IQ4_KSS, QK_K, 128);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq5Ks {
    pub scales: [u8; 8],
    pub qs: [u8; 128],
    pub qh: [u8; 32],
}
quant_block!(BlockIq5Ks, IQ5_KS, QK_K, 168);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2Ks {
    pub extra: u16,
    pub scales: [u8; 4],
    pub qs: [u8; 64],
}
quant_block!(BlockIq2Ks, IQ2_KS, QK_K, 70);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq3Ks {
    pub extra: u16,
    pub scales: [u8; 4],
    pub qs: [u8; 64],
    pub qh: [u8; 32],
}
quant_block!(BlockIq3Ks, IQ3_KS, QK_K, 102);

/// Five ternary digits per `ql` byte, the sixteenth digit of each group in `extra`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq1Bn {
    pub ql: [u8; 12],
    pub extra: u8,
}
quant_block!(BlockIq1Bn, IQ1_BN, 64, 13);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2Bn {
    pub qs: [u8; 16],
}
quant_block!(BlockIq2Bn, IQ2_BN, 64, 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq1Kt {
    pub sh: [u8; 8],
    pub ql: [u8; 32],
    pub qh: [u8; 16],
}
quant_block!(BlockIq1Kt, IQ1_KT, QK_K, 56);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq2Kt {
    pub scales: [u8; 4],
    pub ql: [u16; 32],
}
quant_block!(BlockIq2Kt, IQ2_KT, QK_K, 68);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq3Kt {
    pub scales: [u8; 4],
    pub ql: [u16; 32],
    /// Sign bits
    pub qh: [u8; 32],
}
quant_block!(BlockIq3Kt, IQ3_KT, QK_K, 100);

/// Eight shift/scale words, then 64 low index bytes, then 32 high-nibble bytes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlockIq4Kt {
    pub qs: [u32; 32],
}
quant_block!(BlockIq4Kt, IQ4_KT, QK_K, 128);

impl BlockIq4Kt {
    /// Per-32 shift and scale word
    #[inline]
    pub fn shb(&self, ib32: usize) -> u32 {
        self.qs[ib32]
    }

    /// Low index byte `j` (0..64)
    #[inline]
    pub fn ql(&self, j: usize) -> u8 {
        bytemuck::bytes_of(&self.qs)[32 + j]
    }

    /// High nibble byte `j` (0..32)
    #[inline]
    pub fn qh(&self, j: usize) -> u8 {
        bytemuck::bytes_of(&self.qs)[96 + j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    fn layout_matches<B: QuantBlock>() {
        let traits = B::TYPE.traits().unwrap();
        assert_eq!(B::BLOCK_SIZE, traits.block_size, "{}", B::TYPE);
        if traits.nrows == 1 {
            assert_eq!(size_of::<B>(), traits.type_size, "{}", B::TYPE);
        } else {
            assert_eq!(size_of::<B>(), traits.nrows * traits.type_size, "{}", B::TYPE);
        }
    }

    #[test]
    fn test_block_sizes_match_traits() {
        layout_matches::<BlockQ4_0>();
        layout_matches::<BlockQ4_1>();
        layout_matches::<BlockQ5_0>();
        layout_matches::<BlockQ5_1>();
        layout_matches::<BlockQ6_0>();
        layout_matches::<BlockQ8_0>();
        layout_matches::<BlockQ8_1>();
        layout_matches::<BlockQ8_0R8>();
        layout_matches::<BlockQ2K>();
        layout_matches::<BlockQ3K>();
        layout_matches::<BlockQ4K>();
        layout_matches::<BlockQ5K>();
        layout_matches::<BlockQ6K>();
        layout_matches::<BlockQ8K>();
        layout_matches::<BlockIq2Xxs>();
        layout_matches::<BlockIq2Xs>();
        layout_matches::<BlockIq2S>();
        layout_matches::<BlockIq3Xxs>();
        layout_matches::<BlockIq3S>();
        layout_matches::<BlockIq1S>();
        layout_matches::<BlockIq1M>();
        layout_matches::<BlockIq4Nl>();
        layout_matches::<BlockIq4Xs>();
        layout_matches::<BlockIq2K>();
        layout_matches::<BlockIq3K>();
        layout_matches::<BlockIq4K>();
        layout_matches::<BlockIq5K>();
        layout_matches::<BlockIq6K>();
        layout_matches::<BlockIq4Ks>();
        layout_matches::<BlockIq4Kss>();
        layout_matches::<BlockIq5Ks>();
        layout_matches::<BlockIq2Ks>();
        layout_matches::<BlockIq3Ks>();
        layout_matches::<BlockIq1Bn>();
        layout_matches::<BlockIq2Bn>();
        layout_matches::<BlockIq1Kt>();
        layout_matches::<BlockIq2Kt>();
        layout_matches::<BlockIq3Kt>();
        layout_matches::<BlockIq4Kt>();
    }

    #[test]
    fn test_block_at_reads_unaligned() {
        let mut bytes = vec![0u8; 1 + 2 * 18];
        bytes[1 + 18..1 + 20].copy_from_slice(&f16::from_f32(0.5).to_le_bytes());
        bytes[1 + 20] = 0x21;
        let block: BlockQ4_0 = block_at(&bytes[1..], 1);
        assert_eq!(block.d.to_f32(), 0.5);
        assert_eq!(block.qs[0], 0x21);
    }

    #[test]
    fn test_iq1_m_block_scale() {
        let bits = f16::from_f32(0.75).to_bits();
        let mut block = BlockIq1M::zeroed();
        for (k, word) in block.scales.chunks_exact_mut(2).enumerate() {
            let nibble = (bits >> (4 * k)) & 0xf;
            word.copy_from_slice(&((nibble << 12) | 0x0123).to_le_bytes());
        }
        assert_eq!(block.block_scale().to_f32(), 0.75);
        assert_eq!(block.scale_words()[0] & 0x0fff, 0x0123);
    }

    #[test]
    fn test_iq4_kt_accessors() {
        let mut block = BlockIq4Kt::zeroed();
        let bytes = bytemuck::bytes_of_mut(&mut block);
        bytes[32 + 5] = 7;
        bytes[96 + 3] = 9;
        assert_eq!(block.ql(5), 7);
        assert_eq!(block.qh(3), 9);
        assert_eq!(block.shb(0), 0);
    }
}
