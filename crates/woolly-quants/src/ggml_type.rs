//! GGML element types and their storage traits
//!
//! Every tensor handed to the conversion layer is tagged with one of the
//! element types below. The numeric tags match the values written into model
//! files, so they double as the on-disk identifier.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

macro_rules! ggml_types {
    ($($(#[$doc:meta])* $variant:ident = $tag:literal => $name:literal,)*) => {
        /// GGML tensor element types
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        #[allow(non_camel_case_types)]
        pub enum GgmlType {
            $($(#[$doc])* $variant = $tag,)*
        }

        impl GgmlType {
            /// Every known element type, in tag order
            pub const ALL: &'static [GgmlType] = &[$(GgmlType::$variant,)*];

            /// Try to create from a u32 tag
            pub fn from_u32(value: u32) -> Option<Self> {
                match value {
                    $($tag => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Canonical lowercase name, as used by ggml tooling
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }
    };
}

ggml_types! {
    /// 32-bit float
    F32 = 0 => "f32",
    /// 16-bit float
    F16 = 1 => "f16",
    /// 4-bit, scale only
    Q4_0 = 2 => "q4_0",
    /// 4-bit, scale and min
    Q4_1 = 3 => "q4_1",
    /// 5-bit, scale only
    Q5_0 = 6 => "q5_0",
    /// 5-bit, scale and min
    Q5_1 = 7 => "q5_1",
    /// 8-bit, scale only
    Q8_0 = 8 => "q8_0",
    /// 8-bit, scale and block sum
    Q8_1 = 9 => "q8_1",
    Q2_K = 10 => "q2_K",
    Q3_K = 11 => "q3_K",
    Q4_K = 12 => "q4_K",
    Q5_K = 13 => "q5_K",
    Q6_K = 14 => "q6_K",
    Q8_K = 15 => "q8_K",
    IQ2_XXS = 16 => "iq2_xxs",
    IQ2_XS = 17 => "iq2_xs",
    IQ3_XXS = 18 => "iq3_xxs",
    IQ1_S = 19 => "iq1_s",
    IQ4_NL = 20 => "iq4_nl",
    IQ3_S = 21 => "iq3_s",
    IQ2_S = 22 => "iq2_s",
    IQ4_XS = 23 => "iq4_xs",
    I8 = 24 => "i8",
    I16 = 25 => "i16",
    I32 = 26 => "i32",
    I64 = 27 => "i64",
    F64 = 28 => "f64",
    IQ1_M = 29 => "iq1_m",
    /// Brain float 16
    BF16 = 30 => "bf16",
    Q4_0_4_4 = 31 => "q4_0_4x4",
    Q4_0_4_8 = 32 => "q4_0_4x8",
    Q4_0_8_8 = 33 => "q4_0_8x8",
    /// Ternary weights with a per-tensor scale
    I2_S = 36 => "i2_s",
    Q8_0_X4 = 97 => "q8_0_x4",
    Q8_1_X4 = 98 => "q8_1_x4",
    Q8_2_X4 = 99 => "q8_2_x4",
    /// 6-bit, scale only
    Q6_0 = 133 => "q6_0",
    /// BitNet 1.625 bpw
    IQ1_BN = 134 => "iq1_bn",
    /// BitNet 2 bpw
    IQ2_BN = 135 => "iq2_bn",
    Q8_K64 = 136 => "q8_K64",
    IQ2_K = 137 => "iq2_k",
    IQ3_K = 138 => "iq3_k",
    IQ4_K = 139 => "iq4_k",
    IQ5_K = 140 => "iq5_k",
    IQ6_K = 141 => "iq6_k",
    IQ4_KS = 144 => "iq4_ks",
    IQ2_KS = 145 => "iq2_ks",
    IQ4_KSS = 146 => "iq4_kss",
    Q8_K16 = 147 => "q8_K16",
    Q8_K32 = 148 => "q8_K32",
    Q8_KR8 = 149 => "q8_KR8",
    Q8_K128 = 150 => "q8_K128",
    Q8_KV = 151 => "q8_KV",
    IQ5_KS = 152 => "iq5_ks",
    IQ2_KT = 153 => "iq2_kt",
    IQ3_KT = 154 => "iq3_kt",
    IQ4_KT = 155 => "iq4_kt",
    IQ3_KS = 156 => "iq3_ks",
    IQ2_KL = 157 => "iq2_kl",
    IQ1_KT = 158 => "iq1_kt",
    Q4_0_R8 = 202 => "q4_0_r8",
    Q5_0_R4 = 206 => "q5_0_r4",
    Q8_0_R8 = 208 => "q8_0_r8",
    Q2_K_R4 = 210 => "q2_k_r4",
    Q3_K_R4 = 211 => "q3_k_r4",
    Q4_K_R4 = 212 => "q4_k_r4",
    Q5_K_R4 = 213 => "q5_k_r4",
    Q6_K_R4 = 214 => "q6_k_r4",
    IQ2_XXS_R4 = 216 => "iq2_xxs_r4",
    IQ2_XS_R4 = 217 => "iq2_xs_r4",
    IQ3_XXS_R4 = 218 => "iq3_xxs_r4",
    IQ1_S_R4 = 219 => "iq1_s_r4",
    IQ4_NL_R4 = 220 => "iq4_nl_r4",
    IQ3_S_R4 = 221 => "iq3_s_r4",
    IQ2_S_R4 = 222 => "iq2_s_r4",
    IQ4_XS_R8 = 223 => "iq4_xs_r8",
    IQ1_M_R4 = 229 => "iq1_m_r4",
    BF16_R16 = 230 => "bf16_r16",
    Q6_0_R4 = 233 => "q6_0_r4",
    IQ2_BN_R4 = 335 => "iq2_bn_r4",
    IQ2_K_R4 = 337 => "iq2_k_r4",
    IQ3_K_R4 = 338 => "iq3_k_r4",
    IQ4_K_R4 = 339 => "iq4_k_r4",
    IQ5_K_R4 = 340 => "iq5_k_r4",
    IQ4_KS_R4 = 344 => "iq4_ks_r4",
    IQ5_KS_R4 = 352 => "iq5_ks_r4",
    Q8_KV_R8 = 398 => "q8_KV_r8",
    Q8_K_R8 = 399 => "q8_k_r8",
}

/// Elements per block of the legacy formats
pub const QK4_0: usize = 32;
/// Elements per super-block of the k-quant and most i-quant formats
pub const QK_K: usize = 256;
/// Elements per block of the BitNet formats
pub const QK_IQ1BN: usize = 64;

/// Storage traits of one element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTraits {
    /// Logical elements per block
    pub block_size: usize,
    /// Bytes per block (per row, for interleaved formats)
    pub type_size: usize,
    /// Bytes stored once per row ahead of the blocks
    pub row_meta_size: usize,
    /// Rows interleaved together by repacked formats
    pub nrows: usize,
    /// Whether decoding needs more than a widen/narrow
    pub is_quantized: bool,
}

impl TypeTraits {
    const fn plain(type_size: usize) -> Self {
        Self { block_size: 1, type_size, row_meta_size: 0, nrows: 1, is_quantized: false }
    }

    const fn block(block_size: usize, type_size: usize) -> Self {
        Self { block_size, type_size, row_meta_size: 0, nrows: 1, is_quantized: true }
    }

    const fn with_row_meta(self, row_meta_size: usize) -> Self {
        Self { row_meta_size, ..self }
    }

    const fn interleaved(self, nrows: usize) -> Self {
        Self { nrows, ..self }
    }

    /// Bytes occupied by one row of `n_per_row` elements
    pub const fn row_size(&self, n_per_row: usize) -> usize {
        self.row_meta_size + (n_per_row / self.block_size) * self.type_size
    }
}

impl GgmlType {
    /// Storage traits, or `None` for types whose layout this crate does not model
    pub const fn traits(self) -> Option<TypeTraits> {
        use GgmlType::*;
        let t = match self {
            F32 | I32 => TypeTraits::plain(4),
            F16 | BF16 | I16 => TypeTraits::plain(2),
            F64 | I64 => TypeTraits::plain(8),
            I8 => TypeTraits::plain(1),
            BF16_R16 => TypeTraits::plain(2).interleaved(16),

            Q4_0 | IQ4_NL | Q4_0_4_4 | Q4_0_4_8 | Q4_0_8_8 => TypeTraits::block(32, 18),
            Q4_1 => TypeTraits::block(32, 20),
            Q5_0 => TypeTraits::block(32, 22),
            Q5_1 => TypeTraits::block(32, 24),
            Q6_0 => TypeTraits::block(32, 26),
            Q8_0 | Q8_0_X4 => TypeTraits::block(32, 34),
            Q8_1 | Q8_1_X4 => TypeTraits::block(32, 36),

            Q2_K => TypeTraits::block(QK_K, 84),
            Q3_K => TypeTraits::block(QK_K, 110),
            Q4_K => TypeTraits::block(QK_K, 144),
            Q5_K => TypeTraits::block(QK_K, 176),
            Q6_K => TypeTraits::block(QK_K, 210),
            Q8_K => TypeTraits::block(QK_K, 292),

            IQ2_XXS => TypeTraits::block(QK_K, 66),
            IQ2_XS => TypeTraits::block(QK_K, 74),
            IQ2_S => TypeTraits::block(QK_K, 82),
            IQ3_XXS => TypeTraits::block(QK_K, 98),
            IQ3_S => TypeTraits::block(QK_K, 110),
            IQ1_S => TypeTraits::block(QK_K, 50),
            IQ1_M => TypeTraits::block(QK_K, 56),
            IQ4_XS => TypeTraits::block(QK_K, 136),

            IQ2_K => TypeTraits::block(QK_K, 76),
            IQ3_K => TypeTraits::block(QK_K, 110),
            IQ4_K => TypeTraits::block(QK_K, 144),
            IQ5_K => TypeTraits::block(QK_K, 176),
            IQ6_K => TypeTraits::block(QK_K, 212),

            IQ4_KS => TypeTraits::block(QK_K, 136).with_row_meta(4),
            IQ4_KSS => TypeTraits::block(QK_K, 128).with_row_meta(4),
            IQ5_KS => TypeTraits::block(QK_K, 168).with_row_meta(4),
            IQ2_KS => TypeTraits::block(QK_K, 70).with_row_meta(2),
            IQ3_KS => TypeTraits::block(QK_K, 102).with_row_meta(2),
            IQ2_KL => TypeTraits::block(QK_K, 102).with_row_meta(2),

            IQ1_BN => TypeTraits::block(QK_IQ1BN, 13).with_row_meta(2),
            IQ2_BN => TypeTraits::block(QK_IQ1BN, 16).with_row_meta(4),

            IQ1_KT => TypeTraits::block(QK_K, 56).with_row_meta(4),
            IQ2_KT => TypeTraits::block(QK_K, 68).with_row_meta(4),
            IQ3_KT => TypeTraits::block(QK_K, 100).with_row_meta(4),
            IQ4_KT => TypeTraits::block(QK_K, 128).with_row_meta(8),

            Q4_0_R8 => TypeTraits::block(32, 18).interleaved(8),
            Q5_0_R4 => TypeTraits::block(32, 22).interleaved(4),
            Q6_0_R4 => TypeTraits::block(32, 26).interleaved(4),
            Q8_0_R8 => TypeTraits::block(32, 34).interleaved(8),
            IQ4_NL_R4 => TypeTraits::block(32, 18).interleaved(4),
            Q2_K_R4 => TypeTraits::block(QK_K, 84).interleaved(4),
            Q3_K_R4 => TypeTraits::block(QK_K, 110).interleaved(4),
            Q4_K_R4 => TypeTraits::block(QK_K, 144).interleaved(4),
            Q5_K_R4 => TypeTraits::block(QK_K, 176).interleaved(4),
            Q6_K_R4 => TypeTraits::block(QK_K, 210).interleaved(4),
            IQ2_XXS_R4 => TypeTraits::block(QK_K, 66).interleaved(4),
            IQ2_XS_R4 => TypeTraits::block(QK_K, 74).interleaved(4),
            IQ2_S_R4 => TypeTraits::block(QK_K, 82).interleaved(4),
            IQ3_XXS_R4 => TypeTraits::block(QK_K, 98).interleaved(4),
            IQ3_S_R4 => TypeTraits::block(QK_K, 110).interleaved(4),
            IQ4_XS_R8 => TypeTraits::block(QK_K, 136).interleaved(8),
            IQ2_K_R4 => TypeTraits::block(QK_K, 76).interleaved(4),
            IQ3_K_R4 => TypeTraits::block(QK_K, 110).interleaved(4),
            IQ4_K_R4 => TypeTraits::block(QK_K, 144).interleaved(4),
            IQ5_K_R4 => TypeTraits::block(QK_K, 176).interleaved(4),
            IQ4_KS_R4 => TypeTraits::block(QK_K, 136).with_row_meta(4).interleaved(4),
            IQ5_KS_R4 => TypeTraits::block(QK_K, 168).with_row_meta(4).interleaved(4),

            // Activation-side and experimental layouts are owned by the matmul kernels
            I2_S | Q8_2_X4 | Q8_K64 | Q8_K16 | Q8_K32 | Q8_KR8 | Q8_K128 | Q8_KV | IQ1_S_R4
            | IQ1_M_R4 | IQ2_BN_R4 | Q8_KV_R8 | Q8_K_R8 => return None,
        };
        Some(t)
    }

    /// Logical elements per block, 1 for plain types
    pub fn block_size(self) -> Option<usize> {
        self.traits().map(|t| t.block_size)
    }

    /// Bytes per block
    pub fn type_size(self) -> Option<usize> {
        self.traits().map(|t| t.type_size)
    }

    /// Bytes of per-row super-scale metadata
    pub fn row_meta_size(self) -> Option<usize> {
        self.traits().map(|t| t.row_meta_size)
    }

    /// Bytes occupied by one row of `n_per_row` elements
    pub fn row_size(self, n_per_row: usize) -> Option<usize> {
        self.traits().map(|t| t.row_size(n_per_row))
    }

    /// Check if this is a quantized type
    pub fn is_quantized(self) -> bool {
        match self.traits() {
            Some(t) => t.is_quantized,
            None => !matches!(
                self,
                Self::F32 | Self::F16 | Self::BF16 | Self::F64 | Self::I8 | Self::I16 | Self::I32 | Self::I64
            ),
        }
    }

    /// Whether rows of this type are stored interleaved with their neighbours
    pub fn is_repacked(self) -> bool {
        self.traits().map_or(false, |t| t.nrows > 1)
    }

    /// Whether decoding reads the process-wide lattice grids
    pub fn uses_codebook(self) -> bool {
        matches!(
            self,
            Self::IQ2_XXS | Self::IQ2_XS | Self::IQ2_S | Self::IQ3_XXS | Self::IQ3_S | Self::IQ1_S | Self::IQ1_M
        )
    }
}

impl fmt::Display for GgmlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for GgmlType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Self::from_u32(value).ok_or(Error::UnknownType(value))
    }
}

impl FromStr for GgmlType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownTypeName(s.to_string()))
    }
}

/// Map a model file type code (the `general.file_type` value) to the element
/// type used by most of its tensors.
///
/// Returns `None` for unknown codes and for mixed file types that have no
/// single dominant element type.
pub fn file_type_to_ggml_type(ftype: i32) -> Option<GgmlType> {
    use GgmlType::*;
    let ty = match ftype {
        0 => F32,
        1 => F16,
        2 => Q4_0,
        3 => Q4_1,
        7 => Q8_0,
        8 => Q5_0,
        9 => Q5_1,
        10 => Q2_K,
        11 => Q3_K,
        12 => Q4_K,
        13 => Q5_K,
        14 => Q6_K,
        15 => IQ2_XXS,
        16 => IQ2_XS,
        17 => IQ3_XXS,
        18 => IQ1_S,
        19 => IQ4_NL,
        20 => IQ3_S,
        21 => IQ2_S,
        22 => IQ4_XS,
        23 => IQ1_M,
        24 => BF16,
        25 => Q4_0_4_4,
        26 => Q4_0_4_8,
        27 => Q4_0_8_8,
        127 => Q6_0,
        128 => IQ1_BN,
        129 => IQ2_BN,
        130 => IQ2_K,
        131 => IQ3_K,
        132 => IQ4_K,
        133 => IQ5_K,
        134 => IQ6_K,
        137 => IQ4_KS,
        138 => IQ2_KS,
        139 => IQ4_KSS,
        140 => Q8_KV,
        141 => IQ5_KS,
        142 => IQ2_KT,
        143 => IQ3_KT,
        144 => IQ4_KT,
        145 => IQ3_KS,
        146 => IQ2_KL,
        147 => IQ1_KT,
        202 => Q4_0_R8,
        207 => Q8_0_R8,
        208 => Q5_0_R4,
        210 => Q2_K_R4,
        211 => Q3_K_R4,
        212 => Q4_K_R4,
        213 => Q5_K_R4,
        214 => Q6_K_R4,
        215 => IQ2_XXS_R4,
        216 => IQ2_XS_R4,
        217 => IQ3_XXS_R4,
        218 => IQ1_S_R4,
        219 => IQ4_NL_R4,
        220 => IQ3_S_R4,
        221 => IQ2_S_R4,
        222 => IQ4_XS_R8,
        223 => IQ1_M_R4,
        224 => BF16_R16,
        227 => Q6_0_R4,
        329 => IQ2_BN_R4,
        330 => IQ2_K_R4,
        331 => IQ3_K_R4,
        332 => IQ4_K_R4,
        333 => IQ5_K_R4,
        337 => IQ4_KS_R4,
        341 => IQ5_KS_R4,
        398 => Q8_KV_R8,
        399 => Q8_K_R8,
        _ => return None,
    };
    Some(ty)
}
