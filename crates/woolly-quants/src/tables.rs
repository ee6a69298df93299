//! Constant lookup tables shared by the non-linear and codebook formats

/// Non-linear 4-bit values used by IQ4_NL and IQ4_XS
pub const KVALUES_IQ4NL: [i8; 16] = [
    -127, -104, -83, -65, -49, -35, -22, -10, 1, 13, 25, 38, 53, 69, 89, 113,
];

/// IQ4_NL values followed by a shifted second table, selected per sub-block
pub const IQ4K_VALUES: [i8; 32] = [
    -127, -104, -83, -65, -49, -35, -22, -10, 1, 13, 25, 38, 53, 69, 89, 113,
    -123, -100, -79, -61, -45, -31, -18, -6, 5, 17, 29, 42, 57, 73, 93, 117,
];

pub const IQ2NL_VALUES: [i8; 8] = [-31, -13, 1, 17, -26, -8, 6, 22];

pub const IQ3NL_VALUES: [i8; 16] = [
    -63, -40, -23, -10, 1, 13, 28, 47, -59, -36, -19, -6, 5, 17, 32, 51,
];

pub const IQ5NL_VALUES: [i8; 64] = [
    -126, -114, -103, -92, -83, -74, -65, -57, -50, -43, -36, -30, -24, -18, -12, -6,
    -1, 5, 11, 17, 23, 29, 36, 43, 51, 59, 68, 77, 87, 97, 109, 121,
    -124, -112, -101, -90, -81, -72, -63, -55, -48, -41, -34, -28, -22, -16, -10, -4,
    1, 7, 13, 19, 25, 31, 38, 45, 53, 61, 70, 79, 89, 99, 111, 123,
];

/// IQ6_K values; the shifted table is this one plus one
pub const IQ6NL_VALUES: [i8; 64] = [
    -127, -121, -115, -109, -104, -98, -93, -88, -84, -79, -74, -70, -66, -62, -58, -54,
    -51, -47, -44, -40, -37, -34, -31, -28, -25, -22, -19, -16, -13, -11, -8, -5,
    -2, 0, 3, 6, 9, 12, 14, 17, 20, 23, 27, 30, 33, 36, 40, 44,
    47, 51, 55, 59, 63, 68, 72, 77, 82, 87, 92, 98, 103, 109, 115, 121,
];

/// Sign patterns with even parity: entry `i` carries the seven sign bits of
/// `i` and an eighth bit that makes the total number of set bits even.
pub const KSIGNS_IQ2XS: [u8; 128] = ksigns();

/// Bit `j` selects the sign of element `j` in a group of eight
pub const KMASK_IQ2XS: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

const fn ksigns() -> [u8; 128] {
    let mut table = [0u8; 128];
    let mut i = 0;
    while i < 128 {
        table[i] = (i as u8) | (((i as u32).count_ones() as u8 & 1) << 7);
        i += 1;
    }
    table
}

/// Offset added to the IQ1_S and IQ1_M grid values
pub const IQ1S_DELTA: f32 = 0.125;
pub const IQ1M_DELTA: f32 = 0.125;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ksigns_have_even_parity() {
        for (i, &s) in KSIGNS_IQ2XS.iter().enumerate() {
            assert_eq!(s & 127, i as u8);
            assert_eq!(s.count_ones() % 2, 0);
        }
        assert_eq!(KSIGNS_IQ2XS[0], 0);
        assert_eq!(KSIGNS_IQ2XS[1], 129);
        assert_eq!(KSIGNS_IQ2XS[3], 3);
        assert_eq!(KSIGNS_IQ2XS[127], 255);
    }

    #[test]
    fn test_value_tables_are_sorted_halves() {
        fn ascending(v: &[i8]) -> bool {
            v.windows(2).all(|w| w[0] < w[1])
        }
        assert!(ascending(&KVALUES_IQ4NL));
        assert!(ascending(&IQ4K_VALUES[..16]) && ascending(&IQ4K_VALUES[16..]));
        assert!(ascending(&IQ2NL_VALUES[..4]) && ascending(&IQ2NL_VALUES[4..]));
        assert!(ascending(&IQ3NL_VALUES[..8]) && ascending(&IQ3NL_VALUES[8..]));
        assert!(ascending(&IQ5NL_VALUES[..32]) && ascending(&IQ5NL_VALUES[32..]));
        assert!(ascending(&IQ6NL_VALUES));
        assert_eq!(&IQ4K_VALUES[..16], &KVALUES_IQ4NL[..]);
    }
}
