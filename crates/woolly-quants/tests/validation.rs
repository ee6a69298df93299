//! Integration tests for woolly-quants

use half::f16;
use proptest::prelude::*;
use woolly_quants::codebook::{
    GRID_BYTES, IQ1S_GRID_LEN, IQ2S_GRID_LEN, IQ2XS_GRID_LEN, IQ2XXS_GRID_LEN, IQ3S_GRID_LEN, IQ3XXS_GRID_LEN,
};
use woolly_quants::{validate_row_data, Error, GgmlType, GridSet};

fn grid_bytes() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(GRID_BYTES);
    let words8 = IQ2XXS_GRID_LEN + IQ2XS_GRID_LEN + IQ2S_GRID_LEN;
    bytes.extend(std::iter::repeat(0x08u8).take(words8 * 8));
    bytes.extend(std::iter::repeat(0x04u8).take(IQ3XXS_GRID_LEN * 4));
    bytes.extend(std::iter::repeat(0x03u8).take(IQ3S_GRID_LEN * 4));
    bytes.extend(std::iter::repeat(0xffu8).take(IQ1S_GRID_LEN * 8));
    bytes
}

#[test]
fn test_grids_from_bytes() {
    let grids = GridSet::from_le_bytes(&grid_bytes()).unwrap();
    assert_eq!(grids.iq2xxs(0), [8; 8]);
    assert_eq!(grids.iq3s(511), [3; 4]);
    assert_eq!(grids.iq1s(2047), [-1; 8]);
}

#[test]
fn test_grids_reject_bad_input() {
    let bytes = grid_bytes();
    assert!(matches!(GridSet::from_le_bytes(&bytes[1..]), Err(Error::InvalidCodebook(_))));

    let mut bad = bytes;
    bad[0] = 0x09;
    assert!(matches!(GridSet::from_le_bytes(&bad), Err(Error::InvalidCodebook(_))));
}

#[test]
fn test_row_meta_formats_are_accepted() {
    assert!(validate_row_data(GgmlType::IQ4_KS, &[0xff; 7]).is_ok());
    assert!(matches!(validate_row_data(GgmlType::Q8_K64, &[]), Err(Error::NoLayout(_))));
}

proptest! {
    #[test]
    fn prop_finite_f32_rows_validate(x in prop::collection::vec(-1.0e30f32..1.0e30, 0..64)) {
        let bytes: Vec<u8> = x.iter().flat_map(|v| v.to_le_bytes()).collect();
        prop_assert!(validate_row_data(GgmlType::F32, &bytes).is_ok());
    }

    #[test]
    fn prop_nan_scale_is_located(blocks in 1usize..16, bad in 0usize..16) {
        let bad = bad % blocks;
        let mut bytes = vec![0u8; 34 * blocks];
        bytes[34 * bad..34 * bad + 2].copy_from_slice(&f16::NAN.to_le_bytes());
        match validate_row_data(GgmlType::Q8_0, &bytes) {
            Err(Error::NonFiniteValue { block, .. }) => {
                prop_assert_eq!(block, bad);
            }
            other => {
                prop_assert!(false, "unexpected {:?}", other);
            }
        }
    }

    #[test]
    fn prop_partial_blocks_are_rejected(len in 1usize..200) {
        prop_assume!(len % 18 != 0);
        let result = validate_row_data(GgmlType::Q4_0, &vec![0u8; len]);
        let rejected = matches!(result, Err(Error::InvalidRowData { .. }));
        prop_assert!(rejected);
    }
}
