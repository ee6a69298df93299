//! Lattice codebooks for the IQ1/IQ2/IQ3 formats
//!
//! The grids are large constant tables owned by the model-loading path. They
//! are installed once per process and shared read-only by every decode after
//! that; formats that need them are unavailable until then.

use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const IQ2XXS_GRID_LEN: usize = 256;
pub const IQ2XS_GRID_LEN: usize = 512;
pub const IQ2S_GRID_LEN: usize = 1024;
pub const IQ3XXS_GRID_LEN: usize = 256;
pub const IQ3S_GRID_LEN: usize = 512;
pub const IQ1S_GRID_LEN: usize = 2048;

/// Bytes taken by all six grids in their serialized order
pub const GRID_BYTES: usize = (IQ2XXS_GRID_LEN + IQ2XS_GRID_LEN + IQ2S_GRID_LEN + IQ1S_GRID_LEN) * 8
    + (IQ3XXS_GRID_LEN + IQ3S_GRID_LEN) * 4;

static GRIDS: OnceLock<GridSet> = OnceLock::new();

/// Raw grid tables, one packed vector per entry
#[derive(Debug, Clone, Default)]
pub struct GridTables {
    pub iq2xxs: Vec<u64>,
    pub iq2xs: Vec<u64>,
    pub iq2s: Vec<u64>,
    pub iq3xxs: Vec<u32>,
    pub iq3s: Vec<u32>,
    pub iq1s: Vec<u64>,
}

/// Validated set of lattice grids
#[derive(Debug)]
pub struct GridSet {
    iq2xxs: Box<[u64]>,
    iq2xs: Box<[u64]>,
    iq2s: Box<[u64]>,
    iq3xxs: Box<[u32]>,
    iq3s: Box<[u32]>,
    iq1s: Box<[u64]>,
}

fn read_u64s(bytes: &[u8], offset: &mut usize, n: usize) -> Vec<u64> {
    let mut out = vec![0u64; n];
    LittleEndian::read_u64_into(&bytes[*offset..*offset + n * 8], &mut out);
    *offset += n * 8;
    out
}

fn read_u32s(bytes: &[u8], offset: &mut usize, n: usize) -> Vec<u32> {
    let mut out = vec![0u32; n];
    LittleEndian::read_u32_into(&bytes[*offset..*offset + n * 4], &mut out);
    *offset += n * 4;
    out
}

fn check_len(name: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(Error::InvalidCodebook(format!(
            "{} grid has {} entries, expected {}",
            name, len, expected
        )));
    }
    Ok(())
}

fn check_bytes(name: &str, bytes: &[u8], allowed: impl Fn(u8) -> bool) -> Result<()> {
    match bytes.iter().position(|&b| !allowed(b)) {
        Some(pos) => Err(Error::InvalidCodebook(format!(
            "{} grid byte {} has value {:#04x}",
            name, pos, bytes[pos]
        ))),
        None => Ok(()),
    }
}

impl GridSet {
    /// Validate grid lengths and the value alphabet of each grid
    pub fn new(tables: GridTables) -> Result<Self> {
        check_len("iq2xxs", tables.iq2xxs.len(), IQ2XXS_GRID_LEN)?;
        check_len("iq2xs", tables.iq2xs.len(), IQ2XS_GRID_LEN)?;
        check_len("iq2s", tables.iq2s.len(), IQ2S_GRID_LEN)?;
        check_len("iq3xxs", tables.iq3xxs.len(), IQ3XXS_GRID_LEN)?;
        check_len("iq3s", tables.iq3s.len(), IQ3S_GRID_LEN)?;
        check_len("iq1s", tables.iq1s.len(), IQ1S_GRID_LEN)?;

        let iq2 = |b: u8| matches!(b, 0x08 | 0x19 | 0x2b);
        check_bytes("iq2xxs", bytemuck::cast_slice(tables.iq2xxs.as_slice()), iq2)?;
        check_bytes("iq2xs", bytemuck::cast_slice(tables.iq2xs.as_slice()), iq2)?;
        check_bytes("iq2s", bytemuck::cast_slice(tables.iq2s.as_slice()), iq2)?;
        check_bytes("iq3xxs", bytemuck::cast_slice(tables.iq3xxs.as_slice()), |b| {
            matches!(b, 4 | 12 | 20 | 28 | 36 | 44 | 52 | 62)
        })?;
        check_bytes("iq3s", bytemuck::cast_slice(tables.iq3s.as_slice()), |b| b % 2 == 1 && b <= 15)?;
        check_bytes("iq1s", bytemuck::cast_slice(tables.iq1s.as_slice()), |b| {
            matches!(b as i8, -1 | 0 | 1)
        })?;

        Ok(Self {
            iq2xxs: tables.iq2xxs.into_boxed_slice(),
            iq2xs: tables.iq2xs.into_boxed_slice(),
            iq2s: tables.iq2s.into_boxed_slice(),
            iq3xxs: tables.iq3xxs.into_boxed_slice(),
            iq3s: tables.iq3s.into_boxed_slice(),
            iq1s: tables.iq1s.into_boxed_slice(),
        })
    }

    /// Parse the six grids stored back to back as little-endian words, in the
    /// order iq2xxs, iq2xs, iq2s, iq3xxs, iq3s, iq1s
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != GRID_BYTES {
            return Err(Error::InvalidCodebook(format!(
                "expected {} bytes of grid data, got {}",
                GRID_BYTES,
                bytes.len()
            )));
        }

        let mut offset = 0;
        let iq2xxs = read_u64s(bytes, &mut offset, IQ2XXS_GRID_LEN);
        let iq2xs = read_u64s(bytes, &mut offset, IQ2XS_GRID_LEN);
        let iq2s = read_u64s(bytes, &mut offset, IQ2S_GRID_LEN);
        let iq3xxs = read_u32s(bytes, &mut offset, IQ3XXS_GRID_LEN);
        let iq3s = read_u32s(bytes, &mut offset, IQ3S_GRID_LEN);
        let iq1s = read_u64s(bytes, &mut offset, IQ1S_GRID_LEN);

        Self::new(GridTables { iq2xxs, iq2xs, iq2s, iq3xxs, iq3s, iq1s })
    }

    /// Eight magnitudes of IQ2_XXS grid entry `index`
    #[inline]
    pub fn iq2xxs(&self, index: usize) -> [u8; 8] {
        self.iq2xxs[index].to_le_bytes()
    }

    #[inline]
    pub fn iq2xs(&self, index: usize) -> [u8; 8] {
        self.iq2xs[index].to_le_bytes()
    }

    #[inline]
    pub fn iq2s(&self, index: usize) -> [u8; 8] {
        self.iq2s[index].to_le_bytes()
    }

    /// Four magnitudes of IQ3_XXS grid entry `index`
    #[inline]
    pub fn iq3xxs(&self, index: usize) -> [u8; 4] {
        self.iq3xxs[index].to_le_bytes()
    }

    #[inline]
    pub fn iq3s(&self, index: usize) -> [u8; 4] {
        self.iq3s[index].to_le_bytes()
    }

    /// Eight ternary values of IQ1_S/IQ1_M grid entry `index`
    #[inline]
    pub fn iq1s(&self, index: usize) -> [i8; 8] {
        self.iq1s[index].to_le_bytes().map(|b| b as i8)
    }
}

/// Install the process-wide grids. Only the first call succeeds.
pub fn install(grids: GridSet) -> Result<&'static GridSet> {
    if GRIDS.set(grids).is_err() {
        warn!("Ignoring second codebook installation");
        return Err(Error::CodebookAlreadyInstalled);
    }
    info!("Installed lattice codebooks");
    GRIDS.get().ok_or(Error::CodebookAlreadyInstalled)
}

/// The installed grids, if any
pub fn grids() -> Option<&'static GridSet> {
    GRIDS.get()
}

/// Whether the codebook formats can be decoded
pub fn is_installed() -> bool {
    GRIDS.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_tables() -> GridTables {
        GridTables {
            iq2xxs: vec![0x0808_0808_0808_0808; IQ2XXS_GRID_LEN],
            iq2xs: vec![0x1919_1919_1919_1919; IQ2XS_GRID_LEN],
            iq2s: vec![0x2b2b_2b2b_2b2b_2b2b; IQ2S_GRID_LEN],
            iq3xxs: vec![0x0404_0404; IQ3XXS_GRID_LEN],
            iq3s: vec![0x0101_0101; IQ3S_GRID_LEN],
            iq1s: vec![0xff00_01ff_0001_ff00; IQ1S_GRID_LEN],
        }
    }

    #[test]
    fn test_grid_set_validates_alphabet() {
        assert!(GridSet::new(uniform_tables()).is_ok());

        let mut bad = uniform_tables();
        bad.iq2xs[3] = 0x0808_0808_0808_0809;
        assert!(matches!(GridSet::new(bad), Err(Error::InvalidCodebook(_))));

        let mut bad = uniform_tables();
        bad.iq3s[0] = 0x0101_0102;
        assert!(GridSet::new(bad).is_err());

        let mut bad = uniform_tables();
        bad.iq1s.pop();
        assert!(GridSet::new(bad).is_err());
    }

    #[test]
    fn test_from_le_bytes_order() {
        let tables = uniform_tables();
        let mut bytes = Vec::with_capacity(GRID_BYTES);
        for v in tables.iq2xxs.iter().chain(&tables.iq2xs).chain(&tables.iq2s) {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in tables.iq3xxs.iter().chain(&tables.iq3s) {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in &tables.iq1s {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let set = GridSet::from_le_bytes(&bytes).unwrap();
        assert_eq!(set.iq2xxs(0), [0x08; 8]);
        assert_eq!(set.iq2xs(511), [0x19; 8]);
        assert_eq!(set.iq2s(1023), [0x2b; 8]);
        assert_eq!(set.iq3xxs(7), [4; 4]);
        assert_eq!(set.iq3s(7), [1; 4]);
        assert_eq!(set.iq1s(0), [0, -1, 1, 0, -1, 1, 0, -1]);

        assert!(GridSet::from_le_bytes(&bytes[1..]).is_err());
    }
}
