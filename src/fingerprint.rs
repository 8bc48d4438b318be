//! 16-byte format stamp written at the head of versioned artifacts.
//!
//! The same stamp type is shared by every file; each version field is only
//! meaningful for the file it is read from. Readers compare bytewise and
//! refuse mismatches so that stale artifacts from an older build are never
//! silently consumed.

use anyhow::{bail, Result};
use std::io::{Read, Write};

const MAGIC: [u8; 4] = *b"MNRP";

/// On-disk graph record layout version.
pub const GRAPH_VERSION: u32 = 3;
/// R-tree layout version (`.ramIndex` / `.fileIndex`).
pub const RTREE_VERSION: u32 = 2;
/// Core bitmap layout version (`.core`).
pub const CORE_VERSION: u32 = 1;

pub const FINGERPRINT_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    magic: [u8; 4],
    graph_version: u32,
    rtree_version: u32,
    core_version: u32,
}

impl Fingerprint {
    pub fn valid() -> Self {
        Self {
            magic: MAGIC,
            graph_version: GRAPH_VERSION,
            rtree_version: RTREE_VERSION,
            core_version: CORE_VERSION,
        }
    }

    pub fn to_bytes(&self) -> [u8; FINGERPRINT_SIZE] {
        let mut buf = [0u8; FINGERPRINT_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.graph_version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.rtree_version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.core_version.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; FINGERPRINT_SIZE]) -> Self {
        Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            graph_version: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            rtree_version: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            core_version: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Read a stamp and fail with a versioning error unless it matches the
    /// one this build writes.
    pub fn read_and_check<R: Read>(reader: &mut R, file_label: &str) -> Result<Self> {
        let mut buf = [0u8; FINGERPRINT_SIZE];
        reader.read_exact(&mut buf)?;
        let loaded = Self::from_bytes(&buf);
        let expected = Self::valid();
        if loaded != expected {
            bail!(
                "{}: fingerprint mismatch (file has graph v{}, rtree v{}, core v{}; \
                 this build expects v{}/v{}/v{}) - re-run the preprocessing pipeline",
                file_label,
                loaded.graph_version,
                loaded.rtree_version,
                loaded.core_version,
                expected.graph_version,
                expected.rtree_version,
                expected.core_version,
            );
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let fp = Fingerprint::valid();
        let bytes = fp.to_bytes();
        assert_eq!(bytes.len(), FINGERPRINT_SIZE);
        assert_eq!(Fingerprint::from_bytes(&bytes), fp);
    }

    #[test]
    fn mismatch_is_rejected() {
        let mut bytes = Fingerprint::valid().to_bytes();
        bytes[4] ^= 0xff;
        let mut cursor = std::io::Cursor::new(bytes.to_vec());
        let err = Fingerprint::read_and_check(&mut cursor, "test.hsgr").unwrap_err();
        assert!(err.to_string().contains("fingerprint mismatch"));
    }
}
