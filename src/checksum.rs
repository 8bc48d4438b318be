//! CRC-32 checksum utilities

use crc::{Crc, CRC_32_ISO_HDLC};

/// CRC-32 algorithm shared with the query engine's loader.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32 checksum of a byte slice.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Incremental CRC-32 digest.
pub struct Digest {
    digest: crc::Digest<'static, u32>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}
