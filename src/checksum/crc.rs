//! CRC-32 (IEEE) checksum backed by `crc32fast`.

use super::Checksum;

/// Incremental CRC-32 using the IEEE polynomial (same as zlib).
#[derive(Debug, Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial(0)
    }

    /// Resume from a previously computed CRC value.
    #[must_use]
    pub fn with_initial(crc: u32) -> Self {
        Self {
            hasher: crc32fast::Hasher::new_with_initial(crc),
        }
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum for Crc32 {
    fn update(&mut self, buf: &[u8]) {
        self.hasher.update(buf);
    }

    fn digest(&self) -> u64 {
        // finalize consumes the hasher; the clone keeps `update` usable.
        u64::from(self.hasher.clone().finalize())
    }
}
