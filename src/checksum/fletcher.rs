//! Fletcher and Adler checksums.
//!
//! Both keep two running sums over the input bytes:
//!
//! ```text
//! a = (a + byte) mod m
//! b = (b + a)    mod m
//! digest = b << (N / 2) | a
//! ```
//!
//! Fletcher-N uses `m = 2^(N/2) - 1` and starts with `a = 0`. Adler-32 is the
//! 32 bit variant with `m = 65521` and `a = 1`.
//!
//! Bytes are consumed one at a time, not as N/2 bit words, so Fletcher-32 and
//! Fletcher-64 here differ from the word-oriented textbook definitions.

use super::{Checksum, ChecksumError};

/// Largest prime below 2^16, from RFC 1950.
const ADLER_MODULUS: u64 = 65_521;

/// Bytes summed between modulo reductions.
///
/// With `a < 2^32` and `b < 2^32` at the start of a block, after `BLOCK`
/// bytes `b` stays below `2^32 + BLOCK * 2^32 + BLOCK^2 * 255`, well inside
/// a `u64`.
const BLOCK: usize = 4096;

/// Shared two-sum state.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sums {
    a: u64,
    b: u64,
    modulus: u64,
}

impl Sums {
    fn update(&mut self, buf: &[u8]) {
        if self.modulus == 1 {
            // Every residue is zero; nothing to accumulate.
            return;
        }
        for block in buf.chunks(BLOCK) {
            let (mut a, mut b) = (self.a, self.b);
            for &byte in block {
                a += u64::from(byte);
                b += a;
            }
            self.a = a % self.modulus;
            self.b = b % self.modulus;
        }
    }

    fn combine(&self, half_width: u32) -> u64 {
        (self.b << half_width) | self.a
    }
}

/// Fletcher checksum of a configurable even bit width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fletcher {
    bit_size: u32,
    sums: Sums,
}

impl Fletcher {
    /// Create a Fletcher checksum producing `bit_size` bit digests.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::InvalidParameter`] if `bit_size` is zero,
    /// odd, or larger than 64.
    pub fn new(bit_size: u32) -> Result<Self, ChecksumError> {
        if bit_size == 0 {
            return Err(ChecksumError::InvalidParameter(
                "bit size must be > 0".to_string(),
            ));
        }
        if bit_size % 2 != 0 {
            return Err(ChecksumError::InvalidParameter(format!(
                "bit size must be even, got {bit_size}"
            )));
        }
        if bit_size > 64 {
            return Err(ChecksumError::InvalidParameter(format!(
                "bit size must be <= 64, got {bit_size}"
            )));
        }
        Ok(Self::with_valid_size(bit_size))
    }

    /// Fletcher-8: modulus 15.
    #[must_use]
    pub fn fletcher8() -> Self {
        Self::with_valid_size(8)
    }

    /// Fletcher-16: modulus 255.
    #[must_use]
    pub fn fletcher16() -> Self {
        Self::with_valid_size(16)
    }

    /// Fletcher-32: modulus 65535.
    #[must_use]
    pub fn fletcher32() -> Self {
        Self::with_valid_size(32)
    }

    /// Fletcher-64: modulus 2^32 - 1.
    #[must_use]
    pub fn fletcher64() -> Self {
        Self::with_valid_size(64)
    }

    fn with_valid_size(bit_size: u32) -> Self {
        Self {
            bit_size,
            sums: Sums {
                a: 0,
                b: 0,
                modulus: (1u64 << (bit_size / 2)) - 1,
            },
        }
    }

    /// Digest width in bits.
    #[must_use]
    pub fn bit_size(&self) -> u32 {
        self.bit_size
    }

    /// Current value of the first running sum.
    #[must_use]
    pub fn sum_a(&self) -> u64 {
        self.sums.a
    }

    /// Current value of the second running sum.
    #[must_use]
    pub fn sum_b(&self) -> u64 {
        self.sums.b
    }
}

impl Checksum for Fletcher {
    fn update(&mut self, buf: &[u8]) {
        self.sums.update(buf);
    }

    fn digest(&self) -> u64 {
        self.sums.combine(self.bit_size / 2)
    }
}

/// Adler-32 checksum (RFC 1950).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adler32 {
    sums: Sums,
}

impl Adler32 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sums: Sums {
                a: 1,
                b: 0,
                modulus: ADLER_MODULUS,
            },
        }
    }

    /// Current value of the first running sum.
    #[must_use]
    pub fn sum_a(&self) -> u64 {
        self.sums.a
    }

    /// Current value of the second running sum.
    #[must_use]
    pub fn sum_b(&self) -> u64 {
        self.sums.b
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum for Adler32 {
    fn update(&mut self, buf: &[u8]) {
        self.sums.update(buf);
    }

    fn digest(&self) -> u64 {
        self.sums.combine(16)
    }
}
