// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Frame length buckets (RFC 2819 style).

/// Smallest legal Ethernet frame, in octets.
pub const ETHER_MIN_LEN: usize = 64;
/// Largest non-jumbo Ethernet frame, in octets.
pub const ETHER_MAX_LEN: usize = 1518;

/// The length bucket a received frame falls in.
///
/// Every length maps to exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeBucket {
    /// Shorter than [`ETHER_MIN_LEN`]
    Runt,
    /// Exactly 64 octets
    Size64,
    /// 65 to 127 octets
    Size65To127,
    /// 128 to 255 octets
    Size128To255,
    /// 256 to 511 octets
    Size256To511,
    /// 512 to 1023 octets
    Size512To1023,
    /// 1024 to 1518 octets
    Size1024To1518,
    /// Longer than [`ETHER_MAX_LEN`]
    Jumbo,
}

impl SizeBucket {
    /// Bucket for a frame of `len` octets.
    #[must_use]
    pub const fn from_len(len: usize) -> SizeBucket {
        match len {
            0..ETHER_MIN_LEN => SizeBucket::Runt,
            ETHER_MIN_LEN => SizeBucket::Size64,
            65..=127 => SizeBucket::Size65To127,
            128..=255 => SizeBucket::Size128To255,
            256..=511 => SizeBucket::Size256To511,
            512..=1023 => SizeBucket::Size512To1023,
            1024..=ETHER_MAX_LEN => SizeBucket::Size1024To1518,
            _ => SizeBucket::Jumbo,
        }
    }
}
