// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use net::Mac;
use std::fmt::{Display, Formatter};

const LINK_DUPLEX_BIT: u64 = 1 << 32;
const LINK_AUTONEG_BIT: u64 = 1 << 33;
const LINK_UP_BIT: u64 = 1 << 34;

/// Link state of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// Speed in Mbps, zero when unknown
    pub speed_mbps: u32,
    /// Full duplex
    pub full_duplex: bool,
    /// Speed was auto-negotiated
    pub autoneg: bool,
    /// Link is up
    pub up: bool,
}

impl LinkStatus {
    /// Pack into a single word: speed in the low 32 bits, then duplex, autoneg and status.
    #[must_use]
    pub fn to_bits(self) -> u64 {
        let mut bits = u64::from(self.speed_mbps);
        if self.full_duplex {
            bits |= LINK_DUPLEX_BIT;
        }
        if self.autoneg {
            bits |= LINK_AUTONEG_BIT;
        }
        if self.up {
            bits |= LINK_UP_BIT;
        }
        bits
    }

    /// Inverse of [`LinkStatus::to_bits`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_bits(bits: u64) -> LinkStatus {
        LinkStatus {
            speed_mbps: bits as u32,
            full_duplex: bits & LINK_DUPLEX_BIT != 0,
            autoneg: bits & LINK_AUTONEG_BIT != 0,
            up: bits & LINK_UP_BIT != 0,
        }
    }
}

impl Display for LinkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.up {
            return write!(f, "down");
        }
        write!(
            f,
            "up {} Mbps {}{}",
            self.speed_mbps,
            if self.full_duplex { "full-duplex" } else { "half-duplex" },
            if self.autoneg { " autoneg" } else { "" }
        )
    }
}

/// Description of the device behind a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub bus_name: String,
    pub mac: Mac,
    pub if_index: u32,
    pub min_mtu: u16,
    pub max_mtu: u16,
    pub max_rx_pktlen: u32,
    pub max_rx_queues: u16,
    pub max_tx_queues: u16,
    pub nb_rx_queues: u16,
    pub nb_tx_queues: u16,
    pub socket_id: i32,
}

/// Counters kept by the device itself rather than by the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EtherStats {
    pub ipackets: u64,
    pub ibytes: u64,
    pub imissed: u64,
    pub ierrors: u64,
    pub rx_nombuf: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::LinkStatus;

    #[test]
    fn link_bits() {
        let link = LinkStatus {
            speed_mbps: 10_000,
            full_duplex: true,
            autoneg: false,
            up: true,
        };
        let bits = link.to_bits();
        assert_eq!(bits & 0xffff_ffff, 10_000);
        assert_eq!(LinkStatus::from_bits(bits), link);
        assert_eq!(link.to_string(), "up 10000 Mbps full-duplex");
        assert_eq!(LinkStatus::default().to_string(), "down");
    }
}
