// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Receive side packet classification counters.

use crate::Packet;
use crate::device::EtherStats;
use etherparse::{IpNumber, Ipv4HeaderSlice};
use net::eth::ETH_HEADER_LEN;
use net::{AddressClass, EthHeader, EthType, SizeBucket};
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;

const ICMP_ECHO_REQUEST: u8 = 8;

/// Per-port packet counters.
///
/// Every classified frame lands in exactly one size bucket. Frames long enough to carry an
/// Ethernet header are also counted by address class and by ethertype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PktStats {
    pub broadcast: u64,
    pub multicast: u64,
    pub unicast: u64,
    pub size_64: u64,
    pub size_65_127: u64,
    pub size_128_255: u64,
    pub size_256_511: u64,
    pub size_512_1023: u64,
    pub size_1024_1518: u64,
    pub runt: u64,
    pub jumbo: u64,
    pub arp_pkts: u64,
    /// ICMP echo requests, also counted in `ip_pkts`
    pub echo_pkts: u64,
    pub ip_pkts: u64,
    pub ipv6_pkts: u64,
    pub vlan_pkts: u64,
    pub unknown_pkts: u64,
    /// Filled from the device counters, not by [`PktStats::classify`]
    pub dropped_pkts: u64,
    /// Filled from the device counters, not by [`PktStats::classify`]
    pub rx_nombuf: u64,
}

fn is_echo_request(l3: &[u8]) -> bool {
    let Ok(ip) = Ipv4HeaderSlice::from_slice(l3) else {
        return false;
    };
    ip.protocol() == IpNumber::ICMP && l3.get(ip.slice().len()) == Some(&ICMP_ECHO_REQUEST)
}

impl PktStats {
    /// Count one frame.
    pub fn classify(&mut self, frame: &[u8]) {
        match SizeBucket::from_len(frame.len()) {
            SizeBucket::Runt => self.runt += 1,
            SizeBucket::Size64 => self.size_64 += 1,
            SizeBucket::Size65To127 => self.size_65_127 += 1,
            SizeBucket::Size128To255 => self.size_128_255 += 1,
            SizeBucket::Size256To511 => self.size_256_511 += 1,
            SizeBucket::Size512To1023 => self.size_512_1023 += 1,
            SizeBucket::Size1024To1518 => self.size_1024_1518 += 1,
            SizeBucket::Jumbo => self.jumbo += 1,
        }

        let Ok(header) = EthHeader::parse(frame) else {
            self.unknown_pkts += 1;
            return;
        };
        match header.destination().class() {
            AddressClass::Broadcast => self.broadcast += 1,
            AddressClass::Multicast => self.multicast += 1,
            AddressClass::Unicast => self.unicast += 1,
        }
        match header.ether_type() {
            EthType::ARP => self.arp_pkts += 1,
            EthType::IPV4 => {
                self.ip_pkts += 1;
                if is_echo_request(&frame[ETH_HEADER_LEN..]) {
                    self.echo_pkts += 1;
                }
            }
            EthType::IPV6 => self.ipv6_pkts += 1,
            EthType::VLAN | EthType::VLAN_QINQ => self.vlan_pkts += 1,
            _ => self.unknown_pkts += 1,
        }
    }

    /// Count every packet of a batch, in order.
    pub fn classify_batch(&mut self, packets: &[Packet]) {
        for packet in packets {
            self.classify(packet.data());
        }
    }

    /// Copy the counters only the device knows about.
    pub fn set_device_counters(&mut self, ether: &EtherStats) {
        self.dropped_pkts = ether.imissed;
        self.rx_nombuf = ether.rx_nombuf;
    }

    /// Total number of classified frames.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.runt
            + self.size_64
            + self.size_65_127
            + self.size_128_255
            + self.size_256_511
            + self.size_512_1023
            + self.size_1024_1518
            + self.jumbo
    }
}

impl AddAssign<&PktStats> for PktStats {
    fn add_assign(&mut self, rhs: &PktStats) {
        self.broadcast += rhs.broadcast;
        self.multicast += rhs.multicast;
        self.unicast += rhs.unicast;
        self.size_64 += rhs.size_64;
        self.size_65_127 += rhs.size_65_127;
        self.size_128_255 += rhs.size_128_255;
        self.size_256_511 += rhs.size_256_511;
        self.size_512_1023 += rhs.size_512_1023;
        self.size_1024_1518 += rhs.size_1024_1518;
        self.runt += rhs.runt;
        self.jumbo += rhs.jumbo;
        self.arp_pkts += rhs.arp_pkts;
        self.echo_pkts += rhs.echo_pkts;
        self.ip_pkts += rhs.ip_pkts;
        self.ipv6_pkts += rhs.ipv6_pkts;
        self.vlan_pkts += rhs.vlan_pkts;
        self.unknown_pkts += rhs.unknown_pkts;
        self.dropped_pkts += rhs.dropped_pkts;
        self.rx_nombuf += rhs.rx_nombuf;
    }
}

impl Display for PktStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rows = [
            ("broadcast", self.broadcast),
            ("multicast", self.multicast),
            ("unicast", self.unicast),
            ("64", self.size_64),
            ("65-127", self.size_65_127),
            ("128-255", self.size_128_255),
            ("256-511", self.size_256_511),
            ("512-1023", self.size_512_1023),
            ("1024-1518", self.size_1024_1518),
            ("runt", self.runt),
            ("jumbo", self.jumbo),
            ("arp", self.arp_pkts),
            ("icmp echo", self.echo_pkts),
            ("ipv4", self.ip_pkts),
            ("ipv6", self.ipv6_pkts),
            ("vlan", self.vlan_pkts),
            ("unknown", self.unknown_pkts),
            ("dropped", self.dropped_pkts),
            ("rx nombuf", self.rx_nombuf),
        ];
        for (label, value) in rows {
            writeln!(f, "  {label:<16} {value:>12}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::PktStats;
    use etherparse::PacketBuilder;
    use pretty_assertions::assert_eq;

    const SRC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
    const DST: [u8; 6] = [0x02, 0, 0, 0, 0, 2];

    fn eth(dst: [u8; 6], ether_type: [u8; 2], len: usize) -> Vec<u8> {
        let mut frame = Vec::with_capacity(len);
        frame.extend_from_slice(&dst);
        frame.extend_from_slice(&SRC);
        frame.extend_from_slice(&ether_type);
        frame.resize(len, 0);
        frame
    }

    #[test]
    fn ipv4_frame_of_64_octets() {
        let mut stats = PktStats::default();
        stats.classify(&eth(DST, [0x08, 0x00], 64));
        assert_eq!(
            stats,
            PktStats {
                size_64: 1,
                ip_pkts: 1,
                unicast: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn runt_is_never_also_sized() {
        let mut stats = PktStats::default();
        stats.classify(&eth([0xff; 6], [0x08, 0x06], 60));
        assert_eq!(stats.runt, 1);
        assert_eq!(stats.size_64, 0);
        assert_eq!(stats.arp_pkts, 1);
        assert_eq!(stats.broadcast, 1);
        assert_eq!(stats.total(), 1);
    }

    #[test]
    fn header_less_frame_is_unknown() {
        let mut stats = PktStats::default();
        stats.classify(&[0u8; 10]);
        assert_eq!(stats.runt, 1);
        assert_eq!(stats.unknown_pkts, 1);
        assert_eq!(stats.broadcast + stats.multicast + stats.unicast, 0);
    }

    #[test]
    fn address_classes() {
        let mut stats = PktStats::default();
        stats.classify(&eth([0x01, 0, 0x5e, 0, 0, 1], [0x86, 0xdd], 200));
        stats.classify(&eth([0x33, 0x33, 0, 0, 0, 1], [0x81, 0x00], 1518));
        stats.classify(&eth(DST, [0x88, 0xcc], 1600));
        assert_eq!(stats.multicast, 2);
        assert_eq!(stats.unicast, 1);
        assert_eq!(stats.ipv6_pkts, 1);
        assert_eq!(stats.vlan_pkts, 1);
        assert_eq!(stats.unknown_pkts, 1);
        assert_eq!(stats.size_128_255, 1);
        assert_eq!(stats.size_1024_1518, 1);
        assert_eq!(stats.jumbo, 1);
    }

    #[test]
    fn icmp_echo_counts_as_ip_too() {
        let builder = PacketBuilder::ethernet2(SRC, DST)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .icmpv4_echo_request(1, 1);
        let payload = [0u8; 32];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();

        let mut stats = PktStats::default();
        stats.classify(&frame);
        assert_eq!(stats.ip_pkts, 1);
        assert_eq!(stats.echo_pkts, 1);
        assert_eq!(stats.size_65_127, 1);
    }

    #[test]
    fn merge() {
        let mut total = PktStats::default();
        let mut batch = PktStats::default();
        batch.classify(&eth(DST, [0x08, 0x00], 64));
        total += &batch;
        total += &batch;
        assert_eq!(total.ip_pkts, 2);
        assert_eq!(total.size_64, 2);
        assert!(total.to_string().contains("ipv4"));
    }
}
