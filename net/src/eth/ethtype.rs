// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet type related fields

use etherparse::EtherType;
use std::fmt::{Display, Formatter};

/// The ethernet header's ethertype field.
///
/// This is a transparent wrapper around the type provided by etherparse.
/// The receive path has to accept whatever arrives on the wire, so any value read from a
/// header is kept as is; classification matches it against the constants below.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EthType(pub(crate) EtherType);

impl Display for EthType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0.0)
    }
}

impl From<EtherType> for EthType {
    fn from(value: EtherType) -> Self {
        EthType(value)
    }
}

impl EthType {
    /// Ethernet type for [address resolution protocol](https://en.wikipedia.org/wiki/Address_Resolution_Protocol)
    pub const ARP: EthType = EthType(EtherType::ARP);
    /// Ethernet type for [IPv4](https://en.wikipedia.org/wiki/IPv4)
    pub const IPV4: EthType = EthType(EtherType::IPV4);
    /// Ethernet type for [IPv6](https://en.wikipedia.org/wiki/IPv6)
    pub const IPV6: EthType = EthType(EtherType::IPV6);
    /// Ethernet type for [VLAN](https://en.wikipedia.org/wiki/IEEE_802.1Q)
    pub const VLAN: EthType = EthType(EtherType::VLAN_TAGGED_FRAME);
    /// Ethernet type for [QinQ (aka provider bridging)](https://en.wikipedia.org/wiki/IEEE_802.1ad)
    pub const VLAN_QINQ: EthType = EthType(EtherType::PROVIDER_BRIDGING);
}
