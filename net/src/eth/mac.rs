// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Mac address type and logic.

use std::fmt::{Display, Formatter};

/// A [MAC Address] type.
///
/// `Mac` is a transparent wrapper around `[u8; 6]` which provides a
/// small collection of methods and type safety.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[must_use]
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Mac(pub [u8; 6]);

/// Destination address class of a frame, as counted by the port statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressClass {
    /// `ff:..` destination
    Broadcast,
    /// Group bit set but not broadcast
    Multicast,
    /// Group bit clear
    Unicast,
}

impl Mac {
    /// Returns true iff the least significant bit of the first octet of the [`Mac`] is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Classify a destination address by looking only at its first octet.
    ///
    /// Group addresses whose first octet is `0xff` are taken as broadcast, other group
    /// addresses as multicast. The remaining five octets are not inspected.
    pub fn class(&self) -> AddressClass {
        if !self.is_multicast() {
            AddressClass::Unicast
        } else if self.0[0] == u8::MAX {
            AddressClass::Broadcast
        } else {
            AddressClass::Multicast
        }
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{AddressClass, Mac};

    #[test]
    fn address_classes() {
        assert_eq!(Mac([0xff; 6]).class(), AddressClass::Broadcast);
        assert_eq!(
            Mac([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]).class(),
            AddressClass::Multicast
        );
        assert_eq!(
            Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]).class(),
            AddressClass::Unicast
        );
        // only the first octet decides
        assert_eq!(
            Mac([0xff, 0x00, 0x00, 0x00, 0x00, 0x01]).class(),
            AddressClass::Broadcast
        );
    }

    #[test]
    fn display() {
        let mac = Mac([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }
}
