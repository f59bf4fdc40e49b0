// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use port::{PortId, QueueId};
use std::fmt::{Display, Formatter};

/// A port / queue pair packed into one word: port in the high half, queue in the low half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct LPortId(pub u32);

impl LPortId {
    #[must_use]
    pub const fn new(port: PortId, queue: QueueId) -> LPortId {
        LPortId(((port.0 as u32) << 16) | queue.0 as u32)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn port(self) -> PortId {
        PortId((self.0 >> 16) as u16)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn queue(self) -> QueueId {
        QueueId(self.0 as u16)
    }
}

impl Display for LPortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::LPortId;
    use port::{PortId, QueueId};

    #[test]
    fn packing() {
        let lport = LPortId::new(PortId(3), QueueId(7));
        assert_eq!(lport.0, 0x0003_0007);
        assert_eq!(lport.port(), PortId(3));
        assert_eq!(lport.queue(), QueueId(7));
        assert_eq!(lport.to_string(), "00030007");
    }
}
