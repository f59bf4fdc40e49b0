// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{PortId, QueueId};
use bytes::Bytes;

/// A received frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
}

impl Packet {
    /// Wrap raw frame octets.
    pub fn new(data: impl Into<Bytes>) -> Packet {
        Packet { data: data.into() }
    }

    /// Frame octets, starting at the Ethernet header.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame length in octets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a zero length frame.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Packets returned by one receive burst.
#[derive(Debug)]
pub struct PacketBatch {
    port: PortId,
    queue: QueueId,
    packets: Vec<Packet>,
}

impl PacketBatch {
    /// Build a batch received on `port` / `queue`.
    #[must_use]
    pub fn new(port: PortId, queue: QueueId, packets: Vec<Packet>) -> PacketBatch {
        PacketBatch {
            port,
            queue,
            packets,
        }
    }

    /// Port the batch was received on
    #[must_use]
    pub fn port(&self) -> PortId {
        self.port
    }

    /// Queue the batch was received on
    #[must_use]
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    /// Packets, in receive order
    #[must_use]
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Number of packets
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Returns true if nothing was received
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}
