// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The port subsystem seen by the packet engine: configuration, receive bursts, device
//! introspection and per-port packet counters.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

mod device;
mod packet;
pub mod soft;
pub mod stats;

pub use device::{DeviceInfo, EtherStats, LinkStatus};
pub use packet::{Packet, PacketBatch};
pub use soft::SoftPorts;
pub use stats::PktStats;

use net::Mac;
use std::fmt::{Display, Formatter};

/// Highest number of ports the engine can address.
pub const MAX_ETHPORTS: u16 = 32;

/// Physical port identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PortId(pub u16);

/// Receive or transmit queue identifier, local to a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct QueueId(pub u16);

impl PortId {
    /// Index into per-port tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true if the id is below [`MAX_ETHPORTS`].
    #[must_use]
    pub const fn in_range(self) -> bool {
        self.0 < MAX_ETHPORTS
    }
}

impl Display for PortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for QueueId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors reported by a [`PortSubsystem`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PortError {
    /// The port does not exist.
    #[error("invalid port {0}")]
    InvalidPort(PortId),
    /// The port exists but was never configured (or was closed).
    #[error("port {0} is not configured")]
    NotConfigured(PortId),
    /// The queue is not one of the queues configured on the port.
    #[error("queue {queue} is out of range on port {port}")]
    QueueOutOfRange {
        /// port
        port: PortId,
        /// offending queue
        queue: QueueId,
    },
    /// A port needs at least one queue in each direction.
    #[error("port {port} can not be configured with {rx} rx and {tx} tx queues")]
    InvalidQueueCount {
        /// port
        port: PortId,
        /// requested rx queues
        rx: u16,
        /// requested tx queues
        tx: u16,
    },
    /// The receive queue has no room left.
    #[error("queue {queue} on port {port} is full")]
    QueueFull {
        /// port
        port: PortId,
        /// full queue
        queue: QueueId,
    },
}

/// Device bring-up and receive path, as used by the engine.
///
/// Implementations own the devices; the engine only ever refers to them by [`PortId`].
pub trait PortSubsystem: Send + Sync {
    /// Bring up `port` with the given number of queues and start it.
    fn configure(&self, port: PortId, rx_queues: u16, tx_queues: u16) -> Result<(), PortError>;

    /// Receive up to `max` packets from one queue. An empty batch is not an error.
    fn packet_burst(&self, port: PortId, queue: QueueId, max: usize)
    -> Result<PacketBatch, PortError>;

    /// Hand a batch back once it has been looked at.
    fn release(&self, batch: PacketBatch);

    /// Resume receiving on a configured port.
    fn start(&self, port: PortId) -> Result<(), PortError>;

    /// Stop receiving on a port without tearing it down.
    fn stop(&self, port: PortId) -> Result<(), PortError>;

    /// Tear a port down. It has to be configured again before further use.
    fn close(&self, port: PortId) -> Result<(), PortError>;

    /// Accept frames for any destination address, or only for the port's own.
    fn set_promiscuous(&self, port: PortId, enable: bool) -> Result<(), PortError>;

    /// Ports known to the subsystem.
    fn ports(&self) -> Vec<PortId>;

    /// Hardware address of the port.
    fn mac_address(&self, port: PortId) -> Result<Mac, PortError>;

    /// Current link state.
    fn link_status(&self, port: PortId) -> Result<LinkStatus, PortError>;

    /// Static device description.
    fn device_info(&self, port: PortId) -> Result<DeviceInfo, PortError>;

    /// Device level counters.
    fn ether_stats(&self, port: PortId) -> Result<EtherStats, PortError>;
}
