// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Logical core to physical port mapping.
//!
//! Each worker core is bound to one port and to a receive and/or transmit queue on it. The
//! table is filled from [`L2pConfig`] records, typically produced by [`map::parse_maps`].

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

mod lport;
pub mod map;
mod table;

pub use lport::LPortId;
pub use map::{MapError, parse_maps};
pub use table::{CoreDump, CoreEntry, L2pConfig, L2pTable, LogicalPort, PhysicalPort};

use port::{PortError, PortId};
use std::fmt::{Display, Formatter};

/// Highest number of logical cores the engine can address.
pub const MAX_LCORE: u16 = 128;

/// Logical core identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoreId(pub u16);

impl CoreId {
    /// Index into per-core tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true if the id is below [`MAX_LCORE`].
    #[must_use]
    pub const fn in_range(self) -> bool {
        self.0 < MAX_LCORE
    }
}

impl Display for CoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a core does with its port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Mode {
    #[default]
    Unknown = 0,
    Main = 1,
    RxOnly = 2,
    TxOnly = 3,
    RxTx = 4,
}

impl Mode {
    /// Decode a raw mode value; anything unrecognized is [`Mode::Unknown`].
    #[must_use]
    pub const fn from_raw(raw: u32) -> Mode {
        match raw {
            1 => Mode::Main,
            2 => Mode::RxOnly,
            3 => Mode::TxOnly,
            4 => Mode::RxTx,
            _ => Mode::Unknown,
        }
    }

    /// Returns true for the modes a worker loop can run in.
    #[must_use]
    pub const fn is_worker(self) -> bool {
        matches!(self, Mode::RxOnly | Mode::TxOnly | Mode::RxTx)
    }

    /// Returns true if the core polls a receive queue.
    #[must_use]
    pub const fn receives(self) -> bool {
        matches!(self, Mode::RxOnly | Mode::RxTx)
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Unknown => "Unknown",
            Mode::Main => "Main",
            Mode::RxOnly => "RxOnly",
            Mode::TxOnly => "TxOnly",
            Mode::RxTx => "Rx/Tx",
        };
        write!(f, "{name}")
    }
}

/// Errors from mapping a core to a port.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum L2pError {
    #[error("invalid core id {0}")]
    InvalidCore(CoreId),
    #[error("invalid port id {0}")]
    InvalidPort(PortId),
    #[error("failed to set up port {port}: {source}")]
    PortSetup {
        port: PortId,
        #[source]
        source: PortError,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::Mode;

    #[test]
    fn mode_names_and_range() {
        assert_eq!(Mode::RxTx.to_string(), "Rx/Tx");
        assert_eq!(Mode::from_raw(2), Mode::RxOnly);
        assert_eq!(Mode::from_raw(17), Mode::Unknown);
        assert!(!Mode::Main.is_worker());
        assert!(Mode::TxOnly.is_worker());
        assert!(!Mode::TxOnly.receives());
    }
}
