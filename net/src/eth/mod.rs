// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet header view, read through etherparse

pub mod ethtype;
pub mod mac;

use etherparse::{Ethernet2Header, Ethernet2HeaderSlice};
use ethtype::EthType;
use mac::Mac;

/// Length of an untagged Ethernet II header.
pub const ETH_HEADER_LEN: usize = Ethernet2Header::LEN;

/// The fields of an Ethernet II header the classifier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHeader {
    destination: Mac,
    ether_type: EthType,
}

/// Errors which can occur while reading an [`EthHeader`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EthHeaderError {
    /// Not enough octets for a header.
    #[error("frame of {0} octets is too short for an ethernet header")]
    Truncated(usize),
}

impl EthHeader {
    /// Read the header at the start of `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`EthHeaderError::Truncated`] if `frame` is shorter than [`ETH_HEADER_LEN`].
    pub fn parse(frame: &[u8]) -> Result<EthHeader, EthHeaderError> {
        let header = Ethernet2HeaderSlice::from_slice(frame)
            .map_err(|_| EthHeaderError::Truncated(frame.len()))?;
        Ok(EthHeader {
            destination: Mac(header.destination()),
            ether_type: EthType::from(header.ether_type()),
        })
    }

    /// Destination [`Mac`]
    #[must_use]
    pub const fn destination(&self) -> Mac {
        self.destination
    }

    /// Ethertype as found on the wire
    #[must_use]
    pub const fn ether_type(&self) -> EthType {
        self.ether_type
    }
}
