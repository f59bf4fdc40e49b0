// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Named duplex message channels.
//!
//! A root [`Channel`] is created in a [`ChannelRegistry`] and owns two rings, one it receives
//! on and one it sends on. Children attached to a channel share those rings with the roles
//! swapped, so whatever one end sends the other end receives.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod channel;
mod registry;
pub mod ring;

pub use channel::{Channel, ChannelInfo, MAX_NAME_LEN, RingSize};
pub use registry::ChannelRegistry;
pub use ring::{RingBuffer, RingError};

/// Errors returned by channel and registry operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    /// A root channel with this name is already registered.
    #[error("a channel named '{0}' already exists")]
    NameInUse(String),
    /// The derived ring names would not fit in [`MAX_NAME_LEN`] bytes.
    #[error("channel name '{0}' does not fit in {MAX_NAME_LEN} bytes once prefixed")]
    NameTooLong(String),
    /// The rings could not be created.
    #[error(transparent)]
    InvalidCapacity(#[from] RingError),
    /// No root channel with this name is registered.
    #[error("no channel named '{0}'")]
    NotFound(String),
    /// The handle refers to a destroyed channel.
    #[error("channel '{0}' is not valid")]
    InvalidChannel(String),
    /// A count received at an integer boundary was negative.
    #[error("count can not be negative: {0}")]
    NegativeCount(i64),
}

/// Convert a signed count coming from an integer boundary into a `usize`.
///
/// # Errors
///
/// Returns [`ChannelError::NegativeCount`] if `raw` is negative.
pub fn checked_count(raw: i64) -> Result<usize, ChannelError> {
    usize::try_from(raw).map_err(|_| ChannelError::NegativeCount(raw))
}
