// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet primitives used by the packet classifier.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

pub mod eth;
pub mod frame;

pub use eth::ethtype::EthType;
pub use eth::mac::{AddressClass, Mac};
pub use eth::{EthHeader, EthHeaderError};
pub use frame::SizeBucket;
