// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Process-wide logging sink.
//!
//! Events are emitted with the `tracing` macros as usual. Once a subscriber is installed with
//! [`init`] (or lazily by [`open`]), formatted events go to the file opened with [`open`], or
//! to stderr while no file is open.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

mod sink;

pub use sink::{DEFAULT_LOGLEVEL, SinkError, SinkWriter};
pub use sink::{close, init, is_open, log, open, path};
pub use tracing_subscriber::filter::LevelFilter;
