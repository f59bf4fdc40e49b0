// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The packet engine control plane.
//!
//! A data plane thread owns a root channel and polls it for [`Frame`]s. Each frame is decoded
//! into a [`Message`] and handled against the [`Engine`], which maps cores to ports, launches
//! one receive worker per mapped core and tears everything down on exit. [`Pktgen`] runs that
//! thread; [`api`] wraps a single process wide instance behind integer status codes.

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::missing_errors_doc)]

pub mod api;
mod context;
pub mod dispatch;
pub mod frame;
mod startup;
pub mod worker;

pub use context::{Engine, EngineConfig, LaunchError};
pub use dispatch::{DispatchError, dispatch, process};
pub use frame::{Action, Frame, FrameError, LaunchMsg, MAX_PAYLOAD, Message, PortCtlMsg};
pub use startup::{
    ControlError, DATAPLANE_THREAD, DEFAULT_CHANNEL, DEFAULT_CHANNEL_SIZE, Pktgen, StartupConfig,
    StartupError,
};
pub use worker::{WorkerError, WorkerState};
