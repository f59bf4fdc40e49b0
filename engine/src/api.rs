// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Process wide entry points returning integer status codes.
//!
//! There is one engine per process. [`startup`] and [`shutdown`] bracket its life; arguments,
//! configuration and the port subsystem are set up before [`startup`]. Every function is safe to
//! call from any thread.

use crate::context::Engine;
use crate::frame::Frame;
use crate::startup::{Pktgen, StartupConfig};
use args::ArgList;
use l2p::{CoreId, L2pConfig};
use parking_lot::Mutex;
use port::{PortSubsystem, SoftPorts};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{error, info};

/// Success.
pub const STATUS_OK: i32 = 0;
/// Failure; the reason is logged.
pub const STATUS_ERR: i32 = -1;

const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct Boundary {
    args: ArgList,
    config: StartupConfig,
    ports: Option<Arc<dyn PortSubsystem>>,
    running: Option<Pktgen>,
}

static BOUNDARY: LazyLock<Mutex<Boundary>> = LazyLock::new(|| {
    Mutex::new(Boundary {
        args: ArgList::new(),
        config: StartupConfig::default(),
        ports: None,
        running: None,
    })
});

/// Configuration used by the next [`startup`]. The log path is taken from [`startup`].
pub fn set_config(config: StartupConfig) {
    BOUNDARY.lock().config = config;
}

/// Port subsystem used by the next [`startup`]; a single software port when never set.
pub fn set_port_subsystem(ports: Arc<dyn PortSubsystem>) {
    BOUNDARY.lock().ports = Some(ports);
}

/// Append an argument for the next [`startup`].
pub fn add_argument(arg: &str) -> i32 {
    match BOUNDARY.lock().args.push(arg) {
        Ok(()) => STATUS_OK,
        Err(e) => {
            error!("{e}");
            STATUS_ERR
        }
    }
}

/// Start the engine, logging to `log_path` if given.
pub fn startup(log_path: Option<&Path>) -> i32 {
    let mut boundary = BOUNDARY.lock();
    if boundary.running.is_some() {
        error!("engine already started");
        return STATUS_ERR;
    }
    let mut config = boundary.config.clone();
    config.log_path = log_path.map(Path::to_path_buf);
    let ports = boundary
        .ports
        .clone()
        .unwrap_or_else(|| Arc::new(SoftPorts::new(1, DEFAULT_QUEUE_DEPTH)));
    match Pktgen::startup(config, ports, &boundary.args) {
        Ok(pktgen) => {
            boundary.running = Some(pktgen);
            STATUS_OK
        }
        Err(e) => {
            error!("startup failed: {e}");
            STATUS_ERR
        }
    }
}

/// Stop the engine, if started, and forget the collected arguments.
pub fn shutdown() {
    let running = {
        let mut boundary = BOUNDARY.lock();
        boundary.args.clear();
        boundary.running.take()
    };
    match running {
        Some(pktgen) => pktgen.shutdown(),
        None => info!("shutdown: engine not started"),
    }
}

#[must_use]
pub fn is_running() -> bool {
    BOUNDARY.lock().running.is_some()
}

/// Run `f` on the engine, if started.
pub fn with_engine<R>(f: impl FnOnce(&Engine) -> R) -> Option<R> {
    BOUNDARY.lock().running.as_ref().map(|pktgen| f(pktgen.engine()))
}

/// Add a core to port mapping.
pub fn l2p_config(cfg: &L2pConfig) -> i32 {
    match with_engine(|engine| engine.configure(cfg)) {
        Some(Ok(())) => STATUS_OK,
        Some(Err(e)) => {
            error!("{e}");
            STATUS_ERR
        }
        None => {
            error!("l2p config: engine not started");
            STATUS_ERR
        }
    }
}

/// Printable mapping of `core`, if the engine is started.
#[must_use]
pub fn l2p_dump(core: CoreId) -> Option<String> {
    with_engine(|engine| engine.dump_core(core))
}

/// Queue `frame` for the data plane.
pub fn send(frame: Frame) -> i32 {
    let boundary = BOUNDARY.lock();
    let Some(pktgen) = boundary.running.as_ref() else {
        error!("send: engine not started");
        return STATUS_ERR;
    };
    match pktgen.send(frame) {
        Ok(()) => STATUS_OK,
        Err(e) => {
            error!("send: {e}");
            STATUS_ERR
        }
    }
}

/// Queue the first `count` of `frames` for the data plane.
///
/// Returns how many were accepted, which may be fewer than asked when the channel fills, or
/// [`STATUS_ERR`] if `count` is negative or the engine is not started. A `count` past the end of
/// `frames` is clamped.
pub fn send_burst(frames: &[Frame], count: i32) -> i32 {
    let count = match msgchan::checked_count(i64::from(count)) {
        Ok(count) => count.min(frames.len()),
        Err(e) => {
            error!("send: {e}");
            return STATUS_ERR;
        }
    };
    let boundary = BOUNDARY.lock();
    let Some(pktgen) = boundary.running.as_ref() else {
        error!("send: engine not started");
        return STATUS_ERR;
    };
    match pktgen.control().send(&frames[..count]) {
        Ok(sent) => i32::try_from(sent).unwrap_or(i32::MAX),
        Err(e) => {
            error!("send: {e}");
            STATUS_ERR
        }
    }
}
