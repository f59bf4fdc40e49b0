// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Per-core receive loop.

use crate::context::Shared;
use l2p::{CoreId, Mode};
use port::PktStats;
use std::fmt::{Display, Formatter};
use std::thread;
use tracing::{error, info, trace, warn};

/// Life cycle of a worker: `Idle` until launched, then `Initializing`, `Running` and
/// finally `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Initializing = 1,
    Running = 2,
    Stopped = 3,
}

impl WorkerState {
    pub(crate) const fn from_raw(raw: u8) -> WorkerState {
        match raw {
            1 => WorkerState::Initializing,
            2 => WorkerState::Running,
            3 => WorkerState::Stopped,
            _ => WorkerState::Idle,
        }
    }
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Initializing => "initializing",
            WorkerState::Running => "running",
            WorkerState::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("core {0} is not mapped to a port")]
    NotConfigured(CoreId),
    #[error("core {core}: mode {mode} can not run a worker")]
    InvalidMode { core: CoreId, mode: Mode },
}

/// Body of the worker thread of `core`. Returns once the core is asked to stop.
pub(crate) fn run(shared: &Shared, core: CoreId) -> Result<(), WorkerError> {
    let entry = shared
        .l2p
        .read()
        .core(core)
        .copied()
        .ok_or(WorkerError::NotConfigured(core))?;
    if !entry.mode.is_worker() {
        error!("core {core}: invalid mode {}", entry.mode);
        return Err(WorkerError::InvalidMode {
            core,
            mode: entry.mode,
        });
    }
    let lport = entry.lport.ok_or(WorkerError::NotConfigured(core))?;
    shared.set_state(core, WorkerState::Running);
    info!(
        core = %core,
        port = %lport.port,
        "worker running, mode {} rxq {} txq {}",
        entry.mode, lport.rx_qid, lport.tx_qid
    );

    let burst = shared.config.burst;
    let mut failing = false;
    while !shared.stop_requested(core) {
        if !entry.mode.receives() {
            // nothing is generated on the transmit side
            thread::yield_now();
            continue;
        }
        match shared.ports.packet_burst(lport.port, lport.rx_qid, burst) {
            Ok(batch) if batch.is_empty() => {
                failing = false;
                shared.ports.release(batch);
                thread::yield_now();
            }
            Ok(batch) => {
                failing = false;
                let mut counts = PktStats::default();
                counts.classify_batch(batch.packets());
                trace!(core = %core, "classified {} packets", batch.len());
                if let Some(stats) = shared.stats.get(lport.port.index()) {
                    *stats.lock() += &counts;
                }
                shared.ports.release(batch);
            }
            Err(e) => {
                if !failing {
                    warn!(core = %core, "receive failed: {e}");
                    failing = true;
                }
                thread::yield_now();
            }
        }
    }
    Ok(())
}
