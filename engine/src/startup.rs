// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bring-up and teardown of the engine and its data plane thread.

use crate::context::{Engine, EngineConfig};
use crate::dispatch::{self, DispatchError};
use crate::frame::Frame;
use args::ArgList;
use msgchan::{Channel, ChannelError, ChannelRegistry};
use port::PortSubsystem;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{SyncSender, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracectl::SinkError;
use tracing::{debug, error, info, warn};

/// Name of the channel the data plane listens on.
pub const DEFAULT_CHANNEL: &str = "DPDK";
/// Capacity of each ring of the control channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 1024;
/// Name of the data plane thread.
pub const DATAPLANE_THREAD: &str = "eal_init_thread";

#[derive(Debug, Clone)]
pub struct StartupConfig {
    /// File the log goes to; stderr when `None`
    pub log_path: Option<PathBuf>,
    pub channel_name: String,
    pub channel_size: usize,
    /// Pause between two polls of the control channel
    pub poll_interval: Duration,
    /// Refuse to start unless running as root
    pub require_root: bool,
    pub engine: EngineConfig,
}

impl Default for StartupConfig {
    fn default() -> Self {
        StartupConfig {
            log_path: None,
            channel_name: DEFAULT_CHANNEL.to_string(),
            channel_size: DEFAULT_CHANNEL_SIZE,
            poll_interval: Duration::from_millis(10),
            require_root: true,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Log(#[from] SinkError),
    #[error("must run as root, effective uid is {0}")]
    NotPrivileged(u32),
    #[error("failed to spawn {DATAPLANE_THREAD}: {0}")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("{DATAPLANE_THREAD} exited before it was ready")]
    NotReady,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("control channel is full")]
    Full,
}

fn check_privilege(required: bool) -> Result<(), StartupError> {
    let euid = nix::unistd::geteuid();
    if required && !euid.is_root() {
        error!("must run as root, effective uid {euid}");
        return Err(StartupError::NotPrivileged(euid.as_raw()));
    }
    Ok(())
}

fn dataplane_main(
    engine: &Engine,
    registry: &ChannelRegistry<Frame>,
    config: &StartupConfig,
    ready: &SyncSender<Result<(), ChannelError>>,
) {
    let channel = match registry.create(&config.channel_name, config.channel_size) {
        Ok(channel) => channel,
        Err(e) => {
            error!("failed to create channel {}: {e}", config.channel_name);
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    info!("data plane listening on channel {}", channel.name());

    let main = engine.config().main_core;
    while !engine.stop_requested(main) {
        match dispatch::process(engine, &channel) {
            Ok(()) => {}
            Err(DispatchError::Channel(e)) => {
                debug!("{e}");
                break;
            }
            Err(e) => warn!("{e}"),
        }
        thread::sleep(config.poll_interval);
    }
    if channel.is_valid() {
        let _ = channel.destroy();
    }
    info!("data plane stopped");
}

/// A running engine: the data plane thread polling its channel, and the control end of that
/// channel.
#[derive(Debug)]
pub struct Pktgen {
    engine: Engine,
    registry: ChannelRegistry<Frame>,
    control: Channel<Frame>,
    dataplane: Option<JoinHandle<()>>,
    log_opened: bool,
}

impl Pktgen {
    /// Open the log, check privileges and start the data plane thread.
    ///
    /// Returns once the data plane channel exists.
    #[tracing::instrument(level = "info", skip_all)]
    pub fn startup(
        config: StartupConfig,
        ports: Arc<dyn PortSubsystem>,
        args: &ArgList,
    ) -> Result<Pktgen, StartupError> {
        let log_opened = match &config.log_path {
            Some(path) => {
                tracectl::open(path)?;
                true
            }
            None => false,
        };
        let started = Self::start(config, ports, args, log_opened);
        if started.is_err() && log_opened {
            tracectl::close();
        }
        started
    }

    fn start(
        config: StartupConfig,
        ports: Arc<dyn PortSubsystem>,
        args: &ArgList,
        log_opened: bool,
    ) -> Result<Pktgen, StartupError> {
        check_privilege(config.require_root)?;
        info!("{args}");

        let engine = Engine::new(config.engine.clone(), ports);
        let registry = ChannelRegistry::new();
        let (ready_tx, ready_rx) = sync_channel(1);
        let dataplane = thread::Builder::new()
            .name(DATAPLANE_THREAD.to_string())
            .spawn({
                let engine = engine.clone();
                let registry = registry.clone();
                let config = config.clone();
                move || dataplane_main(&engine, &registry, &config, &ready_tx)
            })
            .map_err(StartupError::Spawn)?;

        let ready = ready_rx.recv();
        let control = match ready {
            Ok(Ok(())) => registry.attach(&config.channel_name),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = dataplane.join();
                return Err(StartupError::NotReady);
            }
        };
        let control = match control {
            Ok(control) => control,
            Err(e) => {
                engine.stop_all();
                let _ = dataplane.join();
                return Err(e.into());
            }
        };
        info!("engine started, control channel {}", control.name());
        Ok(Pktgen {
            engine,
            registry,
            control,
            dataplane: Some(dataplane),
            log_opened,
        })
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry<Frame> {
        &self.registry
    }

    /// Control end of the data plane channel.
    #[must_use]
    pub fn control(&self) -> &Channel<Frame> {
        &self.control
    }

    /// Queue `frame` for the data plane.
    pub fn send(&self, frame: Frame) -> Result<(), ControlError> {
        if self.control.send(&[frame])? == 0 {
            return Err(ControlError::Full);
        }
        Ok(())
    }

    /// Returns true while the data plane thread runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.dataplane
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait up to `timeout` for the data plane thread to finish, for instance after an exit
    /// frame. Returns true if it did.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if let Some(handle) = self.dataplane.take()
            && handle.join().is_err()
        {
            error!("{DATAPLANE_THREAD} panicked");
        }
        true
    }

    /// Stop everything and close the log.
    #[tracing::instrument(level = "info", skip_all)]
    pub fn shutdown(mut self) {
        self.engine.stop_all();
        if let Some(handle) = self.dataplane.take()
            && handle.join().is_err()
        {
            error!("{DATAPLANE_THREAD} panicked");
        }
        let workers = self.engine.join_workers();
        info!("shut down, {workers} workers joined");
        if self.log_opened {
            tracectl::close();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{Pktgen, StartupConfig, StartupError, check_privilege};
    use args::ArgList;
    use port::SoftPorts;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(name: &str) -> StartupConfig {
        StartupConfig {
            channel_name: name.to_string(),
            poll_interval: Duration::from_millis(1),
            require_root: false,
            ..StartupConfig::default()
        }
    }

    #[test]
    fn privilege_check_can_be_skipped() {
        check_privilege(false).unwrap();
        if !nix::unistd::geteuid().is_root() {
            assert!(matches!(
                check_privilege(true),
                Err(StartupError::NotPrivileged(_))
            ));
        }
    }

    #[test]
    fn bad_channel_name_fails_startup() {
        let name = "x".repeat(64);
        let result = Pktgen::startup(
            config(&name),
            Arc::new(SoftPorts::new(1, 8)),
            &ArgList::new(),
        );
        assert!(matches!(result, Err(StartupError::Channel(_))));
    }

    #[test]
    fn start_then_shutdown() {
        let pktgen = Pktgen::startup(
            config("startup"),
            Arc::new(SoftPorts::new(1, 8)),
            &ArgList::new(),
        )
        .unwrap();
        assert!(pktgen.is_running());
        assert!(pktgen.registry().lookup("startup").is_ok());
        assert!(!pktgen.control().is_root());
        let registry = pktgen.registry().clone();
        pktgen.shutdown();
        assert!(registry.lookup("startup").is_err());
    }
}
