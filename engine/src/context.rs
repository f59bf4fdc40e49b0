// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::frame::PortCtlMsg;
use crate::worker::{self, WorkerError, WorkerState};
use l2p::{CoreId, L2pConfig, L2pError, L2pTable, MAX_LCORE};
use net::Mac;
use parking_lot::{Mutex, RwLock};
use port::{
    DeviceInfo, LinkStatus, MAX_ETHPORTS, PktStats, PortError, PortId, PortSubsystem,
};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Knobs of an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Core running the control loop. It only runs a worker when a launch asks for it.
    pub main_core: CoreId,
    /// Most packets a worker takes from its queue at once.
    pub burst: usize,
    /// Put ports in promiscuous mode when they are brought up.
    pub promiscuous: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            main_core: CoreId(0),
            burst: 32,
            promiscuous: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("engine has exited")]
    Exited,
    #[error("no core is mapped to a port")]
    NothingToLaunch,
    #[error("failed to spawn worker for core {core}: {source}")]
    Spawn {
        core: CoreId,
        #[source]
        source: io::Error,
    },
}

type WorkerHandle = (CoreId, JoinHandle<Result<(), WorkerError>>);

pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) ports: Arc<dyn PortSubsystem>,
    pub(crate) l2p: RwLock<L2pTable>,
    /// Serializes mapping changes, port bring-up included.
    setup: Mutex<()>,
    pub(crate) stats: Vec<Mutex<PktStats>>,
    quit: Vec<AtomicBool>,
    states: Vec<AtomicU8>,
    workers: Mutex<Vec<WorkerHandle>>,
    exited: AtomicBool,
}

impl Shared {
    pub(crate) fn stop_requested(&self, core: CoreId) -> bool {
        self.quit
            .get(core.index())
            .is_none_or(|quit| quit.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, core: CoreId, state: WorkerState) {
        if let Some(slot) = self.states.get(core.index()) {
            slot.store(state as u8, Ordering::Release);
        }
    }
}

/// Execution context shared by the control loop and the workers.
///
/// Cloning is cheap; every clone refers to the same engine.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, ports: Arc<dyn PortSubsystem>) -> Engine {
        let cores = usize::from(MAX_LCORE);
        Engine {
            shared: Arc::new(Shared {
                config,
                ports,
                l2p: RwLock::new(L2pTable::new()),
                setup: Mutex::new(()),
                stats: (0..MAX_ETHPORTS)
                    .map(|_| Mutex::new(PktStats::default()))
                    .collect(),
                quit: (0..cores).map(|_| AtomicBool::new(false)).collect(),
                states: (0..cores)
                    .map(|_| AtomicU8::new(WorkerState::Idle as u8))
                    .collect(),
                workers: Mutex::new(Vec::new()),
                exited: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Map a core to its port, bringing the port up the first time it is referenced.
    ///
    /// The port is brought up before the mapping is recorded, without holding the table lock,
    /// so the table never names a port that failed to come up. On failure the core is left
    /// unassigned. Mappings have to be in place before the workers are launched.
    pub fn configure(&self, cfg: &L2pConfig) -> Result<(), L2pError> {
        let _setup = self.shared.setup.lock();
        let new_port = self.shared.l2p.read().needs_bring_up(cfg)?;
        if new_port && let Err(source) = self.bring_up(cfg) {
            error!("port {} setup failed: {source}", cfg.port);
            self.shared.l2p.write().unassign(cfg.core);
            return Err(L2pError::PortSetup {
                port: cfg.port,
                source,
            });
        }
        self.shared.l2p.write().configure(cfg)
    }

    /// Configure `cfg.port` and apply the port settings. A port that got configured but could
    /// not be set up is stopped and closed again.
    fn bring_up(&self, cfg: &L2pConfig) -> Result<(), PortError> {
        let ports = &self.shared.ports;
        ports.configure(cfg.port, cfg.rx_queues, cfg.tx_queues)?;
        if self.shared.config.promiscuous
            && let Err(e) = ports.set_promiscuous(cfg.port, true)
        {
            if let Err(stop) = ports.stop(cfg.port) {
                warn!("stopping port {}: {stop}", cfg.port);
            }
            if let Err(close) = ports.close(cfg.port) {
                warn!("closing port {}: {close}", cfg.port);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Copy of the mapping table.
    #[must_use]
    pub fn l2p(&self) -> L2pTable {
        self.shared.l2p.read().clone()
    }

    /// Printable mapping of `core`.
    #[must_use]
    pub fn dump_core(&self, core: CoreId) -> String {
        self.shared.l2p.read().dump(core).to_string()
    }

    /// Start a worker on every mapped core that is not running one yet.
    ///
    /// The main core is skipped unless `call_main` is set. Returns the number of workers
    /// started.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn launch(&self, call_main: bool) -> Result<usize, LaunchError> {
        if self.has_exited() {
            return Err(LaunchError::Exited);
        }
        let cores: Vec<CoreId> = self.shared.l2p.read().cores().map(|e| e.core).collect();
        if cores.is_empty() {
            warn!("launch requested with no mapped core");
            return Err(LaunchError::NothingToLaunch);
        }
        let mut launched = 0;
        for core in cores {
            if core == self.shared.config.main_core && !call_main {
                continue;
            }
            if self.worker_state(core) != WorkerState::Idle {
                debug!("core {core} already launched");
                continue;
            }
            self.spawn(core)?;
            launched += 1;
        }
        info!("launched {launched} workers");
        Ok(launched)
    }

    fn spawn(&self, core: CoreId) -> Result<(), LaunchError> {
        if let Some(quit) = self.shared.quit.get(core.index()) {
            quit.store(false, Ordering::Release);
        }
        self.shared.set_state(core, WorkerState::Initializing);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("worker-{core}"))
            .spawn(move || {
                let result = worker::run(&shared, core);
                shared.set_state(core, WorkerState::Stopped);
                match &result {
                    Ok(()) => info!(core = %core, "worker stopped"),
                    Err(e) => error!(core = %core, "worker failed: {e}"),
                }
                result
            });
        match spawned {
            Ok(handle) => {
                self.shared.workers.lock().push((core, handle));
                Ok(())
            }
            Err(source) => {
                self.shared.set_state(core, WorkerState::Idle);
                error!("failed to spawn worker for core {core}: {source}");
                Err(LaunchError::Spawn { core, source })
            }
        }
    }

    /// Start or stop every port whose bit is set in `msg.portlist`.
    pub fn port_control(&self, msg: PortCtlMsg) {
        info!(
            "{} ports {:08x}",
            if msg.enable { "enable" } else { "disable" },
            msg.portlist
        );
        for bit in 0..MAX_ETHPORTS {
            if msg.portlist & (1 << bit) == 0 {
                continue;
            }
            let port = PortId(bit);
            let result = if msg.enable {
                self.shared.ports.start(port)
            } else {
                self.shared.ports.stop(port)
            };
            if let Err(e) = result {
                warn!("port {port}: {e}");
            }
        }
    }

    /// Stop every worker and tear the ports down. There is no way back.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn exit(&self) {
        self.shared.exited.store(true, Ordering::Release);
        self.stop_all();
        let joined = self.join_workers();
        let ports: Vec<PortId> = self.shared.l2p.read().ports().map(|p| p.port).collect();
        for port in ports {
            if let Err(e) = self.shared.ports.stop(port) {
                warn!("stopping port {port}: {e}");
            }
            if let Err(e) = self.shared.ports.close(port) {
                warn!("closing port {port}: {e}");
            }
        }
        info!("{joined} workers stopped");
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.shared.exited.load(Ordering::Acquire)
    }

    /// Ask the worker on `core` to stop.
    pub fn request_stop(&self, core: CoreId) {
        if let Some(quit) = self.shared.quit.get(core.index()) {
            quit.store(true, Ordering::Release);
        }
    }

    /// Ask every core to stop, the main core included.
    pub fn stop_all(&self) {
        for quit in &self.shared.quit {
            quit.store(true, Ordering::Release);
        }
    }

    #[must_use]
    pub fn stop_requested(&self, core: CoreId) -> bool {
        self.shared.stop_requested(core)
    }

    #[must_use]
    pub fn worker_state(&self, core: CoreId) -> WorkerState {
        self.shared
            .states
            .get(core.index())
            .map_or(WorkerState::Idle, |state| {
                WorkerState::from_raw(state.load(Ordering::Acquire))
            })
    }

    /// Wait for every launched worker to finish. Returns how many were waited on.
    ///
    /// Workers only finish once asked to stop.
    pub fn join_workers(&self) -> usize {
        let workers = std::mem::take(&mut *self.shared.workers.lock());
        let count = workers.len();
        for (core, handle) in workers {
            match handle.join() {
                Ok(Ok(())) => debug!("worker {core} joined"),
                Ok(Err(e)) => warn!("worker {core} exited with error: {e}"),
                Err(_) => error!("worker {core} panicked"),
            }
        }
        count
    }

    /// Counters of `port`, device drop counters included.
    pub fn port_stats(&self, port: PortId) -> Result<PktStats, PortError> {
        let slot = self
            .shared
            .stats
            .get(port.index())
            .ok_or(PortError::InvalidPort(port))?;
        let mut stats = *slot.lock();
        let ether = self.shared.ports.ether_stats(port)?;
        stats.set_device_counters(&ether);
        Ok(stats)
    }

    pub fn mac_address(&self, port: PortId) -> Result<Mac, PortError> {
        self.shared.ports.mac_address(port)
    }

    pub fn link_status(&self, port: PortId) -> Result<LinkStatus, PortError> {
        self.shared.ports.link_status(port)
    }

    pub fn device_info(&self, port: PortId) -> Result<DeviceInfo, PortError> {
        self.shared.ports.device_info(port)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.shared.config)
            .field("exited", &self.has_exited())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{Engine, EngineConfig, LaunchError};
    use crate::frame::PortCtlMsg;
    use crate::worker::WorkerState;
    use l2p::{CoreId, L2pError, MAX_LCORE, parse_maps};
    use net::Mac;
    use port::{
        DeviceInfo, EtherStats, LinkStatus, Packet, PacketBatch, PortError, PortId, PortSubsystem,
        QueueId, SoftPorts,
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Software ports that come up but refuse promiscuous mode.
    struct NoPromiscuous {
        inner: SoftPorts,
        stops: AtomicUsize,
        closes: AtomicUsize,
    }

    impl NoPromiscuous {
        fn new(count: u16) -> NoPromiscuous {
            NoPromiscuous {
                inner: SoftPorts::new(count, 16),
                stops: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }
    }

    impl PortSubsystem for NoPromiscuous {
        fn configure(&self, port: PortId, rx: u16, tx: u16) -> Result<(), PortError> {
            self.inner.configure(port, rx, tx)
        }
        fn packet_burst(
            &self,
            port: PortId,
            queue: QueueId,
            max: usize,
        ) -> Result<PacketBatch, PortError> {
            self.inner.packet_burst(port, queue, max)
        }
        fn release(&self, batch: PacketBatch) {
            self.inner.release(batch);
        }
        fn start(&self, port: PortId) -> Result<(), PortError> {
            self.inner.start(port)
        }
        fn stop(&self, port: PortId) -> Result<(), PortError> {
            self.stops.fetch_add(1, Ordering::Relaxed);
            self.inner.stop(port)
        }
        fn close(&self, port: PortId) -> Result<(), PortError> {
            self.closes.fetch_add(1, Ordering::Relaxed);
            self.inner.close(port)
        }
        fn set_promiscuous(&self, port: PortId, _: bool) -> Result<(), PortError> {
            Err(PortError::InvalidPort(port))
        }
        fn ports(&self) -> Vec<PortId> {
            self.inner.ports()
        }
        fn mac_address(&self, port: PortId) -> Result<Mac, PortError> {
            self.inner.mac_address(port)
        }
        fn link_status(&self, port: PortId) -> Result<LinkStatus, PortError> {
            self.inner.link_status(port)
        }
        fn device_info(&self, port: PortId) -> Result<DeviceInfo, PortError> {
            self.inner.device_info(port)
        }
        fn ether_stats(&self, port: PortId) -> Result<EtherStats, PortError> {
            self.inner.ether_stats(port)
        }
    }

    fn engine(ports: &Arc<SoftPorts>) -> Engine {
        Engine::new(EngineConfig::default(), ports.clone())
    }

    #[test]
    fn configure_brings_ports_up_once() {
        let ports = Arc::new(SoftPorts::new(2, 16));
        let engine = engine(&ports);
        for cfg in parse_maps(&["[1:2].1"]).unwrap() {
            engine.configure(&cfg).unwrap();
        }
        assert!(ports.link_status(PortId(1)).unwrap().up);
        assert!(ports.is_promiscuous(PortId(1)).unwrap());
        assert!(!ports.link_status(PortId(0)).unwrap().up);
        assert_eq!(engine.l2p().cores().count(), 2);
    }

    #[test]
    fn failed_bring_up_is_reported() {
        let ports = Arc::new(SoftPorts::new(1, 16));
        let engine = engine(&ports);
        // port 3 is in range for the table but does not exist
        let cfg = parse_maps(&["1.3"]).unwrap()[0];
        assert!(matches!(
            engine.configure(&cfg),
            Err(L2pError::PortSetup { .. })
        ));
        assert!(engine.l2p().core(CoreId(1)).is_none());
    }

    #[test]
    fn partial_bring_up_is_undone() {
        let ports = Arc::new(NoPromiscuous::new(1));
        let engine = Engine::new(EngineConfig::default(), ports.clone());
        let cfg = parse_maps(&["1.0"]).unwrap()[0];
        assert!(matches!(
            engine.configure(&cfg),
            Err(L2pError::PortSetup {
                port: PortId(0),
                ..
            })
        ));
        assert!(engine.l2p().core(CoreId(1)).is_none());
        assert!(engine.l2p().port(PortId(0)).is_none());
        assert_eq!(ports.stops.load(Ordering::Relaxed), 1);
        assert_eq!(ports.closes.load(Ordering::Relaxed), 1);
        assert!(!ports.link_status(PortId(0)).unwrap().up);
        // closed ports have no queues left
        assert_eq!(
            ports.inner.inject(PortId(0), QueueId(0), Packet::new(vec![0; 64])),
            Err(PortError::NotConfigured(PortId(0)))
        );

        // without promiscuous mode the same port comes up and stays mapped
        let engine = Engine::new(
            EngineConfig {
                promiscuous: false,
                ..EngineConfig::default()
            },
            ports.clone(),
        );
        engine.configure(&cfg).unwrap();
        assert!(engine.l2p().port(PortId(0)).is_some());
        assert!(ports.link_status(PortId(0)).unwrap().up);
    }

    #[test]
    fn launch_needs_a_mapping() {
        let ports = Arc::new(SoftPorts::new(1, 16));
        let engine = engine(&ports);
        assert!(matches!(
            engine.launch(false),
            Err(LaunchError::NothingToLaunch)
        ));
    }

    #[test]
    fn launch_skips_main_unless_asked() {
        let ports = Arc::new(SoftPorts::new(1, 16));
        let engine = engine(&ports);
        for cfg in parse_maps(&["[0-1].0"]).unwrap() {
            engine.configure(&cfg).unwrap();
        }
        assert_eq!(engine.launch(false).unwrap(), 1);
        assert_eq!(engine.worker_state(CoreId(0)), WorkerState::Idle);
        assert_ne!(engine.worker_state(CoreId(1)), WorkerState::Idle);
        // already running
        assert_eq!(engine.launch(false).unwrap(), 0);
        assert_eq!(engine.launch(true).unwrap(), 1);

        engine.exit();
        assert_eq!(engine.worker_state(CoreId(0)), WorkerState::Stopped);
        assert_eq!(engine.worker_state(CoreId(1)), WorkerState::Stopped);
        assert!(matches!(engine.launch(true), Err(LaunchError::Exited)));
        assert!(!ports.link_status(PortId(0)).unwrap().up);
    }

    #[test]
    fn port_control_toggles_ports() {
        let ports = Arc::new(SoftPorts::new(3, 16));
        let engine = engine(&ports);
        for cfg in parse_maps(&["1.0", "2.2"]).unwrap() {
            engine.configure(&cfg).unwrap();
        }
        engine.port_control(PortCtlMsg {
            portlist: 0b101,
            enable: false,
        });
        assert!(!ports.link_status(PortId(0)).unwrap().up);
        assert!(!ports.link_status(PortId(2)).unwrap().up);
        engine.port_control(PortCtlMsg {
            portlist: 0b1,
            enable: true,
        });
        assert!(ports.link_status(PortId(0)).unwrap().up);
    }

    #[test]
    fn stop_flags() {
        let ports = Arc::new(SoftPorts::new(1, 16));
        let engine = engine(&ports);
        assert!(!engine.stop_requested(CoreId(4)));
        engine.request_stop(CoreId(4));
        assert!(engine.stop_requested(CoreId(4)));
        assert!(!engine.stop_requested(CoreId(5)));
        // out of range cores never run
        assert!(engine.stop_requested(CoreId(MAX_LCORE)));
        engine.stop_all();
        assert!(engine.stop_requested(CoreId(5)));
    }
}
