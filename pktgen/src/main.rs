// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]

use args::{CmdArgs, Parser};
use engine::{EngineConfig, Frame, Pktgen, StartupConfig};
use etherparse::{EtherType, Ethernet2Header};
use l2p::{CoreId, parse_maps};
use port::{Packet, PortError, QueueId, SoftPorts};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use tracectl::LevelFilter;
use tracing::{debug, error, info, warn};

const SOFT_QUEUE_DEPTH: usize = 1024;
const TRAFFIC_INTERVAL: Duration = Duration::from_millis(100);
/// Shortest Ethernet frame, FCS excluded.
const MIN_FRAME_LEN: usize = 60;

/// Minimum size broadcast IPv4 frame, enough to exercise the receive path.
fn sample_frame() -> Packet {
    let header = Ethernet2Header {
        source: [0x02, 0, 0, 0, 0, 0x01],
        destination: [0xff; 6],
        ether_type: EtherType::IPV4,
    };
    let mut data = header.to_bytes().to_vec();
    data.resize(MIN_FRAME_LEN, 0);
    Packet::new(data)
}

/// Put one copy of `frame` on every receive queue of every mapped port. Returns how many were
/// queued.
fn inject_traffic(pktgen: &Pktgen, ports: &SoftPorts, frame: &Packet) -> usize {
    let mut injected = 0;
    for physical in pktgen.engine().l2p().ports() {
        for qid in 0..physical.rx_queues {
            match ports.inject(physical.port, QueueId(qid), frame.clone()) {
                Ok(()) => injected += 1,
                Err(PortError::QueueFull { .. }) => {}
                Err(e) => debug!("inject on port {}: {e}", physical.port),
            }
        }
    }
    injected
}

/// Stop requests from ctrl-c.
///
/// The sender stays here next to the receiver, so the receiver never sees a disconnect, even
/// when no handler could be installed.
struct StopSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl StopSignal {
    fn new() -> StopSignal {
        let (tx, rx) = channel();
        StopSignal { tx, rx }
    }

    fn install(&self) -> Result<(), ctrlc::Error> {
        let tx = self.tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(());
        })
    }

    /// Wait up to `timeout` for a stop request.
    fn wait(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

fn startup_config(args: &CmdArgs) -> StartupConfig {
    StartupConfig {
        log_path: args.log().cloned(),
        channel_size: args.channel_size(),
        poll_interval: Duration::from_millis(args.poll_interval_ms()),
        require_root: args.require_root(),
        engine: EngineConfig {
            main_core: CoreId(args.main_core()),
            burst: usize::from(args.burst()),
            promiscuous: args.promiscuous(),
        },
        ..StartupConfig::default()
    }
}

fn report(pktgen: &Pktgen) {
    let engine = pktgen.engine();
    let table = engine.l2p();
    println!("{table}");
    for physical in table.ports() {
        match engine.port_stats(physical.port) {
            Ok(stats) => println!("port {}\n{stats}", physical.port),
            Err(e) => error!("port {} stats: {e}", physical.port),
        }
    }
}

fn main() {
    let args = CmdArgs::parse();
    tracectl::init(if args.verbose() {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    });

    let arg_list = match args.arg_list("pktgen") {
        Ok(list) => list,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let ports = Arc::new(SoftPorts::new(args.ports(), SOFT_QUEUE_DEPTH));
    let mut pktgen = match Pktgen::startup(startup_config(&args), ports.clone(), &arg_list) {
        Ok(pktgen) => pktgen,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    let configs = match parse_maps(args.maps()) {
        Ok(configs) => configs,
        Err(e) => {
            error!("{e}");
            pktgen.shutdown();
            std::process::exit(1);
        }
    };
    for cfg in &configs {
        if let Err(e) = pktgen.engine().configure(cfg) {
            error!("{e}");
            pktgen.shutdown();
            std::process::exit(1);
        }
    }

    let stop = StopSignal::new();
    if let Err(e) = stop.install() {
        error!("failed to set SIGINT handler: {e}");
    }

    if let Err(e) = pktgen.send(Frame::launch(args.call_main())) {
        error!("launch: {e}");
    }
    let deadline = args
        .run_for_ms()
        .map(|ms| Instant::now() + Duration::from_millis(ms));
    let frame = sample_frame();
    let mut injected = 0;
    info!("feeding sample traffic, ctrl-c to stop");
    loop {
        injected += inject_traffic(&pktgen, &ports, &frame);
        if stop.wait(TRAFFIC_INTERVAL) {
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
    }

    info!("stopping after {injected} injected frames");
    match pktgen.send(Frame::exit()) {
        Ok(()) => {
            if !pktgen.wait(Duration::from_secs(5)) {
                warn!("data plane did not stop in time");
            }
        }
        Err(e) => error!("exit: {e}"),
    }
    report(&pktgen);
    pktgen.shutdown();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{MIN_FRAME_LEN, StopSignal, sample_frame};
    use etherparse::{EtherType, Ethernet2HeaderSlice};
    use std::time::Duration;

    #[test]
    fn sample_frame_is_minimum_size_broadcast() {
        let frame = sample_frame();
        assert_eq!(frame.len(), MIN_FRAME_LEN);
        let header = Ethernet2HeaderSlice::from_slice(frame.data()).unwrap();
        assert_eq!(header.destination(), [0xff; 6]);
        assert_eq!(header.ether_type(), EtherType::IPV4);
    }

    #[test]
    fn stop_needs_a_request() {
        // no handler installed
        let stop = StopSignal::new();
        assert!(!stop.wait(Duration::from_millis(5)));
        stop.tx.send(()).unwrap();
        assert!(stop.wait(Duration::from_millis(5)));
        assert!(!stop.wait(Duration::ZERO));
    }
}
