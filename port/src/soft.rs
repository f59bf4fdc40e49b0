// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! In-memory ports, fed by [`SoftPorts::inject`].

use crate::{
    DeviceInfo, EtherStats, LinkStatus, MAX_ETHPORTS, Packet, PacketBatch, PortError, PortId,
    PortSubsystem, QueueId,
};
use crossbeam::queue::ArrayQueue;
use net::Mac;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace, warn};

const MAX_QUEUES: u16 = 16;
const SOFT_SPEED_MBPS: u32 = 10_000;
const SOFT_MTU: u16 = 1500;

#[derive(Default)]
struct PortState {
    rx: Vec<ArrayQueue<Packet>>,
    tx_queues: u16,
    started: bool,
    promiscuous: bool,
}

struct SoftPort {
    id: PortId,
    mac: Mac,
    state: RwLock<PortState>,
    ipackets: AtomicU64,
    ibytes: AtomicU64,
    imissed: AtomicU64,
    released: AtomicU64,
}

/// A [`PortSubsystem`] whose receive queues are bounded in-memory queues.
///
/// Packets are placed on a queue with [`SoftPorts::inject`] and come out of
/// [`PortSubsystem::packet_burst`] in the same order.
pub struct SoftPorts {
    ports: Vec<SoftPort>,
    queue_depth: usize,
}

impl SoftPorts {
    /// Create `count` ports (at most [`MAX_ETHPORTS`]) whose receive queues hold
    /// `queue_depth` packets each.
    #[must_use]
    pub fn new(count: u16, queue_depth: usize) -> SoftPorts {
        let count = count.min(MAX_ETHPORTS);
        let ports = (0..count)
            .map(|pid| {
                let [hi, lo] = pid.to_be_bytes();
                SoftPort {
                    id: PortId(pid),
                    mac: Mac([0x02, 0, 0, 0, hi, lo]),
                    state: RwLock::new(PortState::default()),
                    ipackets: AtomicU64::new(0),
                    ibytes: AtomicU64::new(0),
                    imissed: AtomicU64::new(0),
                    released: AtomicU64::new(0),
                }
            })
            .collect();
        SoftPorts {
            ports,
            queue_depth: queue_depth.max(1),
        }
    }

    fn port(&self, port: PortId) -> Result<&SoftPort, PortError> {
        self.ports
            .get(port.index())
            .ok_or(PortError::InvalidPort(port))
    }

    /// Queue a packet for reception on `port` / `queue`.
    ///
    /// A full queue drops the packet and counts it as missed.
    pub fn inject(&self, port: PortId, queue: QueueId, packet: Packet) -> Result<(), PortError> {
        let soft = self.port(port)?;
        let state = soft.state.read();
        if state.rx.is_empty() {
            return Err(PortError::NotConfigured(port));
        }
        let rxq = state
            .rx
            .get(usize::from(queue.0))
            .ok_or(PortError::QueueOutOfRange { port, queue })?;
        rxq.push(packet).map_err(|_| {
            soft.imissed.fetch_add(1, Ordering::Relaxed);
            PortError::QueueFull { port, queue }
        })
    }

    /// Packets handed back through [`PortSubsystem::release`] for `port`.
    pub fn released(&self, port: PortId) -> Result<u64, PortError> {
        Ok(self.port(port)?.released.load(Ordering::Relaxed))
    }

    /// Returns true if `port` was put in promiscuous mode.
    pub fn is_promiscuous(&self, port: PortId) -> Result<bool, PortError> {
        Ok(self.port(port)?.state.read().promiscuous)
    }

    /// Packets waiting on `port` / `queue`.
    pub fn pending(&self, port: PortId, queue: QueueId) -> Result<usize, PortError> {
        let state = self.port(port)?.state.read();
        state
            .rx
            .get(usize::from(queue.0))
            .map(ArrayQueue::len)
            .ok_or(PortError::QueueOutOfRange { port, queue })
    }
}

impl PortSubsystem for SoftPorts {
    fn configure(&self, port: PortId, rx_queues: u16, tx_queues: u16) -> Result<(), PortError> {
        let soft = self.port(port)?;
        if rx_queues == 0 || tx_queues == 0 || rx_queues > MAX_QUEUES || tx_queues > MAX_QUEUES {
            return Err(PortError::InvalidQueueCount {
                port,
                rx: rx_queues,
                tx: tx_queues,
            });
        }
        let mut state = soft.state.write();
        state.rx = (0..rx_queues)
            .map(|_| ArrayQueue::new(self.queue_depth))
            .collect();
        state.tx_queues = tx_queues;
        state.started = true;
        info!("port {port}: {rx_queues} rx / {tx_queues} tx queues, mac {}", soft.mac);
        Ok(())
    }

    fn packet_burst(
        &self,
        port: PortId,
        queue: QueueId,
        max: usize,
    ) -> Result<PacketBatch, PortError> {
        let soft = self.port(port)?;
        let state = soft.state.read();
        if state.rx.is_empty() {
            return Err(PortError::NotConfigured(port));
        }
        let rxq = state
            .rx
            .get(usize::from(queue.0))
            .ok_or(PortError::QueueOutOfRange { port, queue })?;
        let mut packets = Vec::new();
        if state.started {
            while packets.len() < max {
                let Some(packet) = rxq.pop() else { break };
                soft.ibytes
                    .fetch_add(packet.len() as u64, Ordering::Relaxed);
                packets.push(packet);
            }
            soft.ipackets
                .fetch_add(packets.len() as u64, Ordering::Relaxed);
        }
        if !packets.is_empty() {
            trace!("port {port} queue {queue}: received {}", packets.len());
        }
        Ok(PacketBatch::new(port, queue, packets))
    }

    fn release(&self, batch: PacketBatch) {
        match self.port(batch.port()) {
            Ok(soft) => {
                soft.released
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
            Err(e) => warn!("release of batch: {e}"),
        }
    }

    fn start(&self, port: PortId) -> Result<(), PortError> {
        let mut state = self.port(port)?.state.write();
        if state.rx.is_empty() {
            return Err(PortError::NotConfigured(port));
        }
        state.started = true;
        debug!("port {port} started");
        Ok(())
    }

    fn stop(&self, port: PortId) -> Result<(), PortError> {
        let mut state = self.port(port)?.state.write();
        if state.rx.is_empty() {
            return Err(PortError::NotConfigured(port));
        }
        state.started = false;
        debug!("port {port} stopped");
        Ok(())
    }

    fn close(&self, port: PortId) -> Result<(), PortError> {
        let mut state = self.port(port)?.state.write();
        *state = PortState::default();
        debug!("port {port} closed");
        Ok(())
    }

    fn set_promiscuous(&self, port: PortId, enable: bool) -> Result<(), PortError> {
        let mut state = self.port(port)?.state.write();
        if state.rx.is_empty() {
            return Err(PortError::NotConfigured(port));
        }
        state.promiscuous = enable;
        debug!("port {port} promiscuous {enable}");
        Ok(())
    }

    fn ports(&self) -> Vec<PortId> {
        self.ports.iter().map(|soft| soft.id).collect()
    }

    fn mac_address(&self, port: PortId) -> Result<Mac, PortError> {
        Ok(self.port(port)?.mac)
    }

    fn link_status(&self, port: PortId) -> Result<LinkStatus, PortError> {
        let up = self.port(port)?.state.read().started;
        Ok(LinkStatus {
            speed_mbps: if up { SOFT_SPEED_MBPS } else { 0 },
            full_duplex: up,
            autoneg: up,
            up,
        })
    }

    fn device_info(&self, port: PortId) -> Result<DeviceInfo, PortError> {
        let soft = self.port(port)?;
        let state = soft.state.read();
        let nb_rx_queues = u16::try_from(state.rx.len()).unwrap_or(u16::MAX);
        Ok(DeviceInfo {
            name: format!("net_soft{}", port.0),
            bus_name: "vdev".to_string(),
            mac: soft.mac,
            if_index: 0,
            min_mtu: 68,
            max_mtu: SOFT_MTU,
            max_rx_pktlen: u32::from(SOFT_MTU) + 18,
            max_rx_queues: MAX_QUEUES,
            max_tx_queues: MAX_QUEUES,
            nb_rx_queues,
            nb_tx_queues: state.tx_queues,
            socket_id: 0,
        })
    }

    fn ether_stats(&self, port: PortId) -> Result<EtherStats, PortError> {
        let soft = self.port(port)?;
        Ok(EtherStats {
            ipackets: soft.ipackets.load(Ordering::Relaxed),
            ibytes: soft.ibytes.load(Ordering::Relaxed),
            imissed: soft.imissed.load(Ordering::Relaxed),
            ierrors: 0,
            rx_nombuf: 0,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::SoftPorts;
    use crate::{Packet, PortError, PortId, PortSubsystem, QueueId};
    use net::Mac;

    fn frame(tag: u8) -> Packet {
        Packet::new(vec![tag; 64])
    }

    #[test]
    fn burst_preserves_order() {
        let ports = SoftPorts::new(2, 8);
        ports.configure(PortId(1), 2, 1).unwrap();
        for tag in 0..5 {
            ports.inject(PortId(1), QueueId(1), frame(tag)).unwrap();
        }
        let batch = ports.packet_burst(PortId(1), QueueId(1), 3).unwrap();
        let tags: Vec<_> = batch.packets().iter().map(|p| p.data()[0]).collect();
        assert_eq!(tags, vec![0, 1, 2]);
        ports.release(batch);
        assert_eq!(ports.released(PortId(1)).unwrap(), 3);
        assert_eq!(ports.pending(PortId(1), QueueId(1)).unwrap(), 2);
        assert!(ports.packet_burst(PortId(1), QueueId(0), 3).unwrap().is_empty());
    }

    #[test]
    fn full_queue_counts_missed() {
        let ports = SoftPorts::new(1, 1);
        ports.configure(PortId(0), 1, 1).unwrap();
        ports.inject(PortId(0), QueueId(0), frame(0)).unwrap();
        assert_eq!(
            ports.inject(PortId(0), QueueId(0), frame(1)),
            Err(PortError::QueueFull {
                port: PortId(0),
                queue: QueueId(0)
            })
        );
        assert_eq!(ports.ether_stats(PortId(0)).unwrap().imissed, 1);
    }

    #[test]
    fn lifecycle() {
        let ports = SoftPorts::new(1, 4);
        let port = PortId(0);
        assert_eq!(
            ports.packet_burst(port, QueueId(0), 1).unwrap_err(),
            PortError::NotConfigured(port)
        );
        assert!(ports.configure(port, 0, 1).is_err());
        assert_eq!(
            ports.set_promiscuous(port, true),
            Err(PortError::NotConfigured(port))
        );
        ports.configure(port, 1, 1).unwrap();
        assert!(ports.link_status(port).unwrap().up);
        assert!(!ports.is_promiscuous(port).unwrap());
        ports.set_promiscuous(port, true).unwrap();
        assert!(ports.is_promiscuous(port).unwrap());

        ports.inject(port, QueueId(0), frame(9)).unwrap();
        ports.stop(port).unwrap();
        assert!(!ports.link_status(port).unwrap().up);
        assert!(ports.packet_burst(port, QueueId(0), 4).unwrap().is_empty());
        ports.start(port).unwrap();
        assert_eq!(ports.packet_burst(port, QueueId(0), 4).unwrap().len(), 1);

        ports.close(port).unwrap();
        assert_eq!(ports.stop(port), Err(PortError::NotConfigured(port)));
        assert_eq!(
            ports.mac_address(PortId(3)),
            Err(PortError::InvalidPort(PortId(3)))
        );
    }

    #[test]
    fn introspection() {
        let ports = SoftPorts::new(40, 4);
        assert_eq!(ports.ports().len(), 32);
        ports.configure(PortId(5), 3, 2).unwrap();
        let info = ports.device_info(PortId(5)).unwrap();
        assert_eq!(info.name, "net_soft5");
        assert_eq!(info.nb_rx_queues, 3);
        assert_eq!(info.nb_tx_queues, 2);
        assert_eq!(info.mac, Mac([0x02, 0, 0, 0, 0, 5]));
        assert_eq!(ports.mac_address(PortId(5)).unwrap(), info.mac);
    }
}
