// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::{CoreId, L2pError, LPortId, MAX_LCORE, Mode};
use port::{MAX_ETHPORTS, PortId, QueueId};
use std::fmt::{Display, Formatter};
use tracing::{debug, error, info};

/// One mapping request: bind `core` to `port` through the given queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2pConfig {
    pub lport_id: LPortId,
    pub core: CoreId,
    pub mode: Mode,
    pub rx_qid: QueueId,
    pub tx_qid: QueueId,
    pub port: PortId,
    pub rx_queues: u16,
    pub tx_queues: u16,
}

/// Queue counts of a port, fixed by the first mapping that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalPort {
    pub port: PortId,
    pub rx_queues: u16,
    pub tx_queues: u16,
}

/// The queues a core uses on its port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalPort {
    pub lport_id: LPortId,
    pub port: PortId,
    pub rx_qid: QueueId,
    pub tx_qid: QueueId,
}

/// Mapping of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreEntry {
    pub core: CoreId,
    pub mode: Mode,
    pub lport: Option<LogicalPort>,
}

/// Core and port records, indexed by id.
///
/// An unassigned slot is `None`, so an unconfigured core or port never reads as id 0.
/// The table is written during setup and read by workers once they are launched; it is up to
/// the owner to make configuration happen before launch.
#[derive(Debug, Clone)]
pub struct L2pTable {
    cores: Vec<Option<CoreEntry>>,
    ports: Vec<Option<PhysicalPort>>,
}

impl Default for L2pTable {
    fn default() -> Self {
        L2pTable {
            cores: vec![None; usize::from(MAX_LCORE)],
            ports: vec![None; usize::from(MAX_ETHPORTS)],
        }
    }
}

impl L2pTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(cfg: &L2pConfig) -> Result<(usize, usize), L2pError> {
        if !cfg.core.in_range() {
            error!("invalid core id {}", cfg.core);
            return Err(L2pError::InvalidCore(cfg.core));
        }
        if !cfg.port.in_range() {
            error!("invalid port id {}", cfg.port);
            return Err(L2pError::InvalidPort(cfg.port));
        }
        Ok((cfg.core.index(), cfg.port.index()))
    }

    /// Returns true if `cfg` references a port no mapping has referenced yet, meaning the
    /// device has to be brought up before [`L2pTable::configure`] records it.
    pub fn needs_bring_up(&self, cfg: &L2pConfig) -> Result<bool, L2pError> {
        let (_, pidx) = Self::validate(cfg)?;
        Ok(self.ports[pidx].is_none())
    }

    /// Record a mapping. The first mapping that references a port fixes its queue counts.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn configure(&mut self, cfg: &L2pConfig) -> Result<(), L2pError> {
        let (cidx, pidx) = Self::validate(cfg)?;
        if self.ports[pidx].is_none() {
            self.ports[pidx] = Some(PhysicalPort {
                port: cfg.port,
                rx_queues: cfg.rx_queues,
                tx_queues: cfg.tx_queues,
            });
            debug!(
                "port {}: {} rx / {} tx queues",
                cfg.port, cfg.rx_queues, cfg.tx_queues
            );
        }
        self.cores[cidx] = Some(CoreEntry {
            core: cfg.core,
            mode: cfg.mode,
            lport: Some(LogicalPort {
                lport_id: cfg.lport_id,
                port: cfg.port,
                rx_qid: cfg.rx_qid,
                tx_qid: cfg.tx_qid,
            }),
        });
        info!(
            "core {} -> port {} mode {} rxq {} txq {}",
            cfg.core, cfg.port, cfg.mode, cfg.rx_qid, cfg.tx_qid
        );
        Ok(())
    }

    /// Forget the mapping of `core`, if any.
    pub fn unassign(&mut self, core: CoreId) {
        if let Some(slot) = self.cores.get_mut(core.index()) {
            *slot = None;
        }
    }

    /// Mapping of `core`, if any.
    #[must_use]
    pub fn core(&self, core: CoreId) -> Option<&CoreEntry> {
        self.cores.get(core.index()).and_then(Option::as_ref)
    }

    /// Record of `port`, if any mapping references it.
    #[must_use]
    pub fn port(&self, port: PortId) -> Option<&PhysicalPort> {
        self.ports.get(port.index()).and_then(Option::as_ref)
    }

    /// Configured cores, by ascending id.
    pub fn cores(&self) -> impl Iterator<Item = &CoreEntry> {
        self.cores.iter().flatten()
    }

    /// Referenced ports, by ascending id.
    pub fn ports(&self) -> impl Iterator<Item = &PhysicalPort> {
        self.ports.iter().flatten()
    }

    /// Printable view of the mapping of `core`. Unconfigured and out of range cores are fine.
    #[must_use]
    pub fn dump(&self, core: CoreId) -> CoreDump<'_> {
        CoreDump { table: self, core }
    }
}

/// See [`L2pTable::dump`].
pub struct CoreDump<'a> {
    table: &'a L2pTable,
    core: CoreId,
}

impl Display for CoreDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Logical Core {}", self.core)?;
        let Some(entry) = self.table.core(self.core) else {
            writeln!(f, "   Logical Port : none")?;
            return writeln!(f, "   Mode         : {}", Mode::Unknown);
        };
        writeln!(f, "   Logical Port : present")?;
        writeln!(f, "   Mode         : {}", entry.mode)?;
        writeln!(f, "   Core ID      : {}", entry.core)?;
        if let Some(lport) = &entry.lport {
            let physical = self.table.port(lport.port);
            writeln!(
                f,
                "   Physical Port: {}",
                if physical.is_some() { "present" } else { "none" }
            )?;
            writeln!(f, "   Rx Queue ID  : {}", lport.rx_qid)?;
            writeln!(f, "   Tx Queue ID  : {}", lport.tx_qid)?;
            if let Some(physical) = physical {
                writeln!(f, "   Port ID      : {}", physical.port)?;
                writeln!(f, "   Num Rx Queues: {}", physical.rx_queues)?;
                writeln!(f, "   Num Tx Queues: {}", physical.tx_queues)?;
            }
        }
        Ok(())
    }
}

impl Display for L2pConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "L2P Config {}", self.core)?;
        writeln!(f, "   Logical Port : {}", self.lport_id)?;
        writeln!(f, "   Mode         : {}", self.mode)?;
        writeln!(f, "   RxQid        : {}", self.rx_qid)?;
        writeln!(f, "   TxQid        : {}", self.tx_qid)?;
        writeln!(f, "   Port ID      : {}", self.port)?;
        writeln!(f, "   Num Rx Queues: {}", self.rx_queues)?;
        writeln!(f, "   Num Tx Queues: {}", self.tx_queues)
    }
}

impl Display for L2pTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " ━━━━━━━━━━━━━━━━━━━━ L2P ━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            " {:>5} {:<8} {:>5} {:>8} {:>4} {:>4}",
            "core", "mode", "port", "lport", "rxq", "txq"
        )?;
        for entry in self.cores() {
            match &entry.lport {
                Some(lport) => writeln!(
                    f,
                    " {:>5} {:<8} {:>5} {:>8} {:>4} {:>4}",
                    entry.core.0,
                    entry.mode.to_string(),
                    lport.port.0,
                    lport.lport_id.to_string(),
                    lport.rx_qid.0,
                    lport.tx_qid.0
                )?,
                None => writeln!(f, " {:>5} {:<8}", entry.core.0, entry.mode.to_string())?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{L2pConfig, L2pTable};
    use crate::{CoreId, L2pError, LPortId, MAX_LCORE, Mode};
    use port::{MAX_ETHPORTS, PortId, QueueId};
    use pretty_assertions::assert_eq;

    fn config(core: u16, port: u16, mode: Mode, rxq: u16, txq: u16) -> L2pConfig {
        L2pConfig {
            lport_id: LPortId::new(PortId(port), QueueId(rxq)),
            core: CoreId(core),
            mode,
            rx_qid: QueueId(rxq),
            tx_qid: QueueId(txq),
            port: PortId(port),
            rx_queues: 2,
            tx_queues: 1,
        }
    }

    #[test]
    fn configure_then_dump() {
        let mut table = L2pTable::new();
        table.configure(&config(5, 2, Mode::RxOnly, 1, 0)).unwrap();
        let entry = table.core(CoreId(5)).unwrap();
        assert_eq!(entry.mode, Mode::RxOnly);
        let lport = entry.lport.unwrap();
        assert_eq!(lport.port, PortId(2));
        assert_eq!(lport.rx_qid, QueueId(1));

        let dump = table.dump(CoreId(5)).to_string();
        assert!(dump.contains("Mode         : RxOnly"), "{dump}");
        assert!(dump.contains("Port ID      : 2"), "{dump}");
        assert!(dump.contains("Rx Queue ID  : 1"), "{dump}");
        assert!(dump.contains("Tx Queue ID  : 0"), "{dump}");
    }

    #[test]
    fn out_of_range_leaves_nothing() {
        let mut table = L2pTable::new();
        assert_eq!(
            table.configure(&config(MAX_LCORE, 2, Mode::RxOnly, 0, 0)),
            Err(L2pError::InvalidCore(CoreId(MAX_LCORE)))
        );
        assert_eq!(
            table.configure(&config(1, MAX_ETHPORTS, Mode::RxOnly, 0, 0)),
            Err(L2pError::InvalidPort(PortId(MAX_ETHPORTS)))
        );
        assert_eq!(table.cores().count(), 0);
        assert_eq!(table.ports().count(), 0);
        assert!(table.port(PortId(2)).is_none());
    }

    #[test]
    fn unconfigured_core_is_not_core_zero() {
        let mut table = L2pTable::new();
        table.configure(&config(0, 0, Mode::RxTx, 0, 0)).unwrap();
        assert!(table.core(CoreId(1)).is_none());
        assert!(table.core(CoreId(MAX_LCORE + 10)).is_none());
        let dump = table.dump(CoreId(9)).to_string();
        assert!(dump.contains("Logical Port : none"));
    }

    #[test]
    fn port_is_recorded_once() {
        let mut table = L2pTable::new();
        let first = config(1, 0, Mode::RxOnly, 0, 0);
        assert!(table.needs_bring_up(&first).unwrap());
        table.configure(&first).unwrap();
        let mut second = config(2, 0, Mode::TxOnly, 0, 0);
        second.rx_queues = 8;
        assert!(!table.needs_bring_up(&second).unwrap());
        table.configure(&second).unwrap();
        // queue counts come from the first mapping
        assert_eq!(table.port(PortId(0)).unwrap().rx_queues, 2);
        assert_eq!(
            table.needs_bring_up(&config(1, MAX_ETHPORTS, Mode::RxOnly, 0, 0)),
            Err(L2pError::InvalidPort(PortId(MAX_ETHPORTS)))
        );
    }

    #[test]
    fn unassign_keeps_the_port() {
        let mut table = L2pTable::new();
        table.configure(&config(3, 1, Mode::RxTx, 0, 0)).unwrap();
        table.unassign(CoreId(3));
        table.unassign(CoreId(MAX_LCORE + 1));
        assert!(table.core(CoreId(3)).is_none());
        assert!(table.port(PortId(1)).is_some());
    }

    #[test]
    fn table_display() {
        let mut table = L2pTable::new();
        table.configure(&config(2, 1, Mode::RxTx, 0, 0)).unwrap();
        let text = table.to_string();
        assert!(text.contains("Rx/Tx"));
        assert!(text.contains("00010000"));
        assert!(config(2, 1, Mode::RxTx, 0, 0).to_string().starts_with("L2P Config 2"));
    }
}
