// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Parser for core to port maps.
//!
//! ```text
//! map     := cores "." port
//! cores   := [ "[" | "{" ] list [ ":" list ] [ "]" | "}" ]
//! list    := range { ("/" | ",") range }
//! range   := num [ "-" num ]
//! ```
//!
//! With a single list every core receives and transmits on the port. With two lists, the
//! cores of the first receive and the cores of the second transmit. Queue ids are handed out
//! in order, per port and per direction. A port can appear in one map only and a core can
//! serve one port only.
//!
//! | map           | meaning                                                  |
//! |---------------|----------------------------------------------------------|
//! | `1.0`         | core 1 receives and transmits on port 0                  |
//! | `[2/4-5].1`   | cores 2, 4 and 5 receive and transmit on port 1           |
//! | `[1:2-3].0`   | core 1 receives on port 0, cores 2 and 3 transmit on it   |

use crate::{CoreId, L2pConfig, LPortId, MAX_LCORE, Mode};
use ordermap::OrderMap;
use port::{MAX_ETHPORTS, PortId, QueueId};
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MapError {
    #[error("invalid map '{0}': expected <cores>.<port>")]
    Format(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("port {0} is already mapped")]
    PortInUse(PortId),
    #[error("invalid core range '{0}'")]
    InvalidRange(String),
    #[error("core {0} is out of range")]
    InvalidCore(u32),
    #[error("core {0} is already mapped")]
    CoreInUse(CoreId),
}

#[derive(Debug)]
struct Assignment {
    mode: Mode,
    rx_qid: Option<QueueId>,
    tx_qid: Option<QueueId>,
}

#[derive(Debug, Default)]
struct PortPlan {
    rx_queues: u16,
    tx_queues: u16,
    cores: OrderMap<CoreId, Assignment>,
}

impl PortPlan {
    fn next_rx(&mut self) -> QueueId {
        let qid = QueueId(self.rx_queues);
        self.rx_queues += 1;
        qid
    }

    fn next_tx(&mut self) -> QueueId {
        let qid = QueueId(self.tx_queues);
        self.tx_queues += 1;
        qid
    }
}

#[derive(Default)]
struct Planner {
    ports: OrderMap<PortId, PortPlan>,
    owners: OrderMap<CoreId, PortId>,
}

fn parse_range(text: &str) -> Result<(u32, u32), MapError> {
    let invalid = || MapError::InvalidRange(text.to_string());
    let number = |s: &str| s.trim().parse::<u32>().map_err(|_| invalid());
    let (low, high) = match text.split_once('-') {
        Some((low, high)) => (number(low)?, number(high)?),
        None => {
            let core = number(text)?;
            (core, core)
        }
    };
    if low > high {
        return Err(invalid());
    }
    if high >= u32::from(MAX_LCORE) {
        return Err(MapError::InvalidCore(high));
    }
    Ok((low, high))
}

impl Planner {
    fn assign(&mut self, port: PortId, list: &str, mode: Mode) -> Result<(), MapError> {
        for item in list.split(['/', ',']) {
            let (low, high) = parse_range(item)?;
            for raw in low..=high {
                #[allow(clippy::cast_possible_truncation)] // bounded by MAX_LCORE
                let core = CoreId(raw as u16);
                if self.owners.get(&core).is_some_and(|owner| *owner != port) {
                    return Err(MapError::CoreInUse(core));
                }
                self.owners.insert(core, port);
                let plan = self.ports.entry(port).or_default();
                match plan.cores.get(&core).map(|existing| existing.mode) {
                    None => {
                        let rx_qid = mode.receives().then(|| plan.next_rx());
                        let tx_qid = (mode != Mode::RxOnly).then(|| plan.next_tx());
                        plan.cores.insert(
                            core,
                            Assignment {
                                mode,
                                rx_qid,
                                tx_qid,
                            },
                        );
                    }
                    // listed as a receiver and as a transmitter of the same port
                    Some(Mode::RxOnly) if mode == Mode::TxOnly => {
                        let tx_qid = plan.next_tx();
                        if let Some(existing) = plan.cores.get_mut(&core) {
                            existing.mode = Mode::RxTx;
                            existing.tx_qid = Some(tx_qid);
                        }
                    }
                    Some(_) => return Err(MapError::CoreInUse(core)),
                }
            }
        }
        Ok(())
    }

    fn add(&mut self, map: &str) -> Result<(), MapError> {
        debug!("processing map {map:?}");
        let fields: Vec<_> = map.trim().split('.').collect();
        let [cores, port] = fields.as_slice() else {
            return Err(MapError::Format(map.to_string()));
        };
        let cores = cores.trim_matches(['[', ']', '{', '}']);
        let port = match port.trim().parse::<u16>() {
            Ok(pid) if pid < MAX_ETHPORTS => PortId(pid),
            _ => return Err(MapError::InvalidPort((*port).to_string())),
        };
        if self.ports.contains_key(&port) {
            return Err(MapError::PortInUse(port));
        }
        self.ports.insert(port, PortPlan::default());

        let lists: Vec<_> = cores.split(':').collect();
        match lists.as_slice() {
            [rx, tx] => {
                self.assign(port, rx, Mode::RxOnly)?;
                self.assign(port, tx, Mode::TxOnly)
            }
            [both] => self.assign(port, both, Mode::RxTx),
            _ => Err(MapError::Format(map.to_string())),
        }
    }

    fn configs(&self) -> Vec<L2pConfig> {
        let mut configs = Vec::new();
        for (port, plan) in &self.ports {
            for (core, assignment) in &plan.cores {
                let rx_qid = assignment.rx_qid.unwrap_or_default();
                let tx_qid = assignment.tx_qid.unwrap_or_default();
                let lport_qid = if assignment.mode.receives() {
                    rx_qid
                } else {
                    tx_qid
                };
                configs.push(L2pConfig {
                    lport_id: LPortId::new(*port, lport_qid),
                    core: *core,
                    mode: assignment.mode,
                    rx_qid,
                    tx_qid,
                    port: *port,
                    rx_queues: plan.rx_queues,
                    tx_queues: plan.tx_queues,
                });
            }
        }
        configs
    }
}

/// Turn a set of maps into one mapping record per core.
///
/// Records come out grouped by port, in the order the maps were given.
pub fn parse_maps<S: AsRef<str>>(maps: &[S]) -> Result<Vec<L2pConfig>, MapError> {
    let mut planner = Planner::default();
    for map in maps {
        planner.add(map.as_ref())?;
    }
    Ok(planner.configs())
}
