//! Zone worker threads.
//!
//! Each worker owns its zone's valve controller. It commits a stage's node
//! masks, confirms them by read-back, and reports an ack or a fault to the
//! coordinator inbox.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};
use vg_core::ZoneId;
use vg_schedule::NodeCommit;

use crate::coordinator::Inbox;
use crate::error::{ExecError, ExecResult};
use crate::hw::{HwFault, ValveController};

#[derive(Debug)]
pub(crate) enum ZoneMsg {
    Commit {
        run: u64,
        layer: u32,
        stage: u32,
        attempt: u32,
        commits: Vec<NodeCommit>,
    },
    CloseAll,
    Shutdown,
}

pub(crate) struct ZoneWorker {
    pub zone: ZoneId,
    pub tx: Sender<ZoneMsg>,
    handle: Option<JoinHandle<()>>,
}

impl ZoneWorker {
    pub fn spawn(
        zone: ZoneId,
        controller: Arc<dyn ValveController>,
        inbox: Sender<Inbox>,
    ) -> ExecResult<Self> {
        let (tx, rx) = channel();
        let handle = thread::Builder::new()
            .name(format!("vg-zone-{zone}"))
            .spawn(move || worker_loop(zone, controller.as_ref(), &rx, &inbox))
            .map_err(|e| ExecError::Spawn {
                what: e.to_string(),
            })?;
        Ok(Self {
            zone,
            tx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, msg: ZoneMsg) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// Ask the worker to exit and wait for it.
    pub fn stop(&mut self) {
        let _ = self.tx.send(ZoneMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn commit(controller: &dyn ValveController, commits: &[NodeCommit]) -> Result<(), HwFault> {
    for c in commits {
        let ack = controller.set_batch(c.node, c.mask)?;
        if ack.node != c.node || ack.mask != c.mask {
            return Err(HwFault::at(c.node, format!("acknowledged {} for {}", ack.mask, c.mask)));
        }
    }
    for c in commits {
        let state = controller.read_back(c.node)?;
        if state != c.mask {
            return Err(HwFault::at(
                c.node,
                format!("read back {state} after commanding {}", c.mask),
            ));
        }
    }
    Ok(())
}

fn worker_loop(
    zone: ZoneId,
    controller: &dyn ValveController,
    rx: &Receiver<ZoneMsg>,
    inbox: &Sender<Inbox>,
) {
    while let Ok(msg) = rx.recv() {
        match msg {
            ZoneMsg::Commit {
                run,
                layer,
                stage,
                attempt,
                commits,
            } => {
                let reply = match commit(controller, &commits) {
                    Ok(()) => {
                        debug!(%zone, layer, stage, attempt, nodes = commits.len(), "zone committed");
                        Inbox::ZoneAck { zone, run, stage }
                    }
                    Err(fault) => {
                        warn!(%zone, layer, stage, %fault, "zone commit failed");
                        Inbox::ZoneFault {
                            zone,
                            run,
                            stage,
                            fault,
                        }
                    }
                };
                if inbox.send(reply).is_err() {
                    break;
                }
            }
            ZoneMsg::CloseAll => {
                if let Err(fault) = controller.close_all() {
                    warn!(%zone, %fault, "close_all failed");
                }
            }
            ZoneMsg::Shutdown => break,
        }
    }
    debug!(%zone, "zone worker exiting");
}
