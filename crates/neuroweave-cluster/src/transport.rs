// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Blocking, bounded host-to-host messaging.
//!
//! The coordination protocol only needs two primitives: send a message to a
//! peer and block until a message from a peer arrives. Buffers are bounded;
//! a full channel is a capacity failure at the sender, never a silent grow
//! or drop. Messages cross the wire as bincode frames even in the in-memory
//! implementation, so a real network transport slots in without touching
//! the coordinator.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use neuroweave_structures::{Edge, HostId, WeaveError, WeaveResult};
use serde::{Deserialize, Serialize};

use crate::coordinator::SpikeEvent;

/// Everything that crosses host boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Edges generated on the source host for targets the receiver owns.
    EdgeBatch { call: u64, edges: Vec<Edge> },
    /// One step's outgoing spikes for the receiver.
    SpikePacket { step: u64, spikes: Vec<SpikeEvent> },
}

/// Host-to-host messaging surface.
pub trait ClusterTransport: Send {
    fn local_host(&self) -> HostId;
    fn n_hosts(&self) -> u32;

    /// Deliver a message to a peer. Fails with a capacity error when the
    /// peer's inbound buffer is full.
    fn send(&self, to: HostId, msg: &ClusterMessage) -> WeaveResult<()>;

    /// Block until the next message from `from` arrives.
    fn recv(&self, from: HostId) -> WeaveResult<ClusterMessage>;
}

/// One host's endpoint of an in-process cluster.
///
/// A full mesh of bounded byte channels: `links[p]` carries frames from
/// peer `p` to this host.
pub struct InMemoryCluster {
    local: HostId,
    n_hosts: u32,
    senders: Vec<Option<Sender<Vec<u8>>>>,
    receivers: Vec<Option<Receiver<Vec<u8>>>>,
}

impl InMemoryCluster {
    /// Build a fully connected hub of `n_hosts` endpoints with per-link
    /// buffer depth `depth` (messages, not bytes).
    pub fn hub(n_hosts: u32, depth: usize) -> Vec<InMemoryCluster> {
        let n = n_hosts as usize;
        // lane [from][to]; the sender half goes to `from`, the receiver
        // half to `to`.
        let mut tx: Vec<Vec<Option<Sender<Vec<u8>>>>> = vec![(0..n).map(|_| None).collect(); n];
        let mut rx: Vec<Vec<Option<Receiver<Vec<u8>>>>> = vec![(0..n).map(|_| None).collect(); n];
        for from in 0..n {
            for to in 0..n {
                if from != to {
                    let (s, r) = bounded(depth);
                    tx[from][to] = Some(s);
                    rx[from][to] = Some(r);
                }
            }
        }

        (0..n)
            .map(|me| InMemoryCluster {
                local: HostId(me as u32),
                n_hosts,
                senders: std::mem::take(&mut tx[me]),
                receivers: (0..n).map(|from| rx[from][me].take()).collect(),
            })
            .collect()
    }

    fn lane_to(&self, to: HostId) -> WeaveResult<&Sender<Vec<u8>>> {
        self.senders
            .get(to.0 as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| WeaveError::Transport(format!("no link from {} to {to}", self.local)))
    }

    fn lane_from(&self, from: HostId) -> WeaveResult<&Receiver<Vec<u8>>> {
        self.receivers
            .get(from.0 as usize)
            .and_then(|r| r.as_ref())
            .ok_or_else(|| WeaveError::Transport(format!("no link from {from} to {}", self.local)))
    }
}

impl ClusterTransport for InMemoryCluster {
    fn local_host(&self) -> HostId {
        self.local
    }

    fn n_hosts(&self) -> u32 {
        self.n_hosts
    }

    fn send(&self, to: HostId, msg: &ClusterMessage) -> WeaveResult<()> {
        let frame = bincode::serialize(msg)
            .map_err(|e| WeaveError::Transport(format!("encode for {to}: {e}")))?;
        match self.lane_to(to)?.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(WeaveError::Capacity {
                what: "transport channel",
                needed: 1,
                capacity: 0,
            }),
            Err(TrySendError::Disconnected(_)) => Err(WeaveError::Transport(format!(
                "{to} disconnected"
            ))),
        }
    }

    fn recv(&self, from: HostId) -> WeaveResult<ClusterMessage> {
        let frame = self
            .lane_from(from)?
            .recv()
            .map_err(|_| WeaveError::Transport(format!("{from} disconnected")))?;
        bincode::deserialize(&frame)
            .map_err(|e| WeaveError::Transport(format!("decode from {from}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuroweave_structures::NodeId;

    #[test]
    fn frames_round_trip_between_hosts() {
        let mut hub = InMemoryCluster::hub(2, 4);
        let h1 = hub.pop().unwrap();
        let h0 = hub.pop().unwrap();

        let msg = ClusterMessage::EdgeBatch {
            call: 3,
            edges: vec![Edge {
                source: NodeId(1),
                target: NodeId(2),
                port: 0,
                weight: 0.5,
                delay: 1.0,
            }],
        };
        h0.send(HostId(1), &msg).unwrap();
        match h1.recv(HostId(0)).unwrap() {
            ClusterMessage::EdgeBatch { call, edges } => {
                assert_eq!(call, 3);
                assert_eq!(edges.len(), 1);
                assert_eq!(edges[0].target, NodeId(2));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn full_channel_is_a_capacity_error_not_a_block() {
        let mut hub = InMemoryCluster::hub(2, 1);
        let _h1 = hub.pop().unwrap();
        let h0 = hub.pop().unwrap();

        let msg = ClusterMessage::SpikePacket {
            step: 0,
            spikes: Vec::new(),
        };
        h0.send(HostId(1), &msg).unwrap();
        let err = h0.send(HostId(1), &msg).unwrap_err();
        assert!(matches!(err, WeaveError::Capacity { .. }));
    }

    #[test]
    fn self_links_do_not_exist() {
        let mut hub = InMemoryCluster::hub(2, 1);
        let _h1 = hub.pop().unwrap();
        let h0 = hub.pop().unwrap();
        let msg = ClusterMessage::SpikePacket {
            step: 0,
            spikes: Vec::new(),
        };
        assert!(matches!(
            h0.send(HostId(0), &msg),
            Err(WeaveError::Transport(_))
        ));
    }
}
