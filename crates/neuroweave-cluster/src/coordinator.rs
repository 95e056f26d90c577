// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cross-host connection building and per-step spike exchange.
//!
//! SPMD discipline: every host runs the same build script and calls every
//! `remote_connect` statement. The host owning the sources generates the
//! edges and ships them to the host owning the targets; hosts that take no
//! part in a call still advance their connect-sequence counter so stream
//! derivation stays identical everywhere. After calibration each host holds
//! only the incoming tables of the nodes it owns.
//!
//! Spike exchange is blocking with bounded buffers: every host sends one
//! packet to every peer per step (empty when nothing fired their way) and
//! then blocks on one packet from every peer. Exceeding a configured
//! capacity is fatal to the run; truncation would silently corrupt results.

use crate::partition::HostPartition;
use crate::transport::{ClusterMessage, ClusterTransport};
use ahash::AHashMap;
use neuroweave_engine::{partition_mut, PrefixScan, SimulationContext};
use neuroweave_structures::{
    ConnSpec, HostId, NodeId, NodeSequence, Population, SynSpec, WeaveError, WeaveResult,
};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One emitted spike: the firing node and its emission height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeEvent {
    pub source: NodeId,
    pub height: f32,
}

impl Default for SpikeEvent {
    fn default() -> Self {
        Self {
            source: NodeId(0),
            height: 0.0,
        }
    }
}

/// Distributed counterpart of the connection engine.
pub struct RemoteConnectionCoordinator<T: ClusterTransport> {
    ctx: SimulationContext,
    partition: HostPartition,
    transport: T,
    /// Per peer host: local source nodes with at least one edge onto that
    /// host. Routes outgoing spikes at run time.
    remote_out: AHashMap<u32, RoaringBitmap>,
    /// Owned contiguous block, cached from the partition.
    local_block: NodeSequence,
    scan: PrefixScan,
    step: u64,
}

impl<T: ClusterTransport> RemoteConnectionCoordinator<T> {
    /// Wrap a local context for a distributed run.
    ///
    /// Each host must own exactly one contiguous id range; the incoming
    /// tables of a host are a single dense block.
    pub fn new(ctx: SimulationContext, partition: HostPartition, transport: T) -> WeaveResult<Self> {
        if transport.n_hosts() != partition.n_hosts() {
            return Err(WeaveError::Config(format!(
                "transport spans {} hosts but the partition {}",
                transport.n_hosts(),
                partition.n_hosts()
            )));
        }
        let local = transport.local_host();
        let mut owned = partition.ranges_of(local);
        let local_block = owned.next().unwrap_or(NodeSequence::new(NodeId(0), 0));
        if owned.next().is_some() {
            return Err(WeaveError::Config(format!(
                "{local} owns a fragmented id range; one contiguous block per host"
            )));
        }
        drop(owned);
        let n_hosts = partition.n_hosts() as usize;
        Ok(Self {
            ctx,
            partition,
            transport,
            remote_out: AHashMap::new(),
            local_block,
            scan: PrefixScan::with_capacity(n_hosts),
            step: 0,
        })
    }

    pub fn ctx(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut SimulationContext {
        &mut self.ctx
    }

    pub fn partition(&self) -> &HostPartition {
        &self.partition
    }

    pub fn local_host(&self) -> HostId {
        self.transport.local_host()
    }

    fn fail<V>(&self, err: WeaveError) -> WeaveResult<V> {
        Err(self.ctx.record_error(err))
    }

    fn check_host(&self, host: HostId) -> WeaveResult<()> {
        if host.0 >= self.partition.n_hosts() {
            return Err(WeaveError::Config(format!(
                "{host} does not exist in a {}-host run",
                self.partition.n_hosts()
            )));
        }
        Ok(())
    }

    /// Every id of `pop` must be owned by `host`.
    fn check_owned(&self, pop: &Population, host: HostId) -> WeaveResult<()> {
        let offending = match pop {
            Population::Range(seq) => self.partition.first_not_owned(*seq, host),
            Population::List(ids) => ids
                .iter()
                .find(|id| !self.partition.is_owned_by(**id, host))
                .copied(),
        };
        match offending {
            Some(node) => Err(WeaveError::Ownership { node, host }),
            None => Ok(()),
        }
    }

    /// Single-host connect under the SPMD discipline: the owning host
    /// builds the edges, every other host only advances its counter.
    pub fn connect(
        &mut self,
        source: impl Into<Population>,
        target: impl Into<Population>,
        conn: &ConnSpec,
        syn: &SynSpec,
    ) -> WeaveResult<usize> {
        let source = source.into();
        let target = target.into();
        let owner = match source.iter().chain(target.iter()).next() {
            Some(id) => match self.partition.owner(id) {
                Ok(host) => host,
                Err(e) => return self.fail(e),
            },
            None => self.local_host(),
        };
        if let Err(e) = self
            .check_owned(&source, owner)
            .and_then(|_| self.check_owned(&target, owner))
        {
            // populations spanning hosts belong to remote_connect
            return self.fail(e);
        }
        if owner == self.local_host() {
            self.ctx.connect(source, target, conn, syn)
        } else {
            self.ctx.skip_call()?;
            Ok(0)
        }
    }

    /// Cross-host connect. Returns the edge count on the generating and
    /// owning hosts, zero on bystanders.
    pub fn remote_connect(
        &mut self,
        source_host: HostId,
        source: impl Into<Population>,
        target_host: HostId,
        target: impl Into<Population>,
        conn: &ConnSpec,
        syn: &SynSpec,
    ) -> WeaveResult<usize> {
        let source = source.into();
        let target = target.into();
        if let Err(e) = self.check_host(source_host).and_then(|_| self.check_host(target_host)) {
            return self.fail(e);
        }
        if let Err(e) = self
            .check_owned(&source, source_host)
            .and_then(|_| self.check_owned(&target, target_host))
        {
            return self.fail(e);
        }

        let local = self.local_host();
        if source_host == target_host {
            return if source_host == local {
                self.ctx.connect(source, target, conn, syn)
            } else {
                self.ctx.skip_call()?;
                Ok(0)
            };
        }

        if local == source_host {
            // generating side: build, route, ship
            let edges = self.ctx.generate_edges(&source, &target, conn, syn)?;
            let routes = self.remote_out.entry(target_host.0).or_default();
            for edge in &edges {
                routes.insert(edge.source.0);
            }
            let n = edges.len();
            let call = self.ctx.calls_issued() - 1;
            debug!(
                target: "neuroweave-cluster",
                call,
                edges = n,
                to = %target_host,
                "shipping edge batch"
            );
            if let Err(e) = self
                .transport
                .send(target_host, &ClusterMessage::EdgeBatch { call, edges })
            {
                return self.fail(e);
            }
            Ok(n)
        } else if local == target_host {
            // owning side: receive and fold into the local staging slab
            self.ctx.skip_call()?;
            let msg = match self.transport.recv(source_host) {
                Ok(msg) => msg,
                Err(e) => return self.fail(e),
            };
            let ClusterMessage::EdgeBatch { edges, call } = msg else {
                return self.fail(WeaveError::Transport(format!(
                    "expected an edge batch from {source_host}"
                )));
            };
            for edge in &edges {
                if !self.partition.is_owned_by(edge.target, local) {
                    return self.fail(WeaveError::Ownership {
                        node: edge.target,
                        host: local,
                    });
                }
            }
            let n = edges.len();
            debug!(
                target: "neuroweave-cluster",
                call,
                edges = n,
                from = %source_host,
                "folding received edge batch"
            );
            self.ctx.stage_edges(edges)?;
            Ok(n)
        } else {
            // bystander: neither endpoint is ours, nothing is materialized
            self.ctx.skip_call()?;
            Ok(0)
        }
    }

    /// Freeze and fold the locally owned block.
    pub fn calibrate(&mut self) -> WeaveResult<()> {
        if self.partition.total_nodes() != self.ctx.index().total_nodes() {
            return self.fail(WeaveError::Config(format!(
                "partition covers {} ids but {} are registered",
                self.partition.total_nodes(),
                self.ctx.index().total_nodes()
            )));
        }
        let block = self.local_block;
        self.ctx
            .calibrate_block(block.start().0, block.len() as u32)?;
        info!(
            target: "neuroweave-cluster",
            host = %self.local_host(),
            owned = block.len(),
            peers = self.remote_out.len(),
            "host calibrated"
        );
        Ok(())
    }

    /// Exchange one step's spikes with every peer host.
    ///
    /// Outgoing events are routed to the peers that hold edges from the
    /// firing node; the merged remote events destined for this host are
    /// returned. Exceeding `max_spike_num` or `max_spike_per_host` is fatal.
    pub fn exchange_spikes(&mut self, fired: &[SpikeEvent]) -> WeaveResult<Vec<SpikeEvent>> {
        self.ctx.advance_step()?;
        let step = self.step;
        self.step += 1;

        let buffers = &self.ctx.config().buffers;
        if fired.len() > buffers.max_spike_num {
            return self.fail(WeaveError::Capacity {
                what: "spike buffer",
                needed: fired.len(),
                capacity: buffers.max_spike_num,
            });
        }

        let n_hosts = self.partition.n_hosts() as usize;
        let local = self.local_host();

        // per-host routed counts -> offsets -> packed send buffer
        let mut counts = vec![0u32; n_hosts];
        for event in fired {
            for (host, routes) in &self.remote_out {
                if routes.contains(event.source.0) {
                    counts[*host as usize] += 1;
                }
            }
        }
        let max_per_host = buffers.max_spike_per_host;
        for (host, &count) in counts.iter().enumerate() {
            if count as usize > max_per_host {
                tracing::error!(
                    target: "neuroweave-cluster",
                    host,
                    count,
                    capacity = max_per_host,
                    "per-host spike buffer overflow"
                );
                return self.fail(WeaveError::Capacity {
                    what: "per-host spike buffer",
                    needed: count as usize,
                    capacity: max_per_host,
                });
            }
        }

        let mut offsets = vec![0u32; n_hosts];
        let total = self.scan.scan(&mut offsets, &counts)?;
        let mut packed = vec![SpikeEvent::default(); total as usize];
        {
            let mut windows = partition_mut(&mut packed, &offsets);
            let mut cursors = vec![0usize; n_hosts];
            for event in fired {
                for (host, routes) in &self.remote_out {
                    if routes.contains(event.source.0) {
                        let h = *host as usize;
                        windows[h][cursors[h]] = *event;
                        cursors[h] += 1;
                    }
                }
            }
        }

        // everyone sends to everyone, then everyone receives from everyone
        for h in 0..n_hosts as u32 {
            let to = HostId(h);
            if to == local {
                continue;
            }
            let (lo, hi) = (
                offsets[h as usize] as usize,
                if (h as usize) + 1 < n_hosts {
                    offsets[h as usize + 1] as usize
                } else {
                    total as usize
                },
            );
            let packet = ClusterMessage::SpikePacket {
                step,
                spikes: packed[lo..hi].to_vec(),
            };
            if let Err(e) = self.transport.send(to, &packet) {
                return self.fail(e);
            }
        }

        let mut merged = Vec::new();
        for h in 0..n_hosts as u32 {
            let from = HostId(h);
            if from == local {
                continue;
            }
            let msg = match self.transport.recv(from) {
                Ok(msg) => msg,
                Err(e) => return self.fail(e),
            };
            let ClusterMessage::SpikePacket { step: got, spikes } = msg else {
                return self.fail(WeaveError::Transport(format!(
                    "expected a spike packet from {from}"
                )));
            };
            if got != step {
                return self.fail(WeaveError::Transport(format!(
                    "step mismatch from {from}: got {got}, expected {step}"
                )));
            }
            merged.extend(spikes);
        }
        Ok(merged)
    }
}
