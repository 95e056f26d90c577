// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Host ownership of the global id space.
//!
//! Every global node id is owned by exactly one host. Ownership is assigned
//! as contiguous ranges that must tile the id space without overlap or gap,
//! so resolution is a binary search over range starts - the same boundary
//! table idiom as the node-group index.

use neuroweave_structures::{HostId, NodeId, NodeSequence, WeaveError, WeaveResult};

/// Immutable host-ownership map.
#[derive(Debug, Clone)]
pub struct HostPartition {
    starts: Vec<u32>,
    owners: Vec<HostId>,
    ranges: Vec<NodeSequence>,
    n_hosts: u32,
    total: u32,
}

impl HostPartition {
    /// Build from per-host ranges. The ranges must tile `[0, total)` in
    /// ascending order; every host id below `n_hosts` may own any number of
    /// ranges (including none).
    pub fn from_ranges(n_hosts: u32, assignments: &[(HostId, NodeSequence)]) -> WeaveResult<Self> {
        let mut sorted: Vec<(HostId, NodeSequence)> = assignments.to_vec();
        sorted.sort_by_key(|(_, seq)| seq.start());

        let mut starts = Vec::with_capacity(sorted.len());
        let mut owners = Vec::with_capacity(sorted.len());
        let mut ranges = Vec::with_capacity(sorted.len());
        let mut next = 0u32;
        for (host, seq) in &sorted {
            if host.0 >= n_hosts {
                return Err(WeaveError::Config(format!(
                    "{host} out of range for a {n_hosts}-host partition"
                )));
            }
            if seq.start().0 != next {
                return Err(WeaveError::Config(format!(
                    "partition ranges must tile the id space: expected start {next}, got {}",
                    seq.start()
                )));
            }
            next = seq.end();
            starts.push(seq.start().0);
            owners.push(*host);
            ranges.push(*seq);
        }
        Ok(Self {
            starts,
            owners,
            ranges,
            n_hosts,
            total: next,
        })
    }

    pub fn n_hosts(&self) -> u32 {
        self.n_hosts
    }

    pub fn total_nodes(&self) -> u32 {
        self.total
    }

    /// Owning host of a global id.
    pub fn owner(&self, id: NodeId) -> WeaveResult<HostId> {
        if id.0 >= self.total {
            return Err(WeaveError::Lookup(id));
        }
        let idx = self.starts.partition_point(|&s| s <= id.0) - 1;
        Ok(self.owners[idx])
    }

    pub fn is_owned_by(&self, id: NodeId, host: HostId) -> bool {
        self.owner(id).map(|h| h == host).unwrap_or(false)
    }

    /// All ranges owned by one host, in id order.
    pub fn ranges_of(&self, host: HostId) -> impl Iterator<Item = NodeSequence> + '_ {
        self.ranges
            .iter()
            .zip(&self.owners)
            .filter(move |(_, owner)| **owner == host)
            .map(|(seq, _)| *seq)
    }

    /// Number of ids owned by one host.
    pub fn owned_count(&self, host: HostId) -> u32 {
        self.ranges_of(host).map(|seq| seq.len() as u32).sum()
    }

    /// First id of a contiguous span not owned by `host`, if any.
    /// Ids beyond the partition count as not owned.
    pub fn first_not_owned(&self, span: NodeSequence, host: HostId) -> Option<NodeId> {
        if span.is_empty() {
            return None;
        }
        if span.end() > self.total {
            return Some(NodeId(span.start().0.max(self.total)));
        }
        let mut pos = span.start().0;
        while pos < span.end() {
            let idx = self.starts.partition_point(|&s| s <= pos) - 1;
            if self.owners[idx] != host {
                return Some(NodeId(pos));
            }
            pos = self.ranges[idx].end();
        }
        None
    }
}
