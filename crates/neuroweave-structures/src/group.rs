// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node-group registry: heterogeneous populations in one flat id space.
//!
//! Groups are created once at population-creation time and never resized.
//! The index grows append-only while the network is under construction and
//! is frozen at calibration; every connect call resolves its ids here before
//! any edge is admitted.

use crate::error::{WeaveError, WeaveResult};
use crate::ids::{GroupId, NodeId};
use crate::sequence::NodeSequence;

/// Per-node parameter storage owned by a group.
///
/// Allocated once at group creation; the engine never grows it. Neuron-model
/// kernels index into it, the connectivity layer only carries the handle.
#[derive(Debug, Clone)]
pub struct ParamStore {
    values: Vec<f32>,
    stride: usize,
}

impl ParamStore {
    pub fn zeroed(capacity: usize, stride: usize) -> Self {
        Self {
            values: vec![0.0; capacity * stride],
            stride,
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.stride..(i + 1) * self.stride]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.values[i * self.stride..(i + 1) * self.stride]
    }
}

/// A homogeneous population of nodes of one model kind.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    model: String,
    capacity: u32,
    n_ports: u8,
    params: ParamStore,
}

impl NodeGroup {
    pub fn new(model: impl Into<String>, capacity: u32, n_ports: u8, param_stride: usize) -> Self {
        Self {
            model: model.into(),
            capacity,
            n_ports,
            params: ParamStore::zeroed(capacity as usize, param_stride),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn n_ports(&self) -> u8 {
        self.n_ports
    }

    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }
}

/// Monotonically-growing map from global id ranges to groups.
///
/// `boundaries[i]` is the first global id of group `i`; groups are assigned
/// consecutive ranges in registration order, so resolution is a binary
/// search over the boundary table.
#[derive(Debug, Default)]
pub struct NodeGroupIndex {
    boundaries: Vec<u32>,
    groups: Vec<NodeGroup>,
    total: u32,
    frozen: bool,
}

impl NodeGroupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total number of registered node ids.
    pub fn total_nodes(&self) -> u32 {
        self.total
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Append a group, assigning it the next contiguous global id range.
    pub fn register(&mut self, group: NodeGroup) -> WeaveResult<NodeSequence> {
        if self.frozen {
            return Err(WeaveError::State(
                "cannot register node groups after calibration".into(),
            ));
        }
        let start = self.total;
        let len = group.capacity();
        self.boundaries.push(start);
        self.total += len;
        self.groups.push(group);
        Ok(NodeSequence::new(NodeId(start), len))
    }

    /// Resolve a global id into (group, in-group offset).
    pub fn resolve(&self, id: NodeId) -> WeaveResult<(GroupId, u32)> {
        if id.0 >= self.total {
            return Err(WeaveError::Lookup(id));
        }
        // partition_point returns the first boundary > id, hence -1.
        let idx = self.boundaries.partition_point(|&b| b <= id.0) - 1;
        Ok((GroupId(idx as u32), id.0 - self.boundaries[idx]))
    }

    pub fn group(&self, id: GroupId) -> Option<&NodeGroup> {
        self.groups.get(id.0 as usize)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut NodeGroup> {
        self.groups.get_mut(id.0 as usize)
    }

    /// Freeze the index. Registration afterwards is a state error.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(sizes: &[u32]) -> NodeGroupIndex {
        let mut index = NodeGroupIndex::new();
        for (i, &n) in sizes.iter().enumerate() {
            index
                .register(NodeGroup::new(format!("model{i}"), n, 1, 0))
                .unwrap();
        }
        index
    }

    #[test]
    fn registration_assigns_consecutive_ranges() {
        let mut index = NodeGroupIndex::new();
        let a = index.register(NodeGroup::new("iaf", 10, 1, 0)).unwrap();
        let b = index.register(NodeGroup::new("aeif", 5, 2, 0)).unwrap();
        assert_eq!(a.start(), NodeId(0));
        assert_eq!(b.start(), NodeId(10));
        assert_eq!(index.total_nodes(), 15);
    }

    #[test]
    fn resolve_finds_group_and_offset() {
        let index = index_with(&[10, 5, 20]);
        assert_eq!(index.resolve(NodeId(0)).unwrap(), (GroupId(0), 0));
        assert_eq!(index.resolve(NodeId(9)).unwrap(), (GroupId(0), 9));
        assert_eq!(index.resolve(NodeId(10)).unwrap(), (GroupId(1), 0));
        assert_eq!(index.resolve(NodeId(14)).unwrap(), (GroupId(1), 4));
        assert_eq!(index.resolve(NodeId(34)).unwrap(), (GroupId(2), 19));
    }

    #[test]
    fn resolve_rejects_unregistered_ids() {
        let index = index_with(&[10]);
        assert!(matches!(
            index.resolve(NodeId(10)),
            Err(WeaveError::Lookup(NodeId(10)))
        ));
    }

    #[test]
    fn registration_after_freeze_is_a_state_error() {
        let mut index = index_with(&[10]);
        index.freeze();
        let err = index
            .register(NodeGroup::new("iaf", 1, 1, 0))
            .unwrap_err();
        assert!(matches!(err, WeaveError::State(_)));
        // previously registered groups untouched
        assert_eq!(index.total_nodes(), 10);
    }
}
