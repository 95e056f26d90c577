// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-target incoming-edge tables.
//!
//! Built once at calibration from the staged edge slab: per-target counts
//! are compacted into offsets by the prefix scan, then every edge is
//! scattered into its target's window. Storage is struct-of-arrays, the
//! layout the spike-delivery kernels index by offset.

use crate::scan::PrefixScan;
use neuroweave_structures::{Edge, NodeId, WeaveError, WeaveResult};

/// One target's incoming edges, borrowed out of the SoA storage.
#[derive(Debug, Clone, Copy)]
pub struct IncomingSlice<'a> {
    pub sources: &'a [NodeId],
    pub ports: &'a [u8],
    pub weights: &'a [f32],
    pub delays: &'a [f32],
}

/// Dense incoming-edge tables for the contiguous target block
/// `[base, base + n_targets)`.
#[derive(Debug, Default)]
pub struct IncomingTables {
    base: u32,
    offsets: Vec<u32>,
    sources: Vec<NodeId>,
    ports: Vec<u8>,
    weights: Vec<f32>,
    delays: Vec<f32>,
}

impl IncomingTables {
    /// Fold a staged edge slab into per-target tables. Every edge target
    /// must fall inside the block.
    pub fn build(
        scan: &mut PrefixScan,
        staged: &[Edge],
        base: u32,
        n_targets: u32,
    ) -> WeaveResult<Self> {
        let n = n_targets as usize;
        let mut counts = vec![0u32; n];
        for edge in staged {
            let t = edge.target.0;
            if t < base || t - base >= n_targets {
                return Err(WeaveError::Range(format!(
                    "staged edge targets {} outside the table block [{base}, {})",
                    edge.target,
                    base + n_targets
                )));
            }
            counts[(t - base) as usize] += 1;
        }

        let mut offsets = vec![0u32; n];
        let total = scan.scan(&mut offsets, &counts)?;
        offsets.push(total);

        let total = total as usize;
        let mut tables = Self {
            base,
            offsets,
            sources: vec![NodeId(0); total],
            ports: vec![0; total],
            weights: vec![0.0; total],
            delays: vec![0.0; total],
        };

        // Scatter in staging order; each target's window fills front to back.
        let mut cursor: Vec<u32> = tables.offsets[..n].to_vec();
        for edge in staged {
            let t = (edge.target.0 - base) as usize;
            let slot = cursor[t] as usize;
            cursor[t] += 1;
            tables.sources[slot] = edge.source;
            tables.ports[slot] = edge.port;
            tables.weights[slot] = edge.weight;
            tables.delays[slot] = edge.delay;
        }
        Ok(tables)
    }

    pub fn edge_count(&self) -> usize {
        self.sources.len()
    }

    pub fn n_targets(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Incoming edges of one target node.
    pub fn incoming(&self, target: NodeId) -> WeaveResult<IncomingSlice<'_>> {
        let n = self.n_targets() as u32;
        if target.0 < self.base || target.0 - self.base >= n {
            return Err(WeaveError::Range(format!(
                "{target} outside the table block [{}, {})",
                self.base,
                self.base + n
            )));
        }
        let t = (target.0 - self.base) as usize;
        let (lo, hi) = (self.offsets[t] as usize, self.offsets[t + 1] as usize);
        Ok(IncomingSlice {
            sources: &self.sources[lo..hi],
            ports: &self.ports[lo..hi],
            weights: &self.weights[lo..hi],
            delays: &self.delays[lo..hi],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(s: u32, t: u32, w: f32) -> Edge {
        Edge {
            source: NodeId(s),
            target: NodeId(t),
            port: 0,
            weight: w,
            delay: 1.0,
        }
    }

    #[test]
    fn folds_edges_by_target() {
        let mut scan = PrefixScan::with_capacity(16);
        let staged = vec![edge(0, 2, 0.1), edge(1, 0, 0.2), edge(2, 2, 0.3)];
        let tables = IncomingTables::build(&mut scan, &staged, 0, 4).unwrap();
        assert_eq!(tables.edge_count(), 3);

        let t2 = tables.incoming(NodeId(2)).unwrap();
        assert_eq!(t2.sources, &[NodeId(0), NodeId(2)]);
        assert_eq!(t2.weights, &[0.1, 0.3]);

        let t1 = tables.incoming(NodeId(1)).unwrap();
        assert!(t1.sources.is_empty());
    }

    #[test]
    fn rejects_out_of_block_targets() {
        let mut scan = PrefixScan::with_capacity(16);
        let staged = vec![edge(0, 9, 0.1)];
        assert!(IncomingTables::build(&mut scan, &staged, 0, 4).is_err());
    }

    #[test]
    fn offset_blocks_respect_base() {
        let mut scan = PrefixScan::with_capacity(16);
        let staged = vec![edge(0, 11, 0.5), edge(1, 10, 0.6)];
        let tables = IncomingTables::build(&mut scan, &staged, 10, 2).unwrap();
        assert_eq!(
            tables.incoming(NodeId(10)).unwrap().sources,
            &[NodeId(1)]
        );
        assert!(tables.incoming(NodeId(12)).is_err());
        assert!(tables.incoming(NodeId(9)).is_err());
    }
}
