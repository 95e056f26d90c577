// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node populations: contiguous id ranges and explicit id lists.
//!
//! `NodeSequence` is the lightweight contiguous-range handle returned by
//! population creation. `Population` unifies the two addressing modes so the
//! generation kernels are written once against an ordered id source instead
//! of once per representation pair.

use crate::error::{WeaveError, WeaveResult};
use crate::ids::NodeId;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Contiguous half-open range of node ids `[start, start+len)`.
///
/// Immutable value type; indexing and slicing are bounds-checked and fail
/// with `WeaveError::Range`, never wrap or clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSequence {
    start: NodeId,
    len: u32,
}

impl NodeSequence {
    pub fn new(start: NodeId, len: u32) -> Self {
        Self { start, len }
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First id past the end of the range.
    pub fn end(&self) -> u32 {
        self.start.0 + self.len
    }

    /// `start + i`, or a range error for a negative or past-the-end offset.
    pub fn get(&self, i: i64) -> WeaveResult<NodeId> {
        if i < 0 {
            return Err(WeaveError::Range(format!(
                "sequence index cannot be negative (got {i})"
            )));
        }
        if i >= i64::from(self.len) {
            return Err(WeaveError::Range(format!(
                "sequence index {i} out of range (len {})",
                self.len
            )));
        }
        Ok(NodeId(self.start.0 + i as u32))
    }

    /// Sub-range covering `[start+first, start+last]` inclusive.
    pub fn subrange(&self, first: i64, last: i64) -> WeaveResult<NodeSequence> {
        if first < 0 || first > last {
            return Err(WeaveError::Range(format!(
                "sequence subset range error (first {first}, last {last})"
            )));
        }
        if last >= i64::from(self.len) {
            return Err(WeaveError::Range(format!(
                "sequence subset out of range (last {last}, len {})",
                self.len
            )));
        }
        Ok(NodeSequence {
            start: NodeId(self.start.0 + first as u32),
            len: (last - first + 1) as u32,
        })
    }

    /// Explicit ordered id list `start..start+len`.
    pub fn materialize(&self) -> Vec<NodeId> {
        (self.start.0..self.end()).map(NodeId).collect()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 >= self.start.0 && id.0 < self.end()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        (self.start.0..self.end()).map(NodeId)
    }
}

/// One side of a connect call: a contiguous range or an explicit id list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Population {
    Range(NodeSequence),
    List(Vec<NodeId>),
}

impl Population {
    pub fn len(&self) -> usize {
        match self {
            Population::Range(seq) => seq.len(),
            Population::List(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id at position `i`. Positions handed to the kernels are always in
    /// range; out-of-range here is a caller bug, not a user error.
    pub fn at(&self, i: usize) -> NodeId {
        match self {
            Population::Range(seq) => NodeId(seq.start().0 + i as u32),
            Population::List(ids) => ids[i],
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        match self {
            Population::Range(seq) => seq.contains(id),
            Population::List(ids) => ids.contains(&id),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = NodeId> + '_> {
        match self {
            Population::Range(seq) => Box::new(seq.iter()),
            Population::List(ids) => Box::new(ids.iter().copied()),
        }
    }

    /// Largest id in the population, if any. Used for registry bounds checks.
    pub fn max_id(&self) -> Option<NodeId> {
        match self {
            Population::Range(seq) => {
                (!seq.is_empty()).then(|| NodeId(seq.end() - 1))
            }
            Population::List(ids) => ids.iter().copied().max(),
        }
    }

    /// True if the explicit-list form carries a duplicate id.
    pub fn has_duplicates(&self) -> bool {
        match self {
            Population::Range(_) => false,
            Population::List(ids) => {
                let mut seen = AHashSet::with_capacity(ids.len());
                ids.iter().any(|id| !seen.insert(*id))
            }
        }
    }

    /// Number of ids present in both populations (the autapse candidates of
    /// a connect call).
    pub fn overlap_count(&self, other: &Population) -> usize {
        match (self, other) {
            (Population::Range(a), Population::Range(b)) => {
                let lo = a.start().0.max(b.start().0);
                let hi = a.end().min(b.end());
                hi.saturating_sub(lo) as usize
            }
            _ => {
                // Probe the smaller side against a set of the larger one.
                let (small, large) = if self.len() <= other.len() {
                    (self, other)
                } else {
                    (other, self)
                };
                let set: AHashSet<NodeId> = large.iter().collect();
                small.iter().filter(|id| set.contains(id)).count()
            }
        }
    }
}

impl From<NodeSequence> for Population {
    fn from(seq: NodeSequence) -> Self {
        Population::Range(seq)
    }
}

impl From<Vec<NodeId>> for Population {
    fn from(ids: Vec<NodeId>) -> Self {
        Population::List(ids)
    }
}
