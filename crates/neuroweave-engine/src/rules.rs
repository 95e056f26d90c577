// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-worker generation kernels and sampling helpers.
//!
//! Every kernel fills one worker's private window of the shared edge slab;
//! the engine hands out disjoint windows from prefix-scan offsets, so no
//! kernel ever synchronizes with another. Kernels draw only from the stream
//! they are given, which makes their output a pure function of
//! `(seed, call, worker index)`.

use crate::rng::DrawStream;
use ahash::AHashSet;
use neuroweave_structures::{Edge, NodeId, Population};

/// Rejection sampling gives up after this many misses per draw and falls
/// back to a partial Fisher-Yates over the remaining candidates.
const REJECT_BUDGET: usize = 32;


/// O(1) membership probe over either population form.
pub enum IdSet {
    Range { start: u32, end: u32 },
    Set(AHashSet<NodeId>),
}

impl IdSet {
    pub fn build(pop: &Population) -> Self {
        match pop {
            Population::Range(seq) => IdSet::Range {
                start: seq.start().0,
                end: seq.end(),
            },
            Population::List(ids) => IdSet::Set(ids.iter().copied().collect()),
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        match self {
            IdSet::Range { start, end } => id.0 >= *start && id.0 < *end,
            IdSet::Set(set) => set.contains(&id),
        }
    }
}

/// Maps a node id back to its position inside a population. Used to exclude
/// the self-candidate when autapses are disallowed.
pub enum PositionLookup {
    Range { start: u32, end: u32 },
    Map(ahash::AHashMap<NodeId, u64>),
}

impl PositionLookup {
    pub fn build(pop: &Population) -> Self {
        match pop {
            Population::Range(seq) => PositionLookup::Range {
                start: seq.start().0,
                end: seq.end(),
            },
            Population::List(ids) => PositionLookup::Map(
                ids.iter()
                    .enumerate()
                    .map(|(i, id)| (*id, i as u64))
                    .collect(),
            ),
        }
    }

    pub fn position_of(&self, id: NodeId) -> Option<u64> {
        match self {
            PositionLookup::Range { start, end } => {
                (id.0 >= *start && id.0 < *end).then(|| u64::from(id.0 - *start))
            }
            PositionLookup::Map(map) => map.get(&id).copied(),
        }
    }
}

/// Draw `k` distinct values from `[0, m)`, never returning `exclude`.
///
/// Caller guarantees `k` does not exceed the number of admissible values.
/// Sparse draws reject against a set with a bounded retry budget; dense
/// draws (or an exhausted budget) switch to a partial Fisher-Yates over the
/// materialized candidates. Both paths consume only the given stream, so
/// the result is reproducible.
pub fn sample_distinct(
    stream: &mut DrawStream,
    m: u64,
    k: usize,
    exclude: Option<u64>,
) -> Vec<u64> {
    let avail = m - u64::from(exclude.is_some());
    debug_assert!(k as u64 <= avail);

    // Dense requests (a third of the candidates or more) reject too often
    // to be worth attempting; shuffle from the start.
    if (k as u64).saturating_mul(3) >= avail {
        return partial_shuffle(stream, m, k, exclude, &AHashSet::new());
    }

    let mut picked: AHashSet<u64> = AHashSet::with_capacity(k);
    let mut order = Vec::with_capacity(k);
    while order.len() < k {
        let mut hit = None;
        for _ in 0..REJECT_BUDGET {
            let v = stream.below(m);
            if Some(v) != exclude && !picked.contains(&v) {
                hit = Some(v);
                break;
            }
        }
        match hit {
            Some(v) => {
                picked.insert(v);
                order.push(v);
            }
            None => {
                // budget exhausted: shuffle out the remainder
                let rest = partial_shuffle(stream, m, k - order.len(), exclude, &picked);
                order.extend(rest);
                break;
            }
        }
    }
    order
}

fn partial_shuffle(
    stream: &mut DrawStream,
    m: u64,
    k: usize,
    exclude: Option<u64>,
    already: &AHashSet<u64>,
) -> Vec<u64> {
    let mut candidates: Vec<u64> = (0..m)
        .filter(|v| Some(*v) != exclude && !already.contains(v))
        .collect();
    let n = candidates.len();
    let take = k.min(n);
    for i in 0..take {
        let j = i + stream.below((n - i) as u64) as usize;
        candidates.swap(i, j);
    }
    candidates.truncate(take);
    candidates
}

/// Draw `k` values from `[0, m)` with replacement, never returning
/// `exclude`. Caller guarantees at least one admissible value exists.
pub fn sample_with_replacement(
    stream: &mut DrawStream,
    m: u64,
    k: usize,
    exclude: Option<u64>,
) -> Vec<u64> {
    (0..k)
        .map(|_| draw_excluding(stream, m, exclude))
        .collect()
}

/// One admissible draw from `[0, total)` under a self-pair predicate.
/// Bounded rejection, then a deterministic linear probe; the caller
/// guarantees at least one admissible index exists.
pub fn draw_admissible(stream: &mut DrawStream, total: u64, is_self: &(impl Fn(u64) -> bool + ?Sized)) -> u64 {
    for _ in 0..REJECT_BUDGET {
        let v = stream.below(total);
        if !is_self(v) {
            return v;
        }
    }
    let mut v = stream.below(total);
    while is_self(v) {
        v = (v + 1) % total;
    }
    v
}

fn draw_excluding(stream: &mut DrawStream, m: u64, exclude: Option<u64>) -> u64 {
    let Some(x) = exclude else {
        return stream.below(m);
    };
    for _ in 0..REJECT_BUDGET {
        let v = stream.below(m);
        if v != x {
            return v;
        }
    }
    // deterministic sidestep; m >= 2 whenever an excluded value exists
    (x + 1) % m
}

/// Draw `n_conn` distinct admissible pair indices from the `[0, ns*nt)`
/// cross-product, skipping self-pairs when `is_self` says so.
///
/// Caller guarantees `n_conn` admissible pairs exist. Insertion order is the
/// draw order, so the result does not depend on hash iteration.
pub fn sample_pairs_distinct(
    stream: &mut DrawStream,
    total: u64,
    n_conn: usize,
    is_self: impl Fn(u64) -> bool,
) -> Vec<u64> {
    let mut picked: AHashSet<u64> = AHashSet::with_capacity(n_conn);
    let mut order = Vec::with_capacity(n_conn);
    let budget = REJECT_BUDGET * n_conn + REJECT_BUDGET;
    let mut attempts = 0usize;
    while order.len() < n_conn {
        let v = stream.below(total);
        if !is_self(v) && !picked.contains(&v) {
            picked.insert(v);
            order.push(v);
            continue;
        }
        attempts += 1;
        if attempts > budget {
            // high rejection rate: materialize what is left and shuffle
            let mut rest: Vec<u64> = (0..total)
                .filter(|v| !is_self(*v) && !picked.contains(v))
                .collect();
            let need = n_conn - order.len();
            let n = rest.len();
            for i in 0..need.min(n) {
                let j = i + stream.below((n - i) as u64) as usize;
                rest.swap(i, j);
            }
            rest.truncate(need);
            order.extend(rest);
            break;
        }
    }
    order
}

/// One all-to-all source worker: an edge to every target, minus the
/// self-pair when autapses are disallowed.
pub fn fill_all_to_all(
    window: &mut [Edge],
    source_id: NodeId,
    target: &Population,
    skip_self: bool,
    port: u8,
) {
    let mut slot = 0;
    for target_id in target.iter() {
        if skip_self && target_id == source_id {
            continue;
        }
        window[slot] = Edge {
            source: source_id,
            target: target_id,
            port,
            weight: 0.0,
            delay: 0.0,
        };
        slot += 1;
    }
    debug_assert_eq!(slot, window.len());
}

/// One fixed-indegree target worker: `k` source draws for one target.
#[allow(clippy::too_many_arguments)]
pub fn fill_fixed_indegree(
    window: &mut [Edge],
    stream: &mut DrawStream,
    source: &Population,
    target_id: NodeId,
    exclude_pos: Option<u64>,
    allow_multapses: bool,
    port: u8,
) {
    let ns = source.len() as u64;
    let picks = if allow_multapses {
        sample_with_replacement(stream, ns, window.len(), exclude_pos)
    } else {
        sample_distinct(stream, ns, window.len(), exclude_pos)
    };
    for (slot, pos) in window.iter_mut().zip(picks) {
        *slot = Edge {
            source: source.at(pos as usize),
            target: target_id,
            port,
            weight: 0.0,
            delay: 0.0,
        };
    }
}

/// One fixed-outdegree source worker: `k` target draws for one source.
#[allow(clippy::too_many_arguments)]
pub fn fill_fixed_outdegree(
    window: &mut [Edge],
    stream: &mut DrawStream,
    source_id: NodeId,
    target: &Population,
    exclude_pos: Option<u64>,
    allow_multapses: bool,
    port: u8,
) {
    let nt = target.len() as u64;
    let picks = if allow_multapses {
        sample_with_replacement(stream, nt, window.len(), exclude_pos)
    } else {
        sample_distinct(stream, nt, window.len(), exclude_pos)
    };
    for (slot, pos) in window.iter_mut().zip(picks) {
        *slot = Edge {
            source: source_id,
            target: target.at(pos as usize),
            port,
            weight: 0.0,
            delay: 0.0,
        };
    }
}

/// Decode linear pair indices (row-major over `ns x nt`) into edges.
pub fn fill_pairs(
    window: &mut [Edge],
    pair_indices: &[u64],
    source: &Population,
    target: &Population,
    nt: u64,
    port: u8,
) {
    for (slot, idx) in window.iter_mut().zip(pair_indices) {
        let i = (idx / nt) as usize;
        let j = (idx % nt) as usize;
        *slot = Edge {
            source: source.at(i),
            target: target.at(j),
            port,
            weight: 0.0,
            delay: 0.0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{StreamDomain, StreamFamily};

    fn stream() -> DrawStream {
        StreamFamily::new(1234).stream(0, StreamDomain::Topology, 0)
    }

    #[test]
    fn distinct_draws_are_distinct_and_admissible() {
        let mut s = stream();
        let picks = sample_distinct(&mut s, 100, 20, Some(5));
        assert_eq!(picks.len(), 20);
        let set: AHashSet<u64> = picks.iter().copied().collect();
        assert_eq!(set.len(), 20);
        assert!(!set.contains(&5));
        assert!(picks.iter().all(|&v| v < 100));
    }

    #[test]
    fn distinct_draws_handle_dense_requests() {
        // k == avail forces the shuffle path
        let mut s = stream();
        let picks = sample_distinct(&mut s, 10, 9, Some(3));
        let set: AHashSet<u64> = picks.iter().copied().collect();
        assert_eq!(set.len(), 9);
        assert!(!set.contains(&3));
    }

    #[test]
    fn replacement_draws_never_hit_exclude() {
        let mut s = stream();
        let picks = sample_with_replacement(&mut s, 2, 200, Some(0));
        assert!(picks.iter().all(|&v| v == 1));
    }

    #[test]
    fn pair_sampling_avoids_diagonal() {
        let mut s = stream();
        // 10x10 grid, diagonal excluded, ask for nearly everything
        let picks = sample_pairs_distinct(&mut s, 100, 85, |idx| idx / 10 == idx % 10);
        assert_eq!(picks.len(), 85);
        let set: AHashSet<u64> = picks.iter().copied().collect();
        assert_eq!(set.len(), 85);
        assert!(picks.iter().all(|&idx| idx / 10 != idx % 10));
    }

    #[test]
    fn sampling_is_reproducible() {
        let fam = StreamFamily::new(777);
        let a = sample_distinct(&mut fam.stream(1, StreamDomain::Topology, 4), 1000, 50, None);
        let b = sample_distinct(&mut fam.stream(1, StreamDomain::Topology, 4), 1000, 50, None);
        assert_eq!(a, b);
    }
}
