// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The connection engine: one generic algorithm family over any combination
//! of range/list populations.
//!
//! Generation follows a single discipline for every rule: compute one count
//! per worker, compact the counts into write offsets with the prefix scan,
//! split the preallocated edge slab into disjoint per-worker windows, and
//! let every worker fill its window from its own random stream. Weight and
//! delay synthesis runs as a second pass over fixed-size chunks of the slab
//! so value draws are also scheduler-independent.

use crate::rng::{StreamDomain, StreamFamily};
use crate::rules::{self, IdSet, PositionLookup};
use crate::scan::{partition_mut, PrefixScan};
use ahash::AHashSet;
use neuroweave_structures::{
    ConnRule, ConnSpec, Edge, GroupId, NodeGroupIndex, NodeId, Population, SynSpec, ValueSpec,
    WeaveError, WeaveResult,
};
use rayon::prelude::*;
use tracing::debug;

/// Chunk granularity for value synthesis and fixed-total-number workers.
/// Part of the reproducibility contract: changing it changes which stream
/// draws which edge.
const WORKER_CHUNK: usize = 1024;

enum Field {
    Weight,
    Delay,
}

/// Generic edge generator (single host).
pub struct ConnectionEngine {
    streams: StreamFamily,
    scan: PrefixScan,
}

impl ConnectionEngine {
    pub fn new(seed: u64, scan_capacity: usize) -> Self {
        Self {
            streams: StreamFamily::new(seed),
            scan: PrefixScan::with_capacity(scan_capacity),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.streams.reseed(seed);
    }

    pub fn streams(&self) -> &StreamFamily {
        &self.streams
    }

    pub fn scan_mut(&mut self) -> &mut PrefixScan {
        &mut self.scan
    }

    /// Generate the concrete edge set for one connect call.
    ///
    /// `call` is the connect-sequence number; it keys the random streams, so
    /// callers must hand out a fresh value per call and keep the numbering
    /// identical across hosts.
    pub fn generate(
        &mut self,
        index: &NodeGroupIndex,
        source: &Population,
        target: &Population,
        conn: &ConnSpec,
        syn: &SynSpec,
        call: u64,
    ) -> WeaveResult<Vec<Edge>> {
        validate_call(index, source, target, conn, syn)?;

        let mut slab = match conn.rule {
            ConnRule::OneToOne => self.gen_one_to_one(source, target, syn.port)?,
            ConnRule::AllToAll => self.gen_all_to_all(source, target, conn, syn.port)?,
            ConnRule::FixedIndegree { k } => {
                self.gen_fixed_indegree(source, target, conn, k, syn.port, call)?
            }
            ConnRule::FixedOutdegree { k } => {
                self.gen_fixed_outdegree(source, target, conn, k, syn.port, call)?
            }
            ConnRule::FixedTotalNumber { n } => {
                self.gen_fixed_total(source, target, conn, n, syn.port, call)?
            }
        };

        self.apply_values(&mut slab, &syn.weight, Field::Weight, call)?;
        self.apply_values(&mut slab, &syn.delay, Field::Delay, call)?;

        debug!(
            target: "neuroweave-engine",
            rule = conn.rule.name(),
            edges = slab.len(),
            call,
            "generated edge set"
        );
        Ok(slab)
    }

    /// counts -> offsets -> empty slab, the shared front half of every rule.
    fn layout(&mut self, counts: &[u32]) -> WeaveResult<(Vec<u32>, Vec<Edge>)> {
        let mut offsets = vec![0u32; counts.len()];
        let total = self.scan.scan(&mut offsets, counts)?;
        Ok((offsets, vec![Edge::default(); total as usize]))
    }

    fn gen_one_to_one(
        &mut self,
        source: &Population,
        target: &Population,
        port: u8,
    ) -> WeaveResult<Vec<Edge>> {
        let counts = vec![1u32; source.len()];
        let (offsets, mut slab) = self.layout(&counts)?;
        partition_mut(&mut slab, &offsets)
            .into_par_iter()
            .enumerate()
            .for_each(|(i, window)| {
                window[0] = Edge {
                    source: source.at(i),
                    target: target.at(i),
                    port,
                    weight: 0.0,
                    delay: 0.0,
                };
            });
        Ok(slab)
    }

    fn gen_all_to_all(
        &mut self,
        source: &Population,
        target: &Population,
        conn: &ConnSpec,
        port: u8,
    ) -> WeaveResult<Vec<Edge>> {
        let skip_self = !conn.allow_autapses;
        let target_set = skip_self.then(|| IdSet::build(target));
        let nt = target.len() as u32;
        let counts: Vec<u32> = (0..source.len())
            .map(|i| match &target_set {
                Some(set) if set.contains(source.at(i)) => nt - 1,
                _ => nt,
            })
            .collect();
        let (offsets, mut slab) = self.layout(&counts)?;
        partition_mut(&mut slab, &offsets)
            .into_par_iter()
            .enumerate()
            .for_each(|(i, window)| {
                rules::fill_all_to_all(window, source.at(i), target, skip_self, port);
            });
        Ok(slab)
    }

    fn gen_fixed_indegree(
        &mut self,
        source: &Population,
        target: &Population,
        conn: &ConnSpec,
        k: u32,
        port: u8,
        call: u64,
    ) -> WeaveResult<Vec<Edge>> {
        let counts = vec![k; target.len()];
        let (offsets, mut slab) = self.layout(&counts)?;
        let lookup = (!conn.allow_autapses).then(|| PositionLookup::build(source));
        let streams = self.streams;
        let allow_multapses = conn.allow_multapses;
        partition_mut(&mut slab, &offsets)
            .into_par_iter()
            .enumerate()
            .for_each(|(j, window)| {
                let target_id = target.at(j);
                let exclude = lookup.as_ref().and_then(|l| l.position_of(target_id));
                let mut stream = streams.stream(call, StreamDomain::Topology, j as u64);
                rules::fill_fixed_indegree(
                    window,
                    &mut stream,
                    source,
                    target_id,
                    exclude,
                    allow_multapses,
                    port,
                );
            });
        Ok(slab)
    }

    fn gen_fixed_outdegree(
        &mut self,
        source: &Population,
        target: &Population,
        conn: &ConnSpec,
        k: u32,
        port: u8,
        call: u64,
    ) -> WeaveResult<Vec<Edge>> {
        let counts = vec![k; source.len()];
        let (offsets, mut slab) = self.layout(&counts)?;
        let lookup = (!conn.allow_autapses).then(|| PositionLookup::build(target));
        let streams = self.streams;
        let allow_multapses = conn.allow_multapses;
        partition_mut(&mut slab, &offsets)
            .into_par_iter()
            .enumerate()
            .for_each(|(i, window)| {
                let source_id = source.at(i);
                let exclude = lookup.as_ref().and_then(|l| l.position_of(source_id));
                let mut stream = streams.stream(call, StreamDomain::Topology, i as u64);
                rules::fill_fixed_outdegree(
                    window,
                    &mut stream,
                    source_id,
                    target,
                    exclude,
                    allow_multapses,
                    port,
                );
            });
        Ok(slab)
    }

    fn gen_fixed_total(
        &mut self,
        source: &Population,
        target: &Population,
        conn: &ConnSpec,
        n_conn: u64,
        port: u8,
        call: u64,
    ) -> WeaveResult<Vec<Edge>> {
        let nt = target.len() as u64;
        let total_pairs = source.len() as u64 * nt;
        let check_self = !conn.allow_autapses;
        let is_self = move |idx: u64| {
            check_self && source.at((idx / nt) as usize) == target.at((idx % nt) as usize)
        };

        if conn.allow_multapses {
            // Independent workers over fixed-size quota chunks.
            let n_workers = (n_conn as usize).div_ceil(WORKER_CHUNK);
            let counts: Vec<u32> = (0..n_workers)
                .map(|w| {
                    let start = w * WORKER_CHUNK;
                    WORKER_CHUNK.min(n_conn as usize - start) as u32
                })
                .collect();
            let (offsets, mut slab) = self.layout(&counts)?;
            let streams = self.streams;
            partition_mut(&mut slab, &offsets)
                .into_par_iter()
                .enumerate()
                .for_each(|(w, window)| {
                    let mut stream = streams.stream(call, StreamDomain::Topology, w as u64);
                    let picks: Vec<u64> = (0..window.len())
                        .map(|_| rules::draw_admissible(&mut stream, total_pairs, &is_self))
                        .collect();
                    rules::fill_pairs(window, &picks, source, target, nt, port);
                });
            Ok(slab)
        } else {
            // Without replacement the draw is one logical stream; the
            // decode into edges still fans out over chunk workers.
            let mut stream = self.streams.stream(call, StreamDomain::Topology, 0);
            let picks =
                rules::sample_pairs_distinct(&mut stream, total_pairs, n_conn as usize, is_self);
            let mut slab = vec![Edge::default(); picks.len()];
            slab.par_chunks_mut(WORKER_CHUNK)
                .zip(picks.par_chunks(WORKER_CHUNK))
                .for_each(|(window, idxs)| {
                    rules::fill_pairs(window, idxs, source, target, nt, port);
                });
            Ok(slab)
        }
    }

    fn apply_values(
        &self,
        slab: &mut [Edge],
        spec: &ValueSpec,
        field: Field,
        call: u64,
    ) -> WeaveResult<()> {
        let domain = match field {
            Field::Weight => StreamDomain::Weight,
            Field::Delay => StreamDomain::Delay,
        };
        let set = |e: &mut Edge, v: f32| match field {
            Field::Weight => e.weight = v,
            Field::Delay => e.delay = v,
        };
        match spec {
            ValueSpec::Constant { value } => {
                let value = *value;
                slab.par_iter_mut().for_each(|e| set(e, value));
            }
            ValueSpec::Array { values } => {
                if values.len() != slab.len() {
                    return Err(WeaveError::Config(format!(
                        "value array length {} does not match edge count {}",
                        values.len(),
                        slab.len()
                    )));
                }
                slab.par_iter_mut()
                    .zip(values.par_iter())
                    .for_each(|(e, v)| set(e, *v));
            }
            ValueSpec::Normal { mean, stddev } => {
                let (mean, stddev) = (*mean, *stddev);
                let streams = self.streams;
                slab.par_chunks_mut(WORKER_CHUNK)
                    .enumerate()
                    .for_each(|(c, chunk)| {
                        let mut stream = streams.stream(call, domain, c as u64);
                        for e in chunk {
                            set(e, stream.normal(mean, stddev));
                        }
                    });
            }
            ValueSpec::NormalClipped {
                mean,
                stddev,
                min,
                max,
            } => {
                let (mean, stddev, min, max) = (*mean, *stddev, *min, *max);
                let streams = self.streams;
                slab.par_chunks_mut(WORKER_CHUNK)
                    .enumerate()
                    .for_each(|(c, chunk)| {
                        let mut stream = streams.stream(call, domain, c as u64);
                        for e in chunk {
                            set(e, stream.normal_clipped(mean, stddev, min, max));
                        }
                    });
            }
        }
        Ok(())
    }
}

/// Re-validate the descriptors against the concrete call. Failures are
/// reported, never clamped.
fn validate_call(
    index: &NodeGroupIndex,
    source: &Population,
    target: &Population,
    conn: &ConnSpec,
    syn: &SynSpec,
) -> WeaveResult<()> {
    if source.has_duplicates() {
        return Err(WeaveError::Config(
            "source id list contains duplicate ids".into(),
        ));
    }
    if target.has_duplicates() {
        return Err(WeaveError::Config(
            "target id list contains duplicate ids".into(),
        ));
    }
    check_registered(index, source)?;
    check_registered(index, target)?;
    syn.validate()?;
    check_ports(index, target, syn.port)?;

    let ns = source.len();
    let nt = target.len();
    match conn.rule {
        ConnRule::OneToOne => {
            if ns != nt {
                return Err(WeaveError::Config(format!(
                    "one_to_one requires equal population sizes (source {ns}, target {nt})"
                )));
            }
        }
        ConnRule::AllToAll => {}
        ConnRule::FixedIndegree { k } => {
            if nt > 0 && k > 0 {
                let overlap = if conn.allow_autapses {
                    0
                } else {
                    source.overlap_count(target).min(1)
                };
                let available = ns.saturating_sub(overlap);
                if available == 0 {
                    return Err(WeaveError::Config(format!(
                        "indegree {k} requested but no admissible sources"
                    )));
                }
                if !conn.allow_multapses && k as usize > available {
                    return Err(WeaveError::Config(format!(
                        "indegree {k} exceeds the {available} available sources \
                         (multapses disallowed)"
                    )));
                }
            }
        }
        ConnRule::FixedOutdegree { k } => {
            if ns > 0 && k > 0 {
                let overlap = if conn.allow_autapses {
                    0
                } else {
                    source.overlap_count(target).min(1)
                };
                let available = nt.saturating_sub(overlap);
                if available == 0 {
                    return Err(WeaveError::Config(format!(
                        "outdegree {k} requested but no admissible targets"
                    )));
                }
                if !conn.allow_multapses && k as usize > available {
                    return Err(WeaveError::Config(format!(
                        "outdegree {k} exceeds the {available} available targets \
                         (multapses disallowed)"
                    )));
                }
            }
        }
        ConnRule::FixedTotalNumber { n } => {
            let total = ns as u64 * nt as u64;
            let admissible = if conn.allow_autapses {
                total
            } else {
                total - source.overlap_count(target) as u64
            };
            if n > 0 && admissible == 0 {
                return Err(WeaveError::Config(
                    "no admissible pairs for fixed_total_number".into(),
                ));
            }
            if !conn.allow_multapses && n > admissible {
                return Err(WeaveError::Config(format!(
                    "fixed_total_number {n} exceeds the {admissible} distinct admissible \
                     pairs (multapses disallowed)"
                )));
            }
        }
    }
    Ok(())
}

fn check_registered(index: &NodeGroupIndex, pop: &Population) -> WeaveResult<()> {
    let total = index.total_nodes();
    match pop {
        Population::Range(seq) => {
            if seq.end() > total {
                return Err(WeaveError::Lookup(NodeId(seq.start().0.max(total))));
            }
        }
        Population::List(ids) => {
            for id in ids {
                if id.0 >= total {
                    return Err(WeaveError::Lookup(*id));
                }
            }
        }
    }
    Ok(())
}

fn check_ports(index: &NodeGroupIndex, target: &Population, port: u8) -> WeaveResult<()> {
    let check_group = |gid: GroupId| -> WeaveResult<()> {
        if let Some(group) = index.group(gid) {
            if port >= group.n_ports() {
                return Err(WeaveError::Config(format!(
                    "port {port} out of range for {gid} ({} ports)",
                    group.n_ports()
                )));
            }
        }
        Ok(())
    };
    match target {
        Population::Range(seq) => {
            if seq.is_empty() {
                return Ok(());
            }
            let (first, _) = index.resolve(seq.start())?;
            let (last, _) = index.resolve(NodeId(seq.end() - 1))?;
            for g in first.0..=last.0 {
                check_group(GroupId(g))?;
            }
        }
        Population::List(ids) => {
            let mut seen = AHashSet::new();
            for id in ids {
                let (gid, _) = index.resolve(*id)?;
                if seen.insert(gid) {
                    check_group(gid)?;
                }
            }
        }
    }
    Ok(())
}
