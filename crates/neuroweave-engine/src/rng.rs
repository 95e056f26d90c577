// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stream-split random service.
//!
//! Connection generation runs one logical worker per node, and workers never
//! communicate. Each worker therefore draws from its own stream, derived by
//! hashing `(connect call, domain, worker index)` against the base seed:
//! streams are collision-free across workers by construction and the draw
//! sequence depends only on the derivation key, never on thread scheduling.
//! This is what makes two runs with the same seed bit-identical.

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use xxhash_rust::xxh64::xxh64;

/// What a stream is consumed for. Keeps topology draws and value draws on
/// separate streams so adding a distribution to a SynSpec cannot perturb
/// the generated topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamDomain {
    Topology = 0,
    Weight = 1,
    Delay = 2,
}

/// Factory for per-worker draw streams.
#[derive(Debug, Clone, Copy)]
pub struct StreamFamily {
    base_seed: u64,
}

impl StreamFamily {
    pub fn new(base_seed: u64) -> Self {
        Self { base_seed }
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn reseed(&mut self, seed: u64) {
        self.base_seed = seed;
    }

    /// Independent stream for `(call, domain, worker)`.
    pub fn stream(&self, call: u64, domain: StreamDomain, worker: u64) -> DrawStream {
        let mut key = [0u8; 17];
        key[0] = domain as u8;
        key[1..9].copy_from_slice(&call.to_le_bytes());
        key[9..17].copy_from_slice(&worker.to_le_bytes());
        DrawStream {
            rng: rand::rngs::StdRng::seed_from_u64(xxh64(&key, self.base_seed)),
        }
    }
}

/// One worker's private stream.
pub struct DrawStream {
    rng: rand::rngs::StdRng,
}

/// Clipped draws resample up to this many times before clamping the last
/// sample into range.
const CLIP_RETRY: usize = 64;

impl DrawStream {
    /// Uniform float in `[0, 1)`.
    pub fn uniform(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    /// Uniform integer in `[0, bound)`. `bound` must be non-zero.
    pub fn below(&mut self, bound: u64) -> u64 {
        self.rng.gen_range(0..bound)
    }

    pub fn normal(&mut self, mean: f32, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return mean;
        }
        match Normal::new(mean, stddev) {
            Ok(dist) => dist.sample(&mut self.rng),
            // stddev is validated non-negative upstream
            Err(_) => mean,
        }
    }

    /// Normal draw constrained to `[min, max]`: resample a bounded number of
    /// times, then clamp. Never silently widens the range.
    pub fn normal_clipped(&mut self, mean: f32, stddev: f32, min: f32, max: f32) -> f32 {
        let mut v = self.normal(mean, stddev);
        for _ in 0..CLIP_RETRY {
            if v >= min && v <= max {
                return v;
            }
            v = self.normal(mean, stddev);
        }
        v.clamp(min, max)
    }

    /// Bulk uniform draws (`drawUniform(n)` surface).
    pub fn uniform_vec(&mut self, n: usize) -> Vec<f32> {
        (0..n).map(|_| self.uniform()).collect()
    }

    /// Bulk normal draws (`drawNormal(n)` surface).
    pub fn normal_vec(&mut self, n: usize, mean: f32, stddev: f32) -> Vec<f32> {
        (0..n).map(|_| self.normal(mean, stddev)).collect()
    }

    /// Bulk integer draws in `[0, bound)` (`drawInt(n)` surface).
    pub fn int_vec(&mut self, n: usize, bound: u64) -> Vec<u64> {
        (0..n).map(|_| self.below(bound)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_keys_yield_identical_streams() {
        let fam = StreamFamily::new(42);
        let a: Vec<u64> = fam.stream(3, StreamDomain::Topology, 7).int_vec(32, 1000);
        let b: Vec<u64> = fam.stream(3, StreamDomain::Topology, 7).int_vec(32, 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn adjacent_workers_get_distinct_streams() {
        let fam = StreamFamily::new(42);
        let a = fam.stream(0, StreamDomain::Topology, 0).int_vec(16, 1 << 30);
        let b = fam.stream(0, StreamDomain::Topology, 1).int_vec(16, 1 << 30);
        assert_ne!(a, b);
    }

    #[test]
    fn domains_do_not_alias() {
        let fam = StreamFamily::new(7);
        let w = fam.stream(1, StreamDomain::Weight, 5).uniform_vec(16);
        let d = fam.stream(1, StreamDomain::Delay, 5).uniform_vec(16);
        assert_ne!(w, d);
    }

    #[test]
    fn clipped_draws_stay_in_range() {
        let fam = StreamFamily::new(99);
        let mut stream = fam.stream(0, StreamDomain::Weight, 0);
        for _ in 0..1000 {
            let v = stream.normal_clipped(0.0, 5.0, -1.0, 1.0);
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn zero_stddev_is_the_mean() {
        let fam = StreamFamily::new(1);
        let mut stream = fam.stream(0, StreamDomain::Weight, 0);
        assert_eq!(stream.normal(2.5, 0.0), 2.5);
    }
}
