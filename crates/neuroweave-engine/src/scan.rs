// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Parallel exclusive prefix scan over fixed-capacity integer arrays.
//!
//! Blelloch two-phase scan: an up-sweep builds a reduction tree in place, a
//! down-sweep propagates prefix sums back down. Both phases touch every
//! element a constant number of times (O(n) work) and have O(log n)
//! dependency depth, so thousands of generation workers can be compacted
//! without serializing on a running sum.
//!
//! Working storage is allocated once for the configured maximum; `scan`
//! never allocates.

use neuroweave_structures::{WeaveError, WeaveResult};
use rayon::prelude::*;

/// Inputs at or below this length take the serial path; the tree passes only
/// pay off once there is enough work per level.
const SEQ_CUTOFF: usize = 2048;

/// Fixed-capacity exclusive-scan primitive.
pub struct PrefixScan {
    capacity: usize,
    work: Vec<u32>,
}

impl PrefixScan {
    /// Allocate working storage for inputs up to `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        let padded = capacity.next_power_of_two().max(1);
        Self {
            capacity,
            work: vec![0; padded],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Exclusive scan: `output[0] = 0`, `output[i] = sum(input[0..i])`.
    ///
    /// Returns the total sum of the input. Fails with a capacity error if
    /// the input exceeds the configured maximum.
    pub fn scan(&mut self, output: &mut [u32], input: &[u32]) -> WeaveResult<u32> {
        let n = input.len();
        if n > self.capacity {
            return Err(WeaveError::Capacity {
                what: "prefix scan input",
                needed: n,
                capacity: self.capacity,
            });
        }
        if output.len() != n {
            return Err(WeaveError::Config(format!(
                "scan output length {} does not match input length {n}",
                output.len()
            )));
        }
        if n == 0 {
            return Ok(0);
        }

        if n <= SEQ_CUTOFF {
            let mut acc = 0u32;
            for (out, inp) in output.iter_mut().zip(input) {
                *out = acc;
                acc += *inp;
            }
            return Ok(acc);
        }

        let m = n.next_power_of_two();
        let work = &mut self.work[..m];
        work[..n].copy_from_slice(input);
        work[n..].fill(0);

        // Up-sweep: each level folds pair sums one stride up the tree.
        let mut stride = 2;
        while stride <= m {
            let half = stride / 2;
            work.par_chunks_mut(stride)
                .for_each(|chunk| chunk[stride - 1] += chunk[half - 1]);
            stride *= 2;
        }

        let total = work[m - 1];
        work[m - 1] = 0;

        // Down-sweep: walk back down, swapping partial sums into place.
        let mut stride = m;
        while stride >= 2 {
            let half = stride / 2;
            work.par_chunks_mut(stride).for_each(|chunk| {
                let left = chunk[half - 1];
                chunk[half - 1] = chunk[stride - 1];
                chunk[stride - 1] += left;
            });
            stride = half;
        }

        output.copy_from_slice(&work[..n]);
        Ok(total)
    }
}

/// Split one output slab into disjoint per-worker windows.
///
/// `offsets` are the exclusive-scan results for the per-worker counts; the
/// slab length must equal the scan total. This is the write half of the
/// offset-then-disjoint-write discipline: after the split every worker owns
/// its window exclusively and no synchronization is needed.
pub fn partition_mut<'a, T>(slab: &'a mut [T], offsets: &[u32]) -> Vec<&'a mut [T]> {
    let mut windows = Vec::with_capacity(offsets.len());
    let mut rest = slab;
    let mut consumed = 0u32;
    for i in 0..offsets.len() {
        let end = if i + 1 < offsets.len() {
            offsets[i + 1]
        } else {
            consumed + rest.len() as u32
        };
        let (window, tail) = rest.split_at_mut((end - consumed) as usize);
        windows.push(window);
        consumed = end;
        rest = tail;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_example() {
        let mut scan = PrefixScan::with_capacity(16);
        let input = [3u32, 1, 0, 2];
        let mut output = [0u32; 4];
        let total = scan.scan(&mut output, &input).unwrap();
        assert_eq!(output, [0, 3, 4, 4]);
        assert_eq!(total, 6);
    }

    #[test]
    fn all_zero_input_scans_to_zero() {
        let mut scan = PrefixScan::with_capacity(64);
        let input = [0u32; 33];
        let mut output = [0u32; 33];
        let total = scan.scan(&mut output, &input).unwrap();
        assert!(output.iter().all(|&v| v == 0));
        assert_eq!(total, 0);
    }

    #[test]
    fn over_capacity_is_a_capacity_error() {
        let mut scan = PrefixScan::with_capacity(4);
        let input = [1u32; 5];
        let mut output = [0u32; 5];
        assert!(matches!(
            scan.scan(&mut output, &input),
            Err(WeaveError::Capacity { .. })
        ));
    }

    #[test]
    fn empty_input_is_fine() {
        let mut scan = PrefixScan::with_capacity(4);
        assert_eq!(scan.scan(&mut [], &[]).unwrap(), 0);
    }

    #[test]
    fn parallel_path_matches_serial() {
        // Force the tree path with a non-power-of-two length above the cutoff.
        let n = SEQ_CUTOFF * 3 + 7;
        let input: Vec<u32> = (0..n).map(|i| (i % 5) as u32).collect();
        let mut scan = PrefixScan::with_capacity(n);
        let mut output = vec![0u32; n];
        let total = scan.scan(&mut output, &input).unwrap();

        let mut acc = 0u32;
        for i in 0..n {
            assert_eq!(output[i], acc, "mismatch at {i}");
            acc += input[i];
        }
        assert_eq!(total, acc);
    }

    #[test]
    fn partition_covers_slab_disjointly() {
        // counts [3, 0, 2, 1] scan to these offsets
        let offsets = [0u32, 3, 3, 5];
        let mut slab = vec![0u32; 6];
        let windows = partition_mut(&mut slab, &offsets);
        let lens: Vec<usize> = windows.iter().map(|w| w.len()).collect();
        assert_eq!(lens, vec![3, 0, 2, 1]);
    }
}
