//! Parallel force evaluation over a fixed-size worker pool
//!
//! Each step the node index space is split into contiguous chunks, every
//! chunk is evaluated against the full frame on the pool, and the per-chunk
//! results are stitched back into one force vector. Chunks are independent,
//! so the result does not depend on the worker count.

use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::SimulationParams;
use crate::error::{LayoutError, LayoutResult};
use crate::forces;
use crate::graph::ForceFrame;
use crate::vector::Vec3;

/// Split `n` items into contiguous chunks of `max(1, ceil(n / workers))`
pub fn partition(n: usize, workers: usize) -> Vec<Range<usize>> {
    let chunk = n.div_ceil(workers.max(1)).max(1);
    (0..n)
        .step_by(chunk)
        .map(|start| start..(start + chunk).min(n))
        .collect()
}

/// Merge per-chunk results into one force per node
///
/// Every index in `0..n` must be covered exactly once.
pub fn reduce(n: usize, chunks: Vec<(Range<usize>, Vec<Vec3>)>) -> LayoutResult<Vec<Vec3>> {
    let mut merged: Vec<Option<Vec3>> = vec![None; n];
    for (range, forces) in chunks {
        if range.len() != forces.len() || range.end > n {
            return Err(LayoutError::StepComputationFailure(format!(
                "chunk {range:?} returned {} forces",
                forces.len()
            )));
        }
        for (slot, force) in merged[range.clone()].iter_mut().zip(forces) {
            if slot.replace(force).is_some() {
                return Err(LayoutError::StepComputationFailure(format!(
                    "chunk {range:?} overlaps another chunk"
                )));
            }
        }
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(i, force)| {
            force.ok_or_else(|| {
                LayoutError::StepComputationFailure(format!("no force computed for node {i}"))
            })
        })
        .collect()
}

/// Owner of the worker pool for one run
///
/// Dropping the dispatcher tells the pool's threads to exit once idle.
pub struct ForceDispatcher {
    pool: ThreadPool,
    workers: usize,
}

impl ForceDispatcher {
    /// Build a pool with `workers` threads (at least one)
    pub fn new(workers: usize) -> LayoutResult<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("force-worker-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    /// Build a pool sized from the parameter set
    pub fn for_params(params: &SimulationParams) -> LayoutResult<Self> {
        Self::new(params.effective_workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Evaluate the force on every node of `frame`
    ///
    /// Blocks until all chunks have returned.
    pub fn compute(
        &self,
        frame: &ForceFrame,
        params: &SimulationParams,
    ) -> LayoutResult<Vec<Vec3>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let n = frame.len();
        if frame.neighbors.len() != n {
            return Err(LayoutError::StepComputationFailure(format!(
                "frame has {n} positions but {} neighbor lists",
                frame.neighbors.len()
            )));
        }

        let chunks = partition(n, self.workers);
        let results: Vec<(Range<usize>, Vec<Vec3>)> = self.pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let forces = forces::compute_forces(
                        range.clone(),
                        &frame.positions,
                        &frame.neighbors,
                        params,
                    );
                    (range, forces)
                })
                .collect()
        });

        reduce(n, results)
    }
}
