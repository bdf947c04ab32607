//! Ordered map/reduce from point records to a populated graph.
//!
//! Records are taken in windows of `queue_depth`. Each window is turned into
//! points on a rayon pool in whatever order the workers get to them, then the
//! calling thread adds those points to the graph strictly in record order.
//! At most one window of built points waits for the reducer at any time.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error};
use rayon::prelude::*;
use rayon::ThreadPool;

use super::ReadError;
use crate::codec::PointRecord;
use crate::graph::{GraphError, NetworkGraph};
use crate::point::ControlPoint;

/// Shared cancellation flag for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `None` marks a record skipped after cancellation.
type Built = Option<Result<ControlPoint, GraphError>>;

/// Build a graph from `records`, constructing points in parallel on `pool`
/// and adding them in record order.
///
/// `build` receives the record index and the record. No more than
/// `queue_depth` points are built ahead of the last one added. `on_progress`
/// is called with the number of points added so far after every addition.
///
/// # Errors
/// * `ReadError::InvalidRecord` - a record failed to build or to join the
///   graph; the whole build is abandoned
/// * `ReadError::Cancelled` - `cancel` fired before the build completed
/// * `ReadError::WorkerPanicked` - a point builder panicked
pub fn build_graph_ordered<B, P>(
    records: &[PointRecord],
    build: B,
    pool: &ThreadPool,
    queue_depth: usize,
    cancel: &CancelToken,
    mut on_progress: P,
) -> Result<NetworkGraph, ReadError>
where
    B: Fn(usize, &PointRecord) -> Result<ControlPoint, GraphError> + Sync,
    P: FnMut(usize),
{
    let window = queue_depth.max(1);
    let mut graph = NetworkGraph::new();
    let mut next = 0;

    for chunk in records.chunks(window) {
        if cancel.is_cancelled() {
            return Err(ReadError::Cancelled);
        }

        let base = next;
        let built: Vec<Built> = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.install(|| {
                chunk
                    .par_iter()
                    .enumerate()
                    .map(|(offset, record)| {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        Some(build(base + offset, record))
                    })
                    .collect()
            })
        }))
        .map_err(|_| ReadError::WorkerPanicked)?;

        for (record, built) in chunk.iter().zip(built) {
            if cancel.is_cancelled() {
                return Err(ReadError::Cancelled);
            }
            // Builders only skip records once cancelled.
            let built = built.ok_or(ReadError::Cancelled)?;
            if let Err(source) = built.and_then(|point| graph.add_point(point)) {
                error!("Record {next} (point {}) is invalid: {source}", record.id);
                return Err(ReadError::InvalidRecord {
                    index: next,
                    point_id: record.id.clone(),
                    source,
                });
            }
            next += 1;
            on_progress(next);
        }
    }

    debug!(
        "Reduced {} points onto {} images",
        graph.num_points(),
        graph.num_nodes()
    );
    Ok(graph)
}
