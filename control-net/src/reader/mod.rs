//! Background reader that turns a network file into a [`NetworkGraph`].
//!
//! A read runs on its own worker thread in two stages. Stage one decodes the
//! container into point records. Stage two builds points from those records on
//! a dedicated rayon pool and folds them into one graph in file order. Only
//! one read pipeline runs per process at a time; see [`ReadPermit`].
//!
//! Progress and state changes are published on a channel obtained from
//! [`ConcurrentNetworkReader::events`].

mod permit;
mod pipeline;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::codec::{self, FormatError};
use crate::config::ReaderConfig;
use crate::graph::{GraphError, NetworkGraph};
use crate::target::{KnownTargets, TargetRadii, TargetRadiiSource};

pub use permit::{read_in_progress, ReadPermit};
pub use pipeline::{build_graph_ordered, CancelToken};

/// Lifecycle of a [`ConcurrentNetworkReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    ReadingFile,
    BuildingGraph,
    Done,
    Failed,
}

impl ReaderState {
    /// True while a pipeline is running.
    pub fn is_active(self) -> bool {
        matches!(self, ReaderState::ReadingFile | ReaderState::BuildingGraph)
    }
}

/// Notifications published while a read runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    StateChanged(ReaderState),
    /// Bounds for subsequent `Progress` values
    ProgressRange { min: usize, max: usize },
    /// Number of points folded into the graph so far
    Progress(usize),
    Finished { points: usize, nodes: usize },
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Reader is busy ({0:?})")]
    Busy(ReaderState),

    #[error("No finished network to take ({0:?})")]
    NotReady(ReaderState),

    #[error("Read cancelled")]
    Cancelled,

    #[error("Failed to decode {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Record {index} (point {point_id}) cannot be added: {source}")]
    InvalidRecord {
        index: usize,
        point_id: String,
        #[source]
        source: GraphError,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Reader worker panicked")]
    WorkerPanicked,
}

/// Reader state shared with the worker. Every transition is published.
#[derive(Clone)]
struct StatusCell {
    state: Arc<Mutex<ReaderState>>,
    events: Sender<ReadEvent>,
}

impl StatusCell {
    fn get(&self) -> ReaderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, next: ReaderState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == next {
            return;
        }
        debug!("Reader state {:?} -> {:?}", *state, next);
        *state = next;
        // Nobody listening is fine.
        let _ = self.events.send(ReadEvent::StateChanged(next));
    }

    fn emit(&self, event: ReadEvent) {
        let _ = self.events.send(event);
    }
}

/// Reads persisted control networks in the background.
///
/// ```no_run
/// use control_net::{ConcurrentNetworkReader, ReaderConfig};
///
/// let mut reader = ConcurrentNetworkReader::new(ReaderConfig::default());
/// reader.read("network.cnet").unwrap();
/// let graph = reader.wait().unwrap();
/// println!("{} points", graph.num_points());
/// ```
pub struct ConcurrentNetworkReader {
    config: ReaderConfig,
    targets: Arc<dyn TargetRadiiSource>,
    status: StatusCell,
    events: Receiver<ReadEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<Result<NetworkGraph, ReadError>>>,
}

impl ConcurrentNetworkReader {
    /// Create a reader that resolves radii from the built-in body table.
    pub fn new(config: ReaderConfig) -> Self {
        Self::with_targets(config, Arc::new(KnownTargets::default()))
    }

    pub fn with_targets(config: ReaderConfig, targets: Arc<dyn TargetRadiiSource>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            config,
            targets,
            status: StatusCell {
                state: Arc::new(Mutex::new(ReaderState::Idle)),
                events: tx,
            },
            events: rx,
            cancel: CancelToken::new(),
            worker: None,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Receiver for progress and state events. All clones share one queue.
    pub fn events(&self) -> Receiver<ReadEvent> {
        self.events.clone()
    }

    pub fn state(&self) -> ReaderState {
        self.status.get()
    }

    /// True once the worker has stopped (or no read was started).
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Start reading `path` in the background.
    ///
    /// The reader counts as `ReadingFile` from this call on, including while
    /// it waits for another read in the process to release the permit.
    pub fn read(&mut self, path: impl AsRef<Path>) -> Result<(), ReadError> {
        let state = self.state();
        if state != ReaderState::Idle || self.worker.is_some() {
            return Err(ReadError::Busy(state));
        }

        let path = path.as_ref().to_path_buf();
        info!("Starting read of {}", path.display());

        self.cancel = CancelToken::new();
        let job = ReadJob {
            path,
            config: self.config.clone(),
            targets: Arc::clone(&self.targets),
            status: self.status.clone(),
            cancel: self.cancel.clone(),
        };
        self.status.set(ReaderState::ReadingFile);
        self.worker = Some(thread::spawn(move || job.run()));
        Ok(())
    }

    /// Block until the current read ends and take its result.
    ///
    /// Returns the reader to `Idle` whatever the outcome.
    pub fn wait(&mut self) -> Result<NetworkGraph, ReadError> {
        let Some(worker) = self.worker.take() else {
            return Err(ReadError::NotReady(self.state()));
        };
        let result = worker.join().unwrap_or(Err(ReadError::WorkerPanicked));
        self.status.set(ReaderState::Idle);
        result
    }

    /// Take the result if the read has already ended.
    ///
    /// `ReadError::NotReady` while the pipeline is still running or when no
    /// read was started.
    pub fn try_take(&mut self) -> Result<NetworkGraph, ReadError> {
        let running = self
            .worker
            .as_ref()
            .map_or(true, |worker| !worker.is_finished());
        if running {
            return Err(ReadError::NotReady(self.state()));
        }
        self.wait()
    }

    /// Stop the current read, wait for its threads to quiesce and discard any
    /// result. The reader is `Idle` afterwards.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Reader worker panicked while cancelling");
            }
            info!("Read cancelled");
        }
        self.status.set(ReaderState::Idle);
    }
}

impl Drop for ConcurrentNetworkReader {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel();
        }
    }
}

/// Everything one background read needs.
struct ReadJob {
    path: PathBuf,
    config: ReaderConfig,
    targets: Arc<dyn TargetRadiiSource>,
    status: StatusCell,
    cancel: CancelToken,
}

impl ReadJob {
    fn run(self) -> Result<NetworkGraph, ReadError> {
        let start = Instant::now();
        let result = self.execute();
        match &result {
            Ok(graph) => {
                info!(
                    "Read {} points on {} images from {} in {:.2?}",
                    graph.num_points(),
                    graph.num_nodes(),
                    self.path.display(),
                    start.elapsed()
                );
                self.status.set(ReaderState::Done);
                self.status.emit(ReadEvent::Finished {
                    points: graph.num_points(),
                    nodes: graph.num_nodes(),
                });
            }
            // The canceller owns the transition back to Idle.
            Err(ReadError::Cancelled) => debug!("Read of {} cancelled", self.path.display()),
            Err(e) => {
                error!("Read of {} failed: {e}", self.path.display());
                self.status.set(ReaderState::Failed);
                self.status.emit(ReadEvent::Failed(e.to_string()));
            }
        }
        result
    }

    fn execute(&self) -> Result<NetworkGraph, ReadError> {
        let poll = Duration::from_millis(self.config.permit_poll_ms.max(1));
        let _permit = ReadPermit::acquire(&self.cancel, poll).ok_or(ReadError::Cancelled)?;

        let decoded = self.decode()?;
        debug!(
            "Decoded {} records from {}",
            decoded.points.len(),
            self.path.display()
        );

        self.status.set(ReaderState::BuildingGraph);
        let total = decoded.points.len();
        self.status.emit(ReadEvent::ProgressRange { min: 0, max: total });

        let radii = self.resolve_radii(&decoded.header.target_name);
        let threads = self.config.effective_map_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("cnet-map-{i}"))
            .build()?;
        debug!("Building graph with {threads} point builders");

        let interval = self.config.progress_interval.max(1);
        let mut graph = build_graph_ordered(
            &decoded.points,
            |_, record| record.to_point(radii.as_ref()),
            &pool,
            self.config.queue_depth,
            &self.cancel,
            |done| {
                if done % interval == 0 || done == total {
                    self.status.emit(ReadEvent::Progress(done));
                }
            },
        )?;

        graph.set_header(decoded.header.into());
        graph.set_target_radii(radii);
        Ok(graph)
    }

    fn decode(&self) -> Result<codec::DecodedNetwork, ReadError> {
        let format_error = |source: FormatError| ReadError::Format {
            path: self.path.clone(),
            source,
        };
        let file = File::open(&self.path).map_err(|e| format_error(FormatError::Io(e)))?;
        codec::decode_with(BufReader::new(file), |_| !self.cancel.is_cancelled()).map_err(
            |e| match e {
                FormatError::Interrupted => ReadError::Cancelled,
                other => format_error(other),
            },
        )
    }

    fn resolve_radii(&self, target: &str) -> Option<TargetRadii> {
        if target.trim().is_empty() {
            warn!(
                "{} names no target body, building without radii",
                self.path.display()
            );
            return None;
        }
        match self.targets.radii(target) {
            Ok(radii) => Some(radii),
            Err(e) => {
                warn!("{e}, building without radii");
                None
            }
        }
    }
}
