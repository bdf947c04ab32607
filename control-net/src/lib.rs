//! Control network graph and concurrent network reader
//!
//! A control network ties image measurements of the same ground feature
//! together. Each [`ControlPoint`] owns one [`ControlMeasure`] per image it
//! was seen in. The [`NetworkGraph`] indexes those measures by image serial
//! number and keeps an adjacency between images that share points.
//!
//! Persisted networks are loaded by [`ConcurrentNetworkReader`], which decodes
//! the file and builds the graph on background threads.

pub mod codec;
pub mod config;
pub mod graph;
pub mod header;
pub mod measure;
pub mod point;
pub mod reader;
pub mod target;

pub use config::{ConfigError, ReaderConfig};
pub use graph::{GraphError, NetworkGraph, SerialIndexedNode};
pub use header::NetworkHeader;
pub use measure::{ControlMeasure, MeasureType};
pub use point::{ControlPoint, PointStatistics, PointType, SurfacePoint};
pub use reader::{
    CancelToken, ConcurrentNetworkReader, ReadError, ReadEvent, ReadPermit, ReaderState,
};
pub use target::{KnownTargets, TargetError, TargetRadii, TargetRadiiSource};
