//! Per-image graph node.

use std::collections::{BTreeMap, BTreeSet};

use super::GraphError;
use crate::measure::ControlMeasure;

/// One node per image serial number.
///
/// Tracks which points have a measure on this image and which other images
/// share a point with it. Measures themselves stay owned by their point in the
/// graph arena; the node only records the point ids. Each adjacency entry is
/// tagged with the set of points that establish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialIndexedNode {
    serial_number: String,
    measures: BTreeSet<String>,
    connections: BTreeMap<String, BTreeSet<String>>,
}

impl SerialIndexedNode {
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            measures: BTreeSet::new(),
            connections: BTreeMap::new(),
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Register the measure that `point_id` has on this image.
    ///
    /// # Errors
    /// * `GraphError::SerialMismatch` - measure lies on another image
    /// * `GraphError::DuplicateMeasure` - the point already has a measure here
    pub fn add_measure(
        &mut self,
        point_id: &str,
        measure: &ControlMeasure,
    ) -> Result<(), GraphError> {
        if measure.serial_number != self.serial_number {
            return Err(GraphError::SerialMismatch {
                node: self.serial_number.clone(),
                measure: measure.serial_number.clone(),
            });
        }
        if self.measures.contains(point_id) {
            return Err(GraphError::DuplicateMeasure {
                serial_number: self.serial_number.clone(),
                point_id: point_id.to_string(),
            });
        }
        self.measures.insert(point_id.to_string());
        Ok(())
    }

    /// Forget the measure of `point_id`. Adjacency is left to the caller.
    pub fn remove_measure(&mut self, point_id: &str) -> bool {
        self.measures.remove(point_id)
    }

    /// Tag the edge to `other` with `point_id`, creating the edge if needed.
    pub fn add_connection(&mut self, other: &str, point_id: &str) {
        self.connections
            .entry(other.to_string())
            .or_default()
            .insert(point_id.to_string());
    }

    /// Drop `point_id` from the edge to `other`; the edge goes away with its
    /// last supporting point. Returns true if the edge was deleted.
    pub fn remove_connection(&mut self, other: &str, point_id: &str) -> bool {
        let Some(points) = self.connections.get_mut(other) else {
            return false;
        };
        points.remove(point_id);
        if points.is_empty() {
            self.connections.remove(other);
            return true;
        }
        false
    }

    pub fn measure_count(&self) -> usize {
        self.measures.len()
    }

    pub fn contains_point(&self, point_id: &str) -> bool {
        self.measures.contains(point_id)
    }

    /// Ids of the points with a measure on this image, sorted.
    pub fn point_ids(&self) -> impl Iterator<Item = &str> {
        self.measures.iter().map(String::as_str)
    }

    /// Serial numbers of adjacent images, sorted.
    pub fn adjacent_serials(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, other: &str) -> bool {
        self.connections.contains_key(other)
    }

    /// Points supporting the edge to `other`.
    pub fn connection_points(&self, other: &str) -> Option<&BTreeSet<String>> {
        self.connections.get(other)
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}
