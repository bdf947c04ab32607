//! Image/point control network graph.
//!
//! The graph is an arena keyed by stable identifiers: nodes by image serial
//! number and points by point id. Nodes never own measures and never hold
//! references to each other; every cross link is an id that is looked up in
//! the arena. [`NetworkGraph`] is the sole owner of all nodes and points.
//!
//! Invariants kept by every mutation:
//! - each measure of each live point is registered in exactly one node, the
//!   one whose key equals the measure's serial number
//! - nodes exist only while at least one measure is registered on them
//! - an adjacency edge between two nodes exists iff some live point has a
//!   measure on both, and the edge is tagged with exactly those points

mod node;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use log::{debug, trace};
use thiserror::Error;

use crate::header::NetworkHeader;
use crate::measure::ControlMeasure;
use crate::point::ControlPoint;
use crate::target::TargetRadii;

pub use node::SerialIndexedNode;

/// Errors raised by graph and point mutation or lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A measure was offered to the node of a different image
    #[error("Measure on {measure} cannot be registered on node {node}")]
    SerialMismatch { node: String, measure: String },

    /// The node already holds a measure for this point
    #[error("Node {serial_number} already holds a measure for point {point_id}")]
    DuplicateMeasure {
        serial_number: String,
        point_id: String,
    },

    /// The point already has a measure on this image
    #[error("Point {point_id} already has a measure on {serial_number}")]
    DuplicateSerial {
        point_id: String,
        serial_number: String,
    },

    #[error("Point {0} already exists in the network")]
    DuplicatePoint(String),

    #[error("Point {0} has no measures")]
    EmptyPoint(String),

    #[error("Point {point_id} references measure {index} which does not exist")]
    InvalidReference { point_id: String, index: usize },

    #[error("Point {0} not found")]
    PointNotFound(String),

    #[error("No image with serial number {0} in the network")]
    NodeNotFound(String),

    #[error("Image {serial_number} has no measure for point {point_id}")]
    MeasureNotFound {
        serial_number: String,
        point_id: String,
    },

    #[error("Network is inconsistent: {0}")]
    Inconsistent(String),
}

/// The control network: image nodes, control points and header metadata.
///
/// Not internally synchronised. A graph under construction belongs to the
/// reader pipeline; a finished graph belongs to whoever received it.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    header: NetworkHeader,
    target_radii: Option<TargetRadii>,
    nodes: BTreeMap<String, SerialIndexedNode>,
    points: HashMap<String, ControlPoint>,
    point_order: Vec<String>,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(header: NetworkHeader) -> Self {
        Self {
            header,
            ..Self::default()
        }
    }

    pub fn header(&self) -> &NetworkHeader {
        &self.header
    }

    /// Replace the header. Independent of point/measure state.
    pub fn set_header(&mut self, header: NetworkHeader) {
        self.header = header;
    }

    pub fn target_radii(&self) -> Option<&TargetRadii> {
        self.target_radii.as_ref()
    }

    pub fn set_target_radii(&mut self, radii: Option<TargetRadii>) {
        self.target_radii = radii;
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Add a point and register all of its measures.
    ///
    /// Either every measure registers and the point's adjacency edges are
    /// wired, or the graph is left exactly as it was.
    ///
    /// # Errors
    /// * `GraphError::DuplicatePoint` - id already present
    /// * `GraphError::EmptyPoint` - point has no measures
    /// * `GraphError::DuplicateMeasure` / `SerialMismatch` - registration failed
    pub fn add_point(&mut self, point: ControlPoint) -> Result<(), GraphError> {
        if self.points.contains_key(&point.id) {
            return Err(GraphError::DuplicatePoint(point.id));
        }
        if point.measures.is_empty() {
            return Err(GraphError::EmptyPoint(point.id));
        }

        self.register_measures(&point)?;
        self.link_point(&point);

        trace!(
            "Added point {} with {} measures",
            point.id,
            point.measures.len()
        );
        self.point_order.push(point.id.clone());
        self.points.insert(point.id.clone(), point);
        Ok(())
    }

    /// Remove a point, detaching its measures and pruning edges that no
    /// other live point supports.
    ///
    /// # Errors
    /// `GraphError::PointNotFound` if the point is not (or no longer) present.
    pub fn remove_point(&mut self, point_id: &str) -> Result<ControlPoint, GraphError> {
        let point = self
            .points
            .remove(point_id)
            .ok_or_else(|| GraphError::PointNotFound(point_id.to_string()))?;
        self.point_order.retain(|id| id != point_id);

        self.unlink_point(&point);
        self.unregister_measures(&point.id, &point.measures);
        trace!("Removed point {point_id}");
        Ok(point)
    }

    /// Add a measure to a live point and wire it to the point's other images.
    pub fn add_measure(
        &mut self,
        point_id: &str,
        measure: ControlMeasure,
    ) -> Result<(), GraphError> {
        let point = self
            .points
            .get(point_id)
            .ok_or_else(|| GraphError::PointNotFound(point_id.to_string()))?;
        if point.has_serial(&measure.serial_number) {
            return Err(GraphError::DuplicateSerial {
                point_id: point_id.to_string(),
                serial_number: measure.serial_number,
            });
        }
        let others: Vec<String> = point.serial_numbers().map(str::to_string).collect();

        let serial = measure.serial_number.clone();
        let registered = self
            .nodes
            .entry(serial.clone())
            .or_insert_with(|| SerialIndexedNode::new(serial.clone()))
            .add_measure(point_id, &measure);
        if let Err(e) = registered {
            self.drop_if_empty(&serial);
            return Err(e);
        }

        for other in &others {
            self.connect(&serial, other, point_id);
        }
        if let Some(point) = self.points.get_mut(point_id) {
            point.measures.push(measure);
        }
        Ok(())
    }

    /// Remove one measure from a live point.
    ///
    /// A point left without measures is removed from the network.
    pub fn remove_measure(
        &mut self,
        point_id: &str,
        serial_number: &str,
    ) -> Result<ControlMeasure, GraphError> {
        let point = self
            .points
            .get_mut(point_id)
            .ok_or_else(|| GraphError::PointNotFound(point_id.to_string()))?;
        let measure =
            point
                .remove_measure(serial_number)
                .ok_or_else(|| GraphError::MeasureNotFound {
                    serial_number: serial_number.to_string(),
                    point_id: point_id.to_string(),
                })?;
        let others: Vec<String> = point.serial_numbers().map(str::to_string).collect();
        let now_empty = point.measures.is_empty();

        for other in &others {
            self.disconnect(serial_number, other, point_id);
        }
        if let Some(node) = self.nodes.get_mut(serial_number) {
            node.remove_measure(point_id);
        }
        self.drop_if_empty(serial_number);

        if now_empty {
            debug!("Point {point_id} lost its last measure; removing it");
            self.points.remove(point_id);
            self.point_order.retain(|id| id != point_id);
        }
        Ok(measure)
    }

    pub fn set_point_ignored(&mut self, point_id: &str, ignored: bool) -> Result<(), GraphError> {
        let point = self
            .points
            .get_mut(point_id)
            .ok_or_else(|| GraphError::PointNotFound(point_id.to_string()))?;
        point.ignored = ignored;
        Ok(())
    }

    pub fn set_measure_ignored(
        &mut self,
        point_id: &str,
        serial_number: &str,
        ignored: bool,
    ) -> Result<(), GraphError> {
        let measure = self
            .points
            .get_mut(point_id)
            .ok_or_else(|| GraphError::PointNotFound(point_id.to_string()))?
            .measure_mut(serial_number)
            .ok_or_else(|| GraphError::MeasureNotFound {
                serial_number: serial_number.to_string(),
                point_id: point_id.to_string(),
            })?;
        measure.ignored = ignored;
        Ok(())
    }

    fn register_measures(&mut self, point: &ControlPoint) -> Result<(), GraphError> {
        for (index, measure) in point.measures.iter().enumerate() {
            let serial = &measure.serial_number;
            let registered = self
                .nodes
                .entry(serial.clone())
                .or_insert_with(|| SerialIndexedNode::new(serial.clone()))
                .add_measure(&point.id, measure);

            if let Err(e) = registered {
                debug!(
                    "Rolling back {index} measure registrations of point {}: {e}",
                    point.id
                );
                self.unregister_measures(&point.id, &point.measures[..index]);
                self.drop_if_empty(serial);
                return Err(e);
            }
        }
        Ok(())
    }

    fn unregister_measures(&mut self, point_id: &str, measures: &[ControlMeasure]) {
        for measure in measures {
            if let Some(node) = self.nodes.get_mut(&measure.serial_number) {
                node.remove_measure(point_id);
            }
            self.drop_if_empty(&measure.serial_number);
        }
    }

    fn link_point(&mut self, point: &ControlPoint) {
        let serials: Vec<&str> = point.serial_numbers().collect();
        for (i, a) in serials.iter().enumerate() {
            for b in &serials[i + 1..] {
                self.connect(a, b, &point.id);
            }
        }
    }

    fn unlink_point(&mut self, point: &ControlPoint) {
        let serials: Vec<&str> = point.serial_numbers().collect();
        for (i, a) in serials.iter().enumerate() {
            for b in &serials[i + 1..] {
                self.disconnect(a, b, &point.id);
            }
        }
    }

    fn connect(&mut self, a: &str, b: &str, point_id: &str) {
        if let Some(node) = self.nodes.get_mut(a) {
            node.add_connection(b, point_id);
        }
        if let Some(node) = self.nodes.get_mut(b) {
            node.add_connection(a, point_id);
        }
    }

    fn disconnect(&mut self, a: &str, b: &str, point_id: &str) {
        if let Some(node) = self.nodes.get_mut(a) {
            node.remove_connection(b, point_id);
        }
        if let Some(node) = self.nodes.get_mut(b) {
            node.remove_connection(a, point_id);
        }
    }

    fn drop_if_empty(&mut self, serial_number: &str) {
        if self
            .nodes
            .get(serial_number)
            .is_some_and(SerialIndexedNode::is_empty)
        {
            self.nodes.remove(serial_number);
        }
    }

    // =========================================================================
    // Points
    // =========================================================================

    pub fn point(&self, point_id: &str) -> Option<&ControlPoint> {
        self.points.get(point_id)
    }

    pub fn contains_point(&self, point_id: &str) -> bool {
        self.points.contains_key(point_id)
    }

    /// Points in the order they were added.
    pub fn points(&self) -> impl Iterator<Item = &ControlPoint> {
        self.point_order.iter().filter_map(|id| self.points.get(id))
    }

    /// Point ids in the order they were added.
    pub fn point_ids(&self) -> &[String] {
        &self.point_order
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_valid_points(&self) -> usize {
        self.points.values().filter(|p| !p.ignored).count()
    }

    pub fn num_measures(&self) -> usize {
        self.points.values().map(ControlPoint::num_measures).sum()
    }

    /// Measures that are not ignored on points that are not ignored.
    pub fn num_valid_measures(&self) -> usize {
        self.points
            .values()
            .filter(|p| !p.ignored)
            .map(ControlPoint::num_valid_measures)
            .sum()
    }

    /// Mean residual magnitude over valid measures of valid points.
    pub fn average_residual(&self) -> f64 {
        let (sum, count) = self
            .valid_residuals()
            .fold((0.0, 0usize), |(s, n), r| (s + r, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Largest residual magnitude over valid measures of valid points.
    pub fn maximum_residual(&self) -> f64 {
        self.valid_residuals().fold(0.0, f64::max)
    }

    fn valid_residuals(&self) -> impl Iterator<Item = f64> + '_ {
        self.points
            .values()
            .filter(|p| !p.ignored)
            .flat_map(ControlPoint::valid_measures)
            .map(ControlMeasure::residual_magnitude)
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub fn node(&self, serial_number: &str) -> Option<&SerialIndexedNode> {
        self.nodes.get(serial_number)
    }

    /// Nodes sorted by serial number.
    pub fn nodes(&self) -> impl Iterator<Item = &SerialIndexedNode> {
        self.nodes.values()
    }

    pub fn serial_numbers(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn require_node(&self, serial_number: &str) -> Result<&SerialIndexedNode, GraphError> {
        self.nodes
            .get(serial_number)
            .ok_or_else(|| GraphError::NodeNotFound(serial_number.to_string()))
    }

    /// The measure `point_id` has on image `serial_number`.
    ///
    /// # Errors
    /// * `GraphError::NodeNotFound` - no such image
    /// * `GraphError::MeasureNotFound` - the image has no measure for the point
    pub fn node_measure(
        &self,
        serial_number: &str,
        point_id: &str,
    ) -> Result<&ControlMeasure, GraphError> {
        let node = self.require_node(serial_number)?;
        let not_found = || GraphError::MeasureNotFound {
            serial_number: serial_number.to_string(),
            point_id: point_id.to_string(),
        };
        if !node.contains_point(point_id) {
            return Err(not_found());
        }
        self.points
            .get(point_id)
            .and_then(|p| p.measure(serial_number))
            .ok_or_else(not_found)
    }

    /// All measures on an image, ordered by point id.
    pub fn measures_on(&self, serial_number: &str) -> Result<Vec<&ControlMeasure>, GraphError> {
        let node = self.require_node(serial_number)?;
        Ok(node
            .point_ids()
            .filter_map(|id| self.points.get(id))
            .filter_map(|p| p.measure(serial_number))
            .collect())
    }

    /// Measures on an image that are not ignored and whose point is not ignored.
    pub fn valid_measures_on(
        &self,
        serial_number: &str,
    ) -> Result<Vec<&ControlMeasure>, GraphError> {
        let node = self.require_node(serial_number)?;
        Ok(node
            .point_ids()
            .filter_map(|id| self.points.get(id))
            .filter(|p| !p.ignored)
            .filter_map(|p| p.measure(serial_number))
            .filter(|m| m.is_valid())
            .collect())
    }

    /// Serial numbers of the images sharing a point with `serial_number`.
    pub fn adjacent_serials(&self, serial_number: &str) -> Result<Vec<&str>, GraphError> {
        Ok(self.require_node(serial_number)?.adjacent_serials().collect())
    }

    pub fn is_connected(&self, a: &str, b: &str) -> bool {
        self.nodes.get(a).is_some_and(|node| node.is_connected(b))
    }

    /// Points supporting the edge between two images.
    pub fn edge_points(&self, a: &str, b: &str) -> Option<&BTreeSet<String>> {
        self.nodes.get(a).and_then(|node| node.connection_points(b))
    }

    /// Connected components of the image graph.
    ///
    /// Each island is sorted; islands are ordered by their first serial.
    pub fn islands(&self) -> Vec<Vec<String>> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut islands = Vec::new();

        for start in self.nodes.keys() {
            if !seen.insert(start.as_str()) {
                continue;
            }
            let mut island = vec![start.clone()];
            let mut queue = VecDeque::from([start.as_str()]);
            while let Some(serial) = queue.pop_front() {
                let Some(node) = self.nodes.get(serial) else {
                    continue;
                };
                for neighbour in node.adjacent_serials() {
                    if seen.insert(neighbour) {
                        island.push(neighbour.to_string());
                        queue.push_back(neighbour);
                    }
                }
            }
            island.sort();
            islands.push(island);
        }
        islands
    }

    /// Verify the cross-references between points, nodes and edges.
    ///
    /// # Errors
    /// `GraphError::Inconsistent` describing the first violation found.
    pub fn check_consistency(&self) -> Result<(), GraphError> {
        let inconsistent = |msg: String| Err(GraphError::Inconsistent(msg));

        if self.point_order.len() != self.points.len() {
            return inconsistent(format!(
                "{} ordered ids for {} points",
                self.point_order.len(),
                self.points.len()
            ));
        }

        let mut expected_measures = 0;
        for point in self.points.values() {
            for measure in &point.measures {
                expected_measures += 1;
                match self.nodes.get(&measure.serial_number) {
                    Some(node) if node.contains_point(&point.id) => {}
                    _ => {
                        return inconsistent(format!(
                            "measure of {} on {} is not registered",
                            point.id, measure.serial_number
                        ))
                    }
                }
            }
        }

        let mut registered = 0;
        for node in self.nodes.values() {
            if node.is_empty() {
                return inconsistent(format!("node {} is empty", node.serial_number()));
            }
            registered += node.measure_count();

            for other in node.adjacent_serials() {
                let supporting = node.connection_points(other).into_iter().flatten();
                for point_id in supporting {
                    let backed = self.points.get(point_id).is_some_and(|p| {
                        p.has_serial(node.serial_number()) && p.has_serial(other)
                    });
                    if !backed {
                        return inconsistent(format!(
                            "edge {} - {other} tagged with dead point {point_id}",
                            node.serial_number()
                        ));
                    }
                }
                if self.edge_points(other, node.serial_number()) != node.connection_points(other)
                {
                    return inconsistent(format!(
                        "edge {} - {other} is not symmetric",
                        node.serial_number()
                    ));
                }
            }
        }

        if registered != expected_measures {
            return inconsistent(format!(
                "{registered} registered measures for {expected_measures} point measures"
            ));
        }
        Ok(())
    }
}
