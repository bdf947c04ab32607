//! Control points: a named ground feature observed in several images.

use serde::{Deserialize, Serialize};
use uom::si::f64::Length;
use uom::si::length::meter;

use crate::graph::GraphError;
use crate::measure::ControlMeasure;

/// How strongly the ground coordinate of a point is constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PointType {
    /// Ground coordinate solved freely by adjustment
    #[default]
    Free,
    /// Ground coordinate held near its apriori value
    Constrained,
    /// Ground coordinate held fixed
    Fixed,
}

/// A location on the target body surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    /// Planetocentric latitude in degrees
    pub latitude: f64,
    /// East-positive longitude in degrees
    pub longitude: f64,
    /// Distance from body centre, if known
    pub radius: Option<Length>,
}

impl SurfacePoint {
    pub fn new(latitude: f64, longitude: f64, radius: Length) -> Self {
        Self {
            latitude,
            longitude,
            radius: Some(radius),
        }
    }

    /// A latitude/longitude whose radius could not be resolved.
    pub fn without_radius(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius: None,
        }
    }

    pub fn has_radius(&self) -> bool {
        self.radius.is_some()
    }

    /// Body-fixed rectangular coordinates in metres. `None` without a radius.
    pub fn body_fixed(&self) -> Option<[f64; 3]> {
        let r = self.radius?.get::<meter>();
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();
        Some([
            r * lat.cos() * lon.cos(),
            r * lat.cos() * lon.sin(),
            r * lat.sin(),
        ])
    }
}

/// Residual summary over the valid measures of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointStatistics {
    pub num_measures: usize,
    pub num_valid_measures: usize,
    pub average_residual: f64,
    pub minimum_residual: f64,
    pub maximum_residual: f64,
}

/// A control point and the measures that observe it.
///
/// Measures are kept in insertion order and at most one measure exists per
/// image serial number.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPoint {
    pub id: String,
    pub point_type: PointType,
    pub ignored: bool,
    pub edit_lock: bool,
    /// Index into the measure list of the reference measure
    pub reference_index: Option<usize>,
    pub apriori: Option<SurfacePoint>,
    pub adjusted: Option<SurfacePoint>,
    pub chooser_name: Option<String>,
    pub date_time: Option<String>,
    pub(crate) measures: Vec<ControlMeasure>,
}

impl ControlPoint {
    /// Create a free point with no measures.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            point_type: PointType::Free,
            ignored: false,
            edit_lock: false,
            reference_index: None,
            apriori: None,
            adjusted: None,
            chooser_name: None,
            date_time: None,
            measures: Vec::new(),
        }
    }

    /// Create a point from a list of measures.
    ///
    /// # Errors
    /// `GraphError::DuplicateSerial` if two measures share an image.
    pub fn with_measures(
        id: impl Into<String>,
        measures: impl IntoIterator<Item = ControlMeasure>,
    ) -> Result<Self, GraphError> {
        let mut point = Self::new(id);
        for measure in measures {
            point.add_measure(measure)?;
        }
        Ok(point)
    }

    /// Append a measure.
    ///
    /// # Errors
    /// `GraphError::DuplicateSerial` if the point already has a measure on
    /// the same image.
    pub fn add_measure(&mut self, measure: ControlMeasure) -> Result<(), GraphError> {
        if self.has_serial(&measure.serial_number) {
            return Err(GraphError::DuplicateSerial {
                point_id: self.id.clone(),
                serial_number: measure.serial_number,
            });
        }
        self.measures.push(measure);
        Ok(())
    }

    /// Remove the measure on `serial_number`, keeping the reference index
    /// pointing at the same measure when possible.
    pub fn remove_measure(&mut self, serial_number: &str) -> Option<ControlMeasure> {
        let index = self
            .measures
            .iter()
            .position(|m| m.serial_number == serial_number)?;
        self.reference_index = match self.reference_index {
            Some(r) if r == index => None,
            Some(r) if r > index => Some(r - 1),
            other => other,
        };
        Some(self.measures.remove(index))
    }

    pub fn measures(&self) -> &[ControlMeasure] {
        &self.measures
    }

    pub fn measure(&self, serial_number: &str) -> Option<&ControlMeasure> {
        self.measures
            .iter()
            .find(|m| m.serial_number == serial_number)
    }

    pub(crate) fn measure_mut(&mut self, serial_number: &str) -> Option<&mut ControlMeasure> {
        self.measures
            .iter_mut()
            .find(|m| m.serial_number == serial_number)
    }

    pub fn has_serial(&self, serial_number: &str) -> bool {
        self.measure(serial_number).is_some()
    }

    /// Measures that are not ignored.
    pub fn valid_measures(&self) -> impl Iterator<Item = &ControlMeasure> {
        self.measures.iter().filter(|m| m.is_valid())
    }

    pub fn serial_numbers(&self) -> impl Iterator<Item = &str> {
        self.measures.iter().map(|m| m.serial_number.as_str())
    }

    pub fn num_measures(&self) -> usize {
        self.measures.len()
    }

    pub fn num_valid_measures(&self) -> usize {
        self.valid_measures().count()
    }

    pub fn reference_measure(&self) -> Option<&ControlMeasure> {
        self.reference_index.and_then(|i| self.measures.get(i))
    }

    /// Residual statistics over the valid measures.
    ///
    /// Returns `None` when no measure is valid.
    pub fn statistics(&self) -> Option<PointStatistics> {
        let residuals: Vec<f64> = self
            .valid_measures()
            .map(ControlMeasure::residual_magnitude)
            .collect();
        if residuals.is_empty() {
            return None;
        }

        let sum: f64 = residuals.iter().sum();
        let minimum_residual = residuals.iter().copied().fold(f64::INFINITY, f64::min);
        let maximum_residual = residuals.iter().copied().fold(0.0, f64::max);

        Some(PointStatistics {
            num_measures: self.measures.len(),
            num_valid_measures: residuals.len(),
            average_residual: sum / residuals.len() as f64,
            minimum_residual,
            maximum_residual,
        })
    }
}
