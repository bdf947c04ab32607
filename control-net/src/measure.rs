//! Control measures: one image's observation of a control point.

use serde::{Deserialize, Serialize};

/// How a measure's sample/line coordinate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MeasureType {
    /// Unverified location, typically seeded from geometry
    #[default]
    Candidate,
    /// Placed by hand
    Manual,
    /// Registered by an automatic matcher to whole-pixel precision
    RegisteredPixel,
    /// Registered by an automatic matcher to sub-pixel precision
    RegisteredSubPixel,
}

/// A single image measurement of a control point.
///
/// The serial number selects the image (and therefore the graph node) the
/// measure is registered on. Once the owning point lives in a
/// [`NetworkGraph`](crate::NetworkGraph) the serial number can no longer be
/// changed, since the graph only hands out shared references.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMeasure {
    /// Serial number of the image this measure lies on
    pub serial_number: String,
    /// Provenance of the coordinate
    pub measure_type: MeasureType,
    /// Sample (column) coordinate in pixels
    pub sample: f64,
    /// Line (row) coordinate in pixels
    pub line: f64,
    /// Bundle adjustment residual in sample direction (pixels)
    pub sample_residual: f64,
    /// Bundle adjustment residual in line direction (pixels)
    pub line_residual: f64,
    /// Ignored measures take no part in statistics or adjustment
    pub ignored: bool,
    /// Edit-locked measures must not be moved by automatic tools
    pub edit_lock: bool,
    /// Name of the program or user that placed the measure
    pub chooser_name: Option<String>,
    /// Timestamp of the last edit
    pub date_time: Option<String>,
}

impl ControlMeasure {
    /// Create a candidate measure at the given image coordinate.
    pub fn new(serial_number: impl Into<String>, sample: f64, line: f64) -> Self {
        Self {
            serial_number: serial_number.into(),
            measure_type: MeasureType::Candidate,
            sample,
            line,
            sample_residual: 0.0,
            line_residual: 0.0,
            ignored: false,
            edit_lock: false,
            chooser_name: None,
            date_time: None,
        }
    }

    /// Builder-style setter for the residual pair.
    pub fn with_residuals(mut self, sample_residual: f64, line_residual: f64) -> Self {
        self.sample_residual = sample_residual;
        self.line_residual = line_residual;
        self
    }

    /// Builder-style setter for the measure type.
    pub fn with_type(mut self, measure_type: MeasureType) -> Self {
        self.measure_type = measure_type;
        self
    }

    /// Builder-style setter for the ignore flag.
    pub fn ignored(mut self, ignored: bool) -> Self {
        self.ignored = ignored;
        self
    }

    /// Euclidean length of the residual vector in pixels.
    pub fn residual_magnitude(&self) -> f64 {
        self.sample_residual.hypot(self.line_residual)
    }

    /// True when the measure counts toward statistics.
    pub fn is_valid(&self) -> bool {
        !self.ignored
    }

    /// True when the location came from an automatic registration.
    pub fn is_registered(&self) -> bool {
        matches!(
            self.measure_type,
            MeasureType::RegisteredPixel | MeasureType::RegisteredSubPixel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_residual_magnitude() {
        let m = ControlMeasure::new("img1", 10.0, 20.0).with_residuals(3.0, 4.0);
        assert_relative_eq!(m.residual_magnitude(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ignored_measure_is_not_valid() {
        let m = ControlMeasure::new("img1", 0.0, 0.0).ignored(true);
        assert!(!m.is_valid());
        assert!(ControlMeasure::new("img1", 0.0, 0.0).is_valid());
    }

    #[test]
    fn test_registered_types() {
        let m = ControlMeasure::new("img1", 0.0, 0.0).with_type(MeasureType::RegisteredSubPixel);
        assert!(m.is_registered());
        assert!(!ControlMeasure::new("img1", 0.0, 0.0)
            .with_type(MeasureType::Manual)
            .is_registered());
    }
}
