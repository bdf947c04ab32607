//! Serialized record types and their translation to graph objects.

use log::debug;
use serde::{Deserialize, Serialize};
use uom::si::f64::Length;
use uom::si::length::meter;

use crate::graph::GraphError;
use crate::header::NetworkHeader;
use crate::measure::{ControlMeasure, MeasureType};
use crate::point::{ControlPoint, PointType, SurfacePoint};
use crate::target::TargetRadii;

/// Header block of a persisted network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRecord {
    pub network_id: String,
    pub target_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_modified: String,
}

impl From<HeaderRecord> for NetworkHeader {
    fn from(record: HeaderRecord) -> Self {
        Self {
            network_id: record.network_id,
            target_name: record.target_name,
            description: record.description,
            user_name: record.user_name,
            created: record.created,
            last_modified: record.last_modified,
        }
    }
}

impl From<&NetworkHeader> for HeaderRecord {
    fn from(header: &NetworkHeader) -> Self {
        Self {
            network_id: header.network_id.clone(),
            target_name: header.target_name.clone(),
            description: header.description.clone(),
            user_name: header.user_name.clone(),
            created: header.created.clone(),
            last_modified: header.last_modified.clone(),
        }
    }
}

/// Latitude/longitude with an optional radius in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRecord {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_meters: Option<f64>,
}

impl SurfaceRecord {
    /// Resolve into a surface point. A missing radius is taken from the
    /// target spheroid; without radii only latitude/longitude are kept.
    fn to_surface_point(self, radii: Option<&TargetRadii>) -> SurfacePoint {
        let radius = match (self.radius_meters, radii) {
            (Some(r), _) => Some(Length::new::<meter>(r)),
            (None, Some(radii)) => Some(radii.local_radius(self.latitude)),
            (None, None) => None,
        };
        SurfacePoint {
            latitude: self.latitude,
            longitude: self.longitude,
            radius,
        }
    }
}

impl From<&SurfacePoint> for SurfaceRecord {
    fn from(sp: &SurfacePoint) -> Self {
        Self {
            latitude: sp.latitude,
            longitude: sp.longitude,
            radius_meters: sp.radius.map(|r| r.get::<meter>()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureRecord {
    pub serial_number: String,
    #[serde(default)]
    pub measure_type: MeasureType,
    pub sample: f64,
    pub line: f64,
    #[serde(default)]
    pub sample_residual: f64,
    #[serde(default)]
    pub line_residual: f64,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub edit_lock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chooser_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
}

impl From<&MeasureRecord> for ControlMeasure {
    fn from(record: &MeasureRecord) -> Self {
        Self {
            serial_number: record.serial_number.clone(),
            measure_type: record.measure_type,
            sample: record.sample,
            line: record.line,
            sample_residual: record.sample_residual,
            line_residual: record.line_residual,
            ignored: record.ignored,
            edit_lock: record.edit_lock,
            chooser_name: record.chooser_name.clone(),
            date_time: record.date_time.clone(),
        }
    }
}

impl From<&ControlMeasure> for MeasureRecord {
    fn from(m: &ControlMeasure) -> Self {
        Self {
            serial_number: m.serial_number.clone(),
            measure_type: m.measure_type,
            sample: m.sample,
            line: m.line,
            sample_residual: m.sample_residual,
            line_residual: m.line_residual,
            ignored: m.ignored,
            edit_lock: m.edit_lock,
            chooser_name: m.chooser_name.clone(),
            date_time: m.date_time.clone(),
        }
    }
}

/// One persisted control point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointRecord {
    pub id: String,
    #[serde(default)]
    pub point_type: PointType,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub edit_lock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apriori: Option<SurfaceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjusted: Option<SurfaceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chooser_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default)]
    pub measures: Vec<MeasureRecord>,
}

impl PointRecord {
    /// Build the in-memory point for this record.
    ///
    /// # Errors
    /// * `GraphError::EmptyPoint` - record has no measures
    /// * `GraphError::DuplicateSerial` - two measures on the same image
    /// * `GraphError::InvalidReference` - reference index out of range
    pub fn to_point(&self, radii: Option<&TargetRadii>) -> Result<ControlPoint, GraphError> {
        if self.measures.is_empty() {
            return Err(GraphError::EmptyPoint(self.id.clone()));
        }

        let mut point =
            ControlPoint::with_measures(self.id.clone(), self.measures.iter().map(Into::into))?;

        if let Some(index) = self.reference_index {
            if index >= point.num_measures() {
                return Err(GraphError::InvalidReference {
                    point_id: self.id.clone(),
                    index,
                });
            }
        }

        point.point_type = self.point_type;
        point.ignored = self.ignored;
        point.edit_lock = self.edit_lock;
        point.reference_index = self.reference_index;
        point.chooser_name = self.chooser_name.clone();
        point.date_time = self.date_time.clone();
        point.apriori = self.apriori.map(|s| s.to_surface_point(radii));
        point.adjusted = self.adjusted.map(|s| s.to_surface_point(radii));

        let unplaced = |sp: &Option<SurfacePoint>| sp.is_some_and(|sp| !sp.has_radius());
        if unplaced(&point.apriori) || unplaced(&point.adjusted) {
            debug!(
                "Point {} has a surface location without radius and no target radii",
                self.id
            );
        }
        Ok(point)
    }
}

impl From<&ControlPoint> for PointRecord {
    fn from(point: &ControlPoint) -> Self {
        Self {
            id: point.id.clone(),
            point_type: point.point_type,
            ignored: point.ignored,
            edit_lock: point.edit_lock,
            reference_index: point.reference_index,
            apriori: point.apriori.as_ref().map(Into::into),
            adjusted: point.adjusted.as_ref().map(Into::into),
            chooser_name: point.chooser_name.clone(),
            date_time: point.date_time.clone(),
            measures: point.measures().iter().map(Into::into).collect(),
        }
    }
}
