//! Target body radii lookup.
//!
//! A network names its target body in the header. Point construction needs the
//! body's triaxial shape (reduced here to an oblate spheroid) to fill in radii
//! for surface points that only carry latitude and longitude. Radii are
//! resolved once per graph build through a [`TargetRadiiSource`].

use std::collections::HashMap;

use thiserror::Error;
use uom::si::f64::Length;
use uom::si::length::{kilometer, meter};

/// Errors from target body lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("Unknown target body: {0}")]
    UnknownTarget(String),
}

/// Equatorial and polar radius of a target body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetRadii {
    pub equatorial: Length,
    pub polar: Length,
}

impl TargetRadii {
    pub fn new(equatorial: Length, polar: Length) -> Self {
        Self { equatorial, polar }
    }

    /// Convenience constructor from kilometres.
    pub fn from_km(equatorial_km: f64, polar_km: f64) -> Self {
        Self {
            equatorial: Length::new::<kilometer>(equatorial_km),
            polar: Length::new::<kilometer>(polar_km),
        }
    }

    /// Radius of the spheroid surface at a planetocentric latitude.
    ///
    /// `r = a·b / sqrt((b·cosφ)² + (a·sinφ)²)`
    pub fn local_radius(&self, latitude_deg: f64) -> Length {
        let a = self.equatorial.get::<meter>();
        let b = self.polar.get::<meter>();
        let phi = latitude_deg.to_radians();
        let denom = ((b * phi.cos()).powi(2) + (a * phi.sin()).powi(2)).sqrt();
        if denom == 0.0 {
            return Length::new::<meter>(0.0);
        }
        Length::new::<meter>(a * b / denom)
    }

    /// Flattening `(a - b) / a`.
    pub fn flattening(&self) -> f64 {
        let a = self.equatorial.get::<meter>();
        if a == 0.0 {
            return 0.0;
        }
        (a - self.polar.get::<meter>()) / a
    }
}

/// Collaborator that turns a target body name into radii.
pub trait TargetRadiiSource: Send + Sync {
    fn radii(&self, target: &str) -> Result<TargetRadii, TargetError>;
}

/// Built-in table of IAU mean equatorial/polar radii (km).
const BUILTIN_BODIES: &[(&str, f64, f64)] = &[
    ("SUN", 695_700.0, 695_700.0),
    ("MERCURY", 2440.53, 2438.26),
    ("VENUS", 6051.8, 6051.8),
    ("EARTH", 6378.1366, 6356.7519),
    ("MOON", 1737.4, 1737.4),
    ("MARS", 3396.19, 3376.20),
    ("PHOBOS", 13.0, 9.1),
    ("DEIMOS", 7.8, 5.1),
    ("CERES", 482.1, 445.9),
    ("VESTA", 286.3, 223.2),
    ("IO", 1821.49, 1815.33),
    ("EUROPA", 1560.8, 1560.8),
    ("GANYMEDE", 2631.2, 2631.2),
    ("CALLISTO", 2410.3, 2410.3),
    ("TITAN", 2575.0, 2575.0),
    ("ENCELADUS", 252.1, 248.6),
];

/// In-memory target table, case-insensitive.
#[derive(Debug, Clone)]
pub struct KnownTargets {
    bodies: HashMap<String, TargetRadii>,
}

impl KnownTargets {
    /// Table with no entries.
    pub fn empty() -> Self {
        Self {
            bodies: HashMap::new(),
        }
    }

    /// Add or replace a body.
    pub fn with_target(mut self, name: &str, radii: TargetRadii) -> Self {
        self.bodies.insert(Self::key(name), radii);
        self
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn key(name: &str) -> String {
        name.trim().to_ascii_uppercase()
    }
}

impl Default for KnownTargets {
    fn default() -> Self {
        BUILTIN_BODIES
            .iter()
            .fold(Self::empty(), |table, &(name, eq, polar)| {
                table.with_target(name, TargetRadii::from_km(eq, polar))
            })
    }
}

impl TargetRadiiSource for KnownTargets {
    fn radii(&self, target: &str) -> Result<TargetRadii, TargetError> {
        self.bodies
            .get(&Self::key(target))
            .copied()
            .ok_or_else(|| TargetError::UnknownTarget(target.to_string()))
    }
}
