//! Per-feature length and area measurement.
//!
//! Coordinates are assumed to be projected (the California layers use
//! State Plane feet). Lengths are converted to international feet and areas
//! to square feet using the layer's [`LinearUnit`].

use geo::{Area, Euclidean, Geometry, Length};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use urban_index_layer::ops::calculate_field;
use urban_index_layer::{FieldDef, FieldValue, GeometryKind, Layer};

use crate::SpatialError;

const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_US_SURVEY_FOOT: f64 = 1200.0 / 3937.0;

/// Linear unit of a layer's projected coordinates.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinearUnit {
    /// International foot.
    #[default]
    Foot,
    /// US survey foot (older State Plane definitions).
    UsSurveyFoot,
    /// Metre.
    Meter,
}

impl LinearUnit {
    /// Number of international feet in one unit.
    #[must_use]
    pub fn feet_per_unit(self) -> f64 {
        match self {
            Self::Foot => 1.0,
            Self::UsSurveyFoot => METERS_PER_US_SURVEY_FOOT / METERS_PER_FOOT,
            Self::Meter => 1.0 / METERS_PER_FOOT,
        }
    }
}

/// Which measure a layer receives, decided by its geometry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum MeasureKind {
    /// Line layers: length in feet.
    Length,
    /// Polygon layers: area in square feet.
    Area,
}

impl MeasureKind {
    /// Name of the attribute that receives the measure.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Length => "FEET",
            Self::Area => "SQFT",
        }
    }

    /// Measure for a layer of the given geometry kind, if one applies.
    #[must_use]
    pub const fn for_geometry(kind: GeometryKind) -> Option<Self> {
        match kind {
            GeometryKind::Line => Some(Self::Length),
            GeometryKind::Polygon => Some(Self::Area),
            GeometryKind::Point | GeometryKind::Mixed => None,
        }
    }

    /// Measures one geometry in feet or square feet.
    #[must_use]
    pub fn measure(self, geometry: &Geometry<f64>, unit: LinearUnit) -> f64 {
        let factor = unit.feet_per_unit();
        match self {
            Self::Length => planar_length(geometry) * factor,
            Self::Area => geometry.unsigned_area() * factor * factor,
        }
    }
}

/// Adds the length (`FEET`) or area (`SQFT`) field to every feature of a
/// line or polygon layer. Features without geometry measure `0`.
///
/// # Errors
///
/// Returns [`SpatialError::UnsupportedGeometry`] if the layer is empty, a
/// point layer, or mixes geometry types.
pub fn measure_layer(layer: Layer, unit: LinearUnit) -> Result<(Layer, MeasureKind), SpatialError> {
    let found = layer.geometry_kind();
    let kind = found
        .and_then(MeasureKind::for_geometry)
        .ok_or_else(|| SpatialError::UnsupportedGeometry {
            operation: "measurement (expected lines or polygons)",
            found: found.map_or_else(|| "empty".to_string(), |k| k.to_string()),
        })?;

    log::info!(
        "Measuring {} feature(s): {kind} in {} into '{}'",
        layer.len(),
        unit,
        kind.field_name()
    );

    let layer = calculate_field(layer, FieldDef::double(kind.field_name()), |feature| {
        FieldValue::Number(
            feature
                .geometry
                .as_ref()
                .map_or(0.0, |g| kind.measure(g, unit)),
        )
    });

    Ok((layer, kind))
}

fn planar_length(geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Line(line) => Euclidean.length(line),
        Geometry::LineString(ls) => Euclidean.length(ls),
        Geometry::MultiLineString(mls) => Euclidean.length(mls),
        _ => 0.0,
    }
}
