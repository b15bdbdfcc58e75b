#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature, layer and attribute table types.
//!
//! These types are the in-memory form of the boundary layers (counties,
//! metro areas), the OSM road/building layers, and the index/census tables
//! that the pipeline stages read, transform, and write back out.

use std::collections::BTreeMap;
use std::fmt;

use geo::Geometry;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Attribute values of a single feature or table row, keyed by field name.
pub type Attributes = BTreeMap<String, FieldValue>;

static NULL_VALUE: FieldValue = FieldValue::Null;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// No value (unmatched join, empty CSV cell, JSON `null`).
    #[default]
    Null,
    /// A numeric value.
    Number(f64),
    /// A text value. Numeric accessors still parse it.
    Text(String),
}

impl FieldValue {
    /// Returns `true` if this is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of this value.
    ///
    /// Text is trimmed and parsed, so `"12.5"` read from a CSV cell and
    /// `12.5` read from a `GeoJSON` property behave the same.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Canonical text used to match rows in an attribute join.
    ///
    /// Integral numbers print without a fractional part (`6037.0` becomes
    /// `"6037"`). Text is trimmed and never reinterpreted, so a zero-padded
    /// code such as `"06037"` only matches the same text.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    pub fn join_key(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Number(n) if !n.is_finite() => None,
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some((*n as i64).to_string())
                } else {
                    Some(n.to_string())
                }
            }
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Storage type of a field.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum FieldKind {
    /// Free text (names, zero-padded codes).
    Text,
    /// Double-precision number.
    Double,
}

/// A named, typed field in a layer or table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name as it appears in the source data (e.g. `"ALAND"`).
    pub name: String,
    /// Storage type.
    pub kind: FieldKind,
}

impl FieldDef {
    /// Creates a text field definition.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
        }
    }

    /// Creates a double field definition.
    #[must_use]
    pub fn double(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Double,
        }
    }
}

/// Coarse geometry type of a feature or layer.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum GeometryKind {
    /// Points and multipoints.
    Point,
    /// Lines, line strings, and multi line strings.
    Line,
    /// Polygons, multipolygons, rects, and triangles.
    Polygon,
    /// A collection, or a layer whose features disagree.
    Mixed,
}

impl GeometryKind {
    /// Classifies a single geometry.
    #[must_use]
    pub const fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Self::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Self::Line
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Self::Polygon,
            Geometry::GeometryCollection(_) => Self::Mixed,
        }
    }
}

/// A geographic feature: optional geometry plus attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    /// Feature geometry, `None` for null-geometry features.
    pub geometry: Option<Geometry<f64>>,
    /// Attribute values keyed by field name.
    pub attributes: Attributes,
}

impl Feature {
    /// Creates a feature from a geometry and attributes.
    #[must_use]
    pub const fn new(geometry: Option<Geometry<f64>>, attributes: Attributes) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    /// Returns the value of `field`, or [`FieldValue::Null`] if absent.
    #[must_use]
    pub fn get(&self, field: &str) -> &FieldValue {
        self.attributes.get(field).unwrap_or(&NULL_VALUE)
    }
}

/// A vector layer: an ordered schema and its features.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layer {
    /// Ordered field schema.
    pub fields: Vec<FieldDef>,
    /// Features in source order.
    pub features: Vec<Feature>,
}

impl Layer {
    /// Creates a layer from a schema and features.
    #[must_use]
    pub const fn new(fields: Vec<FieldDef>, features: Vec<Feature>) -> Self {
        Self { fields, features }
    }

    /// Number of features.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the layer has no features.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Looks up a field definition by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        find_field(&self.fields, name)
    }

    /// Returns `true` if the schema contains `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Returns `base` if unused, otherwise the first free `base_N`.
    #[must_use]
    pub fn unique_field_name(&self, base: &str) -> String {
        unique_field_name(&self.fields, base)
    }

    /// Geometry kind shared by every non-null geometry in the layer.
    ///
    /// Returns `None` when no feature has a geometry, and
    /// [`GeometryKind::Mixed`] when features disagree.
    #[must_use]
    pub fn geometry_kind(&self) -> Option<GeometryKind> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .map(GeometryKind::of)
            .reduce(|acc, kind| if acc == kind { acc } else { GeometryKind::Mixed })
    }
}

/// An attribute table (no geometry).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Ordered field schema.
    pub fields: Vec<FieldDef>,
    /// Rows in source order.
    pub rows: Vec<Attributes>,
}

impl Table {
    /// Creates a table from a schema and rows.
    #[must_use]
    pub const fn new(fields: Vec<FieldDef>, rows: Vec<Attributes>) -> Self {
        Self { fields, rows }
    }

    /// Looks up a field definition by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        find_field(&self.fields, name)
    }

    /// Returns `true` if the schema contains `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}

fn find_field<'a>(fields: &'a [FieldDef], name: &str) -> Option<&'a FieldDef> {
    fields.iter().find(|f| f.name == name)
}

/// Returns `base` if no field in `fields` uses it, otherwise `base_1`,
/// `base_2`, ... (the first one that is free).
#[must_use]
pub fn unique_field_name(fields: &[FieldDef], base: &str) -> String {
    if find_field(fields, base).is_none() {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| find_field(fields, candidate).is_none())
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Point, Polygon};

    use super::*;

    fn square() -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]),
            vec![],
        ))
    }

    #[test]
    fn join_key_drops_integral_fraction() {
        assert_eq!(FieldValue::Number(6037.0).join_key().as_deref(), Some("6037"));
        assert_eq!(FieldValue::Number(1.5).join_key().as_deref(), Some("1.5"));
    }

    #[test]
    fn join_key_keeps_zero_padded_text() {
        assert_eq!(FieldValue::from(" 06037 ").join_key().as_deref(), Some("06037"));
        assert_eq!(FieldValue::from("   ").join_key(), None);
        assert_eq!(FieldValue::Null.join_key(), None);
        assert_eq!(FieldValue::Number(f64::NAN).join_key(), None);
    }

    #[test]
    fn as_f64_parses_text() {
        assert_eq!(FieldValue::from("12.5").as_f64(), Some(12.5));
        assert_eq!(FieldValue::from("abc").as_f64(), None);
        assert_eq!(FieldValue::Null.as_f64(), None);
    }

    #[test]
    fn missing_attribute_reads_as_null() {
        let feature = Feature::default();
        assert!(feature.get("ALAND").is_null());
    }

    #[test]
    fn geometry_kind_of_layer() {
        let mut layer = Layer::new(vec![], vec![Feature::new(Some(square()), Attributes::new())]);
        assert_eq!(layer.geometry_kind(), Some(GeometryKind::Polygon));

        layer.features.push(Feature::default());
        assert_eq!(layer.geometry_kind(), Some(GeometryKind::Polygon));

        layer.features.push(Feature::new(
            Some(Geometry::Point(Point::new(0.0, 0.0))),
            Attributes::new(),
        ));
        assert_eq!(layer.geometry_kind(), Some(GeometryKind::Mixed));

        assert_eq!(Layer::default().geometry_kind(), None);
    }

    #[test]
    fn unique_field_name_appends_suffix() {
        let fields = vec![FieldDef::text("name"), FieldDef::text("name_1")];
        assert_eq!(unique_field_name(&fields, "name"), "name_2");
        assert_eq!(unique_field_name(&fields, "GEOID"), "GEOID");
    }

    #[test]
    fn field_kind_parses_from_config_text() {
        assert_eq!("double".parse::<FieldKind>().ok(), Some(FieldKind::Double));
        assert_eq!(GeometryKind::Line.to_string(), "line");
    }
}
