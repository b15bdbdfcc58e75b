//! `GeoJSON` feature collection codec for [`Layer`].
//!
//! Properties become attributes: JSON numbers map to
//! [`FieldValue::Number`], strings to [`FieldValue::Text`], `null` to
//! [`FieldValue::Null`]. Anything else (booleans, nested objects) is kept
//! as its JSON text.

use std::collections::BTreeMap;

use geojson::{FeatureCollection, GeoJson};
use serde_json::{Map, Number, Value};
use urban_index_layer_models::{Attributes, Feature, FieldDef, FieldKind, FieldValue, Layer};

use crate::LayerError;

/// Parses a `GeoJSON` document into a [`Layer`].
///
/// Accepts a `FeatureCollection` or a single `Feature`. Field kinds are
/// taken from the first non-null value seen for each property; properties
/// that are null everywhere are typed as text.
///
/// # Errors
///
/// Returns [`LayerError::GeoJson`] if the document is not valid `GeoJSON`
/// or a geometry cannot be converted, and [`LayerError::InvalidLayer`] if
/// the document is a bare geometry.
pub fn parse_layer(text: &str) -> Result<Layer, LayerError> {
    let geojson: GeoJson = text.parse()?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(LayerError::InvalidLayer {
                message: "expected a Feature or FeatureCollection, found a bare geometry"
                    .to_string(),
            });
        }
    };

    let mut order: Vec<String> = Vec::new();
    let mut kinds: BTreeMap<String, Option<FieldKind>> = BTreeMap::new();
    let mut out = Vec::with_capacity(features.len());

    for feature in features {
        let geometry = feature
            .geometry
            .map(geo::Geometry::<f64>::try_from)
            .transpose()?;

        let mut attributes = Attributes::new();
        for (name, value) in feature.properties.unwrap_or_default() {
            let value = json_to_value(value);
            let kind = kinds.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                None
            });
            if kind.is_none() {
                *kind = match &value {
                    FieldValue::Null => None,
                    FieldValue::Number(_) => Some(FieldKind::Double),
                    FieldValue::Text(_) => Some(FieldKind::Text),
                };
            }
            attributes.insert(name, value);
        }

        out.push(Feature::new(geometry, attributes));
    }

    let fields = order
        .into_iter()
        .map(|name| {
            let kind = kinds.get(&name).copied().flatten().unwrap_or(FieldKind::Text);
            FieldDef { name, kind }
        })
        .collect();

    log::debug!("Parsed {} GeoJSON features", out.len());

    Ok(Layer::new(fields, out))
}

/// Converts a [`Layer`] into a `GeoJSON` [`FeatureCollection`].
///
/// Every feature carries every schema field, in schema order. Non-finite
/// numbers are written as `null`.
#[must_use]
pub fn to_feature_collection(layer: &Layer) -> FeatureCollection {
    let features = layer
        .features
        .iter()
        .map(|feature| {
            let mut properties = Map::new();
            for field in &layer.fields {
                properties.insert(
                    field.name.clone(),
                    value_to_json(feature.get(&field.name), field.kind),
                );
            }

            geojson::Feature {
                bbox: None,
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Serializes a [`Layer`] to pretty-printed `GeoJSON` text.
///
/// # Errors
///
/// Returns [`LayerError::Json`] if serialization fails.
pub fn to_geojson_string(layer: &Layer) -> Result<String, LayerError> {
    Ok(serde_json::to_string_pretty(&to_feature_collection(layer))?)
}

fn json_to_value(value: Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Number(n) => n.as_f64().map_or(FieldValue::Null, FieldValue::Number),
        Value::String(s) => FieldValue::Text(s),
        other => FieldValue::Text(other.to_string()),
    }
}

fn value_to_json(value: &FieldValue, kind: FieldKind) -> Value {
    let number = |n: f64| Number::from_f64(n).map_or(Value::Null, Value::Number);

    match (value, kind) {
        (FieldValue::Null, _) => Value::Null,
        (FieldValue::Number(n), FieldKind::Double) => number(*n),
        (FieldValue::Number(n), FieldKind::Text) => Value::String(n.to_string()),
        (FieldValue::Text(s), FieldKind::Double) => {
            s.trim().parse::<f64>().map_or_else(|_| Value::String(s.clone()), number)
        }
        (FieldValue::Text(s), FieldKind::Text) => Value::String(s.clone()),
    }
}
