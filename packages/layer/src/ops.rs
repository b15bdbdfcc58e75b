//! Attribute operations over layers: key joins, field drops, and field
//! calculation.
//!
//! Each operation consumes a [`Layer`] and returns a new one, so a failed
//! operation never leaves a half-updated layer behind.

use std::collections::BTreeMap;

use urban_index_layer_models::{Feature, FieldDef, FieldValue, Layer, Table};

use crate::LayerError;

/// Outcome of [`join_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSummary {
    /// Features that found a matching table row.
    pub matched: usize,
    /// Features with no match (their joined fields are null).
    pub unmatched: usize,
    /// Names of the fields appended to the layer, after conflict renaming.
    pub joined_fields: Vec<String>,
}

/// Joins table rows onto layer features where `layer[in_field]` equals
/// `table[join_field]`.
///
/// The layer keeps every feature. Unmatched features receive null for the
/// joined fields. When several rows share a key the first one wins. Joined
/// fields default to every table field except `join_field`; a joined name
/// that already exists in the layer is suffixed `_1`, `_2`, ...
///
/// # Errors
///
/// Returns [`LayerError::MissingField`] if `in_field` is not in the layer,
/// or `join_field` or any of `fields` is not in the table.
pub fn join_table(
    layer: Layer,
    in_field: &str,
    table: &Table,
    join_field: &str,
    fields: Option<&[String]>,
) -> Result<(Layer, JoinSummary), LayerError> {
    if !layer.has_field(in_field) {
        return Err(missing(in_field, "input layer"));
    }
    if !table.has_field(join_field) {
        return Err(missing(join_field, "join table"));
    }

    let selected: Vec<&FieldDef> = match fields {
        Some(names) => names
            .iter()
            .map(|name| table.field(name).ok_or_else(|| missing(name, "join table")))
            .collect::<Result<_, _>>()?,
        None => table.fields.iter().filter(|f| f.name != join_field).collect(),
    };

    let Layer {
        mut fields,
        mut features,
    } = layer;

    // (source name in table, target name in layer)
    let mut mapping = Vec::with_capacity(selected.len());
    for field in selected {
        let target = urban_index_layer_models::unique_field_name(&fields, &field.name);
        if target != field.name {
            log::debug!("Joined field '{}' renamed to '{target}'", field.name);
        }
        fields.push(FieldDef {
            name: target.clone(),
            kind: field.kind,
        });
        mapping.push((field.name.as_str(), target));
    }

    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    let mut duplicates = 0usize;
    for (i, row) in table.rows.iter().enumerate() {
        let Some(key) = row.get(join_field).and_then(FieldValue::join_key) else {
            continue;
        };
        if index.contains_key(&key) {
            duplicates += 1;
        } else {
            index.insert(key, i);
        }
    }
    if duplicates > 0 {
        log::warn!(
            "Join table has {duplicates} duplicate key(s) in '{join_field}'; first row wins"
        );
    }

    let mut matched = 0usize;
    for feature in &mut features {
        let row = feature
            .get(in_field)
            .join_key()
            .and_then(|key| index.get(&key))
            .map(|&i| &table.rows[i]);

        if row.is_some() {
            matched += 1;
        }

        for (source, target) in &mapping {
            let value = row
                .and_then(|r| r.get(*source))
                .cloned()
                .unwrap_or_default();
            feature.attributes.insert(target.clone(), value);
        }
    }

    let summary = JoinSummary {
        matched,
        unmatched: features.len() - matched,
        joined_fields: mapping.into_iter().map(|(_, target)| target).collect(),
    };

    log::info!(
        "Joined {}/{} features on {in_field} = {join_field} ({} field(s))",
        summary.matched,
        features.len(),
        summary.joined_fields.len()
    );
    if summary.unmatched > 0 {
        log::warn!("{} feature(s) had no matching row", summary.unmatched);
    }

    Ok((Layer::new(fields, features), summary))
}

/// Removes the named fields from the schema and from every feature.
///
/// Names that are not in the layer are ignored.
#[must_use]
pub fn drop_fields(layer: Layer, names: &[String]) -> Layer {
    let Layer {
        mut fields,
        mut features,
    } = layer;

    let before = fields.len();
    fields.retain(|f| !names.contains(&f.name));
    log::debug!("Dropped {} of {} requested field(s)", before - fields.len(), names.len());

    for feature in &mut features {
        feature.attributes.retain(|name, _| !names.contains(name));
    }

    Layer::new(fields, features)
}

/// Adds (or replaces) `field`, computing each feature's value with
/// `calculate`.
#[must_use]
pub fn calculate_field(
    layer: Layer,
    field: FieldDef,
    mut calculate: impl FnMut(&Feature) -> FieldValue,
) -> Layer {
    let Layer {
        mut fields,
        mut features,
    } = layer;

    for feature in &mut features {
        let value = calculate(feature);
        feature.attributes.insert(field.name.clone(), value);
    }

    upsert_field(&mut fields, field);
    Layer::new(fields, features)
}

/// Adds (or replaces) `field` with precomputed per-feature `values`, in
/// feature order.
///
/// # Errors
///
/// Returns [`LayerError::InvalidLayer`] if `values` does not have exactly
/// one entry per feature.
pub fn add_field_values(
    layer: Layer,
    field: FieldDef,
    values: Vec<FieldValue>,
) -> Result<Layer, LayerError> {
    if values.len() != layer.len() {
        return Err(LayerError::InvalidLayer {
            message: format!(
                "field '{}' has {} value(s) for {} feature(s)",
                field.name,
                values.len(),
                layer.len()
            ),
        });
    }

    let Layer {
        mut fields,
        mut features,
    } = layer;

    for (feature, value) in features.iter_mut().zip(values) {
        feature.attributes.insert(field.name.clone(), value);
    }

    upsert_field(&mut fields, field);
    Ok(Layer::new(fields, features))
}

fn upsert_field(fields: &mut Vec<FieldDef>, field: FieldDef) {
    if let Some(existing) = fields.iter_mut().find(|f| f.name == field.name) {
        *existing = field;
    } else {
        fields.push(field);
    }
}

fn missing(field: &str, dataset: &str) -> LayerError {
    LayerError::MissingField {
        field: field.to_string(),
        dataset: dataset.to_string(),
    }
}
