//! R-tree spatial join that sums a measured field into boundaries.
//!
//! Boundary polygons are bulk-loaded into an R-tree keyed on their bounding
//! boxes. Each measured feature is matched against the boundaries whose
//! envelopes overlap its own, then confirmed with an exact intersection
//! test.

use std::sync::Arc;

use geo::{BoundingRect, Centroid, Geometry, Intersects};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use urban_index_layer::progress::ProgressCallback;
use urban_index_layer::{Feature, FieldDef, FieldValue, Layer, unique_field_name};

use crate::SpatialError;

/// Name of the per-boundary feature count field.
pub const JOIN_COUNT_FIELD: &str = "Join_Count";

/// How a feature that intersects several boundaries is attributed.
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
pub enum AttributionRule {
    /// Each feature counts toward exactly one boundary: the first (in layer
    /// order) containing its centroid, else the first it intersects.
    #[default]
    Exclusive,
    /// Each feature counts toward every boundary it intersects.
    AllIntersecting,
}

/// A boundary geometry stored in the R-tree with its position in the
/// target layer.
struct BoundaryEntry {
    index: usize,
    envelope: AABB<[f64; 2]>,
    geometry: Geometry<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index over the boundaries of a target layer.
pub struct BoundaryIndex {
    tree: RTree<BoundaryEntry>,
}

impl BoundaryIndex {
    /// Builds the index from every feature of `boundaries` that has a
    /// geometry. Indices returned by lookups refer to positions in
    /// `boundaries.features`.
    #[must_use]
    pub fn build(boundaries: &Layer) -> Self {
        let mut skipped = 0usize;
        let entries: Vec<BoundaryEntry> = boundaries
            .features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let geometry = feature.geometry.clone();
                let envelope = geometry.as_ref().and_then(compute_envelope);
                match (geometry, envelope) {
                    (Some(geometry), Some(envelope)) => Some(BoundaryEntry {
                        index,
                        envelope,
                        geometry,
                    }),
                    _ => {
                        skipped += 1;
                        None
                    }
                }
            })
            .collect();

        if skipped > 0 {
            log::warn!(
                "{skipped} boundary feature(s) have no geometry and cannot receive features"
            );
        }

        let tree = RTree::bulk_load(entries);
        log::debug!("Loaded {} boundaries into spatial index", tree.size());

        Self { tree }
    }

    /// Positions of every boundary that intersects `geometry`, ascending.
    #[must_use]
    pub fn intersecting(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .candidates(geometry)
            .into_iter()
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Positions of the boundaries `geometry` is attributed to under `rule`.
    #[must_use]
    pub fn attribute(&self, geometry: &Geometry<f64>, rule: AttributionRule) -> Vec<usize> {
        let mut candidates = self.candidates(geometry);
        candidates.sort_unstable_by_key(|entry| entry.index);

        match rule {
            AttributionRule::AllIntersecting => {
                candidates.into_iter().map(|entry| entry.index).collect()
            }
            AttributionRule::Exclusive => {
                let centroid = geometry.centroid();
                let chosen = centroid
                    .and_then(|point| {
                        candidates
                            .iter()
                            .find(|entry| entry.geometry.intersects(&point))
                    })
                    .or_else(|| candidates.first());
                chosen.map(|entry| entry.index).into_iter().collect()
            }
        }
    }

    fn candidates(&self, geometry: &Geometry<f64>) -> Vec<&BoundaryEntry> {
        let Some(envelope) = compute_envelope(geometry) else {
            return Vec::new();
        };
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| entry.geometry.intersects(geometry))
            .collect()
    }
}

/// Counts from a [`spatial_join_sum`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateSummary {
    /// Features attributed to at least one boundary.
    pub attributed: usize,
    /// Features that intersect no boundary.
    pub unattributed: usize,
    /// Features skipped for lacking a geometry or a numeric measure.
    pub skipped: usize,
}

/// Sums `field` of `features` into each boundary of `boundaries`.
///
/// The output keeps every boundary with its attributes, in order, and adds
/// `Join_Count` plus the summed field (both suffixed `_1`, `_2`, ... if the
/// name is taken). Boundaries with no features receive a count and sum of
/// `0`.
///
/// # Errors
///
/// Returns [`SpatialError::MissingField`] if `field` is not in
/// `features`.
pub fn spatial_join_sum(
    boundaries: &Layer,
    features: &Layer,
    field: &str,
    rule: AttributionRule,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<(Layer, AggregateSummary), SpatialError> {
    if !features.has_field(field) {
        return Err(SpatialError::MissingField {
            field: field.to_string(),
            dataset: "measured layer".to_string(),
        });
    }

    let index = BoundaryIndex::build(boundaries);
    let mut sums = vec![0.0_f64; boundaries.len()];
    let mut counts = vec![0u64; boundaries.len()];
    let mut summary = AggregateSummary::default();

    progress.set_total(features.len() as u64);
    progress.set_message(format!("Aggregating {field}"));

    for feature in &features.features {
        progress.inc(1);

        let (Some(geometry), Some(value)) = (&feature.geometry, feature.get(field).as_f64())
        else {
            summary.skipped += 1;
            continue;
        };

        let targets = index.attribute(geometry, rule);
        if targets.is_empty() {
            summary.unattributed += 1;
            continue;
        }

        summary.attributed += 1;
        for target in targets {
            sums[target] += value;
            counts[target] += 1;
        }
    }

    let mut fields = boundaries.fields.clone();
    let count_field = unique_field_name(&fields, JOIN_COUNT_FIELD);
    fields.push(FieldDef::double(count_field.clone()));
    let sum_field = unique_field_name(&fields, field);
    fields.push(FieldDef::double(sum_field.clone()));

    #[allow(clippy::cast_precision_loss)]
    let out: Vec<Feature> = boundaries
        .features
        .iter()
        .zip(sums.iter().zip(&counts))
        .map(|(boundary, (&sum, &count))| {
            let mut feature = boundary.clone();
            feature
                .attributes
                .insert(count_field.clone(), FieldValue::Number(count as f64));
            feature
                .attributes
                .insert(sum_field.clone(), FieldValue::Number(sum));
            feature
        })
        .collect();

    progress.finish(format!(
        "Aggregated {} feature(s) into {} boundaries",
        summary.attributed,
        boundaries.len()
    ));

    log::info!(
        "Spatial join ({rule}): {} attributed, {} outside all boundaries, {} skipped",
        summary.attributed,
        summary.unattributed,
        summary.skipped
    );

    Ok((Layer::new(fields, out), summary))
}

/// Compute the bounding box envelope for a geometry.
fn compute_envelope(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
