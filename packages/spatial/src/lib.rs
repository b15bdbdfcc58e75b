#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry measurement and spatial aggregation onto boundary layers.
//!
//! [`measure`] annotates road lines with their length in feet and building
//! polygons with their area in square feet. [`join`] bulk-loads boundary
//! polygons into an R-tree and sums a measured field over the features that
//! fall in each boundary.

pub mod join;
pub mod measure;

use thiserror::Error;
use urban_index_layer::LayerError;

pub use join::{AggregateSummary, AttributionRule, BoundaryIndex, spatial_join_sum};
pub use measure::{LinearUnit, MeasureKind, measure_layer};

/// Errors that can occur during measurement or spatial aggregation.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// The layer's geometry type is not valid for the operation.
    #[error("Unsupported geometry for {operation}: {found}")]
    UnsupportedGeometry {
        /// Operation that was attempted.
        operation: &'static str,
        /// Geometry kind that was found (or "empty").
        found: String,
    },

    /// A required field is absent from a layer's schema.
    #[error("Field '{field}' not found in {dataset}")]
    MissingField {
        /// Field name that was requested.
        field: String,
        /// Which layer was searched.
        dataset: String,
    },

    /// An underlying layer operation failed.
    #[error(transparent)]
    Layer(#[from] LayerError),
}
