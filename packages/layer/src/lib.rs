#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Layer and table I/O plus attribute operations.
//!
//! Vector layers are exchanged as `GeoJSON` feature collections and
//! attribute tables as CSV. The [`Geoprocessor`] trait is the collaborator
//! each pipeline stage receives: it owns reading and writing datasets, while
//! the attribute operations in [`ops`] are pure transformations over the
//! in-memory [`Layer`] and [`Table`] types.

pub mod csv_table;
pub mod geojson_layer;
pub mod geoprocessor;
pub mod ops;
pub mod progress;

use std::path::PathBuf;

use thiserror::Error;

pub use geoprocessor::{FileGeoprocessor, Geoprocessor, MemoryGeoprocessor};
pub use urban_index_layer_models::{
    Attributes, Feature, FieldDef, FieldKind, FieldValue, GeometryKind, Layer, Table,
    unique_field_name,
};

/// Errors that can occur while reading, writing, or transforming layers.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Filesystem operation failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` parsing or geometry conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The dataset does not exist.
    #[error("Dataset not found: {}", .path.display())]
    NotFound {
        /// Missing path.
        path: PathBuf,
    },

    /// The path's extension is not a supported format for the operation.
    #[error("Unsupported format for {}: expected {expected}", .path.display())]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
        /// Human-readable description of the accepted formats.
        expected: &'static str,
    },

    /// The output already exists and overwriting is disabled.
    #[error("Output already exists: {}", .path.display())]
    OutputExists {
        /// Existing output path.
        path: PathBuf,
    },

    /// A required field is absent from a dataset's schema.
    #[error("Field '{field}' not found in {dataset}")]
    MissingField {
        /// Field name that was requested.
        field: String,
        /// Which dataset was searched (e.g. "join table").
        dataset: String,
    },

    /// The dataset's content is structurally invalid.
    #[error("Invalid layer: {message}")]
    InvalidLayer {
        /// Description of what went wrong.
        message: String,
    },
}

impl From<geojson::Error> for LayerError {
    fn from(value: geojson::Error) -> Self {
        Self::GeoJson(Box::new(value))
    }
}
