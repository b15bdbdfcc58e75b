//! The three pipeline stages.
//!
//! Each stage reads its inputs through the injected
//! [`Geoprocessor`](urban_index_layer::Geoprocessor), computes a complete
//! result in memory, and only then writes its outputs.

pub mod derive;
pub mod join_index;
pub mod measure;
