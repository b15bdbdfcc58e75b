#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The urban index validation pipeline.
//!
//! Three stages run in sequence, each reading and writing through an
//! injected [`Geoprocessor`](urban_index_layer::Geoprocessor):
//!
//! 1. [`stages::join_index`] joins the brightness-index table onto county
//!    and metro-area boundaries.
//! 2. [`stages::measure`] measures roads or buildings and sums them into
//!    each boundary.
//! 3. [`stages::derive`] joins census population, computes densities and
//!    the average index, and writes a summary statistics table.
//!
//! Stage failures are reported as [`StageError`], classified by
//! [`ErrorKind`].

pub mod config;
pub mod error;
pub mod stages;

pub use config::{ConfigError, PipelineConfig};
pub use error::{ErrorKind, StageError};
