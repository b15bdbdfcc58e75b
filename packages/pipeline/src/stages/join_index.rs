//! Table-join stage: copies a boundary layer and joins the brightness-index
//! table onto it by key.

use std::path::PathBuf;

use urban_index_layer::Geoprocessor;
use urban_index_layer::ops::{JoinSummary, join_table};

use crate::StageError;

/// Inputs of [`run`].
#[derive(Debug, Clone)]
pub struct JoinIndexParams {
    pub input_layer: PathBuf,
    pub join_table: PathBuf,
    /// Key field in the input layer.
    pub input_field: String,
    /// Key field in the join table.
    pub join_field: String,
    pub output_layer: PathBuf,
}

/// Writes `input_layer` joined with every field of `join_table` to
/// `output_layer`. The input layer is left untouched.
///
/// # Errors
///
/// Returns a [`StageError`] if a dataset cannot be read or written, or if
/// either key field is missing.
pub fn run(
    geoprocessor: &dyn Geoprocessor,
    params: &JoinIndexParams,
) -> Result<JoinSummary, StageError> {
    log::info!(
        "Joining {} onto {}",
        params.join_table.display(),
        params.input_layer.display()
    );

    let layer = geoprocessor.read_layer(&params.input_layer)?;
    let table = geoprocessor.read_table(&params.join_table)?;

    let (joined, summary) = join_table(
        layer,
        &params.input_field,
        &table,
        &params.join_field,
        None,
    )?;

    geoprocessor.write_layer(&joined, &params.output_layer)?;
    Ok(summary)
}
