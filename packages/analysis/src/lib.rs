#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Urban-index arithmetic.
//!
//! [`derive_fields`] turns one unit's raw inputs into total area, population
//! and road densities, the average brightness index and its two
//! cross-products. [`summarize`] reduces a set of derived records to the
//! aggregate statistics row used for correlation analysis.

use thiserror::Error;
use urban_index_analysis_models::{
    DerivedField, DerivedFields, IndexInputs, InputField, Moments, SummaryStatistics,
    UndefinedPolicy,
};

/// Square metres in one hectare.
pub const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Errors from deriving fields or summarizing records.
#[derive(Debug, Error)]
pub enum DeriveError {
    /// Land plus water area is zero, so densities are undefined.
    #[error("Record '{key}' has zero total area; densities are undefined")]
    ZeroArea {
        /// Record identifier.
        key: String,
    },

    /// An input value is null or not numeric.
    #[error("Record '{key}' is missing a numeric {field}")]
    MissingValue {
        /// Record identifier.
        key: String,
        /// Which input is missing.
        field: InputField,
    },

    /// A value evaluated to infinity or NaN.
    #[error("Record '{key}' has a non-finite {field}")]
    NonFinite {
        /// Record identifier.
        key: String,
        /// Name of the offending input or derived value.
        field: String,
    },

    /// No brightness-index fields were configured.
    #[error("No brightness-index fields configured")]
    NoIndexFields,

    /// No record had every derived field defined.
    #[error("No records qualify for summary statistics")]
    NoQualifyingRecords,
}

/// Computes the derived fields of one record.
///
/// Under [`UndefinedPolicy::Null`] an undefined value is written as `None`
/// and everything depending on it is `None` too. A zero area leaves the
/// area and the average index defined.
///
/// # Errors
///
/// * [`DeriveError::NoIndexFields`] if `inputs.index_values` is empty
///   (under either policy)
/// * [`DeriveError::MissingValue`], [`DeriveError::ZeroArea`] or
///   [`DeriveError::NonFinite`] under [`UndefinedPolicy::Fail`]
pub fn derive_fields(
    inputs: &IndexInputs,
    policy: UndefinedPolicy,
) -> Result<DerivedFields, DeriveError> {
    if inputs.index_values.is_empty() {
        return Err(DeriveError::NoIndexFields);
    }

    let resolve = |error: DeriveError| -> Result<Option<f64>, DeriveError> {
        match policy {
            UndefinedPolicy::Fail => Err(error),
            UndefinedPolicy::Null => {
                log::debug!("{error}; writing null");
                Ok(None)
            }
        }
    };

    let required = |value: Option<f64>, field: InputField| match value {
        Some(v) if v.is_finite() => Ok(Some(v)),
        Some(_) => resolve(DeriveError::NonFinite {
            key: inputs.key.clone(),
            field: field.to_string(),
        }),
        None => resolve(DeriveError::MissingValue {
            key: inputs.key.clone(),
            field,
        }),
    };

    let finite = |value: Option<f64>, field: DerivedField| match value {
        Some(v) if !v.is_finite() => resolve(DeriveError::NonFinite {
            key: inputs.key.clone(),
            field: field.to_string(),
        }),
        other => Ok(other),
    };

    let land = required(inputs.land_area_m2, InputField::LandArea)?;
    let water = required(inputs.water_area_m2, InputField::WaterArea)?;
    let population = required(inputs.population, InputField::Population)?;
    let road_length = required(inputs.road_length_ft, InputField::RoadLength)?;

    let mut index_sum = Some(0.0);
    for (i, value) in inputs.index_values.iter().enumerate() {
        let value = required(*value, InputField::IndexValue(i))?;
        index_sum = index_sum.zip(value).map(|(sum, v)| sum + v);
    }

    #[allow(clippy::cast_precision_loss)]
    let year_count = inputs.index_values.len() as f64;

    let total_area_ha = finite(
        land.zip(water)
            .map(|(land, water)| (land + water) / SQUARE_METERS_PER_HECTARE),
        DerivedField::TotalArea,
    )?;
    let avg_index = finite(index_sum.map(|sum| sum / year_count), DerivedField::AvgIndex)?;

    let density_area = match total_area_ha {
        Some(area) if area == 0.0 => resolve(DeriveError::ZeroArea {
            key: inputs.key.clone(),
        })?,
        other => other,
    };

    let pop_density = finite(
        density_area.zip(population).map(|(area, pop)| pop / area),
        DerivedField::PopDensity,
    )?;
    let road_density = finite(
        density_area.zip(road_length).map(|(area, road)| road / area),
        DerivedField::RoadDensity,
    )?;
    let index_pop_density = finite(
        avg_index.zip(pop_density).map(|(index, d)| index * d),
        DerivedField::IndexPopDensity,
    )?;
    let index_road_density = finite(
        avg_index.zip(road_density).map(|(index, d)| index * d),
        DerivedField::IndexRoadDensity,
    )?;

    Ok(DerivedFields {
        total_area_ha,
        pop_density,
        road_density,
        avg_index,
        index_pop_density,
        index_road_density,
    })
}

/// Computes population mean and standard deviation of the densities and
/// average index, plus the means of both cross-products, over every record
/// whose derived fields are all defined.
///
/// # Errors
///
/// Returns [`DeriveError::NoQualifyingRecords`] if no record is complete.
pub fn summarize(records: &[DerivedFields]) -> Result<SummaryStatistics, DeriveError> {
    let qualifying: Vec<&DerivedFields> = records.iter().filter(|r| r.is_complete()).collect();

    let excluded = records.len() - qualifying.len();
    if excluded > 0 {
        log::warn!("{excluded} record(s) with undefined fields excluded from statistics");
    }
    if qualifying.is_empty() {
        return Err(DeriveError::NoQualifyingRecords);
    }

    let column = |field: DerivedField| -> Vec<f64> {
        qualifying.iter().filter_map(|r| r.get(field)).collect()
    };

    Ok(SummaryStatistics {
        frequency: qualifying.len(),
        pop_density: moments(&column(DerivedField::PopDensity)),
        road_density: moments(&column(DerivedField::RoadDensity)),
        avg_index: moments(&column(DerivedField::AvgIndex)),
        index_pop_density_mean: mean(&column(DerivedField::IndexPopDensity)),
        index_road_density_mean: mean(&column(DerivedField::IndexRoadDensity)),
    })
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn moments(values: &[f64]) -> Moments {
    let mean = mean(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Moments {
        mean,
        std: variance.sqrt(),
    }
}
