#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Record types for urban-index derivation.
//!
//! [`IndexInputs`] carries the raw per-unit values pulled from a boundary
//! layer, [`DerivedFields`] the computed areas, densities and brightness
//! averages, and [`SummaryStatistics`] the single aggregate row written
//! for correlation analysis.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// What to do with a record whose derived values cannot be computed
/// (zero total area, a missing input, or a non-finite result).
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
pub enum UndefinedPolicy {
    /// Stop the stage with an error naming the record.
    #[default]
    Fail,
    /// Write null for the affected fields and leave the record out of the
    /// summary statistics.
    Null,
}

/// Identifies one raw input of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    /// Land area in square metres.
    LandArea,
    /// Water area in square metres.
    WaterArea,
    /// Population count.
    Population,
    /// Summed road length in feet.
    RoadLength,
    /// Yearly brightness value at the given zero-based position.
    IndexValue(usize),
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LandArea => f.write_str("land_area"),
            Self::WaterArea => f.write_str("water_area"),
            Self::Population => f.write_str("population"),
            Self::RoadLength => f.write_str("road_length"),
            Self::IndexValue(i) => write!(f, "index_value[{i}]"),
        }
    }
}

/// Identifies one derived value of a record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DerivedField {
    /// Land plus water area in hectares.
    TotalArea,
    /// Population per hectare.
    PopDensity,
    /// Road feet per hectare.
    RoadDensity,
    /// Mean of the yearly brightness values.
    AvgIndex,
    /// Average index times population density.
    IndexPopDensity,
    /// Average index times road density.
    IndexRoadDensity,
}

/// Raw values for one geographic unit. `None` marks a value that was null
/// or not numeric in the source layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexInputs {
    /// Identifier used in error messages (GEOID or similar).
    pub key: String,
    pub land_area_m2: Option<f64>,
    pub water_area_m2: Option<f64>,
    pub population: Option<f64>,
    pub road_length_ft: Option<f64>,
    /// One value per configured brightness-index year.
    pub index_values: Vec<Option<f64>>,
}

/// Values computed for one geographic unit. `None` is written as null.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedFields {
    pub total_area_ha: Option<f64>,
    pub pop_density: Option<f64>,
    pub road_density: Option<f64>,
    pub avg_index: Option<f64>,
    pub index_pop_density: Option<f64>,
    pub index_road_density: Option<f64>,
}

impl DerivedFields {
    /// Whether every derived value is defined, which is what qualifies a
    /// record for the summary statistics.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.total_area_ha.is_some()
            && self.pop_density.is_some()
            && self.road_density.is_some()
            && self.avg_index.is_some()
            && self.index_pop_density.is_some()
            && self.index_road_density.is_some()
    }

    /// Looks up a derived value by field.
    #[must_use]
    pub const fn get(&self, field: DerivedField) -> Option<f64> {
        match field {
            DerivedField::TotalArea => self.total_area_ha,
            DerivedField::PopDensity => self.pop_density,
            DerivedField::RoadDensity => self.road_density,
            DerivedField::AvgIndex => self.avg_index,
            DerivedField::IndexPopDensity => self.index_pop_density,
            DerivedField::IndexRoadDensity => self.index_road_density,
        }
    }
}

/// Population mean and standard deviation of one field.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

/// The aggregate statistics row.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Number of records the statistics were computed over.
    pub frequency: usize,
    pub pop_density: Moments,
    pub road_density: Moments,
    pub avg_index: Moments,
    /// Mean of `avg_index * pop_density`.
    pub index_pop_density_mean: f64,
    /// Mean of `avg_index * road_density`.
    pub index_road_density_mean: f64,
}

impl SummaryStatistics {
    /// Pearson correlation between average index and population density.
    /// `None` when either standard deviation is zero.
    #[must_use]
    pub fn pearson_pop_density(&self) -> Option<f64> {
        pearson(self.index_pop_density_mean, self.avg_index, self.pop_density)
    }

    /// Pearson correlation between average index and road density.
    /// `None` when either standard deviation is zero.
    #[must_use]
    pub fn pearson_road_density(&self) -> Option<f64> {
        pearson(self.index_road_density_mean, self.avg_index, self.road_density)
    }
}

/// `r = (E[xy] - E[x]E[y]) / (σx σy)` from precomputed moments, clamped to
/// `[-1, 1]` since the moments carry rounding error.
fn pearson(product_mean: f64, x: Moments, y: Moments) -> Option<f64> {
    let denominator = x.std * y.std;
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(((product_mean - x.mean * y.mean) / denominator).clamp(-1.0, 1.0))
}
