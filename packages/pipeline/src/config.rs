//! Pipeline configuration.
//!
//! The defaults are embedded from `defaults.toml`. A user file passed with
//! `--config` only needs the keys it changes; everything else falls back
//! to the embedded value.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use urban_index_analysis_models::UndefinedPolicy;
use urban_index_spatial::{AttributionRule, LinearUnit};

/// The embedded default configuration.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../defaults.toml");

/// Errors from loading or rendering configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has unknown values.
    #[error("Invalid config: {message}")]
    Parse {
        /// Parser message, including the offending line.
        message: String,
    },

    /// The configuration could not be rendered as TOML.
    #[error("Failed to render config: {message}")]
    Render {
        /// Serializer message.
        message: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub measure: MeasureConfig,
    pub derive: DeriveConfig,
}

/// `[measure]`: the geometry-measure-and-aggregate stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    pub linear_unit: LinearUnit,
    pub attribution: AttributionRule,
    pub keep_intermediate: bool,
}

/// `[derive]`: the derived-field and summary stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveConfig {
    pub undefined_policy: UndefinedPolicy,
    pub drop_fields: Vec<String>,
    pub inputs: DeriveInputs,
    pub outputs: DeriveOutputs,
}

impl Default for DeriveConfig {
    fn default() -> Self {
        Self {
            undefined_policy: UndefinedPolicy::default(),
            drop_fields: [
                "osm_id", "code", "fclass", "name_1", "ref", "oneway", "maxspeed", "layer",
                "bridge", "tunnel",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            inputs: DeriveInputs::default(),
            outputs: DeriveOutputs::default(),
        }
    }
}

/// `[derive.inputs]`: names of the fields the kernel reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveInputs {
    /// Land area in square metres.
    pub land_area: String,
    /// Water area in square metres.
    pub water_area: String,
    pub population: String,
    /// Summed road length in feet.
    pub road_length: String,
    /// Yearly brightness-index fields, averaged with equal weight.
    pub index_fields: Vec<String>,
}

impl Default for DeriveInputs {
    fn default() -> Self {
        Self {
            land_area: "ALAND".to_string(),
            water_area: "AWATER".to_string(),
            population: "B01001e1".to_string(),
            road_length: "FEET".to_string(),
            index_fields: (2..=15).map(|n| format!("Field{n}")).collect(),
        }
    }
}

/// `[derive.outputs]`: names of the fields the stage writes. Statistics
/// columns are named after these (`MEAN_Pop_den`, `STD_NTL`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveOutputs {
    pub area: String,
    pub pop_density: String,
    pub road_density: String,
    pub avg_index: String,
    pub index_pop_density: String,
    pub index_road_density: String,
}

impl Default for DeriveOutputs {
    fn default() -> Self {
        Self {
            area: "Area".to_string(),
            pop_density: "Pop_den".to_string(),
            road_density: "Road_den".to_string(),
            avg_index: "NTL".to_string(),
            index_pop_density: "NTL_popden".to_string(),
            index_road_density: "NTL_roadde".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from `path`, or the embedded defaults when
    /// `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Self::from_toml(DEFAULT_CONFIG_TOML);
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses configuration from TOML text. Omitted keys take their
    /// default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid
    /// configuration.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Render {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn embedded_defaults_parse_with_fourteen_index_fields() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.derive.inputs.index_fields.len(), 14);
        assert_eq!(config.derive.inputs.index_fields[0], "Field2");
        assert_eq!(config.derive.inputs.index_fields[13], "Field15");
    }

    #[test]
    fn embedded_defaults_match_code_defaults() {
        assert_eq!(PipelineConfig::load(None).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[measure]
attribution = "all_intersecting"

[derive]
undefined_policy = "null"

[derive.outputs]
area = "Hectares"
"#
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.measure.attribution, AttributionRule::AllIntersecting);
        assert_eq!(config.measure.linear_unit, LinearUnit::Foot);
        assert_eq!(config.derive.undefined_policy, UndefinedPolicy::Null);
        assert_eq!(config.derive.outputs.area, "Hectares");
        assert_eq!(config.derive.outputs.avg_index, "NTL");
        assert_eq!(config.derive.drop_fields.len(), 10);
    }

    #[test]
    fn unknown_enum_value_is_a_parse_error() {
        let err = PipelineConfig::from_toml("[measure]\nlinear_unit = \"furlong\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/urban.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn rendered_config_round_trips() {
        let config = PipelineConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("undefined_policy = \"fail\""));
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
