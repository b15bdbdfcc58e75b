//! Stage error taxonomy.
//!
//! Every failure a stage can hit is sorted into one of three kinds so the
//! caller can tell "fix your inputs" apart from "a dependency is missing"
//! and "the data could not be computed".

use std::error::Error as StdError;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use urban_index_analysis::DeriveError;
use urban_index_layer::LayerError;
use urban_index_spatial::SpatialError;

use crate::config::ConfigError;

type Source = Box<dyn StdError + Send + Sync + 'static>;

/// Broad category of a [`StageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The inputs exist but do not fit the stage.
    InputValidation,
    /// An input dataset or the config file is missing or unreadable.
    MissingDependency,
    /// A derived value could not be computed.
    Computation,
}

/// A failed stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Inputs are present but wrong: a missing field, an unsupported
    /// geometry type, malformed content, or an output that may not be
    /// replaced.
    #[error("{source}")]
    InputValidation {
        #[source]
        source: Source,
    },

    /// An input dataset or configuration file cannot be found or read, or
    /// has an unsupported format.
    #[error("{source}")]
    MissingDependency {
        #[source]
        source: Source,
    },

    /// A derived value is undefined under the `fail` policy, or no record
    /// qualified for statistics.
    #[error("{source}")]
    Computation {
        #[source]
        source: DeriveError,
    },
}

impl StageError {
    fn input(source: impl Into<Source>) -> Self {
        Self::InputValidation {
            source: source.into(),
        }
    }

    fn dependency(source: impl Into<Source>) -> Self {
        Self::MissingDependency {
            source: source.into(),
        }
    }

    /// The category used when reporting this failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InputValidation { .. } => ErrorKind::InputValidation,
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::Computation { .. } => ErrorKind::Computation,
        }
    }

    /// Whether rerunning with corrected inputs or a different policy can
    /// succeed. A missing dependency is fatal for the run.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingDependency { .. })
    }
}

impl From<LayerError> for StageError {
    fn from(value: LayerError) -> Self {
        match value {
            LayerError::Io { .. }
            | LayerError::NotFound { .. }
            | LayerError::UnsupportedFormat { .. } => Self::dependency(value),
            LayerError::Json(_)
            | LayerError::GeoJson(_)
            | LayerError::Csv(_)
            | LayerError::OutputExists { .. }
            | LayerError::MissingField { .. }
            | LayerError::InvalidLayer { .. } => Self::input(value),
        }
    }
}

impl From<SpatialError> for StageError {
    fn from(value: SpatialError) -> Self {
        match value {
            SpatialError::Layer(inner) => inner.into(),
            SpatialError::UnsupportedGeometry { .. } | SpatialError::MissingField { .. } => {
                Self::input(value)
            }
        }
    }
}

impl From<DeriveError> for StageError {
    fn from(value: DeriveError) -> Self {
        match value {
            DeriveError::NoIndexFields => Self::input(value),
            DeriveError::ZeroArea { .. }
            | DeriveError::MissingValue { .. }
            | DeriveError::NonFinite { .. }
            | DeriveError::NoQualifyingRecords => Self::Computation { source: value },
        }
    }
}

impl From<ConfigError> for StageError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::Read { .. } => Self::dependency(value),
            ConfigError::Parse { .. } | ConfigError::Render { .. } => Self::input(value),
        }
    }
}
