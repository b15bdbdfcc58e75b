#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the urban index validation toolchain.
//!
//! Runs one stage per invocation (`join-index`, `measure`, `derive`) or
//! prints the effective configuration. Without a subcommand it prompts for
//! the stage and its parameters.
//!
//! Uses `indicatif-log-bridge` (via [`urban_index_cli_utils::init_logger`])
//! so log lines and the per-record progress bars share the terminal.

mod interactive;

use std::error::Error as _;
use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use strum_macros::AsRefStr;
use urban_index_analysis_models::UndefinedPolicy;
use urban_index_cli_utils::{IndicatifProgress, MultiProgress};
use urban_index_layer::FileGeoprocessor;
use urban_index_pipeline::config::{DeriveConfig, MeasureConfig};
use urban_index_pipeline::stages::derive::{self, DeriveParams};
use urban_index_pipeline::stages::join_index::{self, JoinIndexParams};
use urban_index_pipeline::stages::measure::{self, MeasureParams};
use urban_index_pipeline::{PipelineConfig, StageError};
use urban_index_spatial::{AttributionRule, LinearUnit};

#[derive(Parser)]
#[command(
    name = "urban_index",
    about = "Validate a night-time brightness index against census and OSM data"
)]
struct Cli {
    /// TOML file overriding the embedded default configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Fail instead of replacing outputs that already exist
    #[arg(long, global = true)]
    no_overwrite: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
enum Commands {
    /// Copy a boundary layer and join a brightness-index table onto it
    JoinIndex {
        /// Boundary layer (.geojson)
        input_layer: PathBuf,
        /// Index table (.csv)
        join_table: PathBuf,
        /// Key field in the boundary layer
        input_field: String,
        /// Key field in the index table
        join_field: String,
        /// Output layer (.geojson)
        output_layer: PathBuf,
    },
    /// Measure roads (feet) or buildings (square feet) and sum them into
    /// each boundary
    Measure {
        /// Road lines or building polygons (.geojson)
        features_layer: PathBuf,
        /// County or metro-area boundaries (.geojson)
        boundary_layer: PathBuf,
        /// Output layer (.geojson)
        output_layer: PathBuf,
        /// Keep the measured features as `<stem>_temp.<ext>`
        #[arg(long)]
        keep_intermediate: bool,
        /// `exclusive` or `all_intersecting`
        #[arg(long, value_parser = parse_name::<AttributionRule>)]
        attribution: Option<AttributionRule>,
        /// `foot`, `us_survey_foot` or `meter`
        #[arg(long, value_parser = parse_name::<LinearUnit>)]
        linear_unit: Option<LinearUnit>,
    },
    /// Join census data, derive densities and the average index, and write
    /// summary statistics
    Derive {
        /// Layer from the measure stage (.geojson)
        input_layer: PathBuf,
        /// Census table (.csv)
        join_table: PathBuf,
        /// Key field in the layer (e.g. `GEOID`)
        input_field: String,
        /// Key field in the census table
        join_field: String,
        /// Output layer (.geojson)
        output_layer: PathBuf,
        /// Output statistics table (.csv)
        output_table: PathBuf,
        /// `fail` or `null`
        #[arg(long, value_parser = parse_name::<UndefinedPolicy>)]
        undefined: Option<UndefinedPolicy>,
    },
    /// Print the effective configuration as TOML
    PrintConfig,
}

/// Parses a `snake_case` option value into one of the config enums.
fn parse_name<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e: T::Err| format!("invalid value '{value}': {e}"))
}

fn main() -> ExitCode {
    let multi = urban_index_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report("config", &e.into());
            return ExitCode::FAILURE;
        }
    };

    let command = match cli.command {
        Some(command) => command,
        None => match interactive::prompt(&config) {
            Ok(Some(command)) => command,
            Ok(None) => return ExitCode::SUCCESS,
            Err(e) => {
                log::error!("Prompt failed: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let stage = command.as_ref().to_string();
    match run(command, config, !cli.no_overwrite, &multi) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&stage, &e);
            ExitCode::FAILURE
        }
    }
}

fn run(
    command: Commands,
    config: PipelineConfig,
    overwrite: bool,
    multi: &MultiProgress,
) -> Result<(), StageError> {
    let geoprocessor = FileGeoprocessor::new(overwrite);

    match command {
        Commands::JoinIndex {
            input_layer,
            join_table,
            input_field,
            join_field,
            output_layer,
        } => {
            let params = JoinIndexParams {
                input_layer,
                join_table,
                input_field,
                join_field,
                output_layer,
            };
            let summary = join_index::run(&geoprocessor, &params)?;
            log::info!(
                "Wrote {}: {} matched, {} unmatched, fields {:?}",
                params.output_layer.display(),
                summary.matched,
                summary.unmatched,
                summary.joined_fields
            );
        }
        Commands::Measure {
            features_layer,
            boundary_layer,
            output_layer,
            keep_intermediate,
            attribution,
            linear_unit,
        } => {
            let settings =
                measure_settings(config.measure, keep_intermediate, attribution, linear_unit);
            let params = MeasureParams {
                features_layer,
                boundary_layer,
                output_layer,
            };
            let progress = IndicatifProgress::records_bar(multi, "Spatial join");
            let outcome = measure::run(&geoprocessor, &params, &settings, &progress)?;
            log::info!(
                "Wrote {} ({} summed into {}): {} attributed, {} outside, {} skipped",
                params.output_layer.display(),
                outcome.kind,
                outcome.kind.field_name(),
                outcome.summary.attributed,
                outcome.summary.unattributed,
                outcome.summary.skipped
            );
            if let Some(path) = outcome.intermediate {
                log::info!("Kept measured features at {}", path.display());
            }
        }
        Commands::Derive {
            input_layer,
            join_table,
            input_field,
            join_field,
            output_layer,
            output_table,
            undefined,
        } => {
            let settings = derive_settings(config.derive, undefined);
            let params = DeriveParams {
                input_layer,
                join_table,
                input_field,
                join_field,
                output_layer,
                output_table,
            };
            let progress = IndicatifProgress::records_bar(multi, "Deriving fields");
            let outcome = derive::run(&geoprocessor, &params, &settings, &progress)?;
            log::info!(
                "Wrote {} ({} records) and {} ({} in statistics)",
                params.output_layer.display(),
                outcome.records,
                params.output_table.display(),
                outcome.statistics.frequency
            );
            log_correlation("population density", outcome.statistics.pearson_pop_density());
            log_correlation("road density", outcome.statistics.pearson_road_density());
        }
        Commands::PrintConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Applies `measure` options on top of the `[measure]` config. An option
/// that was given always wins; `--keep-intermediate` can only turn keeping on.
fn measure_settings(
    mut settings: MeasureConfig,
    keep_intermediate: bool,
    attribution: Option<AttributionRule>,
    linear_unit: Option<LinearUnit>,
) -> MeasureConfig {
    settings.keep_intermediate |= keep_intermediate;
    if let Some(attribution) = attribution {
        settings.attribution = attribution;
    }
    if let Some(linear_unit) = linear_unit {
        settings.linear_unit = linear_unit;
    }
    settings
}

fn derive_settings(mut settings: DeriveConfig, undefined: Option<UndefinedPolicy>) -> DeriveConfig {
    if let Some(policy) = undefined {
        settings.undefined_policy = policy;
    }
    settings
}

fn log_correlation(against: &str, r: Option<f64>) {
    match r {
        Some(r) => log::info!("Pearson r (index vs {against}): {r:.4}"),
        None => log::warn!("Pearson r (index vs {against}) undefined: zero variance"),
    }
}

/// Logs the failure with its kind and every underlying cause.
fn report(stage: &str, error: &StageError) {
    log::error!("{stage} failed ({}): {error}", error.kind());

    // The top-level message already shows the immediate source.
    let mut cause = error.source().and_then(|source| source.source());
    while let Some(inner) = cause {
        log::error!("  caused by: {inner}");
        cause = inner.source();
    }

    if !error.is_recoverable() {
        log::error!("{stage} cannot run until the missing input is available");
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_measure_options() {
        let cli = Cli::try_parse_from([
            "urban_index",
            "--no-overwrite",
            "measure",
            "roads.geojson",
            "counties.geojson",
            "out.geojson",
            "--attribution",
            "all_intersecting",
            "--linear-unit",
            "us_survey_foot",
        ])
        .unwrap();

        assert!(cli.no_overwrite);
        match cli.command {
            Some(Commands::Measure {
                attribution,
                linear_unit,
                keep_intermediate,
                ..
            }) => {
                assert_eq!(attribution, Some(AttributionRule::AllIntersecting));
                assert_eq!(linear_unit, Some(LinearUnit::UsSurveyFoot));
                assert!(!keep_intermediate);
            }
            _ => panic!("expected measure"),
        }
    }

    #[test]
    fn parses_derive_with_policy_and_global_config() {
        let cli = Cli::try_parse_from([
            "urban_index",
            "derive",
            "in.geojson",
            "acs.csv",
            "GEOID",
            "GEOID",
            "out.geojson",
            "stats.csv",
            "--undefined",
            "null",
            "--config",
            "urban.toml",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("urban.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Derive {
                undefined: Some(UndefinedPolicy::Null),
                ..
            })
        ));
    }

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Commands::PrintConfig.as_ref(), "print-config");
    }

    #[test]
    fn rejects_unknown_attribution() {
        assert!(
            Cli::try_parse_from([
                "urban_index",
                "measure",
                "a.geojson",
                "b.geojson",
                "c.geojson",
                "--attribution",
                "nearest",
            ])
            .is_err()
        );
    }

    #[test]
    fn measure_options_override_config() {
        let config = MeasureConfig {
            linear_unit: LinearUnit::Meter,
            attribution: AttributionRule::AllIntersecting,
            keep_intermediate: false,
        };

        let settings = measure_settings(
            config.clone(),
            true,
            Some(AttributionRule::Exclusive),
            Some(LinearUnit::UsSurveyFoot),
        );
        assert_eq!(settings.attribution, AttributionRule::Exclusive);
        assert_eq!(settings.linear_unit, LinearUnit::UsSurveyFoot);
        assert!(settings.keep_intermediate);

        assert_eq!(measure_settings(config.clone(), false, None, None), config);
    }

    #[test]
    fn keep_intermediate_from_config_survives_absent_flag() {
        let config = MeasureConfig {
            keep_intermediate: true,
            ..MeasureConfig::default()
        };
        assert!(measure_settings(config, false, None, None).keep_intermediate);
    }

    #[test]
    fn undefined_option_overrides_config_policy() {
        let config = DeriveConfig {
            undefined_policy: UndefinedPolicy::Null,
            ..DeriveConfig::default()
        };

        let settings = derive_settings(config.clone(), Some(UndefinedPolicy::Fail));
        assert_eq!(settings.undefined_policy, UndefinedPolicy::Fail);
        assert_eq!(settings.drop_fields, config.drop_fields);

        assert_eq!(derive_settings(config, None).undefined_policy, UndefinedPolicy::Null);
    }
}
