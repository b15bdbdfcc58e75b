//! Interactive mode: prompts for the stage and each of its parameters.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use urban_index_analysis_models::UndefinedPolicy;
use urban_index_pipeline::PipelineConfig;
use urban_index_spatial::{AttributionRule, LinearUnit};

use crate::Commands;

/// Stage selection for the interactive menu.
enum Stage {
    JoinIndex,
    Measure,
    Derive,
    PrintConfig,
    Quit,
}

impl Stage {
    const ALL: &[Self] = &[
        Self::JoinIndex,
        Self::Measure,
        Self::Derive,
        Self::PrintConfig,
        Self::Quit,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::JoinIndex => "1. Join brightness-index table to boundaries",
            Self::Measure => "2. Measure roads/buildings and sum into boundaries",
            Self::Derive => "3. Derive densities and summary statistics",
            Self::PrintConfig => "Print configuration",
            Self::Quit => "Quit",
        }
    }
}

/// Asks which stage to run and collects its parameters. Choices start on
/// the values from `config`. Returns `None` if the user quits.
///
/// # Errors
///
/// Returns an error if the terminal cannot be prompted.
pub fn prompt(config: &PipelineConfig) -> Result<Option<Commands>, dialoguer::Error> {
    println!("Urban Index Toolchain");
    println!();

    let labels: Vec<&str> = Stage::ALL.iter().map(Stage::label).collect();
    let idx = Select::new()
        .with_prompt("Which stage would you like to run?")
        .items(&labels)
        .default(0)
        .interact()?;

    let command = match Stage::ALL[idx] {
        Stage::JoinIndex => Commands::JoinIndex {
            input_layer: path("Boundary layer (.geojson)")?,
            join_table: path("Index table (.csv)")?,
            input_field: text("Key field in the boundary layer", Some("NAME"))?,
            join_field: text("Key field in the index table", None)?,
            output_layer: path("Output layer (.geojson)")?,
        },
        Stage::Measure => Commands::Measure {
            features_layer: path("Road or building layer (.geojson)")?,
            boundary_layer: path("County/MSA layer (.geojson)")?,
            output_layer: path("Output layer (.geojson)")?,
            keep_intermediate: Confirm::new()
                .with_prompt("Keep the measured features?")
                .default(config.measure.keep_intermediate)
                .interact()?,
            attribution: Some(choose(
                "Attribute features crossing boundaries to",
                &[
                    (AttributionRule::Exclusive, "one boundary (exclusive)"),
                    (AttributionRule::AllIntersecting, "every boundary they cross"),
                ],
                config.measure.attribution,
            )?),
            linear_unit: Some(choose(
                "Coordinate units",
                &[
                    (LinearUnit::Foot, "foot"),
                    (LinearUnit::UsSurveyFoot, "US survey foot"),
                    (LinearUnit::Meter, "meter"),
                ],
                config.measure.linear_unit,
            )?),
        },
        Stage::Derive => Commands::Derive {
            input_layer: path("Layer from the measure stage (.geojson)")?,
            join_table: path("Census table (.csv)")?,
            input_field: text("Key field in the layer", Some("GEOID"))?,
            join_field: text("Key field in the census table", Some("GEOID"))?,
            output_layer: path("Output layer (.geojson)")?,
            output_table: path("Output statistics table (.csv)")?,
            undefined: Some(choose(
                "Records with zero area or missing values",
                &[
                    (UndefinedPolicy::Fail, "stop with an error"),
                    (UndefinedPolicy::Null, "write null and exclude from statistics"),
                ],
                config.derive.undefined_policy,
            )?),
        },
        Stage::PrintConfig => Commands::PrintConfig,
        Stage::Quit => return Ok(None),
    };

    Ok(Some(command))
}

fn text(prompt: &str, default: Option<&str>) -> Result<String, dialoguer::Error> {
    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_string());
    }
    input.interact_text()
}

fn path(prompt: &str) -> Result<PathBuf, dialoguer::Error> {
    text(prompt, None).map(PathBuf::from)
}

fn choose<T: Copy + PartialEq>(
    prompt: &str,
    options: &[(T, &str)],
    current: T,
) -> Result<T, dialoguer::Error> {
    let labels: Vec<&str> = options.iter().map(|(_, label)| *label).collect();
    let idx = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(selected_index(options, current))
        .interact()?;
    Ok(options[idx].0)
}

fn selected_index<T: PartialEq>(options: &[(T, &str)], current: T) -> usize {
    options
        .iter()
        .position(|(value, _)| *value == current)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTIONS: &[(AttributionRule, &str)] = &[
        (AttributionRule::Exclusive, "exclusive"),
        (AttributionRule::AllIntersecting, "all"),
    ];

    #[test]
    fn selection_starts_on_configured_value() {
        let mut config = PipelineConfig::default();
        config.measure.attribution = AttributionRule::AllIntersecting;

        assert_eq!(selected_index(ATTRIBUTIONS, config.measure.attribution), 1);
        assert_eq!(selected_index(ATTRIBUTIONS, AttributionRule::Exclusive), 0);
    }

    #[test]
    fn unlisted_value_falls_back_to_first_option() {
        let options = [(UndefinedPolicy::Fail, "fail")];
        assert_eq!(selected_index(&options, UndefinedPolicy::Null), 0);
    }
}
