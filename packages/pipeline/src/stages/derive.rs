//! Derived-field and summary stage.
//!
//! Drops leftover OSM attributes, joins the census table, computes area,
//! densities and the average brightness index for every unit, and writes
//! both the enriched layer and a one-row statistics table.

use std::path::PathBuf;
use std::sync::Arc;

use urban_index_analysis::{DeriveError, derive_fields, summarize};
use urban_index_analysis_models::{DerivedField, DerivedFields, IndexInputs, SummaryStatistics};
use urban_index_layer::ops::{JoinSummary, add_field_values, drop_fields, join_table};
use urban_index_layer::progress::ProgressCallback;
use urban_index_layer::{Feature, FieldDef, FieldValue, Geoprocessor, Layer, LayerError, Table};

use crate::StageError;
use crate::config::{DeriveConfig, DeriveInputs, DeriveOutputs};

/// Statistics column holding the number of records summarized.
pub const FREQUENCY_FIELD: &str = "FREQUENCY";
/// Pearson r of average index against population density.
pub const PEARSON_POP_DENSITY_FIELD: &str = "PEARSON_popden";
/// Pearson r of average index against road density.
pub const PEARSON_ROAD_DENSITY_FIELD: &str = "PEARSON_roadde";

/// Inputs of [`run`].
#[derive(Debug, Clone)]
pub struct DeriveParams {
    pub input_layer: PathBuf,
    /// Census table (population by GEOID).
    pub join_table: PathBuf,
    pub input_field: String,
    pub join_field: String,
    pub output_layer: PathBuf,
    pub output_table: PathBuf,
}

/// Result of [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeriveOutcome {
    pub join: JoinSummary,
    /// Number of records derived (every feature of the layer).
    pub records: usize,
    pub statistics: SummaryStatistics,
}

/// Runs the stage. Nothing is written unless every record derives and the
/// statistics compute.
///
/// # Errors
///
/// Returns a [`StageError`] if a dataset cannot be read or written, a
/// configured field is missing, or a record cannot be derived under the
/// `fail` policy.
pub fn run(
    geoprocessor: &dyn Geoprocessor,
    params: &DeriveParams,
    config: &DeriveConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<DeriveOutcome, StageError> {
    let layer = geoprocessor.read_layer(&params.input_layer)?;
    let layer = drop_fields(layer, &config.drop_fields);

    let table = geoprocessor.read_table(&params.join_table)?;
    let (layer, join) = join_table(
        layer,
        &params.input_field,
        &table,
        &params.join_field,
        None,
    )?;

    if config.inputs.index_fields.is_empty() {
        return Err(DeriveError::NoIndexFields.into());
    }
    require_fields(&layer, &config.inputs)?;

    progress.set_total(layer.len() as u64);
    progress.set_message("Deriving densities".to_string());

    let derived = layer
        .features
        .iter()
        .enumerate()
        .map(|(position, feature)| {
            progress.inc(1);
            let inputs = extract_inputs(feature, position, &params.input_field, &config.inputs);
            derive_fields(&inputs, config.undefined_policy)
        })
        .collect::<Result<Vec<_>, _>>()?;

    progress.finish(format!("Derived {} record(s)", derived.len()));

    let statistics = summarize(&derived)?;
    log::info!(
        "Summary over {} record(s): mean {} = {:.5}, mean {} = {:.5}, mean {} = {:.5}",
        statistics.frequency,
        config.outputs.pop_density,
        statistics.pop_density.mean,
        config.outputs.road_density,
        statistics.road_density.mean,
        config.outputs.avg_index,
        statistics.avg_index.mean
    );

    let records = derived.len();
    let layer = append_derived(layer, &derived, &config.outputs)?;
    let table = statistics_table(&statistics, &config.outputs);

    geoprocessor.write_layer(&layer, &params.output_layer)?;
    geoprocessor.write_table(&table, &params.output_table)?;

    Ok(DeriveOutcome {
        join,
        records,
        statistics,
    })
}

/// Builds the one-row statistics table.
///
/// Columns are `FREQUENCY`, `MEAN_`/`STD_` of each density and the
/// average index, `MEAN_` of both cross-products, then the two Pearson
/// coefficients (null when a deviation is zero).
#[must_use]
pub fn statistics_table(statistics: &SummaryStatistics, outputs: &DeriveOutputs) -> Table {
    #[allow(clippy::cast_precision_loss)]
    let frequency = statistics.frequency as f64;

    let columns: Vec<(String, FieldValue)> = vec![
        (FREQUENCY_FIELD.to_string(), frequency.into()),
        (
            format!("MEAN_{}", outputs.pop_density),
            statistics.pop_density.mean.into(),
        ),
        (
            format!("STD_{}", outputs.pop_density),
            statistics.pop_density.std.into(),
        ),
        (
            format!("MEAN_{}", outputs.road_density),
            statistics.road_density.mean.into(),
        ),
        (
            format!("STD_{}", outputs.road_density),
            statistics.road_density.std.into(),
        ),
        (
            format!("MEAN_{}", outputs.avg_index),
            statistics.avg_index.mean.into(),
        ),
        (
            format!("STD_{}", outputs.avg_index),
            statistics.avg_index.std.into(),
        ),
        (
            format!("MEAN_{}", outputs.index_pop_density),
            statistics.index_pop_density_mean.into(),
        ),
        (
            format!("MEAN_{}", outputs.index_road_density),
            statistics.index_road_density_mean.into(),
        ),
        (
            PEARSON_POP_DENSITY_FIELD.to_string(),
            statistics.pearson_pop_density().into(),
        ),
        (
            PEARSON_ROAD_DENSITY_FIELD.to_string(),
            statistics.pearson_road_density().into(),
        ),
    ];

    let fields = columns
        .iter()
        .map(|(name, _)| FieldDef::double(name.clone()))
        .collect();
    let row = columns.into_iter().collect();

    Table::new(fields, vec![row])
}

fn require_fields(layer: &Layer, inputs: &DeriveInputs) -> Result<(), LayerError> {
    [
        &inputs.land_area,
        &inputs.water_area,
        &inputs.population,
        &inputs.road_length,
    ]
    .into_iter()
    .chain(&inputs.index_fields)
    .find(|name| !layer.has_field(name))
    .map_or(Ok(()), |name| {
        Err(LayerError::MissingField {
            field: name.clone(),
            dataset: "joined layer".to_string(),
        })
    })
}

fn extract_inputs(
    feature: &Feature,
    position: usize,
    key_field: &str,
    names: &DeriveInputs,
) -> IndexInputs {
    let value = |name: &str| feature.get(name).as_f64();

    IndexInputs {
        key: feature
            .get(key_field)
            .join_key()
            .unwrap_or_else(|| format!("#{position}")),
        land_area_m2: value(&names.land_area),
        water_area_m2: value(&names.water_area),
        population: value(&names.population),
        road_length_ft: value(&names.road_length),
        index_values: names.index_fields.iter().map(|name| value(name)).collect(),
    }
}

fn append_derived(
    layer: Layer,
    derived: &[DerivedFields],
    outputs: &DeriveOutputs,
) -> Result<Layer, LayerError> {
    let columns = [
        (&outputs.area, DerivedField::TotalArea),
        (&outputs.pop_density, DerivedField::PopDensity),
        (&outputs.road_density, DerivedField::RoadDensity),
        (&outputs.avg_index, DerivedField::AvgIndex),
        (&outputs.index_pop_density, DerivedField::IndexPopDensity),
        (&outputs.index_road_density, DerivedField::IndexRoadDensity),
    ];

    columns.into_iter().try_fold(layer, |layer, (name, field)| {
        let values = derived.iter().map(|d| d.get(field).into()).collect();
        add_field_values(layer, FieldDef::double(name.clone()), values)
    })
}

#[cfg(test)]
mod tests {
    use urban_index_analysis_models::UndefinedPolicy;
    use urban_index_layer::progress::null_progress;
    use urban_index_layer::{Attributes, MemoryGeoprocessor};

    use super::*;
    use crate::ErrorKind;

    const EPS: f64 = 1e-9;

    fn county(geoid: &str, land: f64, water: f64, feet: f64, index: f64) -> Feature {
        let mut attributes = Attributes::new();
        attributes.insert("GEOID".to_string(), FieldValue::from(geoid));
        attributes.insert("osm_id".to_string(), FieldValue::from("4471"));
        attributes.insert("ALAND".to_string(), land.into());
        attributes.insert("AWATER".to_string(), water.into());
        attributes.insert("FEET".to_string(), feet.into());
        for n in 2..=15 {
            attributes.insert(format!("Field{n}"), index.into());
        }
        Feature::new(None, attributes)
    }

    fn counties(features: Vec<Feature>) -> Layer {
        let mut fields = vec![
            FieldDef::text("GEOID"),
            FieldDef::text("osm_id"),
            FieldDef::double("ALAND"),
            FieldDef::double("AWATER"),
            FieldDef::double("FEET"),
        ];
        fields.extend((2..=15).map(|n| FieldDef::double(format!("Field{n}"))));
        Layer::new(fields, features)
    }

    fn census(rows: &[(&str, f64)]) -> Table {
        Table::new(
            vec![FieldDef::text("GEOID"), FieldDef::double("B01001e1")],
            rows.iter()
                .map(|(geoid, population)| {
                    let mut row = Attributes::new();
                    row.insert("GEOID".to_string(), FieldValue::from(*geoid));
                    row.insert("B01001e1".to_string(), (*population).into());
                    row
                })
                .collect(),
        )
    }

    fn setup(features: Vec<Feature>, rows: &[(&str, f64)]) -> MemoryGeoprocessor {
        let gp = MemoryGeoprocessor::new();
        gp.insert_layer("roads_by_county.geojson", counties(features));
        gp.insert_table("acs.csv", census(rows));
        gp
    }

    fn params() -> DeriveParams {
        DeriveParams {
            input_layer: PathBuf::from("roads_by_county.geojson"),
            join_table: PathBuf::from("acs.csv"),
            input_field: "GEOID".to_string(),
            join_field: "GEOID".to_string(),
            output_layer: PathBuf::from("derived.geojson"),
            output_table: PathBuf::from("stats.csv"),
        }
    }

    fn number(value: &FieldValue) -> f64 {
        value.as_f64().unwrap()
    }

    #[test]
    fn derives_fields_and_statistics() {
        let gp = setup(
            vec![
                county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5),
                county("06003", 3_000_000.0, 1_000_000.0, 20_000.0, 0.25),
            ],
            &[("06001", 50_000.0), ("06003", 40_000.0)],
        );

        let outcome = run(&gp, &params(), &DeriveConfig::default(), &null_progress()).unwrap();
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.join.matched, 2);

        let layer = gp.layer("derived.geojson").unwrap();
        assert!(!layer.has_field("osm_id"));
        let first = &layer.features[0];
        assert!((number(first.get("Area")) - 1000.0).abs() < EPS);
        assert!((number(first.get("Pop_den")) - 50.0).abs() < EPS);
        assert!((number(first.get("Road_den")) - 100.0).abs() < EPS);
        assert!((number(first.get("NTL")) - 0.5).abs() < EPS);
        assert!((number(first.get("NTL_popden")) - 25.0).abs() < EPS);
        assert!((number(first.get("NTL_roadde")) - 50.0).abs() < EPS);

        let stats = gp.table("stats.csv").unwrap();
        let names: Vec<&str> = stats.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "FREQUENCY",
                "MEAN_Pop_den",
                "STD_Pop_den",
                "MEAN_Road_den",
                "STD_Road_den",
                "MEAN_NTL",
                "STD_NTL",
                "MEAN_NTL_popden",
                "MEAN_NTL_roadde",
                "PEARSON_popden",
                "PEARSON_roadde",
            ]
        );

        let row = &stats.rows[0];
        assert!((number(&row["FREQUENCY"]) - 2.0).abs() < EPS);
        assert!((number(&row["MEAN_Pop_den"]) - 75.0).abs() < EPS);
        assert!((number(&row["STD_Pop_den"]) - 25.0).abs() < EPS);
        assert!((number(&row["MEAN_NTL"]) - 0.375).abs() < EPS);
        assert!((number(&row["STD_NTL"]) - 0.125).abs() < EPS);
        assert!((number(&row["MEAN_NTL_roadde"]) - 31.25).abs() < EPS);
        assert!((number(&row["PEARSON_popden"]) + 1.0).abs() < EPS);
        assert!((number(&row["PEARSON_roadde"]) - 1.0).abs() < EPS);
    }

    #[test]
    fn zero_area_fails_without_writing_outputs() {
        let gp = setup(
            vec![
                county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5),
                county("06099", 0.0, 0.0, 0.0, 0.1),
            ],
            &[("06001", 50_000.0), ("06099", 10.0)],
        );

        let err = run(&gp, &params(), &DeriveConfig::default(), &null_progress()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert!(err.to_string().contains("06099"));
        assert!(!gp.contains("derived.geojson"));
        assert!(!gp.contains("stats.csv"));
    }

    #[test]
    fn null_policy_writes_nulls_and_excludes_record_from_statistics() {
        let gp = setup(
            vec![
                county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5),
                county("06099", 0.0, 0.0, 0.0, 0.1),
            ],
            &[("06001", 50_000.0), ("06099", 10.0)],
        );
        let config = DeriveConfig {
            undefined_policy: UndefinedPolicy::Null,
            ..DeriveConfig::default()
        };

        let outcome = run(&gp, &params(), &config, &null_progress()).unwrap();
        assert_eq!(outcome.records, 2);
        assert_eq!(outcome.statistics.frequency, 1);

        let layer = gp.layer("derived.geojson").unwrap();
        let zero = &layer.features[1];
        assert_eq!(zero.get("Area"), &FieldValue::Number(0.0));
        assert_eq!(zero.get("Pop_den"), &FieldValue::Null);
        assert_eq!(zero.get("NTL_roadde"), &FieldValue::Null);
        assert!((number(zero.get("NTL")) - 0.1).abs() < EPS);

        let stats = gp.table("stats.csv").unwrap();
        assert_eq!(stats.rows[0]["PEARSON_popden"], FieldValue::Null);
    }

    #[test]
    fn unmatched_census_row_is_a_missing_value() {
        let gp = setup(
            vec![county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5)],
            &[("06003", 40_000.0)],
        );

        let err = run(&gp, &params(), &DeriveConfig::default(), &null_progress()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
    }

    #[test]
    fn missing_configured_field_is_input_validation() {
        let gp = setup(
            vec![county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5)],
            &[("06001", 50_000.0)],
        );
        let mut config = DeriveConfig::default();
        config.inputs.road_length = "SQFT".to_string();

        let err = run(&gp, &params(), &config, &null_progress()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        assert!(err.to_string().contains("SQFT"));
    }

    #[test]
    fn empty_index_field_list_is_input_validation() {
        let gp = setup(
            vec![county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5)],
            &[("06001", 50_000.0)],
        );
        let mut config = DeriveConfig::default();
        config.inputs.index_fields.clear();

        let err = run(&gp, &params(), &config, &null_progress()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[test]
    fn custom_output_names_flow_into_statistics_columns() {
        let gp = setup(
            vec![county("06001", 8_000_000.0, 2_000_000.0, 100_000.0, 0.5)],
            &[("06001", 50_000.0)],
        );
        let mut config = DeriveConfig::default();
        config.outputs.avg_index = "NUDI".to_string();

        run(&gp, &params(), &config, &null_progress()).unwrap();

        assert!(gp.layer("derived.geojson").unwrap().has_field("NUDI"));
        let stats = gp.table("stats.csv").unwrap();
        assert!(stats.has_field("MEAN_NUDI"));
        assert!(stats.has_field("STD_NUDI"));
    }
}
