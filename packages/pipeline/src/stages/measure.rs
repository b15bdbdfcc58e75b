//! Geometry-measure-and-aggregate stage.
//!
//! Measures every road (length in feet) or building (area in square feet),
//! then sums the measure into each county/metro boundary with an R-tree
//! spatial join.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use urban_index_layer::Geoprocessor;
use urban_index_layer::progress::ProgressCallback;
use urban_index_spatial::{AggregateSummary, MeasureKind, measure_layer, spatial_join_sum};

use crate::StageError;
use crate::config::MeasureConfig;

/// Inputs of [`run`].
#[derive(Debug, Clone)]
pub struct MeasureParams {
    /// Road lines or building polygons.
    pub features_layer: PathBuf,
    /// County or metro-area polygons.
    pub boundary_layer: PathBuf,
    pub output_layer: PathBuf,
}

/// Result of [`run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureOutcome {
    pub kind: MeasureKind,
    pub summary: AggregateSummary,
    /// Where the measured features were kept, if requested.
    pub intermediate: Option<PathBuf>,
}

/// Measures `features_layer` and writes `boundary_layer` with the summed
/// measure to `output_layer`.
///
/// # Errors
///
/// Returns a [`StageError`] if a dataset cannot be read or written, or if
/// the features are not all lines or all polygons.
pub fn run(
    geoprocessor: &dyn Geoprocessor,
    params: &MeasureParams,
    config: &MeasureConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<MeasureOutcome, StageError> {
    let features = geoprocessor.read_layer(&params.features_layer)?;
    let (measured, kind) = measure_layer(features, config.linear_unit)?;

    let intermediate = if config.keep_intermediate {
        let path = intermediate_path(&params.output_layer);
        geoprocessor.write_layer(&measured, &path)?;
        Some(path)
    } else {
        None
    };

    let boundaries = geoprocessor.read_layer(&params.boundary_layer)?;
    let (joined, summary) = spatial_join_sum(
        &boundaries,
        &measured,
        kind.field_name(),
        config.attribution,
        progress,
    )?;

    geoprocessor.write_layer(&joined, &params.output_layer)?;

    Ok(MeasureOutcome {
        kind,
        summary,
        intermediate,
    })
}

/// `<dir>/<stem>_temp.<ext>` next to `output`.
#[must_use]
pub fn intermediate_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_stem()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push("_temp");
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, LineString, Polygon};
    use urban_index_layer::progress::null_progress;
    use urban_index_layer::{
        Attributes, Feature, FieldDef, FieldValue, Layer, MemoryGeoprocessor,
    };
    use urban_index_spatial::AttributionRule;

    use super::*;
    use crate::ErrorKind;

    fn square(x: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (x, 0.0),
                (x + size, 0.0),
                (x + size, size),
                (x, size),
                (x, 0.0),
            ]),
            vec![],
        ))
    }

    fn layer(fields: Vec<FieldDef>, geometries: Vec<Geometry<f64>>) -> Layer {
        Layer::new(
            fields,
            geometries
                .into_iter()
                .map(|g| Feature::new(Some(g), Attributes::new()))
                .collect(),
        )
    }

    fn setup(features: Layer) -> MemoryGeoprocessor {
        let gp = MemoryGeoprocessor::new();
        gp.insert_layer("roads.geojson", features);
        gp.insert_layer(
            "counties.geojson",
            layer(vec![], vec![square(0.0, 100.0), square(100.0, 100.0), square(500.0, 10.0)]),
        );
        gp
    }

    fn params() -> MeasureParams {
        MeasureParams {
            features_layer: PathBuf::from("roads.geojson"),
            boundary_layer: PathBuf::from("counties.geojson"),
            output_layer: PathBuf::from("out/roads_by_county.geojson"),
        }
    }

    fn road(points: Vec<(f64, f64)>) -> Geometry<f64> {
        Geometry::LineString(LineString::from(points))
    }

    #[test]
    fn sums_road_feet_per_county() {
        let gp = setup(layer(
            vec![],
            vec![
                road(vec![(10.0, 10.0), (40.0, 50.0)]),
                road(vec![(120.0, 10.0), (120.0, 30.0)]),
                road(vec![(20.0, 20.0), (20.0, 30.0)]),
            ],
        ));

        let outcome = run(&gp, &params(), &MeasureConfig::default(), &null_progress()).unwrap();
        assert_eq!(outcome.kind, MeasureKind::Length);
        assert_eq!(outcome.summary.attributed, 3);
        assert_eq!(outcome.intermediate, None);

        let out = gp.layer("out/roads_by_county.geojson").unwrap();
        assert_eq!(out.len(), 3);
        assert!((out.features[0].get("FEET").as_f64().unwrap() - 60.0).abs() < 1e-9);
        assert!((out.features[1].get("FEET").as_f64().unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(out.features[2].get("FEET"), &FieldValue::Number(0.0));
        assert_eq!(out.features[2].get("Join_Count"), &FieldValue::Number(0.0));
        assert!(!gp.contains("out/roads_by_county_temp.geojson"));
    }

    #[test]
    fn sums_building_square_feet() {
        let gp = setup(layer(vec![], vec![square(10.0, 5.0), square(20.0, 2.0)]));

        let outcome = run(&gp, &params(), &MeasureConfig::default(), &null_progress()).unwrap();
        assert_eq!(outcome.kind, MeasureKind::Area);

        let out = gp.layer("out/roads_by_county.geojson").unwrap();
        assert!((out.features[0].get("SQFT").as_f64().unwrap() - 29.0).abs() < 1e-9);
    }

    #[test]
    fn keeps_intermediate_when_configured() {
        let gp = setup(layer(vec![], vec![road(vec![(1.0, 1.0), (2.0, 1.0)])]));
        let config = MeasureConfig {
            keep_intermediate: true,
            attribution: AttributionRule::AllIntersecting,
            ..MeasureConfig::default()
        };

        let outcome = run(&gp, &params(), &config, &null_progress()).unwrap();

        let kept = PathBuf::from("out/roads_by_county_temp.geojson");
        assert_eq!(outcome.intermediate.as_deref(), Some(kept.as_path()));
        assert!(gp.layer(&kept).unwrap().has_field("FEET"));
    }

    #[test]
    fn point_layer_is_input_validation_error() {
        let gp = setup(layer(
            vec![],
            vec![Geometry::Point(geo::Point::new(1.0, 1.0))],
        ));

        let err = run(&gp, &params(), &MeasureConfig::default(), &null_progress()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        assert!(!gp.contains("out/roads_by_county.geojson"));
    }

    #[test]
    fn intermediate_name_follows_output() {
        assert_eq!(
            intermediate_path(Path::new("/data/msa_roads.geojson")),
            PathBuf::from("/data/msa_roads_temp.geojson")
        );
        assert_eq!(
            intermediate_path(Path::new("roads")),
            PathBuf::from("roads_temp")
        );
    }
}
