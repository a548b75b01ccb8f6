//! End-to-end tests on synthetic Sentinel-2-like scenes
//!
//! The scene grid is 20x20 pixels of 10 m. Each quadrant holds one land
//! cover with its own spectral signature:
//!
//! ```text
//!   water      | vegetation
//!   -----------+-----------
//!   built      | barren
//! ```

use approx::assert_relative_eq;
use chrono::NaiveDate;
use lulc_algorithms::classification::{
    assess, extract_samples, split_samples, Classifier, ConfusionMatrix, RandomForest,
    RandomForestParams, SampleLocation, SampleRecord, SampleSet, SamplingParams, SplitParams,
    CLASS_NODATA,
};
use lulc_algorithms::export::{ExportConfig, GeoTiffSink};
use lulc_algorithms::imagery::{
    DateRange, ImageCollectionQuery, InMemoryCollection, Scene, SceneSource,
};
use lulc_algorithms::pipeline::{Pipeline, PipelineConfig};
use lulc_core::io::read_geotiff;
use lulc_core::{
    Error, GeoTransform, LabeledPolygonSet, LandCoverClass, Raster, RasterImage, Region, CRS,
};

const SIZE: usize = 20;
const PIXEL: f64 = 10.0;
const ORIGIN_X: f64 = 500_000.0;
const ORIGIN_Y: f64 = 4_000_200.0;

/// (B2, B3, B4, B8) per class id
const SIGNATURES: [[f64; 4]; 4] = [
    [0.10, 0.08, 0.05, 0.02],
    [0.03, 0.05, 0.02, 0.45],
    [0.16, 0.15, 0.14, 0.20],
    [0.22, 0.27, 0.32, 0.40],
];

const BANDS: [&str; 4] = ["B2", "B3", "B4", "B8"];

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn transform() -> GeoTransform {
    GeoTransform::new(ORIGIN_X, ORIGIN_Y, PIXEL, -PIXEL)
}

fn class_at(row: usize, col: usize) -> usize {
    let half = SIZE / 2;
    match (row < half, col < half) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    }
}

fn grid(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let data = (0..SIZE * SIZE).map(|i| f(i / SIZE, i % SIZE)).collect();
    let mut r = Raster::from_vec(data, SIZE, SIZE).unwrap();
    r.set_transform(transform());
    r.set_crs(Some(CRS::utm(33, true)));
    r
}

/// One scene; `cloudy` pixels get SCL 9 and saturated reflectance
fn scene(id: &str, acquired: &str, cloudy_percent: f64, offset: f64, cloudy: &[(usize, usize)]) -> Scene {
    let is_cloudy = |row: usize, col: usize| cloudy.contains(&(row, col));
    let mut image = RasterImage::new();
    for (b, name) in BANDS.iter().enumerate() {
        let band = grid(|row, col| {
            if is_cloudy(row, col) {
                return 0.9;
            }
            let texture = ((row * 7 + col * 13) % 10) as f64 * 0.001;
            SIGNATURES[class_at(row, col)][b] + texture + offset
        });
        image.add_band(*name, band).unwrap();
    }
    let scl = grid(|row, col| if is_cloudy(row, col) { 9.0 } else { 4.0 });
    image.add_band("SCL", scl).unwrap();

    Scene {
        id: id.to_string(),
        acquired: date(acquired),
        cloudy_pixel_percentage: cloudy_percent,
        image,
    }
}

fn collection() -> InMemoryCollection {
    InMemoryCollection::new(vec![
        scene("S2A_20231104", "2023-11-04", 1.0, 0.000, &[]),
        scene("S2B_20231109", "2023-11-09", 4.0, 0.002, &[(0, 0), (5, 5), (15, 15)]),
        scene("S2A_20231114", "2023-11-14", 2.0, 0.004, &[]),
        scene("S2B_20231119", "2023-11-19", 80.0, 0.000, &[]),
        scene("S2A_20231204", "2023-12-04", 0.0, 0.000, &[]),
    ])
}

/// AOI covering all but the last pixel column
fn query() -> ImageCollectionQuery {
    let max_x = ORIGIN_X + (SIZE - 1) as f64 * PIXEL;
    ImageCollectionQuery {
        aoi: Region::rectangle(ORIGIN_X, ORIGIN_Y - SIZE as f64 * PIXEL, max_x, ORIGIN_Y).unwrap(),
        date_range: DateRange::new(date("2023-11-01"), date("2023-11-30")).unwrap(),
        max_cloud_percent: 10.0,
    }
}

/// Polygon over pixel rows/cols `[r0, r1) x [c0, c1)`
fn pixel_box(r0: usize, r1: usize, c0: usize, c1: usize) -> [[f64; 2]; 4] {
    let x0 = ORIGIN_X + c0 as f64 * PIXEL;
    let x1 = ORIGIN_X + c1 as f64 * PIXEL;
    let y0 = ORIGIN_Y - r1 as f64 * PIXEL;
    let y1 = ORIGIN_Y - r0 as f64 * PIXEL;
    [[x0, y0], [x1, y0], [x1, y1], [x0, y1]]
}

fn polygons(classes: &[LandCoverClass]) -> LabeledPolygonSet {
    let mut set = LabeledPolygonSet::new();
    for &class in classes {
        let (r, c) = match class {
            LandCoverClass::Water => (0, 0),
            LandCoverClass::Vegetation => (0, 10),
            LandCoverClass::Built => (10, 0),
            LandCoverClass::Barren => (10, 10),
        };
        set.push_vertices(class, &pixel_box(r + 1, r + 9, c + 1, c + 8)).unwrap();
    }
    set
}

fn config() -> PipelineConfig {
    PipelineConfig {
        forest: RandomForestParams {
            num_trees: 30,
            seed: 17,
            ..Default::default()
        },
        split: SplitParams {
            train_fraction: 0.7,
            seed: 5,
        },
        ..Default::default()
    }
}

// ─── Scenario checks ───────────────────────────────────────────────────

/// Raster from a list of columns, each listed top to bottom
fn from_columns(columns: [[f64; 2]; 2]) -> Raster<f64> {
    let data = (0..4).map(|i| columns[i % 2][i / 2]).collect();
    let mut r = Raster::from_vec(data, 2, 2).unwrap();
    r.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
    r
}

#[test]
fn left_column_polygon_yields_two_identical_records() {
    let image = RasterImage::from_bands([
        ("B2", from_columns([[1.0, 1.0], [1.0, 1.0]])),
        ("B3", from_columns([[2.0, 2.0], [2.0, 2.0]])),
        ("B4", from_columns([[1.0, 1.0], [3.0, 3.0]])),
        ("B8", from_columns([[4.0, 4.0], [4.0, 4.0]])),
    ])
    .unwrap();
    let mut labeled = LabeledPolygonSet::new();
    labeled
        .push_vertices(LandCoverClass::Vegetation, &[[0.0, 0.0], [1.0, 0.0], [1.0, 2.0], [0.0, 2.0]])
        .unwrap();
    let params = SamplingParams {
        bands: BANDS.iter().map(|s| s.to_string()).collect(),
        scale: None,
        ..Default::default()
    };

    let samples = extract_samples(&image, &labeled, &params).unwrap();

    assert_eq!(samples.len(), 2);
    let records = samples.records();
    assert!(records.iter().all(|r| r.label == 1));
    assert_eq!(records[0].features, records[1].features);
}

#[test]
fn perfect_predictions_give_diagonal_matrix() {
    let truth = [0, 0, 1, 1, 2, 2, 3, 3, 0, 1];
    let matrix = ConfusionMatrix::from_labels(&truth, &truth, 4).unwrap();

    assert_eq!(
        matrix.to_rows(),
        vec![vec![3, 0, 0, 0], vec![0, 3, 0, 0], vec![0, 0, 2, 0], vec![0, 0, 0, 2]]
    );
    assert_eq!(matrix.row_sums(), vec![3, 3, 2, 2]);
    assert_relative_eq!(matrix.overall_accuracy(), 1.0);
    assert_relative_eq!(matrix.kappa(), 1.0);
}

#[test]
fn empty_test_set_is_an_error() {
    assert!(matches!(
        ConfusionMatrix::from_labels(&[], &[], 4),
        Err(Error::EmptyTestSet)
    ));

    let schema = vec!["NDVI".to_string()];
    let records = (0..8)
        .map(|i| SampleRecord {
            features: vec![i as f64 / 8.0],
            label: (i / 2) as u8,
            split_key: None,
            location: SampleLocation {
                row: i,
                col: 0,
                x: 0.5,
                y: i as f64 + 0.5,
            },
        })
        .collect();
    let train = SampleSet::from_records(schema.clone(), records).unwrap();
    let params = RandomForestParams {
        num_trees: 5,
        ..Default::default()
    };
    let forest = RandomForest::train(&train, &schema, &params).unwrap();

    assert!(matches!(
        assess(&forest, &SampleSet::new(schema)),
        Err(Error::EmptyTestSet)
    ));
}

#[test]
fn split_is_reproducible_and_partitions_samples() {
    let pipeline = Pipeline::new(config()).unwrap();
    let selected = collection().query(&query()).unwrap();
    let features = pipeline.features(&pipeline.composite(&selected, &query()).unwrap()).unwrap();
    let samples = extract_samples(
        &features,
        &polygons(&LandCoverClass::ALL),
        &SamplingParams {
            bands: pipeline.config().bands.clone(),
            ..Default::default()
        },
    )
    .unwrap();

    let params = SplitParams {
        train_fraction: 0.7,
        seed: 99,
    };
    let a = split_samples(&samples, &params).unwrap();
    let b = split_samples(&samples, &params).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.train.len() + a.test.len(), samples.len());

    let key = |r: &SampleRecord| (r.location.row, r.location.col);
    let train: Vec<_> = a.train.records().iter().map(key).collect();
    assert!(a.test.records().iter().all(|r| !train.contains(&key(r))));
}

// ─── Full runs ─────────────────────────────────────────────────────────

#[test]
fn full_run_classifies_every_quadrant() {
    let pipeline = Pipeline::new(config()).unwrap();
    let outcome = pipeline
        .run(&collection(), &query(), &polygons(&LandCoverClass::ALL), None)
        .unwrap();

    let d = &outcome.diagnostics;
    assert_eq!(d.scenes, 3);
    // 8 x 7 pixels per polygon
    assert_eq!(d.total_samples, 4 * 56);
    assert_eq!(d.train_samples + d.test_samples, d.total_samples);
    assert!(d.test_samples > 0);

    let per_class_test: Vec<u64> = d.confusion_matrix.row_sums();
    assert_eq!(per_class_test.iter().sum::<u64>(), d.test_samples as u64);
    assert_relative_eq!(d.overall_accuracy, 1.0);
    assert_relative_eq!(d.kappa, 1.0);

    let importance: f64 = d.feature_importance.iter().map(|(_, v)| v).sum();
    assert_relative_eq!(importance, 1.0, epsilon = 1e-9);

    let classified = &outcome.classified;
    assert_eq!(classified.shape(), (SIZE, SIZE));
    assert_eq!(classified.get(4, 4).unwrap(), 0);
    assert_eq!(classified.get(4, 14).unwrap(), 1);
    assert_eq!(classified.get(14, 4).unwrap(), 2);
    assert_eq!(classified.get(14, 14).unwrap(), 3);
    // Last column is outside the AOI
    assert_eq!(classified.get(3, SIZE - 1).unwrap(), CLASS_NODATA);

    let composite = outcome.store.get(outcome.composite).unwrap();
    assert!(composite.has_band("SCL"));
    let features = outcome.store.get(outcome.features).unwrap();
    assert_eq!(features.band_names(), vec!["B2", "B3", "B4", "B8", "NDVI", "NDWI"]);
    assert_eq!(outcome.forest.schema(), pipeline.config().bands.as_slice());

    let json = d.to_json().unwrap();
    assert!(json.contains("\"kappa\""));
}

#[test]
fn cloudy_pixels_are_replaced_by_clear_observations() {
    let pipeline = Pipeline::new(config()).unwrap();
    let scenes = collection().query(&query()).unwrap();
    let composite = pipeline.composite(&scenes, &query()).unwrap();

    // Pixel (0, 0) is cloudy in the second scene: median of the first and third
    let b8 = composite.band("B8").unwrap().get(0, 0).unwrap();
    assert_relative_eq!(b8, SIGNATURES[0][3] + 0.002, epsilon = 1e-12);
}

#[test]
fn same_inputs_same_outcome() {
    let pipeline = Pipeline::new(config()).unwrap();
    let labeled = polygons(&LandCoverClass::ALL);
    let a = pipeline.run(&collection(), &query(), &labeled, None).unwrap();
    let b = pipeline.run(&collection(), &query(), &labeled, None).unwrap();

    assert_eq!(a.diagnostics, b.diagnostics);
    assert_eq!(a.classified.data(), b.classified.data());
    assert_eq!(a.forest.trees(), b.forest.trees());
}

#[test]
fn missing_class_fails_training() {
    let pipeline = Pipeline::new(config()).unwrap();
    let labeled = polygons(&[LandCoverClass::Water, LandCoverClass::Vegetation, LandCoverClass::Built]);

    match pipeline.run(&collection(), &query(), &labeled, None) {
        Err(Error::InsufficientData { class, counts }) => {
            assert_eq!(class, 3);
            assert_eq!(counts[3], 0);
        }
        other => panic!("expected InsufficientData, got {:?}", other.map(|o| o.diagnostics)),
    }
}

#[test]
fn no_matching_scene_is_data_availability_error() {
    let pipeline = Pipeline::new(config()).unwrap();
    let mut q = query();
    q.date_range = DateRange::new(date("2024-01-01"), date("2024-02-01")).unwrap();

    assert!(matches!(
        pipeline.run(&collection(), &q, &polygons(&LandCoverClass::ALL), None),
        Err(Error::DataAvailability { .. })
    ));
}

#[test]
fn all_training_no_test_fails_assessment() {
    let mut cfg = config();
    cfg.split.train_fraction = 1.0;
    let pipeline = Pipeline::new(cfg).unwrap();

    assert!(matches!(
        pipeline.run(&collection(), &query(), &polygons(&LandCoverClass::ALL), None),
        Err(Error::EmptyTestSet)
    ));
}

#[test]
fn export_writes_resampled_geotiff() {
    let dir = tempfile::tempdir().unwrap();
    let sink = GeoTiffSink::new(dir.path());
    let mut cfg = config();
    cfg.export = Some(ExportConfig {
        scale: 20.0,
        destination: "lulc_2023".into(),
        max_pixels: 1_000,
    });
    let pipeline = Pipeline::new(cfg).unwrap();

    let outcome = pipeline
        .run(&collection(), &query(), &polygons(&LandCoverClass::ALL), Some(&sink))
        .unwrap();
    let summary = outcome.export.unwrap();
    assert_eq!((summary.rows, summary.cols), (10, 10));

    let written: Raster<u8> = read_geotiff(sink.path_for("lulc_2023")).unwrap();
    assert_eq!(written.shape(), (10, 10));
    assert_eq!(written.get(2, 2).unwrap(), 0);
    assert_eq!(written.get(7, 7).unwrap(), 3);
}

#[test]
fn oversized_export_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let sink = GeoTiffSink::new(dir.path());
    let mut cfg = config();
    cfg.export = Some(ExportConfig {
        scale: 10.0,
        destination: "too_big".into(),
        max_pixels: 100,
    });
    let pipeline = Pipeline::new(cfg).unwrap();

    let result = pipeline.run(&collection(), &query(), &polygons(&LandCoverClass::ALL), Some(&sink));
    assert!(matches!(
        result,
        Err(Error::ExportTooLarge { requested: 380, max: 100 })
    ));
    assert!(!sink.path_for("too_big").exists());
}
