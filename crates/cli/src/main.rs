//! LULC CLI - supervised land-cover classification of Sentinel-2 composites

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use lulc_algorithms::classification::CLASS_NODATA;
use lulc_algorithms::export::{GeoTiffSink, RasterSink};
use lulc_algorithms::imagery::{
    ndvi, ndwi, DateRange, ImageCollectionQuery, InMemoryCollection, Scene, SceneSource,
};
use lulc_algorithms::pipeline::{Diagnostics, Pipeline, PipelineConfig};
use lulc_core::io::{read_geotiff, write_class_geotiff, write_geotiff};
use lulc_core::vector::{LabeledPolygonSet, LabeledPolygonSetDef, LandCoverClass};
use lulc_core::{Raster, RasterImage};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "lulc")]
#[command(author, version, about = "Supervised land-cover classification", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Compute NDVI and NDWI from single-band GeoTIFFs
    Indices {
        /// Green band (B3)
        #[arg(long)]
        green: PathBuf,
        /// Red band (B4)
        #[arg(long)]
        red: PathBuf,
        /// Near-infrared band (B8)
        #[arg(long)]
        nir: PathBuf,
        /// Output directory for NDVI.tif and NDWI.tif
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Build the cloud-masked median composite of the scenes matching a query
    Composite {
        /// Scene manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Image collection query (JSON)
        #[arg(short, long)]
        query: PathBuf,
        /// Pipeline configuration (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory, one GeoTIFF per band
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Run the full pipeline: composite, train, classify, assess, export
    Classify {
        /// Scene manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,
        /// Image collection query (JSON)
        #[arg(short, long)]
        query: PathBuf,
        /// Labeled polygons (JSON with water/vegetation/built/barren)
        #[arg(short, long)]
        labels: PathBuf,
        /// Pipeline configuration (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Classified raster output (GeoTIFF, native grid)
        #[arg(short, long)]
        output: PathBuf,
        /// Write diagnostics as JSON here
        #[arg(short, long)]
        diagnostics: Option<PathBuf>,
        /// Directory for the configured export
        #[arg(short, long)]
        export_dir: Option<PathBuf>,
    },
}

// ─── Input files ────────────────────────────────────────────────────────

/// One scene of the manifest; band paths are relative to the manifest
#[derive(Deserialize)]
struct SceneEntry {
    id: String,
    acquired: NaiveDate,
    cloudy_pixel_percentage: f64,
    bands: BTreeMap<String, PathBuf>,
}

#[derive(Deserialize)]
struct Manifest {
    scenes: Vec<SceneEntry>,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} {}", what, path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid {} {}", what, path.display()))
}

fn read_manifest(path: &Path) -> Result<InMemoryCollection> {
    let manifest: Manifest = read_json(path, "scene manifest")?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let pb = spinner("Reading scenes...");
    let mut collection = InMemoryCollection::default();
    for entry in manifest.scenes {
        let mut image = RasterImage::new();
        for (band, file) in &entry.bands {
            let file = base.join(file);
            let raster: Raster<f64> = read_geotiff(&file)
                .with_context(|| format!("Failed to read band {} of scene {}", band, entry.id))?;
            image
                .add_band(band.as_str(), raster)
                .with_context(|| format!("Scene {} band {}", entry.id, band))?;
        }
        collection.push(Scene {
            id: entry.id,
            acquired: entry.acquired,
            cloudy_pixel_percentage: entry.cloudy_pixel_percentage,
            image,
        });
    }
    pb.finish_and_clear();
    info!("Manifest: {} scenes", collection.len());
    Ok(collection)
}

fn read_query(path: &Path) -> Result<ImageCollectionQuery> {
    let query: ImageCollectionQuery = read_json(path, "query")?;
    DateRange::new(query.date_range.start, query.date_range.end)
        .context("Invalid query date range")?;
    Ok(query)
}

fn read_labels(path: &Path) -> Result<LabeledPolygonSet> {
    let def: LabeledPolygonSetDef = read_json(path, "labels")?;
    let labels = LabeledPolygonSet::try_from(def).context("Invalid labeled polygon")?;
    for class in LandCoverClass::ALL {
        info!("Labels: {} polygons of {}", labels.polygons(class).len(), class);
    }
    Ok(labels)
}

fn read_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Invalid pipeline config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn setup_threads(threads: Option<usize>) -> Result<()> {
    if let Some(n) = threads {
        if n == 0 {
            bail!("--threads must be at least 1");
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to configure thread pool")?;
    }
    Ok(())
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_band(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn write_result(raster: &Raster<f64>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn write_classes(raster: &Raster<u8>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_class_geotiff(raster, path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn print_diagnostics(d: &Diagnostics) {
    println!("\nSamples: {} total, {} train, {} test", d.total_samples, d.train_samples, d.test_samples);

    println!("\nConfusion matrix (rows = reference, columns = predicted):");
    print!("{:>12}", "");
    for class in LandCoverClass::ALL {
        print!("{:>12}", class.name());
    }
    println!();
    for (i, row) in d.confusion_matrix.to_rows().iter().enumerate() {
        let name = LandCoverClass::from_id(i as u8).map_or("?", |c| c.name());
        print!("{:>12}", name);
        for count in row {
            print!("{:>12}", count);
        }
        println!();
    }

    println!("\nOverall accuracy: {:.4}", d.overall_accuracy);
    println!("Kappa: {:.4}", d.kappa);
    println!("\nPer class (producer's / consumer's accuracy):");
    let fmt = |v: &Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v));
    for (i, (producer, consumer)) in d
        .producers_accuracy
        .iter()
        .zip(&d.consumers_accuracy)
        .enumerate()
    {
        let name = LandCoverClass::from_id(i as u8).map_or("?", |c| c.name());
        println!("  {:<12} {} / {}", name, fmt(producer), fmt(consumer));
    }

    println!("\nFeature importance:");
    for (band, importance) in &d.feature_importance {
        println!("  {:<6} {:.4}", band, importance);
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    setup_threads(cli.threads)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_band(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }

            let valid: Vec<f64> = raster
                .data()
                .iter()
                .copied()
                .filter(|&v| !raster.is_nodata(v))
                .collect();
            println!("\nStatistics:");
            if !valid.is_empty() {
                let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
                let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = valid.iter().sum::<f64>() / valid.len() as f64;
                println!("  Min: {:.4}", min);
                println!("  Max: {:.4}", max);
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                valid.len(),
                100.0 * valid.len() as f64 / raster.len() as f64
            );
        }

        // ── Indices ──────────────────────────────────────────────────
        Commands::Indices {
            green,
            red,
            nir,
            output,
        } => {
            let green = read_band(&green)?;
            let red = read_band(&red)?;
            let nir = read_band(&nir)?;
            std::fs::create_dir_all(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;

            let start = Instant::now();
            let ndvi_raster = ndvi(&nir, &red).context("NDVI failed")?;
            let ndwi_raster = ndwi(&green, &nir).context("NDWI failed")?;
            let elapsed = start.elapsed();

            let ndvi_path = output.join("NDVI.tif");
            let ndwi_path = output.join("NDWI.tif");
            write_result(&ndvi_raster, &ndvi_path)?;
            write_result(&ndwi_raster, &ndwi_path)?;
            done("NDVI", &ndvi_path, elapsed);
            done("NDWI", &ndwi_path, elapsed);
        }

        // ── Composite ────────────────────────────────────────────────
        Commands::Composite {
            manifest,
            query,
            config,
            output,
        } => {
            let collection = read_manifest(&manifest)?;
            let query = read_query(&query)?;
            let pipeline = Pipeline::new(read_config(config.as_deref())?)?;
            std::fs::create_dir_all(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;

            let start = Instant::now();
            let scenes = collection.query(&query).context("Scene query failed")?;
            info!("{} scenes selected", scenes.len());
            let composite = pipeline
                .composite(&scenes, &query)
                .context("Compositing failed")?;
            let elapsed = start.elapsed();

            for (name, band) in composite.bands() {
                let path = output.join(format!("{}.tif", name));
                write_result(band, &path)?;
                done(name, &path, elapsed);
            }
        }

        // ── Classify ─────────────────────────────────────────────────
        Commands::Classify {
            manifest,
            query,
            labels,
            config,
            output,
            diagnostics,
            export_dir,
        } => {
            let collection = read_manifest(&manifest)?;
            let query = read_query(&query)?;
            let labels = read_labels(&labels)?;
            let config = read_config(config.as_deref())?;
            if config.export.is_some() && export_dir.is_none() {
                info!("Export configured; pass --export-dir to write it");
            }
            let pipeline = Pipeline::new(config)?;
            let sink = export_dir.map(GeoTiffSink::new);

            let pb = spinner("Classifying...");
            let start = Instant::now();
            let outcome = pipeline
                .run(
                    &collection,
                    &query,
                    &labels,
                    sink.as_ref().map(|s| s as &dyn RasterSink),
                )
                .context("Classification failed")?;
            let elapsed = start.elapsed();
            pb.finish_and_clear();

            write_classes(&outcome.classified, &output)?;
            done("Classified raster", &output, elapsed);
            let unclassified = outcome
                .classified
                .data()
                .iter()
                .filter(|&&v| v == CLASS_NODATA)
                .count();
            info!("{} pixels left unclassified (no-data)", unclassified);

            if let (Some(summary), Some(sink)) = (&outcome.export, &sink) {
                println!(
                    "Export saved to: {} ({} x {} at {} m)",
                    sink.path_for(&summary.destination).display(),
                    summary.cols,
                    summary.rows,
                    summary.scale
                );
            }

            print_diagnostics(&outcome.diagnostics);

            if let Some(path) = diagnostics {
                let json = outcome.diagnostics.to_json()?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("\nDiagnostics saved to: {}", path.display());
            }
        }
    }

    Ok(())
}
