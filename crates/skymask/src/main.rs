//! skymask: segment the sky in a photograph and write a binary mask.
//!
//! Decodes an image file, runs the classical sky segmentation pipeline
//! with configurable parameters and writes the mask as a PNG (white =
//! sky). Per-stage diagnostics are printed to stdout. Useful for:
//!
//! - Producing sky masks from the command line
//! - Tuning Canny thresholds, morphology sizes, the dark threshold
//! - Measuring per-stage durations to identify bottlenecks
//! - Inspecting every intermediate raster with `--save-stages`
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin skymask -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to see per-stage log lines.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use image::{DynamicImage, GrayImage};
use skymask_pipeline::diagnostics::{PipelineDiagnostics, SystemClock, process_with_diagnostics};
use skymask_pipeline::{GradientNorm, PipelineConfig, StagedResult};

/// Classical sky segmentation.
///
/// Runs the sky segmentation pipeline on a given image, writes the mask
/// and prints per-stage timing and pixel-count diagnostics.
#[derive(Parser)]
#[command(name = "skymask", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Where to write the mask PNG. Defaults to `<stem>-sky.png` next to
    /// the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Gaussian kernel side length (odd).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_KERNEL_SIZE)]
    blur_kernel_size: u32,

    /// Gaussian sigma. Zero derives it from the kernel size.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Canny low threshold.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CANNY_LOW)]
    canny_low: f32,

    /// Canny high threshold.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CANNY_HIGH)]
    canny_high: f32,

    /// Gradient magnitude formula.
    #[arg(long, value_enum, default_value_t = Norm::L1)]
    gradient_norm: Norm,

    /// Edge thickening kernel side length (odd).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EDGE_KERNEL_SIZE)]
    edge_kernel_size: u32,

    /// Edge dilation passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EDGE_DILATE_ITERATIONS)]
    edge_dilate_iterations: u32,

    /// Edge erosion passes.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EDGE_ERODE_ITERATIONS)]
    edge_erode_iterations: u32,

    /// Gray level at or below which a pixel is dark.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_DARK_THRESHOLD)]
    dark_threshold: u8,

    /// Regions whose bounding box starts above this fraction of the
    /// height are sky (0.0-1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TOP_FRACTION)]
    top_fraction: f64,

    /// Final opening kernel side length (odd).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OPEN_KERNEL_SIZE)]
    open_kernel_size: u32,

    /// Write every intermediate raster as PNG into this directory.
    #[arg(long)]
    save_stages: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their default values.
    #[arg(long)]
    config_json: Option<String>,
}

/// Gradient norm selection.
#[derive(Clone, Copy, ValueEnum)]
enum Norm {
    /// `|gx| + |gy|`.
    L1,
    /// Euclidean magnitude.
    L2,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        blur_kernel_size: cli.blur_kernel_size,
        blur_sigma: cli.blur_sigma,
        canny_low: cli.canny_low,
        canny_high: cli.canny_high,
        gradient_norm: match cli.gradient_norm {
            Norm::L1 => GradientNorm::L1,
            Norm::L2 => GradientNorm::L2,
        },
        edge_kernel_size: cli.edge_kernel_size,
        edge_dilate_iterations: cli.edge_dilate_iterations,
        edge_erode_iterations: cli.edge_erode_iterations,
        dark_threshold: cli.dark_threshold,
        top_fraction: cli.top_fraction,
        open_kernel_size: cli.open_kernel_size,
    })
}

/// `photo.jpg` -> `photo-sky.png` in the same directory.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}-sky.png"))
}

/// Decode any supported format and normalise it to 8-bit RGB.
fn load_rgb(path: &Path) -> Result<DynamicImage, String> {
    let decoded =
        image::open(path).map_err(|e| format!("Error decoding {}: {e}", path.display()))?;
    log::debug!("decoded {} as {:?}", path.display(), decoded.color());
    Ok(DynamicImage::ImageRgb8(decoded.to_rgb8()))
}

fn write_gray(image: &GrayImage, path: &Path) -> Result<(), String> {
    image
        .save(path)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))
}

/// Write each intermediate raster of `staged` into `dir`, numbered in
/// pipeline order.
fn save_stages(staged: &StagedResult, dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;

    let bgr_path = dir.join("0-bgr.png");
    staged
        .bgr
        .to_rgb()
        .save(&bgr_path)
        .map_err(|e| format!("Error writing {}: {e}", bgr_path.display()))?;

    let masks = [
        ("1-grayscale.png", &staged.grayscale),
        ("2-edges.png", staged.edges.as_gray()),
        ("3-bright.png", staged.bright.as_gray()),
        ("4-combined.png", staged.combined.as_gray()),
        ("5-sky.png", staged.sky.as_gray()),
        ("6-refined.png", staged.refined.as_gray()),
    ];
    for (name, raster) in masks {
        write_gray(raster, &dir.join(name))?;
    }
    Ok(())
}

/// Side effects performed once, after the first run.
fn write_outputs(cli: &Cli, staged: &StagedResult) -> Result<(), String> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.image_path));
    write_gray(staged.final_mask().as_gray(), &output)?;
    eprintln!(
        "Mask written to {} ({} of {} pixels are sky)",
        output.display(),
        staged.final_mask().count_set(),
        staged.dimensions.pixel_count(),
    );

    if let Some(ref dir) = cli.save_stages {
        save_stages(staged, dir)?;
        eprintln!("Stages written to {}", dir.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match load_rgb(&cli.image_path) {
        Ok(image) => image,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}x{})",
        cli.image_path.display(),
        image.width(),
        image.height(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match process_with_diagnostics(image.clone(), config.clone(), &SystemClock) {
            Ok((staged, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                if run == 0
                    && let Err(msg) = write_outputs(&cli, &staged)
                {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Min, mean and max of a non-empty sample, in milliseconds.
#[allow(clippy::cast_precision_loss)]
fn spread(millis: &[f64]) -> (f64, f64, f64) {
    let min = millis.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = millis.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = if millis.is_empty() {
        0.0
    } else {
        millis.iter().sum::<f64>() / millis.len() as f64
    };
    (min, mean, max)
}

/// Print aggregated statistics across multiple runs.
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let totals: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();
    let (min, mean, max) = spread(&totals);
    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!(
        "{:<24} {:>12} {:>12} {:>12}",
        "Stage", "Min (ms)", "Mean (ms)", "Max (ms)"
    );
    println!("{}", "-".repeat(64));

    for (index, (name, _)) in first.stages().iter().enumerate() {
        let stage_millis: Vec<f64> = all_diagnostics
            .iter()
            .map(|d| d.stages()[index].1.duration.as_secs_f64() * 1000.0)
            .collect();
        let (min, mean, max) = spread(&stage_millis);
        println!("{name:<24} {min:>10.3}ms {mean:>10.3}ms {max:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("skymask").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_default_to_pipeline_defaults() {
        let config = config_from_cli(&parse(&["in.png"])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn individual_flags_reach_the_config() {
        let cli = parse(&[
            "in.png",
            "--dark-threshold",
            "40",
            "--gradient-norm",
            "l2",
            "--open-kernel-size",
            "11",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.dark_threshold, 40);
        assert_eq!(config.gradient_norm, GradientNorm::L2);
        assert_eq!(config.open_kernel_size, 11);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "in.png",
            "--dark-threshold",
            "40",
            "--config-json",
            r#"{"top_fraction": 0.25}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!((config.top_fraction - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.dark_threshold, PipelineConfig::DEFAULT_DARK_THRESHOLD);
    }

    #[test]
    fn malformed_config_json_is_reported() {
        let cli = parse(&["in.png", "--config-json", "{not json"]);
        assert!(config_from_cli(&cli).is_err());
    }

    #[test]
    fn zero_runs_is_rejected() {
        let result = Cli::try_parse_from(["skymask", "in.png", "--runs", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("shots/beach.jpg")),
            PathBuf::from("shots/beach-sky.png")
        );
    }

    #[test]
    fn spread_of_sample() {
        let (min, mean, max) = spread(&[1.0, 2.0, 6.0]);
        assert!((min - 1.0).abs() < 1e-12);
        assert!((mean - 3.0).abs() < 1e-12);
        assert!((max - 6.0).abs() < 1e-12);
    }
}
