use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image::GrayImage;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use slice_volume::config::{
    DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_PROGRESS_STEPS, DEFAULT_SPACING_TOLERANCE,
};
use slice_volume::{
    DicomSeries, LoadOutcome, LoaderConfig, ProgressiveLoader, VolumeConfig, VolumeHandle,
    VolumeRegistry,
};

/// Assemble a DICOM series into a volume and save its middle slice.
#[derive(Parser, Debug)]
#[command(name = "slice-volume", version, about, long_about = None)]
struct Args {
    /// Directory holding the .dcm files of one series
    #[arg(default_value = "dicom", env = "SLICE_VOLUME_DIR")]
    directory: PathBuf,

    /// PNG file the middle slice is written to
    #[arg(short, long, default_value = "result.png", env = "SLICE_VOLUME_OUTPUT")]
    output: PathBuf,

    /// Number of progress notifications per load
    #[arg(long, default_value_t = DEFAULT_PROGRESS_STEPS, env = "SLICE_VOLUME_PROGRESS_STEPS")]
    progress_steps: usize,

    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONCURRENT_FETCHES,
        env = "SLICE_VOLUME_MAX_CONCURRENT_FETCHES"
    )]
    max_concurrent_fetches: usize,

    /// Allowed relative deviation of the inter-slice spacing
    #[arg(long, default_value_t = DEFAULT_SPACING_TOLERANCE, env = "SLICE_VOLUME_SPACING_TOLERANCE")]
    spacing_tolerance: f64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "slice_volume=debug"
    } else {
        "slice_volume=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let series = DicomSeries::open_directory(&args.directory)?;
    let key = series
        .series_uid()
        .map(str::to_string)
        .unwrap_or_else(|| args.directory.display().to_string());

    let volume_config = VolumeConfig::default().with_spacing_tolerance(args.spacing_tolerance);
    let registry = VolumeRegistry::new();
    let handle = registry
        .get_or_try_insert_with(&key, || VolumeHandle::build(series.slices(), &volume_config))?;
    info!(
        series = %key,
        dimensions = ?handle.dimensions(),
        spacing = ?handle.spacing(),
        origin = ?handle.origin(),
        "volume geometry"
    );

    let loader_config = LoaderConfig::default()
        .with_progress_steps(args.progress_steps)
        .with_max_concurrent_fetches(args.max_concurrent_fetches);
    let loader = ProgressiveLoader::with_config(Arc::new(series), loader_config);

    let mut events = handle.subscribe();
    let mut load = loader.start(Arc::clone(&handle));
    let outcome = loop {
        tokio::select! {
            result = &mut load => break result??,
            Ok(event) = events.recv() => {
                info!(processed = event.processed, total = event.total, "volume changed");
            }
        }
    };
    if let LoadOutcome::Loaded { slices } = outcome {
        info!(slices, ranges = ?handle.range().channels(), "volume ready");
    }

    write_preview(&handle, &args.output)?;
    info!(path = %args.output.display(), "middle slice written");
    Ok(())
}

/// Save the middle slot of channel 0, windowed to the volume range.
fn write_preview(handle: &VolumeHandle, path: &Path) -> Result<(), Box<dyn Error>> {
    let [columns, rows, depth] = handle.dimensions();
    let channels = handle.channels();
    let range = handle.channel_range(0)?;
    let width = (range.max - range.min).max(f64::EPSILON);

    let values = handle
        .buffer()
        .slot_values(depth / 2)
        .ok_or("volume has no slices")?;

    // stored rows are bottom-up
    let pixels: Vec<u8> = values
        .chunks(columns * channels)
        .rev()
        .flat_map(|row| row.iter().step_by(channels))
        .map(|value| ((value - range.min) / width * 255.0).clamp(0.0, 255.0) as u8)
        .collect();

    let image = GrayImage::from_raw(u32::try_from(columns)?, u32::try_from(rows)?, pixels)
        .ok_or("preview does not match the slice size")?;
    image.save(path)?;
    Ok(())
}
