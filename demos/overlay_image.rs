//! Overlay a Map on a Single Frame
//!
//! Rectifies one raw camera image and draws a scene map on it.
//!
//! Usage:
//! ```bash
//! cargo run --example overlay_image -- \
//!   --image raw.png \
//!   --intrinsics samples/intrinsic.yaml \
//!   --extrinsics samples/extrinsic.yaml \
//!   --map samples/lane.yaml \
//!   --output output/overlay.png
//! ```

use ar_overlay::{DegeneratePolicy, RendererConfig, RenderingPipeline};
use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

/// Scene map overlay tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raw camera frame
    #[arg(short = 'i', long)]
    image: PathBuf,

    /// Intrinsic calibration (ROS camera_info YAML)
    #[arg(long)]
    intrinsics: PathBuf,

    /// Extrinsic calibration holding the ground homography
    #[arg(long)]
    extrinsics: PathBuf,

    /// Scene map to draw
    #[arg(short = 'm', long)]
    map: PathBuf,

    /// Where to write the rendered frame
    #[arg(short = 'o', long, default_value = "output/overlay.png")]
    output: PathBuf,

    /// Line thickness in pixels
    #[arg(long, default_value = "5")]
    stroke_width: u32,

    /// Leave out segments whose ground points project to infinity instead of failing
    #[arg(long)]
    skip_degenerate: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _logger = Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        .start()?;

    let cli = Cli::parse();
    info!("Input image: {:?}", cli.image);
    info!("Map: {:?}", cli.map);

    let renderer_config = RendererConfig {
        stroke_width: cli.stroke_width,
        degenerate_policy: if cli.skip_degenerate {
            DegeneratePolicy::Skip
        } else {
            DegeneratePolicy::Propagate
        },
    };
    let pipeline =
        RenderingPipeline::from_files(&cli.intrinsics, &cli.extrinsics, &cli.map, renderer_config)?;

    let raw = image::open(&cli.image)?.to_rgb8();

    let start = Instant::now();
    let rendered = pipeline.render_frame(&raw)?;
    info!("First frame (with remap table) took {:?}", start.elapsed());

    let start = Instant::now();
    pipeline.render_frame(&raw)?;
    info!("Second frame took {:?}", start.elapsed());

    if let Some(parent) = cli.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rendered.save(&cli.output)?;
    info!("Saved overlay to {:?}", cli.output);

    Ok(())
}
