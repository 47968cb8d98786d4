//! demo - end-to-end synthetic run of the rotation pipeline
//!
//! Pulls the `stub://` byte stream through the full demux/resolve/rotate
//! path and prints what a display collaborator would receive.

use anyhow::Result;
use clap::Parser;

use gyrostream::calibration::{CalibrationStore, InMemoryCalibration};
use gyrostream::ingest::{ByteStreamSource, DEFAULT_CHUNK_BYTES};
use gyrostream::pipeline::{PipelineConfig, StabilizationPipeline};
use gyrostream::rotation::{ResolverConfig, RotationMode};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of frames to pull from the synthetic stream.
    #[arg(long, default_value_t = 30)]
    frames: u64,
    /// Resolve rotation from raw axis deltas instead of the calibration table.
    #[arg(long)]
    delta: bool,
    /// Batch frames through the stabilization window.
    #[arg(long)]
    stabilize: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mode = if args.delta {
        RotationMode::Delta
    } else {
        RotationMode::Calibrated
    };
    let cfg = PipelineConfig {
        resolver: ResolverConfig {
            mode,
            ..ResolverConfig::default()
        },
        stabilization_enabled: args.stabilize,
        ..PipelineConfig::default()
    };

    let calibration = CalibrationStore::load(Box::new(InMemoryCalibration::new()));
    let mut pipeline = StabilizationPipeline::new(cfg, calibration);
    pipeline.arm_auto_rotation();

    let mut source = ByteStreamSource::connect("stub://camera")?;
    let mut chunk = vec![0u8; DEFAULT_CHUNK_BYTES];
    let mut emitted = 0u64;

    println!("=== Synthetic Stream ({:?} mode) ===", mode);
    while emitted < args.frames {
        let n = source.read_chunk(&mut chunk)?;
        let report = pipeline.ingest(&chunk[..n])?;
        for frame in &report.frames {
            emitted += 1;
            let (width, height) = frame.image.dimensions();
            println!(
                "frame #{:<4} {}x{:<4} raw yaw {:>7.1}  corrective {:>7.1} deg",
                frame.sequence,
                width,
                height,
                frame.decision.raw_sample.yaw,
                frame.decision.normalized_angle_deg
            );
            if emitted == args.frames {
                break;
            }
        }
    }

    println!();
    println!(
        "emitted {} frames (dropped samples: {}, dropped frames: {})",
        emitted,
        pipeline.dropped_samples(),
        pipeline.dropped_frames()
    );
    Ok(())
}
