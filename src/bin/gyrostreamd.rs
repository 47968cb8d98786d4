//! gyrostreamd - gyro-corrected streaming daemon
//!
//! This daemon:
//! 1. Connects to the camera's interleaved JPEG/gyro byte stream
//! 2. Demultiplexes frames and orientation samples
//! 3. Resolves and applies a corrective rotation per frame
//! 4. Optionally batches frames through the stabilization window
//! 5. Publishes rotation telemetry and stream health to the log

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gyrostream::calibration::{CalibrationStore, SqliteCalibration};
use gyrostream::config::GyrostreamdConfig;
use gyrostream::pipeline::StabilizationPipeline;
use gyrostream::session::SessionBuilder;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = GyrostreamdConfig::load()?;

    let persistence = SqliteCalibration::open(&cfg.calibration_db)
        .with_context(|| format!("open calibration db {}", cfg.calibration_db))?;
    let calibration = CalibrationStore::load(Box::new(persistence));
    log::info!(
        "calibration: {} points, best axis {:?}",
        calibration.table().points().len(),
        calibration.table().best_axis()
    );

    let pipeline = StabilizationPipeline::new(cfg.pipeline_config(), calibration);

    let session = SessionBuilder::new(pipeline)
        .on_rotated_frame(|frame| {
            let (width, height) = frame.image.dimensions();
            log::debug!(
                "frame #{}: {}x{} corrective {:.1} deg",
                frame.sequence,
                width,
                height,
                frame.decision.normalized_angle_deg
            );
        })
        .on_telemetry(|telemetry| {
            log::debug!(
                "sample r={:.1} p={:.1} y={:.1} corrective {:.1} deg",
                telemetry.current_reading.roll,
                telemetry.current_reading.pitch,
                telemetry.current_reading.yaw,
                telemetry.corrective_angle_deg
            );
        })
        .on_stream_unhealthy(|reason| {
            log::error!("stream unhealthy: {}", reason);
        })
        .start_stream(&cfg.stream.url)?;

    if cfg.rotation.enabled {
        session.arm_auto_rotation();
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("install shutdown handler")?;
    }

    log::info!(
        "gyrostreamd running. stream={} mode={:?} stabilization={}",
        cfg.stream.url,
        cfg.rotation.mode,
        cfg.stabilization.enabled
    );

    let mut last_health_log = Instant::now();
    while running.load(Ordering::SeqCst) {
        if last_health_log.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "stream health={} status={:?}",
                session.is_healthy(),
                session.status()
            );
            last_health_log = Instant::now();
        }
        if !session.is_healthy() {
            // Restart policy belongs to whoever supervises the daemon.
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    session.stop()?;
    log::info!("gyrostreamd stopped");
    Ok(())
}
