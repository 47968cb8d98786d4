//! Gyro-corrected MJPEG streaming kernel.
//!
//! This crate implements the core pipeline for a camera whose endpoint emits
//! one unbounded byte stream interleaving JPEG video frames with inline
//! gyroscope samples:
//!
//! 1. **Demux**: split the stream into paired JPEG/orientation records
//!    (`demux`, `orientation`).
//! 2. **Resolve**: map each orientation sample to a corrective rotation angle
//!    using a neutral reference and a persisted calibration table
//!    (`calibration`, `rotation`).
//! 3. **Transform**: decode the frame and apply the rotation (`transform`).
//! 4. **Stabilize**: batch rotated frames through a bounded window before
//!    they reach the display boundary (`stabilize`).
//!
//! `pipeline` wires the stages together synchronously; `session` runs the
//! pipeline behind the streaming boundary operations (start/stop/arm/...).
//! The GUI, the playback backend, and connection retry policy are external
//! collaborators and live outside this crate.

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod calibration;
pub mod config;
pub mod demux;
pub mod ingest;
pub mod orientation;
pub mod pipeline;
pub mod rotation;
pub mod session;
pub mod stabilize;
pub mod transform;

pub use calibration::{
    CalibrationPersistence, CalibrationPoint, CalibrationStore, CalibrationTable,
    InMemoryCalibration, SqliteCalibration,
};
pub use config::GyrostreamdConfig;
pub use demux::{FrameDemuxer, PendingOverflow, DEFAULT_MAX_PENDING_BYTES};
pub use ingest::ByteStreamSource;
pub use orientation::{parse_sample, ParseFailure};
pub use pipeline::{IngestReport, PipelineConfig, StabilizationPipeline};
pub use rotation::{
    normalize_angle, ResolverConfig, RotationDecision, RotationMode, RotationResolver,
};
pub use session::{SessionBuilder, StreamSession, StreamStatus};
pub use stabilize::{
    PassthroughStabilizer, StabilizationWindow, Stabilizer, DEFAULT_WINDOW_CAPACITY,
};

// -------------------- Orientation Samples --------------------

/// A single gyroscope reading, in degrees per axis.
///
/// Samples carry no ordering guarantee beyond arrival order; the demuxer's
/// sequence counter is the only ordering authority downstream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Which sensor axis drives the sensor-to-angle mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationAxis {
    Roll,
    Pitch,
    Yaw,
}

impl RotationAxis {
    /// The sample's value along this axis.
    pub fn value_of(&self, sample: &OrientationSample) -> f64 {
        match self {
            RotationAxis::Roll => sample.roll,
            RotationAxis::Pitch => sample.pitch,
            RotationAxis::Yaw => sample.yaw,
        }
    }
}

impl FromStr for RotationAxis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "roll" => Ok(RotationAxis::Roll),
            "pitch" => Ok(RotationAxis::Pitch),
            "yaw" => Ok(RotationAxis::Yaw),
            other => Err(anyhow!(
                "unknown rotation axis '{}'; expected roll, pitch or yaw",
                other
            )),
        }
    }
}

// -------------------- Demuxed Records --------------------

/// One demuxed pair: a complete JPEG span and the orientation sample that
/// arrived with it. Ownership transfers to the pipeline on extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRecord {
    pub image_bytes: Vec<u8>,
    pub orientation: OrientationSample,
    /// Monotonically increasing per emitted record.
    pub sequence: u64,
}

// -------------------- Emitted Frames & Telemetry --------------------

/// A decoded frame with its corrective rotation applied.
#[derive(Clone, Debug)]
pub struct RotatedFrame {
    pub sequence: u64,
    pub image: image::RgbaImage,
    pub decision: RotationDecision,
}

/// Rotation telemetry published per resolved sample: the first reading seen
/// after arming, the live reading, and the applied corrective angle.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RotationTelemetry {
    pub first_reading: Option<OrientationSample>,
    pub current_reading: OrientationSample,
    pub corrective_angle_deg: f64,
}
