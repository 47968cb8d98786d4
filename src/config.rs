use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::demux::DEFAULT_MAX_PENDING_BYTES;
use crate::rotation::{
    ResolverConfig, RotationMode, DEFAULT_DEAD_ZONE_DEG, DEFAULT_SNAP_TOLERANCE_DEG,
};
use crate::stabilize::DEFAULT_WINDOW_CAPACITY;
use crate::{PipelineConfig, RotationAxis};

const DEFAULT_STREAM_URL: &str = "http://127.0.0.1:81/stream";
const DEFAULT_CALIBRATION_DB: &str = "calibration.db";
const DEFAULT_FRAME_SKIP_RATE: u32 = 2;

#[derive(Debug, Deserialize, Default)]
struct GyrostreamdConfigFile {
    calibration_db: Option<String>,
    stream: Option<StreamConfigFile>,
    rotation: Option<RotationConfigFile>,
    stabilization: Option<StabilizationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    frame_skip_rate: Option<u32>,
    max_pending_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RotationConfigFile {
    enabled: Option<bool>,
    mode: Option<RotationMode>,
    axis: Option<RotationAxis>,
    dead_zone_deg: Option<f64>,
    snap_tolerance_deg: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct StabilizationConfigFile {
    enabled: Option<bool>,
    window: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct GyrostreamdConfig {
    pub calibration_db: String,
    pub stream: StreamSettings,
    pub rotation: RotationSettings,
    pub stabilization: StabilizationSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub frame_skip_rate: u32,
    pub max_pending_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub enabled: bool,
    pub mode: RotationMode,
    /// Pinned axis; `None` lets the calibration table choose.
    pub axis: Option<RotationAxis>,
    pub dead_zone_deg: f64,
    pub snap_tolerance_deg: f64,
}

#[derive(Debug, Clone)]
pub struct StabilizationSettings {
    pub enabled: bool,
    pub window: usize,
}

impl GyrostreamdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("GYROSTREAM_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GyrostreamdConfigFile) -> Self {
        let stream = StreamSettings {
            url: file
                .stream
                .as_ref()
                .and_then(|stream| stream.url.clone())
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            frame_skip_rate: file
                .stream
                .as_ref()
                .and_then(|stream| stream.frame_skip_rate)
                .unwrap_or(DEFAULT_FRAME_SKIP_RATE),
            max_pending_bytes: file
                .stream
                .as_ref()
                .and_then(|stream| stream.max_pending_bytes)
                .unwrap_or(DEFAULT_MAX_PENDING_BYTES),
        };
        let rotation = RotationSettings {
            enabled: file
                .rotation
                .as_ref()
                .and_then(|rotation| rotation.enabled)
                .unwrap_or(true),
            mode: file
                .rotation
                .as_ref()
                .and_then(|rotation| rotation.mode)
                .unwrap_or(RotationMode::Calibrated),
            axis: file.rotation.as_ref().and_then(|rotation| rotation.axis),
            dead_zone_deg: file
                .rotation
                .as_ref()
                .and_then(|rotation| rotation.dead_zone_deg)
                .unwrap_or(DEFAULT_DEAD_ZONE_DEG),
            snap_tolerance_deg: file
                .rotation
                .as_ref()
                .and_then(|rotation| rotation.snap_tolerance_deg)
                .unwrap_or(DEFAULT_SNAP_TOLERANCE_DEG),
        };
        let stabilization = StabilizationSettings {
            enabled: file
                .stabilization
                .as_ref()
                .and_then(|stabilization| stabilization.enabled)
                .unwrap_or(false),
            window: file
                .stabilization
                .and_then(|stabilization| stabilization.window)
                .unwrap_or(DEFAULT_WINDOW_CAPACITY),
        };
        Self {
            calibration_db: file
                .calibration_db
                .unwrap_or_else(|| DEFAULT_CALIBRATION_DB.to_string()),
            stream,
            rotation,
            stabilization,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("GYROSTREAM_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url;
            }
        }
        if let Ok(db) = std::env::var("GYROSTREAM_CALIBRATION_DB") {
            if !db.trim().is_empty() {
                self.calibration_db = db;
            }
        }
        if let Ok(mode) = std::env::var("GYROSTREAM_ROTATION_MODE") {
            self.rotation.mode = match mode.to_ascii_lowercase().as_str() {
                "delta" => RotationMode::Delta,
                "calibrated" => RotationMode::Calibrated,
                other => {
                    return Err(anyhow!(
                        "GYROSTREAM_ROTATION_MODE must be 'delta' or 'calibrated', got '{}'",
                        other
                    ))
                }
            };
        }
        if let Ok(axis) = std::env::var("GYROSTREAM_ROTATION_AXIS") {
            if !axis.trim().is_empty() {
                self.rotation.axis = Some(axis.parse()?);
            }
        }
        if let Ok(max_pending) = std::env::var("GYROSTREAM_MAX_PENDING_BYTES") {
            self.stream.max_pending_bytes = max_pending
                .parse()
                .map_err(|_| anyhow!("GYROSTREAM_MAX_PENDING_BYTES must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.stream.url.trim().is_empty() {
            return Err(anyhow!("stream url must not be empty"));
        }
        if self.stream.frame_skip_rate == 0 {
            return Err(anyhow!("frame_skip_rate must be >= 1"));
        }
        if self.stream.max_pending_bytes == 0 {
            return Err(anyhow!("max_pending_bytes must be > 0"));
        }
        if self.stabilization.window == 0 {
            return Err(anyhow!("stabilization window must be >= 1"));
        }
        if self.rotation.dead_zone_deg < 0.0 || self.rotation.snap_tolerance_deg < 0.0 {
            return Err(anyhow!("rotation tolerances must not be negative"));
        }
        Ok(())
    }

    /// The pipeline configuration this daemon config describes.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            resolver: ResolverConfig {
                mode: self.rotation.mode,
                axis: self.rotation.axis,
                dead_zone_deg: self.rotation.dead_zone_deg,
                snap_tolerance_deg: self.rotation.snap_tolerance_deg,
            },
            frame_skip_rate: self.stream.frame_skip_rate,
            rotation_enabled: self.rotation.enabled,
            stabilization_enabled: self.stabilization.enabled,
            window_capacity: self.stabilization.window,
            max_pending_bytes: self.stream.max_pending_bytes,
        }
    }
}

fn read_config_file(path: &Path) -> Result<GyrostreamdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
