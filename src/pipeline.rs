//! Pipeline orchestration: demux → resolve → rotate → stabilize → emit.
//!
//! The pipeline is synchronous and deterministic: one `ingest` call demuxes
//! whatever the new bytes unlock, resolves a rotation per record, transforms
//! the kept frames and reports everything produced, in demux order. Callers
//! decide what thread this runs on; the session module keeps it off the
//! network thread.

use anyhow::Result;

use crate::calibration::{CalibrationPoint, CalibrationStore, CalibrationTable};
use crate::demux::FrameDemuxer;
use crate::rotation::{ResolverConfig, RotationResolver};
use crate::stabilize::{
    PassthroughStabilizer, StabilizationWindow, Stabilizer, DEFAULT_WINDOW_CAPACITY,
};
use crate::{transform, FrameRecord, RotatedFrame, RotationTelemetry, DEFAULT_MAX_PENDING_BYTES};

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub resolver: ResolverConfig,
    /// Process every Nth demuxed pair (1 keeps every frame).
    pub frame_skip_rate: u32,
    pub rotation_enabled: bool,
    pub stabilization_enabled: bool,
    pub window_capacity: usize,
    pub max_pending_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            frame_skip_rate: 1,
            rotation_enabled: true,
            stabilization_enabled: false,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }
}

/// Everything one `ingest` call produced, in demux order.
#[derive(Default)]
pub struct IngestReport {
    pub frames: Vec<RotatedFrame>,
    pub telemetry: Vec<RotationTelemetry>,
    pub skipped_frames: u64,
    pub undecodable_frames: u64,
}

/// Orchestrates the full correction pipeline over an incoming byte stream.
pub struct StabilizationPipeline {
    demuxer: FrameDemuxer,
    resolver: RotationResolver,
    calibration: CalibrationStore,
    window: StabilizationWindow,
    stabilizer: Box<dyn Stabilizer>,
    rotation_enabled: bool,
    stabilization_enabled: bool,
    frame_skip_rate: u64,
    skip_counter: u64,
}

impl StabilizationPipeline {
    pub fn new(cfg: PipelineConfig, calibration: CalibrationStore) -> Self {
        Self::with_stabilizer(cfg, calibration, Box::new(PassthroughStabilizer))
    }

    pub fn with_stabilizer(
        cfg: PipelineConfig,
        calibration: CalibrationStore,
        stabilizer: Box<dyn Stabilizer>,
    ) -> Self {
        Self {
            demuxer: FrameDemuxer::with_max_pending(cfg.max_pending_bytes),
            resolver: RotationResolver::new(cfg.resolver),
            calibration,
            window: StabilizationWindow::new(cfg.window_capacity),
            stabilizer,
            rotation_enabled: cfg.rotation_enabled,
            stabilization_enabled: cfg.stabilization_enabled,
            frame_skip_rate: cfg.frame_skip_rate.max(1) as u64,
            skip_counter: 0,
        }
    }

    /// Feeds newly received stream bytes through the whole pipeline.
    ///
    /// The only error is pending-buffer overflow, which is fatal for the
    /// stream session; everything else (unparseable samples, undecodable
    /// frames) is dropped locally and counted in the report.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<IngestReport> {
        let records: Vec<FrameRecord> = self.demuxer.ingest(bytes)?.collect();

        let mut report = IngestReport::default();
        for record in records {
            self.process_record(record, &mut report);
        }
        Ok(report)
    }

    fn process_record(&mut self, record: FrameRecord, report: &mut IngestReport) {
        // Every sample feeds the resolver, even for decimated frames, so the
        // neutral reference arms on the first sample regardless of skip rate.
        let decision = self.resolver.resolve(record.orientation, self.calibration.table());
        report.telemetry.push(RotationTelemetry {
            first_reading: self.resolver.first_reading(),
            current_reading: record.orientation,
            corrective_angle_deg: decision.normalized_angle_deg,
        });

        let keep = self.skip_counter % self.frame_skip_rate == 0;
        self.skip_counter += 1;
        if !keep {
            report.skipped_frames += 1;
            return;
        }

        let image = match transform::decode_jpeg(&record.image_bytes) {
            Ok(image) => image,
            Err(err) => {
                log::debug!("frame #{} dropped: {}", record.sequence, err);
                report.undecodable_frames += 1;
                return;
            }
        };

        let image = if self.rotation_enabled {
            transform::rotate_frame(&image, decision.normalized_angle_deg)
        } else {
            image
        };

        let frame = RotatedFrame {
            sequence: record.sequence,
            image,
            decision,
        };

        if self.stabilization_enabled {
            if let Some(batch) = self.window.push(frame) {
                let batch = self.stabilizer.stabilize(batch);
                self.window.finish_pass();
                report.frames.extend(batch);
            }
        } else {
            report.frames.push(frame);
        }
    }

    pub fn arm_auto_rotation(&mut self) {
        self.resolver.arm();
    }

    pub fn disarm_auto_rotation(&mut self) {
        self.resolver.disarm();
    }

    pub fn set_rotation_enabled(&mut self, enabled: bool) {
        self.rotation_enabled = enabled;
    }

    pub fn set_stabilization_enabled(&mut self, enabled: bool) {
        self.stabilization_enabled = enabled;
    }

    pub fn calibration(&self) -> &CalibrationTable {
        self.calibration.table()
    }

    /// Inserts or replaces a calibration point and persists the whole set.
    pub fn upsert_calibration(&mut self, point: CalibrationPoint) -> Result<()> {
        self.calibration.upsert(point)
    }

    /// Orientation spans dropped by the demuxer so far.
    pub fn dropped_samples(&self) -> u64 {
        self.demuxer.dropped_samples()
    }

    /// Frames discarded by the window while a pass was in flight.
    pub fn dropped_frames(&self) -> u64 {
        self.window.dropped_frames()
    }

    pub fn pending_bytes(&self) -> usize {
        self.demuxer.pending_bytes()
    }
}
