//! Streaming session boundary.
//!
//! A session runs the pipeline behind the operations the app layer needs:
//! start/stop, arm/disarm auto-rotation, the rotation/stabilization toggles,
//! and the frame/telemetry/health callbacks.
//!
//! Two threads per session: a reader that does nothing but pull bytes off the
//! network, and a worker that owns the pipeline and the callbacks. CPU-bound
//! demux/rotate work never runs on the reader thread, and frames reach the
//! callbacks in demux order from a single thread. Control flows to the worker
//! as explicit messages; the only shared state is the stop flag and the
//! health/status cell.
//!
//! Callbacks are invoked on the worker thread. A collaborator that needs its
//! own thread affinity (a display loop, say) should hand the frame off from
//! inside the callback.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::calibration::CalibrationPoint;
use crate::ingest::{ByteStreamSource, DEFAULT_CHUNK_BYTES};
use crate::pipeline::StabilizationPipeline;
use crate::{RotatedFrame, RotationTelemetry};

const DATA_CHANNEL_DEPTH: usize = 64;
const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type FrameCallback = Box<dyn FnMut(&RotatedFrame) + Send>;
pub type TelemetryCallback = Box<dyn FnMut(&RotationTelemetry) + Send>;
pub type UnhealthyCallback = Box<dyn FnMut(&str) + Send>;

/// Observable session lifecycle, mirroring what a player UI needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamStatus {
    Stopped,
    Loading,
    Playing,
    Failed,
}

enum Control {
    Arm,
    Disarm,
    SetRotation(bool),
    SetStabilization(bool),
    UpsertCalibration(CalibrationPoint),
    Shutdown,
}

struct SessionShared {
    status: Mutex<StreamStatus>,
    healthy: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl SessionShared {
    fn set_status(&self, status: StreamStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }

    fn mark_unhealthy(&self, reason: String) {
        self.healthy.store(false, Ordering::SeqCst);
        self.set_status(StreamStatus::Failed);
        if let Ok(mut guard) = self.failure.lock() {
            guard.get_or_insert(reason);
        }
    }

    fn failure_reason(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Builds a session around a prepared pipeline, registering callbacks before
/// the stream starts.
pub struct SessionBuilder {
    pipeline: StabilizationPipeline,
    on_frame: Option<FrameCallback>,
    on_telemetry: Option<TelemetryCallback>,
    on_unhealthy: Option<UnhealthyCallback>,
}

impl SessionBuilder {
    pub fn new(pipeline: StabilizationPipeline) -> Self {
        Self {
            pipeline,
            on_frame: None,
            on_telemetry: None,
            on_unhealthy: None,
        }
    }

    /// Called once per emitted frame, in demux order.
    pub fn on_rotated_frame(mut self, cb: impl FnMut(&RotatedFrame) + Send + 'static) -> Self {
        self.on_frame = Some(Box::new(cb));
        self
    }

    /// Called once per resolved orientation sample.
    pub fn on_telemetry(mut self, cb: impl FnMut(&RotationTelemetry) + Send + 'static) -> Self {
        self.on_telemetry = Some(Box::new(cb));
        self
    }

    /// Called once when the stream becomes unhealthy (ended, read failure, or
    /// pending-buffer overflow). Restart policy belongs to the caller.
    pub fn on_stream_unhealthy(mut self, cb: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_unhealthy = Some(Box::new(cb));
        self
    }

    /// Connects to the endpoint and spawns the reader and worker threads.
    /// Connection errors surface here, before any thread exists.
    pub fn start_stream(self, endpoint_url: &str) -> Result<StreamSession> {
        let source = ByteStreamSource::connect(endpoint_url)?;
        log::info!("stream session connected to {}", endpoint_url);

        let shared = Arc::new(SessionShared {
            status: Mutex::new(StreamStatus::Loading),
            healthy: AtomicBool::new(true),
            failure: Mutex::new(None),
        });
        let stop = Arc::new(AtomicBool::new(false));

        let (data_tx, data_rx) = mpsc::sync_channel::<Vec<u8>>(DATA_CHANNEL_DEPTH);
        let (control_tx, control_rx) = mpsc::channel::<Control>();

        let reader = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || run_reader(source, data_tx, shared, stop))
        };

        let worker = {
            let shared = Arc::clone(&shared);
            let mut worker_state = WorkerState {
                pipeline: self.pipeline,
                on_frame: self.on_frame,
                on_telemetry: self.on_telemetry,
                on_unhealthy: self.on_unhealthy,
            };
            std::thread::spawn(move || worker_state.run(data_rx, control_rx, shared))
        };

        Ok(StreamSession {
            control: control_tx,
            shared,
            stop,
            reader: Some(reader),
            worker: Some(worker),
        })
    }
}

/// A running stream session. Dropping without calling [`stop`](Self::stop)
/// detaches the threads; `stop` is the orderly path.
pub struct StreamSession {
    control: Sender<Control>,
    shared: Arc<SessionShared>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl StreamSession {
    pub fn status(&self) -> StreamStatus {
        self.shared
            .status
            .lock()
            .map(|guard| *guard)
            .unwrap_or(StreamStatus::Failed)
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
    }

    /// Why the stream went unhealthy, if it did.
    pub fn failure_reason(&self) -> Option<String> {
        self.shared.failure_reason()
    }

    /// Arms auto-rotation: the next sample becomes the neutral reference.
    pub fn arm_auto_rotation(&self) {
        self.send(Control::Arm);
    }

    /// Clears the neutral reference.
    pub fn disarm_auto_rotation(&self) {
        self.send(Control::Disarm);
    }

    pub fn set_rotation_enabled(&self, enabled: bool) {
        self.send(Control::SetRotation(enabled));
    }

    pub fn set_stabilization_enabled(&self, enabled: bool) {
        self.send(Control::SetStabilization(enabled));
    }

    /// Inserts or replaces a calibration point; the worker persists the set.
    pub fn upsert_calibration(&self, point: CalibrationPoint) {
        self.send(Control::UpsertCalibration(point));
    }

    fn send(&self, control: Control) {
        if self.control.send(control).is_err() {
            log::debug!("control message dropped: session worker already stopped");
        }
    }

    /// Stops the session and joins both threads. Safe to call while a
    /// stabilization pass is in flight; the pass completes or is abandoned
    /// with the window invariants intact.
    pub fn stop(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.control.send(Control::Shutdown);

        if let Some(reader) = self.reader.take() {
            reader
                .join()
                .map_err(|_| anyhow!("stream reader thread panicked"))?;
        }
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("stream worker thread panicked"))?;
        }
        self.shared.set_status(StreamStatus::Stopped);
        Ok(())
    }
}

fn run_reader(
    mut source: ByteStreamSource,
    data_tx: SyncSender<Vec<u8>>,
    shared: Arc<SessionShared>,
    stop: Arc<AtomicBool>,
) {
    let mut first_chunk = true;
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let mut chunk = vec![0u8; DEFAULT_CHUNK_BYTES];
        match source.read_chunk(&mut chunk) {
            Ok(0) => {
                shared.mark_unhealthy("stream ended".to_string());
                break;
            }
            Ok(n) => {
                chunk.truncate(n);
                if first_chunk {
                    shared.set_status(StreamStatus::Playing);
                    first_chunk = false;
                }
                if data_tx.send(chunk).is_err() {
                    // Worker gone; nothing left to feed.
                    break;
                }
            }
            Err(err) => {
                if !stop.load(Ordering::SeqCst) {
                    shared.mark_unhealthy(format!("stream read failed: {}", err));
                }
                break;
            }
        }
    }
}

struct WorkerState {
    pipeline: StabilizationPipeline,
    on_frame: Option<FrameCallback>,
    on_telemetry: Option<TelemetryCallback>,
    on_unhealthy: Option<UnhealthyCallback>,
}

impl WorkerState {
    fn run(
        &mut self,
        data_rx: Receiver<Vec<u8>>,
        control_rx: Receiver<Control>,
        shared: Arc<SessionShared>,
    ) {
        loop {
            for control in control_rx.try_iter() {
                match control {
                    Control::Arm => self.pipeline.arm_auto_rotation(),
                    Control::Disarm => self.pipeline.disarm_auto_rotation(),
                    Control::SetRotation(enabled) => self.pipeline.set_rotation_enabled(enabled),
                    Control::SetStabilization(enabled) => {
                        self.pipeline.set_stabilization_enabled(enabled)
                    }
                    Control::UpsertCalibration(point) => {
                        if let Err(err) = self.pipeline.upsert_calibration(point) {
                            log::error!("calibration upsert failed: {}", err);
                        }
                    }
                    Control::Shutdown => return,
                }
            }

            match data_rx.recv_timeout(CONTROL_POLL_INTERVAL) {
                Ok(bytes) => {
                    let report = match self.pipeline.ingest(&bytes) {
                        Ok(report) => report,
                        Err(err) => {
                            log::error!("stream session fatal: {}", err);
                            let reason = err.to_string();
                            shared.mark_unhealthy(reason.clone());
                            if let Some(cb) = self.on_unhealthy.as_mut() {
                                cb(&reason);
                            }
                            return;
                        }
                    };
                    if let Some(cb) = self.on_telemetry.as_mut() {
                        for telemetry in &report.telemetry {
                            cb(telemetry);
                        }
                    }
                    if let Some(cb) = self.on_frame.as_mut() {
                        for frame in &report.frames {
                            cb(frame);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    // Reader stopped; surface its reason if it recorded one.
                    if let Some(reason) = shared.failure_reason() {
                        if let Some(cb) = self.on_unhealthy.as_mut() {
                            cb(&reason);
                        }
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationStore, InMemoryCalibration};
    use crate::pipeline::PipelineConfig;
    use std::sync::atomic::AtomicUsize;

    fn pipeline() -> StabilizationPipeline {
        StabilizationPipeline::new(
            PipelineConfig::default(),
            CalibrationStore::load(Box::new(InMemoryCalibration::new())),
        )
    }

    #[test]
    fn session_streams_frames_from_stub_source() {
        let frames = Arc::new(AtomicUsize::new(0));
        let telemetry = Arc::new(AtomicUsize::new(0));

        let session = {
            let frames = Arc::clone(&frames);
            let telemetry = Arc::clone(&telemetry);
            SessionBuilder::new(pipeline())
                .on_rotated_frame(move |_| {
                    frames.fetch_add(1, Ordering::SeqCst);
                })
                .on_telemetry(move |_| {
                    telemetry.fetch_add(1, Ordering::SeqCst);
                })
                .start_stream("stub://camera")
                .unwrap()
        };
        session.arm_auto_rotation();

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while frames.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }

        session.stop().unwrap();
        assert!(frames.load(Ordering::SeqCst) >= 3);
        assert!(telemetry.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn connect_failure_surfaces_before_threads_spawn() {
        assert!(SessionBuilder::new(pipeline())
            .start_stream("rtsp://unsupported")
            .is_err());
    }

    #[test]
    fn stop_is_clean_while_stream_is_live() {
        let session = SessionBuilder::new(pipeline())
            .start_stream("stub://camera")
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(session.is_healthy());
        session.stop().unwrap();
    }
}
