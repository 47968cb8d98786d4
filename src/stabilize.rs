//! Multi-frame stabilization window.
//!
//! Rotated frames queue in a capacity-bounded window. When the window fills
//! and no pass is running, the whole batch is drained atomically and handed
//! to the stabilizer while the window keeps accepting new frames. If the
//! window fills again before the pass completes, the oldest queued frame is
//! dropped in favor of the newest: the contract is "never stall the
//! producer", not "stabilize every frame". Dropping under pressure is the
//! documented backpressure policy.
//!
//! The stabilization step itself is only a contract here; no production
//! algorithm survived from the experiments that shaped it. The passthrough
//! implementation keeps the pipeline honest until a real one lands.

use std::sync::{Mutex, MutexGuard};

use crate::RotatedFrame;

pub const DEFAULT_WINDOW_CAPACITY: usize = 3;

/// A stabilization pass over one drained batch. Implementations must keep
/// the input ordering and must not grow the batch.
pub trait Stabilizer: Send {
    fn stabilize(&mut self, frames: Vec<RotatedFrame>) -> Vec<RotatedFrame>;
}

/// Reference implementation: returns the batch untouched.
pub struct PassthroughStabilizer;

impl Stabilizer for PassthroughStabilizer {
    fn stabilize(&mut self, frames: Vec<RotatedFrame>) -> Vec<RotatedFrame> {
        frames
    }
}

#[derive(Debug, Default)]
struct WindowState {
    frames: Vec<RotatedFrame>,
    in_flight: bool,
    dropped: u64,
}

/// Bounded window of rotated frames awaiting a stabilization pass.
///
/// Invariants: the window never holds more than `capacity` frames, and at
/// most one pass is in flight at a time.
pub struct StabilizationWindow {
    state: Mutex<WindowState>,
    capacity: usize,
}

impl StabilizationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(WindowState::default()),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, WindowState> {
        // A poisoned window is still structurally valid.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends a frame. Returns the drained batch when the window filled and
    /// no pass was running; the caller runs the pass and then calls
    /// [`finish_pass`](Self::finish_pass). Returns `None` otherwise.
    pub fn push(&self, frame: RotatedFrame) -> Option<Vec<RotatedFrame>> {
        let mut state = self.state();
        if state.frames.len() == self.capacity {
            // Refilled while a pass is in flight: keep the newest.
            state.frames.remove(0);
            state.dropped += 1;
        }
        state.frames.push(frame);

        if state.frames.len() == self.capacity && !state.in_flight {
            state.in_flight = true;
            return Some(std::mem::take(&mut state.frames));
        }
        None
    }

    /// Marks the current pass complete, allowing the next drain.
    pub fn finish_pass(&self) {
        self.state().in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.state().in_flight
    }

    pub fn len(&self) -> usize {
        self.state().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames discarded because the window refilled during a pass.
    pub fn dropped_frames(&self) -> u64 {
        self.state().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::RotationDecision;
    use crate::OrientationSample;
    use std::sync::Arc;

    fn frame(sequence: u64) -> RotatedFrame {
        let sample = OrientationSample {
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        };
        RotatedFrame {
            sequence,
            image: image::RgbaImage::new(2, 2),
            decision: RotationDecision {
                raw_sample: sample,
                corrective_angle_deg: 0.0,
                normalized_angle_deg: 0.0,
            },
        }
    }

    #[test]
    fn drains_exactly_at_capacity() {
        let window = StabilizationWindow::new(3);
        assert!(window.push(frame(0)).is_none());
        assert!(window.push(frame(1)).is_none());

        let batch = window.push(frame(2)).expect("window full");
        let sequences: Vec<u64> = batch.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(window.in_flight());
        assert!(window.is_empty());
    }

    #[test]
    fn no_second_drain_while_pass_in_flight() {
        let window = StabilizationWindow::new(2);
        window.push(frame(0));
        assert!(window.push(frame(1)).is_some());

        // Pass still running: the window refills but never drains again.
        assert!(window.push(frame(2)).is_none());
        assert!(window.push(frame(3)).is_none());
        assert_eq!(window.len(), 2);

        // Oldest queued frame was dropped in favor of the newest.
        assert!(window.push(frame(4)).is_none());
        assert_eq!(window.dropped_frames(), 1);

        window.finish_pass();
        let batch = window.push(frame(5)).expect("drain after pass completes");
        let sequences: Vec<u64> = batch.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![4, 5]);
    }

    #[test]
    fn capacity_never_exceeded_under_concurrent_pushes() {
        let window = Arc::new(StabilizationWindow::new(3));
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let window = Arc::clone(&window);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    if let Some(batch) = window.push(frame(t * 100 + i)) {
                        assert!(batch.len() <= window.capacity());
                        window.finish_pass();
                    }
                    assert!(window.len() <= window.capacity());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(window.len() <= window.capacity());
    }

    #[test]
    fn minimum_capacity_is_one() {
        let window = StabilizationWindow::new(0);
        assert_eq!(window.capacity(), 1);
        assert!(window.push(frame(0)).is_some());
    }
}
