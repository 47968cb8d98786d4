//! Corrective-rotation resolution.
//!
//! Exactly one code path owns normalization semantics. The two supported
//! strategies are a tagged variant selected by configuration:
//!
//! - [`RotationMode::Delta`]: corrective angle is the raw difference between
//!   the live axis value and the neutral reference's axis value. A pure
//!   "return to first-seen orientation" behavior, no calibration required.
//! - [`RotationMode::Calibrated`]: both the live and the neutral axis values
//!   are mapped through the calibration table to physical angles first, and
//!   the corrective angle is their difference. Anchoring to known reference
//!   orientations tolerates sensor drift much better than a single noisy
//!   neutral sample.
//!
//! The neutral reference moves through an explicit state machine:
//! `Unarmed -> AwaitingSample -> Referenced`. Arming is requested by the
//! caller; the first sample resolved while awaiting becomes the reference.
//! Re-arming while armed keeps the existing reference.

use serde::Deserialize;

use crate::calibration::CalibrationTable;
use crate::{OrientationSample, RotationAxis};

pub const DEFAULT_DEAD_ZONE_DEG: f64 = 2.0;
pub const DEFAULT_SNAP_TOLERANCE_DEG: f64 = 5.0;

/// Cardinal snap targets. 0° is deliberately absent: the zero neighborhood
/// belongs to the dead-zone alone.
const SNAP_ANGLES: [f64; 4] = [90.0, 180.0, -90.0, -180.0];

/// Strategy for turning an orientation sample into a corrective angle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    Delta,
    Calibrated,
}

#[derive(Clone, Copy, Debug)]
pub struct ResolverConfig {
    pub mode: RotationMode,
    /// Pinned sensor axis; `None` selects the axis with the widest
    /// calibration spread.
    pub axis: Option<RotationAxis>,
    pub dead_zone_deg: f64,
    pub snap_tolerance_deg: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: RotationMode::Calibrated,
            axis: None,
            dead_zone_deg: DEFAULT_DEAD_ZONE_DEG,
            snap_tolerance_deg: DEFAULT_SNAP_TOLERANCE_DEG,
        }
    }
}

/// Resolved rotation for one frame. Derived per record, never stored.
#[derive(Clone, Copy, Debug)]
pub struct RotationDecision {
    pub raw_sample: OrientationSample,
    pub corrective_angle_deg: f64,
    pub normalized_angle_deg: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum NeutralState {
    Unarmed,
    AwaitingSample,
    Referenced(OrientationSample),
}

/// Maps live samples to corrective rotation decisions.
pub struct RotationResolver {
    cfg: ResolverConfig,
    state: NeutralState,
    first_reading: Option<OrientationSample>,
}

impl RotationResolver {
    pub fn new(cfg: ResolverConfig) -> Self {
        Self {
            cfg,
            state: NeutralState::Unarmed,
            first_reading: None,
        }
    }

    /// Arms auto-rotation: the next resolved sample becomes the neutral
    /// reference. Re-arming while already armed keeps the existing reference;
    /// call [`disarm`](Self::disarm) first to re-capture.
    pub fn arm(&mut self) {
        if self.state == NeutralState::Unarmed {
            self.state = NeutralState::AwaitingSample;
        }
    }

    /// Clears the neutral reference and returns to the unarmed state.
    pub fn disarm(&mut self) {
        self.state = NeutralState::Unarmed;
        self.first_reading = None;
    }

    pub fn is_armed(&self) -> bool {
        self.state != NeutralState::Unarmed
    }

    /// The neutral reference, once captured.
    pub fn neutral(&self) -> Option<OrientationSample> {
        match self.state {
            NeutralState::Referenced(sample) => Some(sample),
            _ => None,
        }
    }

    /// The first sample seen after arming.
    pub fn first_reading(&self) -> Option<OrientationSample> {
        self.first_reading
    }

    /// Resolves one sample against the active calibration. While no neutral
    /// reference is set the corrective angle is exactly zero.
    pub fn resolve(
        &mut self,
        sample: OrientationSample,
        table: &CalibrationTable,
    ) -> RotationDecision {
        if self.state == NeutralState::AwaitingSample {
            self.state = NeutralState::Referenced(sample);
            self.first_reading = Some(sample);
        }

        let NeutralState::Referenced(neutral) = self.state else {
            return RotationDecision {
                raw_sample: sample,
                corrective_angle_deg: 0.0,
                normalized_angle_deg: 0.0,
            };
        };

        let axis = self.cfg.axis.unwrap_or_else(|| table.best_axis());
        let corrective = match self.cfg.mode {
            RotationMode::Delta => axis.value_of(&sample) - axis.value_of(&neutral),
            RotationMode::Calibrated => {
                table.interpolate(axis.value_of(&sample), axis)
                    - table.interpolate(axis.value_of(&neutral), axis)
            }
        };

        RotationDecision {
            raw_sample: sample,
            corrective_angle_deg: corrective,
            normalized_angle_deg: normalize_angle(
                corrective,
                self.cfg.dead_zone_deg,
                self.cfg.snap_tolerance_deg,
            ),
        }
    }
}

/// Wraps an angle into (−180°, 180°], collapses the dead-zone to exactly 0°
/// and snaps angles near a cardinal to that cardinal, so right-angle
/// rotations render stably instead of drifting.
pub fn normalize_angle(angle_deg: f64, dead_zone_deg: f64, snap_tolerance_deg: f64) -> f64 {
    let mut wrapped = angle_deg % 360.0;
    if wrapped > 180.0 {
        wrapped -= 360.0;
    } else if wrapped <= -180.0 {
        wrapped += 360.0;
    }

    if wrapped.abs() < dead_zone_deg {
        return 0.0;
    }

    for snap in SNAP_ANGLES {
        if (wrapped - snap).abs() < snap_tolerance_deg {
            return snap;
        }
    }

    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationPoint, CalibrationTable};

    fn normalize(angle: f64) -> f64 {
        normalize_angle(angle, DEFAULT_DEAD_ZONE_DEG, DEFAULT_SNAP_TOLERANCE_DEG)
    }

    fn sample(roll: f64, pitch: f64, yaw: f64) -> OrientationSample {
        OrientationSample { roll, pitch, yaw }
    }

    fn roll_table() -> CalibrationTable {
        CalibrationTable::new(vec![
            CalibrationPoint {
                physical_angle_deg: 0.0,
                roll: -145.0,
                pitch: 15.0,
                yaw: 169.0,
            },
            CalibrationPoint {
                physical_angle_deg: 90.0,
                roll: -99.0,
                pitch: 43.0,
                yaw: -48.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn dead_zone_boundary() {
        assert_eq!(normalize(1.9), 0.0);
        assert_ne!(normalize(2.1), 0.0);
        assert_eq!(normalize(-1.9), 0.0);
    }

    #[test]
    fn snap_boundary() {
        assert_eq!(normalize(86.0), 90.0);
        assert_ne!(normalize(84.0), 90.0);
        assert_eq!(normalize(-86.0), -90.0);
        assert_eq!(normalize(177.0), 180.0);
    }

    #[test]
    fn wraps_into_half_open_range() {
        assert_eq!(normalize(270.0), -90.0);
        assert_eq!(normalize(-270.0), 90.0);
        assert_eq!(normalize(359.0), 0.0);
        assert_eq!(normalize(540.0), 180.0);
    }

    #[test]
    fn unarmed_resolver_returns_zero() {
        let mut resolver = RotationResolver::new(ResolverConfig {
            mode: RotationMode::Delta,
            axis: Some(RotationAxis::Yaw),
            ..ResolverConfig::default()
        });
        let decision = resolver.resolve(sample(-95.0, -48.0, 75.0), &roll_table());
        assert_eq!(decision.corrective_angle_deg, 0.0);
        assert!(resolver.neutral().is_none());
    }

    #[test]
    fn first_sample_after_arming_becomes_neutral() {
        let mut resolver = RotationResolver::new(ResolverConfig {
            mode: RotationMode::Delta,
            axis: Some(RotationAxis::Yaw),
            ..ResolverConfig::default()
        });
        resolver.arm();

        let table = roll_table();
        let first = resolver.resolve(sample(-95.0, -48.0, 75.0), &table);
        assert_eq!(first.corrective_angle_deg, 0.0);
        assert_eq!(resolver.neutral(), Some(sample(-95.0, -48.0, 75.0)));

        // Same reading again resolves to exactly zero.
        let again = resolver.resolve(sample(-95.0, -48.0, 75.0), &table);
        assert_eq!(again.corrective_angle_deg, 0.0);
        assert_eq!(again.normalized_angle_deg, 0.0);
    }

    #[test]
    fn delta_mode_tracks_axis_difference() {
        let mut resolver = RotationResolver::new(ResolverConfig {
            mode: RotationMode::Delta,
            axis: Some(RotationAxis::Yaw),
            ..ResolverConfig::default()
        });
        resolver.arm();

        let table = roll_table();
        resolver.resolve(sample(0.0, 0.0, 10.0), &table);
        let decision = resolver.resolve(sample(0.0, 0.0, 98.0), &table);
        assert_eq!(decision.corrective_angle_deg, 88.0);
        assert_eq!(decision.normalized_angle_deg, 90.0);
    }

    #[test]
    fn calibrated_mode_maps_through_physical_angles() {
        let mut resolver = RotationResolver::new(ResolverConfig {
            mode: RotationMode::Calibrated,
            axis: Some(RotationAxis::Roll),
            ..ResolverConfig::default()
        });
        resolver.arm();

        let table = roll_table();
        // Neutral maps to 0° physical.
        resolver.resolve(sample(-145.0, 0.0, 0.0), &table);
        // -122 is halfway between the two roll anchors: 45° physical.
        let decision = resolver.resolve(sample(-122.0, 0.0, 0.0), &table);
        assert_eq!(decision.corrective_angle_deg, 45.0);
        assert_eq!(decision.normalized_angle_deg, 45.0);
    }

    #[test]
    fn rearm_keeps_existing_reference() {
        let mut resolver = RotationResolver::new(ResolverConfig {
            mode: RotationMode::Delta,
            axis: Some(RotationAxis::Pitch),
            ..ResolverConfig::default()
        });
        let table = roll_table();

        resolver.arm();
        resolver.resolve(sample(0.0, 30.0, 0.0), &table);
        resolver.arm();
        assert_eq!(resolver.neutral(), Some(sample(0.0, 30.0, 0.0)));

        resolver.disarm();
        assert!(resolver.neutral().is_none());
        assert!(resolver.first_reading().is_none());

        resolver.arm();
        resolver.resolve(sample(0.0, 45.0, 0.0), &table);
        assert_eq!(resolver.neutral(), Some(sample(0.0, 45.0, 0.0)));
    }
}
