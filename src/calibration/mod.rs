//! Sensor-to-angle calibration.
//!
//! A calibration point records the gyroscope readings observed with the
//! camera held at a known physical rotation. The table interpolates between
//! points to map a live sensor value back to a physical angle, which is far
//! more drift-tolerant than trusting any single raw reading.
//!
//! The point set is persisted as a whole through an injected
//! [`CalibrationPersistence`] capability; absent or corrupt persisted data
//! falls back to the built-in defaults and is never surfaced as an error.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::RotationAxis;

mod store;

pub use store::{CalibrationPersistence, InMemoryCalibration, SqliteCalibration};

/// A measured reference orientation for a known physical rotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub physical_angle_deg: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl CalibrationPoint {
    pub fn axis_value(&self, axis: RotationAxis) -> f64 {
        match axis {
            RotationAxis::Roll => self.roll,
            RotationAxis::Pitch => self.pitch,
            RotationAxis::Yaw => self.yaw,
        }
    }
}

/// Built-in fallback set, measured on the reference camera rig.
pub const DEFAULT_POINTS: [CalibrationPoint; 5] = [
    CalibrationPoint {
        physical_angle_deg: 0.0,
        roll: -136.0,
        pitch: 18.0,
        yaw: -130.0,
    },
    CalibrationPoint {
        physical_angle_deg: 90.0,
        roll: -101.0,
        pitch: 42.0,
        yaw: -36.0,
    },
    CalibrationPoint {
        physical_angle_deg: 180.0,
        roll: -90.0,
        pitch: 3.0,
        yaw: -38.0,
    },
    CalibrationPoint {
        physical_angle_deg: -90.0,
        roll: -96.0,
        pitch: -35.0,
        yaw: -30.0,
    },
    CalibrationPoint {
        physical_angle_deg: -180.0,
        roll: -92.0,
        pitch: 3.0,
        yaw: -36.0,
    },
];

/// Validated, non-empty point set ordered by physical angle.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(anyhow!("calibration table must contain at least one point"));
        }
        for point in &points {
            let values = [point.physical_angle_deg, point.roll, point.pitch, point.yaw];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(anyhow!(
                    "calibration point at {}° contains a non-finite value",
                    point.physical_angle_deg
                ));
            }
        }
        let mut table = Self { points };
        table.sort();
        Ok(table)
    }

    pub fn defaults() -> Self {
        let mut table = Self {
            points: DEFAULT_POINTS.to_vec(),
        };
        table.sort();
        table
    }

    fn sort(&mut self) {
        self.points
            .sort_by(|a, b| a.physical_angle_deg.total_cmp(&b.physical_angle_deg));
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Replaces the point with an exactly matching physical angle, or appends,
    /// keeping the set ordered.
    pub fn upsert(&mut self, point: CalibrationPoint) {
        match self
            .points
            .iter_mut()
            .find(|existing| existing.physical_angle_deg == point.physical_angle_deg)
        {
            Some(existing) => *existing = point,
            None => self.points.push(point),
        }
        self.sort();
    }

    /// The axis with the widest value spread across the table. The axis with
    /// the greatest spread carries the most discriminating signal for angle
    /// inference.
    pub fn best_axis(&self) -> RotationAxis {
        let spread = |axis: RotationAxis| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for point in &self.points {
                let value = point.axis_value(axis);
                min = min.min(value);
                max = max.max(value);
            }
            max - min
        };

        let roll = spread(RotationAxis::Roll);
        let pitch = spread(RotationAxis::Pitch);
        let yaw = spread(RotationAxis::Yaw);

        if yaw >= roll && yaw >= pitch {
            RotationAxis::Yaw
        } else if pitch >= roll {
            RotationAxis::Pitch
        } else {
            RotationAxis::Roll
        }
    }

    /// Maps a live sensor value on `axis` to a physical angle by linear
    /// interpolation between the two bracketing points. Outside the covered
    /// range the nearest point's angle (by absolute axis-value distance) is
    /// returned; a degenerate bracket returns the lower point's angle.
    pub fn interpolate(&self, axis_value: f64, axis: RotationAxis) -> f64 {
        let mut lower: Option<&CalibrationPoint> = None;
        let mut upper: Option<&CalibrationPoint> = None;
        let mut nearest = &self.points[0];
        let mut nearest_distance = f64::INFINITY;

        for point in &self.points {
            let value = point.axis_value(axis);
            let distance = (value - axis_value).abs();
            if distance < nearest_distance {
                nearest_distance = distance;
                nearest = point;
            }
            if value <= axis_value
                && lower.map_or(true, |best| value > best.axis_value(axis))
            {
                lower = Some(point);
            }
            if value >= axis_value
                && upper.map_or(true, |best| value < best.axis_value(axis))
            {
                upper = Some(point);
            }
        }

        let (Some(lower), Some(upper)) = (lower, upper) else {
            return nearest.physical_angle_deg;
        };

        let lower_value = lower.axis_value(axis);
        let upper_value = upper.axis_value(axis);
        if lower_value == upper_value {
            return lower.physical_angle_deg;
        }

        let proportion = (axis_value - lower_value) / (upper_value - lower_value);
        lower.physical_angle_deg
            + proportion * (upper.physical_angle_deg - lower.physical_angle_deg)
    }
}

/// The process-wide calibration state: a table plus the persistence
/// capability that loaded it. Every mutation rewrites the whole persisted set.
pub struct CalibrationStore {
    table: CalibrationTable,
    persistence: Box<dyn CalibrationPersistence>,
}

impl CalibrationStore {
    /// Loads the persisted point set, falling back to the built-in defaults
    /// when nothing usable is stored. Never fails the caller.
    pub fn load(persistence: Box<dyn CalibrationPersistence>) -> Self {
        let table = match persistence.load() {
            Ok(Some(points)) => match CalibrationTable::new(points) {
                Ok(table) => table,
                Err(err) => {
                    log::warn!("persisted calibration rejected, using defaults: {}", err);
                    CalibrationTable::defaults()
                }
            },
            Ok(None) => CalibrationTable::defaults(),
            Err(err) => {
                log::warn!("calibration load failed, using defaults: {}", err);
                CalibrationTable::defaults()
            }
        };
        Self { table, persistence }
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Replaces or appends a reference point, then persists the whole set.
    /// The mutate-then-persist cycle runs under the single owner of this
    /// store; concurrent writers must share the store, not the backend.
    pub fn upsert(&mut self, point: CalibrationPoint) -> Result<()> {
        let values = [point.physical_angle_deg, point.roll, point.pitch, point.yaw];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("calibration point contains a non-finite value"));
        }
        self.table.upsert(point);
        self.persistence.save(self.table.points())
    }
}
