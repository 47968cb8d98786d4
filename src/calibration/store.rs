//! Calibration persistence backends.
//!
//! Persistence is an injected capability, not ambient global state: the
//! pipeline owns a [`CalibrationPersistence`] handle and never reaches for a
//! process-wide store. The persisted record is a single keyed row holding the
//! serialized ordered point list plus a checksum; anything that fails to load
//! cleanly reads as "nothing stored" so the caller can fall back to defaults.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};

use super::CalibrationPoint;

/// Storage capability for the calibration point set.
pub trait CalibrationPersistence: Send {
    /// Returns the stored point set, or `None` when nothing usable is stored.
    fn load(&self) -> Result<Option<Vec<CalibrationPoint>>>;

    /// Rewrites the whole stored set.
    fn save(&self, points: &[CalibrationPoint]) -> Result<()>;
}

/// SQLite-backed persistence. The whole set lives in one keyed row; writers
/// serialize on the connection mutex.
pub struct SqliteCalibration {
    conn: Mutex<Connection>,
}

impl SqliteCalibration {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS calibration (
              id INTEGER PRIMARY KEY CHECK (id = 1),
              points_json TEXT NOT NULL,
              checksum BLOB NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("calibration connection poisoned"))
    }
}

impl CalibrationPersistence for SqliteCalibration {
    fn load(&self) -> Result<Option<Vec<CalibrationPoint>>> {
        let conn = self.lock()?;
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                "SELECT points_json, checksum FROM calibration WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, checksum)) = row else {
            return Ok(None);
        };

        let digest = Sha256::digest(json.as_bytes());
        if digest.as_slice() != checksum.as_slice() {
            log::warn!(
                "stored calibration checksum mismatch (stored {}, computed {})",
                hex::encode(&checksum),
                hex::encode(digest)
            );
            return Ok(None);
        }

        match serde_json::from_str::<Vec<CalibrationPoint>>(&json) {
            Ok(points) => Ok(Some(points)),
            Err(err) => {
                log::warn!("stored calibration is not decodable: {}", err);
                Ok(None)
            }
        }
    }

    fn save(&self, points: &[CalibrationPoint]) -> Result<()> {
        let json = serde_json::to_string(points)?;
        let checksum = Sha256::digest(json.as_bytes()).to_vec();
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO calibration (id, points_json, checksum) VALUES (1, ?1, ?2)",
            params![json, checksum],
        )?;
        Ok(())
    }
}

/// In-memory persistence for tests and the synthetic demo. Clones share the
/// same slot.
#[derive(Clone, Default)]
pub struct InMemoryCalibration {
    slot: Arc<Mutex<Option<String>>>,
}

impl InMemoryCalibration {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CalibrationPersistence for InMemoryCalibration {
    fn load(&self) -> Result<Option<Vec<CalibrationPoint>>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("calibration slot poisoned"))?;
        match slot.as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, points: &[CalibrationPoint]) -> Result<()> {
        let json = serde_json::to_string(points)?;
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("calibration slot poisoned"))?;
        *slot = Some(json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<CalibrationPoint> {
        vec![
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
        ]
    }

    #[test]
    fn sqlite_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("calibration.db");
        let store = SqliteCalibration::open(db_path.to_str().unwrap()).unwrap();

        let points = sample_points();
        store.save(&points).unwrap();

        // Reopen to prove the set survives the connection.
        drop(store);
        let store = SqliteCalibration::open(db_path.to_str().unwrap()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, points);
    }

    #[test]
    fn sqlite_save_rewrites_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("calibration.db");
        let store = SqliteCalibration::open(db_path.to_str().unwrap()).unwrap();

        store.save(&sample_points()).unwrap();
        let shorter = vec![sample_points()[0]];
        store.save(&shorter).unwrap();

        assert_eq!(store.load().unwrap().unwrap(), shorter);
    }

    #[test]
    fn sqlite_corrupt_payload_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("calibration.db");
        let store = SqliteCalibration::open(db_path.to_str().unwrap()).unwrap();
        store.save(&sample_points()).unwrap();

        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute(
                "UPDATE calibration SET points_json = '[{\"garbage\"' WHERE id = 1",
                [],
            )
            .unwrap();
        }

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn in_memory_starts_empty() {
        assert!(InMemoryCalibration::new().load().unwrap().is_none());
    }
}
