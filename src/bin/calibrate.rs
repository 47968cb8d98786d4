//! calibrate - manage the persisted sensor-to-angle calibration table
//!
//! Capture a point per known physical rotation (0, 90, 180, -90, -180), then
//! check the mapping with `map` before trusting calibrated rotation mode.

use anyhow::Result;
use clap::{Parser, Subcommand};

use gyrostream::calibration::{CalibrationPoint, CalibrationStore, SqliteCalibration};
use gyrostream::RotationAxis;

#[derive(Parser, Debug)]
#[command(name = "calibrate", about = "Manage the gyro calibration table")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored calibration points
    List {
        #[arg(long, default_value = "calibration.db")]
        db: String,
    },

    /// Insert or replace the point for a physical angle
    Set {
        /// Physical rotation the readings were captured at, in degrees
        #[arg(long)]
        angle: f64,
        #[arg(long)]
        roll: f64,
        #[arg(long)]
        pitch: f64,
        #[arg(long)]
        yaw: f64,
        #[arg(long, default_value = "calibration.db")]
        db: String,
    },

    /// Show which axis carries the most discriminating signal
    BestAxis {
        #[arg(long, default_value = "calibration.db")]
        db: String,
    },

    /// Map a live sensor value to a physical angle
    Map {
        /// Sensor axis the value was read from (roll, pitch or yaw)
        #[arg(long)]
        axis: String,
        #[arg(long)]
        value: f64,
        #[arg(long, default_value = "calibration.db")]
        db: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Command::List { db } => cmd_list(&db),
        Command::Set {
            angle,
            roll,
            pitch,
            yaw,
            db,
        } => cmd_set(&db, angle, roll, pitch, yaw),
        Command::BestAxis { db } => cmd_best_axis(&db),
        Command::Map { axis, value, db } => cmd_map(&db, &axis, value),
    }
}

fn open_store(db_path: &str) -> Result<CalibrationStore> {
    let persistence = SqliteCalibration::open(db_path)?;
    Ok(CalibrationStore::load(Box::new(persistence)))
}

fn cmd_list(db_path: &str) -> Result<()> {
    let store = open_store(db_path)?;
    println!("=== Calibration Points ===");
    println!("{:>10}  {:>10}  {:>10}  {:>10}", "angle", "roll", "pitch", "yaw");
    for point in store.table().points() {
        println!(
            "{:>10.2}  {:>10.2}  {:>10.2}  {:>10.2}",
            point.physical_angle_deg, point.roll, point.pitch, point.yaw
        );
    }
    println!("Best axis: {:?}", store.table().best_axis());
    Ok(())
}

fn cmd_set(db_path: &str, angle: f64, roll: f64, pitch: f64, yaw: f64) -> Result<()> {
    let mut store = open_store(db_path)?;
    store.upsert(CalibrationPoint {
        physical_angle_deg: angle,
        roll,
        pitch,
        yaw,
    })?;
    println!(
        "Stored point for {:.2} deg ({} points total)",
        angle,
        store.table().points().len()
    );
    Ok(())
}

fn cmd_best_axis(db_path: &str) -> Result<()> {
    let store = open_store(db_path)?;
    println!("{:?}", store.table().best_axis());
    Ok(())
}

fn cmd_map(db_path: &str, axis: &str, value: f64) -> Result<()> {
    let axis: RotationAxis = axis.parse()?;
    let store = open_store(db_path)?;
    let angle = store.table().interpolate(value, axis);
    println!("{:?} {:.2} -> {:.2} deg physical", axis, value, angle);
    Ok(())
}
