//! # Telemetry Log
//!
//! Records lidar scans with the wheel encoder sample taken when each scan arrived, and replays
//! recordings back into a `TelemetryStore` as if they were live telemetry.
//!
//! One record per line:
//!
//! ```text
//! <w1>, <w2>, <w3>, <w4>; <r1>, <r2>, ..., <rn>
//! ```
//!
//! Wheel samples are recorded rather than poses so that replay re-drives the odometry
//! integrator.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tm::NUM_WHEELS;
use log::{debug, info, warn};
use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use crate::{
    data_store::TelemetryStore,
    loc::{OdometryIntegrator, WheelEncoders},
    task::TaskMonitor,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Name of the recording written into the session's telemetry directory.
pub const TM_LOG_FILE_NAME: &str = "tm_log.txt";

const RECORD_SEP: char = ';';
const VALUE_SEP: &str = ", ";

/// Poll period while waiting for the first lidar scan.
const FIRST_SCAN_POLL: Duration = Duration::from_millis(200);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One line of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct TmRecord {
    pub wheels: WheelEncoders,
    pub scan: Vec<f64>,
}

/// Appends records to a recording file.
#[derive(Debug)]
pub struct TmLogger {
    path: PathBuf,
    writer: BufWriter<File>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmLogError {
    #[error("Could not open telemetry log {0:?}: {1}")]
    OpenError(PathBuf, std::io::Error),

    #[error("Could not write to the telemetry log: {0}")]
    WriteError(std::io::Error),

    #[error("Could not read the telemetry log: {0}")]
    ReadError(std::io::Error),

    #[error("Malformed telemetry record: {0}")]
    MalformedRecord(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{}{} {}\n",
            join(&self.wheels),
            RECORD_SEP,
            join(&self.scan)
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, TmLogError> {
        let malformed = || TmLogError::MalformedRecord(line.to_string());

        let mut parts = line.trim_end().splitn(2, RECORD_SEP);
        let (wheels_str, scan_str) = match (parts.next(), parts.next()) {
            (Some(w), Some(s)) if !s.trim().is_empty() => (w, s),
            _ => return Err(malformed()),
        };

        let wheels_vec = parse_values(wheels_str).ok_or_else(malformed)?;
        if wheels_vec.len() != NUM_WHEELS {
            return Err(malformed());
        }
        let mut wheels = [0.0; NUM_WHEELS];
        wheels.copy_from_slice(&wheels_vec);

        let scan = parse_values(scan_str).ok_or_else(malformed)?;

        Ok(Self { wheels, scan })
    }
}

impl TmLogger {
    /// Open a recording for appending, creating it if needed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, TmLogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TmLogError::OpenError(path.clone(), e))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn write_record(&mut self, record: &TmRecord) -> Result<(), TmLogError> {
        self.writer
            .write_all(record.to_line().as_bytes())
            .map_err(TmLogError::WriteError)
    }

    pub fn flush(&mut self) -> Result<(), TmLogError> {
        self.writer.flush().map_err(TmLogError::WriteError)
    }

    /// Logger task body.
    ///
    /// Waits for the first lidar scan with a wheel sample, then records the latest one every
    /// `period` until the monitor stops.
    pub fn run(
        mut self,
        store: &TelemetryStore,
        monitor: &TaskMonitor,
        period: Duration,
    ) -> Result<(), TmLogError> {
        let mut num_records = 0u64;
        let mut started = false;

        while monitor.is_alive() {
            let record = store.lidar_scan().and_then(|s| {
                s.wheels.map(|wheels| TmRecord {
                    wheels,
                    scan: s.scan,
                })
            });

            match record {
                Some(r) => {
                    if !started {
                        info!("Writing telemetry log to {:?}", self.path);
                        started = true;
                    }
                    self.write_record(&r)?;
                    num_records += 1;
                    thread::sleep(period);
                }
                None => thread::sleep(FIRST_SCAN_POLL.min(period)),
            }
        }

        self.flush()?;
        debug!("Telemetry logger stopped after {} records", num_records);

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse records from a reader, stopping at the first malformed line.
pub fn parse_log<R: BufRead>(reader: R) -> Result<Vec<TmRecord>, TmLogError> {
    let mut records = Vec::new();

    for line in reader.lines() {
        let line = line.map_err(TmLogError::ReadError)?;
        match TmRecord::parse_line(&line) {
            Ok(r) => records.push(r),
            Err(e) => {
                warn!("Telemetry log truncated after {} records: {}", records.len(), e);
                break;
            }
        }
    }

    Ok(records)
}

/// Read all valid records from a recording file.
pub fn read_log<P: AsRef<Path>>(path: P) -> Result<Vec<TmRecord>, TmLogError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| TmLogError::OpenError(path.to_path_buf(), e))?;
    parse_log(BufReader::new(file))
}

/// Replay task body. Feeds each record into the store and integrates it, one record every
/// `period`, until the records run out or the monitor stops.
///
/// Returns the number of records replayed.
pub fn replay(
    records: &[TmRecord],
    store: &TelemetryStore,
    integrator: &OdometryIntegrator,
    monitor: &TaskMonitor,
    period: Duration,
) -> usize {
    let mut num_replayed = 0;

    for record in records {
        if !monitor.is_alive() {
            break;
        }

        store.set_recorded(record.wheels, record.scan.clone());
        integrator.integrate_latest(store);
        num_replayed += 1;

        thread::sleep(period);
    }

    info!("Replayed {} of {} records", num_replayed, records.len());
    num_replayed
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(VALUE_SEP)
}

fn parse_values(s: &str) -> Option<Vec<f64>> {
    s.split(',').map(|v| v.trim().parse().ok()).collect()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::{io::Cursor, sync::Arc};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}_{}.txt", name, std::process::id()))
    }

    #[test]
    fn test_line_format() {
        let r = TmRecord {
            wheels: [0.0, 1.5, -2.0, 3.25],
            scan: vec![0.5, 5.0],
        };
        assert_eq!(r.to_line(), "0, 1.5, -2, 3.25; 0.5, 5\n");
        assert_eq!(TmRecord::parse_line(&r.to_line()).unwrap(), r);
    }

    #[test]
    fn test_parse_stops_at_malformed() {
        let data = "1, 2, 3, 4; 1, 2\n\
                    1, 2, 3, 4; 3, 4\n\
                    1, 2, 3; 5, 6\n\
                    1, 2, 3, 4; 7, 8\n";

        let records = parse_log(Cursor::new(data)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].scan, vec![3.0, 4.0]);

        assert!(TmRecord::parse_line("1, 2, 3, 4;").is_err());
        assert!(TmRecord::parse_line("1, 2, 3, 4; a").is_err());
        assert!(TmRecord::parse_line("").is_err());
    }

    #[test]
    fn test_record_and_replay() {
        let path = temp_path("youbot_tm_log_test");
        std::fs::remove_file(&path).ok();

        let mut scan: Vec<f64> = (0..200).map(|i| i as f64 * 0.01).collect();
        scan[3] = 5.0;

        // Forward motion of 0.1 rad on every wheel between records
        let records: Vec<TmRecord> = (0..3)
            .map(|i| TmRecord {
                wheels: [0.1 * i as f64; 4],
                scan: scan.clone(),
            })
            .collect();

        {
            let mut logger = TmLogger::create(&path).unwrap();
            for r in &records {
                logger.write_record(r).unwrap();
            }
            logger.flush().unwrap();
        }

        let read = read_log(&path).unwrap();
        assert_eq!(read, records);

        // Replaying gives the same pose as integrating live
        let monitor = Arc::new(TaskMonitor::new());
        monitor.start();
        let store = TelemetryStore::new();
        let integrator = OdometryIntegrator::new();

        let n = replay(&read, &store, &integrator, &monitor, Duration::from_millis(0));
        assert_eq!(n, 3);

        let live_store = TelemetryStore::new();
        let live_integrator = OdometryIntegrator::new();
        for r in &records {
            live_store.set_wheels(r.wheels);
            live_integrator.integrate_latest(&live_store);
        }

        assert_eq!(store.pose(), live_store.pose());
        assert!(store.pose().x_m > 0.0);

        let snapshot = store.lidar_scan().unwrap();
        assert_eq!(snapshot.scan, scan);
        assert_eq!(snapshot.wheels, Some([0.2; 4]));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_replay_stops_with_monitor() {
        let monitor = TaskMonitor::new();
        let store = TelemetryStore::new();
        let records = vec![TmRecord {
            wheels: [0.0; 4],
            scan: vec![1.0],
        }];

        let n = replay(
            &records,
            &store,
            &OdometryIntegrator::new(),
            &monitor,
            Duration::from_millis(0),
        );
        assert_eq!(n, 0);
        assert!(store.lidar_scan().is_none());
    }
}
