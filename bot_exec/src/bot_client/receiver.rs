//! # Receiver and decode worker
//!
//! The receiver task reads the control stream and reassembles frames, handing them to a single
//! decode worker over a bounded channel. The worker decodes each frame in arrival order, applies
//! it to the telemetry store and integrates odometry when a wheel sample arrives.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{net::FrameReader, tm::TmFrame};
use log::{debug, trace, warn};
use std::{
    io::{ErrorKind, Read},
    net::TcpStream,
    sync::mpsc::{Receiver, RecvTimeoutError, SyncSender},
    time::Duration,
};

use crate::{data_store::TelemetryStore, loc::OdometryIntegrator, task::TaskMonitor};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const READ_BUF_LEN: usize = 4096;

/// How long the worker waits for a frame before checking the monitor again.
const WORKER_POLL: Duration = Duration::from_millis(100);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Counters kept by the decode worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    pub num_applied: u64,
    pub num_unknown: u64,
    pub num_invalid: u64,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Receiver task body.
///
/// Runs until the monitor stops, the worker goes away, or the stream fails. A read timeout counts
/// as a failure. `on_link_lost` is called if the stream failed while the monitor was alive.
pub fn run_receiver<F>(
    mut stream: TcpStream,
    frames_tx: SyncSender<String>,
    monitor: &TaskMonitor,
    on_link_lost: F,
) where
    F: FnOnce(),
{
    let mut reader = FrameReader::new();
    let mut buf = [0u8; READ_BUF_LEN];

    let lost = loop {
        if !monitor.is_alive() {
            break false;
        }

        match stream.read(&mut buf) {
            Ok(0) => {
                break monitor.is_alive();
            }
            Ok(n) => {
                for frame in reader.push(&buf[..n]) {
                    if frames_tx.send(frame).is_err() {
                        debug!("Decode worker has stopped, receiver exiting");
                        return;
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if monitor.is_alive() {
                    match e.kind() {
                        ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                            warn!("No data received from the robot within the read timeout")
                        }
                        _ => warn!("Control stream read failed: {}", e),
                    }
                }
                break monitor.is_alive();
            }
        }
    };

    if reader.num_overflows() > 0 || reader.num_invalid() > 0 {
        debug!(
            "Receiver dropped {} oversized and {} invalid frames",
            reader.num_overflows(),
            reader.num_invalid()
        );
    }

    if lost {
        warn!("Link to the robot lost");
        on_link_lost();
    }
}

/// Decode worker body. Runs until the monitor stops or the receiver goes away.
pub fn run_decoder(
    frames_rx: Receiver<String>,
    store: &TelemetryStore,
    integrator: &OdometryIntegrator,
    monitor: &TaskMonitor,
) -> DecodeStats {
    let mut stats = DecodeStats::default();

    while monitor.is_alive() {
        let frame = match frames_rx.recv_timeout(WORKER_POLL) {
            Ok(f) => f,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        process_frame(&frame, store, integrator, &mut stats);
    }

    debug!("Decode worker stopped: {:?}", stats);
    stats
}

/// Decode one frame and apply it to the store. Malformed frames are discarded.
pub fn process_frame(
    frame: &str,
    store: &TelemetryStore,
    integrator: &OdometryIntegrator,
    stats: &mut DecodeStats,
) {
    match TmFrame::decode(frame) {
        Ok(Some(tm)) => {
            if store.apply(tm) {
                integrator.integrate_latest(store);
            }
            stats.num_applied += 1;
        }
        Ok(None) => {
            trace!("Ignoring unknown frame {:?}", frame);
            stats.num_unknown += 1;
        }
        Err(e) => {
            debug!("Discarding frame: {}", e);
            stats.num_invalid += 1;
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
