//! # Command Multiplexer
//!
//! Single outbound path for commands to the robot. Commands are posted to one of three channels
//! (base, arm, grip), each holding at most one pending command. A newer command on a channel
//! replaces the pending one, so only the latest demand is ever sent.
//!
//! The sender task services the channels in round robin order at a fixed frequency, writing at
//! most one command per tick. Each tick belongs to one channel whether or not it has anything
//! pending.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tc::{Channel, Tc};
use log::{debug, trace, warn};
use std::{
    io::Write,
    sync::{Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use crate::task::TaskMonitor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const NUM_CHANNELS: usize = 3;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Latest-wins outbound command slots.
#[derive(Debug, Default)]
pub struct CommandMux {
    inner: Mutex<Slots>,
}

#[derive(Debug, Default)]
struct Slots {
    pending: [Option<Tc>; NUM_CHANNELS],

    /// Index into `Channel::ROUND_ROBIN` of the channel serviced on the next tick
    cursor: usize,

    /// A command has been taken but its write hasn't finished
    in_flight: bool,

    num_sent: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("Could not write {0:?} to the control stream: {1}")]
    WriteError(Channel, std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a command, replacing any command pending on the same channel.
    pub fn post(&self, tc: Tc) {
        let channel = tc.channel();
        let mut slots = self.lock();
        if let Some(old) = slots.pending[channel.index()].replace(tc) {
            trace!("{:?} replaced by {:?}", old, tc);
        }
    }

    /// Remove and return the command pending on a channel.
    pub fn take(&self, channel: Channel) -> Option<Tc> {
        self.lock().pending[channel.index()].take()
    }

    /// Drop all pending commands.
    pub fn clear(&self) {
        let mut slots = self.lock();
        slots.pending = Default::default();
        slots.cursor = 0;
        slots.in_flight = false;
    }

    /// `true` if no command is pending on any channel or being written.
    pub fn is_empty(&self) -> bool {
        let slots = self.lock();
        !slots.in_flight && slots.pending.iter().all(Option::is_none)
    }

    /// Number of commands written since creation.
    pub fn num_sent(&self) -> u64 {
        self.lock().num_sent
    }

    /// Perform one tick: service the channel at the round robin cursor and advance the cursor.
    ///
    /// An empty channel still uses up its tick. Returns the channel written, or `None` if the
    /// channel at the cursor had nothing pending.
    pub fn step<W: Write>(&self, writer: &mut W) -> Result<Option<Channel>, MuxError> {
        // Write outside the lock
        let (channel, tc) = {
            let mut slots = self.lock();
            let channel = Channel::ROUND_ROBIN[slots.cursor];
            slots.cursor = (slots.cursor + 1) % NUM_CHANNELS;

            match slots.pending[channel.index()].take() {
                Some(tc) => {
                    slots.in_flight = true;
                    (channel, tc)
                }
                None => return Ok(None),
            }
        };

        let frame = tc.encode();
        let result = writer
            .write_all(frame.as_bytes())
            .and_then(|_| writer.flush());

        let mut slots = self.lock();
        slots.in_flight = false;
        result.map_err(|e| MuxError::WriteError(channel, e))?;
        slots.num_sent += 1;
        trace!("Sent {}", frame);

        Ok(Some(channel))
    }

    /// Sender task body. Steps the multiplexer once per `period` until the monitor stops.
    pub fn run<W: Write>(
        &self,
        writer: &mut W,
        period: Duration,
        monitor: &TaskMonitor,
    ) -> Result<(), MuxError> {
        while monitor.is_alive() {
            let start = Instant::now();

            self.step(writer)?;

            if let Some(rem) = period.checked_sub(start.elapsed()) {
                thread::sleep(rem);
            }
        }

        debug!("Command sender stopped with {} commands sent", self.num_sent());
        Ok(())
    }

    /// Block until all pending commands have been written or `timeout` elapses.
    ///
    /// Returns `true` if the multiplexer drained.
    pub fn wait_drained(&self, timeout: Duration, poll: Duration) -> bool {
        let start = Instant::now();
        while !self.is_empty() {
            if start.elapsed() >= timeout {
                warn!("Command queue not drained after {:?}", timeout);
                return false;
            }
            thread::sleep(poll);
        }
        true
    }

    fn lock(&self) -> MutexGuard<Slots> {
        // Slots are never left half updated
        match self.inner.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
