//! Connection supervisor
//!
//! The kernel driver never stops probing the keyboard's two broken
//! vendor interfaces, and every failed probe tears down the whole USB
//! device a few seconds after it appears. The supervisor treats that as
//! normal weather: an unbounded Searching → Connected → Lost cycle that
//! re-attaches each time the device comes back, so the user just sees a
//! keyboard that works.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::report::{self, BootReport, KeyTransition};

/// Outcome of a single read attempt on the report stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A well-formed 8-byte boot report
    Report(BootReport),
    /// Nothing arrived within the timeout
    Idle,
    /// A report that does not match the boot shape; dropped
    Malformed,
}

/// Source of boot reports from one opened device
pub trait ReportSource {
    /// Read with a bounded wait. `timeout_ms == 0` polls without
    /// blocking; errors mean the device is gone.
    fn read(&mut self, timeout_ms: i32) -> Result<ReadOutcome, BridgeError>;
}

/// Finds the usable boot-keyboard interface, if present
pub trait DeviceLocator {
    /// `Ok(None)` means "not there right now, ask again later".
    /// Errors are reserved for conditions retrying cannot fix.
    fn find(&mut self) -> Result<Option<Box<dyn ReportSource>>, BridgeError>;
}

/// Consumer of key transitions (the virtual keyboard in production)
pub trait KeySink {
    fn emit(&mut self, transitions: &[KeyTransition]) -> Result<(), BridgeError>;
}

/// Connection state, owned by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Searching,
    Connected,
    Lost,
}

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How often to re-run discovery while Searching
    pub poll_interval: Duration,
    /// Bounded wait per read while Connected; also bounds how long
    /// shutdown and device removal can go unnoticed
    pub read_timeout_ms: i32,
    /// Consecutive malformed reports before the handle is treated as
    /// lost
    pub max_malformed_run: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            read_timeout_ms: 250,
            max_malformed_run: 64,
        }
    }
}

/// How often the idle wait re-checks the shutdown flag
const IDLE_SLICE: Duration = Duration::from_millis(50);

/// The bridge context: locator, sink, and all mutable session state
pub struct Bridge<L, S> {
    locator: L,
    sink: S,
    config: BridgeConfig,
    state: ConnectionState,
    running: Arc<AtomicBool>,
}

impl<L: DeviceLocator, S: KeySink> Bridge<L, S> {
    pub fn new(locator: L, sink: S, config: BridgeConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            locator,
            sink,
            config,
            state: ConnectionState::Searching,
            running,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for the discovery poll interval, waking early on shutdown.
    fn idle_wait(&self) {
        let mut remaining = self.config.poll_interval;
        while self.is_running() && !remaining.is_zero() {
            let slice = remaining.min(IDLE_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }

    /// Run the Searching ↔ Connected cycle until shutdown.
    ///
    /// Only errors from the locator itself escape; everything that
    /// happens to an attached device folds back into Searching.
    pub fn run(&mut self) -> Result<(), BridgeError> {
        while self.is_running() {
            self.state = ConnectionState::Searching;
            match self.locator.find()? {
                Some(source) => {
                    self.state = ConnectionState::Connected;
                    match self.run_session(source) {
                        Ok(()) => break, // shutdown requested mid-session
                        Err(e) => {
                            self.state = ConnectionState::Lost;
                            info!("Device lost ({e}), waiting for reconnect");
                        }
                    }
                }
                None => {
                    debug!("No device, polling again in {:?}", self.config.poll_interval);
                    self.idle_wait();
                }
            }
        }
        Ok(())
    }

    /// One Connected session: read, diff, emit, until the device goes
    /// away or shutdown is requested.
    ///
    /// The diff baseline resets to all-zero here, so no pressed state
    /// leaks across a reconnect.
    fn run_session(&mut self, mut source: Box<dyn ReportSource>) -> Result<(), BridgeError> {
        let mut last = BootReport::empty();
        let mut malformed_run = 0u32;

        let outcome = loop {
            if !self.is_running() {
                break Ok(());
            }
            match source.read(self.config.read_timeout_ms) {
                Ok(ReadOutcome::Report(current)) => {
                    malformed_run = 0;
                    if let Err(e) = self.process(&mut last, current) {
                        break Err(e);
                    }
                    // Drain anything already queued so a burst collapses
                    // to the latest state without waiting out the timeout
                    match self.drain(source.as_mut(), &mut last) {
                        Ok(()) => {}
                        Err(e) => break Err(e),
                    }
                }
                Ok(ReadOutcome::Idle) => continue,
                Ok(ReadOutcome::Malformed) => {
                    malformed_run += 1;
                    if malformed_run >= self.config.max_malformed_run {
                        warn!("{malformed_run} malformed reports in a row, treating handle as lost");
                        break Err(BridgeError::Internal(
                            "read handle keeps returning malformed reports".into(),
                        ));
                    }
                }
                Err(e) => break Err(e),
            }
        };

        // Best effort: whatever ends the session, don't leave keys stuck
        // down on the virtual device
        let _ = self.sink.emit(&report::release_all(&last));
        outcome
    }

    fn process(&mut self, last: &mut BootReport, current: BootReport) -> Result<(), BridgeError> {
        let transitions = report::diff(last, &current);
        self.sink.emit(&transitions)?;
        *last = current;
        Ok(())
    }

    fn drain(
        &mut self,
        source: &mut dyn ReportSource,
        last: &mut BootReport,
    ) -> Result<(), BridgeError> {
        loop {
            match source.read(0)? {
                ReadOutcome::Report(current) => self.process(last, current)?,
                ReadOutcome::Idle => return Ok(()),
                ReadOutcome::Malformed => return Ok(()),
            }
        }
    }
}
