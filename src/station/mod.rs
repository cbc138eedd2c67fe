//! Test station: one load frame session plus its sampling engine
//!
//! [`Station`] is the context the operator-facing layer (the CLI here, a GUI
//! elsewhere) drives. It owns the device session, the engine polling it and
//! the run buffer the engine fills, and reports what happens as
//! [`StationMessage`]s over a bounded crossbeam channel.
//!
//! # Components
//!
//! - [`SamplingControl`] - Live interval/collecting configuration (monitor)
//! - [`SamplingEngine`] / [`EngineHandle`] - The poll loop and its thread
//! - [`DeviceCommand`] - One-shot commands routed to the device
//! - [`StationReceiver`] - Consumer end of the message channel
//!
//! # Lifecycle
//!
//! At most one engine runs at a time. [`Station::connect`] and
//! [`Station::attach`] first tear down any previous session: the engine is
//! stopped and joined, then the crosshead is stopped and the port closed.
//! Dropping the station does the same.
//!
//! # Example
//!
//! ```ignore
//! use loadframe_rs::device::{DeviceFamily, DeviceOptions};
//! use loadframe_rs::station::{DeviceCommand, Station, StationMessage};
//!
//! let (mut station, receiver) = Station::new(DeviceOptions::default());
//! station.connect("/dev/ttyUSB0", DeviceFamily::H5k)?;
//! station.set_sample_rate(10.0)?;
//! station.start_collecting();
//! station.execute(DeviceCommand::MoveUp)?;
//!
//! for msg in receiver.drain() {
//!     if let StationMessage::Reading(reading) = msg {
//!         println!("{:.1} N {:.3} mm", reading.load, reading.extension);
//!     }
//! }
//! ```

pub mod command;
pub mod control;
pub mod engine;

pub use command::DeviceCommand;
pub use control::{interval_from_rate, parse_rate, SamplingControl, DEFAULT_INTERVAL, MIN_INTERVAL};
pub use engine::{EngineHandle, SamplingEngine};

use crate::device::{self, DeviceFamily, DeviceOptions, LoadFrame};
use crate::error::{LoadFrameError, Result, ResultExt};
use crate::run::{self, RunData};
use crate::types::{ConnectionStatus, Reading, Sample};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the message channel; enough for well over a minute of
/// readings at the maximum rate
const MESSAGE_CAPACITY: usize = 10_000;

/// Message sent from the station to its consumer
#[derive(Debug, Clone)]
pub enum StationMessage {
    /// Connection status changed
    ConnectionStatus(ConnectionStatus),
    /// Connection attempt failed
    ConnectionError(String),
    /// Load cell range resolved, in Newtons
    LoadCellRange(f64),
    /// Live reading for display
    Reading(Reading),
    /// A sample was recorded; the run now holds `samples` samples
    Redraw { samples: usize },
    /// A poll tick failed and was skipped
    ReadError(String),
    /// Sampling interval changed
    RateChanged(Duration),
    /// Sample rate input was rejected; the interval is unchanged
    RateRejected(String),
    /// Collection switched on or off
    CollectionChanged(bool),
    /// One-shot command completed
    CommandCompleted(DeviceCommand),
    /// One-shot command failed
    CommandFailed {
        command: DeviceCommand,
        error: String,
    },
    /// Run buffer was cleared
    DataCleared,
    /// Sampling engine exited
    EngineStopped,
}

/// Consumer end of the station's message channel
pub struct StationReceiver {
    receiver: Receiver<StationMessage>,
}

impl StationReceiver {
    /// Try to receive a message without blocking
    pub fn try_recv(&self) -> Option<StationMessage> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending messages
    pub fn drain(&self) -> Vec<StationMessage> {
        self.receiver.try_iter().collect()
    }

    /// Wait up to `timeout` for the next message
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StationMessage> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

struct Session {
    name: String,
    device: Arc<dyn LoadFrame>,
    engine: EngineHandle,
}

/// One load frame station
pub struct Station {
    options: DeviceOptions,
    data: Arc<RunData>,
    session: Option<Session>,
    status: ConnectionStatus,
    /// Sampling settings carried across sessions
    interval: Duration,
    collecting: bool,
    /// Threads running slow one-shot commands
    workers: Vec<JoinHandle<()>>,
    message_tx: Sender<StationMessage>,
}

impl Station {
    /// Create a disconnected station
    pub fn new(options: DeviceOptions) -> (Self, StationReceiver) {
        let (message_tx, receiver) = bounded(MESSAGE_CAPACITY);
        let station = Self {
            options,
            data: Arc::new(RunData::new()),
            session: None,
            status: ConnectionStatus::Disconnected,
            interval: DEFAULT_INTERVAL,
            collecting: false,
            workers: Vec::new(),
            message_tx,
        };
        (station, StationReceiver { receiver })
    }

    /// Open `port_name` as a `family` controller and start sampling
    pub fn connect(&mut self, port_name: &str, family: DeviceFamily) -> Result<()> {
        self.disconnect();
        self.update_status(ConnectionStatus::Connecting);

        match device::connect(port_name, family, &self.options) {
            Ok(device) => self.attach(port_name, device),
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", port_name, e);
                self.send_message(StationMessage::ConnectionError(e.to_string()));
                self.update_status(ConnectionStatus::Error);
                Err(e)
            }
        }
    }

    /// Start sampling an already open session
    pub fn attach(&mut self, name: &str, device: Arc<dyn LoadFrame>) -> Result<()> {
        self.disconnect();

        let control = Arc::new(SamplingControl::new(self.interval, self.collecting));
        let engine = SamplingEngine::new(
            Arc::clone(&device),
            control,
            Arc::clone(&self.data),
            self.message_tx.clone(),
        );
        let engine = match engine.spawn() {
            Ok(engine) => engine,
            Err(e) => {
                if let Err(stop_err) = device.disconnect() {
                    tracing::warn!("Failed to close {}: {}", name, stop_err);
                }
                self.send_message(StationMessage::ConnectionError(e.to_string()));
                self.update_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        tracing::info!("Connected to {}", device.describe());
        self.session = Some(Session {
            name: name.to_string(),
            device,
            engine,
        });
        self.update_status(ConnectionStatus::Connected);
        Ok(())
    }

    /// Stop sampling, stop the crosshead and close the port
    ///
    /// Does nothing when not connected.
    pub fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.engine.stop();
        self.interval = session.engine.control().interval();
        self.collecting = session.engine.control().is_collecting();

        if let Err(e) = session.device.disconnect() {
            tracing::warn!("Failed to stop {} cleanly: {}", session.name, e);
        }
        self.join_workers();

        let dropped = session.engine.dropped_messages();
        if dropped > 0 {
            tracing::warn!(
                "Disconnected from {} ({} station messages dropped, consumer fell behind)",
                session.name,
                dropped
            );
        } else {
            tracing::info!("Disconnected from {}", session.name);
        }
        self.update_status(ConnectionStatus::Disconnected);
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether a session is open
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Name of the connected port
    pub fn port_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.name.as_str())
    }

    /// The connected device
    pub fn device(&self) -> Option<Arc<dyn LoadFrame>> {
        self.session.as_ref().map(|s| Arc::clone(&s.device))
    }

    /// Whether the sampling engine thread is alive
    pub fn is_sampling(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.engine.is_running())
    }

    /// Current sampling interval
    pub fn interval(&self) -> Duration {
        match &self.session {
            Some(session) => session.engine.control().interval(),
            None => self.interval,
        }
    }

    /// Change the sample rate; takes effect on the wait in progress
    ///
    /// An invalid rate leaves the interval unchanged and is reported as
    /// [`StationMessage::RateRejected`].
    pub fn set_sample_rate(&mut self, rate_hz: f64) -> Result<Duration> {
        match interval_from_rate(rate_hz) {
            Ok(interval) => {
                self.interval = match &self.session {
                    Some(session) => session.engine.control().set_interval(interval),
                    None => interval,
                };
                self.send_message(StationMessage::RateChanged(self.interval));
                Ok(self.interval)
            }
            Err(e) => {
                tracing::warn!("Rejected sample rate: {}", e);
                self.send_message(StationMessage::RateRejected(e.to_string()));
                Err(e)
            }
        }
    }

    /// Change the sample rate from operator-entered text
    pub fn set_sample_rate_text(&mut self, text: &str) -> Result<Duration> {
        match parse_rate(text) {
            Ok(rate_hz) => self.set_sample_rate(rate_hz),
            Err(e) => {
                tracing::warn!("Rejected sample rate: {}", e);
                self.send_message(StationMessage::RateRejected(e.to_string()));
                Err(e)
            }
        }
    }

    /// Whether samples are being recorded
    pub fn is_collecting(&self) -> bool {
        match &self.session {
            Some(session) => session.engine.control().is_collecting(),
            None => self.collecting,
        }
    }

    /// Start recording samples
    pub fn start_collecting(&mut self) {
        self.set_collecting(true);
    }

    /// Stop recording samples; polling for display continues
    pub fn stop_collecting(&mut self) {
        self.set_collecting(false);
    }

    /// Flip recording, returning the new state
    pub fn toggle_collecting(&mut self) -> bool {
        let collecting = !self.is_collecting();
        self.set_collecting(collecting);
        collecting
    }

    fn set_collecting(&mut self, collecting: bool) {
        if let Some(session) = &self.session {
            session.engine.control().set_collecting(collecting);
        }
        self.collecting = collecting;
        tracing::info!(
            "Collection {}",
            if collecting { "started" } else { "paused" }
        );
        self.send_message(StationMessage::CollectionChanged(collecting));
    }

    /// The run buffer
    pub fn data(&self) -> Arc<RunData> {
        Arc::clone(&self.data)
    }

    /// Copy of the recorded samples
    pub fn snapshot(&self) -> Vec<Sample> {
        self.data.snapshot()
    }

    /// Discard the recorded samples
    pub fn clear_data(&mut self) {
        self.data.clear();
        tracing::info!("Run data cleared");
        self.send_message(StationMessage::DataCleared);
    }

    /// Export the recorded samples to a CSV file
    ///
    /// Works on a snapshot, so sampling continues during the write.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let samples = self.snapshot();
        run::export_csv(path, &samples)
            .with_context(|| format!("Exporting {} recorded samples", samples.len()))
    }

    /// Run a one-shot command on the connected device
    ///
    /// Fast commands run on the calling thread and their result is returned.
    /// A zero that blocks for a settle delay is handed to a worker thread:
    /// this returns as soon as it is started and the outcome arrives as
    /// [`StationMessage::CommandCompleted`] or [`StationMessage::CommandFailed`].
    pub fn execute(&mut self, command: DeviceCommand) -> Result<()> {
        let device = self.device().ok_or(LoadFrameError::NotConnected)?;
        self.workers.retain(|worker| !worker.is_finished());

        if command.is_slow_on(device.as_ref()) {
            let message_tx = self.message_tx.clone();
            let worker = std::thread::Builder::new()
                .name("device-command".to_string())
                .spawn(move || {
                    let result = command.apply(device.as_ref());
                    if message_tx.try_send(Self::outcome(command, &result)).is_err() {
                        tracing::debug!("Station message queue full, dropping outcome of {}", command);
                    }
                })?;
            tracing::info!("Started {} in the background", command);
            self.workers.push(worker);
            return Ok(());
        }

        let result = command.apply(device.as_ref());
        self.send_message(Self::outcome(command, &result));
        result
    }

    fn outcome(command: DeviceCommand, result: &Result<()>) -> StationMessage {
        match result {
            Ok(()) => {
                tracing::info!("Command {} completed", command);
                StationMessage::CommandCompleted(command)
            }
            Err(e) => {
                tracing::warn!("Command {} failed: {}", command, e);
                StationMessage::CommandFailed {
                    command,
                    error: e.to_string(),
                }
            }
        }
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Device command thread panicked");
            }
        }
    }

    fn update_status(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.send_message(StationMessage::ConnectionStatus(status));
    }

    fn send_message(&self, msg: StationMessage) {
        if self.message_tx.try_send(msg).is_err() {
            tracing::debug!("Station message queue full, dropping message");
        }
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.disconnect();
    }
}
