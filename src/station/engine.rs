//! Sampling engine
//!
//! A dedicated thread that polls the connected load frame on the schedule
//! kept by [`SamplingControl`]. Each tick it reads load and extension,
//! publishes them for display and, while collecting, appends a sample to the
//! run buffer and requests a redraw.
//!
//! # Failure handling
//!
//! A failed read skips the tick: the error is published as
//! [`StationMessage::ReadError`] and polling continues on schedule. Until the
//! load cell range has been resolved no load is reported at all.
//!
//! # Backpressure
//!
//! Messages are sent with `try_send`. If the consumer falls behind they are
//! dropped and counted rather than stalling the poll loop. The final
//! [`StationMessage::EngineStopped`] is the exception: it waits up to
//! [`STOPPED_SEND_TIMEOUT`] for room in the queue.

use super::control::SamplingControl;
use super::StationMessage;
use crate::device::LoadFrame;
use crate::error::{LoadFrameError, Result, ResultExt};
use crate::run::RunData;
use crate::types::{Reading, Sample};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Name of the polling thread
pub const ENGINE_THREAD_NAME: &str = "sampling-engine";

/// How long the engine waits to deliver its stopped notification
pub const STOPPED_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll loop state, moved onto the engine thread
pub struct SamplingEngine {
    device: Arc<dyn LoadFrame>,
    control: Arc<SamplingControl>,
    data: Arc<RunData>,
    message_tx: Sender<StationMessage>,
    /// Rated range of the load cell, resolved on the first good tick
    range: Option<f64>,
    /// Origin of sample timestamps
    started: Instant,
    dropped_messages: Arc<AtomicU64>,
}

impl SamplingEngine {
    /// Create an engine for `device`
    pub fn new(
        device: Arc<dyn LoadFrame>,
        control: Arc<SamplingControl>,
        data: Arc<RunData>,
        message_tx: Sender<StationMessage>,
    ) -> Self {
        Self {
            device,
            control,
            data,
            message_tx,
            range: None,
            started: Instant::now(),
            dropped_messages: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the poll loop on its own thread
    pub fn spawn(self) -> Result<EngineHandle> {
        let control = Arc::clone(&self.control);
        let dropped_messages = Arc::clone(&self.dropped_messages);
        let thread = std::thread::Builder::new()
            .name(ENGINE_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(LoadFrameError::from)
            .context("Failed to spawn sampling engine thread")?;

        Ok(EngineHandle {
            control,
            thread: Some(thread),
            dropped_messages,
        })
    }

    /// Run the poll loop until a shutdown is requested
    pub fn run(mut self) {
        tracing::info!(
            "Sampling engine started for {} every {:?}",
            self.device.describe(),
            self.control.interval()
        );

        let mut deadline = Instant::now();
        while !self.control.is_shutdown() {
            if let Err(e) = self.tick() {
                tracing::warn!("Skipping sample: {}", e);
                self.try_send_message(StationMessage::ReadError(e.to_string()));
            }

            match self.control.wait_next_tick(deadline) {
                Some(next) => deadline = next,
                None => break,
            }
        }

        if self
            .message_tx
            .send_timeout(StationMessage::EngineStopped, STOPPED_SEND_TIMEOUT)
            .is_err()
        {
            tracing::warn!("Could not deliver engine stopped notification");
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        }
        tracing::info!(
            "Sampling engine stopped ({} messages dropped)",
            self.dropped_messages.load(Ordering::Relaxed)
        );
    }

    /// Poll once and publish the result
    pub fn tick(&mut self) -> Result<Reading> {
        let now = Instant::now();
        let range = self.resolve_range()?;
        let load = self.device.read_load()? * range;
        let extension = self.device.read_extension()?;

        let reading = Reading {
            timestamp: now.saturating_duration_since(self.started),
            load,
            extension,
            recorded: self.control.is_collecting(),
        };
        self.try_send_message(StationMessage::Reading(reading));

        if reading.recorded {
            self.data.append(Sample::from(reading));
            self.try_send_message(StationMessage::Redraw {
                samples: self.data.len(),
            });
        }
        Ok(reading)
    }

    fn resolve_range(&mut self) -> Result<f64> {
        if let Some(range) = self.range {
            return Ok(range);
        }
        let range = self.device.get_load_cell_range()?;
        tracing::info!("Load cell range is {} N", range);
        self.range = Some(range);
        self.try_send_message(StationMessage::LoadCellRange(range));
        Ok(range)
    }

    /// Try to send a message, counting it as dropped if the queue is full
    fn try_send_message(&self, msg: StationMessage) {
        if self.message_tx.try_send(msg).is_err() {
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Owner of a running engine thread
///
/// Stopping (or dropping) the handle requests a shutdown, wakes the engine
/// and joins it. The join can take as long as an exchange already in flight,
/// which is bounded by the read timeout or a zero settle delay.
pub struct EngineHandle {
    control: Arc<SamplingControl>,
    thread: Option<JoinHandle<()>>,
    dropped_messages: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Sampling configuration of this engine
    pub fn control(&self) -> &Arc<SamplingControl> {
        &self.control
    }

    /// Whether the engine thread is still running
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Messages dropped because the consumer was not keeping up
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Stop the engine and wait for its thread to exit
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.control.request_shutdown();
        if thread.join().is_err() {
            tracing::error!("Sampling engine thread panicked");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{open_session, DeviceFamily, DeviceOptions};
    use crate::transport::{SimulatedLoadFrame, SimulatorHandle};
    use crossbeam_channel::{bounded, Receiver};

    fn create_test_engine(
        collecting: bool,
    ) -> (SamplingEngine, SimulatorHandle, Receiver<StationMessage>) {
        let sim = SimulatedLoadFrame::new(DeviceFamily::H5k);
        let handle = sim.handle();
        let device = open_session(DeviceFamily::H5k, Box::new(sim), &DeviceOptions::default());
        let control = Arc::new(SamplingControl::new(Duration::from_millis(10), collecting));
        let (msg_tx, msg_rx) = bounded(1024);
        let engine = SamplingEngine::new(device, control, Arc::new(RunData::new()), msg_tx);
        (engine, handle, msg_rx)
    }

    #[test]
    fn test_tick_scales_load_by_range() {
        let (mut engine, handle, msg_rx) = create_test_engine(false);
        handle.set_load_raw(15000);
        handle.set_extension_raw(2000);

        let reading = engine.tick().unwrap();
        assert_eq!(reading.load, 2500.0);
        assert!((reading.extension - 2.0).abs() < 1e-9);
        assert!(!reading.recorded);
        assert!(engine.data.is_empty());

        let messages: Vec<_> = msg_rx.try_iter().collect();
        assert!(matches!(messages[0], StationMessage::LoadCellRange(r) if r == 5000.0));
        assert!(matches!(messages[1], StationMessage::Reading(_)));
    }

    #[test]
    fn test_tick_records_while_collecting() {
        let (mut engine, _handle, msg_rx) = create_test_engine(true);
        engine.tick().unwrap();
        engine.tick().unwrap();
        assert_eq!(engine.data.len(), 2);

        let redraws = msg_rx
            .try_iter()
            .filter(|m| matches!(m, StationMessage::Redraw { .. }))
            .count();
        assert_eq!(redraws, 2);
    }

    #[test]
    fn test_range_is_queried_once() {
        let (mut engine, handle, _msg_rx) = create_test_engine(false);
        engine.tick().unwrap();
        engine.tick().unwrap();
        assert_eq!(handle.count("RC"), 1);
    }

    #[test]
    fn test_unknown_load_cell_reports_no_load() {
        let (mut engine, handle, _msg_rx) = create_test_engine(true);
        handle.set_load_cell_code("999");
        assert!(engine.tick().is_err());
        assert_eq!(handle.count("RL"), 0);
        assert!(engine.data.is_empty());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let sim = SimulatedLoadFrame::new(DeviceFamily::H5k);
        let device = open_session(DeviceFamily::H5k, Box::new(sim), &DeviceOptions::default());
        let (msg_tx, _msg_rx) = bounded(1);
        let mut engine = SamplingEngine::new(
            device,
            Arc::new(SamplingControl::default()),
            Arc::new(RunData::new()),
            msg_tx,
        );
        engine.tick().unwrap();
        assert_eq!(engine.dropped_messages.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_spawned_engine_stops_on_request() {
        let (engine, handle, msg_rx) = create_test_engine(true);
        let data = Arc::clone(&engine.data);
        let mut engine = engine.spawn().unwrap();
        assert!(engine.is_running());

        std::thread::sleep(Duration::from_millis(100));
        engine.stop();
        assert!(!engine.is_running());
        assert!(!data.is_empty());
        assert!(handle.count("RL") >= 2);
        assert!(msg_rx
            .try_iter()
            .any(|m| matches!(m, StationMessage::EngineStopped)));
    }

    #[test]
    fn test_stopped_notice_waits_for_a_full_queue() {
        let sim = SimulatedLoadFrame::new(DeviceFamily::H5k);
        let device = open_session(DeviceFamily::H5k, Box::new(sim), &DeviceOptions::default());
        let control = Arc::new(SamplingControl::new(Duration::from_millis(10), false));
        let (msg_tx, msg_rx) = bounded(1);
        msg_tx.send(StationMessage::Redraw { samples: 0 }).unwrap();

        let engine = SamplingEngine::new(device, control, Arc::new(RunData::new()), msg_tx);
        let mut engine = engine.spawn().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(engine.dropped_messages() > 0);

        let consumer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            let first = msg_rx.recv().unwrap();
            let second = msg_rx.recv_timeout(Duration::from_secs(2)).unwrap();
            (first, second)
        });
        engine.stop();

        let (first, second) = consumer.join().unwrap();
        assert!(matches!(first, StationMessage::Redraw { samples: 0 }));
        assert!(matches!(second, StationMessage::EngineStopped));
    }
}
