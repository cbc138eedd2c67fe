//! Run-data buffer
//!
//! The sampling engine appends while plotting and export take snapshots. The
//! lock is only ever held for a push, a truncate or a copy, never across
//! device or disk I/O, so a slow consumer cannot stall the poll loop.

use crate::types::Sample;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe ordered sequence of samples
#[derive(Debug, Default)]
pub struct RunData {
    samples: Mutex<Vec<Sample>>,
}

impl RunData {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample at the end
    pub fn append(&self, sample: Sample) {
        self.lock().push(sample);
    }

    /// Copy of every sample in insertion order
    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().clone()
    }

    /// Drop every sample
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Most recent sample, if any
    pub fn last(&self) -> Option<Sample> {
        self.lock().last().copied()
    }
}
