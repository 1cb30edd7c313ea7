// In-memory output lines for tests and dry runs
//
// Clones share one recording, so a test can keep a handle while the actuator
// owns another and inspect every pattern that was applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::gpio::{GpioError, LineAssignment, OutputLines, Result};
use super::pattern::LinePattern;

#[derive(Debug, Default)]
struct Recording {
    history: Vec<LinePattern>,
    released: bool,
    release_calls: usize,
    fail_writes: bool,
}

/// Output lines that record instead of touching hardware
#[derive(Debug, Clone, Default)]
pub struct MockLines {
    assignment: LineAssignment,
    recording: Arc<Mutex<Recording>>,
}

impl MockLines {
    pub fn new() -> Self {
        Self::default()
    }

    fn recording(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pattern currently on the lines (all low before the first write)
    pub fn current(&self) -> LinePattern {
        self.recording().history.last().copied().unwrap_or_default()
    }

    /// Every pattern applied so far, oldest first
    pub fn history(&self) -> Vec<LinePattern> {
        self.recording().history.clone()
    }

    pub fn is_released(&self) -> bool {
        self.recording().released
    }

    /// Number of `release` calls, including no-op repeats
    pub fn release_calls(&self) -> usize {
        self.recording().release_calls
    }

    /// Make every following `apply` fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.recording().fail_writes = fail;
    }
}

impl OutputLines for MockLines {
    fn assignment(&self) -> LineAssignment {
        self.assignment
    }

    fn apply(&mut self, pattern: LinePattern) -> Result<()> {
        let mut recording = self.recording();
        if recording.released {
            return Err(GpioError::Released);
        }
        if recording.fail_writes {
            return Err(GpioError::Io {
                pin: self.assignment.a_low,
                source: std::io::Error::other("injected write failure"),
            });
        }
        recording.history.push(pattern);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let mut recording = self.recording();
        recording.release_calls += 1;
        if !recording.released {
            if recording.history.last().copied().unwrap_or_default() != LinePattern::STOP {
                recording.history.push(LinePattern::STOP);
            }
            recording.released = true;
        }
        Ok(())
    }
}
