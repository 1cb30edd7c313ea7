// High-level motion actuator for the car
//
// Maps discrete motion commands onto the four bridge inputs. Every operation
// rewrites all four lines, so the bridge only ever sees complete patterns.

use tracing::{debug, info, warn};

use super::gpio::{GpioError, OutputLines};
use super::pattern::LinePattern;
use crate::messages::MotionCommand;

/// Owns the output lines for the lifetime of the process
pub struct MotionActuator<L: OutputLines> {
    lines: L,
    released: bool,
}

impl<L: OutputLines> MotionActuator<L> {
    /// Take ownership of the lines and drive them to the stop pattern
    pub fn new(lines: L) -> Result<Self, GpioError> {
        info!(
            "Initializing motion actuator on lines {:?}",
            lines.assignment().pins()
        );
        let mut actuator = Self {
            lines,
            released: false,
        };
        actuator.stop()?;
        Ok(actuator)
    }

    /// Drive the lines to the pattern for `command`
    pub fn perform(&mut self, command: MotionCommand) -> Result<(), GpioError> {
        if self.released {
            return Err(GpioError::Released);
        }
        let pattern = command.pattern();
        debug_assert!(!pattern.is_conflicting());
        debug!("{:?}: driving lines {}", command, pattern.bits());
        self.lines.apply(pattern)
    }

    pub fn forward(&mut self) -> Result<(), GpioError> {
        self.perform(MotionCommand::Forward)
    }

    pub fn backward(&mut self) -> Result<(), GpioError> {
        self.perform(MotionCommand::Backward)
    }

    pub fn turn_right(&mut self) -> Result<(), GpioError> {
        self.perform(MotionCommand::TurnRight)
    }

    pub fn turn_left(&mut self) -> Result<(), GpioError> {
        self.perform(MotionCommand::TurnLeft)
    }

    /// All four lines low
    pub fn stop(&mut self) -> Result<(), GpioError> {
        self.perform(MotionCommand::Stop)
    }

    /// Run the command for `command`, if it is one.
    ///
    /// Returns `Ok(false)` without touching the lines for characters outside
    /// `f b r l s`.
    pub fn execute(&mut self, command: char) -> Result<bool, GpioError> {
        match MotionCommand::from_char(command) {
            Some(cmd) => self.perform(cmd).map(|_| true),
            None => Ok(false),
        }
    }

    /// Stop, then hand the lines back to the platform. Safe to call twice.
    pub fn release(&mut self) -> Result<(), GpioError> {
        if self.released {
            return Ok(());
        }
        info!("Releasing motion actuator");

        // Release even if the stop write failed
        let stopped = self.lines.apply(LinePattern::STOP);
        self.released = true;
        let released = self.lines.release();
        stopped.and(released)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn lines(&self) -> &L {
        &self.lines
    }
}

impl<L: OutputLines> Drop for MotionActuator<L> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release output lines on drop: {}", e);
        }
    }
}
