// Digital output lines for the motor bridge
//
// The actuator only needs "drive these four lines to this pattern" and
// "give the lines back". `SysfsLines` does that through the Linux sysfs GPIO
// interface: export, direction, value, unexport.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::pattern::LinePattern;
use crate::config::{
    GPIO_CHIP_BASE, GPIO_SYSFS_ROOT, PIN_A_HIGH, PIN_A_LOW, PIN_B_HIGH, PIN_B_LOW,
};

/// How long to wait for udev to create a freshly exported pin directory
const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(5);
const EXPORT_POLL_ATTEMPTS: u32 = 20;

/// Error types for output line access
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("Failed to export GPIO {pin}: {source}")]
    Export {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on GPIO {pin}: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Output lines already released")]
    Released,
}

pub type Result<T> = std::result::Result<T, GpioError>;

/// Physical line for each bridge input (platform pin numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAssignment {
    pub a_low: u32,
    pub a_high: u32,
    pub b_low: u32,
    pub b_high: u32,
}

impl LineAssignment {
    /// Pins in pattern order [A-low, A-high, B-low, B-high]
    pub fn pins(&self) -> [u32; 4] {
        [self.a_low, self.a_high, self.b_low, self.b_high]
    }
}

impl Default for LineAssignment {
    fn default() -> Self {
        Self {
            a_low: PIN_A_LOW,
            a_high: PIN_A_HIGH,
            b_low: PIN_B_LOW,
            b_high: PIN_B_HIGH,
        }
    }
}

/// Four output lines driven as one unit
pub trait OutputLines {
    fn assignment(&self) -> LineAssignment;

    /// Drive all four lines to `pattern`
    fn apply(&mut self, pattern: LinePattern) -> Result<()>;

    /// Drive everything low and hand the lines back to the platform.
    /// Calling it again is a no-op.
    fn release(&mut self) -> Result<()>;
}

/// Output lines backed by `/sys/class/gpio`
pub struct SysfsLines {
    root: PathBuf,
    chip_base: u32,
    assignment: LineAssignment,
    values: Option<Vec<File>>,
    // Last pattern known to be on the lines, `None` after a failed write
    current: Option<LinePattern>,
}

impl SysfsLines {
    /// Export and configure the default pins under the default sysfs root
    pub fn open(assignment: LineAssignment) -> Result<Self> {
        Self::open_at(GPIO_SYSFS_ROOT, GPIO_CHIP_BASE, assignment)
    }

    /// Export and configure pins under a custom root and chip offset
    pub fn open_at(
        root: impl AsRef<Path>,
        chip_base: u32,
        assignment: LineAssignment,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!(
            "Configuring GPIO lines {:?} under {}",
            assignment.pins(),
            root.display()
        );

        let mut values = Vec::with_capacity(4);
        for pin in assignment.pins() {
            match Self::setup_output(&root, chip_base + pin) {
                Ok(file) => values.push(file),
                Err(e) => {
                    // Give back the lines configured so far
                    let mut partial = Self {
                        root,
                        chip_base,
                        assignment,
                        values: Some(values),
                        current: None,
                    };
                    if let Err(cleanup) = partial.release() {
                        warn!("Failed to release partially configured lines: {}", cleanup);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            root,
            chip_base,
            assignment,
            values: Some(values),
            current: Some(LinePattern::STOP),
        })
    }

    fn pin_dir(root: &Path, line: u32) -> PathBuf {
        root.join(format!("gpio{}", line))
    }

    /// Export `line` if needed, make it an output driven low and open its value file
    fn setup_output(root: &Path, line: u32) -> Result<File> {
        let dir = Self::pin_dir(root, line);

        if !dir.exists() {
            debug!("Exporting GPIO {}", line);
            fs::write(root.join("export"), line.to_string())
                .map_err(|source| GpioError::Export { pin: line, source })?;

            let direction = dir.join("direction");
            for _ in 0..EXPORT_POLL_ATTEMPTS {
                if direction.exists() {
                    break;
                }
                sleep(EXPORT_POLL_INTERVAL);
            }
        }

        // "low" sets output mode with an initial low level in one write
        fs::write(dir.join("direction"), "low")
            .map_err(|source| GpioError::Io { pin: line, source })?;

        OpenOptions::new()
            .write(true)
            .open(dir.join("value"))
            .map_err(|source| GpioError::Io { pin: line, source })
    }

    fn write_level(file: &mut File, line: u32, value: &str) -> Result<()> {
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.write_all(value.as_bytes()))
            .map_err(|source| GpioError::Io { pin: line, source })
    }
}

impl OutputLines for SysfsLines {
    fn assignment(&self) -> LineAssignment {
        self.assignment
    }

    fn apply(&mut self, pattern: LinePattern) -> Result<()> {
        let values = self.values.as_mut().ok_or(GpioError::Released)?;
        let pins = self.assignment.pins();

        for (index, level) in pattern.writes_from(self.current) {
            let line = self.chip_base + pins[index];
            if let Err(e) = Self::write_level(&mut values[index], line, level.as_sysfs()) {
                self.current = None;
                return Err(e);
            }
            if let Some(current) = self.current.as_mut() {
                current.0[index] = level;
                debug_assert!(
                    !current.is_conflicting(),
                    "bridge inputs both high: {}",
                    current.bits()
                );
            }
        }

        self.current = Some(pattern);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let Some(mut values) = self.values.take() else {
            return Ok(());
        };

        info!("Releasing GPIO lines {:?}", self.assignment.pins());

        // Try every line, report the first failure
        let mut first_err = None;
        for (file, pin) in values.iter_mut().zip(self.assignment.pins()) {
            let line = self.chip_base + pin;
            let result = Self::write_level(file, line, "0").and_then(|_| {
                fs::write(self.root.join("unexport"), line.to_string())
                    .map_err(|source| GpioError::Io { pin: line, source })
            });
            if let Err(e) = result {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
