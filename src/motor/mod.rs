// Motor control module for the two-motor car
//
// Provides:
// - Output line patterns for the dual H-bridge
// - Output line backends (Linux sysfs GPIO, in-memory mock)
// - High-level motion actuator API

mod driver;
pub mod gpio;
pub mod mock;
pub mod pattern;

pub use driver::MotionActuator;
pub use gpio::{GpioError, LineAssignment, OutputLines, SysfsLines};
pub use mock::MockLines;
pub use pattern::{Level, LinePattern};
