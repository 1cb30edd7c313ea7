// Server endpoint, timings, pin assignment
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

// Command server
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(175, 159, 122, 149);
pub const SERVER_PORT: u16 = 8888;

// Wait between failed connection attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

// How long a motion runs before the automatic stop
pub const MOTION_WINDOW: Duration = Duration::from_millis(1500);

// Retry interval for a stop that failed to reach the lines
pub const STOP_RETRY_INTERVAL: Duration = Duration::from_millis(250);

// Upper bound for a single socket read
pub const READ_BUFFER_SIZE: usize = 1024;

// Motor bridge wiring (BCM numbering)
pub const PIN_A_LOW: u32 = 17;
pub const PIN_A_HIGH: u32 = 18;
pub const PIN_B_LOW: u32 = 22;
pub const PIN_B_HIGH: u32 = 23;

// Linux sysfs GPIO interface
pub const GPIO_SYSFS_ROOT: &str = "/sys/class/gpio";

// Offset added to BCM numbers before export. Kernels from 6.6 on register the
// Pi header chip at 512, older ones at 0.
pub const GPIO_CHIP_BASE: u32 = 0;

/// Everything the command loop needs to know about its environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server: SocketAddr,
    pub retry_delay: Duration,
    pub motion_window: Duration,
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::V4(SocketAddrV4::new(SERVER_IP, SERVER_PORT)),
            retry_delay: RETRY_DELAY,
            motion_window: MOTION_WINDOW,
            read_buffer_size: READ_BUFFER_SIZE,
        }
    }
}
