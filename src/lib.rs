// Remote-controlled motor driver client for a four-line H-bridge
//
// The binary connects to a command server, maps single-character commands
// to output line patterns and stops the motors after every motion window.

pub mod config;
pub mod messages;
pub mod motor;
pub mod runtime;
