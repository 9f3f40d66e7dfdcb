//! Process exit codes.
//!
//! Usage errors are reported by clap itself, which exits with [`USAGE`].

pub const SUCCESS: u8 = 0;
pub const GENERAL: u8 = 1;
#[cfg_attr(not(test), allow(dead_code))]
pub const USAGE: u8 = 2;
/// A root could not be created or is not a directory.
pub const INVALID_ROOT: u8 = 3;
/// Stopped by SIGINT/SIGTERM/SIGHUP.
pub const INTERRUPTED: u8 = 130;
