//! Server module: configuration, wiring, and the run loop.

pub mod config;
mod init;

pub use config::{load_config, write_default_config, AppConfig};
pub use init::{run, run_sweep_once};
