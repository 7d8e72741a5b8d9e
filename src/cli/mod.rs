//! CLI module
//!
//! Command-line arguments and the configuration built from them.

pub mod args;
pub mod config;

pub use args::{CliArgs, Command};
pub use config::Config;
