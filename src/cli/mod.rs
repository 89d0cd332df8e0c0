//! Command-line interface for markwatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
