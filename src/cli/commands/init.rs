//! Init and Config commands.

use std::path::Path;
use std::process::ExitCode;

use crate::config::Settings;

/// Run init command - create configuration file.
pub fn run_init(root: &Path, force: bool) -> ExitCode {
    match Settings::init_config_file(root, force) {
        Ok(path) => {
            if force {
                println!("Wrote configuration file at: {}", path.display());
            } else {
                println!("Created configuration file at: {}", path.display());
            }
            println!("Edit this file to customize your settings.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> ExitCode {
    match toml::to_string_pretty(config) {
        Ok(toml_str) => {
            println!("{toml_str}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error displaying config: {e}");
            ExitCode::FAILURE
        }
    }
}
