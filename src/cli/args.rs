//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Marker index and duplicate detection for annotated source trees
#[derive(Parser)]
#[command(
    name = "markwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Detect duplicate marker values and keep derived artifacts current",
    next_line_help = true,
    styles = clap_cargo_style(),
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "MW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .markwatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Build the index once and report duplicate markers
    #[command(
        about = "Scan a source tree for duplicate marker values",
        after_help = "Exit status is 1 when duplicates were found.\n\nExamples:\n  markwatch scan\n  markwatch scan services/billing --json"
    )]
    Scan {
        /// Root of the source tree (defaults to the workspace root)
        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep the index current while files change
    #[command(about = "Watch a source tree and report duplicates as they appear")]
    Watch {
        /// Root of the source tree (defaults to the workspace root)
        #[arg(value_name = "ROOT")]
        root: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_with_json() {
        let cli = Cli::try_parse_from(["markwatch", "scan", "src", "--json"]).unwrap();
        match cli.command {
            Commands::Scan { root, json } => {
                assert_eq!(root, Some(PathBuf::from("src")));
                assert!(json);
            }
            _ => panic!("expected scan"),
        }
    }
}
