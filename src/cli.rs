//! CLI argument parsing

use crate::programmers;
use clap::{Parser, Subcommand};
use rmiflash_core::flash::ConfigArea;
use std::path::PathBuf;

/// Parse a configuration area name or number
fn parse_area(s: &str) -> Result<ConfigArea, String> {
    if let Some(area) = ConfigArea::from_name(&s.to_ascii_lowercase()) {
        return Ok(area);
    }
    s.parse::<u8>()
        .ok()
        .and_then(|n| ConfigArea::try_from(n).ok())
        .ok_or_else(|| format!("Invalid config area: {} (ui, permanent, bootloader, display or 0-3)", s))
}

/// Generate dynamic help text for the programmer argument
fn programmer_help() -> String {
    format!(
        "Programmer to use [available: {}]",
        programmers::programmer_names_short()
    )
}

#[derive(Parser)]
#[command(name = "rmiflash")]
#[command(author, version, about = "RMI4 touch controller firmware updater", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Updater configuration file (TOML format)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Image selection shared by update commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ImageArgs {
    /// Image name to look up in the image directories
    #[arg(short, long)]
    pub name: Option<String>,

    /// Image directory (repeatable, overrides the configuration file)
    #[arg(short, long = "dir")]
    pub dirs: Vec<PathBuf>,

    /// Skip the vendor check and version comparison
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Update firmware if the device needs it
    Update {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Flash this image file unconditionally (no version comparison)
        #[arg(short, long, conflicts_with = "name")]
        image: Option<PathBuf>,

        /// Wait this long before starting, in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        #[command(flatten)]
        select: ImageArgs,
    },

    /// Write a configuration area
    WriteConfig {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Configuration area
        #[arg(short, long, value_parser = parse_area, default_value = "ui")]
        area: ConfigArea,

        /// Input file: a full image for the UI area, raw area contents otherwise
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Read a configuration area to a file
    ReadConfig {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Configuration area
        #[arg(short, long, value_parser = parse_area, default_value = "ui")]
        area: ConfigArea,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show device identification and flash geometry
    Info {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Also describe this image file
        #[arg(short, long)]
        image: Option<PathBuf>,
    },

    /// Drive the attribute interface (`name` reads, `name=value` writes)
    Ctl {
        /// Programmer to use
        #[arg(short, long, help = programmer_help())]
        programmer: String,

        /// Stage this file through the data channel first
        #[arg(long)]
        push: Option<PathBuf>,

        /// Save the data channel contents to this file afterwards
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Attribute reads and writes, applied in order
        #[arg(required = true)]
        ops: Vec<String>,
    },

    /// List available programmers
    ListProgrammers,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_area() {
        assert_eq!(parse_area("ui"), Ok(ConfigArea::Ui));
        assert_eq!(parse_area("Display"), Ok(ConfigArea::Display));
        assert_eq!(parse_area("1"), Ok(ConfigArea::Permanent));
        assert!(parse_area("4").is_err());
        assert!(parse_area("flash").is_err());
    }

    #[test]
    fn test_update_args() {
        let cli = Cli::try_parse_from([
            "rmiflash", "-v", "update", "-p", "dummy", "-d", "/lib/firmware", "-d", ".", "--force",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Update { select, image, .. } => {
                assert!(image.is_none());
                assert!(select.force);
                assert_eq!(select.dirs.len(), 2);
            }
            _ => panic!("expected update"),
        }

        assert!(Cli::try_parse_from([
            "rmiflash", "update", "-p", "dummy", "-i", "a.img", "-n", "b.img"
        ])
        .is_err());
    }
}
