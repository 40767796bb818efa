//! rmiflash - RMI4 touch controller firmware updater
//!
//! Checks the firmware and configuration ids a Synaptics RMI4 controller
//! reports against an image, and reflashes the controller through its F34
//! bootloader when the image is newer.
//!
//! # Architecture
//!
//! Device access goes through the `TouchDevice` abstraction from
//! `rmiflash-core`, implemented by:
//! - **linux_i2c** - a controller on a Linux `/dev/i2c-N` bus
//! - **dummy** - an in-memory emulated controller for testing
//!
//! The same session and attribute interface drives every backend.

mod cli;
mod commands;
mod programmers;

use clap::Parser;
use cli::{Cli, Commands};
use rmiflash_core::config::UpdaterConfig;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match cli.config.as_deref().map(load_config).transpose() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let config = config.as_ref();

    match cli.command {
        Commands::Update {
            programmer,
            image,
            delay_ms,
            select,
        } => commands::update::run_update(&programmer, image.as_deref(), delay_ms, &select, config),
        Commands::WriteConfig {
            programmer,
            area,
            input,
        } => commands::config_area::run_write_config(&programmer, area, &input, config),
        Commands::ReadConfig {
            programmer,
            area,
            output,
        } => commands::config_area::run_read_config(&programmer, area, &output, config),
        Commands::Info { programmer, image } => {
            commands::info::run_info(&programmer, image.as_deref(), config)
        }
        Commands::Ctl {
            programmer,
            push,
            dump,
            ops,
        } => commands::ctl::run_ctl(&programmer, push.as_deref(), dump.as_deref(), &ops, config),
        Commands::ListProgrammers => {
            commands::list_programmers();
            Ok(())
        }
    }
}

/// Load the updater configuration file
fn load_config(path: &Path) -> Result<UpdaterConfig, Box<dyn std::error::Error>> {
    let config = UpdaterConfig::from_toml_file(path)?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}
