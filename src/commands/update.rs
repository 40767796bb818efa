//! Firmware update command

use std::path::Path;
use std::time::Duration;

use rmiflash_core::bus::DirImageStore;
use rmiflash_core::config::UpdaterConfig;
use rmiflash_core::deferred::DeferredCheck;
use rmiflash_core::session::UpdateReport;

use super::{base_options, open_session};
use crate::cli::ImageArgs;

/// Check the device and update it from an image directory or file
pub fn run_update(
    programmer: &str,
    image: Option<&Path>,
    delay_ms: u64,
    select: &ImageArgs,
    config: Option<&UpdaterConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = base_options(config);
    if select.force {
        options.force = true;
    }
    if let Some(name) = &select.name {
        options.image_name = Some(name.clone());
    }

    let mut store = if !select.dirs.is_empty() {
        DirImageStore::new(select.dirs.iter().cloned())
    } else {
        config
            .map(UpdaterConfig::image_store)
            .unwrap_or_else(|| DirImageStore::new(["."]))
    };

    let pushed = match image {
        Some(path) => {
            let data = std::fs::read(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            log::info!("Loaded {} bytes from {}", data.len(), path.display());
            Some(data)
        }
        None => None,
    };

    let mut session = open_session(programmer, options)?;
    let job = move || match pushed {
        Some(data) => session.update_with_image(&data),
        None => {
            log::info!("Searching {:?}", store.dirs());
            session.auto_update(&mut store)
        }
    };

    let report = if delay_ms > 0 {
        log::info!("Firmware check scheduled in {} ms", delay_ms);
        DeferredCheck::schedule(Duration::from_millis(delay_ms), job)
            .wait()
            .ok_or("Scheduled firmware check did not run")??
    } else {
        job()?
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &UpdateReport) {
    println!("{}", report);
    if report.in_programming_mode() {
        log::warn!("Device is still in bootloader mode; the firmware may be incomplete");
    }
}
