//! Configuration area read and write commands

use std::path::Path;

use rmiflash_core::config::UpdaterConfig;
use rmiflash_core::flash::ConfigArea;

use super::{base_options, open_session};

/// Write a file to a configuration area
///
/// The UI area takes a full firmware image and writes its configuration
/// payload; the other areas take raw contents of exactly the area size.
pub fn run_write_config(
    programmer: &str,
    area: ConfigArea,
    input: &Path,
    config: Option<&UpdaterConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)
        .map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;

    let mut session = open_session(programmer, base_options(config))?;
    session.set_config_area(area);
    session.stage_image(data.len())?;
    session.append_staged(&data)?;
    session.write_config()?;

    println!("Wrote {} from {}", area, input.display());
    Ok(())
}

/// Read a configuration area into a file
pub fn run_read_config(
    programmer: &str,
    area: ConfigArea,
    output: &Path,
    config: Option<&UpdaterConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = open_session(programmer, base_options(config))?;
    session.set_config_area(area);
    let data = session.read_config()?;

    std::fs::write(output, data)
        .map_err(|e| format!("Failed to write {}: {}", output.display(), e))?;
    println!("Read {} bytes of {} to {}", data.len(), area, output.display());
    Ok(())
}
