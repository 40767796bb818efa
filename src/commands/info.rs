//! Device information command

use std::path::Path;

use rmiflash_core::config::UpdaterConfig;
use rmiflash_core::flash::ConfigArea;
use rmiflash_core::image::FirmwareImage;
use rmiflash_core::update::{self, DeviceState, ImageVersion};

use super::{base_options, open_session, Session};

/// Print device identification, geometry and optionally an image summary
pub fn run_info(
    programmer: &str,
    image: Option<&Path>,
    config: Option<&UpdaterConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = base_options(config);
    let force = options.force;
    let mut session = open_session(programmer, options)?;
    let state = print_device(&mut session)?;

    if let Some(path) = image {
        let data = std::fs::read(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let name = path.file_name().and_then(|n| n.to_str());
        print_image(&data, name, force, &state)?;
    }
    Ok(())
}

fn print_device(session: &mut Session) -> Result<DeviceState, Box<dyn std::error::Error>> {
    let product = session.product().clone();
    let map = *session.register_map();

    println!("RMI4 Device Information");
    println!("=======================");
    println!();
    println!("Product ID:      {}", product.product_id);
    println!(
        "Product info:    {:02X} {:02X}",
        product.product_info[0], product.product_info[1]
    );
    println!("Status:          {}", session.device_status()?);
    println!(
        "Bootloader ID:   {:02X} {:02X}",
        map.flash.bootloader_id[0], map.flash.bootloader_id[1]
    );
    println!("Block size:      {} bytes", map.flash.block_size);
    println!("Firmware blocks: {}", map.flash.firmware_blocks);
    println!();
    println!("Configuration areas:");
    for area in ConfigArea::ALL {
        match map.flash.block_count(area) {
            Some(count) => println!("  {:18} {} blocks", area.to_string(), count),
            None => println!("  {:18} not present", area.to_string()),
        }
    }

    let state = session.device_state()?;
    println!();
    match state {
        DeviceState::Programming => println!("Device is in bootloader mode"),
        DeviceState::Operating {
            firmware_id,
            config_id,
        } => {
            println!("Firmware ID:     {}", firmware_id);
            println!("Config ID:       0x{:08X}", config_id);
        }
    }
    Ok(state)
}

fn print_image(
    data: &[u8],
    name: Option<&str>,
    force: bool,
    state: &DeviceState,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = FirmwareImage::parse(data)?;
    let header = image.header();

    println!();
    println!("Image");
    println!("=====");
    println!();
    println!("Product ID:      {}", header.product_id);
    println!(
        "Checksum:        0x{:08X} ({})",
        header.checksum,
        if image.checksum_valid() { "valid" } else { "MISMATCH" }
    );
    println!("Bootloader ver.: {}", header.bootloader_version);
    println!("Firmware size:   {} bytes", header.firmware_size);
    println!("Config size:     {} bytes", header.config_size);
    match header.build_id {
        Some(id) => println!("Build ID:        {}", id),
        None => println!("Build ID:        (none)"),
    }
    if let Some(id) = image.config_id() {
        println!("Config ID:       0x{:08X}", id);
    }
    if let Some(version) = image.config_version() {
        println!("Config version:  0x{:04X}", version);
    }

    let version = ImageVersion {
        build_id: header.build_id,
        name,
        config_id: image.config_id(),
    };
    println!();
    match update::decide(force, state, &version) {
        Ok(decision) => println!("Decision:        {}", decision),
        Err(e) => println!("Decision:        none ({})", e),
    }
    Ok(())
}
