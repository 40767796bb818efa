//! Flash engine operations
//!
//! These functions use `maybe_async` to support both sync and async modes.
//! Sequences stop at the first failing step and return its error; retrying
//! and resetting the device is left to the caller.

use maybe_async::maybe_async;

use crate::bus::RegisterBus;
use crate::error::{Error, Result};
use crate::rmi::{self, pdt, query, DeviceControl, FlashControl, RegisterMap};

use super::types::{ConfigArea, FlashCommand, FlashProgress, Timing};

/// Log a progress line every this many configuration blocks
const CONFIG_PROGRESS_STEP: usize = 10;
/// Log a progress line every this many firmware blocks
const FIRMWARE_PROGRESS_STEP: usize = 100;

/// Write the bootloader id into the block data window
#[maybe_async]
pub async fn write_bootloader_id<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
) -> Result<()> {
    log::debug!(
        "Write bootloader ID 0x{:02X} 0x{:02X}",
        map.flash.bootloader_id[0],
        map.flash.bootloader_id[1]
    );
    bus.write(map.block_data_addr(), &map.flash.bootloader_id)
        .await
}

/// Start a flash command
#[maybe_async]
pub async fn write_command<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    command: FlashCommand,
) -> Result<()> {
    log::trace!("F34 command 0x{:02X}", command.opcode());
    bus.write(map.flash_control_addr(), &[command.opcode()])
        .await
}

/// Poll the flash control register until the command nibble clears
///
/// Polls every `timing.poll_interval_us` for at most `timeout / interval + 1`
/// attempts, then reads once more before giving up with [`Error::Timeout`].
/// Returns the idle register value so the caller can check its status.
#[maybe_async]
pub async fn wait_idle<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    timing: &Timing,
    timeout_ms: u32,
) -> Result<FlashControl> {
    let timeout_us = timeout_ms.saturating_mul(1000);
    let max_polls = if timing.poll_interval_us > 0 {
        timeout_us / timing.poll_interval_us + 1
    } else {
        timeout_us + 1 // Fall back to polling once per microsecond
    };

    for _ in 0..max_polls {
        let fc = rmi::read_flash_control(bus, map).await?;
        if fc.is_idle() {
            return Ok(fc);
        }
        if timing.poll_interval_us > 0 {
            bus.delay_us(timing.poll_interval_us).await;
        }
    }

    let fc = rmi::read_flash_control(bus, map).await?;
    if fc.is_idle() {
        return Ok(fc);
    }

    log::error!("Timed out waiting for idle status (0x{:02X})", fc.0);
    Err(Error::Timeout)
}

/// Issue a command and wait for it with the timeout `timing` assigns to it
#[maybe_async]
async fn run_command<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    timing: &Timing,
    command: FlashCommand,
) -> Result<FlashControl> {
    write_command(bus, map, command).await?;
    wait_idle(bus, map, timing, timing.timeout_ms(command)).await
}

/// Switch the device into flash programming mode
///
/// Idempotent: returns immediately if the device already reports
/// programming mode. Otherwise the register map is rebuilt from a fresh PDT
/// scan and F34 query, since the bootloader exposes a different layout, and
/// F01 is kept from sleeping for the rest of the session.
#[maybe_async]
pub async fn enter_programming_mode<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &mut RegisterMap,
    timing: &Timing,
) -> Result<()> {
    log::debug!("Enter bootloader mode");

    let status = rmi::read_device_status(bus, map).await?;
    if status.flash_prog() {
        log::info!("Already in flash programming mode");
        return Ok(());
    }

    write_bootloader_id(bus, map).await?;
    run_command(bus, map, timing, FlashCommand::EnableFlashProgramming).await?;

    let scan = pdt::scan(bus).await?;
    map.update_scan(scan);

    let status = rmi::read_device_status(bus, map).await?;
    if !status.flash_prog() {
        log::error!("Not in flash programming mode ({})", status);
        return Err(Error::ModeEntryFailed);
    }

    map.flash = query::read_flash_query(bus, &map.f34).await?;

    let mut ctrl = [0u8; 1];
    bus.read(map.f01.control_base, &mut ctrl).await?;
    let ctrl = DeviceControl(ctrl[0]).keep_awake();
    bus.write(map.f01.control_base, &[ctrl.0]).await?;

    Ok(())
}

/// Erase firmware and UI configuration
#[maybe_async]
pub async fn erase_all<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    timing: &Timing,
    progress: &mut P,
) -> Result<()> {
    progress.erasing("firmware and UI config");
    write_bootloader_id(bus, map).await?;
    let fc = run_command(bus, map, timing, FlashCommand::EraseAll).await?;
    if fc.status() != 0 {
        log::error!("Erase all command failed, status 0x{:02X}", fc.status());
        return Err(Error::EraseFailed { status: fc.status() });
    }
    Ok(())
}

/// Erase a configuration area
///
/// The permanent area has no erase command and is written in place, so this
/// is a no-op for [`ConfigArea::Permanent`].
#[maybe_async]
pub async fn erase_config_area<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    timing: &Timing,
    area: ConfigArea,
    progress: &mut P,
) -> Result<()> {
    let Some(command) = area.erase_command() else {
        return Ok(());
    };

    progress.erasing("config");
    write_bootloader_id(bus, map).await?;
    let fc = run_command(bus, map, timing, command).await?;
    if fc.status() != 0 {
        log::error!("Erase {} failed, status 0x{:02X}", area, fc.status());
        return Err(Error::EraseFailed { status: fc.status() });
    }
    Ok(())
}

/// Check that `data` holds `count` full blocks
fn check_payload(map: &RegisterMap, data: &[u8], count: u16) -> Result<()> {
    let block_size = map.flash.block_size as usize;
    if block_size == 0 || data.len() < count as usize * block_size {
        log::error!(
            "Payload of {} bytes is shorter than {} blocks of {} bytes",
            data.len(),
            count,
            block_size
        );
        return Err(Error::MalformedImage);
    }
    Ok(())
}

/// Program `count` blocks from `data`
///
/// `command` selects firmware or configuration blocks. The device
/// auto-increments the block number, so it is only reset once before the
/// loop. Fails with [`Error::MalformedImage`] without touching the bus if
/// `data` is shorter than `count` blocks.
#[maybe_async]
pub async fn write_blocks<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    timing: &Timing,
    data: &[u8],
    count: u16,
    command: FlashCommand,
    progress: &mut P,
) -> Result<()> {
    check_payload(map, data, count)?;
    let block_size = map.flash.block_size as usize;
    let count = count as usize;

    let (what, step) = match command {
        FlashCommand::WriteConfigBlock => ("config", CONFIG_PROGRESS_STEP),
        _ => ("firmware", FIRMWARE_PROGRESS_STEP),
    };
    log::debug!("Start to update {} blocks", what);

    bus.write(map.block_number_addr(), &[0, 0]).await?;

    progress.transferring(what, count);
    for (block, chunk) in data.chunks_exact(block_size).take(count).enumerate() {
        if block % step == 0 {
            log::debug!("Update {} {:3} / {:3}", what, block, count);
        }

        bus.write(map.block_data_addr(), chunk).await?;
        let fc = run_command(bus, map, timing, command).await?;
        if fc.status() != 0 {
            log::error!("Flash block {} failed, status 0x{:02X}", block, fc.status());
            return Err(Error::BlockProgrammingFailed {
                block: block as u16,
                status: fc.status(),
            });
        }
        progress.block_progress(block + 1);
    }
    log::debug!("Update {} {:3} / {:3}", what, count, count);
    progress.complete();

    Ok(())
}

/// Read every block of a configuration area into `buf`
///
/// `buf` must hold at least `count * block_size` bytes.
#[maybe_async]
pub async fn read_config_blocks<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
    timing: &Timing,
    area: ConfigArea,
    buf: &mut [u8],
    progress: &mut P,
) -> Result<()> {
    let block_size = map.flash.block_size as usize;
    let count = map
        .flash
        .block_count(area)
        .ok_or(Error::CapabilityUnsupported(area))? as usize;
    if block_size == 0 || buf.len() < count * block_size {
        return Err(Error::BufferTooSmall);
    }

    bus.write(map.block_number_addr(), &[0, (area as u8) << 5])
        .await?;

    progress.transferring("config", count);
    for (block, chunk) in buf.chunks_exact_mut(block_size).take(count).enumerate() {
        let fc = run_command(bus, map, timing, FlashCommand::ReadConfigBlock).await?;
        if fc.status() != 0 {
            log::error!("Read block {} failed, status 0x{:02X}", block, fc.status());
            return Err(Error::BlockProgrammingFailed {
                block: block as u16,
                status: fc.status(),
            });
        }
        bus.read(map.block_data_addr(), chunk).await?;
        progress.block_progress(block + 1);
    }
    progress.complete();

    Ok(())
}

/// Latch and read the sensor id pins
///
/// Enters programming mode first. The pin and pull-up masks select which
/// GPIOs the bootloader samples; the result has one bit per sampled pin.
#[maybe_async]
pub async fn read_sensor_id<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &mut RegisterMap,
    timing: &Timing,
    pin_mask: u16,
    pullup_mask: u16,
) -> Result<u16> {
    enter_programming_mode(bus, map, timing).await?;

    let data = map.block_data_addr();
    bus.write(data, &pin_mask.to_le_bytes()).await?;
    bus.write(data + 2, &pullup_mask.to_le_bytes()).await?;

    run_command(bus, map, timing, FlashCommand::ReadSensorId).await?;

    let mut raw = [0u8; 2];
    bus.read(data + 4, &mut raw).await?;
    let id = u16::from_le_bytes(raw);
    log::info!("Sensor id 0x{:04X}", id);
    Ok(id)
}

/// Erase the device and program firmware and configuration
///
/// Either payload may be absent; erase always runs. Payload lengths are
/// checked against the bootloader geometry before anything is erased.
#[maybe_async]
pub async fn reflash<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &mut RegisterMap,
    timing: &Timing,
    firmware: Option<&[u8]>,
    config: Option<&[u8]>,
    progress: &mut P,
) -> Result<()> {
    enter_programming_mode(bus, map, timing).await?;
    if let Some(firmware) = firmware {
        check_payload(map, firmware, map.flash.firmware_blocks)?;
    }
    if let Some(config) = config {
        check_payload(map, config, map.flash.ui_config_blocks)?;
    }
    erase_all(bus, map, timing, progress).await?;

    if let Some(firmware) = firmware {
        let count = map.flash.firmware_blocks;
        write_blocks(bus, map, timing, firmware, count, FlashCommand::WriteFirmwareBlock, progress)
            .await?;
        log::info!("Firmware programmed");
    }

    if let Some(config) = config {
        let count = map.flash.ui_config_blocks;
        write_blocks(bus, map, timing, config, count, FlashCommand::WriteConfigBlock, progress)
            .await?;
        log::info!("Configuration programmed");
    }

    Ok(())
}

/// Erase (except permanent) and program one configuration area
#[maybe_async]
pub async fn write_config_area<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &mut RegisterMap,
    timing: &Timing,
    area: ConfigArea,
    config: &[u8],
    progress: &mut P,
) -> Result<()> {
    enter_programming_mode(bus, map, timing).await?;

    let count = map
        .flash
        .block_count(area)
        .ok_or(Error::CapabilityUnsupported(area))?;
    check_payload(map, config, count)?;

    erase_config_area(bus, map, timing, area, progress).await?;
    write_blocks(bus, map, timing, config, count, FlashCommand::WriteConfigBlock, progress).await?;
    log::info!("{} written", area);
    Ok(())
}

/// Enter programming mode and read back one configuration area
#[maybe_async]
pub async fn read_config_area<B: RegisterBus + ?Sized, P: FlashProgress + ?Sized>(
    bus: &mut B,
    map: &mut RegisterMap,
    timing: &Timing,
    area: ConfigArea,
    buf: &mut [u8],
    progress: &mut P,
) -> Result<()> {
    enter_programming_mode(bus, map, timing).await?;
    read_config_blocks(bus, map, timing, area, buf, progress).await
}
