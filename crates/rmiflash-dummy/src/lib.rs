//! rmiflash-dummy - Emulated RMI4 touch controller for testing
//!
//! This crate provides a register-level emulation of an RMI4 device with F01
//! and F34 functions. It implements the operating and bootloader register
//! layouts, the F34 command set and soft reset, so the reflash engine can be
//! exercised without hardware.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod image;

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use rmiflash_core::bus::{DeviceReset, RegisterBus};
use rmiflash_core::error::{Error, Result};
use rmiflash_core::flash::{ConfigArea, FlashCommand};
use rmiflash_core::rmi::F01_CMD_RESET;

/// Size of the emulated register page
const REG_SPACE: usize = 0x100;

const PDT_F01: usize = 0xE9;
const PDT_F34: usize = 0xE3;
const PDT_F11: usize = 0xDD;
const PDT_PROPS: usize = 0xEF;

const F01_QUERY: u8 = 0x00;
const F01_CTRL: u8 = 0x20;
const F01_CMD: u8 = 0x30;
const F01_DATA: u8 = 0x40;

const F34_QUERY: u8 = 0x50;
const F34_CTRL: u8 = 0x4C;
const F34_DATA_UI: u8 = 0x60;
const F34_DATA_BL: u8 = 0x80;

/// Largest block size the register layout leaves room for
pub const MAX_BLOCK_SIZE: u16 = 64;

/// F34 status: command rejected (bad bootloader id or not in bootloader)
pub const STATUS_REJECTED: u8 = 0x7;
/// F34 status: unknown command or missing area
pub const STATUS_INVALID: u8 = 0x1;
/// F34 status: block programming error
pub const STATUS_PROGRAM_ERROR: u8 = 0x5;

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Bytes per flash block
    pub block_size: u16,
    /// Firmware block count
    pub firmware_blocks: u16,
    /// UI configuration block count
    pub ui_config_blocks: u16,
    /// Permanent configuration block count, `None` if absent
    pub perm_config_blocks: Option<u16>,
    /// Bootloader configuration block count, `None` if absent
    pub bl_config_blocks: Option<u16>,
    /// Display configuration block count, `None` if absent
    pub disp_config_blocks: Option<u16>,
    /// Bootloader id expected by enable and erase commands
    pub bootloader_id: [u8; 2],
    /// Firmware id reported in F01 queries (24 bits)
    pub firmware_id: u32,
    /// Initial UI configuration id (first 4 config bytes)
    pub config_id: [u8; 4],
    /// Product id string (up to 6 characters)
    pub product_id: String,
    /// PDT properties byte
    pub pdt_props: u8,
    /// Sensor id pin levels
    pub sensor_id: u16,
    /// Reads of the flash control register before a command completes
    pub busy_polls: u32,
    /// Start in bootloader mode with no valid firmware
    pub start_in_bootloader: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            firmware_blocks: 8,
            ui_config_blocks: 4,
            perm_config_blocks: Some(2),
            bl_config_blocks: None,
            disp_config_blocks: Some(2),
            bootloader_id: [0x35, 0x01],
            firmware_id: 1_116_007,
            config_id: [0x00, 0x31, 0x00, 0x05],
            product_id: String::from("s3202"),
            pdt_props: 0,
            sensor_id: 0,
            busy_polls: 0,
            start_in_bootloader: false,
        }
    }
}

impl DummyConfig {
    fn properties(&self) -> u8 {
        let mut props = 0x01 | 0x04; // regmap, has config id
        if self.perm_config_blocks.is_some() {
            props |= 1 << 3;
        }
        if self.bl_config_blocks.is_some() {
            props |= 1 << 4;
        }
        if self.disp_config_blocks.is_some() {
            props |= 1 << 5;
        }
        props
    }

    fn area_blocks(&self, area: ConfigArea) -> Option<u16> {
        match area {
            ConfigArea::Ui => Some(self.ui_config_blocks),
            ConfigArea::Permanent => self.perm_config_blocks,
            ConfigArea::Bootloader => self.bl_config_blocks,
            ConfigArea::Display => self.disp_config_blocks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Operating,
    Bootloader,
}

/// Emulated RMI4 touch controller
pub struct DummyTouch {
    config: DummyConfig,
    regs: Vec<u8>,
    mode: Mode,
    firmware: Vec<u8>,
    configs: [Vec<u8>; 4],
    firmware_valid: bool,
    firmware_id: u32,
    block_number: u16,
    read_area: u8,
    armed_area: Option<ConfigArea>,
    busy_remaining: u32,
    command: u8,
    status: u8,
    fail_block: Option<u16>,
    commands: Vec<u8>,
    block_selects: Vec<[u8; 2]>,
    writes: usize,
    resets: usize,
    control_reads: usize,
    elapsed_us: u64,
}

impl DummyTouch {
    /// Create a dummy device with the given configuration
    ///
    /// Flash starts erased except for the UI configuration id.
    pub fn new(config: DummyConfig) -> Self {
        assert!(config.block_size > 0 && config.block_size <= MAX_BLOCK_SIZE);
        let bs = config.block_size as usize;
        let area_len = |blocks: Option<u16>| blocks.map_or(0, |b| b as usize * bs);
        let mut configs = [
            vec![0xFF; area_len(Some(config.ui_config_blocks))],
            vec![0xFF; area_len(config.perm_config_blocks)],
            vec![0xFF; area_len(config.bl_config_blocks)],
            vec![0xFF; area_len(config.disp_config_blocks)],
        ];
        let id_len = configs[0].len().min(4);
        configs[0][..id_len].copy_from_slice(&config.config_id[..id_len]);

        let mut device = Self {
            regs: vec![0; REG_SPACE],
            mode: Mode::Operating,
            firmware: vec![0xFF; config.firmware_blocks as usize * bs],
            configs,
            firmware_valid: !config.start_in_bootloader,
            firmware_id: config.firmware_id,
            block_number: 0,
            read_area: 0,
            armed_area: None,
            busy_remaining: 0,
            command: 0,
            status: 0,
            fail_block: None,
            commands: Vec::new(),
            block_selects: Vec::new(),
            writes: 0,
            resets: 0,
            control_reads: 0,
            elapsed_us: 0,
            config,
        };
        device.power_on();
        device
    }

    /// Create a dummy device with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Firmware flash contents
    pub fn firmware(&self) -> &[u8] {
        &self.firmware
    }

    /// Contents of a configuration area (empty if absent)
    pub fn config_area(&self, area: ConfigArea) -> &[u8] {
        &self.configs[area as usize]
    }

    /// Device is in bootloader mode
    pub fn in_bootloader(&self) -> bool {
        self.mode == Mode::Bootloader
    }

    /// Change the firmware id reported after the next reset
    pub fn set_firmware_id(&mut self, id: u32) {
        self.firmware_id = id;
    }

    /// Make the write of firmware or config block `block` fail
    pub fn fail_block(&mut self, block: Option<u16>) {
        self.fail_block = block;
    }

    /// Change how many polls a command stays busy
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.config.busy_polls = polls;
    }

    /// F34 commands received, in order
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    /// Number of commands received with the given opcode
    pub fn command_count(&self, command: FlashCommand) -> usize {
        self.commands
            .iter()
            .filter(|&&c| c == command.opcode())
            .count()
    }

    /// Values written to the block number register, in order
    pub fn block_selects(&self) -> &[[u8; 2]] {
        &self.block_selects
    }

    /// Number of bus writes received
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Number of resets performed
    pub fn reset_count(&self) -> usize {
        self.resets
    }

    /// Number of flash control register reads
    pub fn control_reads(&self) -> usize {
        self.control_reads
    }

    /// Total time requested through `delay_us`
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// Overwrite a register without triggering any side effect
    ///
    /// The value is lost on the next mode change or reset.
    pub fn poke(&mut self, addr: u16, value: u8) {
        if let Some(reg) = self.regs.get_mut(addr as usize) {
            *reg = value;
        }
    }

    fn f34_data(&self) -> usize {
        match self.mode {
            Mode::Operating => F34_DATA_UI as usize,
            Mode::Bootloader => F34_DATA_BL as usize,
        }
    }

    fn block_data(&self) -> usize {
        self.f34_data() + 2
    }

    fn flash_control(&self) -> usize {
        self.block_data() + self.config.block_size as usize
    }

    fn power_on(&mut self) {
        self.mode = if self.firmware_valid {
            Mode::Operating
        } else {
            Mode::Bootloader
        };
        self.block_number = 0;
        self.read_area = 0;
        self.armed_area = None;
        self.command = 0;
        self.status = 0;
        self.busy_remaining = 0;
        self.build_registers();
    }

    fn build_registers(&mut self) {
        self.regs.fill(0);
        let data = self.f34_data() as u8;

        self.regs[PDT_PROPS] = self.config.pdt_props;
        self.regs[PDT_F01..PDT_F01 + 6].copy_from_slice(&[F01_QUERY, F01_CMD, F01_CTRL, F01_DATA, 0x01, 0x01]);
        self.regs[PDT_F34..PDT_F34 + 6].copy_from_slice(&[F34_QUERY, 0x00, F34_CTRL, data, 0x21, 0x34]);
        if self.mode == Mode::Operating {
            self.regs[PDT_F11..PDT_F11 + 6].copy_from_slice(&[0xA0, 0x00, 0xA8, 0xB0, 0x02, 0x11]);
        }

        // F01 queries: product info, product id, firmware id
        let q = F01_QUERY as usize;
        self.regs[q + 2] = 0x01;
        self.regs[q + 3] = 0x02;
        for (i, b) in self.config.product_id.bytes().take(6).enumerate() {
            self.regs[q + 11 + i] = b;
        }
        let fw = self.firmware_id.to_le_bytes();
        self.regs[q + 18..q + 21].copy_from_slice(&fw[..3]);
        self.regs[q + 21] = 0xA5;

        // F01 status
        self.regs[F01_DATA as usize] = match self.mode {
            Mode::Operating => 0x00,
            Mode::Bootloader => 0x40,
        };

        // F34 queries
        let q = F34_QUERY as usize;
        self.regs[q..q + 2].copy_from_slice(&self.config.bootloader_id);
        self.regs[q + 2] = self.config.properties();
        self.regs[q + 3..q + 5].copy_from_slice(&self.config.block_size.to_le_bytes());
        let mut counts = Vec::new();
        counts.extend_from_slice(&self.config.firmware_blocks.to_le_bytes());
        counts.extend_from_slice(&self.config.ui_config_blocks.to_le_bytes());
        for blocks in [
            self.config.perm_config_blocks,
            self.config.bl_config_blocks,
            self.config.disp_config_blocks,
        ]
        .into_iter()
        .flatten()
        {
            counts.extend_from_slice(&blocks.to_le_bytes());
        }
        self.regs[q + 5..q + 5 + counts.len()].copy_from_slice(&counts);

        // F34 control: config id of the running UI config
        let c = F34_CTRL as usize;
        if self.mode == Mode::Operating {
            let ui = &self.configs[ConfigArea::Ui as usize];
            let len = ui.len().min(4);
            self.regs[c..c + len].copy_from_slice(&ui[..len]);
        }
    }

    fn flash_control_value(&mut self) -> u8 {
        self.control_reads += 1;
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
        } else {
            self.command = 0;
        }
        let enabled = if self.mode == Mode::Bootloader { 0x80 } else { 0 };
        enabled | (self.status << 4) | self.command
    }

    fn bootloader_id_ok(&self) -> bool {
        let d = self.block_data();
        self.regs[d..d + 2] == self.config.bootloader_id
    }

    fn transfer_range(&self, len: usize) -> Option<core::ops::Range<usize>> {
        let bs = self.config.block_size as usize;
        let start = self.block_number as usize * bs;
        (start + bs <= len).then_some(start..start + bs)
    }

    fn run(&mut self, opcode: u8) -> u8 {
        if opcode == FlashCommand::EnableFlashProgramming.opcode() {
            if !self.bootloader_id_ok() {
                return STATUS_REJECTED;
            }
            log::debug!("dummy: entering bootloader");
            self.mode = Mode::Bootloader;
            self.build_registers();
            return 0;
        }
        if self.mode != Mode::Bootloader {
            return STATUS_REJECTED;
        }

        let bs = self.config.block_size as usize;
        let d = self.block_data();
        match opcode {
            0x03 => {
                if !self.bootloader_id_ok() {
                    return STATUS_REJECTED;
                }
                self.firmware.fill(0xFF);
                self.configs[ConfigArea::Ui as usize].fill(0xFF);
                self.firmware_valid = false;
                self.armed_area = Some(ConfigArea::Ui);
                0
            }
            0x07 | 0x09 | 0x0A => {
                let area = match opcode {
                    0x07 => ConfigArea::Ui,
                    0x09 => ConfigArea::Bootloader,
                    _ => ConfigArea::Display,
                };
                if !self.bootloader_id_ok() {
                    return STATUS_REJECTED;
                }
                if self.config.area_blocks(area).is_none() {
                    return STATUS_INVALID;
                }
                self.configs[area as usize].fill(0xFF);
                self.armed_area = Some(area);
                0
            }
            0x02 => {
                if self.fail_block == Some(self.block_number) {
                    return STATUS_PROGRAM_ERROR;
                }
                let Some(range) = self.transfer_range(self.firmware.len()) else {
                    return STATUS_INVALID;
                };
                let block = self.regs[d..d + bs].to_vec();
                self.firmware[range.clone()].copy_from_slice(&block);
                self.block_number += 1;
                if range.end == self.firmware.len() {
                    self.firmware_valid = true;
                }
                0
            }
            0x06 => {
                if self.fail_block == Some(self.block_number) {
                    return STATUS_PROGRAM_ERROR;
                }
                let area = self.armed_area.unwrap_or(ConfigArea::Permanent) as usize;
                let Some(range) = self.transfer_range(self.configs[area].len()) else {
                    return STATUS_INVALID;
                };
                let block = self.regs[d..d + bs].to_vec();
                self.configs[area][range].copy_from_slice(&block);
                self.block_number += 1;
                0
            }
            0x05 => {
                let area = (self.read_area & 0x03) as usize;
                let Some(range) = self.transfer_range(self.configs[area].len()) else {
                    return STATUS_INVALID;
                };
                let block = self.configs[area][range].to_vec();
                self.regs[d..d + bs].copy_from_slice(&block);
                self.block_number += 1;
                0
            }
            0x08 => {
                let pins = u16::from_le_bytes([self.regs[d], self.regs[d + 1]]);
                let value = (self.config.sensor_id & pins).to_le_bytes();
                self.regs[d + 4..d + 6].copy_from_slice(&value);
                0
            }
            _ => STATUS_INVALID,
        }
    }

    fn execute(&mut self, opcode: u8) {
        self.commands.push(opcode);
        self.status = self.run(opcode);
        // The command nibble reads back busy until the polls run out
        self.busy_remaining = self.config.busy_polls;
        self.command = if self.busy_remaining > 0 { opcode } else { 0 };
    }

    fn soft_reset(&mut self) {
        log::debug!("dummy: reset");
        self.resets += 1;
        self.power_on();
    }
}

impl RegisterBus for DummyTouch {
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        let start = addr as usize;
        let end = start + buf.len();
        if end > REG_SPACE {
            return Err(Error::Transport);
        }
        buf.copy_from_slice(&self.regs[start..end]);

        let control = self.flash_control();
        if (start..end).contains(&control) {
            buf[control - start] = self.flash_control_value();
        }
        Ok(())
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let start = addr as usize;
        let end = start + data.len();
        if end > REG_SPACE {
            return Err(Error::Transport);
        }
        self.writes += 1;
        self.regs[start..end].copy_from_slice(data);

        if start == F01_CMD as usize && data.first().is_some_and(|b| b & F01_CMD_RESET != 0) {
            self.soft_reset();
        } else if start == self.f34_data() && data.len() >= 2 {
            self.block_number = u16::from(data[0]) | (u16::from(data[1] & 0x1F) << 8);
            self.read_area = data[1] >> 5;
            self.block_selects.push([data[0], data[1]]);
        } else if start == self.flash_control() && !data.is_empty() {
            self.execute(data[0] & 0x0F);
        }
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }
}

impl DeviceReset for DummyTouch {
    fn reset(&mut self) -> Result<()> {
        self.soft_reset();
        Ok(())
    }
}

fn parse_number(value: &str) -> Option<u32> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

/// Parse programmer options from a list of key-value pairs
///
/// Unknown keys are ignored with a warning.
pub fn parse_options(options: &[(&str, &str)]) -> core::result::Result<DummyConfig, String> {
    let mut config = DummyConfig::default();

    for &(key, value) in options {
        let number = || {
            parse_number(value).ok_or_else(|| alloc::format!("Invalid {} value: {}", key, value))
        };
        let count = || {
            number().and_then(|n| {
                u16::try_from(n).map_err(|_| alloc::format!("{} out of range: {}", key, value))
            })
        };
        match key {
            "blocksize" => {
                let size = count()?;
                if size == 0 || size > MAX_BLOCK_SIZE {
                    return Err(alloc::format!(
                        "Invalid blocksize: {} (must be 1-{})",
                        size,
                        MAX_BLOCK_SIZE
                    ));
                }
                config.block_size = size;
            }
            "fwblocks" => config.firmware_blocks = count()?,
            "configblocks" => config.ui_config_blocks = count()?,
            "fwid" => config.firmware_id = number()? & 0x00FF_FFFF,
            "configid" => config.config_id = number()?.to_be_bytes(),
            "product" => config.product_id = String::from(value),
            "sensor_id" => config.sensor_id = count()?,
            "busy_polls" => config.busy_polls = number()?,
            "bootloader" => config.start_in_bootloader = number()? != 0,
            _ => {
                log::warn!("dummy: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod scenarios;
