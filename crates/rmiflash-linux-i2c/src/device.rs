//! Linux I2C device implementation
//!
//! This module provides the `LinuxI2c` struct that implements `RegisterBus`
//! and `DeviceReset` over the `/dev/i2c-N` character device.

use crate::error::{LinuxI2cError, Result};

use rmiflash_core::bus::{DeviceReset, RegisterBus};
use rmiflash_core::error::{Error as CoreError, Result as CoreResult};
use rmiflash_core::rmi::pdt::{FunctionDescriptor, F01, PDT_END, PDT_ENTRY_SIZE, PDT_START};
use rmiflash_core::rmi::F01_CMD_RESET;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Default 7-bit slave address of RMI4 controllers
const DEFAULT_ADDRESS: u16 = 0x20;

/// Default time the controller needs to come back after a soft reset
const DEFAULT_RESET_DELAY_MS: u32 = 100;

/// Page select register, present on every page
const PAGE_SELECT_REGISTER: u8 = 0xFF;

/// Largest write payload sent in one transfer
const MAX_WRITE_LEN: usize = 256;

/// Linux i2c-dev ioctl constants
mod ioctl {
    use nix::{ioctl_write_int_bad, ioctl_write_ptr_bad};

    /// Bind the file descriptor to a slave address
    const I2C_SLAVE: u16 = 0x0703;
    /// Combined transfer with repeated start between messages
    const I2C_RDWR: u16 = 0x0707;

    ioctl_write_int_bad!(i2c_slave, I2C_SLAVE);
    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, super::I2cRdwrData);
}

/// Message flag: read from the slave
const I2C_M_RD: u16 = 0x0001;

/// One message of a combined transfer
/// This must match the kernel's struct i2c_msg layout
#[repr(C)]
#[derive(Debug)]
struct I2cMsg {
    addr: u16,    // __u16 addr
    flags: u16,   // __u16 flags
    len: u16,     // __u16 len
    buf: *mut u8, // __u8 *buf
}

/// Argument of I2C_RDWR
/// This must match the kernel's struct i2c_rdwr_ioctl_data layout
#[repr(C)]
#[derive(Debug)]
struct I2cRdwrData {
    msgs: *mut I2cMsg, // struct i2c_msg *msgs
    nmsgs: u32,        // __u32 nmsgs
}

/// Build the register-offset write and data read of a register read
fn read_messages(address: u16, offset: &mut [u8; 1], buf: &mut [u8]) -> Result<[I2cMsg; 2]> {
    let len = u16::try_from(buf.len()).map_err(|_| {
        LinuxI2cError::InvalidParameter(format!("read of {} bytes is too long", buf.len()))
    })?;
    Ok([
        I2cMsg {
            addr: address,
            flags: 0,
            len: 1,
            buf: offset.as_mut_ptr(),
        },
        I2cMsg {
            addr: address,
            flags: I2C_M_RD,
            len,
            buf: buf.as_mut_ptr(),
        },
    ])
}

/// Configuration for opening a Linux I2C device
#[derive(Debug, Clone)]
pub struct LinuxI2cConfig {
    /// Device path (e.g., "/dev/i2c-1")
    pub device: String,
    /// 7-bit slave address (default: 0x20)
    pub address: u16,
    /// Wait after a soft reset in milliseconds (default: 100)
    pub reset_delay_ms: u32,
}

impl Default for LinuxI2cConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            address: DEFAULT_ADDRESS,
            reset_delay_ms: DEFAULT_RESET_DELAY_MS,
        }
    }
}

impl LinuxI2cConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the slave address
    pub fn with_address(mut self, address: u16) -> Self {
        self.address = address;
        self
    }

    /// Set the post-reset wait
    pub fn with_reset_delay(mut self, ms: u32) -> Self {
        self.reset_delay_ms = ms;
        self
    }
}

/// RMI4 controller on a Linux I2C bus
///
/// Register addresses are 16 bits wide; the high byte is the page, selected
/// through register 0xFF before the first access to a new page.
pub struct LinuxI2c {
    file: File,
    address: u16,
    reset_delay_ms: u32,
    page: Option<u8>,
}

impl LinuxI2c {
    /// Open a Linux I2C device with the given configuration
    pub fn open(config: &LinuxI2cConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxI2cError::NoDevice);
        }

        log::debug!("linux_i2c: Opening device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| LinuxI2cError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        unsafe {
            ioctl::i2c_slave(file.as_raw_fd(), config.address as libc::c_int).map_err(|e| {
                LinuxI2cError::SetAddressFailed {
                    addr: config.address,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        log::info!(
            "linux_i2c: Opened {} (address 0x{:02X})",
            config.device,
            config.address
        );

        Ok(Self {
            file,
            address: config.address,
            reset_delay_ms: config.reset_delay_ms,
            page: None,
        })
    }

    /// Slave address this handle is bound to
    pub fn address(&self) -> u16 {
        self.address
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let done = self
            .file
            .write(data)
            .map_err(LinuxI2cError::TransferFailed)?;
        if done != data.len() {
            return Err(LinuxI2cError::ShortTransfer {
                done,
                expected: data.len(),
            });
        }
        Ok(())
    }

    fn select_page(&mut self, addr: u16) -> Result<()> {
        let page = (addr >> 8) as u8;
        if self.page == Some(page) {
            return Ok(());
        }
        log::trace!("linux_i2c: Select page {}", page);
        if let Err(e) = self.send(&[PAGE_SELECT_REGISTER, page]) {
            self.page = None;
            return Err(e);
        }
        self.page = Some(page);
        Ok(())
    }

    fn read_registers(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        self.select_page(addr)?;
        let mut offset = [addr as u8];
        let mut msgs = read_messages(self.address, &mut offset, buf)?;
        let data = I2cRdwrData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };

        // Write the offset and read back without releasing the bus
        let done = unsafe { ioctl::i2c_rdwr(self.file.as_raw_fd(), &data) }.map_err(|e| {
            LinuxI2cError::TransferFailed(std::io::Error::from_raw_os_error(e as i32))
        })?;
        if done as usize != msgs.len() {
            return Err(LinuxI2cError::IncompleteMessages {
                done: done.max(0) as usize,
                expected: msgs.len(),
            });
        }
        Ok(())
    }

    fn write_registers(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        if data.len() > MAX_WRITE_LEN {
            return Err(LinuxI2cError::InvalidParameter(format!(
                "write of {} bytes exceeds {}",
                data.len(),
                MAX_WRITE_LEN
            )));
        }
        self.select_page(addr)?;
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(addr as u8);
        buf.extend_from_slice(data);
        self.send(&buf)
    }

    /// Walk the PDT for the F01 command register
    fn find_reset_register(&mut self) -> Result<u16> {
        let mut addr = PDT_START;
        while addr > PDT_END {
            let mut raw = [0u8; 6];
            self.read_registers(addr, &mut raw)?;
            let entry = FunctionDescriptor::from_bytes(&raw);
            if entry.number == 0 {
                break;
            }
            if entry.number == F01 {
                return Ok(entry.command_base);
            }
            addr -= PDT_ENTRY_SIZE;
        }
        Err(LinuxI2cError::NoDeviceControl)
    }
}

fn transport_error(e: LinuxI2cError) -> CoreError {
    log::error!("linux_i2c: {}", e);
    CoreError::Transport
}

impl RegisterBus for LinuxI2c {
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> CoreResult<()> {
        self.read_registers(addr, buf).map_err(transport_error)
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> CoreResult<()> {
        self.write_registers(addr, data).map_err(transport_error)
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

impl DeviceReset for LinuxI2c {
    fn reset(&mut self) -> CoreResult<()> {
        let command = self.find_reset_register().map_err(transport_error)?;
        log::debug!("linux_i2c: Soft reset via 0x{:04X}", command);
        self.write_registers(command, &[F01_CMD_RESET])
            .map_err(transport_error)?;

        // The page register is back to zero after reset
        self.page = None;
        std::thread::sleep(Duration::from_millis(self.reset_delay_ms as u64));
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
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxI2cConfig, String> {
    let mut config = LinuxI2cConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "addr" => {
                let addr = parse_number(value)
                    .filter(|&a| a <= 0x7F)
                    .ok_or_else(|| format!("Invalid addr value: {} (must be 0-0x7f)", value))?;
                config.address = addr as u16;
            }
            "reset_delay" => {
                config.reset_delay_ms = parse_number(value)
                    .ok_or_else(|| format!("Invalid reset_delay value: {}", value))?;
            }
            _ => {
                log::warn!("linux_i2c: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        return Err("No device specified. Use dev=/dev/i2c-N".to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "/dev/i2c-3"), ("addr", "0x2c")]).unwrap();
        assert_eq!(config.device, "/dev/i2c-3");
        assert_eq!(config.address, 0x2C);
        assert_eq!(config.reset_delay_ms, DEFAULT_RESET_DELAY_MS);

        let config = parse_options(&[("dev", "/dev/i2c-0"), ("reset_delay", "250")]).unwrap();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert_eq!(config.reset_delay_ms, 250);
    }

    #[test]
    fn test_parse_options_errors() {
        assert!(parse_options(&[]).is_err());
        assert!(parse_options(&[("dev", "/dev/i2c-0"), ("addr", "0x80")]).is_err());
        assert!(parse_options(&[("dev", "/dev/i2c-0"), ("addr", "zz")]).is_err());
    }

    #[test]
    fn test_read_messages() {
        let mut offset = [0x45];
        let mut buf = [0u8; 6];
        let msgs = read_messages(0x2C, &mut offset, &mut buf).unwrap();
        assert_eq!((msgs[0].addr, msgs[0].flags, msgs[0].len), (0x2C, 0, 1));
        assert_eq!((msgs[1].addr, msgs[1].flags, msgs[1].len), (0x2C, I2C_M_RD, 6));
        assert_eq!(msgs[0].buf, offset.as_mut_ptr());
        assert_eq!(msgs[1].buf, buf.as_mut_ptr());

        let mut huge = vec![0u8; 0x1_0000];
        assert!(matches!(
            read_messages(0x2C, &mut offset, &mut huge),
            Err(LinuxI2cError::InvalidParameter(_))
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_message_layout() {
        assert_eq!(std::mem::size_of::<I2cMsg>(), 16);
        assert_eq!(std::mem::size_of::<I2cRdwrData>(), 16);
    }

    #[test]
    fn test_open_missing_device() {
        let config = LinuxI2cConfig::new("/nonexistent/i2c-99");
        assert!(matches!(
            LinuxI2c::open(&config),
            Err(LinuxI2cError::OpenFailed { .. })
        ));
    }
}
