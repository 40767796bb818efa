//! rmiflash-linux-i2c - Linux i2c-dev transport
//!
//! This crate talks to RMI4 touch controllers through the Linux
//! `/dev/i2c-N` character devices.
//!
//! # Overview
//!
//! RMI4 over I2C exposes a paged 16-bit register space. Each transfer
//! addresses one byte within the current page; register 0xFF selects the
//! page. Reads are one `I2C_RDWR` transfer, so the offset write and the
//! data read are joined by a repeated start. Reset is a soft reset through
//! the F01 command register.
//!
//! # Example
//!
//! ```no_run
//! use rmiflash_linux_i2c::{LinuxI2c, LinuxI2cConfig};
//! use rmiflash_core::bus::RegisterBus;
//!
//! let config = LinuxI2cConfig::new("/dev/i2c-1").with_address(0x20);
//! let mut dev = LinuxI2c::open(&config)?;
//!
//! // Read the PDT properties register
//! let mut props = [0u8; 1];
//! dev.read(0x00EF, &mut props)?;
//! println!("PDT properties: 0x{:02X}", props[0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with rmiflash CLI
//!
//! ```bash
//! rmiflash info -p linux_i2c:dev=/dev/i2c-1,addr=0x20
//! rmiflash update -p linux_i2c:dev=/dev/i2c-1 --image PR1116007_00000002.img
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with `CONFIG_I2C_CHARDEV`
//! - No kernel touch driver bound to the controller, or I2C_SLAVE fails
//!   with EBUSY

pub mod device;
pub mod error;

// Re-exports
pub use device::{parse_options, LinuxI2c, LinuxI2cConfig};
pub use error::{LinuxI2cError, Result};

/// Open a Linux I2C device and return a boxed TouchDevice
///
/// # Example Options
///
/// - `dev=/dev/i2c-1` - Required: device path
/// - `addr=0x20` - Optional: 7-bit slave address (default: 0x20)
/// - `reset_delay=100` - Optional: wait after reset in ms (default: 100)
pub fn open_linux_i2c(
    options: &[(&str, &str)],
) -> std::result::Result<Box<dyn rmiflash_core::bus::TouchDevice + Send>, Box<dyn std::error::Error>>
{
    let config = parse_options(options)?;
    let dev = LinuxI2c::open(&config)?;
    Ok(Box::new(dev))
}
