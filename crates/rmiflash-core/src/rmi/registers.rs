//! F01 and F34 register accessors
//!
//! These registers change under the engine's feet (the device resets, enters
//! and leaves programming mode), so values are always re-read and never
//! cached across an operation.

use core::fmt;

use crate::field::{bit, bits};

/// F01 device status (data register 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus(pub u8);

impl DeviceStatus {
    /// Status code (bits 0-3)
    pub fn status_code(self) -> u8 {
        bits(self.0, 0, 4)
    }

    /// Device is in flash programming (bootloader) mode
    pub fn flash_prog(self) -> bool {
        bit(self.0, 6)
    }

    /// Device has not been configured since reset
    pub fn unconfigured(self) -> bool {
        bit(self.0, 7)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status code {}, {}",
            self.status_code(),
            if self.flash_prog() {
                "flash programming mode"
            } else {
                "operating mode"
            }
        )
    }
}

/// F01 sleep mode: normal operation
pub const SLEEP_MODE_NORMAL: u8 = 0x00;

/// F01 device control (control register 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceControl(pub u8);

impl DeviceControl {
    /// Sleep mode (bits 0-1)
    pub fn sleep_mode(self) -> u8 {
        bits(self.0, 0, 2)
    }

    /// No-sleep override (bit 2)
    pub fn nosleep(self) -> bool {
        bit(self.0, 2)
    }

    /// Force normal sleep mode with the no-sleep bit set
    pub fn keep_awake(self) -> Self {
        Self((self.0 & !0x03) | SLEEP_MODE_NORMAL | (1 << 2))
    }
}

/// F01 command register: soft reset
pub const F01_CMD_RESET: u8 = 0x01;

/// F34 flash control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashControl(pub u8);

impl FlashControl {
    /// Command in progress, zero when idle (bits 0-3)
    pub fn command(self) -> u8 {
        bits(self.0, 0, 4)
    }

    /// Result of the last command, zero on success (bits 4-6)
    pub fn status(self) -> u8 {
        bits(self.0, 4, 3)
    }

    /// Flash programming is enabled (bit 7)
    pub fn program_enabled(self) -> bool {
        bit(self.0, 7)
    }

    /// No command is in progress
    pub fn is_idle(self) -> bool {
        self.command() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_status() {
        let status = DeviceStatus(0x43);
        assert_eq!(status.status_code(), 3);
        assert!(status.flash_prog());
        assert!(!status.unconfigured());
        assert!(DeviceStatus(0x80).unconfigured());
    }

    #[test]
    fn test_keep_awake() {
        let ctrl = DeviceControl(0xF1).keep_awake();
        assert_eq!(ctrl.0, 0xF4);
        assert_eq!(ctrl.sleep_mode(), SLEEP_MODE_NORMAL);
        assert!(ctrl.nosleep());
    }

    #[test]
    fn test_flash_control() {
        let fc = FlashControl(0xB2);
        assert_eq!(fc.command(), 0x2);
        assert_eq!(fc.status(), 0x3);
        assert!(fc.program_enabled());
        assert!(!fc.is_idle());
        assert!(FlashControl(0x80).is_idle());
    }
}
