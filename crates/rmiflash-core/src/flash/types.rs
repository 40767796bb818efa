//! Flash area, command and timing types

use core::fmt;

use crate::error::Error;

/// Configuration area selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum ConfigArea {
    /// UI configuration
    #[default]
    Ui = 0,
    /// Permanent configuration (never erased)
    Permanent = 1,
    /// Bootloader configuration
    Bootloader = 2,
    /// Display configuration
    Display = 3,
}

impl ConfigArea {
    /// All areas in register order
    pub const ALL: [ConfigArea; 4] = [Self::Ui, Self::Permanent, Self::Bootloader, Self::Display];

    /// Erase command for this area, `None` for the permanent area
    pub fn erase_command(self) -> Option<FlashCommand> {
        match self {
            Self::Ui => Some(FlashCommand::EraseUiConfig),
            Self::Permanent => None,
            Self::Bootloader => Some(FlashCommand::EraseBootloaderConfig),
            Self::Display => Some(FlashCommand::EraseDisplayConfig),
        }
    }

    /// Parse an area from its lowercase name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ui" => Some(Self::Ui),
            "permanent" | "perm" => Some(Self::Permanent),
            "bootloader" | "bl" => Some(Self::Bootloader),
            "display" | "disp" => Some(Self::Display),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ConfigArea {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::Ui),
            1 => Ok(Self::Permanent),
            2 => Ok(Self::Bootloader),
            3 => Ok(Self::Display),
            _ => Err(Error::InvalidArgument),
        }
    }
}

impl fmt::Display for ConfigArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ui => write!(f, "UI config"),
            Self::Permanent => write!(f, "permanent config"),
            Self::Bootloader => write!(f, "bootloader config"),
            Self::Display => write!(f, "display config"),
        }
    }
}

/// F34 flash commands (low nibble of the flash control register)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlashCommand {
    /// Program one firmware block
    WriteFirmwareBlock = 0x02,
    /// Erase firmware and UI configuration
    EraseAll = 0x03,
    /// Read one configuration block
    ReadConfigBlock = 0x05,
    /// Program one configuration block
    WriteConfigBlock = 0x06,
    /// Erase the UI configuration area
    EraseUiConfig = 0x07,
    /// Latch the sensor id pins
    ReadSensorId = 0x08,
    /// Erase the bootloader configuration area
    EraseBootloaderConfig = 0x09,
    /// Erase the display configuration area
    EraseDisplayConfig = 0x0A,
    /// Enter flash programming mode
    EnableFlashProgramming = 0x0F,
}

impl FlashCommand {
    /// Opcode written to the flash control register
    pub const fn opcode(self) -> u8 {
        self as u8
    }
}

/// Poll interval and timeouts for flash operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(default))]
pub struct Timing {
    /// Delay between flash control polls
    pub poll_interval_us: u32,
    /// Bound for the enable programming command
    pub enable_timeout_ms: u32,
    /// Bound for a single block write or read
    pub block_timeout_ms: u32,
    /// Bound for erase and sensor id commands
    pub erase_timeout_ms: u32,
    /// Settle time after a device reset
    pub reset_settle_ms: u32,
}

impl Timing {
    /// Upper bound for `command`
    pub fn timeout_ms(&self, command: FlashCommand) -> u32 {
        match command {
            FlashCommand::EnableFlashProgramming => self.enable_timeout_ms,
            FlashCommand::WriteFirmwareBlock
            | FlashCommand::WriteConfigBlock
            | FlashCommand::ReadConfigBlock => self.block_timeout_ms,
            FlashCommand::EraseAll
            | FlashCommand::EraseUiConfig
            | FlashCommand::EraseBootloaderConfig
            | FlashCommand::EraseDisplayConfig
            | FlashCommand::ReadSensorId => self.erase_timeout_ms,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval_us: 50,
            enable_timeout_ms: 1000,
            block_timeout_ms: 3000,
            erase_timeout_ms: 5000,
            reset_settle_ms: 500,
        }
    }
}

/// Progress callback for erase and block transfer loops
pub trait FlashProgress {
    /// Called when an erase command is issued
    fn erasing(&mut self, what: &str);

    /// Called before the first block of a transfer
    fn transferring(&mut self, what: &str, total_blocks: usize);

    /// Called after each completed block
    fn block_progress(&mut self, blocks_done: usize);

    /// Called when the transfer is complete
    fn complete(&mut self);
}

/// A no-op progress reporter
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl FlashProgress for NoProgress {
    fn erasing(&mut self, _what: &str) {}
    fn transferring(&mut self, _what: &str, _total_blocks: usize) {}
    fn block_progress(&mut self, _blocks_done: usize) {}
    fn complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_from_u8() {
        assert_eq!(ConfigArea::try_from(2), Ok(ConfigArea::Bootloader));
        assert_eq!(ConfigArea::try_from(4), Err(Error::InvalidArgument));
        for area in ConfigArea::ALL {
            assert_eq!(ConfigArea::try_from(area as u8), Ok(area));
        }
    }

    #[test]
    fn test_erase_commands() {
        assert_eq!(ConfigArea::Ui.erase_command(), Some(FlashCommand::EraseUiConfig));
        assert_eq!(ConfigArea::Permanent.erase_command(), None);
        assert_eq!(
            ConfigArea::Display.erase_command().map(FlashCommand::opcode),
            Some(0x0A)
        );
    }

    #[test]
    fn test_default_timing() {
        let timing = Timing::default();
        assert_eq!(timing.timeout_ms(FlashCommand::EnableFlashProgramming), 1000);
        assert_eq!(timing.timeout_ms(FlashCommand::ReadConfigBlock), 3000);
        assert_eq!(timing.timeout_ms(FlashCommand::ReadSensorId), 5000);
        assert_eq!(timing.poll_interval_us, 50);
    }
}
