//! Error types for rmiflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

use crate::flash::ConfigArea;

/// Details about a register map discovery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    /// F01 (device control) was not listed in the PDT
    MissingF01,
    /// F34 (flash memory management) was not listed in the PDT
    MissingF34,
    /// Neither F01 nor F34 was listed in the PDT
    MissingBoth,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Bus errors
    /// Register read or write failed on the bus
    Transport,

    // Image errors
    /// Image size fields are inconsistent with the buffer length
    MalformedImage,
    /// No image has been staged or provided
    NoImage,
    /// The image store has no image with the requested name
    ImageNotFound,

    // Device errors
    /// Required RMI functions were not found in the PDT
    Discovery(DiscoveryFailure),
    /// Device never reported programming mode after the enable sequence
    ModeEntryFailed,
    /// Polling for command completion exceeded its bound
    Timeout,
    /// A block command completed with a non-zero flash status
    BlockProgrammingFailed {
        /// Zero-based index of the failing block
        block: u16,
        /// Flash status field reported by the device
        status: u8,
    },
    /// An erase command completed with a non-zero flash status
    EraseFailed {
        /// Flash status field reported by the device
        status: u8,
    },
    /// The configuration area is not present on this device
    CapabilityUnsupported(ConfigArea),
    /// The device uses a reflash scheme this crate does not support
    Unsupported,

    // Decision errors
    /// No firmware version could be derived from the image
    NoVersionToken,
    /// Image and device belong to different sensor partners
    VendorMismatch {
        /// Partner id embedded in the image configuration
        image: u8,
        /// Partner id reported by the device
        device: u8,
    },

    // Session errors
    /// Buffer allocation failed
    AllocationFailed,
    /// Streamed image data would overrun the staged buffer
    StagingOverflow,
    /// Provided buffer is too small for the operation
    BufferTooSmall,
    /// Argument out of range or malformed
    InvalidArgument,
}

impl fmt::Display for DiscoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingF01 => write!(f, "F01 not found in PDT"),
            Self::MissingF34 => write!(f, "F34 not found in PDT"),
            Self::MissingBoth => write!(f, "F01 and F34 not found in PDT"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "register transfer failed"),
            Self::MalformedImage => write!(f, "malformed firmware image"),
            Self::NoImage => write!(f, "no firmware image available"),
            Self::ImageNotFound => write!(f, "firmware image not found"),
            Self::Discovery(failure) => write!(f, "register map discovery failed: {}", failure),
            Self::ModeEntryFailed => write!(f, "device did not enter flash programming mode"),
            Self::Timeout => write!(f, "timed out waiting for idle status"),
            Self::BlockProgrammingFailed { block, status } => {
                write!(f, "flash block {} failed, status 0x{:02X}", block, status)
            }
            Self::EraseFailed { status } => {
                write!(f, "erase command failed, status 0x{:02X}", status)
            }
            Self::CapabilityUnsupported(area) => {
                write!(f, "{} area not supported by device", area)
            }
            Self::Unsupported => write!(f, "reflash not supported for this device"),
            Self::NoVersionToken => write!(f, "no valid PR number found in image name"),
            Self::VendorMismatch { image, device } => write!(
                f,
                "sensor partner mismatch: image 0x{:02X}, device 0x{:02X}",
                image, device
            ),
            Self::AllocationFailed => write!(f, "failed to allocate image buffer"),
            Self::StagingOverflow => write!(f, "image data exceeds staged image size"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
