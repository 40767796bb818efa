//! Page description table scanning
//!
//! The PDT lists the RMI functions a device exposes, one 6-byte record per
//! function, starting at 0x00E9 and growing downward. A record with function
//! number zero terminates the table.

use maybe_async::maybe_async;

use crate::bus::RegisterBus;
use crate::error::{DiscoveryFailure, Error, Result};
use crate::field::{bit, bits};

/// Address of the first (highest) PDT record
pub const PDT_START: u16 = 0x00E9;
/// The scan stops once the address drops to this value
pub const PDT_END: u16 = 0x000A;
/// Size of one PDT record
pub const PDT_ENTRY_SIZE: u16 = 6;
/// PDT properties register
pub const PDT_PROPS: u16 = 0x00EF;

/// PDT properties: device uses the bootloader-side reflash scheme
const PDT_PROPS_HAS_BSR: u8 = 6;

/// Device control function
pub const F01: u8 = 0x01;
/// Flash memory management function
pub const F34: u8 = 0x34;

/// One PDT record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionDescriptor {
    /// Query register base
    pub query_base: u16,
    /// Command register base
    pub command_base: u16,
    /// Control register base
    pub control_base: u16,
    /// Data register base
    pub data_base: u16,
    /// Number of interrupt sources (0-7)
    pub interrupt_sources: u8,
    /// Function version
    pub version: u8,
    /// Function number (0x01, 0x11, 0x34, ...)
    pub number: u8,
}

impl FunctionDescriptor {
    /// Decode a raw 6-byte PDT record
    pub fn from_bytes(raw: &[u8; 6]) -> Self {
        Self {
            query_base: raw[0] as u16,
            command_base: raw[1] as u16,
            control_base: raw[2] as u16,
            data_base: raw[3] as u16,
            interrupt_sources: bits(raw[4], 0, 3),
            version: bits(raw[4], 5, 2),
            number: raw[5],
        }
    }
}

/// Result of a successful PDT scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdtScan {
    /// Device control function
    pub f01: FunctionDescriptor,
    /// Flash memory management function
    pub f34: FunctionDescriptor,
    /// Interrupt status bits owned by F34
    pub interrupt_mask: u8,
}

impl PdtScan {
    /// F01 interrupt status register
    pub fn interrupt_status_addr(&self) -> u16 {
        self.f01.data_base + 1
    }
}

/// Compute the interrupt mask for a function whose sources start at `first`
pub fn interrupt_mask(first: u8, sources: u8) -> u8 {
    let offset = first % 8;
    (offset..offset + (sources & 0x07))
        .filter(|&bit| bit < 8)
        .fold(0u8, |mask, bit| mask | (1 << bit))
}

/// Check the PDT properties for an unsupported reflash scheme
///
/// A failed read is treated as no properties set.
#[maybe_async]
pub async fn check_pdt_props<B: RegisterBus + ?Sized>(bus: &mut B) -> Result<()> {
    let mut props = [0u8; 1];
    if bus.read(PDT_PROPS, &mut props).await.is_err() {
        log::debug!("Failed to read PDT properties, assuming 0x00");
        props[0] = 0;
    }
    if bit(props[0], PDT_PROPS_HAS_BSR) {
        log::error!("Reflash for LTS devices is not currently supported");
        return Err(Error::Unsupported);
    }
    Ok(())
}

/// Scan the PDT for F01 and F34
///
/// On success the F01 interrupt status register is read once to clear any
/// pending interrupt.
#[maybe_async]
pub async fn scan<B: RegisterBus + ?Sized>(bus: &mut B) -> Result<PdtScan> {
    log::debug!("Scanning PDT");

    let mut f01 = None;
    let mut f34 = None;
    let mut interrupt_count: u8 = 0;
    let mut f34_mask = 0u8;

    let mut addr = PDT_START;
    while addr > PDT_END {
        let mut raw = [0u8; 6];
        bus.read(addr, &mut raw).await?;
        let fd = FunctionDescriptor::from_bytes(&raw);
        if fd.number == 0 {
            break;
        }

        log::trace!("Found F{:02X} at 0x{:04X}", fd.number, addr);
        match fd.number {
            F01 => f01 = Some(fd),
            F34 => {
                f34_mask = interrupt_mask(interrupt_count, fd.interrupt_sources);
                f34 = Some(fd);
            }
            _ => {}
        }

        interrupt_count = interrupt_count.wrapping_add(fd.interrupt_sources);
        addr -= PDT_ENTRY_SIZE;
    }

    let scan = match (f01, f34) {
        (Some(f01), Some(f34)) => PdtScan {
            f01,
            f34,
            interrupt_mask: f34_mask,
        },
        (None, Some(_)) => return Err(Error::Discovery(DiscoveryFailure::MissingF01)),
        (Some(_), None) => return Err(Error::Discovery(DiscoveryFailure::MissingF34)),
        (None, None) => return Err(Error::Discovery(DiscoveryFailure::MissingBoth)),
    };

    let mut status = [0u8; 1];
    bus.read(scan.interrupt_status_addr(), &mut status).await?;

    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_bytes() {
        let fd = FunctionDescriptor::from_bytes(&[0x50, 0x00, 0x4C, 0x60, 0x41, 0x34]);
        assert_eq!(fd.query_base, 0x50);
        assert_eq!(fd.control_base, 0x4C);
        assert_eq!(fd.data_base, 0x60);
        assert_eq!(fd.interrupt_sources, 1);
        assert_eq!(fd.version, 2);
        assert_eq!(fd.number, F34);
    }

    #[test]
    fn test_interrupt_mask() {
        assert_eq!(interrupt_mask(0, 1), 0x01);
        assert_eq!(interrupt_mask(1, 1), 0x02);
        assert_eq!(interrupt_mask(2, 3), 0x1C);
        assert_eq!(interrupt_mask(9, 2), 0x06);
        assert_eq!(interrupt_mask(7, 2), 0x80);
        assert_eq!(interrupt_mask(3, 0), 0x00);
    }
}
