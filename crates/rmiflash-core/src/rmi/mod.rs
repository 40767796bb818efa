//! RMI4 register map discovery
//!
//! Discovery has two steps: a PDT scan that locates F01 and F34, and an F34
//! query that reads the flash geometry. Both are repeated after the device
//! enters programming mode, since the bootloader exposes a different layout.

pub mod pdt;
pub mod query;
pub mod registers;

pub use pdt::{FunctionDescriptor, PdtScan};
pub use query::{FlashProperties, FlashQuery};
pub use registers::{DeviceControl, DeviceStatus, FlashControl, F01_CMD_RESET};

use maybe_async::maybe_async;

use crate::bus::RegisterBus;
use crate::error::Result;
use crate::field::{high_first_u32, low_first_u32};
use crate::image::{ProductId, PRODUCT_ID_LEN};

/// F01 query offset of the product info bytes
const F01_PRODUCT_INFO_OFFSET: u16 = 2;
/// F01 query offset of the product id string
const F01_PRODUCT_ID_OFFSET: u16 = 11;
/// F01 query offset of the firmware build id
const F01_FIRMWARE_ID_OFFSET: u16 = 18;

/// Resolved register addresses and flash geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    /// Device control function
    pub f01: FunctionDescriptor,
    /// Flash memory management function
    pub f34: FunctionDescriptor,
    /// Interrupt status bits owned by F34
    pub interrupt_mask: u8,
    /// F34 query results
    pub flash: FlashQuery,
}

impl RegisterMap {
    /// Combine a PDT scan with an F34 query
    pub fn new(scan: PdtScan, flash: FlashQuery) -> Self {
        Self {
            f01: scan.f01,
            f34: scan.f34,
            interrupt_mask: scan.interrupt_mask,
            flash,
        }
    }

    /// F01 interrupt status register
    pub fn interrupt_status_addr(&self) -> u16 {
        self.f01.data_base + 1
    }

    /// F34 block number register
    pub fn block_number_addr(&self) -> u16 {
        self.f34.data_base + query::BLOCK_NUMBER_OFFSET
    }

    /// F34 block data window
    pub fn block_data_addr(&self) -> u16 {
        self.f34.data_base + query::BLOCK_DATA_OFFSET
    }

    /// F34 flash control register, directly after one block of data window
    pub fn flash_control_addr(&self) -> u16 {
        self.block_data_addr() + self.flash.block_size
    }

    /// Replace the function descriptors after a rescan
    pub fn update_scan(&mut self, scan: PdtScan) {
        self.f01 = scan.f01;
        self.f34 = scan.f34;
        self.interrupt_mask = scan.interrupt_mask;
    }
}

/// Check PDT properties, scan the PDT and query F34
#[maybe_async]
pub async fn discover<B: RegisterBus + ?Sized>(bus: &mut B) -> Result<RegisterMap> {
    pdt::check_pdt_props(bus).await?;
    let scan = pdt::scan(bus).await?;
    let flash = query::read_flash_query(bus, &scan.f34).await?;
    Ok(RegisterMap::new(scan, flash))
}

/// Read the F01 device status register
#[maybe_async]
pub async fn read_device_status<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
) -> Result<DeviceStatus> {
    let mut buf = [0u8; 1];
    bus.read(map.f01.data_base, &mut buf).await?;
    Ok(DeviceStatus(buf[0]))
}

/// Read the F34 flash control register
#[maybe_async]
pub async fn read_flash_control<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
) -> Result<FlashControl> {
    let mut buf = [0u8; 1];
    bus.read(map.flash_control_addr(), &mut buf).await?;
    Ok(FlashControl(buf[0]))
}

/// Read the device firmware id
///
/// Four bytes assembled low byte first with the top byte forced to zero.
#[maybe_async]
pub async fn read_firmware_id<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
) -> Result<u32> {
    let mut buf = [0u8; 4];
    bus.read(map.f01.query_base + F01_FIRMWARE_ID_OFFSET, &mut buf)
        .await?;
    buf[3] = 0;
    Ok(low_first_u32(&buf, 0).unwrap_or_default())
}

/// Read the raw 4-byte device config id from the F34 control registers
#[maybe_async]
pub async fn read_config_id_bytes<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
) -> Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    bus.read(map.f34.control_base, &mut buf).await?;
    Ok(buf)
}

/// Read the device config id (high byte first)
#[maybe_async]
pub async fn read_config_id<B: RegisterBus + ?Sized>(bus: &mut B, map: &RegisterMap) -> Result<u32> {
    let buf = read_config_id_bytes(bus, map).await?;
    Ok(high_first_u32(&buf, 0).unwrap_or_default())
}

/// Identification read from F01 queries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductInfo {
    /// Product id string
    pub product_id: ProductId,
    /// Product info bytes
    pub product_info: [u8; 2],
}

/// Read the F01 product id and product info
#[maybe_async]
pub async fn read_product_info<B: RegisterBus + ?Sized>(
    bus: &mut B,
    map: &RegisterMap,
) -> Result<ProductInfo> {
    let mut info = [0u8; 2];
    bus.read(map.f01.query_base + F01_PRODUCT_INFO_OFFSET, &mut info)
        .await?;
    let mut id = [0u8; PRODUCT_ID_LEN];
    bus.read(map.f01.query_base + F01_PRODUCT_ID_OFFSET, &mut id)
        .await?;
    Ok(ProductInfo {
        product_id: crate::image::parse_product_id(&id),
        product_info: info,
    })
}
