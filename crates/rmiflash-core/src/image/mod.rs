//! Firmware image parsing
//!
//! An image is a flat buffer: a 0x100 byte header, the firmware payload,
//! then the configuration payload. The header is validated before any
//! payload slice is taken.

mod header;
mod name;

pub use header::{fletcher32, ImageHeader, ProductId, HEADER_LEN, PRODUCT_ID_LEN};
pub(crate) use header::parse_product_id;
pub use name::{vendor_image_name, version_from_name, SensorVendor, DEFAULT_IMAGE_NAME};

use crate::error::Result;
use crate::field::high_first_u32;

/// Parsed view over an image buffer
#[derive(Debug, Clone)]
pub struct FirmwareImage<'a> {
    header: ImageHeader,
    data: &'a [u8],
}

impl<'a> FirmwareImage<'a> {
    /// Parse an image buffer
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = ImageHeader::parse(data)?;
        log::debug!(
            "Image: product {}, firmware {} bytes, config {} bytes, build id {:?}",
            header.product_id,
            header.firmware_size,
            header.config_size,
            header.build_id
        );
        Ok(Self { header, data })
    }

    /// Parsed header
    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Whole image buffer
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Firmware payload, `None` if the image carries no firmware
    pub fn firmware(&self) -> Option<&'a [u8]> {
        let len = self.header.firmware_size as usize;
        if len == 0 {
            return None;
        }
        self.data.get(HEADER_LEN..HEADER_LEN + len)
    }

    /// Configuration payload, `None` if the image carries no configuration
    pub fn config(&self) -> Option<&'a [u8]> {
        let start = HEADER_LEN + self.header.firmware_size as usize;
        let len = self.header.config_size as usize;
        if len == 0 {
            return None;
        }
        self.data.get(start..start + len)
    }

    /// Configuration id (first 4 config bytes, high byte first)
    pub fn config_id(&self) -> Option<u32> {
        high_first_u32(self.config()?, 0)
    }

    /// Sensor partner byte embedded in the configuration
    pub fn vendor_id(&self) -> Option<u8> {
        self.config()?.get(1).copied()
    }

    /// Configuration version (config bytes 2 and 3, high byte first)
    pub fn config_version(&self) -> Option<u16> {
        let config = self.config()?;
        Some(u16::from_be_bytes([*config.get(2)?, *config.get(3)?]))
    }

    /// Check the header checksum against the image contents
    pub fn checksum_valid(&self) -> bool {
        fletcher32(&self.data[4..]) == self.header.checksum
    }
}
