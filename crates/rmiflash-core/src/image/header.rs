//! Firmware image header

use crate::error::{Error, Result};
use crate::field::{bit, low_first_u32};

/// Length of the fixed image header; the firmware payload starts here
pub const HEADER_LEN: usize = 0x100;

const CHECKSUM_OFFSET: usize = 0x00;
const OPTIONS_OFFSET: usize = 0x06;
const BOOTLOADER_VERSION_OFFSET: usize = 0x07;
const FIRMWARE_SIZE_OFFSET: usize = 0x08;
const CONFIG_SIZE_OFFSET: usize = 0x0C;
const PRODUCT_ID_OFFSET: usize = 0x10;
const PRODUCT_INFO_OFFSET: usize = 0x1E;
const BUILD_ID_OFFSET: usize = 0x50;

/// Options byte: build id field is valid
const OPTION_BUILD_ID: u8 = 0;
/// Options byte: image carries a bootloader
const OPTION_BOOTLOADER: u8 = 1;

/// Length of the product id string
pub const PRODUCT_ID_LEN: usize = 10;

/// Product id string type (NUL padding trimmed)
pub type ProductId = heapless::String<PRODUCT_ID_LEN>;

/// Parsed image header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    /// Fletcher-32 checksum over the image after this field
    pub checksum: u32,
    /// Image contains a bootloader (parsed, not acted upon)
    pub contains_bootloader: bool,
    /// Bootloader version the image targets
    pub bootloader_version: u8,
    /// Size of the firmware payload in bytes
    pub firmware_size: u32,
    /// Size of the configuration payload in bytes
    pub config_size: u32,
    /// Product id string
    pub product_id: ProductId,
    /// Product info bytes
    pub product_info: [u8; 2],
    /// Embedded build id, present only when the options byte flags it
    pub build_id: Option<u32>,
}

impl ImageHeader {
    /// Parse the header and validate the payload sizes against `data`
    ///
    /// Fails with [`Error::MalformedImage`] if the buffer is shorter than
    /// the fixed header or the declared payloads do not fit.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::MalformedImage);
        }

        let word = |offset| low_first_u32(data, offset).ok_or(Error::MalformedImage);

        let firmware_size = word(FIRMWARE_SIZE_OFFSET)?;
        let config_size = word(CONFIG_SIZE_OFFSET)?;

        let total = HEADER_LEN
            .checked_add(firmware_size as usize)
            .and_then(|n| n.checked_add(config_size as usize))
            .ok_or(Error::MalformedImage)?;
        if total > data.len() {
            log::debug!(
                "Image sizes exceed buffer: firmware {} + config {} > {}",
                firmware_size,
                config_size,
                data.len()
            );
            return Err(Error::MalformedImage);
        }

        let options = data[OPTIONS_OFFSET];
        let build_id = if bit(options, OPTION_BUILD_ID) {
            // Low byte first, as written by the image tools
            Some(word(BUILD_ID_OFFSET)?)
        } else {
            None
        };

        Ok(Self {
            checksum: word(CHECKSUM_OFFSET)?,
            contains_bootloader: bit(options, OPTION_BOOTLOADER),
            bootloader_version: data[BOOTLOADER_VERSION_OFFSET],
            firmware_size,
            config_size,
            product_id: parse_product_id(
                &data[PRODUCT_ID_OFFSET..PRODUCT_ID_OFFSET + PRODUCT_ID_LEN],
            ),
            product_info: [data[PRODUCT_INFO_OFFSET], data[PRODUCT_INFO_OFFSET + 1]],
            build_id,
        })
    }
}

/// Decode a NUL padded product id, replacing non-ASCII bytes
pub(crate) fn parse_product_id(bytes: &[u8]) -> ProductId {
    let mut id = ProductId::new();
    for &b in bytes
        .iter()
        .take(PRODUCT_ID_LEN)
        .take_while(|&&b| b != 0)
    {
        let c = if b.is_ascii_graphic() || b == b' ' {
            b as char
        } else {
            '?'
        };
        // Input is capped at the capacity above
        id.push(c).ok();
    }
    id
}

/// Fletcher-32 over little-endian 16-bit words, as stored in the header
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut lsw: u32 = 0xFFFF;
    let mut msw: u32 = 0xFFFF;
    for pair in data.chunks_exact(2) {
        lsw += u16::from_le_bytes([pair[0], pair[1]]) as u32;
        msw += lsw;
        lsw = (lsw & 0xFFFF) + (lsw >> 16);
        msw = (msw & 0xFFFF) + (msw >> 16);
    }
    (msw << 16) | lsw
}
