//! F34 query registers

use maybe_async::maybe_async;

use bitflags::bitflags;

use crate::bus::RegisterBus;
use crate::error::Result;
use crate::field::low_first_u16;
use crate::flash::ConfigArea;

use super::pdt::FunctionDescriptor;

const BOOTLOADER_ID_OFFSET: u16 = 0;
const FLASH_PROPERTIES_OFFSET: u16 = 2;
const BLOCK_SIZE_OFFSET: u16 = 3;
const BLOCK_COUNT_OFFSET: u16 = 5;

/// Offset of the block number register from the F34 data base
pub const BLOCK_NUMBER_OFFSET: u16 = 0;
/// Offset of the block data window from the F34 data base
pub const BLOCK_DATA_OFFSET: u16 = 2;

bitflags! {
    /// F34 flash properties
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlashProperties: u8 {
        /// Register map version flag
        const REG_MAP          = 1 << 0;
        /// Flash is unlocked
        const UNLOCKED         = 1 << 1;
        /// Control registers expose a config id
        const HAS_CONFIG_ID    = 1 << 2;
        /// Permanent configuration area present
        const HAS_PERM_CONFIG  = 1 << 3;
        /// Bootloader configuration area present
        const HAS_BL_CONFIG    = 1 << 4;
        /// Display configuration area present
        const HAS_DISP_CONFIG  = 1 << 5;
        /// Second control register present
        const HAS_CTRL1        = 1 << 6;
    }
}

/// F34 query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashQuery {
    /// Bootloader id, written back to unlock flash commands
    pub bootloader_id: [u8; 2],
    /// Capability bits
    pub properties: FlashProperties,
    /// Bytes per flash block
    pub block_size: u16,
    /// Firmware block count
    pub firmware_blocks: u16,
    /// UI configuration block count
    pub ui_config_blocks: u16,
    /// Permanent configuration block count, when present
    pub perm_config_blocks: Option<u16>,
    /// Bootloader configuration block count, when present
    pub bl_config_blocks: Option<u16>,
    /// Display configuration block count, when present
    pub disp_config_blocks: Option<u16>,
}

impl FlashQuery {
    /// Number of block count bytes to read for the given properties
    pub fn block_count_len(properties: FlashProperties) -> usize {
        let optional = [
            FlashProperties::HAS_PERM_CONFIG,
            FlashProperties::HAS_BL_CONFIG,
            FlashProperties::HAS_DISP_CONFIG,
        ];
        4 + 2 * optional.iter().filter(|&&f| properties.contains(f)).count()
    }

    /// Build a query from raw register contents
    ///
    /// `counts` must hold [`Self::block_count_len`] bytes: firmware and UI
    /// config counts, then one count per present optional area in the order
    /// permanent, bootloader, display.
    pub fn from_raw(
        bootloader_id: [u8; 2],
        properties: u8,
        block_size: u16,
        counts: &[u8],
    ) -> Option<Self> {
        let properties = FlashProperties::from_bits_retain(properties);
        let mut offset = 4;
        let mut next = |present: bool| -> Option<Option<u16>> {
            if !present {
                return Some(None);
            }
            let value = low_first_u16(counts, offset)?;
            offset += 2;
            Some(Some(value))
        };

        let perm_config_blocks = next(properties.contains(FlashProperties::HAS_PERM_CONFIG))?;
        let bl_config_blocks = next(properties.contains(FlashProperties::HAS_BL_CONFIG))?;
        let disp_config_blocks = next(properties.contains(FlashProperties::HAS_DISP_CONFIG))?;

        Some(Self {
            bootloader_id,
            properties,
            block_size,
            firmware_blocks: low_first_u16(counts, 0)?,
            ui_config_blocks: low_first_u16(counts, 2)?,
            perm_config_blocks,
            bl_config_blocks,
            disp_config_blocks,
        })
    }

    /// Block count for a configuration area, `None` if the area is absent
    pub fn block_count(&self, area: ConfigArea) -> Option<u16> {
        match area {
            ConfigArea::Ui => Some(self.ui_config_blocks),
            ConfigArea::Permanent => self.perm_config_blocks,
            ConfigArea::Bootloader => self.bl_config_blocks,
            ConfigArea::Display => self.disp_config_blocks,
        }
    }
}

/// Read the F34 query registers
#[maybe_async]
pub async fn read_flash_query<B: RegisterBus + ?Sized>(
    bus: &mut B,
    f34: &FunctionDescriptor,
) -> Result<FlashQuery> {
    let mut bootloader_id = [0u8; 2];
    bus.read(f34.query_base + BOOTLOADER_ID_OFFSET, &mut bootloader_id)
        .await?;

    let mut properties = [0u8; 1];
    bus.read(f34.query_base + FLASH_PROPERTIES_OFFSET, &mut properties)
        .await?;
    let flags = FlashProperties::from_bits_retain(properties[0]);
    log::debug!(
        "Flash properties: perm {}, bl {}, display {}",
        flags.contains(FlashProperties::HAS_PERM_CONFIG),
        flags.contains(FlashProperties::HAS_BL_CONFIG),
        flags.contains(FlashProperties::HAS_DISP_CONFIG)
    );

    let mut block_size = [0u8; 2];
    bus.read(f34.query_base + BLOCK_SIZE_OFFSET, &mut block_size)
        .await?;

    let mut counts = [0u8; 10];
    let len = FlashQuery::block_count_len(flags);
    bus.read(f34.query_base + BLOCK_COUNT_OFFSET, &mut counts[..len])
        .await?;

    let query = FlashQuery::from_raw(
        bootloader_id,
        properties[0],
        u16::from_le_bytes(block_size),
        &counts[..len],
    )
    .ok_or(crate::error::Error::Transport)?;

    log::debug!(
        "Block size {}, firmware blocks {}, config blocks {}",
        query.block_size,
        query.firmware_blocks,
        query.ui_config_blocks
    );
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_count_len() {
        assert_eq!(FlashQuery::block_count_len(FlashProperties::empty()), 4);
        assert_eq!(
            FlashQuery::block_count_len(FlashProperties::HAS_BL_CONFIG),
            6
        );
        assert_eq!(
            FlashQuery::block_count_len(FlashProperties::from_bits_retain(0x38)),
            10
        );
    }

    #[test]
    fn test_optional_counts_follow_capabilities() {
        // perm and display present, bootloader absent
        let props = (FlashProperties::HAS_PERM_CONFIG | FlashProperties::HAS_DISP_CONFIG).bits();
        let counts = [0x10, 0x01, 0x08, 0x00, 0x02, 0x00, 0x03, 0x00];
        let query = FlashQuery::from_raw([0x31, 0x32], props, 16, &counts).unwrap();
        assert_eq!(query.firmware_blocks, 0x0110);
        assert_eq!(query.ui_config_blocks, 8);
        assert_eq!(query.perm_config_blocks, Some(2));
        assert_eq!(query.bl_config_blocks, None);
        assert_eq!(query.disp_config_blocks, Some(3));
        assert_eq!(query.block_count(ConfigArea::Bootloader), None);
        assert_eq!(query.block_count(ConfigArea::Display), Some(3));
    }

    #[test]
    fn test_all_capability_values() {
        let counts = [1, 0, 2, 0, 3, 0, 4, 0, 5, 0];
        for props in 0..=u8::MAX {
            let flags = FlashProperties::from_bits_retain(props);
            let len = FlashQuery::block_count_len(flags);
            let query = FlashQuery::from_raw([0, 0], props, 16, &counts[..len]).unwrap();

            let mut expected = 3u16;
            let mut take = |present: bool| {
                if present {
                    let value = expected;
                    expected += 1;
                    Some(value)
                } else {
                    None
                }
            };
            assert_eq!(
                query.perm_config_blocks,
                take(flags.contains(FlashProperties::HAS_PERM_CONFIG))
            );
            assert_eq!(
                query.bl_config_blocks,
                take(flags.contains(FlashProperties::HAS_BL_CONFIG))
            );
            assert_eq!(
                query.disp_config_blocks,
                take(flags.contains(FlashProperties::HAS_DISP_CONFIG))
            );
        }
    }

    #[test]
    fn test_short_counts() {
        let props = FlashProperties::HAS_PERM_CONFIG.bits();
        assert!(FlashQuery::from_raw([0, 0], props, 16, &[1, 0, 2, 0]).is_none());
    }
}
