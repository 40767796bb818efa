//! Version comparison and vendor check

use core::fmt;

use crate::error::{Error, Result};
use crate::flash::ConfigArea;
use crate::image::version_from_name;

/// Outcome of the update decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Device is up to date
    NoUpdateNeeded,
    /// Erase and reprogram firmware and UI configuration
    UpdateFirmware,
    /// Reprogram one configuration area
    UpdateConfigArea(ConfigArea),
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoUpdateNeeded => write!(f, "nothing needs to be updated"),
            Self::UpdateFirmware => write!(f, "update UI firmware"),
            Self::UpdateConfigArea(area) => write!(f, "update {}", area),
        }
    }
}

/// Device identifiers the decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device is in programming mode (an earlier update was interrupted)
    Programming,
    /// Device runs its firmware
    Operating {
        /// Firmware id (24 significant bits)
        firmware_id: u32,
        /// Configuration id
        config_id: u32,
    },
}

/// Image identifiers the decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageVersion<'a> {
    /// Build id embedded in the header, preferred over the name
    pub build_id: Option<u32>,
    /// Image name, searched for a `PR<digits>` token
    pub name: Option<&'a str>,
    /// Configuration id from the configuration payload
    pub config_id: Option<u32>,
}

impl ImageVersion<'_> {
    /// Firmware id of the image
    ///
    /// The embedded build id wins; otherwise the `PR` number in the name is
    /// used. Fails with [`Error::NoVersionToken`] if neither is usable.
    pub fn firmware_id(&self) -> Result<u32> {
        if let Some(id) = self.build_id {
            return Ok(id);
        }
        let name = self.name.ok_or(Error::NoVersionToken)?;
        version_from_name(name).inspect_err(|_| {
            log::error!("No valid PR number (PRxxxxxxx) found in image name {}", name);
        })
    }
}

/// Compare the image and device sensor partner bytes
///
/// Skipped when `force` is set.
pub fn vendor_check(force: bool, image_vendor: Option<u8>, device_vendor: u8) -> Result<()> {
    if force {
        return Ok(());
    }
    let image = image_vendor.ok_or(Error::MalformedImage)?;
    log::debug!(
        "Sensor partner id: device 0x{:02X}, image 0x{:02X}",
        device_vendor,
        image
    );
    if image != device_vendor {
        log::warn!("Sensor partner mismatch");
        return Err(Error::VendorMismatch {
            image,
            device: device_vendor,
        });
    }
    Ok(())
}

/// Decide what to update
///
/// Deterministic in its inputs. Equal firmware ids never select a firmware
/// update; only a newer configuration id can trigger a UI config update.
pub fn decide(force: bool, device: &DeviceState, image: &ImageVersion<'_>) -> Result<UpdateDecision> {
    if force {
        return Ok(UpdateDecision::UpdateFirmware);
    }

    let (device_firmware, device_config) = match *device {
        DeviceState::Programming => return Ok(UpdateDecision::UpdateFirmware),
        DeviceState::Operating {
            firmware_id,
            config_id,
        } => (firmware_id, config_id),
    };

    let image_firmware = image.firmware_id()?;
    log::debug!(
        "Device firmware id {}, image firmware id {}",
        device_firmware,
        image_firmware
    );

    if image_firmware > device_firmware {
        return Ok(UpdateDecision::UpdateFirmware);
    }
    if image_firmware < device_firmware {
        log::info!("Image firmware is older than device firmware, skipping");
        return Ok(UpdateDecision::NoUpdateNeeded);
    }

    let image_config = image.config_id.unwrap_or(0);
    log::debug!(
        "Device config id 0x{:08X}, image config id 0x{:08X}",
        device_config,
        image_config
    );
    if image_config > device_config {
        return Ok(UpdateDecision::UpdateConfigArea(ConfigArea::Ui));
    }

    Ok(UpdateDecision::NoUpdateNeeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operating(firmware_id: u32, config_id: u32) -> DeviceState {
        DeviceState::Operating {
            firmware_id,
            config_id,
        }
    }

    fn image(build_id: Option<u32>, name: Option<&str>, config_id: u32) -> ImageVersion<'_> {
        ImageVersion {
            build_id,
            name,
            config_id: Some(config_id),
        }
    }

    #[test]
    fn test_newer_name_version() {
        let img = image(None, Some("s3202_PR150_x.img"), 0);
        assert_eq!(
            decide(false, &operating(100, 0), &img),
            Ok(UpdateDecision::UpdateFirmware)
        );
    }

    #[test]
    fn test_equal_firmware_newer_config() {
        let img = image(Some(100), None, 7);
        assert_eq!(
            decide(false, &operating(100, 5), &img),
            Ok(UpdateDecision::UpdateConfigArea(ConfigArea::Ui))
        );
    }

    #[test]
    fn test_equal_firmware_same_config() {
        let img = image(Some(100), None, 5);
        assert_eq!(
            decide(false, &operating(100, 5), &img),
            Ok(UpdateDecision::NoUpdateNeeded)
        );
        let img = image(Some(100), None, 4);
        assert_eq!(
            decide(false, &operating(100, 5), &img),
            Ok(UpdateDecision::NoUpdateNeeded)
        );
    }

    #[test]
    fn test_older_image() {
        let img = image(Some(99), None, 0xFFFF_FFFF);
        assert_eq!(
            decide(false, &operating(100, 0), &img),
            Ok(UpdateDecision::NoUpdateNeeded)
        );
    }

    #[test]
    fn test_force_wins() {
        let img = image(None, Some("no_token.img"), 0);
        assert_eq!(
            decide(true, &operating(u32::MAX, u32::MAX), &img),
            Ok(UpdateDecision::UpdateFirmware)
        );
    }

    #[test]
    fn test_programming_mode() {
        let img = image(None, None, 0);
        assert_eq!(
            decide(false, &DeviceState::Programming, &img),
            Ok(UpdateDecision::UpdateFirmware)
        );
    }

    #[test]
    fn test_build_id_preferred_over_name() {
        let img = image(Some(50), Some("PR150.img"), 0);
        assert_eq!(
            decide(false, &operating(100, 0), &img),
            Ok(UpdateDecision::NoUpdateNeeded)
        );
    }

    #[test]
    fn test_no_version_token() {
        let img = image(None, Some("firmware.img"), 0);
        assert_eq!(
            decide(false, &operating(100, 0), &img),
            Err(Error::NoVersionToken)
        );
        let img = image(None, None, 0);
        assert_eq!(
            decide(false, &operating(100, 0), &img),
            Err(Error::NoVersionToken)
        );
    }

    #[test]
    fn test_equal_ids_never_update_firmware() {
        for id in [0u32, 1, 100, 0x00FF_FFFF] {
            for (dev_cfg, img_cfg) in [(0u32, 0u32), (1, 2), (2, 1), (u32::MAX, 0)] {
                let img = image(Some(id), None, img_cfg);
                let first = decide(false, &operating(id, dev_cfg), &img);
                assert_ne!(first, Ok(UpdateDecision::UpdateFirmware));
                assert_eq!(first, decide(false, &operating(id, dev_cfg), &img));
            }
        }
    }

    #[test]
    fn test_vendor_check() {
        assert_eq!(vendor_check(false, Some(0x31), 0x31), Ok(()));
        assert_eq!(
            vendor_check(false, Some(0x31), 0x32),
            Err(Error::VendorMismatch {
                image: 0x31,
                device: 0x32
            })
        );
        assert_eq!(vendor_check(true, Some(0x31), 0x32), Ok(()));
        assert_eq!(vendor_check(false, None, 0x32), Err(Error::MalformedImage));
    }
}
