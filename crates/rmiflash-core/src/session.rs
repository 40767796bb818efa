//! Reflash session
//!
//! `UpdateSession` owns the device for the duration of an update: the
//! register map, the staged image pushed by a host, the last configuration
//! read-back and the session settings. Every entry point that enters
//! programming mode resets the device on the way out, on success or failure.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use maybe_async::maybe_async;

use crate::bus::{ImageStore, TouchDevice};
use crate::error::{Error, Result};
use crate::flash::{self, ConfigArea, FlashProgress, NoProgress, Timing};
use crate::image::{self, FirmwareImage, SensorVendor, DEFAULT_IMAGE_NAME};
use crate::rmi::{self, pdt, query, DeviceStatus, FlashControl, ProductInfo, RegisterMap};
use crate::update::{self, DeviceState, ImageVersion, UpdateDecision};

/// Sensor id GPIOs sampled to pick a per-vendor image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorIdPins {
    /// First sensor id pin number
    pub first: u8,
    /// Second sensor id pin number
    pub second: u8,
}

impl SensorIdPins {
    /// Pin mask; the same bits are used for the pull-up mask
    pub fn mask(&self) -> u16 {
        (1u16 << (self.first & 0x0F)) | (1u16 << (self.second & 0x0F))
    }

    /// Decode a sensor id into a vendor
    pub fn vendor(&self, sensor_id: u16) -> Option<SensorVendor> {
        let first = sensor_id & (1 << (self.first & 0x0F)) != 0;
        let second = sensor_id & (1 << (self.second & 0x0F)) != 0;
        SensorVendor::from_pins(first, second)
    }
}

/// Session settings
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Skip the vendor check and version comparison
    pub force: bool,
    /// Image name to load for autonomous updates
    pub image_name: Option<String>,
    /// Poll interval and timeouts
    pub timing: Timing,
    /// Pick a per-vendor image from the sensor id pins
    pub sensor_id: Option<SensorIdPins>,
}

/// Why an update was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Device firmware and configuration are current
    UpToDate,
    /// Image carries no usable firmware version
    NoVersionToken,
    /// Image is for a different sensor partner
    VendorMismatch {
        /// Partner id embedded in the image
        image: u8,
        /// Partner id reported by the device
        device: u8,
    },
}

/// Result of an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReport {
    /// Nothing was written
    Skipped(SkipReason),
    /// Flash was reprogrammed and the device reset
    Applied {
        /// What was written
        decision: UpdateDecision,
        /// Device status read after the reset
        status: DeviceStatus,
    },
}

impl UpdateReport {
    /// Device is still in programming mode after the update
    pub fn in_programming_mode(&self) -> bool {
        matches!(self, Self::Applied { status, .. } if status.flash_prog())
    }
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(SkipReason::UpToDate) => write!(f, "nothing needs to be updated"),
            Self::Skipped(SkipReason::NoVersionToken) => {
                write!(f, "skipped: no firmware version in image")
            }
            Self::Skipped(SkipReason::VendorMismatch { image, device }) => write!(
                f,
                "skipped: image for partner 0x{:02X}, device is 0x{:02X}",
                image, device
            ),
            Self::Applied { decision, status } => {
                write!(f, "{}: done, {}", decision, status)
            }
        }
    }
}

/// Image bytes pushed by the host, written in chunks
#[derive(Debug, Default)]
struct StagedImage {
    data: Vec<u8>,
    cursor: usize,
}

impl StagedImage {
    fn stage(&mut self, total: usize) -> Result<()> {
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| Error::AllocationFailed)?;
        data.resize(total, 0);
        self.data = data;
        self.cursor = 0;
        Ok(())
    }

    fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let end = self
            .cursor
            .checked_add(chunk.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::StagingOverflow)?;
        self.data[self.cursor..end].copy_from_slice(chunk);
        self.cursor = end;
        Ok(())
    }

    fn take(&mut self) -> Result<Vec<u8>> {
        self.cursor = 0;
        let data = core::mem::take(&mut self.data);
        if data.is_empty() {
            return Err(Error::NoImage);
        }
        Ok(data)
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailed)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// A reflash session bound to one device
pub struct UpdateSession<D: TouchDevice> {
    device: D,
    map: RegisterMap,
    product: ProductInfo,
    options: SessionOptions,
    config_area: ConfigArea,
    staged: StagedImage,
    readback: Vec<u8>,
    progress: Box<dyn FlashProgress + Send>,
}

#[maybe_async]
impl<D: TouchDevice> UpdateSession<D> {
    /// Discover the device and start a session
    ///
    /// Checks the PDT properties, scans the PDT for F01 and F34 and reads
    /// the F34 flash geometry.
    pub async fn open(mut device: D, options: SessionOptions) -> Result<Self> {
        let map = rmi::discover(&mut device).await?;
        let product = rmi::read_product_info(&mut device, &map).await?;
        log::info!(
            "Found RMI4 device, product id {}, block size {}",
            product.product_id,
            map.flash.block_size
        );

        Ok(Self {
            device,
            map,
            product,
            options,
            config_area: ConfigArea::Ui,
            staged: StagedImage::default(),
            readback: Vec::new(),
            progress: Box::new(NoProgress),
        })
    }

    /// Read the device status register
    pub async fn device_status(&mut self) -> Result<DeviceStatus> {
        rmi::read_device_status(&mut self.device, &self.map).await
    }

    /// Read the identifiers the update decision depends on
    pub async fn device_state(&mut self) -> Result<DeviceState> {
        let status = rmi::read_device_status(&mut self.device, &self.map).await?;
        if status.flash_prog() {
            return Ok(DeviceState::Programming);
        }
        let firmware_id = rmi::read_firmware_id(&mut self.device, &self.map).await?;
        let config_id = rmi::read_config_id(&mut self.device, &self.map).await?;
        Ok(DeviceState::Operating {
            firmware_id,
            config_id,
        })
    }

    /// Resolve the image name for an autonomous update
    ///
    /// Uses the configured name or the built-in default. With sensor id
    /// pins configured, the pins are sampled in programming mode and the
    /// matching vendor variant of the name is returned; the device is reset
    /// afterwards.
    pub async fn resolve_image_name(&mut self) -> Result<String> {
        let name = self
            .options
            .image_name
            .clone()
            .unwrap_or_else(|| String::from(DEFAULT_IMAGE_NAME));

        let Some(pins) = self.options.sensor_id else {
            return Ok(name);
        };

        let result = flash::read_sensor_id(
            &mut self.device,
            &mut self.map,
            &self.options.timing,
            pins.mask(),
            pins.mask(),
        )
        .await;
        self.finish(result.map(|_| ())).await?;
        let sensor_id = result?;

        let vendor = pins.vendor(sensor_id);
        if vendor.is_none() {
            log::error!("Sensor id 0x{:04X} is not available", sensor_id);
        }
        Ok(image::vendor_image_name(&name, vendor))
    }

    /// Load an image from `store` and apply it if the device needs it
    pub async fn auto_update<S: ImageStore + ?Sized>(&mut self, store: &mut S) -> Result<UpdateReport> {
        log::info!("Start of reflash process");
        let name = self.resolve_image_name().await?;
        log::info!("Requesting firmware image {}", name);
        let data = store.load(&name)?;
        self.apply(&data, Some(&name), true).await
    }

    /// Apply a caller-provided image to firmware
    ///
    /// The version comparison is skipped; only the vendor check runs, and
    /// only when the session is not forced.
    pub async fn update_with_image(&mut self, data: &[u8]) -> Result<UpdateReport> {
        log::info!("Start of reflash process");
        self.apply(data, None, false).await
    }

    /// Apply the staged image to firmware, releasing it afterwards
    pub async fn update_from_staged(&mut self) -> Result<UpdateReport> {
        let data = self.staged.take()?;
        self.update_with_image(&data).await
    }

    async fn apply(&mut self, data: &[u8], name: Option<&str>, decide: bool) -> Result<UpdateReport> {
        let image = FirmwareImage::parse(data)?;
        if !image.checksum_valid() {
            log::warn!("Image checksum does not match header");
        }

        // The partner byte lives in the UI firmware's control registers, so
        // a device stuck in the bootloader cannot be checked.
        let state = self.device_state().await?;
        if !self.options.force && state != DeviceState::Programming {
            let config_id = rmi::read_config_id_bytes(&mut self.device, &self.map).await?;
            match update::vendor_check(false, image.vendor_id(), config_id[1]) {
                Ok(()) => {}
                Err(Error::VendorMismatch { image, device }) => {
                    return Ok(UpdateReport::Skipped(SkipReason::VendorMismatch { image, device }));
                }
                Err(e) => return Err(e),
            }
        }

        let decision = if decide {
            let version = ImageVersion {
                build_id: image.header().build_id,
                name,
                config_id: image.config_id(),
            };
            match update::decide(self.options.force, &state, &version) {
                Ok(decision) => decision,
                Err(Error::NoVersionToken) => {
                    return Ok(UpdateReport::Skipped(SkipReason::NoVersionToken));
                }
                Err(e) => return Err(e),
            }
        } else {
            UpdateDecision::UpdateFirmware
        };

        log::info!("{}", decision);
        let result = match decision {
            UpdateDecision::NoUpdateNeeded => {
                return Ok(UpdateReport::Skipped(SkipReason::UpToDate));
            }
            UpdateDecision::UpdateFirmware => {
                flash::reflash(
                    &mut self.device,
                    &mut self.map,
                    &self.options.timing,
                    image.firmware(),
                    image.config(),
                    &mut *self.progress,
                )
                .await
            }
            UpdateDecision::UpdateConfigArea(area) => match image.config() {
                Some(config) => {
                    flash::write_config_area(
                        &mut self.device,
                        &mut self.map,
                        &self.options.timing,
                        area,
                        config,
                        &mut *self.progress,
                    )
                    .await
                }
                None => Err(Error::MalformedImage),
            },
        };

        if let Err(e) = result {
            log::error!("Failed to do reflash: {}", e);
        }
        let status = self.finish(result).await?;
        log::info!("End of reflash process");
        Ok(UpdateReport::Applied { decision, status })
    }

    /// Write the staged buffer to the selected configuration area
    ///
    /// The UI area takes a full image and writes its configuration payload;
    /// other areas take the raw area contents. The staged buffer is released
    /// afterwards and the device is always reset once flash was touched.
    pub async fn write_config(&mut self) -> Result<()> {
        let area = self.config_area;
        let staged = self.staged.take();

        self.map
            .flash
            .block_count(area)
            .ok_or(Error::CapabilityUnsupported(area))?;
        let staged = staged?;

        let payload = if area == ConfigArea::Ui {
            FirmwareImage::parse(&staged)?
                .config()
                .ok_or(Error::MalformedImage)?
        } else {
            &staged[..]
        };

        log::info!("Start of write config process");
        let result = flash::write_config_area(
            &mut self.device,
            &mut self.map,
            &self.options.timing,
            area,
            payload,
            &mut *self.progress,
        )
        .await;
        if let Err(e) = result {
            log::error!("Failed to write config: {}", e);
        }
        self.finish(result).await?;
        log::info!("End of write config process");
        Ok(())
    }

    /// Read the selected configuration area
    ///
    /// The data stays available through [`Self::readback`] until the next
    /// read.
    pub async fn read_config(&mut self) -> Result<&[u8]> {
        let area = self.config_area;
        let count = self
            .map
            .flash
            .block_count(area)
            .ok_or(Error::CapabilityUnsupported(area))?;

        self.readback = Vec::new();
        let mut buf = zeroed(count as usize * self.map.flash.block_size as usize)?;
        let result = flash::read_config_area(
            &mut self.device,
            &mut self.map,
            &self.options.timing,
            area,
            &mut buf,
            &mut *self.progress,
        )
        .await;
        self.finish(result).await?;

        self.readback = buf;
        Ok(&self.readback)
    }

    /// Handle an attention interrupt
    ///
    /// Returns the flash control register when one of the F34 interrupt
    /// bits is set in `irq_status`.
    pub async fn attention(&mut self, irq_status: u8) -> Result<Option<FlashControl>> {
        if irq_status & self.map.interrupt_mask == 0 {
            return Ok(None);
        }
        rmi::read_flash_control(&mut self.device, &self.map)
            .await
            .map(Some)
    }

    /// Reset the device, wait for it to settle and rediscover the register map
    pub async fn reset_device(&mut self) -> Result<DeviceStatus> {
        log::debug!("Reset device");
        self.device.reset().await?;
        self.device
            .delay_us(self.options.timing.reset_settle_ms.saturating_mul(1000))
            .await;

        let scan = pdt::scan(&mut self.device).await?;
        self.map.update_scan(scan);
        self.map.flash = query::read_flash_query(&mut self.device, &self.map.f34).await?;

        let status = rmi::read_device_status(&mut self.device, &self.map).await?;
        log::debug!("Device status after reset: {}", status);
        Ok(status)
    }

    /// Reset after a sequence and report its first error
    async fn finish(&mut self, result: Result<()>) -> Result<DeviceStatus> {
        let reset = self.reset_device().await;
        match (result, reset) {
            (Err(e), Err(reset_err)) => {
                log::error!("Failed to reset device: {}", reset_err);
                Err(e)
            }
            (Err(e), Ok(_)) => Err(e),
            (Ok(()), reset) => reset,
        }
    }
}

impl<D: TouchDevice> UpdateSession<D> {
    /// Stage a pushed image of `total` bytes
    ///
    /// Replaces any staged image and rewinds the write cursor.
    pub fn stage_image(&mut self, total: usize) -> Result<()> {
        self.staged.stage(total).inspect_err(|_| {
            log::error!("Failed to allocate {} bytes for image", total);
        })
    }

    /// Append a chunk to the staged image
    pub fn append_staged(&mut self, chunk: &[u8]) -> Result<()> {
        self.staged.append(chunk)
    }

    /// Drop the staged image
    pub fn release_staged(&mut self) {
        self.staged = StagedImage::default();
    }

    /// Size of the staged image (0 if none)
    pub fn staged_len(&self) -> usize {
        self.staged.data.len()
    }

    /// Last configuration read-back
    pub fn readback(&self) -> &[u8] {
        &self.readback
    }

    /// Configuration area used by config reads and writes
    pub fn config_area(&self) -> ConfigArea {
        self.config_area
    }

    /// Select the configuration area for config reads and writes
    pub fn set_config_area(&mut self, area: ConfigArea) {
        self.config_area = area;
    }

    /// Force the next update regardless of vendor and version
    pub fn set_force(&mut self, force: bool) {
        self.options.force = force;
    }

    /// Whether updates are forced
    pub fn force(&self) -> bool {
        self.options.force
    }

    /// Override the image name used for autonomous updates
    pub fn set_image_name(&mut self, name: Option<String>) {
        self.options.image_name = name;
    }

    /// Install a progress reporter
    pub fn set_progress(&mut self, progress: Box<dyn FlashProgress + Send>) {
        self.progress = progress;
    }

    /// Current register map
    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    /// Product identification read at open
    pub fn product(&self) -> &ProductInfo {
        &self.product
    }

    /// Session settings
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Bytes per flash block
    pub fn block_size(&self) -> u16 {
        self.map.flash.block_size
    }

    /// Firmware block count
    pub fn firmware_block_count(&self) -> u16 {
        self.map.flash.firmware_blocks
    }

    /// Block count of a configuration area, `None` if absent
    pub fn config_block_count(&self, area: ConfigArea) -> Option<u16> {
        self.map.flash.block_count(area)
    }

    /// Access the device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Access the device mutably
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// End the session and return the device
    pub fn into_device(self) -> D {
        self.device
    }
}
