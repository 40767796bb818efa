//! Attribute-style control surface
//!
//! Mirrors a sysfs-like interface: numeric triggers written to named
//! attributes, read-only counters, and a binary data channel that streams an
//! image in and a configuration read-back out.

use alloc::format;
use alloc::string::String;

use maybe_async::maybe_async;

use crate::bus::{ImageStore, TouchDevice};
use crate::error::{Error, Result};
use crate::flash::ConfigArea;
use crate::session::{UpdateReport, UpdateSession};

/// Named control attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// Write `1`: apply the staged image, or load one from the store
    DoReflash,
    /// Write `1`: write the staged buffer to the selected config area
    WriteConfig,
    /// Write `1`: read the selected config area into the read-back buffer
    ReadConfig,
    /// Selected config area (0-3)
    ConfigArea,
    /// Write: (re)allocate the staged image buffer
    ImageSize,
    /// Force flag for the next update (0 or 1)
    Force,
    /// Write an image name: load it from the store and update if needed
    FwUpdate,
    /// Write an image name: load it from the store and update unconditionally
    FwUpdateForce,
    /// Bytes per block
    BlockSize,
    /// Firmware block count
    FwBlockCount,
    /// UI config block count
    ConfigBlockCount,
    /// Permanent config block count
    PermConfigBlockCount,
    /// Bootloader config block count
    BlConfigBlockCount,
    /// Display config block count
    DispConfigBlockCount,
}

impl Attribute {
    /// All attributes
    pub const ALL: [Attribute; 14] = [
        Self::DoReflash,
        Self::WriteConfig,
        Self::ReadConfig,
        Self::ConfigArea,
        Self::ImageSize,
        Self::Force,
        Self::FwUpdate,
        Self::FwUpdateForce,
        Self::BlockSize,
        Self::FwBlockCount,
        Self::ConfigBlockCount,
        Self::PermConfigBlockCount,
        Self::BlConfigBlockCount,
        Self::DispConfigBlockCount,
    ];

    /// Attribute file name
    pub fn name(self) -> &'static str {
        match self {
            Self::DoReflash => "doreflash",
            Self::WriteConfig => "writeconfig",
            Self::ReadConfig => "readconfig",
            Self::ConfigArea => "configarea",
            Self::ImageSize => "imagesize",
            Self::Force => "force",
            Self::FwUpdate => "fwupdate",
            Self::FwUpdateForce => "fwupdate_force",
            Self::BlockSize => "blocksize",
            Self::FwBlockCount => "fwblockcount",
            Self::ConfigBlockCount => "configblockcount",
            Self::PermConfigBlockCount => "permconfigblockcount",
            Self::BlConfigBlockCount => "blconfigblockcount",
            Self::DispConfigBlockCount => "dispconfigblockcount",
        }
    }

    /// Look up an attribute by file name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Attribute accepts writes
    pub fn writable(self) -> bool {
        matches!(
            self,
            Self::DoReflash
                | Self::WriteConfig
                | Self::ReadConfig
                | Self::ConfigArea
                | Self::ImageSize
                | Self::Force
                | Self::FwUpdate
                | Self::FwUpdateForce
        )
    }

    /// Attribute can be read
    pub fn readable(self) -> bool {
        !matches!(
            self,
            Self::DoReflash
                | Self::WriteConfig
                | Self::ReadConfig
                | Self::ImageSize
                | Self::FwUpdate
                | Self::FwUpdateForce
        )
    }
}

fn parse_number(value: &str) -> Result<u32> {
    value.trim().parse().map_err(|_| Error::InvalidArgument)
}

fn parse_trigger(value: &str) -> Result<()> {
    match parse_number(value)? {
        1 => Ok(()),
        _ => Err(Error::InvalidArgument),
    }
}

/// Control surface over a session and an image store
pub struct ControlSurface<D: TouchDevice, S: ImageStore> {
    session: UpdateSession<D>,
    store: S,
    last_report: Option<UpdateReport>,
}

#[maybe_async]
impl<D: TouchDevice, S: ImageStore> ControlSurface<D, S> {
    /// Write `value` to the attribute `name`
    pub async fn store(&mut self, name: &str, value: &str) -> Result<()> {
        let attr = Attribute::from_name(name).ok_or(Error::InvalidArgument)?;
        if !attr.writable() {
            return Err(Error::InvalidArgument);
        }

        match attr {
            Attribute::DoReflash => {
                let result = match parse_trigger(value) {
                    Ok(()) => self.do_reflash().await,
                    Err(e) => Err(e),
                };
                self.session.release_staged();
                self.last_report = Some(result?);
            }
            Attribute::WriteConfig => {
                let result = match parse_trigger(value) {
                    Ok(()) => self.session.write_config().await,
                    Err(e) => Err(e),
                };
                self.session.release_staged();
                result?;
            }
            Attribute::ReadConfig => {
                parse_trigger(value)?;
                self.session.read_config().await?;
            }
            Attribute::ConfigArea => {
                let area = u8::try_from(parse_number(value)?).map_err(|_| Error::InvalidArgument)?;
                self.session.set_config_area(ConfigArea::try_from(area)?);
            }
            Attribute::ImageSize => {
                self.session.stage_image(parse_number(value)? as usize)?;
            }
            Attribute::Force => {
                self.session.set_force(parse_number(value)? != 0);
            }
            Attribute::FwUpdate | Attribute::FwUpdateForce => {
                let name = value.trim();
                if name.is_empty() {
                    return Err(Error::InvalidArgument);
                }
                self.session.set_image_name(Some(String::from(name)));
                self.session.set_force(attr == Attribute::FwUpdateForce);
                let report = self.session.auto_update(&mut self.store).await?;
                self.last_report = Some(report);
            }
            _ => return Err(Error::InvalidArgument),
        }
        Ok(())
    }

    async fn do_reflash(&mut self) -> Result<UpdateReport> {
        if self.session.staged_len() > 0 {
            self.session.update_from_staged().await
        } else {
            self.session.auto_update(&mut self.store).await
        }
    }
}

impl<D: TouchDevice, S: ImageStore> ControlSurface<D, S> {
    /// Wrap a session
    pub fn new(session: UpdateSession<D>, store: S) -> Self {
        Self {
            session,
            store,
            last_report: None,
        }
    }

    /// Read the attribute `name`
    pub fn show(&self, name: &str) -> Result<String> {
        let attr = Attribute::from_name(name).ok_or(Error::InvalidArgument)?;
        let count = |area| self.session.config_block_count(area).unwrap_or(0);
        let value = match attr {
            Attribute::BlockSize => self.session.block_size(),
            Attribute::FwBlockCount => self.session.firmware_block_count(),
            Attribute::ConfigBlockCount => count(ConfigArea::Ui),
            Attribute::PermConfigBlockCount => count(ConfigArea::Permanent),
            Attribute::BlConfigBlockCount => count(ConfigArea::Bootloader),
            Attribute::DispConfigBlockCount => count(ConfigArea::Display),
            Attribute::ConfigArea => self.session.config_area() as u16,
            Attribute::Force => self.session.force() as u16,
            _ => return Err(Error::InvalidArgument),
        };
        Ok(format!("{}\n", value))
    }

    /// Append a chunk to the staged image
    pub fn write_data(&mut self, chunk: &[u8]) -> Result<usize> {
        self.session.append_staged(chunk)?;
        Ok(chunk.len())
    }

    /// Copy the last configuration read-back into `buf`
    ///
    /// Fails with [`Error::BufferTooSmall`] if `buf` cannot hold all of it.
    pub fn read_data(&self, buf: &mut [u8]) -> Result<usize> {
        let data = self.session.readback();
        let buf_len = buf.len();
        let dst = buf.get_mut(..data.len()).ok_or_else(|| {
            log::error!("Not enough space ({} bytes) in buffer", buf_len);
            Error::BufferTooSmall
        })?;
        dst.copy_from_slice(data);
        Ok(data.len())
    }

    /// Report of the last update triggered through this surface
    pub fn last_report(&self) -> Option<&UpdateReport> {
        self.last_report.as_ref()
    }

    /// Access the session
    pub fn session(&self) -> &UpdateSession<D> {
        &self.session
    }

    /// Access the session mutably
    pub fn session_mut(&mut self) -> &mut UpdateSession<D> {
        &mut self.session
    }

    /// Release the session and store
    pub fn into_parts(self) -> (UpdateSession<D>, S) {
        (self.session, self.store)
    }
}
