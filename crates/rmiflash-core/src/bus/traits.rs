//! Transport trait definitions
//!
//! These traits use `maybe_async` to support both sync and async modes.
//! - By default, traits are async (suitable for Embassy, tokio)
//! - With the `is_sync` feature, traits become synchronous

use alloc::vec::Vec;

use crate::error::Result;
use maybe_async::maybe_async;

/// Register transport (sync or async depending on `is_sync` feature)
///
/// RMI4 exposes its functions as a flat 16-bit register space. The high
/// byte selects the register page; backends that need explicit page
/// selection (I2C, SPI) handle it internally.
///
/// Short transfers must be reported as errors: the engine never retries a
/// partial read or write.
#[maybe_async(AFIT)]
pub trait RegisterBus {
    /// Read `buf.len()` consecutive registers starting at `addr`
    async fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()>;

    /// Write `data` to consecutive registers starting at `addr`
    async fn write(&mut self, addr: u16, data: &[u8]) -> Result<()>;

    /// Delay for the specified number of microseconds
    async fn delay_us(&mut self, us: u32);
}

/// Device reset primitive
///
/// `reset` returns once the device has re-enumerated (or the backend gave
/// up waiting). The caller applies its own settle delay afterwards.
#[maybe_async(AFIT)]
pub trait DeviceReset {
    /// Perform a hardware or protocol-level reset
    async fn reset(&mut self) -> Result<()>;
}

/// A touch controller the engine can reflash
pub trait TouchDevice: RegisterBus + DeviceReset {}

impl<T: RegisterBus + DeviceReset + ?Sized> TouchDevice for T {}

/// Source of firmware images addressed by name
pub trait ImageStore {
    /// Load the image with the given name
    ///
    /// Returns `Error::ImageNotFound` if no such image exists.
    fn load(&mut self, name: &str) -> Result<Vec<u8>>;
}

// Blanket impls for boxed devices to allow trait objects (sync mode only)
// In async mode, traits with async fn are not object-safe
#[cfg(feature = "is_sync")]
impl RegisterBus for alloc::boxed::Box<dyn TouchDevice + Send> {
    fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

#[cfg(feature = "is_sync")]
impl DeviceReset for alloc::boxed::Box<dyn TouchDevice + Send> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }
}

/// Image store that never finds anything
///
/// Useful when only pushed images are used.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImageStore;

impl ImageStore for NoImageStore {
    fn load(&mut self, _name: &str) -> Result<Vec<u8>> {
        Err(crate::error::Error::ImageNotFound)
    }
}

/// Image store backed by a list of directories
#[cfg(feature = "std")]
#[derive(Debug, Clone, Default)]
pub struct DirImageStore {
    dirs: Vec<std::path::PathBuf>,
}

#[cfg(feature = "std")]
impl DirImageStore {
    /// Create a store searching the given directories in order
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<std::path::PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Directories searched by this store
    pub fn dirs(&self) -> &[std::path::PathBuf] {
        &self.dirs
    }
}

#[cfg(feature = "std")]
impl ImageStore for DirImageStore {
    fn load(&mut self, name: &str) -> Result<Vec<u8>> {
        for dir in &self.dirs {
            let path = dir.join(name);
            if !path.is_file() {
                continue;
            }
            match std::fs::read(&path) {
                Ok(data) => {
                    log::debug!("Loaded {} bytes from {}", data.len(), path.display());
                    return Ok(data);
                }
                Err(e) => {
                    log::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }
        log::error!("Firmware image {} not available", name);
        Err(crate::error::Error::ImageNotFound)
    }
}
