//! CLI command implementations
//!
//! Every command opens a session on the selected device, runs one
//! operation and prints a short summary. Failures are returned to `main`
//! as boxed errors.

pub mod config_area;
pub mod ctl;
pub mod info;
mod list;
mod progress;
pub mod update;

pub use list::list_programmers;
pub use progress::BarProgress;

use rmiflash_core::config::UpdaterConfig;
use rmiflash_core::session::{SessionOptions, UpdateSession};

use crate::programmers::{self, BoxedDevice};

/// Session over a programmer-opened device
pub type Session = UpdateSession<BoxedDevice>;

/// Open the device and start a session with a progress bar installed
pub fn open_session(
    programmer: &str,
    options: SessionOptions,
) -> Result<Session, Box<dyn std::error::Error>> {
    let device = programmers::open_device(programmer)?;
    let mut session = UpdateSession::open(device, options)?;
    session.set_progress(Box::new(BarProgress::new()));
    Ok(session)
}

/// Session options from the configuration file, or defaults
pub fn base_options(config: Option<&UpdaterConfig>) -> SessionOptions {
    config.map(UpdaterConfig::session_options).unwrap_or_default()
}
