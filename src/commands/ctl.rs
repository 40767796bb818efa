//! Attribute interface command

use std::path::Path;

use rmiflash_core::config::UpdaterConfig;
use rmiflash_core::control::ControlSurface;

use super::{base_options, open_session};

/// Chunk size used to stream files through the data channel
const DATA_CHUNK: usize = 4096;

/// Apply attribute reads and writes in order
///
/// `name` prints the attribute, `name=value` writes it. With `push`, the
/// file is staged through `imagesize` and the data channel before the
/// first operation; with `dump`, the data channel is saved afterwards.
pub fn run_ctl(
    programmer: &str,
    push: Option<&Path>,
    dump: Option<&Path>,
    ops: &[String],
    config: Option<&UpdaterConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = config
        .map(UpdaterConfig::image_store)
        .unwrap_or_else(|| rmiflash_core::bus::DirImageStore::new(["."]));
    let session = open_session(programmer, base_options(config))?;
    let mut ctl = ControlSurface::new(session, store);

    if let Some(path) = push {
        let data = std::fs::read(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        ctl.store("imagesize", &data.len().to_string())?;
        for chunk in data.chunks(DATA_CHUNK) {
            ctl.write_data(chunk)?;
        }
        log::info!("Staged {} bytes from {}", data.len(), path.display());
    }

    for op in ops {
        match op.split_once('=') {
            Some((name, value)) => {
                ctl.store(name, value)
                    .map_err(|e| format!("{}: {}", name, e))?;
                log::debug!("{} <- {}", name, value);
            }
            None => {
                let value = ctl.show(op).map_err(|e| format!("{}: {}", op, e))?;
                print!("{}: {}", op, value);
            }
        }
    }

    if let Some(report) = ctl.last_report() {
        println!("{}", report);
    }

    if let Some(path) = dump {
        let mut buf = vec![0u8; ctl.session().readback().len()];
        let len = ctl.read_data(&mut buf)?;
        std::fs::write(path, &buf[..len])
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        println!("Saved {} bytes to {}", len, path.display());
    }
    Ok(())
}
