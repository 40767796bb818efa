//! Programmer registration and dispatch
//!
//! This module provides a centralized registry for all device backends, with
//! support for feature-gated inclusion and dynamic help text generation.

use rmiflash_core::bus::TouchDevice;

/// A device handle usable by the session
pub type BoxedDevice = Box<dyn TouchDevice + Send>;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available programmers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        aliases: &[],
        description: "Emulated RMI4 controller (blocksize=,fwblocks=,fwid=,configid=,bootloader=)",
    });

    #[cfg(feature = "linux-i2c")]
    programmers.push(ProgrammerInfo {
        name: "linux_i2c",
        aliases: &["linux-i2c", "i2c"],
        description: "Linux i2c-dev interface (dev=/dev/i2c-N,addr=0x20,reset_delay=<ms>)",
    });

    programmers
}

/// Generate help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:12} - {}\n", p.name, p.description));
    }
    help
}

/// Generate a short list of programmer names for CLI help
pub fn programmer_names_short() -> String {
    let programmers = available_programmers();
    let names: Vec<&str> = programmers.iter().map(|p| p.name).collect();
    names.join(", ")
}

/// Resolve a programmer name or alias to its primary name
pub fn find_programmer(name: &str) -> Option<&'static str> {
    available_programmers()
        .into_iter()
        .find(|p| p.name == name || p.aliases.contains(&name))
        .map(|p| p.name)
}

/// Open the device described by a programmer string
///
/// The programmer string can be just the name (e.g., "dummy") or include
/// parameters (e.g., "linux_i2c:dev=/dev/i2c-1,addr=0x2c").
#[allow(unused_variables)]
pub fn open_device(programmer: &str) -> Result<BoxedDevice, Box<dyn std::error::Error>> {
    let (name, options) = parse_programmer_string(programmer);

    let canonical_name = match find_programmer(name) {
        Some(n) => n,
        None => return Err(unknown_programmer_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let config = rmiflash_dummy::parse_options(&options)?;
            log::info!(
                "Using emulated device (block size {}, firmware id {})",
                config.block_size,
                config.firmware_id
            );
            Ok(Box::new(rmiflash_dummy::DummyTouch::new(config)))
        }

        #[cfg(feature = "linux-i2c")]
        "linux_i2c" => rmiflash_linux_i2c::open_linux_i2c(&options).map_err(|e| {
            format!(
                "Failed to open Linux I2C device: {}\nCheck dev= and addr=, and that no kernel driver owns the device.",
                e
            )
            .into()
        }),

        _ => Err(unknown_programmer_error(name)),
    }
}

/// Split `name:key=value,...` into the name and its options
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown programmer: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.push_str("\nUse 'rmiflash list-programmers' for more details");
    msg.into()
}
