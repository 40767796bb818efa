//! F34 flash protocol engine
//!
//! Every flash operation follows the same pattern: write the command opcode
//! to the flash control register, poll until the command nibble clears, then
//! check the status field. Block transfers go through the data window that
//! sits right before the flash control register.

mod engine;
mod types;

pub use engine::*;
pub use types::{ConfigArea, FlashCommand, FlashProgress, NoProgress, Timing};
