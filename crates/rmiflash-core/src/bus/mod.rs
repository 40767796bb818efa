//! Bus and collaborator traits
//!
//! This module defines the traits the reflash engine needs from the outside
//! world: a register transport, a reset primitive and an image store.

mod traits;

pub use traits::*;
