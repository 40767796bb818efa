//! Update decision logic
//!
//! Pure functions deciding whether an image should be applied to a device.
//! Reading the identifiers from the device is the session's job.

mod decision;

pub use decision::*;
