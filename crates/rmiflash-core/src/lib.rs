//! rmiflash-core - Core library for reflashing RMI4 touch controllers
//!
//! This crate implements the F34 (flash memory management) reflash protocol
//! used by Synaptics RMI4 touch controllers on a register-addressable bus.
//! It is designed to be `no_std` compatible (with `alloc`) so the same engine
//! can run inside a host tool or on an embedded supervisor.
//!
//! # Features
//!
//! - `std` - Enable standard library support (config files, image store,
//!   deferred checks)
//! - `is_sync` - Compile the `maybe_async` transport traits as blocking code
//!
//! # Example
//!
//! ```ignore
//! use rmiflash_core::session::{SessionOptions, UpdateSession};
//!
//! fn reflash<D: rmiflash_core::bus::TouchDevice>(device: D, image: &[u8]) {
//!     let mut session = UpdateSession::open(device, SessionOptions::default()).unwrap();
//!     match session.update_with_image(image) {
//!         Ok(report) => println!("{}", report),
//!         Err(e) => println!("Reflash failed: {}", e),
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
#[cfg(feature = "std")]
pub mod config;
pub mod control;
#[cfg(feature = "std")]
pub mod deferred;
pub mod error;
pub mod field;
pub mod flash;
pub mod image;
pub mod rmi;
pub mod session;
pub mod update;

pub use error::{Error, Result};
