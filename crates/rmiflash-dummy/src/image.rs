//! Firmware image builder
//!
//! Produces images in the on-disk layout (0x100 byte header, firmware,
//! configuration) with a valid checksum, sized for a [`DummyConfig`].

use alloc::vec;
use alloc::vec::Vec;

use rmiflash_core::image::{fletcher32, HEADER_LEN};

use crate::DummyConfig;

/// Builder for test images
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    firmware: Vec<u8>,
    config: Vec<u8>,
    build_id: Option<u32>,
    product_id: Vec<u8>,
}

impl ImageBuilder {
    /// Image with firmware and UI config sized for `config`
    ///
    /// Firmware bytes count up from zero; the config starts with the
    /// device's current config id.
    pub fn for_device(config: &DummyConfig) -> Self {
        let bs = config.block_size as usize;
        let firmware = (0..config.firmware_blocks as usize * bs)
            .map(|i| i as u8)
            .collect();
        let mut ui = vec![0x5A; config.ui_config_blocks as usize * bs];
        let id_len = ui.len().min(4);
        ui[..id_len].copy_from_slice(&config.config_id[..id_len]);
        Self {
            firmware,
            config: ui,
            build_id: None,
            product_id: config.product_id.as_bytes().to_vec(),
        }
    }

    /// Replace the firmware payload
    pub fn firmware(mut self, firmware: Vec<u8>) -> Self {
        self.firmware = firmware;
        self
    }

    /// Replace the configuration payload
    pub fn config(mut self, config: Vec<u8>) -> Self {
        self.config = config;
        self
    }

    /// Set the configuration id (first 4 config bytes, high byte first)
    pub fn config_id(mut self, id: u32) -> Self {
        if let Some(head) = self.config.get_mut(..4) {
            head.copy_from_slice(&id.to_be_bytes());
        }
        self
    }

    /// Embed a build id in the header
    pub fn build_id(mut self, id: u32) -> Self {
        self.build_id = Some(id);
        self
    }

    /// Serialize the image
    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        if let Some(id) = self.build_id {
            data[0x06] |= 0x01;
            data[0x50..0x54].copy_from_slice(&id.to_le_bytes());
        }
        data[0x07] = 0x05;
        data[0x08..0x0C].copy_from_slice(&(self.firmware.len() as u32).to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&(self.config.len() as u32).to_le_bytes());
        let id_len = self.product_id.len().min(10);
        data[0x10..0x10 + id_len].copy_from_slice(&self.product_id[..id_len]);
        data.extend_from_slice(&self.firmware);
        data.extend_from_slice(&self.config);

        let checksum = fletcher32(&data[4..]);
        data[0..4].copy_from_slice(&checksum.to_le_bytes());
        data
    }
}
