//! End-to-end update flows against the emulated controller

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use rmiflash_core::bus::ImageStore;
use rmiflash_core::control::ControlSurface;
use rmiflash_core::error::{Error, Result};
use rmiflash_core::flash::{ConfigArea, FlashCommand, Timing};
use rmiflash_core::image::DEFAULT_IMAGE_NAME;
use rmiflash_core::session::{SensorIdPins, SessionOptions, SkipReason, UpdateReport, UpdateSession};
use rmiflash_core::update::UpdateDecision;

use crate::image::ImageBuilder;
use crate::{DummyConfig, DummyTouch};

#[derive(Default)]
struct MemoryStore {
    images: BTreeMap<String, Vec<u8>>,
    requested: Vec<String>,
}

impl MemoryStore {
    fn with(name: &str, data: Vec<u8>) -> Self {
        let mut store = Self::default();
        store.images.insert(name.to_string(), data);
        store
    }
}

impl ImageStore for MemoryStore {
    fn load(&mut self, name: &str) -> Result<Vec<u8>> {
        self.requested.push(name.to_string());
        self.images.get(name).cloned().ok_or(Error::ImageNotFound)
    }
}

fn fast_timing() -> Timing {
    Timing {
        poll_interval_us: 100,
        enable_timeout_ms: 1,
        block_timeout_ms: 1,
        erase_timeout_ms: 1,
        reset_settle_ms: 0,
    }
}

fn options() -> SessionOptions {
    SessionOptions {
        timing: fast_timing(),
        ..SessionOptions::default()
    }
}

fn open(config: DummyConfig) -> UpdateSession<DummyTouch> {
    UpdateSession::open(DummyTouch::new(config), options()).unwrap()
}

fn builder() -> ImageBuilder {
    ImageBuilder::for_device(&DummyConfig::default())
}

fn is_erase(opcode: u8) -> bool {
    [
        FlashCommand::EraseAll,
        FlashCommand::EraseUiConfig,
        FlashCommand::EraseBootloaderConfig,
        FlashCommand::EraseDisplayConfig,
    ]
    .iter()
    .any(|c| c.opcode() == opcode)
}

#[test]
fn test_newer_build_id_updates_firmware() {
    let image = builder().build_id(1_116_008).build();
    let mut store = MemoryStore::with(DEFAULT_IMAGE_NAME, image.clone());
    let mut session = open(DummyConfig::default());

    let report = session.auto_update(&mut store).unwrap();
    assert_eq!(store.requested, [DEFAULT_IMAGE_NAME]);
    match report {
        UpdateReport::Applied { decision, status } => {
            assert_eq!(decision, UpdateDecision::UpdateFirmware);
            assert!(!status.flash_prog());
        }
        other => panic!("unexpected report {:?}", other),
    }

    let dev = session.device();
    assert_eq!(dev.firmware(), &image[0x100..0x180]);
    assert_eq!(dev.config_area(ConfigArea::Ui), &image[0x180..]);
    assert_eq!(dev.command_count(FlashCommand::EnableFlashProgramming), 1);
    assert_eq!(dev.command_count(FlashCommand::EraseAll), 1);
    assert_eq!(dev.command_count(FlashCommand::WriteFirmwareBlock), 8);
    assert_eq!(dev.command_count(FlashCommand::WriteConfigBlock), 4);
    assert_eq!(dev.reset_count(), 1);
    assert!(!dev.in_bootloader());
}

#[test]
fn test_older_firmware_is_left_alone() {
    let image = builder().build_id(1_116_000).config_id(0x0031_00FF).build();
    let mut store = MemoryStore::with(DEFAULT_IMAGE_NAME, image);
    let mut session = open(DummyConfig::default());

    let report = session.auto_update(&mut store).unwrap();
    assert_eq!(report, UpdateReport::Skipped(SkipReason::UpToDate));
    assert!(session.device().commands().is_empty());
    assert_eq!(session.device().reset_count(), 0);
}

#[test]
fn test_same_firmware_newer_config_updates_ui_config() {
    let image = builder().build_id(1_116_007).config_id(0x0031_0006).build();
    let mut store = MemoryStore::with(DEFAULT_IMAGE_NAME, image.clone());
    let mut session = open(DummyConfig::default());

    let report = session.auto_update(&mut store).unwrap();
    assert!(matches!(
        report,
        UpdateReport::Applied {
            decision: UpdateDecision::UpdateConfigArea(ConfigArea::Ui),
            ..
        }
    ));

    let dev = session.device();
    assert_eq!(dev.command_count(FlashCommand::EraseAll), 0);
    assert_eq!(dev.command_count(FlashCommand::EraseUiConfig), 1);
    assert_eq!(dev.command_count(FlashCommand::WriteFirmwareBlock), 0);
    assert_eq!(dev.config_area(ConfigArea::Ui), &image[0x180..]);
    assert!(dev.firmware().iter().all(|&b| b == 0xFF));

    // The new config id is now reported, so a second run is a no-op
    assert_eq!(
        session.auto_update(&mut store).unwrap(),
        UpdateReport::Skipped(SkipReason::UpToDate)
    );
}

#[test]
fn test_same_firmware_same_config_is_up_to_date() {
    let image = builder().build_id(1_116_007).build();
    let mut store = MemoryStore::with(DEFAULT_IMAGE_NAME, image);
    let mut session = open(DummyConfig::default());
    assert_eq!(
        session.auto_update(&mut store).unwrap(),
        UpdateReport::Skipped(SkipReason::UpToDate)
    );
    assert_eq!(session.device().reset_count(), 0);
}

#[test]
fn test_version_from_image_name() {
    let name = "s3202_PR1116010_ver2.img";
    let mut store = MemoryStore::with(name, builder().build());
    let mut session = UpdateSession::open(
        DummyTouch::new_default(),
        SessionOptions {
            image_name: Some(name.to_string()),
            ..options()
        },
    )
    .unwrap();

    let report = session.auto_update(&mut store).unwrap();
    assert!(matches!(
        report,
        UpdateReport::Applied {
            decision: UpdateDecision::UpdateFirmware,
            ..
        }
    ));
}

#[test]
fn test_missing_version_token_skips() {
    let name = "firmware.img";
    let mut store = MemoryStore::with(name, builder().build());
    let mut session = UpdateSession::open(
        DummyTouch::new_default(),
        SessionOptions {
            image_name: Some(name.to_string()),
            ..options()
        },
    )
    .unwrap();

    assert_eq!(
        session.auto_update(&mut store).unwrap(),
        UpdateReport::Skipped(SkipReason::NoVersionToken)
    );
    assert_eq!(session.device().write_count(), 0);
}

#[test]
fn test_missing_image_is_reported() {
    let mut store = MemoryStore::default();
    let mut session = open(DummyConfig::default());
    assert_eq!(session.auto_update(&mut store), Err(Error::ImageNotFound));
    assert_eq!(session.device().reset_count(), 0);
}

#[test]
fn test_force_flashes_older_firmware() {
    let image = builder().build_id(1_000_000).build();
    let mut store = MemoryStore::with(DEFAULT_IMAGE_NAME, image);
    let mut session = open(DummyConfig::default());
    session.set_force(true);

    let report = session.auto_update(&mut store).unwrap();
    assert!(matches!(
        report,
        UpdateReport::Applied {
            decision: UpdateDecision::UpdateFirmware,
            ..
        }
    ));
}

#[test]
fn test_vendor_mismatch_skips_unless_forced() {
    let image = builder().build_id(1_116_008).config_id(0x0042_0005).build();
    let mut session = open(DummyConfig::default());

    assert_eq!(
        session.update_with_image(&image).unwrap(),
        UpdateReport::Skipped(SkipReason::VendorMismatch {
            image: 0x42,
            device: 0x31
        })
    );
    assert!(session.device().commands().is_empty());

    session.set_force(true);
    assert!(matches!(
        session.update_with_image(&image).unwrap(),
        UpdateReport::Applied { .. }
    ));
}

#[test]
fn test_device_in_bootloader_is_recovered() {
    let mut session = open(DummyConfig {
        start_in_bootloader: true,
        ..DummyConfig::default()
    });
    assert!(session.device_status().unwrap().flash_prog());

    // Vendor byte differs, but a device in the bootloader cannot be checked
    let image = builder().config_id(0x0042_0001).build();
    let mut store = MemoryStore::with(DEFAULT_IMAGE_NAME, image);
    let report = session.auto_update(&mut store).unwrap();

    assert!(matches!(
        report,
        UpdateReport::Applied {
            decision: UpdateDecision::UpdateFirmware,
            ..
        }
    ));
    assert!(!report.in_programming_mode());
    let dev = session.device();
    assert_eq!(dev.command_count(FlashCommand::EnableFlashProgramming), 0);
    assert!(!dev.in_bootloader());
}

#[test]
fn test_block_failure_stops_and_resets() {
    let image = builder().build();
    let mut session = open(DummyConfig::default());
    session.device_mut().fail_block(Some(3));

    assert_eq!(
        session.update_with_image(&image),
        Err(Error::BlockProgrammingFailed {
            block: 3,
            status: crate::STATUS_PROGRAM_ERROR
        })
    );

    let dev = session.device();
    assert_eq!(dev.command_count(FlashCommand::WriteFirmwareBlock), 4);
    assert_eq!(dev.command_count(FlashCommand::WriteConfigBlock), 0);
    assert_eq!(dev.reset_count(), 1);
    // Firmware was erased, so the device comes back in the bootloader
    assert!(dev.in_bootloader());
    assert!(session.device_status().unwrap().flash_prog());
}

#[test]
fn test_stuck_command_times_out() {
    let image = builder().build();
    let mut session = open(DummyConfig::default());
    session.device_mut().set_busy_polls(u32::MAX);

    assert_eq!(session.update_with_image(&image), Err(Error::Timeout));

    // 1 ms at 100 us per poll: 11 polls plus the final read
    let dev = session.device();
    assert_eq!(dev.control_reads(), 12);
    assert_eq!(dev.elapsed_us(), 11 * 100);
    assert_eq!(dev.reset_count(), 1);
}

#[test]
fn test_slow_commands_complete() {
    let image = builder().build();
    let mut session = open(DummyConfig {
        busy_polls: 3,
        ..DummyConfig::default()
    });
    assert!(session.update_with_image(&image).is_ok());
    assert_eq!(session.device().firmware(), &image[0x100..0x180]);
}

#[test]
fn test_short_payload_rejected_before_erase() {
    let image = builder().firmware(vec![0xAA; 100]).build();
    let mut session = open(DummyConfig::default());

    assert_eq!(session.update_with_image(&image), Err(Error::MalformedImage));
    let dev = session.device();
    assert!(!dev.commands().iter().any(|&c| is_erase(c)));
    assert_eq!(dev.reset_count(), 1);
    assert!(!dev.in_bootloader());
}

#[test]
fn test_truncated_image_never_touches_flash() {
    let mut image = builder().build();
    image.truncate(0x120);
    let mut session = open(DummyConfig::default());
    assert_eq!(session.update_with_image(&image), Err(Error::MalformedImage));
    assert_eq!(session.device().write_count(), 0);
}

#[test]
fn test_sensor_id_selects_vendor_image() {
    let vendor_name = "PR1116007_00000002.vendor2.img";
    let image = builder().build_id(1_116_009).build();
    let mut store = MemoryStore::with(vendor_name, image);
    let mut session = UpdateSession::open(
        DummyTouch::new(DummyConfig {
            sensor_id: 0x0020,
            ..DummyConfig::default()
        }),
        SessionOptions {
            sensor_id: Some(SensorIdPins { first: 2, second: 5 }),
            ..options()
        },
    )
    .unwrap();

    assert_eq!(session.resolve_image_name().unwrap(), vendor_name);
    assert_eq!(session.device().reset_count(), 1);
    assert!(!session.device().in_bootloader());

    assert!(session.auto_update(&mut store).is_ok());
    assert_eq!(store.requested, [vendor_name]);
}

#[test]
fn test_sensor_id_both_pins_high_uses_base_name() {
    let mut session = UpdateSession::open(
        DummyTouch::new(DummyConfig {
            sensor_id: 0xFFFF,
            ..DummyConfig::default()
        }),
        SessionOptions {
            sensor_id: Some(SensorIdPins { first: 2, second: 5 }),
            ..options()
        },
    )
    .unwrap();
    assert_eq!(session.resolve_image_name().unwrap(), "PR1116007_00000002.img");
}

#[test]
fn test_attention_filters_f34_interrupts() {
    let mut session = open(DummyConfig::default());
    assert_eq!(session.attention(0x01).unwrap(), None);
    let fc = session.attention(0x02).unwrap().unwrap();
    assert!(fc.is_idle());
}

fn surface(store: MemoryStore) -> ControlSurface<DummyTouch, MemoryStore> {
    ControlSurface::new(open(DummyConfig::default()), store)
}

#[test]
fn test_display_config_round_trip() {
    let mut ctl = surface(MemoryStore::default());
    let data: Vec<u8> = (0..32).map(|i| 0x80 + i as u8).collect();

    ctl.store("configarea", "3\n").unwrap();
    ctl.store("imagesize", "32").unwrap();
    assert_eq!(ctl.write_data(&data[..20]).unwrap(), 20);
    assert_eq!(ctl.write_data(&data[20..]).unwrap(), 12);
    ctl.store("writeconfig", "1").unwrap();
    assert_eq!(ctl.session().staged_len(), 0);
    assert_eq!(ctl.session().device().config_area(ConfigArea::Display), &data[..]);
    assert_eq!(
        ctl.session().device().command_count(FlashCommand::EraseDisplayConfig),
        1
    );

    ctl.store("readconfig", "1").unwrap();
    let mut buf = [0u8; 48];
    assert_eq!(ctl.read_data(&mut buf).unwrap(), 32);
    assert_eq!(&buf[..32], &data[..]);

    let mut small = [0u8; 16];
    assert_eq!(ctl.read_data(&mut small), Err(Error::BufferTooSmall));
}

#[test]
fn test_permanent_config_is_not_erased() {
    let mut ctl = surface(MemoryStore::default());
    let data = vec![0x11; 32];

    ctl.store("configarea", "1").unwrap();
    ctl.store("imagesize", "32").unwrap();
    ctl.write_data(&data).unwrap();
    ctl.store("writeconfig", "1").unwrap();

    let dev = ctl.session().device();
    assert!(!dev.commands().iter().any(|&c| is_erase(c)));
    assert_eq!(dev.command_count(FlashCommand::WriteConfigBlock), 2);
    assert_eq!(dev.config_area(ConfigArea::Permanent), &data[..]);
}

#[test]
fn test_bootloader_config_round_trip() {
    let config = DummyConfig {
        bl_config_blocks: Some(2),
        ..DummyConfig::default()
    };
    let mut ctl = ControlSurface::new(open(config), MemoryStore::default());
    let data: Vec<u8> = (0..32).map(|i| 0x40 ^ i as u8).collect();

    assert_eq!(ctl.show("blconfigblockcount").unwrap(), "2\n");
    ctl.store("configarea", "2").unwrap();
    ctl.store("imagesize", "32").unwrap();
    ctl.write_data(&data).unwrap();
    ctl.store("writeconfig", "1").unwrap();

    let dev = ctl.session().device();
    assert_eq!(
        dev.commands(),
        [
            FlashCommand::EnableFlashProgramming.opcode(),
            FlashCommand::EraseBootloaderConfig.opcode(),
            FlashCommand::WriteConfigBlock.opcode(),
            FlashCommand::WriteConfigBlock.opcode(),
        ]
    );
    assert_eq!(dev.config_area(ConfigArea::Bootloader), &data[..]);
    assert_eq!(dev.reset_count(), 1);

    ctl.store("readconfig", "1").unwrap();
    let dev = ctl.session().device();
    assert_eq!(dev.block_selects().last(), Some(&[0, 2 << 5]));
    assert_eq!(dev.command_count(FlashCommand::ReadConfigBlock), 2);
    let mut buf = [0u8; 32];
    assert_eq!(ctl.read_data(&mut buf).unwrap(), 32);
    assert_eq!(&buf[..], &data[..]);
}

#[test]
fn test_permanent_config_round_trip() {
    let mut ctl = surface(MemoryStore::default());
    let data: Vec<u8> = (0..32).map(|i| 0xA0 + i as u8).collect();

    ctl.store("configarea", "1").unwrap();
    ctl.store("imagesize", "32").unwrap();
    ctl.write_data(&data).unwrap();
    ctl.store("writeconfig", "1").unwrap();
    ctl.store("readconfig", "1").unwrap();

    let dev = ctl.session().device();
    assert_eq!(dev.block_selects().last(), Some(&[0, 1 << 5]));
    assert!(!dev.commands().iter().any(|&c| is_erase(c)));
    let mut buf = [0u8; 32];
    assert_eq!(ctl.read_data(&mut buf).unwrap(), 32);
    assert_eq!(&buf[..], &data[..]);
}

#[test]
fn test_absent_area_is_rejected() {
    let mut ctl = surface(MemoryStore::default());
    ctl.store("configarea", "2").unwrap();
    ctl.store("imagesize", "16").unwrap();
    ctl.write_data(&[0; 16]).unwrap();

    assert_eq!(
        ctl.store("writeconfig", "1"),
        Err(Error::CapabilityUnsupported(ConfigArea::Bootloader))
    );
    assert_eq!(ctl.session().staged_len(), 0);
    assert_eq!(
        ctl.store("readconfig", "1"),
        Err(Error::CapabilityUnsupported(ConfigArea::Bootloader))
    );
    assert_eq!(ctl.session().device().write_count(), 0);
}

#[test]
fn test_ui_config_write_takes_full_image() {
    let image = builder().config_id(0x0031_0009).build();
    let mut ctl = surface(MemoryStore::default());
    ctl.store("imagesize", &image.len().to_string()).unwrap();
    ctl.write_data(&image).unwrap();
    ctl.store("writeconfig", "1").unwrap();

    let dev = ctl.session().device();
    assert_eq!(dev.config_area(ConfigArea::Ui), &image[0x180..]);
    assert_eq!(dev.command_count(FlashCommand::WriteFirmwareBlock), 0);
}

#[test]
fn test_doreflash_applies_staged_image() {
    let image = builder().build_id(1).build();
    let mut ctl = surface(MemoryStore::default());

    ctl.store("imagesize", &image.len().to_string()).unwrap();
    for chunk in image.chunks(100) {
        ctl.write_data(chunk).unwrap();
    }
    assert_eq!(ctl.write_data(&[0]), Err(Error::StagingOverflow));
    ctl.store("doreflash", "1").unwrap();

    // Pushed images skip the version comparison
    assert!(matches!(
        ctl.last_report(),
        Some(UpdateReport::Applied {
            decision: UpdateDecision::UpdateFirmware,
            ..
        })
    ));
    assert_eq!(ctl.session().staged_len(), 0);
    assert_eq!(ctl.session().device().firmware(), &image[0x100..0x180]);
}

#[test]
fn test_doreflash_without_staged_image_loads_from_store() {
    let image = builder().build_id(1_116_008).build();
    let mut ctl = surface(MemoryStore::with(DEFAULT_IMAGE_NAME, image));
    ctl.store("doreflash", "1").unwrap();
    assert!(matches!(
        ctl.last_report(),
        Some(UpdateReport::Applied { .. })
    ));
}

#[test]
fn test_fwupdate_by_name() {
    let name = "PR1116007_custom.img";
    let image = builder().build_id(1_116_008).build();
    let mut ctl = surface(MemoryStore::with(name, image.clone()));

    ctl.store("fwupdate", name).unwrap();
    assert!(matches!(ctl.last_report(), Some(UpdateReport::Applied { .. })));
    assert!(!ctl.session().force());

    // The new firmware now reports the image build id
    ctl.session_mut().device_mut().set_firmware_id(1_116_008);
    ctl.session_mut().reset_device().unwrap();

    // Same image again: only the forced variant rewrites flash
    ctl.store("fwupdate", name).unwrap();
    assert_eq!(
        ctl.last_report(),
        Some(&UpdateReport::Skipped(SkipReason::UpToDate))
    );
    ctl.store("fwupdate_force", name).unwrap();
    assert!(matches!(ctl.last_report(), Some(UpdateReport::Applied { .. })));
    assert!(ctl.session().force());
}

#[test]
fn test_show_attributes() {
    let mut ctl = surface(MemoryStore::default());
    assert_eq!(ctl.show("blocksize").unwrap(), "16\n");
    assert_eq!(ctl.show("fwblockcount").unwrap(), "8\n");
    assert_eq!(ctl.show("configblockcount").unwrap(), "4\n");
    assert_eq!(ctl.show("permconfigblockcount").unwrap(), "2\n");
    assert_eq!(ctl.show("blconfigblockcount").unwrap(), "0\n");
    assert_eq!(ctl.show("dispconfigblockcount").unwrap(), "2\n");
    assert_eq!(ctl.show("configarea").unwrap(), "0\n");
    assert_eq!(ctl.show("doreflash"), Err(Error::InvalidArgument));

    ctl.store("force", "1").unwrap();
    assert_eq!(ctl.show("force").unwrap(), "1\n");
    assert_eq!(ctl.store("configarea", "4"), Err(Error::InvalidArgument));
    assert_eq!(ctl.store("blocksize", "32"), Err(Error::InvalidArgument));
    assert_eq!(ctl.store("doreflash", "2"), Err(Error::InvalidArgument));
}
