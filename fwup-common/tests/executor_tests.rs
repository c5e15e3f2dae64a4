// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot-time update runs against a simulated board.

mod common;

use common::{
    blank_bus, pattern, put_tag, region_bytes, region_bytes_mut, stage, tag_bytes, Bus, Recorder,
    LAYOUT,
};
use crc::{Crc, CRC_32_ISO_HDLC};
use fwup_common::executor::{load_tag_record, store_tag_record, NoHooks};
use fwup_common::flash::FlashResult;
use fwup_common::mem::Faults;
use fwup_common::{
    is_erased, FlashBus, FlashDevice, ImageKind, Outcome, SweepResult, UpdateError, UpdateReport,
    UpdateTag, Updater, FLASH_SECTOR_SIZE, TAG_RECORD_SIZE,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn run(bus: &mut Bus) -> (UpdateReport, Recorder) {
    let mut updater = Updater::new(bus, &LAYOUT, Recorder::default());
    let report = updater.run_update();
    let (_, hooks) = updater.into_parts();
    (report, hooks)
}

// =============================================================================
// Nothing pending
// =============================================================================

#[test]
fn test_blank_board_does_nothing() {
    let mut bus = blank_bus();
    let (report, hooks) = run(&mut bus);

    assert_eq!(
        report,
        UpdateReport::Idle {
            outcome: Outcome::NotExist,
            sweep: SweepResult::Clean,
        }
    );
    assert!(hooks.errors.is_empty());
    assert_eq!(bus.internal().erase_count(), 0);
    assert_eq!(bus.external().erase_count(), 0);
    assert_eq!(bus.internal().write_count(), 0);
}

#[test]
fn test_leftover_staging_data_is_swept() {
    for block in [0usize, 1, 100, 191] {
        let mut bus = blank_bus();
        let at = block * 4096 + 17;
        region_bytes_mut(&mut bus, LAYOUT.staging)[at] = 0x42;

        let (report, hooks) = run(&mut bus);

        assert_eq!(
            report,
            UpdateReport::Idle {
                outcome: Outcome::NotExist,
                sweep: SweepResult::Erased,
            },
            "block {block}"
        );
        assert!(hooks.errors.is_empty());
        assert_eq!(bus.external().erase_count(), 1, "one erase covers the region");
        assert!(is_erased(region_bytes(&bus, LAYOUT.staging)));
    }
}

#[test]
fn test_invalid_record_also_sweeps_staging() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(5000));
    let mut tag = UpdateTag::from_bytes(&tag_bytes(&bus));
    tag.start_address += 4;
    put_tag(&mut bus, &tag.to_bytes());

    let (report, _) = run(&mut bus);

    assert_eq!(
        report,
        UpdateReport::Idle {
            outcome: Outcome::StartAddressError,
            sweep: SweepResult::Erased,
        }
    );
    assert!(is_erased(region_bytes(&bus, LAYOUT.application)));
    // the corrupt record is left for inspection
    assert_eq!(tag_bytes(&bus), tag.to_bytes());
}

#[test]
fn test_sweep_erase_failure_is_reported() {
    let mut bus = blank_bus();
    region_bytes_mut(&mut bus, LAYOUT.staging)[0] = 0x00;
    bus.external_mut().set_faults(Faults {
        fail_erase: Some(1),
        ..Faults::default()
    });

    let (report, hooks) = run(&mut bus);

    assert_eq!(
        report,
        UpdateReport::Idle {
            outcome: Outcome::NotExist,
            sweep: SweepResult::EraseFailed,
        }
    );
    assert_eq!(hooks.errors, vec![UpdateError::EraseUpdateDataFailed]);
}

// =============================================================================
// Successful installs
// =============================================================================

#[test]
fn test_application_install() {
    let mut bus = blank_bus();
    let image = pattern(10_000);
    stage(&mut bus, ImageKind::Application, &image);

    let (report, hooks) = run(&mut bus);

    let UpdateReport::Installed { plan, crc32 } = report else {
        panic!("unexpected report {report:?}");
    };
    assert_eq!(plan.kind, ImageKind::Application);
    assert_eq!(crc32, CRC32.checksum(&image));
    assert!(hooks.errors.is_empty());

    let dest = region_bytes(&bus, LAYOUT.application);
    assert_eq!(&dest[..10_000], &image[..]);
    assert!(is_erased(&dest[10_000..]));
    assert_eq!(tag_bytes(&bus), UpdateTag::ERASED);
    assert!(is_erased(region_bytes(&bus, LAYOUT.staging)));
}

#[test]
fn test_install_replaces_previous_image() {
    let mut bus = blank_bus();
    region_bytes_mut(&mut bus, LAYOUT.application).fill(0x00);
    let image = pattern(6000);
    stage(&mut bus, ImageKind::Application, &image);

    let (report, _) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    let dest = region_bytes(&bus, LAYOUT.application);
    assert_eq!(&dest[..6000], &image[..]);
    assert!(is_erased(&dest[6000..]), "whole region erased first");
}

#[test]
fn test_driver_install_stays_on_external_flash() {
    let mut bus = blank_bus();
    let image = pattern(3000);
    stage(&mut bus, ImageKind::Driver, &image);

    let (report, _) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    assert_eq!(&region_bytes(&bus, LAYOUT.driver)[..3000], &image[..]);
    assert!(is_erased(region_bytes(&bus, LAYOUT.application)));
    assert!(is_erased(region_bytes(&bus, LAYOUT.bootloader)));
}

#[test]
fn test_bootloader_install_at_full_capacity() {
    let mut bus = blank_bus();
    let capacity = LAYOUT.bootloader.capacity() as usize;
    let image = pattern(capacity);
    stage(&mut bus, ImageKind::Bootloader, &image);

    let (report, _) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    assert_eq!(region_bytes(&bus, LAYOUT.bootloader), &image[..]);
}

#[test]
fn test_exact_chunk_multiple_has_no_empty_pass() {
    let mut bus = blank_bus();
    let image = pattern(8192);
    stage(&mut bus, ImageKind::Application, &image);

    let (report, hooks) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    assert_eq!(hooks.progress, vec![(4096, 8192), (8192, 8192)]);
    // two image chunks plus the tag sector write-back
    assert_eq!(bus.internal().write_count(), 3);
}

#[test]
fn test_progress_reports_remainder_chunk() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(10_000));

    let (_, hooks) = run(&mut bus);

    assert_eq!(
        hooks.progress,
        vec![(4096, 10_000), (8192, 10_000), (10_000, 10_000)]
    );
}

#[test]
fn test_tag_clear_keeps_sector_neighbours() {
    let mut bus = blank_bus();
    {
        let sector = region_bytes_mut(&mut bus, LAYOUT.tag_sector);
        sector[..0x80].fill(0x5A);
        sector[0x80 + TAG_RECORD_SIZE..0x200].fill(0xA5);
    }
    stage(&mut bus, ImageKind::Application, &pattern(100));

    let (report, _) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    let sector = region_bytes(&bus, LAYOUT.tag_sector);
    assert!(sector[..0x80].iter().all(|&b| b == 0x5A));
    assert!(is_erased(&sector[0x80..0x80 + TAG_RECORD_SIZE]));
    assert!(sector[0x80 + TAG_RECORD_SIZE..0x200].iter().all(|&b| b == 0xA5));
}

#[test]
fn test_second_boot_after_install_is_idle() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(10_000));
    run(&mut bus);
    let installed = region_bytes(&bus, LAYOUT.application).to_vec();

    let (report, _) = run(&mut bus);

    assert_eq!(
        report,
        UpdateReport::Idle {
            outcome: Outcome::NotExist,
            sweep: SweepResult::Clean,
        }
    );
    assert_eq!(region_bytes(&bus, LAYOUT.application), &installed[..]);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_bit_flip_in_second_chunk_fails_program() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(10_000));
    let tag_before = tag_bytes(&bus);
    bus.internal_mut().set_faults(Faults {
        corrupt_write: Some(2),
        ..Faults::default()
    });

    let (report, hooks) = run(&mut bus);

    assert!(matches!(
        report,
        UpdateReport::Failed {
            error: UpdateError::ProgramTargetFailed,
            ..
        }
    ));
    assert_eq!(hooks.errors, vec![UpdateError::ProgramTargetFailed]);
    assert_eq!(hooks.progress, vec![(4096, 10_000)], "stops at chunk 2");
    assert_eq!(tag_bytes(&bus), tag_before, "tag left pending");
    assert_eq!(
        &region_bytes(&bus, LAYOUT.staging)[..10_000],
        &pattern(10_000)[..]
    );
}

#[test]
fn test_destination_erase_failure_fails_program() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(100));
    bus.internal_mut().set_faults(Faults {
        fail_erase: Some(1),
        ..Faults::default()
    });

    let (_, hooks) = run(&mut bus);

    assert_eq!(hooks.errors, vec![UpdateError::ProgramTargetFailed]);
    assert_eq!(bus.internal().write_count(), 0, "nothing written after failed erase");
}

#[test]
fn test_write_failure_fails_program() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(9000));
    bus.internal_mut().set_faults(Faults {
        fail_write: Some(3),
        ..Faults::default()
    });

    let (_, hooks) = run(&mut bus);

    assert_eq!(hooks.errors, vec![UpdateError::ProgramTargetFailed]);
}

#[test]
fn test_failed_tag_clear_keeps_staging() {
    let mut bus = blank_bus();
    let image = pattern(10_000);
    stage(&mut bus, ImageKind::Application, &image);
    bus.internal_mut().set_faults(Faults {
        fail_erase: Some(2), // 1: application region, 2: tag sector
        ..Faults::default()
    });

    let (report, hooks) = run(&mut bus);

    assert!(matches!(
        report,
        UpdateReport::Failed {
            error: UpdateError::EraseUpdateTagFailed,
            ..
        }
    ));
    assert_eq!(hooks.errors, vec![UpdateError::EraseUpdateTagFailed]);
    assert_eq!(&region_bytes(&bus, LAYOUT.staging)[..10_000], &image[..]);
    assert_eq!(bus.external().erase_count(), 0);

    // next boot installs again from the intact staging copy
    bus.internal_mut().reboot();
    let (report, _) = run(&mut bus);
    assert!(matches!(report, UpdateReport::Installed { .. }));
    assert_eq!(&region_bytes(&bus, LAYOUT.application)[..10_000], &image[..]);
}

#[test]
fn test_staging_erase_failure_is_reported() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(10_000));
    bus.external_mut().set_faults(Faults {
        fail_erase: Some(1),
        ..Faults::default()
    });

    let (report, hooks) = run(&mut bus);

    assert!(matches!(
        report,
        UpdateReport::Failed {
            error: UpdateError::EraseUpdateDataFailed,
            ..
        }
    ));
    assert_eq!(hooks.errors, vec![UpdateError::EraseUpdateDataFailed]);
    assert_eq!(tag_bytes(&bus), UpdateTag::ERASED);
}

// =============================================================================
// Power loss and retry
// =============================================================================

fn installed_once(image: &[u8]) -> Vec<u8> {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, image);
    run(&mut bus);
    region_bytes(&bus, LAYOUT.application).to_vec()
}

#[test]
fn test_power_loss_mid_copy_is_recovered_next_boot() {
    let image = pattern(10_000);
    let reference = installed_once(&image);

    for cut_after in 1..=5 {
        let mut bus = blank_bus();
        stage(&mut bus, ImageKind::Application, &image);
        bus.internal_mut().set_faults(Faults {
            power_loss_after: Some(cut_after),
            ..Faults::default()
        });
        run(&mut bus);
        assert_ne!(tag_bytes(&bus), UpdateTag::ERASED, "cut after {cut_after}");

        bus.internal_mut().reboot();
        let (report, _) = run(&mut bus);

        assert!(
            matches!(report, UpdateReport::Installed { .. }),
            "cut after {cut_after}: {report:?}"
        );
        assert_eq!(region_bytes(&bus, LAYOUT.application), &reference[..]);
    }
}

#[test]
fn test_commit_twice_matches_commit_once() {
    let image = pattern(20_000);
    let reference = installed_once(&image);

    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &image);
    let tag = tag_bytes(&bus);
    run(&mut bus);

    // put the record and image back as if the first run never cleared them
    put_tag(&mut bus, &tag);
    region_bytes_mut(&mut bus, LAYOUT.staging)[..image.len()].copy_from_slice(&image);
    let (report, _) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    assert_eq!(region_bytes(&bus, LAYOUT.application), &reference[..]);
}

#[test]
fn test_unreadable_staging_fails_program() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(10_000));
    bus.external_mut().set_faults(Faults {
        power_loss_after: Some(0),
        ..Faults::default()
    });

    let (report, hooks) = run(&mut bus);

    assert!(matches!(
        report,
        UpdateReport::Failed {
            error: UpdateError::ProgramTargetFailed,
            ..
        }
    ));
    assert_eq!(hooks.errors, vec![UpdateError::ProgramTargetFailed]);
    assert_eq!(bus.internal().write_count(), 0);
}

#[test]
fn test_power_loss_after_tag_clear_is_swept_next_boot() {
    let image = pattern(10_000);
    // power goes at the staging erase, after the tag is already cleared
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &image);
    bus.external_mut().set_faults(Faults {
        fail_erase: Some(1),
        ..Faults::default()
    });
    run(&mut bus);
    assert_eq!(tag_bytes(&bus), UpdateTag::ERASED);
    assert!(!is_erased(region_bytes(&bus, LAYOUT.staging)));

    bus.external_mut().reboot();
    let (report, _) = run(&mut bus);

    assert_eq!(
        report,
        UpdateReport::Idle {
            outcome: Outcome::NotExist,
            sweep: SweepResult::Erased,
        }
    );
    assert_eq!(&region_bytes(&bus, LAYOUT.application)[..10_000], &image[..]);
    assert!(is_erased(region_bytes(&bus, LAYOUT.staging)));
}

#[test]
fn test_unreadable_tag_keeps_staging_and_application() {
    let image = pattern(10_000);
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &image);
    region_bytes_mut(&mut bus, LAYOUT.application)[..4].copy_from_slice(&[1, 2, 3, 4]);
    let tag = tag_bytes(&bus);
    bus.internal_mut().set_faults(Faults {
        power_loss_after: Some(0),
        ..Faults::default()
    });

    let (report, hooks) = run(&mut bus);

    assert_eq!(
        report,
        UpdateReport::Idle {
            outcome: Outcome::NotExist,
            sweep: SweepResult::Skipped,
        }
    );
    assert!(hooks.errors.is_empty());
    assert_eq!(bus.external().erase_count(), 0);
    assert_eq!(&region_bytes(&bus, LAYOUT.staging)[..image.len()], &image[..]);
    assert_eq!(tag_bytes(&bus), tag);
    assert_eq!(&region_bytes(&bus, LAYOUT.application)[..4], &[1, 2, 3, 4]);

    // the record is still there once the flash reads again
    bus.internal_mut().reboot();
    let (report, _) = run(&mut bus);

    assert!(matches!(report, UpdateReport::Installed { .. }));
    assert_eq!(&region_bytes(&bus, LAYOUT.application)[..image.len()], &image[..]);
    assert!(is_erased(region_bytes(&bus, LAYOUT.staging)));
}

// =============================================================================
// Tag record helpers and bus failures
// =============================================================================

#[test]
fn test_store_and_load_tag_record() {
    let mut bus = blank_bus();
    let tag = UpdateTag::new(ImageKind::Driver, LAYOUT.staging.start, 42, b"rf-3");
    bus.init(FlashDevice::Internal).unwrap();

    store_tag_record(&mut bus, &LAYOUT, &tag.to_bytes()).unwrap();
    let raw = load_tag_record(&mut bus, &LAYOUT).unwrap();

    assert_eq!(UpdateTag::from_bytes(&raw), tag);
}

#[test]
fn test_store_tag_record_detects_bad_readback() {
    let mut bus = blank_bus();
    bus.init(FlashDevice::Internal).unwrap();
    bus.internal_mut().set_faults(Faults {
        corrupt_write: Some(1),
        ..Faults::default()
    });
    let tag = UpdateTag::new(ImageKind::Driver, LAYOUT.staging.start, 42, b"rf-3");

    // corruption lands on sector byte 0, outside the record
    assert!(store_tag_record(&mut bus, &LAYOUT, &tag.to_bytes()).is_ok());

    let mut layout = LAYOUT;
    layout.tag_offset = 0;
    bus.internal_mut().set_faults(Faults {
        corrupt_write: Some(2),
        ..Faults::default()
    });
    assert_eq!(
        store_tag_record(&mut bus, &layout, &tag.to_bytes()),
        Err(fwup_common::FlashError::VerifyMismatch)
    );
}

#[test]
fn test_store_tag_record_rejects_record_past_sector_end() {
    let mut bus = blank_bus();
    bus.init(FlashDevice::Internal).unwrap();
    let mut layout = LAYOUT;
    layout.tag_offset = FLASH_SECTOR_SIZE - 8;
    let tag = UpdateTag::new(ImageKind::Driver, LAYOUT.staging.start, 42, b"rf-3");

    assert_eq!(
        store_tag_record(&mut bus, &layout, &tag.to_bytes()),
        Err(fwup_common::FlashError::OutOfBounds)
    );
    assert_eq!(bus.internal().erase_count(), 0);
    assert_eq!(bus.internal().write_count(), 0);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "invalid flash layout")]
fn test_updater_rejects_invalid_layout() {
    let mut layout = LAYOUT;
    layout.tag_offset = FLASH_SECTOR_SIZE - 8;
    let mut bus = blank_bus();
    let _ = Updater::new(&mut bus, &layout, NoHooks);
}

struct DeadBus;

impl FlashBus for DeadBus {
    fn init(&mut self, _device: FlashDevice) -> FlashResult<()> {
        Err(fwup_common::FlashError::Device)
    }

    fn erase(&mut self, _device: FlashDevice, _start: u32, _end: u32) -> FlashResult<()> {
        panic!("erase on dead bus");
    }

    fn read(&mut self, _device: FlashDevice, _cursor: &mut u32, _buf: &mut [u8]) -> FlashResult<()> {
        panic!("read on dead bus");
    }

    fn write(&mut self, _device: FlashDevice, _cursor: &mut u32, _data: &[u8]) -> FlashResult<()> {
        panic!("write on dead bus");
    }

    fn finalize(&mut self, _device: FlashDevice) -> FlashResult<()> {
        Ok(())
    }
}

#[test]
fn test_flash_init_failure_touches_nothing() {
    let report = Updater::new(DeadBus, &LAYOUT, NoHooks).run_update();
    assert_eq!(report, UpdateReport::FlashUnavailable(FlashDevice::Internal));
}

/// Internal flash comes up, external flash does not.
#[derive(Default)]
struct NoExternalBus {
    finalized: Vec<FlashDevice>,
}

impl FlashBus for NoExternalBus {
    fn init(&mut self, device: FlashDevice) -> FlashResult<()> {
        match device {
            FlashDevice::Internal => Ok(()),
            FlashDevice::External => Err(fwup_common::FlashError::Device),
        }
    }

    fn erase(&mut self, _device: FlashDevice, _start: u32, _end: u32) -> FlashResult<()> {
        panic!("erase without external flash");
    }

    fn read(&mut self, _device: FlashDevice, _cursor: &mut u32, _buf: &mut [u8]) -> FlashResult<()> {
        panic!("read without external flash");
    }

    fn write(&mut self, _device: FlashDevice, _cursor: &mut u32, _data: &[u8]) -> FlashResult<()> {
        panic!("write without external flash");
    }

    fn finalize(&mut self, device: FlashDevice) -> FlashResult<()> {
        self.finalized.push(device);
        Ok(())
    }
}

#[test]
fn test_external_init_failure_releases_internal_flash() {
    let mut updater = Updater::new(NoExternalBus::default(), &LAYOUT, Recorder::default());
    let report = updater.run_update();
    let (bus, hooks) = updater.into_parts();

    assert_eq!(report, UpdateReport::FlashUnavailable(FlashDevice::External));
    assert_eq!(bus.finalized, vec![FlashDevice::Internal]);
    assert!(hooks.errors.is_empty());
}

#[test]
fn test_closure_hooks_receive_errors() {
    let mut bus = blank_bus();
    stage(&mut bus, ImageKind::Application, &pattern(100));
    bus.internal_mut().set_faults(Faults {
        fail_erase: Some(1),
        ..Faults::default()
    });

    let mut seen = Vec::new();
    Updater::new(&mut bus, &LAYOUT, |kind: UpdateError| seen.push(kind)).run_update();

    assert_eq!(seen, vec![UpdateError::ProgramTargetFailed]);
}
