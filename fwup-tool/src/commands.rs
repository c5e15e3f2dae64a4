// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations operating on image files and flash dumps.

use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use fwup_common::executor::store_tag_record;
use fwup_common::layout::{EXTERNAL_FLASH_SIZE, INTERNAL_FLASH_BASE, INTERNAL_FLASH_SIZE};
use fwup_common::mem::MemFlash;
use fwup_common::tag::VERSION_LEN;
use fwup_common::validator::max_image_len;
use fwup_common::{
    classify, FlashBus, FlashDevice, FlashLayout, ImageKind, NorFlashBus, Outcome, UpdateError,
    UpdateHooks, UpdateReport, UpdateTag, Updater, ERASED_BYTE, TAG_RECORD_SIZE,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const LAYOUT: FlashLayout = FlashLayout::DEFAULT;

type DumpBus = NorFlashBus<MemFlash<Vec<u8>>, MemFlash<Vec<u8>>>;

/// Result of [`pack`].
#[derive(Debug, PartialEq, Eq)]
pub struct Packed {
    pub tag: UpdateTag,
    pub crc32: u32,
}

/// Write `staging.bin` (the image) and `tag.bin` (its record) into `out`.
pub fn pack(file: &Path, kind: ImageKind, version: &str, out: &Path) -> Result<Packed> {
    let image = read_image(file, kind)?;
    let version = check_version(version)?;

    let tag = UpdateTag::new(kind, LAYOUT.staging.start, image.len() as u32, version);
    let crc32 = CRC32.checksum(&image);

    fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let staging_path = out.join("staging.bin");
    let tag_path = out.join("tag.bin");
    fs::write(&staging_path, &image)
        .with_context(|| format!("Failed to write {}", staging_path.display()))?;
    fs::write(&tag_path, tag.to_bytes())
        .with_context(|| format!("Failed to write {}", tag_path.display()))?;

    println!(
        "Packed {} image: {} bytes, CRC32: 0x{:08x}",
        kind,
        image.len(),
        crc32
    );
    println!("  {}", staging_path.display());
    println!("  {}", tag_path.display());

    Ok(Packed { tag, crc32 })
}

/// Decode and classify a tag record.
///
/// Accepts a bare 24-byte record or a full internal flash dump.
pub fn inspect(file: &Path) -> Result<Outcome> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let raw: [u8; TAG_RECORD_SIZE] = if bytes.len() == TAG_RECORD_SIZE {
        bytes.as_slice().try_into()?
    } else if bytes.len() == INTERNAL_FLASH_SIZE as usize {
        let at = (LAYOUT.tag_address() - INTERNAL_FLASH_BASE) as usize;
        bytes[at..at + TAG_RECORD_SIZE].try_into()?
    } else {
        bail!(
            "{} is {} bytes: expected a {}-byte tag record or a {}-byte internal dump",
            file.display(),
            bytes.len(),
            TAG_RECORD_SIZE,
            INTERNAL_FLASH_SIZE
        );
    };

    let tag = UpdateTag::from_bytes(&raw);
    let outcome = classify(&raw, &LAYOUT);

    println!("Tag record:");
    println!("  Start address: 0x{:08x}", tag.start_address);
    println!("  Length:        {}", tag.length);
    println!("  Version:       {}", tag.version_str().unwrap_or("<not utf-8>"));
    match tag.kind() {
        Some(kind) => println!("  Image type:    {} ({})", tag.image_type, kind),
        None => println!("  Image type:    {} (unknown)", tag.image_type),
    }
    println!("  Upgrade type:  0x{:02x}", tag.upgrade_type);
    println!("Outcome:         {}", outcome);
    if let Outcome::NeedUpdate(plan) = outcome {
        println!(
            "  Copy 0x{:08x}..0x{:08x} -> 0x{:08x}",
            plan.source.start, plan.source.end, plan.destination.start
        );
    }

    Ok(outcome)
}

/// Put an image and its tag record into the dumps the way an OTA download
/// would, creating erased dumps when they do not exist yet.
pub fn stage(
    internal: &Path,
    external: &Path,
    file: &Path,
    kind: ImageKind,
    version: &str,
) -> Result<()> {
    let image = read_image(file, kind)?;
    let version = check_version(version)?;
    let mut bus = open_dumps(internal, external, true)?;

    let staging = LAYOUT.staging;
    bus.erase(staging.device, staging.start, staging.end)
        .context("Failed to erase staging")?;
    let mut cursor = staging.start;
    bus.write(staging.device, &mut cursor, &image)
        .context("Failed to write staging")?;

    let tag = UpdateTag::new(kind, staging.start, image.len() as u32, version);
    store_tag_record(&mut bus, &LAYOUT, &tag.to_bytes()).context("Failed to write tag record")?;

    save_dumps(bus, internal, external)?;
    info!(
        "Staged {} image ({} bytes, CRC32 0x{:08x})",
        kind,
        image.len(),
        CRC32.checksum(&image)
    );
    Ok(())
}

/// Progress bar and error log for an update pass.
struct ProgressHooks {
    bar: ProgressBar,
}

impl UpdateHooks for ProgressHooks {
    fn on_update_error(&mut self, kind: UpdateError) {
        self.bar.abandon();
        error!("Update error {}: {}", kind.code(), kind);
    }

    fn on_progress(&mut self, written: u32, total: u32) {
        self.bar.set_length(total as u64);
        self.bar.set_position(written as u64);
    }
}

/// Run the boot-time update pass against the dumps and save the result.
pub fn apply(internal: &Path, external: &Path) -> Result<UpdateReport> {
    let bus = open_dumps(internal, external, false)?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut updater = Updater::new(bus, &LAYOUT, ProgressHooks { bar });
    let report = updater.run_update();
    let (bus, hooks) = updater.into_parts();
    hooks.bar.finish_and_clear();

    match report {
        UpdateReport::Installed { plan, crc32 } => println!(
            "Installed {} image: {} bytes at 0x{:08x}, CRC32: 0x{:08x}",
            plan.kind, plan.length, plan.destination.start, crc32
        ),
        UpdateReport::Failed { plan, error } => {
            println!("{} update failed: {}", plan.kind, error)
        }
        UpdateReport::Idle { outcome, sweep } => {
            println!("No update ({}), staging sweep: {:?}", outcome, sweep)
        }
        UpdateReport::FlashUnavailable(device) => println!("Flash {:?} unavailable", device),
    }

    save_dumps(bus, internal, external)?;
    Ok(report)
}

/// Turn a failed pass into a non-zero exit status.
pub fn check_report(report: UpdateReport) -> Result<()> {
    match report {
        UpdateReport::Failed { error, .. } => bail!("Update failed: {}", error),
        UpdateReport::FlashUnavailable(device) => bail!("Flash {:?} unavailable", device),
        _ => Ok(()),
    }
}

// --- Helpers ---

fn read_image(file: &Path, kind: ImageKind) -> Result<Vec<u8>> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    ensure!(!image.is_empty(), "{} is empty", file.display());

    let limit = max_image_len(&LAYOUT, &LAYOUT.destination(kind));
    ensure!(
        image.len() <= limit as usize,
        "{} is {} bytes, {} images are limited to {} bytes",
        file.display(),
        image.len(),
        kind,
        limit
    );
    Ok(image)
}

fn check_version(version: &str) -> Result<&[u8]> {
    ensure!(
        version.len() <= VERSION_LEN,
        "Version '{}' is longer than {} bytes",
        version,
        VERSION_LEN
    );
    Ok(version.as_bytes())
}

fn load_dump(path: &Path, size: u32, create: bool) -> Result<MemFlash<Vec<u8>>> {
    let data = if create && !path.exists() {
        vec![ERASED_BYTE; size as usize]
    } else {
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
    };
    ensure!(
        data.len() == size as usize,
        "{} is {} bytes, expected {}",
        path.display(),
        data.len(),
        size
    );
    Ok(MemFlash::new(data))
}

fn open_dumps(internal: &Path, external: &Path, create: bool) -> Result<DumpBus> {
    let mut bus = NorFlashBus::new(
        load_dump(internal, INTERNAL_FLASH_SIZE, create)?,
        load_dump(external, EXTERNAL_FLASH_SIZE, create)?,
    );
    for device in FlashDevice::ALL {
        bus.init(device)?;
    }
    Ok(bus)
}

fn save_dumps(bus: DumpBus, internal: &Path, external: &Path) -> Result<()> {
    let (int_flash, ext_flash) = bus.into_inner();
    fs::write(internal, int_flash.into_inner())
        .with_context(|| format!("Failed to write {}", internal.display()))?;
    fs::write(external, ext_flash.into_inner())
        .with_context(|| format!("Failed to write {}", external.display()))?;
    Ok(())
}
