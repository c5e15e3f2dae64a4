// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update executor: installs a staged image or sweeps the staging area.
//!
//! Runs once per boot, before anything else touches flash:
//!
//! ```text
//! classify tag ──NeedUpdate──> erase destination
//!      │                        copy + verify every chunk
//!      │                        clear tag record
//!      │                        erase staging
//!      ├──anything else──> cleanup sweep (erase staging if not blank)
//!      └──read failed──> leave staging alone
//! ```
//!
//! The commit order is the crash-safety story. Until the tag is cleared, the
//! staging area is untouched, so a power cut anywhere before that point makes
//! the next boot redo the whole copy. The destination is erased before the
//! copy, so a verify failure leaves no bootable image of that kind.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::flash::{FlashBus, FlashError, FlashResult};
use crate::fmt::{debug, error, info, warn};
use crate::is_erased;
use crate::layout::{FlashDevice, FlashLayout, CHUNK_SIZE, ERASED_BYTE, FLASH_SECTOR_SIZE};
use crate::tag::{UpdateTag, TAG_RECORD_SIZE};
use crate::validator::{classify, Outcome, UpdatePlan};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Commit failure reported through [`UpdateHooks::on_update_error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateError {
    /// Destination erase, copy or read-back verification failed.
    ProgramTargetFailed,
    /// The tag record could not be cleared; the update will run again.
    EraseUpdateTagFailed,
    /// The staging area could not be erased.
    EraseUpdateDataFailed,
}

impl UpdateError {
    /// Stable numeric code, also used as the LED blink count.
    pub fn code(self) -> u8 {
        match self {
            UpdateError::ProgramTargetFailed => 1,
            UpdateError::EraseUpdateTagFailed => 2,
            UpdateError::EraseUpdateDataFailed => 3,
        }
    }
}

impl core::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            UpdateError::ProgramTargetFailed => "program target failed",
            UpdateError::EraseUpdateTagFailed => "erase update tag failed",
            UpdateError::EraseUpdateDataFailed => "erase update data failed",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UpdateError {}

/// What the cleanup sweep found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SweepResult {
    /// Every staging byte was already erased.
    Clean,
    /// Leftover data was found and the staging area was erased.
    Erased,
    /// Staging could not be read; nothing was erased.
    ReadFailed,
    /// Leftover data was found but the erase failed.
    EraseFailed,
    /// The tag record could not be read, so staging was left alone.
    Skipped,
}

/// Summary of one [`Updater::run_update`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateReport {
    /// A flash device refused to initialize; flash was not touched.
    FlashUnavailable(FlashDevice),
    /// No update was pending.
    Idle { outcome: Outcome, sweep: SweepResult },
    /// The staged image was installed and verified.
    Installed { plan: UpdatePlan, crc32: u32 },
    /// The commit stopped at `error`.
    Failed { plan: UpdatePlan, error: UpdateError },
}

/// Callbacks from the executor to the boot sequence.
pub trait UpdateHooks {
    /// Fire-and-forget commit failure notification.
    fn on_update_error(&mut self, kind: UpdateError);

    /// Called after each verified chunk.
    fn on_progress(&mut self, _written: u32, _total: u32) {}
}

impl<F: FnMut(UpdateError)> UpdateHooks for F {
    fn on_update_error(&mut self, kind: UpdateError) {
        self(kind)
    }
}

/// Hooks that ignore everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl UpdateHooks for NoHooks {
    fn on_update_error(&mut self, _kind: UpdateError) {}
}

/// Drives one boot-time update pass over a [`FlashBus`].
pub struct Updater<'l, B, H> {
    bus: B,
    layout: &'l FlashLayout,
    hooks: H,
}

impl<'l, B: FlashBus, H: UpdateHooks> Updater<'l, B, H> {
    /// `layout` must pass [`FlashLayout::validate`].
    pub fn new(bus: B, layout: &'l FlashLayout, hooks: H) -> Self {
        debug_assert!(layout.validate().is_ok(), "invalid flash layout");
        Self { bus, layout, hooks }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn into_parts(self) -> (B, H) {
        (self.bus, self.hooks)
    }

    /// Classify the tag record, then commit or sweep. Never fails: commit
    /// errors go to the hooks, everything else is logged.
    pub fn run_update(&mut self) -> UpdateReport {
        for (i, device) in FlashDevice::ALL.into_iter().enumerate() {
            if let Err(e) = self.bus.init(device) {
                error!("Flash {:?} init failed: {}", device, e);
                self.finalize_devices(&FlashDevice::ALL[..i]);
                return UpdateReport::FlashUnavailable(device);
            }
        }

        let report = self.run_initialized();
        self.finalize_devices(&FlashDevice::ALL);
        report
    }

    fn finalize_devices(&mut self, devices: &[FlashDevice]) {
        for &device in devices {
            if let Err(e) = self.bus.finalize(device) {
                warn!("Flash {:?} finalize failed: {}", device, e);
            }
        }
    }

    fn run_initialized(&mut self) -> UpdateReport {
        let outcome = match self.read_tag() {
            Ok(raw) => {
                let outcome = classify(&raw, self.layout);
                log_outcome(&raw, &outcome);
                outcome
            }
            Err(e) => {
                // A pending record may sit behind the failed read.
                error!("Tag record read failed, staging kept: {}", e);
                return UpdateReport::Idle {
                    outcome: Outcome::NotExist,
                    sweep: SweepResult::Skipped,
                };
            }
        };

        match outcome {
            Outcome::NeedUpdate(plan) => match self.commit(&plan) {
                Ok(crc32) => UpdateReport::Installed { plan, crc32 },
                Err(error) => {
                    self.hooks.on_update_error(error);
                    UpdateReport::Failed { plan, error }
                }
            },
            _ => {
                let sweep = self.cleanup_sweep();
                UpdateReport::Idle { outcome, sweep }
            }
        }
    }

    /// Read the raw tag record.
    pub fn read_tag(&mut self) -> FlashResult<[u8; TAG_RECORD_SIZE]> {
        load_tag_record(&mut self.bus, self.layout)
    }

    /// Make sure the staging area is blank: erase it once if any block holds
    /// data.
    pub fn cleanup_sweep(&mut self) -> SweepResult {
        let staging = self.layout.staging;
        let mut block = [0u8; CHUNK_SIZE];
        let mut cursor = staging.start;

        while cursor < staging.end {
            let n = ((staging.end - cursor) as usize).min(CHUNK_SIZE);
            let at = cursor;
            if let Err(e) = self.bus.read(staging.device, &mut cursor, &mut block[..n]) {
                error!("Staging read failed at 0x{:08x}: {}", at, e);
                return SweepResult::ReadFailed;
            }

            if !is_erased(&block[..n]) {
                info!("Leftover data in staging at 0x{:08x}, erasing", at);
                return match self.bus.erase(staging.device, staging.start, staging.end) {
                    Ok(()) => SweepResult::Erased,
                    Err(e) => {
                        error!("Staging erase failed: {}", e);
                        self.hooks.on_update_error(UpdateError::EraseUpdateDataFailed);
                        SweepResult::EraseFailed
                    }
                };
            }
        }

        debug!("Staging area is blank");
        SweepResult::Clean
    }

    /// Install `plan`: erase destination, copy and verify, clear the tag,
    /// erase staging. Returns the CRC-32 of the installed bytes.
    ///
    /// Stops at the first failure. A failed tag clear skips the staging erase
    /// so the next boot can still redo the copy.
    pub fn commit(&mut self, plan: &UpdatePlan) -> Result<u32, UpdateError> {
        let dest = plan.destination;
        info!(
            "Installing {} image: {} bytes to 0x{:08x}",
            plan.kind, plan.length, dest.start
        );

        if let Err(e) = self.bus.erase(dest.device, dest.start, dest.end) {
            error!("Destination erase failed: {}", e);
            return Err(UpdateError::ProgramTargetFailed);
        }

        let crc32 = self.copy_and_verify(plan)?;
        info!("Image copied and verified, CRC32 0x{:08x}", crc32);

        if let Err(e) = self.clear_tag() {
            error!("Tag record clear failed: {}", e);
            return Err(UpdateError::EraseUpdateTagFailed);
        }

        let staging = self.layout.staging;
        if let Err(e) = self.bus.erase(staging.device, staging.start, staging.end) {
            error!("Staging erase failed: {}", e);
            return Err(UpdateError::EraseUpdateDataFailed);
        }

        info!("Update complete");
        Ok(crc32)
    }

    /// Stream the image chunk by chunk. Source and destination cursors move
    /// independently; each chunk is read back and compared right after it is
    /// programmed.
    fn copy_and_verify(&mut self, plan: &UpdatePlan) -> Result<u32, UpdateError> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut readback = [0u8; CHUNK_SIZE];
        let mut digest = CRC32.digest();

        let total = plan.length;
        let mut src = plan.source.start;
        let mut dst = plan.destination.start;
        let mut remaining = total as usize;

        while remaining > 0 {
            let n = remaining.min(CHUNK_SIZE);

            if let Err(e) = self.bus.read(plan.source.device, &mut src, &mut chunk[..n]) {
                error!("Staging read failed at 0x{:08x}: {}", src, e);
                return Err(UpdateError::ProgramTargetFailed);
            }

            let chunk_addr = dst;
            if let Err(e) = self.bus.write(plan.destination.device, &mut dst, &chunk[..n]) {
                error!("Destination write failed at 0x{:08x}: {}", chunk_addr, e);
                return Err(UpdateError::ProgramTargetFailed);
            }

            let mut verify_cursor = chunk_addr;
            if let Err(e) =
                self.bus
                    .read(plan.destination.device, &mut verify_cursor, &mut readback[..n])
            {
                error!("Destination read-back failed at 0x{:08x}: {}", chunk_addr, e);
                return Err(UpdateError::ProgramTargetFailed);
            }

            if readback[..n] != chunk[..n] {
                error!("Verify mismatch in chunk at 0x{:08x}", chunk_addr);
                return Err(UpdateError::ProgramTargetFailed);
            }

            digest.update(&chunk[..n]);
            remaining -= n;
            self.hooks.on_progress(total - remaining as u32, total);
        }

        Ok(digest.finalize())
    }

    fn clear_tag(&mut self) -> FlashResult<()> {
        store_tag_record(&mut self.bus, self.layout, &UpdateTag::ERASED)
    }
}

fn log_outcome(raw: &[u8; TAG_RECORD_SIZE], outcome: &Outcome) {
    if outcome.is_error() {
        let tag = UpdateTag::from_bytes(raw);
        error!(
            "Invalid tag record ({}): start=0x{:08x} len={} type={} upgrade={}",
            outcome, tag.start_address, tag.length, tag.image_type, tag.upgrade_type
        );
    } else {
        debug!("Tag record: {}", outcome);
    }
}

/// Read the raw tag record from its sector.
pub fn load_tag_record<B: FlashBus>(
    bus: &mut B,
    layout: &FlashLayout,
) -> FlashResult<[u8; TAG_RECORD_SIZE]> {
    let mut raw = [0u8; TAG_RECORD_SIZE];
    let mut cursor = layout.tag_address();
    bus.read(layout.tag_sector.device, &mut cursor, &mut raw)?;
    Ok(raw)
}

/// Replace the tag record while keeping the rest of its sector.
///
/// Reads the sector into RAM, patches the record, erases, writes the sector
/// back and reads the record again to confirm.
pub fn store_tag_record<B: FlashBus>(
    bus: &mut B,
    layout: &FlashLayout,
    record: &[u8; TAG_RECORD_SIZE],
) -> FlashResult<()> {
    let sector = layout.tag_sector;
    let mut buf = [ERASED_BYTE; FLASH_SECTOR_SIZE as usize];

    let mut cursor = sector.start;
    bus.read(sector.device, &mut cursor, &mut buf)?;

    let offset = layout.tag_offset as usize;
    let slot = buf
        .get_mut(offset..offset + TAG_RECORD_SIZE)
        .ok_or(FlashError::OutOfBounds)?;
    slot.copy_from_slice(record);

    bus.erase(sector.device, sector.start, sector.end)?;
    let mut cursor = sector.start;
    bus.write(sector.device, &mut cursor, &buf)?;

    if load_tag_record(bus, layout)? != *record {
        return Err(FlashError::VerifyMismatch);
    }
    Ok(())
}
