// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared fixtures: a full-size simulated board and a hook recorder.

#![allow(dead_code)]

use fwup_common::layout::{
    EXTERNAL_FLASH_BASE, EXTERNAL_FLASH_SIZE, INTERNAL_FLASH_BASE, INTERNAL_FLASH_SIZE,
};
use fwup_common::mem::MemFlash;
use fwup_common::{
    FlashDevice, FlashLayout, ImageKind, NorFlashBus, Region, UpdateError, UpdateHooks, UpdateTag,
    ERASED_BYTE, TAG_RECORD_SIZE,
};

pub type Bus = NorFlashBus<MemFlash<Vec<u8>>, MemFlash<Vec<u8>>>;

pub const LAYOUT: FlashLayout = FlashLayout::DEFAULT;

/// Both flash devices fully erased.
pub fn blank_bus() -> Bus {
    NorFlashBus::new(
        MemFlash::new(vec![ERASED_BYTE; INTERNAL_FLASH_SIZE as usize]),
        MemFlash::new(vec![ERASED_BYTE; EXTERNAL_FLASH_SIZE as usize]),
    )
}

/// Deterministic image bytes that are neither erased nor periodic per chunk.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

fn device_range(region: Region) -> (FlashDevice, usize, usize) {
    let base = match region.device {
        FlashDevice::Internal => INTERNAL_FLASH_BASE,
        FlashDevice::External => EXTERNAL_FLASH_BASE,
    };
    (
        region.device,
        (region.start - base) as usize,
        (region.end - base) as usize,
    )
}

pub fn region_bytes(bus: &Bus, region: Region) -> &[u8] {
    let (device, start, end) = device_range(region);
    match device {
        FlashDevice::Internal => &bus.internal().as_bytes()[start..end],
        FlashDevice::External => &bus.external().as_bytes()[start..end],
    }
}

pub fn region_bytes_mut(bus: &mut Bus, region: Region) -> &mut [u8] {
    let (device, start, end) = device_range(region);
    match device {
        FlashDevice::Internal => &mut bus.internal_mut().as_bytes_mut()[start..end],
        FlashDevice::External => &mut bus.external_mut().as_bytes_mut()[start..end],
    }
}

pub fn tag_bytes(bus: &Bus) -> [u8; TAG_RECORD_SIZE] {
    let offset = LAYOUT.tag_offset as usize;
    let sector = region_bytes(bus, LAYOUT.tag_sector);
    let mut raw = [0u8; TAG_RECORD_SIZE];
    raw.copy_from_slice(&sector[offset..offset + TAG_RECORD_SIZE]);
    raw
}

pub fn put_tag(bus: &mut Bus, raw: &[u8; TAG_RECORD_SIZE]) {
    let offset = LAYOUT.tag_offset as usize;
    region_bytes_mut(bus, LAYOUT.tag_sector)[offset..offset + TAG_RECORD_SIZE]
        .copy_from_slice(raw);
}

/// What the OTA download leaves behind: image in staging plus a tag record.
pub fn stage(bus: &mut Bus, kind: ImageKind, image: &[u8]) {
    region_bytes_mut(bus, LAYOUT.staging)[..image.len()].copy_from_slice(image);
    let tag = UpdateTag::new(kind, LAYOUT.staging.start, image.len() as u32, b"1.0.0");
    put_tag(bus, &tag.to_bytes());
}

/// Hooks that remember every call.
#[derive(Debug, Default)]
pub struct Recorder {
    pub errors: Vec<UpdateError>,
    pub progress: Vec<(u32, u32)>,
}

impl UpdateHooks for Recorder {
    fn on_update_error(&mut self, kind: UpdateError) {
        self.errors.push(kind);
    }

    fn on_progress(&mut self, written: u32, total: u32) {
        self.progress.push((written, total));
    }
}
