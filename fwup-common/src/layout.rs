// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash layout: devices, regions and the compiled-in board map.

use crate::tag::{ImageKind, TAG_RECORD_SIZE};

// --- Flash geometry constants ---

pub const FLASH_SECTOR_SIZE: u32 = 4096;
pub const CHUNK_SIZE: usize = 4096;
pub const ERASED_BYTE: u8 = 0xFF;

/// Internal flash is addressed through the XIP window.
pub const INTERNAL_FLASH_BASE: u32 = 0x1000_0000;
pub const INTERNAL_FLASH_SIZE: u32 = 2 * 1024 * 1024;

/// External data flash is addressed from zero.
pub const EXTERNAL_FLASH_BASE: u32 = 0x0000_0000;
pub const EXTERNAL_FLASH_SIZE: u32 = 896 * 1024;

// --- Default board map ---

pub const UPDATER_ADDR: u32 = 0x1000_0000; // this bootloader, never a destination
pub const BOOTLOADER_ADDR: u32 = 0x1000_C000;
pub const APPLICATION_ADDR: u32 = 0x1001_0000;
pub const APPLICATION_END: u32 = 0x100D_0000; // 768KB
pub const TAG_SECTOR_ADDR: u32 = 0x101F_F000;
pub const TAG_RECORD_OFFSET: u32 = 0x80;

pub const DRIVER_ADDR: u32 = 0x0000_0000;
pub const STAGING_ADDR: u32 = 0x0002_0000;
pub const STAGING_END: u32 = 0x000E_0000; // 768KB

/// A physical flash part reachable through the flash bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashDevice {
    /// On-chip (XIP) program flash.
    Internal,
    /// Separate data flash holding the driver image and the staging area.
    External,
}

impl FlashDevice {
    pub const ALL: [FlashDevice; 2] = [FlashDevice::Internal, FlashDevice::External];

    pub fn index(self) -> usize {
        match self {
            FlashDevice::Internal => 0,
            FlashDevice::External => 1,
        }
    }
}

/// Half-open address range `[start, end)` on one flash device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    pub device: FlashDevice,
    pub start: u32,
    pub end: u32,
}

impl Region {
    pub const fn new(device: FlashDevice, start: u32, end: u32) -> Self {
        Self { device, start, end }
    }

    pub const fn capacity(&self) -> u32 {
        self.end - self.start
    }

    pub const fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr < self.end
    }

    pub const fn overlaps(&self, other: &Region) -> bool {
        self.device as u8 == other.device as u8 && self.start < other.end && other.start < self.end
    }

    pub const fn is_sector_aligned(&self) -> bool {
        self.start % FLASH_SECTOR_SIZE == 0 && self.end % FLASH_SECTOR_SIZE == 0
    }
}

/// Why a layout cannot be used by the update engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayoutError {
    /// A region is empty or not on sector boundaries.
    Misaligned,
    /// The tag sector is not exactly one sector, or the record spills out of it.
    TagOutsideSector,
    /// Staging shares flash with a destination or the tag sector.
    StagingOverlap,
    /// Staging is smaller than some destination.
    StagingTooSmall,
}

/// Everything the engine needs to know about where things live in flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashLayout {
    pub bootloader: Region,
    pub application: Region,
    pub driver: Region,
    pub staging: Region,
    /// The one sector carrying the tag record alongside other data.
    pub tag_sector: Region,
    /// Offset of the tag record inside `tag_sector`.
    pub tag_offset: u32,
}

impl FlashLayout {
    pub const DEFAULT: Self = Self {
        bootloader: Region::new(FlashDevice::Internal, BOOTLOADER_ADDR, APPLICATION_ADDR),
        application: Region::new(FlashDevice::Internal, APPLICATION_ADDR, APPLICATION_END),
        driver: Region::new(FlashDevice::External, DRIVER_ADDR, STAGING_ADDR),
        staging: Region::new(FlashDevice::External, STAGING_ADDR, STAGING_END),
        tag_sector: Region::new(
            FlashDevice::Internal,
            TAG_SECTOR_ADDR,
            TAG_SECTOR_ADDR + FLASH_SECTOR_SIZE,
        ),
        tag_offset: TAG_RECORD_OFFSET,
    };

    /// Destination region an image of `kind` is installed into.
    pub const fn destination(&self, kind: ImageKind) -> Region {
        match kind {
            ImageKind::Bootloader => self.bootloader,
            ImageKind::Application => self.application,
            ImageKind::Driver => self.driver,
        }
    }

    /// Absolute address of the tag record.
    pub const fn tag_address(&self) -> u32 {
        self.tag_sector.start + self.tag_offset
    }

    pub const fn validate(&self) -> Result<(), LayoutError> {
        let regions = [
            self.bootloader,
            self.application,
            self.driver,
            self.staging,
            self.tag_sector,
        ];
        let mut i = 0;
        while i < regions.len() {
            if regions[i].start >= regions[i].end || !regions[i].is_sector_aligned() {
                return Err(LayoutError::Misaligned);
            }
            i += 1;
        }

        if self.tag_sector.capacity() != FLASH_SECTOR_SIZE
            || self.tag_offset as usize + TAG_RECORD_SIZE > FLASH_SECTOR_SIZE as usize
        {
            return Err(LayoutError::TagOutsideSector);
        }

        if self.staging.overlaps(&self.bootloader)
            || self.staging.overlaps(&self.application)
            || self.staging.overlaps(&self.driver)
            || self.staging.overlaps(&self.tag_sector)
        {
            return Err(LayoutError::StagingOverlap);
        }

        if self.staging.capacity() < self.bootloader.capacity()
            || self.staging.capacity() < self.application.capacity()
            || self.staging.capacity() < self.driver.capacity()
        {
            return Err(LayoutError::StagingTooSmall);
        }

        Ok(())
    }
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Compile-time layout check
const _: () = assert!(FlashLayout::DEFAULT.validate().is_ok());
const _: () = assert!(TAG_SECTOR_ADDR + FLASH_SECTOR_SIZE <= INTERNAL_FLASH_BASE + INTERNAL_FLASH_SIZE);
const _: () = assert!(STAGING_END <= EXTERNAL_FLASH_BASE + EXTERNAL_FLASH_SIZE);
