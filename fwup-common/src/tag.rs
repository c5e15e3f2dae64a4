// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update tag record ("boot table"): a fixed 24-byte record telling the
//! bootloader that a staged image is waiting to be installed.
//!
//! Layout (little-endian, explicit offsets):
//!
//! | offset | size | field           |
//! |--------|------|-----------------|
//! | 0      | 4    | `start_address` |
//! | 4      | 4    | `length`        |
//! | 8      | 8    | `version`       |
//! | 16     | 1    | `image_type`    |
//! | 17     | 1    | `upgrade_type`  |
//! | 18     | 6    | reserved        |
//!
//! The record carries no format version of its own: changing any field width
//! or order silently breaks devices in the field.

use crate::layout::ERASED_BYTE;

pub const TAG_RECORD_SIZE: usize = 24;
pub const VERSION_LEN: usize = 8;

const START_ADDRESS_OFFSET: usize = 0;
const LENGTH_OFFSET: usize = 4;
const VERSION_OFFSET: usize = 8;
const IMAGE_TYPE_OFFSET: usize = 16;
const UPGRADE_TYPE_OFFSET: usize = 17;
const RESERVED_OFFSET: usize = 18;

/// `upgrade_type` value marking an actionable record.
pub const UPGRADE_TYPE_UPGRADE: u8 = 0x00;

/// Which destination a staged image targets.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageKind {
    Bootloader = 0x00,
    Application = 0x01,
    Driver = 0x02,
}

impl ImageKind {
    pub const ALL: [ImageKind; 3] = [
        ImageKind::Bootloader,
        ImageKind::Application,
        ImageKind::Driver,
    ];

    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(ImageKind::Bootloader),
            0x01 => Some(ImageKind::Application),
            0x02 => Some(ImageKind::Driver),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ImageKind::Bootloader => "bootloader",
            ImageKind::Application => "application",
            ImageKind::Driver => "driver",
        }
    }
}

impl core::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded tag record. Decoding is total: every byte pattern yields a value,
/// judging it is the validator's job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateTag {
    pub start_address: u32,
    pub length: u32,
    pub version: [u8; VERSION_LEN],
    pub image_type: u8,
    pub upgrade_type: u8,
    pub reserved: [u8; 6],
}

impl UpdateTag {
    /// Raw bytes of a record that has never been written (or was cleared).
    pub const ERASED: [u8; TAG_RECORD_SIZE] = [ERASED_BYTE; TAG_RECORD_SIZE];

    /// Build an actionable record for an image staged at `start_address`.
    ///
    /// `version` is truncated to 8 bytes and zero padded.
    pub fn new(kind: ImageKind, start_address: u32, length: u32, version: &[u8]) -> Self {
        let mut v = [0u8; VERSION_LEN];
        let n = version.len().min(VERSION_LEN);
        v[..n].copy_from_slice(&version[..n]);

        Self {
            start_address,
            length,
            version: v,
            image_type: kind.as_raw(),
            upgrade_type: UPGRADE_TYPE_UPGRADE,
            reserved: [ERASED_BYTE; 6],
        }
    }

    pub fn from_bytes(raw: &[u8; TAG_RECORD_SIZE]) -> Self {
        let mut version = [0u8; VERSION_LEN];
        version.copy_from_slice(&raw[VERSION_OFFSET..VERSION_OFFSET + VERSION_LEN]);
        let mut reserved = [0u8; 6];
        reserved.copy_from_slice(&raw[RESERVED_OFFSET..TAG_RECORD_SIZE]);

        Self {
            start_address: read_u32(raw, START_ADDRESS_OFFSET),
            length: read_u32(raw, LENGTH_OFFSET),
            version,
            image_type: raw[IMAGE_TYPE_OFFSET],
            upgrade_type: raw[UPGRADE_TYPE_OFFSET],
            reserved,
        }
    }

    pub fn to_bytes(&self) -> [u8; TAG_RECORD_SIZE] {
        let mut raw = [0u8; TAG_RECORD_SIZE];
        raw[START_ADDRESS_OFFSET..START_ADDRESS_OFFSET + 4]
            .copy_from_slice(&self.start_address.to_le_bytes());
        raw[LENGTH_OFFSET..LENGTH_OFFSET + 4].copy_from_slice(&self.length.to_le_bytes());
        raw[VERSION_OFFSET..VERSION_OFFSET + VERSION_LEN].copy_from_slice(&self.version);
        raw[IMAGE_TYPE_OFFSET] = self.image_type;
        raw[UPGRADE_TYPE_OFFSET] = self.upgrade_type;
        raw[RESERVED_OFFSET..].copy_from_slice(&self.reserved);
        raw
    }

    pub fn kind(&self) -> Option<ImageKind> {
        ImageKind::from_raw(self.image_type)
    }

    pub fn is_upgrade(&self) -> bool {
        self.upgrade_type == UPGRADE_TYPE_UPGRADE
    }

    /// Version as text, without zero or erased padding. `None` if not UTF-8.
    pub fn version_str(&self) -> Option<&str> {
        version_str(&self.version)
    }
}

/// Printable form of a raw version field.
pub fn version_str(version: &[u8; VERSION_LEN]) -> Option<&str> {
    let end = version
        .iter()
        .position(|&b| b == 0 || b == ERASED_BYTE)
        .unwrap_or(VERSION_LEN);
    core::str::from_utf8(&version[..end]).ok()
}

fn read_u32(raw: &[u8; TAG_RECORD_SIZE], offset: usize) -> u32 {
    u32::from_le_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}
