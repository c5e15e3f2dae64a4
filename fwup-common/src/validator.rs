// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tag record classification - pure logic without hardware dependencies.
//!
//! [`classify`] looks at the raw record and decides whether a staged image
//! must be installed. The destination region travels inside the
//! [`Outcome::NeedUpdate`] plan, so nothing is remembered between
//! classification and commit.

use crate::is_erased;
use crate::layout::{FlashLayout, Region};
use crate::tag::{ImageKind, UpdateTag, TAG_RECORD_SIZE, VERSION_LEN};

/// Everything the executor needs to install one staged image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdatePlan {
    pub kind: ImageKind,
    pub length: u32,
    pub version: [u8; VERSION_LEN],
    /// Staging bytes `[start, start + length)`.
    pub source: Region,
    /// Full destination region; erased entirely before the copy.
    pub destination: Region,
}

/// Result of inspecting the tag record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Record is fully erased: nothing pending.
    NotExist,
    /// Record is valid: install the staged image.
    NeedUpdate(UpdatePlan),
    /// `upgrade_type` is not the upgrade marker.
    UpdateTagNotExist,
    /// `start_address` is not the staging base.
    StartAddressError,
    /// `image_type` names no known destination.
    ContentTypeNotExist,
    /// `length` does not fit the destination.
    DataLengthOverflow,
    /// `length` is zero; committing would only wipe the destination.
    ImageEmpty,
}

impl Outcome {
    /// True for records that exist but cannot be acted on.
    pub fn is_error(&self) -> bool {
        !matches!(self, Outcome::NotExist | Outcome::NeedUpdate(_))
    }

    pub fn plan(&self) -> Option<&UpdatePlan> {
        match self {
            Outcome::NeedUpdate(plan) => Some(plan),
            _ => None,
        }
    }

    /// Stable numeric code for logs and host tooling.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::NotExist => 0,
            Outcome::NeedUpdate(_) => 1,
            Outcome::UpdateTagNotExist => 2,
            Outcome::StartAddressError => 3,
            Outcome::ContentTypeNotExist => 4,
            Outcome::DataLengthOverflow => 5,
            Outcome::ImageEmpty => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Outcome::NotExist => "not-exist",
            Outcome::NeedUpdate(_) => "need-update",
            Outcome::UpdateTagNotExist => "update-tag-not-exist",
            Outcome::StartAddressError => "start-address-error",
            Outcome::ContentTypeNotExist => "content-type-not-exist",
            Outcome::DataLengthOverflow => "data-length-overflow",
            Outcome::ImageEmpty => "image-empty",
        }
    }
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Classify a raw tag record against `layout`.
///
/// Checks run in a fixed order and the first failing one wins: erased record,
/// upgrade marker, staging address, image type, length.
pub fn classify(raw: &[u8; TAG_RECORD_SIZE], layout: &FlashLayout) -> Outcome {
    if is_erased(raw) {
        return Outcome::NotExist;
    }

    let tag = UpdateTag::from_bytes(raw);

    if !tag.is_upgrade() {
        return Outcome::UpdateTagNotExist;
    }

    if tag.start_address != layout.staging.start {
        return Outcome::StartAddressError;
    }

    let Some(kind) = tag.kind() else {
        return Outcome::ContentTypeNotExist;
    };

    let destination = layout.destination(kind);
    if tag.length > max_image_len(layout, &destination) {
        return Outcome::DataLengthOverflow;
    }

    if tag.length == 0 {
        return Outcome::ImageEmpty;
    }

    Outcome::NeedUpdate(UpdatePlan {
        kind,
        length: tag.length,
        version: tag.version,
        source: Region::new(
            layout.staging.device,
            layout.staging.start,
            layout.staging.start + tag.length,
        ),
        destination,
    })
}

/// Largest image that both fits the destination and can come out of staging.
pub fn max_image_len(layout: &FlashLayout, destination: &Region) -> u32 {
    destination.capacity().min(layout.staging.capacity())
}
