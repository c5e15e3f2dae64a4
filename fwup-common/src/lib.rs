// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Staged firmware update engine shared by the bootloader and host tooling.
//!
//! The crate is `no_std` and hardware independent:
//! - [`tag`]: fixed-layout update tag record ("boot table")
//! - [`validator`]: classification of the tag record
//! - [`executor`]: commit (erase, copy, verify, clear) and cleanup sweep
//! - [`flash`]: the flash bus the engine drives, with a `NorFlash` adapter
//! - [`mem`]: RAM-backed NOR flash with fault injection
//!
//! Features:
//! - `std`: `std::error::Error` impls for host tools
//! - `defmt` / `log`: logging backend (no-op when neither is enabled)

#![cfg_attr(not(feature = "std"), no_std)]

mod fmt;

pub mod executor;
pub mod flash;
pub mod layout;
pub mod mem;
pub mod tag;
pub mod validator;

// Re-export commonly used types
pub use executor::{SweepResult, UpdateError, UpdateHooks, UpdateReport, Updater};
pub use flash::{FlashBus, FlashError, NorFlashBus};
pub use layout::{FlashDevice, FlashLayout, Region};
pub use layout::{CHUNK_SIZE, ERASED_BYTE, FLASH_SECTOR_SIZE};
pub use tag::{ImageKind, UpdateTag, TAG_RECORD_SIZE};
pub use validator::{classify, Outcome, UpdatePlan};

/// Returns true when every byte reads back as erased flash.
pub fn is_erased(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == ERASED_BYTE)
}
