// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Logging shim: defmt on target, log on host, nothing otherwise.
//!
//! Format strings must stay within the subset both backends accept
//! (`{}`, `{:?}`, `{:08x}`).

#![allow(unused_imports, unused_macros)]

#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, error, info, warn};

#[cfg(all(feature = "log", not(feature = "defmt")))]
pub(crate) use log::{debug, error, info, warn};

// A single macro under its own name: a local `macro_rules! warn` would be
// ambiguous with the built-in `#[warn]` attribute when re-exported.
#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! discard {
    ( $( $x:expr ),* $(,)? ) => {{ $( let _ = &$x; )* }};
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
pub(crate) use {discard as debug, discard as error, discard as info, discard as warn};
