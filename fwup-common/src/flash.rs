// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash bus driven by the update engine.
//!
//! [`FlashBus`] is the narrow erase/read/write interface the executor needs,
//! addressed by device and absolute address. [`NorFlashBus`] implements it on
//! top of two `embedded-storage` NOR flash drivers.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::layout::{FlashDevice, ERASED_BYTE, EXTERNAL_FLASH_BASE, INTERNAL_FLASH_BASE};

/// Largest program granularity [`NorFlashBus`] can pad a short write to.
pub const MAX_WRITE_SIZE: usize = 256;

/// Flash operation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Device used before `init` (or after `finalize`).
    NotInitialized,
    /// Address or length violates the device's erase/program granularity.
    NotAligned,
    /// Address range falls outside the device.
    OutOfBounds,
    /// Data read back differs from what was written.
    VerifyMismatch,
    /// The device driver reported a failure.
    Device,
}

impl From<NorFlashErrorKind> for FlashError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => FlashError::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
            _ => FlashError::Device,
        }
    }
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            FlashError::NotInitialized => "flash device not initialized",
            FlashError::NotAligned => "flash access not aligned",
            FlashError::OutOfBounds => "flash access out of bounds",
            FlashError::VerifyMismatch => "flash read-back mismatch",
            FlashError::Device => "flash device error",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}

pub type FlashResult<T> = Result<T, FlashError>;

/// Block erase/program/read access to the flash devices.
///
/// Every call blocks until the hardware is done. `read` and `write` advance
/// `cursor` by the transferred length on success and leave it untouched on
/// failure.
pub trait FlashBus {
    fn init(&mut self, device: FlashDevice) -> FlashResult<()>;

    /// Erase `[start, end)`; both ends must be on erase boundaries.
    fn erase(&mut self, device: FlashDevice, start: u32, end: u32) -> FlashResult<()>;

    fn read(&mut self, device: FlashDevice, cursor: &mut u32, buf: &mut [u8]) -> FlashResult<()>;

    /// Program `data` at `cursor`. The target must be erased.
    fn write(&mut self, device: FlashDevice, cursor: &mut u32, data: &[u8]) -> FlashResult<()>;

    fn finalize(&mut self, device: FlashDevice) -> FlashResult<()>;
}

impl<B: FlashBus + ?Sized> FlashBus for &mut B {
    fn init(&mut self, device: FlashDevice) -> FlashResult<()> {
        (**self).init(device)
    }

    fn erase(&mut self, device: FlashDevice, start: u32, end: u32) -> FlashResult<()> {
        (**self).erase(device, start, end)
    }

    fn read(&mut self, device: FlashDevice, cursor: &mut u32, buf: &mut [u8]) -> FlashResult<()> {
        (**self).read(device, cursor, buf)
    }

    fn write(&mut self, device: FlashDevice, cursor: &mut u32, data: &[u8]) -> FlashResult<()> {
        (**self).write(device, cursor, data)
    }

    fn finalize(&mut self, device: FlashDevice) -> FlashResult<()> {
        (**self).finalize(device)
    }
}

/// [`FlashBus`] over an internal and an external NOR flash driver.
///
/// Absolute addresses are turned into driver offsets by subtracting each
/// device's base address.
pub struct NorFlashBus<I, E> {
    internal: I,
    internal_base: u32,
    external: E,
    external_base: u32,
    ready: [bool; 2],
}

impl<I: NorFlash, E: NorFlash> NorFlashBus<I, E> {
    /// Bus with the board's default base addresses.
    pub fn new(internal: I, external: E) -> Self {
        Self::with_bases(internal, INTERNAL_FLASH_BASE, external, EXTERNAL_FLASH_BASE)
    }

    pub fn with_bases(internal: I, internal_base: u32, external: E, external_base: u32) -> Self {
        Self {
            internal,
            internal_base,
            external,
            external_base,
            ready: [false; 2],
        }
    }

    pub fn internal(&self) -> &I {
        &self.internal
    }

    pub fn internal_mut(&mut self) -> &mut I {
        &mut self.internal
    }

    pub fn external(&self) -> &E {
        &self.external
    }

    pub fn external_mut(&mut self) -> &mut E {
        &mut self.external
    }

    pub fn into_inner(self) -> (I, E) {
        (self.internal, self.external)
    }

    fn check_ready(&self, device: FlashDevice) -> FlashResult<()> {
        if self.ready[device.index()] {
            Ok(())
        } else {
            Err(FlashError::NotInitialized)
        }
    }
}

impl<I: NorFlash, E: NorFlash> FlashBus for NorFlashBus<I, E> {
    fn init(&mut self, device: FlashDevice) -> FlashResult<()> {
        self.ready[device.index()] = true;
        Ok(())
    }

    fn erase(&mut self, device: FlashDevice, start: u32, end: u32) -> FlashResult<()> {
        self.check_ready(device)?;
        match device {
            FlashDevice::Internal => erase_on(&mut self.internal, self.internal_base, start, end),
            FlashDevice::External => erase_on(&mut self.external, self.external_base, start, end),
        }
    }

    fn read(&mut self, device: FlashDevice, cursor: &mut u32, buf: &mut [u8]) -> FlashResult<()> {
        self.check_ready(device)?;
        match device {
            FlashDevice::Internal => read_on(&mut self.internal, self.internal_base, *cursor, buf)?,
            FlashDevice::External => read_on(&mut self.external, self.external_base, *cursor, buf)?,
        }
        *cursor += buf.len() as u32;
        Ok(())
    }

    fn write(&mut self, device: FlashDevice, cursor: &mut u32, data: &[u8]) -> FlashResult<()> {
        self.check_ready(device)?;
        match device {
            FlashDevice::Internal => {
                write_on(&mut self.internal, self.internal_base, *cursor, data)?
            }
            FlashDevice::External => {
                write_on(&mut self.external, self.external_base, *cursor, data)?
            }
        }
        *cursor += data.len() as u32;
        Ok(())
    }

    fn finalize(&mut self, device: FlashDevice) -> FlashResult<()> {
        self.check_ready(device)?;
        self.ready[device.index()] = false;
        Ok(())
    }
}

// --- Per-device helpers ---

fn to_offset<F: NorFlash>(flash: &F, base: u32, addr: u32, len: usize) -> FlashResult<u32> {
    let offset = addr.checked_sub(base).ok_or(FlashError::OutOfBounds)?;
    let end = (offset as usize)
        .checked_add(len)
        .ok_or(FlashError::OutOfBounds)?;
    if end > flash.capacity() {
        return Err(FlashError::OutOfBounds);
    }
    Ok(offset)
}

fn device_err<Err: NorFlashError>(e: Err) -> FlashError {
    FlashError::from(e.kind())
}

fn erase_on<F: NorFlash>(flash: &mut F, base: u32, start: u32, end: u32) -> FlashResult<()> {
    if end < start {
        return Err(FlashError::OutOfBounds);
    }
    let from = to_offset(flash, base, start, (end - start) as usize)?;
    let to = from + (end - start);
    if from as usize % F::ERASE_SIZE != 0 || to as usize % F::ERASE_SIZE != 0 {
        return Err(FlashError::NotAligned);
    }
    flash.erase(from, to).map_err(device_err)
}

fn read_on<F: NorFlash>(flash: &mut F, base: u32, addr: u32, buf: &mut [u8]) -> FlashResult<()> {
    let offset = to_offset(flash, base, addr, buf.len())?;
    if offset as usize % F::READ_SIZE != 0 || buf.len() % F::READ_SIZE != 0 {
        return Err(FlashError::NotAligned);
    }
    flash.read(offset, buf).map_err(device_err)
}

/// Program `data`, padding a short tail with erased bytes up to `WRITE_SIZE`.
fn write_on<F: NorFlash>(flash: &mut F, base: u32, addr: u32, data: &[u8]) -> FlashResult<()> {
    let offset = to_offset(flash, base, addr, data.len())?;
    if offset as usize % F::WRITE_SIZE != 0 || F::WRITE_SIZE > MAX_WRITE_SIZE {
        return Err(FlashError::NotAligned);
    }

    let aligned = data.len() - data.len() % F::WRITE_SIZE;
    if aligned > 0 {
        flash.write(offset, &data[..aligned]).map_err(device_err)?;
    }

    let tail = &data[aligned..];
    if !tail.is_empty() {
        let mut page = [ERASED_BYTE; MAX_WRITE_SIZE];
        page[..tail.len()].copy_from_slice(tail);
        flash
            .write(offset + aligned as u32, &page[..F::WRITE_SIZE])
            .map_err(device_err)?;
    }

    Ok(())
}
