// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! RAM-backed NOR flash.
//!
//! Behaves like real NOR parts: erase sets whole sectors to 0xFF, programming
//! can only clear bits. Used by host tooling to operate on flash dumps and by
//! tests to inject faults (bit flips, failed erases, power loss).

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};

use crate::layout::{ERASED_BYTE, FLASH_SECTOR_SIZE};

/// Program granularity, matching a QSPI NOR page.
pub const MEM_WRITE_SIZE: usize = 256;

/// Faults to inject. Operation numbers are 1-based and counted per kind
/// (`erase` calls, `write` calls) since the last [`MemFlash::reboot`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Faults {
    /// Flip one bit in the data of the n-th write.
    pub corrupt_write: Option<usize>,
    /// Fail the n-th write without touching the array.
    pub fail_write: Option<usize>,
    /// Fail the n-th erase without touching the array.
    pub fail_erase: Option<usize>,
    /// Lose power after n completed erase/write operations: every later
    /// operation, reads included, fails.
    pub power_loss_after: Option<usize>,
}

#[derive(Debug)]
pub struct MemFlash<S> {
    data: S,
    faults: Faults,
    erase_ops: usize,
    write_ops: usize,
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> MemFlash<S> {
    /// Wrap existing contents (e.g. a flash dump).
    pub fn new(data: S) -> Self {
        Self {
            data,
            faults: Faults::default(),
            erase_ops: 0,
            write_ops: 0,
        }
    }

    pub fn with_faults(data: S, faults: Faults) -> Self {
        Self {
            faults,
            ..Self::new(data)
        }
    }

    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    /// Power comes back: faults are cleared, counters restart, contents stay.
    pub fn reboot(&mut self) {
        self.faults = Faults::default();
        self.erase_ops = 0;
        self.write_ops = 0;
    }

    pub fn erase_count(&self) -> usize {
        self.erase_ops
    }

    pub fn write_count(&self) -> usize {
        self.write_ops
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Direct access to the array, bypassing NOR rules.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    pub fn into_inner(self) -> S {
        self.data
    }

    fn powered(&self) -> bool {
        match self.faults.power_loss_after {
            Some(n) => self.erase_ops + self.write_ops < n,
            None => true,
        }
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<(), NorFlashErrorKind> {
        let end = (offset as usize)
            .checked_add(len)
            .ok_or(NorFlashErrorKind::OutOfBounds)?;
        if end > self.data.as_ref().len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(())
    }
}

impl<S> ErrorType for MemFlash<S> {
    type Error = NorFlashErrorKind;
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> ReadNorFlash for MemFlash<S> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if !self.powered() {
            return Err(NorFlashErrorKind::Other);
        }
        self.check_range(offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.data.as_ref()[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.as_ref().len()
    }
}

impl<S: AsRef<[u8]> + AsMut<[u8]>> NorFlash for MemFlash<S> {
    const WRITE_SIZE: usize = MEM_WRITE_SIZE;
    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if !self.powered() {
            return Err(NorFlashErrorKind::Other);
        }
        if from > to {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        self.check_range(from, (to - from) as usize)?;
        if from as usize % Self::ERASE_SIZE != 0 || to as usize % Self::ERASE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }

        self.erase_ops += 1;
        if self.faults.fail_erase == Some(self.erase_ops) {
            return Err(NorFlashErrorKind::Other);
        }

        self.data.as_mut()[from as usize..to as usize].fill(ERASED_BYTE);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.powered() {
            return Err(NorFlashErrorKind::Other);
        }
        self.check_range(offset, bytes.len())?;
        if offset as usize % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }

        self.write_ops += 1;
        if self.faults.fail_write == Some(self.write_ops) {
            return Err(NorFlashErrorKind::Other);
        }

        let start = offset as usize;
        let cells = &mut self.data.as_mut()[start..start + bytes.len()];
        for (cell, &b) in cells.iter_mut().zip(bytes) {
            *cell &= b;
        }
        if self.faults.corrupt_write == Some(self.write_ops) && !cells.is_empty() {
            cells[0] ^= 0x01;
        }
        Ok(())
    }
}
