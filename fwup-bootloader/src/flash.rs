// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! QSPI flash access through RP2040 ROM routines.
//!
//! Erase and program need XIP torn down first:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! Everything executing during steps 1-5 must run from RAM, so the two
//! wrappers live in `.data` and only call ROM pointers resolved by [`init`].
//!
//! The board has a single QSPI part. [`QspiWindow`] carves it into the two
//! logical devices the update engine knows: the program area and the data
//! area holding the driver image and the staging copy.

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};
use fwup_common::layout::{
    APPLICATION_END, BOOTLOADER_ADDR, EXTERNAL_FLASH_SIZE, INTERNAL_FLASH_BASE,
    INTERNAL_FLASH_SIZE, TAG_SECTOR_ADDR, UPDATER_ADDR,
};
use fwup_common::FLASH_SECTOR_SIZE;

/// Program granularity of `flash_range_program`.
const FLASH_PAGE_SIZE: usize = 256;
/// 4K sector erase command.
const SECTOR_ERASE_CMD: u8 = 0x20;

/// Chip offset of the data area. It sits between the end of the application
/// region and the tag sector.
const DATA_AREA_OFFSET: u32 = 0x10_0000;
/// Sectors below this chip offset hold the running updater.
const UPDATER_END: u32 = BOOTLOADER_ADDR - INTERNAL_FLASH_BASE;

const _: () = assert!(INTERNAL_FLASH_BASE + DATA_AREA_OFFSET >= APPLICATION_END);
const _: () =
    assert!(INTERNAL_FLASH_BASE + DATA_AREA_OFFSET + EXTERNAL_FLASH_SIZE <= TAG_SECTOR_ADDR);
const _: () = assert!(UPDATER_ADDR == INTERNAL_FLASH_BASE);

// ROM function pointer types
type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

static mut ROM_CONNECT_INTERNAL_FLASH: RomFnVoid = dummy_void;
static mut ROM_FLASH_EXIT_XIP: RomFnVoid = dummy_void;
static mut ROM_FLASH_RANGE_ERASE: RomFnErase = dummy_erase;
static mut ROM_FLASH_RANGE_PROGRAM: RomFnProgram = dummy_program;
static mut ROM_FLASH_FLUSH_CACHE: RomFnVoid = dummy_void;
static mut ROM_FLASH_ENTER_CMD_XIP: RomFnVoid = dummy_void;

unsafe extern "C" fn dummy_void() {}
unsafe extern "C" fn dummy_erase(_: u32, _: usize, _: u32, _: u8) {}
unsafe extern "C" fn dummy_program(_: u32, _: *const u8, _: usize) {}

/// Look up a ROM function by its two-character tag.
/// The table pointer (0x14) and lookup function (0x18) are 16-bit pointers.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *(0x14 as *const u16) as *const u16;
    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *(0x18 as *const u16) as usize,
        );
    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

/// Resolve the ROM flash routines. Must run once, with XIP active, before
/// any [`QspiWindow`] erases or programs.
pub fn init() {
    unsafe {
        ROM_CONNECT_INTERNAL_FLASH =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"IF"));
        ROM_FLASH_EXIT_XIP = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"EX"));
        ROM_FLASH_RANGE_ERASE =
            core::mem::transmute::<usize, RomFnErase>(rom_func_lookup(b"RE"));
        ROM_FLASH_RANGE_PROGRAM =
            core::mem::transmute::<usize, RomFnProgram>(rom_func_lookup(b"RP"));
        ROM_FLASH_FLUSH_CACHE = core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"FC"));
        ROM_FLASH_ENTER_CMD_XIP =
            core::mem::transmute::<usize, RomFnVoid>(rom_func_lookup(b"CX"));
    }
}

/// Erase `size` bytes at chip offset `offset`.
///
/// # Safety
/// [`init`] must have been called; the range must not hold running code.
#[link_section = ".data"]
#[inline(never)]
unsafe fn flash_erase(offset: u32, size: u32) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_ERASE(offset, size as usize, FLASH_SECTOR_SIZE, SECTOR_ERASE_CMD);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// Program `len` bytes at chip offset `offset`. `data` must be in RAM.
///
/// # Safety
/// [`init`] must have been called; the range must not hold running code.
#[link_section = ".data"]
#[inline(never)]
unsafe fn flash_program(offset: u32, data: *const u8, len: usize) {
    cortex_m::interrupt::disable();
    ROM_CONNECT_INTERNAL_FLASH();
    ROM_FLASH_EXIT_XIP();
    ROM_FLASH_RANGE_PROGRAM(offset, data, len);
    ROM_FLASH_FLUSH_CACHE();
    ROM_FLASH_ENTER_CMD_XIP();
    cortex_m::interrupt::enable();
}

/// A contiguous slice of the QSPI chip exposed as a NOR flash device.
///
/// Offsets are relative to the window start. Reads go through the XIP
/// mapping; erase and program refuse anything below `writable_from`.
pub struct QspiWindow {
    chip_offset: u32,
    size: u32,
    writable_from: u32,
}

impl QspiWindow {
    /// The whole XIP window; the updater's own sectors stay read-only.
    pub const fn internal() -> Self {
        Self {
            chip_offset: 0,
            size: INTERNAL_FLASH_SIZE,
            writable_from: UPDATER_END,
        }
    }

    /// Data area holding the driver image and the staging copy.
    pub const fn external() -> Self {
        Self {
            chip_offset: DATA_AREA_OFFSET,
            size: EXTERNAL_FLASH_SIZE,
            writable_from: 0,
        }
    }

    fn xip_addr(&self, offset: u32) -> u32 {
        INTERNAL_FLASH_BASE + self.chip_offset + offset
    }

    fn check_writable(&self, offset: u32) -> Result<(), NorFlashErrorKind> {
        if offset < self.writable_from {
            defmt::error!("Refusing to modify updater flash at +0x{:08x}", offset);
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        Ok(())
    }
}

impl ErrorType for QspiWindow {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for QspiWindow {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let base = self.xip_addr(offset);
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = unsafe { ((base + i as u32) as *const u8).read_volatile() };
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.size as usize
    }
}

impl NorFlash for QspiWindow {
    const WRITE_SIZE: usize = FLASH_PAGE_SIZE;
    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        self.check_writable(from)?;
        unsafe { flash_erase(self.chip_offset + from, to - from) };
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        self.check_writable(offset)?;
        unsafe { flash_program(self.chip_offset + offset, bytes.as_ptr(), bytes.len()) };
        Ok(())
    }
}
