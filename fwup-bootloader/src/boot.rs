// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image selection and hand-off after the update pass.

use fwup_common::{FlashLayout, Region};

const RAM_START: u32 = 0x2000_0000;
/// Top of striped SRAM plus the two 4K scratch banks.
const RAM_END: u32 = 0x2004_2000;

struct VectorTable {
    initial_sp: u32,
    reset_vector: u32,
}

impl VectorTable {
    unsafe fn read_from(addr: u32) -> Self {
        Self {
            initial_sp: (addr as *const u32).read_volatile(),
            reset_vector: (addr as *const u32).offset(1).read_volatile(),
        }
    }

    /// Stack in RAM and reset handler inside the image's own region.
    fn is_valid_for(&self, region: &Region) -> bool {
        (RAM_START..=RAM_END).contains(&self.initial_sp)
            && region.contains(self.reset_vector & !1)
    }
}

/// First bootable image: the secondary boot stage if present, then the
/// application.
pub fn select_image(layout: &FlashLayout) -> Option<Region> {
    [layout.bootloader, layout.application]
        .into_iter()
        .find(|region| {
            let vt = unsafe { VectorTable::read_from(region.start) };
            let ok = vt.is_valid_for(region);
            if !ok {
                defmt::println!(
                    "No valid image at 0x{:08x} (sp=0x{:08x}, reset=0x{:08x})",
                    region.start,
                    vt.initial_sp,
                    vt.reset_vector
                );
            }
            ok
        })
}

/// # Safety
/// `image` must hold a vector table accepted by [`select_image`].
pub unsafe fn jump_to(image: &Region) -> ! {
    prepare_for_handoff();
    relocate_vector_table(image.start);

    let vt = VectorTable::read_from(image.start);
    jump_to_firmware(vt.initial_sp, vt.reset_vector);
}

/// Leave clocks configured; mask and clear every NVIC interrupt.
unsafe fn prepare_for_handoff() {
    cortex_m::interrupt::disable();

    const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
    NVIC_ICPR.write_volatile(0xFFFF_FFFF);

    const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
    NVIC_ICER.write_volatile(0xFFFF_FFFF);
}

unsafe fn relocate_vector_table(base: u32) {
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(base);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

unsafe fn jump_to_firmware(initial_sp: u32, reset_vector: u32) -> ! {
    core::arch::asm!(
        "msr msp, {sp}",
        "cpsie i", // images expect PRIMASK=0
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}

/// Boot the selected image, or blink forever when there is none.
pub fn boot(p: &mut crate::peripherals::Peripherals, layout: &FlashLayout) -> ! {
    use embedded_hal::delay::DelayNs;

    match select_image(layout) {
        Some(image) => {
            defmt::println!("Jumping to image at 0x{:08x}...", image.start);
            p.timer.delay_ms(10u32);
            unsafe { jump_to(&image) }
        }
        None => {
            defmt::println!("Nothing to boot, halting");
            loop {
                crate::peripherals::blink(&mut p.led_pin, &mut p.timer, 1, 1000);
            }
        }
    }
}
