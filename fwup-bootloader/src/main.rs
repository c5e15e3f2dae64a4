// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot-time updater for RP2040.
//!
//! Installs a staged image when the tag record asks for it, sweeps leftover
//! staging data otherwise, then boots the secondary stage or the application.

#![no_std]
#![no_main]

mod boot;
mod flash;
mod peripherals;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use fwup_common::{FlashLayout, NorFlashBus, UpdateError, UpdateReport, Updater};

use crate::flash::QspiWindow;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

static LAYOUT: FlashLayout = FlashLayout::DEFAULT;

#[entry]
fn main() -> ! {
    defmt::println!("Updater init");

    let mut p = peripherals::init();
    peripherals::blink(&mut p.led_pin, &mut p.timer, 3, 200);
    flash::init();

    let bus = NorFlashBus::new(QspiWindow::internal(), QspiWindow::external());
    let report = Updater::new(bus, &LAYOUT, |kind: UpdateError| {
        defmt::println!("Update error: {} (code {})", kind, kind.code());
        peripherals::blink(&mut p.led_pin, &mut p.timer, kind.code() as u32, 100);
    })
    .run_update();

    match report {
        UpdateReport::Installed { plan, crc32 } => {
            defmt::println!("Installed {} image, CRC32 0x{:08x}", plan.kind, crc32)
        }
        UpdateReport::Failed { plan, error } => {
            defmt::println!("{} update failed: {}", plan.kind, error)
        }
        UpdateReport::Idle { outcome, sweep } => {
            defmt::println!("No update ({}), staging {}", outcome, sweep)
        }
        UpdateReport::FlashUnavailable(device) => {
            defmt::println!("Flash {} unavailable", device)
        }
    }

    boot::boot(&mut p, &LAYOUT);
}
