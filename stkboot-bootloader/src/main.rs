// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

#![no_std]
#![no_main]
#![feature(asm_experimental_arch)]

mod boot;
mod flash;
mod serial;

use panic_halt as _;

#[cfg(feature = "atmega1280")]
use avr_device::atmega1280 as pac;
#[cfg(feature = "atmega1284p")]
use avr_device::atmega1284p as pac;
#[cfg(feature = "atmega2560")]
use avr_device::atmega2560 as pac;

use stkboot_common::device::{
    BootConfig, Capabilities, DeviceProfile, DEFAULT_BOOT_TIMEOUT, DEFAULT_RESIDENT_SIZE,
};
use stkboot_common::Bootloader;

#[cfg(feature = "atmega2560")]
const DEVICE: DeviceProfile = stkboot_common::device::ATMEGA2560;
#[cfg(feature = "atmega1280")]
const DEVICE: DeviceProfile = stkboot_common::device::ATMEGA1280;
#[cfg(feature = "atmega1284p")]
const DEVICE: DeviceProfile = stkboot_common::device::ATMEGA1284P;

const CAPABILITIES: Capabilities = Capabilities {
    read_signature: cfg!(feature = "read-signature"),
    read_lock: cfg!(feature = "read-lock"),
    read_fuse: cfg!(feature = "read-fuse"),
    spi_multi: cfg!(feature = "spi-multi"),
};

static CONFIG: BootConfig = BootConfig::new(DEVICE.with_resident_size(DEFAULT_RESIDENT_SIZE))
    .with_capabilities(CAPABILITIES)
    .with_boot_timeout(DEFAULT_BOOT_TIMEOUT);

#[avr_device::entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();

    let mut platform = boot::Mcu::new(dp.CPU, dp.WDT);
    let mut bootloader = Bootloader::new(&CONFIG, serial::Usart::new(dp.USART0), flash::Spm);

    // A pass only returns when flash is blank; wait for the host again.
    loop {
        let _ = bootloader.run(&mut platform);
    }
}
