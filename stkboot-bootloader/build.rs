// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

use std::env;

/// (feature, resident region start) per supported chip. Must agree with the
/// device profiles in stkboot-common.
const CHIPS: [(&str, u32); 3] = [
    ("ATMEGA2560", 0x3_E000),
    ("ATMEGA1280", 0x1_E000),
    ("ATMEGA1284P", 0x1_E000),
];

fn main() {
    let selected: Vec<_> = CHIPS
        .iter()
        .filter(|(name, _)| env::var(format!("CARGO_FEATURE_{}", name)).is_ok())
        .collect();

    let &(name, boot_start) = match selected.as_slice() {
        [one] => *one,
        [] => panic!("select a chip feature: atmega2560, atmega1280 or atmega1284p"),
        _ => panic!("only one chip feature can be enabled at a time"),
    };

    // The bootloader links as a normal program but lives in the boot section.
    println!("cargo:rustc-link-arg=-Wl,--section-start=.text=0x{:X}", boot_start);
    println!("cargo:warning=Building stkboot for {} at 0x{:05X}", name, boot_start);
    println!("cargo:rerun-if-changed=build.rs");
}
