// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Build-time device description: memory layout, signature, reported
//! versions and the set of optional commands compiled into the image.

use crate::protocol::{Command, ParameterId};

// --- Defaults ---

/// Resident region reserved for the bootloader (4096-word boot section).
pub const DEFAULT_RESIDENT_SIZE: u32 = 8 * 1024;

/// Polling iterations before giving up on the host, about one second at 16 MHz.
pub const DEFAULT_BOOT_TIMEOUT: u32 = 500_000;

/// Memory layout and identity of one supported MCU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceProfile {
    pub name: &'static str,
    pub signature: [u8; 3],
    pub flash_size: u32,
    pub page_size: u32,
    /// Bytes reserved for the bootloader at the top of flash. Power of two.
    pub resident_size: u32,
    /// Flash beyond 64K words: load-address carries a 32-bit word address.
    pub extended_addressing: bool,
}

pub const ATMEGA2560: DeviceProfile = DeviceProfile {
    name: "ATmega2560",
    signature: [0x1E, 0x98, 0x01],
    flash_size: 256 * 1024,
    page_size: 256,
    resident_size: DEFAULT_RESIDENT_SIZE,
    extended_addressing: true,
};

pub const ATMEGA1280: DeviceProfile = DeviceProfile {
    name: "ATmega1280",
    signature: [0x1E, 0x97, 0x03],
    flash_size: 128 * 1024,
    page_size: 256,
    resident_size: DEFAULT_RESIDENT_SIZE,
    extended_addressing: true,
};

pub const ATMEGA1284P: DeviceProfile = DeviceProfile {
    name: "ATmega1284P",
    signature: [0x1E, 0x97, 0x05],
    flash_size: 128 * 1024,
    page_size: 256,
    resident_size: DEFAULT_RESIDENT_SIZE,
    extended_addressing: true,
};

pub const KNOWN_DEVICES: [DeviceProfile; 3] = [ATMEGA2560, ATMEGA1280, ATMEGA1284P];

impl DeviceProfile {
    pub const fn with_resident_size(mut self, bytes: u32) -> Self {
        assert!(bytes.is_power_of_two(), "resident size must be a power of two");
        self.resident_size = bytes;
        self
    }

    /// First byte past the application region. The resident region and one
    /// spare slot of the same size sit above it.
    pub const fn application_end(&self) -> u32 {
        self.flash_size - 2 * self.resident_size
    }

    /// First byte of the bootloader itself.
    pub const fn resident_start(&self) -> u32 {
        self.flash_size - self.resident_size
    }

    pub const fn page_base(&self, address: u32) -> u32 {
        address & !(self.page_size - 1)
    }

    /// Signature byte for `index`; indices past the end select the last byte.
    pub fn signature_byte(&self, index: u8) -> u8 {
        match index {
            0 => self.signature[0],
            1 => self.signature[1],
            _ => self.signature[2],
        }
    }

    pub fn from_signature(signature: [u8; 3]) -> Option<&'static DeviceProfile> {
        KNOWN_DEVICES.iter().find(|d| d.signature == signature)
    }
}

/// Optional command families compiled into the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    pub read_signature: bool,
    pub read_lock: bool,
    pub read_fuse: bool,
    pub spi_multi: bool,
}

impl Capabilities {
    /// What the stock bootloader ships with: everything but SPI passthrough.
    pub const STANDARD: Self = Self {
        read_signature: true,
        read_lock: true,
        read_fuse: true,
        spi_multi: false,
    };

    pub const ALL: Self = Self {
        spi_multi: true,
        ..Self::STANDARD
    };

    pub const NONE: Self = Self {
        read_signature: false,
        read_lock: false,
        read_fuse: false,
        spi_multi: false,
    };

    /// Whether `command` is part of the active command set.
    pub const fn allows(&self, command: Command) -> bool {
        match command {
            Command::ReadSignature => self.read_signature,
            Command::ReadLock => self.read_lock,
            Command::ReadFuse => self.read_fuse,
            Command::SpiMulti => self.spi_multi,
            _ => true,
        }
    }
}

/// Values reported through get-parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Parameters {
    pub build_number_low: u8,
    pub build_number_high: u8,
    pub hardware_version: u8,
    pub software_major: u8,
    pub software_minor: u8,
}

impl Parameters {
    /// AVR Studio only talks to programmers reporting HW 0x0F / SW 2.10.
    pub const AVRISP_MKII: Self = Self {
        build_number_low: 0,
        build_number_high: 0,
        hardware_version: 0x0F,
        software_major: 2,
        software_minor: 0x0A,
    };

    pub fn get(&self, id: u8) -> u8 {
        match ParameterId::from_byte(id) {
            Some(ParameterId::BuildNumberLow) => self.build_number_low,
            Some(ParameterId::BuildNumberHigh) => self.build_number_high,
            Some(ParameterId::HardwareVersion) => self.hardware_version,
            Some(ParameterId::SoftwareMajor) => self.software_major,
            Some(ParameterId::SoftwareMinor) => self.software_minor,
            None => 0,
        }
    }
}

/// Everything the engine needs to know about the image it runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    pub device: DeviceProfile,
    pub capabilities: Capabilities,
    pub parameters: Parameters,
    /// Polling iterations to wait for the first host byte.
    pub boot_timeout: u32,
}

impl BootConfig {
    pub const fn new(device: DeviceProfile) -> Self {
        Self {
            device,
            capabilities: Capabilities::STANDARD,
            parameters: Parameters::AVRISP_MKII,
            boot_timeout: DEFAULT_BOOT_TIMEOUT,
        }
    }

    pub const fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub const fn with_boot_timeout(mut self, polls: u32) -> Self {
        self.boot_timeout = polls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_end_reserves_primary_and_spare_slot() {
        assert_eq!(ATMEGA2560.application_end(), 0x3C000);
        assert_eq!(ATMEGA2560.resident_start(), 0x3E000);

        let small = ATMEGA1284P.with_resident_size(2048);
        assert_eq!(small.application_end(), 0x1F000);
    }

    #[test]
    fn page_base_masks_offset_within_page() {
        assert_eq!(ATMEGA2560.page_base(0x1234), 0x1200);
        assert_eq!(ATMEGA2560.page_base(0x1300), 0x1300);
    }

    #[test]
    fn unknown_parameter_reads_as_zero() {
        let params = Parameters::AVRISP_MKII;
        assert_eq!(params.get(0x90), 0x0F);
        assert_eq!(params.get(0x92), 0x0A);
        assert_eq!(params.get(0x94), 0);
    }

    #[test]
    fn capabilities_gate_only_optional_commands() {
        let caps = Capabilities::NONE;
        assert!(!caps.allows(Command::ReadFuse));
        assert!(!caps.allows(Command::SpiMulti));
        assert!(caps.allows(Command::ProgramFlash));
        assert!(Capabilities::ALL.allows(Command::SpiMulti));
    }

    #[test]
    fn profile_lookup_by_signature() {
        let found = DeviceProfile::from_signature([0x1E, 0x97, 0x05]).unwrap();
        assert_eq!(found.name, "ATmega1284P");
        assert!(DeviceProfile::from_signature([0, 0, 0]).is_none());
    }
}
