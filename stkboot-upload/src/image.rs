// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash image preparation.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};

use stkboot_common::DeviceProfile;

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Erased flash value used to pad partial pages.
const ERASED: u8 = 0xFF;

/// A raw binary padded to whole flash pages, starting at address 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    data: Vec<u8>,
    page_size: usize,
}

impl Image {
    pub fn load(path: &Path, device: &DeviceProfile) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_bytes(data, device)
    }

    pub fn from_bytes(mut data: Vec<u8>, device: &DeviceProfile) -> Result<Self> {
        if data.is_empty() {
            bail!("Image is empty");
        }
        let limit = device.application_end() as usize;
        if data.len() > limit {
            bail!(
                "Image of {} bytes exceeds the {} byte application area of the {}",
                data.len(),
                limit,
                device.name
            );
        }

        let page_size = device.page_size as usize;
        data.resize(data.len().div_ceil(page_size) * page_size, ERASED);
        Ok(Self { data, page_size })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn crc32(&self) -> u32 {
        CRC32.checksum(&self.data)
    }

    /// Pages in programming order.
    pub fn pages(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks(self.page_size)
    }
}

/// Offset of the first byte that differs, if any.
pub fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .or_else(|| (expected.len() != actual.len()).then(|| expected.len().min(actual.len())))
}
