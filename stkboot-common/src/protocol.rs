// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! STK500v2 protocol constants shared by the bootloader and host tools.
//!
//! Only the subset of AVR068 that a self-programming bootloader needs is
//! covered. Request builders are usable from `no_std` as well as from host
//! tools.

use heapless::Vec;

use crate::frame::{FrameError, MAX_BODY_LEN};

// --- Framing ---

pub const MESSAGE_START: u8 = 0x1B;
pub const TOKEN: u8 = 0x0E;
/// Start, sequence, two length bytes and token.
pub const HEADER_LEN: usize = 5;

// --- Fixed answers ---

/// Programmer identification returned by sign-on.
pub const SIGN_ON_ID: &[u8] = b"AVRISP_2";

/// Offset of the page data inside a program-flash request.
pub const PROGRAM_DATA_OFFSET: usize = 10;

// --- ISP instruction bytes (first byte of the 4-byte SPI instruction) ---

pub const ISP_READ_SIGNATURE: u8 = 0x30;
pub const ISP_READ_LOW_FUSE: u8 = 0x50;
pub const ISP_READ_HIGH_FUSE: u8 = 0x58;
/// Second instruction byte selecting the extended fuse when paired with 0x50.
pub const ISP_EXTENDED_SELECT: u8 = 0x08;
pub const ISP_READ_LOCK: u8 = 0x58;

/// Status byte carried in `body[1]` of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Failed = 0xC0,
}

impl Status {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Ok),
            0xC0 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Opcodes understood by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    SignOn = 0x01,
    SetParameter = 0x02,
    GetParameter = 0x03,
    LoadAddress = 0x06,
    EnterProgmode = 0x10,
    LeaveProgmode = 0x11,
    ChipErase = 0x12,
    ProgramFlash = 0x13,
    ReadFlash = 0x14,
    ReadFuse = 0x18,
    ReadLock = 0x1A,
    ReadSignature = 0x1B,
    SpiMulti = 0x1D,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(opcode: u8) -> Result<Self, Self::Error> {
        Ok(match opcode {
            0x01 => Self::SignOn,
            0x02 => Self::SetParameter,
            0x03 => Self::GetParameter,
            0x06 => Self::LoadAddress,
            0x10 => Self::EnterProgmode,
            0x11 => Self::LeaveProgmode,
            0x12 => Self::ChipErase,
            0x13 => Self::ProgramFlash,
            0x14 => Self::ReadFlash,
            0x18 => Self::ReadFuse,
            0x1A => Self::ReadLock,
            0x1B => Self::ReadSignature,
            0x1D => Self::SpiMulti,
            other => return Err(other),
        })
    }
}

/// Parameter identifiers answered by get-parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ParameterId {
    BuildNumberLow = 0x80,
    BuildNumberHigh = 0x81,
    HardwareVersion = 0x90,
    SoftwareMajor = 0x91,
    SoftwareMinor = 0x92,
}

impl ParameterId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x80 => Some(Self::BuildNumberLow),
            0x81 => Some(Self::BuildNumberHigh),
            0x90 => Some(Self::HardwareVersion),
            0x91 => Some(Self::SoftwareMajor),
            0x92 => Some(Self::SoftwareMinor),
            _ => None,
        }
    }
}

/// Fuse selection for [`Request::ReadFuse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FuseSelect {
    Low,
    High,
    Extended,
}

// --- Requests (host side) ---

/// A request body as an STK500v2 programmer would send it.
///
/// The trailing ISP timing fields are filled with the values avrdude uses;
/// the bootloader ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    SignOn,
    GetParameter(ParameterId),
    SetParameter { id: u8, value: u8 },
    EnterProgmode,
    LeaveProgmode,
    ChipErase,
    /// Word address, as the protocol transmits it.
    LoadAddress(u32),
    ProgramFlash(&'a [u8]),
    ReadFlash(u16),
    ReadSignature(u8),
    ReadFuse(FuseSelect),
    ReadLock,
    SpiMulti([u8; 4]),
}

impl Request<'_> {
    pub fn command(&self) -> Command {
        match self {
            Self::SignOn => Command::SignOn,
            Self::GetParameter(_) => Command::GetParameter,
            Self::SetParameter { .. } => Command::SetParameter,
            Self::EnterProgmode => Command::EnterProgmode,
            Self::LeaveProgmode => Command::LeaveProgmode,
            Self::ChipErase => Command::ChipErase,
            Self::LoadAddress(_) => Command::LoadAddress,
            Self::ProgramFlash(_) => Command::ProgramFlash,
            Self::ReadFlash(_) => Command::ReadFlash,
            Self::ReadSignature(_) => Command::ReadSignature,
            Self::ReadFuse(_) => Command::ReadFuse,
            Self::ReadLock => Command::ReadLock,
            Self::SpiMulti(_) => Command::SpiMulti,
        }
    }

    /// Serialize the request body (opcode first) into `body`.
    pub fn write_body(&self, body: &mut Vec<u8, MAX_BODY_LEN>) -> Result<(), FrameError> {
        body.clear();
        let op = self.command() as u8;
        let result = match *self {
            Self::SignOn => body.extend_from_slice(&[op]),
            Self::GetParameter(id) => body.extend_from_slice(&[op, id as u8]),
            Self::SetParameter { id, value } => body.extend_from_slice(&[op, id, value]),
            Self::EnterProgmode => body.extend_from_slice(&[
                op, 200, 100, 25, 32, 0, 0x53, 3, 0xAC, 0x53, 0x00, 0x00,
            ]),
            Self::LeaveProgmode => body.extend_from_slice(&[op, 1, 1]),
            Self::ChipErase => body.extend_from_slice(&[op, 55, 0, 0xAC, 0x80, 0x00, 0x00]),
            Self::LoadAddress(word) => {
                let [b3, b2, b1, b0] = word.to_be_bytes();
                body.extend_from_slice(&[op, b3, b2, b1, b0])
            }
            Self::ProgramFlash(data) => {
                let total = PROGRAM_DATA_OFFSET + data.len();
                if total > MAX_BODY_LEN {
                    return Err(FrameError::BodyTooLong(total));
                }
                let [hi, lo] = (data.len() as u16).to_be_bytes();
                body.extend_from_slice(&[op, hi, lo, 0xC1, 0x0A, 0x40, 0x4C, 0x20, 0x00, 0x00])
                    .and_then(|()| body.extend_from_slice(data))
            }
            Self::ReadFlash(count) => {
                let [hi, lo] = count.to_be_bytes();
                body.extend_from_slice(&[op, hi, lo, 0x20])
            }
            Self::ReadSignature(index) => {
                body.extend_from_slice(&[op, 4, ISP_READ_SIGNATURE, 0x00, index, 0x00])
            }
            Self::ReadFuse(fuse) => {
                let (c1, c2) = match fuse {
                    FuseSelect::Low => (ISP_READ_LOW_FUSE, 0x00),
                    FuseSelect::High => (ISP_READ_HIGH_FUSE, ISP_EXTENDED_SELECT),
                    FuseSelect::Extended => (ISP_READ_LOW_FUSE, ISP_EXTENDED_SELECT),
                };
                body.extend_from_slice(&[op, 4, c1, c2, 0x00, 0x00])
            }
            Self::ReadLock => body.extend_from_slice(&[op, 4, ISP_READ_LOCK, 0x00, 0x00, 0x00]),
            Self::SpiMulti(tx) => {
                body.extend_from_slice(&[op, 4, 4, 0, tx[0], tx[1], tx[2], tx[3]])
            }
        };
        result.map_err(|()| FrameError::BodyTooLong(body.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips_through_try_from() {
        for op in 0u8..=0xFF {
            if let Ok(cmd) = Command::try_from(op) {
                assert_eq!(cmd as u8, op);
            }
        }
        assert_eq!(Command::try_from(0x15), Err(0x15));
    }

    #[test]
    fn program_flash_request_places_data_at_offset_ten() {
        let data = [0xAA; 4];
        let mut body = Vec::new();
        Request::ProgramFlash(&data).write_body(&mut body).unwrap();

        assert_eq!(body[0], Command::ProgramFlash as u8);
        assert_eq!(&body[1..3], &[0x00, 0x04]);
        assert_eq!(&body[PROGRAM_DATA_OFFSET..], &data);
    }

    #[test]
    fn oversized_program_flash_request_is_rejected() {
        let data = [0u8; MAX_BODY_LEN];
        let mut body = Vec::new();
        assert!(Request::ProgramFlash(&data).write_body(&mut body).is_err());
    }

    #[test]
    fn load_address_is_big_endian() {
        let mut body = Vec::new();
        Request::LoadAddress(0x0001_0203).write_body(&mut body).unwrap();
        assert_eq!(&body[..], &[0x06, 0x00, 0x01, 0x02, 0x03]);
    }
}
