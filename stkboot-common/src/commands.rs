// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command interpreter.
//!
//! Each handler reads its arguments from the request in `frame`, then
//! rewrites the body in place with the response: `body[0]` keeps the opcode,
//! `body[1]` carries the status.

use crate::device::BootConfig;
use crate::frame::{Frame, MAX_BODY_LEN};
use crate::hal::{FuseByte, SelfProgram};
use crate::programmer;
use crate::protocol::{
    Command, Status, ISP_EXTENDED_SELECT, ISP_READ_HIGH_FUSE, ISP_READ_LOW_FUSE,
    ISP_READ_SIGNATURE, PROGRAM_DATA_OFFSET, SIGN_ON_ID,
};
use crate::session::Session;

/// Replace the body with `[opcode, status, payload..]`.
fn reply(frame: &mut Frame, status: Status, payload: &[u8]) {
    frame.body.truncate(1);
    // At most 7 bytes are appended to a body that held at least one.
    let _ = frame.body.push(status as u8);
    let _ = frame.body.extend_from_slice(payload);
}

fn reject(frame: &mut Frame, session: Session) -> Session {
    reply(frame, Status::Failed, &[]);
    session
}

/// Request byte at `index`, zero when the host sent a shorter body.
fn arg(frame: &Frame, index: usize) -> u8 {
    frame.body.get(index).copied().unwrap_or(0)
}

fn arg_u16(frame: &Frame, index: usize) -> u16 {
    u16::from_be_bytes([arg(frame, index), arg(frame, index + 1)])
}

/// Dispatch the request in `frame` and leave the response in its place.
pub fn dispatch<F: SelfProgram>(
    flash: &mut F,
    config: &BootConfig,
    session: Session,
    frame: &mut Frame,
) -> Session {
    let Some(opcode) = frame.opcode() else {
        return session;
    };

    let command = match Command::try_from(opcode) {
        Ok(command) if config.capabilities.allows(command) => command,
        Ok(command) => {
            debug!("cmd: {:?} disabled in this build", command);
            return reject(frame, session);
        }
        Err(opcode) => {
            warn!("cmd: unknown opcode 0x{:02x}", opcode);
            return reject(frame, session);
        }
    };

    trace!("cmd: {:?} seq={}", command, frame.seq);
    match command {
        Command::SignOn => handle_sign_on(frame, session),
        Command::GetParameter => handle_get_parameter(frame, config, session),
        Command::SetParameter | Command::EnterProgmode => {
            reply(frame, Status::Ok, &[]);
            session
        }
        Command::LeaveProgmode => handle_leave_progmode(frame, session),
        Command::ChipErase => handle_chip_erase(frame, session),
        Command::LoadAddress => handle_load_address(frame, config, session),
        Command::ProgramFlash => handle_program_flash(flash, frame, config, session),
        Command::ReadFlash => handle_read_flash(flash, frame, session),
        Command::ReadSignature => handle_read_signature(frame, config, session),
        Command::ReadLock => handle_read_lock(flash, frame, session),
        Command::ReadFuse => handle_read_fuse(flash, frame, session),
        Command::SpiMulti => handle_spi_multi(flash, frame, config, session),
    }
}

fn handle_sign_on(frame: &mut Frame, session: Session) -> Session {
    frame.body.truncate(1);
    let _ = frame.body.push(Status::Ok as u8);
    let _ = frame.body.push(SIGN_ON_ID.len() as u8);
    let _ = frame.body.extend_from_slice(SIGN_ON_ID);
    session
}

fn handle_get_parameter(frame: &mut Frame, config: &BootConfig, session: Session) -> Session {
    let value = config.parameters.get(arg(frame, 1));
    reply(frame, Status::Ok, &[value]);
    session
}

fn handle_leave_progmode(frame: &mut Frame, mut session: Session) -> Session {
    info!("cmd: leaving programming mode");
    session.leave_requested = true;
    reply(frame, Status::Ok, &[]);
    session
}

/// Full-chip erase is not supported: the answer is always FAILED and the
/// page erase restarts from address 0 with the next program request.
fn handle_chip_erase(frame: &mut Frame, mut session: Session) -> Session {
    session.erase_address = 0;
    reply(frame, Status::Failed, &[]);
    session
}

fn handle_load_address(frame: &mut Frame, config: &BootConfig, mut session: Session) -> Session {
    let word = if config.device.extended_addressing {
        u32::from_be_bytes([arg(frame, 1), arg(frame, 2), arg(frame, 3), arg(frame, 4)])
    } else {
        u32::from(arg_u16(frame, 3))
    };
    // Bit 31 (the extended-address flag some hosts set) shifts out.
    session.program_address = word << 1;
    trace!("cmd: address 0x{:08x}", session.program_address);
    reply(frame, Status::Ok, &[]);
    session
}

fn handle_program_flash<F: SelfProgram>(
    flash: &mut F,
    frame: &mut Frame,
    config: &BootConfig,
    session: Session,
) -> Session {
    let size = usize::from(arg_u16(frame, 1));
    if size == 0 {
        reply(frame, Status::Ok, &[]);
        return session;
    }

    let end = PROGRAM_DATA_OFFSET + size;
    if size % 2 != 0 || end > frame.body.len() {
        warn!("cmd: malformed program request of {} bytes", size);
        return reject(frame, session);
    }

    let device = &config.device;
    let last = session.program_address.wrapping_add(size as u32 - 1);
    if device.page_base(last) != device.page_base(session.program_address) {
        warn!(
            "cmd: program request of {} bytes at 0x{:08x} crosses a page",
            size, session.program_address
        );
        return reject(frame, session);
    }
    if last >= device.resident_start() || last < session.program_address {
        warn!(
            "cmd: refusing write at 0x{:08x} into the resident region",
            session.program_address
        );
        return reject(frame, session);
    }

    let session = programmer::program_page(
        flash,
        device,
        session,
        &frame.body[PROGRAM_DATA_OFFSET..end],
    );
    reply(frame, Status::Ok, &[]);
    session
}

fn handle_read_flash<F: SelfProgram>(
    flash: &mut F,
    frame: &mut Frame,
    session: Session,
) -> Session {
    let size = arg_u16(frame, 1);
    if size % 2 != 0 || usize::from(size) > MAX_BODY_LEN - 3 {
        warn!("cmd: unsupported read of {} bytes", size);
        return reject(frame, session);
    }

    frame.body.truncate(1);
    let _ = frame.body.push(Status::Ok as u8);
    let session = programmer::read_flash(flash, session, size, &mut frame.body);
    let _ = frame.body.push(Status::Ok as u8);
    session
}

fn handle_read_signature(frame: &mut Frame, config: &BootConfig, session: Session) -> Session {
    let byte = config.device.signature_byte(arg(frame, 4));
    reply(frame, Status::Ok, &[byte, Status::Ok as u8]);
    session
}

fn handle_read_lock<F: SelfProgram>(flash: &mut F, frame: &mut Frame, session: Session) -> Session {
    let lock = flash.read_fuse(FuseByte::Lock);
    reply(frame, Status::Ok, &[lock, Status::Ok as u8]);
    session
}

/// Select the fuse from the first two bytes of the ISP instruction.
fn select_fuse(c1: u8, c2: u8) -> FuseByte {
    match (c1, c2) {
        (ISP_READ_LOW_FUSE, ISP_EXTENDED_SELECT) => FuseByte::Extended,
        (ISP_READ_LOW_FUSE, _) => FuseByte::Low,
        _ => FuseByte::High,
    }
}

fn handle_read_fuse<F: SelfProgram>(flash: &mut F, frame: &mut Frame, session: Session) -> Session {
    let fuse = select_fuse(arg(frame, 2), arg(frame, 3));
    let value = flash.read_fuse(fuse);
    reply(frame, Status::Ok, &[value, Status::Ok as u8]);
    session
}

/// Minimal SPI passthrough: answers the signature and fuse reads avrdude
/// issues through it, zero for everything else.
fn handle_spi_multi<F: SelfProgram>(
    flash: &mut F,
    frame: &mut Frame,
    config: &BootConfig,
    session: Session,
) -> Session {
    let instruction = arg(frame, 4);
    let answer = match instruction {
        ISP_READ_SIGNATURE => config.device.signature_byte(arg(frame, 6)),
        ISP_READ_LOW_FUSE => flash.read_fuse(FuseByte::Low),
        ISP_READ_HIGH_FUSE => flash.read_fuse(FuseByte::High),
        _ => 0,
    };
    reply(
        frame,
        Status::Ok,
        &[0, instruction, 0, answer, Status::Ok as u8],
    );
    session
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuse_selector_matches_isp_instructions() {
        assert_eq!(select_fuse(0x50, 0x00), FuseByte::Low);
        assert_eq!(select_fuse(0x50, 0x08), FuseByte::Extended);
        assert_eq!(select_fuse(0x58, 0x08), FuseByte::High);
    }

    #[test]
    fn short_requests_read_missing_arguments_as_zero() {
        let frame = Frame::with_body(0, &[0x14, 0x01]).unwrap();
        assert_eq!(arg(&frame, 1), 0x01);
        assert_eq!(arg(&frame, 2), 0x00);
        assert_eq!(arg_u16(&frame, 1), 0x0100);
    }
}
