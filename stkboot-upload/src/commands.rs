// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for bootloader operations.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use stkboot_common::device::{DeviceProfile, ATMEGA2560};
use stkboot_common::frame::Frame;
use stkboot_common::protocol::{FuseSelect, ParameterId, Request, Status};

use crate::image::{first_mismatch, Image, CRC32};
use crate::transport::{status_of, Transport};

/// Bytes per read-flash request; must be even and leave room for the
/// three status bytes in the response frame.
const READ_CHUNK: usize = 256;

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Single payload byte of a `[op, OK, value, ..]` answer, `None` when the
/// command is not compiled into the bootloader.
fn query_byte<P: Read + Write>(transport: &mut Transport<P>, request: &Request<'_>) -> Result<Option<u8>> {
    let response = transport.send_recv(request)?;
    match status_of(&response) {
        Some(Status::Ok) => response
            .body
            .get(2)
            .copied()
            .map(Some)
            .with_context(|| format!("Short answer to {:?}", request.command())),
        _ => Ok(None),
    }
}

fn read_signature<P: Read + Write>(transport: &mut Transport<P>) -> Result<Option<[u8; 3]>> {
    let mut signature = [0u8; 3];
    for (index, byte) in signature.iter_mut().enumerate() {
        match query_byte(transport, &Request::ReadSignature(index as u8))? {
            Some(value) => *byte = value,
            None => return Ok(None),
        }
    }
    Ok(Some(signature))
}

/// Work out which chip we are talking to. Bootloaders built without
/// signature support are assumed to run on an ATmega2560.
fn identify<P: Read + Write>(transport: &mut Transport<P>) -> Result<&'static DeviceProfile> {
    match read_signature(transport)? {
        Some(signature) => DeviceProfile::from_signature(signature).with_context(|| {
            format!("Unsupported device signature {:02X?}", signature)
        }),
        None => {
            log::warn!("Bootloader does not report its signature, assuming ATmega2560");
            Ok(&ATMEGA2560)
        }
    }
}

fn sign_on_id(response: &Frame) -> String {
    let len = response.body.get(2).copied().unwrap_or(0) as usize;
    let id = response.body.get(3..3 + len).unwrap_or(&[]);
    String::from_utf8_lossy(id).into_owned()
}

fn format_optional(value: Option<u8>) -> String {
    value.map_or_else(|| "unavailable".to_string(), |v| format!("0x{:02X}", v))
}

/// Read `len` bytes of flash starting at byte `address` (both even).
fn read_range<P: Read + Write>(
    transport: &mut Transport<P>,
    address: u32,
    len: usize,
    pb: &ProgressBar,
) -> Result<Vec<u8>> {
    transport.send_ok(&Request::LoadAddress(address >> 1))?;

    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let count = (len - data.len()).min(READ_CHUNK);
        let response = transport.send_ok(&Request::ReadFlash(count as u16))?;
        let body = &response.body[..];
        if body.len() != count + 3 || body[count + 2] != Status::Ok as u8 {
            bail!(
                "Malformed read answer at 0x{:05X} ({} bytes)",
                address as usize + data.len(),
                body.len()
            );
        }
        data.extend_from_slice(&body[2..count + 2]);
        pb.set_position(data.len() as u64);
    }
    Ok(data)
}

/// Print what the bootloader reports about itself and the chip.
pub fn info<P: Read + Write>(transport: &mut Transport<P>, sign_on: &Frame) -> Result<()> {
    let hw = query_byte(transport, &Request::GetParameter(ParameterId::HardwareVersion))?;
    let sw_major = query_byte(transport, &Request::GetParameter(ParameterId::SoftwareMajor))?;
    let sw_minor = query_byte(transport, &Request::GetParameter(ParameterId::SoftwareMinor))?;
    let signature = read_signature(transport)?;

    println!("Bootloader Info:");
    println!("  Programmer:  {}", sign_on_id(sign_on));
    println!("  Hardware:    {}", format_optional(hw));
    match (sw_major, sw_minor) {
        (Some(major), Some(minor)) => println!("  Software:    {}.{:02}", major, minor),
        _ => println!("  Software:    unknown"),
    }
    match signature {
        Some(sig) => {
            let name = DeviceProfile::from_signature(sig).map_or("unknown device", |d| d.name);
            println!(
                "  Signature:   {:02X} {:02X} {:02X} ({})",
                sig[0], sig[1], sig[2], name
            );
        }
        None => println!("  Signature:   unavailable"),
    }

    let low = query_byte(transport, &Request::ReadFuse(FuseSelect::Low))?;
    let high = query_byte(transport, &Request::ReadFuse(FuseSelect::High))?;
    let extended = query_byte(transport, &Request::ReadFuse(FuseSelect::Extended))?;
    let lock = query_byte(transport, &Request::ReadLock)?;
    println!("  Low fuse:    {}", format_optional(low));
    println!("  High fuse:   {}", format_optional(high));
    println!("  Ext fuse:    {}", format_optional(extended));
    println!("  Lock bits:   {}", format_optional(lock));

    Ok(())
}

/// Program a raw binary from address 0, verify it and start the application.
pub fn upload<P: Read + Write>(transport: &mut Transport<P>, file: &Path, verify: bool) -> Result<()> {
    let device = identify(transport)?;
    let image = Image::load(file, device)?;

    println!(
        "Firmware: {} ({} bytes padded, CRC32: 0x{:08x})",
        file.display(),
        image.len(),
        image.crc32()
    );
    println!("Target:   {}", device.name);
    println!();

    transport.send_ok(&Request::EnterProgmode)?;
    transport.send_ok(&Request::LoadAddress(0))?;

    // The bootloader erases ahead and advances its own address cursor, so
    // pages only need to be sent in order.
    let pb = progress_bar(image.len())?;
    let mut written = 0usize;
    for page in image.pages() {
        if let Err(e) = transport.send_ok(&Request::ProgramFlash(page)) {
            pb.abandon();
            return Err(e).with_context(|| format!("Programming failed at 0x{:05X}", written));
        }
        written += page.len();
        pb.set_position(written as u64);
    }
    pb.finish_with_message("Upload complete");

    if verify {
        print!("Verifying... ");
        std::io::stdout().flush()?;

        let hidden = ProgressBar::hidden();
        let readback = read_range(transport, 0, image.len(), &hidden)?;
        let crc = CRC32.checksum(&readback);
        if crc != image.crc32() {
            let offset = first_mismatch(image.bytes(), &readback).unwrap_or(0);
            bail!(
                "Verification failed: CRC32 0x{:08x} != 0x{:08x}, first difference at 0x{:05X}",
                crc,
                image.crc32(),
                offset
            );
        }
        println!("OK");
    }

    transport.send_ok(&Request::LeaveProgmode)?;
    println!();
    println!("Firmware uploaded successfully, application started.");

    Ok(())
}

/// Dump `size` bytes of flash starting at `address` into `file`.
pub fn read<P: Read + Write>(
    transport: &mut Transport<P>,
    address: u32,
    size: u32,
    file: &Path,
) -> Result<()> {
    if address % 2 != 0 {
        bail!("Address must be word aligned");
    }
    let size = size as usize;
    // The protocol reads whole words; fetch one extra byte and trim.
    let padded = size + size % 2;

    transport.send_ok(&Request::EnterProgmode)?;
    let pb = progress_bar(padded)?;
    let mut data = read_range(transport, address, padded, &pb)?;
    pb.finish();
    data.truncate(size);

    fs::write(file, &data).with_context(|| format!("Failed to write {}", file.display()))?;
    println!(
        "Read {} bytes from 0x{:05X} into {} (CRC32: 0x{:08x})",
        data.len(),
        address,
        file.display(),
        CRC32.checksum(&data)
    );

    Ok(())
}

/// Leave programming mode so the bootloader starts the application.
pub fn reset<P: Read + Write>(transport: &mut Transport<P>) -> Result<()> {
    print!("Starting application... ");
    std::io::stdout().flush()?;
    transport.send_ok(&Request::LeaveProgmode)?;
    println!("OK");
    Ok(())
}
