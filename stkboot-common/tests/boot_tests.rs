// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot arbitration: watchdog fast path, host timeout and full sessions.

mod common;

use common::{SimFlash, SimPlatform, SimSerial};
use stkboot_common::device::{BootConfig, ATMEGA2560};
use stkboot_common::hal::ResetCause;
use stkboot_common::protocol::{Request, Status};
use stkboot_common::{Bootloader, Handoff, Route};

static CONFIG: BootConfig = BootConfig::new(ATMEGA2560).with_boot_timeout(64);

#[test]
fn test_watchdog_reset_starts_application_without_serial() {
    let mut platform = SimPlatform::after_reset(ResetCause::WATCHDOG);
    let mut bootloader = Bootloader::new(&CONFIG, SimSerial::new(), SimFlash::with_application());

    let handoff = bootloader.run(&mut platform);

    assert_eq!(handoff, Handoff::Application(Route::WatchdogReset));
    assert!(platform.watchdog_disabled);
    assert_eq!(platform.launches.len(), 1);
    assert!(platform.launches[0].is_watchdog());
    assert_eq!(bootloader.serial().enable_count, 0);
}

#[test]
fn test_silent_host_times_out_into_application() {
    let mut platform = SimPlatform::after_reset(ResetCause::POWER_ON);
    let mut bootloader = Bootloader::new(&CONFIG, SimSerial::new(), SimFlash::with_application());

    let handoff = bootloader.run(&mut platform);

    assert_eq!(handoff, Handoff::Application(Route::Timeout));
    assert_eq!(platform.launches, vec![ResetCause::from_bits(ResetCause::POWER_ON)]);
    let serial = bootloader.serial();
    assert_eq!(serial.enable_count, 1);
    assert!(!serial.enabled);
    assert!(serial.tx.is_empty());
}

#[test]
fn test_host_session_programs_and_starts_application() {
    let image = [0x0C, 0x94, 0x72, 0x00, 0x0C, 0x94, 0x90, 0x00];
    let mut serial = SimSerial::new();
    serial.queue_request(1, &Request::SignOn);
    serial.queue_request(2, &Request::EnterProgmode);
    serial.queue_request(3, &Request::LoadAddress(0));
    serial.queue_request(4, &Request::ProgramFlash(&image));
    serial.queue_request(5, &Request::LeaveProgmode);

    let mut platform = SimPlatform::after_reset(ResetCause::EXTERNAL);
    let mut bootloader = Bootloader::new(&CONFIG, serial, SimFlash::atmega2560());

    let handoff = bootloader.run(&mut platform);

    assert_eq!(handoff, Handoff::Application(Route::SessionEnded));
    assert_eq!(platform.launches.len(), 1);

    let (serial, flash) = bootloader.into_parts();
    assert!(serial.rx.is_empty());
    assert!(!serial.enabled);
    let responses = serial.responses();
    assert_eq!(responses.len(), 5);
    assert!(responses.iter().all(|r| r.body[1] == Status::Ok as u8));
    assert_eq!(responses.last().map(|r| r.seq), Some(5));

    assert_eq!(flash.bytes(0, image.len()), &image);
    assert!(flash.rww_enabled);
}

#[test]
fn test_blank_flash_reports_no_application() {
    let mut platform = SimPlatform::after_reset(ResetCause::POWER_ON);
    let mut bootloader = Bootloader::new(&CONFIG, SimSerial::new(), SimFlash::atmega2560());

    assert_eq!(bootloader.run(&mut platform), Handoff::NoApplication);
    assert!(platform.launches.is_empty());
    assert!(!bootloader.application_present());
}

#[test]
fn test_watchdog_reset_with_blank_flash_waits_for_host() {
    let mut platform = SimPlatform::after_reset(ResetCause::WATCHDOG);
    let mut bootloader = Bootloader::new(&CONFIG, SimSerial::new(), SimFlash::atmega2560());

    assert_eq!(bootloader.run(&mut platform), Handoff::NoApplication);
    assert_eq!(bootloader.serial().enable_count, 1);
    assert!(platform.launches.is_empty());
}

#[test]
fn test_session_state_resets_between_passes() {
    let mut serial = SimSerial::new();
    serial.queue_request(1, &Request::LoadAddress(0x0800));
    serial.queue_request(2, &Request::LeaveProgmode);

    let mut platform = SimPlatform::after_reset(ResetCause::EXTERNAL);
    let mut bootloader = Bootloader::new(&CONFIG, serial, SimFlash::atmega2560());

    assert_eq!(bootloader.run(&mut platform), Handoff::NoApplication);
    assert_eq!(bootloader.session().program_address, 0x1000);
    assert!(bootloader.session().leave_requested);

    // Second pass: nothing queued, so it times out with a fresh session.
    assert_eq!(bootloader.run(&mut platform), Handoff::NoApplication);
    assert_eq!(bootloader.session().program_address, 0);
    assert!(!bootloader.session().leave_requested);
    assert_eq!(bootloader.serial().enable_count, 2);
}

#[test]
fn test_reset_cause_is_consumed_once() {
    let mut platform = SimPlatform::after_reset(ResetCause::WATCHDOG | ResetCause::BROWN_OUT);
    let mut bootloader = Bootloader::new(&CONFIG, SimSerial::new(), SimFlash::with_application());

    assert_eq!(
        bootloader.run(&mut platform),
        Handoff::Application(Route::WatchdogReset)
    );
    assert_eq!(platform.launches[0].bits(), ResetCause::WATCHDOG | ResetCause::BROWN_OUT);
    assert_eq!(platform.reset_cause.bits(), 0);
}
