// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot decision and the programming session loop.
//!
//! On every reset the bootloader either hands over to the application right
//! away (watchdog reset), or listens on the serial link for a bounded time
//! and serves a programming session if the host shows up.

use crate::commands;
use crate::device::BootConfig;
use crate::frame::{Frame, FrameReceiver};
use crate::hal::{Platform, ResetCause, SelfProgram, SerialLink};
use crate::session::Session;

/// Erased flash reads as all ones.
const ERASED_WORD: u16 = 0xFFFF;

/// Why the bootloader went for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Route {
    /// The application rebooted itself through the watchdog.
    WatchdogReset,
    /// No host byte arrived within the boot timeout.
    Timeout,
    /// The host left programming mode.
    SessionEnded,
}

/// Result of one boot pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Handoff {
    /// Control was passed to the application. Only observable in simulation.
    Application(Route),
    /// Flash at address 0 is blank; the caller should run another pass.
    NoApplication,
}

/// The protocol engine bound to its hardware.
pub struct Bootloader<'c, S, F> {
    config: &'c BootConfig,
    serial: S,
    flash: F,
    session: Session,
    receiver: FrameReceiver,
    frame: Frame,
}

impl<'c, S: SerialLink, F: SelfProgram> Bootloader<'c, S, F> {
    pub fn new(config: &'c BootConfig, serial: S, flash: F) -> Self {
        Self {
            config,
            serial,
            flash,
            session: Session::new(),
            receiver: FrameReceiver::new(),
            frame: Frame::new(),
        }
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn serial(&mut self) -> &mut S {
        &mut self.serial
    }

    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_parts(self) -> (S, F) {
        (self.serial, self.flash)
    }

    /// One boot pass: arbitrate, optionally serve a session, then try to
    /// start the application.
    pub fn run<P: Platform>(&mut self, platform: &mut P) -> Handoff {
        self.session = Session::new();
        self.receiver.reset();

        let cause = platform.take_reset_cause();
        platform.disable_watchdog();
        info!("boot: reset cause 0x{:02x}", cause.bits());

        if cause.is_watchdog() {
            if self.start_application(platform, cause) {
                return Handoff::Application(Route::WatchdogReset);
            }
            warn!("boot: watchdog reset but no application, staying in bootloader");
        }

        self.serial.enable();
        let route = if self.wait_for_host() {
            info!("boot: host detected, entering programming mode");
            self.serve();
            Route::SessionEnded
        } else {
            info!("boot: no host, timeout after {} polls", self.config.boot_timeout);
            Route::Timeout
        };

        self.serial.disable();
        self.flash.rww_enable();

        if self.start_application(platform, cause) {
            Handoff::Application(route)
        } else {
            warn!("boot: flash at 0x0000 is blank");
            Handoff::NoApplication
        }
    }

    /// Poll for the first host byte. The byte itself is left in the UART.
    pub fn wait_for_host(&mut self) -> bool {
        (0..self.config.boot_timeout).any(|_| self.serial.byte_available())
    }

    /// Serve requests until the host leaves programming mode.
    pub fn serve(&mut self) {
        loop {
            self.serve_one();
            if self.session.leave_requested {
                return;
            }
        }
    }

    /// Receive one frame, execute it and send the response.
    pub fn serve_one(&mut self) {
        self.receiver.receive(&mut self.serial, &mut self.frame);
        self.session = commands::dispatch(&mut self.flash, self.config, self.session, &mut self.frame);
        self.frame.transmit(&mut self.serial);
    }

    /// Whether the first application word has been programmed.
    pub fn application_present(&mut self) -> bool {
        self.flash.read_word(0) != ERASED_WORD
    }

    fn start_application<P: Platform>(&mut self, platform: &mut P, cause: ResetCause) -> bool {
        if !self.application_present() {
            return false;
        }
        platform.start_application(cause);
        true
    }
}
