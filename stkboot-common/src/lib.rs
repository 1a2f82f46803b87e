// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Protocol engine for the stkboot STK500v2 bootloader.
//!
//! This crate holds everything that does not touch a register:
//! - `frame`: wire framing (receiver state machine and transmitter)
//! - `commands`: the opcode interpreter
//! - `programmer`: page erase/fill/write sequencing
//! - `boot`: reset-cause arbitration and the session loop
//!
//! The firmware binds the traits in [`hal`] to real hardware; host tools
//! enable the `std` feature and reuse the framing and request builders.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub mod boot;
pub mod commands;
pub mod device;
pub mod frame;
pub mod hal;
pub mod programmer;
pub mod protocol;
pub mod session;

pub use boot::{Bootloader, Handoff, Route};
pub use device::{BootConfig, Capabilities, DeviceProfile, Parameters};
pub use frame::{Frame, FrameError, FrameReceiver, Progress, MAX_BODY_LEN};
pub use hal::{FuseByte, Platform, ResetCause, SelfProgram, SerialLink};
pub use protocol::{Command, Request, Status};
pub use session::Session;
