// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-memory ATmega model shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;

use stkboot_common::frame::{Frame, FrameReceiver, Progress};
use stkboot_common::hal::{FuseByte, Platform, ResetCause, SelfProgram, SerialLink};
use stkboot_common::protocol::Request;

// --- Serial ---

#[derive(Default)]
pub struct SimSerial {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub enabled: bool,
    pub enable_count: usize,
}

impl SimSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn queue_request(&mut self, seq: u8, request: &Request<'_>) {
        let frame = Frame::request(seq, request).unwrap();
        self.rx.extend(frame.wire_bytes());
    }

    /// Decode everything transmitted so far.
    pub fn responses(&self) -> Vec<Frame> {
        let mut receiver = FrameReceiver::new();
        let mut frame = Frame::new();
        let mut out = Vec::new();
        for &byte in &self.tx {
            match receiver.push(byte, &mut frame) {
                Progress::Complete => out.push(frame.clone()),
                Progress::Discarded(reason) => panic!("malformed response: {:?}", reason),
                Progress::Pending => {}
            }
        }
        assert_eq!(
            receiver.state(),
            stkboot_common::frame::RxState::WaitStart,
            "trailing partial response"
        );
        out
    }
}

impl SerialLink for SimSerial {
    fn enable(&mut self) {
        self.enabled = true;
        self.enable_count += 1;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn byte_available(&mut self) -> bool {
        self.enabled && !self.rx.is_empty()
    }

    fn read_byte(&mut self) -> u8 {
        assert!(self.enabled, "read from a disabled UART");
        self.rx.pop_front().expect("host stalled: receive queue empty")
    }

    fn write_byte(&mut self, byte: u8) {
        assert!(self.enabled, "write to a disabled UART");
        self.tx.push(byte);
    }
}

// --- Flash ---

pub struct SimFlash {
    pub memory: Vec<u8>,
    pub page_size: u32,
    page_buffer: Vec<u8>,
    busy: bool,
    pub rww_enabled: bool,
    pub erased_pages: Vec<u32>,
    pub written_pages: Vec<u32>,
    pub lock: u8,
    pub low_fuse: u8,
    pub high_fuse: u8,
    pub extended_fuse: u8,
}

impl SimFlash {
    /// Blank flash of `size` bytes.
    pub fn new(size: u32, page_size: u32) -> Self {
        Self {
            memory: vec![0xFF; size as usize],
            page_size,
            page_buffer: vec![0xFF; page_size as usize],
            busy: false,
            rww_enabled: true,
            erased_pages: Vec::new(),
            written_pages: Vec::new(),
            lock: 0xCF,
            low_fuse: 0xFF,
            high_fuse: 0xD8,
            extended_fuse: 0xFD,
        }
    }

    pub fn atmega2560() -> Self {
        Self::new(256 * 1024, 256)
    }

    /// Flash with a (non-blank) reset vector at address 0.
    pub fn with_application() -> Self {
        let mut flash = Self::atmega2560();
        flash.memory[0] = 0x0C;
        flash.memory[1] = 0x94;
        flash
    }

    pub fn bytes(&self, address: u32, len: usize) -> &[u8] {
        &self.memory[address as usize..address as usize + len]
    }

    fn page_range(&self, address: u32) -> std::ops::Range<usize> {
        let base = (address & !(self.page_size - 1)) as usize;
        base..base + self.page_size as usize
    }
}

impl SelfProgram for SimFlash {
    fn page_erase(&mut self, address: u32) {
        assert!(!self.busy, "SPM issued while busy");
        let range = self.page_range(address);
        self.memory[range.clone()].fill(0xFF);
        self.erased_pages.push(range.start as u32);
        self.busy = true;
        self.rww_enabled = false;
    }

    fn page_fill(&mut self, address: u32, word: u16) {
        assert!(!self.busy, "SPM issued while busy");
        let offset = (address % self.page_size) as usize & !1;
        let [lo, hi] = word.to_le_bytes();
        self.page_buffer[offset] = lo;
        self.page_buffer[offset + 1] = hi;
    }

    fn page_write(&mut self, address: u32) {
        assert!(!self.busy, "SPM issued while busy");
        let range = self.page_range(address);
        // NOR flash can only clear bits without an erase.
        for (cell, staged) in self.memory[range.clone()].iter_mut().zip(&self.page_buffer) {
            *cell &= *staged;
        }
        self.page_buffer.fill(0xFF);
        self.written_pages.push(range.start as u32);
        self.busy = true;
        self.rww_enabled = false;
    }

    fn wait_ready(&mut self) {
        self.busy = false;
    }

    fn rww_enable(&mut self) {
        assert!(!self.busy, "RWW enable while SPM busy");
        self.rww_enabled = true;
    }

    fn read_word(&mut self, address: u32) -> u16 {
        assert!(self.rww_enabled, "read of RWW section while locked");
        let a = address as usize;
        u16::from_le_bytes([self.memory[a], self.memory[a + 1]])
    }

    fn read_fuse(&mut self, fuse: FuseByte) -> u8 {
        match fuse {
            FuseByte::Low => self.low_fuse,
            FuseByte::Lock => self.lock,
            FuseByte::Extended => self.extended_fuse,
            FuseByte::High => self.high_fuse,
        }
    }
}

// --- Platform ---

#[derive(Default)]
pub struct SimPlatform {
    pub reset_cause: ResetCause,
    pub watchdog_disabled: bool,
    pub launches: Vec<ResetCause>,
}

impl SimPlatform {
    pub fn after_reset(bits: u8) -> Self {
        Self {
            reset_cause: ResetCause::from_bits(bits),
            ..Self::default()
        }
    }
}

impl Platform for SimPlatform {
    fn take_reset_cause(&mut self) -> ResetCause {
        core::mem::take(&mut self.reset_cause)
    }

    fn disable_watchdog(&mut self) {
        self.watchdog_disabled = true;
    }

    fn start_application(&mut self, cause: ResetCause) {
        self.launches.push(cause);
    }
}
