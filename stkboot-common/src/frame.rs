// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! STK500v2 message framing.
//!
//! Wire layout: `[START][SEQ][LEN_HI][LEN_LO][TOKEN][body..][CHECKSUM]`, where
//! the checksum is the XOR of every preceding byte. The same [`Frame`] buffer
//! carries the request and, once the interpreter has run, the response.

use core::fmt;

use heapless::Vec;

use crate::hal::SerialLink;
use crate::protocol::{Request, HEADER_LEN, MESSAGE_START, TOKEN};

/// Body capacity: the largest program-flash request (256 data bytes plus
/// the 10-byte command header) with headroom.
pub const MAX_BODY_LEN: usize = 285;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Body does not fit the frame buffer.
    BodyTooLong(usize),
    /// Frames always carry at least an opcode or status byte.
    EmptyBody,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyTooLong(len) => {
                write!(f, "body of {} bytes exceeds {} byte buffer", len, MAX_BODY_LEN)
            }
            Self::EmptyBody => f.write_str("frame body is empty"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

/// One request or response unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub seq: u8,
    pub body: Vec<u8, MAX_BODY_LEN>,
}

impl Frame {
    pub const fn new() -> Self {
        Self {
            seq: 0,
            body: Vec::new(),
        }
    }

    pub fn with_body(seq: u8, body: &[u8]) -> Result<Self, FrameError> {
        if body.is_empty() {
            return Err(FrameError::EmptyBody);
        }
        let mut frame = Self::new();
        frame.seq = seq;
        frame
            .body
            .extend_from_slice(body)
            .map_err(|()| FrameError::BodyTooLong(body.len()))?;
        Ok(frame)
    }

    /// Build a request frame.
    pub fn request(seq: u8, request: &Request<'_>) -> Result<Self, FrameError> {
        let mut frame = Self::new();
        frame.seq = seq;
        request.write_body(&mut frame.body)?;
        Ok(frame)
    }

    /// First body byte: the opcode of a request, or its echo in a response.
    pub fn opcode(&self) -> Option<u8> {
        self.body.first().copied()
    }

    /// Checksum the transmitter appends for this frame.
    pub fn checksum(&self) -> u8 {
        self.wire_bytes()
            .take(HEADER_LEN + self.body.len())
            .fold(0, |acc, byte| acc ^ byte)
    }

    /// Every byte of the frame as it goes on the wire, checksum included.
    pub fn wire_bytes(&self) -> WireBytes<'_> {
        WireBytes {
            frame: self,
            pos: 0,
            checksum: 0,
        }
    }

    /// Send the frame byte by byte; each write blocks until the link reports
    /// the byte as transmitted.
    pub fn transmit<S: SerialLink>(&self, serial: &mut S) {
        for byte in self.wire_bytes() {
            serial.write_byte(byte);
        }
    }
}

/// Iterator over the encoded bytes of a [`Frame`].
pub struct WireBytes<'a> {
    frame: &'a Frame,
    pos: usize,
    checksum: u8,
}

impl WireBytes<'_> {
    fn total_len(&self) -> usize {
        HEADER_LEN + self.frame.body.len() + 1
    }
}

impl Iterator for WireBytes<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let len = self.frame.body.len();
        let byte = match self.pos {
            0 => MESSAGE_START,
            1 => self.frame.seq,
            2 => (len >> 8) as u8,
            3 => len as u8,
            4 => TOKEN,
            n if n < HEADER_LEN + len => self.frame.body[n - HEADER_LEN],
            n if n == HEADER_LEN + len => {
                self.pos += 1;
                return Some(self.checksum);
            }
            _ => return None,
        };
        self.checksum ^= byte;
        self.pos += 1;
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_len().saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WireBytes<'_> {}

/// Receiver states. A delivered message leaves the receiver in `WaitStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxState {
    WaitStart,
    SeqNum,
    LengthHigh,
    LengthLow,
    WaitToken,
    Data,
    Checksum,
}

/// Reason a partially received frame was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Discard {
    /// Declared length is zero or larger than the body buffer.
    BadLength(u16),
    BadToken(u8),
    BadChecksum { expected: u8, received: u8 },
}

/// Outcome of feeding one byte to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    Pending,
    /// A complete, checksum-verified frame is in the buffer.
    Complete,
    /// The frame was dropped; the receiver is hunting for a start marker.
    Discarded(Discard),
}

/// Byte-at-a-time frame receiver.
///
/// Malformed input never produces an error towards the host: the receiver
/// drops what it has and waits for the next start marker.
#[derive(Debug, Clone)]
pub struct FrameReceiver {
    state: RxState,
    checksum: u8,
    length: u16,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    pub const fn new() -> Self {
        Self {
            state: RxState::WaitStart,
            checksum: 0,
            length: 0,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = RxState::WaitStart;
    }

    /// Feed one byte. On [`Progress::Complete`] `frame` holds the message.
    pub fn push(&mut self, byte: u8, frame: &mut Frame) -> Progress {
        match self.state {
            RxState::WaitStart => {
                if byte == MESSAGE_START {
                    self.checksum = byte;
                    self.state = RxState::SeqNum;
                }
            }
            RxState::SeqNum => {
                frame.seq = byte;
                self.fold(byte, RxState::LengthHigh);
            }
            RxState::LengthHigh => {
                self.length = u16::from(byte) << 8;
                self.fold(byte, RxState::LengthLow);
            }
            RxState::LengthLow => {
                self.length |= u16::from(byte);
                if self.length == 0 || usize::from(self.length) > MAX_BODY_LEN {
                    return self.discard(Discard::BadLength(self.length));
                }
                self.fold(byte, RxState::WaitToken);
            }
            RxState::WaitToken => {
                if byte != TOKEN {
                    return self.discard(Discard::BadToken(byte));
                }
                frame.body.clear();
                self.fold(byte, RxState::Data);
            }
            RxState::Data => {
                // Length was bounded in LengthLow, so the push cannot fail.
                let _ = frame.body.push(byte);
                let next = if frame.body.len() == usize::from(self.length) {
                    RxState::Checksum
                } else {
                    RxState::Data
                };
                self.fold(byte, next);
            }
            RxState::Checksum => {
                if byte != self.checksum {
                    return self.discard(Discard::BadChecksum {
                        expected: self.checksum,
                        received: byte,
                    });
                }
                self.state = RxState::WaitStart;
                return Progress::Complete;
            }
        }
        Progress::Pending
    }

    /// Block on the serial link until a valid frame has been received.
    pub fn receive<S: SerialLink>(&mut self, serial: &mut S, frame: &mut Frame) {
        loop {
            let byte = serial.read_byte();
            match self.push(byte, frame) {
                Progress::Complete => return,
                Progress::Discarded(reason) => debug!("rx: frame dropped: {:?}", reason),
                Progress::Pending => {}
            }
        }
    }

    fn fold(&mut self, byte: u8, next: RxState) {
        self.checksum ^= byte;
        self.state = next;
    }

    fn discard(&mut self, reason: Discard) -> Progress {
        self.state = RxState::WaitStart;
        Progress::Discarded(reason)
    }
}
