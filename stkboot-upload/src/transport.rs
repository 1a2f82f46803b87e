// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Request/response exchange with the bootloader over a serial port.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use serialport::SerialPort;

use stkboot_common::frame::{Frame, FrameReceiver, Progress};
use stkboot_common::protocol::{Request, Status};

/// Default time to wait for a response.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Per-read timeout; also bounds how late a deadline is noticed.
const READ_TIMEOUT: Duration = Duration::from_millis(20);
/// Response timeout while probing for the bootloader after a reset.
const SIGN_ON_TIMEOUT: Duration = Duration::from_millis(200);
const SIGN_ON_ATTEMPTS: u32 = 10;

/// Serial transport for STK500v2 frames.
pub struct Transport<P = Box<dyn SerialPort>> {
    port: P,
    port_name: String,
    seq: u8,
    receiver: FrameReceiver,
    backlog: VecDeque<u8>,
}

impl Transport {
    /// Open a serial connection to the bootloader (8N1, no flow control).
    pub fn open(port_name: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;
        Ok(Self::from_port(port, port_name))
    }

    /// Pulse DTR and RTS low so that boards with an auto-reset circuit
    /// restart into the bootloader.
    pub fn reset_board(&mut self) -> Result<()> {
        log::debug!("Pulsing DTR/RTS on {}", self.port_name);
        self.port.write_data_terminal_ready(false)?;
        self.port.write_request_to_send(false)?;
        thread::sleep(Duration::from_millis(250));
        self.port.write_data_terminal_ready(true)?;
        self.port.write_request_to_send(true)?;
        thread::sleep(Duration::from_millis(50));
        self.drain()
    }
}

impl<P: Read + Write> Transport<P> {
    pub fn from_port(port: P, port_name: &str) -> Self {
        Self {
            port,
            port_name: port_name.to_string(),
            seq: 0,
            receiver: FrameReceiver::new(),
            backlog: VecDeque::new(),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    #[cfg(test)]
    pub fn into_port(self) -> P {
        self.port
    }

    /// Discard anything the device sent before we started talking.
    pub fn drain(&mut self) -> Result<()> {
        let mut buffer = [0u8; 64];
        let mut cruft = self.backlog.len();
        self.backlog.clear();
        self.receiver.reset();
        loop {
            match self.port.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => cruft += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e).context("Failed to drain serial port"),
            }
        }
        if cruft > 0 {
            log::debug!("Drained {} stale bytes", cruft);
        }
        Ok(())
    }

    /// Probe for the bootloader until it answers sign-on.
    pub fn sign_on(&mut self) -> Result<Frame> {
        for attempt in 1..=SIGN_ON_ATTEMPTS {
            match self.send_recv_timeout(&Request::SignOn, SIGN_ON_TIMEOUT) {
                Ok(response) => return Ok(response),
                Err(e) => log::debug!("Sign-on attempt {} failed: {:#}", attempt, e),
            }
        }
        bail!(
            "No answer from the bootloader on {} after {} attempts",
            self.port_name,
            SIGN_ON_ATTEMPTS
        )
    }

    /// Send a request and wait for its response.
    pub fn send_recv(&mut self, request: &Request<'_>) -> Result<Frame> {
        self.send_recv_timeout(request, DEFAULT_TIMEOUT)
    }

    /// Send a request and wait for its response with a custom timeout.
    pub fn send_recv_timeout(&mut self, request: &Request<'_>, timeout: Duration) -> Result<Frame> {
        self.seq = self.seq.wrapping_add(1);
        let frame = Frame::request(self.seq, request)
            .map_err(|e| anyhow!("Cannot encode {:?}: {}", request.command(), e))?;

        let wire: Vec<u8> = frame.wire_bytes().collect();
        log::trace!("TX seq={} {:02x?}", self.seq, &frame.body[..]);
        self.port.write_all(&wire).context("Failed to send request")?;
        self.port.flush().context("Failed to flush serial port")?;

        let response = self.receive(self.seq, Instant::now() + timeout)?;
        log::trace!("RX seq={} {:02x?}", response.seq, &response.body[..]);

        let opcode = request.command() as u8;
        match response.body.first() {
            Some(&echo) if echo == opcode => Ok(response),
            other => bail!(
                "Response to {:?} carries opcode {:02x?}",
                request.command(),
                other
            ),
        }
    }

    /// Like [`send_recv`](Self::send_recv), but fails unless the status is OK.
    pub fn send_ok(&mut self, request: &Request<'_>) -> Result<Frame> {
        let response = self.send_recv(request)?;
        match status_of(&response) {
            Some(Status::Ok) => Ok(response),
            Some(Status::Failed) => bail!("{:?} rejected by the bootloader", request.command()),
            None => bail!(
                "{:?} answered with unknown status {:02x?}",
                request.command(),
                response.body.get(1)
            ),
        }
    }

    fn next_byte(&mut self, deadline: Instant) -> Result<u8> {
        let mut buffer = [0u8; 64];
        loop {
            if let Some(byte) = self.backlog.pop_front() {
                return Ok(byte);
            }
            if Instant::now() >= deadline {
                bail!("Timed out waiting for response");
            }
            match self.port.read(&mut buffer) {
                Ok(n) => self.backlog.extend(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(e).context("Failed to read serial port"),
            }
        }
    }

    fn receive(&mut self, seq: u8, deadline: Instant) -> Result<Frame> {
        let mut frame = Frame::new();
        loop {
            let byte = self.next_byte(deadline)?;
            match self.receiver.push(byte, &mut frame) {
                Progress::Complete if frame.seq == seq => return Ok(frame),
                Progress::Complete => {
                    log::debug!("Ignoring stale response seq={} (want {})", frame.seq, seq)
                }
                Progress::Discarded(reason) => log::debug!("Dropped malformed frame: {:?}", reason),
                Progress::Pending => {}
            }
        }
    }
}

/// Status byte of a response.
pub fn status_of(response: &Frame) -> Option<Status> {
    response.body.get(1).copied().and_then(Status::from_byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Port that replays canned device output and records what was written.
    #[derive(Default)]
    struct ScriptedPort {
        replies: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl ScriptedPort {
        fn reply(&mut self, seq: u8, body: &[u8]) {
            let frame = Frame::with_body(seq, body).unwrap();
            self.replies.extend(frame.wire_bytes());
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.replies.is_empty() {
                return Err(io::Error::from(ErrorKind::TimedOut));
            }
            let n = buf.len().min(self.replies.len()).min(7);
            for slot in &mut buf[..n] {
                *slot = self.replies.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn request_is_framed_with_incrementing_sequence() {
        let mut port = ScriptedPort::default();
        port.reply(1, &[0x10, 0x00]);
        port.reply(2, &[0x10, 0x00]);
        let mut transport = Transport::from_port(port, "test");

        transport.send_ok(&Request::EnterProgmode).unwrap();
        transport.send_ok(&Request::EnterProgmode).unwrap();

        let written = &transport.port.written;
        assert_eq!(&written[..5], &[0x1B, 0x01, 0x00, 0x0C, 0x0E]);
        let second = written.len() / 2;
        assert_eq!(written[second + 1], 0x02);
    }

    #[test]
    fn stale_responses_are_skipped() {
        let mut port = ScriptedPort::default();
        port.reply(7, &[0x01, 0x00]);
        port.reply(1, &[0x03, 0x00, 0x0F]);
        let mut transport = Transport::from_port(port, "test");

        let response = transport
            .send_recv(&Request::GetParameter(stkboot_common::protocol::ParameterId::HardwareVersion))
            .unwrap();
        assert_eq!(response.seq, 1);
        assert_eq!(&response.body[..], &[0x03, 0x00, 0x0F]);
    }

    #[test]
    fn silence_times_out() {
        let mut transport = Transport::from_port(ScriptedPort::default(), "test");
        let err = transport
            .send_recv_timeout(&Request::SignOn, Duration::from_millis(10))
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }

    #[test]
    fn failed_status_is_an_error() {
        let mut port = ScriptedPort::default();
        port.reply(1, &[0x12, 0xC0]);
        let mut transport = Transport::from_port(port, "test");

        assert!(transport.send_ok(&Request::ChipErase).is_err());
    }

    #[test]
    fn mismatched_opcode_is_an_error() {
        let mut port = ScriptedPort::default();
        port.reply(1, &[0x11, 0x00]);
        let mut transport = Transport::from_port(port, "test");

        assert!(transport.send_recv(&Request::SignOn).is_err());
    }
}
