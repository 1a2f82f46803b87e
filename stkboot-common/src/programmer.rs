// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Page programming sequence on top of [`SelfProgram`].
//!
//! Erasing is incremental: each program request erases the page at the
//! session's erase cursor and moves it forward, so a host that writes the
//! image from address 0 upwards finds every page erased just in time. The
//! cursor stops at the application boundary, which keeps the resident region
//! out of reach of page erase.
//!
//! A flash operation that never completes hangs in `wait_ready`; there is
//! no recovery path.

use heapless::Vec;

use crate::device::DeviceProfile;
use crate::hal::SelfProgram;
use crate::session::Session;

/// Write one page request (`data` holds whole little-endian words) at the
/// session's program cursor.
pub fn program_page<F: SelfProgram>(
    flash: &mut F,
    device: &DeviceProfile,
    mut session: Session,
    data: &[u8],
) -> Session {
    let start = session.program_address;

    if session.erase_address < device.application_end() {
        trace!("flash: erase page 0x{:08x}", session.erase_address);
        flash.page_erase(session.erase_address);
        flash.wait_ready();
        session.erase_address += device.page_size;
    }

    for word in data.chunks_exact(2) {
        flash.page_fill(
            session.program_address,
            u16::from_le_bytes([word[0], word[1]]),
        );
        session.program_address = session.program_address.wrapping_add(2);
    }

    let page = device.page_base(start);
    trace!("flash: write page 0x{:08x} ({} bytes)", page, data.len());
    flash.page_write(page);
    flash.wait_ready();
    // Writing locks the RWW section until it is explicitly re-enabled.
    flash.rww_enable();

    session
}

/// Append `count` bytes of flash starting at the program cursor to `out`,
/// low byte of each word first.
///
/// `count` must be even and fit in `out`; the caller validates both.
pub fn read_flash<F: SelfProgram, const N: usize>(
    flash: &mut F,
    mut session: Session,
    count: u16,
    out: &mut Vec<u8, N>,
) -> Session {
    for _ in 0..count / 2 {
        let [lo, hi] = flash.read_word(session.program_address).to_le_bytes();
        let _ = out.push(lo);
        let _ = out.push(hi);
        session.program_address = session.program_address.wrapping_add(2);
    }
    session
}
