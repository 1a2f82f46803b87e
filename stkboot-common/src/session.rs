// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

/// Cursor state of one programming session.
///
/// Passed into every command handler and returned updated; it lives only
/// for the current boot pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    /// Byte address of the next flash read or write.
    pub program_address: u32,
    /// Byte address up to which pages have been erased.
    pub erase_address: u32,
    /// Set by leave-programming-mode; ends the loop once the answer is out.
    pub leave_requested: bool,
}

impl Session {
    pub const fn new() -> Self {
        Self {
            program_address: 0,
            erase_address: 0,
            leave_requested: false,
        }
    }
}
