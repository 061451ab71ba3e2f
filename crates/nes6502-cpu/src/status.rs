//! The 6502 processor status register.

use bitflags::bitflags;

bitflags! {
    /// Processor status flags (register `P`).
    ///
    /// Bit 5 is unused and always reads as 1 on real hardware; it has no
    /// mnemonic of its own but is tracked here as [`Status::UNUSED`] so the
    /// push/pull paths can enforce the B/unused-bit conventions spec.md
    /// §4.3.4 describes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// Carry.
        const C = 1 << 0;
        /// Zero.
        const Z = 1 << 1;
        /// Interrupt disable.
        const I = 1 << 2;
        /// Decimal mode (unimplemented on the NES variant; see `CpuError::DecimalModeUnsupported`).
        const D = 1 << 3;
        /// Break (only meaningful in the byte pushed to the stack).
        const B = 1 << 4;
        /// Unused, always reads as 1.
        const UNUSED = 1 << 5;
        /// Overflow.
        const V = 1 << 6;
        /// Negative.
        const N = 1 << 7;
    }
}

/// The flags set by the hardware reset sequence: interrupts disabled, the
/// unused bit always set.
pub const POWER_ON: Status = Status::I.union(Status::UNUSED);

/// The bits PLP/RTI actually restore from a pulled byte; bits 4 and 5 are
/// always ignored on the way in (spec.md §4.3.4).
const RESTORED_ON_PULL: Status = Status::C
    .union(Status::Z)
    .union(Status::I)
    .union(Status::D)
    .union(Status::V)
    .union(Status::N);

impl Status {
    /// Sets N from bit 7 of `value` and Z from `value == 0`.
    pub fn set_zn(&mut self, value: u8) {
        self.set(Status::N, value & 0x80 != 0);
        self.set(Status::Z, value == 0);
    }

    /// Encodes the byte PHP or the BRK sequence pushes to the stack: the
    /// unused bit is always 1, and B is 1 for BRK/PHP, 0 for a hardware
    /// IRQ/NMI push (this core only ever pushes with `brk = true`, since
    /// it has no external interrupt line, but the parameter documents the
    /// distinction spec.md §4.3.4 draws).
    #[must_use]
    pub fn to_stack_byte(self, brk: bool) -> u8 {
        let mut bits = self | Status::UNUSED;
        bits.set(Status::B, brk);
        bits.bits()
    }

    /// Decodes a byte popped by PLP or RTI: bits 4 and 5 are ignored, with
    /// the unused bit forced back to 1 per the processor's convention.
    #[must_use]
    pub fn from_stack_byte(value: u8) -> Self {
        (Status::from_bits_truncate(value) & RESTORED_ON_PULL) | Status::UNUSED
    }
}
