//! CPU-level errors: everything that drives the core into `RunState::Halt`.

use thiserror::Error;

use crate::instructions::AddressingMode;

/// A failure that halts the CPU. Recoverable only by calling `reset()`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    /// The fetched byte has no entry in the instruction table.
    #[error("undefined opcode {opcode:#04x} at PC={pc:#06x}")]
    UndefinedOpcode {
        /// The opcode byte that failed to decode.
        opcode: u8,
        /// The program counter it was fetched from.
        pc: u16,
    },
    /// An opcode executor was invoked with an addressing mode it does not
    /// implement (should be unreachable given a correct instruction table,
    /// but kept as a defined failure mode per spec.md §7).
    #[error("mnemonic {mnemonic:?} does not support addressing mode {mode:?}")]
    UnsupportedMode {
        /// The mnemonic, rendered via its `Debug` form.
        mnemonic: &'static str,
        /// The unsupported mode.
        mode: AddressingMode,
    },
    /// `D` was set when ADC or SBC executed; the NES 6502 omits decimal
    /// mode.
    #[error("decimal mode is unsupported (D set at PC={pc:#06x})")]
    DecimalModeUnsupported {
        /// The program counter at the point of failure.
        pc: u16,
    },
}
