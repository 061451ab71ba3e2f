//! The static opcode → descriptor table.

/// The 56 documented 6502 mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
}

/// The thirteen 6502 addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AddressingMode {
    Accumulator,
    Immediate,
    Implied,
    Relative,
    Absolute,
    ZeroPage,
    Indirect,
    AbsoluteX,
    AbsoluteY,
    ZeroPageX,
    ZeroPageY,
    XIndirect,
    IndirectY,
}

impl AddressingMode {
    /// Operand length in bytes, including the opcode byte itself (1-3), per
    /// spec.md §8's structural invariant.
    #[must_use]
    pub fn operand_length(self) -> u8 {
        match self {
            AddressingMode::Accumulator | AddressingMode::Implied => 1,
            AddressingMode::Immediate
            | AddressingMode::Relative
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::XIndirect
            | AddressingMode::IndirectY => 2,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 3,
        }
    }
}

/// A fully decoded opcode: mnemonic, addressing mode, and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The instruction's mnemonic.
    pub mnemonic: Mnemonic,
    /// The opcode byte it decodes from.
    pub opcode: u8,
    /// The addressing mode of the operand.
    pub mode: AddressingMode,
    /// Base cycle count, before any page-cross or branch-taken penalty.
    pub cycles: u8,
    /// Whether a page crossing on the effective address adds one cycle.
    pub page_cross_adds_cycle: bool,
}

const fn instr(
    mnemonic: Mnemonic,
    opcode: u8,
    mode: AddressingMode,
    cycles: u8,
) -> Instruction {
    Instruction {
        mnemonic,
        opcode,
        mode,
        cycles,
        page_cross_adds_cycle: false,
    }
}

const fn instr_pc(
    mnemonic: Mnemonic,
    opcode: u8,
    mode: AddressingMode,
    cycles: u8,
) -> Instruction {
    Instruction {
        mnemonic,
        opcode,
        mode,
        cycles,
        page_cross_adds_cycle: true,
    }
}

use AddressingMode::{
    Absolute, AbsoluteX, AbsoluteY, Accumulator, Immediate, Implied, Indirect, IndirectY,
    Relative, XIndirect, ZeroPage, ZeroPageX, ZeroPageY,
};
use Mnemonic::{
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc, Cld, Cli, Clv, Cmp,
    Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha,
    Php, Pla, Plp, Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa,
    Txs, Tya,
};

/// The 151 defined opcodes, indexed densely but not contiguously by opcode
/// byte (the remaining 105 byte values have no mapping). Grounded on the
/// `original_source/source/nes/cpu.hpp` `instructions[]` table, which this
/// core treats as the canonical cycle-count/addressing-mode source of truth
/// even though that repository's executors never implement most of them.
pub static INSTRUCTION_TABLE: &[Instruction] = &[
    // ADC
    instr(Adc, 0x69, Immediate, 2),
    instr(Adc, 0x65, ZeroPage, 3),
    instr(Adc, 0x75, ZeroPageX, 4),
    instr(Adc, 0x6D, Absolute, 4),
    instr_pc(Adc, 0x7D, AbsoluteX, 4),
    instr_pc(Adc, 0x79, AbsoluteY, 4),
    instr(Adc, 0x61, XIndirect, 6),
    instr_pc(Adc, 0x71, IndirectY, 5),
    // AND
    instr(And, 0x29, Immediate, 2),
    instr(And, 0x25, ZeroPage, 3),
    instr(And, 0x35, ZeroPageX, 4),
    instr(And, 0x2D, Absolute, 4),
    instr_pc(And, 0x3D, AbsoluteX, 4),
    instr_pc(And, 0x39, AbsoluteY, 4),
    instr(And, 0x21, XIndirect, 6),
    instr_pc(And, 0x31, IndirectY, 5),
    // ASL
    instr(Asl, 0x0A, Accumulator, 2),
    instr(Asl, 0x06, ZeroPage, 5),
    instr(Asl, 0x16, ZeroPageX, 6),
    instr(Asl, 0x0E, Absolute, 6),
    instr(Asl, 0x1E, AbsoluteX, 7),
    // Branches
    instr(Bcc, 0x90, Relative, 2),
    instr(Bcs, 0xB0, Relative, 2),
    instr(Beq, 0xF0, Relative, 2),
    instr(Bmi, 0x30, Relative, 2),
    instr(Bne, 0xD0, Relative, 2),
    instr(Bpl, 0x10, Relative, 2),
    instr(Bvc, 0x50, Relative, 2),
    instr(Bvs, 0x70, Relative, 2),
    // BIT
    instr(Bit, 0x24, ZeroPage, 3),
    instr(Bit, 0x2C, Absolute, 4),
    // BRK
    instr(Brk, 0x00, Implied, 7),
    // Clear flags
    instr(Clc, 0x18, Implied, 2),
    instr(Cld, 0xD8, Implied, 2),
    instr(Cli, 0x58, Implied, 2),
    instr(Clv, 0xB8, Implied, 2),
    // CMP
    instr(Cmp, 0xC9, Immediate, 2),
    instr(Cmp, 0xC5, ZeroPage, 3),
    instr(Cmp, 0xD5, ZeroPageX, 4),
    instr(Cmp, 0xCD, Absolute, 4),
    instr_pc(Cmp, 0xDD, AbsoluteX, 4),
    instr_pc(Cmp, 0xD9, AbsoluteY, 4),
    instr(Cmp, 0xC1, XIndirect, 6),
    instr_pc(Cmp, 0xD1, IndirectY, 5),
    // CPX/CPY
    instr(Cpx, 0xE0, Immediate, 2),
    instr(Cpx, 0xE4, ZeroPage, 3),
    instr(Cpx, 0xEC, Absolute, 4),
    instr(Cpy, 0xC0, Immediate, 2),
    instr(Cpy, 0xC4, ZeroPage, 3),
    instr(Cpy, 0xCC, Absolute, 4),
    // DEC
    instr(Dec, 0xC6, ZeroPage, 5),
    instr(Dec, 0xD6, ZeroPageX, 6),
    instr(Dec, 0xCE, Absolute, 6),
    instr(Dec, 0xDE, AbsoluteX, 7),
    instr(Dex, 0xCA, Implied, 2),
    instr(Dey, 0x88, Implied, 2),
    // EOR
    instr(Eor, 0x49, Immediate, 2),
    instr(Eor, 0x45, ZeroPage, 3),
    instr(Eor, 0x55, ZeroPageX, 4),
    instr(Eor, 0x4D, Absolute, 4),
    instr_pc(Eor, 0x5D, AbsoluteX, 4),
    instr_pc(Eor, 0x59, AbsoluteY, 4),
    instr(Eor, 0x41, XIndirect, 6),
    instr_pc(Eor, 0x51, IndirectY, 5),
    // INC
    instr(Inc, 0xE6, ZeroPage, 5),
    instr(Inc, 0xF6, ZeroPageX, 6),
    instr(Inc, 0xEE, Absolute, 6),
    instr(Inc, 0xFE, AbsoluteX, 7),
    instr(Inx, 0xE8, Implied, 2),
    instr(Iny, 0xC8, Implied, 2),
    // JMP/JSR
    instr(Jmp, 0x4C, Absolute, 3),
    instr(Jmp, 0x6C, Indirect, 5),
    instr(Jsr, 0x20, Absolute, 6),
    // LDA
    instr(Lda, 0xA9, Immediate, 2),
    instr(Lda, 0xA5, ZeroPage, 3),
    instr(Lda, 0xB5, ZeroPageX, 4),
    instr(Lda, 0xAD, Absolute, 4),
    instr_pc(Lda, 0xBD, AbsoluteX, 4),
    instr_pc(Lda, 0xB9, AbsoluteY, 4),
    instr(Lda, 0xA1, XIndirect, 6),
    instr_pc(Lda, 0xB1, IndirectY, 5),
    // LDX
    instr(Ldx, 0xA2, Immediate, 2),
    instr(Ldx, 0xA6, ZeroPage, 3),
    instr(Ldx, 0xB6, ZeroPageY, 4),
    instr(Ldx, 0xAE, Absolute, 4),
    instr_pc(Ldx, 0xBE, AbsoluteY, 4),
    // LDY
    instr(Ldy, 0xA0, Immediate, 2),
    instr(Ldy, 0xA4, ZeroPage, 3),
    instr(Ldy, 0xB4, ZeroPageX, 4),
    instr(Ldy, 0xAC, Absolute, 4),
    instr_pc(Ldy, 0xBC, AbsoluteX, 4),
    // LSR
    instr(Lsr, 0x4A, Accumulator, 2),
    instr(Lsr, 0x46, ZeroPage, 5),
    instr(Lsr, 0x56, ZeroPageX, 6),
    instr(Lsr, 0x4E, Absolute, 6),
    instr(Lsr, 0x5E, AbsoluteX, 7),
    // NOP
    instr(Nop, 0xEA, Implied, 2),
    // ORA
    instr(Ora, 0x09, Immediate, 2),
    instr(Ora, 0x05, ZeroPage, 3),
    instr(Ora, 0x15, ZeroPageX, 4),
    instr(Ora, 0x0D, Absolute, 4),
    instr_pc(Ora, 0x1D, AbsoluteX, 4),
    instr_pc(Ora, 0x19, AbsoluteY, 4),
    instr(Ora, 0x01, XIndirect, 6),
    instr_pc(Ora, 0x11, IndirectY, 5),
    // Stack ops
    instr(Pha, 0x48, Implied, 3),
    instr(Php, 0x08, Implied, 3),
    instr(Pla, 0x68, Implied, 4),
    instr(Plp, 0x28, Implied, 4),
    // ROL/ROR
    instr(Rol, 0x2A, Accumulator, 2),
    instr(Rol, 0x26, ZeroPage, 5),
    instr(Rol, 0x36, ZeroPageX, 6),
    instr(Rol, 0x2E, Absolute, 6),
    instr(Rol, 0x3E, AbsoluteX, 7),
    instr(Ror, 0x6A, Accumulator, 2),
    instr(Ror, 0x66, ZeroPage, 5),
    instr(Ror, 0x76, ZeroPageX, 6),
    instr(Ror, 0x6E, Absolute, 6),
    instr(Ror, 0x7E, AbsoluteX, 7),
    // RTI/RTS
    instr(Rti, 0x40, Implied, 6),
    instr(Rts, 0x60, Implied, 6),
    // SBC
    instr(Sbc, 0xE9, Immediate, 2),
    instr(Sbc, 0xE5, ZeroPage, 3),
    instr(Sbc, 0xF5, ZeroPageX, 4),
    instr(Sbc, 0xED, Absolute, 4),
    instr_pc(Sbc, 0xFD, AbsoluteX, 4),
    instr_pc(Sbc, 0xF9, AbsoluteY, 4),
    instr(Sbc, 0xE1, XIndirect, 6),
    instr_pc(Sbc, 0xF1, IndirectY, 5),
    // Set flags
    instr(Sec, 0x38, Implied, 2),
    instr(Sed, 0xF8, Implied, 2),
    instr(Sei, 0x78, Implied, 2),
    // STA
    instr(Sta, 0x85, ZeroPage, 3),
    instr(Sta, 0x95, ZeroPageX, 4),
    instr(Sta, 0x8D, Absolute, 4),
    instr(Sta, 0x9D, AbsoluteX, 5),
    instr(Sta, 0x99, AbsoluteY, 5),
    instr(Sta, 0x81, XIndirect, 6),
    instr(Sta, 0x91, IndirectY, 6),
    // STX/STY
    instr(Stx, 0x86, ZeroPage, 3),
    instr(Stx, 0x96, ZeroPageY, 4),
    instr(Stx, 0x8E, Absolute, 4),
    instr(Sty, 0x84, ZeroPage, 3),
    instr(Sty, 0x94, ZeroPageX, 4),
    instr(Sty, 0x8C, Absolute, 4),
    // Register transfers
    instr(Tax, 0xAA, Implied, 2),
    instr(Tay, 0xA8, Implied, 2),
    instr(Tsx, 0xBA, Implied, 2),
    instr(Txa, 0x8A, Implied, 2),
    instr(Txs, 0x9A, Implied, 2),
    instr(Tya, 0x98, Implied, 2),
];

/// Finds the descriptor for a fetched opcode byte, if defined.
#[must_use]
pub fn decode(opcode: u8) -> Option<&'static Instruction> {
    INSTRUCTION_TABLE.iter().find(|i| i.opcode == opcode)
}
