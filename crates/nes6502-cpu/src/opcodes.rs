//! Opcode executors.
//!
//! One exhaustive match over [`Mnemonic`], with a handful of shared helpers
//! (load, store, compare, the shift/rotate family, `add_with_carry`) per
//! spec.md §9's redesign guidance, replacing the source's per-opcode stub
//! chain and the teacher's denser per-addressing-mode function table.
//!
//! Every opcode executor is pure over `(registers, bus, operand)`, reached
//! through the [`ExecutionContext`] trait `cpu.rs` implements, and reports
//! success or failure per spec.md §9.

use crate::addressing::Operand;
use crate::error::CpuError;
use crate::instructions::{AddressingMode, Mnemonic};
use crate::status::Status;

/// The register file and bus primitives an opcode executor needs. Implemented
/// by `Cpu` itself; kept as a trait so executors stay testable in isolation
/// from the sub-cycle state machine.
pub trait ExecutionContext {
    /// Reads a byte from the bus at `addr`.
    fn read(&mut self, addr: u16) -> u8;
    /// Writes a byte to the bus at `addr`.
    fn write(&mut self, addr: u16, value: u8);
    /// Pushes a byte to the stack, decrementing SP (wrapping within page 1).
    fn push(&mut self, value: u8);
    /// Pops a byte from the stack, incrementing SP (wrapping within page 1).
    fn pop(&mut self) -> u8;

    /// Accumulator.
    fn a(&self) -> u8;
    /// Sets the accumulator.
    fn set_a(&mut self, value: u8);
    /// X index register.
    fn x(&self) -> u8;
    /// Sets X.
    fn set_x(&mut self, value: u8);
    /// Y index register.
    fn y(&self) -> u8;
    /// Sets Y.
    fn set_y(&mut self, value: u8);
    /// Stack pointer.
    fn sp(&self) -> u8;
    /// Sets the stack pointer directly (used by TXS).
    fn set_sp(&mut self, value: u8);
    /// Program counter.
    fn pc(&self) -> u16;
    /// Sets the program counter (control transfer).
    fn set_pc(&mut self, value: u16);
    /// Processor status.
    fn status(&self) -> Status;
    /// Sets the processor status.
    fn set_status(&mut self, status: Status);
}

fn operand_value(ctx: &mut dyn ExecutionContext, mode: AddressingMode, operand: Operand) -> u8 {
    match (mode, operand) {
        (AddressingMode::Accumulator, _) => ctx.a(),
        (_, Operand::Value(v)) => v,
        (_, Operand::Address { effective, .. }) => ctx.read(effective),
    }
}

fn store_result(ctx: &mut dyn ExecutionContext, mode: AddressingMode, operand: Operand, value: u8) {
    match (mode, operand) {
        (AddressingMode::Accumulator, _) => ctx.set_a(value),
        (_, Operand::Address { effective, .. }) => ctx.write(effective, value),
        (_, Operand::Value(_)) => unreachable!("store target must be an address or accumulator"),
    }
}

fn operand_address(mode: AddressingMode, operand: Operand) -> Option<u16> {
    match (mode, operand) {
        (AddressingMode::Accumulator, _) => None,
        (_, Operand::Address { effective, .. }) => Some(effective),
        (_, Operand::Value(_)) => None,
    }
}

/// `sum = A + M + C`; `C' = sum > 0xFF`; `V' = (~(A^M) & (A^sum) & 0x80) != 0`.
fn add_with_carry(a: u8, m: u8, carry_in: bool) -> (u8, bool, bool) {
    let sum = u16::from(a) + u16::from(m) + u16::from(carry_in);
    let result = sum as u8;
    let carry_out = sum > 0xFF;
    let overflow = (!(a ^ m) & (a ^ result) & 0x80) != 0;
    (result, carry_out, overflow)
}

fn compare(ctx: &mut dyn ExecutionContext, reg: u8, value: u8) {
    let result = u16::from(reg).wrapping_sub(u16::from(value));
    let mut status = ctx.status();
    status.set(Status::C, reg >= value);
    status.set(Status::Z, reg == value);
    status.set(Status::N, result & 0x80 != 0);
    ctx.set_status(status);
}

fn shift_left(ctx: &mut dyn ExecutionContext, value: u8) -> u8 {
    let mut status = ctx.status();
    status.set(Status::C, value & 0x80 != 0);
    let result = value << 1;
    status.set_zn(result);
    ctx.set_status(status);
    result
}

fn shift_right(ctx: &mut dyn ExecutionContext, value: u8) -> u8 {
    let mut status = ctx.status();
    status.set(Status::C, value & 0x01 != 0);
    let result = value >> 1;
    status.set_zn(result);
    ctx.set_status(status);
    result
}

fn rotate_left(ctx: &mut dyn ExecutionContext, value: u8) -> u8 {
    let mut status = ctx.status();
    let carry_in = u8::from(status.contains(Status::C));
    status.set(Status::C, value & 0x80 != 0);
    let result = (value << 1) | carry_in;
    status.set_zn(result);
    ctx.set_status(status);
    result
}

fn rotate_right(ctx: &mut dyn ExecutionContext, value: u8) -> u8 {
    let mut status = ctx.status();
    let carry_in = u8::from(status.contains(Status::C));
    status.set(Status::C, value & 0x01 != 0);
    let result = (value >> 1) | (carry_in << 7);
    status.set_zn(result);
    ctx.set_status(status);
    result
}

fn branch_taken(status: Status, mnemonic: Mnemonic) -> bool {
    match mnemonic {
        Mnemonic::Bcc => !status.contains(Status::C),
        Mnemonic::Bcs => status.contains(Status::C),
        Mnemonic::Beq => status.contains(Status::Z),
        Mnemonic::Bmi => status.contains(Status::N),
        Mnemonic::Bne => !status.contains(Status::Z),
        Mnemonic::Bpl => !status.contains(Status::N),
        Mnemonic::Bvc => !status.contains(Status::V),
        Mnemonic::Bvs => status.contains(Status::V),
        _ => unreachable!("branch_taken called with a non-branch mnemonic"),
    }
}

fn push_u16(ctx: &mut dyn ExecutionContext, value: u16) {
    let [lo, hi] = value.to_le_bytes();
    ctx.push(hi);
    ctx.push(lo);
}

fn pop_u16(ctx: &mut dyn ExecutionContext) -> u16 {
    let lo = ctx.pop();
    let hi = ctx.pop();
    u16::from_le_bytes([lo, hi])
}

fn read_vector(ctx: &mut dyn ExecutionContext, lo_addr: u16) -> u16 {
    let lo = ctx.read(lo_addr);
    let hi = ctx.read(lo_addr + 1);
    u16::from_le_bytes([lo, hi])
}

const IRQ_BRK_VECTOR: u16 = 0xFFFE;

/// Runs one instruction's full side effect and returns any additional cycles
/// (beyond the descriptor's base count) it consumed — a taken branch, and/or
/// a page crossing on a taken branch or an indexed read.
///
/// `mode_crosses_page` is supplied by the caller for indexed addressing
/// modes with the page-cross-adds-cycle flag (computed once in `cpu.rs` from
/// the already-resolved [`Operand`]); `branch_target`, only for `Relative`.
pub fn execute(
    ctx: &mut dyn ExecutionContext,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    operand: Operand,
    mode_crosses_page: bool,
    branch_target: Option<u16>,
) -> Result<u8, CpuError> {
    let mut extra_cycles = u8::from(mode_crosses_page);

    match mnemonic {
        Mnemonic::Adc | Mnemonic::Sbc => {
            if ctx.status().contains(Status::D) {
                return Err(CpuError::DecimalModeUnsupported { pc: ctx.pc() });
            }
            let m = operand_value(ctx, mode, operand);
            let m = if mnemonic == Mnemonic::Sbc { m ^ 0xFF } else { m };
            let carry_in = ctx.status().contains(Status::C);
            let (result, carry_out, overflow) = add_with_carry(ctx.a(), m, carry_in);
            ctx.set_a(result);
            let mut status = ctx.status();
            status.set(Status::C, carry_out);
            status.set(Status::V, overflow);
            status.set_zn(result);
            ctx.set_status(status);
        }
        Mnemonic::And => {
            let value = ctx.a() & operand_value(ctx, mode, operand);
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Asl => {
            let value = operand_value(ctx, mode, operand);
            let result = shift_left(ctx, value);
            store_result(ctx, mode, operand, result);
        }
        Mnemonic::Bcc
        | Mnemonic::Bcs
        | Mnemonic::Beq
        | Mnemonic::Bmi
        | Mnemonic::Bne
        | Mnemonic::Bpl
        | Mnemonic::Bvc
        | Mnemonic::Bvs => {
            let target = branch_target.expect("branch mnemonics always supply a target");
            if branch_taken(ctx.status(), mnemonic) {
                extra_cycles += 1;
                if ctx.pc() & 0xFF00 != target & 0xFF00 {
                    extra_cycles += 1;
                }
                ctx.set_pc(target);
            }
        }
        Mnemonic::Bit => {
            let m = operand_value(ctx, mode, operand);
            let mut status = ctx.status();
            status.set(Status::Z, (ctx.a() & m) == 0);
            status.set(Status::N, m & 0x80 != 0);
            status.set(Status::V, m & 0x40 != 0);
            ctx.set_status(status);
        }
        Mnemonic::Brk => {
            push_u16(ctx, ctx.pc().wrapping_add(1));
            ctx.push(ctx.status().to_stack_byte(true));
            let mut status = ctx.status();
            status.insert(Status::I);
            ctx.set_status(status);
            let target = read_vector(ctx, IRQ_BRK_VECTOR);
            ctx.set_pc(target);
        }
        Mnemonic::Clc => {
            let mut status = ctx.status();
            status.remove(Status::C);
            ctx.set_status(status);
        }
        Mnemonic::Cld => {
            let mut status = ctx.status();
            status.remove(Status::D);
            ctx.set_status(status);
        }
        Mnemonic::Cli => {
            let mut status = ctx.status();
            status.remove(Status::I);
            ctx.set_status(status);
        }
        Mnemonic::Clv => {
            let mut status = ctx.status();
            status.remove(Status::V);
            ctx.set_status(status);
        }
        Mnemonic::Cmp => {
            let m = operand_value(ctx, mode, operand);
            compare(ctx, ctx.a(), m);
        }
        Mnemonic::Cpx => {
            let m = operand_value(ctx, mode, operand);
            compare(ctx, ctx.x(), m);
        }
        Mnemonic::Cpy => {
            let m = operand_value(ctx, mode, operand);
            compare(ctx, ctx.y(), m);
        }
        Mnemonic::Dec => {
            let value = operand_value(ctx, mode, operand).wrapping_sub(1);
            store_result(ctx, mode, operand, value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Dex => {
            let value = ctx.x().wrapping_sub(1);
            ctx.set_x(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Dey => {
            let value = ctx.y().wrapping_sub(1);
            ctx.set_y(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Eor => {
            let value = ctx.a() ^ operand_value(ctx, mode, operand);
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Inc => {
            let value = operand_value(ctx, mode, operand).wrapping_add(1);
            store_result(ctx, mode, operand, value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Inx => {
            let value = ctx.x().wrapping_add(1);
            ctx.set_x(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Iny => {
            let value = ctx.y().wrapping_add(1);
            ctx.set_y(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Jmp => {
            let addr = operand_address(mode, operand).expect("JMP always resolves to an address");
            ctx.set_pc(addr);
        }
        Mnemonic::Jsr => {
            let addr = operand_address(mode, operand).expect("JSR always resolves to an address");
            push_u16(ctx, ctx.pc().wrapping_sub(1));
            ctx.set_pc(addr);
        }
        Mnemonic::Lda => {
            let value = operand_value(ctx, mode, operand);
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Ldx => {
            let value = operand_value(ctx, mode, operand);
            ctx.set_x(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Ldy => {
            let value = operand_value(ctx, mode, operand);
            ctx.set_y(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Lsr => {
            let value = operand_value(ctx, mode, operand);
            let result = shift_right(ctx, value);
            store_result(ctx, mode, operand, result);
        }
        Mnemonic::Nop => {}
        Mnemonic::Ora => {
            let value = ctx.a() | operand_value(ctx, mode, operand);
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Pha => ctx.push(ctx.a()),
        Mnemonic::Php => {
            let byte = ctx.status().to_stack_byte(true);
            ctx.push(byte);
        }
        Mnemonic::Pla => {
            let value = ctx.pop();
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Plp => {
            let byte = ctx.pop();
            ctx.set_status(Status::from_stack_byte(byte));
        }
        Mnemonic::Rol => {
            let value = operand_value(ctx, mode, operand);
            let result = rotate_left(ctx, value);
            store_result(ctx, mode, operand, result);
        }
        Mnemonic::Ror => {
            let value = operand_value(ctx, mode, operand);
            let result = rotate_right(ctx, value);
            store_result(ctx, mode, operand, result);
        }
        Mnemonic::Rti => {
            let byte = ctx.pop();
            ctx.set_status(Status::from_stack_byte(byte));
            let pc = pop_u16(ctx);
            ctx.set_pc(pc);
        }
        Mnemonic::Rts => {
            let pc = pop_u16(ctx);
            ctx.set_pc(pc.wrapping_add(1));
        }
        Mnemonic::Sec => {
            let mut status = ctx.status();
            status.insert(Status::C);
            ctx.set_status(status);
        }
        Mnemonic::Sed => {
            let mut status = ctx.status();
            status.insert(Status::D);
            ctx.set_status(status);
        }
        Mnemonic::Sei => {
            let mut status = ctx.status();
            status.insert(Status::I);
            ctx.set_status(status);
        }
        Mnemonic::Sta => store_result(ctx, mode, operand, ctx.a()),
        Mnemonic::Stx => store_result(ctx, mode, operand, ctx.x()),
        Mnemonic::Sty => store_result(ctx, mode, operand, ctx.y()),
        Mnemonic::Tax => {
            let value = ctx.a();
            ctx.set_x(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Tay => {
            let value = ctx.a();
            ctx.set_y(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Tsx => {
            let value = ctx.sp();
            ctx.set_x(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Txa => {
            let value = ctx.x();
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
        Mnemonic::Txs => ctx.set_sp(ctx.x()),
        Mnemonic::Tya => {
            let value = ctx.y();
            ctx.set_a(value);
            let mut status = ctx.status();
            status.set_zn(value);
            ctx.set_status(status);
        }
    }

    Ok(extra_cycles)
}
