//! The cycle-stepped 6502 core.

use crate::addressing::{self, Operand};
use crate::bus::{BusError, BusHandle, HarnessId};
use crate::error::CpuError;
use crate::instructions::{decode, AddressingMode, Instruction, Mnemonic};
use crate::opcodes::{self, ExecutionContext};
use crate::status::{self, Status};
use crate::trace;

const RESET_VECTOR: u16 = 0xFFFC;
const STACK_PAGE: u16 = 0x0100;

/// The CPU's run state (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Loading the reset vector.
    Reset,
    /// Normal fetch/decode/execute.
    Run,
    /// Halted on an unrecoverable error; only `reset()` resumes.
    Halt,
}

/// The 6502 core: register file, micro-state, and the bus harnesses that
/// drive the address/data/write-signal buses.
pub struct Cpu {
    a: u8,
    x: u8,
    y: u8,
    sp: u8,
    pc: u16,
    status: Status,

    state: RunState,
    sub_cycle: u8,
    cycles_needed: u8,
    operand_buffer: [u8; 5],
    current_instruction: Option<Instruction>,
    /// The PC at which the in-flight instruction's opcode byte was fetched,
    /// kept separately from `pc` (which advances past the operand bytes
    /// during fetch) so the trace line can report the instruction's own
    /// address rather than wherever `pc` has moved on to by `finalize`.
    instruction_pc: u16,
    /// Whether `finalize` has already run for the in-flight instruction —
    /// it fires exactly once, as soon as the last operand byte is read,
    /// with any remaining cycles up to `cycles_needed` spent idle.
    executed: bool,
    cycle_count: u64,
    last_error: Option<CpuError>,

    address_bus: BusHandle,
    data_bus: BusHandle,
    write_bus: BusHandle,
    harness_id: HarnessId,
}

impl Cpu {
    /// Attaches a new CPU (as a pure driver, no listener callback) to the
    /// three given buses under `harness_id`, and leaves it in `RunState::Reset`
    /// with the micro-state cleared — equivalent to calling [`Cpu::reset`]
    /// immediately after construction.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyAttached`] if `harness_id` is already
    /// attached to any of the three buses.
    pub fn new(
        address_bus: BusHandle,
        data_bus: BusHandle,
        write_bus: BusHandle,
        harness_id: HarnessId,
    ) -> Result<Self, BusError> {
        address_bus.attach(harness_id, "cpu")?;
        data_bus.attach(harness_id, "cpu")?;
        write_bus.attach(harness_id, "cpu")?;
        let mut cpu = Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0,
            pc: 0,
            status: Status::empty(),
            state: RunState::Reset,
            sub_cycle: 0,
            cycles_needed: 0,
            operand_buffer: [0; 5],
            current_instruction: None,
            instruction_pc: 0,
            executed: false,
            cycle_count: 0,
            last_error: None,
            address_bus,
            data_bus,
            write_bus,
            harness_id,
        };
        cpu.reset();
        Ok(cpu)
    }

    /// Transitions to `RESET`, zeroing registers except `SP = $FF` and
    /// `P.I = 1`, and clearing all micro-state. The reset vector is loaded
    /// on the first two calls to [`Cpu::cycle`] that follow.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFF;
        self.pc = 0;
        self.status = status::POWER_ON;
        self.state = RunState::Reset;
        self.sub_cycle = 0;
        self.cycles_needed = 0;
        self.operand_buffer = [0; 5];
        self.current_instruction = None;
        self.instruction_pc = 0;
        self.executed = false;
        self.cycle_count = 0;
        self.last_error = None;
        log::debug!("cpu: reset");
    }

    /// Advances one emulated clock cycle.
    pub fn cycle(&mut self) {
        self.cycle_count += 1;
        match self.state {
            RunState::Reset => self.cycle_reset(),
            RunState::Run => self.cycle_run(),
            RunState::Halt => {}
        }
    }

    fn cycle_reset(&mut self) {
        // Two cycles: low byte of the reset vector, then high. The vector is
        // always read from $FFFC/$FFFD regardless of the CPU's current PC,
        // per spec.md §9's resolution of the two inconsistent original
        // RESET sequences in favor of standard 6502 behavior.
        match self.sub_cycle {
            0 => {
                self.operand_buffer[0] = self.read(RESET_VECTOR);
                self.sub_cycle = 1;
            }
            _ => {
                self.operand_buffer[1] = self.read(RESET_VECTOR + 1);
                self.pc = u16::from_le_bytes([self.operand_buffer[0], self.operand_buffer[1]]);
                self.sub_cycle = 0;
                self.state = RunState::Run;
                log::debug!("cpu: reset vector loaded, PC={:#06x}", self.pc);
            }
        }
    }

    /// Advances one cycle of the in-flight instruction.
    ///
    /// Each call does at most one of: read the next operand byte (while
    /// `sub_cycle < operand_length`), or sit idle. `finalize` runs exactly
    /// once, on the earliest cycle where every operand byte will have been
    /// read by the end of this call — immediately for modes whose base
    /// cycle count equals their operand length (immediate, relative, `JMP
    /// absolute`), after one idle cycle for modes that need one real memory
    /// access beyond the operand fetch, and so on. Any cycles still
    /// remaining up to `cycles_needed` (which `finalize` may itself extend,
    /// for a taken/page-crossing branch) are spent idle: the externally
    /// visible register/memory state and total cycle count match spec.md
    /// §4.3.1 regardless of which cycle the side effect actually lands on,
    /// per the reorganization spec.md §9 explicitly allows.
    fn cycle_run(&mut self) {
        let Some(instruction) = self.current_instruction else {
            self.fetch();
            return;
        };
        let operand_length = instruction.mode.operand_length();

        if self.sub_cycle < operand_length {
            let byte = self.read(self.pc);
            self.operand_buffer[self.sub_cycle as usize] = byte;
            self.pc = self.pc.wrapping_add(1);
        }

        if self.sub_cycle + 1 >= operand_length && !self.executed {
            self.finalize(&instruction);
            self.executed = true;
        }

        self.sub_cycle += 1;

        if self.sub_cycle >= self.cycles_needed {
            self.current_instruction = None;
            self.sub_cycle = 0;
            self.executed = false;
        }
    }

    fn fetch(&mut self) {
        let pc_at_fetch = self.pc;
        let opcode = self.read(self.pc);
        let Some(instruction) = decode(opcode) else {
            log::error!("cpu: undefined opcode {opcode:#04x} at PC={pc_at_fetch:#06x}");
            self.last_error = Some(CpuError::UndefinedOpcode {
                opcode,
                pc: pc_at_fetch,
            });
            self.state = RunState::Halt;
            return;
        };
        self.operand_buffer[0] = opcode;
        self.instruction_pc = pc_at_fetch;
        self.pc = self.pc.wrapping_add(1);
        self.cycles_needed = instruction.cycles;
        self.current_instruction = Some(*instruction);
        self.executed = false;
        self.sub_cycle = 1;
    }

    fn finalize(&mut self, instruction: &Instruction) {
        let mode = instruction.mode;
        let b1 = self.operand_buffer[1];
        let b2 = self.operand_buffer[2];

        let branch_target = matches!(mode, AddressingMode::Relative)
            .then(|| self.pc.wrapping_add(i16::from(b1 as i8) as u16));

        let (x, y) = (self.x, self.y);
        let operand = addressing::resolve(mode, b1, b2, x, y, |addr| self.read(addr));

        let mode_crosses_page = instruction.page_cross_adds_cycle
            && matches!(operand, Operand::Address { effective, base } if addressing::crosses_page(base, effective));

        trace::emit(
            self.instruction_pc,
            instruction,
            &self.operand_buffer,
            self.a,
            self.x,
            self.y,
            self.sp,
            self.status,
            self.cycle_count,
        );

        match opcodes::execute(
            self,
            instruction.mnemonic,
            mode,
            operand,
            mode_crosses_page,
            branch_target,
        ) {
            Ok(extra_cycles) => self.cycles_needed += extra_cycles,
            Err(err) => {
                log::error!("cpu: {err}");
                self.last_error = Some(err);
                self.state = RunState::Halt;
            }
        }
    }

    /// Puts `addr` on the address bus and returns the byte now on the data
    /// bus.
    fn bus_read(&mut self, addr: u16) -> u8 {
        self.address_bus.put(u32::from(addr), self.harness_id);
        self.data_bus.get() as u8
    }

    /// Puts `addr` on the address bus, asserts the write signal, puts
    /// `byte` on the data bus, then deasserts the write signal.
    fn bus_write(&mut self, addr: u16, byte: u8) {
        self.address_bus.put(u32::from(addr), self.harness_id);
        self.write_bus.put(1, self.harness_id);
        self.data_bus.put(u32::from(byte), self.harness_id);
        self.write_bus.put(0, self.harness_id);
    }

    /// Re-attaches this CPU's harness to the three buses it already holds
    /// handles for. Used by a driver (the NES board) after calling
    /// `detach_all` on all three buses to load a new cartridge, since
    /// `detach_all` clears a bus's harness list without invalidating the
    /// `BusHandle` itself.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadyAttached`] if `harness_id` is still
    /// attached to any of the three buses (i.e. `detach_all` was not called
    /// first).
    pub fn attach(&self) -> Result<(), BusError> {
        self.address_bus.attach(self.harness_id, "cpu")?;
        self.data_bus.attach(self.harness_id, "cpu")?;
        self.write_bus.attach(self.harness_id, "cpu")?;
        Ok(())
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// The error that drove the CPU into `Halt`, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<CpuError> {
        self.last_error
    }

    /// Cumulative cycle count since the last `reset()`.
    #[must_use]
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Accumulator.
    #[must_use]
    pub fn a(&self) -> u8 {
        self.a
    }
    /// X index register.
    #[must_use]
    pub fn x(&self) -> u8 {
        self.x
    }
    /// Y index register.
    #[must_use]
    pub fn y(&self) -> u8 {
        self.y
    }
    /// Stack pointer.
    #[must_use]
    pub fn sp(&self) -> u8 {
        self.sp
    }
    /// Program counter.
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }
    /// Processor status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }
}

impl ExecutionContext for Cpu {
    fn read(&mut self, addr: u16) -> u8 {
        self.bus_read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.bus_write(addr, value);
    }

    fn push(&mut self, value: u8) {
        self.bus_write(STACK_PAGE + u16::from(self.sp), value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.bus_read(STACK_PAGE + u16::from(self.sp))
    }

    fn a(&self) -> u8 {
        self.a
    }
    fn set_a(&mut self, value: u8) {
        self.a = value;
    }
    fn x(&self) -> u8 {
        self.x
    }
    fn set_x(&mut self, value: u8) {
        self.x = value;
    }
    fn y(&self) -> u8 {
        self.y
    }
    fn set_y(&mut self, value: u8) {
        self.y = value;
    }
    fn sp(&self) -> u8 {
        self.sp
    }
    fn set_sp(&mut self, value: u8) {
        self.sp = value;
    }
    fn pc(&self) -> u16 {
        self.pc
    }
    fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }
    fn status(&self) -> Status {
        self.status
    }
    fn set_status(&mut self, status: Status) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusListener;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// A flat 64 KiB RAM region wired to all three buses, standing in for
    /// the NES board's memory regions for CPU-only unit tests.
    struct FlatRam {
        bytes: Rc<RefCell<[u8; 0x10000]>>,
        address: BusHandle,
        data: BusHandle,
        write: BusHandle,
        id: HarnessId,
    }

    impl BusListener for FlatRam {
        fn on_bus_event(&mut self, _owner: HarnessId, _level: u32) {
            let addr = self.address.get() as u16;
            let w = self.write.get();
            if w == 0 {
                let value = self.bytes.borrow()[addr as usize];
                self.data.put(u32::from(value), self.id);
            } else {
                let value = self.data.get() as u8;
                self.bytes.borrow_mut()[addr as usize] = value;
            }
        }
    }

    fn harness(bytes: &[u8], load_at: u16) -> (Cpu, Rc<RefCell<[u8; 0x10000]>>) {
        let address = BusHandle::new("address");
        let data = BusHandle::new("data");
        let write = BusHandle::new("write");
        let backing = Rc::new(RefCell::new([0u8; 0x10000]));
        backing.borrow_mut()[load_at as usize..load_at as usize + bytes.len()]
            .copy_from_slice(bytes);
        backing.borrow_mut()[0xFFFC] = (load_at & 0xFF) as u8;
        backing.borrow_mut()[0xFFFD] = (load_at >> 8) as u8;

        let ram = Rc::new(RefCell::new(FlatRam {
            bytes: backing.clone(),
            address: address.clone(),
            data: data.clone(),
            write: write.clone(),
            id: 1,
        }));
        address
            .attach_listener(1, "ram", ram.clone(), None)
            .unwrap();
        data.attach_listener(1, "ram", ram.clone(), None).unwrap();
        write.attach_listener(1, "ram", ram, None).unwrap();

        let cpu = Cpu::new(address, data, write, 0).unwrap();
        (cpu, backing)
    }

    fn run_reset(cpu: &mut Cpu) {
        cpu.cycle();
        cpu.cycle();
        assert_eq!(cpu.state(), RunState::Run);
    }

    #[test]
    fn scenario_lda_immediate_sta_zero_page() {
        let (mut cpu, ram) = harness(&[0xA9, 0x42, 0x85, 0x10, 0x00], 0x8000);
        run_reset(&mut cpu);
        for _ in 0..(2 + 3) {
            cpu.cycle();
        }
        assert_eq!(cpu.a(), 0x42);
        assert_eq!(ram.borrow()[0x0010], 0x42);
        assert_eq!(cpu.pc(), 0x8005);
        assert!(!cpu.status().contains(Status::Z));
        assert!(!cpu.status().contains(Status::N));
    }

    #[test]
    fn scenario_branch_taken_same_page() {
        let (mut cpu, _ram) = harness(&[0xA9, 0x00, 0xF0, 0x02, 0xEA, 0xEA, 0x00], 0x8000);
        run_reset(&mut cpu);
        for _ in 0..2 {
            cpu.cycle();
        }
        for _ in 0..3 {
            cpu.cycle();
        }
        assert_eq!(cpu.pc(), 0x8006);
    }

    #[test]
    fn scenario_branch_taken_page_crossing() {
        let (mut cpu, _ram) = harness(&[0xF0, 0x02], 0x80FC);
        run_reset(&mut cpu);
        // Force Z directly rather than threading a prior LDA through first.
        cpu.status = cpu.status | Status::Z;
        for _ in 0..4 {
            cpu.cycle();
        }
        assert_eq!(cpu.pc(), 0x8100);
    }

    #[test]
    fn scenario_jsr_rts_round_trip() {
        let (mut cpu, _ram) = harness(
            &[0x20, 0x09, 0x80, 0xA9, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x60],
            0x8000,
        );
        run_reset(&mut cpu);
        for _ in 0..6 {
            cpu.cycle();
        }
        assert_eq!(cpu.pc(), 0x8009);
        for _ in 0..6 {
            cpu.cycle();
        }
        assert_eq!(cpu.pc(), 0x8003);
        for _ in 0..2 {
            cpu.cycle();
        }
        assert_eq!(cpu.a(), 0xFF);
    }

    #[test]
    fn scenario_adc_overflow() {
        let (mut cpu, _ram) = harness(&[0x69, 0x01], 0x8000);
        run_reset(&mut cpu);
        cpu.a = 0x7F;
        for _ in 0..2 {
            cpu.cycle();
        }
        assert_eq!(cpu.a(), 0x80);
        assert!(!cpu.status().contains(Status::Z));
        assert!(cpu.status().contains(Status::N));
        assert!(cpu.status().contains(Status::V));
        assert!(!cpu.status().contains(Status::C));
    }

    #[test]
    fn undefined_opcode_halts_the_cpu() {
        let (mut cpu, _ram) = harness(&[0x02], 0x8000);
        run_reset(&mut cpu);
        cpu.cycle();
        assert_eq!(cpu.state(), RunState::Halt);
        assert!(matches!(
            cpu.last_error(),
            Some(CpuError::UndefinedOpcode { opcode: 0x02, .. })
        ));
    }

    #[test]
    fn reset_always_reads_the_fixed_vector_regardless_of_prior_pc() {
        let (mut cpu, _ram) = harness(&[0xEA], 0x8000);
        run_reset(&mut cpu);
        cpu.pc = 0x1234; // simulate PC having drifted elsewhere
        cpu.reset();
        run_reset(&mut cpu);
        assert_eq!(cpu.pc(), 0x8000);
    }
}
