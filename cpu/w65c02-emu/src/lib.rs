//! A 65C02-derived CPU core, modeling the "Mikey CPU" at the center of the Atari Lynx.
//!
//! Unlike a cycle-stepped NMOS 6502 core, this executes each instruction to completion and
//! returns the cycle count it consumed; the caller is responsible for ticking the rest of the
//! system (timers, DMA, IRQ aggregation) that many times afterward. See [`W65C02::step`].

pub mod bus;
mod instructions;

use crate::bus::BusInterface;
use bincode::{Decode, Encode};
use jgenesis_common::num::GetBit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum StatusReadContext {
    /// PS as pushed onto the stack by a hardware IRQ or NMI: Break is forced clear.
    HardwareInterruptHandler,
    /// PS as pushed onto the stack by a BRK instruction: Break is forced set.
    Brk,
    /// PS as pushed by PHP: Break is forced set.
    PushStack,
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub struct StatusFlags {
    negative: bool,
    overflow: bool,
    decimal: bool,
    interrupt_disable: bool,
    zero: bool,
    carry: bool,
}

impl StatusFlags {
    #[must_use]
    pub fn new() -> Self {
        // I flag defaults to 1 out of reset, others default to 0
        Self {
            negative: false,
            overflow: false,
            decimal: false,
            interrupt_disable: true,
            zero: false,
            carry: false,
        }
    }

    pub fn set_negative(&mut self, negative: bool) -> &mut Self {
        self.negative = negative;
        self
    }

    pub fn set_overflow(&mut self, overflow: bool) -> &mut Self {
        self.overflow = overflow;
        self
    }

    pub fn set_decimal(&mut self, decimal: bool) -> &mut Self {
        self.decimal = decimal;
        self
    }

    pub fn set_interrupt_disable(&mut self, interrupt_disable: bool) -> &mut Self {
        self.interrupt_disable = interrupt_disable;
        self
    }

    pub fn set_zero(&mut self, zero: bool) -> &mut Self {
        self.zero = zero;
        self
    }

    pub fn set_carry(&mut self, carry: bool) -> &mut Self {
        self.carry = carry;
        self
    }

    #[must_use]
    pub fn negative(&self) -> bool {
        self.negative
    }

    #[must_use]
    pub fn overflow(&self) -> bool {
        self.overflow
    }

    #[must_use]
    pub fn decimal(&self) -> bool {
        self.decimal
    }

    #[must_use]
    pub fn interrupt_disable(&self) -> bool {
        self.interrupt_disable
    }

    #[must_use]
    pub fn zero(&self) -> bool {
        self.zero
    }

    #[must_use]
    pub fn carry(&self) -> bool {
        self.carry
    }

    /// Sets N and Z from `value`, leaving every other flag untouched. Used by every load,
    /// transfer, and most ALU instructions.
    pub fn set_zero_negative_from(&mut self, value: u8) -> &mut Self {
        self.set_zero(value == 0).set_negative(value.bit(7))
    }

    /// Packs the six flags plus the always-1 Reserved bit and a context-dependent Break bit into
    /// a single byte, matching what PHP/BRK/IRQ push onto the stack.
    #[must_use]
    pub fn to_byte(self, read_ctx: StatusReadContext) -> u8 {
        let b_flag = match read_ctx {
            StatusReadContext::Brk | StatusReadContext::PushStack => 0x10,
            StatusReadContext::HardwareInterruptHandler => 0x00,
        };

        // Bit 5 is unused, always reads and pushes as 1
        (u8::from(self.negative) << 7)
            | (u8::from(self.overflow) << 6)
            | 0x20
            | b_flag
            | (u8::from(self.decimal) << 3)
            | (u8::from(self.interrupt_disable) << 2)
            | (u8::from(self.zero) << 1)
            | u8::from(self.carry)
    }

    /// Unpacks a status byte as pulled by PLP/RTI. The Break bit is discarded (it is not a real
    /// flip-flop in the status register); the Reserved bit always reads back as 1 regardless of
    /// what was pushed.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            negative: byte.bit(7),
            overflow: byte.bit(6),
            decimal: byte.bit(3),
            interrupt_disable: byte.bit(2),
            zero: byte.bit(1),
            carry: byte.bit(0),
        }
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Encode, Decode)]
pub struct CpuRegisters {
    pub accumulator: u8,
    pub x: u8,
    pub y: u8,
    pub status: StatusFlags,
    pub pc: u16,
    pub sp: u8,
}

impl CpuRegisters {
    fn new(reset_vector: u16) -> Self {
        Self { accumulator: 0, x: 0, y: 0, status: StatusFlags::new(), pc: reset_vector, sp: 0xFD }
    }
}

/// The CPU's overall run state. WAI parks the core in `WaitingForIrq` until the level-sensitive
/// IRQ line becomes asserted; STP parks it in `Stopped` until a hardware reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum RunState {
    Running,
    WaitingForIrq,
    Stopped,
}

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

#[derive(Debug, Clone, Encode, Decode)]
pub struct W65C02 {
    registers: CpuRegisters,
    run_state: RunState,
    cycles: u64,
}

impl W65C02 {
    /// Create a new CPU with PC pointing at the RESET vector read from $FFFC/$FFFD.
    pub fn new<B: BusInterface>(bus: &mut B) -> Self {
        let reset_vector = read_vector(bus, RESET_VECTOR);
        Self { registers: CpuRegisters::new(reset_vector), run_state: RunState::Running, cycles: 0 }
    }

    /// Reset the CPU: abandon any in-flight state, reload PC from the RESET vector, push the
    /// interrupt-disable flag, and leave Stopped/WaitingForIrq states.
    pub fn reset<B: BusInterface>(&mut self, bus: &mut B) {
        self.registers.pc = read_vector(bus, RESET_VECTOR);
        self.registers.sp = self.registers.sp.wrapping_sub(3);
        self.registers.status.interrupt_disable = true;
        self.run_state = RunState::Running;
    }

    /// Execute one instruction (or service a pending interrupt, or idle one cycle while
    /// Stopped/WaitingForIrq) and return the number of CPU cycles it consumed. The caller ticks
    /// the rest of the system that many times afterward.
    pub fn step<B: BusInterface>(&mut self, bus: &mut B) -> u32 {
        let cycles = self.step_inner(bus);
        self.cycles = self.cycles.wrapping_add(u64::from(cycles));
        cycles
    }

    fn step_inner<B: BusInterface>(&mut self, bus: &mut B) -> u32 {
        match self.run_state {
            RunState::Stopped => 1,
            RunState::WaitingForIrq => {
                // WAI wakes on any asserted interrupt line, but only actually vectors into the
                // handler if that interrupt is unmasked; NMI is never maskable, IRQ is gated by
                // the I flag the same way the Running-state check below gates it.
                if bus.nmi() {
                    self.run_state = RunState::Running;
                    self.service_interrupt(bus, true)
                } else if bus.irq() {
                    self.run_state = RunState::Running;
                    if self.registers.status.interrupt_disable {
                        1
                    } else {
                        self.service_interrupt(bus, false)
                    }
                } else {
                    1
                }
            }
            RunState::Running => {
                if bus.nmi() {
                    return self.service_interrupt(bus, true);
                }
                if bus.irq() && !self.registers.status.interrupt_disable {
                    return self.service_interrupt(bus, false);
                }

                instructions::execute(self, bus)
            }
        }
    }

    fn service_interrupt<B: BusInterface>(&mut self, bus: &mut B, is_nmi: bool) -> u32 {
        // Dummy opcode fetch at the current PC, as real hardware does; PC is not advanced.
        let _ = bus.read(self.registers.pc);

        self.push(bus, (self.registers.pc >> 8) as u8);
        self.push(bus, self.registers.pc as u8);
        self.push(bus, self.registers.status.to_byte(StatusReadContext::HardwareInterruptHandler));

        self.registers.status.interrupt_disable = true;
        self.registers.status.decimal = false;

        let vector = if is_nmi { NMI_VECTOR } else { IRQ_VECTOR };
        self.registers.pc = read_vector(bus, vector);

        7
    }

    fn push<B: BusInterface>(&mut self, bus: &mut B, value: u8) {
        bus.write(0x0100 | u16::from(self.registers.sp), value);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
    }

    fn pull<B: BusInterface>(&mut self, bus: &mut B) -> u8 {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        bus.read(0x0100 | u16::from(self.registers.sp))
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.registers.pc
    }

    #[must_use]
    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn set_registers(&mut self, registers: CpuRegisters) {
        self.registers = registers;
    }

    #[must_use]
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn set_run_state(&mut self, run_state: RunState) {
        self.run_state = run_state;
    }

    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

fn read_vector<B: BusInterface>(bus: &mut B, vector: u16) -> u16 {
    let lsb = bus.read(vector);
    let msb = bus.read(vector + 1);
    u16::from_le_bytes([lsb, msb])
}
