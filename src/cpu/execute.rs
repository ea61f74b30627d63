//! The CPU: microprogram engine and signal dispatch.
//!
//! `step` executes exactly one control signal per call. A microprogram runs
//! to completion one signal at a time; when it finishes, the next step
//! re-enters the reserved FETCH program. Every failure mode converges on the
//! halt model: the machine stops with a [`HaltReason`] and `step` becomes a
//! no-op until the next program load. Errors never cross the `step`
//! boundary.

use crate::cpu::alu::{Alu, AluError, AluOp, Flags};
use crate::cpu::bus::Bus;
use crate::cpu::control::{ControlStore, Signal, FETCH};
use crate::cpu::interrupt::InterruptManager;
use crate::cpu::latch::{AddressRegister, BufferRegister, InstructionRegister, ProgramCounter};
use crate::cpu::memory::{AddressingMode, Direct, Memory, MemoryError};
use crate::cpu::registers::RegisterFile;
use crate::io::{IoDevice, DEVICE_INPUT, DEVICE_OUTPUT};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tracing::{debug, trace};

/// Why the machine stopped. Set exactly once per halt transition and
/// cleared only by a program reload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HaltReason {
    /// Normal completion through the HLT instruction.
    #[error("execution finished: HLT instruction")]
    Completed,

    /// The fetch path ran past the last instruction.
    #[error("end of program reached at address {0}")]
    EndOfProgram(i32),

    /// The decoded mnemonic has no microprogram.
    #[error("unrecognized instruction: {0}")]
    UnknownInstruction(String),

    /// Wrong operand count for the instruction's decode signal.
    #[error("malformed instruction `{instruction}`: expected {expected} operands")]
    MalformedInstruction { instruction: String, expected: usize },

    /// A signal consumed an operand that was never decoded.
    #[error("control signal executed without a decoded operand")]
    UndecodedOperand,

    /// The decode signal found an empty instruction register.
    #[error("instruction register empty at decode")]
    EmptyInstructionRegister,

    /// An immediate operand failed to parse as a signed 32-bit value.
    #[error("invalid immediate `{0}`")]
    BadImmediate(String),

    /// An address operand failed to parse.
    #[error("invalid address `{0}`")]
    BadAddress(String),

    /// A data-memory access fell outside the configured capacity.
    #[error("memory access out of range: address {addr} (capacity {capacity})")]
    MemoryOutOfRange { addr: i32, capacity: usize },

    /// The ALU was asked to divide by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A device slot was missing or the device failed.
    #[error("I/O device {index} unavailable: {message}")]
    Device { index: usize, message: String },
}

impl From<MemoryError> for HaltReason {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::OutOfRange { addr, capacity } => {
                HaltReason::MemoryOutOfRange { addr, capacity }
            }
        }
    }
}

impl From<AluError> for HaltReason {
    fn from(e: AluError) -> Self {
        match e {
            AluError::DivisionByZero { .. } => HaltReason::DivisionByZero,
        }
    }
}

/// Outcome of one `step` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// One signal executed; the machine is still live.
    Running(Signal),
    /// The machine is halted (now or from a previous step).
    Halted(HaltReason),
}

impl StepState {
    pub fn is_halted(&self) -> bool {
        matches!(self, StepState::Halted(_))
    }
}

/// Scratch operands produced by the decode signals and consumed by the
/// execute signals of the same instruction. Cleared by `Decode`, so stale
/// values can never leak into a later instruction.
#[derive(Debug, Clone, Default)]
struct DecodeContext {
    operand1: Option<String>,
    operand2: Option<String>,
    destination: Option<String>,
}

impl DecodeContext {
    fn clear(&mut self) {
        self.operand1 = None;
        self.operand2 = None;
        self.destination = None;
    }
}

/// How the cursor moves after a signal.
enum Advance {
    /// Move to the next signal of the active microprogram.
    Next,
    /// The signal repositioned the engine itself (decode or jump).
    Resequenced,
}

/// The active microprogram plus the cursor into it.
#[derive(Debug, Clone)]
struct ActiveMicroprogram {
    mnemonic: String,
    signals: Vec<Signal>,
    cursor: usize,
}

/// The complete observable state surface, for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSnapshot {
    pub pc: i32,
    pub ir: Option<String>,
    pub mar: i32,
    pub mbr: i32,
    pub flags: Flags,
    pub registers: BTreeMap<String, i32>,
    pub memory: Vec<(usize, i32)>,
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub cycles: u64,
}

/// The microprogrammed CPU.
pub struct Cpu {
    alu: Alu,
    control: ControlStore,
    pc: ProgramCounter,
    mar: AddressRegister,
    mbr: BufferRegister,
    ir: InstructionRegister,
    regs: RegisterFile,
    memory: Memory,
    bus: Bus,
    interrupts: InterruptManager,
    addressing: Box<dyn AddressingMode>,
    devices: Vec<Box<dyn IoDevice>>,
    instructions: Vec<String>,
    ctx: DecodeContext,
    current: Option<ActiveMicroprogram>,
    halt: Option<HaltReason>,
    cycles: u64,
}

impl Cpu {
    /// Create a CPU with the given data memory and device list. Devices are
    /// addressed positionally: slot 0 input, slot 1 output.
    pub fn new(memory: Memory, devices: Vec<Box<dyn IoDevice>>) -> Self {
        Self {
            alu: Alu::new(),
            control: ControlStore::new(),
            pc: ProgramCounter::default(),
            mar: AddressRegister::default(),
            mbr: BufferRegister::default(),
            ir: InstructionRegister::default(),
            regs: RegisterFile::new(),
            memory,
            bus: Bus,
            interrupts: InterruptManager::new(),
            addressing: Box::new(Direct),
            devices,
            instructions: Vec::new(),
            ctx: DecodeContext::default(),
            current: None,
            halt: None,
            cycles: 0,
        }
    }

    /// Replace the address-resolution strategy (default: direct).
    pub fn with_addressing(mut self, addressing: Box<dyn AddressingMode>) -> Self {
        self.addressing = addressing;
        self
    }

    /// Load a new program and cold-restart the machine: PC, IR, MAR, MBR,
    /// register file, interrupt queue, decode context, active microprogram,
    /// flags, halt state and cycle count are all reset.
    ///
    /// Data memory is deliberately preserved so a driver can preload it
    /// before (or between) runs.
    pub fn load_program(&mut self, instructions: Vec<String>) {
        self.instructions = instructions;
        self.pc.reset();
        self.ir.clear();
        self.mar.reset();
        self.mbr.clear();
        self.regs.clear();
        self.interrupts.clear();
        self.alu.reset();
        self.ctx.clear();
        self.current = None;
        self.halt = None;
        self.cycles = 0;
        debug!(target: "cpu", count = self.instructions.len(), "program loaded, CPU reset");
    }

    /// Execute exactly one control signal.
    ///
    /// A no-op once halted. Conditional jumps are the sole exception to the
    /// one-signal rule: when taken they re-issue the address-decode and jump
    /// signals inline, still within a single `step` call.
    pub fn step(&mut self) -> StepState {
        if let Some(reason) = &self.halt {
            return StepState::Halted(reason.clone());
        }

        if self.current.is_none() {
            self.activate(FETCH);
        }

        let signal = {
            // Just activated above if empty, so an active program exists
            // and the cursor invariant keeps it in range.
            let active = self.current.as_ref().expect("active microprogram");
            active.signals[active.cursor]
        };

        trace!(target: "cpu", pc = self.pc.get(), ir = ?self.ir.get(), %signal, "executing");

        let advance = match self.execute_signal(signal) {
            Ok(a) => a,
            Err(reason) => {
                self.cycles += 1;
                self.halt_with(reason.clone());
                return StepState::Halted(reason);
            }
        };
        self.cycles += 1;

        if let Advance::Next = advance {
            if let Some(active) = self.current.as_mut() {
                active.cursor += 1;
                if active.cursor >= active.signals.len() {
                    self.current = None;
                }
            }
        }

        StepState::Running(signal)
    }

    fn halt_with(&mut self, reason: HaltReason) {
        debug!(target: "cpu", pc = self.pc.get(), %reason, "halted");
        self.halt = Some(reason);
    }

    /// Activate a microprogram by mnemonic, cursor at 0.
    fn activate(&mut self, mnemonic: &str) {
        let signals = self
            .control
            .get(mnemonic)
            .expect("activate called with a mnemonic missing from the control store")
            .to_vec();
        self.current = Some(ActiveMicroprogram {
            mnemonic: mnemonic.to_string(),
            signals,
            cursor: 0,
        });
    }

    /// Interpret one signal and perform the corresponding hardware action.
    fn execute_signal(&mut self, signal: Signal) -> Result<Advance, HaltReason> {
        match signal {
            // ==================== Fetch path ====================
            Signal::PcToMar => {
                self.bus.to_mar(self.pc.get(), &mut self.mar);
                Ok(Advance::Next)
            }

            Signal::MemReadPcInc => {
                let addr = self.mar.get();
                let text = if addr < 0 {
                    None
                } else {
                    self.instructions.get(addr as usize)
                };
                match text {
                    Some(t) if !t.trim().is_empty() => {
                        let t = t.clone();
                        // The MBR would hold the binary encoding; a hash of
                        // the text stands in as a diagnostic value.
                        self.bus.to_mbr(text_hash(&t), &mut self.mbr);
                        self.ir.load(t);
                        self.pc.increment();
                        Ok(Advance::Next)
                    }
                    _ => Err(HaltReason::EndOfProgram(addr)),
                }
            }

            // Conceptual transfer; the IR was latched during Mem_read.
            Signal::MbrToIr => Ok(Advance::Next),

            Signal::Decode => self.decode(),

            // ==================== Operand decode ====================
            Signal::DecodeRegRegDest => {
                let tokens = self.ir.tokens();
                if tokens.len() < 4 {
                    return Err(self.malformed(3));
                }
                self.ctx.operand1 = Some(tokens[1].to_string());
                self.ctx.operand2 = Some(tokens[2].to_string());
                self.ctx.destination = Some(tokens[3].to_string());
                Ok(Advance::Next)
            }

            Signal::DecodeRegReg => {
                let tokens = self.ir.tokens();
                if tokens.len() < 3 {
                    return Err(self.malformed(2));
                }
                self.ctx.operand1 = Some(tokens[1].to_string());
                self.ctx.operand2 = Some(tokens[2].to_string());
                Ok(Advance::Next)
            }

            Signal::DecodeDestImm => {
                let tokens = self.ir.tokens();
                if tokens.len() < 3 {
                    return Err(self.malformed(2));
                }
                self.ctx.destination = Some(tokens[1].to_string());
                self.ctx.operand1 = Some(tokens[2].to_string());
                Ok(Advance::Next)
            }

            Signal::DecodeAddr => {
                let tokens = self.ir.tokens();
                if tokens.len() < 2 {
                    return Err(self.malformed(1));
                }
                self.ctx.operand1 = Some(tokens[1].to_string());
                Ok(Advance::Next)
            }

            Signal::DecodeStore => {
                let tokens = self.ir.tokens();
                if tokens.len() < 3 {
                    return Err(self.malformed(2));
                }
                self.ctx.operand2 = Some(tokens[1].to_string());
                self.ctx.operand1 = Some(tokens[2].to_string());
                Ok(Advance::Next)
            }

            // ==================== Execute ====================
            // Conceptual routing; operands are read at the ALU signal.
            Signal::RegsToAlu => Ok(Advance::Next),

            Signal::AluToMbr(op) => {
                let a = self.regs.read(self.operand1()?);
                let b = if op.is_unary() {
                    0
                } else {
                    self.regs.read(self.operand2()?)
                };
                let result = self.alu.operate(op, a, b)?;
                self.bus.to_mbr(result, &mut self.mbr);
                Ok(Advance::Next)
            }

            Signal::MbrToDest => {
                let dest = self
                    .ctx
                    .destination
                    .clone()
                    .ok_or(HaltReason::UndecodedOperand)?;
                let provenance = self.derive_provenance();
                self.bus
                    .mbr_to_register(&self.mbr, &mut self.regs, &dest, &provenance);
                Ok(Advance::Next)
            }

            Signal::ImmediateToMbr => {
                let text = self.operand1()?;
                let value: i32 = text
                    .parse()
                    .map_err(|_| HaltReason::BadImmediate(text.to_string()))?;
                self.bus.to_mbr(value, &mut self.mbr);
                Ok(Advance::Next)
            }

            Signal::Reg1ToMbr => {
                let name = self.operand1()?.to_string();
                self.bus.register_to_mbr(&self.regs, &name, &mut self.mbr);
                Ok(Advance::Next)
            }

            Signal::SrcToMbr => {
                let name = self.operand2()?.to_string();
                self.bus.register_to_mbr(&self.regs, &name, &mut self.mbr);
                Ok(Advance::Next)
            }

            Signal::AddrToMar => {
                let text = self.operand1()?;
                let addr: i32 = text
                    .parse()
                    .map_err(|_| HaltReason::BadAddress(text.to_string()))?;
                self.bus.to_mar(addr, &mut self.mar);
                Ok(Advance::Next)
            }

            Signal::MbrToMemory => {
                self.bus
                    .mbr_to_memory(&self.mbr, &self.mar, &mut self.memory)?;
                Ok(Advance::Next)
            }

            Signal::MemoryToMbr => {
                let addr = self.mar.get();
                let value = self.addressing.resolve(addr, &self.memory, &self.regs)?;
                self.bus.memory_to_mbr(addr, value, &mut self.mbr);
                Ok(Advance::Next)
            }

            Signal::AccToDevice => {
                let value = self.regs.read("ACC");
                let device = self.devices.get_mut(DEVICE_OUTPUT).ok_or_else(|| {
                    HaltReason::Device {
                        index: DEVICE_OUTPUT,
                        message: "no device attached".into(),
                    }
                })?;
                device.write(value).map_err(|e| HaltReason::Device {
                    index: DEVICE_OUTPUT,
                    message: e.to_string(),
                })?;
                let id = device.id().to_string();
                self.bus.register_to_device("ACC", &id, value);
                Ok(Advance::Next)
            }

            Signal::DeviceToAcc => {
                let device = self.devices.get_mut(DEVICE_INPUT).ok_or_else(|| {
                    HaltReason::Device {
                        index: DEVICE_INPUT,
                        message: "no device attached".into(),
                    }
                })?;
                let value = device.read().map_err(|e| HaltReason::Device {
                    index: DEVICE_INPUT,
                    message: e.to_string(),
                })?;
                let id = device.id().to_string();
                self.regs.write("ACC", value, "(device input)");
                self.bus.device_to_register(&id, "ACC", value);
                Ok(Advance::Next)
            }

            Signal::AddressToPc => {
                let text = self.operand1()?;
                let addr: i32 = text
                    .parse()
                    .map_err(|_| HaltReason::BadAddress(text.to_string()))?;
                self.pc.set(addr);
                // Cancel the active microprogram so the next step fetches
                // from the new address.
                self.current = None;
                Ok(Advance::Resequenced)
            }

            Signal::CondJumpIfZero => self.cond_jump(true),
            Signal::CondJumpIfNotZero => self.cond_jump(false),

            Signal::CmpToInterrupt => {
                let a = self.regs.read(self.operand1()?);
                let b = self.regs.read(self.operand2()?);
                let code = a.cmp(&b) as i32;
                self.interrupts.request(code);
                Ok(Advance::Next)
            }

            Signal::Halt => Err(HaltReason::Completed),
        }
    }

    /// Split the IR, look the mnemonic up in the control store and activate
    /// its microprogram. Clears the decode context first so operands from a
    /// previous instruction can never leak forward.
    fn decode(&mut self) -> Result<Advance, HaltReason> {
        self.ctx.clear();
        let mnemonic = match self.ir.get().and_then(|t| t.split_whitespace().next()) {
            Some(m) => m.to_string(),
            None => return Err(HaltReason::EmptyInstructionRegister),
        };
        if !self.control.contains(&mnemonic) {
            return Err(HaltReason::UnknownInstruction(mnemonic));
        }
        self.activate(&mnemonic);
        Ok(Advance::Resequenced)
    }

    /// Consume one pending compare result and jump if it matches.
    ///
    /// The entry is consumed on inspection, taken or not: one CMP feeds
    /// exactly one branch decision. With nothing pending the branch falls
    /// through without consuming anything.
    fn cond_jump(&mut self, want_zero: bool) -> Result<Advance, HaltReason> {
        let Some(code) = self.interrupts.take() else {
            return Ok(Advance::Next);
        };
        debug!(target: "cpu", code, taken = (code == 0) == want_zero, "conditional jump");
        if (code == 0) != want_zero {
            return Ok(Advance::Next);
        }
        // Re-issue the address-decode and jump signals inline.
        self.execute_signal(Signal::DecodeAddr)?;
        self.execute_signal(Signal::AddressToPc)
    }

    fn operand1(&self) -> Result<&str, HaltReason> {
        self.ctx
            .operand1
            .as_deref()
            .ok_or(HaltReason::UndecodedOperand)
    }

    fn operand2(&self) -> Result<&str, HaltReason> {
        self.ctx
            .operand2
            .as_deref()
            .ok_or(HaltReason::UndecodedOperand)
    }

    fn malformed(&self, expected: usize) -> HaltReason {
        HaltReason::MalformedInstruction {
            instruction: self.ir.get().unwrap_or_default().to_string(),
            expected,
        }
    }

    /// Provenance note for a register write, derived from the instruction
    /// that produced the value.
    fn derive_provenance(&self) -> String {
        let mnemonic = self
            .current
            .as_ref()
            .map(|m| m.mnemonic.as_str())
            .unwrap_or_default();
        let op1 = self.ctx.operand1.as_deref().unwrap_or("?");
        let op2 = self.ctx.operand2.as_deref().unwrap_or("?");
        match mnemonic {
            "ADD" | "SUB" | "MUL" | "DIV" | "AND" | "OR" | "XOR" => {
                format!("({mnemonic} {op1}, {op2})")
            }
            "NOT" => format!("(NOT {op1})"),
            "MOV_IMM" => format!("(immediate {op1})"),
            "MOV_REG" => format!("(copy of {op1})"),
            "LOAD" => format!("(loaded from mem[{op1}])"),
            _ => String::new(),
        }
    }

    // ==================== Observation ====================

    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt.as_ref()
    }

    pub fn pc(&self) -> i32 {
        self.pc.get()
    }

    pub fn ir(&self) -> Option<&str> {
        self.ir.get()
    }

    pub fn mar(&self) -> i32 {
        self.mar.get()
    }

    pub fn mbr(&self) -> i32 {
        self.mbr.get()
    }

    pub fn flags(&self) -> Flags {
        self.alu.flags()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable data-memory access, for drivers that preload data.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn interrupts(&self) -> &InterruptManager {
        &self.interrupts
    }

    /// Drain and report pending interrupt codes (diagnostic).
    pub fn drain_interrupts(&mut self) -> Vec<i32> {
        self.interrupts.process()
    }

    /// The loaded instruction text.
    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    /// Active microprogram mnemonic and cursor, if one is mid-flight.
    pub fn micro_position(&self) -> Option<(&str, usize)> {
        self.current
            .as_ref()
            .map(|m| (m.mnemonic.as_str(), m.cursor))
    }

    /// Signals executed since the last program load.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Status of a device slot, if a device is attached there.
    pub fn device_status(&self, index: usize) -> Option<(String, crate::io::DeviceStatus)> {
        self.devices
            .get(index)
            .map(|d| (d.id().to_string(), d.status()))
    }

    /// Snapshot the full observable surface, with a data-memory window.
    pub fn snapshot(&self, mem_start: usize, mem_len: usize) -> CpuSnapshot {
        CpuSnapshot {
            pc: self.pc.get(),
            ir: self.ir.get().map(str::to_string),
            mar: self.mar.get(),
            mbr: self.mbr.get(),
            flags: self.alu.flags(),
            registers: self.regs.snapshot(),
            memory: self.memory.dump(mem_start, mem_len),
            halted: self.halt.is_some(),
            halt_reason: self.halt.as_ref().map(|r| r.to_string()),
            cycles: self.cycles,
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(Memory::default(), Vec::new())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("pc", &self.pc.get())
            .field("ir", &self.ir.get())
            .field("halt", &self.halt)
            .field("cycles", &self.cycles)
            .finish()
    }
}

/// Stand-in for the binary encoding an MBR would hold during fetch.
fn text_hash(text: &str) -> i32 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferDevice, SharedDevice};

    fn cpu_with(program: &[&str]) -> Cpu {
        let mut cpu = Cpu::default();
        cpu.load_program(program.iter().map(|s| s.to_string()).collect());
        cpu
    }

    fn run_to_halt(cpu: &mut Cpu) -> HaltReason {
        for _ in 0..100_000 {
            if let StepState::Halted(reason) = cpu.step() {
                return reason;
            }
        }
        panic!("CPU did not halt");
    }

    #[test]
    fn mov_add_scenario() {
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "MOV_IMM R2 3", "ADD R1 R2 R3", "HLT"]);
        let reason = run_to_halt(&mut cpu);
        assert_eq!(reason, HaltReason::Completed);
        assert_eq!(cpu.registers().read("R3"), 8);
    }

    #[test]
    fn division_by_zero_halts_and_leaves_dest_unmodified() {
        let mut cpu = cpu_with(&["DIV R1 R2 R3"]);
        let reason = run_to_halt(&mut cpu);
        assert_eq!(reason, HaltReason::DivisionByZero);
        assert!(cpu.registers().entry("R3").is_none());
    }

    #[test]
    fn jmp_skips_instruction() {
        let mut cpu = cpu_with(&["JMP 2", "MOV_IMM R1 99", "HLT"]);
        let reason = run_to_halt(&mut cpu);
        assert_eq!(reason, HaltReason::Completed);
        assert_eq!(cpu.registers().read("R1"), 0);
    }

    #[test]
    fn running_off_the_end_halts() {
        let mut cpu = cpu_with(&["MOV_IMM R1 1"]);
        let reason = run_to_halt(&mut cpu);
        assert_eq!(reason, HaltReason::EndOfProgram(1));
        assert_eq!(cpu.registers().read("R1"), 1);
    }

    #[test]
    fn blank_instruction_halts_as_end_of_program() {
        let mut cpu = cpu_with(&["MOV_IMM R1 1", "   ", "HLT"]);
        let reason = run_to_halt(&mut cpu);
        assert_eq!(reason, HaltReason::EndOfProgram(1));
    }

    #[test]
    fn unknown_mnemonic_halts_with_its_name() {
        let mut cpu = cpu_with(&["FROB R1"]);
        let reason = run_to_halt(&mut cpu);
        assert_eq!(reason, HaltReason::UnknownInstruction("FROB".into()));
    }

    #[test]
    fn missing_operands_halt_as_malformed() {
        let mut cpu = cpu_with(&["ADD R1 R2"]);
        match run_to_halt(&mut cpu) {
            HaltReason::MalformedInstruction {
                instruction,
                expected,
            } => {
                assert_eq!(instruction, "ADD R1 R2");
                assert_eq!(expected, 3);
            }
            other => panic!("unexpected halt: {other:?}"),
        }
    }

    #[test]
    fn bad_immediate_halts() {
        let mut cpu = cpu_with(&["MOV_IMM R1 banana"]);
        assert_eq!(
            run_to_halt(&mut cpu),
            HaltReason::BadImmediate("banana".into())
        );
    }

    #[test]
    fn bad_jump_address_halts() {
        let mut cpu = cpu_with(&["JMP nowhere"]);
        assert_eq!(
            run_to_halt(&mut cpu),
            HaltReason::BadAddress("nowhere".into())
        );
    }

    #[test]
    fn halt_is_idempotent() {
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "HLT"]);
        let reason = run_to_halt(&mut cpu);
        let before = cpu.snapshot(0, 8);

        for _ in 0..10 {
            match cpu.step() {
                StepState::Halted(r) => assert_eq!(r, reason),
                StepState::Running(_) => panic!("stepped past halt"),
            }
        }
        assert_eq!(cpu.snapshot(0, 8), before);
    }

    #[test]
    fn reload_resets_exactly() {
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "CMP R1 R1", "HLT"]);
        run_to_halt(&mut cpu);
        assert!(cpu.is_halted());
        assert!(cpu.interrupts().has_pending());

        cpu.load_program(vec!["HLT".into()]);
        assert_eq!(cpu.pc(), 0);
        assert!(!cpu.is_halted());
        assert!(cpu.halt_reason().is_none());
        assert!(cpu.registers().is_empty());
        assert!(!cpu.interrupts().has_pending());
        assert!(cpu.ir().is_none());
        assert_eq!(cpu.cycles(), 0);
        assert!(cpu.micro_position().is_none());
    }

    #[test]
    fn exactly_one_signal_per_step() {
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "ADD R1 R1 R2", "HLT"]);
        let mut prev_cycles = cpu.cycles();
        let mut prev_pos: Option<(String, usize)> = None;

        loop {
            let state = cpu.step();
            assert_eq!(cpu.cycles(), prev_cycles + 1, "one signal per step");
            prev_cycles = cpu.cycles();

            if state.is_halted() {
                break;
            }

            let pos = cpu.micro_position().map(|(m, c)| (m.to_string(), c));
            if let (Some((pm, pcur)), Some((m, cur))) = (&prev_pos, &pos) {
                if pm == m && *cur != 0 {
                    assert_eq!(*cur, pcur + 1, "cursor advances by exactly one");
                }
            }
            prev_pos = pos;
        }
    }

    #[test]
    fn fetch_is_deterministic() {
        let program = &[
            "MOV_IMM R1 10",
            "MOV_IMM R2 4",
            "SUB R1 R2 R3",
            "CMP R3 R1",
            "JNE 6",
            "MOV_IMM R9 1",
            "HLT",
        ];

        let trace_of = |cpu: &mut Cpu| {
            let mut signals = Vec::new();
            loop {
                match cpu.step() {
                    StepState::Running(s) => signals.push(s.to_string()),
                    StepState::Halted(_) => break,
                }
            }
            signals
        };

        let mut a = cpu_with(program);
        let mut b = cpu_with(program);
        assert_eq!(trace_of(&mut a), trace_of(&mut b));
        assert_eq!(a.snapshot(0, 16), b.snapshot(0, 16));
    }

    #[test]
    fn cmp_je_taken_skips_instruction() {
        let mut cpu = cpu_with(&[
            "MOV_IMM R1 5",
            "MOV_IMM R2 5",
            "CMP R1 R2",
            "JE 5",
            "MOV_IMM R9 1",
            "HLT",
        ]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R9"), 0);
    }

    #[test]
    fn cmp_jne_taken_on_difference() {
        let mut cpu = cpu_with(&[
            "MOV_IMM R1 1",
            "MOV_IMM R2 2",
            "CMP R1 R2",
            "JNE 5",
            "MOV_IMM R9 1",
            "HLT",
        ]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R9"), 0);
    }

    #[test]
    fn je_not_taken_consumes_compare_result() {
        // JE consumes the nonzero compare result; the JNE that follows sees
        // an empty queue and falls through, so R9 gets written.
        let mut cpu = cpu_with(&[
            "MOV_IMM R1 1",
            "MOV_IMM R2 2",
            "CMP R1 R2",
            "JE 9",
            "JNE 6",
            "MOV_IMM R9 1",
            "HLT",
        ]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R9"), 1);
        assert!(!cpu.interrupts().has_pending());
    }

    #[test]
    fn taken_conditional_jump_completes_in_one_step() {
        // The taken branch re-issues the address-decode and jump signals
        // inline: one step, one cycle, PC already redirected.
        let mut cpu = cpu_with(&["CMP R1 R1", "JE 3", "MOV_IMM R9 1", "HLT"]);

        let mut at_je = false;
        for _ in 0..100 {
            if cpu.micro_position().map_or(false, |(m, _)| m == "JE") {
                at_je = true;
                break;
            }
            assert!(!cpu.step().is_halted());
        }
        assert!(at_je, "never reached the JE microprogram");

        let cycles_before = cpu.cycles();
        let state = cpu.step();
        assert_eq!(state, StepState::Running(Signal::CondJumpIfZero));
        assert_eq!(cpu.cycles(), cycles_before + 1);
        assert_eq!(cpu.pc(), 3);
        assert!(cpu.micro_position().is_none());

        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R9"), 0);
    }

    #[test]
    fn conditional_jump_with_empty_queue_falls_through() {
        let mut cpu = cpu_with(&["JE 2", "MOV_IMM R1 7", "HLT"]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R1"), 7);
    }

    #[test]
    fn stale_operands_cannot_leak_across_instructions() {
        // The second instruction is missing its source operand. With a
        // cleared decode context it must halt as malformed rather than
        // reuse the previous instruction's operands.
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "MOV_REG R2"]);
        match run_to_halt(&mut cpu) {
            HaltReason::MalformedInstruction { instruction, .. } => {
                assert_eq!(instruction, "MOV_REG R2");
            }
            other => panic!("unexpected halt: {other:?}"),
        }
        assert!(cpu.registers().entry("R2").is_none());
        assert_eq!(cpu.registers().read("R1"), 5);
    }

    #[test]
    fn store_load_roundtrip_through_memory() {
        let mut cpu = cpu_with(&["MOV_IMM R1 77", "STORE R1 10", "LOAD R2 10", "HLT"]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.memory().read(10).unwrap(), 77);
        assert_eq!(cpu.registers().read("R2"), 77);
        assert_eq!(
            cpu.registers().entry("R2").unwrap().provenance,
            "(loaded from mem[10])"
        );
    }

    #[test]
    fn store_out_of_range_halts_with_address() {
        let mut cpu = cpu_with(&["MOV_IMM R1 1", "STORE R1 99999"]);
        match run_to_halt(&mut cpu) {
            HaltReason::MemoryOutOfRange { addr, .. } => assert_eq!(addr, 99999),
            other => panic!("unexpected halt: {other:?}"),
        }
    }

    #[test]
    fn load_with_unparsable_address_halts() {
        let mut cpu = cpu_with(&["LOAD R1 abc"]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::BadAddress("abc".into()));
    }

    #[test]
    fn mov_reg_copies_with_provenance() {
        let mut cpu = cpu_with(&["MOV_IMM R1 9", "MOV_REG R2 R1", "HLT"]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R2"), 9);
        assert_eq!(
            cpu.registers().entry("R2").unwrap().provenance,
            "(copy of R1)"
        );
    }

    #[test]
    fn not_inverts_bits() {
        let mut cpu = cpu_with(&["MOV_IMM R1 0", "NOT R2 R1", "HLT"]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("R2"), -1);
    }

    #[test]
    fn flags_reflect_last_alu_operation() {
        let mut cpu = cpu_with(&["MOV_IMM R1 7", "MOV_IMM R2 -7", "ADD R1 R2 R3", "HLT"]);
        run_to_halt(&mut cpu);
        assert!(cpu.flags().zero);
        assert!(!cpu.flags().sign);
    }

    #[test]
    fn alu_result_provenance() {
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "MOV_IMM R2 3", "ADD R1 R2 R3", "HLT"]);
        run_to_halt(&mut cpu);
        assert_eq!(
            cpu.registers().entry("R3").unwrap().provenance,
            "(ADD R1, R2)"
        );
    }

    #[test]
    fn io_devices_echo_through_acc() {
        let input = SharedDevice::new(BufferDevice::with_text("stdin", "A"));
        let output = SharedDevice::new(BufferDevice::new("stdout"));
        let mut cpu = Cpu::new(
            Memory::default(),
            vec![Box::new(input.clone()), Box::new(output.clone())],
        );
        cpu.load_program(vec![
            "INPUT_CHAR".into(),
            "OUTPUT_CHAR".into(),
            "HLT".into(),
        ]);
        assert_eq!(run_to_halt(&mut cpu), HaltReason::Completed);
        assert_eq!(cpu.registers().read("ACC"), 'A' as i32);
        assert_eq!(output.borrow().output(), &['A' as i32]);
    }

    #[test]
    fn output_without_device_halts() {
        let mut cpu = cpu_with(&["OUTPUT_CHAR"]);
        match run_to_halt(&mut cpu) {
            HaltReason::Device { index, .. } => assert_eq!(index, DEVICE_OUTPUT),
            other => panic!("unexpected halt: {other:?}"),
        }
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut cpu = cpu_with(&["MOV_IMM R1 5", "HLT"]);
        run_to_halt(&mut cpu);
        let json = serde_json::to_string(&cpu.snapshot(0, 4)).unwrap();
        assert!(json.contains("\"pc\""));
        assert!(json.contains("\"halted\":true"));
    }

    #[test]
    fn preloaded_data_memory_survives_reload() {
        let mut cpu = Cpu::default();
        cpu.memory_mut().write(5, 1234).unwrap();
        cpu.load_program(vec!["LOAD R1 5".into(), "HLT".into()]);
        run_to_halt(&mut cpu);
        assert_eq!(cpu.registers().read("R1"), 1234);
    }
}
