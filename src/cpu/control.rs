//! Control store: the microprogram table.
//!
//! Every supported mnemonic maps to an ordered sequence of control signals;
//! the engine executes exactly one signal per step. The reserved `FETCH`
//! entry drives the instruction-fetch path and re-enters automatically when
//! a microprogram completes.
//!
//! Signals are a closed enum rather than strings: the dispatcher match is
//! exhaustive, so an "unknown control signal" state cannot exist at runtime.
//! Each variant carries a hardware-style wire name via `Display` for traces.

use crate::cpu::alu::AluOp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the reserved fetch microprogram.
pub const FETCH: &str = "FETCH";

/// One atomic hardware-level action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    // ==================== Fetch path ====================
    /// MAR ← PC
    PcToMar,
    /// Fetch instruction text at MAR; latch MBR (diagnostic hash) and IR;
    /// PC ← PC + 1. Absent or blank text halts with "end of program".
    MemReadPcInc,
    /// Conceptual MBR → IR transfer; the IR is already latched.
    MbrToIr,
    /// Split the IR, clear the decode context, activate the mnemonic's
    /// microprogram (or halt on an unrecognized mnemonic).
    Decode,

    // ==================== Operand decode ====================
    /// `OP R1 R2 R3`: operand1/operand2/destination ← tokens 1..=3.
    DecodeRegRegDest,
    /// `OP R1 R2`: operand1/operand2 ← tokens 1..=2.
    DecodeRegReg,
    /// `OP Rdst SRC`: destination ← token 1, operand1 ← token 2.
    DecodeDestImm,
    /// `OP ADDR`: operand1 ← token 1.
    DecodeAddr,
    /// `STORE Rsrc ADDR`: operand2 ← token 1, operand1 ← token 2.
    DecodeStore,

    // ==================== Execute ====================
    /// Conceptual operand routing into the ALU input latches.
    RegsToAlu,
    /// MBR ← ALU.operate(op, R[operand1], R[operand2]).
    AluToMbr(AluOp),
    /// R[destination] ← MBR, provenance derived from the active mnemonic.
    MbrToDest,
    /// MBR ← parse(operand1) as a signed immediate.
    ImmediateToMbr,
    /// MBR ← R[operand1].
    Reg1ToMbr,
    /// MBR ← R[operand2] (store path).
    SrcToMbr,
    /// MAR ← parse(operand1) as an address.
    AddrToMar,
    /// memory[MAR] ← MBR.
    MbrToMemory,
    /// MBR ← addressing.resolve(MAR).
    MemoryToMbr,
    /// devices[1].write(R["ACC"]).
    AccToDevice,
    /// R["ACC"] ← devices[0].read().
    DeviceToAcc,
    /// PC ← parse(operand1); cancels the active microprogram so the next
    /// step re-enters FETCH at the new address.
    AddressToPc,
    /// Consume one pending compare result; jump if it is zero.
    CondJumpIfZero,
    /// Consume one pending compare result; jump if it is non-zero.
    CondJumpIfNotZero,
    /// Push compare(R[operand1], R[operand2]) onto the interrupt queue.
    CmpToInterrupt,
    /// Stop the machine with a success reason.
    Halt,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::PcToMar => f.write_str("PC_out,MAR_in"),
            Signal::MemReadPcInc => f.write_str("Mem_read,PC_inc"),
            Signal::MbrToIr => f.write_str("MBR_out,IR_in"),
            Signal::Decode => f.write_str("Decode"),
            Signal::DecodeRegRegDest => f.write_str("Decode_Operands_R_R_R"),
            Signal::DecodeRegReg => f.write_str("Decode_Operands_R_R"),
            Signal::DecodeDestImm => f.write_str("Decode_Operands_R_IMM"),
            Signal::DecodeAddr => f.write_str("Decode_Operand_Addr"),
            Signal::DecodeStore => f.write_str("Decode_Operands_Store"),
            Signal::RegsToAlu => f.write_str("Reg1_to_ALU_A,Reg2_to_ALU_B"),
            Signal::AluToMbr(op) => write!(f, "ALU_{},MBR_in", op.name()),
            Signal::MbrToDest => f.write_str("MBR_out,Reg_Dest_in"),
            Signal::ImmediateToMbr => f.write_str("Immediate_to_MBR"),
            Signal::Reg1ToMbr => f.write_str("Reg1_to_MBR"),
            Signal::SrcToMbr => f.write_str("Reg_Src_to_MBR"),
            Signal::AddrToMar => f.write_str("Addr_to_MAR"),
            Signal::MbrToMemory => f.write_str("MBR_out,Mem_write"),
            Signal::MemoryToMbr => f.write_str("Mem_read,MBR_in"),
            Signal::AccToDevice => f.write_str("ACC_to_Bus,Write_to_Device_1"),
            Signal::DeviceToAcc => f.write_str("Read_from_Device_0,Bus_to_ACC"),
            Signal::AddressToPc => f.write_str("Address_to_PC"),
            Signal::CondJumpIfZero => f.write_str("Cond_Jump_if_Zero"),
            Signal::CondJumpIfNotZero => f.write_str("Cond_Jump_if_Not_Zero"),
            Signal::CmpToInterrupt => f.write_str("ALU_CMP,Interrupt_Request"),
            Signal::Halt => f.write_str("HALT_CPU"),
        }
    }
}

/// The fixed mnemonic → microprogram mapping, built once at CPU construction.
#[derive(Debug, Clone)]
pub struct ControlStore {
    programs: HashMap<&'static str, Vec<Signal>>,
}

impl ControlStore {
    pub fn new() -> Self {
        use AluOp::*;
        use Signal::*;

        let mut programs: HashMap<&'static str, Vec<Signal>> = HashMap::new();

        // The FETCH cycle is the entry point for every instruction.
        programs.insert(FETCH, vec![PcToMar, MemReadPcInc, MbrToIr, Decode]);

        // Three-register ALU instructions: OP R1 R2 R3 → R3 = R1 op R2.
        for (mnemonic, op) in [
            ("ADD", Add),
            ("SUB", Sub),
            ("MUL", Mul),
            ("DIV", Div),
            ("AND", And),
            ("OR", Or),
            ("XOR", Xor),
        ] {
            programs.insert(
                mnemonic,
                vec![DecodeRegRegDest, RegsToAlu, AluToMbr(op), MbrToDest],
            );
        }

        // NOT Rdst Rsrc (unary).
        programs.insert(
            "NOT",
            vec![DecodeDestImm, RegsToAlu, AluToMbr(Not), MbrToDest],
        );

        // Data movement.
        programs.insert("MOV_IMM", vec![DecodeDestImm, ImmediateToMbr, MbrToDest]);
        programs.insert("MOV_REG", vec![DecodeDestImm, Reg1ToMbr, MbrToDest]);
        programs.insert(
            "LOAD",
            vec![DecodeDestImm, AddrToMar, MemoryToMbr, MbrToDest],
        );
        programs.insert("STORE", vec![DecodeStore, SrcToMbr, AddrToMar, MbrToMemory]);

        // I/O.
        programs.insert("OUTPUT_CHAR", vec![AccToDevice]);
        programs.insert("INPUT_CHAR", vec![DeviceToAcc]);

        // Control flow.
        programs.insert("JMP", vec![DecodeAddr, AddressToPc]);
        programs.insert("CMP", vec![DecodeRegReg, RegsToAlu, CmpToInterrupt]);
        programs.insert("JE", vec![CondJumpIfZero]);
        programs.insert("JNE", vec![CondJumpIfNotZero]);
        programs.insert("HLT", vec![Halt]);

        Self { programs }
    }

    /// Look up the microprogram for a mnemonic.
    pub fn get(&self, mnemonic: &str) -> Option<&[Signal]> {
        self.programs.get(mnemonic).map(Vec::as_slice)
    }

    /// The reserved fetch microprogram.
    pub fn fetch(&self) -> &[Signal] {
        self.programs[FETCH].as_slice()
    }

    pub fn contains(&self, mnemonic: &str) -> bool {
        self.programs.contains_key(mnemonic)
    }

    /// All supported instruction mnemonics (the reserved `FETCH` program is
    /// not an instruction), sorted.
    pub fn mnemonics(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .programs
            .keys()
            .copied()
            .filter(|m| *m != FETCH)
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for ControlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_program_shape() {
        let store = ControlStore::new();
        assert_eq!(
            store.fetch(),
            &[
                Signal::PcToMar,
                Signal::MemReadPcInc,
                Signal::MbrToIr,
                Signal::Decode
            ]
        );
    }

    #[test]
    fn all_supported_mnemonics_present() {
        let store = ControlStore::new();
        for m in [
            "ADD", "SUB", "MUL", "DIV", "AND", "OR", "XOR", "NOT", "MOV_IMM", "MOV_REG", "LOAD",
            "STORE", "OUTPUT_CHAR", "INPUT_CHAR", "JMP", "CMP", "JE", "JNE", "HLT",
        ] {
            assert!(store.contains(m), "missing microprogram for {m}");
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let store = ControlStore::new();
        assert!(store.get("add").is_none());
        assert!(store.get("ADD").is_some());
    }

    #[test]
    fn signal_wire_names() {
        assert_eq!(Signal::PcToMar.to_string(), "PC_out,MAR_in");
        assert_eq!(
            Signal::AluToMbr(AluOp::Add).to_string(),
            "ALU_ADD,MBR_in"
        );
        assert_eq!(Signal::Halt.to_string(), "HALT_CPU");
    }

    #[test]
    fn halt_program_is_single_signal() {
        let store = ControlStore::new();
        assert_eq!(store.get("HLT").unwrap(), &[Signal::Halt]);
    }

    #[test]
    fn mnemonics_are_sorted_and_exclude_fetch() {
        let store = ControlStore::new();
        let names = store.mnemonics();
        assert!(!names.contains(&FETCH));
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
