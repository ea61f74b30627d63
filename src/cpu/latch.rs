//! Single-value latches of the classic fetch path: PC, MAR, MBR and IR.

use serde::{Deserialize, Serialize};

/// Program counter: address of the next instruction to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCounter {
    value: i32,
}

impl ProgramCounter {
    pub fn get(&self) -> i32 {
        self.value
    }

    pub fn set(&mut self, value: i32) {
        self.value = value;
    }

    pub fn increment(&mut self) {
        self.value += 1;
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

/// Memory address register: address latched for the next memory access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRegister {
    address: i32,
}

impl AddressRegister {
    pub fn load(&mut self, addr: i32) {
        self.address = addr;
    }

    pub fn get(&self) -> i32 {
        self.address
    }

    pub fn reset(&mut self) {
        self.address = 0;
    }
}

/// Memory buffer register: data in flight between memory, ALU and registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRegister {
    data: i32,
}

impl BufferRegister {
    pub fn load(&mut self, data: i32) {
        self.data = data;
    }

    pub fn get(&self) -> i32 {
        self.data
    }

    pub fn clear(&mut self) {
        self.data = 0;
    }
}

/// Instruction register: the raw text of the instruction being executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionRegister {
    instruction: Option<String>,
}

impl InstructionRegister {
    pub fn load(&mut self, instr: String) {
        self.instruction = Some(instr);
    }

    /// The held instruction text, or `None` when empty.
    pub fn get(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    /// Whitespace-separated tokens of the held instruction.
    pub fn tokens(&self) -> Vec<&str> {
        self.instruction
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.instruction = None;
    }
}
