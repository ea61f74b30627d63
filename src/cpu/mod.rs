//! The microprogrammed machine.
//!
//! This module implements the complete register-transfer-level core:
//! - a bounded i32 data memory with pluggable addressing modes
//! - an ALU with zero/carry/sign/overflow flags
//! - a free-form named register file with write provenance
//! - the PC/MAR/MBR/IR latch set of the classic fetch path
//! - a FIFO interrupt queue for compare results
//! - the control store and the one-signal-per-step engine

pub mod alu;
pub mod bus;
pub mod control;
pub mod execute;
pub mod interrupt;
pub mod latch;
pub mod memory;
pub mod registers;

pub use alu::{Alu, AluError, AluOp, Flags};
pub use bus::Bus;
pub use control::{ControlStore, Signal, FETCH};
pub use execute::{Cpu, CpuSnapshot, HaltReason, StepState};
pub use interrupt::InterruptManager;
pub use latch::{AddressRegister, BufferRegister, InstructionRegister, ProgramCounter};
pub use memory::{AddressingMode, Direct, Memory, MemoryError, DEFAULT_MEMORY_SIZE};
pub use registers::{RegisterEntry, RegisterFile};
