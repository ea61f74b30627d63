//! # Micromachine Emulator
//!
//! A microprogrammed register-transfer-level CPU emulator. The machine
//! fetches, decodes and executes assembly-like text instructions one
//! control signal at a time, against an explicit register set, a bounded
//! memory array, a small ALU, an interrupt-result queue and pluggable
//! input/output devices.
//!
//! The engine is single-threaded and synchronous: `step` never blocks and
//! executes exactly one micro-signal per call, which makes execution
//! naturally steppable for a debugger or test harness. Run loops belong to
//! drivers (the CLI and the TUI debugger), not to the core.

pub mod cpu;
pub mod io;
pub mod program;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{
    AddressingMode, Alu, AluOp, ControlStore, Cpu, CpuSnapshot, Direct, Flags, HaltReason,
    InterruptManager, Memory, MemoryError, RegisterFile, Signal, StepState,
};
pub use io::{
    BufferDevice, DeviceError, DeviceStatus, FileInputDevice, FileOutputDevice, IoDevice,
    NullDevice, SharedDevice,
};
pub use program::{load_program_file, parse_program, LoadError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
