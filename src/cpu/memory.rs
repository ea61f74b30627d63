//! Data memory and addressing modes.
//!
//! Memory is a flat, bounds-checked array of signed 32-bit cells with a
//! capacity fixed at construction. Out-of-range access is a reported error,
//! never a panic. Memory also provides the default direct-addressing
//! resolver; the [`AddressingMode`] trait keeps indirect/indexed modes open
//! without changing Memory's contract.

use crate::cpu::registers::RegisterFile;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default capacity used by [`Memory::default`] and the CLI driver.
pub const DEFAULT_MEMORY_SIZE: usize = 2048;

/// Flat data memory: `capacity` signed 32-bit cells, zeroed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<i32>,
}

impl Memory {
    /// Create a memory with `capacity` zeroed cells.
    pub fn new(capacity: usize) -> Self {
        Self {
            cells: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Read the cell at `addr`.
    pub fn read(&self, addr: i32) -> Result<i32, MemoryError> {
        let index = self.check(addr)?;
        Ok(self.cells[index])
    }

    /// Write `value` into the cell at `addr`.
    pub fn write(&mut self, addr: i32, value: i32) -> Result<(), MemoryError> {
        let index = self.check(addr)?;
        self.cells[index] = value;
        Ok(())
    }

    fn check(&self, addr: i32) -> Result<usize, MemoryError> {
        if addr < 0 || addr as usize >= self.cells.len() {
            return Err(MemoryError::OutOfRange {
                addr,
                capacity: self.cells.len(),
            });
        }
        Ok(addr as usize)
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Snapshot of a memory window (for observation only).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, i32)> {
        let end = (start + count).min(self.cells.len());
        (start.min(self.cells.len())..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {addr} out of range (0..{capacity})")]
    OutOfRange { addr: i32, capacity: usize },
}

/// Pluggable address-resolution strategy.
///
/// `resolve` turns an address into a value. The register file is passed so
/// that future indexed/indirect modes can consult it; the default mode
/// ignores it.
pub trait AddressingMode {
    fn resolve(&self, addr: i32, mem: &Memory, regs: &RegisterFile) -> Result<i32, MemoryError>;
}

/// Direct addressing: `resolve(addr) = mem[addr]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl AddressingMode for Direct {
    fn resolve(&self, addr: i32, mem: &Memory, _regs: &RegisterFile) -> Result<i32, MemoryError> {
        mem.read(addr)
    }
}
