//! General-purpose register file.
//!
//! Registers are named by free-form strings; there is no fixed set and no
//! name validation, so the instruction format stays open. Each entry carries
//! the value plus a provenance note describing where the value came from.
//! Provenance is purely diagnostic and never affects computation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A register entry: the stored value and its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub value: i32,
    pub provenance: String,
}

/// The named register store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterFile {
    regs: HashMap<String, RegisterEntry>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a register's value. A register that was never written reads as 0.
    pub fn read(&self, name: &str) -> i32 {
        self.regs.get(name).map_or(0, |e| e.value)
    }

    /// The full entry, if the register has ever been written.
    pub fn entry(&self, name: &str) -> Option<&RegisterEntry> {
        self.regs.get(name)
    }

    /// Write a value with a provenance note.
    pub fn write(&mut self, name: &str, value: i32, provenance: impl Into<String>) {
        self.regs.insert(
            name.to_string(),
            RegisterEntry {
                value,
                provenance: provenance.into(),
            },
        );
    }

    /// Forget every register.
    pub fn clear(&mut self) {
        self.regs.clear();
    }

    /// Names of all registers written so far.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// Sorted name→value view for the observable state surface.
    pub fn snapshot(&self) -> BTreeMap<String, i32> {
        self.regs
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_register_reads_zero() {
        let regs = RegisterFile::new();
        assert_eq!(regs.read("R1"), 0);
        assert!(regs.entry("R1").is_none());
    }

    #[test]
    fn write_then_read() {
        let mut regs = RegisterFile::new();
        regs.write("ACC", 42, "(device input)");
        assert_eq!(regs.read("ACC"), 42);
        assert_eq!(regs.entry("ACC").unwrap().provenance, "(device input)");
        assert!(regs.names().any(|n| n == "ACC"));
    }

    #[test]
    fn any_string_is_a_valid_name() {
        let mut regs = RegisterFile::new();
        regs.write("weird-name.0", 7, "");
        assert_eq!(regs.read("weird-name.0"), 7);
    }

    #[test]
    fn clear_empties_the_file() {
        let mut regs = RegisterFile::new();
        regs.write("R1", 1, "");
        regs.write("R2", 2, "");
        regs.clear();
        assert!(regs.is_empty());
        assert_eq!(regs.read("R1"), 0);
    }

    #[test]
    fn snapshot_is_sorted() {
        let mut regs = RegisterFile::new();
        regs.write("R2", 2, "");
        regs.write("R1", 1, "");
        regs.write("ACC", 0, "");
        let names: Vec<_> = regs.snapshot().into_keys().collect();
        assert_eq!(names, vec!["ACC", "R1", "R2"]);
    }
}
