//! System bus: routes values between registers, latches and memory.
//!
//! The bus holds no state of its own. Every transfer is logged as a
//! `tracing` event under the `bus` target so a driver can reconstruct the
//! data flow of a run.

use crate::cpu::latch::{AddressRegister, BufferRegister};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::RegisterFile;
use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
pub struct Bus;

impl Bus {
    /// Latch an address into the MAR.
    pub fn to_mar(&self, addr: i32, mar: &mut AddressRegister) {
        mar.load(addr);
        trace!(target: "bus", addr, "address -> MAR");
    }

    /// Latch a data value into the MBR.
    pub fn to_mbr(&self, data: i32, mbr: &mut BufferRegister) {
        mbr.load(data);
        trace!(target: "bus", data, "data -> MBR");
    }

    /// Register file -> MBR.
    pub fn register_to_mbr(&self, regs: &RegisterFile, name: &str, mbr: &mut BufferRegister) {
        let data = regs.read(name);
        mbr.load(data);
        trace!(target: "bus", register = name, data, "register -> MBR");
    }

    /// MBR -> register file, with a provenance note.
    pub fn mbr_to_register(
        &self,
        mbr: &BufferRegister,
        regs: &mut RegisterFile,
        name: &str,
        provenance: &str,
    ) {
        let data = mbr.get();
        regs.write(name, data, provenance);
        trace!(target: "bus", register = name, data, "MBR -> register");
    }

    /// MBR -> memory cell addressed by the MAR.
    pub fn mbr_to_memory(
        &self,
        mbr: &BufferRegister,
        mar: &AddressRegister,
        mem: &mut Memory,
    ) -> Result<(), MemoryError> {
        let addr = mar.get();
        let data = mbr.get();
        mem.write(addr, data)?;
        trace!(target: "bus", addr, data, "MBR -> memory");
        Ok(())
    }

    /// Memory cell addressed by the MAR -> MBR (value supplied by the
    /// addressing-mode resolver, so the bus only latches and logs).
    pub fn memory_to_mbr(&self, addr: i32, data: i32, mbr: &mut BufferRegister) {
        mbr.load(data);
        trace!(target: "bus", addr, data, "memory -> MBR");
    }

    /// Register file -> device (value already read; logged for diagnosis).
    pub fn register_to_device(&self, register: &str, device: &str, data: i32) {
        trace!(target: "bus", register, device, data, "register -> device");
    }

    /// Device -> register file.
    pub fn device_to_register(&self, device: &str, register: &str, data: i32) {
        trace!(target: "bus", device, register, data, "device -> register");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfers_move_data() {
        let bus = Bus;
        let mut regs = RegisterFile::new();
        let mut mbr = BufferRegister::default();
        let mut mar = AddressRegister::default();
        let mut mem = Memory::new(8);

        regs.write("R1", 42, "");
        bus.register_to_mbr(&regs, "R1", &mut mbr);
        assert_eq!(mbr.get(), 42);

        bus.to_mar(3, &mut mar);
        bus.mbr_to_memory(&mbr, &mar, &mut mem).unwrap();
        assert_eq!(mem.read(3).unwrap(), 42);

        bus.mbr_to_register(&mbr, &mut regs, "R2", "(copy)");
        assert_eq!(regs.read("R2"), 42);
    }

    #[test]
    fn mbr_to_memory_reports_bad_address() {
        let bus = Bus;
        let mbr = BufferRegister::default();
        let mut mar = AddressRegister::default();
        let mut mem = Memory::new(4);
        mar.load(100);
        assert!(bus.mbr_to_memory(&mbr, &mar, &mut mem).is_err());
    }
}
