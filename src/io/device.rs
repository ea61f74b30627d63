//! Input/output device contract and the in-memory device variants.
//!
//! Devices are addressed positionally by the CPU: index 0 is the
//! conventional input device, index 1 the conventional output device. The
//! core only ever sees this trait, never a device's internals.

use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

/// Device slot conventionally used for input (`INPUT_CHAR`).
pub const DEVICE_INPUT: usize = 0;
/// Device slot conventionally used for output (`OUTPUT_CHAR`).
pub const DEVICE_OUTPUT: usize = 1;

/// Coarse device state, observable by drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Idle,
    Busy,
    Waiting,
    Open,
    Eof,
    Error,
    Closed,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceStatus::Idle => "IDLE",
            DeviceStatus::Busy => "BUSY",
            DeviceStatus::Waiting => "WAITING",
            DeviceStatus::Open => "OPEN",
            DeviceStatus::Eof => "EOF",
            DeviceStatus::Error => "ERROR",
            DeviceStatus::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// A pluggable input/output device.
///
/// `read` returns the next value, or -1 at end of stream. Devices never
/// block inside `read`/`write`; a device that has to wait for external data
/// reports that through its return value and status instead of stalling the
/// step loop.
pub trait IoDevice {
    fn id(&self) -> &str;
    fn status(&self) -> DeviceStatus;
    fn read(&mut self) -> Result<i32, DeviceError>;
    fn write(&mut self, value: i32) -> Result<(), DeviceError>;
}

/// Errors raised by devices. The CPU converts these into a halt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device {id} does not support {operation}")]
    Unsupported { id: String, operation: &'static str },

    #[error("device {id} I/O failure: {message}")]
    Io { id: String, message: String },
}

/// A device that ignores writes and always reads end-of-stream.
#[derive(Debug, Clone)]
pub struct NullDevice {
    id: String,
}

impl NullDevice {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl IoDevice for NullDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> DeviceStatus {
        DeviceStatus::Idle
    }

    fn read(&mut self) -> Result<i32, DeviceError> {
        Ok(-1)
    }

    fn write(&mut self, _value: i32) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// An externally-driven device backed by in-memory queues.
///
/// The owner pushes input values between steps and collects written output
/// afterwards. Reading from an empty queue does not block: it returns -1
/// and the status switches to [`DeviceStatus::Waiting`] until the driver
/// refills the queue.
#[derive(Debug, Clone)]
pub struct BufferDevice {
    id: String,
    input: VecDeque<i32>,
    output: Vec<i32>,
    status: DeviceStatus,
}

impl BufferDevice {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: VecDeque::new(),
            output: Vec::new(),
            status: DeviceStatus::Idle,
        }
    }

    /// Seed the device with the bytes of a string, in order.
    pub fn with_text(id: impl Into<String>, text: &str) -> Self {
        let mut dev = Self::new(id);
        dev.push_text(text);
        dev
    }

    /// Queue one input value.
    pub fn push_input(&mut self, value: i32) {
        self.input.push_back(value);
        if self.status == DeviceStatus::Waiting {
            self.status = DeviceStatus::Idle;
        }
    }

    /// Queue every byte of `text` as an input value.
    pub fn push_text(&mut self, text: &str) {
        for b in text.bytes() {
            self.push_input(b as i32);
        }
    }

    /// Values written so far.
    pub fn output(&self) -> &[i32] {
        &self.output
    }

    /// Written values rendered as text (non-character values become U+FFFD).
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .map(|&v| u32::try_from(v).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}'))
            .collect()
    }

    /// Take and clear the collected output.
    pub fn take_output(&mut self) -> Vec<i32> {
        std::mem::take(&mut self.output)
    }
}

impl IoDevice for BufferDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn read(&mut self) -> Result<i32, DeviceError> {
        match self.input.pop_front() {
            Some(v) => {
                self.status = DeviceStatus::Busy;
                Ok(v)
            }
            None => {
                self.status = DeviceStatus::Waiting;
                Ok(-1)
            }
        }
    }

    fn write(&mut self, value: i32) -> Result<(), DeviceError> {
        self.output.push(value);
        self.status = DeviceStatus::Busy;
        Ok(())
    }
}

/// A shared handle onto a device.
///
/// The CPU owns its device list as trait objects; a driver that wants to
/// keep feeding an input queue or collecting output after attaching the
/// device wraps it in a `SharedDevice` and keeps a clone.
pub struct SharedDevice<D> {
    id: String,
    inner: Rc<RefCell<D>>,
}

impl<D: IoDevice> SharedDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            id: device.id().to_string(),
            inner: Rc::new(RefCell::new(device)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, D> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, D> {
        self.inner.borrow_mut()
    }
}

impl<D> Clone for SharedDevice<D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<D: IoDevice> IoDevice for SharedDevice<D> {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> DeviceStatus {
        self.inner.borrow().status()
    }

    fn read(&mut self) -> Result<i32, DeviceError> {
        self.inner.borrow_mut().read()
    }

    fn write(&mut self, value: i32) -> Result<(), DeviceError> {
        self.inner.borrow_mut().write(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_device_reads_eof() {
        let mut dev = NullDevice::new("null");
        assert_eq!(dev.read().unwrap(), -1);
        assert!(dev.write(65).is_ok());
        assert_eq!(dev.status(), DeviceStatus::Idle);
    }

    #[test]
    fn buffer_device_fifo_input() {
        let mut dev = BufferDevice::with_text("in", "AB");
        assert_eq!(dev.read().unwrap(), 'A' as i32);
        assert_eq!(dev.read().unwrap(), 'B' as i32);
        assert_eq!(dev.read().unwrap(), -1);
        assert_eq!(dev.status(), DeviceStatus::Waiting);

        // Refilling clears the wait.
        dev.push_input(33);
        assert_eq!(dev.read().unwrap(), 33);
    }

    #[test]
    fn buffer_device_collects_output() {
        let mut dev = BufferDevice::new("out");
        dev.write('h' as i32).unwrap();
        dev.write('i' as i32).unwrap();
        assert_eq!(dev.output_text(), "hi");
        assert_eq!(dev.take_output(), vec![104, 105]);
        assert!(dev.output().is_empty());
    }

    #[test]
    fn shared_device_keeps_a_live_handle() {
        let shared = SharedDevice::new(BufferDevice::new("io"));
        let mut boxed: Box<dyn IoDevice> = Box::new(shared.clone());

        shared.borrow_mut().push_input(7);
        assert_eq!(boxed.read().unwrap(), 7);
        boxed.write(9).unwrap();
        assert_eq!(shared.borrow().output(), &[9]);
    }
}
