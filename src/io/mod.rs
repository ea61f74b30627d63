//! Input/output devices.
//!
//! The CPU addresses devices positionally through the [`IoDevice`] trait:
//! slot 0 is the conventional input device, slot 1 the conventional output
//! device. Variants: [`NullDevice`], the externally-driven [`BufferDevice`],
//! and the file-backed devices in [`file`].

pub mod device;
pub mod file;

pub use device::{
    BufferDevice, DeviceError, DeviceStatus, IoDevice, NullDevice, SharedDevice, DEVICE_INPUT,
    DEVICE_OUTPUT,
};
pub use file::{FileInputDevice, FileOutputDevice};
