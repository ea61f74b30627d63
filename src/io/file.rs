//! File-backed input and output devices.
//!
//! The input device reads one byte per `read` call and reports -1 at end of
//! file; the output device writes one character per `write` call and
//! flushes immediately so partial runs stay observable.

use crate::io::device::{DeviceError, DeviceStatus, IoDevice};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Reads a text file byte by byte.
pub struct FileInputDevice {
    id: String,
    reader: BufReader<File>,
    status: DeviceStatus,
}

impl FileInputDevice {
    pub fn open(id: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            id: id.into(),
            reader: BufReader::new(file),
            status: DeviceStatus::Open,
        })
    }
}

impl IoDevice for FileInputDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn read(&mut self) -> Result<i32, DeviceError> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(0) => {
                self.status = DeviceStatus::Eof;
                Ok(-1)
            }
            Ok(_) => {
                self.status = DeviceStatus::Busy;
                Ok(byte[0] as i32)
            }
            Err(e) => {
                self.status = DeviceStatus::Error;
                Err(DeviceError::Io {
                    id: self.id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn write(&mut self, _value: i32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            id: self.id.clone(),
            operation: "write",
        })
    }
}

/// Writes characters to a text file, flushing after every write.
pub struct FileOutputDevice {
    id: String,
    writer: BufWriter<File>,
    status: DeviceStatus,
}

impl FileOutputDevice {
    pub fn create(id: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            id: id.into(),
            writer: BufWriter::new(file),
            status: DeviceStatus::Open,
        })
    }

    /// Flush and mark the device closed. Further writes are rejected.
    pub fn close(&mut self) -> Result<(), DeviceError> {
        self.writer.flush().map_err(|e| {
            self.status = DeviceStatus::Error;
            DeviceError::Io {
                id: self.id.clone(),
                message: e.to_string(),
            }
        })?;
        self.status = DeviceStatus::Closed;
        Ok(())
    }
}

impl IoDevice for FileOutputDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> DeviceStatus {
        self.status
    }

    fn read(&mut self) -> Result<i32, DeviceError> {
        Err(DeviceError::Unsupported {
            id: self.id.clone(),
            operation: "read",
        })
    }

    fn write(&mut self, value: i32) -> Result<(), DeviceError> {
        if self.status == DeviceStatus::Closed {
            return Err(DeviceError::Unsupported {
                id: self.id.clone(),
                operation: "write after close",
            });
        }
        let ch = u32::try_from(value)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| DeviceError::Io {
                id: self.id.clone(),
                message: format!("value {value} is not a character"),
            })?;
        let mut buf = [0u8; 4];
        let encoded = ch.encode_utf8(&mut buf);
        self.writer
            .write_all(encoded.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| {
                self.status = DeviceStatus::Error;
                DeviceError::Io {
                    id: self.id.clone(),
                    message: e.to_string(),
                }
            })?;
        self.status = DeviceStatus::Busy;
        Ok(())
    }
}
