//! TUI debugger for the micromachine emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Program listing with the PC marker and breakpoints
//! - Register, latch and flag visualization
//! - Signal-level and instruction-level stepping
//! - Data memory and device output views

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
