//! Program text format and loading.

pub mod loader;

pub use loader::{load_program_file, parse_program, LoadError};
