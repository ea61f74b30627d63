//! Program text loading.
//!
//! Format:
//! ```text
//! // Comment line
//! MOV_IMM R1 5      // inline comments are stripped
//! MOV_IMM R2 3
//! ADD R1 R2 R3
//! HLT
//! ```
//!
//! One instruction per line, case-sensitive mnemonic first, operands
//! separated by whitespace. Blank lines and comment lines are skipped, so
//! instruction addresses count only real instructions.

use std::path::Path;
use thiserror::Error;

/// Parse program source into instruction lines.
pub fn parse_program(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let line = match line.find("//") {
                Some(idx) => &line[..idx],
                None => line,
            };
            let line = line.trim();
            if line.is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

/// Load a program file from disk.
pub fn load_program_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, LoadError> {
    let source =
        std::fs::read_to_string(path.as_ref()).map_err(|e| LoadError::Io(e.to_string()))?;
    let program = parse_program(&source);
    if program.is_empty() {
        return Err(LoadError::EmptyProgram);
    }
    Ok(program)
}

/// Errors that can occur while loading program text.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("program contains no instructions")]
    EmptyProgram,
}
