//! Input providers for the `read` primitive.
//!
//! The machine asks an [`Input`] for one integer each time it executes
//! `unary read`. [`StdinInput`] prompts interactively; `Vec<i64>` serves a
//! scripted sequence, which is what tests use.

use std::io::{self, Write};

use crate::error::RuntimeError;

/// Source of integers for the `read` primitive.
pub trait Input {
    /// Produce the next integer, or an [`RuntimeError::InputFailed`].
    fn read_int(&mut self) -> Result<i64, RuntimeError>;
}

/// Interactive provider: prompts on stdout and parses one line of stdin.
pub struct StdinInput;

impl Input for StdinInput {
    fn read_int(&mut self) -> Result<i64, RuntimeError> {
        print!("read> ");
        io::stdout()
            .flush()
            .map_err(|e| RuntimeError::InputFailed(e.to_string()))?;
        let mut line = String::new();
        io::stdin()
            .read_line(&mut line)
            .map_err(|e| RuntimeError::InputFailed(e.to_string()))?;
        let trimmed = line.trim();
        trimmed
            .parse::<i64>()
            .map_err(|_| RuntimeError::InputFailed(format!("`{}` is not an integer", trimmed)))
    }
}

/// Scripted provider: serves its integers front to back.
impl Input for Vec<i64> {
    fn read_int(&mut self) -> Result<i64, RuntimeError> {
        if self.is_empty() {
            return Err(RuntimeError::InputFailed("input exhausted".to_string()));
        }
        Ok(self.remove(0))
    }
}
