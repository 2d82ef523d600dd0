//! Operator confirmation before destructive actions.

use std::io::{BufRead, Write};
use std::path::Path;

use chap_common::Result;

/// Decides whether a wipe of `path` may proceed.
pub trait Confirmation {
    /// Return `Ok(true)` to proceed.
    fn confirm(&mut self, path: &Path) -> Result<bool>;
}

/// Agrees to everything. Used when the operator opted out of prompting.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForcedConfirmation;

impl Confirmation for ForcedConfirmation {
    fn confirm(&mut self, _path: &Path) -> Result<bool> {
        Ok(true)
    }
}

/// Asks on `output` and reads the answer from `input`.
///
/// Only a line that is exactly `y` (surrounding whitespace ignored)
/// counts as agreement; anything else, including end of input, declines.
pub struct PromptConfirmation<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirmation for PromptConfirmation<R, W> {
    fn confirm(&mut self, path: &Path) -> Result<bool> {
        writeln!(
            self.output,
            "WARNING! Are you sure you want to wipe [{}]?",
            path.display()
        )?;
        writeln!(self.output, "Type \"y\" to confirm")?;
        self.output.flush()?;

        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim() == "y")
    }
}
