use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::services::ProcessSpawner;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessSpawner;

impl ProcessSpawner for SystemProcessSpawner {
    fn run(&self, program: &Path, arguments: &[String], working_directory: &Path) -> Result<i32> {
        debug!(
            program = %program.display(),
            ?arguments,
            cwd = %working_directory.display(),
            "spawning process"
        );
        let status = Command::new(program)
            .args(arguments)
            .current_dir(working_directory)
            .status()
            .with_context(|| format!("failed to start {}", program.display()))?;

        status
            .code()
            .ok_or_else(|| anyhow!("{} was terminated by a signal", program.display()))
    }
}

/// Splits a manifest argument string the way a Windows command line is
/// read: whitespace separates arguments, double quotes group them and `\"`
/// is a literal quote.
pub fn split_command_line(input: &str) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut in_argument = false;
    let mut quoted = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
                in_argument = true;
            }
            '"' => {
                quoted = !quoted;
                in_argument = true;
            }
            ch if ch.is_whitespace() && !quoted => {
                if in_argument {
                    arguments.push(std::mem::take(&mut current));
                    in_argument = false;
                }
            }
            ch => {
                current.push(ch);
                in_argument = true;
            }
        }
    }
    if in_argument {
        arguments.push(current);
    }
    arguments
}
