//! External command invocation.
//!
//! The upstream build and the bundler are separate programs. Each call blocks
//! until the child exits; a non-zero exit status is an error, so the next
//! step never runs on top of a failed one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Empty command")]
    EmptyCommand,
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A command line with `{placeholder}` substitution.
#[derive(Debug, Clone)]
pub struct CommandLine {
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandLine {
    pub fn new(args: &[String], cwd: &Path) -> Self {
        Self {
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        }
    }

    /// Replace `{name}` in every argument with `value`.
    pub fn substitute(mut self, vars: &HashMap<&str, String>) -> Self {
        for arg in &mut self.args {
            for (name, value) in vars {
                *arg = arg.replace(name, value);
            }
        }
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run to completion. Fails on spawn errors and non-zero exit.
    pub fn run(&self) -> Result<CommandOutput, ExecError> {
        let (program, rest) = self.args.split_first().ok_or(ExecError::EmptyCommand)?;
        tracing::debug!(command = %self, cwd = %self.cwd.display(), "running command");

        let output = Command::new(program)
            .args(rest)
            .current_dir(&self.cwd)
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ExecError::Failed {
                command: self.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}
