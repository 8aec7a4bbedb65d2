//! Deferred self-replacement.
//!
//! A running executable cannot reliably replace its own file, so the swap is
//! handed to a detached shell that waits for this process to exit, deletes
//! the old executable and moves the new one into its place.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::info;

use crate::error::UpdateError;

/// Schedules replacement of `old` by `new` after the current process exits.
pub trait Handoff: Send + Sync {
    /// Start the replacement and return immediately.
    fn schedule(&self, old: &Path, new: &Path, delay: Duration) -> Result<(), UpdateError>;
}

/// A command line to run, kept separate from spawning so it can be checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Build the platform's replacement command.
///
/// Unix runs `/bin/sh`. Windows runs `cmd.exe` through PowerShell's
/// `Start-Process -Verb RunAs` so the swap can write to protected install
/// locations.
pub fn replacement_command(
    old: &Path,
    new: &Path,
    delay: Duration,
) -> Result<HandoffCommand, UpdateError> {
    if delay.is_zero() {
        return Err(UpdateError::InvalidHandoff(
            "replacement delay must be non-zero".to_string(),
        ));
    }
    if old == new {
        return Err(UpdateError::InvalidHandoff(format!(
            "{} would replace itself",
            old.display()
        )));
    }

    // Whole seconds, rounded up
    let secs = delay.as_secs() + u64::from(delay.subsec_nanos() > 0);

    if cfg!(windows) {
        Ok(windows_command(old, new, secs))
    } else {
        Ok(posix_command(old, new, secs))
    }
}

fn posix_command(old: &Path, new: &Path, secs: u64) -> HandoffCommand {
    let old = sh_quote(&old.to_string_lossy());
    let new = sh_quote(&new.to_string_lossy());
    HandoffCommand {
        program: "/bin/sh".to_string(),
        args: vec![
            "-c".to_string(),
            format!("sleep {secs}; rm -f {old}; mv {new} {old}"),
        ],
    }
}

fn windows_command(old: &Path, new: &Path, secs: u64) -> HandoffCommand {
    let script = format!(
        "/C timeout /t {secs} /nobreak > nul & del /f /q \"{old}\" & move /y \"{new}\" \"{old}\"",
        old = old.display(),
        new = new.display(),
    );
    HandoffCommand {
        program: "powershell.exe".to_string(),
        args: vec![
            "-NoProfile".to_string(),
            "-Command".to_string(),
            format!(
                "Start-Process -FilePath cmd.exe -ArgumentList '{}' -Verb RunAs -WindowStyle Hidden",
                script.replace('\'', "''")
            ),
        ],
    }
}

/// Single-quote `value` for a POSIX shell.
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// [`Handoff`] that spawns a detached system shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellHandoff;

impl ShellHandoff {
    pub fn new() -> Self {
        Self
    }
}

impl Handoff for ShellHandoff {
    fn schedule(&self, old: &Path, new: &Path, delay: Duration) -> Result<(), UpdateError> {
        let command = replacement_command(old, new, delay)?;

        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut process);

        // Not waited on: it has to outlive this process
        process.spawn()?;

        info!(
            "Scheduled replacement of {} with {} in {:?}",
            old.display(),
            new.display(),
            delay
        );
        Ok(())
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}
