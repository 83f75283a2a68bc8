//! External command execution.
//!
//! Every side effect on the host goes through a [`CommandRunner`]: the
//! workflows only ever see `program + args -> StepResult`. [`SystemRunner`]
//! spawns real processes; [`RecordingRunner`] records invocations instead and
//! backs both `--dry-run` and the test suites.

use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// Outcome of one external action. A failure always carries a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub message: String,
}

impl StepResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "command failed without diagnostic output".to_string()
        } else {
            message
        };
        Self {
            success: false,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion. Stateless; never retries.
    fn run(&self, program: &str, args: &[&str]) -> StepResult;
}

/// Render a command line for logs and dry-run output.
pub fn render_command(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> StepResult {
        debug!(command = %render_command(program, args), "running command");

        let output = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(o) => o,
            Err(e) => {
                warn!(program, error = %e, "failed to launch command");
                return StepResult::failure(format!("failed to run '{program}': {e}"));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            return StepResult::ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(program, status = %output.status, "command failed");
        if !stderr.is_empty() {
            StepResult::failure(stderr)
        } else if !stdout.is_empty() {
            StepResult::failure(stdout)
        } else {
            StepResult::failure(format!("'{program}' exited with {}", output.status))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

/// Records every invocation and answers from a script instead of running
/// anything. Unscripted commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Vec<String>>>,
    failures: Vec<(Vec<String>, String)>,
    replies: Vec<(Vec<String>, String)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose argv starts with `prefix`.
    pub fn fail_on(mut self, prefix: &[&str], message: impl Into<String>) -> Self {
        self.failures.push((to_owned(prefix), message.into()));
        self
    }

    /// Answer commands whose argv starts with `prefix` with `output`.
    pub fn reply_with(mut self, prefix: &[&str], output: impl Into<String>) -> Self {
        self.replies.push((to_owned(prefix), output.into()));
        self
    }

    /// Every recorded argv, program first, in invocation order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded invocations whose argv starts with `prefix`.
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|argv| starts_with(argv, prefix))
            .count()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[&str]) -> StepResult {
        info!(command = %render_command(program, args), "dry-run");
        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(argv.clone());

        if let Some((_, message)) = self.failures.iter().find(|(p, _)| starts_with(&argv, p)) {
            return StepResult::failure(message.clone());
        }
        match self.replies.iter().find(|(p, _)| starts_with(&argv, p)) {
            Some((_, output)) => StepResult::ok(output.clone()),
            None => StepResult::ok(""),
        }
    }
}

fn to_owned(prefix: &[&str]) -> Vec<String> {
    prefix.iter().map(|s| s.to_string()).collect()
}

fn starts_with<S: AsRef<str>>(argv: &[String], prefix: &[S]) -> bool {
    argv.len() >= prefix.len()
        && argv
            .iter()
            .zip(prefix.iter())
            .all(|(a, p)| a.as_str() == p.as_ref())
}
