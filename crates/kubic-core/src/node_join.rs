//! Joining worker nodes through salt.
//!
//! A fresh join command is fetched from kubeadm, then every sub-step is fanned
//! out to the targets with one salt invocation each. The first failing
//! sub-step ends the run; targets already touched are left as they are and
//! the [`JoinReport`] says how far the run got so it can be resumed.

use crate::config::Config;
use crate::error::{KubicError, Result};
use crate::runner::{render_command, CommandRunner, StepResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// TargetSpec
// ---------------------------------------------------------------------------

/// Which minions salt should address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TargetSpec {
    /// `name1,name2`: salt `-L` list addressing.
    ExplicitList(Vec<String>),
    /// A single host or a glob/range such as `node[1-3]`.
    Pattern(String),
}

impl TargetSpec {
    /// A comma without any `[` means an explicit list; everything else is a
    /// pattern.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KubicError::InvalidTargetSpec(raw.to_string()));
        }
        if trimmed.contains(',') && !trimmed.contains('[') {
            let names: Vec<String> = trimmed
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                return Err(KubicError::InvalidTargetSpec(raw.to_string()));
            }
            return Ok(TargetSpec::ExplicitList(names));
        }
        Ok(TargetSpec::Pattern(trimmed.to_string()))
    }

    /// Salt target arguments for this spec.
    pub fn salt_target(&self) -> Vec<String> {
        match self {
            TargetSpec::ExplicitList(names) => vec!["-L".to_string(), names.join(",")],
            TargetSpec::Pattern(p) => vec![p.clone()],
        }
    }
}

impl FromStr for TargetSpec {
    type Err = KubicError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::ExplicitList(names) => f.write_str(&names.join(",")),
            TargetSpec::Pattern(p) => f.write_str(p),
        }
    }
}

// ---------------------------------------------------------------------------
// JoinStep / JoinReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStep {
    StartRuntime,
    EnableRuntime,
    StartKubelet,
    EnableKubelet,
    RunJoin,
    MarkRole,
}

impl JoinStep {
    pub const ALL: [JoinStep; 6] = [
        JoinStep::StartRuntime,
        JoinStep::EnableRuntime,
        JoinStep::StartKubelet,
        JoinStep::EnableKubelet,
        JoinStep::RunJoin,
        JoinStep::MarkRole,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    pub targets: TargetSpec,
    /// Sub-steps known to have succeeded on every target, in order.
    pub completed: Vec<JoinStep>,
    pub result: StepResult,
}

// ---------------------------------------------------------------------------
// NodeJoinWorkflow
// ---------------------------------------------------------------------------

pub struct NodeJoinWorkflow<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a Config,
}

impl<'a> NodeJoinWorkflow<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a Config) -> Self {
        Self { runner, config }
    }

    /// Join the hosts named by `targets`.
    pub fn join(&self, targets: &str) -> StepResult {
        match TargetSpec::parse(targets) {
            Ok(spec) => self.join_targets(&spec).result,
            Err(e) => StepResult::failure(e.to_string()),
        }
    }

    pub fn join_targets(&self, targets: &TargetSpec) -> JoinReport {
        self.join_resuming(targets, &[])
    }

    /// Run every sub-step not listed in `already_done`. The join command is
    /// always fetched fresh since tokens expire.
    pub fn join_resuming(&self, targets: &TargetSpec, already_done: &[JoinStep]) -> JoinReport {
        let mut report = JoinReport {
            targets: targets.clone(),
            completed: Vec::new(),
            result: StepResult::ok(""),
        };

        let token = self
            .runner
            .run("kubeadm", &["token", "create", "--print-join-command"]);
        if !token.success {
            warn!(targets = %targets, "could not create join token");
            report.completed = already_done.to_vec();
            report.result = token;
            return report;
        }
        let join_command = token.message.trim().to_string();
        if join_command.is_empty() {
            report.completed = already_done.to_vec();
            report.result = StepResult::failure("kubeadm returned an empty join command");
            return report;
        }

        let salt_target = targets.salt_target();
        for step in JoinStep::ALL {
            if already_done.contains(&step) {
                report.completed.push(step);
                continue;
            }

            let mut argv = salt_target.clone();
            argv.extend(self.step_args(step, &join_command));
            let args: Vec<&str> = argv.iter().map(String::as_str).collect();
            info!(targets = %targets, ?step, "fanning out join step");
            let result = self.runner.run("salt", &args);
            if !result.success {
                warn!(command = %render_command("salt", &args), "join step failed");
                report.result = result;
                return report;
            }
            report.completed.push(step);
        }

        info!(targets = %targets, "nodes joined");
        report
    }

    fn step_args(&self, step: JoinStep, join_command: &str) -> Vec<String> {
        let runtime = &self.config.runtime_service;
        let kubelet = &self.config.kubelet_service;
        match step {
            JoinStep::StartRuntime => vec!["service.start".into(), runtime.clone()],
            JoinStep::EnableRuntime => vec!["service.enable".into(), runtime.clone()],
            JoinStep::StartKubelet => vec!["service.start".into(), kubelet.clone()],
            JoinStep::EnableKubelet => vec!["service.enable".into(), kubelet.clone()],
            // Quoted so salt passes `--cri-socket=...` through instead of
            // reading it as a keyword argument.
            JoinStep::RunJoin => vec![
                "cmd.run".into(),
                format!("\"{join_command} {}\"", self.config.cri_socket_arg()),
            ],
            JoinStep::MarkRole => vec![
                "grains.append".into(),
                self.config.worker_grain.key.clone(),
                self.config.worker_grain.value.clone(),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
