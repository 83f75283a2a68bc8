//! Teardown of a (partially) initialized control plane.
//!
//! Both functions are best-effort: every command runs even when an earlier
//! one failed, and the returned result names each command that failed.

use crate::config::Config;
use crate::runner::{render_command, CommandRunner, StepResult};
use tracing::{info, warn};

/// Disable and stop the container runtime.
pub fn disable_runtime(runner: &dyn CommandRunner, config: &Config) -> StepResult {
    run_all(
        runner,
        &[vec![
            "systemctl".to_string(),
            "disable".to_string(),
            "--now".to_string(),
            config.runtime_service.clone(),
        ]],
    )
}

/// `kubeadm reset`, then disable and stop kubelet and the container runtime.
pub fn reset_master(runner: &dyn CommandRunner, config: &Config) -> StepResult {
    info!("resetting control plane");
    run_all(
        runner,
        &[
            vec![
                "kubeadm".to_string(),
                "reset".to_string(),
                "--force".to_string(),
                config.cri_socket_arg(),
            ],
            vec![
                "systemctl".to_string(),
                "disable".to_string(),
                "--now".to_string(),
                config.kubelet_service.clone(),
            ],
            vec![
                "systemctl".to_string(),
                "disable".to_string(),
                "--now".to_string(),
                config.runtime_service.clone(),
            ],
        ],
    )
}

fn run_all(runner: &dyn CommandRunner, commands: &[Vec<String>]) -> StepResult {
    let mut failures = Vec::new();
    for argv in commands {
        let Some((program, args)) = argv.split_first() else {
            continue;
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = runner.run(program, &args);
        if !result.success {
            let line = render_command(program, &args);
            warn!(command = %line, message = %result.message, "teardown command failed");
            failures.push(format!("{line}: {}", result.message));
        }
    }
    if failures.is_empty() {
        StepResult::ok("")
    } else {
        StepResult::failure(failures.join("\n"))
    }
}
