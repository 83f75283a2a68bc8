use anyhow::{Context as _, Result};
use kubic_core::config::Config;
use kubic_core::runner::{CommandRunner, RecordingRunner, SystemRunner};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Stand-in join command handed out by `kubeadm token create` in dry-run mode.
pub const DRY_RUN_JOIN_COMMAND: &str =
    "kubeadm join <control-plane>:6443 --token <token> --discovery-token-ca-cert-hash <hash>";

/// Everything a subcommand needs: the loaded config and the runner to act with.
pub struct Context {
    pub config: Config,
    pub json: bool,
    runner: Arc<dyn CommandRunner>,
    recorder: Option<Arc<RecordingRunner>>,
}

impl Context {
    /// Load the config at `path` and pick the runner.
    ///
    /// With `dry_run`, external commands are recorded instead of executed.
    /// Local state files named by the config are still written.
    pub fn load(path: &Path, json: bool, dry_run: bool) -> Result<Self> {
        let config = Config::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?;
        for warning in config.validate() {
            warn!(field = %warning.field, "{}", warning.message);
        }

        let (runner, recorder) = if dry_run {
            let recorder = Arc::new(RecordingRunner::new().reply_with(
                &["kubeadm", "token", "create"],
                DRY_RUN_JOIN_COMMAND,
            ));
            let runner: Arc<dyn CommandRunner> = recorder.clone();
            (runner, Some(recorder))
        } else {
            let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
            (runner, None)
        };

        Ok(Self {
            config,
            json,
            runner,
            recorder,
        })
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn shared_runner(&self) -> Arc<dyn CommandRunner> {
        self.runner.clone()
    }

    /// List what a dry run would have executed. Goes to stderr so `--json`
    /// output stays parseable.
    pub fn report_dry_run(&self) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let calls = recorder.calls();
        eprintln!("dry-run: {} command(s) would run", calls.len());
        for argv in calls {
            eprintln!("  {}", argv.join(" "));
        }
    }
}
