use crate::context::Context;
use anyhow::{anyhow, Result};
use kubic_core::master_init::{InitOutcome, InitRequest, MasterInitWorkflow};
use kubic_core::probe::MarkerFileProbe;
use kubic_core::status::{Disconnected, StatusMessage, StatusSink};

/// Prints progress as it arrives. Failures are held back for the caller so
/// they surface once, as the command's error.
struct PrintSink {
    json: bool,
    last: Option<StatusMessage>,
}

impl StatusSink for PrintSink {
    fn send(&mut self, status: StatusMessage) -> Result<(), Disconnected> {
        if self.json {
            match serde_json::to_string(&status) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "cannot encode status"),
            }
        } else if status.success {
            println!("{}", status.message);
        }
        self.last = Some(status);
        Ok(())
    }
}

pub fn run(
    ctx: &Context,
    pod_network: Option<String>,
    kubernetes_version: Option<String>,
) -> Result<()> {
    let request = InitRequest {
        pod_network: pod_network.unwrap_or_default(),
        kubernetes_version,
    };
    let probe = MarkerFileProbe::new(&ctx.config);
    let mut sink = PrintSink {
        json: ctx.json,
        last: None,
    };

    let report =
        MasterInitWorkflow::new(ctx.runner(), &ctx.config, &probe).run(&request, &mut sink);
    ctx.report_dry_run();

    match report.outcome {
        InitOutcome::Completed => Ok(()),
        outcome => {
            let message = sink
                .last
                .filter(|s| !s.success)
                .map(|s| s.message)
                .unwrap_or_else(|| format!("master init ended at {}: {outcome:?}", report.stage));
            Err(anyhow!(message))
        }
    }
}
