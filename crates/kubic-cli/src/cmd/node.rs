use crate::context::Context;
use crate::output::print_json;
use anyhow::{anyhow, Result};
use clap::Subcommand;
use kubic_core::node_join::{NodeJoinWorkflow, TargetSpec};

#[derive(Subcommand, Debug)]
pub enum NodeSubcommand {
    /// Join worker nodes to the cluster
    Add {
        /// Salt target: `node1,node2`, a single host, or a glob like `node[1-3]`
        targets: String,
    },
}

pub fn run(ctx: &Context, subcommand: NodeSubcommand) -> Result<()> {
    match subcommand {
        NodeSubcommand::Add { targets } => add(ctx, &targets),
    }
}

fn add(ctx: &Context, targets: &str) -> Result<()> {
    let spec = TargetSpec::parse(targets)?;
    let report = NodeJoinWorkflow::new(ctx.runner(), &ctx.config).join_targets(&spec);
    ctx.report_dry_run();

    if ctx.json {
        print_json(&report)?;
    } else if report.result.success {
        println!("Joined {}", report.targets);
    } else if !report.completed.is_empty() {
        let done: Vec<String> = report.completed.iter().map(|s| format!("{s:?}")).collect();
        eprintln!("completed before failure: {}", done.join(", "));
    }

    if report.result.success {
        Ok(())
    } else {
        Err(anyhow!(report.result.message))
    }
}
