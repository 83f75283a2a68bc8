use crate::context::Context;
use crate::output::{print_json, print_table};
use anyhow::{anyhow, Result};
use kubic_core::deployment::DeploymentTracker;
use std::path::Path;

pub fn run(ctx: &Context, manifest: &Path) -> Result<()> {
    let result = DeploymentTracker::new(ctx.runner(), &ctx.config).deploy(manifest);
    ctx.report_dry_run();

    if ctx.json {
        print_json(&result)?;
    } else if result.success {
        println!("Deployed {}", manifest.display());
    }

    if result.success {
        Ok(())
    } else {
        Err(anyhow!(result.message))
    }
}

pub fn list(ctx: &Context) -> Result<()> {
    let records = DeploymentTracker::new(ctx.runner(), &ctx.config).records()?;

    if ctx.json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No deployments recorded.");
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.path.clone(),
                r.status.as_str().to_string(),
                r.digest.chars().take(12).collect(),
            ]
        })
        .collect();
    print_table(&["PATH", "STATUS", "DIGEST"], rows);
    Ok(())
}
