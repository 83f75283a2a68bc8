use crate::context::Context;
use crate::output::{print_json, print_table};
use anyhow::{bail, Result};
use kubic_core::tools::check_tools;
use serde::Serialize;

#[derive(Serialize)]
struct CheckReport {
    tools: Vec<kubic_core::tools::ToolStatus>,
    warnings: Vec<kubic_core::config::ConfigWarning>,
}

pub fn run(ctx: &Context) -> Result<()> {
    let report = CheckReport {
        tools: check_tools(),
        warnings: ctx.config.validate(),
    };

    if ctx.json {
        print_json(&report)?;
    } else {
        let rows = report
            .tools
            .iter()
            .map(|t| {
                let location = t
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "not found".to_string());
                vec![t.name.to_string(), location]
            })
            .collect();
        print_table(&["TOOL", "PATH"], rows);
        for w in &report.warnings {
            println!("warning: {}: {}", w.field, w.message);
        }
    }

    let missing: Vec<&str> = report
        .tools
        .iter()
        .filter(|t| !t.found())
        .map(|t| t.name)
        .collect();
    if !missing.is_empty() {
        bail!("missing tools: {}", missing.join(", "));
    }
    Ok(())
}
