use crate::context::Context;
use crate::output::print_json;
use anyhow::{anyhow, Result};
use kubic_core::reset;

pub fn run(ctx: &Context) -> Result<()> {
    let result = reset::reset_master(ctx.runner(), &ctx.config);
    ctx.report_dry_run();

    if ctx.json {
        print_json(&result)?;
    } else if result.success {
        println!("Control plane reset.");
    }

    if result.success {
        Ok(())
    } else {
        Err(anyhow!(result.message))
    }
}
