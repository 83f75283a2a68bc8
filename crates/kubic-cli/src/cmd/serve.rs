use crate::context::Context;
use anyhow::Result;

pub fn run(ctx: &Context, port: u16) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let config = ctx.config.clone();
    let runner = ctx.shared_runner();

    rt.block_on(async move { kubic_server::serve(config, runner, port).await })
}
