use crate::ops::{self, Context};
use anyhow::{Context as _, Result};

pub fn cmd_install(ctx: &Context<'_>) -> Result<()> {
    ops::install(ctx).with_context(|| format!("install in {}", ctx.project.root().display()))?;
    Ok(())
}
