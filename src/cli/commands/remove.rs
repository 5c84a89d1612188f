use crate::ops::{self, Context};
use anyhow::{Context as _, Result};

pub fn cmd_remove(ctx: &Context<'_>, names: &[String]) -> Result<()> {
    ops::remove(ctx, names).with_context(|| format!("remove {}", names.join(" ")))?;
    Ok(())
}
