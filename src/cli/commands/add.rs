use crate::manifest::{parse_spec, DependencyGroup};
use crate::ops::{self, Context};
use anyhow::{Context as _, Result};

pub fn cmd_add(ctx: &Context<'_>, specs: &[String], dev: bool) -> Result<()> {
    let group = if dev { DependencyGroup::Development } else { DependencyGroup::Runtime };
    let requests = specs
        .iter()
        .map(|s| parse_spec(s, group))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| "parse package specifiers")?;
    ops::add(ctx, &requests).with_context(|| format!("add {}", specs.join(" ")))?;
    Ok(())
}
