use crate::colors::*;
use crate::installer::InstalledPackagesRecord;
use crate::project::Project;
use anyhow::{bail, Result};

pub fn cmd_list(project: &Project, format: &str) -> Result<()> {
    let path = project.installation_path();
    let Some(record) = InstalledPackagesRecord::load(&path)? else {
        eprintln!("{} nothing installed yet. Run 'esy install'.", paint(C_YELLOW, "note"));
        return Ok(());
    };
    let output = match format.to_ascii_lowercase().as_str() {
        "json" => serde_json::to_string_pretty(&record)?,
        "yaml" | "yml" => serde_yaml::to_string(&record)?,
        other => bail!("unsupported format '{other}', use 'json' or 'yaml'"),
    };
    println!("{output}");
    Ok(())
}
