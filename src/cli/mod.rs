use crate::config::{Config, Overrides};
use crate::ops::Context;
use crate::project::Project;
use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
mod reporter;

pub use reporter::StderrReporter;

#[derive(Parser, Debug)]
#[command(
    name = "esy",
    version,
    about = "Solve, lock and install project dependencies",
    long_about = "Resolves the dependency constraints in package.json, records the\nresolution in esy.lock.json and installs packages into _esy/store.\n\nExamples:\n  esy install\n  esy add new-dep\n  esy add new-dep@^1.0.0\n  esy add -D lint-tool test-tool\n  esy ls --format yaml"
)]
pub struct EsyCli {
    /// Project root (defaults to the current directory)
    #[arg(long, short = 'C', global = true)]
    project: Option<PathBuf>,
    /// npm-compatible registry URL
    #[arg(long, global = true)]
    registry: Option<String>,
    /// Use a directory laid out as <name>/<version>/package.json as the registry
    #[arg(long, global = true)]
    local_registry: Option<PathBuf>,
    /// Maximum number of packages fetched concurrently
    #[arg(long, short = 'j', global = true)]
    jobs: Option<usize>,
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install dependencies, solving only if package.json changed since the last solve
    #[command(alias = "i")]
    Install,
    /// Add one or more dependencies (name or name@range)
    Add {
        #[arg(required = true)]
        packages: Vec<String>,
        /// Save to devDependencies
        #[arg(long, short = 'D')]
        dev: bool,
    },
    /// Remove one or more dependencies
    Remove {
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Print the installed packages record
    Ls {
        /// Output format: json or yaml
        #[arg(long, short = 'f', default_value = "json")]
        format: String,
    },
}

impl EsyCli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn run(&self) -> Result<()> {
        let root = match &self.project {
            Some(p) => p.clone(),
            None => std::env::current_dir().with_context(|| "determine current directory")?,
        };
        let project = Project::at(root);
        if let Some(Commands::Ls { format }) = &self.command {
            return commands::cmd_list(&project, format);
        }

        let config = Config::resolve(&Overrides {
            registry: self.registry.clone(),
            local_registry: self.local_registry.clone(),
            jobs: self.jobs,
        })?;
        let backend = config.open_backend()?;
        let reporter = StderrReporter::new();
        let ctx = Context {
            project,
            catalog: backend.catalog(),
            source: backend.source(),
            reporter: &reporter,
            jobs: config.jobs,
        };

        match &self.command {
            None | Some(Commands::Install) => commands::cmd_install(&ctx),
            Some(Commands::Add { packages, dev }) => commands::cmd_add(&ctx, packages, *dev),
            Some(Commands::Remove { packages }) => commands::cmd_remove(&ctx, packages),
            Some(Commands::Ls { .. }) => Ok(()),
        }
    }
}
