use crate::colors::*;
use crate::events::{Event, Reporter};

/// Renders core events as `info ...` lines on stderr.
#[derive(Debug, Default)]
pub struct StderrReporter;

impl StderrReporter {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn format_event(event: &Event) -> String {
    let info = paint(C_GRAY, "info");
    match event {
        Event::SolvingStarted => format!("{info} solving esy constraints"),
        Event::SolvingDone { packages } => {
            format!("{info} solving esy constraints: done {}", paint(C_DIM, &format!("({packages} packages)")))
        }
        Event::UsingLockfile => format!("{info} {}", paint(C_DIM, "using esy.lock.json, constraints unchanged")),
        Event::Fetching { name, version } => format!("{info} {} {name}@{version}", paint(C_CYAN, "fetching")),
        Event::Installed { fetched, total } => format!(
            "{info} {} {total} packages ({fetched} fetched)",
            paint(C_GREEN, "installed")
        ),
        Event::PruneSkipped { cause } => {
            format!("{} {} {cause}", paint(C_YELLOW, "warn"), paint(C_DIM, "store not pruned:"))
        }
        Event::ManifestUpdated { group, name, range } => {
            format!("{info} {} {name}@{range} to {group}", paint(C_GREEN, "saved"))
        }
        Event::Removed { group, name } => format!("{info} {} {name} from {group}", paint(C_RED, "removed")),
    }
}

impl Reporter for StderrReporter {
    fn report(&self, event: &Event) {
        eprintln!("{}", format_event(event));
    }
}
