use crate::manifest::DependencyGroup;
use parking_lot::Mutex;

/// Progress notifications emitted by the core. Rendering them is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SolvingStarted,
    /// Emitted exactly once for every run of the resolver.
    SolvingDone { packages: usize },
    /// The stored resolution matched the manifest and was reused.
    UsingLockfile,
    Fetching { name: String, version: String },
    Installed { fetched: usize, total: usize },
    /// Stale store entries could not be removed; the install itself succeeded.
    PruneSkipped { cause: String },
    ManifestUpdated { group: DependencyGroup, name: String, range: String },
    Removed { group: DependencyGroup, name: String },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: &Event);
}

#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &Event) {}
}

/// Keeps every event in order; mostly useful to tests and embedders.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn solve_count(&self) -> usize {
        self.events.lock().iter().filter(|e| matches!(e, Event::SolvingDone { .. })).count()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
