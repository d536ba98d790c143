use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request epoch captured when a fetch is issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Tags requests with a generation and rejects results from superseded ones.
///
/// Owned by a single accumulator. Every reset or term change calls
/// [`StaleGuard::advance`]; a result may only mutate state when the
/// generation it captured is still [`StaleGuard::current`] at resolution.
#[derive(Debug, Default)]
pub struct StaleGuard {
    current: AtomicU64,
}

impl StaleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::Acquire))
    }

    /// Starts a new epoch and returns it.
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}
