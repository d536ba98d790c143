use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::LookupError;
use crate::lookup::PageSource;
use crate::lookup::guard::{Generation, StaleGuard};
use crate::page::{LookupOption, PageRequest, PageResult, SearchTerm};

/// Observable loader state. `options` never holds two entries with one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccumulatedState {
    /// Term the loaded pages belong to.
    pub term: SearchTerm,
    pub options: Vec<LookupOption>,
    /// Last page merged; 0 before the first accepted load.
    pub current_page: usize,
    pub page_size: usize,
    pub total: Option<usize>,
    pub has_more: bool,
    pub is_loading: bool,
    pub generation: Generation,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The page was merged. `added` counts keys not seen before.
    Applied { added: usize, total_options: usize },
    /// A newer request superseded this one; nothing changed.
    Stale,
    /// Already loading, or nothing left to load. No fetch was issued.
    Skipped,
}

#[derive(Debug, Default)]
struct Inner {
    state: AccumulatedState,
    index: HashMap<String, usize>,
}

impl Inner {
    /// Dedup-by-key merge: known keys are overwritten in place, new keys are
    /// appended.
    fn merge(&mut self, items: Vec<LookupOption>) -> usize {
        let mut added = 0;
        for item in items {
            match self.index.get(&item.key) {
                Some(&pos) => self.state.options[pos] = item,
                None => {
                    self.index.insert(item.key.clone(), self.state.options.len());
                    self.state.options.push(item);
                    added += 1;
                }
            }
        }
        added
    }

    fn clear_options(&mut self) {
        self.state.options.clear();
        self.index.clear();
    }

    fn accept(&mut self, page: PageResult) -> Outcome {
        let added = self.merge(page.items);
        self.state.current_page = page.requested_page;
        self.state.total = page.total;
        self.state.has_more = page.has_more;
        self.state.last_error = None;
        Outcome::Applied {
            added,
            total_options: self.state.options.len(),
        }
    }
}

/// Paged, deduplicated option list for one UI surface.
///
/// Methods take `&self` so one accumulator can be shared (behind an `Arc`)
/// between a search driver and a scroll handler. The state lock is never held
/// across a fetch.
pub struct PageAccumulator<S> {
    source: S,
    page_size: usize,
    guard: StaleGuard,
    inner: Mutex<Inner>,
    updates: watch::Sender<AccumulatedState>,
}

impl<S> PageAccumulator<S> {
    pub fn new(source: S, page_size: usize) -> Result<Self, LookupError> {
        if page_size == 0 {
            return Err(LookupError::InvalidArgument(
                "--page-size must be at least 1".into(),
            ));
        }
        let state = AccumulatedState {
            page_size,
            ..AccumulatedState::default()
        };
        let (updates, _) = watch::channel(state.clone());
        Ok(Self {
            source,
            page_size,
            guard: StaleGuard::new(),
            inner: Mutex::new(Inner {
                state,
                index: HashMap::new(),
            }),
            updates,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.state.clone());
    }

    pub fn snapshot(&self) -> AccumulatedState {
        self.lock().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AccumulatedState> {
        self.updates.subscribe()
    }

    /// Clears everything and invalidates any request in flight.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = self.guard.advance();
        inner.clear_options();
        inner.state = AccumulatedState {
            page_size: self.page_size,
            generation,
            ..AccumulatedState::default()
        };
        self.publish(&inner);
    }

    /// Gives up on the fetch in flight, if any. The loaded options stay and
    /// the late response is discarded as stale.
    pub fn abandon(&self) {
        let mut inner = self.lock();
        if !inner.state.is_loading {
            return;
        }
        inner.state.generation = self.guard.advance();
        inner.state.is_loading = false;
        debug!(term = inner.state.term.as_str(), "in-flight page fetch abandoned");
        self.publish(&inner);
    }
}

impl<S: PageSource> PageAccumulator<S> {
    /// Starts a new epoch and loads page 1 for `term`.
    ///
    /// Previously loaded options stay visible until the new page is accepted;
    /// a failed load leaves them untouched.
    pub async fn load_first_page(&self, term: SearchTerm) -> Result<Outcome, LookupError> {
        let request = PageRequest::new(1, self.page_size, term)?;
        let generation = {
            let mut inner = self.lock();
            let generation = self.guard.advance();
            inner.state.generation = generation;
            inner.state.is_loading = true;
            self.publish(&inner);
            generation
        };

        let result = self.source.fetch_page(&request).await;
        self.resolve(&request, generation, result, |inner, page| {
            inner.clear_options();
            inner.state.term = request.term().clone();
            inner.accept(page)
        })
    }

    /// Loads the page after `current_page` for the loaded term.
    ///
    /// Returns [`Outcome::Skipped`] without fetching while another fetch is in
    /// flight or when the last page has been reached.
    pub async fn load_next_page(&self) -> Result<Outcome, LookupError> {
        let (request, generation) = {
            let mut inner = self.lock();
            if inner.state.is_loading {
                debug!("next page skipped: fetch already in flight");
                return Ok(Outcome::Skipped);
            }
            if !inner.state.has_more {
                debug!(page = inner.state.current_page, "next page skipped: no more pages");
                return Ok(Outcome::Skipped);
            }
            let request = PageRequest::new(
                inner.state.current_page + 1,
                self.page_size,
                inner.state.term.clone(),
            )?;
            inner.state.is_loading = true;
            self.publish(&inner);
            (request, self.guard.current())
        };

        let result = self.source.fetch_page(&request).await;
        self.resolve(&request, generation, result, Inner::accept)
    }

    fn resolve<F>(
        &self,
        request: &PageRequest,
        generation: Generation,
        result: Result<PageResult, LookupError>,
        apply: F,
    ) -> Result<Outcome, LookupError>
    where
        F: FnOnce(&mut Inner, PageResult) -> Outcome,
    {
        let mut inner = self.lock();
        if !self.guard.is_current(generation) {
            debug!(
                term = request.term().as_str(),
                page = request.page(),
                generation = generation.get(),
                current = self.guard.current().get(),
                "discarding stale page response"
            );
            return Ok(Outcome::Stale);
        }

        inner.state.is_loading = false;
        let outcome = match result {
            Ok(page) => Ok(apply(&mut *inner, page)),
            Err(err) => {
                warn!(
                    term = request.term().as_str(),
                    page = request.page(),
                    error = %err,
                    "page fetch failed"
                );
                inner.state.last_error = Some(err.to_string());
                Err(err)
            }
        };
        self.publish(&inner);
        outcome
    }
}
