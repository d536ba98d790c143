use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LookupError;
use crate::lookup::accumulator::{AccumulatedState, Outcome, PageAccumulator};
use crate::lookup::debounce::{DebounceInput, DebouncedTerms, Debouncer};
use crate::lookup::{LookupConfig, PageSource};
use crate::page::SearchTerm;

/// One open lookup surface (a dropdown, a statistics list).
///
/// Keystrokes go through [`LookupSession::input`]; each debounced term that
/// differs from the last one requested loads page 1. A newer term drops the
/// in-flight first-page request, which aborts it on the wire. Closing or
/// dropping the session cancels the pending debounce emission and any fetch
/// the driver has in flight.
pub struct LookupSession<S> {
    accumulator: Arc<PageAccumulator<S>>,
    input: DebounceInput,
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
}

impl<S> LookupSession<S>
where
    S: PageSource + 'static,
{
    pub fn open(source: S, config: LookupConfig) -> Result<Self, LookupError> {
        let accumulator = Arc::new(PageAccumulator::new(source, config.page_size)?);
        let cancel = CancellationToken::new();
        let (input, terms) = Debouncer::spawn_with_cancel(config.debounce, cancel.child_token());
        let driver = tokio::spawn(drive(accumulator.clone(), terms, cancel.clone()));
        Ok(Self {
            accumulator,
            input,
            cancel,
            driver: Some(driver),
        })
    }

    pub fn input(&self, raw: impl Into<String>) {
        self.input.push(raw);
    }

    pub async fn scroll_to_end(&self) -> Result<Outcome, LookupError> {
        self.accumulator.load_next_page().await
    }

    pub fn snapshot(&self) -> AccumulatedState {
        self.accumulator.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AccumulatedState> {
        self.accumulator.subscribe()
    }

    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }
}

impl<S> Drop for LookupSession<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.accumulator.abandon();
    }
}

async fn drive<S: PageSource>(
    accumulator: Arc<PageAccumulator<S>>,
    mut terms: DebouncedTerms,
    cancel: CancellationToken,
) {
    let mut requested: Option<SearchTerm> = None;
    let mut queued: Option<SearchTerm> = None;

    loop {
        let term = match queued.take() {
            Some(term) => term,
            None => tokio::select! {
                _ = cancel.cancelled() => return,
                term = terms.next() => match term {
                    Some(term) => term,
                    None => return,
                },
            },
        };

        if requested.as_ref() == Some(&term) {
            debug!(term = term.as_str(), "search term unchanged; keeping loaded pages");
            continue;
        }
        requested = Some(term.clone());

        let load = accumulator.load_first_page(term.clone());
        tokio::pin!(load);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = &mut load => {
                    if result.is_err() {
                        // Allow the same term to retry on its next emission.
                        requested = None;
                    }
                    break;
                }
                newer = terms.next() => match newer {
                    Some(newer) if newer == term => continue,
                    Some(newer) => {
                        debug!(
                            from = term.as_str(),
                            to = newer.as_str(),
                            "search term superseded; aborting first-page load"
                        );
                        queued = Some(newer);
                        break;
                    }
                    None => return,
                },
            }
        }
    }
}
