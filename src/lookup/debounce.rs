use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::page::SearchTerm;

/// Trailing-edge debouncer running on its own task.
pub struct Debouncer;

impl Debouncer {
    pub fn spawn(delay: Duration) -> (DebounceInput, DebouncedTerms) {
        Self::spawn_with_cancel(delay, CancellationToken::new())
    }

    /// Like [`Debouncer::spawn`], but tears down when `cancel` fires.
    pub fn spawn_with_cancel(
        delay: Duration,
        cancel: CancellationToken,
    ) -> (DebounceInput, DebouncedTerms) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (term_tx, term_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(delay, raw_rx, term_tx, cancel.clone()));
        (
            DebounceInput { tx: raw_tx, cancel },
            DebouncedTerms {
                inner: UnboundedReceiverStream::new(term_rx),
            },
        )
    }
}

async fn run(
    delay: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<String>,
    term_tx: mpsc::UnboundedSender<SearchTerm>,
    cancel: CancellationToken,
) {
    let mut pending: Option<String> = None;
    let timer = sleep(delay);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            raw = raw_rx.recv() => match raw {
                Some(raw) => {
                    pending = Some(raw);
                    timer.as_mut().reset(Instant::now() + delay);
                }
                // Input dropped: the pending emission dies with it.
                None => break,
            },
            _ = &mut timer, if pending.is_some() => {
                let Some(raw) = pending.take() else { continue };
                let term = SearchTerm::new(&raw);
                trace!(term = term.as_str(), "debounced term emitted");
                if term_tx.send(term).is_err() {
                    break;
                }
            }
        }
    }
}

/// Raw, keystroke-rate side of a debouncer.
#[derive(Debug)]
pub struct DebounceInput {
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl DebounceInput {
    /// Replaces any pending value and restarts the delay window.
    pub fn push(&self, raw: impl Into<String>) {
        let _ = self.tx.send(raw.into());
    }

    /// Cancels the pending emission and stops the debouncer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Stream of debounced, trimmed search terms.
#[derive(Debug)]
pub struct DebouncedTerms {
    inner: UnboundedReceiverStream<SearchTerm>,
}

impl DebouncedTerms {
    pub async fn next(&mut self) -> Option<SearchTerm> {
        futures::StreamExt::next(&mut self.inner).await
    }
}

impl Stream for DebouncedTerms {
    type Item = SearchTerm;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const DELAY: Duration = Duration::from_millis(300);

    #[tokio::test(start_paused = true)]
    async fn rapid_inputs_emit_once_with_last_value() {
        let (input, mut terms) = Debouncer::spawn(DELAY);
        let start = Instant::now();

        for raw in ["a", "ab", "abc"] {
            input.push(raw);
            sleep(Duration::from_millis(100)).await;
        }

        let term = terms.next().await.expect("one emission");
        assert_eq!(term.as_str(), "abc");
        // Last push landed at t=200ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(510), "{elapsed:?}");

        assert!(timeout(Duration::from_secs(2), terms.next()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn emitted_terms_are_trimmed() {
        let (input, mut terms) = Debouncer::spawn(DELAY);
        input.push("  Kapitan  ");
        assert_eq!(terms.next().await.unwrap().as_str(), "Kapitan");
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_emit_separately() {
        let (input, mut terms) = Debouncer::spawn(DELAY);
        input.push("lt");
        sleep(Duration::from_millis(400)).await;
        input.push("maj");

        assert_eq!(terms.next().await.unwrap().as_str(), "lt");
        assert_eq!(terms.next().await.unwrap().as_str(), "maj");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_input_discards_pending_emission() {
        let (input, mut terms) = Debouncer::spawn(DELAY);
        input.push("abc");
        drop(input);
        assert_eq!(terms.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_emission() {
        let (input, mut terms) = Debouncer::spawn(DELAY);
        input.push("abc");
        sleep(Duration::from_millis(100)).await;
        input.cancel();
        assert_eq!(terms.next().await, None);
    }
}
