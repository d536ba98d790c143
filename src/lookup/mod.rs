//! Incremental search-and-page loader: debounced terms feed a paged,
//! deduplicating accumulator whose state is protected by a stale-response
//! guard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LookupError;
use crate::page::{PageRequest, PageResult};

pub mod accumulator;
pub mod debounce;
pub mod guard;
pub mod session;

pub use accumulator::{AccumulatedState, Outcome, PageAccumulator};
pub use debounce::{DebounceInput, DebouncedTerms, Debouncer};
pub use guard::{Generation, StaleGuard};
pub use session::LookupSession;

const DEBOUNCE_ENV: &str = "EMIS_LOOKUP_DEBOUNCE_MS";
const PAGE_SIZE_ENV: &str = "EMIS_LOOKUP_PAGE_SIZE";
const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_PAGE_SIZE: usize = 20;

/// The list endpoint a loader pages through.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult, LookupError>;
}

#[async_trait]
impl<S> PageSource for Arc<S>
where
    S: PageSource + ?Sized,
{
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult, LookupError> {
        self.as_ref().fetch_page(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupConfig {
    pub debounce: Duration,
    pub page_size: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl LookupConfig {
    pub fn from_env() -> Result<Self, LookupError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars<F>(get: F) -> Result<Self, LookupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(raw) = read(DEBOUNCE_ENV) {
            let ms = raw.parse::<u64>().map_err(|_| {
                LookupError::InvalidArgument(format!(
                    "{DEBOUNCE_ENV} must be a whole number of milliseconds, got '{raw}'"
                ))
            })?;
            config.debounce = Duration::from_millis(ms);
        }

        if let Some(raw) = read(PAGE_SIZE_ENV) {
            config.page_size = match raw.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    return Err(LookupError::InvalidArgument(format!(
                        "{PAGE_SIZE_ENV} must be a positive integer, got '{raw}'"
                    )));
                }
            };
        }

        Ok(config)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_without_env() {
        let config = LookupConfig::from_vars(|_| None).unwrap();
        assert_eq!(config, LookupConfig::default());
        assert_eq!(config.debounce, Duration::from_millis(300));
    }

    #[test]
    fn config_reads_overrides() {
        let config = LookupConfig::from_vars(|key| match key {
            DEBOUNCE_ENV => Some(" 350 ".into()),
            PAGE_SIZE_ENV => Some("50".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.debounce, Duration::from_millis(350));
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn config_rejects_zero_page_size() {
        let err = LookupConfig::from_vars(|key| (key == PAGE_SIZE_ENV).then(|| "0".into()))
            .unwrap_err();
        assert!(matches!(err, LookupError::InvalidArgument(_)));
        assert!(err.to_string().contains(PAGE_SIZE_ENV));
    }

    #[test]
    fn config_rejects_non_numeric_debounce() {
        let err = LookupConfig::from_vars(|key| (key == DEBOUNCE_ENV).then(|| "fast".into()))
            .unwrap_err();
        assert!(err.to_string().contains(DEBOUNCE_ENV));
    }
}
