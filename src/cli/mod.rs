//! Command line surface: one-shot paged search and an interactive lookup
//! session driven from stdin.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::entities::Resource;
use crate::error::LookupError;
use crate::lookup::{AccumulatedState, LookupConfig, LookupSession, Outcome, PageAccumulator};
use crate::page::SearchTerm;
use crate::render;
use crate::sources::{EmisClient, ResourceSource};

const WATCH_MORE: &str = ":more";
const WATCH_QUIT: &str = ":quit";

#[derive(Parser, Debug)]
#[command(
    name = "emis-lookup",
    version,
    about = "Debounced, paged lookups against E-MIS list endpoints"
)]
pub struct Cli {
    /// Print JSON instead of markdown
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL (overrides EMIS_API_BASE)
    #[arg(long, global = true)]
    pub base: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search a resource and load one or more pages
    Search {
        resource: Resource,

        /// Search term
        #[arg(short, long, default_value = "")]
        query: String,

        /// Items per page (overrides EMIS_LOOKUP_PAGE_SIZE)
        #[arg(long)]
        page_size: Option<usize>,

        /// Number of pages to accumulate
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Interactive lookup: each stdin line is new search input, `:more` loads
    /// the next page, `:quit` exits
    Watch {
        resource: Resource,

        /// Items per page (overrides EMIS_LOOKUP_PAGE_SIZE)
        #[arg(long)]
        page_size: Option<usize>,

        /// Debounce window in milliseconds (overrides EMIS_LOOKUP_DEBOUNCE_MS)
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// List supported resources and their REST paths
    Resources,
}

fn lookup_config(
    page_size: Option<usize>,
    debounce_ms: Option<u64>,
) -> Result<LookupConfig, LookupError> {
    let mut config = LookupConfig::from_env()?;
    if let Some(page_size) = page_size {
        if page_size == 0 {
            return Err(LookupError::InvalidArgument(
                "--page-size must be at least 1".into(),
            ));
        }
        config.page_size = page_size;
    }
    if let Some(ms) = debounce_ms {
        config.debounce = Duration::from_millis(ms);
    }
    Ok(config)
}

fn emis_client(base: Option<&str>) -> Result<Arc<EmisClient>, LookupError> {
    let client = match base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(base) => EmisClient::with_base(base)?,
        None => EmisClient::new()?,
    };
    Ok(Arc::new(client))
}

fn render_state(
    resource: Resource,
    state: &AccumulatedState,
    json: bool,
    more_hint: &str,
) -> Result<String, LookupError> {
    if json {
        render::json::to_pretty(state)
    } else {
        render::markdown::lookup_markdown(resource, state, more_hint)
    }
}

async fn search(
    resource: Resource,
    query: &str,
    page_size: Option<usize>,
    pages: usize,
    base: Option<&str>,
    json: bool,
) -> Result<String, LookupError> {
    if pages == 0 {
        return Err(LookupError::InvalidArgument(
            "--pages must be at least 1".into(),
        ));
    }
    let config = lookup_config(page_size, None)?;
    let source = ResourceSource::new(emis_client(base)?, resource);
    let accumulator = PageAccumulator::new(source, config.page_size)?;

    accumulator.load_first_page(SearchTerm::new(query)).await?;
    for _ in 1..pages {
        if accumulator.load_next_page().await? == Outcome::Skipped {
            break;
        }
    }

    let state = accumulator.snapshot();
    let hint = format!("Use --pages {} for more.", state.current_page + 1);
    render_state(resource, &state, json, &hint)
}

/// Runs an interactive session until `:quit` or end of input, writing the
/// state to stdout after every settled change.
pub async fn run_watch(
    resource: Resource,
    page_size: Option<usize>,
    debounce_ms: Option<u64>,
    base: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = lookup_config(page_size, debounce_ms)?;
    let source = ResourceSource::new(emis_client(base)?, resource);
    let session = LookupSession::open(source, config)?;
    let mut updates = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    WATCH_QUIT => break,
                    WATCH_MORE => {
                        if let Err(err) = session.scroll_to_end().await {
                            debug!(error = %err, "next page failed");
                        }
                    }
                    _ => session.input(line.as_str()),
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state.is_loading {
                    continue;
                }
                let rendered = render_state(resource, &state, json, WATCH_MORE)?;
                out.write_all(rendered.as_bytes()).await?;
                out.write_all(b"\n").await?;
                out.flush().await?;
            }
        }
    }

    session.close().await;
    Ok(())
}

/// Runs a one-shot command and returns its rendered output.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    let base = cli.base.as_deref();
    match cli.command {
        Commands::Search {
            resource,
            query,
            page_size,
            pages,
        } => Ok(search(resource, &query, page_size, pages, base, cli.json).await?),
        Commands::Resources => {
            if cli.json {
                Ok(render::json::to_pretty(&Resource::ALL)?)
            } else {
                Ok(render::markdown::resources_markdown()?)
            }
        }
        Commands::Watch {
            resource,
            page_size,
            debounce_ms,
        } => {
            run_watch(resource, page_size, debounce_ms, base, cli.json).await?;
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn search_args_parse() {
        let cli = Cli::try_parse_from([
            "emis-lookup",
            "search",
            "persons",
            "-q",
            "ali",
            "--page-size",
            "5",
            "--pages",
            "3",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Search {
                resource,
                query,
                page_size,
                pages,
            } => {
                assert_eq!(resource, Resource::Persons);
                assert_eq!(query, "ali");
                assert_eq!(page_size, Some(5));
                assert_eq!(pages, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_resource_is_rejected() {
        assert!(Cli::try_parse_from(["emis-lookup", "search", "tanks"]).is_err());
    }

    #[test]
    fn zero_page_size_override_is_rejected() {
        let err = lookup_config(Some(0), None).unwrap_err();
        assert!(matches!(err, LookupError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn search_accumulates_requested_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ranks/"))
            .and(query_param("page", "1"))
            .and(query_param("search", "kap"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"results": [{"id": 1, "name": "Kapitan"}, {"id": 2, "name": "Kapral"}], "count": 3, "next": "p2"}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ranks/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"results": [{"id": 3, "name": "Kapitan-leytenant"}], "count": 3, "next": null}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let cli = Cli::try_parse_from([
            "emis-lookup",
            "search",
            "ranks",
            "-q",
            "kap",
            "--page-size",
            "2",
            "--pages",
            "5",
            "--base",
            uri.as_str(),
        ])
        .unwrap();

        let out = run(cli).await.unwrap();
        assert!(out.contains("| 1 | 1 | Kapitan |"));
        assert!(out.contains("| 3 | 3 | Kapitan-leytenant |"));
        assert!(out.contains("Showing 3 of 3 options (page 2)."));
    }

    #[tokio::test]
    async fn search_rejects_zero_pages() {
        let cli = Cli::try_parse_from([
            "emis-lookup",
            "search",
            "ranks",
            "--pages",
            "0",
            "--base",
            "http://127.0.0.1:9",
        ])
        .unwrap();
        let err = run(cli).await.unwrap_err();
        assert!(err.to_string().contains("--pages"));
    }

    #[tokio::test]
    async fn resources_lists_every_resource() {
        let cli = Cli::try_parse_from(["emis-lookup", "resources"]).unwrap();
        let out = run(cli).await.unwrap();
        for resource in Resource::ALL {
            assert!(out.contains(resource.path()), "{}", resource.path());
        }
    }
}
