//! Listings API client: bounded, retry-free pagination over the upstream job search.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use skilltrend_core::JobRecord;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "skilltrend-fetch";

pub const DEFAULT_MAX_REQUESTS: usize = 10;
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("decoding listings page: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Search parameters sent with every page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchQuery {
    pub query: String,
    pub location: String,
    pub employment_types: String,
    pub date_posted: String,
}

impl Default for FetchQuery {
    fn default() -> Self {
        Self {
            query: "software engineer OR software developer".to_string(),
            location: "England OR Scotland OR  Wales".to_string(),
            employment_types: "fulltime;intern".to_string(),
            date_posted: "month".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListingsPage {
    pub jobs: Vec<JobRecord>,
    pub next_page: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPage {
    #[serde(default)]
    jobs: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    next_page: Option<serde_json::Value>,
}

/// Decodes one response body entry by entry. A job that cannot be read as a
/// record is dropped with a warning instead of failing the page.
pub fn decode_page(body: &[u8]) -> Result<ListingsPage, FetchError> {
    let raw: RawPage = serde_json::from_slice(body)?;
    let entries = raw.jobs.unwrap_or_default();
    let mut jobs = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<JobRecord>(entry) {
            Ok(job) => jobs.push(job),
            Err(err) => warn!(index, error = %err, "skipping undecodable job entry"),
        }
    }
    let next_page = match raw.next_page {
        Some(serde_json::Value::String(token)) => Some(token),
        Some(serde_json::Value::Number(token)) => Some(token.to_string()),
        _ => None,
    };
    Ok(ListingsPage { jobs, next_page })
}

/// One page request against the listings API.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        query: &FetchQuery,
        next_page: Option<&str>,
    ) -> Result<ListingsPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ListingsClientConfig {
    pub api_key: String,
    pub api_host: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

#[derive(Debug)]
pub struct ListingsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ListingsClient {
    pub fn new(config: ListingsClientConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-rapidapi-key",
            HeaderValue::from_str(&config.api_key).context("invalid RAPIDAPI_KEY header value")?,
        );
        headers.insert(
            "x-rapidapi-host",
            HeaderValue::from_str(&config.api_host).context("invalid RAPIDAPI_HOST header value")?,
        );

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .default_headers(headers);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            endpoint: format!("https://{}/v2/list", config.api_host),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PageSource for ListingsClient {
    async fn fetch_page(
        &self,
        query: &FetchQuery,
        next_page: Option<&str>,
    ) -> Result<ListingsPage, FetchError> {
        let mut request = self.client.get(&self.endpoint).query(query);
        if let Some(next_page) = next_page {
            request = request.query(&[("nextPage", next_page)]);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        decode_page(&bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationLimits {
    pub max_requests: usize,
    pub delay: Duration,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    Exhausted,
    RequestCap,
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<JobRecord>,
    pub requests: usize,
    pub stopped: StopReason,
}

/// Walks `nextPage` links until the listing runs out, the request cap is hit,
/// or a request fails. Records gathered before a failure are kept.
pub async fn fetch_all(
    source: &dyn PageSource,
    query: &FetchQuery,
    limits: PaginationLimits,
) -> FetchOutcome {
    let span = info_span!("fetch_listings", max_requests = limits.max_requests);
    async move {
        let mut records = Vec::new();
        let mut next_page: Option<String> = None;
        let mut requests = 0usize;

        let stopped = loop {
            if requests >= limits.max_requests {
                break StopReason::RequestCap;
            }
            requests += 1;

            let page = match source.fetch_page(query, next_page.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(request = requests, error = %err, "error fetching jobs; keeping partial results");
                    break StopReason::Failed {
                        error: err.to_string(),
                    };
                }
            };

            let fetched = page.jobs.len();
            records.extend(page.jobs);
            info!(request = requests, fetched, total = records.len(), "fetched listings page");

            match page.next_page {
                Some(token) if !token.is_empty() => next_page = Some(token),
                _ => {
                    info!("no more pages available");
                    break StopReason::Exhausted;
                }
            }

            if requests < limits.max_requests && !limits.delay.is_zero() {
                tokio::time::sleep(limits.delay).await;
            }
        };

        FetchOutcome {
            records,
            requests,
            stopped,
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSource {
        pages: Mutex<Vec<Result<ListingsPage, FetchError>>>,
        seen_tokens: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        fn new(mut pages: Vec<Result<ListingsPage, FetchError>>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                seen_tokens: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _query: &FetchQuery,
            next_page: Option<&str>,
        ) -> Result<ListingsPage, FetchError> {
            self.seen_tokens
                .lock()
                .unwrap()
                .push(next_page.map(ToString::to_string));
            self.pages
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ListingsPage::default()))
        }
    }

    fn page(titles: &[&str], next: Option<&str>) -> Result<ListingsPage, FetchError> {
        Ok(ListingsPage {
            jobs: titles
                .iter()
                .map(|t| JobRecord {
                    title: Some(t.to_string()),
                    ..Default::default()
                })
                .collect(),
            next_page: next.map(ToString::to_string),
        })
    }

    fn limits(max_requests: usize) -> PaginationLimits {
        PaginationLimits {
            max_requests,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn follows_next_page_until_exhausted() {
        let source = ScriptedSource::new(vec![page(&["a", "b"], Some("p2")), page(&["c"], None)]);
        let outcome = fetch_all(&source, &FetchQuery::default(), limits(10)).await;

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.requests, 2);
        assert_eq!(outcome.stopped, StopReason::Exhausted);
        assert_eq!(
            *source.seen_tokens.lock().unwrap(),
            vec![None, Some("p2".to_string())]
        );
    }

    #[tokio::test]
    async fn stops_at_request_cap() {
        let source = ScriptedSource::new(vec![
            page(&["a"], Some("p2")),
            page(&["b"], Some("p3")),
            page(&["c"], Some("p4")),
        ]);
        let outcome = fetch_all(&source, &FetchQuery::default(), limits(2)).await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.requests, 2);
        assert_eq!(outcome.stopped, StopReason::RequestCap);
    }

    #[tokio::test]
    async fn failure_keeps_what_was_collected() {
        let source = ScriptedSource::new(vec![
            page(&["a", "b"], Some("p2")),
            Err(FetchError::HttpStatus {
                status: 429,
                body: "slow down".into(),
            }),
        ]);
        let outcome = fetch_all(&source, &FetchQuery::default(), limits(10)).await;

        assert_eq!(outcome.records.len(), 2);
        assert!(matches!(outcome.stopped, StopReason::Failed { ref error } if error.contains("429")));
    }

    #[tokio::test]
    async fn empty_next_page_token_ends_pagination() {
        let source = ScriptedSource::new(vec![page(&["a"], Some(""))]);
        let outcome = fetch_all(&source, &FetchQuery::default(), limits(10)).await;
        assert_eq!(outcome.requests, 1);
        assert_eq!(outcome.stopped, StopReason::Exhausted);
    }

    #[test]
    fn page_decodes_upstream_shape() {
        let page = decode_page(
            br#"{
                "jobs": [{"title": "Dev", "company": "Acme", "jobProviders": []}],
                "nextPage": "abc",
                "index": 0
            }"#,
        )
        .unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].company.as_deref(), Some("Acme"));
        assert_eq!(page.next_page.as_deref(), Some("abc"));
    }

    #[test]
    fn odd_entries_do_not_sink_the_page() {
        let page = decode_page(
            br#"{
                "jobs": [
                    {"title": "First", "salaryRange": 60000},
                    "not a job",
                    {"title": "Third", "description": null, "jobProviders": {"oops": true}}
                ],
                "nextPage": 2
            }"#,
        )
        .unwrap();
        let titles = page
            .jobs
            .iter()
            .map(|j| j.title.as_deref().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["First", "Third"]);
        assert_eq!(page.jobs[0].salary_range.as_deref(), Some("60000"));
        assert_eq!(page.jobs[1].job_providers, None);
        assert_eq!(page.next_page.as_deref(), Some("2"));
    }

    #[test]
    fn body_that_is_not_a_page_is_a_decode_error() {
        assert!(matches!(decode_page(b"<html>"), Err(FetchError::Decode(_))));
        let empty = decode_page(br#"{"jobs": null}"#).unwrap();
        assert!(empty.jobs.is_empty());
        assert_eq!(empty.next_page, None);
    }

    #[test]
    fn query_serializes_with_upstream_names() {
        let value = serde_json::to_value(FetchQuery::default()).unwrap();
        assert_eq!(value["employmentTypes"], "fulltime;intern");
        assert_eq!(value["datePosted"], "month");
    }

    #[test]
    fn client_targets_v2_list_endpoint() {
        let client = ListingsClient::new(ListingsClientConfig {
            api_key: "key".into(),
            api_host: "jobs.example.com".into(),
            timeout: Duration::from_secs(5),
            user_agent: None,
        })
        .unwrap();
        assert_eq!(client.endpoint(), "https://jobs.example.com/v2/list");
    }
}
