//! Ingestion run orchestration: fetch listings, reconcile each record, extract
//! and persist skills, and write a per-run report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use skilltrend_core::config::{self, AppConfig, ConfigError};
use skilltrend_core::{Clock, JobId, JobRecord, SkillExtractor, SystemClock};
use skilltrend_fetch::{
    fetch_all, FetchQuery, ListingsClient, ListingsClientConfig, PaginationLimits, StopReason,
};
use skilltrend_store::{JobStore, MemoryStore, PgStore, Reconciler, ResolveOutcome, SkipReason};
use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "skilltrend-sync";

/// Everything one ingestion run needs: the shared settings plus the listings API.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub app: AppConfig,
    pub api_key: String,
    pub api_host: String,
    pub max_requests: usize,
    pub request_delay: Duration,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub reports_dir: PathBuf,
    pub query: FetchQuery,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            app: AppConfig::from_lookup(&lookup)?,
            api_key: config::required(&lookup, "RAPIDAPI_KEY")?,
            api_host: config::required(&lookup, "RAPIDAPI_HOST")?,
            max_requests: config::parse_or(&lookup, "SKILLTREND_MAX_REQUESTS", 10)?,
            request_delay: Duration::from_secs(config::parse_or(
                &lookup,
                "SKILLTREND_REQUEST_DELAY_SECS",
                2,
            )?),
            http_timeout_secs: config::parse_or(&lookup, "SKILLTREND_HTTP_TIMEOUT_SECS", 20)?,
            user_agent: config::optional(&lookup, "SKILLTREND_USER_AGENT")
                .unwrap_or_else(|| "skilltrend-bot/0.1".to_string()),
            reports_dir: config::optional(&lookup, "SKILLTREND_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            query: FetchQuery::default(),
        })
    }

    pub fn pagination(&self) -> PaginationLimits {
        PaginationLimits {
            max_requests: self.max_requests,
            delay: self.request_delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reconcile,
    PersistSkills,
}

/// What happened to one fetched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Stored {
        title: String,
        job_id: JobId,
        created: bool,
        skills: Vec<String>,
        /// Job/skill links this record added; zero when every link already existed.
        new_links: usize,
    },
    Skipped {
        title: String,
        reason: SkipReason,
    },
    Failed {
        title: String,
        stage: Stage,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub stored: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skills_extracted: usize,
    pub skill_links: usize,
    pub dry_run: bool,
    pub fetch_stop: Option<StopReason>,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    fn from_outcomes(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcomes: Vec<RecordOutcome>,
    ) -> Self {
        let mut report = Self {
            run_id,
            started_at,
            finished_at,
            fetched: outcomes.len(),
            stored: 0,
            created: 0,
            skipped: 0,
            failed: 0,
            skills_extracted: 0,
            skill_links: 0,
            dry_run: false,
            fetch_stop: None,
            outcomes: Vec::new(),
        };
        for outcome in &outcomes {
            match outcome {
                RecordOutcome::Stored {
                    created,
                    skills,
                    new_links,
                    ..
                } => {
                    report.stored += 1;
                    report.created += usize::from(*created);
                    report.skills_extracted += skills.len();
                    report.skill_links += new_links;
                }
                RecordOutcome::Skipped { .. } => report.skipped += 1,
                RecordOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }

    pub fn summary_line(&self) -> String {
        format!(
            "run_id={} fetched={} stored={} created={} skipped={} failed={} skills_extracted={} skill_links={}",
            self.run_id,
            self.fetched,
            self.stored,
            self.created,
            self.skipped,
            self.failed,
            self.skills_extracted,
            self.skill_links
        )
    }
}

/// Runs reconcile, extract and persist for each record, one record at a time.
pub struct IngestPipeline {
    store: Arc<dyn JobStore>,
    extractor: SkillExtractor,
    clock: Arc<dyn Clock>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn JobStore>, extractor: SkillExtractor) -> Self {
        Self {
            store,
            extractor,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn ingest(&self, records: &[JobRecord]) -> BatchReport {
        let started_at = self.clock.now();
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest", %run_id, records = records.len());

        let outcomes = async {
            let mut outcomes = Vec::with_capacity(records.len());
            for record in records {
                outcomes.push(self.ingest_one(record).await);
            }
            outcomes
        }
        .instrument(span)
        .await;

        let report = BatchReport::from_outcomes(run_id, started_at, self.clock.now(), outcomes);
        info!(summary = %report.summary_line(), "ingestion finished");
        report
    }

    pub async fn ingest_one(&self, record: &JobRecord) -> RecordOutcome {
        let posting = record.normalize(self.clock.as_ref());
        let title = posting.title.clone();

        let (job_id, created) = match Reconciler::new(self.store.as_ref()).resolve(&posting).await
        {
            Ok(ResolveOutcome::Resolved { job_id, created }) => (job_id, created),
            Ok(ResolveOutcome::Skipped(reason)) => {
                return RecordOutcome::Skipped { title, reason };
            }
            Err(err) => {
                error!(title = %title, error = %err, "reconciliation failed");
                return RecordOutcome::Failed {
                    title,
                    stage: Stage::Reconcile,
                    error: err.to_string(),
                };
            }
        };

        let skills = self.extractor.extract(&posting.description);
        if skills.is_empty() {
            info!(title = %title, job_id, "no skills extracted");
        } else {
            info!(title = %title, job_id, count = skills.len(), "extracted skills");
        }

        let new_links = match self.store.persist_skills(job_id, &skills).await {
            Ok(new_links) => new_links,
            Err(err) => {
                error!(title = %title, job_id, error = %err, "persisting skills failed; rolled back");
                return RecordOutcome::Failed {
                    title,
                    stage: Stage::PersistSkills,
                    error: err.to_string(),
                };
            }
        };

        RecordOutcome::Stored {
            title,
            job_id,
            created,
            skills: skills.into_iter().map(|s| s.name).collect(),
            new_links,
        }
    }
}

/// Writes `<reports_dir>/<run_id>/ingest_report.json` and a short markdown brief.
pub async fn write_report(reports_dir: &Path, report: &BatchReport) -> Result<PathBuf> {
    let run_dir = reports_dir.join(report.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let json = serde_json::to_vec_pretty(report).context("serializing ingest report")?;
    let json_path = run_dir.join("ingest_report.json");
    fs::write(&json_path, json)
        .await
        .with_context(|| format!("writing {}", json_path.display()))?;

    let failures = report
        .outcomes
        .iter()
        .filter_map(|o| match o {
            RecordOutcome::Failed { title, stage, error } => {
                Some(format!("- {title} ({stage:?}): {error}"))
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    let brief = format!(
        "# Ingestion Run\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Dry run: {}\n- Fetched: {}\n- Stored: {} ({} new)\n- Skipped: {}\n- Failed: {}\n- Skills extracted: {}\n- New skill links: {}\n\n## Failures\n{}\n",
        report.run_id,
        report.started_at,
        report.finished_at,
        report.dry_run,
        report.fetched,
        report.stored,
        report.created,
        report.skipped,
        report.failed,
        report.skills_extracted,
        report.skill_links,
        if failures.is_empty() {
            "none".to_string()
        } else {
            failures.join("\n")
        }
    );
    let brief_path = run_dir.join("run_brief.md");
    fs::write(&brief_path, brief)
        .await
        .with_context(|| format!("writing {}", brief_path.display()))?;

    Ok(json_path)
}

/// One full run: fetch, ingest into Postgres (or memory when `dry_run`), write the report.
pub async fn run_sync_once(config: &SyncConfig, dry_run: bool) -> Result<BatchReport> {
    let taxonomy = config.app.load_taxonomy().context("loading taxonomy")?;
    let extractor = SkillExtractor::new(&taxonomy).context("compiling skill matchers")?;

    let store: Arc<dyn JobStore> = if dry_run {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            PgStore::from_config(&config.app)
                .await
                .context("connecting to database")?,
        )
    };

    let client = ListingsClient::new(ListingsClientConfig {
        api_key: config.api_key.clone(),
        api_host: config.api_host.clone(),
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
    })?;

    info!(endpoint = client.endpoint(), dry_run, "fetching jobs");
    let fetched = fetch_all(&client, &config.query, config.pagination()).await;
    if fetched.records.is_empty() {
        warn!(stopped = ?fetched.stopped, "no jobs found");
    } else {
        info!(count = fetched.records.len(), "fetched job postings; storing");
    }

    let pipeline = IngestPipeline::new(store, extractor);
    let mut report = pipeline.ingest(&fetched.records).await;
    report.dry_run = dry_run;
    report.fetch_stop = Some(fetched.stopped);

    let path = write_report(&config.reports_dir, &report).await?;
    info!(report = %path.display(), "wrote ingest report");
    Ok(report)
}

pub async fn run_sync_once_from_env(dry_run: bool) -> Result<BatchReport> {
    let config = SyncConfig::from_env()?;
    run_sync_once(&config, dry_run).await
}
