//! Relational persistence for skilltrend: idempotent find-or-create of
//! companies, locations and jobs, skill demand counters and statistics.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use skilltrend_core::analytics::{DailyPostings, ProjectionRow, WeeklyGrowth, WeeklyShare};
use skilltrend_core::{ConfigError, JobId, JobPosting, NewJob, Skill, SkillSet, SkillStatistic};
use thiserror::Error;
use tracing::{info, warn};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

pub const CRATE_NAME: &str = "skilltrend-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Backend(String),
}

/// A row identified by a unique key. Each variant maps to one table and its
/// unique constraint.
#[derive(Debug, Clone, Copy)]
pub enum UniqueRow<'a> {
    Company(&'a str),
    Location(&'a str),
    Job(&'a NewJob),
}

impl UniqueRow<'_> {
    pub fn table(&self) -> &'static str {
        match self {
            UniqueRow::Company(_) => "company",
            UniqueRow::Location(_) => "location",
            UniqueRow::Job(_) => "job",
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert the row unless its unique key already exists. Returns the new id,
    /// or `None` when the key was taken.
    async fn insert_ignoring_conflict(&self, row: UniqueRow<'_>) -> Result<Option<i64>, StoreError>;

    async fn find_by_unique_key(&self, row: UniqueRow<'_>) -> Result<Option<i64>, StoreError>;

    /// Upsert every skill (bumping its demand counter) and link it to the job,
    /// all in one unit. Nothing is kept if any statement fails. Returns how many
    /// job/skill links were new; links that already existed are not counted.
    async fn persist_skills(&self, job_id: JobId, skills: &SkillSet) -> Result<usize, StoreError>;

    /// Per-skill demand, most linked jobs first.
    async fn skill_statistics(&self) -> Result<Vec<SkillStatistic>, StoreError>;

    /// Skills filed under `category`, highest demand counter first.
    async fn skills_by_category(&self, category: &str) -> Result<Vec<Skill>, StoreError>;

    /// Distinct dated jobs per posting day that mention any skill in `category`.
    async fn category_growth(&self, category: &str) -> Result<Vec<DailyPostings>, StoreError>;

    /// Distinct dated jobs per week mentioning `skill`, with week-over-week growth.
    async fn skill_growth(&self, skill: &str) -> Result<Vec<WeeklyGrowth>, StoreError>;

    /// Weekly share of dated jobs that mention `skill` (name matched case-insensitively).
    async fn skill_share(&self, skill: &str) -> Result<Vec<WeeklyShare>, StoreError>;

    /// Next-week projection per skill from postings dated on or after `since`.
    async fn projected_growth(
        &self,
        category: Option<&str>,
        since: NaiveDate,
    ) -> Result<Vec<ProjectionRow>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created(i64),
    Existing(i64),
    Missing,
}

impl Resolution {
    pub fn id(self) -> Option<i64> {
        match self {
            Resolution::Created(id) | Resolution::Existing(id) => Some(id),
            Resolution::Missing => None,
        }
    }
}

/// Conflict-ignoring insert, then a lookup by the same key if another writer got there first.
pub async fn insert_or_find(
    store: &dyn JobStore,
    row: UniqueRow<'_>,
) -> Result<Resolution, StoreError> {
    if let Some(id) = store.insert_ignoring_conflict(row).await? {
        return Ok(Resolution::Created(id));
    }
    Ok(match store.find_by_unique_key(row).await? {
        Some(id) => Resolution::Existing(id),
        None => Resolution::Missing,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    CompanyUnresolved { company: String },
    JobUnresolved { title: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::CompanyUnresolved { company } => {
                write!(f, "no company found or inserted for {company:?}")
            }
            SkipReason::JobUnresolved { title } => {
                write!(f, "no matching job found for {title:?}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved { job_id: JobId, created: bool },
    Skipped(SkipReason),
}

/// Resolves company, location and job for a posting, creating whatever is missing.
pub struct Reconciler<'a> {
    store: &'a dyn JobStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn JobStore) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, posting: &JobPosting) -> Result<ResolveOutcome, StoreError> {
        let company = insert_or_find(self.store, UniqueRow::Company(&posting.company)).await?;
        let Some(company_id) = company.id() else {
            warn!(company = %posting.company, title = %posting.title, "company unresolved; skipping job");
            return Ok(ResolveOutcome::Skipped(SkipReason::CompanyUnresolved {
                company: posting.company.clone(),
            }));
        };

        let location_id = insert_or_find(self.store, UniqueRow::Location(&posting.location))
            .await?
            .id();
        if location_id.is_none() {
            warn!(location = %posting.location, title = %posting.title, "location unresolved; storing job without one");
        }

        let job = NewJob::from_posting(posting, company_id, location_id);
        match insert_or_find(self.store, UniqueRow::Job(&job)).await? {
            Resolution::Created(job_id) => {
                info!(job_id, title = %job.title, "inserted new job");
                Ok(ResolveOutcome::Resolved { job_id, created: true })
            }
            Resolution::Existing(job_id) => {
                info!(job_id, title = %job.title, "found existing job");
                Ok(ResolveOutcome::Resolved { job_id, created: false })
            }
            Resolution::Missing => {
                warn!(title = %job.title, "no matching job found; skipping skill extraction");
                Ok(ResolveOutcome::Skipped(SkipReason::JobUnresolved {
                    title: job.title.clone(),
                }))
            }
        }
    }
}
