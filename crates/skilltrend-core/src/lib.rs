//! Core domain model for skilltrend: fetched job records, normalized postings,
//! the skill taxonomy and the keyword extractor.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod analytics;
pub mod config;
mod dates;
mod extract;
mod lenient;
mod taxonomy;

pub use config::{AppConfig, ConfigError};
pub use dates::{parse_posted_date, Clock, FixedClock, SystemClock};
pub use extract::SkillExtractor;
pub use taxonomy::{Category, Taxonomy, TaxonomyError};

pub const CRATE_NAME: &str = "skilltrend-core";

pub type CompanyId = i64;
pub type LocationId = i64;
pub type JobId = i64;
pub type SkillId = i64;

pub const DEFAULT_COMPANY: &str = "Unknown Company";
pub const DEFAULT_TITLE: &str = "No Title";
pub const DEFAULT_LOCATION: &str = "Unknown Location";
pub const DEFAULT_PAY: &str = "Not Disclosed";
pub const DEFAULT_DESCRIPTION: &str = "No Description";
pub const DEFAULT_EMPLOYMENT_TYPE: &str = "Unknown";
pub const DEFAULT_DATE_POSTED: &str = "1970-01-01";
pub const DEFAULT_JOB_PROVIDER: &str = "Unknown";
pub const DEFAULT_JOB_URL: &str = "#";

/// One provider entry from the upstream `jobProviders` list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProviderRef {
    #[serde(default, deserialize_with = "lenient::text")]
    pub job_provider: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub url: Option<String>,
}

/// Job record exactly as the listings API hands it over. Every field may be
/// absent, and a field of the wrong type never fails the record: scalars are
/// kept as text and anything else counts as missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub salary_range: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub employment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub date_posted: Option<String>,
    #[serde(default, deserialize_with = "lenient::providers")]
    pub job_providers: Option<Vec<JobProviderRef>>,
}

/// A fetched record after defaults are applied and the posted date is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub company: String,
    pub title: String,
    pub location: String,
    pub pay: String,
    pub description: String,
    pub employment_type: String,
    pub date_posted: Option<NaiveDate>,
    pub job_provider: String,
    pub job_url: String,
}

impl JobRecord {
    pub fn normalize(&self, clock: &dyn Clock) -> JobPosting {
        let raw_date = self.date_posted.as_deref().unwrap_or(DEFAULT_DATE_POSTED);
        let first_provider = self
            .job_providers
            .as_ref()
            .and_then(|providers| providers.first());

        JobPosting {
            company: or_default(&self.company, DEFAULT_COMPANY),
            title: or_default(&self.title, DEFAULT_TITLE),
            location: or_default(&self.location, DEFAULT_LOCATION),
            pay: or_default(&self.salary_range, DEFAULT_PAY),
            description: or_default(&self.description, DEFAULT_DESCRIPTION),
            employment_type: or_default(&self.employment_type, DEFAULT_EMPLOYMENT_TYPE),
            date_posted: parse_posted_date(raw_date, clock),
            job_provider: first_provider
                .and_then(|p| p.job_provider.clone())
                .unwrap_or_else(|| DEFAULT_JOB_PROVIDER.to_string()),
            job_url: first_provider
                .and_then(|p| p.url.clone())
                .unwrap_or_else(|| DEFAULT_JOB_URL.to_string()),
        }
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value.clone().unwrap_or_else(|| default.to_string())
}

/// Insert payload for the `job` table once company and location are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub company_id: CompanyId,
    pub location_id: Option<LocationId>,
    pub title: String,
    pub pay: String,
    pub description: String,
    pub employment_type: String,
    pub date_posted: Option<NaiveDate>,
    pub job_provider: String,
    pub job_url: String,
}

impl NewJob {
    pub fn from_posting(
        posting: &JobPosting,
        company_id: CompanyId,
        location_id: Option<LocationId>,
    ) -> Self {
        Self {
            company_id,
            location_id,
            title: posting.title.clone(),
            pay: posting.pay.clone(),
            description: posting.description.clone(),
            employment_type: posting.employment_type.clone(),
            date_posted: posting.date_posted,
            job_provider: posting.job_provider.clone(),
            job_url: posting.job_url.clone(),
        }
    }

    /// Dedup key shared by repeated fetches of the same posting.
    pub fn dedup_key(&self) -> JobKey<'_> {
        JobKey {
            title: &self.title,
            company_id: self.company_id,
            location_id: self.location_id,
            date_posted: self.date_posted,
            job_provider: &self.job_provider,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey<'a> {
    pub title: &'a str,
    pub company_id: CompanyId,
    pub location_id: Option<LocationId>,
    pub date_posted: Option<NaiveDate>,
    pub job_provider: &'a str,
}

/// A skill found in a description, tagged with its taxonomy category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SkillMatch {
    pub name: String,
    pub category: String,
}

impl SkillMatch {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

pub type SkillSet = BTreeSet<SkillMatch>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub category: String,
    pub demand_count: i64,
    pub last_updated: DateTime<Utc>,
}

/// Reporting row: `demand` counts distinct linked jobs, `total_demand` is the stored counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillStatistic {
    pub skill: String,
    pub category: String,
    pub demand: i64,
    pub total_demand: i64,
}
