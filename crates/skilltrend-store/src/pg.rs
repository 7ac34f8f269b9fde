use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use skilltrend_core::analytics::{
    self, DailyPostings, ProjectionRow, WeeklyCount, WeeklyGrowth, WeeklyShare,
};
use skilltrend_core::{AppConfig, JobId, Skill, SkillSet, SkillStatistic};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;

use crate::{JobStore, StoreError, UniqueRow};

const COMPANY_INSERT: &str = r#"
    INSERT INTO company (name)
    VALUES ($1)
    ON CONFLICT (name) DO NOTHING
    RETURNING id
"#;

const COMPANY_SELECT: &str = "SELECT id FROM company WHERE name = $1";

const LOCATION_INSERT: &str = r#"
    INSERT INTO location (city)
    VALUES ($1)
    ON CONFLICT (city) DO NOTHING
    RETURNING id
"#;

const LOCATION_SELECT: &str = "SELECT id FROM location WHERE city = $1";

const JOB_INSERT: &str = r#"
    INSERT INTO job (
        company_id,
        location_id,
        title,
        pay,
        description,
        employment_type,
        date_posted,
        job_provider,
        job_url
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (title, company_id, location_id, date_posted, job_provider) DO NOTHING
    RETURNING id
"#;

const JOB_SELECT: &str = r#"
    SELECT id
      FROM job
     WHERE title = $1
       AND company_id = $2
       AND location_id IS NOT DISTINCT FROM $3
       AND date_posted IS NOT DISTINCT FROM $4
       AND job_provider = $5
"#;

const SKILL_UPSERT: &str = r#"
    INSERT INTO skill (name, category, demand_count, last_updated)
    VALUES ($1, $2, 1, NOW())
    ON CONFLICT (name) DO UPDATE SET
        category = EXCLUDED.category,
        demand_count = skill.demand_count + 1,
        last_updated = NOW()
    RETURNING id
"#;

const JOB_SKILL_INSERT: &str = r#"
    INSERT INTO job_skill (job_id, skill_id)
    VALUES ($1, $2)
    ON CONFLICT DO NOTHING
"#;

const SKILL_STATISTICS: &str = r#"
    SELECT s.name AS skill,
           s.category,
           COUNT(js.job_id) AS demand,
           s.demand_count AS total_demand
      FROM skill s
      LEFT JOIN job_skill js ON js.skill_id = s.id
     GROUP BY s.id, s.name, s.category, s.demand_count
     ORDER BY demand DESC, s.name ASC
"#;

const SKILLS_BY_CATEGORY: &str = r#"
    SELECT id, name, category, demand_count, last_updated
      FROM skill
     WHERE category = $1
     ORDER BY demand_count DESC, name ASC
"#;

const CATEGORY_DAILY_POSTINGS: &str = r#"
    SELECT j.date_posted AS day,
           COUNT(DISTINCT j.id) AS postings
      FROM job j
      JOIN job_skill js ON js.job_id = j.id
      JOIN skill s ON s.id = js.skill_id
     WHERE s.category = $1
       AND j.date_posted IS NOT NULL
     GROUP BY j.date_posted
     ORDER BY j.date_posted
"#;

const SKILL_WEEKLY_POSTINGS: &str = r#"
    SELECT DATE_TRUNC('week', j.date_posted::timestamp)::date AS week_start,
           COUNT(DISTINCT j.id) AS postings
      FROM job j
      JOIN job_skill js ON js.job_id = j.id
      JOIN skill s ON s.id = js.skill_id
     WHERE s.name = $1
       AND j.date_posted IS NOT NULL
     GROUP BY 1
     ORDER BY 1
"#;

const SKILL_WEEKLY_SHARE: &str = r#"
    WITH matching AS (
        SELECT DATE_TRUNC('week', j.date_posted::timestamp)::date AS week_start,
               COUNT(DISTINCT j.id) AS skill_jobs
          FROM job j
          JOIN job_skill js ON js.job_id = j.id
          JOIN skill s ON s.id = js.skill_id
         WHERE LOWER(s.name) = LOWER($1)
           AND j.date_posted IS NOT NULL
         GROUP BY 1
    ),
    totals AS (
        SELECT DATE_TRUNC('week', j.date_posted::timestamp)::date AS week_start,
               COUNT(DISTINCT j.id) AS total_jobs
          FROM job j
         WHERE j.date_posted IS NOT NULL
         GROUP BY 1
    )
    SELECT week_start, matching.skill_jobs, totals.total_jobs
      FROM matching
      JOIN totals USING (week_start)
     ORDER BY week_start
"#;

const WEEKLY_POSTINGS_BY_SKILL: &str = r#"
    SELECT s.name AS skill,
           s.category,
           DATE_TRUNC('week', j.date_posted::timestamp)::date AS week_start,
           COUNT(DISTINCT j.id) AS postings
      FROM job j
      JOIN job_skill js ON js.job_id = j.id
      JOIN skill s ON s.id = js.skill_id
     WHERE j.date_posted IS NOT NULL
       AND j.date_posted >= $1
       AND ($2::text IS NULL OR s.category = $2)
     GROUP BY s.id, s.name, s.category, 3
     ORDER BY s.name, 3
"#;

/// Postgres-backed store. Company, location and job writes autocommit one by one;
/// only `persist_skills` runs inside a transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        Self::connect(config.database_url()?).await
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert_ignoring_conflict(&self, row: UniqueRow<'_>) -> Result<Option<i64>, StoreError> {
        let id = match row {
            UniqueRow::Company(name) => {
                sqlx::query_scalar::<_, i64>(COMPANY_INSERT)
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UniqueRow::Location(city) => {
                sqlx::query_scalar::<_, i64>(LOCATION_INSERT)
                    .bind(city)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UniqueRow::Job(job) => {
                sqlx::query_scalar::<_, i64>(JOB_INSERT)
                    .bind(job.company_id)
                    .bind(job.location_id)
                    .bind(&job.title)
                    .bind(&job.pay)
                    .bind(&job.description)
                    .bind(&job.employment_type)
                    .bind(job.date_posted)
                    .bind(&job.job_provider)
                    .bind(&job.job_url)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        debug!(table = row.table(), inserted = id.is_some(), "conflict-ignoring insert");
        Ok(id)
    }

    async fn find_by_unique_key(&self, row: UniqueRow<'_>) -> Result<Option<i64>, StoreError> {
        let id = match row {
            UniqueRow::Company(name) => {
                sqlx::query_scalar::<_, i64>(COMPANY_SELECT)
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UniqueRow::Location(city) => {
                sqlx::query_scalar::<_, i64>(LOCATION_SELECT)
                    .bind(city)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UniqueRow::Job(job) => {
                let key = job.dedup_key();
                sqlx::query_scalar::<_, i64>(JOB_SELECT)
                    .bind(key.title)
                    .bind(key.company_id)
                    .bind(key.location_id)
                    .bind(key.date_posted)
                    .bind(key.job_provider)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(id)
    }

    async fn persist_skills(&self, job_id: JobId, skills: &SkillSet) -> Result<usize, StoreError> {
        // Dropping `tx` on an early return rolls the whole set back.
        let mut tx = self.pool.begin().await?;
        let mut linked = 0u64;
        for skill in skills {
            let skill_id: i64 = sqlx::query_scalar(SKILL_UPSERT)
                .bind(&skill.name)
                .bind(&skill.category)
                .fetch_one(&mut *tx)
                .await?;
            linked += sqlx::query(JOB_SKILL_INSERT)
                .bind(job_id)
                .bind(skill_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(linked as usize)
    }

    async fn skill_statistics(&self) -> Result<Vec<SkillStatistic>, StoreError> {
        let rows = sqlx::query(SKILL_STATISTICS).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SkillStatistic {
                skill: row.try_get("skill")?,
                category: row.try_get("category")?,
                demand: row.try_get("demand")?,
                total_demand: row.try_get("total_demand")?,
            });
        }
        Ok(out)
    }

    async fn skills_by_category(&self, category: &str) -> Result<Vec<Skill>, StoreError> {
        let rows = sqlx::query(SKILLS_BY_CATEGORY)
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Skill {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                category: row.try_get("category")?,
                demand_count: row.try_get("demand_count")?,
                last_updated: row.try_get("last_updated")?,
            });
        }
        Ok(out)
    }

    async fn category_growth(&self, category: &str) -> Result<Vec<DailyPostings>, StoreError> {
        let rows = sqlx::query(CATEGORY_DAILY_POSTINGS)
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(DailyPostings {
                date: row.try_get("day")?,
                value: row.try_get("postings")?,
            });
        }
        Ok(out)
    }

    async fn skill_growth(&self, skill: &str) -> Result<Vec<WeeklyGrowth>, StoreError> {
        let rows = sqlx::query(SKILL_WEEKLY_POSTINGS)
            .bind(skill)
            .fetch_all(&self.pool)
            .await?;
        let weeks = rows.iter().map(weekly_count).collect::<Result<Vec<_>, _>>()?;
        Ok(analytics::weekly_growth(&weeks))
    }

    async fn skill_share(&self, skill: &str) -> Result<Vec<WeeklyShare>, StoreError> {
        let rows = sqlx::query(SKILL_WEEKLY_SHARE)
            .bind(skill.trim())
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(WeeklyShare {
                date: row.try_get("week_start")?,
                percentage: analytics::share_percentage(
                    row.try_get("skill_jobs")?,
                    row.try_get("total_jobs")?,
                ),
            });
        }
        Ok(out)
    }

    async fn projected_growth(
        &self,
        category: Option<&str>,
        since: NaiveDate,
    ) -> Result<Vec<ProjectionRow>, StoreError> {
        let rows = sqlx::query(WEEKLY_POSTINGS_BY_SKILL)
            .bind(since)
            .bind(category)
            .fetch_all(&self.pool)
            .await?;
        let mut series: BTreeMap<(String, String), Vec<WeeklyCount>> = BTreeMap::new();
        for row in &rows {
            series
                .entry((row.try_get("skill")?, row.try_get("category")?))
                .or_default()
                .push(weekly_count(row)?);
        }
        let mut out = series
            .iter()
            .filter_map(|((skill, category), weeks)| analytics::project(skill, category, weeks))
            .collect::<Vec<_>>();
        analytics::sort_projections(&mut out);
        Ok(out)
    }
}

fn weekly_count(row: &PgRow) -> Result<WeeklyCount, sqlx::Error> {
    Ok(WeeklyCount {
        week_start: row.try_get("week_start")?,
        postings: row.try_get("postings")?,
    })
}
