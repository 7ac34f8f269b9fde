use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use skilltrend_core::analytics::{
    self, DailyPostings, ProjectionRow, WeeklyCount, WeeklyGrowth, WeeklyShare,
};
use skilltrend_core::{JobId, NewJob, Skill, SkillId, SkillSet, SkillStatistic};
use tokio::sync::Mutex;

use crate::{JobStore, StoreError, UniqueRow};

#[derive(Debug, Default)]
struct MemoryState {
    companies: BTreeMap<String, i64>,
    locations: BTreeMap<String, i64>,
    jobs: BTreeMap<JobId, NewJob>,
    skills: BTreeMap<String, Skill>,
    links: BTreeSet<(JobId, SkillId)>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn find(&self, row: UniqueRow<'_>) -> Option<i64> {
        match row {
            UniqueRow::Company(name) => self.companies.get(name).copied(),
            UniqueRow::Location(city) => self.locations.get(city).copied(),
            UniqueRow::Job(job) => {
                let key = job.dedup_key();
                self.jobs
                    .iter()
                    .find(|(_, stored)| stored.dedup_key() == key)
                    .map(|(id, _)| *id)
            }
        }
    }

    /// Dated jobs linked to any skill accepted by `keep`, as (job, skill, date).
    fn dated_links<'s>(
        &'s self,
        keep: impl Fn(&Skill) -> bool + 's,
    ) -> impl Iterator<Item = (JobId, &'s Skill, NaiveDate)> + 's {
        let by_id: BTreeMap<SkillId, &Skill> =
            self.skills.values().map(|skill| (skill.id, skill)).collect();
        self.links.iter().filter_map(move |(job_id, skill_id)| {
            let skill = by_id.get(skill_id).copied().filter(|s| keep(s))?;
            let date = self.jobs.get(job_id)?.date_posted?;
            Some((*job_id, skill, date))
        })
    }
}

/// Distinct jobs per bucket, ascending by bucket.
fn count_distinct<K: Ord>(pairs: impl Iterator<Item = (K, JobId)>) -> BTreeMap<K, i64> {
    let mut seen: BTreeMap<K, BTreeSet<JobId>> = BTreeMap::new();
    for (key, job_id) in pairs {
        seen.entry(key).or_default().insert(job_id);
    }
    seen.into_iter()
        .map(|(key, jobs)| (key, jobs.len() as i64))
        .collect()
}

fn weekly_counts(counts: BTreeMap<NaiveDate, i64>) -> Vec<WeeklyCount> {
    counts
        .into_iter()
        .map(|(week_start, postings)| WeeklyCount {
            week_start,
            postings,
        })
        .collect()
}

/// In-process store with the same conflict semantics as [`crate::PgStore`].
/// Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn company_count(&self) -> usize {
        self.state.lock().await.companies.len()
    }

    pub async fn location_count(&self) -> usize {
        self.state.lock().await.locations.len()
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn job(&self, id: JobId) -> Option<NewJob> {
        self.state.lock().await.jobs.get(&id).cloned()
    }

    pub async fn skill(&self, name: &str) -> Option<Skill> {
        self.state.lock().await.skills.get(name).cloned()
    }

    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_ignoring_conflict(&self, row: UniqueRow<'_>) -> Result<Option<i64>, StoreError> {
        let mut state = self.state.lock().await;
        if state.find(row).is_some() {
            return Ok(None);
        }
        let id = state.next_id();
        match row {
            UniqueRow::Company(name) => {
                state.companies.insert(name.to_string(), id);
            }
            UniqueRow::Location(city) => {
                state.locations.insert(city.to_string(), id);
            }
            UniqueRow::Job(job) => {
                state.jobs.insert(id, job.clone());
            }
        }
        Ok(Some(id))
    }

    async fn find_by_unique_key(&self, row: UniqueRow<'_>) -> Result<Option<i64>, StoreError> {
        Ok(self.state.lock().await.find(row))
    }

    async fn persist_skills(&self, job_id: JobId, skills: &SkillSet) -> Result<usize, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::Backend(format!("job {job_id} does not exist")));
        }
        let now = Utc::now();
        let mut linked = 0;
        for found in skills {
            let skill_id = match state.skills.get_mut(&found.name) {
                Some(skill) => {
                    skill.category = found.category.clone();
                    skill.demand_count += 1;
                    skill.last_updated = now;
                    skill.id
                }
                None => {
                    let id = state.next_id();
                    state.skills.insert(
                        found.name.clone(),
                        Skill {
                            id,
                            name: found.name.clone(),
                            category: found.category.clone(),
                            demand_count: 1,
                            last_updated: now,
                        },
                    );
                    id
                }
            };
            if state.links.insert((job_id, skill_id)) {
                linked += 1;
            }
        }
        Ok(linked)
    }

    async fn skill_statistics(&self) -> Result<Vec<SkillStatistic>, StoreError> {
        let state = self.state.lock().await;
        let mut out = state
            .skills
            .values()
            .map(|skill| SkillStatistic {
                skill: skill.name.clone(),
                category: skill.category.clone(),
                demand: state
                    .links
                    .iter()
                    .filter(|(_, skill_id)| *skill_id == skill.id)
                    .count() as i64,
                total_demand: skill.demand_count,
            })
            .collect::<Vec<_>>();
        out.sort_by(|a, b| b.demand.cmp(&a.demand).then_with(|| a.skill.cmp(&b.skill)));
        Ok(out)
    }

    async fn skills_by_category(&self, category: &str) -> Result<Vec<Skill>, StoreError> {
        let state = self.state.lock().await;
        let mut out = state
            .skills
            .values()
            .filter(|skill| skill.category == category)
            .cloned()
            .collect::<Vec<_>>();
        out.sort_by(|a, b| {
            b.demand_count
                .cmp(&a.demand_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(out)
    }

    async fn category_growth(&self, category: &str) -> Result<Vec<DailyPostings>, StoreError> {
        let state = self.state.lock().await;
        let days = count_distinct(
            state
                .dated_links(|skill| skill.category == category)
                .map(|(job_id, _, date)| (date, job_id)),
        );
        Ok(days
            .into_iter()
            .map(|(date, value)| DailyPostings { date, value })
            .collect())
    }

    async fn skill_growth(&self, skill: &str) -> Result<Vec<WeeklyGrowth>, StoreError> {
        let state = self.state.lock().await;
        let weeks = count_distinct(
            state
                .dated_links(|s| s.name == skill)
                .map(|(job_id, _, date)| (analytics::week_start(date), job_id)),
        );
        Ok(analytics::weekly_growth(&weekly_counts(weeks)))
    }

    async fn skill_share(&self, skill: &str) -> Result<Vec<WeeklyShare>, StoreError> {
        let wanted = skill.trim().to_lowercase();
        let state = self.state.lock().await;
        let matching = count_distinct(
            state
                .dated_links(|s| s.name.to_lowercase() == wanted)
                .map(|(job_id, _, date)| (analytics::week_start(date), job_id)),
        );
        let totals = count_distinct(state.jobs.iter().filter_map(|(job_id, job)| {
            job.date_posted
                .map(|date| (analytics::week_start(date), *job_id))
        }));
        Ok(matching
            .into_iter()
            .map(|(week, skill_jobs)| WeeklyShare {
                date: week,
                percentage: analytics::share_percentage(
                    skill_jobs,
                    totals.get(&week).copied().unwrap_or(0),
                ),
            })
            .collect())
    }

    async fn projected_growth(
        &self,
        category: Option<&str>,
        since: NaiveDate,
    ) -> Result<Vec<ProjectionRow>, StoreError> {
        let state = self.state.lock().await;
        let weeks = count_distinct(
            state
                .dated_links(|s| category.map_or(true, |c| s.category == c))
                .filter(|(_, _, date)| *date >= since)
                .map(|(job_id, skill, date)| {
                    (
                        (skill.name.clone(), skill.category.clone(), analytics::week_start(date)),
                        job_id,
                    )
                }),
        );
        let mut series: BTreeMap<(String, String), Vec<WeeklyCount>> = BTreeMap::new();
        for ((skill, category, week_start), postings) in weeks {
            series.entry((skill, category)).or_default().push(WeeklyCount {
                week_start,
                postings,
            });
        }
        let mut out = series
            .iter()
            .filter_map(|((skill, category), weeks)| analytics::project(skill, category, weeks))
            .collect::<Vec<_>>();
        analytics::sort_projections(&mut out);
        Ok(out)
    }
}
