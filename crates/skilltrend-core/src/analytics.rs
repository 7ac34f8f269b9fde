//! Derived demand metrics over dated postings. Stores supply the raw weekly and
//! daily counts; the rates, shares and projections are computed here so every
//! backend rounds the same way.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// How far back the projection looks.
pub const PROJECTION_WINDOW_WEEKS: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyPostings {
    pub date: NaiveDate,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyCount {
    pub week_start: NaiveDate,
    pub postings: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeeklyGrowth {
    pub date: NaiveDate,
    pub postings_count: i64,
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeeklyShare {
    pub date: NaiveDate,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    pub skill: String,
    pub category: String,
    pub current: i64,
    pub previous: i64,
    pub delta: i64,
    pub projected: i64,
    pub percent: Option<f64>,
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Earliest posting date that still counts toward a projection made on `today`.
pub fn projection_cutoff(today: NaiveDate) -> NaiveDate {
    today - Duration::weeks(PROJECTION_WINDOW_WEEKS)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage change from `previous` to `current`; undefined when there was nothing before.
pub fn growth_rate(previous: i64, current: i64) -> Option<f64> {
    (previous > 0).then(|| round2((current - previous) as f64 / previous as f64 * 100.0))
}

/// Week-over-week growth for an ascending series. The first week has no rate.
pub fn weekly_growth(weeks: &[WeeklyCount]) -> Vec<WeeklyGrowth> {
    weeks
        .iter()
        .enumerate()
        .map(|(i, week)| WeeklyGrowth {
            date: week.week_start,
            postings_count: week.postings,
            growth_rate: i
                .checked_sub(1)
                .and_then(|prev| growth_rate(weeks[prev].postings, week.postings)),
        })
        .collect()
}

pub fn share_percentage(matching: i64, total: i64) -> f64 {
    if total > 0 {
        round2(matching as f64 / total as f64 * 100.0)
    } else {
        0.0
    }
}

/// Projects next week's postings from the last two weeks that had any.
/// `weeks` must be ascending; an empty series has no projection.
pub fn project(skill: &str, category: &str, weeks: &[WeeklyCount]) -> Option<ProjectionRow> {
    let (last, rest) = weeks.split_last()?;
    let current = last.postings;
    let previous = rest.last().map_or(0, |w| w.postings);
    let percent = growth_rate(previous, current);
    let projected = match percent {
        Some(rate) => (current as f64 * (1.0 + rate / 100.0)).round() as i64,
        None => current,
    };
    Some(ProjectionRow {
        skill: skill.to_string(),
        category: category.to_string(),
        current,
        previous,
        delta: current - previous,
        projected,
        percent,
    })
}

/// Fastest growing first; skills without a rate sort as zero, ties by name.
pub fn sort_projections(rows: &mut [ProjectionRow]) {
    rows.sort_by(|a, b| {
        let (ra, rb) = (a.percent.unwrap_or(0.0), b.percent.unwrap_or(0.0));
        rb.total_cmp(&ra).then_with(|| a.skill.cmp(&b.skill))
    });
}
