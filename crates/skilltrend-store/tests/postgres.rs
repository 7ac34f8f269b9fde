// Runs against a live database only when SKILLTREND_TEST_DATABASE_URL is set;
// otherwise every test returns early.

use chrono::{NaiveDate, TimeZone, Utc};
use skilltrend_core::{FixedClock, JobPosting, JobRecord, SkillMatch, SkillSet};
use skilltrend_store::{
    insert_or_find, JobStore, PgStore, Reconciler, Resolution, ResolveOutcome, StoreError,
    UniqueRow,
};

async fn store() -> Option<PgStore> {
    let url = std::env::var("SKILLTREND_TEST_DATABASE_URL").ok()?;
    let store = PgStore::connect(&url).await.expect("connect test database");
    store.migrate().await.expect("migrate test database");
    Some(store)
}

fn unique(label: &str) -> String {
    format!("{label}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn posting(company: &str, title: &str, date_posted: Option<&str>) -> JobPosting {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap());
    JobRecord {
        company: Some(company.to_string()),
        title: Some(title.to_string()),
        location: Some("London".into()),
        date_posted: Some(date_posted.unwrap_or("unknown").to_string()),
        ..Default::default()
    }
    .normalize(&clock)
}

async fn resolve(store: &PgStore, posting: &JobPosting) -> i64 {
    match Reconciler::new(store).resolve(posting).await.unwrap() {
        ResolveOutcome::Resolved { job_id, .. } => job_id,
        other => panic!("expected resolved, got {other:?}"),
    }
}

#[tokio::test]
async fn company_insert_then_lookup_returns_same_id() {
    let Some(store) = store().await else { return };
    let name = unique("company");
    let first = insert_or_find(&store, UniqueRow::Company(&name)).await.unwrap();
    let second = insert_or_find(&store, UniqueRow::Company(&name)).await.unwrap();
    assert_eq!(first.id(), second.id());
}

#[tokio::test]
async fn null_date_jobs_are_deduplicated() {
    let Some(store) = store().await else { return };
    let posting = posting(&unique("acme"), "Backend Dev", None);
    assert_eq!(posting.date_posted, None);
    let first = resolve(&store, &posting).await;
    let second = resolve(&store, &posting).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn relative_date_is_stored_as_calendar_date() {
    let Some(store) = store().await else { return };
    let posting = posting(&unique("acme"), "Backend Dev", Some("2 days ago"));
    let job_id = resolve(&store, &posting).await;
    let stored: Option<NaiveDate> = sqlx::query_scalar("SELECT date_posted FROM job WHERE id = $1")
        .bind(job_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(stored, NaiveDate::from_ymd_opt(2026, 3, 8));
}

#[tokio::test]
async fn skill_counter_and_links_diverge_on_rerun() {
    let Some(store) = store().await else { return };
    let company = unique("acme");
    let job_a = resolve(&store, &posting(&company, "A", None)).await;
    let job_b = resolve(&store, &posting(&company, "B", None)).await;
    let skill_name = unique("skill");
    let skills: SkillSet = [SkillMatch::new(skill_name.clone(), "Backend")].into_iter().collect();

    assert_eq!(store.persist_skills(job_a, &skills).await.unwrap(), 1);
    assert_eq!(store.persist_skills(job_a, &skills).await.unwrap(), 0);
    assert_eq!(store.persist_skills(job_b, &skills).await.unwrap(), 1);

    let stats = store.skill_statistics().await.unwrap();
    let row = stats.iter().find(|s| s.skill == skill_name).unwrap();
    assert_eq!(row.category, "Backend");
    assert_eq!(row.demand, 2);
    assert_eq!(row.total_demand, 3);
}

async fn skill_rows(store: &PgStore, name: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM skill WHERE name = $1")
        .bind(name)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn failed_link_rolls_back_earlier_skill_upserts() {
    let Some(store) = store().await else { return };
    let first = unique("aaa-skill");
    let second = unique("zzz-skill");
    let skills: SkillSet = [
        SkillMatch::new(first.clone(), "Backend"),
        SkillMatch::new(second.clone(), "Backend"),
    ]
    .into_iter()
    .collect();

    // The skill upsert succeeds, then the job_skill foreign key rejects the missing job.
    let err = store.persist_skills(-1, &skills).await.unwrap_err();
    assert!(matches!(err, StoreError::Database(_)), "{err}");
    assert_eq!(skill_rows(&store, &first).await, 0);
    assert_eq!(skill_rows(&store, &second).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_inserts_of_a_new_company_converge() {
    let Some(store) = store().await else { return };
    let name = unique("fresh-co");

    let (a, b) = tokio::join!(
        insert_or_find(&store, UniqueRow::Company(&name)),
        insert_or_find(&store, UniqueRow::Company(&name)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.id(), b.id());
    assert!(a.id().is_some());
    let created = [a, b]
        .iter()
        .filter(|r| matches!(r, Resolution::Created(_)))
        .count();
    assert_eq!(created, 1);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM company WHERE name = $1")
        .bind(&name)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let company = unique("race-co");
    let left = posting(&company, "Backend Dev", Some("2026-03-02"));
    let right = posting(&company, "Frontend Dev", Some("2026-03-02"));
    let reconciler = Reconciler::new(&store);
    let (x, y) = tokio::join!(reconciler.resolve(&left), reconciler.resolve(&right));
    assert!(matches!(x.unwrap(), ResolveOutcome::Resolved { created: true, .. }));
    assert!(matches!(y.unwrap(), ResolveOutcome::Resolved { created: true, .. }));
}

#[tokio::test]
async fn weekly_analytics_from_postgres() {
    let Some(store) = store().await else { return };
    let company = unique("acme");
    let category = unique("category");
    let skill = unique("Skill");
    let skills: SkillSet = [SkillMatch::new(skill.clone(), category.clone())]
        .into_iter()
        .collect();
    for (title, date) in [("a", "2026-03-02"), ("b", "2026-03-09"), ("c", "2026-03-10")] {
        let job = resolve(&store, &posting(&company, title, Some(date))).await;
        store.persist_skills(job, &skills).await.unwrap();
    }

    let growth = store.skill_growth(&skill).await.unwrap();
    let weeks = growth
        .iter()
        .map(|w| (w.date, w.postings_count, w.growth_rate))
        .collect::<Vec<_>>();
    assert_eq!(
        weeks,
        vec![
            (NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), 1, None),
            (NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(), 2, Some(100.0)),
        ]
    );

    let share = store.skill_share(&skill.to_uppercase()).await.unwrap();
    assert_eq!(share.len(), 2);
    assert!(share.iter().all(|w| w.percentage > 0.0 && w.percentage <= 100.0));

    let since = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let projection = store.projected_growth(Some(&category), since).await.unwrap();
    assert_eq!(projection.len(), 1);
    assert_eq!(projection[0].current, 2);
    assert_eq!(projection[0].previous, 1);
    assert_eq!(projection[0].projected, 4);

    let listed = store.skills_by_category(&category).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].demand_count, 3);

    let daily = store.category_growth(&category).await.unwrap();
    assert_eq!(daily.iter().map(|d| d.value).sum::<i64>(), 3);
}
