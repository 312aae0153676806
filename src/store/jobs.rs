//! Persisted render jobs and their lifecycle state machine.
//!
//! States: `PROCESSED → GENERATING → {GENERATED | GENERATION_FAIL}`. The
//! claim transition is the only concurrency guard in the system: it is an
//! atomic conditional update, so under duplicate queue delivery exactly
//! one consumer wins and every other delivery observes a skip.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row as _;
use tracing::debug;
use uuid::Uuid;

use crate::foundation::error::{FeedforgeError, FeedforgeResult};

/// Error details stored on a failed job are capped at this length.
const ERROR_DETAIL_MAX: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Processed,
    Generating,
    Generated,
    GenerationFail,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processed => "PROCESSED",
            JobStatus::Generating => "GENERATING",
            JobStatus::Generated => "GENERATED",
            JobStatus::GenerationFail => "GENERATION_FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSED" => Some(JobStatus::Processed),
            "GENERATING" => Some(JobStatus::Generating),
            "GENERATED" => Some(JobStatus::Generated),
            "GENERATION_FAIL" => Some(JobStatus::GenerationFail),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Generated | JobStatus::GenerationFail)
    }
}

/// One persisted render job.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: Uuid,
    /// The expanded layout document, stored as raw JSON.
    pub document: serde_json::Value,
    pub outfeed_id: String,
    pub template_id: String,
    pub subject_id: String,
    pub status: JobStatus,
    pub output_ref: Option<String>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create (or re-create) a job in `PROCESSED` state.
#[derive(Clone, Debug)]
pub struct NewJob {
    pub id: Uuid,
    pub document: serde_json::Value,
    pub outfeed_id: String,
    pub template_id: String,
    pub subject_id: String,
}

/// Result of a claim attempt.
#[derive(Clone, Debug)]
pub enum ClaimOutcome {
    /// This caller won the transition to `GENERATING`.
    Claimed(Job),
    /// The job was not in `PROCESSED` state (or does not exist); the
    /// caller must skip without side effects.
    Skip { current: Option<JobStatus> },
}

/// Per-outfeed generation progress counts.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct OutfeedSummary {
    pub outfeed_id: String,
    pub total: u64,
    pub generated: u64,
    pub failed: u64,
    pub in_flight: u64,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job in `PROCESSED` state, or reset an existing row with
    /// the same id back to `PROCESSED` with fresh content.
    async fn upsert_processed(&self, job: NewJob) -> FeedforgeResult<()>;

    async fn get(&self, job_id: Uuid) -> FeedforgeResult<Option<Job>>;

    /// Attempt the `PROCESSED → GENERATING` transition. At most one claim
    /// ever succeeds per job.
    async fn claim(&self, job_id: Uuid) -> FeedforgeResult<ClaimOutcome>;

    /// `GENERATING → GENERATED`, recording the output reference.
    async fn complete(&self, job_id: Uuid, output_ref: &str) -> FeedforgeResult<()>;

    /// `GENERATING → GENERATION_FAIL`, recording the error detail.
    async fn fail(&self, job_id: Uuid, error_detail: &str) -> FeedforgeResult<()>;

    /// Progress counts for one outfeed; `None` when it has no jobs.
    async fn status_summary(&self, outfeed_id: &str) -> FeedforgeResult<Option<OutfeedSummary>>;
}

fn truncate_detail(detail: &str) -> String {
    let mut out = detail.to_string();
    if out.len() > ERROR_DETAIL_MAX {
        let mut cut = ERROR_DETAIL_MAX;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

fn db_err(e: sqlx::Error) -> FeedforgeError {
    FeedforgeError::storage(e.to_string())
}

/// Postgres-backed job store. The claim is a single conditional UPDATE so
/// the state-machine guard holds across processes without locks.
pub struct PgJobStore {
    pool: sqlx::PgPool,
}

impl PgJobStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &sqlx::postgres::PgRow) -> FeedforgeResult<Job> {
        let status_text: String = row.try_get("status").map_err(db_err)?;
        let status = JobStatus::parse(&status_text).ok_or_else(|| {
            FeedforgeError::storage(format!("unknown job status '{status_text}'"))
        })?;
        Ok(Job {
            id: row.try_get("id").map_err(db_err)?,
            document: row.try_get("document").map_err(db_err)?,
            outfeed_id: row.try_get("outfeed_id").map_err(db_err)?,
            template_id: row.try_get("template_id").map_err(db_err)?,
            subject_id: row.try_get("subject_id").map_err(db_err)?,
            status,
            output_ref: row.try_get("output_ref").map_err(db_err)?,
            error_detail: row.try_get("error_detail").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
            updated_at: row.try_get("updated_at").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn upsert_processed(&self, job: NewJob) -> FeedforgeResult<()> {
        sqlx::query(
            "INSERT INTO render_jobs \
                 (id, document, outfeed_id, template_id, subject_id, status, \
                  output_ref, error_detail, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'PROCESSED', NULL, NULL, now(), now()) \
             ON CONFLICT (id) DO UPDATE SET \
                 document = EXCLUDED.document, \
                 outfeed_id = EXCLUDED.outfeed_id, \
                 template_id = EXCLUDED.template_id, \
                 subject_id = EXCLUDED.subject_id, \
                 status = 'PROCESSED', \
                 output_ref = NULL, \
                 error_detail = NULL, \
                 updated_at = now()",
        )
        .bind(job.id)
        .bind(&job.document)
        .bind(&job.outfeed_id)
        .bind(&job.template_id)
        .bind(&job.subject_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> FeedforgeResult<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, document, outfeed_id, template_id, subject_id, status, \
                    output_ref, error_detail, created_at, updated_at \
             FROM render_jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn claim(&self, job_id: Uuid) -> FeedforgeResult<ClaimOutcome> {
        let row = sqlx::query(
            "UPDATE render_jobs SET status = 'GENERATING', updated_at = now() \
             WHERE id = $1 AND status = 'PROCESSED' \
             RETURNING id, document, outfeed_id, template_id, subject_id, status, \
                       output_ref, error_detail, created_at, updated_at",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(ClaimOutcome::Claimed(Self::job_from_row(&row)?)),
            None => {
                let current = sqlx::query("SELECT status FROM render_jobs WHERE id = $1")
                    .bind(job_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_err)?
                    .and_then(|row| {
                        row.try_get::<String, _>("status")
                            .ok()
                            .as_deref()
                            .and_then(JobStatus::parse)
                    });
                debug!(%job_id, ?current, "claim skipped");
                Ok(ClaimOutcome::Skip { current })
            }
        }
    }

    async fn complete(&self, job_id: Uuid, output_ref: &str) -> FeedforgeResult<()> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = 'GENERATED', output_ref = $2, updated_at = now() \
             WHERE id = $1 AND status = 'GENERATING'",
        )
        .bind(job_id)
        .bind(output_ref)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() != 1 {
            return Err(FeedforgeError::storage(format!(
                "complete({job_id}) found no job in GENERATING state"
            )));
        }
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error_detail: &str) -> FeedforgeResult<()> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = 'GENERATION_FAIL', error_detail = $2, updated_at = now() \
             WHERE id = $1 AND status = 'GENERATING'",
        )
        .bind(job_id)
        .bind(truncate_detail(error_detail))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() != 1 {
            return Err(FeedforgeError::storage(format!(
                "fail({job_id}) found no job in GENERATING state"
            )));
        }
        Ok(())
    }

    async fn status_summary(&self, outfeed_id: &str) -> FeedforgeResult<Option<OutfeedSummary>> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE status = 'GENERATED') AS generated, \
                    COUNT(*) FILTER (WHERE status = 'GENERATION_FAIL') AS failed, \
                    COUNT(*) FILTER (WHERE status IN ('PROCESSED', 'GENERATING')) AS in_flight \
             FROM render_jobs WHERE outfeed_id = $1",
        )
        .bind(outfeed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let total: i64 = row.try_get("total").map_err(db_err)?;
        if total == 0 {
            return Ok(None);
        }
        Ok(Some(OutfeedSummary {
            outfeed_id: outfeed_id.to_string(),
            total: total as u64,
            generated: row.try_get::<i64, _>("generated").map_err(db_err)? as u64,
            failed: row.try_get::<i64, _>("failed").map_err(db_err)? as u64,
            in_flight: row.try_get::<i64, _>("in_flight").map_err(db_err)? as u64,
        }))
    }
}

/// In-memory job store for tests. Transitions run under one mutex guard,
/// which gives the same conditional-update semantics as the SQL path.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn upsert_processed(&self, job: NewJob) -> FeedforgeResult<()> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let created_at = jobs.get(&job.id).map(|j| j.created_at).unwrap_or(now);
        jobs.insert(
            job.id,
            Job {
                id: job.id,
                document: job.document,
                outfeed_id: job.outfeed_id,
                template_id: job.template_id,
                subject_id: job.subject_id,
                status: JobStatus::Processed,
                output_ref: None,
                error_detail: None,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> FeedforgeResult<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .expect("job store lock poisoned")
            .get(&job_id)
            .cloned())
    }

    async fn claim(&self, job_id: Uuid) -> FeedforgeResult<ClaimOutcome> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processed => {
                job.status = JobStatus::Generating;
                job.updated_at = Utc::now();
                Ok(ClaimOutcome::Claimed(job.clone()))
            }
            Some(job) => Ok(ClaimOutcome::Skip {
                current: Some(job.status),
            }),
            None => Ok(ClaimOutcome::Skip { current: None }),
        }
    }

    async fn complete(&self, job_id: Uuid, output_ref: &str) -> FeedforgeResult<()> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Generating => {
                job.status = JobStatus::Generated;
                job.output_ref = Some(output_ref.to_string());
                job.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(FeedforgeError::storage(format!(
                "complete({job_id}) found no job in GENERATING state"
            ))),
        }
    }

    async fn fail(&self, job_id: Uuid, error_detail: &str) -> FeedforgeResult<()> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        match jobs.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Generating => {
                job.status = JobStatus::GenerationFail;
                job.error_detail = Some(truncate_detail(error_detail));
                job.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(FeedforgeError::storage(format!(
                "fail({job_id}) found no job in GENERATING state"
            ))),
        }
    }

    async fn status_summary(&self, outfeed_id: &str) -> FeedforgeResult<Option<OutfeedSummary>> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        let mut summary = OutfeedSummary {
            outfeed_id: outfeed_id.to_string(),
            total: 0,
            generated: 0,
            failed: 0,
            in_flight: 0,
        };
        for job in jobs.values().filter(|j| j.outfeed_id == outfeed_id) {
            summary.total += 1;
            match job.status {
                JobStatus::Generated => summary.generated += 1,
                JobStatus::GenerationFail => summary.failed += 1,
                JobStatus::Processed | JobStatus::Generating => summary.in_flight += 1,
            }
        }
        Ok((summary.total > 0).then_some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_job(id: Uuid) -> NewJob {
        NewJob {
            id,
            document: serde_json::json!({"pages": []}),
            outfeed_id: "feed-1".to_string(),
            template_id: "t-1".to_string(),
            subject_id: "sub-1".to_string(),
        }
    }

    #[tokio::test]
    async fn lifecycle_processed_generating_generated() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.upsert_processed(new_job(id)).await.unwrap();

        let ClaimOutcome::Claimed(job) = store.claim(id).await.unwrap() else {
            panic!("first claim must win");
        };
        assert_eq!(job.status, JobStatus::Generating);

        store.complete(id, "processed_images/a/b/c.png").await.unwrap();
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Generated);
        assert_eq!(job.output_ref.as_deref(), Some("processed_images/a/b/c.png"));
    }

    #[tokio::test]
    async fn second_claim_observes_skip() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.upsert_processed(new_job(id)).await.unwrap();

        assert!(matches!(
            store.claim(id).await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert!(matches!(
            store.claim(id).await.unwrap(),
            ClaimOutcome::Skip {
                current: Some(JobStatus::Generating)
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let id = Uuid::new_v4();
        store.upsert_processed(new_job(id)).await.unwrap();

        let a = tokio::spawn({
            let store = store.clone();
            async move { store.claim(id).await.unwrap() }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move { store.claim(id).await.unwrap() }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let wins = [&a, &b]
            .iter()
            .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
            .count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn claim_on_missing_or_terminal_job_is_a_no_op() {
        let store = MemoryJobStore::new();
        assert!(matches!(
            store.claim(Uuid::new_v4()).await.unwrap(),
            ClaimOutcome::Skip { current: None }
        ));

        let id = Uuid::new_v4();
        store.upsert_processed(new_job(id)).await.unwrap();
        store.claim(id).await.unwrap();
        store.fail(id, "boom").await.unwrap();
        assert!(matches!(
            store.claim(id).await.unwrap(),
            ClaimOutcome::Skip {
                current: Some(JobStatus::GenerationFail)
            }
        ));
        // Terminal state is sticky; completing now is invalid.
        assert!(store.complete(id, "x").await.is_err());
    }

    #[tokio::test]
    async fn fail_truncates_long_error_detail() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.upsert_processed(new_job(id)).await.unwrap();
        store.claim(id).await.unwrap();
        store.fail(id, &"x".repeat(5000)).await.unwrap();
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.error_detail.unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn upsert_resets_a_failed_job_back_to_processed() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.upsert_processed(new_job(id)).await.unwrap();
        store.claim(id).await.unwrap();
        store.fail(id, "first attempt").await.unwrap();

        store.upsert_processed(new_job(id)).await.unwrap();
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processed);
        assert!(job.error_detail.is_none());
        assert!(job.output_ref.is_none());
    }

    #[tokio::test]
    async fn summary_counts_by_state() {
        let store = MemoryJobStore::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            store.upsert_processed(new_job(*id)).await.unwrap();
        }
        store.claim(ids[0]).await.unwrap();
        store.complete(ids[0], "k").await.unwrap();
        store.claim(ids[1]).await.unwrap();
        store.fail(ids[1], "e").await.unwrap();

        let summary = store.status_summary("feed-1").await.unwrap().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.in_flight, 1);

        assert!(store.status_summary("other-feed").await.unwrap().is_none());
    }

    #[test]
    fn status_text_round_trips() {
        for status in [
            JobStatus::Processed,
            JobStatus::Generating,
            JobStatus::Generated,
            JobStatus::GenerationFail,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("UNKNOWN"), None);
        assert!(JobStatus::Generated.is_terminal());
        assert!(!JobStatus::Generating.is_terminal());
    }
}
