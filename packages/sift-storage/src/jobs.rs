use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use sift_domain::tiers::PriorityTier;

use crate::{Result, db::Db, models::JobRecord};

/// Claim lease applied by `claim_next_job`. Short on purpose: the per-entity
/// idempotency lease is what prevents overlapping execution; this only keeps
/// pollers from re-reading the same row every tick.
const CLAIM_LEASE_SECONDS: i64 = 30;

/// Enqueues a job unless an identical `(job_type, entity_id)` job is already
/// pending, in which case this is a no-op returning `None`.
pub async fn enqueue_job(
	db: &Db,
	job_type: &str,
	entity_id: Uuid,
	payload: &Value,
	priority: PriorityTier,
	now: OffsetDateTime,
) -> Result<Option<Uuid>> {
	let pending: Option<Uuid> = sqlx::query_scalar(
		"SELECT job_id FROM jobs WHERE job_type = $1 AND entity_id = $2 AND status = 'PENDING' LIMIT 1",
	)
	.bind(job_type)
	.bind(entity_id)
	.fetch_optional(&db.pool)
	.await?;

	if pending.is_some() {
		return Ok(None);
	}

	let job_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO jobs (job_id, job_type, entity_id, payload, priority, status, available_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $6, $6)",
	)
	.bind(job_id)
	.bind(job_type)
	.bind(entity_id)
	.bind(payload)
	.bind(priority.as_str())
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(Some(job_id))
}

/// Claims the next due job, preferring tiers in the order given. The claim
/// bumps `available_at` so other pollers skip the row while it runs.
pub async fn claim_next_job(
	db: &Db,
	tier_order: &[PriorityTier],
	now: OffsetDateTime,
) -> Result<Option<JobRecord>> {
	let tiers: Vec<String> = tier_order.iter().map(|tier| tier.as_str().to_string()).collect();
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, JobRecord>(
		"\
SELECT *
FROM jobs
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1 AND priority = ANY($2)
ORDER BY array_position($2, priority), available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.bind(&tiers)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + Duration::seconds(CLAIM_LEASE_SECONDS);

		sqlx::query("UPDATE jobs SET available_at = $1, updated_at = $2 WHERE job_id = $3")
			.bind(lease_until)
			.bind(now)
			.bind(job.job_id)
			.execute(&mut *tx)
			.await?;

		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_job_done(db: &Db, job_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE jobs SET status = 'DONE', updated_at = $1 WHERE job_id = $2")
		.bind(now)
		.bind(job_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

/// Books the job for another try after a retryable failure.
pub async fn reschedule_job(
	db: &Db,
	job_id: Uuid,
	attempts: i32,
	delay: std::time::Duration,
	last_error: &str,
	now: OffsetDateTime,
) -> Result<()> {
	let available_at = now + delay;

	sqlx::query(
		"\
UPDATE jobs
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE job_id = $5",
	)
	.bind(attempts)
	.bind(last_error)
	.bind(available_at)
	.bind(now)
	.bind(job_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Pushes the job back without consuming an attempt, e.g. when the entity's
/// idempotency lease is held by another execution.
pub async fn defer_job(
	db: &Db,
	job_id: Uuid,
	delay: std::time::Duration,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query("UPDATE jobs SET status = 'PENDING', available_at = $1, updated_at = $2 WHERE job_id = $3")
		.bind(now + delay)
		.bind(now)
		.bind(job_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn delete_job(db: &Db, job_id: Uuid) -> Result<()> {
	sqlx::query("DELETE FROM jobs WHERE job_id = $1").bind(job_id).execute(&db.pool).await?;

	Ok(())
}

pub async fn purge_done_jobs(db: &Db, cutoff: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query("DELETE FROM jobs WHERE status = 'DONE' AND updated_at <= $1")
		.bind(cutoff)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected())
}
