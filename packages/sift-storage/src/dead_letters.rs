use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{ArchivedDeadLetterRecord, DeadLetterRecord, JobRecord},
};

pub struct NewDeadLetter {
	pub job_type: String,
	pub entity_id: Uuid,
	pub payload: Value,
	pub priority: String,
	pub error_summary: String,
	pub category: String,
	pub attempts: i32,
}

pub async fn record_dead_letter(
	db: &Db,
	new: NewDeadLetter,
	now: OffsetDateTime,
) -> Result<Uuid> {
	let dead_letter_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO dead_letters (dead_letter_id, job_type, entity_id, payload, priority, error_summary, category, attempts, failed_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
	)
	.bind(dead_letter_id)
	.bind(&new.job_type)
	.bind(new.entity_id)
	.bind(&new.payload)
	.bind(&new.priority)
	.bind(&new.error_summary)
	.bind(&new.category)
	.bind(new.attempts)
	.bind(now)
	.execute(&db.pool)
	.await?;

	Ok(dead_letter_id)
}

pub async fn fetch_dead_letter(
	db: &Db,
	dead_letter_id: Uuid,
) -> Result<Option<DeadLetterRecord>> {
	let record = sqlx::query_as::<_, DeadLetterRecord>(
		"SELECT * FROM dead_letters WHERE dead_letter_id = $1",
	)
	.bind(dead_letter_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(record)
}

pub async fn list_dead_letters(
	db: &Db,
	category: Option<&str>,
	limit: i64,
) -> Result<Vec<DeadLetterRecord>> {
	let rows = sqlx::query_as::<_, DeadLetterRecord>(
		"\
SELECT *
FROM dead_letters
WHERE ($1::text IS NULL OR category = $1)
ORDER BY failed_at DESC
LIMIT $2",
	)
	.bind(category)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn list_archived_dead_letters(
	db: &Db,
	limit: i64,
) -> Result<Vec<ArchivedDeadLetterRecord>> {
	let rows = sqlx::query_as::<_, ArchivedDeadLetterRecord>(
		"SELECT * FROM dead_letter_archive ORDER BY archived_at DESC LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Converts the dead letter back into a live job with a fresh attempt budget
/// and removes the record, in one transaction. `None` when the id is already
/// gone (e.g. a concurrent requeue or archival won).
pub async fn requeue_dead_letter(
	db: &Db,
	dead_letter_id: Uuid,
	now: OffsetDateTime,
) -> Result<Option<JobRecord>> {
	let mut tx = db.pool.begin().await?;
	let record = sqlx::query_as::<_, DeadLetterRecord>(
		"SELECT * FROM dead_letters WHERE dead_letter_id = $1 FOR UPDATE",
	)
	.bind(dead_letter_id)
	.fetch_optional(&mut *tx)
	.await?;
	let Some(record) = record else {
		tx.commit().await?;

		return Ok(None);
	};
	let job_id = Uuid::new_v4();
	let job = sqlx::query_as::<_, JobRecord>(
		"\
INSERT INTO jobs (job_id, job_type, entity_id, payload, priority, status, attempts, available_at, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, 'PENDING', 0, $6, $6, $6)
RETURNING *",
	)
	.bind(job_id)
	.bind(&record.job_type)
	.bind(record.entity_id)
	.bind(&record.payload)
	.bind(&record.priority)
	.bind(now)
	.fetch_one(&mut *tx)
	.await?;

	sqlx::query("DELETE FROM dead_letters WHERE dead_letter_id = $1")
		.bind(dead_letter_id)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(Some(job))
}

/// Moves records past the retention window into the archive table. The move
/// is a transactional select-insert-delete, so a second run over the same
/// window archives nothing further.
pub async fn archive_dead_letters(
	db: &Db,
	older_than_days: i64,
	now: OffsetDateTime,
) -> Result<u64> {
	let cutoff = now - Duration::days(older_than_days);
	let mut tx = db.pool.begin().await?;
	let expired = sqlx::query_as::<_, DeadLetterRecord>(
		"SELECT * FROM dead_letters WHERE failed_at <= $1 FOR UPDATE SKIP LOCKED",
	)
	.bind(cutoff)
	.fetch_all(&mut *tx)
	.await?;

	if expired.is_empty() {
		tx.commit().await?;

		return Ok(0);
	}

	for record in &expired {
		sqlx::query(
			"\
INSERT INTO dead_letter_archive (archive_id, original_id, job_type, entity_id, payload, priority, error_summary, category, attempts, failed_at, archived_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
		)
		.bind(Uuid::new_v4())
		.bind(record.dead_letter_id)
		.bind(&record.job_type)
		.bind(record.entity_id)
		.bind(&record.payload)
		.bind(&record.priority)
		.bind(&record.error_summary)
		.bind(&record.category)
		.bind(record.attempts)
		.bind(record.failed_at)
		.bind(now)
		.execute(&mut *tx)
		.await?;
	}

	let ids: Vec<Uuid> = expired.iter().map(|record| record.dead_letter_id).collect();

	sqlx::query("DELETE FROM dead_letters WHERE dead_letter_id = ANY($1)")
		.bind(&ids)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(expired.len() as u64)
}
