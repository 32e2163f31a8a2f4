use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db};

/// Acquires the idempotency lease for `(job_type, entity_id)`, taking over a
/// lapsed lease atomically. Returns the holder token, or `None` when a live
/// lease is held elsewhere.
pub async fn acquire_lease(
	db: &Db,
	job_type: &str,
	entity_id: Uuid,
	ttl: std::time::Duration,
	now: OffsetDateTime,
) -> Result<Option<Uuid>> {
	let token = Uuid::new_v4();
	let granted: Option<Uuid> = sqlx::query_scalar(
		"\
INSERT INTO job_leases (job_type, entity_id, token, expires_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (job_type, entity_id) DO UPDATE
SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
WHERE job_leases.expires_at <= $5
RETURNING token",
	)
	.bind(job_type)
	.bind(entity_id)
	.bind(token)
	.bind(now + ttl)
	.bind(now)
	.fetch_optional(&db.pool)
	.await?;

	Ok(granted)
}

/// Releases the lease only when the token still matches, so a holder whose
/// lease lapsed and was taken over cannot release the new holder's lease.
pub async fn release_lease(db: &Db, job_type: &str, entity_id: Uuid, token: Uuid) -> Result<bool> {
	let result =
		sqlx::query("DELETE FROM job_leases WHERE job_type = $1 AND entity_id = $2 AND token = $3")
			.bind(job_type)
			.bind(entity_id)
			.bind(token)
			.execute(&db.pool)
			.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn lease_held(
	db: &Db,
	job_type: &str,
	entity_id: Uuid,
	now: OffsetDateTime,
) -> Result<bool> {
	let held: Option<i32> = sqlx::query_scalar(
		"SELECT 1 FROM job_leases WHERE job_type = $1 AND entity_id = $2 AND expires_at > $3",
	)
	.bind(job_type)
	.bind(entity_id)
	.bind(now)
	.fetch_optional(&db.pool)
	.await?;

	Ok(held.is_some())
}
