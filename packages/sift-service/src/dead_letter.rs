use uuid::Uuid;

use sift_storage::{dead_letters, models::DeadLetterRecord};

use crate::{Result, SiftService};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequeueReport {
	pub requested: usize,
	pub requeued: usize,
}

impl SiftService {
	/// Converts a dead letter back into a live job with a fresh attempt
	/// budget. `None` when the record is already gone.
	pub async fn requeue_dead_letter(&self, dead_letter_id: Uuid) -> Result<Option<Uuid>> {
		let now = time::OffsetDateTime::now_utc();
		let job = dead_letters::requeue_dead_letter(&self.db, dead_letter_id, now).await?;

		match &job {
			Some(job) => {
				tracing::info!(
					dead_letter_id = %dead_letter_id,
					job_id = %job.job_id,
					job_type = %job.job_type,
					"Dead letter requeued."
				);
			},
			None => {
				tracing::warn!(dead_letter_id = %dead_letter_id, "Dead letter already gone.");
			},
		}

		Ok(job.map(|job| job.job_id))
	}

	pub async fn requeue_dead_letters(&self, dead_letter_ids: &[Uuid]) -> Result<RequeueReport> {
		let mut requeued = 0;

		for dead_letter_id in dead_letter_ids {
			if self.requeue_dead_letter(*dead_letter_id).await?.is_some() {
				requeued += 1;
			}
		}

		let report = RequeueReport { requested: dead_letter_ids.len(), requeued };

		tracing::info!(requested = report.requested, requeued = report.requeued, "Bulk requeue done.");

		Ok(report)
	}

	pub async fn list_dead_letters(
		&self,
		category: Option<&str>,
		limit: i64,
	) -> Result<Vec<DeadLetterRecord>> {
		Ok(dead_letters::list_dead_letters(&self.db, category, limit).await?)
	}

	/// Moves dead letters past the retention window into the archive table.
	pub async fn archive_dead_letters(&self) -> Result<u64> {
		let now = time::OffsetDateTime::now_utc();
		let archived = dead_letters::archive_dead_letters(
			&self.db,
			self.cfg.dead_letter.retention_days,
			now,
		)
		.await?;

		if archived > 0 {
			tracing::info!(archived, "Dead letters archived.");
		}

		Ok(archived)
	}
}
