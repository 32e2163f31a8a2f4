use std::{sync::Arc, time::Duration as StdDuration};

use time::{Duration, OffsetDateTime};
use tokio::{task::JoinSet, time as tokio_time};

use sift_domain::tiers::{self, TierWeights};
use sift_service::SiftService;
use sift_storage::jobs;

/// Runs the worker pool: one queue loop per configured worker, plus a
/// maintenance loop for dead-letter archival and queue hygiene.
pub async fn run_worker(service: Arc<SiftService>) -> color_eyre::Result<()> {
	let workers = service.cfg.orchestrator.workers;
	let mut tasks = JoinSet::new();

	for worker_id in 0..workers {
		let service = service.clone();

		tasks.spawn(async move { run_queue_loop(service, worker_id).await });
	}

	{
		let service = service.clone();

		tasks.spawn(async move { run_maintenance_loop(service).await });
	}

	tracing::info!(workers, "Worker pool started.");

	while let Some(result) = tasks.join_next().await {
		result?;
	}

	Ok(())
}

/// Drains the priority lanes by weighted round-robin: each tick prefers the
/// scheduled tier but falls through to the others so an idle tick still
/// picks up whatever work exists.
async fn run_queue_loop(service: Arc<SiftService>, worker_id: u32) {
	let weights = TierWeights {
		urgent: service.cfg.orchestrator.tier_weights.urgent,
		high: service.cfg.orchestrator.tier_weights.high,
		medium: service.cfg.orchestrator.tier_weights.medium,
		low: service.cfg.orchestrator.tier_weights.low,
	};
	let cycle = tiers::round_robin_cycle(&weights);
	let poll = StdDuration::from_millis(service.cfg.orchestrator.poll_interval_ms);
	let mut slot = 0_usize;

	loop {
		let tier = cycle[slot % cycle.len()];

		slot = slot.wrapping_add(1);

		let order = tiers::claim_order(tier);

		match jobs::claim_next_job(&service.db, &order, OffsetDateTime::now_utc()).await {
			Ok(Some(job)) => {
				if let Err(err) = service.execute(&job).await {
					tracing::error!(
						worker_id,
						job_id = %job.job_id,
						job_type = %job.job_type,
						error = %err,
						"Job settlement failed."
					);
				}
			},
			Ok(None) => {
				tokio_time::sleep(poll).await;
			},
			Err(err) => {
				tracing::error!(worker_id, error = %err, "Queue poll failed.");
				tokio_time::sleep(poll).await;
			},
		}
	}
}

async fn run_maintenance_loop(service: Arc<SiftService>) {
	let interval = StdDuration::from_secs(service.cfg.dead_letter.archive_interval_secs);

	loop {
		tokio_time::sleep(interval).await;

		if let Err(err) = service.archive_dead_letters().await {
			tracing::error!(error = %err, "Dead-letter archival failed.");
		}

		let cutoff =
			OffsetDateTime::now_utc() - Duration::days(service.cfg.dead_letter.retention_days);

		match jobs::purge_done_jobs(&service.db, cutoff).await {
			Ok(purged) if purged > 0 => {
				tracing::info!(purged, "Purged completed queue rows.");
			},
			Ok(_) => {},
			Err(err) => {
				tracing::error!(error = %err, "Queue purge failed.");
			},
		}
	}
}
