use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::{
	content::ContentType,
	failure::{DeadLetterCategory, FailureKind},
	redact::redact_error_text,
	retry::RetryPolicy,
	tiers::PriorityTier,
};
use sift_providers::{GatewayError, generate::GenerateOptions};
use sift_storage::{
	dead_letters::{self, NewDeadLetter},
	jobs, leases,
	models::JobRecord,
	queries::{self, NewOutput},
};

use crate::{Error, JobType, Result, SiftService, SimilarFilters};

/// How soon a job is retried when the entity's idempotency lease is held by
/// another execution. Does not consume an attempt.
const LEASE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateOutputPayload {
	pub output_kind: String,
	#[serde(default)]
	pub parent_output_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbedEntityPayload {
	pub content_type: ContentType,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecuteOutcome {
	Completed,
	Retrying { attempts: i32 },
	DeadLettered { category: DeadLetterCategory },
	LeaseHeld,
}

/// Classified outcome of a single job attempt, private to the orchestrator.
/// Everything a handler can fail with converges here so the retry decision
/// is a pure function of the kind.
#[derive(Debug)]
pub(crate) struct JobFailure {
	pub kind: FailureKind,
	pub message: String,
	pub retry_after: Option<std::time::Duration>,
}
impl JobFailure {
	fn validation(message: impl Into<String>) -> Self {
		Self { kind: FailureKind::ValidationError, message: message.into(), retry_after: None }
	}

	fn timeout(timeout: std::time::Duration) -> Self {
		Self {
			kind: FailureKind::Timeout,
			message: format!("Job exceeded its {}s timeout.", timeout.as_secs()),
			retry_after: None,
		}
	}
}
impl From<GatewayError> for JobFailure {
	fn from(err: GatewayError) -> Self {
		Self { kind: err.kind, retry_after: err.retry_after, message: err.to_string() }
	}
}
impl From<sift_storage::Error> for JobFailure {
	fn from(err: sift_storage::Error) -> Self {
		match err {
			sift_storage::Error::InvalidArgument(message)
			| sift_storage::Error::NotFound(message) => Self::validation(message),
			other =>
				Self { kind: FailureKind::Unknown, message: other.to_string(), retry_after: None },
		}
	}
}
impl From<Error> for JobFailure {
	fn from(err: Error) -> Self {
		match err {
			Error::Gateway(inner) => Self::from(inner),
			Error::InvalidRequest { message } | Error::NotFound { message } =>
				Self::validation(message),
			Error::Encoding { message } => Self::validation(message),
			Error::Storage { message } =>
				Self { kind: FailureKind::Unknown, message, retry_after: None },
		}
	}
}
impl From<serde_json::Error> for JobFailure {
	fn from(err: serde_json::Error) -> Self {
		Self::validation(format!("Invalid job payload: {err}."))
	}
}

impl SiftService {
	/// Enqueues work for an entity. A no-op when the entity's idempotency
	/// lease is currently held or an identical job is already pending.
	pub async fn dispatch(
		&self,
		job_type: JobType,
		entity_id: Uuid,
		payload: Value,
		tier: Option<PriorityTier>,
	) -> Result<Option<Uuid>> {
		let now = OffsetDateTime::now_utc();

		if leases::lease_held(&self.db, job_type.as_str(), entity_id, now).await? {
			tracing::debug!(
				job_type = %job_type,
				entity_id = %entity_id,
				"Idempotency lease held; dispatch is a no-op."
			);

			return Ok(None);
		}

		let tier = tier.unwrap_or_else(|| self.tier_for(job_type));
		let job_id =
			jobs::enqueue_job(&self.db, job_type.as_str(), entity_id, &payload, tier, now).await?;

		match job_id {
			Some(job_id) => {
				tracing::info!(
					job_id = %job_id,
					job_type = %job_type,
					entity_id = %entity_id,
					tier = %tier,
					"Job dispatched."
				);
			},
			None => {
				tracing::debug!(
					job_type = %job_type,
					entity_id = %entity_id,
					"Identical job already pending; dispatch is a no-op."
				);
			},
		}

		Ok(job_id)
	}

	/// Runs one claimed job under its idempotency lease and wall-clock
	/// timeout, then settles it: done, rescheduled with backoff, or
	/// dead-lettered.
	pub async fn execute(&self, job: &JobRecord) -> Result<ExecuteOutcome> {
		let now = OffsetDateTime::now_utc();
		let Some(job_type) = JobType::parse(&job.job_type) else {
			let failure = JobFailure::validation(format!("Unknown job type {:?}.", job.job_type));
			let policy = self.policy(JobType::IntegrateFeedback);

			return self.settle_failure(None, job, failure, &policy, now).await;
		};
		let policy = self.policy(job_type);
		let ttl = policy.timeout
			+ std::time::Duration::from_secs(self.cfg.orchestrator.lease_ttl_margin_secs);
		let Some(token) =
			leases::acquire_lease(&self.db, job_type.as_str(), job.entity_id, ttl, now).await?
		else {
			tracing::debug!(
				job_id = %job.job_id,
				job_type = %job_type,
				entity_id = %job.entity_id,
				"Lease held elsewhere; deferring."
			);
			jobs::defer_job(&self.db, job.job_id, LEASE_RETRY_DELAY, now).await?;

			return Ok(ExecuteOutcome::LeaseHeld);
		};
		// Settle inside a single block so the lease is released on every
		// exit path; a crashed worker's lease lapses by TTL instead.
		let outcome = self.execute_leased(job_type, job, &policy).await;
		let released =
			leases::release_lease(&self.db, job_type.as_str(), job.entity_id, token).await?;

		if !released {
			tracing::warn!(
				job_id = %job.job_id,
				entity_id = %job.entity_id,
				"Lease lapsed before release; a concurrent takeover may have occurred."
			);
		}

		outcome
	}

	async fn execute_leased(
		&self,
		job_type: JobType,
		job: &JobRecord,
		policy: &RetryPolicy,
	) -> Result<ExecuteOutcome> {
		let attempt = job.attempts + 1;

		tracing::info!(
			job_id = %job.job_id,
			job_type = %job_type,
			entity_id = %job.entity_id,
			attempt,
			"Job attempt started."
		);

		let run = tokio::time::timeout(policy.timeout, self.run_job(job_type, job)).await;
		let result = match run {
			Ok(result) => result,
			Err(_) => Err(JobFailure::timeout(policy.timeout)),
		};
		let now = OffsetDateTime::now_utc();

		match result {
			Ok(()) => {
				jobs::mark_job_done(&self.db, job.job_id, now).await?;
				self.on_job_success(job_type, job).await?;
				tracing::info!(job_id = %job.job_id, job_type = %job_type, "Job completed.");

				Ok(ExecuteOutcome::Completed)
			},
			Err(failure) => self.settle_failure(Some(job_type), job, failure, policy, now).await,
		}
	}

	async fn settle_failure(
		&self,
		job_type: Option<JobType>,
		job: &JobRecord,
		failure: JobFailure,
		policy: &RetryPolicy,
		now: OffsetDateTime,
	) -> Result<ExecuteOutcome> {
		let attempts = job.attempts + 1;

		tracing::error!(
			job_id = %job.job_id,
			job_type = %job.job_type,
			entity_id = %job.entity_id,
			attempt = attempts,
			error_kind = %failure.kind,
			error = %failure.message,
			"Job attempt failed."
		);

		let redacted = redact_error_text(&failure.message);

		if failure.kind.is_retryable()
			&& let Some(delay) = policy.delay_after(attempts as u32)
		{
			// Honor the provider's own pacing hint when it outlasts ours.
			let delay = failure.retry_after.map_or(delay, |hint| hint.max(delay));

			jobs::reschedule_job(&self.db, job.job_id, attempts, delay, &redacted, now).await?;

			return Ok(ExecuteOutcome::Retrying { attempts });
		}

		let category = failure.kind.category();

		dead_letters::record_dead_letter(
			&self.db,
			NewDeadLetter {
				job_type: job.job_type.clone(),
				entity_id: job.entity_id,
				payload: job.payload.clone(),
				priority: job.priority.clone(),
				error_summary: redacted,
				category: category.as_str().to_string(),
				attempts,
			},
			now,
		)
		.await?;
		jobs::delete_job(&self.db, job.job_id).await?;

		if let Some(job_type) = job_type {
			self.mark_entity_failed(job_type, job).await?;
		}

		tracing::error!(
			job_id = %job.job_id,
			entity_id = %job.entity_id,
			category = %category,
			attempts,
			"Job dead-lettered."
		);

		Ok(ExecuteOutcome::DeadLettered { category })
	}

	async fn run_job(&self, job_type: JobType, job: &JobRecord) -> std::result::Result<(), JobFailure> {
		match job_type {
			JobType::GenerateOutput => self.run_generate(job).await,
			JobType::EmbedEntity => self.run_embed(job).await,
			JobType::IntegrateFeedback => self.run_integrate(job).await,
		}
	}

	async fn run_generate(&self, job: &JobRecord) -> std::result::Result<(), JobFailure> {
		let payload: GenerateOutputPayload = serde_json::from_value(job.payload.clone())?;
		let input = queries::fetch_input(&self.db, job.entity_id)
			.await?
			.ok_or_else(|| JobFailure::validation(format!("Input {} not found.", job.entity_id)))?;

		queries::update_input_status(&self.db, input.input_id, "processing").await?;

		let examples = self
			.find_similar(
				input.input_id,
				&SimilarFilters {
					output_kind: Some(payload.output_kind.clone()),
					content_kind: None,
				},
				self.cfg.retrieval.max_examples,
			)
			.await?;
		let prompt =
			crate::prompt::assemble(
				&input,
				&payload.output_kind,
				&examples,
				self.cfg.retrieval.max_example_chars,
			);
		let generation = self.guarded_generate(&prompt, &GenerateOptions::default()).await?;
		let output_id = queries::insert_output(
			&self.db,
			NewOutput {
				input_id: input.input_id,
				content: generation.content,
				output_kind: payload.output_kind,
				model: generation.model,
				parent_output_id: payload.parent_output_id,
				metadata: json!({
					"tokens_used": generation.tokens_used,
					"cost_usd": generation.cost_usd,
					"examples_injected": examples.len(),
				}),
			},
		)
		.await?;

		// The new output enters the retrieval pool once embedded and
		// qualified by feedback.
		self.dispatch(
			JobType::EmbedEntity,
			output_id,
			serde_json::to_value(EmbedEntityPayload { content_type: ContentType::Output })?,
			None,
		)
		.await?;

		Ok(())
	}

	async fn run_embed(&self, job: &JobRecord) -> std::result::Result<(), JobFailure> {
		let payload: EmbedEntityPayload = serde_json::from_value(job.payload.clone())?;

		self.embed_entity(job.entity_id, payload.content_type).await?;

		Ok(())
	}

	async fn run_integrate(&self, job: &JobRecord) -> std::result::Result<(), JobFailure> {
		self.integrate_feedback(job.entity_id).await?;

		Ok(())
	}

	async fn on_job_success(&self, job_type: JobType, job: &JobRecord) -> Result<()> {
		if job_type == JobType::GenerateOutput {
			queries::update_input_status(&self.db, job.entity_id, "completed").await?;
			self.notify_invalidate("input", &[job.entity_id]).await;
		}

		Ok(())
	}

	/// Fatal outcomes surface on the owning entity. Only inputs carry a
	/// status field; failures of output- or feedback-scoped jobs stay in the
	/// dead-letter store.
	async fn mark_entity_failed(&self, job_type: JobType, job: &JobRecord) -> Result<()> {
		let input_scoped = match job_type {
			JobType::GenerateOutput => true,
			JobType::EmbedEntity => {
				let payload: Option<EmbedEntityPayload> =
					serde_json::from_value(job.payload.clone()).ok();

				payload.map(|payload| payload.content_type == ContentType::Input).unwrap_or(false)
			},
			JobType::IntegrateFeedback => false,
		};

		if input_scoped {
			queries::update_input_status(&self.db, job.entity_id, "failed").await?;
			self.notify_invalidate("input", &[job.entity_id]).await;
		}

		Ok(())
	}
}
