pub mod breaker;
pub mod dead_letter;
pub mod learning;
pub mod orchestrator;
pub mod prompt;
pub mod retrieval;

mod error;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sift_config::{Config, EmbeddingProviderConfig, GenerationProviderConfig};
use sift_domain::{
	retry::{Backoff, RetryPolicy},
	tiers::PriorityTier,
};
use sift_providers::{
	embedding::EmbeddingResponse,
	generate::{GenerateOptions, Generation},
};
use sift_storage::db::Db;

pub use breaker::BreakerRegistry;
pub use dead_letter::RequeueReport;
pub use learning::{CorrectionPair, FeedbackPatterns, PatternTheme, RecordFeedbackRequest};
pub use orchestrator::{EmbedEntityPayload, ExecuteOutcome, GenerateOutputPayload};
pub use retrieval::{SimilarExample, SimilarFilters};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		prompt: &'a str,
		options: &'a GenerateOptions,
	) -> BoxFuture<'a, sift_providers::Result<Generation>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<EmbeddingResponse>>;
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct InvalidationError {
	pub message: String,
}

/// Downstream read-cache invalidation. Fire-and-forget: callers log failures
/// and never propagate them.
pub trait CacheInvalidation
where
	Self: Send + Sync,
{
	fn invalidate<'a>(
		&'a self,
		entity_type: &'a str,
		entity_ids: &'a [Uuid],
	) -> BoxFuture<'a, std::result::Result<(), InvalidationError>>;

	fn bulk_invalidate<'a>(
		&'a self,
		tags: &'a [String],
	) -> BoxFuture<'a, std::result::Result<(), InvalidationError>>;
}

#[derive(Clone)]
pub struct Providers {
	pub generation: Arc<dyn GenerationProvider>,
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(
		generation: Arc<dyn GenerationProvider>,
		embedding: Arc<dyn EmbeddingProvider>,
	) -> Self {
		Self { generation, embedding }
	}
}

/// HTTP-backed providers used outside of tests.
pub struct HttpGeneration;
impl GenerationProvider for HttpGeneration {
	fn generate<'a>(
		&'a self,
		cfg: &'a GenerationProviderConfig,
		prompt: &'a str,
		options: &'a GenerateOptions,
	) -> BoxFuture<'a, sift_providers::Result<Generation>> {
		Box::pin(sift_providers::generate::generate(cfg, prompt, options))
	}
}

pub struct HttpEmbedding;
impl EmbeddingProvider for HttpEmbedding {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<EmbeddingResponse>> {
		Box::pin(sift_providers::embedding::embed(cfg, texts))
	}
}

/// Stand-in collaborator that only logs. The real invalidation service lives
/// outside this system.
pub struct TracingInvalidator;
impl CacheInvalidation for TracingInvalidator {
	fn invalidate<'a>(
		&'a self,
		entity_type: &'a str,
		entity_ids: &'a [Uuid],
	) -> BoxFuture<'a, std::result::Result<(), InvalidationError>> {
		Box::pin(async move {
			tracing::debug!(entity_type, count = entity_ids.len(), "Cache invalidation requested.");

			Ok(())
		})
	}

	fn bulk_invalidate<'a>(
		&'a self,
		tags: &'a [String],
	) -> BoxFuture<'a, std::result::Result<(), InvalidationError>> {
		Box::pin(async move {
			tracing::debug!(?tags, "Bulk cache invalidation requested.");

			Ok(())
		})
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
	GenerateOutput,
	EmbedEntity,
	IntegrateFeedback,
}
impl JobType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::GenerateOutput => "generate_output",
			Self::EmbedEntity => "embed_entity",
			Self::IntegrateFeedback => "integrate_feedback",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"generate_output" => Some(Self::GenerateOutput),
			"embed_entity" => Some(Self::EmbedEntity),
			"integrate_feedback" => Some(Self::IntegrateFeedback),
			_ => None,
		}
	}
}
impl std::fmt::Display for JobType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

pub struct SiftService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub cache_invalidation: Arc<dyn CacheInvalidation>,
	pub breakers: BreakerRegistry,
	pub(crate) retrieval_cache: retrieval::RetrievalCache,
}
impl SiftService {
	pub fn new(
		cfg: Config,
		db: Db,
		providers: Providers,
		cache_invalidation: Arc<dyn CacheInvalidation>,
	) -> Self {
		let breakers = BreakerRegistry::new(&cfg.breaker);

		Self {
			cfg,
			db,
			providers,
			cache_invalidation,
			breakers,
			retrieval_cache: retrieval::RetrievalCache::new(),
		}
	}

	pub(crate) fn job_cfg(&self, job_type: JobType) -> &sift_config::JobTypeConfig {
		match job_type {
			JobType::GenerateOutput => &self.cfg.orchestrator.generate_output,
			JobType::EmbedEntity => &self.cfg.orchestrator.embed_entity,
			JobType::IntegrateFeedback => &self.cfg.orchestrator.integrate_feedback,
		}
	}

	pub(crate) fn policy(&self, job_type: JobType) -> RetryPolicy {
		let cfg = self.job_cfg(job_type);
		let backoff = match &cfg.backoff {
			sift_config::BackoffConfig::Fixed { fixed_secs } =>
				Backoff::Fixed(std::time::Duration::from_secs(*fixed_secs)),
			sift_config::BackoffConfig::Schedule { delays_secs } => Backoff::Schedule(
				delays_secs.iter().map(|secs| std::time::Duration::from_secs(*secs)).collect(),
			),
		};

		RetryPolicy {
			max_tries: cfg.max_tries,
			backoff,
			timeout: std::time::Duration::from_secs(cfg.timeout_secs),
		}
	}

	pub(crate) fn tier_for(&self, job_type: JobType) -> PriorityTier {
		PriorityTier::parse(&self.job_cfg(job_type).tier).unwrap_or(PriorityTier::Medium)
	}

	/// Fire-and-forget notification of the external invalidation service.
	pub(crate) async fn notify_invalidate(&self, entity_type: &str, entity_ids: &[Uuid]) {
		if let Err(err) = self.cache_invalidation.invalidate(entity_type, entity_ids).await {
			tracing::warn!(entity_type, error = %err, "Cache invalidation failed.");
		}
	}

	pub(crate) async fn notify_bulk_invalidate(&self, tags: &[String]) {
		if let Err(err) = self.cache_invalidation.bulk_invalidate(tags).await {
			tracing::warn!(?tags, error = %err, "Bulk cache invalidation failed.");
		}
	}
}
