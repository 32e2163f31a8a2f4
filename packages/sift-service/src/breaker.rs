use std::{collections::HashMap, sync::Mutex, time::Duration};

use time::OffsetDateTime;

use sift_domain::{
	breaker::{BreakerPolicy, BreakerState, CircuitBreaker},
	failure::FailureKind,
};
use sift_providers::{
	GatewayError,
	embedding::EmbeddingResponse,
	generate::{GenerateOptions, Generation},
};

use crate::SiftService;

/// Process-wide circuit breakers, one per external dependency name.
pub struct BreakerRegistry {
	policy: BreakerPolicy,
	breakers: Mutex<HashMap<String, CircuitBreaker>>,
}
impl BreakerRegistry {
	pub fn new(cfg: &sift_config::Breaker) -> Self {
		Self {
			policy: BreakerPolicy {
				failure_threshold: cfg.failure_threshold,
				recovery_timeout: Duration::from_secs(cfg.recovery_timeout_secs),
				half_open_max_probes: cfg.half_open_max_probes,
			},
			breakers: Mutex::new(HashMap::new()),
		}
	}

	pub fn try_acquire(&self, dependency: &str, now: OffsetDateTime) -> bool {
		let mut breakers = self.breakers.lock().unwrap_or_else(|err| err.into_inner());

		breakers
			.entry(dependency.to_string())
			.or_insert_with(|| CircuitBreaker::new(self.policy))
			.try_acquire(now)
	}

	pub fn on_success(&self, dependency: &str) {
		let mut breakers = self.breakers.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(breaker) = breakers.get_mut(dependency) {
			breaker.on_success();
		}
	}

	pub fn on_failure(&self, dependency: &str, now: OffsetDateTime) {
		let mut breakers = self.breakers.lock().unwrap_or_else(|err| err.into_inner());

		breakers
			.entry(dependency.to_string())
			.or_insert_with(|| CircuitBreaker::new(self.policy))
			.on_failure(now);
	}

	pub fn state(&self, dependency: &str) -> BreakerState {
		let breakers = self.breakers.lock().unwrap_or_else(|err| err.into_inner());

		breakers.get(dependency).map(CircuitBreaker::state).unwrap_or(BreakerState::Closed)
	}
}

fn circuit_open_error(dependency: &str) -> GatewayError {
	GatewayError::new(
		FailureKind::ServiceUnavailable,
		dependency,
		"Circuit open; failing fast without a gateway call.",
	)
}

impl SiftService {
	/// Runs a generation call through the provider's circuit breaker. An open
	/// circuit fails fast without touching the network.
	pub(crate) async fn guarded_generate(
		&self,
		prompt: &str,
		options: &GenerateOptions,
	) -> Result<Generation, GatewayError> {
		let cfg = &self.cfg.providers.generation;
		let dependency = cfg.provider_id.as_str();

		if !self.breakers.try_acquire(dependency, OffsetDateTime::now_utc()) {
			return Err(circuit_open_error(dependency));
		}

		match self.providers.generation.generate(cfg, prompt, options).await {
			Ok(generation) => {
				self.breakers.on_success(dependency);

				Ok(generation)
			},
			Err(err) => {
				self.breakers.on_failure(dependency, OffsetDateTime::now_utc());

				Err(err)
			},
		}
	}

	pub(crate) async fn guarded_embed(
		&self,
		texts: &[String],
	) -> Result<EmbeddingResponse, GatewayError> {
		let cfg = &self.cfg.providers.embedding;
		let dependency = cfg.provider_id.as_str();

		if !self.breakers.try_acquire(dependency, OffsetDateTime::now_utc()) {
			return Err(circuit_open_error(dependency));
		}

		match self.providers.embedding.embed(cfg, texts).await {
			Ok(response) => {
				self.breakers.on_success(dependency);

				Ok(response)
			},
			Err(err) => {
				self.breakers.on_failure(dependency, OffsetDateTime::now_utc());

				Err(err)
			},
		}
	}
}
