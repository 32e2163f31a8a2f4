mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	BackoffConfig, Breaker, Config, DeadLetter, EmbeddingProviderConfig, GenerationProviderConfig,
	JobTypeConfig, Learning, Orchestrator, Postgres, Providers, Retrieval, Service, Storage,
	TierWeights,
};

use std::{fs, path::Path};

const TIERS: [&str; 4] = ["urgent", "high", "medium", "low"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if !cfg.providers.generation.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.generation.temperature must be a finite number.".to_string(),
		});
	}

	for (label, key) in [
		("generation", &cfg.providers.generation.api_key),
		("embedding", &cfg.providers.embedding.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.orchestrator.workers == 0 {
		return Err(Error::Validation {
			message: "orchestrator.workers must be greater than zero.".to_string(),
		});
	}
	if cfg.orchestrator.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "orchestrator.poll_interval_ms must be greater than zero.".to_string(),
		});
	}

	for (tier, weight) in [
		("urgent", cfg.orchestrator.tier_weights.urgent),
		("high", cfg.orchestrator.tier_weights.high),
		("medium", cfg.orchestrator.tier_weights.medium),
		("low", cfg.orchestrator.tier_weights.low),
	] {
		if weight == 0 {
			return Err(Error::Validation {
				message: format!(
					"orchestrator.tier_weights.{tier} must be greater than zero so the tier cannot starve."
				),
			});
		}
	}

	for (label, job) in [
		("generate_output", &cfg.orchestrator.generate_output),
		("embed_entity", &cfg.orchestrator.embed_entity),
		("integrate_feedback", &cfg.orchestrator.integrate_feedback),
	] {
		validate_job_type(label, job)?;
	}

	if cfg.breaker.failure_threshold == 0 {
		return Err(Error::Validation {
			message: "breaker.failure_threshold must be greater than zero.".to_string(),
		});
	}
	if cfg.breaker.recovery_timeout_secs == 0 {
		return Err(Error::Validation {
			message: "breaker.recovery_timeout_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.breaker.half_open_max_probes == 0 {
		return Err(Error::Validation {
			message: "breaker.half_open_max_probes must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("learning.min_accept_confidence", cfg.learning.min_accept_confidence),
		("learning.broad_shift_delta", cfg.learning.broad_shift_delta),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if cfg.learning.top_patterns == 0 {
		return Err(Error::Validation {
			message: "learning.top_patterns must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.max_examples == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_examples must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.max_example_chars == 0 {
		return Err(Error::Validation {
			message: "retrieval.max_example_chars must be greater than zero.".to_string(),
		});
	}
	if cfg.dead_letter.retention_days <= 0 {
		return Err(Error::Validation {
			message: "dead_letter.retention_days must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_job_type(label: &str, job: &JobTypeConfig) -> Result<()> {
	if !(3..=5).contains(&job.max_tries) {
		return Err(Error::Validation {
			message: format!("orchestrator.{label}.max_tries must be between 3 and 5."),
		});
	}
	if !(120..=600).contains(&job.timeout_secs) {
		return Err(Error::Validation {
			message: format!(
				"orchestrator.{label}.timeout_secs must be between 120 and 600 seconds."
			),
		});
	}
	if let BackoffConfig::Schedule { delays_secs } = &job.backoff
		&& delays_secs.is_empty()
	{
		return Err(Error::Validation {
			message: format!("orchestrator.{label}.backoff.delays_secs must be non-empty."),
		});
	}
	if !TIERS.contains(&job.tier.as_str()) {
		return Err(Error::Validation {
			message: format!(
				"orchestrator.{label}.tier must be one of urgent, high, medium, or low."
			),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	for tier in [
		&mut cfg.orchestrator.generate_output.tier,
		&mut cfg.orchestrator.embed_entity.tier,
		&mut cfg.orchestrator.integrate_feedback.tier,
	] {
		*tier = tier.trim().to_ascii_lowercase();
	}

	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	if cfg.service.log_level.is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
