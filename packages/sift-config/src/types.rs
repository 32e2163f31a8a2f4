use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub orchestrator: Orchestrator,
	pub breaker: Breaker,
	pub learning: Learning,
	pub retrieval: Retrieval,
	pub dead_letter: DeadLetter,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub generation: GenerationProviderConfig,
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: Option<u32>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Orchestrator {
	#[serde(default = "default_workers")]
	pub workers: u32,
	pub poll_interval_ms: u64,
	pub lease_ttl_margin_secs: u64,
	#[serde(default)]
	pub tier_weights: TierWeights,
	pub generate_output: JobTypeConfig,
	pub embed_entity: JobTypeConfig,
	pub integrate_feedback: JobTypeConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TierWeights {
	pub urgent: u32,
	pub high: u32,
	pub medium: u32,
	pub low: u32,
}
impl Default for TierWeights {
	fn default() -> Self {
		Self { urgent: 8, high: 4, medium: 2, low: 1 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobTypeConfig {
	pub max_tries: u32,
	pub timeout_secs: u64,
	pub backoff: BackoffConfig,
	#[serde(default = "default_tier")]
	pub tier: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BackoffConfig {
	Fixed { fixed_secs: u64 },
	Schedule { delays_secs: Vec<u64> },
}

#[derive(Debug, Deserialize)]
pub struct Breaker {
	pub failure_threshold: u32,
	pub recovery_timeout_secs: u64,
	#[serde(default = "default_half_open_max_probes")]
	pub half_open_max_probes: u32,
}

#[derive(Debug, Deserialize)]
pub struct Learning {
	pub min_accept_confidence: f32,
	pub broad_shift_delta: f32,
	#[serde(default = "default_top_patterns")]
	pub top_patterns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Retrieval {
	pub max_examples: u32,
	#[serde(default = "default_cache_enabled")]
	pub cache_enabled: bool,
	#[serde(default = "default_cache_ttl_secs")]
	pub cache_ttl_secs: u64,
	#[serde(default = "default_max_example_chars")]
	pub max_example_chars: u32,
}

#[derive(Debug, Deserialize)]
pub struct DeadLetter {
	pub retention_days: i64,
	#[serde(default = "default_archive_interval_secs")]
	pub archive_interval_secs: u64,
}

fn default_workers() -> u32 {
	4
}

fn default_tier() -> String {
	"medium".to_string()
}

fn default_half_open_max_probes() -> u32 {
	2
}

fn default_top_patterns() -> u32 {
	5
}

fn default_cache_enabled() -> bool {
	true
}

fn default_cache_ttl_secs() -> u64 {
	300
}

fn default_max_example_chars() -> u32 {
	2_000
}

fn default_archive_interval_secs() -> u64 {
	3_600
}
