use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_config::{
	BackoffConfig, Breaker, Config, DeadLetter, EmbeddingProviderConfig,
	GenerationProviderConfig, JobTypeConfig, Learning, Orchestrator, Postgres, Retrieval, Service,
	Storage, TierWeights,
};
use sift_domain::{content::ContentType, failure::FailureKind, tiers::PriorityTier};
use sift_providers::{
	GatewayError,
	embedding::EmbeddingResponse,
	generate::{GenerateOptions, Generation},
};
use sift_service::{
	BoxFuture, EmbeddingProvider, ExecuteOutcome, GenerationProvider, JobType, Providers,
	RecordFeedbackRequest, SiftService, SimilarFilters, TracingInvalidator,
};
use sift_storage::{
	db::Db,
	embeddings::{self, NewEmbedding},
	jobs, leases,
	queries::{self, NewFeedback, NewInput, NewOutput},
};

const EMBED_MODEL: &str = "embed-v1";

struct StubEmbedding {
	vectors: Mutex<HashMap<String, Vec<f32>>>,
	default: Vec<f32>,
	calls: Arc<AtomicUsize>,
}
impl StubEmbedding {
	fn new(calls: Arc<AtomicUsize>) -> Self {
		Self { vectors: Mutex::new(HashMap::new()), default: vec![1.0, 0.0, 0.0], calls }
	}

	fn map(self, text: &str, vector: Vec<f32>) -> Self {
		self.vectors.lock().unwrap().insert(text.to_string(), vector);

		self
	}
}
impl EmbeddingProvider for StubEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, sift_providers::Result<EmbeddingResponse>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let mapped = self.vectors.lock().unwrap();
			let vectors = texts
				.iter()
				.map(|text| mapped.get(text.as_str()).cloned().unwrap_or_else(|| self.default.clone()))
				.collect();

			Ok(EmbeddingResponse { vectors, model: EMBED_MODEL.to_string(), tokens_used: 1 })
		})
	}
}

struct StubGeneration {
	content: String,
	calls: Arc<AtomicUsize>,
}
impl GenerationProvider for StubGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_prompt: &'a str,
		_options: &'a GenerateOptions,
	) -> BoxFuture<'a, sift_providers::Result<Generation>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(Generation {
				content: self.content.clone(),
				model: "structured-v1".to_string(),
				tokens_used: 42,
				cost_usd: Some(0.001),
			})
		})
	}
}

struct FailingGeneration {
	kind: FailureKind,
	calls: Arc<AtomicUsize>,
}
impl GenerationProvider for FailingGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a GenerationProviderConfig,
		_prompt: &'a str,
		_options: &'a GenerateOptions,
	) -> BoxFuture<'a, sift_providers::Result<Generation>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Err(GatewayError::new(self.kind, "ai-provider", "induced failure"))
		})
	}
}

fn job_type_cfg(max_tries: u32, tier: &str) -> JobTypeConfig {
	JobTypeConfig {
		max_tries,
		timeout_secs: 120,
		backoff: BackoffConfig::Fixed { fixed_secs: 0 },
		tier: tier.to_string(),
	}
}

fn test_config(dsn: String, failure_threshold: u32) -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage { postgres: Postgres { dsn, pool_max_conns: 4 } },
		providers: sift_config::Providers {
			generation: GenerationProviderConfig {
				provider_id: "ai-provider".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/v1/generate".to_string(),
				model: "structured-v1".to_string(),
				temperature: 0.2,
				max_tokens: None,
				timeout_ms: 5_000,
				default_headers: Default::default(),
			},
			embedding: EmbeddingProviderConfig {
				provider_id: "ai-provider".to_string(),
				api_base: "http://localhost".to_string(),
				api_key: "key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: EMBED_MODEL.to_string(),
				dimensions: 3,
				timeout_ms: 5_000,
				default_headers: Default::default(),
			},
		},
		orchestrator: Orchestrator {
			workers: 1,
			poll_interval_ms: 50,
			lease_ttl_margin_secs: 30,
			tier_weights: TierWeights { urgent: 8, high: 4, medium: 2, low: 1 },
			generate_output: job_type_cfg(3, "high"),
			embed_entity: job_type_cfg(3, "medium"),
			integrate_feedback: job_type_cfg(3, "medium"),
		},
		breaker: Breaker {
			failure_threshold,
			recovery_timeout_secs: 3_600,
			half_open_max_probes: 1,
		},
		learning: Learning {
			min_accept_confidence: 0.8,
			broad_shift_delta: 0.2,
			top_patterns: 5,
		},
		retrieval: Retrieval {
			max_examples: 5,
			cache_enabled: true,
			cache_ttl_secs: 300,
			max_example_chars: 2_000,
		},
		dead_letter: DeadLetter { retention_days: 90, archive_interval_secs: 3_600 },
	}
}

async fn build_service(dsn: &str, failure_threshold: u32, providers: Providers) -> SiftService {
	let cfg = test_config(dsn.to_string(), failure_threshold);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect.");

	db.ensure_schema().await.expect("Failed to bootstrap schema.");

	SiftService::new(cfg, db, providers, Arc::new(TracingInvalidator))
}

/// Claims and executes due jobs until the queue is quiet, as the worker pool
/// would, and returns how many executions ran.
async fn drain(service: &SiftService) -> usize {
	let mut executed = 0;

	loop {
		let job = jobs::claim_next_job(&service.db, &PriorityTier::ALL, OffsetDateTime::now_utc())
			.await
			.expect("Failed to claim.");
		let Some(job) = job else {
			break;
		};

		service.execute(&job).await.expect("Execution must settle, not error.");

		executed += 1;
	}

	executed
}

async fn insert_input(service: &SiftService, content: &str) -> Uuid {
	queries::insert_input(
		&service.db,
		NewInput {
			content: content.to_string(),
			content_kind: "note".to_string(),
			source: "manual".to_string(),
			title: None,
			metadata: json!({}),
		},
	)
	.await
	.expect("Failed to insert input.")
}

/// Seeds a complete reusable example: input, output with an embedding under
/// the test model, and accept feedback, then integrates it.
async fn seed_example(
	service: &SiftService,
	input_content: &str,
	output_content: &str,
	vector: Vec<f32>,
	confidence: f32,
) -> Uuid {
	let input_id = insert_input(service, input_content).await;
	let output_id = queries::insert_output(
		&service.db,
		NewOutput {
			input_id,
			content: output_content.to_string(),
			output_kind: "task_list".to_string(),
			model: "structured-v1".to_string(),
			parent_output_id: None,
			metadata: json!({}),
		},
	)
	.await
	.expect("Failed to insert output.");

	queries::insert_feedback(
		&service.db,
		NewFeedback {
			output_id,
			user_id: Uuid::new_v4(),
			feedback_type: "inline".to_string(),
			action: "accept".to_string(),
			signal_type: "explicit".to_string(),
			confidence,
			metadata: json!({}),
		},
	)
	.await
	.expect("Failed to insert feedback.");
	embeddings::upsert_embedding(
		&service.db,
		NewEmbedding {
			content_id: output_id,
			content_type: ContentType::Output,
			vec: vector,
			model: EMBED_MODEL.to_string(),
			normalized: false,
			metadata: json!({}),
		},
	)
	.await
	.expect("Failed to upsert embedding.");
	service.integrate_feedback(output_id).await.expect("Failed to integrate.");

	output_id
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn generation_pipeline_produces_output_and_chained_embedding() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let embed_calls = Arc::new(AtomicUsize::new(0));
	let generate_calls = Arc::new(AtomicUsize::new(0));
	let providers = Providers::new(
		Arc::new(StubGeneration {
			content: "- [ ] follow up with design".to_string(),
			calls: generate_calls.clone(),
		}),
		Arc::new(StubEmbedding::new(embed_calls.clone())),
	);
	let service = build_service(test_db.dsn(), 5, providers).await;
	let input_id = insert_input(&service, "Summarize sprint notes").await;
	let payload = json!({ "output_kind": "task_list" });
	let first = service
		.dispatch(JobType::GenerateOutput, input_id, payload.clone(), None)
		.await
		.expect("Dispatch failed.");
	let second = service
		.dispatch(JobType::GenerateOutput, input_id, payload, None)
		.await
		.expect("Dispatch failed.");

	assert!(first.is_some());
	assert!(second.is_none(), "identical pending dispatch must be a no-op");

	drain(&service).await;

	let input = queries::fetch_input(&service.db, input_id).await.unwrap().unwrap();

	assert_eq!(input.status, "completed");
	assert_eq!(generate_calls.load(Ordering::SeqCst), 1);

	let outputs: Vec<(Uuid,)> =
		sqlx::query_as("SELECT output_id FROM outputs WHERE input_id = $1")
			.bind(input_id)
			.fetch_all(&service.db.pool)
			.await
			.unwrap();

	assert_eq!(outputs.len(), 1, "exactly one output despite the duplicate dispatch");

	let output = queries::fetch_output(&service.db, outputs[0].0).await.unwrap().unwrap();

	assert_eq!(output.content, "- [ ] follow up with design");
	assert_eq!(output.version, 1);

	let output_embedding =
		embeddings::fetch_embedding(&service.db, output.output_id, ContentType::Output, EMBED_MODEL)
			.await
			.unwrap();
	let input_embedding =
		embeddings::fetch_embedding(&service.db, input_id, ContentType::Input, EMBED_MODEL)
			.await
			.unwrap();

	assert!(output_embedding.is_some(), "chained embed job must have run");
	assert!(input_embedding.is_some(), "probe embedding must be stored");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn feedback_updates_quality_and_marks_integration() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let providers = Providers::new(
		Arc::new(StubGeneration {
			content: "summary".to_string(),
			calls: Arc::new(AtomicUsize::new(0)),
		}),
		Arc::new(StubEmbedding::new(Arc::new(AtomicUsize::new(0)))),
	);
	let service = build_service(test_db.dsn(), 5, providers).await;
	let input_id = insert_input(&service, "Summarize sprint notes").await;
	let output_id = queries::insert_output(
		&service.db,
		NewOutput {
			input_id,
			content: "summary".to_string(),
			output_kind: "summary".to_string(),
			model: "structured-v1".to_string(),
			parent_output_id: None,
			metadata: json!({}),
		},
	)
	.await
	.unwrap();

	service
		.record_feedback(RecordFeedbackRequest {
			output_id,
			user_id: Uuid::new_v4(),
			action: "accept".to_string(),
			confidence: 1.0,
			correction: None,
			metadata: json!({}),
		})
		.await
		.expect("Failed to record feedback.");
	drain(&service).await;

	let output = queries::fetch_output(&service.db, output_id).await.unwrap().unwrap();

	assert_eq!(output.quality_score, Some(1.0));
	assert!(output.feedback_integrated);
	assert_eq!(output.feedback_count, 1);

	// A weaker edit pulls the weighted score down to 1.3 / 1.5.
	service
		.record_feedback(RecordFeedbackRequest {
			output_id,
			user_id: Uuid::new_v4(),
			action: "edit".to_string(),
			confidence: 0.5,
			correction: Some("tighter summary".to_string()),
			metadata: json!({ "edit_reason": "tone" }),
		})
		.await
		.expect("Failed to record feedback.");
	drain(&service).await;

	let output = queries::fetch_output(&service.db, output_id).await.unwrap().unwrap();
	let score = output.quality_score.expect("score exists");

	assert!((score - 0.866_666_7).abs() < 1e-5, "got {score}");
	assert_eq!(output.feedback_count, 2);

	let rejected = service
		.record_feedback(RecordFeedbackRequest {
			output_id,
			user_id: Uuid::new_v4(),
			action: "accept".to_string(),
			confidence: 1.5,
			correction: None,
			metadata: json!({}),
		})
		.await;

	assert!(rejected.is_err(), "confidence outside [0,1] must be rejected");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn rate_limited_job_dead_letters_after_max_tries() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let generate_calls = Arc::new(AtomicUsize::new(0));
	let providers = Providers::new(
		Arc::new(FailingGeneration {
			kind: FailureKind::RateLimitExceeded,
			calls: generate_calls.clone(),
		}),
		Arc::new(StubEmbedding::new(Arc::new(AtomicUsize::new(0)))),
	);
	// High threshold keeps the breaker out of this test's way.
	let service = build_service(test_db.dsn(), 100, providers).await;
	let input_id = insert_input(&service, "Summarize sprint notes").await;

	service
		.dispatch(JobType::GenerateOutput, input_id, json!({ "output_kind": "summary" }), None)
		.await
		.expect("Dispatch failed.");
	drain(&service).await;

	assert_eq!(generate_calls.load(Ordering::SeqCst), 3, "no fourth attempt may occur");

	let dead = service.list_dead_letters(None, 10).await.expect("Failed to list dead letters.");

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].category, "rate_limit");
	assert_eq!(dead[0].attempts, 3);

	let input = queries::fetch_input(&service.db, input_id).await.unwrap().unwrap();

	assert_eq!(input.status, "failed");

	let remaining: i64 = sqlx::query_scalar("SELECT count(*) FROM jobs WHERE status <> 'DONE'")
		.fetch_one(&service.db.pool)
		.await
		.unwrap();

	assert_eq!(remaining, 0, "the dead-lettered job must leave the queue");

	// Requeue restores a live job with a fresh attempt budget.
	let requeued = service.requeue_dead_letter(dead[0].dead_letter_id).await.unwrap();

	assert!(requeued.is_some());
	assert!(service.list_dead_letters(None, 10).await.unwrap().is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn open_circuit_fails_fast_without_gateway_calls() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let generate_calls = Arc::new(AtomicUsize::new(0));
	let providers = Providers::new(
		Arc::new(FailingGeneration {
			kind: FailureKind::ServiceUnavailable,
			calls: generate_calls.clone(),
		}),
		Arc::new(StubEmbedding::new(Arc::new(AtomicUsize::new(0)))),
	);
	let service = build_service(test_db.dsn(), 2, providers).await;
	let input_id = insert_input(&service, "Summarize sprint notes").await;

	service
		.dispatch(JobType::GenerateOutput, input_id, json!({ "output_kind": "summary" }), None)
		.await
		.expect("Dispatch failed.");
	drain(&service).await;

	// Two real failures open the breaker; the third attempt fails fast and
	// dead-letters without another network call.
	assert_eq!(generate_calls.load(Ordering::SeqCst), 2);

	let dead = service.list_dead_letters(None, 10).await.unwrap();

	assert_eq!(dead.len(), 1);
	assert_eq!(dead[0].category, "service_error");
	assert_eq!(dead[0].attempts, 3);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn find_similar_ranks_by_similarity_and_excludes_unqualified() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let embed_calls = Arc::new(AtomicUsize::new(0));
	let stub = StubEmbedding::new(embed_calls.clone()).map("probe text", vec![1.0, 0.0, 0.0]);
	let providers = Providers::new(
		Arc::new(StubGeneration {
			content: "unused".to_string(),
			calls: Arc::new(AtomicUsize::new(0)),
		}),
		Arc::new(stub),
	);
	let service = build_service(test_db.dsn(), 5, providers).await;
	let exact = seed_example(&service, "same notes", "- [ ] a", vec![1.0, 0.0, 0.0], 1.0).await;
	let close = seed_example(&service, "close notes", "- [ ] b", vec![0.8, 0.6, 0.0], 0.9).await;
	let far = seed_example(&service, "unrelated", "- [ ] c", vec![0.0, 1.0, 0.0], 1.0).await;

	// Accept feedback below the confidence floor never qualifies.
	let unqualified =
		seed_example(&service, "weak accept", "- [ ] d", vec![1.0, 0.0, 0.0], 0.5).await;
	let probe_id = insert_input(&service, "probe text").await;
	let results = service
		.find_similar(probe_id, &SimilarFilters::default(), 10)
		.await
		.expect("find_similar failed.");
	let output_ids: Vec<Uuid> = results.iter().map(|example| example.output_id).collect();

	assert_eq!(output_ids, vec![exact, close, far]);
	assert!(!output_ids.contains(&unqualified));
	assert!(results[0].similarity > 0.99);
	assert!(results.windows(2).all(|pair| pair[0].similarity >= pair[1].similarity));
	assert_eq!(results[0].feedback_action, "accept");

	// The repeated query is served from cache; integrating a new qualifying
	// example must invalidate it.
	let cached = service.find_similar(probe_id, &SimilarFilters::default(), 10).await.unwrap();

	assert_eq!(cached.len(), 3);

	let fresh =
		seed_example(&service, "new notes", "- [ ] e", vec![0.9, 0.1, 0.0], 1.0).await;
	let refreshed = service.find_similar(probe_id, &SimilarFilters::default(), 10).await.unwrap();

	assert_eq!(refreshed.len(), 4);
	assert!(refreshed.iter().any(|example| example.output_id == fresh));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn empty_input_short_circuits_embedding() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let embed_calls = Arc::new(AtomicUsize::new(0));
	let providers = Providers::new(
		Arc::new(StubGeneration {
			content: "unused".to_string(),
			calls: Arc::new(AtomicUsize::new(0)),
		}),
		Arc::new(StubEmbedding::new(embed_calls.clone())),
	);
	let service = build_service(test_db.dsn(), 5, providers).await;
	let input_id = insert_input(&service, "   ").await;

	service
		.dispatch(JobType::EmbedEntity, input_id, json!({ "content_type": "input" }), None)
		.await
		.expect("Dispatch failed.");
	drain(&service).await;

	assert_eq!(embed_calls.load(Ordering::SeqCst), 0, "no gateway call for empty text");
	assert!(
		embeddings::fetch_embedding(&service.db, input_id, ContentType::Input, EMBED_MODEL)
			.await
			.unwrap()
			.is_none()
	);
	assert!(service.list_dead_letters(None, 10).await.unwrap().is_empty());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set SIFT_PG_DSN to run."]
async fn held_lease_defers_execution_and_suppresses_dispatch() {
	let Some(dsn) = sift_testkit::env_dsn() else {
		eprintln!("Skipping; set SIFT_PG_DSN to run this test.");

		return;
	};
	let test_db = sift_testkit::TestDatabase::new(&dsn).await.expect("Failed to create test db.");
	let generate_calls = Arc::new(AtomicUsize::new(0));
	let providers = Providers::new(
		Arc::new(StubGeneration { content: "out".to_string(), calls: generate_calls.clone() }),
		Arc::new(StubEmbedding::new(Arc::new(AtomicUsize::new(0)))),
	);
	let service = build_service(test_db.dsn(), 5, providers).await;
	let input_id = insert_input(&service, "notes").await;
	let now = OffsetDateTime::now_utc();
	let token = leases::acquire_lease(
		&service.db,
		"generate_output",
		input_id,
		std::time::Duration::from_secs(300),
		now,
	)
	.await
	.unwrap()
	.expect("External lease must be granted.");

	// Dispatch while the lease is held is a no-op.
	let suppressed = service
		.dispatch(JobType::GenerateOutput, input_id, json!({ "output_kind": "summary" }), None)
		.await
		.unwrap();

	assert!(suppressed.is_none());

	// A job that was already queued defers instead of running concurrently.
	let job_id = jobs::enqueue_job(
		&service.db,
		"generate_output",
		input_id,
		&json!({ "output_kind": "summary" }),
		PriorityTier::High,
		now,
	)
	.await
	.unwrap()
	.expect("Enqueue must succeed.");
	let job = jobs::claim_next_job(&service.db, &PriorityTier::ALL, OffsetDateTime::now_utc())
		.await
		.unwrap()
		.expect("Job must be claimable.");

	assert_eq!(job.job_id, job_id);

	let outcome = service.execute(&job).await.unwrap();

	assert_eq!(outcome, ExecuteOutcome::LeaseHeld);
	assert_eq!(generate_calls.load(Ordering::SeqCst), 0);

	// Once released, execution proceeds.
	assert!(
		leases::release_lease(&service.db, "generate_output", input_id, token).await.unwrap()
	);

	let outcome = service.execute(&job).await.unwrap();

	assert_eq!(outcome, ExecuteOutcome::Completed);
	assert_eq!(generate_calls.load(Ordering::SeqCst), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
