use std::{collections::HashMap, sync::Mutex, time::Duration};

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::{
	content::{ContentType, Embeddable},
	similarity::{RankingKey, compare_ranked, cosine_similarity},
};
use sift_storage::{
	embeddings::{self, ExampleFilters, NewEmbedding},
	queries,
};

use crate::{Error, Result, SiftService};

const CACHE_SCHEMA_VERSION: i32 = 1;

#[derive(Clone, Debug, Default, Serialize)]
pub struct SimilarFilters {
	pub output_kind: Option<String>,
	pub content_kind: Option<String>,
}

/// One retrieved example: the originating input, the accepted output, the
/// feedback that qualified it, and the similarity score against the probe.
#[derive(Clone, Debug)]
pub struct SimilarExample {
	pub input_id: Uuid,
	pub input_content: String,
	pub content_kind: String,
	pub input_title: Option<String>,
	pub output_id: Uuid,
	pub output_content: String,
	pub output_kind: String,
	pub quality_score: f32,
	pub output_created_at: OffsetDateTime,
	pub feedback_id: Uuid,
	pub feedback_action: String,
	pub feedback_confidence: f32,
	pub correction: Option<String>,
	pub similarity: f32,
}

struct CacheEntry {
	stored_at: OffsetDateTime,
	results: Vec<SimilarExample>,
}

/// Process-local memo of repeated `find_similar` queries. Purely an
/// optimization: it is cleared whenever a new qualifying example or
/// embedding lands, and correctness never depends on a hit.
pub(crate) struct RetrievalCache {
	entries: Mutex<HashMap<String, CacheEntry>>,
}
impl RetrievalCache {
	pub(crate) fn new() -> Self {
		Self { entries: Mutex::new(HashMap::new()) }
	}

	fn get(&self, key: &str, now: OffsetDateTime, ttl: Duration) -> Option<Vec<SimilarExample>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let entry = entries.get(key)?;

		if now - entry.stored_at > ttl {
			return None;
		}

		Some(entry.results.clone())
	}

	fn put(&self, key: String, results: Vec<SimilarExample>, now: OffsetDateTime) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.insert(key, CacheEntry { stored_at: now, results });
	}

	pub(crate) fn clear(&self) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.clear();
	}
}

fn cache_key(
	input_id: Uuid,
	filters: &SimilarFilters,
	limit: u32,
	model: &str,
) -> Result<String> {
	let payload = serde_json::json!({
		"kind": "find_similar",
		"schema_version": CACHE_SCHEMA_VERSION,
		"input_id": input_id,
		"filters": filters,
		"limit": limit,
		"model": model,
	});
	let raw = serde_json::to_vec(&payload)?;

	Ok(blake3::hash(&raw).to_hex().to_string())
}

impl SiftService {
	/// Computes and stores the embedding for one entity. `Ok(None)` means the
	/// entity has no embeddable text, which is a skip, not an error.
	pub async fn embed_entity(
		&self,
		content_id: Uuid,
		content_type: ContentType,
	) -> Result<Option<Uuid>> {
		let text = match content_type {
			ContentType::Input => queries::fetch_input(&self.db, content_id)
				.await?
				.ok_or_else(|| Error::NotFound { message: format!("Input {content_id}.") })?
				.embeddable_text(),
			ContentType::Output => queries::fetch_output(&self.db, content_id)
				.await?
				.ok_or_else(|| Error::NotFound { message: format!("Output {content_id}.") })?
				.embeddable_text(),
			ContentType::Feedback => queries::fetch_feedback(&self.db, content_id)
				.await?
				.ok_or_else(|| Error::NotFound { message: format!("Feedback {content_id}.") })?
				.embeddable_text(),
		};
		let Some(text) = text else {
			tracing::debug!(content_id = %content_id, content_type = %content_type, "Nothing to embed.");

			return Ok(None);
		};
		let embedding_id = self.embed_and_store(content_id, content_type, text).await?;

		Ok(Some(embedding_id))
	}

	pub(crate) async fn embed_and_store(
		&self,
		content_id: Uuid,
		content_type: ContentType,
		text: String,
	) -> Result<Uuid> {
		let cfg = &self.cfg.providers.embedding;
		let response = self.guarded_embed(std::slice::from_ref(&text)).await?;
		let tokens_used = response.tokens_used;
		let vector = response.vectors.into_iter().next().ok_or_else(|| Error::Gateway(
			sift_providers::GatewayError::new(
				sift_domain::failure::FailureKind::Unknown,
				&cfg.provider_id,
				"Embedding response contained no vectors.",
			),
		))?;

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::InvalidRequest {
				message: format!(
					"Embedding dimension {} does not match configured dimensions {}.",
					vector.len(),
					cfg.dimensions
				),
			});
		}

		// Keyed by the configured model so regeneration replaces the prior
		// vector even if the provider reports a model alias.
		let embedding_id = embeddings::upsert_embedding(
			&self.db,
			NewEmbedding {
				content_id,
				content_type,
				vec: vector,
				model: cfg.model.clone(),
				normalized: false,
				metadata: serde_json::json!({ "tokens_used": tokens_used }),
			},
		)
		.await?;

		self.retrieval_cache.clear();
		self.notify_invalidate(content_type.as_str(), &[content_id]).await;

		Ok(embedding_id)
	}

	/// Nearest qualifying examples for a probe input, ranked by similarity,
	/// then quality score, then recency. Empty when the probe has nothing to
	/// embed.
	pub async fn find_similar(
		&self,
		input_id: Uuid,
		filters: &SimilarFilters,
		limit: u32,
	) -> Result<Vec<SimilarExample>> {
		let input = queries::fetch_input(&self.db, input_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Input {input_id}.") })?;
		let Some(text) = input.embeddable_text() else {
			return Ok(Vec::new());
		};
		let model = self.cfg.providers.embedding.model.clone();
		let key = cache_key(input_id, filters, limit, &model)?;
		let now = OffsetDateTime::now_utc();
		let ttl = Duration::from_secs(self.cfg.retrieval.cache_ttl_secs);

		if self.cfg.retrieval.cache_enabled
			&& let Some(hit) = self.retrieval_cache.get(&key, now, ttl)
		{
			return Ok(hit);
		}

		let probe = match embeddings::fetch_embedding(&self.db, input_id, ContentType::Input, &model)
			.await?
		{
			Some(stored) => stored.vec,
			None => {
				self.embed_and_store(input_id, ContentType::Input, text).await?;

				embeddings::fetch_embedding(&self.db, input_id, ContentType::Input, &model)
					.await?
					.ok_or_else(|| Error::Storage {
						message: format!("Probe embedding for input {input_id} vanished."),
					})?
					.vec
			},
		};
		let candidates = embeddings::fetch_qualified_examples(
			&self.db,
			&model,
			self.cfg.learning.min_accept_confidence,
			&ExampleFilters {
				exclude_input_id: Some(input_id),
				output_kind: filters.output_kind.clone(),
				content_kind: filters.content_kind.clone(),
			},
		)
		.await?;
		let mut scored: Vec<(RankingKey, SimilarExample)> = Vec::with_capacity(candidates.len());

		for row in candidates {
			// Skip vectors of another dimensionality instead of failing the
			// whole query.
			let Some(similarity) = cosine_similarity(&probe, &row.vec) else {
				continue;
			};
			let correction =
				row.feedback_metadata.get("correction").and_then(Value::as_str).map(str::to_string);

			scored.push((
				RankingKey {
					similarity,
					quality_score: row.quality_score,
					created_at: row.output_created_at,
				},
				SimilarExample {
					input_id: row.input_id,
					input_content: row.input_content,
					content_kind: row.content_kind,
					input_title: row.input_title,
					output_id: row.output_id,
					output_content: row.output_content,
					output_kind: row.output_kind,
					quality_score: row.quality_score,
					output_created_at: row.output_created_at,
					feedback_id: row.feedback_id,
					feedback_action: row.feedback_action,
					feedback_confidence: row.feedback_confidence,
					correction,
					similarity,
				},
			));
		}

		scored.sort_by(|a, b| compare_ranked(&a.0, &b.0));
		scored.truncate(limit as usize);

		let results: Vec<SimilarExample> =
			scored.into_iter().map(|(_, example)| example).collect();

		if self.cfg.retrieval.cache_enabled {
			self.retrieval_cache.put(key, results.clone(), now);
		}

		Ok(results)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cache_key_changes_with_the_query_shape() {
		let input_id = Uuid::new_v4();
		let base = cache_key(input_id, &SimilarFilters::default(), 5, "embed-v1").unwrap();
		let other_limit = cache_key(input_id, &SimilarFilters::default(), 6, "embed-v1").unwrap();
		let other_filter = cache_key(
			input_id,
			&SimilarFilters { output_kind: Some("summary".to_string()), content_kind: None },
			5,
			"embed-v1",
		)
		.unwrap();
		let same = cache_key(input_id, &SimilarFilters::default(), 5, "embed-v1").unwrap();

		assert_eq!(base, same);
		assert_ne!(base, other_limit);
		assert_ne!(base, other_filter);
	}

	#[test]
	fn cache_honors_its_ttl() {
		let cache = RetrievalCache::new();
		let now = OffsetDateTime::now_utc();

		cache.put("key".to_string(), Vec::new(), now);

		assert!(cache.get("key", now, Duration::from_secs(300)).is_some());
		assert!(
			cache.get("key", now + Duration::from_secs(301), Duration::from_secs(300)).is_none()
		);
	}

	#[test]
	fn clear_drops_all_entries() {
		let cache = RetrievalCache::new();
		let now = OffsetDateTime::now_utc();

		cache.put("key".to_string(), Vec::new(), now);
		cache.clear();

		assert!(cache.get("key", now, Duration::from_secs(300)).is_none());
	}
}
