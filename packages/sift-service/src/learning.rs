use std::collections::HashMap;

use serde_json::{Value, json};
use uuid::Uuid;

use sift_domain::quality::{self, QualitySample};
use sift_storage::{
	models::FeedbackRecord,
	queries::{self, NewFeedback},
};

use crate::{Error, JobType, Result, SiftService};

const PATTERN_SAMPLE_LIMIT: i64 = 500;

pub struct RecordFeedbackRequest {
	pub output_id: Uuid,
	pub user_id: Uuid,
	pub action: String,
	pub confidence: f32,
	pub correction: Option<String>,
	pub metadata: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PatternTheme {
	pub tag: String,
	pub occurrences: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionPair {
	pub original: String,
	pub corrected: String,
}

#[derive(Clone, Debug)]
pub struct FeedbackPatterns {
	pub themes: Vec<PatternTheme>,
	pub corrections: Vec<CorrectionPair>,
}

impl SiftService {
	/// Persists one feedback event and schedules asynchronous integration.
	/// The feedback type and signal type are derived from the action;
	/// correction text lands in the metadata for retrieval-time injection.
	pub async fn record_feedback(&self, req: RecordFeedbackRequest) -> Result<FeedbackRecord> {
		if !req.confidence.is_finite() || !(0.0..=1.0).contains(&req.confidence) {
			return Err(Error::InvalidRequest {
				message: format!("Feedback confidence {} must be in [0, 1].", req.confidence),
			});
		}

		queries::fetch_output(&self.db, req.output_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Output {}.", req.output_id) })?;

		let mut metadata = match req.metadata {
			Value::Object(map) => map,
			Value::Null => Default::default(),
			other =>
				return Err(Error::InvalidRequest {
					message: format!("Feedback metadata must be an object, got {other}."),
				}),
		};

		if let Some(correction) = req.correction {
			metadata.insert("correction".to_string(), Value::String(correction));
		}

		let feedback_id = queries::insert_feedback(
			&self.db,
			NewFeedback {
				output_id: req.output_id,
				user_id: req.user_id,
				feedback_type: quality::feedback_type(&req.action).to_string(),
				action: req.action.clone(),
				signal_type: quality::signal_type(&req.action).to_string(),
				confidence: req.confidence,
				metadata: Value::Object(metadata),
			},
		)
		.await?;
		let feedback = queries::fetch_feedback(&self.db, feedback_id)
			.await?
			.ok_or_else(|| Error::Storage { message: format!("Feedback {feedback_id} vanished.") })?;

		tracing::info!(
			output_id = %req.output_id,
			action = %req.action,
			confidence = req.confidence,
			"Feedback recorded."
		);
		self.dispatch(JobType::IntegrateFeedback, req.output_id, json!({}), None).await?;

		Ok(feedback)
	}

	/// Recomputes the confidence-weighted quality score and stores it on the
	/// output. `None` while the output has no feedback at all.
	pub async fn recompute_quality(&self, output_id: Uuid) -> Result<Option<f32>> {
		let rows = queries::fetch_feedback_for_output(&self.db, output_id).await?;
		let samples: Vec<QualitySample> = rows
			.iter()
			.map(|row| QualitySample {
				action_score: quality::action_score(&row.action),
				confidence: row.confidence,
			})
			.collect();
		let Some(score) = quality::weighted_quality(&samples) else {
			return Ok(None);
		};

		queries::update_output_quality(&self.db, output_id, score).await?;

		Ok(Some(score))
	}

	/// Folds accumulated feedback into the output: recomputes the quality
	/// score, marks the output as a reusable example when qualifying
	/// high-confidence accept feedback exists, and invalidates derived
	/// caches — broadly when the score moved more than the configured shift
	/// delta, narrowly otherwise.
	pub async fn integrate_feedback(&self, output_id: Uuid) -> Result<Option<f32>> {
		let output = queries::fetch_output(&self.db, output_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Output {output_id}.") })?;
		let previous = output.quality_score;
		let rows = queries::fetch_feedback_for_output(&self.db, output_id).await?;
		let samples: Vec<QualitySample> = rows
			.iter()
			.map(|row| QualitySample {
				action_score: quality::action_score(&row.action),
				confidence: row.confidence,
			})
			.collect();
		let Some(score) = quality::weighted_quality(&samples) else {
			return Ok(None);
		};
		let qualifying = rows.iter().any(|row| {
			row.action == "accept" && row.confidence >= self.cfg.learning.min_accept_confidence
		});

		if qualifying {
			queries::mark_feedback_integrated(&self.db, output_id, score).await?;
			// A new reusable example changes what find_similar may return.
			self.retrieval_cache.clear();
		} else {
			queries::update_output_quality(&self.db, output_id, score).await?;
		}

		let broad_shift = previous
			.map(|prev| (score - prev).abs() > self.cfg.learning.broad_shift_delta)
			.unwrap_or(false);

		if broad_shift {
			self.notify_bulk_invalidate(&["outputs".to_string(), "retrieval".to_string()]).await;
		} else {
			self.notify_invalidate("output", &[output_id]).await;
		}

		tracing::info!(
			output_id = %output_id,
			score,
			qualifying,
			broad_shift,
			"Feedback integrated."
		);

		Ok(Some(score))
	}

	/// Top recurring correction themes and literal correction pairs over
	/// recent feedback.
	pub async fn feedback_patterns(&self) -> Result<FeedbackPatterns> {
		let rows = queries::fetch_recent_feedback(&self.db, PATTERN_SAMPLE_LIMIT).await?;

		Ok(extract_patterns(&rows, self.cfg.learning.top_patterns as usize))
	}
}

/// Groups feedback by its metadata tags (`edit_reason`, `category`) into a
/// bounded list of recurring themes, and collects literal before/after
/// correction pairs where both sides were stored.
pub fn extract_patterns(feedback: &[FeedbackRecord], top_n: usize) -> FeedbackPatterns {
	let mut counts: HashMap<String, usize> = HashMap::new();
	let mut corrections = Vec::new();

	for row in feedback {
		for tag_key in ["edit_reason", "category"] {
			if let Some(tag) = row.metadata.get(tag_key).and_then(Value::as_str) {
				let tag = tag.trim();

				if !tag.is_empty() {
					*counts.entry(tag.to_string()).or_insert(0) += 1;
				}
			}
		}

		if let Some(corrected) = row.metadata.get("correction").and_then(Value::as_str)
			&& let Some(original) = row.metadata.get("original").and_then(Value::as_str)
		{
			corrections.push(CorrectionPair {
				original: original.to_string(),
				corrected: corrected.to_string(),
			});
		}
	}

	let mut themes: Vec<PatternTheme> =
		counts.into_iter().map(|(tag, occurrences)| PatternTheme { tag, occurrences }).collect();

	themes.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.tag.cmp(&b.tag)));
	themes.truncate(top_n);

	FeedbackPatterns { themes, corrections }
}
