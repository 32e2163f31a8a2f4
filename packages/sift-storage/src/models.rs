use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use sift_domain::content::{Embeddable, first_non_empty};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct InputRecord {
	pub input_id: Uuid,
	pub content: String,
	pub content_kind: String,
	pub source: String,
	pub title: Option<String>,
	pub metadata: Value,
	pub status: String,
	pub created_at: OffsetDateTime,
}
impl Embeddable for InputRecord {
	fn embeddable_text(&self) -> Option<String> {
		let description = self.metadata.get("description").and_then(Value::as_str);

		first_non_empty(&[Some(self.content.as_str()), self.title.as_deref(), description])
			.map(str::to_string)
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct OutputRecord {
	pub output_id: Uuid,
	pub input_id: Uuid,
	pub content: String,
	pub output_kind: String,
	pub model: String,
	pub quality_score: Option<f32>,
	pub version: i32,
	pub parent_output_id: Option<Uuid>,
	pub feedback_integrated: bool,
	pub feedback_count: i32,
	pub metadata: Value,
	pub created_at: OffsetDateTime,
}
impl Embeddable for OutputRecord {
	fn embeddable_text(&self) -> Option<String> {
		let title = self.metadata.get("title").and_then(Value::as_str);
		let description = self.metadata.get("description").and_then(Value::as_str);

		first_non_empty(&[Some(self.content.as_str()), title, description]).map(str::to_string)
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct FeedbackRecord {
	pub feedback_id: Uuid,
	pub output_id: Uuid,
	pub user_id: Uuid,
	pub feedback_type: String,
	pub action: String,
	pub signal_type: String,
	pub confidence: f32,
	pub metadata: Value,
	pub created_at: OffsetDateTime,
}
impl Embeddable for FeedbackRecord {
	fn embeddable_text(&self) -> Option<String> {
		let correction = self.metadata.get("correction").and_then(Value::as_str);
		let reason = self.metadata.get("edit_reason").and_then(Value::as_str);

		first_non_empty(&[correction, reason]).map(str::to_string)
	}
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct EmbeddingRecord {
	pub embedding_id: Uuid,
	pub content_id: Uuid,
	pub content_type: String,
	pub vec: Vec<f32>,
	pub model: String,
	pub dimensions: i32,
	pub normalized: bool,
	pub metadata: Value,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct JobRecord {
	pub job_id: Uuid,
	pub job_type: String,
	pub entity_id: Uuid,
	pub payload: Value,
	pub priority: String,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct DeadLetterRecord {
	pub dead_letter_id: Uuid,
	pub job_type: String,
	pub entity_id: Uuid,
	pub payload: Value,
	pub priority: String,
	pub error_summary: String,
	pub category: String,
	pub attempts: i32,
	pub failed_at: OffsetDateTime,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ArchivedDeadLetterRecord {
	pub archive_id: Uuid,
	pub original_id: Uuid,
	pub job_type: String,
	pub entity_id: Uuid,
	pub payload: Value,
	pub priority: String,
	pub error_summary: String,
	pub category: String,
	pub attempts: i32,
	pub failed_at: OffsetDateTime,
	pub archived_at: OffsetDateTime,
}

/// One retrieval candidate: the stored output vector joined to its input and
/// the accept feedback that qualified it for reuse.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct QualifiedExampleRow {
	pub input_id: Uuid,
	pub input_content: String,
	pub content_kind: String,
	pub input_title: Option<String>,
	pub output_id: Uuid,
	pub output_content: String,
	pub output_kind: String,
	pub output_model: String,
	pub quality_score: f32,
	pub output_created_at: OffsetDateTime,
	pub feedback_id: Uuid,
	pub feedback_action: String,
	pub feedback_confidence: f32,
	pub feedback_metadata: Value,
	pub vec: Vec<f32>,
}
