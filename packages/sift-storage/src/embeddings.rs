use serde_json::Value;
use uuid::Uuid;

use sift_domain::content::ContentType;

use crate::{
	Error, Result,
	db::Db,
	models::{EmbeddingRecord, QualifiedExampleRow},
};

pub struct NewEmbedding {
	pub content_id: Uuid,
	pub content_type: ContentType,
	pub vec: Vec<f32>,
	pub model: String,
	pub normalized: bool,
	pub metadata: Value,
}

pub struct ExampleFilters {
	pub exclude_input_id: Option<Uuid>,
	pub output_kind: Option<String>,
	pub content_kind: Option<String>,
}

/// Upserts the vector for `(content_id, content_type, model)`, replacing any
/// prior generation. The polymorphic reference is validated inside the same
/// transaction: the target row must exist in the table named by the content
/// type, so embedding a deleted or mismatched id fails instead of leaving a
/// dangling vector.
pub async fn upsert_embedding(db: &Db, new: NewEmbedding) -> Result<Uuid> {
	let mut tx = db.pool.begin().await?;
	let exists_sql = match new.content_type {
		ContentType::Input => "SELECT 1 FROM inputs WHERE input_id = $1",
		ContentType::Output => "SELECT 1 FROM outputs WHERE output_id = $1",
		ContentType::Feedback => "SELECT 1 FROM feedback WHERE feedback_id = $1",
	};
	let referent = sqlx::query_scalar::<_, i32>(exists_sql)
		.bind(new.content_id)
		.fetch_optional(&mut *tx)
		.await?;

	if referent.is_none() {
		return Err(Error::InvalidArgument(format!(
			"Embedding references missing {} row {}.",
			new.content_type, new.content_id
		)));
	}

	let embedding_id: Uuid = sqlx::query_scalar(
		"\
INSERT INTO embeddings (embedding_id, content_id, content_type, vec, model, dimensions, normalized, metadata)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (content_id, content_type, model) DO UPDATE
SET
	vec = EXCLUDED.vec,
	dimensions = EXCLUDED.dimensions,
	normalized = EXCLUDED.normalized,
	metadata = EXCLUDED.metadata,
	created_at = now()
RETURNING embedding_id",
	)
	.bind(Uuid::new_v4())
	.bind(new.content_id)
	.bind(new.content_type.as_str())
	.bind(&new.vec)
	.bind(&new.model)
	.bind(new.vec.len() as i32)
	.bind(new.normalized)
	.bind(&new.metadata)
	.fetch_one(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(embedding_id)
}

pub async fn fetch_embedding(
	db: &Db,
	content_id: Uuid,
	content_type: ContentType,
	model: &str,
) -> Result<Option<EmbeddingRecord>> {
	let embedding = sqlx::query_as::<_, EmbeddingRecord>(
		"SELECT * FROM embeddings WHERE content_id = $1 AND content_type = $2 AND model = $3",
	)
	.bind(content_id)
	.bind(content_type.as_str())
	.bind(model)
	.fetch_optional(&db.pool)
	.await?;

	Ok(embedding)
}

/// Retrieval candidates: output vectors of the given embedding model whose
/// output has a non-null quality score and accept feedback at or above the
/// confidence floor. One row per output, keeping its highest-confidence
/// qualifying feedback.
pub async fn fetch_qualified_examples(
	db: &Db,
	model: &str,
	min_confidence: f32,
	filters: &ExampleFilters,
) -> Result<Vec<QualifiedExampleRow>> {
	let rows = sqlx::query_as::<_, QualifiedExampleRow>(
		"\
SELECT DISTINCT ON (o.output_id)
	i.input_id,
	i.content AS input_content,
	i.content_kind,
	i.title AS input_title,
	o.output_id,
	o.content AS output_content,
	o.output_kind,
	o.model AS output_model,
	o.quality_score,
	o.created_at AS output_created_at,
	f.feedback_id,
	f.action AS feedback_action,
	f.confidence AS feedback_confidence,
	f.metadata AS feedback_metadata,
	e.vec
FROM embeddings e
JOIN outputs o ON o.output_id = e.content_id
JOIN inputs i ON i.input_id = o.input_id
JOIN feedback f ON f.output_id = o.output_id
WHERE e.content_type = 'output'
	AND e.model = $1
	AND o.quality_score IS NOT NULL
	AND f.action = 'accept'
	AND f.confidence >= $2
	AND ($3::uuid IS NULL OR i.input_id <> $3)
	AND ($4::text IS NULL OR o.output_kind = $4)
	AND ($5::text IS NULL OR i.content_kind = $5)
ORDER BY o.output_id, f.confidence DESC, f.created_at DESC",
	)
	.bind(model)
	.bind(min_confidence)
	.bind(filters.exclude_input_id)
	.bind(&filters.output_kind)
	.bind(&filters.content_kind)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}
