use serde_json::Value;
use uuid::Uuid;

use crate::{
	Result,
	db::Db,
	models::{FeedbackRecord, InputRecord, OutputRecord},
};

pub struct NewInput {
	pub content: String,
	pub content_kind: String,
	pub source: String,
	pub title: Option<String>,
	pub metadata: Value,
}

pub struct NewOutput {
	pub input_id: Uuid,
	pub content: String,
	pub output_kind: String,
	pub model: String,
	pub parent_output_id: Option<Uuid>,
	pub metadata: Value,
}

pub struct NewFeedback {
	pub output_id: Uuid,
	pub user_id: Uuid,
	pub feedback_type: String,
	pub action: String,
	pub signal_type: String,
	pub confidence: f32,
	pub metadata: Value,
}

pub async fn insert_input(db: &Db, new: NewInput) -> Result<Uuid> {
	let input_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO inputs (input_id, content, content_kind, source, title, metadata)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(input_id)
	.bind(&new.content)
	.bind(&new.content_kind)
	.bind(&new.source)
	.bind(&new.title)
	.bind(&new.metadata)
	.execute(&db.pool)
	.await?;

	Ok(input_id)
}

pub async fn fetch_input(db: &Db, input_id: Uuid) -> Result<Option<InputRecord>> {
	let input = sqlx::query_as::<_, InputRecord>("SELECT * FROM inputs WHERE input_id = $1")
		.bind(input_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(input)
}

pub async fn update_input_status(db: &Db, input_id: Uuid, status: &str) -> Result<()> {
	sqlx::query("UPDATE inputs SET status = $1 WHERE input_id = $2")
		.bind(status)
		.bind(input_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn insert_output(db: &Db, new: NewOutput) -> Result<Uuid> {
	let output_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO outputs (output_id, input_id, content, output_kind, model, version, parent_output_id, metadata)
VALUES (
	$1,
	$2,
	$3,
	$4,
	$5,
	(SELECT COALESCE(MAX(version), 0) + 1 FROM outputs WHERE input_id = $2),
	$6,
	$7
)",
	)
	.bind(output_id)
	.bind(new.input_id)
	.bind(&new.content)
	.bind(&new.output_kind)
	.bind(&new.model)
	.bind(new.parent_output_id)
	.bind(&new.metadata)
	.execute(&db.pool)
	.await?;

	Ok(output_id)
}

pub async fn fetch_output(db: &Db, output_id: Uuid) -> Result<Option<OutputRecord>> {
	let output = sqlx::query_as::<_, OutputRecord>("SELECT * FROM outputs WHERE output_id = $1")
		.bind(output_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(output)
}

/// Inserts the feedback row and bumps the owning output's feedback count in
/// one transaction.
pub async fn insert_feedback(db: &Db, new: NewFeedback) -> Result<Uuid> {
	let feedback_id = Uuid::new_v4();
	let mut tx = db.pool.begin().await?;

	sqlx::query(
		"\
INSERT INTO feedback (feedback_id, output_id, user_id, feedback_type, action, signal_type, confidence, metadata)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
	)
	.bind(feedback_id)
	.bind(new.output_id)
	.bind(new.user_id)
	.bind(&new.feedback_type)
	.bind(&new.action)
	.bind(&new.signal_type)
	.bind(new.confidence)
	.bind(&new.metadata)
	.execute(&mut *tx)
	.await?;

	sqlx::query("UPDATE outputs SET feedback_count = feedback_count + 1 WHERE output_id = $1")
		.bind(new.output_id)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	Ok(feedback_id)
}

pub async fn fetch_feedback(db: &Db, feedback_id: Uuid) -> Result<Option<FeedbackRecord>> {
	let feedback =
		sqlx::query_as::<_, FeedbackRecord>("SELECT * FROM feedback WHERE feedback_id = $1")
			.bind(feedback_id)
			.fetch_optional(&db.pool)
			.await?;

	Ok(feedback)
}

/// Most recent feedback across all outputs, for pattern extraction.
pub async fn fetch_recent_feedback(db: &Db, limit: i64) -> Result<Vec<FeedbackRecord>> {
	let rows = sqlx::query_as::<_, FeedbackRecord>(
		"SELECT * FROM feedback ORDER BY created_at DESC LIMIT $1",
	)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn fetch_feedback_for_output(db: &Db, output_id: Uuid) -> Result<Vec<FeedbackRecord>> {
	let rows = sqlx::query_as::<_, FeedbackRecord>(
		"SELECT * FROM feedback WHERE output_id = $1 ORDER BY created_at ASC",
	)
	.bind(output_id)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

pub async fn update_output_quality(db: &Db, output_id: Uuid, score: f32) -> Result<()> {
	sqlx::query("UPDATE outputs SET quality_score = $1 WHERE output_id = $2")
		.bind(score)
		.bind(output_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn mark_feedback_integrated(db: &Db, output_id: Uuid, score: f32) -> Result<()> {
	sqlx::query(
		"UPDATE outputs SET feedback_integrated = TRUE, quality_score = $1 WHERE output_id = $2",
	)
	.bind(score)
	.bind(output_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
