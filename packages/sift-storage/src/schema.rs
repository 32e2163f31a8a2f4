const INPUTS: &str = "\
CREATE TABLE IF NOT EXISTS inputs (
	input_id UUID PRIMARY KEY,
	content TEXT NOT NULL,
	content_kind TEXT NOT NULL,
	source TEXT NOT NULL,
	title TEXT,
	metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
	status TEXT NOT NULL DEFAULT 'pending',
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const OUTPUTS: &str = "\
CREATE TABLE IF NOT EXISTS outputs (
	output_id UUID PRIMARY KEY,
	input_id UUID NOT NULL REFERENCES inputs(input_id) ON DELETE CASCADE,
	content TEXT NOT NULL,
	output_kind TEXT NOT NULL,
	model TEXT NOT NULL,
	quality_score REAL,
	version INTEGER NOT NULL DEFAULT 1,
	parent_output_id UUID REFERENCES outputs(output_id),
	feedback_integrated BOOLEAN NOT NULL DEFAULT FALSE,
	feedback_count INTEGER NOT NULL DEFAULT 0,
	metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const OUTPUTS_INPUT_INDEX: &str =
	"CREATE INDEX IF NOT EXISTS idx_outputs_input ON outputs (input_id)";

const FEEDBACK: &str = "\
CREATE TABLE IF NOT EXISTS feedback (
	feedback_id UUID PRIMARY KEY,
	output_id UUID NOT NULL REFERENCES outputs(output_id) ON DELETE CASCADE,
	user_id UUID NOT NULL,
	feedback_type TEXT NOT NULL,
	action TEXT NOT NULL,
	signal_type TEXT NOT NULL,
	confidence REAL NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
	metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const FEEDBACK_OUTPUT_INDEX: &str =
	"CREATE INDEX IF NOT EXISTS idx_feedback_output ON feedback (output_id)";

const EMBEDDINGS: &str = "\
CREATE TABLE IF NOT EXISTS embeddings (
	embedding_id UUID PRIMARY KEY,
	content_id UUID NOT NULL,
	content_type TEXT NOT NULL,
	vec REAL[] NOT NULL,
	model TEXT NOT NULL,
	dimensions INTEGER NOT NULL,
	normalized BOOLEAN NOT NULL DEFAULT FALSE,
	metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
	created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
	UNIQUE (content_id, content_type, model)
)";

const EMBEDDINGS_CONTENT_INDEX: &str = "\
CREATE INDEX IF NOT EXISTS idx_embeddings_content ON embeddings (content_id, content_type)";

const JOBS: &str = "\
CREATE TABLE IF NOT EXISTS jobs (
	job_id UUID PRIMARY KEY,
	job_type TEXT NOT NULL,
	entity_id UUID NOT NULL,
	payload JSONB NOT NULL DEFAULT '{}'::jsonb,
	priority TEXT NOT NULL,
	status TEXT NOT NULL DEFAULT 'PENDING',
	attempts INTEGER NOT NULL DEFAULT 0,
	last_error TEXT,
	available_at TIMESTAMPTZ NOT NULL DEFAULT now(),
	created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const JOBS_CLAIM_INDEX: &str =
	"CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs (status, priority, available_at)";

const JOB_LEASES: &str = "\
CREATE TABLE IF NOT EXISTS job_leases (
	job_type TEXT NOT NULL,
	entity_id UUID NOT NULL,
	token UUID NOT NULL,
	expires_at TIMESTAMPTZ NOT NULL,
	PRIMARY KEY (job_type, entity_id)
)";

const DEAD_LETTERS: &str = "\
CREATE TABLE IF NOT EXISTS dead_letters (
	dead_letter_id UUID PRIMARY KEY,
	job_type TEXT NOT NULL,
	entity_id UUID NOT NULL,
	payload JSONB NOT NULL DEFAULT '{}'::jsonb,
	priority TEXT NOT NULL,
	error_summary TEXT NOT NULL,
	category TEXT NOT NULL,
	attempts INTEGER NOT NULL,
	failed_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const DEAD_LETTER_ARCHIVE: &str = "\
CREATE TABLE IF NOT EXISTS dead_letter_archive (
	archive_id UUID PRIMARY KEY,
	original_id UUID NOT NULL,
	job_type TEXT NOT NULL,
	entity_id UUID NOT NULL,
	payload JSONB NOT NULL DEFAULT '{}'::jsonb,
	priority TEXT NOT NULL,
	error_summary TEXT NOT NULL,
	category TEXT NOT NULL,
	attempts INTEGER NOT NULL,
	failed_at TIMESTAMPTZ NOT NULL,
	archived_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

pub fn render_schema() -> String {
	[
		INPUTS,
		OUTPUTS,
		OUTPUTS_INPUT_INDEX,
		FEEDBACK,
		FEEDBACK_OUTPUT_INDEX,
		EMBEDDINGS,
		EMBEDDINGS_CONTENT_INDEX,
		JOBS,
		JOBS_CLAIM_INDEX,
		JOB_LEASES,
		DEAD_LETTERS,
		DEAD_LETTER_ARCHIVE,
	]
	.join(";\n")
}
