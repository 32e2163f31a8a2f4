pub mod worker;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sift_service::{HttpEmbedding, HttpGeneration, Providers, SiftService, TracingInvalidator};

#[derive(Debug, Parser)]
#[command(rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = sift_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = sift_storage::db::Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let providers = Providers::new(Arc::new(HttpGeneration), Arc::new(HttpEmbedding));
	let service = Arc::new(SiftService::new(config, db, providers, Arc::new(TracingInvalidator)));

	worker::run_worker(service).await
}
