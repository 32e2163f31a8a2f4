pub mod db;
pub mod dead_letters;
pub mod embeddings;
pub mod jobs;
pub mod leases;
pub mod models;
pub mod queries;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
