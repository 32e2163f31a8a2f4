pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error(transparent)]
	Gateway(#[from] sift_providers::GatewayError),
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Encoding error: {message}")]
	Encoding { message: String },
}
impl From<sift_storage::Error> for Error {
	fn from(err: sift_storage::Error) -> Self {
		match err {
			sift_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			sift_storage::Error::NotFound(message) => Self::NotFound { message },
			sift_storage::Error::Conflict(message) => Self::Storage { message },
			sift_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Encoding { message: err.to_string() }
	}
}
