use std::time::Duration;

use sift_domain::failure::FailureKind;

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Typed failure of an AI gateway call. The kind drives retry and
/// dead-letter decisions; `retry_after` carries the provider's own pacing
/// hint when one was given.
#[derive(Debug, thiserror::Error)]
#[error("{provider} gateway failure ({kind}): {message}")]
pub struct GatewayError {
	pub kind: FailureKind,
	pub provider: String,
	pub retry_after: Option<Duration>,
	pub error_code: Option<String>,
	pub message: String,
}
impl GatewayError {
	pub fn new(kind: FailureKind, provider: &str, message: impl Into<String>) -> Self {
		Self {
			kind,
			provider: provider.to_string(),
			retry_after: None,
			error_code: None,
			message: message.into(),
		}
	}

	pub fn from_transport(provider: &str, err: &reqwest::Error) -> Self {
		let kind = if err.is_timeout() {
			FailureKind::Timeout
		} else if err.is_connect() {
			FailureKind::NetworkError
		} else if err.is_decode() {
			FailureKind::Unknown
		} else {
			FailureKind::NetworkError
		};

		Self::new(kind, provider, err.to_string())
	}
}

/// Maps the gateway's HTTP response onto the failure taxonomy. The error
/// body, when parseable, can sharpen the status-derived kind (e.g. a 429
/// whose code says the monthly quota is gone is fatal, not transient).
pub fn classify_status(
	provider: &str,
	status: u16,
	error_code: Option<&str>,
	retry_after: Option<Duration>,
	message: &str,
) -> GatewayError {
	let quota_coded = error_code
		.map(|code| code.contains("quota") || code == "insufficient_credit")
		.unwrap_or(false);
	let kind = if quota_coded {
		FailureKind::QuotaExceeded
	} else {
		match status {
			429 => FailureKind::RateLimitExceeded,
			401 | 403 => FailureKind::AuthenticationFailed,
			402 => FailureKind::QuotaExceeded,
			400 | 422 => FailureKind::ValidationError,
			408 => FailureKind::Timeout,
			500..=599 => FailureKind::ServiceUnavailable,
			_ => FailureKind::Unknown,
		}
	};

	GatewayError {
		kind,
		provider: provider.to_string(),
		retry_after,
		error_code: error_code.map(str::to_string),
		message: message.to_string(),
	}
}
