use serde::{Deserialize, Serialize};

/// Classified failure of a job or gateway call. The kind alone decides retry
/// behavior and dead-letter categorization.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	RateLimitExceeded,
	ServiceUnavailable,
	Timeout,
	NetworkError,
	AuthenticationFailed,
	QuotaExceeded,
	ValidationError,
	Unknown,
}
impl FailureKind {
	/// Unknown failures retry up to the policy's max tries rather than
	/// dead-lettering on first sight.
	pub fn is_retryable(self) -> bool {
		match self {
			Self::RateLimitExceeded
			| Self::ServiceUnavailable
			| Self::Timeout
			| Self::NetworkError
			| Self::Unknown => true,
			Self::AuthenticationFailed | Self::QuotaExceeded | Self::ValidationError => false,
		}
	}

	pub fn category(self) -> DeadLetterCategory {
		match self {
			Self::Timeout => DeadLetterCategory::Timeout,
			Self::RateLimitExceeded | Self::QuotaExceeded => DeadLetterCategory::RateLimit,
			Self::AuthenticationFailed => DeadLetterCategory::AuthError,
			Self::ServiceUnavailable | Self::NetworkError => DeadLetterCategory::ServiceError,
			Self::ValidationError => DeadLetterCategory::ValidationError,
			Self::Unknown => DeadLetterCategory::Unknown,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::RateLimitExceeded => "rate_limit_exceeded",
			Self::ServiceUnavailable => "service_unavailable",
			Self::Timeout => "timeout",
			Self::NetworkError => "network_error",
			Self::AuthenticationFailed => "authentication_failed",
			Self::QuotaExceeded => "quota_exceeded",
			Self::ValidationError => "validation_error",
			Self::Unknown => "unknown",
		}
	}
}
impl std::fmt::Display for FailureKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterCategory {
	Timeout,
	RateLimit,
	AuthError,
	ServiceError,
	ValidationError,
	Unknown,
}
impl DeadLetterCategory {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Timeout => "timeout",
			Self::RateLimit => "rate_limit",
			Self::AuthError => "auth_error",
			Self::ServiceError => "service_error",
			Self::ValidationError => "validation_error",
			Self::Unknown => "unknown",
		}
	}
}
impl std::fmt::Display for DeadLetterCategory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transient_kinds_are_retryable() {
		for kind in [
			FailureKind::RateLimitExceeded,
			FailureKind::ServiceUnavailable,
			FailureKind::Timeout,
			FailureKind::NetworkError,
			FailureKind::Unknown,
		] {
			assert!(kind.is_retryable(), "{kind} must be retryable");
		}
	}

	#[test]
	fn fatal_kinds_skip_retry() {
		for kind in [
			FailureKind::AuthenticationFailed,
			FailureKind::QuotaExceeded,
			FailureKind::ValidationError,
		] {
			assert!(!kind.is_retryable(), "{kind} must not be retryable");
		}
	}

	#[test]
	fn kinds_map_to_dead_letter_categories() {
		assert_eq!(FailureKind::Timeout.category(), DeadLetterCategory::Timeout);
		assert_eq!(FailureKind::RateLimitExceeded.category(), DeadLetterCategory::RateLimit);
		assert_eq!(FailureKind::QuotaExceeded.category(), DeadLetterCategory::RateLimit);
		assert_eq!(FailureKind::AuthenticationFailed.category(), DeadLetterCategory::AuthError);
		assert_eq!(FailureKind::NetworkError.category(), DeadLetterCategory::ServiceError);
		assert_eq!(FailureKind::ServiceUnavailable.category(), DeadLetterCategory::ServiceError);
		assert_eq!(FailureKind::ValidationError.category(), DeadLetterCategory::ValidationError);
		assert_eq!(FailureKind::Unknown.category(), DeadLetterCategory::Unknown);
	}
}
