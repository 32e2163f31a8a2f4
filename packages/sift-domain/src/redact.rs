const MAX_STORED_ERROR_CHARS: usize = 1_024;

/// Scrubs credentials out of failure text before it is persisted to the job
/// queue or the dead-letter store, and bounds its length.
pub fn redact_error_text(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = match raw.split(sep).next() {
					Some(prefix) => prefix,
					None => raw,
				};

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_STORED_ERROR_CHARS {
		out = out.chars().take(MAX_STORED_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_tokens_are_redacted() {
		let out = redact_error_text("401 from gateway: Bearer sk-live-12345 rejected");

		assert!(out.contains("Bearer [REDACTED]"));
		assert!(!out.contains("sk-live-12345"));
	}

	#[test]
	fn key_value_secrets_are_redacted() {
		let out = redact_error_text("request failed with api_key=sk-9876 attached");

		assert_eq!(out, "request failed with api_key=[REDACTED] attached");
	}

	#[test]
	fn long_errors_are_truncated() {
		let out = redact_error_text(&"word ".repeat(600));

		assert!(out.chars().count() <= MAX_STORED_ERROR_CHARS + 3);
		assert!(out.ends_with("..."));
	}
}
