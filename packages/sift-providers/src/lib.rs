pub mod embedding;
pub mod generate;

mod error;

pub use error::{GatewayError, Result, classify_status};

use std::time::Duration;

use reqwest::{
	Response,
	header::{AUTHORIZATION, HeaderMap, HeaderName, RETRY_AFTER},
};
use serde_json::{Map, Value};

use sift_domain::failure::FailureKind;

pub fn auth_headers(
	provider: &str,
	api_key: &str,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(
		AUTHORIZATION,
		format!("Bearer {api_key}").parse().map_err(|_| {
			GatewayError::new(FailureKind::ValidationError, provider, "Invalid API key header.")
		})?,
	);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(GatewayError::new(
				FailureKind::ValidationError,
				provider,
				"Default header values must be strings.",
			));
		};
		let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
			GatewayError::new(
				FailureKind::ValidationError,
				provider,
				format!("Invalid header name: {key}."),
			)
		})?;

		headers.insert(
			name,
			raw.parse().map_err(|_| {
				GatewayError::new(
					FailureKind::ValidationError,
					provider,
					format!("Invalid header value for {key}."),
				)
			})?,
		);
	}

	Ok(headers)
}

/// Converts a non-success gateway response into a typed error, reading the
/// `Retry-After` header and the error body's code when present.
pub(crate) async fn error_from_response(provider: &str, response: Response) -> GatewayError {
	let status = response.status().as_u16();
	let retry_after = response
		.headers()
		.get(RETRY_AFTER)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.parse::<u64>().ok())
		.map(Duration::from_secs);
	let body = response.text().await.unwrap_or_default();
	let parsed: Option<Value> = serde_json::from_str(&body).ok();
	let error_code = parsed
		.as_ref()
		.and_then(|json| json.get("error"))
		.and_then(|error| error.get("code"))
		.and_then(Value::as_str)
		.map(str::to_string);
	let message = parsed
		.as_ref()
		.and_then(|json| json.get("error"))
		.and_then(|error| error.get("message"))
		.and_then(Value::as_str)
		.map(str::to_string)
		.unwrap_or_else(|| format!("Gateway returned status {status}."));

	classify_status(provider, status, error_code.as_deref(), retry_after, &message)
}
