use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use sift_domain::failure::FailureKind;

use crate::{GatewayError, Result};

#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
	pub temperature: Option<f32>,
	pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct Generation {
	pub content: String,
	pub model: String,
	pub tokens_used: u32,
	pub cost_usd: Option<f64>,
}

pub async fn generate(
	cfg: &sift_config::GenerationProviderConfig,
	prompt: &str,
	options: &GenerateOptions,
) -> Result<Generation> {
	let provider = cfg.provider_id.as_str();
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(|err| GatewayError::from_transport(provider, &err))?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"prompt": prompt,
		"temperature": options.temperature.unwrap_or(cfg.temperature),
		"max_tokens": options.max_tokens.or(cfg.max_tokens),
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(provider, &cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(|err| GatewayError::from_transport(provider, &err))?;

	if !res.status().is_success() {
		return Err(crate::error_from_response(provider, res).await);
	}

	let json: Value =
		res.json().await.map_err(|err| GatewayError::from_transport(provider, &err))?;

	parse_generation_response(provider, &cfg.model, json)
}

fn parse_generation_response(
	provider: &str,
	requested_model: &str,
	json: Value,
) -> Result<Generation> {
	let content = json
		.get("content")
		.and_then(Value::as_str)
		.ok_or_else(|| {
			GatewayError::new(
				FailureKind::Unknown,
				provider,
				"Generation response is missing content.",
			)
		})?
		.to_string();

	if content.trim().is_empty() {
		return Err(GatewayError::new(
			FailureKind::ValidationError,
			provider,
			"Generation response content is empty.",
		));
	}

	let model =
		json.get("model").and_then(Value::as_str).unwrap_or(requested_model).to_string();
	let tokens_used = json
		.get("usage")
		.and_then(|usage| usage.get("total_tokens"))
		.and_then(Value::as_u64)
		.unwrap_or(0) as u32;
	let cost_usd = json.get("usage").and_then(|usage| usage.get("cost_usd")).and_then(Value::as_f64);

	Ok(Generation { content, model, tokens_used, cost_usd })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_generation_payload() {
		let json = serde_json::json!({
			"content": "- [ ] follow up with design",
			"model": "structured-v1",
			"usage": { "total_tokens": 180, "cost_usd": 0.0021 }
		});
		let parsed =
			parse_generation_response("ai-provider", "structured-v1", json).expect("parse failed");

		assert_eq!(parsed.content, "- [ ] follow up with design");
		assert_eq!(parsed.tokens_used, 180);
		assert_eq!(parsed.cost_usd, Some(0.0021));
	}

	#[test]
	fn empty_content_is_a_validation_failure() {
		let json = serde_json::json!({ "content": "   " });
		let err = parse_generation_response("ai-provider", "structured-v1", json).unwrap_err();

		assert_eq!(err.kind, FailureKind::ValidationError);
	}

	#[test]
	fn missing_content_is_an_unknown_failure() {
		let json = serde_json::json!({ "finish_reason": "stop" });
		let err = parse_generation_response("ai-provider", "structured-v1", json).unwrap_err();

		assert_eq!(err.kind, FailureKind::Unknown);
	}
}
