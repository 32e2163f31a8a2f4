use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use sift_domain::failure::FailureKind;

use crate::{GatewayError, Result};

#[derive(Clone, Debug)]
pub struct EmbeddingResponse {
	pub vectors: Vec<Vec<f32>>,
	pub model: String,
	pub tokens_used: u32,
}

pub async fn embed(
	cfg: &sift_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<EmbeddingResponse> {
	let provider = cfg.provider_id.as_str();
	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.build()
		.map_err(|err| GatewayError::from_transport(provider, &err))?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
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

	parse_embedding_response(provider, &cfg.model, json)
}

fn parse_embedding_response(
	provider: &str,
	requested_model: &str,
	json: Value,
) -> Result<EmbeddingResponse> {
	let data = json.get("data").and_then(|value| value.as_array()).ok_or_else(|| {
		GatewayError::new(
			FailureKind::Unknown,
			provider,
			"Embedding response is missing data array.",
		)
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|value| value.as_u64())
			.map(|value| value as usize)
			.unwrap_or(fallback_index);
		let embedding =
			item.get("embedding").and_then(|value| value.as_array()).ok_or_else(|| {
				GatewayError::new(
					FailureKind::Unknown,
					provider,
					"Embedding item missing embedding array.",
				)
			})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| {
				GatewayError::new(FailureKind::Unknown, provider, "Embedding value must be numeric.")
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	let model = json
		.get("model")
		.and_then(Value::as_str)
		.unwrap_or(requested_model)
		.to_string();
	let tokens_used = json
		.get("usage")
		.and_then(|usage| usage.get("total_tokens"))
		.and_then(Value::as_u64)
		.unwrap_or(0) as u32;

	Ok(EmbeddingResponse {
		vectors: indexed.into_iter().map(|(_, vec)| vec).collect(),
		model,
		tokens_used,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			],
			"model": "embed-v1",
			"usage": { "total_tokens": 12 }
		});
		let parsed = parse_embedding_response("ai-provider", "embed-v1", json).expect("parse failed");

		assert_eq!(parsed.vectors.len(), 2);
		assert_eq!(parsed.vectors[0], vec![0.5, 1.5]);
		assert_eq!(parsed.vectors[1], vec![2.0, 3.0]);
		assert_eq!(parsed.tokens_used, 12);
	}

	#[test]
	fn missing_data_array_is_an_unknown_failure() {
		let json = serde_json::json!({ "unexpected": true });
		let err = parse_embedding_response("ai-provider", "embed-v1", json).unwrap_err();

		assert_eq!(err.kind, FailureKind::Unknown);
	}
}
