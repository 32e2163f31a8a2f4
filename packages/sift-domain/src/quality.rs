/// Per-action base scores for quality aggregation. Unmapped actions fall
/// back to a neutral 0.5 so new signal types degrade gracefully.
pub fn action_score(action: &str) -> f32 {
	match action {
		"accept" => 1.0,
		"copy" => 0.8,
		"edit" => 0.6,
		"reject" => 0.2,
		_ => 0.5,
	}
}

/// Actions emitted by the UI without an explicit user judgment.
pub fn is_passive_action(action: &str) -> bool {
	matches!(action, "copy" | "task_completed" | "task_deleted")
}

pub fn signal_type(action: &str) -> &'static str {
	if is_passive_action(action) { "passive" } else { "explicit" }
}

pub fn feedback_type(action: &str) -> &'static str {
	if is_passive_action(action) { "behavioral" } else { "inline" }
}

#[derive(Clone, Copy, Debug)]
pub struct QualitySample {
	pub action_score: f32,
	pub confidence: f32,
}

/// Confidence-weighted average of action scores, clamped to [0, 1]. `None`
/// until at least one feedback row exists. A degenerate all-zero-confidence
/// set falls back to the unweighted mean.
pub fn weighted_quality(samples: &[QualitySample]) -> Option<f32> {
	if samples.is_empty() {
		return None;
	}

	let weight: f32 = samples.iter().map(|sample| sample.confidence).sum();
	let score = if weight > 0.0 {
		samples.iter().map(|sample| sample.action_score * sample.confidence).sum::<f32>() / weight
	} else {
		samples.iter().map(|sample| sample.action_score).sum::<f32>() / samples.len() as f32
	};

	Some(score.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(action: &str, confidence: f32) -> QualitySample {
		QualitySample { action_score: action_score(action), confidence }
	}

	#[test]
	fn accept_at_full_confidence_scores_one() {
		let score = weighted_quality(&[sample("accept", 1.0)]).expect("one sample");

		assert!((score - 1.0).abs() < 1e-6);
	}

	#[test]
	fn mixed_feedback_weights_by_confidence() {
		let score =
			weighted_quality(&[sample("accept", 1.0), sample("edit", 0.5)]).expect("two samples");

		// (1.0 * 1.0 + 0.6 * 0.5) / (1.0 + 0.5)
		assert!((score - 0.866_666_7).abs() < 1e-6, "got {score}");
	}

	#[test]
	fn no_feedback_means_no_score() {
		assert_eq!(weighted_quality(&[]), None);
	}

	#[test]
	fn unmapped_actions_score_neutral() {
		assert!((action_score("task_completed") - 0.5).abs() < 1e-6);
		assert!((action_score("shrug") - 0.5).abs() < 1e-6);
	}

	#[test]
	fn zero_total_confidence_falls_back_to_the_mean() {
		let score =
			weighted_quality(&[sample("accept", 0.0), sample("reject", 0.0)]).expect("two samples");

		assert!((score - 0.6).abs() < 1e-6, "got {score}");
	}

	#[test]
	fn score_stays_inside_the_unit_interval() {
		let score = weighted_quality(&[
			QualitySample { action_score: 3.0, confidence: 1.0 },
			QualitySample { action_score: 1.0, confidence: 0.1 },
		])
		.expect("two samples");

		assert!((0.0..=1.0).contains(&score));
	}

	#[test]
	fn actions_split_into_explicit_and_passive_signals() {
		assert_eq!(signal_type("accept"), "explicit");
		assert_eq!(feedback_type("edit"), "inline");
		assert_eq!(signal_type("task_completed"), "passive");
		assert_eq!(feedback_type("copy"), "behavioral");
	}
}
