use std::fmt::Write;

use sift_storage::models::InputRecord;

use crate::retrieval::SimilarExample;

/// Renders the few-shot generation prompt: retrieved examples first, most
/// relevant at the top, then the task itself. The user's correction, when
/// one was stored, stands in for the raw output so the model imitates what
/// was actually accepted.
pub fn assemble(
	input: &InputRecord,
	output_kind: &str,
	examples: &[SimilarExample],
	max_example_chars: u32,
) -> String {
	let mut prompt = String::new();
	let budget = max_example_chars as usize;

	let _ = writeln!(
		prompt,
		"You convert free-form {} content into a {output_kind}.",
		input.content_kind
	);

	if !examples.is_empty() {
		let _ = writeln!(prompt, "\nPrior accepted examples, most relevant first:");

		for (index, example) in examples.iter().enumerate() {
			let accepted =
				example.correction.as_deref().unwrap_or(example.output_content.as_str());

			let _ = writeln!(prompt, "\n## Example {}", index + 1);
			let _ = writeln!(prompt, "Input:\n{}", truncate_chars(&example.input_content, budget));
			let _ = writeln!(prompt, "Accepted output:\n{}", truncate_chars(accepted, budget));
		}
	}

	let _ = writeln!(prompt, "\n## Task");
	let _ = writeln!(prompt, "Input:\n{}", input.content);
	let _ = write!(prompt, "Respond with the {output_kind} only.");

	prompt
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
	if text.chars().count() <= max_chars {
		return text.to_string();
	}

	let mut out: String = text.chars().take(max_chars).collect();

	out.push_str("...");

	out
}
