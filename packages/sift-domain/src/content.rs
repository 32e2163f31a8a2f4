use serde::{Deserialize, Serialize};

/// Tag side of the polymorphic embedding reference.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
	Input,
	Output,
	Feedback,
}
impl ContentType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Input => "input",
			Self::Output => "output",
			Self::Feedback => "feedback",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"input" => Some(Self::Input),
			"output" => Some(Self::Output),
			"feedback" => Some(Self::Feedback),
			_ => None,
		}
	}
}
impl std::fmt::Display for ContentType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Text-extraction capability for anything the embedding stage can process.
/// `None` means there is nothing to embed, which short-circuits the stage
/// without an error.
pub trait Embeddable {
	fn embeddable_text(&self) -> Option<String>;
}

/// Shared fallback chain: the content field wins, then title, then
/// description; whitespace-only candidates are skipped entirely.
pub fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
	candidates
		.iter()
		.flatten()
		.map(|candidate| candidate.trim())
		.find(|candidate| !candidate.is_empty())
}
