use std::time::Duration;

/// Retry delay source for a job type: a flat delay, or one entry per retry
/// with the last entry repeating if tries outnumber entries.
#[derive(Clone, Debug)]
pub enum Backoff {
	Fixed(Duration),
	Schedule(Vec<Duration>),
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
	pub max_tries: u32,
	pub backoff: Backoff,
	pub timeout: Duration,
}
impl RetryPolicy {
	/// Delay before the next try after `completed_tries` failed attempts.
	/// `None` means the budget is exhausted and the job dead-letters.
	pub fn delay_after(&self, completed_tries: u32) -> Option<Duration> {
		if completed_tries == 0 || completed_tries >= self.max_tries {
			return None;
		}

		match &self.backoff {
			Backoff::Fixed(delay) => Some(*delay),
			Backoff::Schedule(delays) => {
				let index = (completed_tries as usize - 1).min(delays.len().saturating_sub(1));

				delays.get(index).copied()
			},
		}
	}
}
