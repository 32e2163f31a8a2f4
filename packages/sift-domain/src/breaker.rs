use std::time::Duration;

use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BreakerState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Clone, Copy, Debug)]
pub struct BreakerPolicy {
	pub failure_threshold: u32,
	pub recovery_timeout: Duration,
	pub half_open_max_probes: u32,
}

/// Per-dependency circuit breaker. The clock is passed in so transitions are
/// deterministic under test; callers must pair every `try_acquire` that
/// returns true with exactly one `on_success` or `on_failure`.
#[derive(Debug)]
pub struct CircuitBreaker {
	policy: BreakerPolicy,
	state: BreakerState,
	consecutive_failures: u32,
	opened_at: Option<OffsetDateTime>,
	probes_issued: u32,
}
impl CircuitBreaker {
	pub fn new(policy: BreakerPolicy) -> Self {
		Self {
			policy,
			state: BreakerState::Closed,
			consecutive_failures: 0,
			opened_at: None,
			probes_issued: 0,
		}
	}

	pub fn state(&self) -> BreakerState {
		self.state
	}

	/// Whether a call may proceed right now. An open breaker flips to
	/// half-open once the recovery timeout has elapsed; half-open admits a
	/// bounded number of probes.
	pub fn try_acquire(&mut self, now: OffsetDateTime) -> bool {
		match self.state {
			BreakerState::Closed => true,
			BreakerState::Open => {
				let Some(opened_at) = self.opened_at else {
					return false;
				};

				if now - opened_at >= self.policy.recovery_timeout {
					self.state = BreakerState::HalfOpen;
					self.probes_issued = 1;

					true
				} else {
					false
				}
			},
			BreakerState::HalfOpen =>
				if self.probes_issued < self.policy.half_open_max_probes {
					self.probes_issued += 1;

					true
				} else {
					false
				},
		}
	}

	pub fn on_success(&mut self) {
		self.state = BreakerState::Closed;
		self.consecutive_failures = 0;
		self.opened_at = None;
		self.probes_issued = 0;
	}

	pub fn on_failure(&mut self, now: OffsetDateTime) {
		match self.state {
			BreakerState::HalfOpen => self.trip(now),
			BreakerState::Closed | BreakerState::Open => {
				self.consecutive_failures = self.consecutive_failures.saturating_add(1);

				if self.consecutive_failures >= self.policy.failure_threshold {
					self.trip(now);
				}
			},
		}
	}

	fn trip(&mut self, now: OffsetDateTime) {
		self.state = BreakerState::Open;
		self.consecutive_failures = 0;
		self.opened_at = Some(now);
		self.probes_issued = 0;
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn policy() -> BreakerPolicy {
		BreakerPolicy {
			failure_threshold: 3,
			recovery_timeout: Duration::from_secs(60),
			half_open_max_probes: 2,
		}
	}

	#[test]
	fn opens_after_exactly_threshold_consecutive_failures() {
		let now = datetime!(2026-01-01 00:00 UTC);
		let mut breaker = CircuitBreaker::new(policy());

		breaker.on_failure(now);
		breaker.on_failure(now);

		assert_eq!(breaker.state(), BreakerState::Closed);

		breaker.on_failure(now);

		assert_eq!(breaker.state(), BreakerState::Open);
		assert!(!breaker.try_acquire(now));
	}

	#[test]
	fn success_resets_the_consecutive_count() {
		let now = datetime!(2026-01-01 00:00 UTC);
		let mut breaker = CircuitBreaker::new(policy());

		breaker.on_failure(now);
		breaker.on_failure(now);
		breaker.on_success();
		breaker.on_failure(now);
		breaker.on_failure(now);

		assert_eq!(breaker.state(), BreakerState::Closed);
	}

	#[test]
	fn half_opens_after_the_recovery_timeout() {
		let opened = datetime!(2026-01-01 00:00 UTC);
		let mut breaker = CircuitBreaker::new(policy());

		for _ in 0..3 {
			breaker.on_failure(opened);
		}

		assert!(!breaker.try_acquire(opened + Duration::from_secs(59)));
		assert!(breaker.try_acquire(opened + Duration::from_secs(60)));
		assert_eq!(breaker.state(), BreakerState::HalfOpen);
	}

	#[test]
	fn half_open_bounds_the_probe_count() {
		let opened = datetime!(2026-01-01 00:00 UTC);
		let later = opened + Duration::from_secs(120);
		let mut breaker = CircuitBreaker::new(policy());

		for _ in 0..3 {
			breaker.on_failure(opened);
		}

		assert!(breaker.try_acquire(later));
		assert!(breaker.try_acquire(later));
		assert!(!breaker.try_acquire(later));
	}

	#[test]
	fn probe_success_closes_and_probe_failure_reopens() {
		let opened = datetime!(2026-01-01 00:00 UTC);
		let later = opened + Duration::from_secs(120);
		let mut breaker = CircuitBreaker::new(policy());

		for _ in 0..3 {
			breaker.on_failure(opened);
		}

		assert!(breaker.try_acquire(later));

		breaker.on_success();

		assert_eq!(breaker.state(), BreakerState::Closed);

		for _ in 0..3 {
			breaker.on_failure(later);
		}

		assert!(breaker.try_acquire(later + Duration::from_secs(60)));

		breaker.on_failure(later + Duration::from_secs(61));

		assert_eq!(breaker.state(), BreakerState::Open);
		assert!(!breaker.try_acquire(later + Duration::from_secs(62)));
	}
}
