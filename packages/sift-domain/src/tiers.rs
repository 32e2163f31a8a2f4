use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
	Urgent,
	High,
	Medium,
	Low,
}
impl PriorityTier {
	pub const ALL: [Self; 4] = [Self::Urgent, Self::High, Self::Medium, Self::Low];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Urgent => "urgent",
			Self::High => "high",
			Self::Medium => "medium",
			Self::Low => "low",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"urgent" => Some(Self::Urgent),
			"high" => Some(Self::High),
			"medium" => Some(Self::Medium),
			"low" => Some(Self::Low),
			_ => None,
		}
	}
}
impl std::fmt::Display for PriorityTier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Copy, Debug)]
pub struct TierWeights {
	pub urgent: u32,
	pub high: u32,
	pub medium: u32,
	pub low: u32,
}
impl TierWeights {
	fn weight_of(&self, tier: PriorityTier) -> u32 {
		match tier {
			PriorityTier::Urgent => self.urgent,
			PriorityTier::High => self.high,
			PriorityTier::Medium => self.medium,
			PriorityTier::Low => self.low,
		}
	}
}

/// One weighted round-robin cycle. Every tier with a non-zero weight appears
/// in the cycle, so lower tiers see bounded starvation rather than strict
/// priority-only draining.
pub fn round_robin_cycle(weights: &TierWeights) -> Vec<PriorityTier> {
	let mut cycle = Vec::new();

	for tier in PriorityTier::ALL {
		for _ in 0..weights.weight_of(tier) {
			cycle.push(tier);
		}
	}

	cycle
}

/// Claim preference for one scheduler tick: the scheduled tier first, then
/// the remaining tiers in descending priority so an idle tick still drains
/// whatever work exists.
pub fn claim_order(preferred: PriorityTier) -> Vec<PriorityTier> {
	let mut order = vec![preferred];

	order.extend(PriorityTier::ALL.iter().copied().filter(|tier| *tier != preferred));

	order
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cycle_visits_every_tier_with_its_weight() {
		let weights = TierWeights { urgent: 8, high: 4, medium: 2, low: 1 };
		let cycle = round_robin_cycle(&weights);

		assert_eq!(cycle.len(), 15);
		assert_eq!(cycle.iter().filter(|tier| **tier == PriorityTier::Urgent).count(), 8);
		assert_eq!(cycle.iter().filter(|tier| **tier == PriorityTier::Low).count(), 1);
	}

	#[test]
	fn claim_order_prefers_the_scheduled_tier() {
		let order = claim_order(PriorityTier::Low);

		assert_eq!(
			order,
			vec![PriorityTier::Low, PriorityTier::Urgent, PriorityTier::High, PriorityTier::Medium]
		);
		assert_eq!(order.len(), 4);
	}

	#[test]
	fn tier_tags_round_trip() {
		for tier in PriorityTier::ALL {
			assert_eq!(PriorityTier::parse(tier.as_str()), Some(tier));
		}

		assert_eq!(PriorityTier::parse("express"), None);
	}
}
