use std::time::Duration;

use dashmap::DashMap;
use synq_core::{RoomId, UserId};
use tokio::time::Instant;

const READY_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
struct MemberStatus {
	ready: bool,
	reported_at: Instant,
}

/// Bridge between the Member Sync Pipeline (which reports per-member
/// readiness and position) and the Host Command Pipeline (which summarizes
/// that readiness back to the host alongside each acknowledgement).
///
/// A member counts as "ready" only if its most recent report said so and
/// arrived within the last 3 seconds; a stalled or disconnected member ages
/// out of the count without needing an explicit leave event.
#[derive(Default)]
pub struct StatusAggregator {
	rooms: DashMap<RoomId, DashMap<UserId, MemberStatus>>,
}

impl StatusAggregator {
	#[must_use]
	pub fn new() -> Self { Self::default() }

	pub fn record(&self, room_id: RoomId, user_id: UserId, ready: bool) {
		self.rooms.entry(room_id).or_default().insert(user_id, MemberStatus { ready, reported_at: Instant::now() });
	}

	pub fn forget_member(&self, room_id: RoomId, user_id: &UserId) {
		if let Some(members) = self.rooms.get(&room_id) {
			members.remove(user_id);
		}
	}

	pub fn forget_room(&self, room_id: RoomId) { self.rooms.remove(&room_id); }

	#[must_use]
	pub fn ready_count(&self, room_id: RoomId) -> u32 {
		let Some(members) = self.rooms.get(&room_id) else { return 0 };
		let now = Instant::now();
		u32::try_from(members.iter().filter(|entry| entry.ready && now.duration_since(entry.reported_at) <= READY_WINDOW).count())
			.unwrap_or(u32::MAX)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn ready_reports_within_window_are_counted() {
		let aggregator = StatusAggregator::new();
		let room_id = RoomId::new();

		aggregator.record(room_id, "alice".to_owned(), true);
		aggregator.record(room_id, "bob".to_owned(), false);

		assert_eq!(aggregator.ready_count(room_id), 1);
	}

	#[tokio::test]
	async fn stale_reports_age_out_of_the_ready_count() {
		tokio::time::pause();
		let aggregator = StatusAggregator::new();
		let room_id = RoomId::new();

		aggregator.record(room_id, "alice".to_owned(), true);
		assert_eq!(aggregator.ready_count(room_id), 1);

		tokio::time::advance(Duration::from_secs(4)).await;
		assert_eq!(aggregator.ready_count(room_id), 0);
	}

	#[tokio::test]
	async fn forgetting_a_member_drops_it_from_the_count() {
		let aggregator = StatusAggregator::new();
		let room_id = RoomId::new();

		aggregator.record(room_id, "alice".to_owned(), true);
		aggregator.forget_member(room_id, &"alice".to_owned());

		assert_eq!(aggregator.ready_count(room_id), 0);
	}
}
