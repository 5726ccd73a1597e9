use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use synq_core::{Error, Result, RoomId, UserId};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;

use crate::{
	store::{EphemeralStore, EventStream},
	types::{HostRecord, PlaybackChanges, PlaybackSnapshot, PlaybackStatus, RoomEvent, RoomInfo, RoomSnapshot, RoomStatus},
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct RoomState {
	info: RoomInfo,
	playback: PlaybackSnapshot,
	members: HashSet<UserId>,
	host: Option<HostRecord>,
	events: broadcast::Sender<RoomEvent>,
}

/// In-memory [`EphemeralStore`] used by tests that want to exercise the Room
/// Manager and Stream Hub without a live Redis.
#[derive(Default)]
pub struct MemoryStore {
	rooms: DashMap<RoomId, Mutex<RoomState>>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self { Self::default() }

	fn room_not_found(room_id: RoomId) -> Error { Error::NotFound(format!("room {room_id} has no ephemeral session")) }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
	async fn create_room_session(&self, room_id: RoomId) -> Result<()> {
		let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		let now = Utc::now();
		self.rooms.insert(
			room_id,
			Mutex::new(RoomState {
				info: RoomInfo { status: RoomStatus::Active, created_at: now, last_activity: now },
				playback: PlaybackSnapshot { track_id: None, position_ms: 0, status: PlaybackStatus::Paused, updated_at: now },
				members: HashSet::new(),
				host: None,
				events: tx,
			}),
		);
		Ok(())
	}

	async fn room_active(&self, room_id: RoomId) -> Result<bool> {
		let Some(entry) = self.rooms.get(&room_id) else { return Ok(false) };
		Ok(entry.lock().await.info.status == RoomStatus::Active)
	}

	async fn host_connected(&self, room_id: RoomId) -> Result<bool> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		Ok(entry.lock().await.host.as_ref().is_some_and(|h| h.connected))
	}

	async fn set_host_connected(&self, room_id: RoomId, user_id: &UserId) -> Result<()> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut state = entry.lock().await;
		state.host = Some(HostRecord {
			user_id: user_id.clone(),
			connected: true,
			last_seen: Utc::now(),
			disconnected_at: None,
		});
		state.info.last_activity = Utc::now();
		Ok(())
	}

	async fn set_host_disconnected(&self, room_id: RoomId) -> Result<()> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut state = entry.lock().await;
		if let Some(host) = state.host.as_mut() {
			host.connected = false;
			host.disconnected_at = Some(Utc::now());
		}
		Ok(())
	}

	async fn add_member(&self, room_id: RoomId, user_id: &UserId) -> Result<u32> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut state = entry.lock().await;
		state.members.insert(user_id.clone());
		Ok(u32::try_from(state.members.len()).unwrap_or(u32::MAX))
	}

	async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<u32> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut state = entry.lock().await;
		state.members.remove(user_id);
		Ok(u32::try_from(state.members.len()).unwrap_or(u32::MAX))
	}

	async fn member_count(&self, room_id: RoomId) -> Result<u32> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let state = entry.lock().await;
		Ok(u32::try_from(state.members.len()).unwrap_or(u32::MAX))
	}

	async fn update_playback(&self, room_id: RoomId, changes: &PlaybackChanges) -> Result<()> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut state = entry.lock().await;
		if let Some(track_id) = &changes.track_id {
			state.playback.track_id = Some(track_id.clone());
		}
		if let Some(position_ms) = changes.position_ms {
			state.playback.position_ms = position_ms;
		}
		if let Some(status) = changes.status {
			state.playback.status = status;
		}
		state.playback.updated_at = Utc::now();
		Ok(())
	}

	async fn publish(&self, room_id: RoomId, event: &RoomEvent) -> Result<()> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut state = entry.lock().await;
		state.info.last_activity = Utc::now();
		// A lagging/absent receiver is not an error for the publisher: the
		// Stream Hub subscribes per-room and tolerates zero subscribers.
		let _ = state.events.send(event.clone());
		Ok(())
	}

	async fn subscribe(&self, room_id: RoomId) -> Result<EventStream> {
		use futures::StreamExt as _;

		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let rx = entry.lock().await.events.subscribe();
		let stream = BroadcastStream::new(rx).map(|item| item.map_err(|err| Error::Internal(err.to_string())));
		Ok(Box::pin(stream))
	}

	async fn snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let state = entry.lock().await;
		Ok(RoomSnapshot {
			info: state.info.clone(),
			playback: state.playback.clone(),
			members: state.members.iter().cloned().collect(),
			member_count: u32::try_from(state.members.len()).unwrap_or(u32::MAX),
			host: state.host.clone(),
		})
	}

	async fn mark_room_inactive(&self, room_id: RoomId) -> Result<()> {
		let entry = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		entry.lock().await.info.status = RoomStatus::Inactive;
		Ok(())
	}

	async fn teardown(&self, room_id: RoomId) -> Result<()> {
		self.rooms.remove(&room_id);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn member_add_remove_round_trips_count() {
		let store = MemoryStore::new();
		let room = RoomId::new();
		store.create_room_session(room).await.expect("create session");

		assert_eq!(store.add_member(room, &"alice".to_owned()).await.expect("add"), 1);
		assert_eq!(store.add_member(room, &"bob".to_owned()).await.expect("add"), 2);
		assert_eq!(store.remove_member(room, &"alice".to_owned()).await.expect("remove"), 1);
	}

	#[tokio::test]
	async fn subscriber_receives_published_event() {
		use futures::StreamExt as _;

		let store = MemoryStore::new();
		let room = RoomId::new();
		store.create_room_session(room).await.expect("create session");

		let mut stream = store.subscribe(room).await.expect("subscribe");
		let event = RoomEvent::MemberJoin { user_id: "alice".to_owned(), member_count: 1 };
		store.publish(room, &event).await.expect("publish");

		let received = stream.next().await.expect("event available").expect("no error");
		assert_eq!(received, event);
	}

	#[tokio::test]
	async fn unknown_room_is_not_found() {
		let store = MemoryStore::new();
		let err = store.member_count(RoomId::new()).await.expect_err("should fail");
		assert_eq!(err.kind(), synq_core::ErrorKind::NotFound);
	}
}
