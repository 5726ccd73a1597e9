use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use synq_core::{room_code, Error, Result, RoomId, UserId};
use tokio::sync::Mutex;

use crate::{
	store::DurableStore,
	types::{
		Membership, MembershipRole, NewRoom, PlaybackChanges, PlaybackEventType, PlaybackState, PlaybackStatus, QueueEntry,
		Room, RoomFilter, RoomPage, RoomStatus,
	},
};

struct RoomData {
	room: Mutex<Room>,
	members: Mutex<Vec<Membership>>,
	playback: Mutex<PlaybackState>,
	queue: Mutex<Vec<QueueEntry>>,
	event_log: Mutex<Vec<(UserId, PlaybackEventType)>>,
}

/// In-memory [`DurableStore`] for Room Manager tests. Not transactional
/// across concurrent callers beyond per-room mutex granularity, which is
/// sufficient for single-room test scenarios.
#[derive(Default)]
pub struct MemoryDurableStore {
	rooms: DashMap<RoomId, RoomData>,
	codes: DashMap<String, RoomId>,
}

impl MemoryDurableStore {
	#[must_use]
	pub fn new() -> Self { Self::default() }

	fn room_not_found(room_id: RoomId) -> Error { Error::NotFound(format!("room {room_id}")) }
}

fn infer_event_type(changes: &PlaybackChanges) -> Option<PlaybackEventType> {
	if changes.track_id.is_some() {
		Some(PlaybackEventType::Skip)
	} else if let Some(status) = changes.status {
		Some(match status {
			| PlaybackStatus::Playing => PlaybackEventType::Play,
			| PlaybackStatus::Paused => PlaybackEventType::Pause,
		})
	} else if changes.position_ms.is_some() {
		Some(PlaybackEventType::Seek)
	} else {
		None
	}
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
	async fn create_room(&self, new_room: NewRoom) -> Result<Room> {
		let mut code = room_code::generate();
		while self.codes.contains_key(&code) {
			code = room_code::generate();
		}

		let room_id = RoomId::new();
		let now = Utc::now();
		let room = Room {
			id: room_id,
			code: code.clone(),
			name: new_room.name,
			description: new_room.description,
			host_user_id: new_room.host_user_id.clone(),
			visibility: new_room.visibility,
			invite_only: new_room.invite_only,
			status: RoomStatus::Active,
			created_at: now,
		};

		let host_membership =
			Membership { room_id, user_id: new_room.host_user_id, role: MembershipRole::Host, joined_at: now, left_at: None };

		let playback = PlaybackState { room_id, track_id: None, position_ms: 0, status: PlaybackStatus::Paused, updated_at: now };

		self.codes.insert(code, room_id);
		self.rooms.insert(
			room_id,
			RoomData {
				room: Mutex::new(room.clone()),
				members: Mutex::new(vec![host_membership]),
				playback: Mutex::new(playback),
				queue: Mutex::new(Vec::new()),
				event_log: Mutex::new(Vec::new()),
			},
		);

		Ok(room)
	}

	async fn get_room(&self, room_id: RoomId) -> Result<Room> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		Ok(data.room.lock().await.clone())
	}

	async fn room_id_by_code(&self, code: &str) -> Result<RoomId> {
		self.codes.get(code).map(|id| *id).ok_or_else(|| Error::NotFound(format!("room code {code}")))
	}

	async fn list_active_rooms(&self, filter: RoomFilter) -> Result<RoomPage> {
		let mut rooms = Vec::new();
		for entry in &self.rooms {
			let room = entry.value().room.lock().await.clone();
			if room.status != RoomStatus::Active {
				continue;
			}
			if let Some(visibility) = filter.visibility {
				if room.visibility != visibility {
					continue;
				}
			}
			if let Some(host) = &filter.host_user_id {
				if &room.host_user_id != host {
					continue;
				}
			}
			rooms.push(room);
		}
		rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		let page_size = filter.page_size.max(1) as usize;
		rooms.truncate(page_size);
		Ok(RoomPage { rooms, next_page_token: None })
	}

	async fn join_room(&self, room_id: RoomId, user_id: &UserId) -> Result<Membership> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut members = data.members.lock().await;

		if let Some(existing) = members.iter().find(|m| &m.user_id == user_id && m.left_at.is_none()) {
			return Ok(existing.clone());
		}

		let membership = Membership { room_id, user_id: user_id.clone(), role: MembershipRole::Participant, joined_at: Utc::now(), left_at: None };
		members.push(membership.clone());
		Ok(membership)
	}

	async fn leave_room(&self, room_id: RoomId, user_id: &UserId) -> Result<bool> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut members = data.members.lock().await;

		let membership = members
			.iter_mut()
			.find(|m| &m.user_id == user_id && m.left_at.is_none())
			.ok_or_else(|| Error::NotFound(format!("active membership for {user_id} in room {room_id}")))?;

		membership.left_at = Some(Utc::now());
		let was_host = membership.role == MembershipRole::Host;

		Ok(was_host)
	}

	async fn mark_room_inactive(&self, room_id: RoomId) -> Result<()> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		data.room.lock().await.status = RoomStatus::Inactive;
		Ok(())
	}

	async fn update_playback(&self, room_id: RoomId, actor_id: &UserId, changes: PlaybackChanges) -> Result<PlaybackState> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut playback = data.playback.lock().await;

		if let Some(event_type) = infer_event_type(&changes) {
			data.event_log.lock().await.push((actor_id.clone(), event_type));
		}

		if let Some(track_id) = changes.track_id {
			playback.track_id = Some(track_id);
		}
		if let Some(position_ms) = changes.position_ms {
			playback.position_ms = position_ms;
		}
		if let Some(status) = changes.status {
			playback.status = status;
		}
		playback.updated_at = Utc::now();

		Ok(playback.clone())
	}

	async fn get_playback(&self, room_id: RoomId) -> Result<PlaybackState> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		Ok(data.playback.lock().await.clone())
	}

	async fn queue_add(&self, room_id: RoomId, track_id: &str, added_by: &UserId) -> Result<QueueEntry> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut queue = data.queue.lock().await;
		// Recomputed from the live queue on every call, the same as
		// postgres_store's `SELECT COALESCE(MAX(position), 0) + 1`, so a
		// remove-then-add sequence can't leave a stale counter ahead of the
		// queue's actual contents.
		let position = queue.iter().map(|e| e.position).max().unwrap_or(0) + 1;

		let entry = QueueEntry { room_id, position, track_id: track_id.to_owned(), added_by: added_by.clone(), added_at: Utc::now() };
		queue.push(entry.clone());
		Ok(entry)
	}

	async fn queue_remove(&self, room_id: RoomId, position: i32) -> Result<()> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut queue = data.queue.lock().await;

		let idx = queue
			.iter()
			.position(|e| e.position == position)
			.ok_or_else(|| Error::NotFound(format!("queue position {position} in room {room_id}")))?;
		queue.remove(idx);

		for entry in queue.iter_mut() {
			if entry.position > position {
				entry.position -= 1;
			}
		}

		Ok(())
	}

	async fn get_queue(&self, room_id: RoomId) -> Result<Vec<QueueEntry>> {
		let data = self.rooms.get(&room_id).ok_or_else(|| Self::room_not_found(room_id))?;
		let mut queue = data.queue.lock().await.clone();
		queue.sort_by_key(|e| e.position);
		Ok(queue)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::Visibility;

	fn sample_room(host: &str) -> NewRoom {
		NewRoom { name: "test room".to_owned(), description: None, host_user_id: host.to_owned(), visibility: Visibility::Public, invite_only: false }
	}

	#[tokio::test]
	async fn create_room_registers_host_membership_and_code() {
		let store = MemoryDurableStore::new();
		let room = store.create_room(sample_room("alice")).await.expect("create");

		let looked_up = store.room_id_by_code(&room.code).await.expect("code lookup");
		assert_eq!(looked_up, room.id);

		let err = store.join_room(room.id, &"alice".to_owned()).await.expect("idempotent rejoin");
		assert_eq!(err.role, MembershipRole::Host);
	}

	#[tokio::test]
	async fn leave_as_host_does_not_mark_room_inactive_on_its_own() {
		let store = MemoryDurableStore::new();
		let room = store.create_room(sample_room("alice")).await.expect("create");

		let was_host = store.leave_room(room.id, &"alice".to_owned()).await.expect("leave");
		assert!(was_host);

		// A bare host leave only arms the grace-window timer upstream; the
		// DS row stays ACTIVE until `mark_room_inactive` is called once that
		// timer actually expires.
		let refreshed = store.get_room(room.id).await.expect("get room");
		assert_eq!(refreshed.status, RoomStatus::Active);

		store.mark_room_inactive(room.id).await.expect("mark inactive");
		let refreshed = store.get_room(room.id).await.expect("get room");
		assert_eq!(refreshed.status, RoomStatus::Inactive);
	}

	#[tokio::test]
	async fn queue_add_after_remove_does_not_reuse_stale_position() {
		let store = MemoryDurableStore::new();
		let room = store.create_room(sample_room("alice")).await.expect("create");

		store.queue_add(room.id, "t1", &"alice".to_owned()).await.expect("add");
		store.queue_add(room.id, "t2", &"alice".to_owned()).await.expect("add");
		store.queue_add(room.id, "t3", &"alice".to_owned()).await.expect("add");
		store.queue_remove(room.id, 2).await.expect("remove");
		let fourth = store.queue_add(room.id, "t4", &"alice".to_owned()).await.expect("add");
		assert_eq!(fourth.position, 3);

		let queue = store.get_queue(room.id).await.expect("get queue");
		assert_eq!(queue.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn update_playback_infers_skip_on_track_change() {
		let store = MemoryDurableStore::new();
		let room = store.create_room(sample_room("alice")).await.expect("create");

		let changes = PlaybackChanges { track_id: Some("track-2".to_owned()), position_ms: Some(0), status: None };
		store.update_playback(room.id, &"alice".to_owned(), changes).await.expect("update");

		let log = store.rooms.get(&room.id).expect("room data").event_log.lock().await.clone();
		assert_eq!(log.last().map(|(_, t)| *t), Some(PlaybackEventType::Skip));
	}

	#[tokio::test]
	async fn queue_remove_renumbers_trailing_positions() {
		let store = MemoryDurableStore::new();
		let room = store.create_room(sample_room("alice")).await.expect("create");

		store.queue_add(room.id, "t1", &"alice".to_owned()).await.expect("add");
		store.queue_add(room.id, "t2", &"alice".to_owned()).await.expect("add");
		store.queue_add(room.id, "t3", &"alice".to_owned()).await.expect("add");

		store.queue_remove(room.id, 1).await.expect("remove");

		let queue = store.get_queue(room.id).await.expect("get queue");
		assert_eq!(queue.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2]);
		assert_eq!(queue.iter().map(|e| e.track_id.as_str()).collect::<Vec<_>>(), vec!["t2", "t3"]);
	}
}
