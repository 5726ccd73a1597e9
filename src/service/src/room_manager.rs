use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use dashmap::DashMap;
use synq_core::{config::QueueAddPolicy, Error, Result, RoomId, UserId};
use synq_database::{DurableStore, NewRoom, PlaybackChanges as DsPlaybackChanges, Room, Visibility};
use synq_ess::{EphemeralStore, PlaybackChanges as EssPlaybackChanges, PlaybackStatus, QueueAction, RoomEvent, RoomStatus};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

const HOST_DISCONNECT_TIMEOUT_SECONDS: u32 = 180;

/// What the caller asked to change in a playback command; mirrors the wire
/// shape of `TrackCommand` / `PositionUpdate` / `ControlCommand`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackUpdateRequest {
	pub track_id: Option<String>,
	pub position_ms: Option<i64>,
	pub status: Option<PlaybackStatus>,
}

impl From<PlaybackUpdateRequest> for DsPlaybackChanges {
	fn from(req: PlaybackUpdateRequest) -> Self {
		Self {
			track_id: req.track_id,
			position_ms: req.position_ms,
			status: req.status.map(|s| match s {
				| PlaybackStatus::Playing => synq_database::PlaybackStatus::Playing,
				| PlaybackStatus::Paused => synq_database::PlaybackStatus::Paused,
			}),
		}
	}
}

impl From<PlaybackUpdateRequest> for EssPlaybackChanges {
	fn from(req: PlaybackUpdateRequest) -> Self { Self { track_id: req.track_id, position_ms: req.position_ms, status: req.status } }
}

/// Composes the Durable Store and Ephemeral State Store to expose the
/// external room-lifecycle API. All state-mutating operations for a given
/// room run under that room's serialization latch; reads do not.
pub struct RoomManager<D, E> {
	ds: Arc<D>,
	ess: Arc<E>,
	latches: DashMap<RoomId, Arc<AsyncMutex<()>>>,
	host_generation: DashMap<RoomId, Arc<AtomicU64>>,
	grace_window: Duration,
	queue_add_policy: QueueAddPolicy,
}

impl<D, E> RoomManager<D, E>
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	pub fn new(ds: Arc<D>, ess: Arc<E>, grace_window: Duration, queue_add_policy: QueueAddPolicy) -> Self {
		Self { ds, ess, latches: DashMap::new(), host_generation: DashMap::new(), grace_window, queue_add_policy }
	}

	fn latch(&self, room_id: RoomId) -> Arc<AsyncMutex<()>> { Arc::clone(self.latches.entry(room_id).or_insert_with(|| Arc::new(AsyncMutex::new(())))) }

	/// Read-only lookup; does not take the room's serialization latch.
	pub async fn get_room(&self, room_id: RoomId) -> Result<Room> { self.ds.get_room(room_id).await }

	pub async fn room_id_by_code(&self, code: &str) -> Result<RoomId> { self.ds.room_id_by_code(code).await }

	pub async fn list_rooms(&self, filter: synq_database::RoomFilter) -> Result<synq_database::RoomPage> {
		self.ds.list_active_rooms(filter).await
	}

	pub async fn snapshot(&self, room_id: RoomId) -> Result<synq_ess::RoomSnapshot> { self.ess.snapshot(room_id).await }

	pub async fn get_queue(&self, room_id: RoomId) -> Result<Vec<synq_database::QueueEntry>> { self.ds.get_queue(room_id).await }

	fn generation(&self, room_id: RoomId) -> Arc<AtomicU64> { Arc::clone(self.host_generation.entry(room_id).or_insert_with(|| Arc::new(AtomicU64::new(0)))) }

	#[instrument(skip(self))]
	pub async fn create(
		&self, name: String, host_id: UserId, description: Option<String>, visibility: Visibility, invite_only: bool,
	) -> Result<Room> {
		let room = self.ds.create_room(NewRoom { name, description, host_user_id: host_id.clone(), visibility, invite_only }).await?;
		let _latch = self.latch(room.id).lock().await;

		let setup = async {
			self.ess.create_room_session(room.id).await?;
			self.ess.set_host_connected(room.id, &host_id).await?;
			self.ess.add_member(room.id, &host_id).await?;
			self.ess.publish(room.id, &RoomEvent::RoomStatusUpdate { status: RoomStatus::Active, reason: "created".to_owned() }).await
		}
		.await;

		if let Err(err) = setup {
			warn!(room_id = %room.id, %err, "ephemeral session setup failed after durable insert, rolling room back to inactive");
			if let Err(rollback_err) = self.ds.leave_room(room.id, &host_id).await {
				warn!(room_id = %room.id, %rollback_err, "failed to mark room inactive after ephemeral setup failure");
			}
			return Err(err);
		}

		info!(room_id = %room.id, code = %room.code, "room created");
		Ok(room)
	}

	#[instrument(skip(self))]
	pub async fn join(&self, room_id: RoomId, user_id: UserId) -> Result<Room> {
		if !self.ess.room_active(room_id).await? {
			return Err(Error::FailedPrecondition(format!("room {room_id} is not active")));
		}

		let _latch = self.latch(room_id).lock().await;
		self.ds.join_room(room_id, &user_id).await?;
		let member_count = self.ess.add_member(room_id, &user_id).await?;
		self.ess.publish(room_id, &RoomEvent::MemberJoin { user_id, member_count }).await?;
		self.ds.get_room(room_id).await
	}

	/// Runs the leave path for either a host or a participant. Host leaves
	/// arm the grace-window timer rather than tearing the room down
	/// immediately.
	#[instrument(skip(self))]
	pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
		let _latch = self.latch(room_id).lock().await;

		let snapshot = self.ess.snapshot(room_id).await?;
		let is_host = snapshot.host.as_ref().is_some_and(|h| h.user_id == user_id);

		if is_host {
			self.ds.leave_room(room_id, &user_id).await?;
			self.ess.set_host_disconnected(room_id).await?;
			self.ess
				.publish(room_id, &RoomEvent::HostDisconnected { user_id: user_id.clone(), timeout_seconds: HOST_DISCONNECT_TIMEOUT_SECONDS })
				.await?;
			self.arm_grace_timer(room_id);
		} else {
			self.ds.leave_room(room_id, &user_id).await?;
			let member_count = self.ess.remove_member(room_id, &user_id).await?;
			self.ess.publish(room_id, &RoomEvent::MemberLeave { user_id, member_count }).await?;
		}

		Ok(())
	}

	/// Cancels a pending grace-window teardown and republishes the room as
	/// active. No-op (but not an error) if no timer was pending.
	#[instrument(skip(self))]
	pub async fn reattach_host(&self, room_id: RoomId, user_id: UserId) -> Result<()> {
		let _latch = self.latch(room_id).lock().await;

		self.generation(room_id).fetch_add(1, Ordering::SeqCst);
		self.ess.set_host_connected(room_id, &user_id).await?;
		self.ess
			.publish(room_id, &RoomEvent::RoomStatusUpdate { status: RoomStatus::Active, reason: "host_reconnected".to_owned() })
			.await?;
		Ok(())
	}

	fn arm_grace_timer(&self, room_id: RoomId) {
		let generation = self.generation(room_id);
		let armed_at = generation.fetch_add(1, Ordering::SeqCst) + 1;
		let deadline = tokio::time::Instant::now() + self.grace_window;

		let ds = Arc::clone(&self.ds);
		let ess = Arc::clone(&self.ess);
		let generation = Arc::clone(&generation);

		tokio::spawn(async move {
			tokio::time::sleep_until(deadline).await;

			if generation.load(Ordering::SeqCst) != armed_at {
				debug!(room_id = %room_id, "host reattached before grace window expired, skipping teardown");
				return;
			}

			info!(room_id = %room_id, "grace window expired with no host reattach, tearing down room");
			if let Err(err) = ds.mark_room_inactive(room_id).await {
				warn!(room_id = %room_id, %err, "failed to mark durable room inactive");
			}
			if let Err(err) = ess.mark_room_inactive(room_id).await {
				warn!(room_id = %room_id, %err, "failed to mark ephemeral session inactive");
			}
			if let Err(err) = ess
				.publish(room_id, &RoomEvent::RoomStatusUpdate { status: RoomStatus::Inactive, reason: "host_disconnected".to_owned() })
				.await
			{
				warn!(room_id = %room_id, %err, "failed to publish room inactive event");
			}
			if let Err(err) = ess.teardown(room_id).await {
				warn!(room_id = %room_id, %err, "failed to tear down ephemeral session");
			}
		});
	}

	#[instrument(skip(self, request))]
	pub async fn update_playback(&self, room_id: RoomId, actor_id: &UserId, request: PlaybackUpdateRequest) -> Result<()> {
		self.authorize_host(room_id, actor_id).await?;
		let _latch = self.latch(room_id).lock().await;

		self.ds.update_playback(room_id, actor_id, request.clone().into()).await?;
		let ess_changes: EssPlaybackChanges = request.into();
		if !ess_changes.is_empty() {
			self.ess.update_playback(room_id, &ess_changes).await?;
			self.ess.publish(room_id, &RoomEvent::PlaybackUpdate { changes: ess_changes }).await?;
		}
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn queue_add(&self, room_id: RoomId, actor_id: &UserId, track_id: &str) -> Result<i32> {
		if self.queue_add_policy == QueueAddPolicy::HostOnly {
			self.authorize_host(room_id, actor_id).await?;
		}

		let _latch = self.latch(room_id).lock().await;
		let entry = self.ds.queue_add(room_id, track_id, actor_id).await?;
		self.ess
			.publish(room_id, &RoomEvent::QueueUpdate { action: QueueAction::Add, position: entry.position, track_id: Some(entry.track_id.clone()) })
			.await?;
		Ok(entry.position)
	}

	#[instrument(skip(self))]
	pub async fn queue_remove(&self, room_id: RoomId, actor_id: &UserId, position: i32) -> Result<()> {
		self.authorize_host(room_id, actor_id).await?;
		let _latch = self.latch(room_id).lock().await;

		self.ds.queue_remove(room_id, position).await?;
		self.ess.publish(room_id, &RoomEvent::QueueUpdate { action: QueueAction::Remove, position, track_id: None }).await?;
		Ok(())
	}

	/// Notifies every currently active room of an impending shutdown. Does
	/// not change a room's durable or ephemeral status — only publishes a
	/// `RoomStatusUpdate` carrying the status it already had, so attached
	/// clients learn the server is going away without the engine guessing
	/// at a terminal state on their behalf.
	#[instrument(skip(self))]
	pub async fn broadcast_shutdown(&self) -> Result<()> {
		let mut page_token = None;
		loop {
			let filter = synq_database::RoomFilter { page_size: 200, page_token, ..Default::default() };
			let page = self.ds.list_active_rooms(filter).await?;

			for room in &page.rooms {
				let Ok(snapshot) = self.ess.snapshot(room.id).await else { continue };
				let event = RoomEvent::RoomStatusUpdate { status: snapshot.info.status, reason: "server_shutdown".to_owned() };
				if let Err(err) = self.ess.publish(room.id, &event).await {
					warn!(room_id = %room.id, %err, "failed to publish shutdown notice");
				}
			}

			page_token = page.next_page_token;
			if page_token.is_none() {
				break;
			}
		}
		Ok(())
	}

	async fn authorize_host(&self, room_id: RoomId, actor_id: &UserId) -> Result<()> {
		let snapshot = self.ess.snapshot(room_id).await?;
		match snapshot.host {
			| Some(host) if &host.user_id == actor_id => Ok(()),
			| _ => Err(Error::Unauthorized(format!("{actor_id} is not the host of room {room_id}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use synq_database::MemoryDurableStore;
	use synq_ess::MemoryStore;

	use super::*;

	fn manager() -> RoomManager<MemoryDurableStore, MemoryStore> {
		RoomManager::new(Arc::new(MemoryDurableStore::new()), Arc::new(MemoryStore::new()), Duration::from_millis(50), QueueAddPolicy::HostOnly)
	}

	#[tokio::test]
	async fn create_then_join_publishes_member_join() {
		let manager = manager();
		let room = manager.create("room".to_owned(), "host".to_owned(), None, Visibility::Public, false).await.expect("create");

		let joined = manager.join(room.id, "bob".to_owned()).await.expect("join");
		assert_eq!(joined.id, room.id);
	}

	#[tokio::test]
	async fn non_host_cannot_update_playback() {
		let manager = manager();
		let room = manager.create("room".to_owned(), "host".to_owned(), None, Visibility::Public, false).await.expect("create");
		manager.join(room.id, "bob".to_owned()).await.expect("join");

		let err = manager
			.update_playback(room.id, &"bob".to_owned(), PlaybackUpdateRequest { status: Some(PlaybackStatus::Playing), ..Default::default() })
			.await
			.expect_err("should be unauthorized");
		assert_eq!(err.kind(), synq_core::ErrorKind::Unauthorized);
	}

	#[tokio::test]
	async fn host_leave_arms_grace_timer_that_tears_room_down() {
		tokio::time::pause();
		let manager = manager();
		let room = manager.create("room".to_owned(), "host".to_owned(), None, Visibility::Public, false).await.expect("create");

		manager.leave(room.id, "host".to_owned()).await.expect("leave");

		// Per spec.md's host-disconnect-grace scenario: the DS row stays
		// ACTIVE for the whole grace window, only flipping to INACTIVE once
		// the timer actually expires with no reattach.
		assert_eq!(manager.ds.get_room(room.id).await.expect("get room").status, synq_database::RoomStatus::Active);

		tokio::time::advance(Duration::from_millis(60)).await;
		tokio::task::yield_now().await;

		assert!(!manager.ess.room_active(room.id).await.expect("room active check"));
		assert_eq!(manager.ds.get_room(room.id).await.expect("get room").status, synq_database::RoomStatus::Inactive);
	}

	#[tokio::test]
	async fn host_reattach_within_grace_cancels_teardown() {
		tokio::time::pause();
		let manager = manager();
		let room = manager.create("room".to_owned(), "host".to_owned(), None, Visibility::Public, false).await.expect("create");

		manager.leave(room.id, "host".to_owned()).await.expect("leave");
		tokio::time::advance(Duration::from_millis(10)).await;
		manager.reattach_host(room.id, "host".to_owned()).await.expect("reattach");

		tokio::time::advance(Duration::from_millis(60)).await;
		tokio::task::yield_now().await;

		assert!(manager.ess.room_active(room.id).await.expect("room active check"));
		assert_eq!(manager.ds.get_room(room.id).await.expect("get room").status, synq_database::RoomStatus::Active);
	}

	#[tokio::test]
	async fn broadcast_shutdown_publishes_to_every_active_room_without_erroring() {
		let manager = manager();
		manager.create("room-a".to_owned(), "host-a".to_owned(), None, Visibility::Public, false).await.expect("create");
		manager.create("room-b".to_owned(), "host-b".to_owned(), None, Visibility::Public, false).await.expect("create");

		manager.broadcast_shutdown().await.expect("broadcast shutdown");
	}
}
