use async_trait::async_trait;
use synq_core::{Result, RoomId, UserId};

use crate::types::{Membership, NewRoom, PlaybackChanges, PlaybackState, QueueEntry, Room, RoomFilter, RoomPage};

/// The persistence contract: authoritative identity and history for rooms,
/// memberships, playback state, queue, and the playback event log.
///
/// All mutating operations are transactional: a failed call leaves row state
/// and any derived state (event log, queue positions) unchanged. Uniqueness
/// conflicts (duplicate room code, duplicate active membership) surface as
/// [`synq_core::Error::Conflict`] so callers can translate or retry.
#[async_trait]
pub trait DurableStore: Send + Sync {
	/// Inserts the room, a HOST membership row, and the initial playback row
	/// in one transaction. Retries room-code generation on collision.
	async fn create_room(&self, room: NewRoom) -> Result<Room>;

	async fn get_room(&self, room_id: RoomId) -> Result<Room>;

	async fn room_id_by_code(&self, code: &str) -> Result<RoomId>;

	async fn list_active_rooms(&self, filter: RoomFilter) -> Result<RoomPage>;

	/// Inserts a PARTICIPANT membership if no active row exists for this
	/// user; re-joining after a left row leaves the old row untouched.
	async fn join_room(&self, room_id: RoomId, user_id: &UserId) -> Result<Membership>;

	/// Sets `left_at` on the caller's active row. Returns whether the leaver
	/// was the host. Does **not** mark the room INACTIVE by itself: a host
	/// leaving only arms the grace-window timer (see
	/// `synq_service::RoomManager::leave`/`arm_grace_timer`), and the DS row
	/// only transitions to INACTIVE if that timer expires without a
	/// reattach, via [`Self::mark_room_inactive`].
	async fn leave_room(&self, room_id: RoomId, user_id: &UserId) -> Result<bool>;

	/// Marks a room INACTIVE. Called only once a host-disconnect grace
	/// window has actually expired; a bare `leave_room` by the host leaves
	/// the room ACTIVE in DS so it still appears in `list_active_rooms`
	/// while a reattach is still possible.
	async fn mark_room_inactive(&self, room_id: RoomId) -> Result<()>;

	/// Partial update; appends one event-log row with an event type inferred
	/// from which fields changed: `SKIP` if `track_id` changed, else `SEEK`
	/// if only `position_ms` changed, else `PLAY`/`PAUSE` per `status`.
	async fn update_playback(&self, room_id: RoomId, actor_id: &UserId, changes: PlaybackChanges) -> Result<PlaybackState>;

	async fn get_playback(&self, room_id: RoomId) -> Result<PlaybackState>;

	/// Appends at `max_position + 1`.
	async fn queue_add(&self, room_id: RoomId, track_id: &str, added_by: &UserId) -> Result<QueueEntry>;

	/// Deletes the entry and decrements positions greater than the removed
	/// one, in a single transaction.
	async fn queue_remove(&self, room_id: RoomId, position: i32) -> Result<()>;

	async fn get_queue(&self, room_id: RoomId) -> Result<Vec<QueueEntry>>;
}
