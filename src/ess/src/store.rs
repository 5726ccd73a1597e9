use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use synq_core::{Result, RoomId, UserId};

use crate::types::{PlaybackChanges, RoomEvent, RoomSnapshot};

pub type EventStream = Pin<Box<dyn Stream<Item = Result<RoomEvent>> + Send>>;

/// Typed accessor over a key-value + pub/sub backend.
///
/// Every operation must be safe under concurrent callers; publishes are only
/// ordered per-channel, never globally.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
	/// Atomically sets up a fresh session: `info.status=ACTIVE`, empty
	/// members, initial playback `{status=PAUSED, position_ms=0}`.
	async fn create_room_session(&self, room_id: RoomId) -> Result<()>;

	async fn room_active(&self, room_id: RoomId) -> Result<bool>;

	async fn host_connected(&self, room_id: RoomId) -> Result<bool>;

	async fn set_host_connected(&self, room_id: RoomId, user_id: &UserId) -> Result<()>;

	async fn set_host_disconnected(&self, room_id: RoomId) -> Result<()>;

	/// Returns the new member count.
	async fn add_member(&self, room_id: RoomId, user_id: &UserId) -> Result<u32>;

	/// Returns the new member count.
	async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<u32>;

	async fn member_count(&self, room_id: RoomId) -> Result<u32>;

	/// Partial merge of playback fields; bumps `updated_at`. Does not publish
	/// — callers that want the `PlaybackUpdate` event call [`Self::publish`]
	/// themselves so the caller controls durable-commit-before-publish
	/// ordering.
	async fn update_playback(&self, room_id: RoomId, changes: &PlaybackChanges) -> Result<()>;

	async fn publish(&self, room_id: RoomId, event: &RoomEvent) -> Result<()>;

	/// Scoped to a single consumer; the consumer is responsible for draining
	/// it.
	async fn subscribe(&self, room_id: RoomId) -> Result<EventStream>;

	async fn snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot>;

	/// Marks the ESS-side room info as `INACTIVE` without removing the
	/// session; used when the durable grace-timer expires.
	async fn mark_room_inactive(&self, room_id: RoomId) -> Result<()>;

	/// Tears down every key for this room. Called once all subscribers have
	/// detached and the room is finally inactive.
	async fn teardown(&self, room_id: RoomId) -> Result<()>;
}
