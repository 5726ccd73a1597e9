use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use synq_core::{RoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
	Public,
	Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
	Active,
	Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipRole {
	Host,
	Participant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
	Playing,
	Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackEventType {
	Play,
	Pause,
	Seek,
	Skip,
}

/// Input to [`crate::DurableStore::create_room`]. The row's id and code are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRoom {
	pub name: String,
	pub description: Option<String>,
	pub host_user_id: UserId,
	pub visibility: Visibility,
	pub invite_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Room {
	pub id: RoomId,
	pub code: String,
	pub name: String,
	pub description: Option<String>,
	pub host_user_id: UserId,
	pub visibility: Visibility,
	pub invite_only: bool,
	pub status: RoomStatus,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
	pub room_id: RoomId,
	pub user_id: UserId,
	pub role: MembershipRole,
	pub joined_at: DateTime<Utc>,
	pub left_at: Option<DateTime<Utc>>,
}

/// Partial update to a room's durable playback row; `None` fields are left
/// untouched by a merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackChanges {
	pub track_id: Option<String>,
	pub position_ms: Option<i64>,
	pub status: Option<PlaybackStatus>,
}

impl PlaybackChanges {
	#[must_use]
	pub fn is_empty(&self) -> bool { self.track_id.is_none() && self.position_ms.is_none() && self.status.is_none() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
	pub room_id: RoomId,
	pub track_id: Option<String>,
	pub position_ms: i64,
	pub status: PlaybackStatus,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
	pub room_id: RoomId,
	pub position: i32,
	pub track_id: String,
	pub added_by: UserId,
	pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackEventLogRow {
	pub room_id: RoomId,
	pub user_id: UserId,
	pub event_type: PlaybackEventType,
	pub payload: serde_json::Value,
	pub server_time: DateTime<Utc>,
}

/// Filters accepted by [`crate::DurableStore::list_active_rooms`]. `None`
/// leaves that dimension unconstrained.
#[derive(Debug, Clone, Default)]
pub struct RoomFilter {
	pub visibility: Option<Visibility>,
	pub host_user_id: Option<UserId>,
	pub page_size: u32,
	pub page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RoomPage {
	pub rooms: Vec<Room>,
	pub next_page_token: Option<String>,
}
