use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use synq_core::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
	Active,
	AwaitingHost,
	Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
	Playing,
	Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
	Add,
	Remove,
}

/// Partial update to a room's playback state. `None` fields are left
/// untouched by a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackChanges {
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub track_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub position_ms: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub status: Option<PlaybackStatus>,
}

impl PlaybackChanges {
	#[must_use]
	pub fn is_empty(&self) -> bool { self.track_id.is_none() && self.position_ms.is_none() && self.status.is_none() }
}

/// The closed variant set published on `room:{uuid}:updates`. Wire format is
/// a flat tagged JSON object so it stays compatible with a plain
/// key-value/pub-sub backend in transit, while internal handling works
/// against the closed enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
	MemberJoin {
		user_id: UserId,
		member_count: u32,
	},
	MemberLeave {
		user_id: UserId,
		member_count: u32,
	},
	PlaybackUpdate {
		#[serde(flatten)]
		changes: PlaybackChanges,
	},
	HostDisconnected {
		user_id: UserId,
		timeout_seconds: u32,
	},
	QueueUpdate {
		action: QueueAction,
		position: i32,
		#[serde(skip_serializing_if = "Option::is_none", default)]
		track_id: Option<String>,
	},
	RoomStatusUpdate {
		status: RoomStatus,
		reason: String,
	},
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomInfo {
	pub status: RoomStatus,
	pub created_at: DateTime<Utc>,
	pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
	pub user_id: UserId,
	pub connected: bool,
	pub last_seen: DateTime<Utc>,
	pub disconnected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
	pub track_id: Option<String>,
	pub position_ms: i64,
	pub status: PlaybackStatus,
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
	pub info: RoomInfo,
	pub playback: PlaybackSnapshot,
	pub members: Vec<UserId>,
	pub member_count: u32,
	pub host: Option<HostRecord>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn playback_update_serializes_as_flat_tagged_object() {
		let event = RoomEvent::PlaybackUpdate {
			changes: PlaybackChanges { track_id: None, position_ms: Some(1_500), status: Some(PlaybackStatus::Playing) },
		};
		let json = serde_json::to_value(&event).expect("serializable");
		assert_eq!(json["type"], "playback_update");
		assert_eq!(json["position_ms"], 1_500);
		assert_eq!(json["status"], "PLAYING");
		assert!(json.get("track_id").is_none());
	}

	#[test]
	fn round_trips_through_json() {
		let event = RoomEvent::MemberJoin { user_id: "u1".to_owned(), member_count: 3 };
		let json = serde_json::to_string(&event).expect("serializable");
		let back: RoomEvent = serde_json::from_str(&json).expect("deserializable");
		assert_eq!(event, back);
	}
}
