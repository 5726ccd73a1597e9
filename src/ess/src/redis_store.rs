use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use synq_core::{time::now_ms, Result, RoomId, UserId};
use tracing::{debug, instrument, warn};

use crate::{
	store::{EphemeralStore, EventStream},
	types::{HostRecord, PlaybackChanges, PlaybackSnapshot, PlaybackStatus, RoomEvent, RoomInfo, RoomSnapshot, RoomStatus},
};

fn info_key(room_id: RoomId) -> String { format!("room:{room_id}:info") }
fn host_key(room_id: RoomId) -> String { format!("room:{room_id}:host") }
fn playback_key(room_id: RoomId) -> String { format!("room:{room_id}:playback") }
fn members_key(room_id: RoomId) -> String { format!("room:{room_id}:members") }
fn user_rooms_key(user_id: &UserId) -> String { format!("user:{user_id}:rooms") }
fn channel(room_id: RoomId) -> String { format!("room:{room_id}:updates") }

fn parse_ms(value: Option<String>) -> DateTime<Utc> {
	value
		.and_then(|v| v.parse::<i64>().ok())
		.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
		.unwrap_or_else(Utc::now)
}

/// Redis-backed [`EphemeralStore`]. Key layout: `room:{uuid}:info|host|
/// playback|members`, a `room:{uuid}:updates` pub/sub channel, and a
/// `user:{user}:rooms` reverse index for membership lookups by user.
pub struct RedisStore {
	conn: ConnectionManager,
	client: Client,
}

impl RedisStore {
	pub async fn connect(url: &str) -> Result<Self> {
		let client = Client::open(url).map_err(synq_core::Error::from)?;
		let conn = ConnectionManager::new(client.clone()).await.map_err(synq_core::Error::from)?;
		Ok(Self { conn, client })
	}

	/// `redis`'s `ConnectionManager` has no explicit close/shutdown call;
	/// its multiplexed connection is torn down when the last handle is
	/// dropped. Kept as an explicit call site so shutdown ordering in
	/// `main.rs` reads the same for both stores even though this one is a
	/// no-op.
	pub async fn close(&self) {}

	async fn touch_activity(&self, room_id: RoomId) -> Result<()> {
		let mut conn = self.conn.clone();
		let _: () = conn.hset(info_key(room_id), "last_activity", now_ms()).await.map_err(synq_core::Error::from)?;
		Ok(())
	}
}

#[async_trait]
impl EphemeralStore for RedisStore {
	#[instrument(skip(self))]
	async fn create_room_session(&self, room_id: RoomId) -> Result<()> {
		let mut conn = self.conn.clone();
		let now = now_ms();

		let _: () = redis::pipe()
			.atomic()
			.hset(info_key(room_id), "status", "ACTIVE")
			.hset(info_key(room_id), "created_at", now)
			.hset(info_key(room_id), "last_activity", now)
			.del(members_key(room_id))
			.hset(playback_key(room_id), "status", "PAUSED")
			.hset(playback_key(room_id), "position_ms", 0)
			.hset(playback_key(room_id), "updated_at", now)
			.query_async(&mut conn)
			.await
			.map_err(synq_core::Error::from)?;

		Ok(())
	}

	async fn room_active(&self, room_id: RoomId) -> Result<bool> {
		let mut conn = self.conn.clone();
		let status: Option<String> = conn.hget(info_key(room_id), "status").await.map_err(synq_core::Error::from)?;
		Ok(status.as_deref() == Some("ACTIVE"))
	}

	async fn host_connected(&self, room_id: RoomId) -> Result<bool> {
		let mut conn = self.conn.clone();
		let connected: Option<String> = conn.hget(host_key(room_id), "connected").await.map_err(synq_core::Error::from)?;
		Ok(connected.as_deref() == Some("true"))
	}

	#[instrument(skip(self))]
	async fn set_host_connected(&self, room_id: RoomId, user_id: &UserId) -> Result<()> {
		let mut conn = self.conn.clone();
		let _: () = redis::pipe()
			.atomic()
			.hset(host_key(room_id), "user_id", user_id.as_str())
			.hset(host_key(room_id), "connected", "true")
			.hset(host_key(room_id), "last_seen", now_ms())
			.hdel(host_key(room_id), "disconnected_at")
			.query_async(&mut conn)
			.await
			.map_err(synq_core::Error::from)?;
		self.touch_activity(room_id).await
	}

	#[instrument(skip(self))]
	async fn set_host_disconnected(&self, room_id: RoomId) -> Result<()> {
		let mut conn = self.conn.clone();
		let _: () = redis::pipe()
			.atomic()
			.hset(host_key(room_id), "connected", "false")
			.hset(host_key(room_id), "disconnected_at", now_ms())
			.query_async(&mut conn)
			.await
			.map_err(synq_core::Error::from)?;
		Ok(())
	}

	async fn add_member(&self, room_id: RoomId, user_id: &UserId) -> Result<u32> {
		let mut conn = self.conn.clone();
		let _: () = conn.sadd(members_key(room_id), user_id.as_str()).await.map_err(synq_core::Error::from)?;
		let _: () = conn.sadd(user_rooms_key(user_id), room_id.to_string()).await.map_err(synq_core::Error::from)?;
		let count: u32 = conn.scard(members_key(room_id)).await.map_err(synq_core::Error::from)?;
		Ok(count)
	}

	async fn remove_member(&self, room_id: RoomId, user_id: &UserId) -> Result<u32> {
		let mut conn = self.conn.clone();
		let _: () = conn.srem(members_key(room_id), user_id.as_str()).await.map_err(synq_core::Error::from)?;
		let _: () = conn.srem(user_rooms_key(user_id), room_id.to_string()).await.map_err(synq_core::Error::from)?;
		let count: u32 = conn.scard(members_key(room_id)).await.map_err(synq_core::Error::from)?;
		Ok(count)
	}

	async fn member_count(&self, room_id: RoomId) -> Result<u32> {
		let mut conn = self.conn.clone();
		let count: u32 = conn.scard(members_key(room_id)).await.map_err(synq_core::Error::from)?;
		Ok(count)
	}

	#[instrument(skip(self, changes))]
	async fn update_playback(&self, room_id: RoomId, changes: &PlaybackChanges) -> Result<()> {
		let mut conn = self.conn.clone();
		let mut pipe = redis::pipe();
		pipe.atomic();

		if let Some(track_id) = &changes.track_id {
			pipe.hset(playback_key(room_id), "track_id", track_id.as_str());
		}
		if let Some(position_ms) = changes.position_ms {
			pipe.hset(playback_key(room_id), "position_ms", position_ms);
		}
		if let Some(status) = changes.status {
			let value = match status {
				| PlaybackStatus::Playing => "PLAYING",
				| PlaybackStatus::Paused => "PAUSED",
			};
			pipe.hset(playback_key(room_id), "status", value);
		}
		pipe.hset(playback_key(room_id), "updated_at", now_ms());

		let _: () = pipe.query_async(&mut conn).await.map_err(synq_core::Error::from)?;
		Ok(())
	}

	#[instrument(skip(self, event))]
	async fn publish(&self, room_id: RoomId, event: &RoomEvent) -> Result<()> {
		let payload = serde_json::to_string(event)?;
		let mut conn = self.conn.clone();
		let subscribers: i64 = conn.publish(channel(room_id), payload).await.map_err(synq_core::Error::from)?;
		debug!(room_id = %room_id, subscribers, "published room event");
		self.touch_activity(room_id).await
	}

	async fn subscribe(&self, room_id: RoomId) -> Result<EventStream> {
		use futures::StreamExt as _;

		let mut pubsub = self.client.get_async_pubsub().await.map_err(synq_core::Error::from)?;
		pubsub.subscribe(channel(room_id)).await.map_err(synq_core::Error::from)?;

		let stream = pubsub.into_on_message().map(|msg| {
			let payload: String = msg.get_payload().map_err(synq_core::Error::from)?;
			serde_json::from_str::<RoomEvent>(&payload).map_err(synq_core::Error::from)
		});

		Ok(Box::pin(stream))
	}

	async fn snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot> {
		let mut conn = self.conn.clone();

		let info_status: Option<String> = conn.hget(info_key(room_id), "status").await.map_err(synq_core::Error::from)?;
		let created_at: Option<String> = conn.hget(info_key(room_id), "created_at").await.map_err(synq_core::Error::from)?;
		let last_activity: Option<String> =
			conn.hget(info_key(room_id), "last_activity").await.map_err(synq_core::Error::from)?;

		let status = match info_status.as_deref() {
			| Some("ACTIVE") => RoomStatus::Active,
			| Some("AWAITING_HOST") => RoomStatus::AwaitingHost,
			| _ => RoomStatus::Inactive,
		};

		let track_id: Option<String> =
			conn.hget(playback_key(room_id), "track_id").await.map_err(synq_core::Error::from)?;
		let position_ms: Option<i64> =
			conn.hget(playback_key(room_id), "position_ms").await.map_err(synq_core::Error::from)?;
		let playback_status: Option<String> =
			conn.hget(playback_key(room_id), "status").await.map_err(synq_core::Error::from)?;
		let playback_updated_at: Option<String> =
			conn.hget(playback_key(room_id), "updated_at").await.map_err(synq_core::Error::from)?;

		let host_user_id: Option<String> = conn.hget(host_key(room_id), "user_id").await.map_err(synq_core::Error::from)?;
		let host_connected: Option<String> =
			conn.hget(host_key(room_id), "connected").await.map_err(synq_core::Error::from)?;
		let host_last_seen: Option<String> =
			conn.hget(host_key(room_id), "last_seen").await.map_err(synq_core::Error::from)?;
		let host_disconnected_at: Option<String> =
			conn.hget(host_key(room_id), "disconnected_at").await.map_err(synq_core::Error::from)?;

		let members: Vec<UserId> = conn.smembers(members_key(room_id)).await.map_err(synq_core::Error::from)?;
		let member_count = u32::try_from(members.len()).unwrap_or(u32::MAX);

		let host = host_user_id.map(|user_id| HostRecord {
			user_id,
			connected: host_connected.as_deref() == Some("true"),
			last_seen: parse_ms(host_last_seen),
			disconnected_at: host_disconnected_at.map(|v| parse_ms(Some(v))),
		});

		if host.is_none() {
			warn!(room_id = %room_id, "snapshot requested for room with no host record");
		}

		Ok(RoomSnapshot {
			info: RoomInfo {
				status,
				created_at: parse_ms(created_at),
				last_activity: parse_ms(last_activity),
			},
			playback: PlaybackSnapshot {
				track_id,
				position_ms: position_ms.unwrap_or(0),
				status: if playback_status.as_deref() == Some("PLAYING") {
					PlaybackStatus::Playing
				} else {
					PlaybackStatus::Paused
				},
				updated_at: parse_ms(playback_updated_at),
			},
			members,
			member_count,
			host,
		})
	}

	async fn mark_room_inactive(&self, room_id: RoomId) -> Result<()> {
		let mut conn = self.conn.clone();
		let _: () = conn.hset(info_key(room_id), "status", "INACTIVE").await.map_err(synq_core::Error::from)?;
		Ok(())
	}

	async fn teardown(&self, room_id: RoomId) -> Result<()> {
		let mut conn = self.conn.clone();
		let _: () = conn
			.del::<_, ()>((info_key(room_id), host_key(room_id), playback_key(room_id), members_key(room_id)))
			.await
			.map_err(synq_core::Error::from)?;
		Ok(())
	}
}
