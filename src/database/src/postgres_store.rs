use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use synq_core::{room_code, Error, Result, RoomId, UserId};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
	store::DurableStore,
	types::{
		Membership, MembershipRole, NewRoom, PlaybackChanges, PlaybackEventType, PlaybackState, PlaybackStatus, QueueEntry,
		Room, RoomFilter, RoomPage, RoomStatus, Visibility,
	},
};

const MAX_CODE_COLLISION_RETRIES: u32 = 8;

fn visibility_to_db(v: Visibility) -> &'static str {
	match v {
		| Visibility::Public => "PUBLIC",
		| Visibility::Private => "PRIVATE",
	}
}

fn visibility_from_db(s: &str) -> Result<Visibility> {
	match s {
		| "PUBLIC" => Ok(Visibility::Public),
		| "PRIVATE" => Ok(Visibility::Private),
		| other => Err(Error::Internal(format!("unrecognized visibility {other:?} in rooms row"))),
	}
}

fn status_from_db(s: &str) -> Result<RoomStatus> {
	match s {
		| "ACTIVE" => Ok(RoomStatus::Active),
		| "INACTIVE" => Ok(RoomStatus::Inactive),
		| other => Err(Error::Internal(format!("unrecognized room status {other:?}"))),
	}
}

fn role_to_db(r: MembershipRole) -> &'static str {
	match r {
		| MembershipRole::Host => "HOST",
		| MembershipRole::Participant => "PARTICIPANT",
	}
}

fn role_from_db(s: &str) -> Result<MembershipRole> {
	match s {
		| "HOST" => Ok(MembershipRole::Host),
		| "PARTICIPANT" => Ok(MembershipRole::Participant),
		| other => Err(Error::Internal(format!("unrecognized membership role {other:?}"))),
	}
}

fn playback_status_to_db(s: PlaybackStatus) -> &'static str {
	match s {
		| PlaybackStatus::Playing => "PLAYING",
		| PlaybackStatus::Paused => "PAUSED",
	}
}

fn playback_status_from_db(s: &str) -> Result<PlaybackStatus> {
	match s {
		| "PLAYING" => Ok(PlaybackStatus::Playing),
		| "PAUSED" => Ok(PlaybackStatus::Paused),
		| other => Err(Error::Internal(format!("unrecognized playback status {other:?}"))),
	}
}

fn event_type_to_db(t: PlaybackEventType) -> &'static str {
	match t {
		| PlaybackEventType::Play => "PLAY",
		| PlaybackEventType::Pause => "PAUSE",
		| PlaybackEventType::Seek => "SEEK",
		| PlaybackEventType::Skip => "SKIP",
	}
}

/// Infers the event-log entry type for a partial playback update: `SKIP` if
/// the track changed, else `SEEK` if only the position changed, else
/// `PLAY`/`PAUSE` following the status field.
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

fn is_unique_violation(err: &sqlx::Error) -> bool {
	matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

struct RoomRow {
	id: Uuid,
	code: String,
	name: String,
	description: Option<String>,
	host_user_id: String,
	visibility: String,
	invite_only: bool,
	status: String,
	created_at: DateTime<Utc>,
}

impl RoomRow {
	fn into_room(self) -> Result<Room> {
		Ok(Room {
			id: RoomId::from(self.id),
			code: self.code,
			name: self.name,
			description: self.description,
			host_user_id: self.host_user_id,
			visibility: visibility_from_db(&self.visibility)?,
			invite_only: self.invite_only,
			status: status_from_db(&self.status)?,
			created_at: self.created_at,
		})
	}
}

struct PlaybackRow {
	room_id: Uuid,
	track_id: Option<String>,
	position_ms: i64,
	status: String,
	updated_at: DateTime<Utc>,
}

impl PlaybackRow {
	fn into_state(self) -> Result<PlaybackState> {
		Ok(PlaybackState {
			room_id: RoomId::from(self.room_id),
			track_id: self.track_id,
			position_ms: self.position_ms,
			status: playback_status_from_db(&self.status)?,
			updated_at: self.updated_at,
		})
	}
}

struct QueueRow {
	room_id: Uuid,
	position: i32,
	track_id: String,
	added_by: String,
	added_at: DateTime<Utc>,
}

impl From<QueueRow> for QueueEntry {
	fn from(row: QueueRow) -> Self {
		Self { room_id: RoomId::from(row.room_id), position: row.position, track_id: row.track_id, added_by: row.added_by, added_at: row.added_at }
	}
}

/// Postgres-backed [`DurableStore`]. Every mutating method runs inside one
/// transaction so a failure rolls back row state and any derived state
/// (event log rows, queue position renumbering) together.
pub struct PostgresStore {
	pool: PgPool,
}

impl PostgresStore {
	pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(database_url)
			.await
			.map_err(Error::from)?;
		Ok(Self { pool })
	}

	/// Runs the embedded schema migrations. Call once at process start.
	pub async fn migrate(&self) -> Result<()> {
		sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|err| Error::Internal(err.to_string()))?;
		Ok(())
	}

	/// Closes every pooled connection, waiting for in-use ones to finish
	/// their current query. Call once at process shutdown, after the RPC
	/// server has stopped serving requests.
	pub async fn close(&self) { self.pool.close().await; }

	async fn fetch_room(executor: &mut Transaction<'_, Postgres>, room_id: RoomId) -> Result<Room> {
		let row = sqlx::query_as!(
			RoomRow,
			r#"SELECT id, code, name, description, host_user_id, visibility, invite_only, status, created_at
			   FROM rooms WHERE id = $1"#,
			room_id.as_uuid()
		)
		.fetch_optional(&mut **executor)
		.await
		.map_err(Error::from)?
		.ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
		row.into_room()
	}
}

#[async_trait]
impl DurableStore for PostgresStore {
	#[instrument(skip(self, room))]
	async fn create_room(&self, room: NewRoom) -> Result<Room> {
		for attempt in 0..MAX_CODE_COLLISION_RETRIES {
			let code = room_code::generate();
			let mut tx = self.pool.begin().await.map_err(Error::from)?;

			let inserted = sqlx::query_as!(
				RoomRow,
				r#"INSERT INTO rooms (id, code, name, description, host_user_id, visibility, invite_only, status)
				   VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'ACTIVE')
				   RETURNING id, code, name, description, host_user_id, visibility, invite_only, status, created_at"#,
				code,
				room.name,
				room.description,
				room.host_user_id,
				visibility_to_db(room.visibility),
				room.invite_only,
			)
			.fetch_one(&mut *tx)
			.await;

			let inserted = match inserted {
				| Ok(row) => row,
				| Err(err) if is_unique_violation(&err) => {
					warn!(attempt, "room code collision, retrying");
					continue;
				},
				| Err(err) => return Err(Error::from(err)),
			};

			sqlx::query!(
				r#"INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, 'HOST')"#,
				inserted.id,
				room.host_user_id,
			)
			.execute(&mut *tx)
			.await
			.map_err(Error::from)?;

			sqlx::query!(r#"INSERT INTO playback_state (room_id) VALUES ($1)"#, inserted.id)
				.execute(&mut *tx)
				.await
				.map_err(Error::from)?;

			tx.commit().await.map_err(Error::from)?;
			return inserted.into_room();
		}

		Err(Error::Internal("exhausted room code collision retries".to_owned()))
	}

	async fn get_room(&self, room_id: RoomId) -> Result<Room> {
		let row = sqlx::query_as!(
			RoomRow,
			r#"SELECT id, code, name, description, host_user_id, visibility, invite_only, status, created_at
			   FROM rooms WHERE id = $1"#,
			room_id.as_uuid()
		)
		.fetch_optional(&self.pool)
		.await
		.map_err(Error::from)?
		.ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
		row.into_room()
	}

	async fn room_id_by_code(&self, code: &str) -> Result<RoomId> {
		let id: Uuid = sqlx::query_scalar!(r#"SELECT id FROM rooms WHERE code = $1 AND status = 'ACTIVE'"#, code)
			.fetch_optional(&self.pool)
			.await
			.map_err(Error::from)?
			.ok_or_else(|| Error::NotFound(format!("room code {code}")))?;
		Ok(RoomId::from(id))
	}

	async fn list_active_rooms(&self, filter: RoomFilter) -> Result<RoomPage> {
		let visibility = filter.visibility.map(visibility_to_db);
		let limit = i64::from(filter.page_size.clamp(1, 200));
		let offset: i64 = filter.page_token.as_deref().and_then(|t| t.parse().ok()).unwrap_or(0);

		let rows = sqlx::query_as!(
			RoomRow,
			r#"SELECT id, code, name, description, host_user_id, visibility, invite_only, status, created_at
			   FROM rooms
			   WHERE status = 'ACTIVE'
			     AND ($1::text IS NULL OR visibility = $1)
			     AND ($2::text IS NULL OR host_user_id = $2)
			   ORDER BY created_at DESC
			   LIMIT $3 OFFSET $4"#,
			visibility,
			filter.host_user_id,
			limit,
			offset,
		)
		.fetch_all(&self.pool)
		.await
		.map_err(Error::from)?;

		let next_page_token =
			if rows.len() as i64 == limit { Some((offset + limit).to_string()) } else { None };

		let rooms = rows.into_iter().map(RoomRow::into_room).collect::<Result<Vec<_>>>()?;
		Ok(RoomPage { rooms, next_page_token })
	}

	#[instrument(skip(self))]
	async fn join_room(&self, room_id: RoomId, user_id: &UserId) -> Result<Membership> {
		let mut tx = self.pool.begin().await.map_err(Error::from)?;

		let existing = sqlx::query!(
			r#"SELECT role, joined_at FROM room_members WHERE room_id = $1 AND user_id = $2 AND left_at IS NULL"#,
			room_id.as_uuid(),
			user_id,
		)
		.fetch_optional(&mut *tx)
		.await
		.map_err(Error::from)?;

		let membership = if let Some(row) = existing {
			Membership { room_id, user_id: user_id.clone(), role: role_from_db(&row.role)?, joined_at: row.joined_at, left_at: None }
		} else {
			let inserted = sqlx::query!(
				r#"INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, 'PARTICIPANT')
				   RETURNING joined_at"#,
				room_id.as_uuid(),
				user_id,
			)
			.fetch_one(&mut *tx)
			.await
			.map_err(Error::from)?;
			Membership { room_id, user_id: user_id.clone(), role: MembershipRole::Participant, joined_at: inserted.joined_at, left_at: None }
		};

		tx.commit().await.map_err(Error::from)?;
		Ok(membership)
	}

	#[instrument(skip(self))]
	async fn leave_room(&self, room_id: RoomId, user_id: &UserId) -> Result<bool> {
		let mut tx = self.pool.begin().await.map_err(Error::from)?;

		let role = sqlx::query_scalar!(
			r#"UPDATE room_members SET left_at = now()
			   WHERE room_id = $1 AND user_id = $2 AND left_at IS NULL
			   RETURNING role"#,
			room_id.as_uuid(),
			user_id,
		)
		.fetch_optional(&mut *tx)
		.await
		.map_err(Error::from)?
		.ok_or_else(|| Error::NotFound(format!("active membership for {user_id} in room {room_id}")))?;

		let was_host = role_from_db(&role)? == MembershipRole::Host;

		tx.commit().await.map_err(Error::from)?;
		Ok(was_host)
	}

	#[instrument(skip(self))]
	async fn mark_room_inactive(&self, room_id: RoomId) -> Result<()> {
		sqlx::query!(r#"UPDATE rooms SET status = 'INACTIVE' WHERE id = $1"#, room_id.as_uuid())
			.execute(&self.pool)
			.await
			.map_err(Error::from)?;
		Ok(())
	}

	#[instrument(skip(self, changes))]
	async fn update_playback(&self, room_id: RoomId, actor_id: &UserId, changes: PlaybackChanges) -> Result<PlaybackState> {
		let mut tx = self.pool.begin().await.map_err(Error::from)?;

		if changes.is_empty() {
			let row = sqlx::query_as!(
				PlaybackRow,
				r#"SELECT room_id, track_id, position_ms, status, updated_at FROM playback_state WHERE room_id = $1"#,
				room_id.as_uuid()
			)
			.fetch_optional(&mut *tx)
			.await
			.map_err(Error::from)?
			.ok_or_else(|| Error::NotFound(format!("playback state for room {room_id}")))?;
			tx.commit().await.map_err(Error::from)?;
			return row.into_state();
		}

		let status_db = changes.status.map(playback_status_to_db);
		let row = sqlx::query_as!(
			PlaybackRow,
			r#"UPDATE playback_state
			   SET track_id = COALESCE($2, track_id),
			       position_ms = COALESCE($3, position_ms),
			       status = COALESCE($4, status),
			       updated_at = now()
			   WHERE room_id = $1
			   RETURNING room_id, track_id, position_ms, status, updated_at"#,
			room_id.as_uuid(),
			changes.track_id,
			changes.position_ms,
			status_db,
		)
		.fetch_optional(&mut *tx)
		.await
		.map_err(Error::from)?
		.ok_or_else(|| Error::NotFound(format!("playback state for room {room_id}")))?;

		if let Some(event_type) = infer_event_type(&changes) {
			// A SKIP always carries a position, defaulting to 0 when the
			// caller changed only the track: see DESIGN.md's resolution of
			// the source's ambiguous SKIP-payload behavior.
			let position_ms = match event_type {
				| PlaybackEventType::Skip => Some(changes.position_ms.unwrap_or(0)),
				| _ => changes.position_ms,
			};
			sqlx::query!(
				r#"INSERT INTO playback_event_log (room_id, user_id, event_type, payload)
				   VALUES ($1, $2, $3, $4)"#,
				room_id.as_uuid(),
				actor_id,
				event_type_to_db(event_type),
				serde_json::json!({
					"track_id": changes.track_id,
					"position_ms": position_ms,
				}),
			)
			.execute(&mut *tx)
			.await
			.map_err(Error::from)?;
		}

		tx.commit().await.map_err(Error::from)?;
		row.into_state()
	}

	async fn get_playback(&self, room_id: RoomId) -> Result<PlaybackState> {
		let row = sqlx::query_as!(
			PlaybackRow,
			r#"SELECT room_id, track_id, position_ms, status, updated_at FROM playback_state WHERE room_id = $1"#,
			room_id.as_uuid()
		)
		.fetch_optional(&self.pool)
		.await
		.map_err(Error::from)?
		.ok_or_else(|| Error::NotFound(format!("playback state for room {room_id}")))?;
		row.into_state()
	}

	#[instrument(skip(self))]
	async fn queue_add(&self, room_id: RoomId, track_id: &str, added_by: &UserId) -> Result<QueueEntry> {
		let mut tx = self.pool.begin().await.map_err(Error::from)?;

		let next_position: i32 = sqlx::query_scalar!(
			r#"SELECT (COALESCE(MAX(position), 0) + 1) AS "next_position!: i32" FROM room_queue WHERE room_id = $1"#,
			room_id.as_uuid()
		)
		.fetch_one(&mut *tx)
		.await
		.map_err(Error::from)?;

		let row = sqlx::query_as!(
			QueueRow,
			r#"INSERT INTO room_queue (room_id, position, track_id, added_by)
			   VALUES ($1, $2, $3, $4)
			   RETURNING room_id, position, track_id, added_by, added_at"#,
			room_id.as_uuid(),
			next_position,
			track_id,
			added_by,
		)
		.fetch_one(&mut *tx)
		.await
		.map_err(Error::from)?;

		tx.commit().await.map_err(Error::from)?;
		Ok(row.into())
	}

	#[instrument(skip(self))]
	async fn queue_remove(&self, room_id: RoomId, position: i32) -> Result<()> {
		let mut tx = self.pool.begin().await.map_err(Error::from)?;

		let deleted = sqlx::query!(
			r#"DELETE FROM room_queue WHERE room_id = $1 AND position = $2"#,
			room_id.as_uuid(),
			position,
		)
		.execute(&mut *tx)
		.await
		.map_err(Error::from)?;

		if deleted.rows_affected() == 0 {
			return Err(Error::NotFound(format!("queue position {position} in room {room_id}")));
		}

		sqlx::query!(
			r#"UPDATE room_queue SET position = position - 1 WHERE room_id = $1 AND position > $2"#,
			room_id.as_uuid(),
			position,
		)
		.execute(&mut *tx)
		.await
		.map_err(Error::from)?;

		tx.commit().await.map_err(Error::from)?;
		Ok(())
	}

	async fn get_queue(&self, room_id: RoomId) -> Result<Vec<QueueEntry>> {
		let rows = sqlx::query_as!(
			QueueRow,
			r#"SELECT room_id, position, track_id, added_by, added_at FROM room_queue
			   WHERE room_id = $1 ORDER BY position ASC"#,
			room_id.as_uuid()
		)
		.fetch_all(&self.pool)
		.await
		.map_err(Error::from)?;
		Ok(rows.into_iter().map(QueueEntry::from).collect())
	}
}
