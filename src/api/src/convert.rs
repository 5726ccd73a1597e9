use synq_core::{Error, Result, RoomId};
use synq_ess::RoomEvent;
use synq_service::PlaybackUpdateRequest;

use crate::pb;

pub fn visibility_to_pb(v: synq_database::Visibility) -> pb::common::v1::Visibility {
	match v {
		| synq_database::Visibility::Public => pb::common::v1::Visibility::Public,
		| synq_database::Visibility::Private => pb::common::v1::Visibility::Private,
	}
}

pub fn visibility_from_pb(v: i32) -> Result<synq_database::Visibility> {
	match pb::common::v1::Visibility::try_from(v).unwrap_or(pb::common::v1::Visibility::Unspecified) {
		| pb::common::v1::Visibility::Public => Ok(synq_database::Visibility::Public),
		| pb::common::v1::Visibility::Private => Ok(synq_database::Visibility::Private),
		| pb::common::v1::Visibility::Unspecified => Err(Error::Invalid("visibility must be specified".to_owned())),
	}
}

pub fn room_status_to_pb(s: synq_database::RoomStatus) -> pb::common::v1::RoomStatus {
	match s {
		| synq_database::RoomStatus::Active => pb::common::v1::RoomStatus::Active,
		| synq_database::RoomStatus::Inactive => pb::common::v1::RoomStatus::Inactive,
	}
}

pub fn ess_room_status_to_pb(s: synq_ess::RoomStatus) -> pb::common::v1::RoomStatus {
	match s {
		| synq_ess::RoomStatus::Active => pb::common::v1::RoomStatus::Active,
		| synq_ess::RoomStatus::AwaitingHost => pb::common::v1::RoomStatus::AwaitingHost,
		| synq_ess::RoomStatus::Inactive => pb::common::v1::RoomStatus::Inactive,
	}
}

pub fn playback_status_to_pb(s: synq_ess::PlaybackStatus) -> pb::common::v1::PlaybackStatus {
	match s {
		| synq_ess::PlaybackStatus::Playing => pb::common::v1::PlaybackStatus::Playing,
		| synq_ess::PlaybackStatus::Paused => pb::common::v1::PlaybackStatus::Paused,
	}
}

pub fn playback_status_from_pb(s: i32) -> Result<synq_ess::PlaybackStatus> {
	match pb::common::v1::PlaybackStatus::try_from(s).unwrap_or(pb::common::v1::PlaybackStatus::Unspecified) {
		| pb::common::v1::PlaybackStatus::Playing => Ok(synq_ess::PlaybackStatus::Playing),
		| pb::common::v1::PlaybackStatus::Paused => Ok(synq_ess::PlaybackStatus::Paused),
		| pb::common::v1::PlaybackStatus::Unspecified => Err(Error::Invalid("playback status must be specified".to_owned())),
	}
}

pub fn room_to_pb(room: synq_database::Room) -> pb::common::v1::Room {
	pb::common::v1::Room {
		id: room.id.to_string(),
		name: room.name,
		description: room.description.unwrap_or_default(),
		room_code: room.code,
		host_user_id: room.host_user_id,
		visibility: visibility_to_pb(room.visibility) as i32,
		invite_only: room.invite_only,
		status: room_status_to_pb(room.status) as i32,
		created_at_ms: room.created_at.timestamp_millis(),
	}
}

pub fn playback_state_to_pb(state: &synq_ess::PlaybackSnapshot) -> pb::common::v1::PlaybackState {
	pb::common::v1::PlaybackState {
		track_id: state.track_id.clone(),
		position_ms: synq_core::time::effective_position_ms(
			state.position_ms,
			state.status == synq_ess::PlaybackStatus::Playing,
			state.updated_at,
		),
		status: playback_status_to_pb(state.status) as i32,
		updated_at_ms: state.updated_at.timestamp_millis(),
	}
}

/// Flattens one of the three `HostCommand` oneof variants into a room id plus
/// the union of playback fields the room manager understands, inferring the
/// implied event kind: a `TrackCommand` always means SKIP, a bare
/// `PositionUpdate` always means SEEK, and `ControlCommand` carries an
/// explicit PLAY/PAUSE status.
pub fn host_command_to_update(cmd: pb::streaming::v1::HostCommand) -> Result<(RoomId, PlaybackUpdateRequest)> {
	use pb::streaming::v1::host_command::Command;

	match cmd.command {
		| Some(Command::TrackCommand(c)) => Ok((
			c.room_id.parse()?,
			PlaybackUpdateRequest { track_id: Some(c.track_id), position_ms: Some(c.position_ms.unwrap_or(0)), status: None },
		)),
		| Some(Command::PositionUpdate(c)) => {
			Ok((c.room_id.parse()?, PlaybackUpdateRequest { track_id: None, position_ms: Some(c.position_ms), status: None }))
		},
		| Some(Command::ControlCommand(c)) => {
			let status = playback_status_from_pb(c.status)?;
			Ok((c.room_id.parse()?, PlaybackUpdateRequest { track_id: None, position_ms: c.position_ms, status: Some(status) }))
		},
		| None => Err(Error::Invalid("host command missing payload".to_owned())),
	}
}

pub fn room_event_to_pb(event: RoomEvent) -> pb::roomstream::v1::RoomStreamUpdate {
	use pb::roomstream::v1::room_stream_update::Event;

	let event = match event {
		| RoomEvent::MemberJoin { user_id, member_count } => {
			Event::MemberJoin(pb::roomstream::v1::MemberJoin { user_id, member_count: member_count as i32 })
		},
		| RoomEvent::MemberLeave { user_id, member_count } => {
			Event::MemberLeave(pb::roomstream::v1::MemberLeave { user_id, member_count: member_count as i32 })
		},
		| RoomEvent::PlaybackUpdate { changes } => Event::PlaybackUpdate(pb::roomstream::v1::PlaybackUpdate {
			track_id: changes.track_id,
			position_ms: changes.position_ms,
			status: changes.status.map(|s| playback_status_to_pb(s) as i32),
		}),
		| RoomEvent::HostDisconnected { user_id, timeout_seconds } => {
			Event::HostDisconnected(pb::roomstream::v1::HostDisconnected { user_id, timeout_seconds: timeout_seconds as i32 })
		},
		| RoomEvent::QueueUpdate { action, position, track_id } => Event::QueueUpdate(pb::roomstream::v1::QueueUpdate {
			action: match action {
				| synq_ess::QueueAction::Add => pb::roomstream::v1::QueueAction::Add as i32,
				| synq_ess::QueueAction::Remove => pb::roomstream::v1::QueueAction::Remove as i32,
			},
			position,
			track_id,
		}),
		| RoomEvent::RoomStatusUpdate { status, reason } => Event::RoomStatusUpdate(pb::roomstream::v1::RoomStatusUpdate {
			status: ess_room_status_to_pb(status) as i32,
			reason,
		}),
	};

	pb::roomstream::v1::RoomStreamUpdate { event: Some(event) }
}
