use std::{pin::Pin, sync::Arc};

use futures::Stream;
use synq_core::RoomId;
use synq_database::DurableStore;
use synq_ess::EphemeralStore;
use synq_service::{DisconnectReason, Services};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::{
	convert::{playback_state_to_pb, room_event_to_pb, room_to_pb},
	pb::roomstream::v1::{
		room_stream_service_server::RoomStreamService as RoomStreamServiceTrait, JoinRoomStreamRequest, RoomStreamSnapshot,
		RoomStreamUpdate, StreamRoomUpdatesRequest,
	},
};

/// Per-room event fan-out, exposed over gRPC. `JoinRoomStream` is a
/// read-only snapshot fetch; the room membership write already happened
/// through `RoomService.JoinRoom`. `StreamRoomUpdates` is the member's
/// read-only half of the stream hub — the write half (member status
/// reports) travels over `SyncService.MemberSync` instead.
pub struct RoomStreamService<D, E> {
	services: Arc<Services<D, E>>,
}

impl<D, E> RoomStreamService<D, E> {
	#[must_use]
	pub fn new(services: Arc<Services<D, E>>) -> Self { Self { services } }
}

#[tonic::async_trait]
impl<D, E> RoomStreamServiceTrait for RoomStreamService<D, E>
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	#[instrument(skip(self, request))]
	async fn join_room_stream(&self, request: Request<JoinRoomStreamRequest>) -> Result<Response<RoomStreamSnapshot>, Status> {
		let req = request.into_inner();
		let room_id: RoomId = req.room_id.parse().map_err(synq_core::Error::from)?;

		let room = self.services.rooms.get_room(room_id).await?;
		let snapshot = self.services.rooms.snapshot(room_id).await?;

		Ok(Response::new(RoomStreamSnapshot {
			room_info: Some(room_to_pb(room)),
			current_playback: Some(playback_state_to_pb(&snapshot.playback)),
			member_count: i32::try_from(snapshot.member_count).unwrap_or(i32::MAX),
		}))
	}

	type StreamRoomUpdatesStream = Pin<Box<dyn Stream<Item = Result<RoomStreamUpdate, Status>> + Send>>;

	#[instrument(skip(self, request))]
	async fn stream_room_updates(
		&self, request: Request<StreamRoomUpdatesRequest>,
	) -> Result<Response<Self::StreamRoomUpdatesStream>, Status> {
		let req = request.into_inner();
		let room_id: RoomId = req.room_id.parse().map_err(synq_core::Error::from)?;
		let user_id = req.user_id;

		let mut inbound = self.services.hub.attach(room_id, user_id.clone());
		let hub = Arc::clone(&self.services.hub);
		let (tx, rx) = mpsc::channel(8);

		tokio::spawn(async move {
			while let Some(event) = inbound.recv().await {
				if tx.send(Ok(room_event_to_pb(event))).await.is_err() {
					break;
				}
			}

			let reason = hub.take_disconnect_reason(room_id, &user_id);
			hub.detach(room_id, &user_id);
			if reason == Some(DisconnectReason::SlowSubscriber) {
				let _ = tx.send(Err(Status::resource_exhausted("slow_subscriber"))).await;
			}
		});

		Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
	}
}
