use std::{pin::Pin, sync::Arc};

use futures::Stream;
use synq_core::{Error, RoomId};
use synq_database::DurableStore;
use synq_ess::EphemeralStore;
use synq_service::{DisconnectReason, Services};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{instrument, warn};

use crate::{
	auth::caller_id,
	convert::{host_command_to_update, room_event_to_pb},
	pb::streaming::v1::{
		server_response, sync_service_server::SyncService as SyncServiceTrait, HostCommand, MemberStatus, ServerBroadcast,
		ServerResponse, SyncReply, SyncRequest,
	},
};

fn error_response(err: &Error) -> ServerResponse {
	ServerResponse {
		r#type: server_response::Type::Error as i32,
		total_member_count: 0,
		ready_member_count: 0,
		error_message: err.public_message(),
	}
}

/// Bidi streaming surface: the host command pipeline, the member sync
/// pipeline, and the unaffiliated clock service.
pub struct SyncService<D, E> {
	services: Arc<Services<D, E>>,
}

impl<D, E> SyncService<D, E> {
	#[must_use]
	pub fn new(services: Arc<Services<D, E>>) -> Self { Self { services } }
}

#[tonic::async_trait]
impl<D, E> SyncServiceTrait for SyncService<D, E>
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	type SendHostCommandStream = Pin<Box<dyn Stream<Item = Result<ServerResponse, Status>> + Send>>;

	/// Opening the stream does not by itself attach a host (there is no
	/// attach handshake on this RPC, unlike `MemberSync`): the room is only
	/// known once the first command names it. Closing the stream — for any
	/// reason, including a panic unwinding this task — always runs the
	/// host-leave path for whichever room was last attached.
	#[instrument(skip(self, request))]
	async fn send_host_command(
		&self, request: Request<Streaming<HostCommand>>,
	) -> Result<Response<Self::SendHostCommandStream>, Status> {
		let host_id = caller_id(&request)?;
		let mut inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(16);
		let services = Arc::clone(&self.services);

		tokio::spawn(async move {
			let mut attached_room: Option<RoomId> = None;

			loop {
				let message = match inbound.message().await {
					| Ok(Some(message)) => message,
					| Ok(None) => break,
					| Err(err) => {
						warn!(%err, "host command stream read failed");
						break;
					},
				};

				let (room_id, update) = match host_command_to_update(message) {
					| Ok(parsed) => parsed,
					| Err(err) => {
						if tx.send(Ok(error_response(&err))).await.is_err() {
							break;
						}
						continue;
					},
				};

				if attached_room.is_none() {
					reattach_if_disconnected(&services, room_id, &host_id).await;
					attached_room = Some(room_id);
				}

				let response = match services.rooms.update_playback(room_id, &host_id, update).await {
					| Ok(()) => acknowledged(&services, room_id).await,
					| Err(err) => error_response(&err),
				};
				if tx.send(Ok(response)).await.is_err() {
					break;
				}
			}

			if let Some(room_id) = attached_room {
				if let Err(err) = services.rooms.leave(room_id, host_id).await {
					warn!(%err, "host stream close cleanup failed");
				}
			}
		});

		Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
	}

	type MemberSyncStream = Pin<Box<dyn Stream<Item = Result<ServerBroadcast, Status>> + Send>>;

	/// The first inbound `MemberStatus` both registers readiness and, unlike
	/// `SendHostCommand`, doubles as the Stream Hub attach handshake: its
	/// `(room_id, user_id)` is what the outbound half subscribes against.
	#[instrument(skip(self, request))]
	async fn member_sync(&self, request: Request<Streaming<MemberStatus>>) -> Result<Response<Self::MemberSyncStream>, Status> {
		let mut inbound = request.into_inner();
		let (tx, rx) = mpsc::channel(16);
		let services = Arc::clone(&self.services);

		tokio::spawn(async move {
			let first = match inbound.message().await {
				| Ok(Some(first)) => first,
				| Ok(None) => return,
				| Err(err) => {
					warn!(%err, "member sync stream read failed before attach");
					return;
				},
			};

			let Ok(room_id) = first.room_id.parse::<RoomId>() else {
				let _ = tx.send(Err(Status::invalid_argument("invalid room_id"))).await;
				return;
			};
			let user_id = first.user_id;
			services.status.record(room_id, user_id.clone(), first.ready);

			let mut hub_rx = services.hub.attach(room_id, user_id.clone());
			let hub = Arc::clone(&services.hub);

			loop {
				tokio::select! {
					biased;
					event = hub_rx.recv() => {
						let Some(event) = event else { break };
						let broadcast = ServerBroadcast { room_id: room_id.to_string(), update: Some(room_event_to_pb(event)) };
						if tx.send(Ok(broadcast)).await.is_err() {
							break;
						}
					}
					message = inbound.message() => {
						match message {
							| Ok(Some(status)) => services.status.record(room_id, user_id.clone(), status.ready),
							| Ok(None) => break,
							| Err(err) => {
								warn!(%err, "member sync stream read failed");
								break;
							},
						}
					}
				}
			}

			let reason = hub.take_disconnect_reason(room_id, &user_id);
			hub.detach(room_id, &user_id);
			services.status.forget_member(room_id, &user_id);
			if let Err(err) = services.rooms.leave(room_id, user_id).await {
				warn!(%err, "member leave cleanup failed");
			}
			if reason == Some(DisconnectReason::SlowSubscriber) {
				let _ = tx.send(Err(Status::resource_exhausted("slow_subscriber"))).await;
			}
		});

		Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
	}

	#[instrument(skip(self, request))]
	async fn timing_sync(&self, request: Request<SyncRequest>) -> Result<Response<SyncReply>, Status> {
		let req = request.into_inner();
		let sample = self.services.clock.timing_sync(req.client_send_ms);
		Ok(Response::new(SyncReply { server_receive_ms: sample.server_receive_ms, server_send_ms: sample.server_send_ms }))
	}
}

/// On the first command of a stream, reconnects a host whose ESS record was
/// still marked disconnected (mid grace-window); a fresh room's host is
/// already connected from `RoomManager::create`, so this is a no-op there.
async fn reattach_if_disconnected<D, E>(services: &Services<D, E>, room_id: RoomId, host_id: &synq_core::UserId)
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	let Ok(snapshot) = services.rooms.snapshot(room_id).await else { return };
	if snapshot.host.as_ref().is_some_and(|host| !host.connected) {
		if let Err(err) = services.rooms.reattach_host(room_id, host_id.clone()).await {
			warn!(%err, room_id = %room_id, "host reattach failed");
		}
	}
}

async fn acknowledged<D, E>(services: &Services<D, E>, room_id: RoomId) -> ServerResponse
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	let total_member_count = services.rooms.snapshot(room_id).await.map(|s| s.member_count).unwrap_or_default();
	ServerResponse {
		r#type: server_response::Type::Acknowledged as i32,
		total_member_count: i32::try_from(total_member_count).unwrap_or(i32::MAX),
		ready_member_count: i32::try_from(services.status.ready_count(room_id)).unwrap_or(i32::MAX),
		error_message: String::new(),
	}
}
