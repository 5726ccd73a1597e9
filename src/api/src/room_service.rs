use std::sync::Arc;

use synq_core::{Error, RoomId};
use synq_database::{DurableStore, RoomFilter};
use synq_ess::EphemeralStore;
use synq_service::Services;
use tonic::{Request, Response, Status};

use crate::{
	convert::{room_to_pb, visibility_from_pb},
	pb::{
		common::v1::Room as PbRoom,
		room::v1::{
			room_service_server::RoomService as RoomServiceTrait, CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest,
			LeaveRoomResponse, ListRoomsRequest, ListRoomsResponse,
		},
	},
};

pub struct RoomService<D, E> {
	services: Arc<Services<D, E>>,
}

impl<D, E> RoomService<D, E> {
	#[must_use]
	pub fn new(services: Arc<Services<D, E>>) -> Self { Self { services } }
}

#[tonic::async_trait]
impl<D, E> RoomServiceTrait for RoomService<D, E>
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	async fn create_room(&self, request: Request<CreateRoomRequest>) -> Result<Response<PbRoom>, Status> {
		let req = request.into_inner();
		let visibility = visibility_from_pb(req.visibility)?;
		let description = (!req.description.is_empty()).then_some(req.description);

		let room = self.services.rooms.create(req.name, req.host_user_id, description, visibility, req.invite_only).await?;
		Ok(Response::new(room_to_pb(room)))
	}

	async fn join_room(&self, request: Request<JoinRoomRequest>) -> Result<Response<PbRoom>, Status> {
		use crate::pb::room::v1::join_room_request::RoomLookup;

		let req = request.into_inner();
		let room_id = match req.room_lookup {
			| Some(RoomLookup::RoomId(id)) => id.parse::<RoomId>()?,
			| Some(RoomLookup::RoomCode(code)) => self.services.rooms.room_id_by_code(&code).await?,
			| None => return Err(Error::Invalid("room_id or room_code is required".to_owned()).into()),
		};

		let room = self.services.rooms.join(room_id, req.user_id).await?;
		Ok(Response::new(room_to_pb(room)))
	}

	async fn leave_room(&self, request: Request<LeaveRoomRequest>) -> Result<Response<LeaveRoomResponse>, Status> {
		let req = request.into_inner();
		let room_id: RoomId = req.room_id.parse().map_err(synq_core::Error::from)?;
		self.services.rooms.leave(room_id, req.user_id).await?;
		Ok(Response::new(LeaveRoomResponse {}))
	}

	async fn list_rooms(&self, request: Request<ListRoomsRequest>) -> Result<Response<ListRoomsResponse>, Status> {
		let req = request.into_inner();
		let visibility = req.visibility_filter.map(visibility_from_pb).transpose()?;

		let filter = RoomFilter {
			visibility,
			host_user_id: req.host_user_id_filter,
			page_size: u32::try_from(req.page_size).unwrap_or(20),
			page_token: None,
		};

		let page = self.services.rooms.list_rooms(filter).await?;
		Ok(Response::new(ListRoomsResponse { rooms: page.rooms.into_iter().map(room_to_pb).collect() }))
	}
}
