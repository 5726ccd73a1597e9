//! gRPC transport surface: `RoomService`, `RoomStreamService`, and
//! `SyncService`, implemented directly against the generated stubs in
//! [`pb`]. This crate owns the single seam where [`synq_core::Error`]
//! becomes a [`tonic::Status`] and where wire messages convert to and from
//! the engine's internal types ([`convert`]).

pub mod auth;
pub mod convert;
pub mod pb;
pub mod room_service;
pub mod roomstream_service;
pub mod sync_service;

pub use room_service::RoomService;
pub use roomstream_service::RoomStreamService;
pub use sync_service::SyncService;
