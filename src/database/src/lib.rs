pub mod memory_store;
pub mod postgres_store;
pub mod store;
pub mod types;

pub use memory_store::MemoryDurableStore;
pub use postgres_store::PostgresStore;
pub use store::DurableStore;
pub use types::{
	Membership, MembershipRole, NewRoom, PlaybackChanges, PlaybackEventLogRow, PlaybackEventType, PlaybackState,
	PlaybackStatus, QueueEntry, Room, RoomFilter, RoomPage, RoomStatus, Visibility,
};
