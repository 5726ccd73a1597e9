pub mod memory_store;
pub mod redis_store;
pub mod store;
pub mod types;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{EphemeralStore, EventStream};
pub use types::{
	HostRecord, PlaybackChanges, PlaybackSnapshot, PlaybackStatus, QueueAction, RoomEvent, RoomInfo, RoomSnapshot,
	RoomStatus,
};
