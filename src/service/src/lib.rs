pub mod aggregator;
pub mod clock;
pub mod room_manager;
pub mod stream_hub;

use std::sync::Arc;

use synq_core::config::Config;
use synq_database::DurableStore;
use synq_ess::EphemeralStore;

pub use aggregator::StatusAggregator;
pub use clock::{ClockService, TimingSample};
pub use room_manager::{PlaybackUpdateRequest, RoomManager};
pub use stream_hub::{DisconnectReason, StreamHub};

/// Aggregates the engine's orchestration services for one process.
///
/// Unlike a module-level singleton, this struct is built once at startup and
/// threaded explicitly into every handler that needs it — there is no
/// global static to reach for instead.
pub struct Services<D, E> {
	pub rooms: RoomManager<D, E>,
	pub clock: ClockService,
	pub hub: Arc<StreamHub<E>>,
	pub status: StatusAggregator,
}

impl<D, E> Services<D, E>
where
	D: DurableStore + 'static,
	E: EphemeralStore + 'static,
{
	pub fn build(ds: Arc<D>, ess: Arc<E>, config: &Config) -> Self {
		let hub = Arc::new(StreamHub::new(Arc::clone(&ess), config.outbound_queue_capacity));
		let rooms = RoomManager::new(ds, ess, config.host_grace_window, config.queue_add_policy);
		Self { rooms, clock: ClockService::new(), hub, status: StatusAggregator::new() }
	}
}
