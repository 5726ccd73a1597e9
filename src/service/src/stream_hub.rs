use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt as _;
use synq_core::{RoomId, UserId};
use synq_ess::{EphemeralStore, RoomEvent};
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, warn};

/// Why a subscriber's outbound stream was torn down by the hub rather than
/// by the subscriber itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
	/// The subscriber's outbound queue was full; the hub dropped it rather
	/// than block fan-out to everyone else in the room.
	SlowSubscriber,
	/// The room's ephemeral session was torn down (grace expiry, explicit
	/// close) while this subscriber was still attached.
	RoomTornDown,
}

struct RoomFanout {
	subscribers: DashMap<UserId, mpsc::Sender<RoomEvent>>,
	reasons: DashMap<UserId, DisconnectReason>,
	shutdown: watch::Sender<bool>,
}

/// Fans out each room's single ESS subscription to one bounded queue per
/// attached member. There is at most one ESS subscription and one fan-out
/// task per room regardless of how many members are attached.
pub struct StreamHub<S> {
	store: Arc<S>,
	queue_capacity: usize,
	rooms: DashMap<RoomId, Arc<RoomFanout>>,
}

impl<S> StreamHub<S>
where
	S: EphemeralStore + 'static,
{
	#[must_use]
	pub fn new(store: Arc<S>, queue_capacity: usize) -> Self { Self { store, queue_capacity, rooms: DashMap::new() } }

	/// Registers `user_id` as a listener on `room_id`, spawning the room's
	/// fan-out task on first attach. Returns the receiving half of the
	/// member's bounded outbound queue.
	#[instrument(skip(self))]
	pub fn attach(&self, room_id: RoomId, user_id: UserId) -> mpsc::Receiver<RoomEvent> {
		let fanout = self
			.rooms
			.entry(room_id)
			.or_insert_with(|| self.spawn_fanout(room_id))
			.clone();

		let (tx, rx) = mpsc::channel(self.queue_capacity);
		fanout.reasons.remove(&user_id);
		fanout.subscribers.insert(user_id, tx);
		rx
	}

	/// Detaches `user_id` from `room_id`. If it was the last subscriber, the
	/// fan-out task and its ESS subscription are torn down within one event
	/// cycle.
	#[instrument(skip(self))]
	pub fn detach(&self, room_id: RoomId, user_id: &UserId) {
		let Some(fanout) = self.rooms.get(&room_id).map(|entry| Arc::clone(&entry)) else { return };
		fanout.subscribers.remove(user_id);

		if fanout.subscribers.is_empty() {
			self.rooms.remove(&room_id);
			let _ = fanout.shutdown.send(true);
		}
	}

	/// Looks up and clears why `user_id`'s last attachment to `room_id`
	/// ended, if the hub itself closed it. Absent means the subscriber's own
	/// side closed the stream, or it never existed.
	pub fn take_disconnect_reason(&self, room_id: RoomId, user_id: &UserId) -> Option<DisconnectReason> {
		self.rooms.get(&room_id).and_then(|fanout| fanout.reasons.remove(user_id).map(|(_, reason)| reason))
	}

	fn spawn_fanout(&self, room_id: RoomId) -> Arc<RoomFanout> {
		let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
		let fanout = Arc::new(RoomFanout { subscribers: DashMap::new(), reasons: DashMap::new(), shutdown: shutdown_tx });

		let store = Arc::clone(&self.store);
		let task_fanout = Arc::clone(&fanout);

		tokio::spawn(async move {
			let mut stream = match store.subscribe(room_id).await {
				| Ok(stream) => stream,
				| Err(err) => {
					warn!(room_id = %room_id, %err, "failed to open ephemeral subscription");
					return;
				},
			};

			loop {
				tokio::select! {
					biased;
					changed = shutdown_rx.changed() => {
						if changed.is_err() || *shutdown_rx.borrow() {
							break;
						}
					}
					item = stream.next() => {
						match item {
							None => {
								debug!(room_id = %room_id, "ephemeral subscription ended");
								break;
							},
							Some(Err(err)) => {
								warn!(room_id = %room_id, %err, "malformed room event, dropping");
							},
							Some(Ok(event)) => task_fanout.deliver(&event),
						}
					}
				}
			}

			for entry in task_fanout.subscribers.iter() {
				task_fanout.reasons.insert(entry.key().clone(), DisconnectReason::RoomTornDown);
			}
			task_fanout.subscribers.clear();
		});

		fanout
	}
}

impl RoomFanout {
	fn deliver(&self, event: &RoomEvent) {
		let mut slow = Vec::new();
		for entry in self.subscribers.iter() {
			if entry.value().try_send(event.clone()).is_err() {
				slow.push(entry.key().clone());
			}
		}
		for user_id in slow {
			self.subscribers.remove(&user_id);
			self.reasons.insert(user_id, DisconnectReason::SlowSubscriber);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use synq_ess::MemoryStore;

	use super::*;

	async fn make_room(store: &MemoryStore) -> RoomId {
		let room_id = RoomId::new();
		store.create_room_session(room_id).await.expect("create session");
		room_id
	}

	#[tokio::test]
	async fn delivers_published_events_to_attached_subscriber() {
		let store = Arc::new(MemoryStore::new());
		let room_id = make_room(&store).await;
		let hub = StreamHub::new(Arc::clone(&store), 8);

		let mut rx = hub.attach(room_id, "alice".to_owned());
		let event = RoomEvent::MemberJoin { user_id: "bob".to_owned(), member_count: 2 };
		store.publish(room_id, &event).await.expect("publish");

		let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("no timeout");
		assert_eq!(received, Some(event));
	}

	#[tokio::test]
	async fn full_queue_evicts_subscriber_as_slow() {
		let store = Arc::new(MemoryStore::new());
		let room_id = make_room(&store).await;
		let hub = StreamHub::new(Arc::clone(&store), 1);

		let rx = hub.attach(room_id, "alice".to_owned());
		// Fill then overflow the bounded queue without draining it.
		for i in 0..4 {
			let event = RoomEvent::MemberJoin { user_id: format!("user-{i}"), member_count: i };
			store.publish(room_id, &event).await.expect("publish");
			tokio::task::yield_now().await;
		}

		tokio::time::sleep(Duration::from_millis(20)).await;
		let reason = hub.take_disconnect_reason(room_id, &"alice".to_owned());
		assert_eq!(reason, Some(DisconnectReason::SlowSubscriber));
		drop(rx);
	}

	#[tokio::test]
	async fn detach_of_last_subscriber_removes_room_entry() {
		let store = Arc::new(MemoryStore::new());
		let room_id = make_room(&store).await;
		let hub = StreamHub::new(Arc::clone(&store), 8);

		let _rx = hub.attach(room_id, "alice".to_owned());
		hub.detach(room_id, &"alice".to_owned());
		assert!(hub.rooms.is_empty());
	}
}
