//! Live ordered views over a room.
//!
//! Writers poke the room's channel with the [`Topic`] they changed; every
//! [`Subscription`] listening for that topic re-reads its whole view from the
//! store. Deliveries are therefore full snapshots, never deltas, and a lagged
//! receiver simply reads again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::SyncError;

use super::RoomCode;

const ROOM_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Messages,
    Queue,
    Playback,
}

/// Per-room change channels.
#[derive(Default)]
pub struct Hub {
    rooms: Mutex<HashMap<RoomCode, broadcast::Sender<Topic>>>,
}

impl Hub {
    pub fn new() -> Hub {
        Hub::default()
    }

    pub(crate) fn listen(&self, code: &RoomCode) -> broadcast::Receiver<Topic> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(code.clone())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub(crate) fn notify(&self, code: &RoomCode, topic: Topic) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = rooms.get(code) else {
            return;
        };
        if tx.send(topic).is_err() {
            // nobody is watching this room any more
            rooms.remove(code);
        }
    }

    /// Called by a departing listener whose receiver is still alive.
    fn release(&self, code: &RoomCode) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if rooms.get(code).is_some_and(|tx| tx.receiver_count() <= 1) {
            rooms.remove(code);
        }
    }

    pub fn watched_rooms(&self) -> usize {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

type Loader<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, SyncError>> + Send + Sync>;

/// A live view of one part of a room.
///
/// The first [`next`](Subscription::next) yields the current snapshot, every
/// later one waits for a change and yields the new snapshot. Dropping or
/// [`cancel`](Subscription::cancel)ling releases the registration.
pub struct Subscription<T> {
    topic: Topic,
    hub: Arc<Hub>,
    code: RoomCode,
    rx: broadcast::Receiver<Topic>,
    load: Loader<T>,
    pending: bool,
}

impl<T> Subscription<T> {
    pub(crate) fn new<F>(topic: Topic, hub: Arc<Hub>, code: RoomCode, load: F) -> Subscription<T>
    where
        F: Fn() -> BoxFuture<'static, Result<T, SyncError>> + Send + Sync + 'static,
    {
        let rx = hub.listen(&code);
        Subscription {
            topic,
            hub,
            code,
            rx,
            load: Box::new(load),
            pending: true,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// `None` once the room channel is gone.
    ///
    /// Cancel-safe: a change seen before the future was dropped is still
    /// delivered by the next call.
    pub async fn next(&mut self) -> Option<Result<T, SyncError>> {
        loop {
            if self.pending {
                let snapshot = (self.load)().await;
                self.pending = false;
                return Some(snapshot);
            }

            match self.rx.recv().await {
                Ok(topic) if topic == self.topic => self.pending = true,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(topic = ?self.topic, skipped, "subscription lagged, resnapshotting");
                    self.pending = true;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn cancel(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.hub.release(&self.code);
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;

    #[test]
    fn idle_rooms_are_dropped_on_notify() {
        let hub = Hub::new();
        let code = RoomCode::parse("JO-AAAAA").unwrap();

        let rx = hub.listen(&code);
        hub.notify(&code, Topic::Queue);
        assert_eq!(hub.watched_rooms(), 1);

        drop(rx);
        hub.notify(&code, Topic::Queue);
        assert_eq!(hub.watched_rooms(), 0);
    }

    fn subscription(hub: &Arc<Hub>, code: &RoomCode) -> Subscription<()> {
        Subscription::new(Topic::Playback, hub.clone(), code.clone(), || async { Ok(()) }.boxed())
    }

    #[test]
    fn last_subscription_out_releases_the_room() {
        let hub = Arc::new(Hub::new());
        let code = RoomCode::parse("JO-BBBBB").unwrap();

        let first = subscription(&hub, &code);
        let second = subscription(&hub, &code);
        assert_eq!(hub.watched_rooms(), 1);

        drop(first);
        assert_eq!(hub.watched_rooms(), 1);

        // never written to, so no notify would ever prune it
        second.cancel();
        assert_eq!(hub.watched_rooms(), 0);
    }
}
