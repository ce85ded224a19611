use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// What subscribers receive: the Postgres NOTIFY shape — a channel name and a
/// string payload (JSON-encoded event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    pub payload: String,
}

/// Per-parking broadcast hub for committed events.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

/// Channel name for a parking, as used by `LISTEN parking_<ulid>`.
pub fn channel_name(parking_id: &Ulid) -> String {
    format!("parking_{parking_id}")
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a parking's channel, creating it if needed.
    pub fn subscribe(&self, parking_id: Ulid) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(parking_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a committed event. No-op if nobody is listening.
    pub fn send(&self, parking_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&parking_id) {
            let payload = serde_json::to_string(event).unwrap_or_default();
            let _ = sender.send(Notification {
                channel: channel_name(&parking_id),
                payload,
            });
        }
    }

    /// Drop a parking's channel once the parking is removed.
    pub fn remove(&self, parking_id: &Ulid) {
        self.channels.remove(parking_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Interval;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);

        let event = Event::ReservationBooked {
            id: Ulid::new(),
            parking_id: pid,
            principal_id: "alice".into(),
            interval: Interval::new(1000, 2000),
        };
        hub.send(pid, &event);

        let got = rx.recv().await.unwrap();
        assert_eq!(got.channel, channel_name(&pid));
        let decoded: Event = serde_json::from_str(&got.payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        hub.send(pid, &Event::ParkingRemoved { id: pid });
    }

    #[tokio::test]
    async fn removed_channel_stops_delivery() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);
        hub.remove(&pid);
        hub.send(pid, &Event::ParkingRemoved { id: pid });
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ));
    }
}
