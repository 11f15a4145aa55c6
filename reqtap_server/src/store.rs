//! Request history and broadcast to live viewers

use reqtap_common::{constants::HISTORY_CAPACITY, FeedEvent, RequestLog};
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};

/// What a newly connected viewer starts from
pub struct Subscription {
    /// History at the moment of subscribing, oldest first
    pub snapshot: Vec<RequestLog>,
    /// Every event published after the snapshot was taken
    pub events: broadcast::Receiver<FeedEvent>,
}

/// Bounded history of captured records with broadcast capability
///
/// Appends publish while holding the history lock and subscribers take
/// their snapshot under the same lock, so a record is seen either in the
/// snapshot or on the live channel, never both.
pub struct RequestStore {
    requests: RwLock<VecDeque<RequestLog>>,
    broadcast_tx: broadcast::Sender<FeedEvent>,
}

impl RequestStore {
    /// Create a store whose viewers may fall `subscriber_buffer` events behind
    pub fn new(subscriber_buffer: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(subscriber_buffer.max(1));
        Self {
            requests: RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            broadcast_tx,
        }
    }

    /// Add a record, evicting the oldest at capacity, and broadcast it
    ///
    /// Returns the number of viewers the record was published to.
    pub async fn append(&self, record: RequestLog) -> usize {
        let mut requests = self.requests.write().await;

        if requests.len() >= HISTORY_CAPACITY {
            if let Some(evicted) = requests.pop_front() {
                tracing::trace!("Evicted record {}", evicted.id);
            }
        }

        requests.push_back(record.clone());

        // Broadcast to subscribers (ignore if no receivers)
        self.broadcast_tx
            .send(FeedEvent::NewRequest(record))
            .unwrap_or(0)
    }

    /// Snapshot the history and register for every later event
    pub async fn subscribe(&self) -> Subscription {
        let requests = self.requests.read().await;
        let events = self.broadcast_tx.subscribe();
        Subscription {
            snapshot: requests.iter().cloned().collect(),
            events,
        }
    }

    /// Get all stored records, oldest first
    pub async fn get_requests(&self) -> Vec<RequestLog> {
        self.requests.read().await.iter().cloned().collect()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }

    /// Clear the shared history and tell every viewer
    ///
    /// Returns the number of records removed.
    pub async fn clear(&self) -> usize {
        let mut requests = self.requests.write().await;
        let removed = requests.len();
        requests.clear();
        let _ = self.broadcast_tx.send(FeedEvent::Cleared);
        removed
    }

    /// Number of currently subscribed viewers
    pub fn viewer_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn record(n: usize) -> RequestLog {
        RequestLog {
            id: n.to_string(),
            url: format!("r{}", n),
            method: "GET".to_string(),
            ..Default::default()
        }
    }

    fn ids(records: &[RequestLog]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_history_keeps_most_recent() {
        let store = RequestStore::new(16);

        for n in 0..42 {
            store.append(record(n)).await;
        }
        assert_eq!(store.len().await, 42);

        for n in 42..250 {
            store.append(record(n)).await;
            assert!(store.len().await <= HISTORY_CAPACITY);
        }

        let history = store.get_requests().await;
        let expected: Vec<String> = (150..250).map(|n| n.to_string()).collect();
        assert_eq!(ids(&history), expected);
    }

    #[tokio::test]
    async fn test_append_without_viewers() {
        let store = RequestStore::new(16);
        assert_eq!(store.append(record(1)).await, 0);

        let sub = store.subscribe().await;
        assert_eq!(ids(&sub.snapshot), vec!["1"]);
    }

    #[tokio::test]
    async fn test_snapshot_then_live_without_duplicates() {
        let store = RequestStore::new(16);
        store.append(record(1)).await;
        store.append(record(2)).await;

        let mut sub = store.subscribe().await;
        assert_eq!(ids(&sub.snapshot), vec!["1", "2"]);
        assert!(matches!(sub.events.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(store.append(record(3)).await, 1);
        match sub.events.recv().await.unwrap() {
            FeedEvent::NewRequest(log) => assert_eq!(log.id, "3"),
            other => panic!("Wrong event: {:?}", other),
        }
        assert!(matches!(sub.events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_snapshot_is_capped() {
        let store = RequestStore::new(16);
        for n in 0..130 {
            store.append(record(n)).await;
        }

        let sub = store.subscribe().await;
        assert_eq!(sub.snapshot.len(), HISTORY_CAPACITY);
        assert_eq!(sub.snapshot[0].id, "30");
    }

    #[tokio::test]
    async fn test_clear_broadcasts() {
        let store = RequestStore::new(16);
        store.append(record(1)).await;
        let mut sub = store.subscribe().await;

        assert_eq!(store.clear().await, 1);
        assert!(store.is_empty().await);
        assert_eq!(sub.events.recv().await.unwrap(), FeedEvent::Cleared);
    }

    #[tokio::test]
    async fn test_lagging_viewer_is_detected() {
        let store = RequestStore::new(4);
        let mut slow = store.subscribe().await;

        for n in 0..10 {
            store.append(record(n)).await;
        }

        assert!(matches!(slow.events.recv().await, Err(RecvError::Lagged(6))));
        assert_eq!(store.len().await, 10);
    }

    #[tokio::test]
    async fn test_dropped_viewer_is_unregistered() {
        let store = RequestStore::new(16);
        let first = store.subscribe().await;
        let _second = store.subscribe().await;
        assert_eq!(store.viewer_count(), 2);

        drop(first);
        assert_eq!(store.viewer_count(), 1);
        assert_eq!(store.append(record(1)).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let store = Arc::new(RequestStore::new(512));
        let mut sub = store.subscribe().await;

        let mut handles = Vec::new();
        for sender in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..3 {
                    store.append(record(sender * 3 + i)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut published = Vec::new();
        while let Ok(FeedEvent::NewRequest(log)) = sub.events.try_recv() {
            published.push(log);
        }
        assert_eq!(published.len(), 150);

        let history = store.get_requests().await;
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(ids(&history), ids(&published[50..]));
    }
}
