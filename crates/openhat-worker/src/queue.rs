use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, trace};

use crate::action::ActionRequest;

/// Multi-producer queue of [`ActionRequest`]s feeding one worker thread.
///
/// Clones share the same queue. Producers are the scheduler thread (port
/// queries) and transport callbacks (incoming messages, connection state).
#[derive(Debug, Clone)]
pub struct ActionQueue {
    tx: Sender<ActionRequest>,
    rx: Receiver<ActionRequest>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn enqueue(&self, action: ActionRequest) {
        trace!("Enqueueing action: {}", action);
        // both ends live in self, so the channel cannot be disconnected
        let _ = self.tx.send(action);
    }

    /// Wait up to `timeout` for the next action.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<ActionRequest> {
        match self.rx.recv_timeout(timeout) {
            Ok(action) => Some(action),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drop every pending action. Returns the number dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.rx.try_iter().count();
        if dropped > 0 {
            debug!("Dropped {} pending actions", dropped);
        }
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Transport callback: the connection was lost.
    pub fn connection_lost(&self) {
        self.enqueue(ActionRequest::Reconnect);
    }

    /// Transport callback: a connection was established. Pending actions
    /// refer to the old connection and are dropped.
    pub fn connected(&self) {
        self.clear();
        self.enqueue(ActionRequest::Subscribe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_dequeue_times_out() {
        let queue = ActionQueue::new();
        let start = Instant::now();
        assert!(queue.dequeue_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_fifo_across_producers() {
        let queue = ActionQueue::new();
        let producer = queue.clone();
        thread::spawn(move || {
            producer.enqueue(ActionRequest::Subscribe);
            producer.enqueue(ActionRequest::Reconnect);
        })
        .join()
        .unwrap();
        assert_eq!(queue.len(), 2);
        let first = queue.dequeue_timeout(Duration::from_millis(10)).unwrap();
        assert!(matches!(first, ActionRequest::Subscribe));
    }

    #[test]
    fn test_connected_replaces_backlog_with_subscribe() {
        let queue = ActionQueue::new();
        queue.connection_lost();
        queue.connection_lost();
        queue.connected();
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            queue.dequeue_timeout(Duration::ZERO),
            Some(ActionRequest::Subscribe)
        ));
        assert!(queue.is_empty());
    }
}
