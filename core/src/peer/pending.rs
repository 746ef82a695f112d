//! Pending-request tracker
//!
//! Maps in-flight request identifiers to their original payload and outcome.
//! A request moves from `Pending` to a terminal status exactly once, driven by
//! the matching Ack/Error frame. Callers suspend on a per-request watch
//! channel rather than polling, so inbound frames keep flowing while they wait.

use super::ids::IdAllocator;
use crate::types::RequestId;
use crate::wire::{ErrorReason, SpaceErrorReason};
use crate::{Error, Result};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Why the relay rejected a request
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FailureReason {
    /// Generic Error frame
    Relay(ErrorReason),
    /// SpaceError frame answering a CreateSpace
    Space(SpaceErrorReason),
}

/// Outcome of a tracked request
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RequestStatus {
    Pending,
    Completed,
    Failed(FailureReason),
    /// No record for the id, or the wait timed out before an answer arrived
    NotFound,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed(_))
    }
}

struct PendingRequest {
    payload: Bytes,
    status: watch::Sender<RequestStatus>,
    waiting: bool,
}

/// Tracks requests awaiting an Ack or Error from the relay
pub struct PendingTracker {
    requests: Mutex<IdAllocator<PendingRequest>>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(IdAllocator::new()),
        }
    }

    /// Register a request and return the identifier to put on the wire
    pub async fn submit(&self, payload: Bytes) -> RequestId {
        let mut requests = self.requests.lock().await;
        let id = requests.allocate();
        let (status, _) = watch::channel(RequestStatus::Pending);
        requests.put(
            id,
            PendingRequest {
                payload,
                status,
                waiting: false,
            },
        );
        debug!(request_id = %id, "Request submitted");
        id
    }

    /// Mark a request acknowledged. Returns false if it was unknown or already terminal.
    pub async fn complete(&self, id: RequestId) -> bool {
        self.transition(id, RequestStatus::Completed).await
    }

    /// Mark a request rejected. Returns false if it was unknown or already terminal.
    pub async fn fail(&self, id: RequestId, reason: FailureReason) -> bool {
        self.transition(id, RequestStatus::Failed(reason)).await
    }

    async fn transition(&self, id: RequestId, next: RequestStatus) -> bool {
        let requests = self.requests.lock().await;
        let Some(request) = requests.get(id) else {
            debug!(request_id = %id, ?next, "Outcome for unknown request ignored");
            return false;
        };

        request.status.send_if_modified(|status| {
            if *status == RequestStatus::Pending {
                *status = next;
                true
            } else {
                debug!(request_id = %id, current = ?status, "Request already terminal");
                false
            }
        })
    }

    /// Current status without consuming the record
    pub async fn status(&self, id: RequestId) -> RequestStatus {
        let requests = self.requests.lock().await;
        requests
            .get(id)
            .map(|request| *request.status.borrow())
            .unwrap_or(RequestStatus::NotFound)
    }

    /// Payload registered with `submit`
    pub async fn payload(&self, id: RequestId) -> Option<Bytes> {
        let requests = self.requests.lock().await;
        requests.get(id).map(|request| request.payload.clone())
    }

    /// Wait until the request is terminal or `timeout` elapses, then release its id.
    ///
    /// Returns immediately if the request already finished. A timed-out wait
    /// yields `NotFound`; the relay may still complete the work. Only one
    /// caller may wait on an id at a time.
    pub async fn await_outcome(&self, id: RequestId, timeout: Duration) -> Result<RequestStatus> {
        let mut receiver = {
            let mut requests = self.requests.lock().await;
            let Some(request) = requests.get_mut(id) else {
                return Ok(RequestStatus::NotFound);
            };

            let status = *request.status.borrow();
            if status.is_terminal() {
                requests.release(id);
                return Ok(status);
            }
            if request.waiting {
                return Err(Error::AlreadyAwaited(id));
            }
            request.waiting = true;
            request.status.subscribe()
        };

        if tokio::time::timeout(timeout, receiver.wait_for(RequestStatus::is_terminal))
            .await
            .is_err()
        {
            debug!(request_id = %id, ?timeout, "Gave up waiting for request outcome");
        }

        // Re-read under the lock so an answer racing the timeout is not lost
        let mut requests = self.requests.lock().await;
        let status = requests
            .get(id)
            .map(|request| *request.status.borrow())
            .filter(RequestStatus::is_terminal)
            .unwrap_or(RequestStatus::NotFound);
        requests.release(id);
        Ok(status)
    }

    /// Drop a request whose caller will never wait for it
    pub async fn forget(&self, id: RequestId) -> bool {
        self.requests.lock().await.release(id)
    }

    /// Requests registered and not yet released
    pub async fn in_flight(&self) -> usize {
        self.requests.lock().await.in_flight()
    }
}

impl Default for PendingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_terminal_status_is_never_overwritten() {
        let tracker = PendingTracker::new();
        let id = tracker.submit(Bytes::from_static(b"{}")).await;

        assert!(tracker.complete(id).await);
        assert!(!tracker.complete(id).await);
        assert!(!tracker.fail(id, FailureReason::Relay(ErrorReason::NonExistentSpace)).await);
        assert_eq!(tracker.status(id).await, RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_keeps_reason() {
        let tracker = PendingTracker::new();
        let id = tracker.submit(Bytes::new()).await;
        let reason = FailureReason::Space(SpaceErrorReason::TooManySimilar);

        assert!(tracker.fail(id, reason).await);
        assert!(!tracker.complete(id).await);
        assert_eq!(tracker.await_outcome(id, WAIT).await.unwrap(), RequestStatus::Failed(reason));
    }

    #[tokio::test]
    async fn test_await_returns_immediately_when_terminal_and_releases() {
        let tracker = PendingTracker::new();
        let id = tracker.submit(Bytes::from_static(b"post")).await;
        assert_eq!(tracker.payload(id).await, Some(Bytes::from_static(b"post")));
        tracker.complete(id).await;

        assert_eq!(tracker.await_outcome(id, WAIT).await.unwrap(), RequestStatus::Completed);
        assert_eq!(tracker.in_flight().await, 0);
        assert_eq!(tracker.status(id).await, RequestStatus::NotFound);
        assert_eq!(tracker.payload(id).await, None);
    }

    #[tokio::test]
    async fn test_await_wakes_on_completion() {
        let tracker = Arc::new(PendingTracker::new());
        let id = tracker.submit(Bytes::new()).await;

        let completer = Arc::clone(&tracker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            completer.complete(id).await;
        });

        let status = tracker.await_outcome(id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(status, RequestStatus::Completed);
        assert_eq!(tracker.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_not_found_and_releases() {
        let tracker = PendingTracker::new();
        let id = tracker.submit(Bytes::new()).await;

        let status = tracker.await_outcome(id, Duration::from_secs(1)).await.unwrap();
        assert_eq!(status, RequestStatus::NotFound);
        assert_eq!(tracker.in_flight().await, 0);

        // A late Ack after the timeout is ignored
        assert!(!tracker.complete(id).await);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let tracker = PendingTracker::new();
        assert_eq!(
            tracker.await_outcome(RequestId(42), WAIT).await.unwrap(),
            RequestStatus::NotFound
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_waiter_rejected() {
        let tracker = Arc::new(PendingTracker::new());
        let id = tracker.submit(Bytes::new()).await;

        let first = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.await_outcome(id, Duration::from_secs(10)).await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            tracker.await_outcome(id, WAIT).await,
            Err(Error::AlreadyAwaited(rejected)) if rejected == id
        ));

        tracker.complete(id).await;
        assert_eq!(first.await.unwrap().unwrap(), RequestStatus::Completed);
    }

    #[tokio::test]
    async fn test_forget_releases_id() {
        let tracker = PendingTracker::new();
        let id = tracker.submit(Bytes::new()).await;
        assert!(tracker.forget(id).await);
        assert!(!tracker.forget(id).await);
        assert_eq!(tracker.in_flight().await, 0);
    }
}
