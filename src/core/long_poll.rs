//! Long-poll coordination
//!
//! Bridges an HTTP request to a feed subscription: the request's future
//! parks on the subscription until an event arrives or the server timeout
//! elapses. If the client disconnects, hyper drops the future and with it
//! the subscription, which deregisters from every feed.

use std::sync::Arc;
use std::time::Duration;

use crate::core::feed::{FeedRegistry, PollOutcome, Subscription};

/// A single long-poll request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    /// Session the request was authenticated under
    pub session_id: String,
    /// The caller's unicast feed key
    pub subscription_id: String,
    /// Broadcast feed to watch as well, if any
    pub broadcast: Option<String>,
}

impl PollRequest {
    pub fn unicast(session_id: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            subscription_id: subscription_id.into(),
            broadcast: None,
        }
    }

    pub fn with_broadcast(mut self, feed: impl Into<String>) -> Self {
        self.broadcast = Some(feed.into());
        self
    }

    /// Watched feeds, personal feed first
    pub fn feeds(&self) -> Vec<String> {
        let mut feeds = vec![self.subscription_id.clone()];
        if let Some(broadcast) = &self.broadcast {
            feeds.push(broadcast.clone());
        }
        feeds
    }
}

pub struct LongPollCoordinator {
    registry: Arc<FeedRegistry>,
    timeout: Duration,
}

impl LongPollCoordinator {
    pub fn new(registry: Arc<FeedRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register the request's subscription without waiting yet
    pub fn register(&self, request: &PollRequest) -> Subscription {
        let subscription = self.registry.subscribe(&request.feeds());
        log::debug!(
            "Session {} subscribed as {} on {:?}",
            request.session_id,
            subscription.id(),
            subscription.keys().collect::<Vec<_>>()
        );
        subscription
    }

    /// Park until the subscription resolves or the server timeout elapses
    pub async fn wait(&self, request: &PollRequest, subscription: Subscription) -> PollOutcome {
        let outcome = subscription.recv(self.timeout).await;
        match &outcome {
            PollOutcome::Event(event) => log::debug!(
                "Delivered event from feed {} to session {}",
                event.feed,
                request.session_id
            ),
            PollOutcome::TimedOut => log::debug!(
                "Long-poll for {} timed out after {:?}",
                request.subscription_id,
                self.timeout
            ),
            PollOutcome::Closed => log::debug!(
                "Long-poll for {} released by a retired feed",
                request.subscription_id
            ),
        }
        outcome
    }

    /// Register and wait in one step
    pub async fn listen(&self, request: &PollRequest) -> PollOutcome {
        let subscription = self.register(request);
        self.wait(request, subscription).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{Event, PlayEvent};

    #[test]
    fn test_feeds_put_unicast_first() {
        let request = PollRequest::unicast("s", "me").with_broadcast("game");
        assert_eq!(request.feeds(), vec!["me".to_string(), "game".to_string()]);
        assert_eq!(PollRequest::unicast("s", "me").feeds(), vec!["me".to_string()]);
    }

    #[tokio::test]
    async fn test_listen_times_out_without_events() {
        let registry = Arc::new(FeedRegistry::new());
        let coordinator = LongPollCoordinator::new(Arc::clone(&registry), Duration::from_millis(30));
        let outcome = coordinator.listen(&PollRequest::unicast("s", "me")).await;
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(registry.waiter_count("me"), 0);
    }

    #[tokio::test]
    async fn test_listen_resolves_on_broadcast() {
        let registry = Arc::new(FeedRegistry::new());
        let coordinator = LongPollCoordinator::new(Arc::clone(&registry), Duration::from_secs(5));
        let request = PollRequest::unicast("s", "me").with_broadcast("game");

        let subscription = coordinator.register(&request);
        registry.publish(Event::new("game", PlayEvent::message("hello")));

        match coordinator.wait(&request, subscription).await {
            PollOutcome::Event(event) => assert_eq!(event.feed, "game"),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_wait_leaves_no_waiter() {
        let registry = Arc::new(FeedRegistry::new());
        let coordinator = LongPollCoordinator::new(Arc::clone(&registry), Duration::from_secs(5));
        let request = PollRequest::unicast("s", "me");

        let abandoned = tokio::time::timeout(Duration::from_millis(20), coordinator.listen(&request)).await;
        assert!(abandoned.is_err());
        assert_eq!(registry.waiter_count("me"), 0);
    }
}
