//! Named event feeds with blocking subscriptions
//!
//! Every feed keeps a bounded FIFO of events nobody was waiting for and the
//! set of subscriptions currently blocked on it. A subscription may watch
//! several feeds at once and resolves with the first event to reach any of
//! them. Events published while subscriptions are blocked are handed to all
//! of them; otherwise they are queued for the next subscriber.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::constants::DEFAULT_FEED_CAPACITY;
use crate::core::event::Event;

/// Result of waiting on a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// An event arrived on one of the watched feeds
    Event(Event),
    /// Nothing arrived before the deadline; feed state is unchanged
    TimedOut,
    /// A watched feed was retired while waiting
    Closed,
}

/// Bookkeeping shared by every copy of one published event.
///
/// `outstanding` is only written under the lock of the event's feed.
struct Copies {
    outstanding: AtomicUsize,
    consumed: AtomicBool,
    requeue: bool,
}

impl Copies {
    fn new(outstanding: usize, requeue: bool) -> Arc<Self> {
        Arc::new(Self {
            outstanding: AtomicUsize::new(outstanding),
            consumed: AtomicBool::new(false),
            requeue,
        })
    }
}

/// An event handed to one waiter
struct Delivery {
    event: Event,
    copies: Arc<Copies>,
}

impl Delivery {
    fn read(self) -> Event {
        self.copies.consumed.store(true, Ordering::Release);
        self.event
    }
}

/// One blocked subscription. Resolves at most once across all its feeds.
struct Waiter {
    id: u64,
    slot: Mutex<Option<oneshot::Sender<Delivery>>>,
}

impl Waiter {
    fn new(id: u64, sender: oneshot::Sender<Delivery>) -> Self {
        Self {
            id,
            slot: Mutex::new(Some(sender)),
        }
    }

    /// Hand the event over, or give it back if this waiter is already done
    fn deliver(&self, delivery: Delivery) -> std::result::Result<(), Delivery> {
        match self.slot.lock().take() {
            Some(sender) => sender.send(delivery),
            None => Err(delivery),
        }
    }

    fn is_done(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map_or(true, |sender| sender.is_closed())
    }

    fn close(&self) {
        self.slot.lock().take();
    }
}

struct FeedState {
    pending: VecDeque<Event>,
    waiters: Vec<Arc<Waiter>>,
    last_activity: Instant,
}

impl FeedState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// A single named feed. Its state sits behind its own lock.
pub struct Feed {
    state: Mutex<FeedState>,
}

impl Feed {
    fn new() -> Self {
        Self {
            state: Mutex::new(FeedState {
                pending: VecDeque::new(),
                waiters: Vec::new(),
                last_activity: Instant::now(),
            }),
        }
    }
}

/// Shared registry of all feeds.
///
/// Uses `DashMap` for the key space and one `parking_lot::Mutex` per feed,
/// so traffic on unrelated feeds never contends. Lock order is always
/// map shard, then feed, then waiter slot.
pub struct FeedRegistry {
    feeds: DashMap<String, Arc<Feed>>,
    capacity: usize,
    next_waiter_id: AtomicU64,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Registry whose feeds queue at most `capacity` undelivered events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            feeds: DashMap::new(),
            capacity: capacity.max(1),
            next_waiter_id: AtomicU64::new(1),
        }
    }

    fn feed(&self, key: &str) -> Arc<Feed> {
        if let Some(feed) = self.feeds.get(key) {
            return Arc::clone(feed.value());
        }
        self.feeds
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Feed::new()))
            .value()
            .clone()
    }

    /// Create the feed if it does not exist yet
    pub fn ensure(&self, key: &str) {
        self.feed(key);
    }

    /// Publish an event to its feed and return how many waiters received it.
    ///
    /// When no waiter takes the event it is queued; past the capacity the
    /// oldest queued event is dropped.
    pub fn publish(&self, event: Event) -> usize {
        let feed = self.feed(&event.feed);
        let mut state = feed.state.lock();
        state.touch();

        let copies = Copies::new(0, true);
        let mut delivered = 0;
        for waiter in std::mem::take(&mut state.waiters) {
            let delivery = Delivery {
                event: event.clone(),
                copies: Arc::clone(&copies),
            };
            if waiter.deliver(delivery).is_ok() {
                delivered += 1;
            }
        }
        copies.outstanding.store(delivered, Ordering::Release);

        if delivered == 0 {
            if state.pending.len() >= self.capacity {
                if let Some(dropped) = state.pending.pop_front() {
                    log::warn!(
                        "Feed {} is full, dropping oldest event {:?}",
                        event.feed,
                        dropped.payload
                    );
                }
            }
            log::trace!("Queued event on feed {}", event.feed);
            state.pending.push_back(event);
        } else {
            log::trace!("Event on feed {} delivered to {} waiters", event.feed, delivered);
        }

        delivered
    }

    /// Hand an event to the subscriptions blocked on its feed right now,
    /// skipping `skip_waiter`. Nothing is queued: with nobody waiting the
    /// event is dropped, and a copy nobody reads is never requeued.
    pub fn publish_live(&self, event: Event, skip_waiter: Option<u64>) -> usize {
        let feed = self.feed(&event.feed);
        let mut state = feed.state.lock();
        state.touch();

        let copies = Copies::new(0, false);
        let mut delivered = 0;
        let mut kept = Vec::new();
        for waiter in std::mem::take(&mut state.waiters) {
            if Some(waiter.id) == skip_waiter {
                kept.push(waiter);
                continue;
            }
            let delivery = Delivery {
                event: event.clone(),
                copies: Arc::clone(&copies),
            };
            if waiter.deliver(delivery).is_ok() {
                delivered += 1;
            }
        }
        state.waiters = kept;
        copies.outstanding.store(delivered, Ordering::Release);

        log::trace!(
            "Live event on feed {} delivered to {} waiters",
            event.feed,
            delivered
        );
        delivered
    }

    /// Register a subscription on `keys` and return it without waiting.
    ///
    /// Keys are in priority order: if several feeds already hold events,
    /// the first key's oldest event wins. Registering before publishing
    /// guarantees the caller sees its own events.
    pub fn subscribe(&self, keys: &[String]) -> Subscription {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_waiter_id.fetch_add(1, Ordering::AcqRel);
        let waiter = Arc::new(Waiter::new(id, sender));

        let mut seen = HashSet::new();
        let mut feeds = Vec::with_capacity(keys.len());

        for key in keys {
            if !seen.insert(key.as_str()) {
                continue;
            }

            let feed = self.feed(key);
            {
                let mut state = feed.state.lock();
                state.touch();

                if !waiter.is_done() {
                    match state.pending.pop_front() {
                        Some(event) => {
                            let delivery = Delivery {
                                event,
                                copies: Copies::new(1, true),
                            };
                            if let Err(delivery) = waiter.deliver(delivery) {
                                state.pending.push_front(delivery.event);
                            }
                        }
                        None => state.waiters.push(Arc::clone(&waiter)),
                    }
                }
            }
            feeds.push((key.clone(), feed));
        }

        Subscription {
            waiter,
            receiver,
            feeds,
        }
    }

    /// Subscribe to `keys` and wait up to `timeout` for an event
    pub async fn poll(&self, keys: &[String], timeout: Duration) -> PollOutcome {
        self.subscribe(keys).recv(timeout).await
    }

    /// Drop a feed. Waiters blocked on it are released with `Closed`.
    pub fn retire(&self, key: &str) -> bool {
        let Some((_, feed)) = self.feeds.remove(key) else {
            return false;
        };

        let mut state = feed.state.lock();
        for waiter in state.waiters.drain(..) {
            waiter.close();
        }
        if !state.pending.is_empty() {
            log::debug!(
                "Retired feed {} with {} undelivered events",
                key,
                state.pending.len()
            );
        }
        state.pending.clear();
        true
    }

    /// Drop feeds that are empty, unwatched and idle for at least `ttl`
    pub fn retire_idle(&self, ttl: Duration) -> usize {
        let before = self.feeds.len();
        self.feeds.retain(|_, feed| {
            let mut state = feed.state.lock();
            state.waiters.retain(|waiter| !waiter.is_done());
            !(state.waiters.is_empty()
                && state.pending.is_empty()
                && state.last_activity.elapsed() >= ttl)
        });
        before.saturating_sub(self.feeds.len())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.feeds.contains_key(key)
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Number of queued events on a feed (0 for unknown feeds)
    pub fn pending_len(&self, key: &str) -> usize {
        self.feeds
            .get(key)
            .map(|feed| feed.state.lock().pending.len())
            .unwrap_or(0)
    }

    /// Number of live subscriptions blocked on a feed
    pub fn waiter_count(&self, key: &str) -> usize {
        self.feeds
            .get(key)
            .map(|feed| {
                feed.state
                    .lock()
                    .waiters
                    .iter()
                    .filter(|waiter| !waiter.is_done())
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for FeedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered wait on one or more feeds.
///
/// Dropping it (for example when the HTTP client goes away) removes it from
/// every feed. An event that was already handed to it but never read is put
/// back at the front of its feed, unless another copy of it was read or is
/// still in flight.
pub struct Subscription {
    waiter: Arc<Waiter>,
    receiver: oneshot::Receiver<Delivery>,
    feeds: Vec<(String, Arc<Feed>)>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.waiter.id
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.feeds.iter().map(|(key, _)| key.as_str())
    }

    /// Wait for the first event on any watched feed
    pub async fn recv(mut self, timeout: Duration) -> PollOutcome {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(delivery)) => PollOutcome::Event(delivery.read()),
            Ok(Err(_)) => PollOutcome::Closed,
            Err(_) => self.reclaim(),
        }
    }

    /// Stop accepting deliveries and keep one that raced the deadline
    fn reclaim(&mut self) -> PollOutcome {
        self.receiver.close();
        match self.receiver.try_recv() {
            Ok(delivery) => PollOutcome::Event(delivery.read()),
            Err(_) => PollOutcome::TimedOut,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.waiter.close();
        self.receiver.close();
        let mut unread = self.receiver.try_recv().ok();

        for (key, feed) in &self.feeds {
            let mut state = feed.state.lock();
            state.waiters.retain(|waiter| waiter.id != self.waiter.id);

            if unread.as_ref().map_or(false, |d| &d.event.feed == key) {
                if let Some(delivery) = unread.take() {
                    let copies = &delivery.copies;
                    let left = copies
                        .outstanding
                        .load(Ordering::Acquire)
                        .saturating_sub(1);
                    copies.outstanding.store(left, Ordering::Release);

                    if copies.requeue && left == 0 && !copies.consumed.load(Ordering::Acquire) {
                        log::debug!(
                            "Subscription {} dropped, requeueing event on {}",
                            self.waiter.id,
                            key
                        );
                        state.pending.push_front(delivery.event);
                    }
                }
            }
        }
    }
}
