//! Shared, reference-counted change channels.
//!
//! ```text
//! subscribe(descriptor) ──key──► channels[(resource, predicate)]
//!                                   │ hit:  push listener (refcount + 1)
//!                                   │ miss: new Channel + spawn driver
//!                                   ▼
//! driver:  Idle → Connecting → Subscribed ──error──► Error → Reconnecting ─┐
//!                     ▲                                                    │
//!                     └──────────────── backoff.delay(n) ──────────────────┘
//!                                         exhausted ──► Closed
//! ```
//!
//! The last handle to leave a channel removes it from the map and signals
//! the driver, which closes the backend feed.

use super::{Backoff, ChangeFeed, ChannelError, ChannelKey, FeedMessage, SubscriptionDescriptor};
use crate::config::RealtimeConfig;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use vigil_auth::Filter;
use vigil_event::{ChangeEvent, ChangeKind};
use vigil_types::{ErrorCode, SessionId};

/// Handler return type. An `Err` is logged and delivery continues.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type ChangeHandler = Arc<dyn Fn(&ChangeEvent) -> HandlerResult + Send + Sync>;

/// Identifies one registration on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Lifecycle of one shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Created, driver not yet running.
    Idle,
    /// First open in flight.
    Connecting,
    /// Feed open, events flowing.
    Subscribed,
    /// The feed failed.
    Error,
    /// Waiting out backoff or re-opening.
    Reconnecting,
    /// Released or out of reconnect attempts. Terminal.
    Closed,
}

impl ChannelState {
    /// Whether the channel is failing but still trying.
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Error | Self::Reconnecting)
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Error => "error",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate realtime health, for a degraded-connectivity indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    /// No live channel is failing.
    Healthy,
    /// These channels are in `Error` or `Reconnecting`.
    Degraded {
        /// Failing channels, sorted.
        affected: Vec<ChannelKey>,
    },
}

impl Connectivity {
    /// `true` for [`Connectivity::Healthy`].
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[derive(Clone)]
struct Listener {
    id: SubscriptionId,
    owner: Option<SessionId>,
    kinds: Arc<[ChangeKind]>,
    handler: ChangeHandler,
    released: Arc<AtomicBool>,
}

struct Channel {
    key: ChannelKey,
    resource: String,
    predicate: Filter,
    listeners: Mutex<Vec<Listener>>,
    state: watch::Sender<ChannelState>,
    shutdown: watch::Sender<bool>,
}

impl Channel {
    fn new(key: ChannelKey, resource: &str, predicate: Filter) -> Self {
        let (state, _) = watch::channel(ChannelState::Idle);
        let (shutdown, _) = watch::channel(false);
        Self {
            key,
            resource: resource.to_owned(),
            predicate,
            listeners: Mutex::new(Vec::new()),
            state,
            shutdown,
        }
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ChannelState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(channel = %self.key, from = %prev, to = %next, "channel state");
        }
    }

    /// Removes a listener. Returns the remaining count, or `None` if it was
    /// not attached.
    fn remove_listener(&self, id: SubscriptionId) -> Option<usize> {
        let mut listeners = self.listeners.lock();
        let index = listeners.iter().position(|l| l.id == id)?;
        listeners.remove(index);
        Some(listeners.len())
    }

    /// Marks every listener released and detaches them all.
    fn release_listeners(&self) -> usize {
        let mut listeners = self.listeners.lock();
        let count = listeners.len();
        for listener in listeners.drain(..) {
            listener.released.store(true, Ordering::Release);
        }
        count
    }

    fn dispatch(&self, kind: ChangeKind, payload: Value) {
        if !self.predicate.matches(&payload) {
            debug!(channel = %self.key, %kind, "event outside channel predicate dropped");
            return;
        }

        let event = ChangeEvent::new(self.resource.clone(), kind, payload);
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|l| l.kinds.contains(&kind))
            .cloned()
            .collect();

        for listener in targets {
            if listener.released.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (listener.handler)(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(
                        channel = %self.key,
                        subscription = %listener.id,
                        error = %err,
                        "change handler failed"
                    );
                }
                Err(_) => {
                    warn!(
                        channel = %self.key,
                        subscription = %listener.id,
                        "change handler panicked"
                    );
                }
            }
        }
    }
}

struct ManagerInner {
    feed: Arc<dyn ChangeFeed>,
    backoff: Backoff,
    open_timeout: Duration,
    buffer: usize,
    channels: Mutex<HashMap<ChannelKey, Arc<Channel>>>,
    next_id: AtomicU64,
}

impl ManagerInner {
    fn detach(&self, channel: &Arc<Channel>, id: SubscriptionId) {
        let mut channels = self.channels.lock();
        let Some(remaining) = channel.remove_listener(id) else {
            return;
        };
        debug!(channel = %channel.key, subscription = %id, remaining, "subscription released");
        if remaining == 0 {
            if channels
                .get(&channel.key)
                .is_some_and(|current| Arc::ptr_eq(current, channel))
            {
                channels.remove(&channel.key);
            }
            channel.shutdown.send_replace(true);
        }
    }

    /// Drops an exhausted channel from the map so the next subscribe
    /// starts fresh, releasing every handle still attached to it.
    fn retire(&self, channel: &Arc<Channel>) {
        let mut channels = self.channels.lock();
        if channels
            .get(&channel.key)
            .is_some_and(|current| Arc::ptr_eq(current, channel))
        {
            channels.remove(&channel.key);
        }
        drop(channels);
        let released = channel.release_listeners();
        debug!(channel = %channel.key, released, "exhausted channel retired");
        channel.set_state(ChannelState::Closed);
    }
}

/// Opens, shares and tears down live change channels.
///
/// Cheap to clone; clones share channels. Safe to call from many tasks at
/// once.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vigil_runtime::realtime::{SubscriptionDescriptor, SubscriptionManager};
/// use vigil_runtime::testing::MemoryChangeFeed;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let feed = Arc::new(MemoryChangeFeed::new());
/// let manager = SubscriptionManager::new(feed.clone());
///
/// let a = manager.subscribe(SubscriptionDescriptor::new("alerts"), |_| Ok(()));
/// let b = manager.subscribe(SubscriptionDescriptor::new("alerts"), |_| Ok(()));
/// a.wait_subscribed().await.expect("subscribed");
///
/// assert_eq!(manager.channel_count(), 1);
/// assert_eq!(feed.open_count(), 1);
/// drop((a, b));
/// assert_eq!(manager.channel_count(), 0);
/// # }
/// ```
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("backoff", &self.inner.backoff)
            .field("open_timeout", &self.inner.open_timeout)
            .field("channels", &self.channel_count())
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Creates a manager with default realtime settings.
    #[must_use]
    pub fn new(feed: Arc<dyn ChangeFeed>) -> Self {
        Self::from_config(feed, &RealtimeConfig::default())
    }

    /// Creates a manager from the `[realtime]` config section.
    #[must_use]
    pub fn from_config(feed: Arc<dyn ChangeFeed>, config: &RealtimeConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                feed,
                backoff: config.backoff(),
                open_timeout: config.open_timeout(),
                buffer: config.event_buffer.max(1),
                channels: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers `handler` for events matching `descriptor`.
    ///
    /// Attaches to the live channel for the descriptor's key if there is
    /// one; otherwise opens a new channel in the background.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe<F>(&self, descriptor: SubscriptionDescriptor, handler: F) -> SubscriptionHandle
    where
        F: Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.attach(descriptor, None, Arc::new(handler))
    }

    /// Like [`subscribe`](Self::subscribe), tagged with the session that
    /// owns the subscription so [`release_owner`](Self::release_owner) can
    /// find it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe_for<F>(
        &self,
        owner: SessionId,
        descriptor: SubscriptionDescriptor,
        handler: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.attach(descriptor, Some(owner), Arc::new(handler))
    }

    fn attach(
        &self,
        descriptor: SubscriptionDescriptor,
        owner: Option<SessionId>,
        handler: ChangeHandler,
    ) -> SubscriptionHandle {
        let key = descriptor.key();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let released = Arc::new(AtomicBool::new(false));
        let listener = Listener {
            id,
            owner,
            kinds: descriptor.kinds().into(),
            handler,
            released: Arc::clone(&released),
        };

        let mut channels = self.inner.channels.lock();
        let channel = match channels.get(&key) {
            Some(existing) => {
                let mut listeners = existing.listeners.lock();
                listeners.push(listener);
                debug!(
                    channel = %key,
                    subscription = %id,
                    refs = listeners.len(),
                    "attached to live channel"
                );
                Arc::clone(existing)
            }
            None => {
                let channel = Arc::new(Channel::new(
                    key.clone(),
                    descriptor.resource(),
                    descriptor.predicate_filter(),
                ));
                channel.listeners.lock().push(listener);
                channels.insert(key.clone(), Arc::clone(&channel));
                self.spawn_driver(&channel);
                debug!(channel = %key, subscription = %id, "channel created");
                channel
            }
        };
        drop(channels);

        SubscriptionHandle {
            id,
            owner,
            manager: Arc::downgrade(&self.inner),
            channel,
            released,
        }
    }

    fn spawn_driver(&self, channel: &Arc<Channel>) {
        let driver = Driver {
            channel: Arc::clone(channel),
            manager: Arc::downgrade(&self.inner),
            feed: Arc::clone(&self.inner.feed),
            backoff: self.inner.backoff,
            open_timeout: self.inner.open_timeout,
            buffer: self.inner.buffer,
        };
        let shutdown = channel.shutdown.subscribe();
        tokio::spawn(driver.run(shutdown));
    }

    /// Releases every subscription tagged with `owner`. Returns how many
    /// were released.
    pub fn release_owner(&self, owner: SessionId) -> usize {
        let channels: Vec<Arc<Channel>> = self.inner.channels.lock().values().cloned().collect();
        let mut released = 0;
        for channel in channels {
            let mut ids = Vec::new();
            for listener in channel.listeners.lock().iter() {
                if listener.owner == Some(owner)
                    && !listener.released.swap(true, Ordering::AcqRel)
                {
                    ids.push(listener.id);
                }
            }
            for id in ids {
                self.inner.detach(&channel, id);
                released += 1;
            }
        }
        if released > 0 {
            info!(session = %owner, released, "released session subscriptions");
        }
        released
    }

    /// Releases every subscription and closes every channel.
    pub fn close_all(&self) -> usize {
        let channels: Vec<Arc<Channel>> =
            self.inner.channels.lock().drain().map(|(_, c)| c).collect();
        let count = channels.len();
        for channel in channels {
            channel.release_listeners();
            channel.shutdown.send_replace(true);
        }
        if count > 0 {
            info!(channels = count, "closed all channels");
        }
        count
    }

    /// Number of live channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().len()
    }

    /// Number of handles attached to the live channel for `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &ChannelKey) -> usize {
        self.inner
            .channels
            .lock()
            .get(key)
            .map_or(0, |c| c.listeners.lock().len())
    }

    /// State of the live channel for `key`, if any.
    #[must_use]
    pub fn channel_state(&self, key: &ChannelKey) -> Option<ChannelState> {
        self.inner.channels.lock().get(key).map(|c| c.state())
    }

    /// Whether any live channel is failing.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        let mut affected: Vec<ChannelKey> = self
            .inner
            .channels
            .lock()
            .values()
            .filter(|c| c.state().is_degraded())
            .map(|c| c.key.clone())
            .collect();
        if affected.is_empty() {
            Connectivity::Healthy
        } else {
            affected.sort();
            Connectivity::Degraded { affected }
        }
    }
}

/// One consumer's registration on a shared channel.
///
/// Dropping the handle releases it. [`unsubscribe`](Self::unsubscribe) does
/// the same explicitly and may be called any number of times.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    owner: Option<SessionId>,
    manager: Weak<ManagerInner>,
    channel: Arc<Channel>,
    released: Arc<AtomicBool>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("channel", &self.channel.key)
            .field("owner", &self.owner)
            .field("released", &self.is_released())
            .finish()
    }
}

impl SubscriptionHandle {
    /// Registration id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Key of the shared channel.
    #[must_use]
    pub fn key(&self) -> &ChannelKey {
        &self.channel.key
    }

    /// Owning session, if tagged.
    #[must_use]
    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }

    /// Current state of the shared channel.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Receiver that observes channel state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.channel.state.subscribe()
    }

    /// Whether this handle has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Releases the handle. Idempotent.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.manager.upgrade() {
            Some(manager) => manager.detach(&self.channel, self.id),
            None => {
                if self.channel.remove_listener(self.id) == Some(0) {
                    self.channel.shutdown.send_replace(true);
                }
            }
        }
    }

    /// Waits until the channel is `Subscribed`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Closed`] if the handle is released or the channel
    /// closes first.
    pub async fn wait_subscribed(&self) -> Result<(), ChannelError> {
        if self.is_released() {
            return Err(ChannelError::Closed);
        }
        let mut state = self.channel.state.subscribe();
        let subscribed = state
            .wait_for(|s| matches!(s, ChannelState::Subscribed | ChannelState::Closed))
            .await
            .is_ok_and(|current| *current == ChannelState::Subscribed);
        if subscribed {
            Ok(())
        } else {
            Err(ChannelError::Closed)
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Background task owning one channel's backend feed.
struct Driver {
    channel: Arc<Channel>,
    manager: Weak<ManagerInner>,
    feed: Arc<dyn ChangeFeed>,
    backoff: Backoff,
    open_timeout: Duration,
    buffer: usize,
}

impl Driver {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let key = self.channel.key.clone();
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }
            if failures == 0 {
                self.channel.set_state(ChannelState::Connecting);
            }

            let (tx, mut rx) = mpsc::channel(self.buffer);
            let open = self
                .feed
                .open(&self.channel.resource, &self.channel.predicate, tx);
            let opened = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                result = tokio::time::timeout(self.open_timeout, open) => result,
            };

            let failure = match opened {
                Err(_) => ChannelError::OpenTimeout(self.open_timeout),
                Ok(Err(err)) => err,
                Ok(Ok(handle)) => {
                    failures = 0;
                    self.channel.set_state(ChannelState::Subscribed);
                    debug!(channel = %key, feed = %handle, "feed open");
                    let ended = self.pump(&mut rx, &mut shutdown).await;
                    self.feed.close(handle).await;
                    match ended {
                        Some(err) => err,
                        None => break,
                    }
                }
            };

            failures = failures.saturating_add(1);
            self.channel.set_state(ChannelState::Error);
            warn!(
                channel = %key,
                code = failure.code(),
                error = %failure,
                attempt = failures,
                "channel failed"
            );

            if !self.backoff.allows(failures) {
                warn!(
                    channel = %key,
                    attempts = failures,
                    "reconnect attempts exhausted, closing channel"
                );
                match self.manager.upgrade() {
                    Some(manager) => manager.retire(&self.channel),
                    None => {
                        self.channel.release_listeners();
                        self.channel.set_state(ChannelState::Closed);
                    }
                }
                return;
            }

            let delay = self.backoff.delay(failures - 1);
            self.channel.set_state(ChannelState::Reconnecting);
            debug!(
                channel = %key,
                attempt = failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting after backoff"
            );
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.channel.set_state(ChannelState::Closed);
        debug!(channel = %key, "channel driver stopped");
    }

    /// Delivers messages until shutdown (`None`) or a feed failure.
    async fn pump(
        &self,
        rx: &mut mpsc::Receiver<FeedMessage>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<ChannelError> {
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.changed() => return None,
                message = rx.recv() => message,
            };
            match message {
                Some(FeedMessage::Change { kind, payload }) => self.channel.dispatch(kind, payload),
                Some(FeedMessage::Error(reason)) => return Some(ChannelError::Transport(reason)),
                None => return Some(ChannelError::StreamEnded),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryChangeFeed;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
    use vigil_auth::{GeographicScope, MemoryHierarchy, ScopeResolver};
    use vigil_types::{NodeId, Tier};

    fn config(max_attempts: u32) -> RealtimeConfig {
        RealtimeConfig {
            open_timeout_ms: 1_000,
            backoff_base_ms: 500,
            backoff_max_ms: 4_000,
            max_reconnect_attempts: max_attempts,
            event_buffer: 16,
        }
    }

    fn setup(max_attempts: u32) -> (Arc<MemoryChangeFeed>, SubscriptionManager) {
        let feed = Arc::new(MemoryChangeFeed::new());
        let manager = SubscriptionManager::from_config(feed.clone(), &config(max_attempts));
        (feed, manager)
    }

    fn mandal_alerts(mandal: &str) -> SubscriptionDescriptor {
        let predicate = ScopeResolver::new(Arc::new(MemoryHierarchy::new()))
            .build_filter(
                &GeographicScope::confined(Tier::Mandal, NodeId::new(mandal)),
                Filter::new(),
            )
            .expect("scoped");
        SubscriptionDescriptor::scoped("alerts", predicate)
    }

    fn collector() -> (
        impl Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
        UnboundedReceiver<ChangeEvent>,
    ) {
        let (tx, rx) = unbounded_channel();
        let handler = move |event: &ChangeEvent| -> HandlerResult {
            tx.send(event.clone())?;
            Ok(())
        };
        (handler, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<ChangeEvent>) -> ChangeEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within timeout")
            .expect("handler alive")
    }

    #[tokio::test]
    async fn identical_descriptors_share_one_channel() {
        let (feed, manager) = setup(0);
        let (h1, mut rx1) = collector();
        let (h2, mut rx2) = collector();

        let a = manager.subscribe(mandal_alerts("M1"), h1);
        let b = manager.subscribe(mandal_alerts("M1"), h2);
        a.wait_subscribed().await.expect("subscribed");

        assert_eq!(a.key(), b.key());
        assert_eq!(manager.channel_count(), 1);
        assert_eq!(manager.subscriber_count(a.key()), 2);
        assert_eq!(feed.open_count(), 1);

        feed.push("alerts", ChangeKind::Insert, json!({"mandalId": "M1", "id": 1}));
        assert_eq!(next(&mut rx1).await.field("id"), Some(&json!(1)));
        assert_eq!(next(&mut rx2).await.field("id"), Some(&json!(1)));
        assert_eq!(feed.open_count(), 1);
    }

    #[tokio::test]
    async fn different_predicates_open_separate_channels() {
        let (feed, manager) = setup(0);
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        let b = manager.subscribe(mandal_alerts("M2"), |_| Ok(()));
        a.wait_subscribed().await.expect("a");
        b.wait_subscribed().await.expect("b");

        assert_eq!(manager.channel_count(), 2);
        assert_eq!(feed.open_count(), 2);
    }

    #[tokio::test]
    async fn channel_survives_until_last_handle() {
        let (feed, manager) = setup(0);
        let (h, mut rx) = collector();
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        let b = manager.subscribe(mandal_alerts("M1"), h);
        b.wait_subscribed().await.expect("subscribed");

        a.unsubscribe();
        assert_eq!(manager.channel_count(), 1);
        assert_eq!(b.state(), ChannelState::Subscribed);

        feed.push("alerts", ChangeKind::Update, json!({"mandalId": "M1", "id": 2}));
        assert_eq!(next(&mut rx).await.kind, ChangeKind::Update);
        assert_eq!(feed.close_count(), 0);

        drop(b);
        assert_eq!(manager.channel_count(), 0);
        feed.wait_closes(1).await;
        assert_eq!(feed.live_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (feed, manager) = setup(0);
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        a.wait_subscribed().await.expect("subscribed");

        a.unsubscribe();
        a.unsubscribe();
        assert!(a.is_released());
        drop(a);

        feed.wait_closes(1).await;
        assert_eq!(feed.close_count(), 1);
        assert_eq!(manager.channel_count(), 0);
    }

    #[tokio::test]
    async fn released_handle_cannot_wait() {
        let (_feed, manager) = setup(0);
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        a.unsubscribe();
        assert_eq!(a.wait_subscribed().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn resubscribe_after_release_opens_fresh_channel() {
        let (feed, manager) = setup(0);
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        a.wait_subscribed().await.expect("first");
        drop(a);

        let b = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        b.wait_subscribed().await.expect("second");
        assert_eq!(feed.open_count(), 2);
        assert_eq!(manager.channel_count(), 1);
    }

    #[tokio::test]
    async fn events_outside_predicate_are_dropped() {
        let (feed, manager) = setup(0);
        let (h, mut rx) = collector();
        let a = manager.subscribe(mandal_alerts("M1"), h);
        a.wait_subscribed().await.expect("subscribed");

        feed.push("alerts", ChangeKind::Insert, json!({"mandalId": "M2", "id": "leak"}));
        feed.push("alerts", ChangeKind::Insert, json!({"id": "unscoped"}));
        feed.push("alerts", ChangeKind::Insert, json!({"mandalId": "M1", "id": "ok"}));

        assert_eq!(next(&mut rx).await.field("id"), Some(&json!("ok")));
    }

    #[tokio::test]
    async fn handler_failures_do_not_stop_delivery() {
        let (feed, manager) = setup(0);
        let order = Arc::new(StdMutex::new(Vec::new()));

        let o = order.clone();
        let first = manager.subscribe(SubscriptionDescriptor::new("alerts"), move |_| {
            o.lock().expect("lock").push("first");
            Err("boom".into())
        });
        let o = order.clone();
        let second = manager.subscribe(SubscriptionDescriptor::new("alerts"), move |_| {
            o.lock().expect("lock").push("second");
            panic!("handler bug");
        });
        let o = order.clone();
        let (h, mut rx) = collector();
        let third = manager.subscribe(SubscriptionDescriptor::new("alerts"), move |event| {
            o.lock().expect("lock").push("third");
            h(event)
        });
        third.wait_subscribed().await.expect("subscribed");

        feed.push("alerts", ChangeKind::Insert, json!({"id": 1}));
        next(&mut rx).await;
        assert_eq!(*order.lock().expect("lock"), vec!["first", "second", "third"]);

        feed.push("alerts", ChangeKind::Insert, json!({"id": 2}));
        next(&mut rx).await;
        assert_eq!(order.lock().expect("lock").len(), 6);
        drop((first, second));
    }

    #[tokio::test]
    async fn per_handler_kind_filtering() {
        let (feed, manager) = setup(0);
        let (inserts, mut insert_rx) = collector();
        let (all, mut all_rx) = collector();
        let a = manager.subscribe(
            SubscriptionDescriptor::new("alerts").with_kinds([ChangeKind::Insert]),
            inserts,
        );
        let b = manager.subscribe(SubscriptionDescriptor::new("alerts"), all);
        b.wait_subscribed().await.expect("subscribed");
        assert_eq!(manager.channel_count(), 1);

        feed.push("alerts", ChangeKind::Update, json!({"id": 1}));
        feed.push("alerts", ChangeKind::Insert, json!({"id": 2}));

        assert_eq!(next(&mut all_rx).await.kind, ChangeKind::Update);
        assert_eq!(next(&mut all_rx).await.kind, ChangeKind::Insert);
        let only = next(&mut insert_rx).await;
        assert_eq!(only.kind, ChangeKind::Insert);
        assert_eq!(only.field("id"), Some(&json!(2)));
        drop(a);
    }

    #[tokio::test]
    async fn release_owner_drops_only_that_session() {
        let (_feed, manager) = setup(0);
        let mine = SessionId::new();
        let theirs = SessionId::new();

        let a = manager.subscribe_for(mine, mandal_alerts("M1"), |_| Ok(()));
        let b = manager.subscribe_for(mine, SubscriptionDescriptor::new("attempts"), |_| Ok(()));
        let c = manager.subscribe_for(theirs, mandal_alerts("M1"), |_| Ok(()));

        assert_eq!(manager.release_owner(mine), 2);
        assert!(a.is_released());
        assert!(b.is_released());
        assert!(!c.is_released());
        assert_eq!(manager.channel_count(), 1);
        assert_eq!(manager.subscriber_count(c.key()), 1);

        a.unsubscribe();
        assert_eq!(manager.release_owner(mine), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_reconnects() {
        let (feed, manager) = setup(0);
        let (h, mut rx) = collector();
        let a = manager.subscribe(SubscriptionDescriptor::new("alerts"), h);
        a.wait_subscribed().await.expect("subscribed");

        let mut state = a.watch_state();
        feed.inject_error("alerts", "connection reset");
        state
            .wait_for(|s| *s == ChannelState::Reconnecting)
            .await
            .expect("reconnecting");
        assert!(!manager.connectivity().is_healthy());

        feed.wait_opens(2).await;
        a.wait_subscribed().await.expect("resubscribed");
        assert!(manager.connectivity().is_healthy());
        assert_eq!(feed.close_count(), 1);

        feed.push("alerts", ChangeKind::Insert, json!({"id": "after"}));
        assert_eq!(next(&mut rx).await.field("id"), Some(&json!("after")));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_end_reconnects() {
        let (feed, manager) = setup(0);
        let a = manager.subscribe(SubscriptionDescriptor::new("alerts"), |_| Ok(()));
        a.wait_subscribed().await.expect("subscribed");

        feed.drop_streams("alerts");
        feed.wait_opens(2).await;
        a.wait_subscribed().await.expect("resubscribed");
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_while_reconnecting() {
        let (feed, manager) = setup(0);
        feed.fail_next_opens(1);
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));

        let mut state = a.watch_state();
        state
            .wait_for(|s| *s == ChannelState::Reconnecting)
            .await
            .expect("reconnecting");
        assert_eq!(
            manager.connectivity(),
            Connectivity::Degraded {
                affected: vec![a.key().clone()]
            }
        );

        a.wait_subscribed().await.expect("recovered");
        assert_eq!(manager.connectivity(), Connectivity::Healthy);
        assert_eq!(feed.open_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnects_close_channel() {
        let (feed, manager) = setup(2);
        feed.fail_next_opens(100);
        let a = manager.subscribe(SubscriptionDescriptor::new("alerts"), |_| Ok(()));

        assert_eq!(a.wait_subscribed().await, Err(ChannelError::Closed));
        assert_eq!(a.state(), ChannelState::Closed);
        assert_eq!(feed.open_attempts(), 3);
        assert_eq!(manager.channel_count(), 0);
        assert!(a.is_released());

        a.unsubscribe();
        assert!(a.is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_channel_releases_session_handles() {
        let (feed, manager) = setup(1);
        feed.fail_next_opens(100);
        let owner = SessionId::new();
        let a = manager.subscribe_for(owner, SubscriptionDescriptor::new("alerts"), |_| Ok(()));
        let b = manager.subscribe_for(owner, SubscriptionDescriptor::new("alerts"), |_| Ok(()));

        assert_eq!(a.wait_subscribed().await, Err(ChannelError::Closed));
        assert!(a.is_released());
        assert!(b.is_released());
        assert_eq!(manager.subscriber_count(a.key()), 0);

        // Nothing is left for logout to find, and nothing is double-released.
        assert_eq!(manager.release_owner(owner), 0);
        drop((a, b));
        assert_eq!(manager.channel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_open_times_out() {
        let (feed, manager) = setup(1);
        feed.stall_opens(true);
        let a = manager.subscribe(SubscriptionDescriptor::new("alerts"), |_| Ok(()));

        assert_eq!(a.wait_subscribed().await, Err(ChannelError::Closed));
        assert_eq!(feed.open_attempts(), 2);
        assert_eq!(feed.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn release_during_backoff_stops_retrying() {
        let (feed, manager) = setup(0);
        feed.fail_next_opens(100);
        let a = manager.subscribe(SubscriptionDescriptor::new("alerts"), |_| Ok(()));
        let mut state = a.watch_state();
        state
            .wait_for(|s| *s == ChannelState::Reconnecting)
            .await
            .expect("reconnecting");

        drop(a);
        state
            .wait_for(|s| *s == ChannelState::Closed)
            .await
            .expect("closed");
        assert_eq!(feed.open_attempts(), 1);
    }

    #[tokio::test]
    async fn close_all_releases_everything() {
        let (feed, manager) = setup(0);
        let a = manager.subscribe(mandal_alerts("M1"), |_| Ok(()));
        let b = manager.subscribe(SubscriptionDescriptor::new("attempts"), |_| Ok(()));
        a.wait_subscribed().await.expect("a");
        b.wait_subscribed().await.expect("b");

        assert_eq!(manager.close_all(), 2);
        assert!(a.is_released());
        assert!(b.is_released());
        feed.wait_closes(2).await;
    }

    #[test]
    fn degraded_states() {
        assert!(ChannelState::Error.is_degraded());
        assert!(ChannelState::Reconnecting.is_degraded());
        assert!(!ChannelState::Subscribed.is_degraded());
        assert!(!ChannelState::Closed.is_degraded());
        assert_eq!(ChannelState::Reconnecting.to_string(), "reconnecting");
    }
}
