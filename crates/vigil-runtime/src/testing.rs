//! In-memory backends for tests and examples.
//!
//! | Double | Stands in for |
//! |--------|---------------|
//! | [`MemoryChangeFeed`] | [`ChangeFeed`] |
//! | [`StaticAuthenticator`] | [`Authenticator`] |
//! | [`StaticDirectory`] | [`IdentityDirectory`] |
//! | [`MemoryAuditSink`] | [`AuditSink`] |

use crate::audit::{AuditError, AuditSink};
use crate::realtime::{ChangeFeed, ChannelError, FeedHandle, FeedMessage};
use crate::session::{
    Assignment, AuthError, Authenticator, Credentials, DirectoryError, IdentityDirectory,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc, watch};
use vigil_auth::Filter;
use vigil_event::{AuditAction, AuditRecord, ChangeKind};
use vigil_types::{Identity, IdentityId, NodeId, Role};

struct OpenFeed {
    resource: String,
    predicate: Filter,
    events: mpsc::Sender<FeedMessage>,
}

/// A change feed held in memory.
///
/// [`push`](Self::push) delivers to every open feed on the resource
/// regardless of its predicate, like a backend that filters loosely.
pub struct MemoryChangeFeed {
    feeds: Mutex<BTreeMap<u64, OpenFeed>>,
    next_handle: AtomicU64,
    failing: AtomicU32,
    stalled: AtomicBool,
    attempts: watch::Sender<usize>,
    opens: watch::Sender<usize>,
    closes: watch::Sender<usize>,
}

impl Default for MemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChangeFeed {
    /// Creates a feed with nothing open.
    #[must_use]
    pub fn new() -> Self {
        Self {
            feeds: Mutex::new(BTreeMap::new()),
            next_handle: AtomicU64::new(1),
            failing: AtomicU32::new(0),
            stalled: AtomicBool::new(false),
            attempts: watch::channel(0).0,
            opens: watch::channel(0).0,
            closes: watch::channel(0).0,
        }
    }

    /// Sends a change to every open feed on `resource`. Returns how many
    /// feeds accepted it.
    pub fn push(&self, resource: &str, kind: ChangeKind, payload: Value) -> usize {
        self.send(resource, || FeedMessage::Change {
            kind,
            payload: payload.clone(),
        })
    }

    /// Reports a transport error on every open feed on `resource`.
    pub fn inject_error(&self, resource: &str, reason: &str) -> usize {
        self.send(resource, || FeedMessage::Error(reason.to_owned()))
    }

    fn send(&self, resource: &str, message: impl Fn() -> FeedMessage) -> usize {
        self.feeds
            .lock()
            .values()
            .filter(|f| f.resource == resource)
            .filter(|f| f.events.try_send(message()).is_ok())
            .count()
    }

    /// Ends the streams of every open feed on `resource` without an error.
    pub fn drop_streams(&self, resource: &str) -> usize {
        let mut feeds = self.feeds.lock();
        let before = feeds.len();
        feeds.retain(|_, f| f.resource != resource);
        before - feeds.len()
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.failing.store(count, Ordering::SeqCst);
    }

    /// Makes opens hang until dropped.
    pub fn stall_opens(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Predicates of the open feeds on `resource`.
    #[must_use]
    pub fn predicates(&self, resource: &str) -> Vec<Filter> {
        self.feeds
            .lock()
            .values()
            .filter(|f| f.resource == resource)
            .map(|f| f.predicate.clone())
            .collect()
    }

    /// Every call to `open`, including failed and stalled ones.
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        *self.attempts.borrow()
    }

    /// Successful opens.
    #[must_use]
    pub fn open_count(&self) -> usize {
        *self.opens.borrow()
    }

    /// Calls to `close`.
    #[must_use]
    pub fn close_count(&self) -> usize {
        *self.closes.borrow()
    }

    /// Feeds currently open.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.feeds.lock().len()
    }

    /// Waits until at least `count` opens have succeeded.
    pub async fn wait_opens(&self, count: usize) {
        let mut rx = self.opens.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }

    /// Waits until `close` has been called at least `count` times.
    pub async fn wait_closes(&self, count: usize) {
        let mut rx = self.closes.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn open(
        &self,
        resource: &str,
        predicate: &Filter,
        events: mpsc::Sender<FeedMessage>,
    ) -> Result<FeedHandle, ChannelError> {
        self.attempts.send_modify(|n| *n += 1);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self
            .failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChannelError::OpenFailed("injected failure".into()));
        }

        let handle = FeedHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.feeds.lock().insert(
            handle.0,
            OpenFeed {
                resource: resource.to_owned(),
                predicate: predicate.clone(),
                events,
            },
        );
        self.opens.send_modify(|n| *n += 1);
        Ok(handle)
    }

    async fn close(&self, handle: FeedHandle) {
        self.feeds.lock().remove(&handle.0);
        self.closes.send_modify(|n| *n += 1);
    }
}

/// Credential table authenticator.
///
/// Identities are `IdentityId::named(login)`.
pub struct StaticAuthenticator {
    users: HashMap<String, String>,
    expirations: broadcast::Sender<IdentityId>,
    held: watch::Sender<bool>,
    invalidated: Mutex<Vec<IdentityId>>,
}

impl Default for StaticAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticAuthenticator {
    /// Creates an authenticator with no users.
    #[must_use]
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            expirations: broadcast::channel(16).0,
            held: watch::channel(false).0,
            invalidated: Mutex::new(Vec::new()),
        }
    }

    /// Adds a user.
    #[must_use]
    pub fn with_user(mut self, login: &str, secret: &str) -> Self {
        self.users.insert(login.to_owned(), secret.to_owned());
        self
    }

    /// Pushes an expiry notification for `identity`.
    pub fn expire(&self, identity: IdentityId) {
        let _ = self.expirations.send(identity);
    }

    /// Makes `authenticate` wait until [`release_logins`](Self::release_logins).
    pub fn hold_logins(&self) {
        self.held.send_replace(true);
    }

    /// Lets held and future logins proceed.
    pub fn release_logins(&self) {
        self.held.send_replace(false);
    }

    /// Identities passed to `invalidate`, in call order.
    #[must_use]
    pub fn invalidated(&self) -> Vec<IdentityId> {
        self.invalidated.lock().clone()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|h| !*h).await;

        match self.users.get(credentials.login()) {
            Some(secret) if secret == credentials.secret() => Ok(Identity::new(
                IdentityId::named(credentials.login()),
                credentials.login(),
            )),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn invalidate(&self, identity: &Identity) -> Result<(), AuthError> {
        self.invalidated.lock().push(identity.id);
        Ok(())
    }

    fn expirations(&self) -> broadcast::Receiver<IdentityId> {
        self.expirations.subscribe()
    }
}

/// Login → assignment table.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    assignments: HashMap<String, Assignment>,
    unavailable: AtomicBool,
}

impl StaticDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `role` at `node` to `login`.
    #[must_use]
    pub fn with(mut self, login: &str, role: Role, node: Option<&str>) -> Self {
        self.assignments
            .insert(login.to_owned(), Assignment::new(role, node.map(NodeId::new)));
        self
    }

    /// Makes every lookup fail as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn lookup(&self, identity: &Identity) -> Result<Assignment, DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable("directory offline".into()));
        }
        self.assignments
            .get(&identity.login)
            .cloned()
            .ok_or(DirectoryError::NotFound(identity.id))
    }
}

/// Audit sink that keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: AtomicBool,
    stalled: AtomicBool,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every append fail.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every append hang without completing.
    pub fn stall_writes(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Records written so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Actions of the records written so far.
    #[must_use]
    pub fn actions(&self) -> Vec<AuditAction> {
        self.records.lock().iter().map(|r| r.action.clone()).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("injected failure".into()));
        }
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn feed_counts_and_pushes() {
        let feed = MemoryChangeFeed::new();
        let (tx, mut rx) = mpsc::channel(4);
        let handle = feed
            .open("alerts", &Filter::new(), tx)
            .await
            .expect("open");

        assert_eq!(feed.open_count(), 1);
        assert_eq!(feed.push("alerts", ChangeKind::Insert, json!({"id": 1})), 1);
        assert_eq!(feed.push("attempts", ChangeKind::Insert, json!({"id": 2})), 0);
        assert_eq!(
            rx.recv().await,
            Some(FeedMessage::Change {
                kind: ChangeKind::Insert,
                payload: json!({"id": 1})
            })
        );

        feed.close(handle).await;
        assert_eq!(feed.close_count(), 1);
        assert_eq!(feed.live_count(), 0);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn feed_fails_requested_opens() {
        let feed = MemoryChangeFeed::new();
        feed.fail_next_opens(1);
        let (tx, _rx) = mpsc::channel(1);
        assert!(feed.open("alerts", &Filter::new(), tx.clone()).await.is_err());
        assert!(feed.open("alerts", &Filter::new(), tx).await.is_ok());
        assert_eq!(feed.open_attempts(), 2);
        assert_eq!(feed.open_count(), 1);
    }

    #[tokio::test]
    async fn directory_lookup() {
        let dir = StaticDirectory::new().with("d1", Role::DistrictInCharge, Some("D1"));
        let found = dir
            .lookup(&Identity::new(IdentityId::named("d1"), "d1"))
            .await
            .expect("found");
        assert_eq!(found.node, Some(NodeId::new("D1")));

        dir.set_unavailable(true);
        assert!(matches!(
            dir.lookup(&Identity::new(IdentityId::named("d1"), "d1")).await,
            Err(DirectoryError::Unavailable(_))
        ));
    }
}
