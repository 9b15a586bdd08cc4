//! The single-writer session store.

use super::backend::{Authenticator, Credentials, IdentityDirectory};
use super::error::SessionError;
use crate::audit::AuditRecorder;
use crate::realtime::SubscriptionManager;
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_auth::{AccessDenied, ScopeResolver, Session};
use vigil_event::{AuditAction, AuditEntry};
use vigil_types::{ErrorCode, Identity, IdentityId, SessionId};

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session.
    Unauthenticated,
    /// A login is in flight.
    Authenticating,
    /// A session is active.
    Authenticated(Arc<Session>),
}

impl SessionStatus {
    /// The active session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Arc<Session>> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// `true` when a session is active.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated(_) => "authenticated",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct StoreInner {
    authenticator: Arc<dyn Authenticator>,
    directory: Arc<dyn IdentityDirectory>,
    resolver: ScopeResolver,
    audit: AuditRecorder,
    subscriptions: SubscriptionManager,
    /// Held for the whole of every transition.
    transition: Mutex<()>,
    status: watch::Sender<SessionStatus>,
}

/// Resets an in-flight login to `Unauthenticated` if the login future is
/// dropped before it settles.
struct LoginRollback<'a> {
    status: &'a watch::Sender<SessionStatus>,
    armed: bool,
}

impl<'a> LoginRollback<'a> {
    fn arm(status: &'a watch::Sender<SessionStatus>) -> Self {
        Self {
            status,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoginRollback<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.status.send_replace(SessionStatus::Unauthenticated);
            warn!("login cancelled while authenticating");
        }
    }
}

/// Owns the current [`Session`].
///
/// Every transition (login, logout, expiry) runs under one lock, so they
/// never interleave. Login and logout refuse with [`SessionError::Busy`]
/// instead of waiting; backend expiry waits its turn. Readers get
/// immutable `Arc<Session>` snapshots.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Creates an unauthenticated store.
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        directory: Arc<dyn IdentityDirectory>,
        resolver: ScopeResolver,
        audit: AuditRecorder,
        subscriptions: SubscriptionManager,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Unauthenticated);
        Self {
            inner: Arc::new(StoreInner {
                authenticator,
                directory,
                resolver,
                audit,
                subscriptions,
                transition: Mutex::new(()),
                status,
            }),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// The active session, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.status.borrow().session().cloned()
    }

    /// The active session, or [`AccessDenied::NotAuthenticated`].
    ///
    /// # Errors
    ///
    /// [`AccessDenied::NotAuthenticated`] when no session is active.
    pub fn require_session(&self) -> Result<Arc<Session>, AccessDenied> {
        self.current().ok_or(AccessDenied::NotAuthenticated)
    }

    /// Receiver that observes every transition.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// Scope resolver sessions are materialized with.
    #[must_use]
    pub fn resolver(&self) -> &ScopeResolver {
        &self.inner.resolver
    }

    /// Subscription manager torn down on logout and expiry.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    /// Audit recorder used for session events.
    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        &self.inner.audit
    }

    fn set_status(&self, next: SessionStatus) {
        let to = next.as_str();
        let prev = self.inner.status.send_replace(next);
        debug!(from = %prev, to, "session status");
    }

    /// Authenticates and materializes a session.
    ///
    /// `Unauthenticated → Authenticating → Authenticated`, or back to
    /// `Unauthenticated` on failure or if the returned future is dropped
    /// mid-flight. Records `LOGIN` or `LOGIN_FAILED` after the transition
    /// lock is released.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Busy`] if another transition is in flight
    /// - [`SessionError::AlreadyAuthenticated`] if a session is active
    /// - [`SessionError::Auth`], [`SessionError::Directory`] or
    ///   [`SessionError::Scope`] if the session could not be established
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>, SessionError> {
        let Ok(guard) = self.inner.transition.try_lock() else {
            warn!(login = credentials.login(), "login rejected, transition in progress");
            return Err(SessionError::Busy);
        };
        if self.inner.status.borrow().is_authenticated() {
            return Err(SessionError::AlreadyAuthenticated);
        }

        let rollback = LoginRollback::arm(&self.inner.status);
        self.set_status(SessionStatus::Authenticating);
        debug!(login = credentials.login(), "authenticating");

        let established = self.establish(credentials).await;
        rollback.disarm();
        match established {
            Ok(session) => {
                self.set_status(SessionStatus::Authenticated(Arc::clone(&session)));
                drop(guard);
                info!(
                    session = %session.id(),
                    login = %session.identity().login,
                    role = %session.role(),
                    scope = %session.scope(),
                    "session established"
                );

                self.inner
                    .audit
                    .record(
                        AuditEntry::new(AuditAction::LOGIN, "session")
                            .actor(session.identity().id)
                            .entity_id(session.id().to_string())
                            .evidence(json!({
                                "role": session.role(),
                                "scope": session.scope(),
                                "capabilities": session.capabilities().names(),
                            })),
                    )
                    .await;
                Ok(session)
            }
            Err((actor, err)) => {
                self.set_status(SessionStatus::Unauthenticated);
                drop(guard);
                Err(self.fail_login(credentials, actor, err).await)
            }
        }
    }

    /// Authenticates and materializes; on failure returns the identity the
    /// backend vouched for, if it got that far.
    async fn establish(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, (Option<IdentityId>, SessionError)> {
        let identity = self
            .inner
            .authenticator
            .authenticate(credentials)
            .await
            .map_err(|err| (None, err.into()))?;

        match self.materialize(identity.clone()).await {
            Ok(session) => Ok(session),
            Err(err) => {
                self.revoke(&identity).await;
                Err((Some(identity.id), err))
            }
        }
    }

    async fn materialize(&self, identity: Identity) -> Result<Arc<Session>, SessionError> {
        let assignment = self.inner.directory.lookup(&identity).await?;
        let scope = self
            .inner
            .resolver
            .resolve_scope(assignment.role, assignment.node.as_ref())?;
        Ok(Arc::new(Session::new(SessionId::new(), identity, assignment.role, scope)))
    }

    async fn fail_login(
        &self,
        credentials: &Credentials,
        actor: Option<IdentityId>,
        err: SessionError,
    ) -> SessionError {
        warn!(login = credentials.login(), code = err.code(), error = %err, "login failed");

        let mut entry = AuditEntry::new(AuditAction::LOGIN_FAILED, "session").evidence(json!({
            "reason": err.to_string(),
            "code": err.code(),
            "login": credentials.login(),
        }));
        if let Some(actor) = actor {
            entry = entry.actor(actor);
        }
        self.inner.audit.record(entry).await;
        err
    }

    async fn revoke(&self, identity: &Identity) {
        if let Err(err) = self.inner.authenticator.invalidate(identity).await {
            warn!(
                identity = %identity.id,
                code = err.code(),
                error = %err,
                "credential invalidation failed"
            );
        }
    }

    /// Ends the active session.
    ///
    /// Emits `LOGOUT` while the actor is still known, invalidates the
    /// backend credential, clears the session and releases its
    /// subscriptions. The audit write is awaited only after the transition
    /// lock is released.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Busy`] if another transition is in flight
    /// - [`SessionError::NotAuthenticated`] if no session is active
    pub async fn logout(&self) -> Result<(), SessionError> {
        let Ok(guard) = self.inner.transition.try_lock() else {
            warn!("logout rejected, transition in progress");
            return Err(SessionError::Busy);
        };
        let Some(session) = self.current() else {
            return Err(SessionError::NotAuthenticated);
        };

        let audited = self.inner.audit.record_detached(
            AuditEntry::new(AuditAction::LOGOUT, "session")
                .actor(session.identity().id)
                .entity_id(session.id().to_string()),
        );

        self.revoke(session.identity()).await;
        self.set_status(SessionStatus::Unauthenticated);
        let released = self.inner.subscriptions.release_owner(session.id());
        drop(guard);
        info!(session = %session.id(), released, "logged out");

        if let Err(err) = audited.await {
            warn!(session = %session.id(), error = %err, "logout audit task failed");
        }
        Ok(())
    }

    /// Ends the active session if it belongs to `identity`, as reported by
    /// the backend. Waits for any in-flight transition first.
    ///
    /// Returns whether a session was ended.
    pub async fn handle_expiry(&self, identity: IdentityId) -> bool {
        self.expire(Some(identity), "credential invalidated by backend").await
    }

    async fn expire(&self, identity: Option<IdentityId>, reason: &str) -> bool {
        let guard = self.inner.transition.lock().await;
        let Some(session) = self.current() else {
            return false;
        };
        if identity.is_some_and(|id| id != session.identity().id) {
            debug!(session = %session.id(), "expiry for another identity ignored");
            return false;
        }

        self.set_status(SessionStatus::Unauthenticated);
        let released = self.inner.subscriptions.release_owner(session.id());
        drop(guard);
        warn!(session = %session.id(), released, reason, "session expired");

        self.inner
            .audit
            .record(
                AuditEntry::new(AuditAction::SESSION_EXPIRED, "session")
                    .actor(session.identity().id)
                    .entity_id(session.id().to_string())
                    .evidence(json!({ "reason": reason })),
            )
            .await;
        true
    }

    /// Spawns a task applying the authenticator's expiry notifications.
    ///
    /// If notifications are lost to lag the active session is ended, since
    /// its own expiry may have been among them. The task stops when the
    /// store is dropped or the notification stream closes.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_expiry_watcher(&self) -> JoinHandle<()> {
        let mut expirations = self.inner.authenticator.expirations();
        let store: Weak<StoreInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let identity = match expirations.recv().await {
                    Ok(identity) => Some(identity),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "expiry notifications lagged");
                        None
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("expiry stream closed");
                        break;
                    }
                };
                let Some(inner) = store.upgrade() else {
                    break;
                };
                let store = SessionStore { inner };
                match identity {
                    Some(id) => {
                        store.handle_expiry(id).await;
                    }
                    None => {
                        store.expire(None, "expiry notifications lost").await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::SubscriptionDescriptor;
    use crate::testing::{MemoryAuditSink, MemoryChangeFeed, StaticAuthenticator, StaticDirectory};
    use std::time::Duration;
    use vigil_auth::{GeographicScope, MemoryHierarchy, ScopeError};
    use vigil_types::{NodeId, Role, Tier};

    struct Fixture {
        auth: Arc<StaticAuthenticator>,
        sink: Arc<MemoryAuditSink>,
        store: SessionStore,
    }

    fn fixture() -> Fixture {
        let auth = Arc::new(
            StaticAuthenticator::new()
                .with_user("centre.c7", "pw")
                .with_user("mandal.m1", "pw")
                .with_user("orphan", "pw")
                .with_user("unplaced", "pw"),
        );
        let directory = Arc::new(
            StaticDirectory::new()
                .with("centre.c7", Role::CentreInCharge, Some("C7"))
                .with("mandal.m1", Role::MandalInCharge, Some("M1"))
                .with("unplaced", Role::DistrictInCharge, None),
        );
        let hierarchy = Arc::new(
            MemoryHierarchy::new()
                .with_district("D1")
                .with_mandal("M1", "D1"),
        );
        let sink = Arc::new(MemoryAuditSink::new());
        let store = SessionStore::new(
            auth.clone(),
            directory,
            ScopeResolver::new(hierarchy),
            AuditRecorder::new(sink.clone(), "test"),
            SubscriptionManager::new(Arc::new(MemoryChangeFeed::new())),
        );
        Fixture { auth, sink, store }
    }

    #[tokio::test]
    async fn login_materializes_scoped_session() {
        let f = fixture();
        let session = f
            .store
            .login(&Credentials::new("mandal.m1", "pw"))
            .await
            .expect("login");

        assert_eq!(session.role(), Role::MandalInCharge);
        assert_eq!(
            session.scope(),
            &GeographicScope::confined(Tier::Mandal, NodeId::new("M1"))
        );
        assert!(session.capabilities().can_lock_evidence());
        assert_eq!(f.store.current().as_deref(), Some(&*session));
        assert!(f.store.status().is_authenticated());

        let records = f.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::LOGIN);
        assert_eq!(records[0].actor_id, Some(IdentityId::named("mandal.m1")));
        assert_eq!(records[0].entity_id.as_deref(), Some(session.id().to_string().as_str()));
    }

    #[tokio::test]
    async fn bad_password_is_audited_without_actor() {
        let f = fixture();
        let err = f
            .store
            .login(&Credentials::new("centre.c7", "wrong"))
            .await
            .expect_err("rejected");

        assert_eq!(err, SessionError::Auth(crate::session::AuthError::InvalidCredentials));
        assert_eq!(f.store.status(), SessionStatus::Unauthenticated);

        let records = f.sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::LOGIN_FAILED);
        assert_eq!(records[0].actor_id, None);
        let evidence = records[0].evidence.as_ref().expect("evidence");
        assert_eq!(evidence["reason"], "invalid credentials");
        assert_eq!(evidence["login"], "centre.c7");
    }

    #[tokio::test]
    async fn missing_assignment_fails_and_revokes() {
        let f = fixture();
        let err = f
            .store
            .login(&Credentials::new("orphan", "pw"))
            .await
            .expect_err("no assignment");

        assert!(matches!(err, SessionError::Directory(_)));
        assert_eq!(f.auth.invalidated(), vec![IdentityId::named("orphan")]);
        let records = f.sink.records();
        assert_eq!(records[0].action, AuditAction::LOGIN_FAILED);
        assert_eq!(records[0].actor_id, Some(IdentityId::named("orphan")));
    }

    #[tokio::test]
    async fn confined_role_without_node_is_scope_error() {
        let f = fixture();
        let err = f
            .store
            .login(&Credentials::new("unplaced", "pw"))
            .await
            .expect_err("no node");

        assert!(matches!(err, SessionError::Scope(ScopeError::Resolution { .. })));
        assert_eq!(f.store.current(), None);
    }

    #[tokio::test]
    async fn second_login_while_authenticated_is_refused() {
        let f = fixture();
        f.store.login(&Credentials::new("centre.c7", "pw")).await.expect("login");
        let err = f
            .store
            .login(&Credentials::new("mandal.m1", "pw"))
            .await
            .expect_err("already in");
        assert_eq!(err, SessionError::AlreadyAuthenticated);
        assert_eq!(f.store.current().expect("still").role(), Role::CentreInCharge);
    }

    #[tokio::test]
    async fn concurrent_transitions_are_busy() {
        let f = fixture();
        f.auth.hold_logins();

        let store = f.store.clone();
        let pending = tokio::spawn(async move {
            store.login(&Credentials::new("centre.c7", "pw")).await
        });

        let mut status = f.store.watch();
        status
            .wait_for(|s| *s == SessionStatus::Authenticating)
            .await
            .expect("authenticating");

        assert_eq!(
            f.store.login(&Credentials::new("mandal.m1", "pw")).await,
            Err(SessionError::Busy)
        );
        assert_eq!(f.store.logout().await, Err(SessionError::Busy));

        f.auth.release_logins();
        let session = pending.await.expect("join").expect("login");
        assert_eq!(session.role(), Role::CentreInCharge);
    }

    #[tokio::test]
    async fn logout_audits_before_clearing_and_releases_subscriptions() {
        let f = fixture();
        let session = f.store.login(&Credentials::new("mandal.m1", "pw")).await.expect("login");
        let handle = f.store.subscriptions().subscribe_for(
            session.id(),
            SubscriptionDescriptor::new("alerts"),
            |_| Ok(()),
        );

        f.store.logout().await.expect("logout");

        assert_eq!(f.store.status(), SessionStatus::Unauthenticated);
        assert!(handle.is_released());
        assert_eq!(f.store.subscriptions().channel_count(), 0);
        assert_eq!(f.auth.invalidated(), vec![session.identity().id]);

        let records = f.sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].action, AuditAction::LOGOUT);
        assert_eq!(records[1].actor_id, Some(session.identity().id));
    }

    #[tokio::test]
    async fn logout_without_session() {
        let f = fixture();
        assert_eq!(f.store.logout().await, Err(SessionError::NotAuthenticated));
        assert!(f.sink.records().is_empty());
    }

    #[tokio::test]
    async fn backend_expiry_tears_down() {
        let f = fixture();
        let watcher = f.store.spawn_expiry_watcher();
        let session = f.store.login(&Credentials::new("centre.c7", "pw")).await.expect("login");
        let handle = f.store.subscriptions().subscribe_for(
            session.id(),
            SubscriptionDescriptor::new("alerts"),
            |_| Ok(()),
        );

        let mut status = f.store.watch();
        f.auth.expire(IdentityId::named("someone.else"));
        f.auth.expire(session.identity().id);
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == SessionStatus::Unauthenticated),
        )
        .await
        .expect("expired in time")
        .expect("watch open");

        assert!(handle.is_released());
        assert_eq!(f.sink.actions(), vec![AuditAction::LOGIN, AuditAction::SESSION_EXPIRED]);
        watcher.abort();
    }

    #[tokio::test]
    async fn expiry_for_other_identity_is_ignored() {
        let f = fixture();
        f.store.login(&Credentials::new("centre.c7", "pw")).await.expect("login");
        assert!(!f.store.handle_expiry(IdentityId::named("mandal.m1")).await);
        assert!(f.store.status().is_authenticated());
    }

    #[tokio::test]
    async fn relogin_after_logout_gets_new_session_id() {
        let f = fixture();
        let first = f.store.login(&Credentials::new("centre.c7", "pw")).await.expect("first");
        f.store.logout().await.expect("logout");
        let second = f.store.login(&Credentials::new("centre.c7", "pw")).await.expect("second");
        assert_ne!(first.id(), second.id());
        assert_eq!(first.identity(), second.identity());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_login_returns_to_unauthenticated() {
        let f = fixture();
        f.auth.hold_logins();

        let attempt = tokio::time::timeout(
            Duration::from_millis(100),
            f.store.login(&Credentials::new("centre.c7", "pw")),
        )
        .await;
        assert!(attempt.is_err(), "login should still be held");
        assert_eq!(f.store.status(), SessionStatus::Unauthenticated);
        assert!(f.sink.records().is_empty());

        f.auth.release_logins();
        let session = f
            .store
            .login(&Credentials::new("centre.c7", "pw"))
            .await
            .expect("login after cancellation");
        assert_eq!(f.store.current().as_deref(), Some(&*session));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_audit_sink_does_not_hold_transitions() {
        let f = fixture();
        f.sink.stall_writes(true);

        let session = tokio::time::timeout(
            Duration::from_secs(10),
            f.store.login(&Credentials::new("mandal.m1", "pw")),
        )
        .await
        .expect("login returns despite stalled sink")
        .expect("login");
        assert_eq!(f.store.current().as_deref(), Some(&*session));

        tokio::time::timeout(Duration::from_secs(10), f.store.logout())
            .await
            .expect("logout returns despite stalled sink")
            .expect("logout");
        assert_eq!(f.store.status(), SessionStatus::Unauthenticated);
        assert!(f.sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_audit_does_not_block_next_transition() {
        let f = fixture();
        f.sink.stall_writes(true);

        let store = f.store.clone();
        let login = tokio::spawn(async move {
            store.login(&Credentials::new("centre.c7", "pw")).await
        });
        let mut status = f.store.watch();
        status
            .wait_for(SessionStatus::is_authenticated)
            .await
            .expect("watch open");

        // The LOGIN write is still pending; the transition lock is not.
        f.store.logout().await.expect("logout while LOGIN audit pending");
        assert_eq!(f.store.status(), SessionStatus::Unauthenticated);
        login.await.expect("join").expect("login");
    }
}
