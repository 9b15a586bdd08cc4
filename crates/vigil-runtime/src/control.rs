//! Session-aware facade over the runtime.
//!
//! [`ControlPlane`] is what UI-facing code holds. Every data helper reads
//! the current session, so callers never pass a role or scope around:
//!
//! ```text
//! scoped_filter(base) ─► ScopeResolver::build_filter_for(session.role, session.scope, base)
//! subscribe(resource) ─► SubscriptionManager::subscribe_for(session.id, scoped descriptor)
//! perform(op, action) ─► capability ∩ scope check ─► action ─► audit
//! ```

use crate::audit::{AuditRecorder, AuditSink};
use crate::config::VigilConfig;
use crate::realtime::{
    ChangeFeed, HandlerResult, SubscriptionDescriptor, SubscriptionHandle, SubscriptionManager,
};
use crate::session::{Authenticator, Credentials, IdentityDirectory, SessionError, SessionStore};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use vigil_auth::{
    AccessDenied, Capability, Filter, GeographicScope, OrgHierarchy, ScopeResolver, ScopedFilter,
    Session,
};
use vigil_event::{AuditAction, AuditEntry, ChangeEvent, ChangeKind};
use vigil_types::{ErrorCode, NodeId, Tier};

/// External systems the control plane talks to.
pub struct Backends {
    /// Authentication API.
    pub authenticator: Arc<dyn Authenticator>,
    /// Identity → role/node lookup.
    pub directory: Arc<dyn IdentityDirectory>,
    /// Organizational tree for ancestry checks.
    pub hierarchy: Arc<dyn OrgHierarchy>,
    /// Change-notification API.
    pub feed: Arc<dyn ChangeFeed>,
    /// Audit log.
    pub audit_sink: Arc<dyn AuditSink>,
}

/// A state-changing action gated by capability and, optionally, scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    name: String,
    required: Capability,
    entity: String,
    entity_id: Option<String>,
    within: Option<(Tier, NodeId)>,
}

impl Operation {
    /// `name` doubles as the audit action (e.g. `"LOCK_EVIDENCE"`).
    #[must_use]
    pub fn new(name: impl Into<String>, required: Capability, entity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required,
            entity: entity.into(),
            entity_id: None,
            within: None,
        }
    }

    /// Target instance.
    #[must_use]
    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Requires the session to see `node` at `tier`.
    #[must_use]
    pub fn within(mut self, tier: Tier, node: impl Into<NodeId>) -> Self {
        self.within = Some((tier, node.into()));
        self
    }

    /// Operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Failure of [`ControlPlane::perform`].
#[derive(Debug, Error)]
pub enum PerformError<E> {
    /// Refused before the action ran.
    #[error(transparent)]
    Denied(AccessDenied),

    /// The action ran and failed.
    #[error("{operation} failed: {source}")]
    Failed {
        /// Operation name.
        operation: String,
        /// The action's error.
        #[source]
        source: E,
    },
}

impl<E> ErrorCode for PerformError<E>
where
    E: std::error::Error + 'static,
{
    fn code(&self) -> &'static str {
        match self {
            Self::Denied(_) => "PERFORM_DENIED",
            Self::Failed { .. } => "PERFORM_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Denied(denied) => denied.is_recoverable(),
            Self::Failed { .. } => false,
        }
    }
}

/// The wired-up runtime: session store, resolver, subscriptions, audit.
///
/// Cheap to clone.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vigil_auth::{Filter, MemoryHierarchy};
/// use vigil_runtime::config::VigilConfig;
/// use vigil_runtime::control::{Backends, ControlPlane};
/// use vigil_runtime::session::Credentials;
/// use vigil_runtime::testing::{
///     MemoryAuditSink, MemoryChangeFeed, StaticAuthenticator, StaticDirectory,
/// };
/// use vigil_types::Role;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let plane = ControlPlane::new(
///     &VigilConfig::default(),
///     Backends {
///         authenticator: Arc::new(StaticAuthenticator::new().with_user("mandal.m1", "pw")),
///         directory: Arc::new(
///             StaticDirectory::new().with("mandal.m1", Role::MandalInCharge, Some("M1")),
///         ),
///         hierarchy: Arc::new(MemoryHierarchy::new().with_district("D1").with_mandal("M1", "D1")),
///         feed: Arc::new(MemoryChangeFeed::new()),
///         audit_sink: Arc::new(MemoryAuditSink::new()),
///     },
/// );
///
/// plane.login(&Credentials::new("mandal.m1", "pw")).await.expect("login");
/// let filter = plane.scoped_filter(Filter::new().where_eq("status", "OPEN")).expect("scoped");
/// assert_eq!(filter.to_string(), r#""mandalId"="M1"&"status"="OPEN""#);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ControlPlane {
    sessions: SessionStore,
}

impl ControlPlane {
    /// Wires the runtime from config and backends.
    #[must_use]
    pub fn new(config: &VigilConfig, backends: Backends) -> Self {
        let resolver =
            ScopeResolver::new(backends.hierarchy).with_invariant_mode(config.auth.invariant_mode);
        let audit = AuditRecorder::from_config(backends.audit_sink, &config.audit);
        let subscriptions = SubscriptionManager::from_config(backends.feed, &config.realtime);
        let sessions = SessionStore::new(
            backends.authenticator,
            backends.directory,
            resolver,
            audit,
            subscriptions,
        );
        tracing::debug!(
            origin = %config.audit.origin,
            invariant_mode = ?config.auth.invariant_mode,
            "control plane ready"
        );
        Self { sessions }
    }

    /// Starts the backend expiry watcher.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        self.sessions.spawn_expiry_watcher()
    }

    /// Session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Scope resolver.
    #[must_use]
    pub fn resolver(&self) -> &ScopeResolver {
        self.sessions.resolver()
    }

    /// Subscription manager.
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        self.sessions.subscriptions()
    }

    /// Audit recorder.
    #[must_use]
    pub fn audit(&self) -> &AuditRecorder {
        self.sessions.audit()
    }

    /// See [`SessionStore::login`].
    ///
    /// # Errors
    ///
    /// As [`SessionStore::login`].
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>, SessionError> {
        self.sessions.login(credentials).await
    }

    /// See [`SessionStore::logout`].
    ///
    /// # Errors
    ///
    /// As [`SessionStore::logout`].
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.sessions.logout().await
    }

    /// Narrows `base` to the current session's scope.
    ///
    /// # Errors
    ///
    /// [`AccessDenied::NotAuthenticated`] without a session,
    /// [`AccessDenied::Scope`] if the session's scope is malformed.
    pub fn scoped_filter(&self, base: Filter) -> Result<ScopedFilter, AccessDenied> {
        let session = self.sessions.require_session()?;
        Ok(self
            .resolver()
            .build_filter_for(session.role(), session.scope(), base)?)
    }

    /// Subscribes to `resource` within the current session's scope.
    ///
    /// The predicate is `base` narrowed like a query filter, and the handle
    /// is released when the session ends. Empty `kinds` means every kind.
    ///
    /// # Errors
    ///
    /// As [`scoped_filter`](Self::scoped_filter).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn subscribe<F>(
        &self,
        resource: &str,
        base: Filter,
        kinds: &[ChangeKind],
        handler: F,
    ) -> Result<SubscriptionHandle, AccessDenied>
    where
        F: Fn(&ChangeEvent) -> HandlerResult + Send + Sync + 'static,
    {
        let session = self.sessions.require_session()?;
        let predicate = self
            .resolver()
            .build_filter_for(session.role(), session.scope(), base)?;
        let mut descriptor = SubscriptionDescriptor::scoped(resource, predicate);
        if !kinds.is_empty() {
            descriptor = descriptor.with_kinds(kinds.iter().copied());
        }
        Ok(self.subscriptions().subscribe_for(session.id(), descriptor, handler))
    }

    /// Whether the current session may see `target` at `tier`.
    ///
    /// # Errors
    ///
    /// [`AccessDenied::NotAuthenticated`] without a session,
    /// [`AccessDenied::Scope`] if the session's scope is malformed.
    pub fn can_view(&self, target: &NodeId, tier: Tier) -> Result<bool, AccessDenied> {
        let session = self.sessions.require_session()?;
        Ok(self
            .resolver()
            .can_view_for(session.role(), session.scope(), target, tier)?)
    }

    /// Derives a working scope at `target` for the current session and
    /// records `SCOPE_WIDENED`, or `ACCESS_DENIED` on refusal.
    ///
    /// # Errors
    ///
    /// See [`ScopeResolver::widen`]; also
    /// [`AccessDenied::NotAuthenticated`] without a session.
    pub async fn widen(&self, target: &GeographicScope) -> Result<GeographicScope, AccessDenied> {
        let session = self.sessions.require_session()?;
        match self.resolver().widen(&session, target) {
            Ok(scope) => {
                self.audit()
                    .record(
                        AuditEntry::new(AuditAction::SCOPE_WIDENED, "scope")
                            .actor(session.identity().id)
                            .entity_id(scope.to_string())
                            .evidence(json!({ "from": session.scope(), "to": &scope })),
                    )
                    .await;
                Ok(scope)
            }
            Err(denied) => {
                self.record_denied(Some(&*session), "widen_scope", "scope", &denied)
                    .await;
                Err(denied)
            }
        }
    }

    /// Runs `action` if the current session holds `op`'s capability and
    /// sees its target, then records the outcome under `op`'s name.
    ///
    /// A refusal records `ACCESS_DENIED` and the action never runs. The
    /// audit write happens after the action and cannot change its result.
    ///
    /// # Errors
    ///
    /// [`PerformError::Denied`] if refused, [`PerformError::Failed`] if
    /// the action failed.
    pub async fn perform<T, E, Fut, A>(
        &self,
        op: Operation,
        action: A,
    ) -> Result<T, PerformError<E>>
    where
        A: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let current = self.sessions.current();
        let session = match self.authorize(current.as_ref(), &op) {
            Ok(session) => session,
            Err(denied) => {
                self.record_denied(current.as_deref(), &op.name, &op.entity, &denied)
                    .await;
                return Err(PerformError::Denied(denied));
            }
        };

        let result = action(Arc::clone(&session)).await;

        let evidence = match &result {
            Ok(_) => json!({ "outcome": "success" }),
            Err(err) => json!({ "outcome": "failure", "error": err.to_string() }),
        };
        let mut entry = AuditEntry::new(AuditAction::custom(op.name.clone()), op.entity)
            .actor(session.identity().id)
            .evidence(evidence);
        if let Some(id) = op.entity_id {
            entry = entry.entity_id(id);
        }
        self.audit().record(entry).await;

        result.map_err(|source| PerformError::Failed {
            operation: op.name,
            source,
        })
    }

    fn authorize(
        &self,
        current: Option<&Arc<Session>>,
        op: &Operation,
    ) -> Result<Arc<Session>, AccessDenied> {
        let session = current.cloned().ok_or(AccessDenied::NotAuthenticated)?;
        session.require(op.required, &op.name)?;
        if let Some((tier, node)) = &op.within {
            self.resolver().check_view(&session, node, *tier)?;
        }
        Ok(session)
    }

    async fn record_denied(
        &self,
        session: Option<&Session>,
        operation: &str,
        entity: &str,
        denied: &AccessDenied,
    ) {
        tracing::info!(
            operation,
            layer = denied.layer(),
            code = denied.code(),
            reason = %denied,
            "access denied"
        );
        let mut entry = AuditEntry::new(AuditAction::ACCESS_DENIED, entity).evidence(json!({
            "operation": operation,
            "layer": denied.layer(),
            "code": denied.code(),
            "reason": denied.to_string(),
        }));
        if let Some(session) = session {
            entry = entry.actor(session.identity().id);
        }
        self.audit().record(entry).await;
    }
}
