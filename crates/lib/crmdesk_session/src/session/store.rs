//! The session store: single source of truth for the current identity.
//!
//! Cloning a [`SessionStore`] clones a handle; every clone sees the same
//! identity, storage slot and timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::storage::KeyValueStorage;
use super::timer::{SessionTimer, TimerPlan};
use crate::auth::permissions::normalize_permissions;
use crate::error::{SessionError, SessionResult};
use crate::models::identity::Identity;

/// Storage key of the persisted identity.
pub const IDENTITY_STORAGE_KEY: &str = "currentUser";

/// Timer notifications delivered to the lifecycle controller.
///
/// `generation` identifies the identity the timers were armed for; events
/// from an older generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Warning { generation: u64 },
    Expired { generation: u64 },
}

impl TimerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            TimerEvent::Warning { generation } | TimerEvent::Expired { generation } => *generation,
        }
    }
}

/// Identity as found in storage; permissions may be in an older shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedIdentity {
    #[serde(default)]
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    permissions: Value,
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl From<PersistedIdentity> for Identity {
    fn from(p: PersistedIdentity) -> Self {
        Identity {
            id: p.id,
            username: p.username,
            email: p.email,
            name: p.name,
            roles: p.roles,
            permissions: normalize_permissions(&p.permissions),
            access_token: p.token,
            refresh_token: p.refresh_token,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    identity: watch::Sender<Option<Identity>>,
    storage: Arc<dyn KeyValueStorage>,
    timer: SessionTimer,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<TimerEvent>,
}

impl SessionStore {
    /// Build a store whose timers report into `events`.
    pub fn new(
        storage: Arc<dyn KeyValueStorage>,
        timer: SessionTimer,
        events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            inner: Arc::new(StoreInner {
                identity,
                storage,
                timer,
                generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Replace the current identity, persist it and re-arm the timers.
    ///
    /// Everything is done by the time this returns; a `current()` call right
    /// after sees `identity`.
    pub fn set_identity(&self, identity: Identity) -> TimerPlan {
        if let Err(e) = self.persist(&identity) {
            warn!(error = %e, "failed to persist identity");
        }
        let access_token = identity.access_token.clone();
        info!(user = %identity.username, "session identity set");
        self.inner.identity.send_replace(Some(identity));
        self.arm(&access_token)
    }

    /// Drop the current identity from memory and storage and cancel timers.
    pub fn clear_identity(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.timer.disarm();
        let previous = self.inner.identity.send_replace(None);
        if let Err(e) = self.inner.storage.remove(IDENTITY_STORAGE_KEY) {
            warn!(error = %e, "failed to remove persisted identity");
        }
        if let Some(previous) = previous {
            info!(user = %previous.username, "session identity cleared");
        }
    }

    /// Load the persisted identity, if any, and make it current.
    ///
    /// Unreadable data is discarded.
    pub fn restore(&self) -> Option<Identity> {
        let raw = match self.inner.storage.get(IDENTITY_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no persisted identity");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "failed to read persisted identity");
                return None;
            }
        };

        let identity: Identity = match serde_json::from_str::<PersistedIdentity>(&raw) {
            Ok(persisted) => persisted.into(),
            Err(e) => {
                warn!(error = %e, "discarding unreadable persisted identity");
                if let Err(e) = self.inner.storage.remove(IDENTITY_STORAGE_KEY) {
                    warn!(error = %e, "failed to remove persisted identity");
                }
                return None;
            }
        };

        self.set_identity(identity.clone());
        Some(identity)
    }

    pub fn current(&self) -> Option<Identity> {
        self.inner.identity.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.identity.borrow().is_some()
    }

    /// `false` when nobody is logged in.
    pub fn has_permission(&self, name: &str) -> bool {
        self.inner
            .identity
            .borrow()
            .as_ref()
            .is_some_and(|identity| identity.has_permission(name))
    }

    /// `false` when nobody is logged in.
    pub fn has_role(&self, role: &str) -> bool {
        self.inner
            .identity
            .borrow()
            .as_ref()
            .is_some_and(|identity| identity.has_role(role))
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .identity
            .borrow()
            .as_ref()
            .map(|identity| identity.access_token.clone())
    }

    /// Attach `Authorization: Bearer <access token>` when logged in.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Identity-changed signal.
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.identity.subscribe()
    }

    /// Generation of the currently armed timers.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub fn timers_armed(&self) -> bool {
        self.inner.timer.is_armed()
    }

    fn persist(&self, identity: &Identity) -> SessionResult<()> {
        let json = serde_json::to_string(identity)
            .map_err(|e| SessionError::Storage(format!("serialize identity: {e}")))?;
        self.inner.storage.set(IDENTITY_STORAGE_KEY, &json)
    }

    fn arm(&self, access_token: &str) -> TimerPlan {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let warning_tx = self.inner.events.clone();
        let expiry_tx = self.inner.events.clone();
        self.inner.timer.arm(
            access_token,
            move || {
                let _ = warning_tx.send(TimerEvent::Warning { generation });
            },
            move || {
                let _ = expiry_tx.send(TimerEvent::Expired { generation });
            },
        )
    }
}
