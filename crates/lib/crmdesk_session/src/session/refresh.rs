//! Single-flight token refresh.
//!
//! The warning dialog's "continue" and any request that hit a 401 may ask
//! for a refresh at the same moment. Only one network call is made per
//! window; everyone who asks during it gets that call's outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, warn};

use super::store::SessionStore;
use crate::api::AuthApi;
use crate::error::{SessionError, SessionResult};
use crate::models::identity::Identity;

/// Result of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Failure,
}

impl RefreshOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, RefreshOutcome::Success)
    }
}

type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Serializes refresh calls against the Auth API.
///
/// Clones share the in-flight slot; every call site must use a clone of the
/// same coordinator.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    api: Arc<dyn AuthApi>,
    store: SessionStore,
    in_flight: Mutex<Option<InFlight>>,
}

impl RefreshCoordinator {
    pub fn new(api: Arc<dyn AuthApi>, store: SessionStore) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                api,
                store,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Refresh the current identity's tokens, or join the refresh already
    /// under way.
    ///
    /// A failed refresh ends the session. The server-side revoke of the old
    /// refresh token runs in the background.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(identity) = self.inner.store.current() else {
            debug!("refresh requested without a session");
            return RefreshOutcome::Failure;
        };
        let Some(refresh_token) = identity.refresh_token.clone() else {
            debug!("refresh requested but identity has no refresh token");
            return RefreshOutcome::Failure;
        };

        let attempt = {
            let mut slot = self.inner.slot();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!("joining in-flight refresh");
                    in_flight.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let attempt = async move {
                        let outcome = inner.run(identity, refresh_token).await;
                        inner.slot().take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    pub fn in_flight(&self) -> bool {
        self.inner.slot().is_some()
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }
}

impl CoordinatorInner {
    fn slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(&self, identity: Identity, refresh_token: String) -> RefreshOutcome {
        match self.exchange(&identity, &refresh_token).await {
            Ok(refreshed) => {
                self.store.set_identity(refreshed);
                info!(user = %identity.username, "session tokens refreshed");
                RefreshOutcome::Success
            }
            Err(e) => {
                warn!(error = %e, user = %identity.username, "token refresh failed; ending session");
                self.store.clear_identity();
                // Callers see the failure now; the revoke finishes on its own.
                let api = Arc::clone(&self.api);
                tokio::spawn(async move {
                    if let Err(e) = api.logout(&refresh_token).await {
                        warn!(error = %e, "failed to revoke refresh token");
                    }
                });
                RefreshOutcome::Failure
            }
        }
    }

    async fn exchange(&self, identity: &Identity, refresh_token: &str) -> SessionResult<Identity> {
        let response = self.api.refresh(refresh_token).await?;
        let access_token = response
            .access()
            .ok_or_else(|| {
                SessionError::RefreshProtocol("no access token in refresh response".into())
            })?
            .to_string();
        let refresh_token = response
            .refresh()
            .map(str::to_string)
            .or_else(|| identity.refresh_token.clone());

        match Identity::from_tokens(access_token.clone(), refresh_token.clone()) {
            Ok(refreshed) => Ok(refreshed),
            Err(e) => {
                warn!(error = %e, "refreshed access token is unreadable; keeping previous claims");
                Ok(identity.with_tokens(access_token, refresh_token))
            }
        }
    }
}
