//! Session expiry timers.
//!
//! One warning timer and one hard-expiry timer per access token. Arming a new
//! pair always cancels the previous one; both timers of a pair share a
//! [`CancellationToken`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::auth::jwt::decode_token;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::SessionResult;

/// What [`SessionTimer::arm`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPlan {
    /// Both timers are pending.
    Scheduled {
        warning_in: Duration,
        expires_in: Duration,
    },
    /// The token was already expired; the expiry callback ran inline.
    ExpiredNow,
    /// Nothing was scheduled (undecodable token or no runtime).
    NotScheduled,
}

/// Schedules warning/expiry callbacks for an access token.
pub struct SessionTimer {
    clock: Arc<dyn Clock>,
    warning_margin: Duration,
    fallback_timeout: Duration,
    armed: Mutex<Option<CancellationToken>>,
}

impl SessionTimer {
    pub fn new(clock: Arc<dyn Clock>, warning_margin: Duration, fallback_timeout: Duration) -> Self {
        Self {
            clock,
            warning_margin,
            fallback_timeout,
            armed: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(clock, config.warning_margin, config.session_timeout)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Compute the timer delays for `access_token` without scheduling.
    ///
    /// Tokens without `exp` expire `fallback_timeout` from now.
    pub fn plan(&self, access_token: &str) -> SessionResult<TimerPlan> {
        let claims = decode_token(access_token)?;
        let now = self.clock.now_ms();
        let fallback = now.saturating_add(self.fallback_timeout.as_millis() as i64);
        let expiry = claims.expires_at_ms().unwrap_or(fallback);

        let until_expiry = expiry - now;
        if until_expiry <= 0 {
            return Ok(TimerPlan::ExpiredNow);
        }
        let until_warning = (until_expiry - self.warning_margin.as_millis() as i64).max(0);
        Ok(TimerPlan::Scheduled {
            warning_in: Duration::from_millis(until_warning as u64),
            expires_in: Duration::from_millis(until_expiry as u64),
        })
    }

    /// Cancel any live pair and schedule a new one for `access_token`.
    ///
    /// An already-expired token runs `on_expired` before returning. A token
    /// that cannot be decoded is logged and leaves no timers behind.
    pub fn arm<W, E>(&self, access_token: &str, on_warning: W, on_expired: E) -> TimerPlan
    where
        W: FnOnce() + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        self.disarm();

        let plan = match self.plan(access_token) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "cannot schedule session timers");
                return TimerPlan::NotScheduled;
            }
        };

        match plan {
            TimerPlan::ExpiredNow => {
                debug!("access token already expired");
                on_expired();
            }
            TimerPlan::Scheduled {
                warning_in,
                expires_in,
            } => {
                if tokio::runtime::Handle::try_current().is_err() {
                    error!("no async runtime; session timers not scheduled");
                    return TimerPlan::NotScheduled;
                }
                let cancel = CancellationToken::new();
                schedule(cancel.clone(), warning_in, on_warning);
                schedule(cancel.clone(), expires_in, on_expired);
                *self.slot() = Some(cancel);
                debug!(
                    warning_in_ms = warning_in.as_millis() as u64,
                    expires_in_ms = expires_in.as_millis() as u64,
                    "session timers armed"
                );
            }
            TimerPlan::NotScheduled => {}
        }
        plan
    }

    /// Cancel the live pair, if any. Safe to call repeatedly.
    pub fn disarm(&self) {
        if let Some(cancel) = self.slot().take() {
            cancel.cancel();
            debug!("session timers cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn schedule<F>(cancel: CancellationToken, delay: Duration, callback: F)
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => callback(),
        }
    });
}
