//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};

use crate::api::AuthApi;
use crate::clock::{Clock, TokioClock};
use crate::error::{SessionError, SessionResult};
use crate::models::api::{PasswordChange, Registration, SignupResponse, TokenResponse};

/// Epoch origin used by paused-clock tests (whole seconds).
pub const ORIGIN_MS: i64 = 1_700_000_000_000;

/// Sign `claims` with a throwaway secret.
pub fn mint_token(claims: Value) -> String {
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("encode test token")
}

/// Token for user `alice` expiring at `exp` (epoch seconds).
pub fn token_expiring_at(exp: i64) -> String {
    mint_token(json!({
        "sub": "1",
        "unique_name": "alice",
        "FullName": "Alice Liddell",
        "roles": ["Admin"],
        "Permission": [{"id": "1", "name": "Leads.View"}],
        "exp": exp,
    }))
}

pub fn paused_clock() -> Arc<TokioClock> {
    Arc::new(TokioClock::starting_at(ORIGIN_MS))
}

/// How the fake refresh endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReply {
    /// New pair with an access token valid for `lifetime_secs`.
    Fresh,
    /// 2xx body with no access token.
    MissingAccessToken,
    /// 401 from the server.
    Rejected,
}

/// In-process [`AuthApi`] that mints tokens relative to a clock.
pub struct FakeAuthApi {
    pub clock: Arc<dyn Clock>,
    pub lifetime_secs: AtomicI64,
    pub refresh_delay: Duration,
    /// The revoke is counted once this delay has passed.
    pub logout_delay: Duration,
    pub refresh_reply: Mutex<RefreshReply>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub fail_logout: bool,
}

impl FakeAuthApi {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            lifetime_secs: AtomicI64::new(3600),
            refresh_delay: Duration::ZERO,
            logout_delay: Duration::ZERO,
            refresh_reply: Mutex::new(RefreshReply::Fresh),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            fail_logout: false,
        }
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.refresh_reply.lock().unwrap() = reply;
    }

    /// Lifetime of tokens minted from now on; negative mints expired tokens.
    pub fn set_lifetime_secs(&self, secs: i64) {
        self.lifetime_secs.store(secs, Ordering::SeqCst);
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn fresh_pair(&self, serial: usize) -> TokenResponse {
        let exp = self.clock.now_ms() / 1000 + self.lifetime_secs.load(Ordering::SeqCst);
        TokenResponse::new(token_expiring_at(exp), format!("refresh-{serial}"))
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, username: &str, password: &str) -> SessionResult<TokenResponse> {
        let serial = self.login_calls.fetch_add(1, Ordering::SeqCst);
        if username == "alice" && password == "secret" {
            Ok(self.fresh_pair(serial))
        } else {
            Err(SessionError::Http {
                status: 401,
                message: String::new(),
            })
        }
    }

    async fn refresh(&self, refresh_token: &str) -> SessionResult<TokenResponse> {
        let serial = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        let reply = *self.refresh_reply.lock().unwrap();
        match reply {
            RefreshReply::Fresh => Ok(self.fresh_pair(100 + serial)),
            RefreshReply::MissingAccessToken => Ok(TokenResponse {
                access_token: None,
                refresh_token: Some(refresh_token.to_string()),
            }),
            RefreshReply::Rejected => Err(SessionError::Http {
                status: 401,
                message: "Invalid refresh token".into(),
            }),
        }
    }

    async fn logout(&self, _refresh_token: &str) -> SessionResult<()> {
        if !self.logout_delay.is_zero() {
            tokio::time::sleep(self.logout_delay).await;
        }
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout {
            return Err(SessionError::Network("connection reset".into()));
        }
        Ok(())
    }

    async fn change_password(&self, _change: &PasswordChange) -> SessionResult<TokenResponse> {
        Ok(self.fresh_pair(999))
    }

    async fn forgot_password(&self, _email: &str) -> SessionResult<()> {
        Ok(())
    }

    async fn reset_password(
        &self,
        _email: &str,
        _token: &str,
        _new_password: &str,
    ) -> SessionResult<()> {
        Ok(())
    }

    async fn signup(&self, registration: &Registration) -> SessionResult<SignupResponse> {
        if registration.username == "alice" {
            return Err(SessionError::Validation(vec!["Username already exists".into()]));
        }
        Ok(SignupResponse {
            message: Some("Registration successful. Please confirm your email.".into()),
            confirm_link: Some(format!("http://crm.local/confirm?user={}", registration.username)),
        })
    }

    async fn confirm_email(&self, _user_id: &str, token: &str) -> SessionResult<SignupResponse> {
        if token != "good" {
            return Err(SessionError::Http {
                status: 400,
                message: "Invalid confirmation token".into(),
            });
        }
        Ok(SignupResponse::default())
    }
}
