//! Remote Auth API client.
//!
//! [`AuthApi`] is the seam the refresh coordinator and lifecycle controller
//! talk through; [`HttpAuthApi`] is the reqwest implementation against
//! `{api_url}/Auth`.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::models::api::{
    ConfirmEmailRequest, ErrorBody, ForgotPasswordRequest, LoginRequest, PasswordChange,
    RefreshTokenRequest, Registration, ResetPasswordRequest, SignupResponse, TokenResponse,
};

/// Operations of the remote Auth API.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> SessionResult<TokenResponse>;

    /// Exchange a refresh token for a new pair. The response is returned as
    /// sent; validating it is the caller's job.
    async fn refresh(&self, refresh_token: &str) -> SessionResult<TokenResponse>;

    /// Revoke a refresh token.
    async fn logout(&self, refresh_token: &str) -> SessionResult<()>;

    async fn change_password(&self, change: &PasswordChange) -> SessionResult<TokenResponse>;

    async fn forgot_password(&self, email: &str) -> SessionResult<()>;

    async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> SessionResult<()>;

    /// Register an account; the server mails a confirmation link.
    async fn signup(&self, registration: &Registration) -> SessionResult<SignupResponse>;

    /// Confirm the address with the `userId` and `token` from that link.
    async fn confirm_email(&self, user_id: &str, token: &str) -> SessionResult<SignupResponse>;
}

/// reqwest-backed [`AuthApi`].
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client with the configured timeout.
    pub fn new(config: &SessionConfig) -> SessionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Self::with_client(client, &config.api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: &str) -> SessionResult<Self> {
        let parsed = Url::parse(api_url)
            .map_err(|e| SessionError::Network(format!("invalid API URL {api_url:?}: {e}")))?;
        Ok(Self {
            client,
            base_url: format!("{}/Auth", parsed.as_str().trim_end_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<reqwest::Response> {
        let url = self.endpoint(path);
        debug!(%url, "auth api request");
        let resp = self.client.post(&url).json(body).send().await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(error_from(status.as_u16(), &text))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> SessionResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.post(path, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| SessionError::Network(format!("{path} response parse error: {e}")))
    }
}

/// Error for a non-success response. A 400 that lists validation problems
/// keeps all of them.
fn error_from(status: u16, body: &str) -> SessionError {
    if status == 400 {
        let errors = validation_errors(body);
        if !errors.is_empty() {
            return SessionError::Validation(errors);
        }
    }
    SessionError::Http {
        status,
        message: error_message(body),
    }
}

fn validation_errors(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    match serde_json::from_str::<Value>(body) {
        Ok(list @ Value::Array(_)) => collect_errors(&list, &mut out),
        Ok(value) => {
            if let Ok(ErrorBody {
                errors: Some(errors),
                ..
            }) = serde_json::from_value::<ErrorBody>(value)
            {
                collect_errors(&errors, &mut out);
            }
        }
        Err(_) => {}
    }
    out
}

fn collect_errors(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(text) => {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_errors(item, out)),
        Value::Object(fields) => {
            let text = ["description", "Description", "message", "Message"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str));
            match text {
                Some(text) => out.push(text.to_string()),
                // Field map: `{"Password": ["..."], ...}`
                None => fields.values().for_each(|v| collect_errors(v, out)),
            }
        }
        other => out.push(other.to_string()),
    }
}

/// Pull a human-readable message out of an error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, username: &str, password: &str) -> SessionResult<TokenResponse> {
        self.post_json("login", &LoginRequest { username, password })
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> SessionResult<TokenResponse> {
        self.post_json("refresh", &RefreshTokenRequest { refresh_token })
            .await
    }

    async fn logout(&self, refresh_token: &str) -> SessionResult<()> {
        self.post("logout", &RefreshTokenRequest { refresh_token })
            .await
            .map(|_| ())
    }

    async fn change_password(&self, change: &PasswordChange) -> SessionResult<TokenResponse> {
        self.post_json("change-password", change).await
    }

    async fn forgot_password(&self, email: &str) -> SessionResult<()> {
        self.post("forgot-password", &ForgotPasswordRequest { email })
            .await
            .map(|_| ())
    }

    async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> SessionResult<()> {
        self.post(
            "reset-password",
            &ResetPasswordRequest {
                email,
                token,
                new_password,
            },
        )
        .await
        .map(|_| ())
    }

    async fn signup(&self, registration: &Registration) -> SessionResult<SignupResponse> {
        self.post_json("signup", registration).await
    }

    async fn confirm_email(&self, user_id: &str, token: &str) -> SessionResult<SignupResponse> {
        self.post_json("signup", &ConfirmEmailRequest { user_id, token })
            .await
    }
}
