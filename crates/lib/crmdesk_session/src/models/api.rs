//! Auth API request and response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest<'a> {
    pub email: &'a str,
    pub token: &'a str,
    pub new_password: &'a str,
}

/// Password change, answered with a fresh token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub user_id: String,
    pub old_password: String,
    pub new_password: String,
    /// Renewal token issued with the password-expiry notice.
    pub token: String,
}

/// New account. Signing up does not log in; the account is usable once the
/// emailed confirmation link has been followed.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Second use of the signup endpoint: confirm the address from the email.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEmailRequest<'a> {
    pub user_id: &'a str,
    pub token: &'a str,
}

/// Answer to a registration or an email confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignupResponse {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(default, rename = "confirmLink", alias = "ConfirmLink")]
    pub confirm_link: Option<String>,
}

/// Token pair returned by login, refresh and change-password.
///
/// The refresh endpoint has been seen answering in PascalCase, so both
/// spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(
        default,
        rename = "accessToken",
        alias = "AccessToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<String>,
    #[serde(
        default,
        rename = "refreshToken",
        alias = "RefreshToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Access token, treating an empty string as absent.
    pub fn access(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Refresh token, treating an empty string as absent.
    pub fn refresh(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Error body; the server puts a human-readable `message` in most failures.
///
/// Validation failures list their problems under `errors`, either as an
/// array (of strings or `{code, description}` objects) or as a field map.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default, alias = "Message")]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, alias = "Errors")]
    pub errors: Option<Value>,
}
