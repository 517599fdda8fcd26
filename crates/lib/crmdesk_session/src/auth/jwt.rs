//! Access token decoding.
//!
//! The server signs tokens; the client only reads them. Signature checks are
//! therefore disabled and any structurally valid JWT decodes.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde_json::{Map, Value};

use crate::error::{SessionError, SessionResult};

pub const CLAIM_NAME_IDENTIFIER: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
pub const CLAIM_NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";
pub const CLAIM_EMAIL: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
pub const CLAIM_ROLE: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

const SUBJECT_KEYS: &[&str] = &[CLAIM_NAME_IDENTIFIER, "sub", "nameid"];
const USERNAME_KEYS: &[&str] = &[CLAIM_NAME, "unique_name", "name"];
const EMAIL_KEYS: &[&str] = &[CLAIM_EMAIL, "email"];
const ROLE_KEYS: &[&str] = &[CLAIM_ROLE, "role", "roles"];
const PERMISSION_KEYS: &[&str] = &["Permission", "Permissions"];
const FULL_NAME_KEY: &str = "FullName";

/// Decoded view of an access token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub subject: String,
    pub username: String,
    pub email: Option<String>,
    /// Always a list, even when the token carries a single role.
    pub roles: Vec<String>,
    /// Raw permission claim, left for the normalizer.
    pub permissions: Value,
    /// `FullName`, falling back to the username.
    pub full_name: String,
    /// Expiry in seconds since the epoch.
    pub expires_at: Option<i64>,
}

impl TokenClaims {
    /// Build claims from a raw JWT payload.
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let username = first_string(payload, USERNAME_KEYS).unwrap_or_default();
        let full_name = payload
            .get(FULL_NAME_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| username.clone());

        Self {
            subject: first_string(payload, SUBJECT_KEYS).unwrap_or_default(),
            username,
            email: first_string(payload, EMAIL_KEYS),
            roles: roles(payload),
            permissions: PERMISSION_KEYS
                .iter()
                .find_map(|k| payload.get(*k).filter(|v| !v.is_null()))
                .cloned()
                .unwrap_or(Value::Null),
            full_name,
            expires_at: payload.get("exp").and_then(epoch_seconds),
        }
    }

    /// Expiry in epoch milliseconds, if the token has one.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at.map(|secs| secs.saturating_mul(1000))
    }
}

/// Decode a bearer token into claims without verifying its signature.
pub fn decode_token(token: &str) -> SessionResult<TokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| SessionError::MalformedToken(format!("jwt decode: {e}")))?;
    Ok(TokenClaims::from_payload(&data.claims))
}

fn first_string(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn roles(payload: &Map<String, Value>) -> Vec<String> {
    match ROLE_KEYS.iter().find_map(|k| payload.get(*k)) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(role)) => vec![role.clone()],
        _ => Vec::new(),
    }
}

fn epoch_seconds(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
