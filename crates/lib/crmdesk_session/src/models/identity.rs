//! Authenticated identity model.
//!
//! The serialized shape is what the console persists under its storage key,
//! so field names follow the console (`token`, `refreshToken`) rather than
//! Rust naming.

use serde::{Deserialize, Serialize};

use crate::auth::jwt::{TokenClaims, decode_token};
use crate::auth::permissions::normalize_permissions;
use crate::error::SessionResult;

/// A named capability grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub name: String,
}

impl Permission {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Permission whose id is its name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
        }
    }
}

/// The authenticated principal and its tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name.
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Identity {
    /// Decode `access_token` and build an identity from its claims.
    pub fn from_tokens(access_token: String, refresh_token: Option<String>) -> SessionResult<Self> {
        let claims = decode_token(&access_token)?;
        Ok(Self::from_claims(claims, access_token, refresh_token))
    }

    pub fn from_claims(
        claims: TokenClaims,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            id: claims.subject,
            username: claims.username,
            email: claims.email,
            name: claims.full_name,
            roles: claims.roles,
            permissions: normalize_permissions(&claims.permissions),
            access_token,
            refresh_token,
        }
    }

    /// Same principal, new token pair.
    pub fn with_tokens(&self, access_token: String, refresh_token: Option<String>) -> Self {
        Self {
            access_token,
            refresh_token,
            ..self.clone()
        }
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == name)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
