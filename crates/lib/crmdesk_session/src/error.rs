//! Session error types.

use thiserror::Error;

/// Convenience alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by the session lifecycle core.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The access token could not be decoded as a JWT.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The refresh endpoint answered without the fields we need.
    #[error("Refresh protocol error: {0}")]
    RefreshProtocol(String),

    /// Transport-level failure talking to the Auth API.
    #[error("Network failure: {0}")]
    Network(String),

    /// The Auth API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A 400 listing what was wrong with the submitted form.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The operation needs a logged-in identity.
    #[error("Not logged in")]
    NotAuthenticated,
}

impl SessionError {
    /// Message suitable for showing inline to the user.
    ///
    /// Server-supplied messages win for 401/404; everything else collapses
    /// into a generic retry hint.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Http { status: 401, message } => {
                non_empty_or(message, "Wrong password entered")
            }
            SessionError::Http { status: 404, message } => non_empty_or(message, "User not found"),
            SessionError::NotAuthenticated => "Please log in first.".to_string(),
            _ => "Login failed. Please try again.".to_string(),
        }
    }

    /// Every message worth showing for a rejected form (signup, email
    /// confirmation), in console wording where the console has one.
    pub fn messages(&self) -> Vec<String> {
        match self {
            SessionError::Validation(errors) => errors.iter().map(|e| friendly(e)).collect(),
            SessionError::Http { message, .. } if !message.trim().is_empty() => {
                vec![friendly(message)]
            }
            SessionError::Http { status, .. } => vec![format!("Request failed (HTTP {status})")],
            other => vec![other.to_string()],
        }
    }

    /// `true` for 401 responses from the Auth API.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::Http { status: 401, .. })
    }
}

/// Console rewording of the server's password and account rules.
const FRIENDLY_MESSAGES: &[(&str, &str)] = &[
    (
        "Passwords must be at least 8 characters.",
        "Password must be at least 8 characters long.",
    ),
    (
        "Passwords must have at least one non alphanumeric character.",
        "Password must include at least one special character (e.g. @, #, $).",
    ),
    (
        "Passwords must have at least one digit ('0'-'9').",
        "Password must include at least one number.",
    ),
    (
        "Passwords must have at least one uppercase ('A'-'Z').",
        "Password must include at least one uppercase letter.",
    ),
    (
        "Passwords must have at least one lowercase ('a'-'z').",
        "Password must include at least one lowercase letter.",
    ),
    (
        "Username already exists",
        "This username is already taken. Please choose another.",
    ),
    (
        "Email already exists",
        "This email is already registered. Try logging in instead.",
    ),
];

fn friendly(message: &str) -> String {
    FRIENDLY_MESSAGES
        .iter()
        .find(|(server, _)| *server == message)
        .map_or_else(|| message.to_string(), |(_, console)| console.to_string())
}

fn non_empty_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        SessionError::Network(e.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Storage(e.to_string())
    }
}
