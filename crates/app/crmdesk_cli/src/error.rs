use crmdesk_session::SessionError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    /// Login-style failure, already phrased for the user.
    #[error("{}", .0)]
    Rejected(String),

    /// Permission or role check answered "no".
    #[error("not granted: {}", .0)]
    Denied(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("{}", .0)]
    Session(#[from] SessionError),

    #[error("Json::{}", .0)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a failed login-style call with the console's message.
    pub fn rejected(e: SessionError) -> Self {
        Error::Rejected(e.user_message())
    }

    /// Wrap a rejected form submission, one problem per line.
    pub fn invalid(e: SessionError) -> Self {
        Error::Rejected(e.messages().join("\n"))
    }
}
