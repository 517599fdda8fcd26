//! # crmdesk_session
//!
//! Session lifecycle core for the crmdesk console: access/refresh token
//! decoding, proactive expiry warnings, single-flight refresh and forced
//! logout.
//!
//! The pieces are wired together by [`SessionController`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use crmdesk_session::{
//!     FileStorage, HttpAuthApi, SessionConfig, SessionController, SystemClock,
//! };
//! # use crmdesk_session::{Notice, SessionPresenter, WarningChoice};
//! # struct Quiet;
//! # #[async_trait::async_trait]
//! # impl SessionPresenter for Quiet {
//! #     async fn present_warning(&self, _: std::time::Duration) -> WarningChoice {
//! #         WarningChoice::Logout
//! #     }
//! #     fn notify(&self, _: Notice) {}
//! # }
//! # async fn demo() -> crmdesk_session::SessionResult<()> {
//! let config = SessionConfig::from_env();
//! let controller = SessionController::new(
//!     &config,
//!     Arc::new(HttpAuthApi::new(&config)?),
//!     Arc::new(FileStorage::new(&config.storage_dir)),
//!     Arc::new(SystemClock),
//!     Arc::new(Quiet),
//! );
//! controller.login("alice", "secret").await?;
//! assert!(controller.store().current().is_some());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{AuthApi, HttpAuthApi};
pub use clock::{Clock, SystemClock, TokioClock};
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use models::api::{Registration, SignupResponse};
pub use models::identity::{Identity, Permission};
pub use session::lifecycle::{
    Notice, SessionController, SessionPresenter, SessionState, WarningChoice,
};
pub use session::refresh::{RefreshCoordinator, RefreshOutcome};
pub use session::storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use session::store::{SessionStore, TimerEvent};
pub use session::timer::{SessionTimer, TimerPlan};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
