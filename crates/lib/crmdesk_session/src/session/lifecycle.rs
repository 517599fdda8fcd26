//! Session lifecycle controller.
//!
//! Owns the Anonymous / Active / Warning state machine. Timer callbacks only
//! post [`TimerEvent`]s; the controller handles them one at a time, so state
//! transitions never interleave.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

use super::refresh::{RefreshCoordinator, RefreshOutcome};
use super::storage::KeyValueStorage;
use super::store::{SessionStore, TimerEvent};
use super::timer::SessionTimer;
use crate::api::AuthApi;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::models::api::{PasswordChange, Registration, TokenResponse};
use crate::models::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Active,
    /// The expiry warning is on screen.
    Warning,
}

/// Answer from the expiry warning dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningChoice {
    Continue,
    Logout,
    Timeout,
}

/// User-facing notices raised by lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    LoggedOut,
    SessionExpired,
    SessionNotContinued,
    SessionContinued,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::LoggedOut => "You have been logged out successfully",
            Notice::SessionExpired => "Session expired. Redirecting to login...",
            Notice::SessionNotContinued => "Session could not be continued. Logging out...",
            Notice::SessionContinued => "Session extended",
        }
    }
}

/// Presentation layer for the warning dialog and notices.
#[async_trait]
pub trait SessionPresenter: Send + Sync {
    /// Show a countdown of `window` and wait for the user's answer.
    ///
    /// May never resolve; the controller enforces its own failsafe.
    async fn present_warning(&self, window: Duration) -> WarningChoice;

    fn notify(&self, notice: Notice);
}

/// Why the warning dialog closed.
enum DialogClose {
    Answered(WarningChoice),
    Failsafe,
    Expired,
    /// The identity was replaced or cleared while the dialog was open.
    SessionChanged,
}

/// Timer events not yet handled.
///
/// Events of a newer generation that arrive while a warning is on screen
/// are parked in `deferred` and handled before anything else.
struct EventQueue {
    rx: mpsc::UnboundedReceiver<TimerEvent>,
    deferred: VecDeque<TimerEvent>,
}

impl EventQueue {
    async fn next(&mut self) -> Option<TimerEvent> {
        match self.deferred.pop_front() {
            Some(event) => Some(event),
            None => self.rx.recv().await,
        }
    }

    fn try_next(&mut self) -> Option<TimerEvent> {
        self.deferred
            .pop_front()
            .or_else(|| self.rx.try_recv().ok())
    }

    /// Resolve once `generation` expires or a newer generation shows up.
    async fn wait_for_session_end(&mut self, generation: u64) -> DialogClose {
        let expired = TimerEvent::Expired { generation };
        if let Some(pos) = self.deferred.iter().position(|e| *e == expired) {
            self.deferred.remove(pos);
            return DialogClose::Expired;
        }
        loop {
            match self.rx.recv().await {
                Some(event) if event == expired => return DialogClose::Expired,
                Some(event) if event.generation() > generation => {
                    self.deferred.push_back(event);
                    return DialogClose::SessionChanged;
                }
                Some(event) => debug!(?event, "stale timer event during warning"),
                None => std::future::pending::<()>().await,
            }
        }
    }
}

pub struct SessionController {
    store: SessionStore,
    coordinator: RefreshCoordinator,
    api: Arc<dyn AuthApi>,
    presenter: Arc<dyn SessionPresenter>,
    dialog_window: Duration,
    state: watch::Sender<SessionState>,
    events: Mutex<EventQueue>,
}

impl SessionController {
    pub fn new(
        config: &SessionConfig,
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
        presenter: Arc<dyn SessionPresenter>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = SessionTimer::from_config(config, clock);
        let store = SessionStore::new(storage, timer, tx);
        let coordinator = RefreshCoordinator::new(Arc::clone(&api), store.clone());
        let (state, _) = watch::channel(SessionState::Anonymous);
        Self {
            store,
            coordinator,
            api,
            presenter,
            dialog_window: config.dialog_window(),
            state,
            events: Mutex::new(EventQueue {
                rx,
                deferred: VecDeque::new(),
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// The coordinator every refresh call site must share.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn dialog_window(&self) -> Duration {
        self.dialog_window
    }

    /// Current state. A store emptied behind the controller's back (a
    /// failed refresh elsewhere) reads as `Anonymous`.
    pub fn state(&self) -> SessionState {
        if !self.store.is_authenticated() {
            return SessionState::Anonymous;
        }
        *self.state.borrow()
    }

    /// Session-state signal.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Pick up a persisted identity from a previous run.
    pub fn restore(&self) -> Option<Identity> {
        let identity = self.store.restore()?;
        info!(user = %identity.username, "session restored");
        self.set_state(SessionState::Active);
        Some(identity)
    }

    /// Log in, replacing any existing session.
    ///
    /// A failed login leaves the current session untouched.
    pub async fn login(&self, username: &str, password: &str) -> SessionResult<Identity> {
        let response = self.api.login(username, password).await.map_err(|e| {
            warn!(error = %e, %username, "login failed");
            e
        })?;
        let identity = self.adopt(response)?;
        info!(user = %identity.username, "logged in");
        Ok(identity)
    }

    /// Log out. Anonymous callers skip the network entirely.
    pub async fn logout(&self) {
        if !self.store.is_authenticated() {
            debug!("logout requested while anonymous");
            self.set_state(SessionState::Anonymous);
            return;
        }
        self.end_session(Notice::LoggedOut).await;
    }

    /// Refresh tokens through the shared coordinator.
    pub async fn refresh(&self) -> RefreshOutcome {
        let outcome = self.coordinator.refresh().await;
        self.sync_state();
        outcome
    }

    /// Change the password; the server's new token pair replaces the
    /// session like a login.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
    ) -> SessionResult<Identity> {
        let identity = self.store.current().ok_or(SessionError::NotAuthenticated)?;
        let change = PasswordChange {
            user_id: identity.id.clone(),
            old_password: old_password.to_string(),
            new_password: new_password.to_string(),
            token: identity.access_token.clone(),
        };
        let response = self.api.change_password(&change).await?;
        let identity = self.adopt(response)?;
        info!(user = %identity.username, "password changed");
        Ok(identity)
    }

    pub async fn forgot_password(&self, email: &str) -> SessionResult<()> {
        self.api.forgot_password(email).await?;
        info!(%email, "password reset requested");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> SessionResult<()> {
        self.api.reset_password(email, token, new_password).await?;
        info!(%email, "password reset");
        Ok(())
    }

    /// Register an account. The current session, if any, is left alone; the
    /// new account can log in once its email is confirmed.
    ///
    /// Returns the server's message for the user.
    pub async fn signup(&self, registration: &Registration) -> SessionResult<String> {
        let response = self.api.signup(registration).await.map_err(|e| {
            warn!(error = %e, username = %registration.username, "signup failed");
            e
        })?;
        info!(username = %registration.username, "account registered");
        Ok(response
            .message
            .unwrap_or_else(|| "Account created. Check your email to confirm it.".to_string()))
    }

    pub async fn confirm_email(&self, user_id: &str, token: &str) -> SessionResult<String> {
        let response = self.api.confirm_email(user_id, token).await?;
        info!(%user_id, "email confirmed");
        Ok(response
            .message
            .unwrap_or_else(|| "Email confirmed. You can now log in.".to_string()))
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Wait for the next timer event and handle it.
    ///
    /// Returns the event that was taken off the queue, stale or not.
    pub async fn process_next_event(&self) -> Option<TimerEvent> {
        let mut events = self.events.lock().await;
        let event = events.next().await?;
        self.handle_event(event, &mut events).await;
        Some(event)
    }

    /// Handle events that are already queued, without waiting for more.
    pub async fn settle(&self) {
        let mut events = self.events.lock().await;
        while let Some(event) = events.try_next() {
            self.handle_event(event, &mut events).await;
        }
    }

    /// Handle timer events until the session ends.
    ///
    /// Returns after the ending transition has finished, revoke and notice
    /// included.
    pub async fn run(&self) {
        while self.store.is_authenticated() {
            if self.process_next_event().await.is_none() {
                break;
            }
        }
    }

    async fn handle_event(&self, event: TimerEvent, events: &mut EventQueue) {
        if event.generation() != self.store.generation() || !self.store.is_authenticated() {
            debug!(?event, current = self.store.generation(), "ignoring stale timer event");
            return;
        }
        match event {
            TimerEvent::Expired { .. } => {
                warn!("session expired");
                self.end_session(Notice::SessionExpired).await;
            }
            TimerEvent::Warning { generation } => self.handle_warning(generation, events).await,
        }
    }

    async fn handle_warning(&self, generation: u64, events: &mut EventQueue) {
        self.set_state(SessionState::Warning);
        debug!(window_ms = self.dialog_window.as_millis() as u64, "presenting expiry warning");

        let mut identity = self.store.subscribe();
        let closed = tokio::select! {
            choice = self.presenter.present_warning(self.dialog_window) => DialogClose::Answered(choice),
            _ = tokio::time::sleep(self.dialog_window) => DialogClose::Failsafe,
            closed = events.wait_for_session_end(generation) => closed,
            Ok(()) = identity.changed() => DialogClose::SessionChanged,
        };

        // An answer given to a dialog that outlived its session does not
        // apply to the session that replaced it.
        let closed = if self.store.generation() != generation {
            DialogClose::SessionChanged
        } else {
            closed
        };

        match closed {
            DialogClose::Answered(WarningChoice::Continue) => {
                if self.coordinator.refresh().await.is_success() {
                    self.set_state(SessionState::Active);
                    self.presenter.notify(Notice::SessionContinued);
                } else {
                    // The coordinator already tore the session down.
                    self.presenter.notify(Notice::SessionNotContinued);
                    self.set_state(SessionState::Anonymous);
                }
            }
            DialogClose::Answered(WarningChoice::Logout) => {
                self.end_session(Notice::LoggedOut).await;
            }
            DialogClose::Answered(WarningChoice::Timeout) | DialogClose::Failsafe => {
                info!("expiry warning timed out");
                self.end_session(Notice::SessionExpired).await;
            }
            DialogClose::Expired => {
                warn!("session expired while warning was shown");
                self.end_session(Notice::SessionExpired).await;
            }
            DialogClose::SessionChanged => {
                debug!("session replaced while warning was shown");
                self.sync_state();
                if *self.state.borrow() == SessionState::Warning {
                    self.set_state(SessionState::Active);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn adopt(&self, response: TokenResponse) -> SessionResult<Identity> {
        let access_token = response
            .access()
            .ok_or_else(|| SessionError::MalformedToken("response carried no access token".into()))?
            .to_string();
        let identity =
            Identity::from_tokens(access_token, response.refresh().map(str::to_string))?;
        self.store.set_identity(identity.clone());
        self.set_state(SessionState::Active);
        Ok(identity)
    }

    /// Clear the session locally, revoke the refresh token on a best effort
    /// basis, show `notice`, and only then publish `Anonymous`.
    async fn end_session(&self, notice: Notice) {
        let previous = self.store.current();
        self.store.clear_identity();

        if let Some(refresh_token) = previous.as_ref().and_then(|i| i.refresh_token.as_deref()) {
            if let Err(e) = self.api.logout(refresh_token).await {
                warn!(error = %e, "failed to revoke refresh token on logout");
            }
        }
        info!(?notice, "session ended");
        self.presenter.notify(notice);
        self.set_state(SessionState::Anonymous);
    }

    fn sync_state(&self) {
        if !self.store.is_authenticated() {
            self.set_state(SessionState::Anonymous);
        } else if *self.state.borrow() == SessionState::Anonymous {
            self.set_state(SessionState::Active);
        }
    }

    fn set_state(&self, next: SessionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            debug!(state = ?next, "session state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::clock::TokioClock;
    use crate::session::storage::MemoryStorage;
    use crate::testing::{FakeAuthApi, RefreshReply, paused_clock};

    /// Answers warnings from a script; `None` never answers.
    struct ScriptedPresenter {
        clock: Arc<TokioClock>,
        choices: StdMutex<VecDeque<Option<WarningChoice>>>,
        answer_delay: StdMutex<Duration>,
        shown: StdMutex<Vec<(i64, Duration)>>,
        notices: StdMutex<Vec<Notice>>,
    }

    impl ScriptedPresenter {
        fn new(clock: Arc<TokioClock>, choices: Vec<Option<WarningChoice>>) -> Self {
            Self {
                clock,
                choices: StdMutex::new(choices.into()),
                answer_delay: StdMutex::new(Duration::ZERO),
                shown: StdMutex::new(Vec::new()),
                notices: StdMutex::new(Vec::new()),
            }
        }

        fn answer_after(&self, delay: Duration) {
            *self.answer_delay.lock().unwrap() = delay;
        }

        fn shown(&self) -> Vec<(i64, Duration)> {
            self.shown.lock().unwrap().clone()
        }

        fn notices(&self) -> Vec<Notice> {
            self.notices.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionPresenter for ScriptedPresenter {
        async fn present_warning(&self, window: Duration) -> WarningChoice {
            self.shown
                .lock()
                .unwrap()
                .push((self.clock.elapsed_ms(), window));
            let next = self.choices.lock().unwrap().pop_front().flatten();
            let delay = *self.answer_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match next {
                Some(choice) => choice,
                None => std::future::pending().await,
            }
        }

        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }
    }

    struct Harness {
        controller: SessionController,
        api: Arc<FakeAuthApi>,
        presenter: Arc<ScriptedPresenter>,
        clock: Arc<TokioClock>,
    }

    fn harness_with(
        margin: Duration,
        choices: Vec<Option<WarningChoice>>,
        configure: impl FnOnce(&mut FakeAuthApi),
    ) -> Harness {
        let clock = paused_clock();
        let mut api = FakeAuthApi::new(clock.clone());
        configure(&mut api);
        let api = Arc::new(api);
        let presenter = Arc::new(ScriptedPresenter::new(clock.clone(), choices));
        let config = SessionConfig {
            warning_margin: margin,
            ..SessionConfig::default()
        };
        let controller = SessionController::new(
            &config,
            api.clone(),
            Arc::new(MemoryStorage::new()),
            clock.clone(),
            presenter.clone(),
        );
        Harness {
            controller,
            api,
            presenter,
            clock,
        }
    }

    fn harness(choices: Vec<Option<WarningChoice>>) -> Harness {
        harness_with(Duration::from_secs(30), choices, |_| {})
    }

    #[tokio::test(start_paused = true)]
    async fn continue_refreshes_and_rearms() {
        let h = harness(vec![Some(WarningChoice::Continue)]);
        let identity = h.controller.login("alice", "secret").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.controller.store().generation(), 1);

        let event = h.controller.process_next_event().await;
        assert_eq!(event, Some(TimerEvent::Warning { generation: 1 }));
        assert_eq!(h.presenter.shown(), vec![(3_570_000, Duration::from_secs(30))]);
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.api.refresh_calls(), 1);
        assert_eq!(h.presenter.notices(), vec![Notice::SessionContinued]);

        // The login token's expiry at T+3600 s was cancelled; the next event
        // is the refreshed token's warning at 3570 + 3600 - 30 s.
        let event = h.controller.process_next_event().await;
        assert_eq!(event, Some(TimerEvent::Warning { generation: 2 }));
        assert_eq!(h.clock.elapsed_ms(), 7_140_000);
        assert_eq!(h.presenter.shown().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_warning_hits_failsafe() {
        // 60 s margin with a 30 s dialog: the failsafe fires before expiry.
        let h = harness_with(Duration::from_secs(60), vec![None], |_| {});
        h.controller.login("alice", "secret").await.unwrap();
        assert_eq!(h.controller.dialog_window(), Duration::from_secs(30));

        h.controller.process_next_event().await;
        assert_eq!(h.presenter.shown(), vec![(3_540_000, Duration::from_secs(30))]);
        assert_eq!(h.clock.elapsed_ms(), 3_570_000);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert!(h.controller.store().current().is_none());
        assert_eq!(h.presenter.notices(), vec![Notice::SessionExpired]);
        assert_eq!(h.api.logout_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_warning_ends_at_expiry() {
        let h = harness(vec![None]);
        h.controller.login("alice", "secret").await.unwrap();

        h.controller.process_next_event().await;
        assert_eq!(h.clock.elapsed_ms(), 3_600_000);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert_eq!(h.presenter.notices(), vec![Notice::SessionExpired]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_during_warning_rearms_for_new_token() {
        let h = harness(vec![None, None]);
        h.controller.login("alice", "secret").await.unwrap();

        // Another caller refreshes 1 ms into the dialog and gets a token
        // that is already inside the warning margin.
        let refresh_elsewhere = async {
            tokio::time::sleep(Duration::from_millis(3_570_001)).await;
            h.api.set_lifetime_secs(20);
            h.controller.coordinator().refresh().await
        };
        let (event, outcome) = tokio::join!(h.controller.process_next_event(), refresh_elsewhere);
        assert_eq!(event, Some(TimerEvent::Warning { generation: 1 }));
        assert_eq!(outcome, RefreshOutcome::Success);
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.controller.store().generation(), 2);
        assert!(h.presenter.notices().is_empty());

        // The new token's warning is due at once and its expiry still ends
        // the session.
        let event = h.controller.process_next_event().await;
        assert_eq!(event, Some(TimerEvent::Warning { generation: 2 }));
        assert_eq!(h.presenter.shown().len(), 2);
        assert_eq!(h.clock.elapsed_ms(), 3_590_000);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert!(h.controller.store().current().is_none());
        assert_eq!(h.presenter.notices(), vec![Notice::SessionExpired]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_logout_answer_spares_new_session() {
        let h = harness(vec![Some(WarningChoice::Logout)]);
        h.presenter.answer_after(Duration::from_secs(10));
        h.controller.login("alice", "secret").await.unwrap();

        let login_again = async {
            tokio::time::sleep(Duration::from_millis(3_575_000)).await;
            h.controller.login("alice", "secret").await
        };
        let (event, relogin) = tokio::join!(h.controller.process_next_event(), login_again);
        assert_eq!(event, Some(TimerEvent::Warning { generation: 1 }));
        let identity = relogin.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.controller.store().current(), Some(identity));
        assert_eq!(h.controller.store().generation(), 2);
        assert_eq!(h.api.logout_calls(), 0);
        assert!(h.presenter.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_after_revoke_and_notice() {
        let h = harness_with(Duration::from_secs(30), vec![None], |api| {
            api.logout_delay = Duration::from_millis(50);
        });
        h.controller.login("alice", "secret").await.unwrap();
        let mut states = h.controller.subscribe_state();

        // Whichever side finishes first, the revoke and notice are done.
        tokio::select! {
            _ = h.controller.run() => {}
            _ = states.wait_for(|s| *s == SessionState::Anonymous) => {}
        }
        assert_eq!(h.clock.elapsed_ms(), 3_600_050);
        assert_eq!(h.api.logout_calls(), 1);
        assert_eq!(h.presenter.notices(), vec![Notice::SessionExpired]);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn choosing_logout_ends_session() {
        let h = harness(vec![Some(WarningChoice::Logout)]);
        h.controller.login("alice", "secret").await.unwrap();

        h.controller.process_next_event().await;
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert_eq!(h.presenter.notices(), vec![Notice::LoggedOut]);
        assert_eq!(h.api.refresh_calls(), 0);
        assert_eq!(h.api.logout_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_continue_forces_logout() {
        let h = harness(vec![Some(WarningChoice::Continue)]);
        h.controller.login("alice", "secret").await.unwrap();
        h.api.set_refresh_reply(RefreshReply::Rejected);

        h.controller.process_next_event().await;
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert!(h.controller.store().current().is_none());
        assert!(!h.controller.store().timers_armed());
        assert_eq!(h.presenter.notices(), vec![Notice::SessionNotContinued]);
        tokio::task::yield_now().await;
        assert_eq!(h.api.logout_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_at_login_ends_session() {
        let h = harness(vec![]);
        h.api.set_lifetime_secs(-10);
        h.controller.login("alice", "secret").await.unwrap();

        h.controller.settle().await;
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert_eq!(h.presenter.notices(), vec![Notice::SessionExpired]);
        assert!(h.presenter.shown().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_event_from_replaced_session_is_ignored() {
        let h = harness(vec![]);
        h.api.set_lifetime_secs(-10);
        h.controller.login("alice", "secret").await.unwrap();
        h.api.set_lifetime_secs(3600);
        h.controller.login("alice", "secret").await.unwrap();

        let event = h.controller.process_next_event().await;
        assert_eq!(event, Some(TimerEvent::Expired { generation: 1 }));
        assert_eq!(h.controller.state(), SessionState::Active);
        assert!(h.controller.store().current().is_some());
        assert!(h.presenter.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_while_anonymous_skips_network() {
        let h = harness(vec![]);
        h.controller.logout().await;
        assert_eq!(h.api.logout_calls(), 0);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert!(h.presenter.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_swallows_revoke_failure() {
        let h = harness_with(Duration::from_secs(30), vec![], |api| api.fail_logout = true);
        h.controller.login("alice", "secret").await.unwrap();

        h.controller.logout().await;
        assert_eq!(h.api.logout_calls(), 1);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
        assert!(h.controller.store().current().is_none());
        assert_eq!(h.presenter.notices(), vec![Notice::LoggedOut]);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_credentials_leave_state_unchanged() {
        let h = harness(vec![]);
        let err = h.controller.login("alice", "nope").await.unwrap_err();
        assert_eq!(err.user_message(), "Wrong password entered");
        assert_eq!(h.controller.state(), SessionState::Anonymous);

        let identity = h.controller.login("alice", "secret").await.unwrap();
        assert!(h.controller.login("alice", "nope").await.is_err());
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.controller.store().current(), Some(identity));
    }

    #[tokio::test(start_paused = true)]
    async fn state_signal_follows_transitions() {
        let h = harness(vec![]);
        let mut states = h.controller.subscribe_state();
        h.controller.login("alice", "secret").await.unwrap();
        assert_eq!(*states.borrow_and_update(), SessionState::Active);
        h.controller.logout().await;
        assert_eq!(*states.borrow_and_update(), SessionState::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn change_password_requires_session() {
        let h = harness(vec![]);
        let err = h.controller.change_password("old", "new").await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));

        h.controller.login("alice", "secret").await.unwrap();
        let before = h.controller.store().generation();
        let identity = h.controller.change_password("old", "new").await.unwrap();
        assert_eq!(identity.refresh_token.as_deref(), Some("refresh-999"));
        assert!(h.controller.store().generation() > before);
    }

    #[tokio::test(start_paused = true)]
    async fn signup_does_not_touch_session() {
        let h = harness(vec![]);
        let identity = h.controller.login("alice", "secret").await.unwrap();
        let generation = h.controller.store().generation();

        let registration = Registration {
            username: "bob".into(),
            name: "Bob Builder".into(),
            email: "bob@example.com".into(),
            password: "Passw0rd!".into(),
        };
        let message = h.controller.signup(&registration).await.unwrap();
        assert_eq!(message, "Registration successful. Please confirm your email.");

        let taken = Registration {
            username: "alice".into(),
            ..registration
        };
        let err = h.controller.signup(&taken).await.unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["This username is already taken. Please choose another."]
        );

        assert_eq!(
            h.controller.confirm_email("2", "good").await.unwrap(),
            "Email confirmed. You can now log in."
        );
        let err = h.controller.confirm_email("2", "stale").await.unwrap_err();
        assert_eq!(err.messages(), vec!["Invalid confirmation token"]);

        assert_eq!(h.controller.store().current(), Some(identity));
        assert_eq!(h.controller.store().generation(), generation);
        assert_eq!(h.controller.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_refresh_tracks_state() {
        let h = harness(vec![]);
        assert_eq!(h.controller.refresh().await, RefreshOutcome::Failure);
        assert_eq!(h.api.refresh_calls(), 0);

        h.controller.login("alice", "secret").await.unwrap();
        assert_eq!(h.controller.refresh().await, RefreshOutcome::Success);
        assert_eq!(h.controller.state(), SessionState::Active);

        h.api.set_refresh_reply(RefreshReply::MissingAccessToken);
        assert_eq!(h.controller.refresh().await, RefreshOutcome::Failure);
        assert_eq!(h.controller.state(), SessionState::Anonymous);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_resumes_persisted_session() {
        let clock = paused_clock();
        let storage = Arc::new(MemoryStorage::new());
        let config = SessionConfig::default();
        let build = |presenter: Arc<ScriptedPresenter>| {
            SessionController::new(
                &config,
                Arc::new(FakeAuthApi::new(clock.clone())),
                storage.clone(),
                clock.clone(),
                presenter,
            )
        };

        let first = build(Arc::new(ScriptedPresenter::new(clock.clone(), vec![])));
        let identity = first.login("alice", "secret").await.unwrap();

        let second = build(Arc::new(ScriptedPresenter::new(clock.clone(), vec![])));
        assert_eq!(second.state(), SessionState::Anonymous);
        assert_eq!(second.restore(), Some(identity));
        assert_eq!(second.state(), SessionState::Active);
        assert!(second.store().timers_armed());
    }

    #[test]
    fn notices_carry_console_messages() {
        assert_eq!(
            Notice::SessionExpired.message(),
            "Session expired. Redirecting to login..."
        );
        assert_eq!(
            Notice::SessionNotContinued.message(),
            "Session could not be continued. Logging out..."
        );
    }
}
