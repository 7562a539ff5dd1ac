use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

use parley_types::models::Recruiter;
use parley_types::session::{GUEST_ID_PREFIX, SessionMode};

/// Session as reported by the hosted auth provider.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub recruiter: Recruiter,
    pub expires_at: DateTime<Utc>,
}

/// All failures are recoverable by prompting re-sign-in; none are fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session expired")]
    Expired,
    #[error("sign-in canceled")]
    SignInCanceled,
    #[error("network error")]
    Network,
    #[error("unknown session error")]
    Unknown,
}

/// Notifications fanned out to dependent stores, e.g. the conversation
/// store resets itself when guest mode flips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    GuestModeEnabled,
    GuestModeDisabled,
}

/// Seam over the hosted auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current session, if any. `None` means signed out, not an error.
    async fn fetch_session(&self) -> Result<Option<AuthSession>, SessionError>;
    /// One refresh attempt for an expired session.
    async fn refresh_session(&self) -> Result<AuthSession, SessionError>;
    async fn sign_in(&self, provider: &str) -> Result<AuthSession, SessionError>;
    async fn sign_out(&self) -> Result<(), SessionError>;
}

pub struct SessionStore<P: AuthProvider> {
    provider: P,
    mode: RwLock<SessionMode>,
    events: broadcast::Sender<SessionEvent>,
}

impl<P: AuthProvider> SessionStore<P> {
    pub fn new(provider: P) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            provider,
            mode: RwLock::new(SessionMode::Unauthenticated),
            events,
        }
    }

    pub async fn mode(&self) -> SessionMode {
        self.mode.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Poll the auth provider and reconcile local state. An expired
    /// session gets exactly one refresh attempt; if that fails we drop to
    /// unauthenticated and surface `Expired`.
    pub async fn check_session(&self) -> Result<SessionMode, SessionError> {
        // Guest mode is a local-only override; the provider has no say.
        if self.mode.read().await.is_guest() {
            return Ok(self.mode().await);
        }

        let session = match self.provider.fetch_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                *self.mode.write().await = SessionMode::Unauthenticated;
                return Ok(SessionMode::Unauthenticated);
            }
            Err(e) => {
                warn!("session check failed: {}", e);
                return Err(e);
            }
        };

        let session = if session.expires_at <= Utc::now() {
            debug!("session expired, attempting refresh");
            match self.provider.refresh_session().await {
                Ok(refreshed) => refreshed,
                Err(_) => {
                    *self.mode.write().await = SessionMode::Unauthenticated;
                    return Err(SessionError::Expired);
                }
            }
        } else {
            session
        };

        let mode = SessionMode::Authenticated { recruiter: session.recruiter };
        *self.mode.write().await = mode.clone();
        Ok(mode)
    }

    pub async fn sign_in(&self, provider_name: &str) -> Result<SessionMode, SessionError> {
        let session = self.provider.sign_in(provider_name).await?;
        let mode = SessionMode::Authenticated { recruiter: session.recruiter };
        *self.mode.write().await = mode.clone();
        let _ = self.events.send(SessionEvent::SignedIn);
        Ok(mode)
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        if let Err(e) = self.provider.sign_out().await {
            warn!("provider sign-out failed: {}", e);
        }
        *self.mode.write().await = SessionMode::Unauthenticated;
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    /// Local-only demo override: fabricates a synthetic identity and never
    /// touches the provider or the database.
    pub async fn enable_guest_mode(&self) -> SessionMode {
        let mode = SessionMode::Guest {
            ephemeral_id: format!("{}{}", GUEST_ID_PREFIX, Utc::now().timestamp_millis()),
        };
        *self.mode.write().await = mode.clone();
        let _ = self.events.send(SessionEvent::GuestModeEnabled);
        mode
    }

    pub async fn disable_guest_mode(&self) {
        let mut mode = self.mode.write().await;
        if mode.is_guest() {
            *mode = SessionMode::Unauthenticated;
            drop(mode);
            let _ = self.events.send(SessionEvent::GuestModeDisabled);
        }
    }
}

/// Re-check the session on a fixed interval (the widget does this every
/// five minutes). Runs until the store is dropped by the caller.
pub async fn run_session_poll<P: AuthProvider>(
    store: std::sync::Arc<SessionStore<P>>,
    period: std::time::Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if let Err(e) = store.check_session().await {
            warn!("periodic session check failed: {}", e);
        }
    }
}
