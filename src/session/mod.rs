//! Sign-in state for the device.
//!
//! [`SessionManager`] owns login, logout and the "is a session valid" query.
//! Login and logout are also published as [`AuthEvent`]s so watchers such as
//! the [`SessionGate`] can react without waiting for their next poll.

pub mod gate;

pub use gate::{redirect_for, GateSnapshot, GateState, RouteGroup, SessionGate};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, ApiResult, LoginCredentials};
use crate::store::{Credential, CredentialStore, UserProfile};

const EVENT_CAPACITY: usize = 16;

/// Session changes made through this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn,
    LoggedOut,
}

pub struct SessionManager {
    client: Arc<ApiClient>,
    credentials: Arc<CredentialStore>,
    events: broadcast::Sender<AuthEvent>,
    pending_logout: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(client: Arc<ApiClient>) -> Self {
        let credentials = client.credentials().clone();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            credentials,
            events,
            pending_logout: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Receive login/logout notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Sign in and persist the session.
    ///
    /// The token and profile are stored together before this returns. Any
    /// failure, including a failed write, is reported as [`ApiError::Auth`].
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<UserProfile> {
        let credentials = LoginCredentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let grant = self.client.login(&credentials).await?;

        let credential = Credential {
            token: grant.token,
            user: grant.user,
        };
        self.credentials.save(&credential).await.map_err(|e| {
            ApiError::Auth(format!("Signed in, but the session could not be saved: {}", e))
        })?;

        info!(user_id = credential.user.id, "Signed in");
        self.publish(AuthEvent::LoggedIn);
        Ok(credential.user)
    }

    /// Whether a complete session is stored. Read failures count as signed out.
    pub async fn is_authenticated(&self) -> bool {
        match self.credentials.load().await {
            Ok(credential) => credential.is_some(),
            Err(e) => {
                debug!(error = %e, "Credential read failed, treating as signed out");
                false
            }
        }
    }

    /// Profile of the signed-in user, if any.
    pub async fn current_user(&self) -> Option<UserProfile> {
        match self.credentials.load().await {
            Ok(credential) => credential.map(|c| c.user),
            Err(e) => {
                debug!(error = %e, "Credential read failed");
                None
            }
        }
    }

    /// Sign out.
    ///
    /// Local credentials are cleared first. The server is then asked to
    /// invalidate the old token from a detached task; its outcome is only
    /// logged. An error is returned only if local storage could not be cleared.
    pub async fn logout(&self) -> ApiResult<()> {
        let previous = match self.credentials.load().await {
            Ok(credential) => credential,
            Err(e) => {
                debug!(error = %e, "Credential read failed before logout");
                None
            }
        };

        self.credentials.clear().await?;
        info!("Signed out");
        self.publish(AuthEvent::LoggedOut);

        if let Some(credential) = previous {
            let client = self.client.clone();
            let handle = tokio::spawn(async move {
                match client.invalidate_token(&credential.token).await {
                    Ok(()) => debug!("Server session invalidated"),
                    Err(e) => warn!(error = %e, "Server-side logout failed"),
                }
            });
            *self.pending_logout.lock() = Some(handle);
        }
        Ok(())
    }

    /// Wait for the last server-side logout call, if one is still running.
    ///
    /// Short-lived callers use this before exiting so the call is not cut off.
    pub async fn settle(&self) {
        let handle = self.pending_logout.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
