//! Session gate.
//!
//! A background task that re-checks the stored session on a fixed interval
//! and publishes the result on a `watch` channel. Routing code reads the
//! latest [`GateSnapshot`] and makes no decision until the first check has
//! completed.
//!
//! With `listen_events` enabled the gate also re-checks as soon as the
//! [`SessionManager`] reports a login or logout; polling stays on to pick up
//! changes made by other processes.
//!
//! The task stops when the gate is shut down or dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{AuthEvent, SessionManager};
use crate::config::GateConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No check has completed yet
    Unverified,
    Authenticated,
    Unauthenticated,
}

/// Latest gate output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub state: GateState,
    /// At least one check has completed
    pub auth_checked: bool,
    /// Number of checks run so far
    pub checks: u64,
}

impl GateSnapshot {
    const INITIAL: GateSnapshot = GateSnapshot {
        state: GateState::Unverified,
        auth_checked: false,
        checks: 0,
    };

    pub fn is_authenticated(&self) -> bool {
        self.state == GateState::Authenticated
    }
}

/// Top-level route groups the presentation layer navigates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    Login,
    Tabs,
    Other,
}

/// Where to redirect from `current`, if anywhere.
///
/// Signed-in users are sent from the login screen to the tabs, signed-out
/// users from the tabs to login. Nothing moves before the first check.
pub fn redirect_for(snapshot: &GateSnapshot, current: RouteGroup) -> Option<RouteGroup> {
    if !snapshot.auth_checked {
        return None;
    }
    match (snapshot.is_authenticated(), current) {
        (true, RouteGroup::Login) => Some(RouteGroup::Tabs),
        (false, RouteGroup::Tabs) => Some(RouteGroup::Login),
        _ => None,
    }
}

/// Handle to the running gate task.
pub struct SessionGate {
    snapshot: watch::Receiver<GateSnapshot>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionGate {
    /// Start the gate. The first check runs one interval after start.
    pub fn spawn(session: Arc<SessionManager>, config: &GateConfig) -> Self {
        let (tx, rx) = watch::channel(GateSnapshot::INITIAL);
        let cancel = CancellationToken::new();
        let events = config.listen_events.then(|| session.subscribe());
        let period = config.interval();

        info!(
            interval_ms = period.as_millis() as u64,
            listen_events = config.listen_events,
            "Starting session gate"
        );

        let handle = tokio::spawn(run_gate(session, tx, period, events, cancel.clone()));

        Self {
            snapshot: rx,
            cancel,
            handle: Some(handle),
        }
    }

    /// Latest published state.
    pub fn snapshot(&self) -> GateSnapshot {
        *self.snapshot.borrow()
    }

    /// Receiver notified after every check.
    pub fn subscribe(&self) -> watch::Receiver<GateSnapshot> {
        self.snapshot.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        debug!("Session gate stopped");
    }
}

impl Drop for SessionGate {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_gate(
    session: Arc<SessionManager>,
    tx: watch::Sender<GateSnapshot>,
    period: Duration,
    mut events: Option<broadcast::Receiver<AuthEvent>>,
    cancel: CancellationToken,
) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => check(&session, &tx).await,
            event = next_event(&mut events) => match event {
                Ok(event) => {
                    debug!(?event, "Auth event received, re-checking session");
                    check(&session, &tx).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Auth events lagged, re-checking session");
                    check(&session, &tx).await;
                }
                Err(broadcast::error::RecvError::Closed) => events = None,
            },
        }
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<AuthEvent>>,
) -> Result<AuthEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn check(session: &SessionManager, tx: &watch::Sender<GateSnapshot>) {
    let state = if session.is_authenticated().await {
        GateState::Authenticated
    } else {
        GateState::Unauthenticated
    };

    tx.send_modify(|snapshot| {
        if snapshot.state != state {
            info!(from = ?snapshot.state, to = ?state, "Session gate state changed");
        }
        snapshot.state = state;
        snapshot.auth_checked = true;
        snapshot.checks += 1;
    });
    debug!(?state, "Session checked");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::mock::MockTransport;
    use crate::api::Method;
    use crate::session::test_support::*;
    use crate::store::credentials::test_support::FlakyStore;
    use crate::store::MemoryStore;
    use serde_json::json;

    const WAIT: Duration = Duration::from_secs(2);

    fn polling_only(interval_ms: u64) -> GateConfig {
        GateConfig {
            interval_ms,
            listen_events: false,
        }
    }

    async fn wait_until(
        rx: &mut watch::Receiver<GateSnapshot>,
        f: impl FnMut(&GateSnapshot) -> bool,
    ) -> GateSnapshot {
        let snapshot = tokio::time::timeout(WAIT, rx.wait_for(f))
            .await
            .expect("gate did not reach the expected state")
            .expect("gate stopped");
        *snapshot
    }

    #[tokio::test]
    async fn test_login_logout_cycle_by_polling() {
        let transport = Arc::new(MockTransport::new());
        script_login(&transport, "server-token");
        transport.respond_json(200, json!({"message": "Logged out"}));
        let session = Arc::new(session_with(transport.clone(), Arc::new(MemoryStore::new())));

        let gate = SessionGate::spawn(session.clone(), &polling_only(20));
        assert_eq!(gate.snapshot(), GateSnapshot::INITIAL);

        let mut rx = gate.subscribe();
        let first = wait_until(&mut rx, |s| s.auth_checked).await;
        assert_eq!(first.state, GateState::Unauthenticated);

        session.login("budi@example.com", "secret").await.unwrap();
        let signed_in = wait_until(&mut rx, |s| s.state == GateState::Authenticated).await;
        assert!(signed_in.auth_checked);

        session.logout().await.unwrap();
        wait_until(&mut rx, |s| s.state == GateState::Unauthenticated).await;
        session.settle().await;

        // Polling reads local storage only, so the backend sees just the two calls.
        let paths: Vec<(Method, String)> = transport
            .requests()
            .into_iter()
            .map(|r| (r.method, r.url))
            .collect();
        assert_eq!(
            paths,
            vec![
                (Method::Post, "http://backend.test/api/login".to_string()),
                (Method::Post, "http://backend.test/api/logout".to_string()),
            ]
        );

        gate.shutdown().await;
    }

    #[tokio::test]
    async fn test_event_triggers_check_before_next_tick() {
        let transport = Arc::new(MockTransport::new());
        script_login(&transport, "server-token");
        let session = Arc::new(session_with(transport, Arc::new(MemoryStore::new())));

        let config = GateConfig {
            interval_ms: 60_000,
            listen_events: true,
        };
        let gate = SessionGate::spawn(session.clone(), &config);
        let mut rx = gate.subscribe();

        session.login("budi@example.com", "secret").await.unwrap();

        let snapshot = wait_until(&mut rx, |s| s.auth_checked).await;
        assert_eq!(snapshot.state, GateState::Authenticated);
        assert_eq!(snapshot.checks, 1);

        gate.shutdown().await;
    }

    #[tokio::test]
    async fn test_every_tick_is_published() {
        let session = Arc::new(session_with(
            Arc::new(MockTransport::new()),
            Arc::new(MemoryStore::new()),
        ));
        let gate = SessionGate::spawn(session, &polling_only(10));
        let mut rx = gate.subscribe();

        let snapshot = wait_until(&mut rx, |s| s.checks >= 3).await;
        assert_eq!(snapshot.state, GateState::Unauthenticated);

        gate.shutdown().await;
    }

    #[tokio::test]
    async fn test_read_failure_is_unauthenticated() {
        let backend = Arc::new(FlakyStore::default());
        backend.fail_reads(true);
        let session = Arc::new(session_with(Arc::new(MockTransport::new()), backend));

        let gate = SessionGate::spawn(session, &polling_only(10));
        let mut rx = gate.subscribe();
        let snapshot = wait_until(&mut rx, |s| s.auth_checked).await;
        assert_eq!(snapshot.state, GateState::Unauthenticated);

        gate.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let session = Arc::new(session_with(
            Arc::new(MockTransport::new()),
            Arc::new(MemoryStore::new()),
        ));
        let gate = SessionGate::spawn(session, &polling_only(10));
        let mut rx = gate.subscribe();
        drop(gate);

        // The sender is dropped once the task exits.
        let stopped = tokio::time::timeout(WAIT, async {
            while rx.changed().await.is_ok() {}
        })
        .await;
        assert!(stopped.is_ok());
    }

    #[test]
    fn test_no_redirect_before_first_check() {
        let snapshot = GateSnapshot::INITIAL;
        assert_eq!(redirect_for(&snapshot, RouteGroup::Tabs), None);
        assert_eq!(redirect_for(&snapshot, RouteGroup::Login), None);
    }

    #[test]
    fn test_redirects() {
        let signed_in = GateSnapshot {
            state: GateState::Authenticated,
            auth_checked: true,
            checks: 1,
        };
        let signed_out = GateSnapshot {
            state: GateState::Unauthenticated,
            ..signed_in
        };

        assert_eq!(redirect_for(&signed_in, RouteGroup::Login), Some(RouteGroup::Tabs));
        assert_eq!(redirect_for(&signed_in, RouteGroup::Tabs), None);
        assert_eq!(redirect_for(&signed_out, RouteGroup::Tabs), Some(RouteGroup::Login));
        assert_eq!(redirect_for(&signed_out, RouteGroup::Login), None);
        assert_eq!(redirect_for(&signed_out, RouteGroup::Other), None);
    }
}
