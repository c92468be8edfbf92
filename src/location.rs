//! Location source abstraction and a push-driven implementation.

use crate::types::{AuthorizationState, Fix};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Events emitted by a location source.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Fix(Fix),
    Failure(String),
    AuthorizationChanged(AuthorizationState),
}

/// A positioning capability.
///
/// Subscribers receive every event on their channel until the source is
/// closed or the receiver is dropped.
pub trait LocationSource: Send + Sync {
    fn subscribe(&self, events: mpsc::UnboundedSender<LocationEvent>);
    fn start(&self);
    fn stop(&self);
    fn current_authorization(&self) -> AuthorizationState;
    fn request_authorization(&self);
}

/// Location source fed by the caller.
///
/// Fixes pushed while the source is stopped are dropped, the same way a
/// device stops reporting once updates are turned off.
pub struct FeedSource {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<LocationEvent>>>,
    active: AtomicBool,
    authorization: RwLock<AuthorizationState>,
    grant_on_request: AuthorizationState,
}

impl FeedSource {
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
            authorization: RwLock::new(authorization),
            grant_on_request: AuthorizationState::Granted,
        }
    }

    /// State adopted when authorization is requested while undetermined.
    pub fn with_grant_on_request(mut self, state: AuthorizationState) -> Self {
        self.grant_on_request = state;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Deliver a fix. Returns false if the source is stopped.
    pub fn push_fix(&self, fix: Fix) -> bool {
        if !self.is_active() {
            tracing::trace!("Dropping fix while stopped");
            return false;
        }
        self.broadcast(LocationEvent::Fix(fix));
        true
    }

    /// Report a fix acquisition failure.
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.broadcast(LocationEvent::Failure(reason.into()));
    }

    /// Change the authorization state and notify subscribers.
    pub fn set_authorization(&self, state: AuthorizationState) {
        {
            let mut current = self.authorization.write();
            if *current == state {
                return;
            }
            *current = state;
        }
        self.broadcast(LocationEvent::AuthorizationChanged(state));
    }

    /// Drop all subscribers, ending their event streams.
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }

    fn broadcast(&self, event: LocationEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for FeedSource {
    fn default() -> Self {
        Self::new(AuthorizationState::Granted)
    }
}

impl LocationSource for FeedSource {
    fn subscribe(&self, events: mpsc::UnboundedSender<LocationEvent>) {
        self.subscribers.lock().push(events);
    }

    fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn current_authorization(&self) -> AuthorizationState {
        *self.authorization.read()
    }

    fn request_authorization(&self) {
        if self.current_authorization() == AuthorizationState::Undetermined {
            self.set_authorization(self.grant_on_request);
        }
    }
}
