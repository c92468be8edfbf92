//! Consumer-facing session façade.
//!
//! A [`SessionController`] turns user intents into tracker calls and
//! multiplexes everything the tracker reports into one ordered stream of
//! [`SessionEvent`]s, so a consumer needs exactly one subscription.

use crate::tracker::{TrackerEvent, TrackingFailure, TrackingService};
use crate::types::{AuthorizationState, TrackedPoint};
use serde::Serialize;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Everything a consumer needs to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    TrailLoaded { points: Vec<TrackedPoint> },
    TrackingStatusChanged { is_tracking: bool },
    PointAccepted { point: TrackedPoint },
    AuthorizationChanged { state: AuthorizationState },
    ConfirmationRequired { prompt: ResetPrompt },
    ErrorOccurred { error: TrackingFailure, message: String },
}

impl From<TrackerEvent> for SessionEvent {
    fn from(event: TrackerEvent) -> Self {
        match event {
            TrackerEvent::StatusChanged(is_tracking) => Self::TrackingStatusChanged { is_tracking },
            TrackerEvent::PointAccepted(point) => Self::PointAccepted { point },
            TrackerEvent::AuthorizationChanged(state) => Self::AuthorizationChanged { state },
            TrackerEvent::Failed(error) => Self::error(error),
        }
    }
}

impl SessionEvent {
    fn error(error: TrackingFailure) -> Self {
        Self::ErrorOccurred {
            message: error.to_string(),
            error,
        }
    }
}

/// A named action offered by a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptAction {
    pub label: String,
    pub choice: PromptChoice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptChoice {
    Confirm,
    Cancel,
}

/// Confirmation shown before the trail is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetPrompt {
    pub title: String,
    pub message: String,
    pub confirm: PromptAction,
    pub cancel: PromptAction,
}

impl Default for ResetPrompt {
    fn default() -> Self {
        Self {
            title: "Reset trail".to_string(),
            message: "All of your location history will be deleted. Do you want to continue?"
                .to_string(),
            confirm: PromptAction {
                label: "Delete".to_string(),
                choice: PromptChoice::Confirm,
            },
            cancel: PromptAction {
                label: "Cancel".to_string(),
                choice: PromptChoice::Cancel,
            },
        }
    }
}

/// Single point of interaction for a consumer.
pub struct SessionController {
    tracker: Arc<TrackingService>,
    mux: Arc<Mutex<EventMux>>,
    pending_reset: AtomicBool,
}

impl SessionController {
    /// Create a controller and the stream its events are delivered on.
    ///
    /// Must be called within a Tokio runtime: tracker events are forwarded
    /// by a background task. The stream ends once both the controller and
    /// the tracker are dropped.
    pub fn new(tracker: Arc<TrackingService>) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mux = Arc::new(Mutex::new(EventMux {
            tracker_rx: tracker.subscribe(),
            tx,
        }));
        // Subscribed after the mux, so every wakeup has its event buffered.
        let wakeups = tracker.subscribe();
        tokio::spawn(forward_tracker_events(wakeups, Arc::clone(&mux)));

        let controller = Self {
            tracker,
            mux,
            pending_reset: AtomicBool::new(false),
        };
        (controller, rx)
    }

    pub fn tracker(&self) -> &Arc<TrackingService> {
        &self.tracker
    }

    /// Start if stopped, stop if started. Returns the new tracking state.
    pub fn toggle_tracking(&self) -> bool {
        if self.tracker.is_tracking() {
            self.tracker.stop();
        } else {
            self.tracker.start();
        }
        self.tracker.is_tracking()
    }

    /// Publish the stored trail.
    pub async fn load_trail(&self) {
        match self.tracker.get_trail().await {
            Ok(points) => {
                tracing::debug!("Loaded trail with {} points", points.len());
                self.emit(SessionEvent::TrailLoaded { points });
            }
            Err(e) => {
                tracing::error!("Failed to load trail: {}", e);
                self.emit(SessionEvent::error(TrackingFailure::PersistenceFailed(
                    format!("could not read trail: {}", e),
                )));
            }
        }
    }

    /// Ask the consumer to confirm deleting the trail.
    pub fn request_reset(&self) {
        self.pending_reset.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::ConfirmationRequired {
            prompt: ResetPrompt::default(),
        });
    }

    /// Answer the most recent reset prompt.
    pub async fn respond_to_reset(&self, choice: PromptChoice) {
        if !self.pending_reset.swap(false, Ordering::SeqCst) {
            tracing::debug!("Ignoring reset response without a pending prompt");
            return;
        }

        match choice {
            PromptChoice::Cancel => tracing::debug!("Trail reset cancelled"),
            PromptChoice::Confirm => match self.tracker.reset_trail().await {
                Ok(()) => self.load_trail().await,
                Err(e) => {
                    tracing::error!("Failed to reset trail: {}", e);
                    self.emit(SessionEvent::error(e.into()));
                }
            },
        }
    }

    /// Publish the current authorization state.
    pub fn refresh_authorization(&self) {
        let state = self.tracker.authorization();
        self.emit(SessionEvent::AuthorizationChanged { state });
    }

    /// Ask the location source for permission. The answer arrives as an
    /// `AuthorizationChanged` event.
    pub fn request_permission(&self) {
        self.tracker.request_authorization();
    }

    fn emit(&self, event: SessionEvent) {
        let mut mux = self.mux.lock();
        mux.flush();
        let _ = mux.tx.send(event);
    }
}

/// The session stream plus the tracker events not yet copied into it.
///
/// Both the controller and the forwarder write under one lock, and always
/// flush buffered tracker events first, so the stream keeps the order in
/// which events were produced.
struct EventMux {
    tracker_rx: broadcast::Receiver<TrackerEvent>,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventMux {
    /// Forward every buffered tracker event. Returns false once the tracker
    /// has gone away.
    fn flush(&mut self) -> bool {
        loop {
            match self.tracker_rx.try_recv() {
                Ok(event) => {
                    let _ = self.tx.send(event.into());
                }
                Err(broadcast::error::TryRecvError::Empty) => return true,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!("Session fell behind, {} tracker events dropped", skipped);
                }
                Err(broadcast::error::TryRecvError::Closed) => return false,
            }
        }
    }
}

async fn forward_tracker_events(
    mut wakeups: broadcast::Receiver<TrackerEvent>,
    mux: Arc<Mutex<EventMux>>,
) {
    loop {
        match wakeups.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                if !mux.lock().flush() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                mux.lock().flush();
                break;
            }
        }
    }
}
