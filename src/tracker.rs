//! Tracking orchestrator: filters fixes, geocodes and persists accepted ones.

use crate::geo::{self, FilterDecision, DEFAULT_MIN_DISTANCE_M};
use crate::geocoder::{DisabledGeocoder, Geocoder};
use crate::location::{LocationEvent, LocationSource};
use crate::storage::{TrailStore, TrailStoreError};
use crate::types::{AuthorizationState, Coordinate, Fix, TrackedPoint, TrackingState};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}

/// Failures surfaced to consumers. None of them stop tracking.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum TrackingFailure {
    #[error("Fix acquisition failed: {0}")]
    FixAcquisitionFailed(String),
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),
}

impl From<TrailStoreError> for TrackingFailure {
    fn from(e: TrailStoreError) -> Self {
        Self::PersistenceFailed(e.to_string())
    }
}

/// Notifications published by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    StatusChanged(bool),
    PointAccepted(TrackedPoint),
    AuthorizationChanged(AuthorizationState),
    Failed(TrackingFailure),
}

/// What happened to a single fix.
#[derive(Debug, Clone, PartialEq)]
pub enum FixOutcome {
    Accepted(TrackedPoint),
    Discarded { distance_m: f64 },
    /// Tracking was off.
    Ignored,
    /// Coordinates out of range.
    Rejected,
}

/// Statistics for the tracker.
#[derive(Debug, Default)]
pub struct TrackerStats {
    pub fixes_received: AtomicU64,
    pub fixes_accepted: AtomicU64,
    pub fixes_discarded: AtomicU64,
    pub fixes_rejected: AtomicU64,
    pub acquisition_failures: AtomicU64,
    pub geocode_failures: AtomicU64,
    pub points_written: AtomicU64,
    pub persistence_failures: AtomicU64,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fixes_received: self.fixes_received.load(Ordering::Relaxed),
            fixes_accepted: self.fixes_accepted.load(Ordering::Relaxed),
            fixes_discarded: self.fixes_discarded.load(Ordering::Relaxed),
            fixes_rejected: self.fixes_rejected.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
            geocode_failures: self.geocode_failures.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub fixes_received: u64,
    pub fixes_accepted: u64,
    pub fixes_discarded: u64,
    pub fixes_rejected: u64,
    pub acquisition_failures: u64,
    pub geocode_failures: u64,
    pub points_written: u64,
    pub persistence_failures: u64,
}

/// Configuration for the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum distance in meters between accepted fixes
    pub min_distance_m: f64,
    /// Upper bound on a reverse geocoding lookup
    pub geocode_timeout: Duration,
    /// Capacity of the event channel per subscriber
    pub event_buffer_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
            geocode_timeout: Duration::from_secs(5),
            event_buffer_size: 1024,
        }
    }
}

/// Owns tracking state and is the only writer to the trail.
pub struct TrackingService {
    source: Arc<dyn LocationSource>,
    geocoder: Arc<dyn Geocoder>,
    store: Arc<dyn TrailStore>,
    config: TrackerConfig,
    tracking: AtomicBool,
    // Held across the whole accept-decide-persist sequence.
    last_accepted: Mutex<Option<TrackedPoint>>,
    events: broadcast::Sender<TrackerEvent>,
    stats: Arc<TrackerStats>,
}

impl TrackingService {
    pub fn new(
        source: Arc<dyn LocationSource>,
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn TrailStore>,
        config: TrackerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size.max(1));
        Self {
            source,
            geocoder,
            store,
            config,
            tracking: AtomicBool::new(false),
            last_accepted: Mutex::new(None),
            events,
            stats: Arc::new(TrackerStats::new()),
        }
    }

    pub fn builder() -> TrackingServiceBuilder {
        TrackingServiceBuilder::new()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Get a reference to the tracker stats.
    pub fn stats(&self) -> Arc<TrackerStats> {
        Arc::clone(&self.stats)
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Relaxed)
    }

    pub async fn state(&self) -> TrackingState {
        let last = self.last_accepted.lock().await;
        TrackingState {
            is_tracking: self.is_tracking(),
            last_accepted_fix: last.clone(),
        }
    }

    pub fn start(&self) {
        if self.tracking.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Tracking started");
        self.source.start();
        self.emit(TrackerEvent::StatusChanged(true));
    }

    pub fn stop(&self) {
        if !self.tracking.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Tracking stopped");
        self.source.stop();
        self.emit(TrackerEvent::StatusChanged(false));
    }

    pub fn authorization(&self) -> AuthorizationState {
        self.source.current_authorization()
    }

    pub fn request_authorization(&self) {
        self.source.request_authorization();
    }

    /// Run a raw fix through the distance filter and record it if accepted.
    pub async fn on_fix_received(&self, fix: Fix) -> FixOutcome {
        self.stats.fixes_received.fetch_add(1, Ordering::Relaxed);

        if !self.is_tracking() {
            tracing::trace!("Ignoring fix while stopped");
            return FixOutcome::Ignored;
        }

        if !fix.coordinate.is_valid() {
            tracing::warn!("Rejecting fix with invalid coordinate: {:?}", fix.coordinate);
            self.stats.fixes_rejected.fetch_add(1, Ordering::Relaxed);
            self.emit(TrackerEvent::Failed(TrackingFailure::FixAcquisitionFailed(
                format!(
                    "invalid coordinate {}, {}",
                    fix.coordinate.latitude, fix.coordinate.longitude
                ),
            )));
            return FixOutcome::Rejected;
        }

        let mut last = self.last_accepted.lock().await;

        let decision = geo::evaluate(
            fix.coordinate,
            last.as_ref().map(TrackedPoint::coordinate),
            self.config.min_distance_m,
        );

        if let FilterDecision::TooClose { distance_m } = decision {
            tracing::debug!(
                "Discarded fix at {} ({:.1} m < {} m)",
                fix.coordinate,
                distance_m,
                self.config.min_distance_m
            );
            self.stats.fixes_discarded.fetch_add(1, Ordering::Relaxed);
            return FixOutcome::Discarded { distance_m };
        }

        let address = self.resolve_address(fix.coordinate).await;
        let captured_at_ms = match last.as_ref() {
            Some(prev) => fix.timestamp_ms.max(prev.captured_at_ms),
            None => fix.timestamp_ms,
        };
        let point = TrackedPoint::new(fix.coordinate, captured_at_ms, address);

        // Filter state advances even if the write below fails.
        *last = Some(point.clone());
        self.stats.fixes_accepted.fetch_add(1, Ordering::Relaxed);

        match self.store.append(&point).await {
            Ok(()) => {
                self.stats.points_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("Failed to persist point at {}: {}", fix.coordinate, e);
                self.stats
                    .persistence_failures
                    .fetch_add(1, Ordering::Relaxed);
                self.emit(TrackerEvent::Failed(e.into()));
            }
        }

        tracing::debug!("Accepted fix at {} ({:?})", fix.coordinate, decision);
        self.emit(TrackerEvent::PointAccepted(point.clone()));
        FixOutcome::Accepted(point)
    }

    async fn resolve_address(&self, coordinate: Coordinate) -> Option<String> {
        let lookup = self.geocoder.resolve(coordinate);
        match tokio::time::timeout(self.config.geocode_timeout, lookup).await {
            Ok(Ok(address)) => address,
            Ok(Err(e)) => {
                tracing::warn!("Reverse geocoding failed for {}: {}", coordinate, e);
                self.stats.geocode_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "Reverse geocoding timed out after {:?} for {}",
                    self.config.geocode_timeout,
                    coordinate
                );
                self.stats.geocode_failures.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Report a failure from the location source.
    pub fn on_fix_failed(&self, reason: String) {
        tracing::warn!("Location source failure: {}", reason);
        self.stats
            .acquisition_failures
            .fetch_add(1, Ordering::Relaxed);
        self.emit(TrackerEvent::Failed(TrackingFailure::FixAcquisitionFailed(
            reason,
        )));
    }

    pub fn on_authorization_changed(&self, state: AuthorizationState) {
        tracing::info!("Authorization changed to {}", state);
        self.emit(TrackerEvent::AuthorizationChanged(state));
    }

    /// Stored trail in chronological order.
    pub async fn get_trail(&self) -> Result<Vec<TrackedPoint>, TrailStoreError> {
        self.store.fetch_all().await
    }

    /// Delete the trail and forget the last accepted fix.
    ///
    /// Waits for any fix currently being processed.
    pub async fn reset_trail(&self) -> Result<(), TrailStoreError> {
        let mut last = self.last_accepted.lock().await;
        self.store.delete_all().await?;
        *last = None;
        tracing::info!("Trail reset");
        Ok(())
    }

    /// Subscribe to the location source and process its events until it
    /// closes.
    pub fn attach(self: &Arc<Self>) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.source.subscribe(tx);
        let tracker = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    LocationEvent::Fix(fix) => {
                        tracker.on_fix_received(fix).await;
                    }
                    LocationEvent::Failure(reason) => tracker.on_fix_failed(reason),
                    LocationEvent::AuthorizationChanged(state) => {
                        tracker.on_authorization_changed(state)
                    }
                }
            }
            tracing::debug!("Location source closed");
        })
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Builder for creating a TrackingService.
pub struct TrackingServiceBuilder {
    source: Option<Arc<dyn LocationSource>>,
    geocoder: Option<Arc<dyn Geocoder>>,
    store: Option<Arc<dyn TrailStore>>,
    config: TrackerConfig,
}

impl TrackingServiceBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            geocoder: None,
            store: None,
            config: TrackerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn store(mut self, store: Arc<dyn TrailStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn min_distance(mut self, meters: f64) -> Self {
        self.config.min_distance_m = meters;
        self
    }

    pub fn geocode_timeout(mut self, timeout: Duration) -> Self {
        self.config.geocode_timeout = timeout;
        self
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<TrackingService, TrackerError> {
        let source = self
            .source
            .ok_or(TrackerError::MissingComponent("location source"))?;
        let store = self
            .store
            .ok_or(TrackerError::MissingComponent("trail store"))?;
        let geocoder = self
            .geocoder
            .unwrap_or_else(|| Arc::new(DisabledGeocoder));

        Ok(TrackingService::new(source, geocoder, store, self.config))
    }
}

impl Default for TrackingServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_M;
    use crate::geocoder::GeocodeError;
    use crate::location::FeedSource;
    use crate::storage::MemoryTrailStore;
    use async_trait::async_trait;
    use std::io;

    const METERS_PER_DEG_LAT: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    fn fix_north_of(lat: f64, lon: f64, meters: f64, ts: u64) -> Fix {
        Fix::new(lat + meters / METERS_PER_DEG_LAT, lon, ts)
    }

    struct FixedGeocoder(&'static str);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn resolve(&self, _: Coordinate) -> Result<Option<String>, GeocodeError> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct FailingGeocoder;

    #[async_trait]
    impl Geocoder for FailingGeocoder {
        async fn resolve(&self, _: Coordinate) -> Result<Option<String>, GeocodeError> {
            Err(GeocodeError::InvalidResponse("boom".into()))
        }
    }

    struct SlowGeocoder(Duration);

    #[async_trait]
    impl Geocoder for SlowGeocoder {
        async fn resolve(&self, _: Coordinate) -> Result<Option<String>, GeocodeError> {
            tokio::time::sleep(self.0).await;
            Ok(Some("Late, Answer".into()))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl TrailStore for FailingStore {
        async fn append(&self, _: &TrackedPoint) -> Result<(), TrailStoreError> {
            Err(TrailStoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        async fn fetch_all(&self) -> Result<Vec<TrackedPoint>, TrailStoreError> {
            Ok(Vec::new())
        }

        async fn delete_all(&self) -> Result<(), TrailStoreError> {
            Ok(())
        }
    }

    fn tracker_with(
        geocoder: Arc<dyn Geocoder>,
        store: Arc<dyn TrailStore>,
    ) -> (Arc<TrackingService>, Arc<FeedSource>) {
        let source = Arc::new(FeedSource::default());
        let tracker = TrackingService::builder()
            .source(source.clone())
            .geocoder(geocoder)
            .store(store)
            .geocode_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        (Arc::new(tracker), source)
    }

    fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_distance_filter_scenario() {
        let store = Arc::new(MemoryTrailStore::new());
        let (tracker, _) = tracker_with(Arc::new(FixedGeocoder("Istanbul, Marmara")), store.clone());
        tracker.start();

        let a = Fix::new(41.0, 29.0, 1_000);
        let b = fix_north_of(41.0, 29.0, 40.0, 2_000);
        let c = fix_north_of(41.0, 29.0, 150.0, 3_000);

        assert!(matches!(tracker.on_fix_received(a).await, FixOutcome::Accepted(_)));
        match tracker.on_fix_received(b).await {
            FixOutcome::Discarded { distance_m } => assert!((distance_m - 40.0).abs() < 0.5),
            other => panic!("expected discard, got {:?}", other),
        }
        assert!(matches!(tracker.on_fix_received(c).await, FixOutcome::Accepted(_)));

        let trail = tracker.get_trail().await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].coordinate(), a.coordinate);
        assert_eq!(trail[1].coordinate(), c.coordinate);
        assert_eq!(trail[0].address.as_deref(), Some("Istanbul, Marmara"));

        let stats = tracker.stats().snapshot();
        assert_eq!(stats.fixes_accepted, 2);
        assert_eq!(stats.fixes_discarded, 1);
        assert_eq!(stats.points_written, 2);
    }

    #[tokio::test]
    async fn test_geocoder_failure_keeps_point() {
        let store = Arc::new(MemoryTrailStore::new());
        let (tracker, _) = tracker_with(Arc::new(FailingGeocoder), store.clone());
        tracker.start();

        let outcome = tracker.on_fix_received(Fix::new(41.0, 29.0, 1)).await;
        let FixOutcome::Accepted(point) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(point.address, None);
        assert_eq!(store.len(), 1);
        assert_eq!(tracker.stats().snapshot().geocode_failures, 1);
    }

    #[tokio::test]
    async fn test_slow_geocoder_times_out() {
        let store = Arc::new(MemoryTrailStore::new());
        let (tracker, _) = tracker_with(
            Arc::new(SlowGeocoder(Duration::from_secs(30))),
            store.clone(),
        );
        tracker.start();

        let outcome = tracker.on_fix_received(Fix::new(10.0, 10.0, 1)).await;
        assert!(matches!(outcome, FixOutcome::Accepted(ref p) if p.address.is_none()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_advances_filter() {
        let (tracker, _) = tracker_with(Arc::new(DisabledGeocoder), Arc::new(FailingStore));
        let mut rx = tracker.subscribe();
        tracker.start();

        let a = Fix::new(41.0, 29.0, 1);
        assert!(matches!(tracker.on_fix_received(a).await, FixOutcome::Accepted(_)));

        // Same spot again is filtered against the unpersisted point
        assert!(matches!(
            tracker.on_fix_received(a).await,
            FixOutcome::Discarded { .. }
        ));

        let events = drain(&mut rx);
        assert_eq!(events[0], TrackerEvent::StatusChanged(true));
        assert!(matches!(
            events[1],
            TrackerEvent::Failed(TrackingFailure::PersistenceFailed(_))
        ));
        assert!(matches!(events[2], TrackerEvent::PointAccepted(_)));
        assert_eq!(events.len(), 3);
        assert_eq!(tracker.stats().snapshot().persistence_failures, 1);
    }

    #[tokio::test]
    async fn test_reset_makes_next_fix_first() {
        let store = Arc::new(MemoryTrailStore::new());
        let (tracker, _) = tracker_with(Arc::new(DisabledGeocoder), store.clone());
        tracker.start();

        let a = Fix::new(41.0, 29.0, 1);
        tracker.on_fix_received(a).await;
        tracker.reset_trail().await.unwrap();

        assert!(tracker.get_trail().await.unwrap().is_empty());
        assert_eq!(tracker.state().await.last_accepted_fix, None);

        // Would be discarded if the filter still remembered `a`
        assert!(matches!(tracker.on_fix_received(a).await, FixOutcome::Accepted(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let (tracker, source) = tracker_with(Arc::new(DisabledGeocoder), Arc::new(MemoryTrailStore::new()));
        let mut rx = tracker.subscribe();

        tracker.start();
        tracker.start();
        assert!(tracker.is_tracking());
        assert!(source.is_active());

        tracker.stop();
        tracker.stop();
        assert!(!tracker.is_tracking());
        assert!(!source.is_active());

        assert_eq!(
            drain(&mut rx),
            vec![
                TrackerEvent::StatusChanged(true),
                TrackerEvent::StatusChanged(false)
            ]
        );
    }

    #[tokio::test]
    async fn test_fixes_ignored_while_stopped() {
        let store = Arc::new(MemoryTrailStore::new());
        let (tracker, _) = tracker_with(Arc::new(DisabledGeocoder), store.clone());

        assert_eq!(tracker.on_fix_received(Fix::new(1.0, 1.0, 1)).await, FixOutcome::Ignored);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_fix_rejected() {
        let (tracker, _) = tracker_with(Arc::new(DisabledGeocoder), Arc::new(MemoryTrailStore::new()));
        tracker.start();
        let mut rx = tracker.subscribe();

        let outcome = tracker.on_fix_received(Fix::new(95.0, 0.0, 1)).await;
        assert_eq!(outcome, FixOutcome::Rejected);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [TrackerEvent::Failed(TrackingFailure::FixAcquisitionFailed(_))]
        ));
        assert_eq!(tracker.state().await.last_accepted_fix, None);
    }

    #[tokio::test]
    async fn test_timestamps_never_go_backwards() {
        let (tracker, _) = tracker_with(Arc::new(DisabledGeocoder), Arc::new(MemoryTrailStore::new()));
        tracker.start();

        tracker.on_fix_received(Fix::new(0.0, 0.0, 5_000)).await;
        let outcome = tracker.on_fix_received(Fix::new(1.0, 0.0, 4_000)).await;
        let FixOutcome::Accepted(point) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(point.captured_at_ms, 5_000);
    }

    #[tokio::test]
    async fn test_concurrent_fixes_are_serialized() {
        let store = Arc::new(MemoryTrailStore::new());
        let source = Arc::new(FeedSource::default());
        let tracker = TrackingService::builder()
            .source(source)
            .geocoder(Arc::new(SlowGeocoder(Duration::from_millis(20))))
            .store(store.clone())
            .build()
            .unwrap();
        tracker.start();

        let (first, second) = tokio::join!(
            tracker.on_fix_received(Fix::new(41.0, 29.0, 1)),
            tracker.on_fix_received(Fix::new(41.0, 29.0001, 2)),
        );

        let accepted = [&first, &second]
            .iter()
            .filter(|o| matches!(o, FixOutcome::Accepted(_)))
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_waits_for_in_flight_fix() {
        let store = Arc::new(MemoryTrailStore::new());
        let source = Arc::new(FeedSource::default());
        let tracker = TrackingService::builder()
            .source(source)
            .geocoder(Arc::new(SlowGeocoder(Duration::from_millis(30))))
            .store(store.clone())
            .build()
            .unwrap();
        tracker.start();

        let (_, reset) = tokio::join!(tracker.on_fix_received(Fix::new(41.0, 29.0, 1)), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tracker.reset_trail().await
        });

        reset.unwrap();
        assert!(store.is_empty());
        assert_eq!(tracker.state().await.last_accepted_fix, None);
    }

    #[tokio::test]
    async fn test_attach_pumps_source_events() {
        let store = Arc::new(MemoryTrailStore::new());
        let (tracker, source) = tracker_with(Arc::new(DisabledGeocoder), store.clone());
        let mut rx = tracker.subscribe();
        let handle = tracker.attach();

        tracker.start();
        source.push_fix(Fix::new(41.0, 29.0, 1));
        source.push_failure("antenna unplugged");
        source.set_authorization(AuthorizationState::Denied);
        source.close();
        handle.await.unwrap();

        assert_eq!(store.len(), 1);
        let events = drain(&mut rx);
        assert!(matches!(events[1], TrackerEvent::PointAccepted(_)));
        assert_eq!(
            events[2],
            TrackerEvent::Failed(TrackingFailure::FixAcquisitionFailed(
                "antenna unplugged".into()
            ))
        );
        assert_eq!(
            events[3],
            TrackerEvent::AuthorizationChanged(AuthorizationState::Denied)
        );
        // Acquisition failures leave tracking untouched
        assert!(tracker.is_tracking());
    }

    #[test]
    fn test_builder_requires_store() {
        let result = TrackingService::builder()
            .source(Arc::new(FeedSource::default()))
            .build();
        assert!(matches!(
            result,
            Err(TrackerError::MissingComponent("trail store"))
        ));
    }
}
