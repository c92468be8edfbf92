//! Location tracking service with a persistent trail.
//!
//! This library provides functionality to:
//! - Receive raw position fixes from a location source
//! - Drop fixes closer than a minimum distance to the last accepted one
//! - Reverse geocode accepted fixes to a "locality, region" description
//! - Persist accepted points in an append-only trail store
//! - Publish every outcome on a single session event stream
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │  Location   │    │  Geocoder   │    │ TrailStore  │
//! │   Source    │    │  (HTTP)     │    │  (mmap)     │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!        │                  │                  │
//!        └──────────────────┼──────────────────┘
//!                           ▼
//!                  ┌─────────────────┐
//!                  │ TrackingService │
//!                  │    (filter)     │
//!                  └─────────────────┘
//!                           │
//!                           ▼
//!                  ┌─────────────────┐
//!                  │SessionController│
//!                  │ (event stream)  │
//!                  └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trailmark::{FeedSource, FileTrailStore, Fix, SessionController, TrackingService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(FeedSource::default());
//!     let store = Arc::new(FileTrailStore::open("trail_data")?);
//!
//!     let tracker = Arc::new(
//!         TrackingService::builder()
//!             .source(source.clone())
//!             .store(store)
//!             .min_distance(100.0)
//!             .build()?,
//!     );
//!     let _pump = tracker.attach();
//!
//!     let (session, mut events) = SessionController::new(tracker);
//!     session.toggle_tracking();
//!     source.push_fix(Fix::now(41.0082, 28.9784));
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod geo;
pub mod geocoder;
pub mod location;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod types;

pub use geocoder::{DisabledGeocoder, GeocodeError, Geocoder, GeocoderConfig, HttpGeocoder};
pub use location::{FeedSource, LocationEvent, LocationSource};
pub use session::{PromptChoice, ResetPrompt, SessionController, SessionEvent};
pub use storage::{FileTrailStore, MemoryTrailStore, TrailStore, TrailStoreError};
pub use tracker::{
    FixOutcome, TrackerConfig, TrackerEvent, TrackingFailure, TrackingService,
    TrackingServiceBuilder,
};
pub use types::{AuthorizationState, Coordinate, Fix, TrackedPoint, TrackingState};
