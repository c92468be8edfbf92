//! Great-circle distance and the minimum-distance fix filter.

use crate::types::Coordinate;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default minimum distance between accepted fixes.
pub const DEFAULT_MIN_DISTANCE_M: f64 = 100.0;

/// Haversine distance between two coordinates in meters.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Outcome of running a fix through the distance filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    /// No previous fix, accepted unconditionally.
    First,
    /// Far enough from the previous fix.
    Moved { distance_m: f64 },
    /// Closer than the threshold, to be discarded.
    TooClose { distance_m: f64 },
}

impl FilterDecision {
    pub const fn is_accepted(&self) -> bool {
        !matches!(self, Self::TooClose { .. })
    }
}

/// Decide whether `candidate` should be accepted given the last accepted
/// coordinate and the threshold in meters.
pub fn evaluate(
    candidate: Coordinate,
    last: Option<Coordinate>,
    min_distance_m: f64,
) -> FilterDecision {
    let Some(last) = last else {
        return FilterDecision::First;
    };

    let distance_m = haversine_distance(last, candidate);
    if distance_m >= min_distance_m {
        FilterDecision::Moved { distance_m }
    } else {
        FilterDecision::TooClose { distance_m }
    }
}
