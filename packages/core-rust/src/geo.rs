//! Great-circle distance and nearest-stop ranking.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A station stop as listed in the static stops table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// A stop together with its distance from the query point.
///
/// Field names match the `Station` type of the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyStop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
}

/// Haversine distance in kilometres between two points given in degrees.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Ranks `stops` by distance from `(lat, lon)`, nearest first.
///
/// `limit` truncates the result when it is `Some(n)` with `n > 0`; `None`
/// or zero returns every stop. Stops at equal distance keep table order.
#[must_use]
pub fn rank_nearest(stops: &[Stop], lat: f64, lon: f64, limit: Option<usize>) -> Vec<NearbyStop> {
    let mut ranked: Vec<NearbyStop> = stops
        .iter()
        .map(|stop| NearbyStop {
            id: stop.id.clone(),
            name: stop.name.clone(),
            lat: stop.lat,
            lon: stop.lon,
            distance_km: distance_km(lat, lon, stop.lat, stop.lon),
        })
        .collect();

    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    if let Some(n) = limit.filter(|n| *n > 0) {
        ranked.truncate(n);
    }
    ranked
}
