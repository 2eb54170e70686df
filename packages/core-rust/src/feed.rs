//! Realtime feed snapshots and train-times assembly.
//!
//! The external refresh process writes one JSON snapshot per upstream feed
//! into the data lake under `<feed>.json`. Each snapshot groups upcoming
//! arrivals by route, then by directional stop id (`127N`, `127S`, ...),
//! sorted by arrival time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Message returned when a train-times query names no services.
pub const NO_SERVICES_MESSAGE: &str = "At least 1 service must be provided";

/// Upstream feed that carries each route. Object keys keep the URL-encoded
/// path segment the refresh process derives from the feed URL.
const ROUTE_FEEDS: &[(&str, &str)] = &[
    ("1", "nyct%2Fgtfs"),
    ("2", "nyct%2Fgtfs"),
    ("3", "nyct%2Fgtfs"),
    ("4", "nyct%2Fgtfs"),
    ("5", "nyct%2Fgtfs"),
    ("6", "nyct%2Fgtfs"),
    ("7", "nyct%2Fgtfs"),
    ("GS", "nyct%2Fgtfs"),
    ("A", "nyct%2Fgtfs-ace"),
    ("C", "nyct%2Fgtfs-ace"),
    ("E", "nyct%2Fgtfs-ace"),
    ("H", "nyct%2Fgtfs-ace"),
    ("FS", "nyct%2Fgtfs-ace"),
    ("N", "nyct%2Fgtfs-nqrw"),
    ("Q", "nyct%2Fgtfs-nqrw"),
    ("R", "nyct%2Fgtfs-nqrw"),
    ("W", "nyct%2Fgtfs-nqrw"),
    ("B", "nyct%2Fgtfs-bdfm"),
    ("D", "nyct%2Fgtfs-bdfm"),
    ("F", "nyct%2Fgtfs-bdfm"),
    ("M", "nyct%2Fgtfs-bdfm"),
    ("L", "nyct%2Fgtfs-l"),
    ("G", "nyct%2Fgtfs-g"),
    ("J", "nyct%2Fgtfs-jz"),
    ("Z", "nyct%2Fgtfs-jz"),
    ("SI", "nyct%2Fgtfs-si"),
];

/// Feed name for a service, with a trailing express `X` ignored (`6X` → `6`).
#[must_use]
pub fn feed_for_service(service: &str) -> Option<&'static str> {
    let route = service.strip_suffix('X').unwrap_or(service);
    ROUTE_FEEDS
        .iter()
        .find(|(r, _)| *r == route)
        .map(|(_, feed)| *feed)
}

/// Data lake object key holding the latest snapshot of `feed`.
#[must_use]
pub fn snapshot_object_key(feed: &str) -> String {
    format!("{feed}.json")
}

/// One upcoming arrival of a trip at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripArrival {
    pub id: String,
    /// Arrival (or departure) time, Unix seconds.
    pub arrival: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delayed: Option<bool>,
}

/// route id → directional stop id → arrivals.
pub type StopArrivals = BTreeMap<String, BTreeMap<String, Vec<TripArrival>>>;

/// A snapshot of one feed as written by the refresh process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub id: String,
    pub data: StopArrivals,
    #[serde(default)]
    pub active_routes: Vec<String>,
    /// When the snapshot was written, Unix seconds.
    pub updated_at: i64,
    /// Generation time reported by the upstream feed, Unix seconds.
    #[serde(default)]
    pub feed_updated_at: Option<i64>,
}

/// Travel direction encoded in the last character of a stop id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    North,
    South,
}

/// Splits a directional stop id into `(station id, direction)`.
///
/// `N` means northbound; any other suffix is treated as southbound.
/// Returns `None` for an empty id.
#[must_use]
pub fn split_station_key(key: &str) -> Option<(&str, Direction)> {
    let (idx, last) = key.char_indices().last()?;
    let direction = if last == 'N' {
        Direction::North
    } else {
        Direction::South
    };
    Some((&key[..idx], direction))
}

#[derive(Debug, Deserialize)]
struct TrainTimesArgs {
    #[serde(default)]
    services: Option<Vec<String>>,
    #[serde(default)]
    stations: Option<Vec<String>>,
    #[serde(default)]
    directions: Option<Vec<Direction>>,
}

/// Parsed arguments of a train-times lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTimesQuery {
    pub services: BTreeSet<String>,
    /// Station ids without direction suffix. `None` matches every station.
    pub stations: Option<BTreeSet<String>>,
    /// `None` matches both directions.
    pub directions: Option<BTreeSet<Direction>>,
}

impl TrainTimesQuery {
    /// Parses the operation arguments.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for an `InvalidArguments` failure when the
    /// payload is malformed or names no services.
    pub fn from_arguments(args: &serde_json::Value) -> Result<Self, String> {
        let parsed: TrainTimesArgs =
            serde_json::from_value(args.clone()).map_err(|e| e.to_string())?;
        let services: BTreeSet<String> = parsed.services.unwrap_or_default().into_iter().collect();
        if services.is_empty() {
            return Err(NO_SERVICES_MESSAGE.to_string());
        }
        Ok(Self {
            services,
            stations: parsed.stations.map(|s| s.into_iter().collect()),
            directions: parsed.directions.map(|d| d.into_iter().collect()),
        })
    }

    /// Feeds that must be read to answer this query. Unknown services select
    /// no feed.
    #[must_use]
    pub fn feeds(&self) -> BTreeSet<&'static str> {
        self.services
            .iter()
            .filter_map(|s| feed_for_service(s))
            .collect()
    }

    fn matches_station(&self, key: &str) -> bool {
        let Some((station, direction)) = split_station_key(key) else {
            return false;
        };
        let station_ok = self
            .stations
            .as_ref()
            .is_none_or(|set| set.contains(station));
        let direction_ok = self
            .directions
            .as_ref()
            .is_none_or(|set| set.contains(&direction));
        station_ok && direction_ok
    }

    /// Builds the response from the snapshots of every feed in
    /// [`TrainTimesQuery::feeds`].
    ///
    /// Rows are ordered by directional stop id, services within a row by
    /// service id. `updated_at` is the oldest snapshot time, or `None` when
    /// no snapshot was consulted.
    #[must_use]
    pub fn assemble(&self, snapshots: &[FeedSnapshot]) -> TrainTimes {
        let mut by_station: BTreeMap<&str, BTreeMap<&str, &Vec<TripArrival>>> = BTreeMap::new();

        for snapshot in snapshots {
            for (service, stations) in &snapshot.data {
                if !self.services.contains(service) {
                    continue;
                }
                for (station, trips) in stations {
                    if self.matches_station(station) {
                        by_station
                            .entry(station.as_str())
                            .or_default()
                            .insert(service.as_str(), trips);
                    }
                }
            }
        }

        let station_service_trips = by_station
            .into_iter()
            .map(|(station_id, services)| StationServiceTrips {
                station_id: station_id.to_string(),
                service_trips: services
                    .into_iter()
                    .map(|(service, trips)| ServiceTrips {
                        service: service.to_string(),
                        trips: trips.clone(),
                    })
                    .collect(),
            })
            .collect();

        TrainTimes {
            station_service_trips,
            updated_at: snapshots.iter().map(|s| s.updated_at).min(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTrips {
    pub service: String,
    pub trips: Vec<TripArrival>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationServiceTrips {
    pub station_id: String,
    pub service_trips: Vec<ServiceTrips>,
}

/// Result shape of the `trainTimes` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainTimes {
    pub station_service_trips: Vec<StationServiceTrips>,
    pub updated_at: Option<i64>,
}
