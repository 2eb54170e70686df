//! Geo-lookup compute function behind `nearestStations`.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use closing_doors_core::geo::rank_nearest;
use closing_doors_core::{ComputeBackend, HandlerResult, Stop};
use serde::Deserialize;
use serde_json::Value;

/// One row of the static stops table (`stop_id,stop_name,stop_lat,stop_lon`).
#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: String,
    stop_name: String,
    stop_lat: f64,
    stop_lon: f64,
}

/// Parses a stops table with a header row.
///
/// # Errors
///
/// Returns an error on the first malformed row.
pub fn read_stops<R: Read>(reader: R) -> anyhow::Result<Vec<Stop>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut stops = Vec::new();
    for (i, row) in rdr.deserialize::<StopRow>().enumerate() {
        let row = row.with_context(|| format!("stops row {}", i + 1))?;
        stops.push(Stop {
            id: row.stop_id,
            name: row.stop_name,
            lat: row.stop_lat,
            lon: row.stop_lon,
        });
    }
    Ok(stops)
}

/// Reads a stops table from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or parsed.
pub fn load_stops(path: &Path) -> anyhow::Result<Vec<Stop>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening stops table {}", path.display()))?;
    read_stops(file)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearestArgs {
    lat: f64,
    lon: f64,
    #[serde(default)]
    num_stations: Option<i64>,
}

/// Ranks every known stop by distance from the query point.
#[derive(Debug, Clone)]
pub struct NearestStationsFunction {
    stops: Arc<[Stop]>,
}

impl NearestStationsFunction {
    #[must_use]
    pub fn new(stops: Vec<Stop>) -> Self {
        Self {
            stops: stops.into(),
        }
    }

    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }
}

#[async_trait]
impl ComputeBackend for NearestStationsFunction {
    async fn invoke(&self, payload: Value) -> anyhow::Result<HandlerResult> {
        let args: NearestArgs = match serde_json::from_value(payload) {
            Ok(args) => args,
            Err(e) => return Ok(HandlerResult::invalid_arguments(e.to_string())),
        };
        // Zero, negative, or absent means every stop.
        let limit = args.num_stations.and_then(|n| usize::try_from(n).ok());
        let ranked = rank_nearest(&self.stops, args.lat, args.lon, limit);
        Ok(HandlerResult::Success(serde_json::to_value(ranked)?))
    }
}
