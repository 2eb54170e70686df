//! Time-series compute function behind `trainTimes`.
//!
//! Reads the latest snapshot of every feed the requested services run on and
//! filters their arrivals by station and direction.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use closing_doors_core::feed::snapshot_object_key;
use closing_doors_core::{ComputeBackend, DataLake, FeedSnapshot, HandlerResult, TrainTimesQuery};
use futures_util::future::try_join_all;
use serde_json::Value;

#[derive(Clone)]
pub struct TrainTimesFunction {
    lake: Arc<dyn DataLake>,
}

impl TrainTimesFunction {
    #[must_use]
    pub fn new(lake: Arc<dyn DataLake>) -> Self {
        Self { lake }
    }

    /// Reads one feed's latest snapshot. Lake errors and a missing object
    /// fail the outer result; an object that does not parse yields the
    /// inner error.
    async fn read_snapshot(&self, feed: &str) -> anyhow::Result<Result<FeedSnapshot, String>> {
        let key = snapshot_object_key(feed);
        let bytes = self
            .lake
            .read_object(&key)
            .await?
            .ok_or_else(|| anyhow!("feed snapshot `{key}` not found"))?;
        Ok(serde_json::from_slice(&bytes)
            .map_err(|e| format!("feed snapshot `{key}` is corrupt: {e}")))
    }
}

#[async_trait]
impl ComputeBackend for TrainTimesFunction {
    async fn invoke(&self, payload: Value) -> anyhow::Result<HandlerResult> {
        let query = match TrainTimesQuery::from_arguments(&payload) {
            Ok(query) => query,
            Err(message) => return Ok(HandlerResult::invalid_arguments(message)),
        };

        let feeds = query.feeds();
        tracing::debug!(?feeds, "reading feed snapshots");
        let reads = try_join_all(feeds.iter().map(|feed| self.read_snapshot(feed))).await?;
        let snapshots = match reads.into_iter().collect::<Result<Vec<_>, _>>() {
            Ok(snapshots) => snapshots,
            Err(message) => {
                tracing::error!(%message, "unreadable feed snapshot");
                return Ok(HandlerResult::malformed_data(message));
            }
        };

        Ok(HandlerResult::Success(serde_json::to_value(
            query.assemble(&snapshots),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use closing_doors_core::feed::NO_SERVICES_MESSAGE;
    use closing_doors_core::FailureKind;
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryDataLake;

    fn lake() -> Arc<MemoryDataLake> {
        let lake = MemoryDataLake::new();
        lake.put_object(
            "nyct%2Fgtfs.json",
            json!({
                "id": "nyct%2Fgtfs",
                "updated_at": 1_700_000_100,
                "data": {
                    "1": {
                        "127N": [{"id": "t1", "arrival": 1_700_000_400}],
                        "127S": [{"id": "t2", "arrival": 1_700_000_500}]
                    },
                    "6": {
                        "631N": [{"id": "t3", "arrival": 1_700_000_600, "delayed": true}]
                    }
                }
            })
            .to_string()
            .into_bytes(),
        );
        lake.put_object(
            "nyct%2Fgtfs-ace.json",
            json!({
                "id": "nyct%2Fgtfs-ace",
                "updated_at": 1_700_000_050,
                "data": {
                    "A": {"A27N": [{"id": "t4", "arrival": 1_700_000_700}]}
                }
            })
            .to_string()
            .into_bytes(),
        );
        Arc::new(lake)
    }

    #[tokio::test]
    async fn filters_by_service_station_and_direction() {
        let function = TrainTimesFunction::new(lake());
        let out = function
            .invoke(json!({"services": ["1", "A"], "stations": ["127"], "directions": ["NORTH"]}))
            .await
            .unwrap();
        assert_eq!(
            out,
            HandlerResult::Success(json!({
                "stationServiceTrips": [{
                    "stationId": "127N",
                    "serviceTrips": [{
                        "service": "1",
                        "trips": [{"id": "t1", "arrival": 1_700_000_400}]
                    }]
                }],
                "updatedAt": 1_700_000_050
            }))
        );
    }

    #[tokio::test]
    async fn unknown_services_give_empty_result() {
        let function = TrainTimesFunction::new(lake());
        let out = function.invoke(json!({"services": ["Q9"]})).await.unwrap();
        assert_eq!(
            out,
            HandlerResult::Success(json!({"stationServiceTrips": [], "updatedAt": null}))
        );
    }

    #[tokio::test]
    async fn empty_services_is_invalid() {
        let function = TrainTimesFunction::new(lake());
        let out = function.invoke(json!({"services": []})).await.unwrap();
        assert_eq!(
            out,
            HandlerResult::Failure {
                kind: FailureKind::InvalidArguments,
                message: NO_SERVICES_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn missing_snapshot_is_an_error() {
        let function = TrainTimesFunction::new(lake());
        let err = function.invoke(json!({"services": ["L"]})).await.unwrap_err();
        assert!(err.to_string().contains("nyct%2Fgtfs-l.json"));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_malformed_data() {
        let lake = lake();
        lake.put_object("nyct%2Fgtfs-l.json", br#"{"id": "nyct%2Fgtfs-l", "data": ["#.to_vec());
        let function = TrainTimesFunction::new(lake);
        let out = function.invoke(json!({"services": ["1", "L"]})).await.unwrap();
        let HandlerResult::Failure { kind, message } = out else {
            panic!("expected failure, got {out:?}");
        };
        assert_eq!(kind, FailureKind::MalformedData);
        assert!(message.contains("nyct%2Fgtfs-l.json"), "{message}");
    }
}
