//! The gateway's operation catalog: `systemMetadata`, `nearestStations` and
//! `trainTimes`, each bound to its handler and transformer.

use std::sync::Arc;

use closing_doors_core::{
    ComputeBackend, KeyValueBackend, ObjectType, OperationId, OperationSchema, ScalarKind,
    TypeRef,
};

use super::handler::Handler;
use super::registry::{OperationBinding, OperationRegistry, RegistryBuilder, RegistryError};
use super::transform::{KeySource, KeyValueMapping, PassthroughMapping, Transformer};

/// Table the refresh process writes running-service metadata into.
pub const METADATA_TABLE: &str = "mtaSystemMetadata";
/// The single metadata record's key.
pub const METADATA_KEY: &str = "running_services";

/// Backends the catalog's handlers talk to.
#[derive(Clone)]
pub struct CatalogBackends {
    pub metadata: Arc<dyn KeyValueBackend>,
    pub stations: Arc<dyn ComputeBackend>,
    pub train_times: Arc<dyn ComputeBackend>,
}

fn string() -> TypeRef {
    TypeRef::scalar(ScalarKind::String).non_null()
}

fn int() -> TypeRef {
    TypeRef::scalar(ScalarKind::Int).non_null()
}

fn float() -> TypeRef {
    TypeRef::scalar(ScalarKind::Float).non_null()
}

fn id() -> TypeRef {
    TypeRef::scalar(ScalarKind::Id).non_null()
}

#[must_use]
pub fn system_metadata_type() -> ObjectType {
    ObjectType::new("SystemMetadata")
        .field("runningServices", TypeRef::list(string()).non_null())
        .field("updatedAt", int())
        .field("minFeedUpdatedAt", TypeRef::scalar(ScalarKind::Int))
}

/// A stop as ranked by `nearestStations`; field names follow the stops file.
#[must_use]
pub fn station_type() -> ObjectType {
    ObjectType::new("Station")
        .field("id", id())
        .field("name", string())
        .field("lat", float())
        .field("lon", float())
        .field("distance_km", float())
}

#[must_use]
pub fn train_times_type() -> ObjectType {
    let trip = ObjectType::new("Trip")
        .field("id", id())
        .field("arrival", int())
        .field("delayed", TypeRef::scalar(ScalarKind::Boolean));
    let service_trips = ObjectType::new("ServiceTrips")
        .field("service", string())
        .field("trips", TypeRef::list(TypeRef::object(trip).non_null()).non_null());
    let station_service_trips = ObjectType::new("StationServiceTrips")
        .field("stationId", string())
        .field(
            "serviceTrips",
            TypeRef::list(TypeRef::object(service_trips).non_null()).non_null(),
        );
    ObjectType::new("TrainTimes")
        .field(
            "stationServiceTrips",
            TypeRef::list(TypeRef::object(station_service_trips).non_null()).non_null(),
        )
        .field("updatedAt", TypeRef::scalar(ScalarKind::Int))
}

#[must_use]
pub fn system_metadata_schema() -> OperationSchema {
    OperationSchema::returning(TypeRef::object(system_metadata_type()))
}

#[must_use]
pub fn nearest_stations_schema() -> OperationSchema {
    OperationSchema::returning(TypeRef::list(TypeRef::object(station_type()).non_null()).non_null())
        .argument("lat", TypeRef::scalar(ScalarKind::Float).non_null())
        .argument("lon", TypeRef::scalar(ScalarKind::Float).non_null())
        .argument("numStations", TypeRef::scalar(ScalarKind::Int))
}

#[must_use]
pub fn train_times_schema() -> OperationSchema {
    OperationSchema::returning(TypeRef::object(train_times_type()).non_null())
        .argument("services", TypeRef::list(string()).non_null())
        .argument("stations", TypeRef::list(string()))
        .argument(
            "directions",
            TypeRef::list(TypeRef::enumeration("Direction", &["NORTH", "SOUTH"]).non_null()),
        )
}

fn system_metadata_transformer() -> Transformer {
    Transformer::DirectKeyValue(
        KeyValueMapping::new(METADATA_TABLE, KeySource::Literal(METADATA_KEY.to_string()))
            .field("data", "runningServices")
            .field("updated_at", "updatedAt")
            .optional_field("min_feed_updated_at", "minFeedUpdatedAt"),
    )
}

/// Registers the three catalog operations. All accept both authorization
/// modes and use the gateway's default handler timeout.
///
/// # Errors
///
/// Propagates [`RegistryError`] from registration.
pub fn build_registry(backends: CatalogBackends) -> Result<OperationRegistry, RegistryError> {
    let mut builder = RegistryBuilder::new();
    builder
        .register(OperationBinding::new(
            OperationId::query("systemMetadata"),
            system_metadata_schema(),
            Handler::KeyValue(backends.metadata),
            system_metadata_transformer(),
        ))?
        .register(OperationBinding::new(
            OperationId::query("nearestStations"),
            nearest_stations_schema(),
            Handler::GeoCompute(backends.stations),
            Transformer::ComputePassthrough(PassthroughMapping::default()),
        ))?
        .register(OperationBinding::new(
            OperationId::query("trainTimes"),
            train_times_schema(),
            Handler::TimeSeriesCompute(backends.train_times),
            Transformer::ComputePassthrough(PassthroughMapping::default()),
        ))?;
    Ok(builder.build())
}
