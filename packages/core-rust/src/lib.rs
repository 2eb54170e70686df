//! Closing Doors core: operation schema model, backend contracts, geo ranking,
//! and realtime feed snapshots.

pub mod clock;
pub mod context;
pub mod feed;
pub mod geo;
pub mod schema;
pub mod traits;
pub mod types;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use context::{AuthMode, AuthorizationContext, KeyWindow};
pub use feed::{Direction, FeedSnapshot, TrainTimes, TrainTimesQuery, TripArrival};
pub use geo::{NearbyStop, Stop};
pub use schema::{FieldDef, ObjectType, OperationSchema, ScalarKind, TypeRef, ValidationResult};
pub use traits::{ComputeBackend, DataLake, KeyValueBackend};
pub use types::{FailureKind, HandlerRequest, HandlerResult, Item, OperationId};
