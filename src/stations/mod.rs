//! Station resolution (spec §4.7): maps request geometry/identifiers to a
//! concrete station set, filtered by group membership and validity
//! interval, with nearest-k search and two invalidate-on-republish LRUs.

pub mod registry;
pub mod resolve;

pub use registry::{RegistrySnapshot, StationRegistry};
pub use resolve::{ResolutionRequest, ResolvedStation, StationResolver, StationSelector};
