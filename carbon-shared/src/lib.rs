//! Types shared between the Carbon test container and the runtime it drives.

pub mod agent;
pub mod errors;
pub mod protocol;

pub use errors::{CarbonError, CarbonResult};
pub use protocol::{BundleId, BundleState, Endpoint, SYSTEM_BUNDLE_ID, TestAddress, TestOutcome};
