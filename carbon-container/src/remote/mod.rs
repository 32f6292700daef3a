//! Remote control channel between the test driver and the launched runtime.
//!
//! The container binds a [`Registry`] before launching, hands its endpoint
//! to the child through launch properties, and waits for the child to dial
//! back. The accepted connection becomes an [`RbcClient`].

mod client;
mod registry;

pub use client::{DEFAULT_REQUEST_TIMEOUT, RbcClient, RemoteBundleContext};
pub use registry::{NAME_PREFIX, REGISTRY_HOST, Registry};
