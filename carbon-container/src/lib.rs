//! Test container for Carbon server distributions.
//!
//! Provisions a distribution into a fresh working directory, overlays test
//! bundles and configuration, launches it as a separate process wired to a
//! control channel, and drives tests through that channel.
//!
//! ```ignore
//! use carbon_container::{CarbonTestContainer, ContainerOptions};
//!
//! let container = CarbonTestContainer::new(ContainerOptions::from_directory("dist"));
//! container.start().await?;
//! container.call(&TestAddress::new("assert-file").arg("conf/app.conf")).await?;
//! container.stop().await?;
//! ```

pub mod cleanup;
pub mod container;
pub mod launcher;
pub mod layout;
pub mod logging;
pub mod options;
pub mod overlay;
pub mod pipeline;
pub mod provision;
pub mod reference_agent;
pub mod remote;
pub mod util;

pub use carbon_shared::errors::{CarbonError, CarbonResult};
pub use carbon_shared::{BundleId, BundleState, Endpoint, TestAddress, TestOutcome};
pub use container::{CarbonTestContainer, ContainerInfo, ContainerState};
pub use logging::{init_logging, init_logging_with_file};
pub use options::{
    ArtifactReference, ConfigFileCopy, ContainerOptions, EnvironmentVariable, LaunchOptions,
    MavenArtifact, PortRange, SystemProperty,
};
pub use overlay::OverlayReport;
pub use remote::RemoteBundleContext;
