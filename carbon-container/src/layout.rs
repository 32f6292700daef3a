//! File-system layout of a provisioned distribution.

use carbon_shared::errors::{CarbonError, CarbonResult};
use std::path::{Path, PathBuf};

pub mod subdirs {
    pub const BIN: &str = "bin";
    pub const OSGI: &str = "osgi";
    pub const DROPINS: &str = "dropins";
    pub const LOGS: &str = "logs";
}

pub mod filenames {
    pub const PROCESS_OUTPUT: &str = "test-container.out";
}

/// Per-instance working directory: `<unpack base>/<uuid>`.
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    /// Allocate a fresh, uniquely named directory under `base`.
    ///
    /// The result is always absolute: a relative `base` is resolved against
    /// the current directory, since the runtime is launched from inside the
    /// tree and receives its home as a launch property.
    pub fn allocate(base: &Path) -> CarbonResult<Self> {
        let root = std::path::absolute(base.join(uuid::Uuid::new_v4().to_string()))
            .map_err(|e| {
                CarbonError::Provisioning(format!(
                    "failed to resolve unpack directory {}: {}",
                    base.display(),
                    e
                ))
            })?;
        std::fs::create_dir_all(&root).map_err(|e| {
            CarbonError::Provisioning(format!(
                "failed to create working directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// Layout of an unpacked distribution rooted at its home directory.
#[derive(Debug, Clone)]
pub struct DistributionLayout {
    home: PathBuf,
}

impl DistributionLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Find the distribution home inside `root`.
    ///
    /// Archives usually wrap everything in one top-level directory
    /// (`wso2carbon-5.1.0/`); in that case that directory is the home.
    pub fn discover(root: &Path) -> CarbonResult<Self> {
        let entries: Vec<_> = std::fs::read_dir(root)
            .map_err(|e| {
                CarbonError::Provisioning(format!("failed to read {}: {}", root.display(), e))
            })?
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .collect();

        if let [only] = entries.as_slice()
            && only.file_type().map(|t| t.is_dir()).unwrap_or(false)
            && only.file_name() != subdirs::BIN
        {
            tracing::debug!(home = %only.path().display(), "Using nested distribution home");
            return Ok(Self::new(only.path()));
        }

        Ok(Self::new(root))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.home.join(subdirs::BIN)
    }

    pub fn dropins_dir(&self) -> PathBuf {
        self.home.join(subdirs::OSGI).join(subdirs::DROPINS)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join(subdirs::LOGS)
    }

    pub fn process_output(&self) -> PathBuf {
        self.logs_dir().join(filenames::PROCESS_OUTPUT)
    }

    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.home.join(relative)
    }
}
