//! Process launcher.
//!
//! Turns [`LaunchOptions`] into a command line and starts the distribution's
//! entry point. Launching is asynchronous: readiness is established later
//! over the control channel.

mod handler;
mod spawn;

pub use handler::{ProcessHandler, ScriptHandler};

use crate::layout::DistributionLayout;
use crate::options::{EnvironmentVariable, LaunchOptions, SystemProperty};
use carbon_shared::errors::{CarbonError, CarbonResult};
use std::path::{Path, PathBuf};

/// System property pointing the runtime at its home directory.
pub const CARBON_HOME_PROPERTY: &str = "carbon.home";

/// Fully resolved launch parameters.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub home: PathBuf,
    pub entry_point: PathBuf,
    pub flags: Vec<String>,
    pub environment: Vec<EnvironmentVariable>,
    pub output_log: PathBuf,
}

impl LaunchSpec {
    /// Resolve launch parameters for `layout`.
    ///
    /// `injected` properties (home, registry endpoint) come first, followed
    /// by the user's properties in order, the raw flags verbatim, and the
    /// debug agent flag if requested.
    pub fn build(
        layout: &DistributionLayout,
        options: &LaunchOptions,
        injected: &[SystemProperty],
    ) -> Self {
        Self {
            home: layout.home().to_path_buf(),
            entry_point: layout.resolve(&options.entry_point),
            flags: build_flags(injected, options),
            environment: options.environment.clone(),
            output_log: layout.process_output(),
        }
    }
}

/// Flag list: one `-Dkey=value` per property, then raw flags.
pub fn build_flags(injected: &[SystemProperty], options: &LaunchOptions) -> Vec<String> {
    let mut flags: Vec<String> = injected
        .iter()
        .chain(options.system_properties.iter())
        .map(SystemProperty::to_flag)
        .collect();
    flags.extend(options.flags.iter().cloned());

    if let Some(port) = options.debug_port {
        flags.push(debug_flag(port));
    }
    flags
}

/// JDWP agent listening on `port`, suspended until a debugger attaches.
pub fn debug_flag(port: u16) -> String {
    format!(
        "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address={}",
        port
    )
}

/// Mark every file under `bin_dir` executable. Missing directory is a no-op.
pub fn make_scripts_executable(bin_dir: &Path) -> CarbonResult<usize> {
    if !bin_dir.is_dir() {
        tracing::debug!(dir = %bin_dir.display(), "No scripts directory, skipping chmod");
        return Ok(0);
    }

    let mut count = 0;
    for entry in walkdir::WalkDir::new(bin_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            CarbonError::Launch(format!("failed to scan {}: {}", bin_dir.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        set_executable(entry.path())?;
        count += 1;
    }
    Ok(count)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> CarbonResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| CarbonError::Launch(format!("failed to stat {}: {}", path.display(), e)))?
        .permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms).map_err(|e| {
        CarbonError::Launch(format!("failed to chmod {}: {}", path.display(), e))
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> CarbonResult<()> {
    Ok(())
}

/// Start the entry point described by `spec`.
///
/// Returns as soon as the process is spawned.
pub fn launch(spec: &LaunchSpec) -> CarbonResult<ScriptHandler> {
    if !spec.entry_point.is_file() {
        return Err(CarbonError::Launch(format!(
            "entry point not found: {}",
            spec.entry_point.display()
        )));
    }

    tracing::info!(
        entry_point = %spec.entry_point.display(),
        home = %spec.home.display(),
        flags = spec.flags.len(),
        env = spec.environment.len(),
        "Launching distribution"
    );
    tracing::debug!(flags = ?spec.flags, "Launch flags");

    let child = spawn::spawn_subprocess(spec)?;
    let handler = ScriptHandler::new(child)?;
    tracing::info!(pid = handler.pid(), "Distribution process spawned");
    Ok(handler)
}
