//! Subprocess spawning for the distribution entry point.

use super::LaunchSpec;
use carbon_shared::errors::{CarbonError, CarbonResult};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Spawn the entry point with stdout and stderr appended to the output log.
///
/// The child leads its own process group and is killed if the handle is
/// dropped without an explicit stop.
pub(crate) fn spawn_subprocess(spec: &LaunchSpec) -> CarbonResult<Child> {
    if let Some(parent) = spec.output_log.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CarbonError::Launch(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }
    let stdout = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&spec.output_log)
        .map_err(|e| {
            CarbonError::Launch(format!(
                "failed to open process output {}: {}",
                spec.output_log.display(),
                e
            ))
        })?;
    let stderr = stdout.try_clone().map_err(|e| {
        CarbonError::Launch(format!("failed to duplicate output handle: {}", e))
    })?;

    let mut cmd = Command::new(&spec.entry_point);
    cmd.args(&spec.flags)
        .current_dir(&spec.home)
        .envs(spec.environment.iter().map(|v| (&v.name, &v.value)))
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|e| {
        let err_msg = format!(
            "failed to spawn {}: {}",
            spec.entry_point.display(),
            e
        );
        tracing::error!("{}", err_msg);
        CarbonError::Launch(err_msg)
    })
}
