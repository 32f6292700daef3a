//! Shared fixtures for container integration tests.
//!
//! Distributions are tiny trees whose entry point execs the `carbon-agent`
//! binary built alongside the tests.

#![allow(dead_code)]

use carbon_container::{ContainerOptions, EnvironmentVariable};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const AGENT_ENV: &str = "CARBON_AGENT_BIN";
pub const ENTRY_POINT: &str = "bin/start.sh";

pub const ORIGINAL_CONF: &str = "port=9443\n";

/// Entry point handing all launch arguments to the agent.
pub fn agent_script() -> String {
    format!("#!/bin/sh\nexec \"${}\" \"$@\"\n", AGENT_ENV)
}

/// Scratch space for one test: a distribution source and an unpack base.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("create fixture dir"),
        }
    }

    pub fn dist(&self) -> PathBuf {
        self.root.path().join("dist")
    }

    pub fn work(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }

    /// Write a distribution with `bin/start.sh` and `conf/app.conf`.
    pub fn write_distribution(&self) -> PathBuf {
        self.write_distribution_with(&agent_script())
    }

    pub fn write_distribution_with(&self, script: &str) -> PathBuf {
        let dist = self.dist();
        write(&dist.join(ENTRY_POINT), script);
        write(&dist.join("conf/app.conf"), ORIGINAL_CONF);
        write(&dist.join("lib/README"), "runtime libraries");
        dist
    }

    /// Options launching `source` through the agent, unpacked under `work()`.
    pub fn options(&self, mut options: ContainerOptions) -> ContainerOptions {
        options.distribution.unpack_directory = Some(self.work());
        options.local_repository = Some(self.path("m2"));
        options.launch.entry_point = PathBuf::from(ENTRY_POINT);
        options.launch.environment.push(EnvironmentVariable::new(
            AGENT_ENV,
            env!("CARGO_BIN_EXE_carbon-agent"),
        ));
        options.ready_timeout_ms = 30_000;
        options.ready_poll_interval_ms = 50;
        options.stop_grace_period_ms = 5_000;
        options
    }

    /// Per-run directories currently under the unpack base.
    pub fn runs(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.work()) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(path, content).expect("write fixture file");
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
