//! Container configuration.
//!
//! Plain serde structs; every field has a default so partial JSON documents
//! deserialize. Call [`ContainerOptions::sanitize`] before use.

use carbon_shared::errors::{CarbonError, CarbonResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ENTRY_POINT: &str = "bin/carbon.sh";
pub const DEFAULT_UNPACK_DIRECTORY: &str = "target";
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Where the distribution comes from. Exactly one source must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Already unpacked distribution directory.
    pub directory: Option<PathBuf>,
    /// Local zip or tar.gz archive.
    pub archive: Option<PathBuf>,
    /// Remote artifact (Maven coordinate or URL).
    pub artifact: Option<ArtifactReference>,
    /// Base directory under which a fresh working directory is created.
    pub unpack_directory: Option<PathBuf>,
    /// Only used for logging.
    pub name: Option<String>,
}

/// The single resolved distribution source.
#[derive(Debug, Clone, Copy)]
pub enum DistributionSource<'a> {
    Directory(&'a Path),
    Archive(&'a Path),
    Artifact(&'a ArtifactReference),
}

impl DistributionConfig {
    /// Resolve the configured source, failing unless exactly one is set.
    pub fn source(&self) -> CarbonResult<DistributionSource<'_>> {
        let mut sources = Vec::with_capacity(3);
        if let Some(dir) = &self.directory {
            sources.push(DistributionSource::Directory(dir));
        }
        if let Some(archive) = &self.archive {
            sources.push(DistributionSource::Archive(archive));
        }
        if let Some(artifact) = &self.artifact {
            sources.push(DistributionSource::Artifact(artifact));
        }

        match sources.len() {
            1 => Ok(sources[0]),
            0 => Err(CarbonError::Config(
                "no distribution source configured: set one of directory, archive or artifact"
                    .into(),
            )),
            n => Err(CarbonError::Config(format!(
                "{} distribution sources configured: set exactly one of directory, archive or artifact",
                n
            ))),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("carbon")
    }

    pub fn unpack_base(&self) -> PathBuf {
        self.unpack_directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UNPACK_DIRECTORY))
    }
}

/// Maven coordinate, written `mvn:group/artifact/version[/type[/classifier]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub packaging: String,
    pub classifier: Option<String>,
}

impl MavenArtifact {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            packaging: "jar".to_string(),
            classifier: None,
        }
    }

    pub fn packaging(mut self, packaging: impl Into<String>) -> Self {
        self.packaging = packaging.into();
        self
    }

    pub fn classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, c, self.packaging
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.packaging),
        }
    }

    /// Path inside a Maven repository, `/`-separated.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mvn:{}/{}/{}/{}",
            self.group_id, self.artifact_id, self.version, self.packaging
        )?;
        if let Some(c) = &self.classifier {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

/// Reference to a remote artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArtifactReference {
    Maven(MavenArtifact),
    /// `http://`, `https://` or `file://` URL.
    Url(String),
}

impl ArtifactReference {
    /// Last path segment, used to name downloaded copies.
    pub fn base_name(&self) -> String {
        match self {
            ArtifactReference::Maven(m) => m.artifact_id.clone(),
            ArtifactReference::Url(url) => {
                let trimmed = url.trim_end_matches('/');
                let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
                last.strip_suffix(".jar").unwrap_or(last).to_string()
            }
        }
    }
}

impl FromStr for ArtifactReference {
    type Err = CarbonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(coords) = s.strip_prefix("mvn:") {
            let parts: Vec<&str> = coords.split('/').collect();
            if parts.len() < 3 || parts.len() > 5 || parts.iter().any(|p| p.is_empty()) {
                return Err(CarbonError::Config(format!(
                    "invalid maven reference '{}': expected mvn:group/artifact/version[/type[/classifier]]",
                    s
                )));
            }
            let mut artifact = MavenArtifact::new(parts[0], parts[1], parts[2]);
            if let Some(packaging) = parts.get(3) {
                artifact.packaging = packaging.to_string();
            }
            if let Some(classifier) = parts.get(4) {
                artifact.classifier = Some(classifier.to_string());
            }
            return Ok(ArtifactReference::Maven(artifact));
        }

        let scheme_ok = ["http://", "https://", "file://"]
            .iter()
            .any(|scheme| s.starts_with(scheme));
        if !scheme_ok {
            return Err(CarbonError::Config(format!(
                "unsupported artifact reference '{}': expected mvn:, http(s):// or file://",
                s
            )));
        }
        Ok(ArtifactReference::Url(s.to_string()))
    }
}

impl TryFrom<String> for ArtifactReference {
    type Error = CarbonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ArtifactReference> for String {
    fn from(value: ArtifactReference) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactReference::Maven(m) => fmt::Display::fmt(m, f),
            ArtifactReference::Url(url) => f.write_str(url),
        }
    }
}

/// Copy a file into the distribution, replacing what is there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileCopy {
    pub source: PathBuf,
    /// Relative to the distribution home.
    pub destination: PathBuf,
}

impl ConfigFileCopy {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemProperty {
    pub key: String,
    pub value: String,
}

impl SystemProperty {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn to_flag(&self) -> String {
        format!("-D{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl FromStr for EnvironmentVariable {
    type Err = CarbonError;

    /// Parse `NAME=VALUE`. The value may itself contain `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s.split_once('=').ok_or_else(|| {
            CarbonError::Config(format!("invalid environment entry '{}': expected NAME=VALUE", s))
        })?;
        Ok(Self::new(name, value))
    }
}

/// How the distribution's entry point is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchOptions {
    /// Script relative to the distribution home.
    pub entry_point: PathBuf,
    /// Passed as `-Dkey=value`, in order. Duplicate keys are kept.
    pub system_properties: Vec<SystemProperty>,
    /// Passed verbatim after the system properties.
    pub flags: Vec<String>,
    pub environment: Vec<EnvironmentVariable>,
    /// Adds a JDWP agent flag listening on this port.
    pub debug_port: Option<u16>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            entry_point: PathBuf::from(DEFAULT_ENTRY_POINT),
            system_properties: Vec::new(),
            flags: Vec::new(),
            environment: Vec::new(),
            debug_port: None,
        }
    }
}

/// Inclusive port range for the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 21000,
            end: 21099,
        }
    }
}

impl PortRange {
    pub fn len(&self) -> usize {
        (self.end as usize + 1).saturating_sub(self.start as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the test container needs to provision and launch a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    pub distribution: DistributionConfig,
    /// Extra bundles dropped into `osgi/dropins`.
    pub external_bundles: Vec<ArtifactReference>,
    pub config_files: Vec<ConfigFileCopy>,
    pub launch: LaunchOptions,
    /// Remote Maven repositories, tried in order. Empty means Maven Central.
    pub repositories: Vec<String>,
    /// Local Maven repository checked before any remote one.
    pub local_repository: Option<PathBuf>,
    /// Leave the working directory in place after `stop()`.
    pub keep_runtime_directory: bool,
    pub ready_timeout_ms: u64,
    pub ready_poll_interval_ms: u64,
    /// Limit on a single control-channel round trip.
    pub request_timeout_ms: u64,
    pub stop_grace_period_ms: u64,
    pub port_range: PortRange,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            distribution: DistributionConfig::default(),
            external_bundles: Vec::new(),
            config_files: Vec::new(),
            launch: LaunchOptions::default(),
            repositories: Vec::new(),
            local_repository: None,
            keep_runtime_directory: false,
            ready_timeout_ms: 180_000,
            ready_poll_interval_ms: 200,
            request_timeout_ms: 30_000,
            stop_grace_period_ms: 10_000,
            port_range: PortRange::default(),
        }
    }
}

impl ContainerOptions {
    pub fn from_directory(path: impl Into<PathBuf>) -> Self {
        let mut options = Self::default();
        options.distribution.directory = Some(path.into());
        options
    }

    pub fn from_archive(path: impl Into<PathBuf>) -> Self {
        let mut options = Self::default();
        options.distribution.archive = Some(path.into());
        options
    }

    pub fn from_artifact(artifact: ArtifactReference) -> Self {
        let mut options = Self::default();
        options.distribution.artifact = Some(artifact);
        options
    }

    /// Load options from a JSON document.
    pub fn from_json_file(path: &Path) -> CarbonResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CarbonError::Config(format!(
                "failed to read options from {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            CarbonError::Config(format!(
                "failed to parse options in {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    /// Remote repositories in resolution order.
    pub fn effective_repositories(&self) -> Vec<String> {
        if self.repositories.is_empty() {
            vec![MAVEN_CENTRAL.to_string()]
        } else {
            self.repositories.clone()
        }
    }

    /// Local repository, defaulting to `~/.m2/repository` when it exists.
    pub fn effective_local_repository(&self) -> Option<PathBuf> {
        self.local_repository.clone().or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".m2").join("repository"))
                .filter(|repo| repo.is_dir())
        })
    }

    /// Validate options. Performs no file-system or process side effects.
    pub fn sanitize(&self) -> CarbonResult<()> {
        self.distribution.source()?;

        ensure_relative("entry point", &self.launch.entry_point)?;
        for copy in &self.config_files {
            ensure_relative("config file destination", &copy.destination)?;
        }

        for var in &self.launch.environment {
            if var.name.is_empty() || var.name.contains('=') {
                return Err(CarbonError::Config(format!(
                    "invalid environment variable name '{}'",
                    var.name
                )));
            }
        }
        for prop in &self.launch.system_properties {
            if prop.key.is_empty() {
                return Err(CarbonError::Config("system property with empty key".into()));
            }
        }

        if self.port_range.is_empty() {
            return Err(CarbonError::Config(format!(
                "empty registry port range {}-{}",
                self.port_range.start, self.port_range.end
            )));
        }
        if self.ready_poll_interval_ms == 0 {
            return Err(CarbonError::Config(
                "ready_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(CarbonError::Config(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn ensure_relative(what: &str, path: &Path) -> CarbonResult<()> {
    if path.as_os_str().is_empty() {
        return Err(CarbonError::Config(format!("{} is empty", what)));
    }
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(CarbonError::Config(format!(
            "{} must be a relative path inside the distribution: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}
