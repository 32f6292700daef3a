//! Reference implementation of the remote runtime.
//!
//! Stands in for the OSGi framework so the container can be exercised end
//! to end. Bundles live in an in-memory table; the system bundle turns
//! active after a configurable boot delay. Probes are JSON manifests
//! listing test captions and the outcome each one reports.
//!
//! A few diagnostic tests are always available, evaluated against the
//! process the agent runs in:
//!
//! | caption           | arguments              |
//! |-------------------|------------------------|
//! | `assert-property` | `key value`            |
//! | `assert-env`      | `name value`           |
//! | `assert-file`     | `relative [content]`   |
//! | `sleep`           | `millis`               |

use async_trait::async_trait;
use carbon_shared::agent::RuntimeAgent;
use carbon_shared::errors::{CarbonError, CarbonResult};
use carbon_shared::protocol::{BundleId, BundleState, SYSTEM_BUNDLE_ID, TestAddress, TestOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Launch property delaying system bundle activation, in milliseconds.
pub const BOOT_DELAY_PROPERTY: &str = "carbon.test.agent.boot_delay_ms";

/// One test a probe knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTest {
    pub caption: String,
    pub result: TestOutcome,
}

/// Content of a probe bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeManifest {
    pub tests: Vec<ProbeTest>,
}

impl ProbeManifest {
    pub fn test(mut self, caption: impl Into<String>, result: TestOutcome) -> Self {
        self.tests.push(ProbeTest {
            caption: caption.into(),
            result,
        });
        self
    }

    pub fn to_bytes(&self) -> CarbonResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| CarbonError::Internal(format!("failed to encode probe: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> CarbonResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CarbonError::RemoteControl(format!("invalid probe manifest: {}", e)))
    }

    fn find(&self, caption: &str) -> Option<&TestOutcome> {
        self.tests
            .iter()
            .find(|t| t.caption == caption)
            .map(|t| &t.result)
    }
}

#[derive(Debug)]
struct InstalledBundle {
    location: String,
    state: BundleState,
}

#[derive(Debug, Default)]
struct AgentState {
    next_id: BundleId,
    bundles: BTreeMap<BundleId, InstalledBundle>,
    probe: Option<(BundleId, ProbeManifest)>,
    stopping: bool,
}

impl AgentState {
    fn install(&mut self, location: String, state: BundleState) -> BundleId {
        self.next_id += 1;
        let id = self.next_id;
        self.bundles.insert(id, InstalledBundle { location, state });
        id
    }
}

/// In-memory runtime answering control-channel requests.
pub struct ReferenceAgent {
    home: Option<PathBuf>,
    properties: HashMap<String, String>,
    boot_delay: Duration,
    booted_at: Instant,
    state: Mutex<AgentState>,
}

impl ReferenceAgent {
    /// Agent configured from its launch properties.
    pub fn new(home: Option<PathBuf>, properties: HashMap<String, String>) -> CarbonResult<Self> {
        let boot_delay = match properties.get(BOOT_DELAY_PROPERTY) {
            Some(raw) => Duration::from_millis(raw.parse().map_err(|e| {
                CarbonError::Config(format!("invalid {} '{}': {}", BOOT_DELAY_PROPERTY, raw, e))
            })?),
            None => Duration::ZERO,
        };

        Ok(Self {
            home,
            properties,
            boot_delay,
            booted_at: Instant::now(),
            state: Mutex::new(AgentState::default()),
        })
    }

    /// Agent with no home and no properties.
    pub fn detached() -> Self {
        Self {
            home: None,
            properties: HashMap::new(),
            boot_delay: Duration::ZERO,
            booted_at: Instant::now(),
            state: Mutex::new(AgentState::default()),
        }
    }

    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn is_stopping(&self) -> bool {
        self.state.lock().stopping
    }

    fn system_state(&self) -> BundleState {
        if self.state.lock().stopping {
            BundleState::Stopping
        } else if self.booted_at.elapsed() >= self.boot_delay {
            BundleState::Active
        } else {
            BundleState::Starting
        }
    }

    fn builtin(&self, address: &TestAddress) -> Option<TestOutcome> {
        let args = &address.arguments;
        let outcome = match address.caption.as_str() {
            "assert-property" => {
                let (key, expected) = match two_args(args) {
                    Ok(pair) => pair,
                    Err(outcome) => return Some(outcome),
                };
                compare("property", key, self.properties.get(key).map(String::as_str), expected)
            }
            "assert-env" => {
                let (name, expected) = match two_args(args) {
                    Ok(pair) => pair,
                    Err(outcome) => return Some(outcome),
                };
                let actual = std::env::var(name).ok();
                compare("environment variable", name, actual.as_deref(), expected)
            }
            "assert-file" => self.assert_file(args),
            _ => return None,
        };
        Some(outcome)
    }

    fn assert_file(&self, args: &[String]) -> TestOutcome {
        let Some(relative) = args.first() else {
            return TestOutcome::Errored {
                message: "assert-file needs a path".into(),
            };
        };
        let path = match &self.home {
            Some(home) => home.join(relative),
            None => PathBuf::from(relative),
        };

        match (std::fs::read_to_string(&path), args.get(1)) {
            (Err(e), _) => TestOutcome::AssertionFailed {
                message: format!("cannot read {}: {}", path.display(), e),
            },
            (Ok(_), None) => TestOutcome::Passed,
            (Ok(actual), Some(expected)) if actual == *expected => TestOutcome::Passed,
            (Ok(actual), Some(expected)) => TestOutcome::AssertionFailed {
                message: format!(
                    "{}: expected {:?} but was {:?}",
                    path.display(),
                    expected,
                    actual
                ),
            },
        }
    }
}

/// Hold the control channel for `millis`, the way a wedged test would.
async fn sleep(args: &[String]) -> TestOutcome {
    let millis = match args {
        [raw] => raw.parse::<u64>(),
        _ => {
            return TestOutcome::Errored {
                message: format!("sleep expects 1 argument, got {}", args.len()),
            };
        }
    };
    match millis {
        Ok(millis) => {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            TestOutcome::Passed
        }
        Err(e) => TestOutcome::Errored {
            message: format!("invalid sleep duration: {}", e),
        },
    }
}

fn two_args(args: &[String]) -> Result<(&str, &str), TestOutcome> {
    match args {
        [a, b] => Ok((a.as_str(), b.as_str())),
        _ => Err(TestOutcome::Errored {
            message: format!("expected 2 arguments, got {}", args.len()),
        }),
    }
}

fn compare(what: &str, key: &str, actual: Option<&str>, expected: &str) -> TestOutcome {
    match actual {
        Some(actual) if actual == expected => TestOutcome::Passed,
        Some(actual) => TestOutcome::AssertionFailed {
            message: format!("{} {}: expected '{}' but was '{}'", what, key, expected, actual),
        },
        None => TestOutcome::AssertionFailed {
            message: format!("{} {} is not set", what, key),
        },
    }
}

#[async_trait]
impl RuntimeAgent for ReferenceAgent {
    async fn install(&self, location: &str, content: Vec<u8>) -> CarbonResult<BundleId> {
        let id = self
            .state
            .lock()
            .install(location.to_string(), BundleState::Installed);
        tracing::info!(bundle_id = id, location, bytes = content.len(), "Bundle installed");
        Ok(id)
    }

    async fn install_probe(&self, content: Vec<u8>) -> CarbonResult<BundleId> {
        let manifest = ProbeManifest::from_bytes(&content)?;
        let mut state = self.state.lock();
        if let Some((old, _)) = state.probe.take() {
            state.bundles.remove(&old);
        }
        let id = state.install("probe".to_string(), BundleState::Active);
        tracing::info!(bundle_id = id, tests = manifest.tests.len(), "Probe installed");
        state.probe = Some((id, manifest));
        Ok(id)
    }

    async fn uninstall_probe(&self) -> CarbonResult<()> {
        let mut state = self.state.lock();
        let (id, _) = state
            .probe
            .take()
            .ok_or_else(|| CarbonError::RemoteControl("no probe installed".into()))?;
        state.bundles.remove(&id);
        tracing::info!(bundle_id = id, "Probe uninstalled");
        Ok(())
    }

    async fn call(&self, address: &TestAddress) -> TestOutcome {
        if address.caption == "sleep" {
            return sleep(&address.arguments).await;
        }
        if let Some(outcome) = self.builtin(address) {
            return outcome;
        }

        let state = self.state.lock();
        state
            .probe
            .as_ref()
            .and_then(|(_, manifest)| manifest.find(&address.caption))
            .cloned()
            .unwrap_or_else(|| TestOutcome::Errored {
                message: format!("no test named '{}'", address.caption),
            })
    }

    async fn bundle_state(&self, bundle_id: BundleId) -> CarbonResult<BundleState> {
        if bundle_id == SYSTEM_BUNDLE_ID {
            return Ok(self.system_state());
        }
        self.state
            .lock()
            .bundles
            .get(&bundle_id)
            .map(|b| b.state)
            .ok_or_else(|| CarbonError::RemoteControl(format!("no bundle with id {}", bundle_id)))
    }

    async fn stop(&self) -> CarbonResult<()> {
        let mut state = self.state.lock();
        state.stopping = true;
        for (id, bundle) in state.bundles.iter_mut() {
            tracing::debug!(bundle_id = *id, location = %bundle.location, "Stopping bundle");
            bundle.state = BundleState::Resolved;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_properties(pairs: &[(&str, &str)]) -> ReferenceAgent {
        let properties = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ReferenceAgent::new(None, properties).unwrap()
    }

    #[tokio::test]
    async fn test_system_bundle_boot_delay() {
        let agent = ReferenceAgent::detached().with_boot_delay(Duration::from_secs(60));
        assert_eq!(
            agent.bundle_state(SYSTEM_BUNDLE_ID).await.unwrap(),
            BundleState::Starting
        );

        let agent = ReferenceAgent::detached();
        assert_eq!(
            agent.bundle_state(SYSTEM_BUNDLE_ID).await.unwrap(),
            BundleState::Active
        );
        agent.stop().await.unwrap();
        assert!(agent.is_stopping());
        assert_eq!(
            agent.bundle_state(SYSTEM_BUNDLE_ID).await.unwrap(),
            BundleState::Stopping
        );
    }

    #[test]
    fn test_invalid_boot_delay() {
        let mut properties = HashMap::new();
        properties.insert(BOOT_DELAY_PROPERTY.to_string(), "soon".to_string());
        assert!(matches!(
            ReferenceAgent::new(None, properties),
            Err(CarbonError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_assert_property() {
        let agent = with_properties(&[("carbon.home", "/opt/carbon")]);

        let ok = TestAddress::new("assert-property")
            .arg("carbon.home")
            .arg("/opt/carbon");
        assert_eq!(agent.call(&ok).await, TestOutcome::Passed);

        let wrong = TestAddress::new("assert-property")
            .arg("carbon.home")
            .arg("/tmp");
        assert!(matches!(agent.call(&wrong).await, TestOutcome::AssertionFailed { .. }));

        let missing = TestAddress::new("assert-property").arg("nope").arg("x");
        assert!(matches!(agent.call(&missing).await, TestOutcome::AssertionFailed { .. }));

        let malformed = TestAddress::new("assert-property").arg("carbon.home");
        assert!(matches!(agent.call(&malformed).await, TestOutcome::Errored { .. }));
    }

    #[tokio::test]
    async fn test_assert_file_relative_to_home() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("conf")).unwrap();
        std::fs::write(home.path().join("conf/app.conf"), "port=9443").unwrap();
        let agent = ReferenceAgent::new(Some(home.path().to_path_buf()), HashMap::new()).unwrap();

        let exists = TestAddress::new("assert-file").arg("conf/app.conf");
        assert_eq!(agent.call(&exists).await, TestOutcome::Passed);

        let content = TestAddress::new("assert-file")
            .arg("conf/app.conf")
            .arg("port=9443");
        assert_eq!(agent.call(&content).await, TestOutcome::Passed);

        let absent = TestAddress::new("assert-file").arg("conf/missing.conf");
        assert!(matches!(agent.call(&absent).await, TestOutcome::AssertionFailed { .. }));
    }

    #[tokio::test]
    async fn test_probe_replaced_on_reinstall() {
        let agent = ReferenceAgent::detached();
        let first = ProbeManifest::default().test("a", TestOutcome::Passed);
        let second = ProbeManifest::default().test("b", TestOutcome::Passed);

        let first_id = agent.install_probe(first.to_bytes().unwrap()).await.unwrap();
        let second_id = agent.install_probe(second.to_bytes().unwrap()).await.unwrap();
        assert_ne!(first_id, second_id);
        assert!(agent.bundle_state(first_id).await.is_err());

        assert!(matches!(
            agent.call(&TestAddress::new("a")).await,
            TestOutcome::Errored { .. }
        ));
        assert_eq!(agent.call(&TestAddress::new("b")).await, TestOutcome::Passed);
    }

    #[tokio::test]
    async fn test_sleep_builtin() {
        let agent = ReferenceAgent::detached();
        let started = Instant::now();
        let nap = TestAddress::new("sleep").arg("50");
        assert_eq!(agent.call(&nap).await, TestOutcome::Passed);
        assert!(started.elapsed() >= Duration::from_millis(50));

        let bad = TestAddress::new("sleep").arg("forever");
        assert!(matches!(agent.call(&bad).await, TestOutcome::Errored { .. }));
    }

    #[tokio::test]
    async fn test_garbage_probe_rejected() {
        let agent = ReferenceAgent::detached();
        let err = agent.install_probe(b"not json".to_vec()).await.unwrap_err();
        assert!(matches!(err, CarbonError::RemoteControl(_)));
    }
}
