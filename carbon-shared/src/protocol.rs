//! Control-channel wire protocol.
//!
//! Frames are a 4-byte big-endian length followed by a JSON document. The
//! remote runtime dials the registry, announces itself with [`Request::Hello`]
//! and from then on answers requests sent by the test driver, one response
//! per request, in order.

use crate::errors::{CarbonError, CarbonResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for a single frame. Probes are small; distributions never cross the wire.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// System property carrying the registry host.
pub const RBC_HOST_PROPERTY: &str = "carbon.test.rbc.host";
/// System property carrying the registry port.
pub const RBC_PORT_PROPERTY: &str = "carbon.test.rbc.port";
/// System property carrying the registered name.
pub const RBC_NAME_PROPERTY: &str = "carbon.test.rbc.name";
/// Tells the runtime that test services should be injected into probes.
pub const INJECT_PROPERTY: &str = "carbon.test.inject";

/// The framework bundle. Its state is the readiness signal.
pub const SYSTEM_BUNDLE_ID: BundleId = 0;

pub type BundleId = u64;

/// Bundle lifecycle states as reported by the remote runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    Uninstalled,
    Installed,
    Resolved,
    Starting,
    Stopping,
    Active,
}

/// Address of a test method inside the remote runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAddress {
    /// Unique id of this invocation.
    pub identifier: String,
    /// Test name the remote side resolves.
    pub caption: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl TestAddress {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            identifier: uuid::Uuid::new_v4().to_string(),
            caption: caption.into(),
            arguments: Vec::new(),
        }
    }

    pub fn arg(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }
}

/// Result of running a test remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    AssertionFailed { message: String },
    Errored { message: String },
}

/// Where the remote runtime should connect back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl Endpoint {
    /// Launch properties that hand this endpoint to the child process.
    pub fn to_properties(&self) -> Vec<(String, String)> {
        vec![
            (RBC_HOST_PROPERTY.to_string(), self.host.clone()),
            (RBC_PORT_PROPERTY.to_string(), self.port.to_string()),
            (RBC_NAME_PROPERTY.to_string(), self.name.clone()),
        ]
    }

    /// Recover the endpoint from launch properties on the remote side.
    pub fn from_properties(properties: &HashMap<String, String>) -> CarbonResult<Self> {
        let get = |key: &str| {
            properties
                .get(key)
                .cloned()
                .ok_or_else(|| CarbonError::Config(format!("missing launch property {}", key)))
        };
        let port = get(RBC_PORT_PROPERTY)?;
        let port = port
            .parse::<u16>()
            .map_err(|e| CarbonError::Config(format!("invalid registry port '{}': {}", port, e)))?;

        Ok(Self {
            host: get(RBC_HOST_PROPERTY)?,
            port,
            name: get(RBC_NAME_PROPERTY)?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// First frame sent by the remote runtime after dialing the registry.
    Hello { name: String },
    Install {
        location: String,
        #[serde(with = "base64_bytes")]
        content: Vec<u8>,
    },
    InstallProbe {
        #[serde(with = "base64_bytes")]
        content: Vec<u8>,
    },
    UninstallProbe,
    Call { address: TestAddress },
    BundleState { bundle_id: BundleId },
    Stop,
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Install { .. } => "install",
            Request::InstallProbe { .. } => "install_probe",
            Request::UninstallProbe => "uninstall_probe",
            Request::Call { .. } => "call",
            Request::BundleState { .. } => "bundle_state",
            Request::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Registered,
    Installed { bundle_id: BundleId },
    Done,
    State { state: BundleState },
    Outcome { outcome: TestOutcome },
    Error { message: String },
}

/// Write one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> CarbonResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)
        .map_err(|e| CarbonError::RemoteControl(format!("failed to encode frame: {}", e)))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(CarbonError::RemoteControl(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    writer
        .write_u32(payload.len() as u32)
        .await
        .map_err(io_error)?;
    writer.write_all(&payload).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)
}

/// Read one frame. Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> CarbonResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(e)),
    };
    if len > MAX_FRAME_LEN {
        return Err(CarbonError::RemoteControl(format!(
            "incoming frame of {} bytes exceeds limit of {} bytes",
            len, MAX_FRAME_LEN
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(io_error)?;
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| CarbonError::RemoteControl(format!("failed to decode frame: {}", e)))
}

fn io_error(e: std::io::Error) -> CarbonError {
    CarbonError::RemoteControl(format!("control channel I/O failed: {}", e))
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
