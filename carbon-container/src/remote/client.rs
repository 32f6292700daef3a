//! Driver side of the control channel.

use async_trait::async_trait;
use carbon_shared::errors::{CarbonError, CarbonResult};
use carbon_shared::protocol::{
    BundleId, BundleState, Request, Response, TestAddress, TestOutcome, read_frame, write_frame,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Operations the test driver performs on the remote runtime.
#[async_trait]
pub trait RemoteBundleContext: Send {
    /// Install a bundle from `content`; `location` is its identity remotely.
    async fn install(&mut self, location: &str, content: Vec<u8>) -> CarbonResult<BundleId>;

    /// Install the test probe, replacing any previous one.
    async fn install_probe(&mut self, content: Vec<u8>) -> CarbonResult<BundleId>;

    async fn uninstall_probe(&mut self) -> CarbonResult<()>;

    /// Run a test.
    ///
    /// Assertion failures surface as [`CarbonError::Assertion`], anything
    /// else the test threw as [`CarbonError::RemoteControl`].
    async fn call(&mut self, address: &TestAddress) -> CarbonResult<()>;

    async fn bundle_state(&mut self, bundle_id: BundleId) -> CarbonResult<BundleState>;

    /// Poll until `bundle_id` reaches `state`.
    ///
    /// The state is checked at least once, so a zero timeout performs a
    /// single check and then fails with [`CarbonError::ReadinessTimeout`].
    /// Each check is bounded by the deadline; the first one gets at least
    /// one poll interval. A runtime that stops answering times out the same
    /// way as one that never becomes ready.
    async fn wait_for_state(
        &mut self,
        bundle_id: BundleId,
        state: BundleState,
        timeout: Duration,
        poll_interval: Duration,
    ) -> CarbonResult<()> {
        let deadline = Instant::now() + timeout;
        let mut check_deadline = deadline.max(Instant::now() + poll_interval);
        loop {
            let current =
                match tokio::time::timeout_at(check_deadline, self.bundle_state(bundle_id)).await {
                    Ok(current) => Some(current?),
                    Err(_) => None,
                };
            if current == Some(state) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline || current.is_none() {
                tracing::debug!(bundle_id, current = ?current, wanted = ?state, "Bundle state wait timed out");
                return Err(CarbonError::ReadinessTimeout { bundle_id, timeout });
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
            check_deadline = deadline;
        }
    }

    /// Ask the runtime to shut down.
    async fn stop(&mut self) -> CarbonResult<()>;
}

/// Round-trip limit used until the container applies its configured one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connected control channel to one registered runtime.
///
/// Requests are answered in order, so a request abandoned before its
/// response arrived (timed out or cancelled) leaves the channel out of
/// sync. Every later request then fails with [`CarbonError::RemoteControl`].
#[derive(Debug)]
pub struct RbcClient {
    stream: TcpStream,
    name: String,
    request_timeout: Duration,
    in_flight: Option<&'static str>,
}

impl RbcClient {
    pub(crate) fn new(stream: TcpStream, name: String) -> Self {
        Self {
            stream,
            name,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            in_flight: None,
        }
    }

    pub(crate) fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Name the runtime registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn request(&mut self, request: Request) -> CarbonResult<Response> {
        let kind = request.kind();
        if let Some(abandoned) = self.in_flight {
            return Err(CarbonError::RemoteControl(format!(
                "control channel to '{}' is out of sync: {} never completed",
                self.name, abandoned
            )));
        }

        self.in_flight = Some(kind);
        let timeout = self.request_timeout;
        let stream = &mut self.stream;
        let exchange = async move {
            write_frame(&mut *stream, &request).await?;
            read_frame::<_, Response>(&mut *stream).await
        };
        let response = tokio::time::timeout(timeout, exchange).await.map_err(|_| {
            tracing::warn!(name = %self.name, request = kind, ?timeout, "Control request timed out");
            CarbonError::RemoteControl(format!(
                "{} on '{}' got no response within {:?}",
                kind, self.name, timeout
            ))
        })??;
        self.in_flight = None;

        match response {
            Some(Response::Error { message }) => Err(CarbonError::RemoteControl(format!(
                "{} failed remotely: {}",
                kind, message
            ))),
            Some(response) => Ok(response),
            None => Err(CarbonError::RemoteControl(format!(
                "connection to '{}' closed during {}",
                self.name, kind
            ))),
        }
    }
}

fn unexpected(kind: &str, response: Response) -> CarbonError {
    CarbonError::RemoteControl(format!("unexpected response to {}: {:?}", kind, response))
}

#[async_trait]
impl RemoteBundleContext for RbcClient {
    async fn install(&mut self, location: &str, content: Vec<u8>) -> CarbonResult<BundleId> {
        let request = Request::Install {
            location: location.to_string(),
            content,
        };
        match self.request(request).await? {
            Response::Installed { bundle_id } => Ok(bundle_id),
            other => Err(unexpected("install", other)),
        }
    }

    async fn install_probe(&mut self, content: Vec<u8>) -> CarbonResult<BundleId> {
        match self.request(Request::InstallProbe { content }).await? {
            Response::Installed { bundle_id } => Ok(bundle_id),
            other => Err(unexpected("install_probe", other)),
        }
    }

    async fn uninstall_probe(&mut self) -> CarbonResult<()> {
        match self.request(Request::UninstallProbe).await? {
            Response::Done => Ok(()),
            other => Err(unexpected("uninstall_probe", other)),
        }
    }

    async fn call(&mut self, address: &TestAddress) -> CarbonResult<()> {
        let request = Request::Call {
            address: address.clone(),
        };
        let outcome = match self.request(request).await? {
            Response::Outcome { outcome } => outcome,
            other => return Err(unexpected("call", other)),
        };

        match outcome {
            TestOutcome::Passed => Ok(()),
            TestOutcome::AssertionFailed { message } => Err(CarbonError::Assertion {
                caption: address.caption.clone(),
                message,
            }),
            TestOutcome::Errored { message } => Err(CarbonError::RemoteControl(format!(
                "test '{}' failed: {}",
                address.caption, message
            ))),
        }
    }

    async fn bundle_state(&mut self, bundle_id: BundleId) -> CarbonResult<BundleState> {
        match self.request(Request::BundleState { bundle_id }).await? {
            Response::State { state } => Ok(state),
            other => Err(unexpected("bundle_state", other)),
        }
    }

    async fn stop(&mut self) -> CarbonResult<()> {
        match self.request(Request::Stop).await? {
            Response::Done => Ok(()),
            other => Err(unexpected("stop", other)),
        }
    }
}
