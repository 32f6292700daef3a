//! Remote side of the control channel.
//!
//! A runtime that wants to be driven by the test container implements
//! [`RuntimeAgent`] and calls [`serve`] with the endpoint it received through
//! its launch properties.

use crate::errors::{CarbonError, CarbonResult};
use crate::protocol::{
    BundleId, BundleState, Endpoint, Request, Response, TestAddress, TestOutcome, read_frame,
    write_frame,
};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Capabilities the remote runtime exposes to the test driver.
#[async_trait]
pub trait RuntimeAgent: Send + Sync {
    /// Install a bundle and return its id.
    async fn install(&self, location: &str, content: Vec<u8>) -> CarbonResult<BundleId>;

    /// Install the transient test probe, replacing any previous one.
    async fn install_probe(&self, content: Vec<u8>) -> CarbonResult<BundleId>;

    async fn uninstall_probe(&self) -> CarbonResult<()>;

    /// Run a test. Failures are reported through the outcome, not the channel.
    async fn call(&self, address: &TestAddress) -> TestOutcome;

    async fn bundle_state(&self, bundle_id: BundleId) -> CarbonResult<BundleState>;

    /// Begin shutting the runtime down.
    async fn stop(&self) -> CarbonResult<()>;
}

/// Dial the registry at `endpoint` and serve requests until stopped.
pub async fn serve<A: RuntimeAgent + ?Sized>(endpoint: &Endpoint, agent: &A) -> CarbonResult<()> {
    let stream = TcpStream::connect(endpoint.address()).await.map_err(|e| {
        CarbonError::RemoteControl(format!(
            "failed to connect to registry at {}: {}",
            endpoint.address(),
            e
        ))
    })?;
    stream.set_nodelay(true).map_err(|e| {
        CarbonError::RemoteControl(format!("failed to configure control socket: {}", e))
    })?;

    tracing::info!(endpoint = %endpoint.address(), name = %endpoint.name, "Connected to test container registry");
    serve_stream(stream, &endpoint.name, agent).await
}

/// Serve requests on an already connected stream.
///
/// Returns when the driver sends `Stop` or closes the connection.
pub async fn serve_stream<S, A>(mut stream: S, name: &str, agent: &A) -> CarbonResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    A: RuntimeAgent + ?Sized,
{
    write_frame(
        &mut stream,
        &Request::Hello {
            name: name.to_string(),
        },
    )
    .await?;

    match read_frame::<_, Response>(&mut stream).await? {
        Some(Response::Registered) => {}
        Some(Response::Error { message }) => {
            return Err(CarbonError::RemoteControl(format!(
                "registry rejected '{}': {}",
                name, message
            )));
        }
        Some(other) => {
            return Err(CarbonError::RemoteControl(format!(
                "unexpected handshake response: {:?}",
                other
            )));
        }
        None => {
            return Err(CarbonError::RemoteControl(
                "registry closed the connection during handshake".into(),
            ));
        }
    }

    while let Some(request) = read_frame::<_, Request>(&mut stream).await? {
        let kind = request.kind();
        tracing::debug!(request = kind, "Handling control request");

        let stop = matches!(request, Request::Stop);
        let response = dispatch(agent, request).await;
        write_frame(&mut stream, &response).await?;

        if stop {
            tracing::info!("Stop requested by test container");
            return Ok(());
        }
    }

    tracing::info!("Test container closed the control channel");
    Ok(())
}

async fn dispatch<A: RuntimeAgent + ?Sized>(agent: &A, request: Request) -> Response {
    let result = match request {
        Request::Hello { .. } => Err(CarbonError::RemoteControl(
            "handshake already completed".into(),
        )),
        Request::Install { location, content } => agent
            .install(&location, content)
            .await
            .map(|bundle_id| Response::Installed { bundle_id }),
        Request::InstallProbe { content } => agent
            .install_probe(content)
            .await
            .map(|bundle_id| Response::Installed { bundle_id }),
        Request::UninstallProbe => agent.uninstall_probe().await.map(|_| Response::Done),
        Request::Call { address } => Ok(Response::Outcome {
            outcome: agent.call(&address).await,
        }),
        Request::BundleState { bundle_id } => agent
            .bundle_state(bundle_id)
            .await
            .map(|state| Response::State { state }),
        Request::Stop => agent.stop().await.map(|_| Response::Done),
    };

    result.unwrap_or_else(|e| Response::Error {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct NullAgent {
        stopped: AtomicBool,
    }

    #[async_trait]
    impl RuntimeAgent for NullAgent {
        async fn install(&self, _location: &str, content: Vec<u8>) -> CarbonResult<BundleId> {
            Ok(content.len() as BundleId)
        }

        async fn install_probe(&self, _content: Vec<u8>) -> CarbonResult<BundleId> {
            Err(CarbonError::Internal("probe rejected".into()))
        }

        async fn uninstall_probe(&self) -> CarbonResult<()> {
            Ok(())
        }

        async fn call(&self, _address: &TestAddress) -> TestOutcome {
            TestOutcome::Passed
        }

        async fn bundle_state(&self, _bundle_id: BundleId) -> CarbonResult<BundleState> {
            Ok(BundleState::Active)
        }

        async fn stop(&self) -> CarbonResult<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handshake_and_dispatch() {
        let (agent_side, mut driver_side) = tokio::io::duplex(4096);
        let agent = NullAgent::default();

        let driver = async move {
            let hello: Request = read_frame(&mut driver_side).await.unwrap().unwrap();
            assert_eq!(hello, Request::Hello { name: "rbc-1".into() });
            write_frame(&mut driver_side, &Response::Registered).await.unwrap();

            write_frame(
                &mut driver_side,
                &Request::Install {
                    location: "local".into(),
                    content: vec![1, 2, 3],
                },
            )
            .await
            .unwrap();
            let installed: Response = read_frame(&mut driver_side).await.unwrap().unwrap();
            assert_eq!(installed, Response::Installed { bundle_id: 3 });

            write_frame(&mut driver_side, &Request::InstallProbe { content: vec![] })
                .await
                .unwrap();
            let rejected: Response = read_frame(&mut driver_side).await.unwrap().unwrap();
            assert!(matches!(rejected, Response::Error { message } if message.contains("probe rejected")));

            write_frame(&mut driver_side, &Request::Stop).await.unwrap();
            let done: Response = read_frame(&mut driver_side).await.unwrap().unwrap();
            assert_eq!(done, Response::Done);
        };

        let (served, ()) = tokio::join!(serve_stream(agent_side, "rbc-1", &agent), driver);
        served.unwrap();
        assert!(agent.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_rejected_handshake() {
        let (agent_side, mut driver_side) = tokio::io::duplex(4096);
        let agent = NullAgent::default();

        let driver = async move {
            let _hello: Request = read_frame(&mut driver_side).await.unwrap().unwrap();
            write_frame(
                &mut driver_side,
                &Response::Error {
                    message: "unknown name".into(),
                },
            )
            .await
            .unwrap();
        };

        let (served, ()) = tokio::join!(serve_stream(agent_side, "other", &agent), driver);
        let err = served.unwrap_err();
        assert!(err.to_string().contains("unknown name"));
    }
}
