//! Registry the launched runtime dials back to.

use super::client::RbcClient;
use crate::options::PortRange;
use carbon_shared::errors::{CarbonError, CarbonResult};
use carbon_shared::protocol::{Endpoint, Request, Response, read_frame, write_frame};
use rand::Rng;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// Host the registry listens on. The runtime always runs on this machine.
pub const REGISTRY_HOST: &str = "127.0.0.1";

/// Prefix of every registered name.
pub const NAME_PREFIX: &str = "CarbonTestContainer";

/// Listening side of the control channel for one container instance.
pub struct Registry {
    listener: TcpListener,
    endpoint: Endpoint,
}

impl Registry {
    /// Bind the first free port in `range`, starting at a random offset.
    pub async fn bind(range: PortRange, host: &str) -> CarbonResult<Self> {
        if range.is_empty() {
            return Err(CarbonError::Config(format!(
                "empty registry port range {}-{}",
                range.start, range.end
            )));
        }

        let len = range.len();
        let offset = rand::rng().random_range(0..len);
        for i in 0..len {
            let port = range.start + ((offset + i) % len) as u16;
            match TcpListener::bind((host, port)).await {
                Ok(listener) => {
                    let endpoint = Endpoint {
                        host: host.to_string(),
                        port,
                        name: format!("{}-{}", NAME_PREFIX, uuid::Uuid::new_v4()),
                    };
                    tracing::debug!(
                        endpoint = %endpoint.address(),
                        name = %endpoint.name,
                        "Registry bound"
                    );
                    return Ok(Self { listener, endpoint });
                }
                Err(e) => {
                    tracing::trace!(port, error = %e, "Registry port unavailable");
                }
            }
        }

        Err(CarbonError::RemoteControl(format!(
            "no free registry port in {}-{}",
            range.start, range.end
        )))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Wait for the runtime registered under our name to connect.
    ///
    /// Connections announcing a different name are refused and the registry
    /// keeps listening until `timeout` elapses.
    pub async fn accept(&self, timeout: Duration) -> CarbonResult<RbcClient> {
        let deadline = Instant::now() + timeout;

        loop {
            let (stream, peer) = tokio::time::timeout_at(deadline, self.listener.accept())
                .await
                .map_err(|_| {
                    CarbonError::RemoteControl(format!(
                        "'{}' did not connect within {:?}",
                        self.endpoint.name, timeout
                    ))
                })?
                .map_err(|e| CarbonError::RemoteControl(format!("accept failed: {}", e)))?;

            match tokio::time::timeout_at(deadline, self.handshake(stream, peer)).await {
                Ok(Ok(Some(client))) => return Ok(client),
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "Control channel handshake failed");
                    continue;
                }
                Err(_) => {
                    return Err(CarbonError::RemoteControl(format!(
                        "handshake with {} did not complete within {:?}",
                        peer, timeout
                    )));
                }
            }
        }
    }

    async fn handshake(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> CarbonResult<Option<RbcClient>> {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(peer = %peer, error = %e, "Failed to disable Nagle on control channel");
        }

        let name = match read_frame::<_, Request>(&mut stream).await? {
            Some(Request::Hello { name }) => name,
            Some(other) => {
                let message = format!("expected hello, got {}", other.kind());
                write_frame(&mut stream, &Response::Error { message }).await?;
                return Ok(None);
            }
            None => return Ok(None),
        };

        if name != self.endpoint.name {
            tracing::warn!(peer = %peer, name = %name, expected = %self.endpoint.name, "Rejecting unknown runtime");
            let message = format!("unknown name '{}'", name);
            write_frame(&mut stream, &Response::Error { message }).await?;
            return Ok(None);
        }

        write_frame(&mut stream, &Response::Registered).await?;
        tracing::info!(peer = %peer, name = %name, "Runtime registered");
        Ok(Some(RbcClient::new(stream, name)))
    }
}
