//! Artifact resolution and download.
//!
//! Maven coordinates are looked up in the local repository first and then in
//! each remote repository in order. Direct URLs are fetched as-is. `file://`
//! locations are copied without going through HTTP.

use crate::options::{ArtifactReference, ContainerOptions};
use carbon_shared::errors::{CarbonError, CarbonResult};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const HTTP_TIMEOUT_SECS: u64 = 600;
const USER_AGENT: &str = concat!("carbon-test-container/", env!("CARGO_PKG_VERSION"));

/// A concrete place an artifact can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    File(PathBuf),
    Remote(Url),
}

impl std::fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactLocation::File(path) => write!(f, "{}", path.display()),
            ArtifactLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

pub struct ArtifactResolver {
    local_repository: Option<PathBuf>,
    repositories: Vec<String>,
    client: reqwest::Client,
}

impl ArtifactResolver {
    pub fn new(local_repository: Option<PathBuf>, repositories: Vec<String>) -> CarbonResult<Self> {
        let client = http_client(reqwest::Client::builder())?;
        Ok(Self::with_client(local_repository, repositories, client))
    }

    pub(crate) fn with_client(
        local_repository: Option<PathBuf>,
        repositories: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            local_repository,
            repositories,
            client,
        }
    }

    pub fn from_options(options: &ContainerOptions) -> CarbonResult<Self> {
        Self::new(
            options.effective_local_repository(),
            options.effective_repositories(),
        )
    }

    /// Every location the reference may resolve to, in lookup order.
    pub fn candidates(&self, reference: &ArtifactReference) -> CarbonResult<Vec<ArtifactLocation>> {
        match reference {
            ArtifactReference::Url(url) => Ok(vec![parse_location(url)?]),
            ArtifactReference::Maven(artifact) => {
                let relative = artifact.repository_path();
                let mut locations = Vec::with_capacity(self.repositories.len() + 1);

                if let Some(local) = &self.local_repository {
                    locations.push(ArtifactLocation::File(local.join(&relative)));
                }
                for repository in &self.repositories {
                    let url = format!("{}/{}", repository.trim_end_matches('/'), relative);
                    locations.push(parse_location(&url)?);
                }
                Ok(locations)
            }
        }
    }

    /// Download `reference` to `destination`, trying each candidate location.
    pub async fn fetch(&self, reference: &ArtifactReference, destination: &Path) -> CarbonResult<()> {
        let mut failures = Vec::new();

        for location in self.candidates(reference)? {
            match self.fetch_location(&location, destination).await {
                Ok(bytes) => {
                    tracing::debug!(
                        artifact = %reference,
                        location = %location,
                        bytes,
                        "Fetched artifact"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(artifact = %reference, location = %location, error = %e, "Artifact not available");
                    failures.push(format!("{}: {}", location, e));
                }
            }
        }

        // Leave nothing half-written behind.
        let _ = tokio::fs::remove_file(destination).await;

        Err(CarbonError::Provisioning(format!(
            "could not resolve {} ({})",
            reference,
            failures.join("; ")
        )))
    }

    async fn fetch_location(&self, location: &ArtifactLocation, destination: &Path) -> CarbonResult<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CarbonError::Provisioning(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        match location {
            ArtifactLocation::File(path) => {
                if !path.is_file() {
                    return Err(CarbonError::Provisioning("not found".into()));
                }
                tokio::fs::copy(path, destination).await.map_err(|e| {
                    CarbonError::Provisioning(format!(
                        "failed to copy to {}: {}",
                        destination.display(),
                        e
                    ))
                })
            }
            ArtifactLocation::Remote(url) => self.download(url, destination).await,
        }
    }

    /// Stream `url` into a temporary sibling of `destination`, renamed into
    /// place once the body is complete.
    async fn download(&self, url: &Url, destination: &Path) -> CarbonResult<u64> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CarbonError::Provisioning(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CarbonError::Provisioning(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let parent = destination.parent().unwrap_or_else(|| Path::new("."));
        let partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(parent)
            .map_err(|e| {
                CarbonError::Provisioning(format!("failed to create download file in {}: {}", parent.display(), e))
            })?;
        let handle = partial.reopen().map_err(|e| {
            CarbonError::Provisioning(format!("failed to open {}: {}", partial.path().display(), e))
        })?;
        let mut file = tokio::fs::File::from_std(handle);

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CarbonError::Provisioning(format!("download interrupted: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(|e| {
                CarbonError::Provisioning(format!("failed to write {}: {}", destination.display(), e))
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            CarbonError::Provisioning(format!("failed to flush {}: {}", destination.display(), e))
        })?;
        drop(file);

        partial.persist(destination).map_err(|e| {
            CarbonError::Provisioning(format!(
                "failed to move download to {}: {}",
                destination.display(),
                e.error
            ))
        })?;
        Ok(written)
    }
}

fn http_client(builder: reqwest::ClientBuilder) -> CarbonResult<reqwest::Client> {
    builder
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CarbonError::Config(format!("failed to create HTTP client: {}", e)))
}

fn parse_location(raw: &str) -> CarbonResult<ArtifactLocation> {
    let url = Url::parse(raw)
        .map_err(|e| CarbonError::Config(format!("invalid artifact URL '{}': {}", raw, e)))?;

    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(ArtifactLocation::File)
            .map_err(|_| CarbonError::Config(format!("invalid file URL '{}'", raw))),
        "http" | "https" => Ok(ArtifactLocation::Remote(url)),
        other => Err(CarbonError::Config(format!(
            "unsupported URL scheme '{}' in '{}'",
            other, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MavenArtifact;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Canned answer for one path of the stub repository.
    struct Route {
        path: String,
        status: u16,
        body: Vec<u8>,
        /// Advertised length when it differs from the body, to cut a
        /// transfer short.
        content_length: Option<usize>,
    }

    impl Route {
        fn ok(path: &str, body: Vec<u8>) -> Self {
            Self {
                path: path.to_string(),
                status: 200,
                body,
                content_length: None,
            }
        }
    }

    /// Serve `routes` over HTTP/1.1 on a loopback port; unknown paths get 404.
    async fn serve_http(routes: Vec<Route>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes = std::sync::Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let routes = std::sync::Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let (status, body, length) = match routes.iter().find(|r| r.path == path) {
                        Some(r) => (r.status, r.body.clone(), r.content_length.unwrap_or(r.body.len())),
                        None => (404, b"not found".to_vec(), 9),
                    };
                    let reason = if status == 200 { "OK" } else { "Not Found" };
                    let header = format!(
                        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status, reason, length
                    );
                    let _ = stream.write_all(header.as_bytes()).await;
                    let _ = stream.write_all(&body).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        base
    }

    fn loopback_resolver(repositories: Vec<String>) -> ArtifactResolver {
        let client = http_client(reqwest::Client::builder().no_proxy()).unwrap();
        ArtifactResolver::with_client(None, repositories, client)
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn file_url(path: &Path) -> String {
        Url::from_file_path(path).unwrap().to_string()
    }

    #[test]
    fn test_candidates_order() {
        let resolver = ArtifactResolver::new(
            Some(PathBuf::from("/home/u/.m2/repository")),
            vec!["https://repo.example/maven2/".into(), "https://mirror.example/m2".into()],
        )
        .unwrap();
        let reference = ArtifactReference::Maven(MavenArtifact::new("org.wso2", "kernel", "5.1.0"));

        let candidates = resolver.candidates(&reference).unwrap();
        assert_eq!(candidates.len(), 3);
        assert_eq!(
            candidates[0],
            ArtifactLocation::File(PathBuf::from(
                "/home/u/.m2/repository/org/wso2/kernel/5.1.0/kernel-5.1.0.jar"
            ))
        );
        assert_eq!(
            candidates[1].to_string(),
            "https://repo.example/maven2/org/wso2/kernel/5.1.0/kernel-5.1.0.jar"
        );
        assert_eq!(
            candidates[2].to_string(),
            "https://mirror.example/m2/org/wso2/kernel/5.1.0/kernel-5.1.0.jar"
        );
    }

    #[tokio::test]
    async fn test_fetch_falls_through_to_file_repository() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let artifact = MavenArtifact::new("org.example", "bundle", "1.0");
        let stored = repo.path().join(artifact.repository_path());
        std::fs::create_dir_all(stored.parent().unwrap()).unwrap();
        std::fs::write(&stored, b"jar-bytes").unwrap();

        let resolver = ArtifactResolver::new(
            Some(out.path().join("empty-local-repo")),
            vec![file_url(repo.path())],
        )
        .unwrap();

        let destination = out.path().join("bundle.jar");
        resolver
            .fetch(&ArtifactReference::Maven(artifact), &destination)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"jar-bytes");
    }

    #[tokio::test]
    async fn test_fetch_missing_reports_every_location() {
        let out = TempDir::new().unwrap();
        let resolver =
            ArtifactResolver::new(None, vec![file_url(&out.path().join("nowhere"))]).unwrap();
        let destination = out.path().join("x.jar");

        let err = resolver
            .fetch(
                &ArtifactReference::Maven(MavenArtifact::new("a", "b", "1")),
                &destination,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(_)));
        assert!(err.to_string().contains("b-1.jar"));
        assert!(!destination.exists());
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(parse_location("ftp://example/x.jar").is_err());
    }

    #[tokio::test]
    async fn test_http_download_streams_to_disk() {
        let artifact = MavenArtifact::new("org.example", "bundle", "1.0");
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let base = serve_http(vec![Route::ok(
            &format!("/maven2/{}", artifact.repository_path()),
            body.clone(),
        )])
        .await;

        let out = TempDir::new().unwrap();
        let destination = out.path().join("bundle.jar");
        loopback_resolver(vec![format!("{}/maven2", base)])
            .fetch(&ArtifactReference::Maven(artifact), &destination)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), body);
        assert_eq!(entries(out.path()), vec!["bundle.jar"]);
    }

    #[tokio::test]
    async fn test_http_not_found_tries_next_repository() {
        let artifact = MavenArtifact::new("org.example", "bundle", "1.0");
        let base = serve_http(vec![Route::ok(
            &format!("/mirror/{}", artifact.repository_path()),
            b"from the mirror".to_vec(),
        )])
        .await;

        let out = TempDir::new().unwrap();
        let destination = out.path().join("bundle.jar");
        loopback_resolver(vec![format!("{}/central", base), format!("{}/mirror/", base)])
            .fetch(&ArtifactReference::Maven(artifact), &destination)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"from the mirror");
        assert_eq!(entries(out.path()), vec!["bundle.jar"]);
    }

    #[tokio::test]
    async fn test_http_failures_leave_no_file() {
        let base = serve_http(vec![Route {
            path: "/cut/short.jar".into(),
            status: 200,
            body: b"only part of it".to_vec(),
            content_length: Some(100_000),
        }])
        .await;
        let out = TempDir::new().unwrap();
        let resolver = loopback_resolver(Vec::new());

        let truncated: ArtifactReference = format!("{}/cut/short.jar", base).parse().unwrap();
        let destination = out.path().join("short.jar");
        let err = resolver.fetch(&truncated, &destination).await.unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(_)));
        assert!(entries(out.path()).is_empty());

        let missing: ArtifactReference = format!("{}/absent.jar", base).parse().unwrap();
        let err = resolver
            .fetch(&missing, &out.path().join("absent.jar"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(entries(out.path()).is_empty());
    }
}
