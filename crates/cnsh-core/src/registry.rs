//! Registry client: resolves a package name to its latest archive.
//!
//! The [`RegistryClient`] trait abstracts the registry so the package
//! manager can be driven by an in-process fake in tests. The
//! [`HttpRegistryClient`] speaks the npm metadata API:
//! `GET <registry>/<name>/latest` answering
//! `{ "version": "...", "dist": { "tarball": "..." } }`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{CnshError, Result};

/// Result of resolving a package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Package name as requested.
    pub name: String,
    /// Version the registry reports as latest.
    pub version: String,
    /// URL of the distribution archive.
    pub tarball_url: String,
}

/// Abstract registry backend.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Resolve `name` to its latest version and archive URL.
    ///
    /// Fails with [`CnshError::Resolution`] on network failure or an unknown
    /// package.
    async fn resolve(&self, name: &str) -> Result<Resolution>;
}

#[derive(Debug, Deserialize)]
struct LatestMetadata {
    version: String,
    dist: DistInfo,
}

#[derive(Debug, Deserialize)]
struct DistInfo {
    tarball: String,
}

/// HTTP implementation of [`RegistryClient`] for npm-compatible registries.
#[derive(Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpRegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegistryClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpRegistryClient {
    /// Create a client for the registry at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cnsh/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CnshError::Resolution {
                name: String::new(),
                detail: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Base URL of the registry.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Metadata URL for the latest version of `name`.
    pub fn latest_url(&self, name: &str) -> String {
        format!("{}/{}/latest", self.base_url, encode_name(name))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn resolve(&self, name: &str) -> Result<Resolution> {
        let url = self.latest_url(name);
        let fail = |detail: String| CnshError::Resolution {
            name: name.to_string(),
            detail,
        };

        debug!(package = name, url = %url, "Fetching package metadata");
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(package = name, error = %e, is_timeout = e.is_timeout(), "Metadata request failed");
            if e.is_timeout() {
                fail(format!("request timed out after {}s", self.timeout.as_secs()))
            } else {
                fail(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(fail("package not found in registry".to_string()));
        }
        if !status.is_success() {
            return Err(fail(format!("HTTP {status} from {url}")));
        }

        let body = response.text().await.map_err(|e| fail(e.to_string()))?;
        parse_latest(name, &body)
    }
}

/// Parse a `/<name>/latest` response body.
pub fn parse_latest(name: &str, body: &str) -> Result<Resolution> {
    let fail = |detail: String| CnshError::Resolution {
        name: name.to_string(),
        detail,
    };

    let metadata: LatestMetadata =
        serde_json::from_str(body).map_err(|e| fail(format!("malformed metadata: {e}")))?;
    semver::Version::parse(&metadata.version)
        .map_err(|e| fail(format!("invalid version '{}': {e}", metadata.version)))?;
    if metadata.dist.tarball.trim().is_empty() {
        return Err(fail("metadata has no tarball URL".to_string()));
    }

    Ok(Resolution {
        name: name.to_string(),
        version: metadata.version,
        tarball_url: metadata.dist.tarball,
    })
}

/// Scoped names keep their `@` but encode the separator, as npm expects.
fn encode_name(name: &str) -> String {
    name.replace('/', "%2f")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_server::{CannedServer, Route};

    #[test]
    fn latest_url_for_plain_and_scoped_names() {
        let client =
            HttpRegistryClient::new("https://registry.npmjs.org/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://registry.npmjs.org");
        assert_eq!(
            client.latest_url("left-pad"),
            "https://registry.npmjs.org/left-pad/latest"
        );
        assert_eq!(
            client.latest_url("@types/node"),
            "https://registry.npmjs.org/@types%2fnode/latest"
        );
    }

    #[test]
    fn parses_npm_latest_document() {
        let body = r#"{
            "name": "left-pad",
            "version": "1.3.0",
            "dist": {
                "shasum": "5b8a3a7765dfe001261dde915589e782f8c94d1e",
                "tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz"
            }
        }"#;
        let resolution = parse_latest("left-pad", body).unwrap();
        assert_eq!(resolution.version, "1.3.0");
        assert_eq!(
            resolution.tarball_url,
            "https://registry.npmjs.org/left-pad/-/left-pad-1.3.0.tgz"
        );
    }

    #[test]
    fn rejects_missing_dist() {
        let err = parse_latest("x", r#"{"version": "1.0.0"}"#).unwrap_err();
        assert!(matches!(err, CnshError::Resolution { .. }));
    }

    #[test]
    fn rejects_non_semver_version() {
        let body = r#"{"version": "latest-ish", "dist": {"tarball": "https://r.example/x.tgz"}}"#;
        let err = parse_latest("x", body).unwrap_err();
        assert!(err.to_string().contains("invalid version"));
    }

    #[test]
    fn rejects_empty_tarball() {
        let body = r#"{"version": "1.0.0", "dist": {"tarball": ""}}"#;
        assert!(parse_latest("x", body).is_err());
    }

    fn client(server: &CannedServer, timeout: Duration) -> HttpRegistryClient {
        HttpRegistryClient::new(&server.base_url, timeout).unwrap()
    }

    #[tokio::test]
    async fn resolves_over_http() {
        let server = CannedServer::start(&[(
            "/@types%2fnode/latest",
            Route::ok(r#"{"version": "20.1.0", "dist": {"tarball": "https://r.example/node-20.1.0.tgz"}}"#),
        )])
        .await;

        let resolution = client(&server, Duration::from_secs(5))
            .resolve("@types/node")
            .await
            .unwrap();

        assert_eq!(
            resolution,
            Resolution {
                name: "@types/node".to_string(),
                version: "20.1.0".to_string(),
                tarball_url: "https://r.example/node-20.1.0.tgz".to_string(),
            }
        );
        assert_eq!(server.requested(), ["/@types%2fnode/latest"]);
    }

    #[tokio::test]
    async fn unknown_package_is_resolution_error() {
        let server = CannedServer::start(&[]).await;

        let err = client(&server, Duration::from_secs(5))
            .resolve("no-such-package")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.to_string().contains("package not found in registry"));
    }

    #[tokio::test]
    async fn server_error_is_resolution_error() {
        let server = CannedServer::start(&[("/flaky/latest", Route::status(503))]).await;

        let err = client(&server, Duration::from_secs(5))
            .resolve("flaky")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.to_string().contains("503"), "{err}");
    }

    #[tokio::test]
    async fn malformed_body_is_resolution_error() {
        let server = CannedServer::start(&[("/garbled/latest", Route::ok("<html>oops</html>"))]).await;

        let err = client(&server, Duration::from_secs(5))
            .resolve("garbled")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("malformed metadata"));
    }

    #[tokio::test]
    async fn slow_registry_times_out() {
        let server = CannedServer::start(&[("/slow/latest", Route::Stall)]).await;

        let err = client(&server, Duration::from_millis(200))
            .resolve("slow")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
