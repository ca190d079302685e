//! Per-handler HTTP client with optional client-certificate TLS.
//!
//! Each HTTP-backed handler owns one [`LazyClient`]. The client is built on
//! first use and dropped with the handler.

use tokio::sync::OnceCell;

use crate::actions::environment::ActionEnvironment;
use crate::error::ActionError;

/// TLS material loaded from a definition's `certfile` / `keyfile`.
#[derive(Debug, Clone)]
pub struct TlsSettings {
    /// PEM bytes holding the certificate chain and its private key.
    identity_pem: Option<Vec<u8>>,
    verify: bool,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            identity_pem: None,
            verify: true,
        }
    }
}

impl TlsSettings {
    /// Read certificate and key files, if configured.
    ///
    /// When only `certfile` is given it must contain the key as well.
    pub fn load(
        env: &ActionEnvironment,
        certfile: Option<&str>,
        keyfile: Option<&str>,
        verify: bool,
    ) -> Result<Self, ActionError> {
        let Some(certfile) = certfile.filter(|s| !s.is_empty()) else {
            return Ok(Self {
                identity_pem: None,
                verify,
            });
        };

        tracing::debug!(certfile, keyfile = ?keyfile, "Using TLS client certificate");

        let mut pem = std::fs::read(env.resolve(certfile))
            .map_err(|e| ActionError::Tls(format!("{certfile}: {e}")))?;
        if let Some(keyfile) = keyfile.filter(|s| !s.is_empty()) {
            let key = std::fs::read(env.resolve(keyfile))
                .map_err(|e| ActionError::Tls(format!("{keyfile}: {e}")))?;
            if !pem.ends_with(b"\n") {
                pem.push(b'\n');
            }
            pem.extend_from_slice(&key);
        }

        // Validate now so bad material disables the handler at startup.
        reqwest::Identity::from_pem(&pem).map_err(|e| ActionError::Tls(e.to_string()))?;

        Ok(Self {
            identity_pem: Some(pem),
            verify,
        })
    }

    pub fn has_identity(&self) -> bool {
        self.identity_pem.is_some()
    }

    fn build_client(&self) -> Result<reqwest::Client, ActionError> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(pem) = &self.identity_pem {
            let identity =
                reqwest::Identity::from_pem(pem).map_err(|e| ActionError::Tls(e.to_string()))?;
            builder = builder.identity(identity);
        }
        if !self.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder
            .build()
            .map_err(|e| ActionError::Tls(format!("Failed to build HTTP client: {e}")))
    }
}

/// An HTTP client created on first use and reused for the owner's lifetime.
#[derive(Debug, Default)]
pub struct LazyClient {
    cell: OnceCell<reqwest::Client>,
}

impl LazyClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_created(&self) -> bool {
        self.cell.initialized()
    }

    /// Get the client, building it with `tls` on first call.
    pub async fn get(&self, tls: &TlsSettings) -> Result<&reqwest::Client, ActionError> {
        self.cell
            .get_or_try_init(|| async { tls.build_client() })
            .await
    }
}

/// POST `body` as JSON and fail on transport errors or non-2xx status.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    headers: reqwest::header::HeaderMap,
) -> Result<reqwest::Response, ActionError> {
    tracing::debug!(url, "POST");
    let response = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| ActionError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ActionError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}
