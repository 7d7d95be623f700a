use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use courier_config::Secret;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::{TransferConnector, TransferEndpoint, TransferError, TransferSession};

/// Transfer connector for HTTP endpoints that accept `PUT` uploads
/// (WebDAV servers, object-store gateways).
#[derive(Debug, Clone, Default)]
pub struct HttpTransferConnector {
  client: Client,
}

impl HttpTransferConnector {
  pub fn new() -> Self {
    Self::default()
  }

  /// Use a preconfigured client (proxies, TLS roots).
  pub fn with_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl TransferConnector for HttpTransferConnector {
  async fn connect(
    &self,
    endpoint: &TransferEndpoint,
  ) -> Result<Box<dyn TransferSession>, TransferError> {
    let base = endpoint.base_url()?;

    // Check the credentials up front; bad logins fail at connect, not upload.
    let response = self
      .client
      .request(Method::OPTIONS, base.clone())
      .basic_auth(&endpoint.user, Some(endpoint.password.expose()))
      .send()
      .await
      .map_err(TransferError::Connection)?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
      return Err(TransferError::AuthenticationFailed(format!("status {}", status.as_u16())));
    }

    debug!(endpoint = %base, status = status.as_u16(), "transfer endpoint connected");

    Ok(Box::new(HttpTransferSession {
      client: Some(self.client.clone()),
      base,
      user: endpoint.user.clone(),
      password: endpoint.password.clone(),
    }))
  }
}

/// An authenticated HTTP transfer session.
pub struct HttpTransferSession {
  client: Option<Client>,
  base: Url,
  user: String,
  password: Secret,
}

#[async_trait]
impl TransferSession for HttpTransferSession {
  async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransferError> {
    let client = self.client.as_ref().ok_or(TransferError::NotConnected)?;

    let target = self
      .base
      .join(remote_path.trim_start_matches('/'))
      .map_err(|e| TransferError::InvalidEndpoint(format!("{}: {}", remote_path, e)))?;

    let body = tokio::fs::read(local_path).await.map_err(|e| match e.kind() {
      ErrorKind::NotFound => TransferError::MissingLocalFile(local_path.to_path_buf()),
      _ => TransferError::Io {
        path: local_path.to_path_buf(),
        source: e,
      },
    })?;
    let size = body.len();

    let response = client
      .put(target.clone())
      .basic_auth(&self.user, Some(self.password.expose()))
      .body(body)
      .send()
      .await
      .map_err(TransferError::Http)?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
      return Err(TransferError::PermissionDenied(remote_path.to_string()));
    }
    if !status.is_success() {
      return Err(TransferError::Rejected {
        remote: remote_path.to_string(),
        status: status.as_u16(),
      });
    }

    info!(
      local = %local_path.display(),
      remote = %target,
      bytes = size,
      "file uploaded"
    );
    Ok(())
  }

  async fn close(&mut self) {
    if self.client.take().is_some() {
      debug!(endpoint = %self.base, "transfer session closed");
    }
  }
}
