use std::io::{self, ErrorKind, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{ErrorCode, Session, Sftp};
use tracing::{debug, info, warn};

use crate::{TransferConnector, TransferEndpoint, TransferError, TransferSession};

/// SFTP status returned when the server refuses an operation.
const FX_PERMISSION_DENIED: i32 = 3;

/// Transfer connector for SFTP servers, authenticating with a password.
///
/// libssh2 is blocking, so every call runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct SftpTransferConnector {
  timeout: Duration,
}

impl SftpTransferConnector {
  /// `timeout` bounds the TCP connect and each blocking SSH call.
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }
}

impl Default for SftpTransferConnector {
  fn default() -> Self {
    Self::new(Duration::from_secs(30))
  }
}

#[async_trait]
impl TransferConnector for SftpTransferConnector {
  async fn connect(
    &self,
    endpoint: &TransferEndpoint,
  ) -> Result<Box<dyn TransferSession>, TransferError> {
    if endpoint.host.is_empty() {
      return Err(TransferError::InvalidEndpoint("host is empty".to_string()));
    }

    let address = endpoint.authority();
    let endpoint = endpoint.clone();
    let timeout = self.timeout;
    let conn = tokio::task::spawn_blocking(move || open(&endpoint, timeout)).await??;

    debug!(endpoint = %address, "sftp session established");
    Ok(Box::new(SftpTransferSession {
      address,
      conn: Some(conn),
    }))
  }
}

struct SftpConnection {
  session: Session,
  sftp: Sftp,
}

fn open(endpoint: &TransferEndpoint, timeout: Duration) -> Result<SftpConnection, TransferError> {
  let stream = dial(endpoint, timeout)?;

  let mut session = Session::new().map_err(TransferError::Ssh)?;
  session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
  session.set_tcp_stream(stream);
  session.handshake().map_err(TransferError::Ssh)?;

  session
    .userauth_password(&endpoint.user, endpoint.password.expose())
    .map_err(|e| TransferError::AuthenticationFailed(e.message().to_string()))?;
  if !session.authenticated() {
    return Err(TransferError::AuthenticationFailed(
      "password not accepted".to_string(),
    ));
  }

  let sftp = session.sftp().map_err(TransferError::Ssh)?;
  Ok(SftpConnection { session, sftp })
}

/// Connect to the first resolved address that answers within `timeout`.
fn dial(endpoint: &TransferEndpoint, timeout: Duration) -> Result<TcpStream, TransferError> {
  let unreachable = |source: io::Error| TransferError::Unreachable {
    address: endpoint.authority(),
    source,
  };

  let addrs = (endpoint.host.as_str(), endpoint.port)
    .to_socket_addrs()
    .map_err(unreachable)?;

  let mut last = io::Error::new(ErrorKind::NotFound, "host resolved to no addresses");
  for addr in addrs {
    match TcpStream::connect_timeout(&addr, timeout) {
      Ok(stream) => return Ok(stream),
      Err(e) => last = e,
    }
  }
  Err(unreachable(last))
}

/// Write the file at `local` to `remote`, replacing any existing file.
fn put(sftp: &Sftp, local: &Path, remote: &str) -> Result<usize, TransferError> {
  let body = std::fs::read(local).map_err(|e| match e.kind() {
    ErrorKind::NotFound => TransferError::MissingLocalFile(local.to_path_buf()),
    _ => TransferError::Io {
      path: local.to_path_buf(),
      source: e,
    },
  })?;

  let mut file = sftp.create(Path::new(remote)).map_err(|e| match e.code() {
    ErrorCode::SFTP(FX_PERMISSION_DENIED) => TransferError::PermissionDenied(remote.to_string()),
    _ => TransferError::Ssh(e),
  })?;
  file
    .write_all(&body)
    .map_err(|source| TransferError::RemoteWrite {
      remote: remote.to_string(),
      source,
    })?;

  Ok(body.len())
}

/// An authenticated SFTP session.
pub struct SftpTransferSession {
  address: String,
  conn: Option<SftpConnection>,
}

#[async_trait]
impl TransferSession for SftpTransferSession {
  async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), TransferError> {
    let conn = self.conn.take().ok_or(TransferError::NotConnected)?;

    let local: PathBuf = local_path.to_path_buf();
    let remote = remote_path.to_string();
    let (conn, result) = tokio::task::spawn_blocking(move || {
      let result = put(&conn.sftp, &local, &remote);
      (conn, result)
    })
    .await?;
    self.conn = Some(conn);

    let bytes = result?;
    info!(
      local = %local_path.display(),
      remote = %remote_path,
      endpoint = %self.address,
      bytes,
      "file uploaded"
    );
    Ok(())
  }

  async fn close(&mut self) {
    let Some(conn) = self.conn.take() else {
      return;
    };

    let closed = tokio::task::spawn_blocking(move || {
      drop(conn.sftp);
      conn.session.disconnect(None, "courier upload finished", None)
    })
    .await;

    match closed {
      Ok(Ok(())) => debug!(endpoint = %self.address, "transfer session closed"),
      Ok(Err(e)) => warn!(endpoint = %self.address, error = %e, "sftp disconnect failed"),
      Err(e) => warn!(endpoint = %self.address, error = %e, "sftp disconnect did not complete"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use courier_config::{Secret, TransferConfig};
  use std::net::TcpListener;

  fn endpoint(host: &str) -> TransferEndpoint {
    TransferEndpoint::new(&TransferConfig::default(), host, "u", Secret::new("p"))
  }

  #[tokio::test]
  async fn test_closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = SftpTransferConnector::new(Duration::from_secs(5))
      .connect(&endpoint(&format!("127.0.0.1:{port}")))
      .await;

    match result {
      Err(TransferError::Unreachable { address, .. }) => {
        assert_eq!(address, format!("127.0.0.1:{port}"));
      }
      Err(other) => panic!("expected unreachable, got {other:?}"),
      Ok(_) => panic!("connected to a closed port"),
    }
  }

  #[tokio::test]
  async fn test_non_ssh_server_fails_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || {
      if let Ok((mut stream, _)) = listener.accept() {
        let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n");
      }
    });

    let result = SftpTransferConnector::new(Duration::from_secs(5))
      .connect(&endpoint(&format!("127.0.0.1:{port}")))
      .await;

    assert!(matches!(result, Err(TransferError::Ssh(_))));
    server.join().unwrap();
  }

  #[tokio::test]
  async fn test_empty_host_is_invalid() {
    let result = SftpTransferConnector::default().connect(&endpoint("")).await;
    assert!(matches!(result, Err(TransferError::InvalidEndpoint(_))));
  }

  #[tokio::test]
  async fn test_closed_session_is_not_connected() {
    let mut session = SftpTransferSession {
      address: "files.example.com:22".to_string(),
      conn: None,
    };

    session.close().await;
    let result = session.upload(Path::new("out.csv"), "out.csv").await;
    assert!(matches!(result, Err(TransferError::NotConnected)));
  }

  /// Runs against a real server when `COURIER_TEST_SFTP_HOST`,
  /// `COURIER_TEST_SFTP_USER` and `COURIER_TEST_SFTP_PASSWORD` are set.
  #[tokio::test]
  async fn test_upload_to_live_server() {
    let (Ok(host), Ok(user), Ok(password)) = (
      std::env::var("COURIER_TEST_SFTP_HOST"),
      std::env::var("COURIER_TEST_SFTP_USER"),
      std::env::var("COURIER_TEST_SFTP_PASSWORD"),
    ) else {
      eprintln!("Skipping test: COURIER_TEST_SFTP_HOST not set");
      return;
    };

    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("out.csv");
    tokio::fs::write(&local, "id\n1\n").await.unwrap();

    let endpoint =
      TransferEndpoint::new(&TransferConfig::default(), &host, user, Secret::new(password));
    let mut session = SftpTransferConnector::default()
      .connect(&endpoint)
      .await
      .unwrap();

    session
      .upload(&local, &format!("courier-test-{}.csv", std::process::id()))
      .await
      .unwrap();
    let missing = session.upload(&dir.path().join("nope.csv"), "nope.csv").await;
    assert!(matches!(missing, Err(TransferError::MissingLocalFile(_))));

    session.close().await;
    session.close().await;
  }
}
