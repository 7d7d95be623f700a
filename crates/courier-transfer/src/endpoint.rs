use courier_config::{Secret, TransferConfig, TransferProtocol};
use url::Url;

use crate::TransferError;

/// Where and as whom to deliver a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEndpoint {
  pub protocol: TransferProtocol,
  /// Host name or address, without IPv6 brackets.
  pub host: String,
  pub port: u16,
  pub user: String,
  pub password: Secret,
}

impl TransferEndpoint {
  /// Build an endpoint from a task's host and credentials.
  ///
  /// A `host:port` or `[v6addr]:port` value overrides the configured
  /// default port. A bare IPv6 address is taken whole.
  pub fn new(
    config: &TransferConfig,
    host: &str,
    user: impl Into<String>,
    password: Secret,
  ) -> Self {
    let (host, port) = split_host_port(host);

    Self {
      protocol: config.protocol,
      host: host.to_string(),
      port: port.unwrap_or(config.default_port),
      user: user.into(),
      password,
    }
  }

  /// `host:port` in the form a socket address or URL expects.
  pub fn authority(&self) -> String {
    if self.host.contains(':') {
      format!("[{}]:{}", self.host, self.port)
    } else {
      format!("{}:{}", self.host, self.port)
    }
  }

  /// Root URL of the endpoint.
  pub fn base_url(&self) -> Result<Url, TransferError> {
    if self.host.is_empty() {
      return Err(TransferError::InvalidEndpoint("host is empty".to_string()));
    }

    Url::parse(&format!("{}://{}/", self.protocol.scheme(), self.authority()))
      .map_err(|e| TransferError::InvalidEndpoint(format!("{}: {}", self.host, e)))
  }
}

/// Split an optional port off `host`.
///
/// Only a bracketed address, or a name with exactly one `:`, carries a port.
fn split_host_port(host: &str) -> (&str, Option<u16>) {
  if let Some(rest) = host.strip_prefix('[')
    && let Some((addr, tail)) = rest.split_once(']')
  {
    let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
    return (addr, port);
  }

  match host.rsplit_once(':') {
    Some((name, port)) if !name.is_empty() && !name.contains(':') => match port.parse() {
      Ok(port) => (name, Some(port)),
      Err(_) => (host, None),
    },
    _ => (host, None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> TransferConfig {
    TransferConfig {
      protocol: TransferProtocol::Https,
      default_port: 8443,
    }
  }

  #[test]
  fn test_default_port() {
    let endpoint = TransferEndpoint::new(&config(), "files.example.com", "u", Secret::new("p"));
    assert_eq!(endpoint.host, "files.example.com");
    assert_eq!(endpoint.port, 8443);
    assert_eq!(
      endpoint.base_url().unwrap().as_str(),
      "https://files.example.com:8443/"
    );
  }

  #[test]
  fn test_host_with_port() {
    let endpoint = TransferEndpoint::new(&config(), "files.example.com:9000", "u", Secret::new("p"));
    assert_eq!(endpoint.host, "files.example.com");
    assert_eq!(endpoint.port, 9000);
  }

  #[test]
  fn test_sftp_default() {
    let endpoint =
      TransferEndpoint::new(&TransferConfig::default(), "sftp.example.com", "u", Secret::new("p"));
    assert_eq!(endpoint.protocol, TransferProtocol::Sftp);
    assert_eq!(endpoint.authority(), "sftp.example.com:22");
  }

  #[test]
  fn test_bare_ipv6_keeps_default_port() {
    let endpoint = TransferEndpoint::new(&config(), "::1", "u", Secret::new("p"));
    assert_eq!(endpoint.host, "::1");
    assert_eq!(endpoint.port, 8443);
    assert_eq!(endpoint.authority(), "[::1]:8443");

    let endpoint = TransferEndpoint::new(&config(), "fe80::2:1", "u", Secret::new("p"));
    assert_eq!(endpoint.host, "fe80::2:1");
    assert_eq!(endpoint.port, 8443);
  }

  #[test]
  fn test_bracketed_ipv6_with_port() {
    let endpoint = TransferEndpoint::new(&config(), "[::1]:2222", "u", Secret::new("p"));
    assert_eq!(endpoint.host, "::1");
    assert_eq!(endpoint.port, 2222);
    assert_eq!(endpoint.base_url().unwrap().as_str(), "https://[::1]:2222/");

    let endpoint = TransferEndpoint::new(&config(), "[2001:db8::5]", "u", Secret::new("p"));
    assert_eq!(endpoint.host, "2001:db8::5");
    assert_eq!(endpoint.port, 8443);
  }

  #[test]
  fn test_empty_host_is_invalid() {
    let endpoint = TransferEndpoint::new(&config(), "", "u", Secret::new("p"));
    assert!(matches!(
      endpoint.base_url(),
      Err(TransferError::InvalidEndpoint(_))
    ));
  }
}
