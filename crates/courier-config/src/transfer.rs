use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// Wire protocol spoken to transfer endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferProtocol {
  #[default]
  Sftp,
  Http,
  Https,
}

impl TransferProtocol {
  /// Scheme name, as used in endpoint URLs and on the command line.
  pub fn scheme(self) -> &'static str {
    match self {
      TransferProtocol::Sftp => "sftp",
      TransferProtocol::Http => "http",
      TransferProtocol::Https => "https",
    }
  }

  /// Well-known port for the protocol.
  pub fn default_port(self) -> u16 {
    match self {
      TransferProtocol::Sftp => 22,
      TransferProtocol::Http => 80,
      TransferProtocol::Https => 443,
    }
  }
}

impl FromStr for TransferProtocol {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "sftp" | "ssh" => Ok(TransferProtocol::Sftp),
      "http" => Ok(TransferProtocol::Http),
      "https" => Ok(TransferProtocol::Https),
      other => Err(ConfigError::UnsupportedProtocol(other.to_string())),
    }
  }
}

impl fmt::Display for TransferProtocol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.scheme())
  }
}

/// Settings shared by every transfer endpoint.
///
/// Host, user and credential come from each task; only the parts that are
/// the same for every task are configured here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
  pub protocol: TransferProtocol,
  /// Port used when a task's host does not carry one.
  pub default_port: u16,
}

impl TransferConfig {
  /// Configuration for `protocol` on its well-known port.
  pub fn for_protocol(protocol: TransferProtocol) -> Self {
    Self {
      protocol,
      default_port: protocol.default_port(),
    }
  }
}

impl Default for TransferConfig {
  fn default() -> Self {
    Self::for_protocol(TransferProtocol::default())
  }
}
