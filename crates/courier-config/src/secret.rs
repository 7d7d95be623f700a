use std::fmt;

/// A credential that must not leak into logs.
///
/// `Debug` prints a placeholder; the value is only reachable through
/// [`Secret::expose`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  /// Borrow the underlying value.
  pub fn expose(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      f.write_str("Secret(\"\")")
    } else {
      f.write_str("Secret(\"***\")")
    }
  }
}

impl From<String> for Secret {
  fn from(value: String) -> Self {
    Self(value)
  }
}

impl From<&str> for Secret {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}
