use std::fmt;

use crate::CronParseError;

/// Position of a field within a cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
  Minute,
  Hour,
  DayOfMonth,
  Month,
  DayOfWeek,
}

impl FieldKind {
  /// All fields in expression order.
  pub const ALL: [FieldKind; 5] = [
    FieldKind::Minute,
    FieldKind::Hour,
    FieldKind::DayOfMonth,
    FieldKind::Month,
    FieldKind::DayOfWeek,
  ];

  /// Inclusive range of values accepted for this field.
  pub fn range(self) -> (u32, u32) {
    match self {
      FieldKind::Minute => (0, 59),
      FieldKind::Hour => (0, 23),
      FieldKind::DayOfMonth => (1, 31),
      FieldKind::Month => (1, 12),
      // 0 is Sunday
      FieldKind::DayOfWeek => (0, 6),
    }
  }
}

impl fmt::Display for FieldKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      FieldKind::Minute => "minute",
      FieldKind::Hour => "hour",
      FieldKind::DayOfMonth => "day-of-month",
      FieldKind::Month => "month",
      FieldKind::DayOfWeek => "day-of-week",
    };
    f.write_str(name)
  }
}

/// A single cron field: any value, or exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronField {
  Any,
  Value(u32),
}

impl CronField {
  /// Parse one whitespace-separated token for the given field.
  pub fn parse(kind: FieldKind, token: &str) -> Result<Self, CronParseError> {
    if token == "*" {
      return Ok(CronField::Any);
    }

    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
      return Err(CronParseError::InvalidField {
        field: kind,
        value: token.to_string(),
      });
    }

    let (min, max) = kind.range();
    // All-digit tokens only fail to parse on overflow, which is out of range anyway.
    let value = token.parse::<u32>().unwrap_or(u32::MAX);
    if value < min || value > max {
      return Err(CronParseError::OutOfRange {
        field: kind,
        value,
        min,
        max,
      });
    }

    Ok(CronField::Value(value))
  }

  pub fn matches(self, value: u32) -> bool {
    match self {
      CronField::Any => true,
      CronField::Value(v) => v == value,
    }
  }

  pub fn is_any(self) -> bool {
    matches!(self, CronField::Any)
  }
}

impl fmt::Display for CronField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CronField::Any => f.write_str("*"),
      CronField::Value(v) => write!(f, "{}", v),
    }
  }
}
