//! Courier Cron
//!
//! Five-field cron expressions (`minute hour day-of-month month day-of-week`)
//! where every field is either `*` or a single integer in the field's range.
//! Lists, ranges and steps are not part of the grammar.
//!
//! [`CronExpr::next_after`] computes the next fire time with standard cron
//! semantics, including the rule that when both day-of-month and day-of-week
//! are restricted a day matches if either of them does.

mod expr;
mod field;

pub use expr::CronExpr;
pub use field::{CronField, FieldKind};

/// Error type for cron expression parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronParseError {
  /// The expression is empty or only whitespace.
  #[error("cron expression is empty")]
  Empty,

  /// The expression does not have exactly five fields.
  #[error("expected 5 fields (minute hour day-of-month month day-of-week), found {0}")]
  FieldCount(usize),

  /// A field is neither `*` nor an integer.
  #[error("{field} must be '*' or an integer, got '{value}'")]
  InvalidField { field: FieldKind, value: String },

  /// A field is an integer outside the field's range.
  #[error("{field} must be between {min} and {max}, got {value}")]
  OutOfRange {
    field: FieldKind,
    value: u32,
    min: u32,
    max: u32,
  },
}
