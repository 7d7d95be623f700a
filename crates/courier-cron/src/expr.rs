use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};

use crate::field::{CronField, FieldKind};
use crate::CronParseError;

/// Days scanned before a schedule is declared unsatisfiable. Eight years
/// covers the longest gap between two February 29ths.
const MAX_SEARCH_DAYS: u32 = 366 * 8;

/// Largest wall-clock jump made by a daylight saving transition.
const MAX_SHIFT_MINUTES: i64 = 120;

/// A parsed five-field cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronExpr {
  pub minute: CronField,
  pub hour: CronField,
  pub day_of_month: CronField,
  pub month: CronField,
  pub day_of_week: CronField,
}

impl CronExpr {
  /// Parse an expression, failing on the first problem found.
  pub fn parse(expression: &str) -> Result<Self, CronParseError> {
    let tokens = tokenize(expression)?;
    let mut fields = [CronField::Any; 5];
    for (slot, (kind, token)) in fields.iter_mut().zip(FieldKind::ALL.iter().zip(tokens)) {
      *slot = CronField::parse(*kind, token)?;
    }
    Ok(Self::from_fields(fields))
  }

  /// Collect every problem with an expression.
  ///
  /// Returns an empty list for a valid expression.
  pub fn errors(expression: &str) -> Vec<CronParseError> {
    match tokenize(expression) {
      Err(e) => vec![e],
      Ok(tokens) => FieldKind::ALL
        .iter()
        .zip(tokens)
        .filter_map(|(kind, token)| CronField::parse(*kind, token).err())
        .collect(),
    }
  }

  fn from_fields([minute, hour, day_of_month, month, day_of_week]: [CronField; 5]) -> Self {
    Self {
      minute,
      hour,
      day_of_month,
      month,
      day_of_week,
    }
  }

  /// Whether the schedule fires at the given local minute.
  pub fn matches(&self, at: &NaiveDateTime) -> bool {
    self.minute.matches(at.minute()) && self.hour.matches(at.hour()) && self.day_matches(at.date())
  }

  fn day_matches(&self, date: NaiveDate) -> bool {
    if !self.month.matches(date.month()) {
      return false;
    }

    let dom = self.day_of_month.matches(date.day());
    let dow = self
      .day_of_week
      .matches(date.weekday().num_days_from_sunday());

    match (self.day_of_month.is_any(), self.day_of_week.is_any()) {
      (true, true) => true,
      (true, false) => dow,
      (false, true) => dom,
      // Both restricted: either one is enough.
      (false, false) => dom || dow,
    }
  }

  /// First fire time strictly after `after`, in the same time zone.
  ///
  /// Wall times repeated by a fall-back transition fire on their first
  /// occurrence. Schedules with a wildcard hour also fire through the
  /// repeat; fixed-hour schedules run once. Wall times skipped by a
  /// spring-forward transition fire at the end of the gap. Returns `None`
  /// when the expression can never fire, e.g. `0 0 30 2 *`.
  pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let tz = after.timezone();
    let local = after.naive_local();
    let floor = NaiveDateTime::new(
      local.date(),
      NaiveTime::from_hms_opt(local.hour(), local.minute(), 0)?,
    );

    // After a fall-back, later instants sit at earlier wall times. Scan from
    // one shift back and keep the earliest instant past `after`.
    let shift = chrono::Duration::minutes(MAX_SHIFT_MINUTES);
    let start = floor - shift + chrono::Duration::minutes(1);

    let mut best: Option<DateTime<Tz>> = None;
    for candidate in self.wall_times_from(start) {
      if let Some(found) = &best
        && candidate > found.naive_local() + shift
      {
        break;
      }
      if let Some(at) = self.resolve(&tz, &candidate, after)
        && best.as_ref().is_none_or(|found| at < *found)
      {
        best = Some(at);
      }
    }

    best
  }

  /// Matching wall-clock minutes from `start` on, in order.
  fn wall_times_from(&self, start: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> + '_ {
    start
      .date()
      .iter_days()
      .take(MAX_SEARCH_DAYS as usize)
      .filter(move |date| self.day_matches(*date))
      .flat_map(move |date| {
        (0..24u32)
          .filter(move |hour| self.hour.matches(*hour))
          .flat_map(move |hour| {
            (0..60u32)
              .filter(move |minute| self.minute.matches(*minute))
              .filter_map(move |minute| date.and_hms_opt(hour, minute, 0))
          })
      })
      .filter(move |candidate| *candidate >= start)
  }

  /// The instant `local` fires at, if it is later than `after`.
  fn resolve<Tz: TimeZone>(
    &self,
    tz: &Tz,
    local: &NaiveDateTime,
    after: &DateTime<Tz>,
  ) -> Option<DateTime<Tz>> {
    let at = match tz.from_local_datetime(local) {
      LocalResult::Single(at) => at,
      LocalResult::Ambiguous(a, b) => {
        let (early, late) = if a <= b { (a, b) } else { (b, a) };
        if early > *after || !self.hour.is_any() {
          early
        } else {
          late
        }
      }
      LocalResult::None => (1..=MAX_SHIFT_MINUTES).find_map(|m| {
        tz.from_local_datetime(&(*local + chrono::Duration::minutes(m)))
          .earliest()
      })?,
    };

    (at > *after).then_some(at)
  }
}

fn tokenize(expression: &str) -> Result<Vec<&str>, CronParseError> {
  let tokens: Vec<&str> = expression.split_whitespace().collect();
  match tokens.len() {
    0 => Err(CronParseError::Empty),
    5 => Ok(tokens),
    n => Err(CronParseError::FieldCount(n)),
  }
}

impl FromStr for CronExpr {
  type Err = CronParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for CronExpr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} {} {} {} {}",
      self.minute, self.hour, self.day_of_month, self.month, self.day_of_week
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{FixedOffset, Offset, Utc};

  fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
  }

  #[test]
  fn test_parse_fields_in_order() {
    let expr = CronExpr::parse("5 2 10 6 3").unwrap();
    assert_eq!(expr.minute, CronField::Value(5));
    assert_eq!(expr.hour, CronField::Value(2));
    assert_eq!(expr.day_of_month, CronField::Value(10));
    assert_eq!(expr.month, CronField::Value(6));
    assert_eq!(expr.day_of_week, CronField::Value(3));
    assert_eq!(expr.to_string(), "5 2 10 6 3");
  }

  #[test]
  fn test_parse_tolerates_extra_whitespace() {
    let expr: CronExpr = "  0\t2  * *   * ".parse().unwrap();
    assert_eq!(expr.to_string(), "0 2 * * *");
  }

  #[test]
  fn test_wrong_field_count() {
    assert_eq!(CronExpr::parse(""), Err(CronParseError::Empty));
    assert_eq!(CronExpr::parse("* * * *"), Err(CronParseError::FieldCount(4)));
    assert_eq!(
      CronExpr::parse("* * * * * *"),
      Err(CronParseError::FieldCount(6))
    );
  }

  #[test]
  fn test_errors_lists_every_bad_field() {
    let errors = CronExpr::errors("99 99 99 99 99");
    assert_eq!(errors.len(), 5);
    assert!(
      errors
        .iter()
        .all(|e| matches!(e, CronParseError::OutOfRange { .. }))
    );
    assert!(CronExpr::errors("0 2 * * *").is_empty());
  }

  #[test]
  fn test_daily_at_two() {
    let expr = CronExpr::parse("0 2 * * *").unwrap();

    let next = expr.next_after(&utc(2024, 3, 10, 1, 59, 30)).unwrap();
    assert_eq!(next, utc(2024, 3, 10, 2, 0, 0));

    // Strictly after: firing at 02:00 schedules the next day.
    let next = expr.next_after(&utc(2024, 3, 10, 2, 0, 0)).unwrap();
    assert_eq!(next, utc(2024, 3, 11, 2, 0, 0));
  }

  #[test]
  fn test_every_minute() {
    let expr = CronExpr::parse("* * * * *").unwrap();
    let next = expr.next_after(&utc(2024, 12, 31, 23, 59, 59)).unwrap();
    assert_eq!(next, utc(2025, 1, 1, 0, 0, 0));
  }

  #[test]
  fn test_day_of_week_only() {
    // 2024-01-01 is a Monday; Sunday is 0.
    let expr = CronExpr::parse("30 9 * * 0").unwrap();
    let next = expr.next_after(&utc(2024, 1, 1, 12, 0, 0)).unwrap();
    assert_eq!(next, utc(2024, 1, 7, 9, 30, 0));
  }

  #[test]
  fn test_day_of_month_or_day_of_week() {
    // Fires on the 15th or on any Monday.
    let expr = CronExpr::parse("0 0 15 * 1").unwrap();
    let next = expr.next_after(&utc(2024, 1, 2, 0, 0, 0)).unwrap();
    assert_eq!(next, utc(2024, 1, 8, 0, 0, 0));

    let next = expr.next_after(&utc(2024, 1, 12, 0, 0, 0)).unwrap();
    assert_eq!(next, utc(2024, 1, 15, 0, 0, 0));
  }

  #[test]
  fn test_leap_day() {
    let expr = CronExpr::parse("0 12 29 2 *").unwrap();
    let next = expr.next_after(&utc(2024, 3, 1, 0, 0, 0)).unwrap();
    assert_eq!(next, utc(2028, 2, 29, 12, 0, 0));
  }

  #[test]
  fn test_impossible_date_never_fires() {
    let expr = CronExpr::parse("0 0 30 2 *").unwrap();
    assert_eq!(expr.next_after(&utc(2024, 1, 1, 0, 0, 0)), None);
  }

  #[test]
  fn test_fire_times_match_fields() {
    let expr = CronExpr::parse("45 * 1 * *").unwrap();
    let mut at = utc(2024, 5, 20, 0, 0, 0);
    for _ in 0..30 {
      at = expr.next_after(&at).unwrap();
      assert!(expr.matches(&at.naive_local()));
      assert_eq!(at.minute(), 45);
      assert_eq!(at.day(), 1);
    }
  }

  /// US Eastern time for 2024 only: EDT from 2024-03-10 07:00 UTC until
  /// 2024-11-03 06:00 UTC, EST otherwise.
  #[derive(Debug, Clone, Copy)]
  struct Eastern2024;

  fn est() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
  }

  fn edt() -> FixedOffset {
    FixedOffset::west_opt(4 * 3600).unwrap()
  }

  fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
      .unwrap()
      .and_hms_opt(h, mi, 0)
      .unwrap()
  }

  impl TimeZone for Eastern2024 {
    type Offset = FixedOffset;

    fn from_offset(_: &FixedOffset) -> Self {
      Eastern2024
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
      self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
      let gap = naive(2024, 3, 10, 2, 0);
      let repeat = naive(2024, 11, 3, 1, 0);
      let hour = chrono::Duration::hours(1);

      if *local >= gap && *local < gap + hour {
        LocalResult::None
      } else if *local >= repeat && *local < repeat + hour {
        LocalResult::Ambiguous(edt(), est())
      } else if *local >= gap + hour && *local < repeat {
        LocalResult::Single(edt())
      } else {
        LocalResult::Single(est())
      }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
      self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
      if *utc >= naive(2024, 3, 10, 7, 0) && *utc < naive(2024, 11, 3, 6, 0) {
        edt()
      } else {
        est()
      }
    }
  }

  fn eastern(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Eastern2024> {
    Eastern2024.from_utc_datetime(&naive(y, mo, d, h, mi))
  }

  #[test]
  fn test_repeated_hour_starts_on_first_occurrence() {
    let every_minute = CronExpr::parse("* * * * *").unwrap();

    // 01:30 EDT is followed by 01:31 EDT, not 01:31 EST an hour later.
    let next = every_minute.next_after(&eastern(2024, 11, 3, 5, 30)).unwrap();
    assert_eq!(next, eastern(2024, 11, 3, 5, 31));
    assert_eq!(next.offset().fix(), edt());

    // The end of the first 01:xx hands over to the repeat.
    let next = every_minute.next_after(&eastern(2024, 11, 3, 5, 59)).unwrap();
    assert_eq!(next, eastern(2024, 11, 3, 6, 0));
    assert_eq!(next.offset().fix(), est());
  }

  #[test]
  fn test_fixed_time_in_repeated_hour_runs_once() {
    let expr = CronExpr::parse("30 1 * * *").unwrap();

    let first = expr.next_after(&eastern(2024, 11, 3, 4, 0)).unwrap();
    assert_eq!(first, eastern(2024, 11, 3, 5, 30));

    let second = expr.next_after(&first).unwrap();
    assert_eq!(second.naive_local(), naive(2024, 11, 4, 1, 30));
  }

  #[test]
  fn test_hourly_fires_in_both_occurrences() {
    let expr = CronExpr::parse("0 * * * *").unwrap();

    let first = expr.next_after(&eastern(2024, 11, 3, 4, 30)).unwrap();
    assert_eq!(first, eastern(2024, 11, 3, 5, 0));
    let second = expr.next_after(&first).unwrap();
    assert_eq!(second, eastern(2024, 11, 3, 6, 0));
    let third = expr.next_after(&second).unwrap();
    assert_eq!(third.naive_local(), naive(2024, 11, 3, 2, 0));
  }

  #[test]
  fn test_skipped_time_runs_at_end_of_gap() {
    let expr = CronExpr::parse("30 2 * * *").unwrap();

    // 02:30 does not exist on 2024-03-10; it runs at 03:00 EDT.
    let next = expr.next_after(&eastern(2024, 3, 10, 5, 0)).unwrap();
    assert_eq!(next, eastern(2024, 3, 10, 7, 0));
    assert_eq!(next.naive_local(), naive(2024, 3, 10, 3, 0));

    let after = expr.next_after(&next).unwrap();
    assert_eq!(after.naive_local(), naive(2024, 3, 11, 2, 30));
  }
}
