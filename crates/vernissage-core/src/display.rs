use chrono::{
  DateTime,
  Timelike,
  Utc
};
use chrono_tz::Tz;

use crate::datetime::gallery_timezone;
use crate::happening::DateDisplayMode;

/// Renders a happening's date window
/// the way the listing pages print
/// it, on the gallery clock. Range
/// mode reads "March 16–June 20";
/// datetime mode reads "March 28 at
/// 7pm" or "March 28 from 7–9pm".
/// No start date renders as "".
/// Years are never shown.
#[must_use]
pub fn format_window(
  opens_at: Option<DateTime<Utc>>,
  closes_at: Option<DateTime<Utc>>,
  mode: DateDisplayMode
) -> String {
  let Some(opens) = opens_at else {
    return String::new();
  };

  let tz = gallery_timezone();
  let opens_local =
    opens.with_timezone(tz);

  match mode {
    | DateDisplayMode::DateRange => {
      let start =
        month_day(&opens_local);
      match closes_at {
        | Some(closes) => {
          let end = month_day(
            &closes.with_timezone(tz)
          );
          format!("{start}\u{2013}{end}")
        }
        | None => start
      }
    }
    | DateDisplayMode::DateTime => {
      let day =
        month_day(&opens_local);
      let (start_digits, start_ampm) =
        time_parts(&opens_local);
      match closes_at {
        | Some(closes) => {
          let closes_local =
            closes.with_timezone(tz);
          let (end_digits, end_ampm) =
            time_parts(&closes_local);
          if start_ampm == end_ampm {
            format!(
              "{day} from \
               {start_digits}\u{2013}\
               {end_digits}{end_ampm}"
            )
          } else {
            format!(
              "{day} from \
               {start_digits}\
               {start_ampm}\u{2013}\
               {end_digits}{end_ampm}"
            )
          }
        }
        | None => {
          format!(
            "{day} at {start_digits}\
             {start_ampm}"
          )
        }
      }
    }
  }
}

fn month_day(
  local: &DateTime<Tz>
) -> String {
  local.format("%B %-d").to_string()
}

/// Digits and meridiem separately, so
/// a shared suffix can collapse onto
/// the end of a range. Minutes stay
/// hidden on the whole hour.
fn time_parts(
  local: &DateTime<Tz>
) -> (String, &'static str) {
  let (is_pm, hour) = local.hour12();
  let minute = local.minute();
  let digits = if minute == 0 {
    hour.to_string()
  } else {
    format!("{hour}:{minute:02}")
  };
  let ampm =
    if is_pm { "pm" } else { "am" };
  (digits, ampm)
}

#[cfg(test)]
mod tests {
  use chrono::{
    DateTime,
    Utc
  };

  use super::format_window;
  use crate::happening::DateDisplayMode;

  fn utc(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
      .expect("valid rfc3339")
      .with_timezone(&Utc)
  }

  #[test]
  fn range_with_both_dates() {
    let out = format_window(
      Some(utc(
        "2024-03-16T18:00:00Z"
      )),
      Some(utc(
        "2024-06-20T22:00:00Z"
      )),
      DateDisplayMode::DateRange
    );
    assert_eq!(
      out,
      "March 16\u{2013}June 20"
    );
  }

  #[test]
  fn range_with_start_only() {
    let out = format_window(
      Some(utc(
        "2024-03-16T18:00:00Z"
      )),
      None,
      DateDisplayMode::DateRange
    );
    assert_eq!(out, "March 16");
  }

  #[test]
  fn evening_with_both_times_shares_suffix()
  {
    let out = format_window(
      Some(utc(
        "2024-03-28T23:00:00Z"
      )),
      Some(utc(
        "2024-03-29T01:00:00Z"
      )),
      DateDisplayMode::DateTime
    );
    assert_eq!(
      out,
      "March 28 from 7\u{2013}9pm"
    );
  }

  #[test]
  fn evening_with_start_only() {
    let out = format_window(
      Some(utc(
        "2024-03-28T23:00:00Z"
      )),
      None,
      DateDisplayMode::DateTime
    );
    assert_eq!(out, "March 28 at 7pm");
  }

  #[test]
  fn crossing_noon_keeps_both_suffixes()
  {
    let out = format_window(
      Some(utc(
        "2024-03-28T15:00:00Z"
      )),
      Some(utc(
        "2024-03-28T18:00:00Z"
      )),
      DateDisplayMode::DateTime
    );
    assert_eq!(
      out,
      "March 28 from 11am\u{2013}2pm"
    );
  }

  #[test]
  fn off_hour_minutes_are_kept() {
    let out = format_window(
      Some(utc(
        "2024-03-28T23:30:00Z"
      )),
      None,
      DateDisplayMode::DateTime
    );
    assert_eq!(
      out,
      "March 28 at 7:30pm"
    );
  }

  #[test]
  fn noon_and_midnight_read_as_twelve()
  {
    assert_eq!(
      format_window(
        Some(utc(
          "2024-03-28T16:00:00Z"
        )),
        None,
        DateDisplayMode::DateTime
      ),
      "March 28 at 12pm"
    );
    assert_eq!(
      format_window(
        Some(utc(
          "2024-03-28T04:00:00Z"
        )),
        None,
        DateDisplayMode::DateTime
      ),
      "March 28 at 12am"
    );
  }

  #[test]
  fn missing_start_renders_empty() {
    assert_eq!(
      format_window(
        None,
        Some(utc(
          "2024-06-20T22:00:00Z"
        )),
        DateDisplayMode::DateRange
      ),
      ""
    );
    assert_eq!(
      format_window(
        None,
        None,
        DateDisplayMode::DateTime
      ),
      ""
    );
  }
}
