use chrono::{
  DateTime,
  Utc
};

/// Where a happening sits relative to
/// its run window at a given instant.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq
)]
pub enum Phase {
  Upcoming,
  Current,
  Past
}

impl Phase {
  #[must_use]
  pub fn label(self) -> &'static str {
    match self {
      | Phase::Upcoming => "upcoming",
      | Phase::Current => "current",
      | Phase::Past => "past"
    }
  }
}

/// Whether a happening is on view at
/// `now`. A manual override beats the
/// dates; otherwise the window is
/// inclusive on both ends, and a run
/// with no closing date stays on view
/// once it has opened.
#[must_use]
pub fn is_active(
  now: DateTime<Utc>,
  opens_at: Option<DateTime<Utc>>,
  closes_at: Option<DateTime<Utc>>,
  active_override: Option<bool>
) -> bool {
  if let Some(forced) = active_override
  {
    return forced;
  }

  let Some(opens) = opens_at else {
    return false;
  };

  match closes_at {
    | Some(closes) => {
      opens <= now && now <= closes
    }
    | None => opens <= now
  }
}

#[must_use]
pub fn phase_of(
  now: DateTime<Utc>,
  opens_at: Option<DateTime<Utc>>,
  closes_at: Option<DateTime<Utc>>,
  active_override: Option<bool>
) -> Phase {
  if is_active(
    now,
    opens_at,
    closes_at,
    active_override
  ) {
    return Phase::Current;
  }

  match opens_at {
    | Some(opens) if opens > now => {
      Phase::Upcoming
    }
    | _ => Phase::Past
  }
}

/// Whole days (rounded up) until a
/// strictly future opening. `None`
/// for undated or already-open runs.
#[must_use]
pub fn days_until_opening(
  now: DateTime<Utc>,
  opens_at: Option<DateTime<Utc>>
) -> Option<i64> {
  let opens = opens_at?;
  if opens <= now {
    return None;
  }

  let secs =
    (opens - now).num_seconds();
  let days = (secs + 86_399) / 86_400;
  Some(days.max(1))
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    Phase,
    days_until_opening,
    is_active,
    phase_of
  };

  fn instant(
    y: i32,
    mo: u32,
    d: u32,
    h: u32
  ) -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        y, mo, d, h, 0, 0
      )
      .single()
      .expect("valid instant")
  }

  #[test]
  fn window_is_inclusive_both_ends() {
    let opens =
      instant(2024, 3, 16, 14);
    let closes =
      instant(2024, 6, 20, 22);

    assert!(is_active(
      opens,
      Some(opens),
      Some(closes),
      None
    ));
    assert!(is_active(
      closes,
      Some(opens),
      Some(closes),
      None
    ));
    assert!(!is_active(
      opens - Duration::seconds(1),
      Some(opens),
      Some(closes),
      None
    ));
    assert!(!is_active(
      closes + Duration::seconds(1),
      Some(opens),
      Some(closes),
      None
    ));
  }

  #[test]
  fn future_opening_is_never_active()
  {
    let now = instant(2024, 3, 1, 12);
    let opens =
      instant(2024, 3, 16, 14);

    assert!(!is_active(
      now,
      Some(opens),
      None,
      None
    ));
    assert!(!is_active(
      now,
      Some(opens),
      Some(instant(2024, 6, 20, 22)),
      None
    ));
  }

  #[test]
  fn override_beats_dates() {
    let now = instant(2024, 3, 1, 12);
    let opens =
      instant(2024, 3, 16, 14);
    let closes =
      instant(2024, 6, 20, 22);

    assert!(is_active(
      now,
      Some(opens),
      Some(closes),
      Some(true)
    ));
    assert!(!is_active(
      instant(2024, 4, 1, 12),
      Some(opens),
      Some(closes),
      Some(false)
    ));
    assert!(is_active(
      now,
      None,
      None,
      Some(true)
    ));
  }

  #[test]
  fn open_ended_run_active_once_started()
  {
    let opens =
      instant(2024, 3, 16, 14);

    assert!(!is_active(
      instant(2024, 3, 1, 12),
      Some(opens),
      None,
      None
    ));
    assert!(is_active(
      instant(2026, 1, 1, 12),
      Some(opens),
      None,
      None
    ));
  }

  #[test]
  fn undated_is_never_active() {
    let now = instant(2024, 3, 1, 12);
    assert!(!is_active(
      now, None, None, None
    ));
    assert!(!is_active(
      now,
      None,
      Some(instant(2024, 6, 20, 22)),
      None
    ));
  }

  #[test]
  fn phases_partition_the_timeline() {
    let opens =
      instant(2024, 3, 16, 14);
    let closes =
      instant(2024, 6, 20, 22);

    assert_eq!(
      phase_of(
        instant(2024, 3, 1, 12),
        Some(opens),
        Some(closes),
        None
      ),
      Phase::Upcoming
    );
    assert_eq!(
      phase_of(
        instant(2024, 4, 1, 12),
        Some(opens),
        Some(closes),
        None
      ),
      Phase::Current
    );
    assert_eq!(
      phase_of(
        instant(2024, 7, 1, 12),
        Some(opens),
        Some(closes),
        None
      ),
      Phase::Past
    );
    assert_eq!(
      phase_of(
        instant(2024, 7, 1, 12),
        None,
        None,
        None
      ),
      Phase::Past
    );
    assert_eq!(
      phase_of(
        instant(2024, 7, 1, 12),
        Some(opens),
        Some(closes),
        Some(true)
      ),
      Phase::Current
    );
  }

  #[test]
  fn countdown_rounds_up_to_days() {
    let now = instant(2024, 3, 1, 12);

    assert_eq!(
      days_until_opening(
        now,
        Some(
          now + Duration::hours(1)
        )
      ),
      Some(1)
    );
    assert_eq!(
      days_until_opening(
        now,
        Some(
          now + Duration::days(3)
        )
      ),
      Some(3)
    );
    assert_eq!(
      days_until_opening(
        now,
        Some(
          now
            + Duration::days(3)
            + Duration::hours(1)
        )
      ),
      Some(4)
    );
    assert_eq!(
      days_until_opening(
        now,
        Some(now)
      ),
      None
    );
    assert_eq!(
      days_until_opening(now, None),
      None
    );
  }
}
