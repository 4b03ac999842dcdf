use std::cmp::Reverse;
use std::collections::{
  BTreeMap,
  BTreeSet
};

use chrono::{
  DateTime,
  Datelike,
  Utc
};

use crate::datetime::to_gallery_date;
use crate::happening::Happening;
use crate::schedule::Phase;

/// The three sections of the landing
/// page, each already in its display
/// order.
#[derive(Debug, Default)]
pub struct Timeline {
  pub current:  Vec<Happening>,
  pub upcoming: Vec<Happening>,
  pub past:     Vec<Happening>
}

/// Buckets happenings by phase.
/// Current runs sort by soonest
/// closing with open-ended runs last,
/// upcoming by soonest opening, past
/// most recent first.
#[must_use]
pub fn group_by_phase(
  happenings: Vec<Happening>,
  now: DateTime<Utc>
) -> Timeline {
  let mut timeline =
    Timeline::default();

  for happening in happenings {
    match happening.phase(now) {
      | Phase::Current => {
        timeline.current.push(happening)
      }
      | Phase::Upcoming => {
        timeline
          .upcoming
          .push(happening)
      }
      | Phase::Past => {
        timeline.past.push(happening)
      }
    }
  }

  timeline.current.sort_by_key(
    |happening| {
      (
        happening.closes_at.is_none(),
        happening.closes_at,
        happening.id
      )
    }
  );
  timeline.upcoming.sort_by_key(
    |happening| {
      (
        happening.opens_at,
        happening.id
      )
    }
  );
  timeline.past.sort_by_key(
    |happening| {
      Reverse((
        happening
          .closes_at
          .or(happening.opens_at),
        happening.id
      ))
    }
  );

  timeline
}

/// Archive-page grouping by opening
/// year on the gallery clock. Undated
/// records are skipped. Within a year
/// the latest opening comes first.
#[must_use]
pub fn group_by_year(
  happenings: Vec<Happening>
) -> BTreeMap<i32, Vec<Happening>> {
  let mut years: BTreeMap<
    i32,
    Vec<Happening>
  > = BTreeMap::new();

  for happening in happenings {
    let Some(opens) =
      happening.opens_at
    else {
      continue;
    };
    let year =
      to_gallery_date(opens).year();
    years
      .entry(year)
      .or_default()
      .push(happening);
  }

  for grouped in years.values_mut() {
    grouped.sort_by_key(|happening| {
      (
        Reverse(happening.opens_at),
        happening.id
      )
    });
  }

  years
}

/// Alphabetical artist index keyed by
/// uppercased initial. Names that do
/// not start with an ASCII letter
/// land in the '#' bucket.
#[must_use]
pub fn artist_directory(
  happenings: &[Happening]
) -> BTreeMap<char, BTreeSet<String>> {
  let mut index: BTreeMap<
    char,
    BTreeSet<String>
  > = BTreeMap::new();

  for happening in happenings {
    for artist in &happening.artists {
      let name = artist.trim();
      if name.is_empty() {
        continue;
      }
      let initial = name
        .chars()
        .next()
        .filter(|ch| {
          ch.is_ascii_alphabetic()
        })
        .map(|ch| {
          ch.to_ascii_uppercase()
        })
        .unwrap_or('#');
      index
        .entry(initial)
        .or_default()
        .insert(name.to_string());
    }
  }

  index
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::{
    artist_directory,
    group_by_phase,
    group_by_year
  };
  use crate::happening::Happening;

  fn show(
    title: &str,
    id: u64,
    now: chrono::DateTime<Utc>
  ) -> Happening {
    Happening::new_scheduled(
      title.to_string(),
      "exhibition".to_string(),
      now,
      id
    )
  }

  #[test]
  fn timeline_orders_each_section() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();

    let mut closing_soon =
      show("closing soon", 1, now);
    closing_soon.opens_at =
      Some(now - Duration::days(40));
    closing_soon.closes_at =
      Some(now + Duration::days(3));

    let mut closing_later =
      show("closing later", 2, now);
    closing_later.opens_at =
      Some(now - Duration::days(10));
    closing_later.closes_at =
      Some(now + Duration::days(60));

    let mut open_ended =
      show("open ended", 3, now);
    open_ended.opens_at =
      Some(now - Duration::days(5));

    let mut next_month =
      show("next month", 4, now);
    next_month.opens_at =
      Some(now + Duration::days(30));

    let mut next_week =
      show("next week", 5, now);
    next_week.opens_at =
      Some(now + Duration::days(7));

    let mut closed_recently =
      show("closed recently", 6, now);
    closed_recently.opens_at =
      Some(now - Duration::days(60));
    closed_recently.closes_at =
      Some(now - Duration::days(10));

    let mut closed_long_ago =
      show("closed long ago", 7, now);
    closed_long_ago.opens_at =
      Some(now - Duration::days(400));
    closed_long_ago.closes_at =
      Some(now - Duration::days(300));

    let timeline = group_by_phase(
      vec![
        open_ended,
        closed_long_ago,
        next_month,
        closing_later,
        closed_recently,
        next_week,
        closing_soon,
      ],
      now
    );

    let titles =
      |rows: &[Happening]| {
        rows
          .iter()
          .map(|h| h.title.clone())
          .collect::<Vec<_>>()
      };

    assert_eq!(
      titles(&timeline.current),
      vec![
        "closing soon",
        "closing later",
        "open ended"
      ]
    );
    assert_eq!(
      titles(&timeline.upcoming),
      vec!["next week", "next month"]
    );
    assert_eq!(
      titles(&timeline.past),
      vec![
        "closed recently",
        "closed long ago"
      ]
    );
  }

  #[test]
  fn archive_groups_by_opening_year() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();

    let mut spring_24 =
      show("spring 24", 1, now);
    spring_24.opens_at = Some(
      Utc
        .with_ymd_and_hms(
          2024, 3, 16, 18, 0, 0
        )
        .unwrap()
    );

    let mut fall_24 =
      show("fall 24", 2, now);
    fall_24.opens_at = Some(
      Utc
        .with_ymd_and_hms(
          2024, 9, 5, 22, 0, 0
        )
        .unwrap()
    );

    let mut winter_25 =
      show("winter 25", 3, now);
    winter_25.opens_at = Some(
      Utc
        .with_ymd_and_hms(
          2025, 1, 10, 23, 0, 0
        )
        .unwrap()
    );

    let undated =
      show("undated", 4, now);

    let years = group_by_year(vec![
      spring_24, fall_24, winter_25,
      undated,
    ]);

    assert_eq!(
      years
        .keys()
        .copied()
        .collect::<Vec<_>>(),
      vec![2024, 2025]
    );
    assert_eq!(
      years[&2024]
        .iter()
        .map(|h| h.title.as_str())
        .collect::<Vec<_>>(),
      vec!["fall 24", "spring 24"]
    );
    assert_eq!(years[&2025].len(), 1);
  }

  #[test]
  fn artist_index_buckets_by_initial()
  {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();

    let mut group =
      show("group show", 1, now);
    group.artists = vec![
      "Agnes Martin".to_string(),
      "agnes martin".to_string(),
      "Bruce Nauman".to_string(),
      "9th Street Collective"
        .to_string(),
    ];

    let index =
      artist_directory(&[group]);

    assert_eq!(
      index
        .keys()
        .copied()
        .collect::<Vec<_>>(),
      vec!['#', 'A', 'B']
    );
    assert_eq!(index[&'A'].len(), 2);
    assert!(
      index[&'#'].contains(
        "9th Street Collective"
      )
    );
  }
}
