use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  info,
  instrument
};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::datetime::format_gallery_date;
use crate::display::format_window;
use crate::filter::Filter;
use crate::happening::{
  DateDisplayMode,
  Happening,
  HappeningType,
  Status
};
use crate::render::Renderer;
use crate::schedule::{
  Phase,
  days_until_opening
};

#[derive(Debug, Clone, Copy)]
enum ReportColumn {
  Id,
  Uuid,
  Status,
  Phase,
  Type,
  Title,
  Venue,
  Artists,
  Tags,
  Opens,
  Closes,
  Dates,
  Entry,
  Modified,
  Countdown
}

impl ReportColumn {
  fn parse(
    token: &str
  ) -> Option<Self> {
    match token
      .to_ascii_lowercase()
      .as_str()
    {
      | "id" => Some(Self::Id),
      | "uuid" => Some(Self::Uuid),
      | "status" => Some(Self::Status),
      | "phase" => Some(Self::Phase),
      | "type" => Some(Self::Type),
      | "title" => Some(Self::Title),
      | "venue" => Some(Self::Venue),
      | "artists" | "artist" => {
        Some(Self::Artists)
      }
      | "tags" | "tag" => {
        Some(Self::Tags)
      }
      | "opens" => Some(Self::Opens),
      | "closes" => Some(Self::Closes),
      | "dates" => Some(Self::Dates),
      | "entry" => Some(Self::Entry),
      | "modified" => {
        Some(Self::Modified)
      }
      | "countdown" => {
        Some(Self::Countdown)
      }
      | _ => None
    }
  }

  fn default_label(
    &self
  ) -> &'static str {
    match self {
      | Self::Id => "ID",
      | Self::Uuid => "UUID",
      | Self::Status => "Status",
      | Self::Phase => "Phase",
      | Self::Type => "Type",
      | Self::Title => "Title",
      | Self::Venue => "Venue",
      | Self::Artists => "Artists",
      | Self::Tags => "Tags",
      | Self::Opens => "Opens",
      | Self::Closes => "Closes",
      | Self::Dates => "Dates",
      | Self::Entry => "Entry",
      | Self::Modified => "Modified",
      | Self::Countdown => "Countdown"
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct SortSpec {
  column:     ReportColumn,
  descending: bool
}

#[derive(Debug, Clone)]
pub(super) struct ReportSpec {
  name:         String,
  columns:      Vec<ReportColumn>,
  labels:       Vec<String>,
  sort:         Vec<SortSpec>,
  filter_terms: Vec<String>,
  limit:        Option<usize>
}

pub(super) fn is_report_command(
  cfg: &Config,
  command: &str
) -> bool {
  cfg
    .get(&format!(
      "report.{command}.columns"
    ))
    .is_some()
}

pub(super) fn load_report_spec(
  cfg: &Config,
  report_name: &str
) -> Option<ReportSpec> {
  let columns_raw =
    cfg.get(&format!(
      "report.{report_name}.columns"
    ))?;
  let columns: Vec<ReportColumn> =
    parse_config_list(&columns_raw)
      .into_iter()
      .filter_map(|token| {
        ReportColumn::parse(&token)
      })
      .collect();
  if columns.is_empty() {
    return None;
  }

  let labels_key = format!(
    "report.{report_name}.labels"
  );
  let mut labels = cfg
    .get(&labels_key)
    .map(|raw| parse_config_list(&raw))
    .unwrap_or_default();
  while labels.len() < columns.len() {
    labels.push(
      columns[labels.len()]
        .default_label()
        .to_string()
    );
  }
  labels.truncate(columns.len());

  let sort = parse_sort_specs(cfg.get(
    &format!(
      "report.{report_name}.sort"
    )
  ));
  let filter_terms = cfg
    .get(&format!(
      "report.{report_name}.filter"
    ))
    .map(|raw| {
      raw
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
    })
    .unwrap_or_default();
  let limit = cfg
    .get(&format!(
      "report.{report_name}.limit"
    ))
    .and_then(|raw| {
      raw.parse::<usize>().ok()
    })
    .filter(|value| *value > 0);

  Some(ReportSpec {
    name: report_name.to_string(),
    columns,
    labels,
    sort,
    filter_terms,
    limit
  })
}

fn parse_config_list(
  raw: &str
) -> Vec<String> {
  raw
    .split(',')
    .flat_map(str::split_whitespace)
    .map(str::trim)
    .filter(|token| !token.is_empty())
    .map(ToString::to_string)
    .collect()
}

fn parse_sort_specs(
  raw: Option<String>
) -> Vec<SortSpec> {
  let Some(raw) = raw else {
    return Vec::new();
  };

  parse_config_list(&raw)
    .into_iter()
    .filter_map(|token| {
      let (field, descending) =
        if let Some(field) =
          token.strip_suffix('-')
        {
          (field, true)
        } else if let Some(field) =
          token.strip_suffix('+')
        {
          (field, false)
        } else {
          (token.as_str(), false)
        };
      let column =
        ReportColumn::parse(field)?;
      Some(SortSpec {
        column,
        descending
      })
    })
    .collect()
}

#[instrument(skip(
  catalog,
  cfg,
  renderer,
  filter_terms,
  now
))]
pub(super) fn cmd_report(
  catalog: &mut Catalog,
  cfg: &Config,
  renderer: &mut Renderer,
  report_name: &str,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  let spec =
    load_report_spec(cfg, report_name)
      .ok_or_else(|| {
        anyhow!(
          "unknown report: \
           {report_name}"
        )
      })?;
  run_report(
    catalog,
    renderer,
    &spec,
    filter_terms,
    now
  )
}

#[instrument(skip(
  catalog,
  renderer,
  spec,
  cli_filter_terms,
  now
))]
pub(super) fn run_report(
  catalog: &mut Catalog,
  renderer: &mut Renderer,
  spec: &ReportSpec,
  cli_filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!(report = %spec.name, "command report");

  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let types = catalog.types_by_slug()?;

  let mut effective_filter_terms =
    spec.filter_terms.clone();
  effective_filter_terms.extend(
    cli_filter_terms.iter().cloned()
  );

  let filter = Filter::parse(
    &effective_filter_terms,
    now
  )?;

  let mut rows: Vec<Happening> =
    happenings
      .into_iter()
      .chain(archive)
      .filter(|happening| {
        filter.matches(happening, now)
      })
      .collect();

  rows.sort_by(|a, b| {
    compare_happenings_for_report(
      a, b, &spec.sort, now
    )
  });
  if let Some(limit) = spec.limit {
    rows.truncate(limit);
  }

  let table_rows: Vec<Vec<String>> =
    rows
      .iter()
      .map(|happening| {
        spec
          .columns
          .iter()
          .map(|col| {
            format_report_cell(
              happening, *col, &types,
              now
            )
          })
          .collect()
      })
      .collect();

  renderer.print_report_table(
    &spec.labels,
    &table_rows
  )?;
  Ok(())
}

fn compare_happenings_for_report(
  a: &Happening,
  b: &Happening,
  sort_specs: &[SortSpec],
  now: DateTime<Utc>
) -> Ordering {
  for sort_spec in sort_specs {
    let ordering =
      compare_on_column(
        a,
        b,
        sort_spec.column,
        now
      );
    if ordering != Ordering::Equal {
      return if sort_spec.descending {
        ordering.reverse()
      } else {
        ordering
      };
    }
  }

  a.id
    .unwrap_or(u64::MAX)
    .cmp(&b.id.unwrap_or(u64::MAX))
    .then_with(|| a.uuid.cmp(&b.uuid))
}

fn compare_on_column(
  a: &Happening,
  b: &Happening,
  column: ReportColumn,
  now: DateTime<Utc>
) -> Ordering {
  match column {
    | ReportColumn::Id => {
      cmp_optional(
        a.id.as_ref(),
        b.id.as_ref()
      )
    }
    | ReportColumn::Uuid => {
      a.uuid.cmp(&b.uuid)
    }
    | ReportColumn::Status => {
      status_label(a)
        .cmp(status_label(b))
    }
    | ReportColumn::Phase => {
      phase_rank(a, now)
        .cmp(&phase_rank(b, now))
    }
    | ReportColumn::Type => {
      a.type_slug.cmp(&b.type_slug)
    }
    | ReportColumn::Title => {
      a.title
        .to_ascii_lowercase()
        .cmp(
          &b.title
            .to_ascii_lowercase()
        )
    }
    | ReportColumn::Venue => {
      cmp_optional(
        a.venue.as_ref(),
        b.venue.as_ref()
      )
    }
    | ReportColumn::Artists => {
      a.artists
        .join(" ")
        .cmp(&b.artists.join(" "))
    }
    | ReportColumn::Tags => {
      a.tags
        .join(" ")
        .cmp(&b.tags.join(" "))
    }
    | ReportColumn::Opens => {
      cmp_optional(
        a.opens_at.as_ref(),
        b.opens_at.as_ref()
      )
    }
    | ReportColumn::Closes => {
      cmp_optional(
        a.closes_at.as_ref(),
        b.closes_at.as_ref()
      )
    }
    | ReportColumn::Dates => {
      cmp_optional(
        a.opens_at.as_ref(),
        b.opens_at.as_ref()
      )
      .then_with(|| {
        cmp_optional(
          a.closes_at.as_ref(),
          b.closes_at.as_ref()
        )
      })
    }
    | ReportColumn::Entry => {
      a.entry.cmp(&b.entry)
    }
    | ReportColumn::Modified => {
      a.modified.cmp(&b.modified)
    }
    | ReportColumn::Countdown => {
      cmp_optional(
        days_until_opening(
          now, a.opens_at
        )
        .as_ref(),
        days_until_opening(
          now, b.opens_at
        )
        .as_ref()
      )
    }
  }
}

fn cmp_optional<T: Ord>(
  left: Option<&T>,
  right: Option<&T>
) -> Ordering {
  match (left, right) {
    | (Some(a), Some(b)) => a.cmp(b),
    | (Some(_), None) => Ordering::Less,
    | (None, Some(_)) => {
      Ordering::Greater
    }
    | (None, None) => Ordering::Equal
  }
}

fn format_report_cell(
  happening: &Happening,
  column: ReportColumn,
  types: &BTreeMap<
    String,
    HappeningType
  >,
  now: DateTime<Utc>
) -> String {
  match column {
    | ReportColumn::Id => {
      happening
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| {
          "-".to_string()
        })
    }
    | ReportColumn::Uuid => {
      happening.uuid.to_string()
    }
    | ReportColumn::Status => {
      status_label(happening)
        .to_string()
    }
    | ReportColumn::Phase => {
      happening
        .phase(now)
        .label()
        .to_string()
    }
    | ReportColumn::Type => {
      happening.type_slug.clone()
    }
    | ReportColumn::Title => {
      happening.title.clone()
    }
    | ReportColumn::Venue => {
      happening
        .venue
        .clone()
        .unwrap_or_default()
    }
    | ReportColumn::Artists => {
      happening.artists.join(", ")
    }
    | ReportColumn::Tags => {
      happening
        .tags
        .iter()
        .map(|tag| format!("+{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
    }
    | ReportColumn::Opens => {
      format_report_date(
        happening.opens_at
      )
    }
    | ReportColumn::Closes => {
      format_report_date(
        happening.closes_at
      )
    }
    | ReportColumn::Dates => {
      let mode = types
        .get(&happening.type_slug)
        .map(|t| t.date_display)
        .unwrap_or(
          DateDisplayMode::DateRange
        );
      format_window(
        happening.opens_at,
        happening.closes_at,
        mode
      )
    }
    | ReportColumn::Entry => {
      format_gallery_date(
        happening.entry
      )
    }
    | ReportColumn::Modified => {
      format_gallery_date(
        happening.modified
      )
    }
    | ReportColumn::Countdown => {
      days_until_opening(
        now,
        happening.opens_at
      )
      .map(|days| days.to_string())
      .unwrap_or_default()
    }
  }
}

fn format_report_date(
  date: Option<DateTime<Utc>>
) -> String {
  date
    .map(format_gallery_date)
    .unwrap_or_default()
}

fn status_label(
  happening: &Happening
) -> &'static str {
  match happening.status {
    | Status::Scheduled => "scheduled",
    | Status::Archived => "archived",
    | Status::Cancelled => "cancelled"
  }
}

fn phase_rank(
  happening: &Happening,
  now: DateTime<Utc>
) -> u8 {
  match happening.phase(now) {
    | Phase::Current => 0,
    | Phase::Upcoming => 1,
    | Phase::Past => 2
  }
}
