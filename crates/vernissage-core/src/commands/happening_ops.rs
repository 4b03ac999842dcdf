use anyhow::anyhow;
use chrono::{
  DateTime,
  Utc
};
use tracing::{
  debug,
  info,
  instrument
};
use uuid::Uuid;

use super::modifiers::{
  apply_mods,
  parse_desc_and_mods,
  parse_mods,
  validate_type_slug
};
use super::report::{
  load_report_spec,
  run_report
};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::display::format_window;
use crate::filter::Filter;
use crate::happening::{
  Annotation,
  DateDisplayMode,
  Happening,
  Status
};
use crate::hooks::HookRunner;
use crate::listing::{
  group_by_phase,
  group_by_year
};
use crate::render::Renderer;
use crate::schedule::Phase;

/// Timeline views trail off after a
/// handful of closed runs.
const TIMELINE_PAST_LIMIT: usize = 5;

#[instrument(skip(
  catalog, hooks, cfg, _renderer,
  args, now
))]
pub(super) fn cmd_add(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  cfg: &Config,
  _renderer: &mut Renderer,
  args: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command add");

  let mut happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let types = catalog.types_by_slug()?;

  let next_id =
    catalog.next_id(&happenings);
  let (title, mods) =
    parse_desc_and_mods(args, now)?;
  let default_type = cfg
    .get("default.type")
    .unwrap_or_else(|| {
      "exhibition".to_string()
    });
  let mut happening =
    Happening::new_scheduled(
      title,
      default_type,
      now,
      next_id
    );
  apply_mods(&mut happening, &mods);
  validate_type_slug(
    &types,
    &happening.type_slug
  )?;
  happening =
    hooks.apply_on_add(&happening)?;
  if happening.id.is_none() {
    happening.id = Some(next_id);
  }

  happenings = catalog.add_happening(
    happenings,
    happening.clone()
  )?;
  catalog.push_undo_snapshot(
    &happenings_before,
    &archive
  )?;

  debug!(
    happening_count = happenings.len(),
    "happening added"
  );
  println!(
    "Created happening {}.",
    happening.id.unwrap_or(next_id)
  );
  Ok(())
}

#[instrument(skip(
  catalog,
  hooks,
  filter_terms,
  args,
  now
))]
pub(super) fn cmd_modify(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  filter_terms: &[String],
  args: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command modify");

  let mut happenings =
    catalog.load_happenings()?;
  let mut archive =
    catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let archive_before = archive.clone();
  let types = catalog.types_by_slug()?;

  let filter =
    Filter::parse(filter_terms, now)?;
  let include_archived = filter
    .has_explicit_status_filter()
    || filter.has_identity_selector();
  let mods = parse_mods(args, now)?;

  let mut changed = 0_u64;
  for happening in &mut happenings {
    if filter.matches(happening, now) {
      let old = happening.clone();
      apply_mods(happening, &mods);
      validate_type_slug(
        &types,
        &happening.type_slug
      )?;
      happening.modified = now;
      *happening = hooks
        .apply_on_modify(
          &old, happening
        )?;
      changed += 1;
    }
  }

  if include_archived {
    for happening in &mut archive {
      if filter.matches(happening, now)
      {
        let old = happening.clone();
        apply_mods(happening, &mods);
        validate_type_slug(
          &types,
          &happening.type_slug
        )?;
        happening.modified = now;
        *happening = hooks
          .apply_on_modify(
            &old, happening
          )?;
        changed += 1;
      }
    }
  }

  if changed > 0 {
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive_before
    )?;
    catalog
      .save_happenings(&happenings)?;
    if include_archived {
      catalog.save_archive(&archive)?;
    }
  }

  println!(
    "Modified {changed} happening(s)."
  );
  Ok(())
}

#[instrument(skip(
  catalog,
  cfg,
  renderer,
  report_name,
  filter_terms,
  now
))]
pub(super) fn cmd_list(
  catalog: &mut Catalog,
  cfg: &Config,
  renderer: &mut Renderer,
  report_name: &str,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command list");

  if let Some(spec) = load_report_spec(
    cfg,
    report_name
  ) {
    return run_report(
      catalog,
      renderer,
      &spec,
      filter_terms,
      now
    );
  }

  let happenings =
    catalog.load_happenings()?;
  let types = catalog.types_by_slug()?;

  let filter =
    Filter::parse(filter_terms, now)?;
  let include_archived = filter
    .has_explicit_status_filter()
    || filter.has_identity_selector();

  let mut rows: Vec<Happening> =
    if include_archived {
      happenings
        .into_iter()
        .chain(catalog.load_archive()?)
        .filter(|happening| {
          filter.matches(happening, now)
        })
        .collect()
    } else {
      happenings
        .into_iter()
        .filter(|happening| {
          filter.matches(happening, now)
        })
        .collect()
    };

  rows.sort_by_key(|happening| {
    (
      happening.opens_at.is_none(),
      happening.opens_at,
      happening.id
    )
  });
  renderer.print_happening_table(
    &rows, &types, now
  )?;
  Ok(())
}

#[instrument(skip(
  catalog,
  cfg,
  renderer,
  filter_terms,
  now
))]
pub(super) fn cmd_timeline(
  catalog: &mut Catalog,
  cfg: &Config,
  renderer: &mut Renderer,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command timeline");

  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let types = catalog.types_by_slug()?;

  let filter =
    Filter::parse(filter_terms, now)?;
  let rows: Vec<Happening> = happenings
    .into_iter()
    .chain(archive)
    .filter(|happening| {
      filter.matches(happening, now)
    })
    .collect();

  let mut timeline =
    group_by_phase(rows, now);
  let past_limit = cfg
    .get("timeline.past")
    .and_then(|raw| {
      raw.parse::<usize>().ok()
    })
    .unwrap_or(TIMELINE_PAST_LIMIT);
  timeline.past.truncate(past_limit);

  renderer.print_timeline(
    &timeline, &types, now
  )?;
  Ok(())
}

#[instrument(skip(
  catalog,
  filter_terms,
  now
))]
pub(super) fn cmd_history(
  catalog: &mut Catalog,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command history");

  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let types = catalog.types_by_slug()?;

  let filter =
    Filter::parse(filter_terms, now)?;
  let rows: Vec<Happening> = happenings
    .into_iter()
    .chain(archive)
    .filter(|happening| {
      happening.phase(now)
        == Phase::Past
        && filter
          .matches(happening, now)
    })
    .collect();

  let years = group_by_year(rows);
  if years.is_empty() {
    println!(
      "No closed happenings yet."
    );
    return Ok(());
  }

  for (year, grouped) in
    years.iter().rev()
  {
    println!("{year}");
    for happening in grouped {
      let mode = types
        .get(&happening.type_slug)
        .map(|t| t.date_display)
        .unwrap_or(
          DateDisplayMode::DateRange
        );
      let dates = format_window(
        happening.opens_at,
        happening.closes_at,
        mode
      );
      println!(
        "  {}  {}",
        happening.title, dates
      );
    }
  }
  Ok(())
}

#[instrument(skip(
  catalog,
  renderer,
  filter_terms,
  now
))]
pub(super) fn cmd_info(
  catalog: &mut Catalog,
  renderer: &mut Renderer,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command info");

  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let types = catalog.types_by_slug()?;
  let filter =
    Filter::parse(filter_terms, now)?;

  let mut rows: Vec<Happening> =
    happenings
      .into_iter()
      .chain(archive)
      .filter(|happening| {
        filter.matches(happening, now)
      })
      .collect();

  rows.sort_by_key(|happening| {
    happening.id.unwrap_or(u64::MAX)
  });

  if rows.is_empty() {
    return Err(anyhow!(
      "no matching happenings"
    ));
  }

  for happening in rows {
    renderer.print_happening_info(
      &happening, &types, now
    )?;
    println!();
  }

  Ok(())
}

#[instrument(skip(
  catalog,
  hooks,
  filter_terms,
  args,
  now
))]
pub(super) fn cmd_annotate(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  filter_terms: &[String],
  args: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command annotate");

  if args.is_empty() {
    return Err(anyhow!(
      "annotate requires annotation \
       text"
    ));
  }
  let note = args.join(" ");

  let mut happenings =
    catalog.load_happenings()?;
  let mut archive =
    catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let archive_before = archive.clone();

  let filter =
    Filter::parse(filter_terms, now)?;
  let mut touched = 0_u64;

  for happening in &mut happenings {
    if filter.matches(happening, now) {
      let old = happening.clone();
      happening.annotations.push(
        Annotation {
          entry:       now,
          description: note.clone()
        }
      );
      happening.modified = now;
      *happening = hooks
        .apply_on_modify(
          &old, happening
        )?;
      touched += 1;
    }
  }

  for happening in &mut archive {
    if filter.matches(happening, now) {
      let old = happening.clone();
      happening.annotations.push(
        Annotation {
          entry:       now,
          description: note.clone()
        }
      );
      happening.modified = now;
      *happening = hooks
        .apply_on_modify(
          &old, happening
        )?;
      touched += 1;
    }
  }

  if touched > 0 {
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive_before
    )?;
    catalog
      .save_happenings(&happenings)?;
    catalog.save_archive(&archive)?;
  }

  println!(
    "Annotated {touched} happening(s)."
  );
  Ok(())
}

#[instrument(skip(
  catalog,
  hooks,
  filter_terms,
  args,
  now
))]
pub(super) fn cmd_denotate(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  filter_terms: &[String],
  args: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command denotate");

  if args.is_empty() {
    return Err(anyhow!(
      "denotate requires an index or \
       text selector"
    ));
  }

  let selector_idx = if args.len() == 1
  {
    args[0]
      .parse::<usize>()
      .ok()
      .filter(|idx| *idx > 0)
  } else {
    None
  };
  let selector_text =
    if selector_idx.is_none() {
      Some(
        args
          .join(" ")
          .to_ascii_lowercase()
      )
    } else {
      None
    };

  let mut happenings =
    catalog.load_happenings()?;
  let mut archive =
    catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let archive_before = archive.clone();

  let filter =
    Filter::parse(filter_terms, now)?;

  let (touched_working, removed_working) =
    denotate_happenings(
      &mut happenings,
      hooks,
      &filter,
      selector_idx,
      selector_text.as_deref(),
      now
    )?;
  let (touched_archive, removed_archive) =
    denotate_happenings(
      &mut archive,
      hooks,
      &filter,
      selector_idx,
      selector_text.as_deref(),
      now
    )?;

  let touched =
    touched_working + touched_archive;
  let removed =
    removed_working + removed_archive;

  if removed > 0 {
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive_before
    )?;
    catalog
      .save_happenings(&happenings)?;
    catalog.save_archive(&archive)?;
  }

  println!(
    "Removed {removed} annotation(s) \
     from {touched} happening(s)."
  );
  Ok(())
}

fn denotate_happenings(
  happenings: &mut [Happening],
  hooks: &HookRunner,
  filter: &Filter,
  selector_idx: Option<usize>,
  selector_text: Option<&str>,
  now: DateTime<Utc>
) -> anyhow::Result<(u64, u64)> {
  let mut touched = 0_u64;
  let mut removed = 0_u64;

  for happening in happenings {
    if !filter.matches(happening, now) {
      continue;
    }

    let old = happening.clone();
    let before =
      happening.annotations.len();
    if let Some(idx) = selector_idx {
      if idx
        <= happening.annotations.len()
      {
        happening
          .annotations
          .remove(idx - 1);
      }
    } else if let Some(text) =
      selector_text
    {
      happening.annotations.retain(
        |ann| {
          !ann
            .description
            .to_ascii_lowercase()
            .contains(text)
        }
      );
    }

    let after =
      happening.annotations.len();
    if after < before {
      touched += 1;
      removed +=
        (before - after) as u64;
      happening.modified = now;
      *happening = hooks
        .apply_on_modify(
          &old, happening
        )?;
    }
  }

  Ok((touched, removed))
}

#[instrument(skip(
  catalog,
  hooks,
  filter_terms,
  now
))]
pub(super) fn cmd_duplicate(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command duplicate");

  let mut happenings =
    catalog.load_happenings()?;
  let happenings_before =
    happenings.clone();
  let archive = catalog.load_archive()?;

  let filter =
    Filter::parse(filter_terms, now)?;
  let include_archived = filter
    .has_explicit_status_filter()
    || filter.has_identity_selector();
  let mut next_id =
    catalog.next_id(&happenings);

  let mut sources: Vec<&Happening> =
    happenings.iter().collect();
  if include_archived {
    sources.extend(archive.iter());
  }

  let mut clones = Vec::new();
  for happening in sources {
    if filter.matches(happening, now) {
      let mut duplicate =
        happening.clone();
      duplicate.uuid = Uuid::new_v4();
      duplicate.id = Some(next_id);
      duplicate.status =
        Status::Scheduled;
      duplicate.entry = now;
      duplicate.modified = now;
      duplicate.opens_at = None;
      duplicate.closes_at = None;
      duplicate.active_override = None;
      duplicate = hooks
        .apply_on_add(&duplicate)?;
      if duplicate.id.is_none() {
        duplicate.id = Some(next_id);
      }
      next_id += 1;
      clones.push(duplicate);
    }
  }

  let duplicated = clones.len() as u64;
  if duplicated > 0 {
    happenings.extend(clones);
    happenings.sort_by_key(
      |happening| {
        happening
          .id
          .unwrap_or(u64::MAX)
      }
    );
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive
    )?;
    catalog
      .save_happenings(&happenings)?;
  }

  println!(
    "Duplicated {duplicated} \
     happening(s) as unscheduled \
     drafts."
  );
  Ok(())
}

#[instrument(skip(
  catalog, hooks, cfg, args, now
))]
pub(super) fn cmd_log(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  cfg: &Config,
  args: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command log");

  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let archive_before = archive.clone();
  let types = catalog.types_by_slug()?;

  let (title, mods) =
    parse_desc_and_mods(args, now)?;
  let default_type = cfg
    .get("default.type")
    .unwrap_or_else(|| {
      "exhibition".to_string()
    });

  let mut happening =
    Happening::new_scheduled(
      title,
      default_type,
      now,
      catalog.next_id(&happenings)
    );
  apply_mods(&mut happening, &mods);
  validate_type_slug(
    &types,
    &happening.type_slug
  )?;
  happening.status = Status::Archived;
  happening.modified = now;
  happening =
    hooks.apply_on_add(&happening)?;
  happening.id = None;

  let mut archive_new = archive;
  archive_new.push(happening.clone());
  archive_new.sort_by_key(|row| {
    (
      row.closes_at.or(row.opens_at),
      row.uuid
    )
  });

  catalog.push_undo_snapshot(
    &happenings_before,
    &archive_before
  )?;
  catalog
    .save_archive(&archive_new)?;

  println!(
    "Logged happening '{}' straight \
     to the archive.",
    happening.title
  );
  Ok(())
}

#[instrument(skip(
  catalog,
  hooks,
  filter_terms,
  now
))]
pub(super) fn cmd_archive(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command archive");

  let mut happenings =
    catalog.load_happenings()?;
  let mut archive =
    catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let archive_before = archive.clone();

  let filter =
    Filter::parse(filter_terms, now)?;
  let explicit = filter
    .has_explicit_status_filter()
    || filter.has_identity_selector();

  let mut moved = 0_u64;
  let mut still_on_view = 0_u64;
  let mut keep = Vec::with_capacity(
    happenings.len()
  );

  for mut happening in
    happenings.drain(..)
  {
    if happening.status
      == Status::Scheduled
      && filter.matches(&happening, now)
    {
      if happening.phase(now)
        == Phase::Current
        && !explicit
      {
        still_on_view += 1;
        keep.push(happening);
        continue;
      }

      let old = happening.clone();
      happening.status =
        Status::Archived;
      happening.id = None;
      happening.modified = now;
      happening = hooks
        .apply_on_modify(
          &old, &happening
        )?;

      match happening.status {
        | Status::Archived => {
          archive.push(happening)
        }
        | Status::Scheduled
        | Status::Cancelled => {
          keep.push(happening)
        }
      }
      moved += 1;
    } else {
      keep.push(happening);
    }
  }

  if moved > 0 {
    archive.sort_by_key(|row| {
      (
        row.closes_at.or(row.opens_at),
        row.uuid
      )
    });
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive_before
    )?;
    catalog.save_happenings(&keep)?;
    catalog.save_archive(&archive)?;
  }

  println!(
    "Archived {moved} happening(s)."
  );
  if still_on_view > 0 {
    println!(
      "Skipped {still_on_view} \
       happening(s) still on view; \
       select them by id to archive \
       anyway."
    );
  }
  Ok(())
}

#[instrument(skip(
  catalog,
  hooks,
  filter_terms,
  now
))]
pub(super) fn cmd_cancel(
  catalog: &mut Catalog,
  hooks: &HookRunner,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command cancel");

  let mut happenings =
    catalog.load_happenings()?;
  let happenings_before =
    happenings.clone();
  let filter =
    Filter::parse(filter_terms, now)?;

  let mut cancelled = 0_u64;
  for happening in &mut happenings {
    if happening.status
      == Status::Scheduled
      && filter.matches(happening, now)
    {
      let old = happening.clone();
      happening.status =
        Status::Cancelled;
      happening.modified = now;
      *happening = hooks
        .apply_on_modify(
          &old, happening
        )?;
      cancelled += 1;
    }
  }

  if cancelled > 0 {
    let archive =
      catalog.load_archive()?;
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive
    )?;
    catalog
      .save_happenings(&happenings)?;
  }

  println!(
    "Cancelled {cancelled} \
     happening(s) (soft-cancel)."
  );
  Ok(())
}

#[instrument(skip(catalog))]
pub(super) fn cmd_purge(
  catalog: &mut Catalog
) -> anyhow::Result<()> {
  info!("command purge");

  let happenings =
    catalog.load_happenings()?;
  let has_cancelled =
    happenings.iter().any(|row| {
      row.status == Status::Cancelled
    });
  if has_cancelled {
    let archive =
      catalog.load_archive()?;
    catalog.push_undo_snapshot(
      &happenings,
      &archive
    )?;
  }

  let purged =
    catalog.purge_cancelled()?;
  println!(
    "Purged {purged} cancelled \
     happening(s)."
  );
  Ok(())
}
