use std::collections::{
  BTreeMap,
  BTreeSet
};
use std::io::{
  self,
  Read
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Utc
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{
  info,
  instrument,
  warn
};
use uuid::Uuid;

use super::prelude::known_command_names;
use super::report::is_report_command;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::filter::Filter;
use crate::happening::{
  Annotation,
  DateDisplayMode,
  Happening,
  HappeningType,
  Status
};
use crate::hooks::HookRunner;
use crate::listing::artist_directory;
use crate::newsletter::{
  Subscriber,
  normalize_email,
  validate_email
};
use crate::render::Renderer;

#[instrument(skip(catalog))]
pub(super) fn cmd_undo(
  catalog: &mut Catalog
) -> anyhow::Result<()> {
  info!("command undo");

  let Some((happenings, archive)) =
    catalog.pop_undo_snapshot()?
  else {
    println!(
      "No undo transactions available."
    );
    return Ok(());
  };

  catalog
    .save_happenings(&happenings)?;
  catalog.save_archive(&archive)?;

  println!("Undo completed.");
  Ok(())
}

#[instrument(skip(
  catalog,
  filter_terms,
  now
))]
pub(super) fn cmd_export(
  catalog: &mut Catalog,
  filter_terms: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command export");

  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let filter =
    Filter::parse(filter_terms, now)?;

  let rows: Vec<Happening> = happenings
    .into_iter()
    .chain(archive)
    .filter(|happening| {
      filter
        .matches_without_cancelled_guard(
          happening, now
        )
    })
    .collect();

  let out =
    serde_json::to_string(&rows)?;
  println!("{out}");
  Ok(())
}

#[derive(Debug, Clone, Deserialize)]
struct ImportHappening {
  #[serde(default)]
  uuid:            Option<Uuid>,
  #[serde(default)]
  id:              Option<u64>,
  #[serde(default)]
  title:           Option<String>,
  #[serde(default)]
  status:          Option<Status>,
  #[serde(default)]
  type_slug:       Option<String>,
  #[serde(
    default,
    with = "crate::datetime::gallery_date_serde::lenient"
  )]
  opens_at:
    Option<DateTime<Utc>>,
  #[serde(
    default,
    with = "crate::datetime::gallery_date_serde::lenient"
  )]
  closes_at:
    Option<DateTime<Utc>>,
  #[serde(default)]
  active_override: Option<bool>,
  #[serde(default)]
  venue:           Option<String>,
  #[serde(default)]
  artists:         Vec<String>,
  #[serde(default)]
  tags:            Vec<String>,
  #[serde(default)]
  summary:         Option<String>,
  #[serde(
    default,
    with = "crate::datetime::gallery_date_serde::option"
  )]
  entry: Option<DateTime<Utc>>,
  #[serde(
    default,
    with = "crate::datetime::gallery_date_serde::option"
  )]
  modified:
    Option<DateTime<Utc>>,
  #[serde(default)]
  annotations:     Vec<Annotation>,
  #[serde(flatten)]
  extra:           BTreeMap<String, Value>
}

#[instrument(skip(catalog, hooks))]
pub(super) fn cmd_import(
  catalog: &mut Catalog,
  hooks: &HookRunner
) -> anyhow::Result<()> {
  info!("command import");
  let now = Utc::now();

  let mut stdin = String::new();
  io::stdin()
    .read_to_string(&mut stdin)
    .context("failed reading stdin")?;

  let trimmed = stdin.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "import: empty input"
    ));
  }

  let mut happenings =
    catalog.load_happenings()?;
  let mut archive =
    catalog.load_archive()?;
  let happenings_before =
    happenings.clone();
  let archive_before = archive.clone();
  let types = catalog.types_by_slug()?;

  let imported =
    parse_import_items(trimmed)?;
  let mut adds = 0_u64;
  let mut mods = 0_u64;

  for row in imported {
    let existing =
      row.uuid.and_then(|uuid| {
        find_happening_by_uuid(
          &happenings, &archive, uuid
        )
      });
    let mut happening =
      normalize_import_item(row, now);
    if !types.contains_key(
      &happening.type_slug
    ) {
      warn!(
        type_slug = %happening.type_slug,
        "imported happening references an unknown type"
      );
    }
    normalize_import_identity_and_status(&mut happening, existing.as_ref(), catalog.next_id(&happenings));

    if let Some(old) = existing.as_ref()
    {
      happening = hooks.apply_on_modify(
        old, &happening
      )?;
      mods += 1;
    } else {
      happening = hooks
        .apply_on_add(&happening)?;
      adds += 1;
    }
    normalize_import_identity_and_status(&mut happening, existing.as_ref(), catalog.next_id(&happenings));
    upsert_imported_happening(
      &mut happenings,
      &mut archive,
      happening,
      existing.as_ref().map(|h| h.uuid)
    );
  }

  let imported_count = adds + mods;
  if imported_count > 0 {
    catalog.push_undo_snapshot(
      &happenings_before,
      &archive_before
    )?;
    catalog
      .save_happenings(&happenings)?;
    catalog.save_archive(&archive)?;
  }

  println!(
    "Imported {imported_count} \
     happening(s)."
  );
  Ok(())
}

fn parse_import_items(
  trimmed: &str
) -> anyhow::Result<Vec<ImportHappening>>
{
  if trimmed.starts_with('[') {
    return serde_json::from_str(
      trimmed
    )
    .context(
      "failed parsing JSON array"
    );
  }

  if trimmed.starts_with('{') {
    if let Ok(item) =
      serde_json::from_str::<ImportHappening>(
        trimmed
      )
    {
      return Ok(vec![item]);
    }
  }

  let mut out = Vec::new();
  for (idx, line) in
    trimmed.lines().enumerate()
  {
    let token = line.trim();
    if token.is_empty() {
      continue;
    }
    let item: ImportHappening =
      serde_json::from_str(token)
        .with_context(|| {
          format!(
            "failed parsing import \
             line {}",
            idx + 1
          )
        })?;
    out.push(item);
  }

  if out.is_empty() {
    return Err(anyhow!(
      "import: empty input"
    ));
  }

  Ok(out)
}

fn normalize_import_item(
  item: ImportHappening,
  now: DateTime<Utc>
) -> Happening {
  let status = item
    .status
    .unwrap_or(Status::Scheduled);
  let entry = item.entry.unwrap_or(now);
  let modified =
    item.modified.unwrap_or(now);
  Happening {
    uuid: item
      .uuid
      .unwrap_or_else(Uuid::new_v4),
    id: None,
    title: item
      .title
      .unwrap_or_default(),
    status,
    type_slug: item
      .type_slug
      .unwrap_or_else(|| {
        "exhibition".to_string()
      }),
    opens_at: item.opens_at,
    closes_at: item.closes_at,
    active_override: item
      .active_override,
    venue: item.venue,
    artists: item.artists,
    tags: item.tags,
    summary: item.summary,
    entry,
    modified,
    annotations: item.annotations,
    extra: item.extra
  }
}

fn normalize_import_identity_and_status(
  happening: &mut Happening,
  old: Option<&Happening>,
  next_id: u64
) {
  match happening.status {
    | Status::Scheduled
    | Status::Cancelled => {
      happening.id = old
        .filter(|prev| {
          prev.status
            != Status::Archived
        })
        .and_then(|prev| prev.id)
        .or(Some(next_id));
    }
    | Status::Archived => {
      happening.id = None;
    }
  }
}

fn find_happening_by_uuid(
  happenings: &[Happening],
  archive: &[Happening],
  uuid: Uuid
) -> Option<Happening> {
  happenings
    .iter()
    .find(|row| row.uuid == uuid)
    .cloned()
    .or_else(|| {
      archive
        .iter()
        .find(|row| row.uuid == uuid)
        .cloned()
    })
}

fn upsert_imported_happening(
  happenings: &mut Vec<Happening>,
  archive: &mut Vec<Happening>,
  happening: Happening,
  old_uuid: Option<Uuid>
) {
  let old_uuid =
    old_uuid.unwrap_or(happening.uuid);
  happenings.retain(|row| {
    row.uuid != old_uuid
      && row.uuid != happening.uuid
  });
  archive.retain(|row| {
    row.uuid != old_uuid
      && row.uuid != happening.uuid
  });

  match happening.status {
    | Status::Archived => {
      archive.push(happening)
    }
    | Status::Scheduled
    | Status::Cancelled => {
      happenings.push(happening)
    }
  }

  happenings.sort_by_key(|row| {
    row.id.unwrap_or(u64::MAX)
  });
  archive.sort_by_key(|row| {
    (
      row.closes_at.or(row.opens_at),
      row.uuid
    )
  });
}

#[instrument(skip(
  catalog, renderer, args
))]
pub(super) fn cmd_types(
  catalog: &mut Catalog,
  renderer: &mut Renderer,
  args: &[String]
) -> anyhow::Result<()> {
  info!("command types");

  let mut types =
    catalog.load_types()?;

  if args.is_empty() {
    types.sort_by(|a, b| {
      a.slug.cmp(&b.slug)
    });
    let labels = vec![
      "Slug".to_string(),
      "Name".to_string(),
      "Display".to_string(),
    ];
    let rows: Vec<Vec<String>> = types
      .iter()
      .map(|t| {
        vec![
          t.slug.clone(),
          t.name.clone(),
          display_mode_token(
            t.date_display
          )
          .to_string(),
        ]
      })
      .collect();
    renderer.print_report_table(
      &labels, &rows
    )?;
    return Ok(());
  }

  match args[0].as_str() {
    | "add" => {
      let rest = &args[1..];
      if rest.len() < 2 {
        return Err(anyhow!(
          "types add requires a slug \
           and a name"
        ));
      }

      let slug = rest[0].clone();
      if types
        .iter()
        .any(|t| t.slug == slug)
      {
        return Err(anyhow!(
          "type slug already exists: \
           {slug}"
        ));
      }

      let mut date_display =
        DateDisplayMode::DateRange;
      let mut name_words = Vec::new();
      for word in &rest[1..] {
        if let Some(token) = word
          .strip_prefix("display:")
        {
          date_display =
            parse_display_mode(token)?;
        } else {
          name_words
            .push(word.clone());
        }
      }
      let name = name_words.join(" ");
      if name.trim().is_empty() {
        return Err(anyhow!(
          "types add requires a name"
        ));
      }

      types.push(HappeningType {
        name,
        slug: slug.clone(),
        date_display
      });
      catalog.save_types(&types)?;
      println!(
        "Created happening type \
         '{slug}'."
      );
      Ok(())
    }
    | other => Err(anyhow!(
      "unknown types subcommand: \
       {other}"
    ))
  }
}

fn parse_display_mode(
  token: &str
) -> anyhow::Result<DateDisplayMode> {
  match token {
    | "date-range" => {
      Ok(DateDisplayMode::DateRange)
    }
    | "datetime" => {
      Ok(DateDisplayMode::DateTime)
    }
    | other => Err(anyhow!(
      "display must be date-range or \
       datetime, got '{other}'"
    ))
  }
}

fn display_mode_token(
  mode: DateDisplayMode
) -> &'static str {
  match mode {
    | DateDisplayMode::DateRange => {
      "date-range"
    }
    | DateDisplayMode::DateTime => {
      "datetime"
    }
  }
}

#[instrument(skip(catalog))]
pub(super) fn cmd_artists(
  catalog: &mut Catalog
) -> anyhow::Result<()> {
  let happenings =
    catalog.load_happenings()?;
  let archive = catalog.load_archive()?;
  let rows: Vec<Happening> = happenings
    .into_iter()
    .chain(archive)
    .collect();

  for (initial, names) in
    artist_directory(&rows)
  {
    println!("{initial}");
    for name in names {
      println!("  {name}");
    }
  }
  Ok(())
}

#[instrument(skip(catalog))]
pub(super) fn cmd_venues(
  catalog: &mut Catalog
) -> anyhow::Result<()> {
  let happenings =
    catalog.load_happenings()?;
  let mut set = BTreeSet::new();
  for happening in happenings {
    if let Some(venue) =
      happening.venue
    {
      set.insert(venue);
    }
  }

  for venue in set {
    println!("{venue}");
  }
  Ok(())
}

#[instrument(skip(catalog))]
pub(super) fn cmd_tags(
  catalog: &mut Catalog
) -> anyhow::Result<()> {
  let happenings =
    catalog.load_happenings()?;
  let mut set = BTreeSet::new();
  for happening in happenings {
    for tag in happening.tags {
      set.insert(tag);
    }
  }

  for tag in set {
    println!("{tag}");
  }
  Ok(())
}

#[instrument(skip(
  catalog, args, now
))]
pub(super) fn cmd_signup(
  catalog: &mut Catalog,
  args: &[String],
  now: DateTime<Utc>
) -> anyhow::Result<()> {
  info!("command signup");

  let raw =
    args.first().ok_or_else(|| {
      anyhow!(
        "signup requires an email \
         address"
      )
    })?;
  let email = normalize_email(raw);
  validate_email(&email)?;

  let mut subscribers =
    catalog.load_subscribers()?;
  if subscribers
    .iter()
    .any(|s| s.email == email)
  {
    println!(
      "Already subscribed: {email}."
    );
    return Ok(());
  }

  subscribers.push(Subscriber {
    email:  email.clone(),
    entry:  now,
    source: Some("cli".to_string())
  });
  catalog
    .save_subscribers(&subscribers)?;

  println!("Subscribed {email}.");
  Ok(())
}

#[instrument(skip(catalog, args))]
pub(super) fn cmd_unsubscribe(
  catalog: &mut Catalog,
  args: &[String]
) -> anyhow::Result<()> {
  info!("command unsubscribe");

  let raw =
    args.first().ok_or_else(|| {
      anyhow!(
        "unsubscribe requires an \
         email address"
      )
    })?;
  let email = normalize_email(raw);

  let mut subscribers =
    catalog.load_subscribers()?;
  let before = subscribers.len();
  subscribers
    .retain(|s| s.email != email);

  if subscribers.len() == before {
    println!(
      "Not subscribed: {email}."
    );
    return Ok(());
  }

  catalog
    .save_subscribers(&subscribers)?;
  println!("Unsubscribed {email}.");
  Ok(())
}

#[instrument(skip(catalog))]
pub(super) fn cmd_subscribers(
  catalog: &mut Catalog
) -> anyhow::Result<()> {
  let subscribers =
    catalog.load_subscribers()?;
  println!(
    "{} subscriber(s).",
    subscribers.len()
  );

  let mut emails: Vec<String> =
    subscribers
      .into_iter()
      .map(|s| s.email)
      .collect();
  emails.sort();
  for email in emails {
    println!("{email}");
  }
  Ok(())
}

#[instrument(skip(catalog, cfg, args))]
pub(super) fn cmd_context(
  catalog: &mut Catalog,
  cfg: &Config,
  args: &[String]
) -> anyhow::Result<()> {
  if args.is_empty() {
    let active =
      catalog.get_active_context()?;
    println!(
      "active={}",
      active.unwrap_or_else(|| {
        "none".to_string()
      })
    );

    for (key, value) in cfg.iter() {
      if let Some(name) =
        key.strip_prefix("context.")
      {
        println!("{name} {value}");
      }
    }
    return Ok(());
  }

  let cmd =
    args[0].to_ascii_lowercase();
  if cmd == "none" || cmd == "clear" {
    catalog.set_active_context(None)?;
    println!("Context cleared.");
    return Ok(());
  }

  let name = args[0].as_str();
  let key = format!("context.{name}");
  if cfg.get(&key).is_none() {
    return Err(anyhow!(
      "unknown context: {name}"
    ));
  }

  catalog
    .set_active_context(Some(name))?;
  println!("Context set: {name}");
  Ok(())
}

pub(super) fn cmd_commands()
-> anyhow::Result<()> {
  for command in known_command_names() {
    println!("{command}");
  }
  Ok(())
}

pub(super) fn cmd_show(
  cfg: &Config
) -> anyhow::Result<()> {
  for (k, v) in cfg.iter() {
    println!("{k}={v}");
  }
  Ok(())
}

pub(super) fn cmd_unique(
  catalog: &mut Catalog,
  args: &[String]
) -> anyhow::Result<()> {
  if args.is_empty() {
    println!("artist");
    println!("status");
    println!("tag");
    println!("type");
    println!("venue");
    return Ok(());
  }

  match args[0].as_str() {
    | "artist" | "artists" => {
      let happenings =
        catalog.load_happenings()?;
      let archive =
        catalog.load_archive()?;
      let mut set = BTreeSet::new();
      for happening in happenings
        .into_iter()
        .chain(archive)
      {
        for artist in happening.artists
        {
          set.insert(artist);
        }
      }
      for artist in set {
        println!("{artist}");
      }
      Ok(())
    }
    | "status" => {
      println!("scheduled");
      println!("archived");
      println!("cancelled");
      Ok(())
    }
    | "tag" | "tags" => {
      cmd_tags(catalog)
    }
    | "type" | "types" => {
      let types =
        catalog.load_types()?;
      let mut slugs: Vec<String> =
        types
          .into_iter()
          .map(|t| t.slug)
          .collect();
      slugs.sort();
      for slug in slugs {
        println!("{slug}");
      }
      Ok(())
    }
    | "venue" | "venues" => {
      cmd_venues(catalog)
    }
    | _ => Ok(())
  }
}

pub(super) fn cmd_help()
-> anyhow::Result<()> {
  println!(
    "Implemented commands: add, \
     modify, list, timeline, \
     current/upcoming/past, history, \
     info, annotate, denotate, \
     duplicate, log, archive, cancel, \
     purge, undo, export, import, \
     types, artists, venues, tags, \
     signup, unsubscribe, \
     subscribers, context"
  );
  Ok(())
}

#[instrument(skip(
  catalog,
  cfg,
  command,
  filter_terms
))]
pub(super) fn resolve_effective_filter_terms(
  catalog: &Catalog,
  cfg: &Config,
  command: &str,
  filter_terms: &[String]
) -> anyhow::Result<Vec<String>> {
  if !command_uses_filter(cfg, command)
  {
    return Ok(filter_terms.to_vec());
  }

  let mut out = Vec::new();
  if let Some(active) =
    catalog.get_active_context()?
  {
    let key =
      format!("context.{active}");
    if let Some(expr) = cfg.get(&key) {
      out.extend(
        expr
          .split_whitespace()
          .map(ToString::to_string)
      );
    }
  }
  out.extend(
    filter_terms.iter().cloned()
  );
  Ok(out)
}

fn command_uses_filter(
  cfg: &Config,
  command: &str
) -> bool {
  matches!(
    command,
    "modify"
      | "list"
      | "timeline"
      | "current"
      | "upcoming"
      | "past"
      | "history"
      | "info"
      | "annotate"
      | "denotate"
      | "duplicate"
      | "archive"
      | "cancel"
  ) || is_report_command(cfg, command)
}
