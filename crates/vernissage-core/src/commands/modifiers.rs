use std::collections::BTreeMap;

use anyhow::{
  Result,
  anyhow,
  bail
};
use chrono::{
  DateTime,
  Utc
};
use tracing::warn;

use crate::datetime::parse_date_expr;
use crate::happening::{
  Happening,
  HappeningType
};

/// One `key:value`, `+tag` or `-tag` edit from the
/// command line.
#[derive(Debug, Clone)]
pub(super) enum Mod {
  TagAdd(String),
  TagRemove(String),
  Type(String),
  Venue(String),
  Artist(String),
  Summary(String),
  Opens(Option<DateTime<Utc>>),
  Closes(Option<DateTime<Utc>>),
  Active(Option<bool>)
}

/// Split `add`/`log` arguments into a title and a
/// list of modifiers. A literal `--` forces every
/// later word into the title.
pub(super) fn parse_desc_and_mods(
  args: &[String],
  now: DateTime<Utc>
) -> Result<(String, Vec<Mod>)> {
  let mut words = Vec::new();
  let mut mods = Vec::new();
  let mut literal = false;
  for arg in args {
    if !literal && arg == "--" {
      literal = true;
      continue;
    }
    if !literal
      && let Some(m) = parse_one_mod(arg, now)?
    {
      mods.push(m);
      continue;
    }
    words.push(arg.clone());
  }
  let title = words.join(" ");
  if title.trim().is_empty() {
    bail!("a title is required");
  }
  Ok((title, mods))
}

/// Parse modifier arguments for `modify`. Words that
/// are not modifiers are rejected rather than folded
/// into a title.
pub(super) fn parse_mods(
  args: &[String],
  now: DateTime<Utc>
) -> Result<Vec<Mod>> {
  let mut mods = Vec::new();
  for arg in args {
    match parse_one_mod(arg, now)? {
      | Some(m) => mods.push(m),
      | None => {
        warn!(arg = %arg, "ignoring unrecognized modifier");
      }
    }
  }
  Ok(mods)
}

fn parse_one_mod(
  raw: &str,
  now: DateTime<Utc>
) -> Result<Option<Mod>> {
  if let Some(tag) = raw.strip_prefix('+') {
    return Ok(Some(Mod::TagAdd(tag.to_string())));
  }
  if let Some(tag) = raw.strip_prefix('-') {
    return Ok(Some(Mod::TagRemove(tag.to_string())));
  }
  let Some((key, value)) = raw
    .split_once(':')
    .or_else(|| raw.split_once('='))
  else {
    return Ok(None);
  };
  match key {
    | "type" => Ok(Some(Mod::Type(value.to_string()))),
    | "venue" => Ok(Some(Mod::Venue(value.to_string()))),
    | "artist" => {
      Ok(Some(Mod::Artist(value.to_string())))
    }
    | "summary" => {
      Ok(Some(Mod::Summary(value.to_string())))
    }
    | "opens" => {
      if value.trim().is_empty() {
        Ok(Some(Mod::Opens(None)))
      } else {
        Ok(Some(Mod::Opens(Some(parse_date_expr(
          value, now
        )?))))
      }
    }
    | "closes" => {
      if value.trim().is_empty() {
        Ok(Some(Mod::Closes(None)))
      } else {
        Ok(Some(Mod::Closes(Some(parse_date_expr(
          value, now
        )?))))
      }
    }
    | "active" => match value {
      | "on" => Ok(Some(Mod::Active(Some(true)))),
      | "off" => Ok(Some(Mod::Active(Some(false)))),
      | "auto" => Ok(Some(Mod::Active(None))),
      | other => Err(anyhow!(
        "active must be on, off or auto, got '{other}'"
      ))
    },
    | _ => Ok(None)
  }
}

/// Apply parsed modifiers to a happening in order.
/// An empty value clears the matching field.
pub(super) fn apply_mods(
  happening: &mut Happening,
  mods: &[Mod]
) {
  for m in mods {
    match m {
      | Mod::TagAdd(tag) => {
        if !happening.tags.contains(tag) {
          happening.tags.push(tag.clone());
        }
      }
      | Mod::TagRemove(tag) => {
        happening.tags.retain(|t| t != tag);
      }
      | Mod::Type(slug) => {
        happening.type_slug = slug.clone();
      }
      | Mod::Venue(venue) => {
        happening.venue = if venue.is_empty() {
          None
        } else {
          Some(venue.clone())
        };
      }
      | Mod::Artist(artist) => {
        if !artist.is_empty()
          && !happening.artists.contains(artist)
        {
          happening.artists.push(artist.clone());
        }
      }
      | Mod::Summary(summary) => {
        happening.summary = if summary.is_empty() {
          None
        } else {
          Some(summary.clone())
        };
      }
      | Mod::Opens(when) => {
        happening.opens_at = *when;
      }
      | Mod::Closes(when) => {
        happening.closes_at = *when;
      }
      | Mod::Active(forced) => {
        happening.active_override = *forced;
      }
    }
  }
}

/// Every happening carries a type slug; edits must
/// point at a type the catalog knows about.
pub(super) fn validate_type_slug(
  types: &BTreeMap<String, HappeningType>,
  slug: &str
) -> Result<()> {
  if types.contains_key(slug) {
    return Ok(());
  }
  Err(anyhow!(
    "unknown happening type '{slug}' (see 'vernissage types')"
  ))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn now() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
      .unwrap()
  }

  #[test]
  fn double_dash_forces_literal_title() {
    let args: Vec<String> =
      ["Opening", "--", "venue:Annex"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let (title, mods) =
      parse_desc_and_mods(&args, now()).unwrap();
    assert_eq!(title, "Opening venue:Annex");
    assert!(mods.is_empty());
  }

  #[test]
  fn empty_opens_value_clears_the_date() {
    let args: Vec<String> = ["opens:"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    let mods = parse_mods(&args, now()).unwrap();
    let mut h = Happening::new_scheduled(
      "Group Show".to_string(),
      "exhibition".to_string(),
      now(),
      1
    );
    h.opens_at = Some(now());
    apply_mods(&mut h, &mods);
    assert_eq!(h.opens_at, None);
  }

  #[test]
  fn artist_mod_appends_without_duplicates() {
    let args: Vec<String> =
      ["artist:Agnes Martin", "artist:Agnes Martin"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mods = parse_mods(&args, now()).unwrap();
    let mut h = Happening::new_scheduled(
      "Lines".to_string(),
      "exhibition".to_string(),
      now(),
      1
    );
    apply_mods(&mut h, &mods);
    assert_eq!(h.artists, vec!["Agnes Martin"]);
  }

  #[test]
  fn bad_active_value_is_rejected() {
    let args: Vec<String> = ["active:maybe"]
      .iter()
      .map(|s| s.to_string())
      .collect();
    assert!(parse_mods(&args, now()).is_err());
  }
}
