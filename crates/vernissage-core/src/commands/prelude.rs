use anyhow::anyhow;
use chrono::Utc;
use tracing::{
  debug,
  instrument
};

use super::happening_ops::{
  cmd_add,
  cmd_annotate,
  cmd_archive,
  cmd_cancel,
  cmd_denotate,
  cmd_duplicate,
  cmd_history,
  cmd_info,
  cmd_list,
  cmd_log,
  cmd_modify,
  cmd_purge,
  cmd_timeline
};
use super::io_and_views::{
  cmd_artists,
  cmd_commands,
  cmd_context,
  cmd_export,
  cmd_help,
  cmd_import,
  cmd_show,
  cmd_signup,
  cmd_subscribers,
  cmd_tags,
  cmd_types,
  cmd_undo,
  cmd_unique,
  cmd_unsubscribe,
  cmd_venues,
  resolve_effective_filter_terms
};
use super::report::{
  cmd_report,
  is_report_command
};
use crate::catalog::Catalog;
use crate::cli::Invocation;
use crate::config::Config;
use crate::hooks::HookRunner;
use crate::render::Renderer;

pub fn known_command_names()
-> Vec<&'static str> {
  vec![
    "add",
    "modify",
    "list",
    "timeline",
    "current",
    "upcoming",
    "past",
    "history",
    "info",
    "annotate",
    "denotate",
    "duplicate",
    "log",
    "archive",
    "cancel",
    "purge",
    "undo",
    "export",
    "import",
    "types",
    "artists",
    "venues",
    "tags",
    "signup",
    "unsubscribe",
    "subscribers",
    "context",
    "contexts",
    "_commands",
    "_show",
    "_unique",
    "help",
    "version",
  ]
}

pub fn expand_command_abbrev<'a>(
  token: &'a str,
  known: &[&'a str]
) -> Option<&'a str> {
  if known.contains(&token) {
    return Some(token);
  }

  let mut matches =
    known.iter().copied().filter(
      |name| name.starts_with(token)
    );
  let first = matches.next()?;
  if matches.next().is_some() {
    None
  } else {
    Some(first)
  }
}

#[instrument(skip(
  catalog, cfg, renderer, inv
))]
pub fn dispatch(
  catalog: &mut Catalog,
  cfg: &Config,
  renderer: &mut Renderer,
  inv: Invocation
) -> anyhow::Result<()> {
  let now = Utc::now();
  let hooks = HookRunner::new(
    cfg,
    &catalog.data_dir
  );
  hooks.run_on_launch()?;
  let command = inv.command.as_str();
  let effective_filters =
    resolve_effective_filter_terms(
      catalog,
      cfg,
      command,
      &inv.filter_terms
    )?;

  debug!(
      command,
      filter = ?inv.filter_terms,
      args = ?inv.command_args,
      "dispatching command"
  );

  match command {
    | "add" => {
      cmd_add(
        catalog,
        &hooks,
        cfg,
        renderer,
        &inv.command_args,
        now
      )
    }
    | "modify" => {
      cmd_modify(
        catalog,
        &hooks,
        &effective_filters,
        &inv.command_args,
        now
      )
    }
    | "list" => {
      cmd_list(
        catalog,
        cfg,
        renderer,
        command,
        &effective_filters,
        now
      )
    }
    | "timeline" => {
      cmd_timeline(
        catalog,
        cfg,
        renderer,
        &effective_filters,
        now
      )
    }
    | "current" | "upcoming"
    | "past" => {
      let mut terms =
        effective_filters.clone();
      terms.push(
        match command {
          | "current" => "+CURRENT",
          | "upcoming" => "+UPCOMING",
          | _ => "+PAST"
        }
        .to_string()
      );
      cmd_list(
        catalog,
        cfg,
        renderer,
        command,
        &terms,
        now
      )
    }
    | "history" => {
      cmd_history(
        catalog,
        &effective_filters,
        now
      )
    }
    | "info" => {
      cmd_info(
        catalog,
        renderer,
        &effective_filters,
        now
      )
    }
    | "annotate" => {
      cmd_annotate(
        catalog,
        &hooks,
        &effective_filters,
        &inv.command_args,
        now
      )
    }
    | "denotate" => {
      cmd_denotate(
        catalog,
        &hooks,
        &effective_filters,
        &inv.command_args,
        now
      )
    }
    | "duplicate" => {
      cmd_duplicate(
        catalog,
        &hooks,
        &effective_filters,
        now
      )
    }
    | "log" => {
      cmd_log(
        catalog,
        &hooks,
        cfg,
        &inv.command_args,
        now
      )
    }
    | "archive" => {
      cmd_archive(
        catalog,
        &hooks,
        &effective_filters,
        now
      )
    }
    | "cancel" => {
      cmd_cancel(
        catalog,
        &hooks,
        &effective_filters,
        now
      )
    }
    | "purge" => cmd_purge(catalog),
    | "undo" => cmd_undo(catalog),
    | "export" => {
      cmd_export(
        catalog,
        &effective_filters,
        now
      )
    }
    | "import" => {
      cmd_import(catalog, &hooks)
    }
    | "types" => {
      cmd_types(
        catalog,
        renderer,
        &inv.command_args
      )
    }
    | "artists" => cmd_artists(catalog),
    | "venues" => cmd_venues(catalog),
    | "tags" => cmd_tags(catalog),
    | "signup" => {
      cmd_signup(
        catalog,
        &inv.command_args,
        now
      )
    }
    | "unsubscribe" => {
      cmd_unsubscribe(
        catalog,
        &inv.command_args
      )
    }
    | "subscribers" => {
      cmd_subscribers(catalog)
    }
    | "context" | "contexts" => {
      cmd_context(
        catalog,
        cfg,
        &inv.command_args
      )
    }
    | "_commands" => cmd_commands(),
    | "_show" => cmd_show(cfg),
    | "_unique" => {
      cmd_unique(
        catalog,
        &inv.command_args
      )
    }
    | "help" => cmd_help(),
    | "version" => {
      println!(
        "{}",
        env!("CARGO_PKG_VERSION")
      );
      Ok(())
    }
    | other => {
      if is_report_command(cfg, other) {
        cmd_report(
          catalog,
          cfg,
          renderer,
          other,
          &effective_filters,
          now
        )
      } else {
        Err(anyhow!(
          "unknown command: {other}"
        ))
      }
    }
  }
}
