use chrono::{
  DateTime,
  Utc
};
use tracing::trace;

use crate::datetime::parse_date_expr;
use crate::happening::{
  Happening,
  Status
};
use crate::schedule::{
  self,
  Phase
};

#[derive(Debug, Clone)]
pub enum Pred {
  Id(u64),
  Uuid(uuid::Uuid),
  TagInclude(String),
  TagExclude(String),
  VirtualTagInclude(VirtualTag),
  VirtualTagExclude(VirtualTag),
  TypeEq(String),
  VenueEq(String),
  ArtistHas(String),
  StatusEq(Status),
  OpensBefore(DateTime<Utc>),
  OpensAfter(DateTime<Utc>),
  ClosesBefore(DateTime<Utc>),
  ClosesAfter(DateTime<Utc>),
  TextContains(String)
}

#[derive(Debug, Clone, Copy)]
pub enum VirtualTag {
  Current,
  Upcoming,
  Past,
  OpenEnded,
  Undated,
  Overridden,
  Cancelled,
  Archived
}

#[derive(Debug, Clone)]
enum Expr {
  True,
  Pred(Pred),
  And(Vec<Expr>),
  Or(Vec<Expr>)
}

#[derive(Debug, Clone)]
pub struct Filter {
  expr: Expr
}

impl Default for Filter {
  fn default() -> Self {
    Self {
      expr: Expr::True
    }
  }
}

impl Filter {
  #[tracing::instrument(skip(
    terms, now
  ))]
  pub fn parse(
    terms: &[String],
    now: DateTime<Utc>
  ) -> anyhow::Result<Self> {
    if terms.is_empty() {
      return Ok(Self::default());
    }

    let tokens = lex_terms(terms);
    let mut parser =
      Parser::new(tokens, now);
    let expr = parser.parse_expr()?;
    parser.ensure_end()?;

    Ok(Self {
      expr
    })
  }

  /// Default matching hides cancelled
  /// happenings unless the expression
  /// names a status or selects a
  /// record directly.
  #[tracing::instrument(skip(
    self, happening, now
  ))]
  pub fn matches(
    &self,
    happening: &Happening,
    now: DateTime<Utc>
  ) -> bool {
    let ok = eval_expr(
      &self.expr,
      happening,
      now
    );
    if !ok {
      return false;
    }

    if happening.status
      == Status::Cancelled
      && !expr_has_explicit_status_filter(&self.expr)
      && !expr_has_identity_selector(&self.expr)
    {
      return false;
    }

    true
  }

  #[tracing::instrument(skip(
    self, happening, now
  ))]
  pub fn matches_without_cancelled_guard(
    &self,
    happening: &Happening,
    now: DateTime<Utc>
  ) -> bool {
    eval_expr(
      &self.expr,
      happening,
      now
    )
  }

  pub fn has_explicit_status_filter(
    &self
  ) -> bool {
    expr_has_explicit_status_filter(
      &self.expr
    )
  }

  pub fn has_identity_selector(
    &self
  ) -> bool {
    expr_has_identity_selector(
      &self.expr
    )
  }
}

struct Parser {
  tokens: Vec<String>,
  pos:    usize,
  now:    DateTime<Utc>
}

impl Parser {
  fn new(
    tokens: Vec<String>,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      tokens,
      pos: 0,
      now
    }
  }

  fn parse_expr(
    &mut self
  ) -> anyhow::Result<Expr> {
    self.parse_or()
  }

  fn parse_or(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_and()?];

    while self.match_any(&["or", "||"])
    {
      nodes.push(self.parse_and()?);
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::Or(nodes))
    }
  }

  fn parse_and(
    &mut self
  ) -> anyhow::Result<Expr> {
    let mut nodes =
      vec![self.parse_primary()?];

    loop {
      if self.match_any(&["and", "&&"])
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      if self
        .peek_is_implicit_and_boundary()
      {
        nodes
          .push(self.parse_primary()?);
        continue;
      }

      break;
    }

    if nodes.len() == 1 {
      Ok(nodes.remove(0))
    } else {
      Ok(Expr::And(nodes))
    }
  }

  fn parse_primary(
    &mut self
  ) -> anyhow::Result<Expr> {
    if self.match_token("(") {
      let inner = self.parse_expr()?;
      self.expect_token(")")?;
      return Ok(inner);
    }

    let token = self
      .next_token()
      .ok_or_else(|| {
        anyhow::anyhow!(
          "unexpected end of filter \
           expression"
        )
      })?;

    if token == ")" {
      return Err(anyhow::anyhow!(
        "unexpected ')' in filter \
         expression"
      ));
    }

    let pred =
      parse_atom(&token, self.now)?;
    Ok(Expr::Pred(pred))
  }

  fn ensure_end(
    &self
  ) -> anyhow::Result<()> {
    if self.pos < self.tokens.len() {
      Err(anyhow::anyhow!(
        "unexpected token in filter \
         expression: {}",
        self.tokens[self.pos]
      ))
    } else {
      Ok(())
    }
  }

  fn match_token(
    &mut self,
    expected: &str
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };
    if tok
      .eq_ignore_ascii_case(expected)
    {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn match_any(
    &mut self,
    options: &[&str]
  ) -> bool {
    options
      .iter()
      .any(|opt| self.match_token(opt))
  }

  fn expect_token(
    &mut self,
    expected: &str
  ) -> anyhow::Result<()> {
    if self.match_token(expected) {
      Ok(())
    } else {
      Err(anyhow::anyhow!(
        "expected '{expected}' in \
         filter expression"
      ))
    }
  }

  fn next_token(
    &mut self
  ) -> Option<String> {
    let out = self
      .tokens
      .get(self.pos)
      .cloned();
    if out.is_some() {
      self.pos += 1;
    }
    out
  }

  fn peek_is_implicit_and_boundary(
    &self
  ) -> bool {
    let Some(tok) =
      self.tokens.get(self.pos)
    else {
      return false;
    };

    if tok.eq_ignore_ascii_case("and")
      || tok.eq_ignore_ascii_case("&&")
    {
      return false;
    }

    !tok.eq_ignore_ascii_case("or")
      && !tok.eq_ignore_ascii_case("||")
      && !tok.eq_ignore_ascii_case(")")
  }
}

fn lex_terms(
  terms: &[String]
) -> Vec<String> {
  let mut out = Vec::new();

  for term in terms {
    let mut current = String::new();
    for ch in term.chars() {
      if ch == '(' || ch == ')' {
        if !current.is_empty() {
          out.push(current.clone());
          current.clear();
        }
        out.push(ch.to_string());
      } else {
        current.push(ch);
      }
    }

    if !current.is_empty() {
      out.push(current);
    }
  }

  out
}

fn parse_atom(
  term: &str,
  now: DateTime<Utc>
) -> anyhow::Result<Pred> {
  if let Some(tag) =
    term.strip_prefix('+')
  {
    if let Some(virtual_tag) =
      parse_virtual_tag(tag)
    {
      return Ok(
        Pred::VirtualTagInclude(
          virtual_tag
        )
      );
    }
    return Ok(Pred::TagInclude(
      tag.to_string()
    ));
  }
  if let Some(tag) =
    term.strip_prefix('-')
  {
    if let Some(virtual_tag) =
      parse_virtual_tag(tag)
    {
      return Ok(
        Pred::VirtualTagExclude(
          virtual_tag
        )
      );
    }
    return Ok(Pred::TagExclude(
      tag.to_string()
    ));
  }
  if let Ok(id) = term.parse::<u64>() {
    return Ok(Pred::Id(id));
  }
  if let Ok(uuid) =
    uuid::Uuid::parse_str(term)
  {
    return Ok(Pred::Uuid(uuid));
  }

  if let Some(slug) =
    term.strip_prefix("type:")
  {
    return Ok(Pred::TypeEq(
      slug.to_string()
    ));
  }

  if let Some(venue) =
    term.strip_prefix("venue:")
  {
    return Ok(Pred::VenueEq(
      venue.to_string()
    ));
  }

  if let Some(artist) =
    term.strip_prefix("artist:")
  {
    return Ok(Pred::ArtistHas(
      artist.to_string()
    ));
  }

  if let Some(status_text) =
    term.strip_prefix("status:")
  {
    return Ok(
      match status_text
        .to_ascii_lowercase()
        .as_str()
      {
        | "scheduled" => {
          Pred::StatusEq(
            Status::Scheduled
          )
        }
        | "archived" => {
          Pred::StatusEq(
            Status::Archived
          )
        }
        | "cancelled" => {
          Pred::StatusEq(
            Status::Cancelled
          )
        }
        | _ => {
          Pred::TextContains(
            term.to_string()
          )
        }
      }
    );
  }

  if let Some(value) =
    term.strip_prefix("opens.before:")
  {
    return Ok(Pred::OpensBefore(
      parse_date_expr(value, now)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("opens.after:")
  {
    return Ok(Pred::OpensAfter(
      parse_date_expr(value, now)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("closes.before:")
  {
    return Ok(Pred::ClosesBefore(
      parse_date_expr(value, now)?
    ));
  }

  if let Some(value) =
    term.strip_prefix("closes.after:")
  {
    return Ok(Pred::ClosesAfter(
      parse_date_expr(value, now)?
    ));
  }

  Ok(Pred::TextContains(
    term.to_string()
  ))
}

fn eval_expr(
  expr: &Expr,
  happening: &Happening,
  now: DateTime<Utc>
) -> bool {
  match expr {
    | Expr::True => true,
    | Expr::Pred(pred) => {
      eval_pred(pred, happening, now)
    }
    | Expr::And(nodes) => {
      nodes.iter().all(|node| {
        eval_expr(node, happening, now)
      })
    }
    | Expr::Or(nodes) => {
      nodes.iter().any(|node| {
        eval_expr(node, happening, now)
      })
    }
  }
}

fn eval_pred(
  pred: &Pred,
  happening: &Happening,
  now: DateTime<Utc>
) -> bool {
  let ok = match pred {
    | Pred::Id(id) => {
      happening.id == Some(*id)
    }
    | Pred::Uuid(uuid) => {
      happening.uuid == *uuid
    }
    | Pred::TagInclude(tag) => {
      happening
        .tags
        .iter()
        .any(|t| t == tag)
    }
    | Pred::TagExclude(tag) => {
      happening
        .tags
        .iter()
        .all(|t| t != tag)
    }
    | Pred::VirtualTagInclude(
      virtual_tag
    ) => {
      eval_virtual_tag(
        *virtual_tag,
        happening,
        now
      )
    }
    | Pred::VirtualTagExclude(
      virtual_tag
    ) => {
      !eval_virtual_tag(
        *virtual_tag,
        happening,
        now
      )
    }
    | Pred::TypeEq(slug) => {
      happening.type_slug
        == slug.as_str()
    }
    | Pred::VenueEq(venue) => {
      happening.venue.as_deref()
        == Some(venue.as_str())
    }
    | Pred::ArtistHas(needle) => {
      let needle =
        needle.to_ascii_lowercase();
      happening.artists.iter().any(
        |artist| {
          artist
            .to_ascii_lowercase()
            .contains(&needle)
        }
      )
    }
    | Pred::StatusEq(status) => {
      &happening.status == status
    }
    | Pred::OpensBefore(dt) => {
      happening
        .opens_at
        .map(|opens| opens < *dt)
        .unwrap_or(false)
    }
    | Pred::OpensAfter(dt) => {
      happening
        .opens_at
        .map(|opens| opens > *dt)
        .unwrap_or(false)
    }
    | Pred::ClosesBefore(dt) => {
      happening
        .closes_at
        .map(|closes| closes < *dt)
        .unwrap_or(false)
    }
    | Pred::ClosesAfter(dt) => {
      happening
        .closes_at
        .map(|closes| closes > *dt)
        .unwrap_or(false)
    }
    | Pred::TextContains(text) => {
      text_haystack(happening)
        .contains(
          &text.to_ascii_lowercase()
        )
    }
  };

  trace!(pred = ?pred, id = ?happening.id, uuid = %happening.uuid, ok, "filter predicate evaluation");
  ok
}

/// The directory search box looks at
/// title, artists, venue and tags.
fn text_haystack(
  happening: &Happening
) -> String {
  let mut haystack =
    happening.title.clone();
  for artist in &happening.artists {
    haystack.push(' ');
    haystack.push_str(artist);
  }
  if let Some(venue) =
    happening.venue.as_deref()
  {
    haystack.push(' ');
    haystack.push_str(venue);
  }
  for tag in &happening.tags {
    haystack.push(' ');
    haystack.push_str(tag);
  }
  haystack.to_ascii_lowercase()
}

fn eval_virtual_tag(
  virtual_tag: VirtualTag,
  happening: &Happening,
  now: DateTime<Utc>
) -> bool {
  match virtual_tag {
    | VirtualTag::Current => {
      happening.phase(now)
        == Phase::Current
    }
    | VirtualTag::Upcoming => {
      happening.phase(now)
        == Phase::Upcoming
    }
    | VirtualTag::Past => {
      happening.phase(now)
        == Phase::Past
    }
    | VirtualTag::OpenEnded => {
      happening.open_ended()
    }
    | VirtualTag::Undated => {
      happening.opens_at.is_none()
    }
    | VirtualTag::Overridden => {
      happening
        .active_override
        .is_some()
    }
    | VirtualTag::Cancelled => {
      happening.status
        == Status::Cancelled
    }
    | VirtualTag::Archived => {
      happening.status
        == Status::Archived
    }
  }
}

fn parse_virtual_tag(
  tag: &str
) -> Option<VirtualTag> {
  match tag {
    | "CURRENT" => {
      Some(VirtualTag::Current)
    }
    | "UPCOMING" => {
      Some(VirtualTag::Upcoming)
    }
    | "PAST" => {
      Some(VirtualTag::Past)
    }
    | "OPENENDED" => {
      Some(VirtualTag::OpenEnded)
    }
    | "UNDATED" => {
      Some(VirtualTag::Undated)
    }
    | "OVERRIDDEN" => {
      Some(VirtualTag::Overridden)
    }
    | "CANCELLED" => {
      Some(VirtualTag::Cancelled)
    }
    | "ARCHIVED" => {
      Some(VirtualTag::Archived)
    }
    | _ => None
  }
}

fn expr_has_explicit_status_filter(
  expr: &Expr
) -> bool {
  match expr {
    | Expr::True => false,
    | Expr::Pred(pred) => {
      matches!(
        pred,
        Pred::StatusEq(_)
          | Pred::VirtualTagInclude(_)
          | Pred::VirtualTagExclude(_)
      )
    }
    | Expr::And(nodes)
    | Expr::Or(nodes) => {
      nodes.iter().any(
        expr_has_explicit_status_filter
      )
    }
  }
}

fn expr_has_identity_selector(
  expr: &Expr
) -> bool {
  match expr {
    | Expr::True => false,
    | Expr::Pred(pred) => {
      matches!(
        pred,
        Pred::Id(_) | Pred::Uuid(_)
      )
    }
    | Expr::And(nodes)
    | Expr::Or(nodes) => {
      nodes
        .iter()
        .any(expr_has_identity_selector)
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };

  use super::Filter;
  use crate::happening::{
    Happening,
    Status
  };

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
  fn boolean_precedence_and_parentheses()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();
    let mut x = show("x", 1, now);
    x.tags = vec!["x".to_string()];

    let mut y = show("y", 2, now);
    y.tags = vec!["y".to_string()];

    let mut xy = show("xy", 3, now);
    xy.tags = vec![
      "x".to_string(),
      "y".to_string(),
    ];

    let filter = Filter::parse(
      &[
        "(".to_string(),
        "+x".to_string(),
        "or".to_string(),
        "+y".to_string(),
        ")".to_string(),
        "and".to_string(),
        "+y".to_string()
      ],
      now
    )
    .unwrap();

    assert!(!filter.matches(&x, now));
    assert!(filter.matches(&y, now));
    assert!(filter.matches(&xy, now));
  }

  #[test]
  fn phase_virtual_tags_follow_the_window()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();
    let mut current =
      show("current", 1, now);
    current.opens_at =
      Some(now - Duration::days(10));
    current.closes_at =
      Some(now + Duration::days(10));

    let mut upcoming =
      show("upcoming", 2, now);
    upcoming.opens_at =
      Some(now + Duration::days(30));

    let mut past = show("past", 3, now);
    past.opens_at =
      Some(now - Duration::days(90));
    past.closes_at =
      Some(now - Duration::days(30));

    let current_filter = Filter::parse(
      &["+CURRENT".to_string()],
      now
    )
    .unwrap();
    let upcoming_filter = Filter::parse(
      &["+UPCOMING".to_string()],
      now
    )
    .unwrap();
    let past_filter = Filter::parse(
      &["+PAST".to_string()],
      now
    )
    .unwrap();

    assert!(
      current_filter
        .matches(&current, now)
    );
    assert!(
      !current_filter
        .matches(&upcoming, now)
    );

    assert!(
      upcoming_filter
        .matches(&upcoming, now)
    );
    assert!(
      !upcoming_filter
        .matches(&past, now)
    );

    assert!(
      past_filter.matches(&past, now)
    );
    assert!(
      !past_filter
        .matches(&current, now)
    );
  }

  #[test]
  fn artist_search_is_substring_insensitive()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();
    let mut solo = show("solo", 1, now);
    solo.artists = vec![
      "Agnes Martin".to_string(),
    ];

    let filter = Filter::parse(
      &["artist:martin".to_string()],
      now
    )
    .unwrap();
    assert!(
      filter.matches(&solo, now)
    );

    let miss = Filter::parse(
      &["artist:richter".to_string()],
      now
    )
    .unwrap();
    assert!(
      !miss.matches(&solo, now)
    );
  }

  #[test]
  fn id_selector_matches_cancelled_happening()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();
    let mut cancelled =
      show("cancelled", 2, now);
    cancelled.status =
      Status::Cancelled;

    let filter = Filter::parse(
      &["2".to_string()],
      now
    )
    .unwrap();
    assert!(
      filter.has_identity_selector()
    );
    assert!(
      filter.matches(&cancelled, now)
    );
  }

  #[test]
  fn raw_matching_can_include_cancelled()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 16, 5, 0, 0
      )
      .unwrap();
    let mut cancelled =
      show("cancelled", 1, now);
    cancelled.status =
      Status::Cancelled;

    let filter = Filter::default();
    assert!(
      !filter.matches(&cancelled, now)
    );
    assert!(
      filter
        .matches_without_cancelled_guard(
          &cancelled, now
        )
    );
  }
}
