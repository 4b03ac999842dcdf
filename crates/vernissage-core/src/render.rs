use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_gallery_date;
use crate::display::format_window;
use crate::happening::{DateDisplayMode, Happening, HappeningType, Status};
use crate::listing::Timeline;
use crate::schedule::{self, Phase};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, happenings, types, now))]
    pub fn print_happening_table(
        &mut self,
        happenings: &[Happening],
        types: &BTreeMap<String, HappeningType>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Dates".to_string(),
            "Phase".to_string(),
            "Type".to_string(),
            "Venue".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(happenings.len());

        for happening in happenings {
            let id = happening
                .id
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());
            let id = self.paint(&id, "33");

            let dates = self.dates_cell(happening, types, now);
            let phase = self.phase_cell(happening, now);
            let venue = happening.venue.clone().unwrap_or_default();

            rows.push(vec![
                id,
                dates,
                phase,
                happening.type_slug.clone(),
                venue,
                happening.title.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, timeline, types, now))]
    pub fn print_timeline(
        &mut self,
        timeline: &Timeline,
        types: &BTreeMap<String, HappeningType>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if timeline.current.is_empty()
            && timeline.upcoming.is_empty()
            && timeline.past.is_empty()
        {
            writeln!(out, "Nothing on the calendar.")?;
            return Ok(());
        }

        let mut first_section = true;

        if !timeline.current.is_empty() {
            first_section = false;
            writeln!(out, "ON VIEW")?;
            let rows = timeline
                .current
                .iter()
                .map(|happening| {
                    vec![
                        self.paint(&id_cell(happening), "33"),
                        happening.title.clone(),
                        self.dates_cell(happening, types, now),
                        happening.venue.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            write_rows(&mut out, rows, 2)?;
        }

        if !timeline.upcoming.is_empty() {
            if !first_section {
                writeln!(out)?;
            }
            first_section = false;
            writeln!(out, "UPCOMING")?;
            let rows = timeline
                .upcoming
                .iter()
                .map(|happening| {
                    let countdown = schedule::days_until_opening(now, happening.opens_at)
                        .map(|days| format!("opens in {days} day(s)"))
                        .unwrap_or_default();
                    vec![
                        self.paint(&id_cell(happening), "33"),
                        happening.title.clone(),
                        self.dates_cell(happening, types, now),
                        countdown,
                    ]
                })
                .collect();
            write_rows(&mut out, rows, 2)?;
        }

        if !timeline.past.is_empty() {
            if !first_section {
                writeln!(out)?;
            }
            writeln!(out, "RECENTLY CLOSED")?;
            let rows = timeline
                .past
                .iter()
                .map(|happening| {
                    vec![
                        self.paint(&id_cell(happening), "33"),
                        happening.title.clone(),
                        self.dates_cell(happening, types, now),
                        happening.venue.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            write_rows(&mut out, rows, 2)?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, happening, types, now))]
    pub fn print_happening_info(
        &mut self,
        happening: &Happening,
        types: &BTreeMap<String, HappeningType>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", id_cell(happening))?;
        writeln!(out, "uuid      {}", happening.uuid)?;
        writeln!(out, "status    {:?}", happening.status)?;
        writeln!(out, "title     {}", happening.title)?;
        writeln!(out, "type      {}", happening.type_slug)?;

        let mode = display_mode_for(types, &happening.type_slug);
        let dates = format_window(happening.opens_at, happening.closes_at, mode);
        writeln!(out, "dates     {dates}")?;
        writeln!(out, "phase     {}", happening.phase(now).label())?;
        if let Some(days) = schedule::days_until_opening(now, happening.opens_at) {
            writeln!(out, "opens in  {days} day(s)")?;
        }

        let active = match (happening.active(now), happening.active_override) {
            (true, Some(_)) => "yes (forced)",
            (false, Some(_)) => "no (forced)",
            (true, None) => "yes",
            (false, None) => "no",
        };
        writeln!(out, "active    {active}")?;

        writeln!(
            out,
            "venue     {}",
            happening.venue.clone().unwrap_or_default()
        )?;
        writeln!(out, "artists   {}", happening.artists.join(", "))?;
        writeln!(out, "tags      {}", happening.tags.join(", "))?;
        writeln!(
            out,
            "summary   {}",
            happening.summary.clone().unwrap_or_default()
        )?;
        writeln!(
            out,
            "entry     {}",
            happening.entry.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        writeln!(
            out,
            "modified  {}",
            happening
                .modified
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;

        for annotation in &happening.annotations {
            writeln!(
                out,
                "note      {} {}",
                format_gallery_date(annotation.entry),
                annotation.description
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, labels, rows))]
    pub fn print_report_table(
        &mut self,
        labels: &[String],
        rows: &[Vec<String>],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_table(&mut out, labels.to_vec(), rows.to_vec())?;
        Ok(())
    }

    fn dates_cell(
        &self,
        happening: &Happening,
        types: &BTreeMap<String, HappeningType>,
        now: DateTime<Utc>,
    ) -> String {
        let mode = display_mode_for(types, &happening.type_slug);
        let text = format_window(happening.opens_at, happening.closes_at, mode);

        // A run in its final week gets the red treatment.
        if happening.phase(now) == Phase::Current
            && let Some(closes) = happening.closes_at
            && closes >= now
            && closes - now <= Duration::days(7)
        {
            return self.paint(&text, "31");
        }

        text
    }

    fn phase_cell(&self, happening: &Happening, now: DateTime<Utc>) -> String {
        if happening.status == Status::Cancelled {
            return self.paint("cancelled", "31");
        }

        let phase = happening.phase(now);
        match phase {
            Phase::Current => self.paint(phase.label(), "32"),
            Phase::Upcoming => self.paint(phase.label(), "33"),
            Phase::Past => phase.label().to_string(),
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn id_cell(happening: &Happening) -> String {
    happening
        .id
        .map(|value| value.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn display_mode_for(types: &BTreeMap<String, HappeningType>, slug: &str) -> DateDisplayMode {
    types
        .get(slug)
        .map(|t| t.date_display)
        .unwrap_or(DateDisplayMode::DateRange)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Headerless variant for the timeline sections.
fn write_rows<W: Write>(
    mut writer: W,
    rows: Vec<Vec<String>>,
    indent: usize,
) -> anyhow::Result<()> {
    let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; column_count];

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for row in rows {
        write!(writer, "{}", " ".repeat(indent))?;
        for (idx, cell) in row.iter().enumerate() {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
