use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::happening::{DateDisplayMode, Happening, HappeningType, Status};
use crate::newsletter::Subscriber;

#[derive(Debug)]
pub struct Catalog {
    pub data_dir: PathBuf,
    pub happenings_path: PathBuf,
    pub archive_path: PathBuf,
    pub types_path: PathBuf,
    pub subscribers_path: PathBuf,
    pub undo_path: PathBuf,
    pub context_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UndoEntry {
    happenings: Vec<Happening>,
    archive: Vec<Happening>,
}

impl Catalog {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let happenings_path = data_dir.join("happenings.data");
        let archive_path = data_dir.join("archive.data");
        let types_path = data_dir.join("types.data");
        let subscribers_path = data_dir.join("subscribers.data");
        let undo_path = data_dir.join("undo.data");
        let context_path = data_dir.join("context.data");

        for path in [
            &happenings_path,
            &archive_path,
            &types_path,
            &subscribers_path,
            &undo_path,
            &context_path,
        ] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        let catalog = Self {
            data_dir,
            happenings_path,
            archive_path,
            types_path,
            subscribers_path,
            undo_path,
            context_path,
        };
        catalog.seed_default_types()?;

        info!(
            data_dir = %catalog.data_dir.display(),
            happenings = %catalog.happenings_path.display(),
            archive = %catalog.archive_path.display(),
            "opened catalog"
        );

        Ok(catalog)
    }

    /// A fresh catalog knows about exhibition runs and dated events.
    fn seed_default_types(&self) -> anyhow::Result<()> {
        let existing = self.load_types()?;
        if !existing.is_empty() {
            return Ok(());
        }

        let defaults = vec![
            HappeningType {
                name: "Exhibition".to_string(),
                slug: "exhibition".to_string(),
                date_display: DateDisplayMode::DateRange,
            },
            HappeningType {
                name: "Event".to_string(),
                slug: "event".to_string(),
                date_display: DateDisplayMode::DateTime,
            },
        ];
        self.save_types(&defaults)?;
        info!("seeded default happening types");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_happenings(&self) -> anyhow::Result<Vec<Happening>> {
        load_jsonl(&self.happenings_path).context("failed to load happenings.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_archive(&self) -> anyhow::Result<Vec<Happening>> {
        load_jsonl(&self.archive_path).context("failed to load archive.data")
    }

    #[tracing::instrument(skip(self, happenings))]
    pub fn save_happenings(&self, happenings: &[Happening]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.happenings_path, happenings)
            .context("failed to save happenings.data")
    }

    #[tracing::instrument(skip(self, happenings))]
    pub fn save_archive(&self, happenings: &[Happening]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.archive_path, happenings).context("failed to save archive.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_types(&self) -> anyhow::Result<Vec<HappeningType>> {
        load_jsonl(&self.types_path).context("failed to load types.data")
    }

    #[tracing::instrument(skip(self, types))]
    pub fn save_types(&self, types: &[HappeningType]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.types_path, types).context("failed to save types.data")
    }

    /// Slug-keyed view for the date formatter and type lookups.
    pub fn types_by_slug(&self) -> anyhow::Result<BTreeMap<String, HappeningType>> {
        Ok(self
            .load_types()?
            .into_iter()
            .map(|t| (t.slug.clone(), t))
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_subscribers(&self) -> anyhow::Result<Vec<Subscriber>> {
        load_jsonl(&self.subscribers_path).context("failed to load subscribers.data")
    }

    #[tracing::instrument(skip(self, subscribers))]
    pub fn save_subscribers(&self, subscribers: &[Subscriber]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.subscribers_path, subscribers)
            .context("failed to save subscribers.data")
    }

    pub fn next_id(&self, happenings: &[Happening]) -> u64 {
        happenings.iter().filter_map(|h| h.id).max().unwrap_or(0) + 1
    }

    #[tracing::instrument(skip(self, happenings, happening), fields(id = ?happening.id, uuid = %happening.uuid))]
    pub fn add_happening(
        &self,
        mut happenings: Vec<Happening>,
        happening: Happening,
    ) -> anyhow::Result<Vec<Happening>> {
        happenings.push(happening);
        happenings.sort_by_key(|h| h.id.unwrap_or(u64::MAX));
        self.save_happenings(&happenings)?;
        Ok(happenings)
    }

    #[tracing::instrument(skip(self), fields(uuid = %uuid))]
    pub fn move_to_archive(&self, uuid: Uuid) -> anyhow::Result<()> {
        let mut happenings = self.load_happenings()?;
        let mut archive = self.load_archive()?;

        let idx = happenings
            .iter()
            .position(|h| h.uuid == uuid)
            .ok_or_else(|| anyhow!("happening not found in working set: {uuid}"))?;

        let mut happening = happenings.remove(idx);
        happening.status = Status::Archived;
        happening.id = None;
        archive.push(happening);

        happenings.sort_by_key(|h| h.id.unwrap_or(u64::MAX));
        archive.sort_by_key(|h| (h.closes_at.or(h.opens_at), h.uuid));

        self.save_happenings(&happenings)?;
        self.save_archive(&archive)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, happenings, archive))]
    pub fn push_undo_snapshot(
        &self,
        happenings: &[Happening],
        archive: &[Happening],
    ) -> anyhow::Result<()> {
        let mut entries: Vec<UndoEntry> = load_jsonl(&self.undo_path)
            .context("failed to load undo.data")?;
        entries.push(UndoEntry {
            happenings: happenings.to_vec(),
            archive: archive.to_vec(),
        });
        save_jsonl_atomic(&self.undo_path, &entries).context("failed to save undo.data")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn pop_undo_snapshot(&self) -> anyhow::Result<Option<(Vec<Happening>, Vec<Happening>)>> {
        let mut entries: Vec<UndoEntry> = load_jsonl(&self.undo_path)
            .context("failed to load undo.data")?;
        let Some(entry) = entries.pop() else {
            return Ok(None);
        };
        save_jsonl_atomic(&self.undo_path, &entries).context("failed to save undo.data")?;
        Ok(Some((entry.happenings, entry.archive)))
    }

    #[tracing::instrument(skip(self))]
    pub fn get_active_context(&self) -> anyhow::Result<Option<String>> {
        let raw = fs::read_to_string(&self.context_path)
            .with_context(|| format!("failed reading {}", self.context_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_active_context(&self, name: Option<&str>) -> anyhow::Result<()> {
        let payload = name.unwrap_or_default();
        fs::write(&self.context_path, payload)
            .with_context(|| format!("failed writing {}", self.context_path.display()))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn purge_cancelled(&self) -> anyhow::Result<u64> {
        let happenings = self.load_happenings()?;
        let before_count = happenings.len();
        let kept: Vec<Happening> = happenings
            .into_iter()
            .filter(|h| h.status != Status::Cancelled)
            .collect();
        let purged = (before_count - kept.len()) as u64;
        info!(
            before = before_count,
            after = kept.len(),
            "purged cancelled happenings"
        );
        self.save_happenings(&kept)?;
        Ok(purged)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
