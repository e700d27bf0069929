//! Saved report persistence
//!
//! Reports are append-only records looked up by project, or by project and
//! id. [`JsonFileStore`] keeps them all in one JSON document laid out as
//! `{"reports": {"1": {..}, "2": {..}}}`; [`MemoryStore`] is the same thing
//! without the file.

use crate::error::StoreError;
use crate::message::ChatMessage;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Project name used when none is given
pub const DEFAULT_PROJECT: &str = "default";

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

/// Report as submitted for saving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    /// Project the report belongs to
    #[serde(default = "default_project")]
    pub project: String,
    /// Resolved Markdown
    pub markdown: String,
    /// Screenshot paths in registry order
    #[serde(default)]
    pub images: Vec<String>,
    /// Screenshot display names, parallel to `images`
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Conversation that produced the report
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

impl NewReport {
    /// Create a report without screenshots or history
    #[must_use]
    pub fn new(project: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            markdown: markdown.into(),
            images: Vec::new(),
            filenames: Vec::new(),
            history: Vec::new(),
        }
    }
}

/// Stored report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReport {
    /// 32 hex digit identifier
    pub id: String,
    /// Project the report belongs to
    #[serde(default = "default_project")]
    pub project: String,
    /// Resolved Markdown
    pub markdown: String,
    /// Screenshot paths in registry order
    #[serde(default)]
    pub images: Vec<String>,
    /// Screenshot display names
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Conversation that produced the report
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    /// Seconds since the Unix epoch, UTC
    pub ts: f64,
}

impl SavedReport {
    /// Stamp a new report with a fresh id and the current time
    #[must_use]
    pub fn stamp(report: NewReport) -> Self {
        Self::stamp_at(report, Utc::now())
    }

    fn stamp_at(report: NewReport, at: DateTime<Utc>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let ts = at.timestamp_millis() as f64 / 1000.0;
        Self {
            id: Uuid::new_v4().simple().to_string(),
            project: report.project,
            markdown: report.markdown,
            images: report.images,
            filenames: report.filenames,
            history: report.history,
            ts,
        }
    }

    /// Save time
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        #[allow(clippy::cast_possible_truncation)]
        let millis = (self.ts * 1000.0).round() as i64;
        Utc.timestamp_millis_opt(millis).single()
    }
}

/// Report persistence
///
/// Calls block on I/O; async callers run them on a blocking thread.
pub trait ReportStore: Send + Sync {
    /// Append a report and return its stored form
    ///
    /// # Errors
    /// - `StoreError` if the record cannot be persisted
    fn save(&self, report: NewReport) -> Result<SavedReport, StoreError>;

    /// All reports of `project`, oldest first
    ///
    /// # Errors
    /// - `StoreError` if the records cannot be read
    fn list(&self, project: &str) -> Result<Vec<SavedReport>, StoreError>;

    /// One report of `project` by id
    ///
    /// # Errors
    /// - `StoreError` if the records cannot be read
    fn get(&self, project: &str, id: &str) -> Result<Option<SavedReport>, StoreError>;
}

/// On-disk document layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    reports: BTreeMap<u64, SavedReport>,
}

impl Document {
    fn append(&mut self, report: SavedReport) {
        let next = self.reports.keys().next_back().map_or(1, |last| last + 1);
        self.reports.insert(next, report);
    }

    fn list(&self, project: &str) -> Vec<SavedReport> {
        self.reports
            .values()
            .filter(|r| r.project == project)
            .cloned()
            .collect()
    }

    fn get(&self, project: &str, id: &str) -> Option<SavedReport> {
        self.reports
            .values()
            .find(|r| r.project == project && r.id == id)
            .cloned()
    }
}

/// Reports in a single JSON file
///
/// The file is re-read on every call so several processes can share it.
/// Writes go to a sibling temporary file that is renamed over the original.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store at `path`; the file is created on first save
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Document, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(Document::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, doc: &Document) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ReportStore for JsonFileStore {
    fn save(&self, report: NewReport) -> Result<SavedReport, StoreError> {
        let _guard = self.write_lock.lock();
        let mut doc = self.read()?;
        let saved = SavedReport::stamp(report);
        doc.append(saved.clone());
        self.write(&doc)?;
        tracing::info!(project = %saved.project, id = %saved.id, "report saved");
        Ok(saved)
    }

    fn list(&self, project: &str) -> Result<Vec<SavedReport>, StoreError> {
        Ok(self.read()?.list(project))
    }

    fn get(&self, project: &str, id: &str) -> Result<Option<SavedReport>, StoreError> {
        Ok(self.read()?.get(project, id))
    }
}

/// Reports kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<Document>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryStore {
    fn save(&self, report: NewReport) -> Result<SavedReport, StoreError> {
        let saved = SavedReport::stamp(report);
        self.doc.lock().append(saved.clone());
        Ok(saved)
    }

    fn list(&self, project: &str) -> Result<Vec<SavedReport>, StoreError> {
        Ok(self.doc.lock().list(project))
    }

    fn get(&self, project: &str, id: &str) -> Result<Option<SavedReport>, StoreError> {
        Ok(self.doc.lock().get(project, id))
    }
}
