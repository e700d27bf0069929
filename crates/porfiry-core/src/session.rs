//! Drafting session
//!
//! State of one analyst working on one report:
//! - the screenshot registry and the draft text that refers to it by name
//! - the conversation history sent to the model
//! - the last raw model output (fed back on follow-ups) and its resolved
//!   Markdown (shown and saved)
//!
//! Every registry change propagates its renames into the draft, the last
//! raw output and the conversation history before returning, so no name in
//! any of them ever points at the wrong image.

use crate::error::AssemblyError;
use crate::message::{ChatMessage, Role};
use crate::orchestrator::{load_screenshots, Assembly, AssemblyRequest};
use crate::prompt::PromptVariant;
use crate::store::{NewReport, SavedReport};
use porfiry_refs::propagate_rename;
use porfiry_shots::{RenameMap, ScreenshotRegistry, ShotId};

/// Separator between a follow-up instruction and the current report
pub const FOLLOW_UP_CONTEXT: &str = "\n\n---\n\nCurrent report in Markdown (for context):\n\n";

/// Placeholder caption inserted for a screenshot
pub const PLACEHOLDER_CAPTION: &str = "Short description";

/// One report being drafted
#[derive(Debug, Clone, Default)]
pub struct DraftSession {
    title: String,
    registry: ScreenshotRegistry,
    draft: String,
    last_raw: String,
    last_markdown: String,
    history: Vec<ChatMessage>,
}

impl DraftSession {
    /// Create empty session
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set report title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Draft text
    #[inline]
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the draft text
    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Last raw model output
    #[inline]
    #[must_use]
    pub fn last_raw(&self) -> &str {
        &self.last_raw
    }

    /// Last resolved Markdown
    #[inline]
    #[must_use]
    pub fn last_markdown(&self) -> &str {
        &self.last_markdown
    }

    /// Conversation so far
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Screenshot registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ScreenshotRegistry {
        &self.registry
    }

    /// Attach an uploaded screenshot
    pub fn add_screenshot(&mut self, source_path: impl Into<String>, original_filename: impl Into<String>) -> ShotId {
        self.registry.add(source_path, original_filename)
    }

    /// Detach a screenshot; later screenshots move up one position
    ///
    /// # Errors
    /// - `AssemblyError::NotFound` for an unknown id
    pub fn remove_screenshot(&mut self, id: ShotId) -> Result<(), AssemblyError> {
        let renames = self.registry.remove(id)?;
        self.propagate(&renames);
        Ok(())
    }

    /// Rearrange screenshots by display name
    ///
    /// An order equal to the current one changes nothing.
    ///
    /// # Errors
    /// - `AssemblyError::InvalidOrder` unless `names` is a permutation of the
    ///   current names
    pub fn reorder_screenshots<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), AssemblyError> {
        let unchanged = names.len() == self.registry.len()
            && names
                .iter()
                .zip(self.registry.records())
                .all(|(name, record)| name.as_ref() == record.display_name);
        if unchanged {
            return Ok(());
        }
        let renames = self.registry.reorder(names)?;
        self.propagate(&renames);
        Ok(())
    }

    fn propagate(&mut self, renames: &RenameMap) {
        if renames.is_empty() {
            return;
        }
        self.draft = propagate_rename(&self.draft, renames);
        self.last_raw = propagate_rename(&self.last_raw, renames);
        for turn in &mut self.history {
            turn.content = propagate_rename(&turn.content, renames);
        }
    }

    /// Append `![Short description](name)` on its own line
    pub fn insert_placeholder(&mut self, display_name: &str) {
        self.append_line(&format!("![{PLACEHOLDER_CAPTION}]({display_name})"));
    }

    /// Append text (e.g. OCR output) on its own line; blank text is ignored
    pub fn append_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.append_line(text);
        }
    }

    fn append_line(&mut self, line: &str) {
        if !self.draft.is_empty() && !self.draft.ends_with('\n') {
            self.draft.push('\n');
        }
        self.draft.push_str(line);
        self.draft.push('\n');
    }

    /// Start a fresh generation from the title and draft
    ///
    /// Resets the history to the single user turn `# <title>\n\n<draft>`.
    ///
    /// # Errors
    /// - `AssemblyError::NotFound` if a screenshot file has disappeared
    pub async fn report_request(&mut self, variant: PromptVariant) -> Result<AssemblyRequest, AssemblyError> {
        self.history = vec![ChatMessage::user(format!("# {}\n\n{}", self.title, self.draft))];
        self.request(variant).await
    }

    /// Ask the model to revise the last result
    ///
    /// The instruction is sent together with the current raw report.
    ///
    /// # Errors
    /// - `AssemblyError::InvalidInput` before any result exists
    /// - `AssemblyError::NotFound` if a screenshot file has disappeared
    pub async fn follow_up_request(&mut self, instruction: &str) -> Result<AssemblyRequest, AssemblyError> {
        if self.last_raw.is_empty() {
            return Err(AssemblyError::invalid_input("generate the report before refining it"));
        }
        let content = format!("{}{FOLLOW_UP_CONTEXT}{}", instruction.trim(), self.last_raw);
        self.history.push(ChatMessage::user(content));
        self.request(PromptVariant::Report).await
    }

    async fn request(&self, variant: PromptVariant) -> Result<AssemblyRequest, AssemblyError> {
        let (paths, names): (Vec<String>, Vec<String>) = self
            .registry
            .records()
            .iter()
            .map(|r| (r.source_path.clone(), r.display_name.clone()))
            .unzip();
        let screenshots = load_screenshots(&names, &paths).await?;
        Ok(AssemblyRequest::new(variant, self.history.clone(), screenshots))
    }

    /// Keep a finished generation as the current result
    pub fn record(&mut self, assembly: &Assembly) {
        self.last_raw.clone_from(&assembly.raw);
        self.last_markdown.clone_from(&assembly.markdown);
        self.history.push(ChatMessage::assistant(assembly.raw.clone()));
    }

    /// Current result as a report to save under `project`
    ///
    /// # Errors
    /// - `AssemblyError::InvalidInput` before any result exists
    pub fn to_new_report(&self, project: &str) -> Result<NewReport, AssemblyError> {
        if self.last_markdown.is_empty() {
            return Err(AssemblyError::invalid_input("nothing to save yet"));
        }
        let records = self.registry.records();
        Ok(NewReport {
            project: project.to_string(),
            markdown: self.last_markdown.clone(),
            images: records.iter().map(|r| r.source_path.clone()).collect(),
            filenames: records.iter().map(|r| r.display_name.clone()).collect(),
            history: self.history.clone(),
        })
    }

    /// Continue from a saved report
    ///
    /// The saved Markdown already embeds its images, so the registry and the
    /// draft are cleared and the Markdown doubles as the raw context.
    pub fn restore(&mut self, report: &SavedReport) {
        self.last_markdown.clone_from(&report.markdown);
        self.last_raw.clone_from(&report.markdown);
        self.history.clone_from(&report.history);
        self.registry.clear();
        self.draft.clear();
        tracing::info!(id = %report.id, turns = self.history.len(), "report restored");
    }

    /// Number of assistant turns so far
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.history.iter().filter(|m| m.role == Role::Assistant).count()
    }
}
