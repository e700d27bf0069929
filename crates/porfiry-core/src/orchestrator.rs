//! Assembly orchestrator
//!
//! Composes the pipeline for one generation:
//! 1. Build the message list: system prompt, history, screenshots on the
//!    newest user turn
//! 2. Call the model, in one piece or as a relayed token stream
//! 3. On completion, tidy the raw text and resolve screenshot references
//!    against a mapping built from the request's screenshots
//!
//! Both texts are returned: `raw` is fed back as conversation context,
//! `markdown` (with embedded data URIs) is for display and export.

use crate::capability::{ModelCapability, TokenStream};
use crate::config::PorfiryConfig;
use crate::error::AssemblyError;
use crate::imaging::{data_uri, read_screenshot};
use crate::message::{build_messages, ChatMessage, ChatRequest, ModelOptions};
use crate::prompt::PromptVariant;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use porfiry_refs::{resolve_with, tidy_linebreaks, MentionSyntax, ReferenceMapping};
use porfiry_relay::{relay, relay_text, FlightPermit, RelayChunk, RelayOptions, SingleFlight, StreamSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Gate name used when generation is single-flight
pub const GENERATION_CAPABILITY: &str = "generation";

/// One screenshot as sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Registry display name (`screenshot<N><ext>`)
    pub name: String,
    /// Image bytes
    pub bytes: Vec<u8>,
}

impl Screenshot {
    /// Create screenshot
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Embedded target for reference resolution
    #[must_use]
    pub fn data_uri(&self) -> String {
        data_uri(&self.bytes, &self.name)
    }
}

/// Read screenshots given as parallel name and path lists
///
/// # Errors
/// - `AssemblyError::InvalidInput` if the lists differ in length
/// - `AssemblyError::NotFound` if a path does not exist
pub async fn load_screenshots(names: &[String], paths: &[String]) -> Result<Vec<Screenshot>, AssemblyError> {
    if names.len() != paths.len() {
        return Err(AssemblyError::invalid_input(format!(
            "{} filenames for {} images",
            names.len(),
            paths.len()
        )));
    }
    let mut shots = Vec::with_capacity(paths.len());
    for (name, path) in names.iter().zip(paths) {
        shots.push(Screenshot::new(name.clone(), read_screenshot(path).await?));
    }
    Ok(shots)
}

/// Input of one generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRequest {
    /// Conversation so far
    pub history: Vec<ChatMessage>,
    /// Screenshots in registry order
    pub screenshots: Vec<Screenshot>,
    /// System prompt selection
    pub variant: PromptVariant,
}

impl AssemblyRequest {
    /// Create request
    #[inline]
    #[must_use]
    pub fn new(variant: PromptVariant, history: Vec<ChatMessage>, screenshots: Vec<Screenshot>) -> Self {
        Self {
            history,
            screenshots,
            variant,
        }
    }

    /// Display name -> data URI, in registry order
    #[must_use]
    pub fn mapping(&self) -> ReferenceMapping {
        mapping_for(&self.screenshots)
    }
}

fn mapping_for(screenshots: &[Screenshot]) -> ReferenceMapping {
    ReferenceMapping::from_pairs(screenshots.iter().map(|s| (s.name.clone(), s.data_uri())))
}

/// Finished generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    /// Resolved Markdown with embedded screenshots
    pub markdown: String,
    /// Model output after tidying, references unresolved
    pub raw: String,
}

/// Progress of a streamed generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyEvent {
    /// Token forwarded live
    Token(String),
    /// Stream ended; final texts
    Completed(Assembly),
    /// Upstream failed after output began
    Failed(String),
}

/// Post-processing applied once the full text is known
#[derive(Debug, Clone)]
struct Finisher {
    mentions: MentionSyntax,
    tidy: bool,
}

impl Finisher {
    fn finish(&self, raw: &str, screenshots: &[Screenshot]) -> Assembly {
        let raw = raw.trim();
        let raw = if self.tidy {
            tidy_linebreaks(raw)
        } else {
            raw.to_string()
        };
        let markdown = resolve_with(&raw, &mapping_for(screenshots), &self.mentions);
        Assembly { markdown, raw }
    }
}

/// Runs generations against a model capability
#[derive(Clone)]
pub struct Assembler {
    model: Arc<dyn ModelCapability>,
    options: ModelOptions,
    finisher: Finisher,
    gate: Option<SingleFlight>,
    relay: RelayOptions,
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("model", &self.model.model())
            .field("options", &self.options)
            .field("tidy", &self.finisher.tidy)
            .field("single_flight", &self.gate.is_some())
            .finish_non_exhaustive()
    }
}

impl Assembler {
    /// Create with default options: no admission gate, tidying on
    #[must_use]
    pub fn new(model: Arc<dyn ModelCapability>) -> Self {
        let defaults = crate::config::ModelConfig::default();
        Self {
            model,
            options: defaults.options(),
            finisher: Finisher {
                mentions: MentionSyntax::default(),
                tidy: true,
            },
            gate: None,
            relay: RelayOptions::default().with_chunk_timeout(Some(defaults.timeout())),
        }
    }

    /// Create from configuration
    ///
    /// # Errors
    /// - `AssemblyError::Config` for an invalid mention phrase
    pub fn from_config(model: Arc<dyn ModelCapability>, config: &PorfiryConfig) -> Result<Self, AssemblyError> {
        Ok(Self::new(model)
            .with_options(config.model.options())
            .with_mentions(config.mention_syntax()?)
            .with_tidy(config.assembly.tidy_linebreaks)
            .with_single_flight(config.assembly.single_flight_generation)
            .with_chunk_timeout(Some(config.model.timeout())))
    }

    /// With sampling options for report and kill-chain runs
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// With numbered-mention syntax
    #[inline]
    #[must_use]
    pub fn with_mentions(mut self, mentions: MentionSyntax) -> Self {
        self.finisher.mentions = mentions;
        self
    }

    /// With or without line-break tidying
    #[inline]
    #[must_use]
    pub fn with_tidy(mut self, tidy: bool) -> Self {
        self.finisher.tidy = tidy;
        self
    }

    /// Allow only one generation at a time
    #[must_use]
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.gate = enabled.then(|| SingleFlight::new(GENERATION_CAPABILITY));
        self
    }

    /// With idle timeout between streamed chunks
    #[inline]
    #[must_use]
    pub fn with_chunk_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.relay = self.relay.with_chunk_timeout(timeout);
        self
    }

    /// Model name
    #[inline]
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    /// Check whether a gated generation is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.as_ref().is_some_and(SingleFlight::is_busy)
    }

    /// Generate in one piece
    ///
    /// # Errors
    /// - `AssemblyError::Busy` when single-flight and another run is active
    /// - `AssemblyError::CapabilityFailure` if the model fails; not retried
    pub async fn generate(&self, request: AssemblyRequest) -> Result<Assembly, AssemblyError> {
        let _permit = self.admit()?;
        let started = Instant::now();
        tracing::info!(
            variant = %request.variant,
            screenshots = request.screenshots.len(),
            "generation started"
        );

        let raw = self
            .model
            .complete(self.chat_request(&request))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "generation failed");
                AssemblyError::from(e)
            })?;

        let assembly = self.finisher.finish(&raw, &request.screenshots);
        tracing::info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            chars = assembly.raw.len(),
            "generation finished"
        );
        Ok(assembly)
    }

    /// Generate as live events ending in `Completed` or `Failed`
    ///
    /// # Errors
    /// Failures before the first token surface here: `Busy` or
    /// `CapabilityFailure`. Later failures become [`AssemblyEvent::Failed`].
    pub async fn generate_events(
        &self,
        request: AssemblyRequest,
    ) -> Result<BoxStream<'static, AssemblyEvent>, AssemblyError> {
        let permit = self.admit()?;
        let tokens = self.open_stream(&request).await?;

        let state = EventState {
            relayed: relay(tokens, self.relay).boxed(),
            session: StreamSession::new(),
            screenshots: request.screenshots,
            finisher: self.finisher.clone(),
            permit,
            done: false,
        };

        Ok(stream::unfold(state, |mut st| async move {
            if st.done {
                return None;
            }
            loop {
                let Some(chunk) = st.relayed.next().await else {
                    st.session.finish();
                    let assembly = st.finisher.finish(st.session.accumulated(), &st.screenshots);
                    tracing::info!(chars = assembly.raw.len(), "streamed generation finished");
                    st.close();
                    return Some((AssemblyEvent::Completed(assembly), st));
                };
                st.session.observe(&chunk);
                match chunk {
                    RelayChunk::Token(text) => return Some((AssemblyEvent::Token(text), st)),
                    RelayChunk::Failure(message) => {
                        st.close();
                        return Some((AssemblyEvent::Failed(message), st));
                    }
                    RelayChunk::End => {}
                }
            }
        })
        .boxed())
    }

    /// Generate as wire text: tokens, then `\n[ERROR] ..` on failure
    ///
    /// # Errors
    /// - `Busy` or `CapabilityFailure` before the stream starts
    pub async fn raw_stream(&self, request: AssemblyRequest) -> Result<BoxStream<'static, String>, AssemblyError> {
        let permit = self.admit()?;
        let tokens = self.open_stream(&request).await?;
        let text = relay_text(tokens, self.relay);
        Ok(match permit {
            Some(permit) => permit.guard(text).boxed(),
            None => text.boxed(),
        })
    }

    /// Tidy and resolve a finished raw text against `screenshots`
    #[must_use]
    pub fn finish(&self, raw: &str, screenshots: &[Screenshot]) -> Assembly {
        self.finisher.finish(raw, screenshots)
    }

    fn admit(&self) -> Result<Option<FlightPermit>, AssemblyError> {
        self.gate
            .as_ref()
            .map(SingleFlight::try_acquire)
            .transpose()
            .map_err(AssemblyError::from)
    }

    fn chat_request(&self, request: &AssemblyRequest) -> ChatRequest {
        let options = match request.variant {
            PromptVariant::ExecutiveSummary => ModelOptions::executive_summary(),
            PromptVariant::Report | PromptVariant::KillChain => self.options,
        };
        ChatRequest {
            messages: build_messages(
                request.variant,
                &request.history,
                request.screenshots.iter().map(|s| &s.bytes),
            ),
            options,
        }
    }

    async fn open_stream(&self, request: &AssemblyRequest) -> Result<TokenStream, AssemblyError> {
        tracing::info!(
            variant = %request.variant,
            screenshots = request.screenshots.len(),
            "streamed generation started"
        );
        self.model
            .stream(self.chat_request(request))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "generation stream failed to open");
                AssemblyError::from(e)
            })
    }
}

struct EventState {
    relayed: BoxStream<'static, RelayChunk>,
    session: StreamSession,
    screenshots: Vec<Screenshot>,
    finisher: Finisher,
    permit: Option<FlightPermit>,
    done: bool,
}

impl EventState {
    fn close(&mut self) {
        self.done = true;
        drop(self.permit.take());
    }
}
