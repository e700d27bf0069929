//! Porfiry Core - report assembly
//!
//! Turns an analyst's draft and screenshots into a finished Markdown report:
//! - Builds model requests from conversation history and screenshot bytes
//! - Calls the model in one piece or relays its token stream
//! - Resolves screenshot references in the output to embedded images
//! - Fronts the single-flight OCR worker
//! - Keeps the drafting session state and persists saved reports
//!
//! # Example
//!
//! ```rust,ignore
//! use porfiry_core::{Assembler, DraftSession, OllamaChat, PorfiryConfig, PromptVariant};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PorfiryConfig::load(None)?;
//! let assembler = Assembler::from_config(Arc::new(OllamaChat::from_config(&config.model)?), &config)?;
//!
//! let mut session = DraftSession::new();
//! session.set_title("SQL injection in /login");
//! session.add_screenshot("/tmp/0af3.png", "login.png");
//! session.insert_placeholder("screenshot1.png");
//!
//! let request = session.report_request(PromptVariant::Report).await?;
//! let assembly = assembler.generate(request).await?;
//! session.record(&assembly);
//! println!("{}", assembly.markdown);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod capability;
pub mod combine;
pub mod config;
pub mod error;
pub mod imaging;
pub mod message;
pub mod ocr;
pub mod ollama;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod store;

pub use capability::{ModelCapability, OcrCapability, TokenStream};
pub use combine::{
    executive_summary_request, merge_reports, merge_without_images, parse_statistics, Severity,
    VulnerabilityStats,
};
pub use config::PorfiryConfig;
pub use error::{AssemblyError, CapabilityError, StoreError};
pub use imaging::{data_uri, ImageLoader, OcrInput};
pub use message::{build_messages, ChatMessage, ChatRequest, ModelOptions, Role};
pub use ocr::{sse_frame, OcrService, OcrStatus};
pub use ollama::{OllamaChat, OllamaOcr};
pub use orchestrator::{load_screenshots, Assembler, Assembly, AssemblyEvent, AssemblyRequest, Screenshot};
pub use prompt::PromptVariant;
pub use session::DraftSession;
pub use store::{JsonFileStore, MemoryStore, NewReport, ReportStore, SavedReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Porfiry Core
    pub use crate::{
        Assembler, Assembly, AssemblyError, AssemblyEvent, AssemblyRequest, DraftSession,
        ModelCapability, OcrCapability, OcrService, PorfiryConfig, PromptVariant, ReportStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
