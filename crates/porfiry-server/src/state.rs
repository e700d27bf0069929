//! Shared handler state

use porfiry_core::{
    Assembler, AssemblyError, JsonFileStore, OcrService, OllamaChat, OllamaOcr, PorfiryConfig,
    ReportStore,
};
use std::sync::Arc;

/// Everything a request handler needs; cheap to clone
#[derive(Clone)]
pub struct AppState {
    /// Report generation
    pub assembler: Assembler,
    /// Single-flight OCR worker
    pub ocr: OcrService,
    /// Saved reports
    pub store: Arc<dyn ReportStore>,
}

impl AppState {
    /// Assemble from parts
    #[must_use]
    pub fn new(assembler: Assembler, ocr: OcrService, store: Arc<dyn ReportStore>) -> Self {
        Self { assembler, ocr, store }
    }

    /// Ollama backends and a JSON file store, as configured
    ///
    /// # Errors
    /// - `AssemblyError::CapabilityFailure` if an HTTP client cannot be built
    /// - `AssemblyError::Config` for an invalid resolver setting
    pub fn from_config(config: &PorfiryConfig) -> Result<Self, AssemblyError> {
        let model = Arc::new(OllamaChat::from_config(&config.model)?);
        let ocr = Arc::new(OllamaOcr::from_config(&config.ocr)?);
        Ok(Self {
            assembler: Assembler::from_config(model, config)?,
            ocr: OcrService::from_config(ocr, &config.ocr),
            store: Arc::new(JsonFileStore::new(config.store.path.clone())),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("assembler", &self.assembler)
            .field("ocr", &self.ocr)
            .finish_non_exhaustive()
    }
}
