pub mod command;
pub mod text;

use std::path::Path;

use crate::config::{ProcessingSettings, ProcessorKind};
use crate::error::ProcessError;

/// Processes one document into a JSON result. Implementations are the seam
/// through which extraction and LLM calls plug into a batch run.
pub trait DocumentProcessor: Send + Sync {
    fn process(
        &self,
        path: &Path,
        settings: &ProcessingSettings,
    ) -> Result<serde_json::Value, ProcessError>;

    fn name(&self) -> &'static str;
}

pub fn build_processor(settings: &ProcessingSettings) -> Box<dyn DocumentProcessor> {
    match settings.processor {
        ProcessorKind::Text => Box::new(text::TextProcessor::new()),
        ProcessorKind::Command => Box::new(command::CommandProcessor::new()),
    }
}
