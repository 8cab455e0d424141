use std::path::Path;

use serde_json::json;

use crate::config::ProcessingSettings;
use crate::error::ProcessError;
use crate::processor::DocumentProcessor;

const PREVIEW_CHARS: usize = 200;

/// Reads a UTF-8 document and reports plain statistics. Deterministic, so it
/// serves dry runs and tests.
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for TextProcessor {
    fn process(
        &self,
        path: &Path,
        settings: &ProcessingSettings,
    ) -> Result<serde_json::Value, ProcessError> {
        let bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text =
            String::from_utf8(bytes).map_err(|_| ProcessError::InvalidEncoding(path.to_path_buf()))?;

        let preview: String = text.chars().take(PREVIEW_CHARS).collect();

        Ok(json!({
            "processor": self.name(),
            "model": settings.model,
            "characters": text.chars().count(),
            "words": text.split_whitespace().count(),
            "lines": text.lines().count(),
            "preview": preview,
        }))
    }

    fn name(&self) -> &'static str {
        "text"
    }
}
