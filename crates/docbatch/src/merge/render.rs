use std::path::PathBuf;

use serde::Serialize;

/// One row of the merged report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub row: usize,
    pub batch_id: String,
    pub document_path: PathBuf,
    pub result: serde_json::Value,
}

/// Turns merged rows into report bytes. Output must depend on the rows only.
pub trait ReportRenderer {
    fn extension(&self) -> &'static str;

    fn render(&self, records: &[MergedRecord]) -> Result<Vec<u8>, String>;
}

/// A pretty-printed JSON array.
pub struct JsonReportRenderer;

impl ReportRenderer for JsonReportRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, records: &[MergedRecord]) -> Result<Vec<u8>, String> {
        let mut bytes = serde_json::to_vec_pretty(records).map_err(|e| e.to_string())?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// One compact JSON object per line.
pub struct JsonLinesReportRenderer;

impl ReportRenderer for JsonLinesReportRenderer {
    fn extension(&self) -> &'static str {
        "jsonl"
    }

    fn render(&self, records: &[MergedRecord]) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        for record in records {
            serde_json::to_writer(&mut bytes, record).map_err(|e| e.to_string())?;
            bytes.push(b'\n');
        }
        Ok(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    JsonLines,
}

impl ReportFormat {
    pub fn renderer(&self) -> Box<dyn ReportRenderer> {
        match self {
            ReportFormat::Json => Box::new(JsonReportRenderer),
            ReportFormat::JsonLines => Box::new(JsonLinesReportRenderer),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "jsonl" | "jsonlines" => Ok(ReportFormat::JsonLines),
            other => Err(format!("unknown report format '{}' (expected json or jsonl)", other)),
        }
    }
}
