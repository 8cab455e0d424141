pub mod merger;
pub mod render;

pub use merger::{
    BatchContribution, FailedEntry, MergeManifest, MergeReport, ResultMerger, SkippedEntry,
    MANIFEST_FILE,
};
pub use render::{
    JsonLinesReportRenderer, JsonReportRenderer, MergedRecord, ReportFormat, ReportRenderer,
};
