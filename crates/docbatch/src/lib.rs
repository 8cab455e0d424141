pub mod config;
pub mod controller;
pub mod error;
pub mod merge;
pub mod monitor;
pub mod planner;
pub mod processor;
pub mod resume;
pub mod sanitize;
pub mod session;
pub mod storage;
pub mod worker;

pub use config::{load_config, Config, ProcessingSettings, ProcessorKind};
pub use controller::{CleanupOptions, CleanupReport, Controller, ResumeOutcome, RunOutcome};
pub use error::{
    ConfigError, DocbatchError, ErrorClass, MergeError, PlanningError, ProcessError, Result,
    ResumeError, StateError, WorkerError,
};
pub use merge::{ReportFormat, ResultMerger};
pub use monitor::{ProgressMonitor, ProgressSummary};
pub use processor::{build_processor, DocumentProcessor};
pub use resume::{ResumeCoordinator, ResumePlan, ResumePreview};
pub use session::{Session, SessionStatus};
pub use storage::{BackupPolicy, StateStore};
pub use worker::{ProcessLauncher, ThreadLauncher, WorkerLauncher};
