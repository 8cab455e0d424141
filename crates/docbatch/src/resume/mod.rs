pub mod coordinator;
pub mod repair;

pub use coordinator::{analyze, Reclassification, ResumeCoordinator, ResumePlan, ResumePreview};
pub use repair::repair;
