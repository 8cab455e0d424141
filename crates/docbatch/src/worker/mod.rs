pub mod artifact;
pub mod launcher;
pub mod retry;
pub mod runner;
pub mod spec;
pub mod supervisor;

pub use artifact::ArtifactState;
pub use launcher::{ProcessLauncher, ThreadLauncher, WorkerExit, WorkerHandle, WorkerLauncher};
pub use retry::RetryPolicy;
pub use runner::{run_from_spec_file, run_worker, WorkerSummary};
pub use spec::WorkerSpec;
pub use supervisor::{BatchFailure, RunReport, Supervisor, SupervisorOptions};
