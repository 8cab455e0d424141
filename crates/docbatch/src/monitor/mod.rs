pub mod poller;
pub mod progress;

pub use poller::{MonitorExit, MonitorGuard, MonitorTick, ProgressMonitor};
pub use progress::{JsonRenderer, PlainRenderer, ProgressSummary, StatusRenderer};
