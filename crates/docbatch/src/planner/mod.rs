pub mod plan;
pub mod scanner;

pub use plan::{batch_size, plan, Plan, PlanIssue};
pub use scanner::DocumentScanner;
