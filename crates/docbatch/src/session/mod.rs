pub mod model;
pub mod validation;

pub use model::{
    batch_id, generate_session_id, is_valid_session_id, Batch, BatchStatus, Document,
    DocumentStatus, Session, SessionStatus, SessionSummary, SCHEMA_VERSION,
};
pub use validation::{validate, ValidationReport};
