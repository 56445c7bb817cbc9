pub mod models;
pub mod repository;

pub use models::{AttemptRecord, AttemptStatus, BlockTerms};
pub use repository::RecordRepository;
