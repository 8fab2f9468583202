pub mod bus;
pub mod cas;
pub mod chunk_store;
pub mod engine;
pub mod error;
pub mod index;
pub mod kv;
pub mod runner;
pub mod stages;

pub use cas::update_with_retry;
pub use error::PipelineError;
pub use runner::StageRunner;
pub use stages::{Disposition, Stage};
