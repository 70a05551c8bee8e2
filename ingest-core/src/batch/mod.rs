pub mod builder;
pub mod submitter;

pub use builder::{BuilderError, CqlBatch};
pub use submitter::fake::FakeBatchSubmitter;
pub use submitter::{BatchSubmitter, ScyllaBatchSubmitter};
