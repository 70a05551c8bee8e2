pub mod batch;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod model;
pub mod publish;
pub mod queue;
