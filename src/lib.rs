pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pool;
pub mod queue;
pub mod shard;
pub mod statement;

pub use aggregator::{RunReport, StopReason};
pub use config::EngineConfig;
pub use engine::{Engine, QueryRequest};
pub use error::{Result, TablesplitError};
pub use pool::WorkerPool;
