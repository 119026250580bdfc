//! Mode orchestration: plan shards, generate statements, hand them to a pool

use crate::aggregator::RunReport;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::PgConnector;
use crate::pool::WorkerPool;
use crate::shard::ShardPlan;
use crate::statement::{StatementGenerator, Task};
use std::sync::Arc;
use tracing::info;

/// A count query across the leading shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub pattern: String,
    /// Per-shard cap and global early-exit threshold; 0 means unlimited
    pub limit: u64,
    /// Number of leading shards to query; clamped to the plan
    pub tables: usize,
}

pub struct Engine {
    config: EngineConfig,
    plan: ShardPlan,
    generator: StatementGenerator,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let plan = ShardPlan::from_config(&config);
        let generator = StatementGenerator::new(&config);
        Ok(Self {
            config,
            plan,
            generator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self) -> &ShardPlan {
        &self.plan
    }

    /// Pool of PostgreSQL workers. Fails on missing store settings without
    /// opening any connection.
    pub fn pg_pool(&self) -> Result<WorkerPool> {
        let store = self.config.store()?;
        Ok(WorkerPool::new(store.parallel, Arc::new(PgConnector::new(&store))))
    }

    pub fn materialize_statements(&self) -> Vec<Task> {
        self.plan
            .shards()
            .iter()
            .map(|shard| self.generator.materialize(shard))
            .collect()
    }

    pub fn index_statements(&self) -> Vec<Task> {
        self.plan
            .shards()
            .iter()
            .map(|shard| self.generator.index(shard))
            .collect()
    }

    pub fn count_statements(&self, request: &QueryRequest) -> Vec<Task> {
        self.plan
            .take(request.tables)
            .iter()
            .map(|shard| self.generator.count(shard, &request.pattern, request.limit))
            .collect()
    }

    pub async fn run_create(&self, pool: &WorkerPool) -> Result<RunReport> {
        pool.run(self.materialize_statements(), 0).await
    }

    pub async fn run_index(&self, pool: &WorkerPool) -> Result<RunReport> {
        pool.run(self.index_statements(), 0).await
    }

    pub async fn run_query(&self, pool: &WorkerPool, request: &QueryRequest) -> Result<RunReport> {
        let tasks = self.count_statements(request);
        info!(
            pattern = %request.pattern,
            limit = request.limit,
            shards = tasks.len(),
            "running shard query"
        );
        pool.run(tasks, request.limit).await
    }
}
