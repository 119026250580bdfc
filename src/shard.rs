//! Shard planning
//!
//! The logical table is split into `shard_count` contiguous key ranges of
//! `shard_size` keys each. Shard `i` covers `[i * size, (i + 1) * size)` and is
//! materialized as its own physical table.

use serde::{Deserialize, Serialize};

/// How the key predicate of a shard treats its bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// `key > lower AND key < upper`. Keys equal to a bound belong to no shard.
    #[default]
    Exclusive,
    /// `key >= lower AND key < upper`. Every key in the domain has one shard.
    HalfOpen,
}

impl BoundaryMode {
    pub fn lower_operator(&self) -> &'static str {
        match self {
            BoundaryMode::Exclusive => ">",
            BoundaryMode::HalfOpen => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub index: usize,
    pub lower: u64,
    pub upper: u64,
}

impl Shard {
    /// Physical table name, e.g. `files_007`.
    pub fn table_name(&self, source_table: &str) -> String {
        format!("{}_{:03}", source_table, self.index)
    }

    pub fn contains(&self, key: u64, mode: BoundaryMode) -> bool {
        let above_lower = match mode {
            BoundaryMode::Exclusive => key > self.lower,
            BoundaryMode::HalfOpen => key >= self.lower,
        };
        above_lower && key < self.upper
    }
}

/// Ordered shard layout for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPlan {
    shards: Vec<Shard>,
    shard_size: u64,
    boundary: BoundaryMode,
}

impl ShardPlan {
    /// Bounds saturate at `u64::MAX`; shards past the end of the key space
    /// come out empty. `EngineConfig::validate` rejects such layouts.
    pub fn new(shard_count: usize, shard_size: u64, boundary: BoundaryMode) -> Self {
        let mut shards = Vec::with_capacity(shard_count);
        let mut next_lower = 0u64;
        for index in 0..shard_count {
            let lower = next_lower;
            next_lower = next_lower.saturating_add(shard_size);
            shards.push(Shard {
                index,
                lower,
                upper: next_lower,
            });
        }

        Self {
            shards,
            shard_size,
            boundary,
        }
    }

    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(config.shard_count, config.shard_size, config.boundary)
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }

    /// Upper end of the covered key domain.
    pub fn key_domain_end(&self) -> u64 {
        self.shards.last().map(|s| s.upper).unwrap_or(0)
    }

    /// First `count` shards; `count` past the end is clamped.
    pub fn take(&self, count: usize) -> &[Shard] {
        &self.shards[..count.min(self.shards.len())]
    }

    /// Shard whose predicate selects `key`, if any.
    pub fn locate(&self, key: u64) -> Option<&Shard> {
        if self.shard_size == 0 {
            return None;
        }
        let index = usize::try_from(key / self.shard_size).ok()?;
        self.shards
            .get(index)
            .filter(|shard| shard.contains(key, self.boundary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_layout_covers_domain() {
        let plan = ShardPlan::new(200, 50_000, BoundaryMode::Exclusive);
        let shards = plan.shards();

        assert_eq!(shards.len(), 200);
        assert_eq!(shards[0].lower, 0);
        assert_eq!(plan.key_domain_end(), 10_000_000);

        for pair in shards.windows(2) {
            assert_eq!(pair[1].lower, pair[0].upper);
            assert_eq!(pair[1].index, pair[0].index + 1);
        }

        let covered: u64 = shards.iter().map(|s| s.upper - s.lower).sum();
        assert_eq!(covered, 10_000_000);
    }

    #[test]
    fn test_table_names_are_zero_padded() {
        let plan = ShardPlan::new(200, 50_000, BoundaryMode::Exclusive);
        assert_eq!(plan.shards()[0].table_name("files"), "files_000");
        assert_eq!(plan.shards()[42].table_name("files"), "files_042");
        assert_eq!(plan.shards()[199].table_name("files"), "files_199");
    }

    // Keys that sit exactly on a bound are selected by neither neighbour under
    // the exclusive predicate. Kept deliberately; HalfOpen closes the gap.
    #[test]
    fn test_exclusive_boundary_keys_fall_between_shards() {
        let plan = ShardPlan::new(3, 10, BoundaryMode::Exclusive);
        let (first, second) = (plan.shards()[0], plan.shards()[1]);

        assert!(!first.contains(10, BoundaryMode::Exclusive));
        assert!(!second.contains(10, BoundaryMode::Exclusive));
        assert!(!first.contains(0, BoundaryMode::Exclusive));
        assert!(plan.locate(10).is_none());
        assert!(plan.locate(0).is_none());
        assert_eq!(plan.locate(11).map(|s| s.index), Some(1));
    }

    #[test]
    fn test_half_open_assigns_every_key_once() {
        let plan = ShardPlan::new(3, 10, BoundaryMode::HalfOpen);
        for key in 0..30u64 {
            let owners = plan
                .shards()
                .iter()
                .filter(|s| s.contains(key, BoundaryMode::HalfOpen))
                .count();
            assert_eq!(owners, 1, "key {}", key);
        }
        assert!(plan.locate(30).is_none());
    }

    #[test]
    fn test_oversized_layout_saturates() {
        let plan = ShardPlan::new(3, u64::MAX / 2 + 1, BoundaryMode::Exclusive);
        let shards = plan.shards();

        assert_eq!(shards[0].upper, u64::MAX / 2 + 1);
        assert_eq!(shards[1].upper, u64::MAX);
        assert_eq!(shards[2].lower, u64::MAX);
        assert_eq!(shards[2].upper, u64::MAX);
        assert_eq!(plan.key_domain_end(), u64::MAX);
        assert!(shards.windows(2).all(|w| w[1].lower == w[0].upper));
    }

    #[test]
    fn test_take_clamps_to_plan() {
        let plan = ShardPlan::new(3, 10, BoundaryMode::Exclusive);
        assert_eq!(plan.take(2).len(), 2);
        assert_eq!(plan.take(500).len(), 3);
        assert!(plan.take(0).is_empty());
    }
}
