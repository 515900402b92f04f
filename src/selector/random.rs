//! Uniform random selection strategy.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::registry::PoolEntry;
use crate::selector::{SelectionContext, SelectionStrategy};

/// Picks uniformly among candidates.
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for RandomStrategy {
    fn select(&self, candidates: &[Arc<PoolEntry>], _ctx: &SelectionContext) -> Option<Arc<PoolEntry>> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}
