//! Task assignment: maps a role requirement to a concrete assignee
//!
//! The engine only sees the [`TaskAssigner`] trait. Pools come from the
//! external roster (configuration, directory service); the strategy that
//! picks from a pool is swappable and deterministic under test via
//! [`FnAssigner`].

use insureflow_types::{RoleId, UserId};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Role → candidate assignees
pub type RolePools = HashMap<RoleId, Vec<UserId>>;

/// Resolves an assignee for a role
pub trait TaskAssigner: Send + Sync {
    /// Pick one user for `role`, `None` when the role has no candidates
    fn assign(&self, role: &RoleId) -> Option<UserId>;
}

// ── Round robin ──────────────────────────────────────────────────────

/// Cycles through each role's pool with a per-role counter
pub struct RoundRobinAssigner {
    pools: RolePools,
    counters: HashMap<RoleId, AtomicU64>,
}

impl RoundRobinAssigner {
    pub fn new(pools: RolePools) -> Self {
        let counters = pools
            .keys()
            .map(|role| (role.clone(), AtomicU64::new(0)))
            .collect();
        Self { pools, counters }
    }
}

impl TaskAssigner for RoundRobinAssigner {
    fn assign(&self, role: &RoleId) -> Option<UserId> {
        let pool = self.pools.get(role).filter(|p| !p.is_empty())?;
        let counter = self.counters.get(role)?;
        let idx = counter.fetch_add(1, Ordering::SeqCst);
        pool.get((idx % pool.len() as u64) as usize).cloned()
    }
}

// ── Random ───────────────────────────────────────────────────────────

/// Picks a uniformly random member of the role's pool
pub struct RandomAssigner {
    pools: RolePools,
}

impl RandomAssigner {
    pub fn new(pools: RolePools) -> Self {
        Self { pools }
    }
}

impl TaskAssigner for RandomAssigner {
    fn assign(&self, role: &RoleId) -> Option<UserId> {
        let pool = self.pools.get(role)?;
        pool.choose(&mut rand::thread_rng()).cloned()
    }
}

// ── Function ─────────────────────────────────────────────────────────

/// Delegates to a caller-supplied function
pub struct FnAssigner<F>(F);

impl<F> FnAssigner<F>
where
    F: Fn(&RoleId) -> Option<UserId> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> TaskAssigner for FnAssigner<F>
where
    F: Fn(&RoleId) -> Option<UserId> + Send + Sync,
{
    fn assign(&self, role: &RoleId) -> Option<UserId> {
        (self.0)(role)
    }
}

/// Never assigns anyone; tasks stay unassigned
pub struct NoAssigner;

impl TaskAssigner for NoAssigner {
    fn assign(&self, _role: &RoleId) -> Option<UserId> {
        None
    }
}

// ── Strategy selection ───────────────────────────────────────────────

/// Pool strategy named in configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    #[default]
    RoundRobin,
    Random,
}

impl AssignmentStrategy {
    /// Build an assigner of this strategy over `pools`
    pub fn build(self, pools: RolePools) -> Arc<dyn TaskAssigner> {
        match self {
            Self::RoundRobin => Arc::new(RoundRobinAssigner::new(pools)),
            Self::Random => Arc::new(RandomAssigner::new(pools)),
        }
    }
}
