//! Where proposals and dead processes come from.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::index;
use rand::Rng;

use crate::config::Params;
use crate::{ProcessId, Value};

pub trait ProposalSource {
    /// The private proposal of `id`, drawn once when the process starts.
    fn propose(&mut self, id: ProcessId) -> Value;
}

pub trait DeadSetSource {
    /// Processes that are dead before the run starts.
    fn dead_set(&mut self, params: &Params) -> BTreeSet<ProcessId>;
}

/// Uniform proposals in `0..=max_value`.
pub struct RandomProposals<R: Rng> {
    rng: R,
    max_value: Value,
}

impl<R: Rng> RandomProposals<R> {
    pub fn new(rng: R, max_value: Value) -> Self {
        Self { rng, max_value }
    }
}

impl<R: Rng> ProposalSource for RandomProposals<R> {
    fn propose(&mut self, _id: ProcessId) -> Value {
        self.rng.gen_range(0, self.max_value.saturating_add(1).max(1))
    }
}

/// Proposals fixed up front; processes without an entry propose `fallback`.
#[derive(Debug, Clone, Default)]
pub struct FixedProposals {
    pub values: BTreeMap<ProcessId, Value>,
    pub fallback: Value,
}

impl FixedProposals {
    pub fn new(values: impl IntoIterator<Item = (ProcessId, Value)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            fallback: 0,
        }
    }
}

impl ProposalSource for FixedProposals {
    fn propose(&mut self, id: ProcessId) -> Value {
        self.values.get(&id).copied().unwrap_or(self.fallback)
    }
}

/// A random subset of at most T processes.
pub struct RandomDeadSet<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomDeadSet<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> DeadSetSource for RandomDeadSet<R> {
    fn dead_set(&mut self, params: &Params) -> BTreeSet<ProcessId> {
        let n_dead = self.rng.gen_range(0, params.t + 1);
        index::sample(&mut self.rng, params.n, n_dead)
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedDeadSet(pub BTreeSet<ProcessId>);

impl FixedDeadSet {
    pub fn none() -> Self {
        Self::default()
    }
}

impl DeadSetSource for FixedDeadSet {
    fn dead_set(&mut self, _params: &Params) -> BTreeSet<ProcessId> {
        self.0.clone()
    }
}
