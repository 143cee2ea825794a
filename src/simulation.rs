//! Runs every live process of a configuration on its own thread.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Params, SimulationConfig};
use crate::engine::{Engine, Event, Failure, Outcome, Trace};
use crate::process::Process;
use crate::source::{DeadSetSource, ProposalSource, RandomDeadSet, RandomProposals};
use crate::transport::Network;
use crate::{Error, ProcessId, Result, Value};

pub type ProcessResult = std::result::Result<Outcome, Failure>;

pub struct Simulation<P: ProposalSource, D: DeadSetSource> {
    config: SimulationConfig,
    proposals: P,
    dead: D,
}

impl Simulation<RandomProposals<StdRng>, RandomDeadSet<StdRng>> {
    /// Random proposals and a random dead set of at most T processes, both
    /// reproducible from `seed`.
    pub fn seeded(config: SimulationConfig, seed: u64) -> Self {
        let max_value = config.max_value;
        Self::new(
            config,
            RandomProposals::new(StdRng::seed_from_u64(seed), max_value),
            RandomDeadSet::new(StdRng::seed_from_u64(seed.wrapping_add(1))),
        )
    }
}

impl<P: ProposalSource, D: DeadSetSource> Simulation<P, D> {
    pub fn new(config: SimulationConfig, proposals: P, dead: D) -> Self {
        Self {
            config,
            proposals,
            dead,
        }
    }

    pub fn run(&mut self) -> Result<Report> {
        self.run_with(|_| {})
    }

    /// Like [`Simulation::run`], `prepare` gets to touch the network before
    /// any process starts.
    pub fn run_with(&mut self, prepare: impl FnOnce(&Network)) -> Result<Report> {
        let params = self.config.params()?;
        let dead = self.dead.dead_set(&params);
        if let Some(id) = dead.iter().find(|id| !params.contains(**id)) {
            return Err(Error::UnknownProcess {
                id: *id,
                n: params.n,
            });
        }
        if dead.len() > params.t {
            warn!(
                "[SIM] {} dead processes, only {} can be tolerated",
                dead.len(),
                params.t
            );
        }

        let live = BTreeSet::from_iter((0..params.n).filter(|id| !dead.contains(id)));
        info!(
            "[SIM] N = {}, T = {}, L = {}, live: {:?}",
            params.n, params.t, params.l, live
        );

        let mut network = Network::new(params.n, &live);
        let proposals = BTreeMap::from_iter(
            live.iter()
                .map(|id| (*id, self.proposals.propose(*id))),
        );
        prepare(&network);

        let mut handles = Vec::with_capacity(live.len());
        for (id, value) in proposals.iter() {
            let (id, value) = (*id, *value);
            let inbox = network
                .take_inbox(id, self.config.closure_timeout)
                .ok_or(Error::UnknownProcess { id, n: params.n })?;
            let outbox = network.outbox(id);
            let process = Process::new(id, params, value);
            let handle = thread::Builder::new()
                .name(format!("p{}", id))
                .spawn(move || Engine::new(process, inbox, outbox).run())?;
            handles.push((id, handle));
        }
        drop(network);

        let mut outcomes = BTreeMap::new();
        for (id, handle) in handles {
            let result = handle.join().map_err(|_| Error::ProcessPanicked(id))?;
            outcomes.insert(id, result);
        }

        Ok(Report {
            params,
            dead,
            proposals,
            outcomes,
        })
    }
}

/// Everything a run produced.
#[derive(Debug)]
pub struct Report {
    pub params: Params,
    pub dead: BTreeSet<ProcessId>,
    /// Proposals of the live processes.
    pub proposals: BTreeMap<ProcessId, Value>,
    pub outcomes: BTreeMap<ProcessId, ProcessResult>,
}

impl Report {
    pub fn live(&self) -> BTreeSet<ProcessId> {
        self.outcomes.keys().copied().collect()
    }

    pub fn decisions(&self) -> BTreeMap<ProcessId, Value> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| r.as_ref().ok().map(|o| (*id, o.decision.value)))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Failure> {
        self.outcomes.values().filter_map(|r| r.as_ref().err())
    }

    /// The common decision, if every live process decided the same value.
    pub fn agreed_value(&self) -> Option<Value> {
        if self.failures().next().is_some() {
            return None;
        }
        let values = BTreeSet::from_iter(self.decisions().into_values());
        match values.len() {
            1 => values.into_iter().next(),
            _ => None,
        }
    }

    /// True if every decided value was proposed by some live process.
    pub fn decisions_are_valid(&self) -> bool {
        let proposed = BTreeSet::from_iter(self.proposals.values());
        self.decisions().values().all(|v| proposed.contains(v))
    }

    fn trace_of(&self, id: ProcessId) -> Option<&Trace> {
        self.outcomes.get(&id).map(|r| match r {
            Ok(outcome) => &outcome.trace,
            Err(failure) => &failure.trace,
        })
    }

    /// Renders every message a live process took out of its inbox as an
    /// mscgen chart. See: http://www.mcternan.me.uk/mscgen/
    pub fn to_msc(&self) -> String {
        let mut msc = String::from("msc {\n  hscale = \"2\";\n");
        let procs = (0..self.params.n)
            .map(|id| format!("p{}", id))
            .collect::<Vec<_>>()
            .join(",");
        msc.push_str(&format!("  {};\n", procs));

        for id in self.live() {
            for event in self.trace_of(id).into_iter().flat_map(|t| t.events.iter()) {
                let (msg, note) = match event {
                    Event::Sent(_) => continue,
                    Event::Received(msg) => (msg, ""),
                    Event::Deferred(msg) => (msg, " (deferred)"),
                    Event::Discarded(msg) => (msg, " (discarded)"),
                };
                msc.push_str(&format!(
                    "  p{} -> p{} [ label=\"{:?}{}\"];\n",
                    msg.sender(),
                    id,
                    msg,
                    note
                ));
            }
        }

        msc.push_str("}\n");
        msc
    }
}
