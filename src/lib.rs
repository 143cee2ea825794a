//! Early-stopping consensus among N processes, up to T of which may be dead
//! before the run starts.
//!
//! Every live process announces itself (stage 1), waits for L announcements,
//! then broadcasts its proposal together with the set of processes it heard
//! from (stage 2). From the stage 2 messages each process builds a
//! [`KnowledgeGraph`], extracts the initial clique as its largest strongly
//! connected component and decides on the minimum proposal of that clique.

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod graph;
pub mod message;
pub mod process;
pub mod simulation;
pub mod source;
pub mod transport;

pub use crate::config::{Params, SimulationConfig};
pub use crate::decision::{decide, initial_clique, Decision};
pub use crate::engine::{Engine, Event, Failure, Outcome, Trace};
pub use crate::error::{Error, Result};
pub use crate::graph::KnowledgeGraph;
pub use crate::message::Message;
pub use crate::process::{Process, Response, Stage};
pub use crate::simulation::{Report, Simulation};
pub use crate::source::{
    DeadSetSource, FixedDeadSet, FixedProposals, ProposalSource, RandomDeadSet, RandomProposals,
};
pub use crate::transport::{Broadcaster, Inbox, Mailbox, Network, Outbox};

/// Identifies one of the N processes of a run.
pub type ProcessId = usize;

/// A proposed (and eventually decided) value.
pub type Value = u64;

/// Proposals received in stage 2, keyed by sender.
pub type ProposalMap = std::collections::BTreeMap<ProcessId, Value>;
