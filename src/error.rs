use std::collections::BTreeSet;

use thiserror::Error;

use crate::process::Stage;
use crate::ProcessId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("We experienced an IO error")]
    IO(#[from] std::io::Error),
    #[error("Inbound item is not a protocol message: {reason}")]
    ProtocolViolation { reason: String },
    #[error("{stage:?} never reached closure: {known} of {required} processes accounted for")]
    ClosureNeverReached {
        stage: Stage,
        known: usize,
        required: usize,
    },
    #[error("Initial clique {clique:?} has no recorded proposal for {missing:?}")]
    EmptyDecisionSet {
        clique: BTreeSet<ProcessId>,
        missing: BTreeSet<ProcessId>,
    },
    #[error("Failed to encode with bincode")]
    Encoding(#[from] bincode::Error),
    #[error("The operation requested assumes we have at least one process")]
    NoProcesses,
    #[error("Process {id} is not one of the {n} processes of this run")]
    UnknownProcess { id: ProcessId, n: usize },
    #[error("Process {0} panicked before reporting an outcome")]
    ProcessPanicked(ProcessId),
}

pub type Result<T> = std::result::Result<T, Error>;
