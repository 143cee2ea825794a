//! Run parameters.

use std::time::Duration;

use crate::{Error, Result, Value};

/// The three numbers every process of a run agrees on up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// Number of processes, dead or alive.
    pub n: usize,
    /// Maximum number of processes that may be dead from the start.
    pub t: usize,
    /// Number of distinct stage 1 announcements (self included) a process
    /// collects before moving on to stage 2.
    pub l: usize,
}

impl Params {
    /// T = ceil(N/2) - 1 and L = ceil((N+1)/2).
    pub fn for_processes(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::NoProcesses);
        }
        Ok(Self {
            n,
            t: (n + 1) / 2 - 1,
            l: (n + 2) / 2,
        })
    }

    pub fn contains(&self, id: crate::ProcessId) -> bool {
        id < self.n
    }
}

/// Configuration for a simulated run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of processes N.
    pub processes: usize,

    /// Proposals are drawn from `0..=max_value`.
    pub max_value: Value,

    /// How long a process waits for its next message before reporting
    /// that the current stage can never close.
    pub closure_timeout: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            processes: 3,
            max_value: 100,
            closure_timeout: Duration::from_secs(5),
        }
    }
}

impl SimulationConfig {
    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    pub fn with_max_value(mut self, max_value: Value) -> Self {
        self.max_value = max_value;
        self
    }

    pub fn with_closure_timeout(mut self, closure_timeout: Duration) -> Self {
        self.closure_timeout = closure_timeout;
        self
    }

    pub fn params(&self) -> Result<Params> {
        Params::for_processes(self.processes)
    }
}
