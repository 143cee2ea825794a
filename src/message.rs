use std::collections::BTreeSet;

use core::fmt::Debug;
use serde::{Deserialize, Serialize};

use crate::config::Params;
use crate::{Error, ProcessId, Result, Value};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Liveness announcement.
    Stage1 { from: ProcessId },
    /// The sender's proposal and the processes it heard from in stage 1.
    Stage2 {
        from: ProcessId,
        value: Value,
        known: BTreeSet<ProcessId>,
    },
}

impl Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Stage1 { from } => write!(f, "Stage1(p{})", from),
            Message::Stage2 { from, value, known } => {
                write!(f, "Stage2(p{}, {}, {:?})", from, value, known)
            }
        }
    }
}

impl Message {
    pub fn sender(&self) -> ProcessId {
        match self {
            Message::Stage1 { from } | Message::Stage2 { from, .. } => *from,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes an inbound item, rejecting anything that is not one of the two
    /// message kinds or that names a process outside the run.
    pub fn from_bytes(bytes: &[u8], params: &Params) -> Result<Self> {
        let msg: Message =
            bincode::deserialize(bytes).map_err(|err| Error::ProtocolViolation {
                reason: format!("undecodable item of {} bytes: {}", bytes.len(), err),
            })?;
        msg.validate(params)?;
        Ok(msg)
    }

    pub fn validate(&self, params: &Params) -> Result<()> {
        let unknown = match self {
            Message::Stage1 { from } => (!params.contains(*from)).then(|| *from),
            Message::Stage2 { from, known, .. } => std::iter::once(from)
                .chain(known.iter())
                .find(|id| !params.contains(**id))
                .copied(),
        };
        match unknown {
            Some(id) => Err(Error::ProtocolViolation {
                reason: format!("{:?} names p{} but the run has {} processes", self, id, params.n),
            }),
            None => Ok(()),
        }
    }
}
