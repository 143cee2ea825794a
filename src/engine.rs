use log::{debug, warn};
use thiserror::Error;

use crate::decision::Decision;
use crate::graph::KnowledgeGraph;
use crate::message::Message;
use crate::process::{Process, Response, Stage};
use crate::transport::{Broadcaster, Mailbox};
use crate::{Error, ProcessId, ProposalMap, Result, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Sent(Message),
    /// Handled in the stage it belongs to.
    Received(Message),
    Deferred(Message),
    Discarded(Message),
}

/// What one process sent and what became of everything it received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub events: Vec<Event>,
}

impl Trace {
    fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn sent(&self) -> impl Iterator<Item = &Message> {
        self.events.iter().filter_map(|e| match e {
            Event::Sent(msg) => Some(msg),
            _ => None,
        })
    }

    pub fn received(&self) -> impl Iterator<Item = &Message> {
        self.events.iter().filter_map(|e| match e {
            Event::Received(msg) => Some(msg),
            _ => None,
        })
    }

    pub fn deferred(&self) -> impl Iterator<Item = &Message> {
        self.events.iter().filter_map(|e| match e {
            Event::Deferred(msg) => Some(msg),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub id: ProcessId,
    pub proposal: Value,
    pub decision: Decision,
    pub graph: KnowledgeGraph,
    pub proposals: ProposalMap,
    pub trace: Trace,
}

/// A process that stopped without deciding, with what it knew at that point.
#[derive(Error, Debug)]
#[error("[P{id}] failed during {stage:?}: {error}")]
pub struct Failure {
    pub id: ProcessId,
    pub stage: Stage,
    #[source]
    pub error: Error,
    pub graph: KnowledgeGraph,
    pub trace: Trace,
}

/// Runs one [`Process`] to its decision over a mailbox and a broadcaster.
pub struct Engine<M: Mailbox, B: Broadcaster> {
    process: Process,
    mailbox: M,
    outbox: B,
    trace: Trace,
}

impl<M: Mailbox, B: Broadcaster> Engine<M, B> {
    pub fn new(process: Process, mailbox: M, outbox: B) -> Self {
        Self {
            process,
            mailbox,
            outbox,
            trace: Trace::default(),
        }
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn run(mut self) -> std::result::Result<Outcome, Failure> {
        match self.drive() {
            Ok(decision) => Ok(Outcome {
                id: self.process.id(),
                proposal: self.process.value(),
                decision,
                graph: self.process.graph().clone(),
                proposals: self.process.proposals().clone(),
                trace: self.trace,
            }),
            Err(error) => {
                warn!(
                    "[P{}] giving up in {:?}: {} (graph: {:?})",
                    self.process.id(),
                    self.process.stage(),
                    error,
                    self.process.graph()
                );
                Err(Failure {
                    id: self.process.id(),
                    stage: self.process.stage(),
                    error,
                    graph: self.process.graph().clone(),
                    trace: self.trace,
                })
            }
        }
    }

    fn drive(&mut self) -> Result<Decision> {
        for msg in self.process.start() {
            self.broadcast(msg)?;
        }

        loop {
            let item = match self.mailbox.receive() {
                Some(item) => item,
                None => {
                    let (known, required) = self.process.progress();
                    return Err(Error::ClosureNeverReached {
                        stage: self.process.stage(),
                        known,
                        required,
                    });
                }
            };
            let msg = Message::from_bytes(&item, self.process.params())?;
            debug!("[P{}] received {:?}", self.process.id(), msg);

            match self.process.handle(msg.clone())? {
                Response::WaitingForMoreMessages => self.trace.push(Event::Received(msg)),
                Response::Defer => {
                    self.trace.push(Event::Deferred(msg));
                    self.mailbox.defer(item);
                }
                Response::Discarded => self.trace.push(Event::Discarded(msg)),
                Response::Broadcast(stage2) => {
                    self.trace.push(Event::Received(msg));
                    self.broadcast(stage2)?;
                    self.mailbox.release_deferred();
                }
                Response::Decided(decision) => {
                    self.trace.push(Event::Received(msg));
                    return Ok(decision);
                }
            }
        }
    }

    fn broadcast(&mut self, msg: Message) -> Result<()> {
        debug!("[P{}] broadcasting {:?}", self.process.id(), msg);
        self.outbox.broadcast(&msg)?;
        self.trace.push(Event::Sent(msg));
        Ok(())
    }
}
