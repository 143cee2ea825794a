use std::collections::BTreeSet;

use log::{debug, info};

use crate::config::Params;
use crate::decision::{decide, Decision};
use crate::graph::KnowledgeGraph;
use crate::message::Message;
use crate::{ProcessId, ProposalMap, Result, Value};

/// Protocol stages, in the only order a process goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    Stage1Collect,
    Stage2Collect,
    Decided,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    WaitingForMoreMessages,
    /// The message belongs to a later stage, it has to be handled again once
    /// we get there.
    Defer,
    /// The message belongs to a stage we already left.
    Discarded,
    /// Stage 1 closed, the stage 2 message must go out to everyone.
    Broadcast(Message),
    Decided(Decision),
}

/// The protocol state of a single process.
///
/// `Process` performs no IO: outgoing messages are handed back to the caller
/// and inbound ones are fed through [`Process::handle`].
#[derive(Debug, Clone)]
pub struct Process {
    id: ProcessId,
    params: Params,
    value: Value,
    stage: Stage,
    graph: KnowledgeGraph,
    proposals: ProposalMap,
    received_from: BTreeSet<ProcessId>,
    decision: Option<Decision>,
}

impl Process {
    pub fn new(id: ProcessId, params: Params, value: Value) -> Self {
        Self {
            id,
            params,
            value,
            stage: Stage::Init,
            graph: KnowledgeGraph::new(id),
            proposals: Default::default(),
            received_from: Default::default(),
            decision: None,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn value(&self) -> Value {
        self.value
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn proposals(&self) -> &ProposalMap {
        &self.proposals
    }

    pub fn received_from(&self) -> &BTreeSet<ProcessId> {
        &self.received_from
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    /// Leaves `Init` and returns the messages to broadcast: our stage 1
    /// announcement, followed by our stage 2 message if we alone already
    /// make up L.
    pub fn start(&mut self) -> Vec<Message> {
        if self.stage != Stage::Init {
            return Vec::new();
        }
        self.stage = Stage::Stage1Collect;
        self.graph.add_node(self.id);
        info!("[P{}] proposing {}, entering stage 1", self.id, self.value);

        let mut msgs = vec![Message::Stage1 { from: self.id }];
        msgs.extend(self.try_close_stage1());
        msgs
    }

    pub fn handle(&mut self, msg: Message) -> Result<Response> {
        msg.validate(&self.params)?;

        let resp = match (self.stage, msg) {
            (Stage::Init, _) | (Stage::Stage1Collect, Message::Stage2 { .. }) => Response::Defer,
            (Stage::Stage1Collect, Message::Stage1 { from }) => {
                if self.graph.add_node(from) {
                    debug!(
                        "[P{}] p{} is alive ({}/{})",
                        self.id,
                        from,
                        self.graph.len(),
                        self.params.l
                    );
                }
                match self.try_close_stage1() {
                    Some(stage2) => Response::Broadcast(stage2),
                    None => Response::WaitingForMoreMessages,
                }
            }
            (Stage::Stage2Collect, Message::Stage1 { .. }) | (Stage::Decided, _) => {
                Response::Discarded
            }
            (Stage::Stage2Collect, Message::Stage2 { from, value, known }) => {
                self.proposals.insert(from, value);
                self.graph.add_delivery(from);
                for k in known {
                    self.graph.add_ancestry(k, from);
                }
                self.received_from.insert(from);

                // The node set may have grown, so closure is checked against
                // the graph as it is now.
                if self.stage2_closed() {
                    Response::Decided(self.decide()?)
                } else {
                    debug!(
                        "[P{}] waiting on stage 2 from {:?}",
                        self.id,
                        self.awaiting_stage2()
                    );
                    Response::WaitingForMoreMessages
                }
            }
        };
        Ok(resp)
    }

    /// Processes we know of but have no stage 2 message from yet.
    pub fn awaiting_stage2(&self) -> BTreeSet<ProcessId> {
        self.graph
            .nodes()
            .difference(&self.received_from)
            .copied()
            .collect()
    }

    /// How far the current stage is from its exit condition, as
    /// (accounted for, required).
    pub fn progress(&self) -> (usize, usize) {
        match self.stage {
            Stage::Init => (0, self.params.l),
            Stage::Stage1Collect => (self.graph.len(), self.params.l),
            Stage::Stage2Collect | Stage::Decided => {
                (self.received_from.len(), self.graph.len())
            }
        }
    }

    fn stage2_closed(&self) -> bool {
        &self.received_from == self.graph.nodes()
    }

    fn try_close_stage1(&mut self) -> Option<Message> {
        if self.stage != Stage::Stage1Collect || self.graph.len() < self.params.l {
            return None;
        }
        self.stage = Stage::Stage2Collect;
        let known = self.graph.nodes().clone();
        info!("[P{}] heard from {:?}, entering stage 2", self.id, known);
        Some(Message::Stage2 {
            from: self.id,
            value: self.value,
            known,
        })
    }

    fn decide(&mut self) -> Result<Decision> {
        let decision = decide(&self.graph, &self.proposals, (self.id, self.value))?;
        info!(
            "[P{}] decided {} with initial clique {:?}",
            self.id, decision.value, decision.clique
        );
        self.stage = Stage::Decided;
        self.decision = Some(decision.clone());
        Ok(decision)
    }
}
