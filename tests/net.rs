use std::collections::{BTreeMap, BTreeSet, VecDeque};

use clique_consensus::transport::Bytes;
use clique_consensus::{
    Broadcaster, KnowledgeGraph, Mailbox, Message, Params, Process, ProcessId, Response, Result,
    Value,
};
use eyre::eyre;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub source: ProcessId,
    pub dest: ProcessId,
    pub msg: Message,
}

/// Deterministic network of sans-IO processes: the test picks which queued
/// packet gets delivered next.
#[derive(Debug)]
pub struct Net {
    pub params: Params,
    pub procs: BTreeMap<ProcessId, Process>,
    pub packets: BTreeMap<ProcessId, VecDeque<Packet>>,
    pub delivered_packets: Vec<Packet>,
    /// Every graph each process went through, oldest first.
    pub history: BTreeMap<ProcessId, Vec<KnowledgeGraph>>,
}

impl Net {
    pub fn with_procs(
        n: usize,
        dead: &BTreeSet<ProcessId>,
        proposals: &BTreeMap<ProcessId, Value>,
    ) -> Result<Self> {
        let params = Params::for_processes(n)?;
        let procs = BTreeMap::from_iter((0..n).filter(|id| !dead.contains(id)).map(|id| {
            let value = proposals.get(&id).copied().unwrap_or_default();
            (id, Process::new(id, params, value))
        }));
        Ok(Self {
            params,
            procs,
            packets: Default::default(),
            delivered_packets: Default::default(),
            history: Default::default(),
        })
    }

    pub fn proc(&self, id: ProcessId) -> Option<&Process> {
        self.procs.get(&id)
    }

    pub fn start(&mut self) {
        let ids = Vec::from_iter(self.procs.keys().copied());
        for id in ids {
            let msgs = self.procs.get_mut(&id).map(Process::start).unwrap_or_default();
            for msg in msgs {
                self.broadcast(id, msg);
            }
            self.record(id);
        }
    }

    pub fn broadcast(&mut self, source: ProcessId, msg: Message) {
        for dest in 0..self.params.n {
            if self.procs.contains_key(&dest) {
                self.packets.entry(dest).or_default().push_back(Packet {
                    source,
                    dest,
                    msg: msg.clone(),
                });
            }
        }
    }

    /// Delivers the packet at `index` (modulo the queue length) of `dest`'s
    /// queue. Returns false if nothing was queued for `dest`.
    pub fn deliver(&mut self, dest: ProcessId, index: usize) -> Result<bool> {
        let packet = match self.packets.get_mut(&dest) {
            Some(queue) if !queue.is_empty() => {
                let index = index % queue.len();
                queue.remove(index)
            }
            _ => None,
        };
        match packet {
            Some(packet) => {
                self.handle(packet)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delivers the oldest packet `source` sent to `dest`.
    pub fn deliver_from(&mut self, dest: ProcessId, source: ProcessId) -> Result<bool> {
        let index = self
            .packets
            .get(&dest)
            .and_then(|queue| queue.iter().position(|p| p.source == source));
        match index {
            Some(index) => self.deliver(dest, index),
            None => Ok(false),
        }
    }

    fn handle(&mut self, packet: Packet) -> Result<()> {
        let dest = packet.dest;
        let proc = match self.procs.get_mut(&dest) {
            Some(proc) => proc,
            None => return Ok(()),
        };
        match proc.handle(packet.msg.clone())? {
            Response::Defer => {
                self.packets.entry(dest).or_default().push_back(packet);
            }
            Response::Broadcast(msg) => {
                self.delivered_packets.push(packet);
                self.broadcast(dest, msg);
            }
            Response::WaitingForMoreMessages | Response::Discarded | Response::Decided(_) => {
                self.delivered_packets.push(packet);
            }
        }
        self.record(dest);
        Ok(())
    }

    fn record(&mut self, id: ProcessId) {
        if let Some(proc) = self.procs.get(&id) {
            self.history
                .entry(id)
                .or_default()
                .push(proc.graph().clone());
        }
    }

    /// Delivers the front packet of every queue in turn until all queues are
    /// empty.
    pub fn drain_queued_packets(&mut self) -> eyre::Result<()> {
        let budget = 100 * self.params.n.pow(3) + 100;
        for _ in 0..budget {
            let dests = Vec::from_iter(
                self.packets
                    .iter()
                    .filter(|(_, queue)| !queue.is_empty())
                    .map(|(dest, _)| *dest),
            );
            if dests.is_empty() {
                return Ok(());
            }
            for dest in dests {
                self.deliver(dest, 0)?;
            }
        }
        Err(eyre!("packets still queued after {} rounds", budget))
    }

    pub fn decisions(&self) -> BTreeMap<ProcessId, Value> {
        self.procs
            .iter()
            .filter_map(|(id, p)| p.decision().map(|d| (*id, d.value)))
            .collect()
    }
}

/// A mailbox replaying a fixed arrival order. Deferred items stay parked
/// until released.
#[derive(Debug, Default)]
pub struct ScriptedMailbox {
    queue: VecDeque<(Bytes, bool)>,
    pub deferrals: usize,
}

impl ScriptedMailbox {
    pub fn new(msgs: &[Message]) -> Self {
        let queue = msgs
            .iter()
            .map(|msg| (msg.to_bytes().expect("Failed to encode message"), false))
            .collect();
        Self {
            queue,
            deferrals: 0,
        }
    }

    pub fn push_raw(&mut self, item: Bytes) {
        self.queue.push_back((item, false));
    }
}

impl Mailbox for ScriptedMailbox {
    fn receive(&mut self) -> Option<Bytes> {
        let pos = self.queue.iter().position(|(_, parked)| !parked)?;
        self.queue.remove(pos).map(|(item, _)| item)
    }

    fn defer(&mut self, item: Bytes) {
        self.deferrals += 1;
        self.queue.push_back((item, true));
    }

    fn release_deferred(&mut self) {
        for (_, parked) in self.queue.iter_mut() {
            *parked = false;
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    pub sent: Vec<Message>,
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&mut self, msg: &Message) -> Result<()> {
        self.sent.push(msg.clone());
        Ok(())
    }
}

pub fn stage2(from: ProcessId, value: Value, known: &[ProcessId]) -> Message {
    Message::Stage2 {
        from,
        value,
        known: known.iter().copied().collect(),
    }
}
