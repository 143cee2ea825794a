//! In-process message passing between the processes of a run.
//!
//! Each live process owns an [`Inbox`]; every process holds an [`Outbox`]
//! that fans a broadcast out to all live inboxes, its own included.
//! Messages travel as bincode encoded bytes so the receiving side decides
//! whether an item is a protocol message at all.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace};

use crate::message::Message;
use crate::{ProcessId, Result};

pub type Bytes = Vec<u8>;

/// Sending side of the transport as seen by one process.
pub trait Broadcaster {
    /// Delivers `msg` to every live process, the sender included.
    fn broadcast(&mut self, msg: &Message) -> Result<()>;
}

/// Receiving side of the transport as seen by one process.
pub trait Mailbox {
    /// Blocks until an item is available. `None` means nothing more is
    /// going to arrive.
    fn receive(&mut self) -> Option<Bytes>;

    /// Puts an item back at the end of the mailbox. It is not offered again
    /// before something new arrives or [`Mailbox::release_deferred`] is called.
    fn defer(&mut self, item: Bytes);

    /// Makes every deferred item available again.
    fn release_deferred(&mut self);
}

/// The channels of a run, owned by whoever sets the run up.
pub struct Network {
    n: usize,
    senders: Arc<BTreeMap<ProcessId, Sender<Bytes>>>,
    receivers: BTreeMap<ProcessId, Receiver<Bytes>>,
}

impl Network {
    /// Creates an inbox for every process in `live`. Broadcasts towards the
    /// other processes of `0..n` are dropped.
    pub fn new(n: usize, live: &BTreeSet<ProcessId>) -> Self {
        let mut senders = BTreeMap::new();
        let mut receivers = BTreeMap::new();
        for id in live.iter().copied().filter(|id| *id < n) {
            let (tx, rx) = channel::unbounded();
            senders.insert(id, tx);
            receivers.insert(id, rx);
        }
        Self {
            n,
            senders: Arc::new(senders),
            receivers,
        }
    }

    pub fn live(&self) -> BTreeSet<ProcessId> {
        self.senders.keys().copied().collect()
    }

    /// Hands out the inbox of `id`, once.
    pub fn take_inbox(&mut self, id: ProcessId, patience: Duration) -> Option<Inbox> {
        self.receivers
            .remove(&id)
            .map(|rx| Inbox::new(id, rx, patience))
    }

    pub fn outbox(&self, from: ProcessId) -> Outbox {
        Outbox {
            from,
            n: self.n,
            senders: Arc::clone(&self.senders),
            sent: Vec::new(),
        }
    }

    /// Pushes a raw item into the inbox of `dest`. Returns false if `dest`
    /// has no inbox or it was dropped.
    pub fn inject(&self, dest: ProcessId, item: Bytes) -> bool {
        self.senders
            .get(&dest)
            .map(|tx| tx.send(item).is_ok())
            .unwrap_or(false)
    }
}

/// Broadcasting handle of one process.
pub struct Outbox {
    from: ProcessId,
    n: usize,
    senders: Arc<BTreeMap<ProcessId, Sender<Bytes>>>,
    sent: Vec<(ProcessId, Message)>,
}

impl Outbox {
    /// Every (destination, message) pair that reached a live inbox.
    pub fn sent(&self) -> &[(ProcessId, Message)] {
        &self.sent
    }
}

impl Broadcaster for Outbox {
    fn broadcast(&mut self, msg: &Message) -> Result<()> {
        let bytes = msg.to_bytes()?;
        for dest in 0..self.n {
            match self.senders.get(&dest) {
                Some(tx) => {
                    // A closed inbox belongs to a process that already
                    // finished; there is nobody left to deliver to.
                    if tx.send(bytes.clone()).is_ok() {
                        self.sent.push((dest, msg.clone()));
                    } else {
                        trace!("[P{}] p{} has stopped listening", self.from, dest);
                    }
                }
                None => trace!("[P{}] dropping {:?} for dead p{}", self.from, msg, dest),
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Queued {
    item: Bytes,
    // number of arrivals seen when the item was deferred
    deferred_at: Option<u64>,
}

/// The inbox of one live process.
pub struct Inbox {
    id: ProcessId,
    rx: Receiver<Bytes>,
    queue: VecDeque<Queued>,
    arrivals: u64,
    patience: Duration,
}

impl Inbox {
    pub fn new(id: ProcessId, rx: Receiver<Bytes>, patience: Duration) -> Self {
        Self {
            id,
            rx,
            queue: VecDeque::new(),
            arrivals: 0,
            patience,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len() + self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push_arrival(&mut self, item: Bytes) {
        self.arrivals += 1;
        self.queue.push_back(Queued {
            item,
            deferred_at: None,
        });
    }

    fn is_ready(&self, queued: &Queued) -> bool {
        queued.deferred_at.map_or(true, |at| at < self.arrivals)
    }
}

impl Mailbox for Inbox {
    fn receive(&mut self) -> Option<Bytes> {
        loop {
            while let Ok(item) = self.rx.try_recv() {
                self.push_arrival(item);
            }

            if let Some(pos) = self.queue.iter().position(|q| self.is_ready(q)) {
                return self.queue.remove(pos).map(|q| q.item);
            }

            match self.rx.recv_timeout(self.patience) {
                Ok(item) => self.push_arrival(item),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(
                        "[P{}] nothing arrived for {:?} ({} deferred)",
                        self.id,
                        self.patience,
                        self.queue.len()
                    );
                    return None;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("[P{}] every sender is gone", self.id);
                    return None;
                }
            }
        }
    }

    fn defer(&mut self, item: Bytes) {
        self.queue.push_back(Queued {
            item,
            deferred_at: Some(self.arrivals),
        });
    }

    fn release_deferred(&mut self) {
        for queued in self.queue.iter_mut() {
            queued.deferred_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn network(n: usize, live: &[ProcessId]) -> Network {
        Network::new(n, &live.iter().copied().collect())
    }

    #[test]
    fn test_broadcast_reaches_every_live_inbox_once() -> Result<()> {
        let mut net = network(4, &[0, 1, 3]);
        let mut outbox = net.outbox(1);
        outbox.broadcast(&Message::Stage1 { from: 1 })?;

        let dests = Vec::from_iter(outbox.sent().iter().map(|(dest, _)| *dest));
        assert_eq!(dests, vec![0, 1, 3]);

        for id in [0, 1, 3] {
            let inbox = net.take_inbox(id, Duration::from_millis(10)).unwrap();
            assert_eq!(inbox.len(), 1);
        }
        assert!(net.take_inbox(2, Duration::from_millis(10)).is_none());
        Ok(())
    }

    #[test]
    fn test_deferred_item_waits_for_a_new_arrival() {
        let mut net = network(2, &[0, 1]);
        let mut inbox = net.take_inbox(0, Duration::from_millis(50)).unwrap();

        assert!(net.inject(0, vec![1]));
        let first = inbox.receive().unwrap();
        inbox.defer(first);

        // Only the deferred item is queued: receive blocks, then gives up.
        let started = Instant::now();
        assert_eq!(inbox.receive(), None);
        assert!(started.elapsed() >= Duration::from_millis(50));

        // A new arrival makes the deferred item eligible again, ahead of it.
        assert!(net.inject(0, vec![2]));
        assert_eq!(inbox.receive(), Some(vec![1]));
        assert_eq!(inbox.receive(), Some(vec![2]));
    }

    #[test]
    fn test_released_items_come_back_in_order() {
        let mut net = network(1, &[0]);
        let mut inbox = net.take_inbox(0, Duration::from_millis(20)).unwrap();
        for b in 0..3u8 {
            net.inject(0, vec![b]);
        }
        let a = inbox.receive().unwrap();
        let b = inbox.receive().unwrap();
        inbox.defer(a);
        inbox.defer(b);

        assert_eq!(inbox.receive(), Some(vec![2]));
        inbox.release_deferred();
        assert_eq!(inbox.receive(), Some(vec![0]));
        assert_eq!(inbox.receive(), Some(vec![1]));
        assert_eq!(inbox.receive(), None);
    }
}
