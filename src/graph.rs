use std::collections::{BTreeMap, BTreeSet};

use crate::ProcessId;

/// What one process has learnt about who heard from whom.
///
/// An edge `a -> b` reads "b has heard from a". Two kinds of edges are
/// recorded:
/// - ancestry edges `k -> s` for every process `k` that a stage 2 sender `s`
///   reported hearing from in stage 1,
/// - delivery edges `s -> owner` for every stage 2 sender `s`.
///
/// Nodes and edges are only ever added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeGraph {
    owner: ProcessId,
    nodes: BTreeSet<ProcessId>,
    ancestry: BTreeMap<ProcessId, BTreeSet<ProcessId>>,
    deliveries: BTreeSet<ProcessId>,
}

impl KnowledgeGraph {
    pub fn new(owner: ProcessId) -> Self {
        Self {
            owner,
            nodes: Default::default(),
            ancestry: Default::default(),
            deliveries: Default::default(),
        }
    }

    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Returns true if the node was not known before.
    pub fn add_node(&mut self, id: ProcessId) -> bool {
        self.nodes.insert(id)
    }

    /// Records that `child` heard from `ancestor` during stage 1.
    pub fn add_ancestry(&mut self, ancestor: ProcessId, child: ProcessId) -> bool {
        self.nodes.insert(ancestor);
        self.nodes.insert(child);
        self.ancestry.entry(ancestor).or_default().insert(child)
    }

    /// Records that the owner received a stage 2 message from `sender`.
    pub fn add_delivery(&mut self, sender: ProcessId) -> bool {
        self.nodes.insert(sender);
        self.nodes.insert(self.owner);
        self.deliveries.insert(sender)
    }

    pub fn nodes(&self) -> &BTreeSet<ProcessId> {
        &self.nodes
    }

    pub fn contains(&self, id: ProcessId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ancestry_edges(&self) -> impl Iterator<Item = (ProcessId, ProcessId)> + '_ {
        self.ancestry
            .iter()
            .flat_map(|(from, to)| to.iter().map(move |to| (*from, *to)))
    }

    pub fn delivery_edges(&self) -> impl Iterator<Item = (ProcessId, ProcessId)> + '_ {
        self.deliveries.iter().map(move |from| (*from, self.owner))
    }

    /// Every edge of the graph, both kinds merged.
    pub fn edges(&self) -> BTreeSet<(ProcessId, ProcessId)> {
        self.ancestry_edges().chain(self.delivery_edges()).collect()
    }

    /// True if every node and edge of `self` is also in `other`.
    pub fn is_subgraph_of(&self, other: &KnowledgeGraph) -> bool {
        self.nodes.is_subset(&other.nodes) && self.edges().is_subset(&other.edges())
    }

    /// Processes `id` is known to have heard from in stage 1.
    pub fn ancestors_of(&self, id: ProcessId) -> BTreeSet<ProcessId> {
        self.ancestry
            .iter()
            .filter(|(_, children)| children.contains(&id))
            .map(|(ancestor, _)| *ancestor)
            .collect()
    }

    fn successors(&self, id: ProcessId) -> impl Iterator<Item = ProcessId> + '_ {
        self.ancestry.get(&id).into_iter().flatten().copied()
    }

    /// Strongly connected components of the ancestry relation, in the order
    /// Tarjan's algorithm completes them.
    ///
    /// Delivery edges are left out: every sender has one towards the owner,
    /// so including them would let the owner join cycles its peers cannot see.
    pub fn strongly_connected_components(&self) -> Vec<BTreeSet<ProcessId>> {
        let mut tarjan = Tarjan::new(self);
        for id in self.nodes.iter() {
            if !tarjan.indices.contains_key(id) {
                tarjan.visit(*id);
            }
        }
        tarjan.components
    }
}

struct Tarjan<'a> {
    graph: &'a KnowledgeGraph,
    next_index: usize,
    indices: BTreeMap<ProcessId, usize>,
    lowlinks: BTreeMap<ProcessId, usize>,
    stack: Vec<ProcessId>,
    on_stack: BTreeSet<ProcessId>,
    components: Vec<BTreeSet<ProcessId>>,
}

impl<'a> Tarjan<'a> {
    fn new(graph: &'a KnowledgeGraph) -> Self {
        Self {
            graph,
            next_index: 0,
            indices: Default::default(),
            lowlinks: Default::default(),
            stack: Vec::new(),
            on_stack: Default::default(),
            components: Vec::new(),
        }
    }

    // Recursion depth is bounded by N.
    fn visit(&mut self, v: ProcessId) {
        self.indices.insert(v, self.next_index);
        self.lowlinks.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let graph = self.graph;
        for w in graph.successors(v) {
            if !self.indices.contains_key(&w) {
                self.visit(w);
                let low = self.lowlinks[&v].min(self.lowlinks[&w]);
                self.lowlinks.insert(v, low);
            } else if self.on_stack.contains(&w) {
                let low = self.lowlinks[&v].min(self.indices[&w]);
                self.lowlinks.insert(v, low);
            }
        }

        if self.lowlinks[&v] == self.indices[&v] {
            let mut component = BTreeSet::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(&w);
                component.insert(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
