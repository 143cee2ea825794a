use std::collections::BTreeSet;

use crate::graph::KnowledgeGraph;
use crate::{Error, ProcessId, ProposalMap, Result, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub value: Value,
    pub clique: BTreeSet<ProcessId>,
}

/// The largest strongly connected component of the graph. Among components
/// of equal size the one holding the lowest process id wins.
pub fn initial_clique(graph: &KnowledgeGraph) -> BTreeSet<ProcessId> {
    graph
        .strongly_connected_components()
        .into_iter()
        .max_by(|a, b| {
            a.len()
                .cmp(&b.len())
                // components are disjoint, so their minimums never tie
                .then_with(|| b.iter().next().cmp(&a.iter().next()))
        })
        .unwrap_or_default()
}

/// Decides on the minimum proposal of the initial clique.
///
/// `own` is the deciding process and its proposal; it counts as a clique
/// proposal when the process is a member of the clique, even if its own
/// stage 2 message is not in `proposals`.
pub fn decide(
    graph: &KnowledgeGraph,
    proposals: &ProposalMap,
    own: (ProcessId, Value),
) -> Result<Decision> {
    let clique = initial_clique(graph);
    let (own_id, own_value) = own;

    let proposal_of = |id: &ProcessId| {
        proposals
            .get(id)
            .copied()
            .or_else(|| (*id == own_id).then(|| own_value))
    };

    let missing = BTreeSet::from_iter(
        clique
            .iter()
            .filter(|id| proposal_of(*id).is_none())
            .copied(),
    );
    if clique.is_empty() || !missing.is_empty() {
        return Err(Error::EmptyDecisionSet { clique, missing });
    }

    let value = clique
        .iter()
        .filter_map(proposal_of)
        .min()
        .ok_or_else(|| Error::EmptyDecisionSet {
            clique: clique.clone(),
            missing: BTreeSet::new(),
        })?;

    Ok(Decision { value, clique })
}
