//! Connected components of the bond graph.
//!
//! Complexes are never stored as the source of truth; they are recomputed by
//! traversal whenever the index needs to know what an agent is attached to.
//! A `Complex` is the sorted list of its agent ids, so two values compare
//! equal exactly when they cover the same agents.

use crate::agent::{BindingState, BondLabel};
use crate::arena::AgentId;
use crate::mixture::{Mixture, MixtureError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A maximal connected set of agents, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Complex(Vec<AgentId>);

impl Complex {
    /// Builds a complex from an arbitrary list of ids, sorting and deduplicating.
    pub fn from_agents(mut agents: Vec<AgentId>) -> Self {
        agents.sort_unstable();
        agents.dedup();
        Self(agents)
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    /// The smallest id, used as a stable representative.
    pub fn first(&self) -> Option<AgentId> {
        self.0.first().copied()
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", id)?;
        }
        f.write_str("}")
    }
}

/// Returns the complex containing `agent`.
///
/// Depth-first over bond edges with an explicit stack and visited set, so
/// cyclic complexes terminate.
pub fn get_complex(mixture: &Mixture, agent: AgentId) -> Result<Complex, MixtureError> {
    if !mixture.contains(agent) {
        return Err(MixtureError::UnknownAgent(agent));
    }
    let mut visited = BTreeSet::from([agent]);
    let mut stack = vec![agent];
    while let Some(current) = stack.pop() {
        for next in mixture.neighbours(current)? {
            if visited.insert(next) {
                stack.push(next);
            }
        }
    }
    Ok(Complex(visited.into_iter().collect()))
}

/// Partitions the whole mixture into complexes, ordered by smallest agent id.
pub fn get_complexes(mixture: &Mixture) -> Result<Vec<Complex>, MixtureError> {
    let mut seen = BTreeSet::new();
    let mut complexes = Vec::new();
    for id in mixture.ids() {
        if seen.contains(&id) {
            continue;
        }
        let complex = get_complex(mixture, id)?;
        seen.extend(complex.agents().iter().copied());
        complexes.push(complex);
    }
    Ok(complexes)
}

/// Renders one complex with its bond labels renumbered from 1 in order of
/// first appearance, so structurally identical complexes render alike.
pub fn render_complex(mixture: &Mixture, complex: &Complex) -> Result<String, MixtureError> {
    let mut relabel = HashMap::new();
    let mut parts = Vec::with_capacity(complex.len());
    for &id in complex.agents() {
        let mut agent = mixture.agent(id).ok_or(MixtureError::UnknownAgent(id))?.clone();
        for site in agent.sites_mut() {
            if let BindingState::Bond(label) = site.binding {
                let next = relabel.len() as u32 + 1;
                let local = *relabel.entry(label).or_insert(next);
                site.binding = BindingState::Bond(BondLabel(local));
            }
        }
        parts.push(agent.to_string());
    }
    Ok(parts.join(","))
}

/// Multiplicity of every distinct rendered complex in the mixture.
pub fn complex_census(mixture: &Mixture) -> Result<BTreeMap<String, usize>, MixtureError> {
    let mut census = BTreeMap::new();
    for complex in get_complexes(mixture)? {
        *census.entry(render_complex(mixture, &complex)?).or_insert(0) += 1;
    }
    Ok(census)
}
