//! Agents, sites and expressions: the value types every other module speaks.
//!
//! An `Agent` is a named node with an ordered interface of `Site`s. A site
//! carries an optional internal state and a `BindingState`. The same types
//! describe concrete mixture agents and pattern agents; only patterns may use
//! the `Bound` ("-") and `Any` ("?") wildcards.
//!
//! `Display` renders the exact text notation (`A(a~u!1,b)`), see
//! [`crate::notation`] for the parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Integer bond label shared by exactly two bonded sites.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BondLabel(pub u32);

impl fmt::Display for BondLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binding state of a site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingState {
    /// No bond (`""`).
    #[default]
    Free,
    /// Bonded through the given label (`!n`).
    Bond(BondLabel),
    /// Pattern only: bonded to something, partner unspecified (`!-`).
    Bound,
    /// Pattern only: bonded or not (`!?`).
    Any,
}

impl BindingState {
    /// Returns the bond label, if this is a labelled bond.
    pub fn label(&self) -> Option<BondLabel> {
        match self {
            BindingState::Bond(label) => Some(*label),
            _ => None,
        }
    }

    /// Returns `true` for `!-` and `!?`.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, BindingState::Bound | BindingState::Any)
    }

    pub fn is_free(&self) -> bool {
        matches!(self, BindingState::Free)
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingState::Free => Ok(()),
            BindingState::Bond(label) => write!(f, "!{}", label),
            BindingState::Bound => write!(f, "!-"),
            BindingState::Any => write!(f, "!?"),
        }
    }
}

/// An agent attachment point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    /// `None` is unset on a concrete agent and unconstrained in a pattern.
    pub internal_state: Option<String>,
    pub binding: BindingState,
}

impl Site {
    /// A free site with no internal state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            internal_state: None,
            binding: BindingState::Free,
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.internal_state = Some(state.into());
        self
    }

    pub fn with_binding(mut self, binding: BindingState) -> Self {
        self.binding = binding;
        self
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(state) = &self.internal_state {
            write!(f, "~{}", state)?;
        }
        write!(f, "{}", self.binding)
    }
}

/// Errors raised while assembling agents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Agent or site name is empty.
    #[error("empty name in agent `{0}`")]
    EmptyName(String),
    /// Two sites of one agent share a name.
    #[error("agent `{agent}` declares site `{site}` twice")]
    DuplicateSite { agent: String, site: String },
}

/// A named node with an ordered site interface.
///
/// # Invariant
/// Site names are unique within one agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Agent {
    name: String,
    sites: Vec<Site>,
}

impl Agent {
    /// Creates an agent, rejecting empty names and duplicate site names.
    pub fn new(name: impl Into<String>, sites: Vec<Site>) -> Result<Self, AgentError> {
        let name = name.into();
        if name.is_empty() {
            return Err(AgentError::EmptyName(name));
        }
        for (i, site) in sites.iter().enumerate() {
            if site.name.is_empty() {
                return Err(AgentError::EmptyName(name));
            }
            if sites[..i].iter().any(|s| s.name == site.name) {
                return Err(AgentError::DuplicateSite {
                    agent: name,
                    site: site.name.clone(),
                });
            }
        }
        Ok(Self { name, sites })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Mutable access to sites. Names stay fixed, so the invariant holds.
    pub(crate) fn sites_mut(&mut self) -> impl Iterator<Item = &mut Site> {
        self.sites.iter_mut()
    }

    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn site_index(&self, name: &str) -> Option<usize> {
        self.sites.iter().position(|s| s.name == name)
    }

    pub(crate) fn site_at_mut(&mut self, index: usize) -> Option<&mut Site> {
        self.sites.get_mut(index)
    }

    /// Returns `true` if any site uses a pattern-only wildcard.
    pub fn has_wildcards(&self) -> bool {
        self.sites.iter().any(|s| s.binding.is_wildcard())
    }

    /// A copy of this agent with every site free.
    pub fn unbound(&self) -> Agent {
        let mut copy = self.clone();
        for site in copy.sites_mut() {
            site.binding = BindingState::Free;
        }
        copy
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.sites.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (i, site) in self.sites.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", site)?;
        }
        f.write_str(")")
    }
}

/// An ordered list of agents, such as one side of a rule or a mixture literal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    agents: Vec<Agent>,
}

impl Expression {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self { agents }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn into_agents(self) -> Vec<Agent> {
        self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Every site carrying `label`, as `(agent index, site index)`.
    pub fn label_sites(&self) -> BTreeMap<BondLabel, Vec<(usize, usize)>> {
        let mut sites: BTreeMap<BondLabel, Vec<(usize, usize)>> = BTreeMap::new();
        for (a, agent) in self.agents.iter().enumerate() {
            for (s, site) in agent.sites().iter().enumerate() {
                if let Some(label) = site.binding.label() {
                    sites.entry(label).or_default().push((a, s));
                }
            }
        }
        sites
    }

    /// Partitions agent indices into connected components of the bond relation.
    ///
    /// Components are ordered by their smallest agent index; indices inside a
    /// component are ascending.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.agents.len()];
        for ends in self.label_sites().values() {
            for pair in ends.windows(2) {
                adjacency[pair[0].0].push(pair[1].0);
                adjacency[pair[1].0].push(pair[0].0);
            }
        }
        let mut seen = vec![false; self.agents.len()];
        let mut components = Vec::new();
        for start in 0..self.agents.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut component = Vec::new();
            while let Some(a) = stack.pop() {
                component.push(a);
                for &b in &adjacency[a] {
                    if !seen[b] {
                        seen[b] = true;
                        stack.push(b);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, agent) in self.agents.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", agent)?;
        }
        Ok(())
    }
}

impl FromIterator<Agent> for Expression {
    fn from_iter<I: IntoIterator<Item = Agent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
