//! The live agent graph: agents in a slot arena plus a bond map.
//!
//! `Mixture` owns every concrete agent of a simulation and keeps, for each
//! bond label in use, the two sites it joins. All edits go through the
//! operations here so the bond map and the agents' site bindings never
//! disagree.
//!
//! # Invariant
//! Outside of a pending [`Mixture::create`] sequence, every bond label in use
//! appears in exactly two sites. Labels are never reused within one mixture:
//! the next fresh label is always one past the largest label ever seen.
//!
//! # Determinism
//! Agents render in id order; the bond map is a `BTreeMap`.

use crate::agent::{Agent, AgentError, BindingState, BondLabel, Expression};
use crate::arena::{AgentArena, AgentId};
use crate::fingerprint::HashValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised by mixture edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixtureError {
    /// No live agent with this id.
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),
    /// The agent has no site of this name.
    #[error("agent {agent} has no site `{site}`")]
    UnknownSite { agent: AgentId, site: String },
    /// A bond label would not appear in exactly two sites.
    #[error("invalid bond label {0}")]
    InvalidBond(BondLabel),
    /// Bind on a site that already carries a bond.
    #[error("site `{site}` of agent {agent} is already bound")]
    SiteOccupied { agent: AgentId, site: String },
    /// Unbind on a site that carries no bond.
    #[error("site `{site}` of agent {agent} is free")]
    SiteFree { agent: AgentId, site: String },
    /// A site cannot be bound to itself.
    #[error("site `{site}` of agent {agent} cannot bind to itself")]
    SelfBond { agent: AgentId, site: String },
    /// Pattern wildcards are not allowed on concrete agents.
    #[error("agent `{0}` uses a pattern wildcard")]
    Wildcard(String),
    /// Every bond label above the highest one in use has been handed out.
    #[error("no fresh bond label left")]
    LabelsExhausted,
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// A site of a live agent, addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SiteRef {
    pub agent: AgentId,
    pub site: String,
}

impl SiteRef {
    pub fn new(agent: AgentId, site: impl Into<String>) -> Self {
        Self {
            agent,
            site: site.into(),
        }
    }
}

/// A site addressed by position, as stored in the bond map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Endpoint {
    agent: AgentId,
    site: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BondEnds {
    /// One endpoint registered, the other pending.
    Dangling(Endpoint),
    Paired(Endpoint, Endpoint),
}

/// The mutable agent/bond population.
#[derive(Debug, Clone)]
pub struct Mixture {
    agents: AgentArena<Agent>,
    bonds: BTreeMap<BondLabel, BondEnds>,
    /// Wider than [`BondLabel`] so that one past `u32::MAX` is representable.
    next_label: u64,
}

impl Mixture {
    /// Creates an empty mixture.
    pub fn new() -> Self {
        Self {
            agents: AgentArena::new(),
            bonds: BTreeMap::new(),
            next_label: 1,
        }
    }

    /// Builds a mixture from a literal, keeping its bond labels as written.
    ///
    /// Every label must appear exactly twice and no wildcard may be used.
    pub fn from_expression(expr: &Expression) -> Result<Self, MixtureError> {
        let mut mixture = Self::new();
        mixture.insert_batch(expr.agents().to_vec(), false)?;
        Ok(mixture)
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.agents.live_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of bonds, pending ones included.
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains(id)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Live agents in id order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> + '_ {
        self.agents.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.ids()
    }

    /// Inserts one agent, registering the bond labels it carries.
    ///
    /// A label not yet in use is left pending until a later `create` supplies
    /// its second endpoint; a pending label is completed. A label already used
    /// twice fails with [`MixtureError::InvalidBond`]. Use
    /// [`Mixture::check_bonds`] to confirm nothing is left pending, or
    /// [`Mixture::create_all`] to insert a self-contained batch.
    pub fn create(&mut self, template: Agent) -> Result<AgentId, MixtureError> {
        if template.has_wildcards() {
            return Err(MixtureError::Wildcard(template.to_string()));
        }
        let mut local: BTreeMap<BondLabel, usize> = BTreeMap::new();
        for site in template.sites() {
            if let Some(label) = site.binding.label() {
                *local.entry(label).or_default() += 1;
            }
        }
        for (&label, &count) in &local {
            let room = match self.bonds.get(&label) {
                None => 2,
                Some(BondEnds::Dangling(_)) => 1,
                Some(BondEnds::Paired(..)) => 0,
            };
            if count > room {
                return Err(MixtureError::InvalidBond(label));
            }
        }

        let labels: Vec<(usize, BondLabel)> = template
            .sites()
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.binding.label().map(|l| (i, l)))
            .collect();
        let id = self.agents.allocate(template);
        for (site, label) in labels {
            let end = Endpoint { agent: id, site };
            let ends = match self.bonds.remove(&label) {
                None => BondEnds::Dangling(end),
                Some(BondEnds::Dangling(first)) => BondEnds::Paired(first, end),
                Some(BondEnds::Paired(..)) => return Err(MixtureError::InvalidBond(label)),
            };
            self.bonds.insert(label, ends);
            self.next_label = self.next_label.max(u64::from(label.0) + 1);
        }
        Ok(id)
    }

    /// Inserts a self-contained batch of agents.
    ///
    /// Batch-local bond labels are remapped to fresh mixture labels, so the
    /// same literal can be inserted any number of times. Each batch label must
    /// appear exactly twice; nothing is inserted otherwise.
    pub fn create_all(&mut self, templates: Vec<Agent>) -> Result<Vec<AgentId>, MixtureError> {
        self.insert_batch(templates, true)
    }

    fn insert_batch(&mut self, mut templates: Vec<Agent>, relabel: bool) -> Result<Vec<AgentId>, MixtureError> {
        let mut counts: BTreeMap<BondLabel, usize> = BTreeMap::new();
        for agent in &templates {
            if agent.has_wildcards() {
                return Err(MixtureError::Wildcard(agent.to_string()));
            }
            for site in agent.sites() {
                if let Some(label) = site.binding.label() {
                    *counts.entry(label).or_default() += 1;
                }
            }
        }
        for (&label, &count) in &counts {
            if count != 2 || (!relabel && self.bonds.contains_key(&label)) {
                return Err(MixtureError::InvalidBond(label));
            }
        }

        if relabel {
            let mut mapping: BTreeMap<BondLabel, BondLabel> = BTreeMap::new();
            for &old in counts.keys() {
                mapping.insert(old, self.fresh_label()?);
            }
            for agent in &mut templates {
                for site in agent.sites_mut() {
                    if let BindingState::Bond(label) = site.binding {
                        site.binding = BindingState::Bond(mapping[&label]);
                    }
                }
            }
        }

        templates.into_iter().map(|agent| self.create(agent)).collect()
    }

    /// Removes an agent, first severing every bond incident on it.
    ///
    /// Returns the removed agent and the partner sites that became free.
    pub fn destroy(&mut self, id: AgentId) -> Result<(Agent, Vec<SiteRef>), MixtureError> {
        let labels: Vec<BondLabel> = self
            .agents
            .get(id)
            .ok_or(MixtureError::UnknownAgent(id))?
            .sites()
            .iter()
            .filter_map(|s| s.binding.label())
            .collect();

        let mut freed = Vec::new();
        for label in labels {
            let partner = match self.bonds.remove(&label) {
                Some(BondEnds::Paired(x, y)) => {
                    if x.agent == id {
                        y
                    } else {
                        x
                    }
                }
                // Pending label, or the second end of an intra-agent bond.
                _ => continue,
            };
            if partner.agent == id {
                continue;
            }
            if let Some(agent) = self.agents.get_mut(partner.agent) {
                if let Some(site) = agent.site_at_mut(partner.site) {
                    site.binding = BindingState::Free;
                    freed.push(SiteRef::new(partner.agent, site.name.clone()));
                }
            }
        }

        let agent = self
            .agents
            .deallocate(id)
            .ok_or(MixtureError::UnknownAgent(id))?;
        Ok((agent, freed))
    }

    /// Bonds two free sites with a fresh label.
    pub fn bind(
        &mut self,
        first: AgentId,
        first_site: &str,
        second: AgentId,
        second_site: &str,
    ) -> Result<BondLabel, MixtureError> {
        let a = self.endpoint(first, first_site)?;
        let b = self.endpoint(second, second_site)?;
        if a == b {
            return Err(MixtureError::SelfBond {
                agent: first,
                site: first_site.to_owned(),
            });
        }
        for (end, name) in [(a, first_site), (b, second_site)] {
            if !self.binding_at(end)?.is_free() {
                return Err(MixtureError::SiteOccupied {
                    agent: end.agent,
                    site: name.to_owned(),
                });
            }
        }

        let label = self.fresh_label()?;
        self.set_binding(a, BindingState::Bond(label))?;
        self.set_binding(b, BindingState::Bond(label))?;
        self.bonds.insert(label, BondEnds::Paired(a, b));
        Ok(label)
    }

    fn fresh_label(&mut self) -> Result<BondLabel, MixtureError> {
        let label = u32::try_from(self.next_label).map_err(|_| MixtureError::LabelsExhausted)?;
        self.next_label += 1;
        Ok(BondLabel(label))
    }

    /// Clears the bond on `site`, returning the partner site it was joined to.
    pub fn unbind(&mut self, agent: AgentId, site: &str) -> Result<SiteRef, MixtureError> {
        let end = self.endpoint(agent, site)?;
        let label = self.binding_at(end)?.label().ok_or_else(|| MixtureError::SiteFree {
            agent,
            site: site.to_owned(),
        })?;
        let partner = match self.bonds.get(&label) {
            Some(BondEnds::Paired(x, y)) => {
                if *x == end {
                    *y
                } else {
                    *x
                }
            }
            _ => return Err(MixtureError::InvalidBond(label)),
        };
        self.bonds.remove(&label);
        self.set_binding(end, BindingState::Free)?;
        self.set_binding(partner, BindingState::Free)?;
        Ok(SiteRef::new(partner.agent, self.site_name(partner)?))
    }

    /// Returns the site bonded to `site`, or `None` when it is free.
    pub fn binding_partner(&self, agent: AgentId, site: &str) -> Result<Option<SiteRef>, MixtureError> {
        let end = self.endpoint(agent, site)?;
        let Some(label) = self.binding_at(end)?.label() else {
            return Ok(None);
        };
        let partner = match self.bonds.get(&label) {
            Some(BondEnds::Paired(x, y)) => {
                if *x == end {
                    *y
                } else {
                    *x
                }
            }
            _ => return Err(MixtureError::InvalidBond(label)),
        };
        Ok(Some(SiteRef::new(partner.agent, self.site_name(partner)?)))
    }

    /// Sets (or clears) the internal state of a site.
    pub fn modify_internal_state(
        &mut self,
        agent: AgentId,
        site: &str,
        state: Option<String>,
    ) -> Result<(), MixtureError> {
        let end = self.endpoint(agent, site)?;
        let slot = self
            .agents
            .get_mut(end.agent)
            .and_then(|a| a.site_at_mut(end.site))
            .ok_or_else(|| MixtureError::UnknownSite {
                agent,
                site: site.to_owned(),
            })?;
        slot.internal_state = state;
        Ok(())
    }

    /// Agents bonded to `id`, in site order, without `id` itself.
    pub fn neighbours(&self, id: AgentId) -> Result<Vec<AgentId>, MixtureError> {
        let agent = self.agents.get(id).ok_or(MixtureError::UnknownAgent(id))?;
        let mut out = Vec::new();
        for site in agent.sites() {
            let Some(label) = site.binding.label() else {
                continue;
            };
            match self.bonds.get(&label) {
                Some(BondEnds::Paired(x, y)) => {
                    let other = if x.agent == id { y.agent } else { x.agent };
                    if other != id {
                        out.push(other);
                    }
                }
                Some(BondEnds::Dangling(_)) => {}
                None => return Err(MixtureError::InvalidBond(label)),
            }
        }
        Ok(out)
    }

    /// Fails on the first label that does not join exactly two sites.
    pub fn check_bonds(&self) -> Result<(), MixtureError> {
        match self.bonds.iter().find(|(_, ends)| matches!(ends, BondEnds::Dangling(_))) {
            Some((label, _)) => Err(MixtureError::InvalidBond(*label)),
            None => Ok(()),
        }
    }

    /// The live agents as an expression, in id order.
    pub fn to_expression(&self) -> Expression {
        self.agents.iter().map(|(_, a)| a.clone()).collect()
    }

    /// Renders the mixture with `;` between top-level agents and `,` inside
    /// site lists, so the two separators stay distinguishable.
    pub fn parseable_state(&self) -> String {
        self.agents
            .iter()
            .map(|(_, a)| a.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Domain-separated SHA-256 of the rendered mixture.
    pub fn fingerprint(&self) -> HashValue {
        HashValue::hash_with_domain(b"MIXTURE", self.to_string().as_bytes())
    }

    fn endpoint(&self, agent: AgentId, site: &str) -> Result<Endpoint, MixtureError> {
        let data = self.agents.get(agent).ok_or(MixtureError::UnknownAgent(agent))?;
        let index = data.site_index(site).ok_or_else(|| MixtureError::UnknownSite {
            agent,
            site: site.to_owned(),
        })?;
        Ok(Endpoint { agent, site: index })
    }

    fn binding_at(&self, end: Endpoint) -> Result<BindingState, MixtureError> {
        self.agents
            .get(end.agent)
            .and_then(|a| a.sites().get(end.site))
            .map(|s| s.binding)
            .ok_or(MixtureError::UnknownAgent(end.agent))
    }

    fn site_name(&self, end: Endpoint) -> Result<String, MixtureError> {
        self.agents
            .get(end.agent)
            .and_then(|a| a.sites().get(end.site))
            .map(|s| s.name.clone())
            .ok_or(MixtureError::UnknownAgent(end.agent))
    }

    fn set_binding(&mut self, end: Endpoint, binding: BindingState) -> Result<(), MixtureError> {
        let site = self
            .agents
            .get_mut(end.agent)
            .and_then(|a| a.site_at_mut(end.site))
            .ok_or(MixtureError::UnknownAgent(end.agent))?;
        site.binding = binding;
        Ok(())
    }
}

impl Default for Mixture {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Mixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expression())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixture(text: &str) -> Mixture {
        Mixture::from_expression(&text.parse().unwrap()).unwrap()
    }

    fn ids(m: &Mixture) -> Vec<AgentId> {
        m.ids().collect()
    }

    #[test]
    fn literal_keeps_labels() {
        let m = mixture("A(a!1),A(a!1),B,C(s~u)");
        assert_eq!(m.to_string(), "A(a!1),A(a!1),B,C(s~u)");
        assert_eq!(m.len(), 4);
        assert_eq!(m.bond_count(), 1);
        assert!(m.check_bonds().is_ok());
    }

    #[test]
    fn literal_rejects_dangling_label() {
        let err = Mixture::from_expression(&"A(a!1),B".parse().unwrap()).unwrap_err();
        assert_eq!(err, MixtureError::InvalidBond(BondLabel(1)));
    }

    #[test]
    fn literal_rejects_wildcards() {
        let err = Mixture::from_expression(&"A(a!-)".parse().unwrap()).unwrap_err();
        assert!(matches!(err, MixtureError::Wildcard(_)));
    }

    #[test]
    fn bind_uses_fresh_label_and_unbind_returns_partner() {
        let mut m = mixture("A(a!1),A(a!1),B(x),C(y)");
        let ids = ids(&m);
        let label = m.bind(ids[2], "x", ids[3], "y").unwrap();
        assert_eq!(label, BondLabel(2));
        assert_eq!(m.to_string(), "A(a!1),A(a!1),B(x!2),C(y!2)");

        let partner = m.unbind(ids[3], "y").unwrap();
        assert_eq!(partner, SiteRef::new(ids[2], "x"));
        assert_eq!(m.to_string(), "A(a!1),A(a!1),B(x),C(y)");

        // Labels are not reused.
        assert_eq!(m.bind(ids[2], "x", ids[3], "y").unwrap(), BondLabel(3));
    }

    #[test]
    fn bind_rejects_occupied_site() {
        let mut m = mixture("A(a!1),A(a!1),B(x)");
        let ids = ids(&m);
        let err = m.bind(ids[0], "a", ids[2], "x").unwrap_err();
        assert!(matches!(err, MixtureError::SiteOccupied { .. }));
    }

    #[test]
    fn unbind_free_site_fails() {
        let mut m = mixture("B(x)");
        let id = ids(&m)[0];
        assert!(matches!(m.unbind(id, "x"), Err(MixtureError::SiteFree { .. })));
        assert!(matches!(m.unbind(id, "nope"), Err(MixtureError::UnknownSite { .. })));
    }

    #[test]
    fn destroy_severs_bonds_first() {
        let mut m = mixture("A(a!1,b!2),B(x!1),C(y!2)");
        let ids = ids(&m);
        let (agent, freed) = m.destroy(ids[0]).unwrap();
        assert_eq!(agent.name(), "A");
        assert_eq!(freed, vec![SiteRef::new(ids[1], "x"), SiteRef::new(ids[2], "y")]);
        assert_eq!(m.to_string(), "B(x),C(y)");
        assert_eq!(m.bond_count(), 0);
        assert_eq!(m.destroy(ids[0]).unwrap_err(), MixtureError::UnknownAgent(ids[0]));
    }

    #[test]
    fn destroy_intra_agent_bond() {
        let mut m = mixture("A(a!1,b!1)");
        let id = ids(&m)[0];
        let (_, freed) = m.destroy(id).unwrap();
        assert!(freed.is_empty());
        assert!(m.is_empty());
        assert_eq!(m.bond_count(), 0);
    }

    #[test]
    fn create_registers_pending_labels() {
        let mut m = mixture("A(a!1),A(a!1)");
        let b = m.create("B(x!7)".parse().unwrap()).unwrap();
        assert_eq!(m.check_bonds(), Err(MixtureError::InvalidBond(BondLabel(7))));
        let c = m.create("C(y!7)".parse().unwrap()).unwrap();
        assert!(m.check_bonds().is_ok());
        assert_eq!(m.binding_partner(b, "x").unwrap(), Some(SiteRef::new(c, "y")));
        // Third occurrence of a full label.
        let err = m.create("D(z!7)".parse().unwrap()).unwrap_err();
        assert_eq!(err, MixtureError::InvalidBond(BondLabel(7)));
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn create_all_relabels_each_copy() {
        let mut m = Mixture::new();
        let expr: Expression = "A(a!1),A(a!1)".parse().unwrap();
        m.create_all(expr.agents().to_vec()).unwrap();
        m.create_all(expr.agents().to_vec()).unwrap();
        assert_eq!(m.to_string(), "A(a!1),A(a!1),A(a!2),A(a!2)");
        assert!(m.check_bonds().is_ok());
    }

    #[test]
    fn create_all_is_atomic_on_bad_label() {
        let mut m = Mixture::new();
        let expr: Expression = "A(a!1),A(a!2)".parse().unwrap();
        let err = m.create_all(expr.into_agents()).unwrap_err();
        assert_eq!(err, MixtureError::InvalidBond(BondLabel(1)));
        assert!(m.is_empty());
    }

    #[test]
    fn modify_and_parseable_state() {
        let mut m = mixture("A(a!1,s~u),A(a!1),B");
        let first = ids(&m)[0];
        m.modify_internal_state(first, "s", Some("p".into())).unwrap();
        assert_eq!(m.parseable_state(), "A(a!1,s~p);A(a!1);B");
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = mixture("A(a!1),A(a!1)");
        let b = mixture("A(a!1),A(a!1)");
        let c = mixture("A(a),A(a)");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn highest_label_exhausts_fresh_labels() {
        let mut m = mixture("A(a!4294967295),B(b!4294967295),C(c),D(d)");
        assert_eq!(m.to_string(), "A(a!4294967295),B(b!4294967295),C(c),D(d)");
        assert!(m.check_bonds().is_ok());

        let c = ids(&m)[2];
        let d = ids(&m)[3];
        assert_eq!(m.bind(c, "c", d, "d"), Err(MixtureError::LabelsExhausted));
        assert_eq!(m.to_string(), "A(a!4294967295),B(b!4294967295),C(c),D(d)");

        let expr: Expression = "E(e!1),E(e!1)".parse().unwrap();
        assert_eq!(m.create_all(expr.into_agents()), Err(MixtureError::LabelsExhausted));
        assert_eq!(m.len(), 4);
    }
}
