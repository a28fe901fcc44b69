//! Rules and the elementary actions derived from them.
//!
//! A rule is compiled once: its left-hand side is split into pattern
//! complexes, right-hand agents are paired with left-hand agents of the same
//! name (first unpaired wins, in order), and the difference between the two
//! sides becomes an ordered list of [`ElementaryAction`]s.
//!
//! Applying a rule resolves every left-hand agent to a concrete mixture agent
//! through an embedding of each pattern complex into the complex selected for
//! it, before anything is mutated. Actions then run in a fixed order:
//! destroy, create, modify, unbind, bind.

use crate::agent::{Agent, BindingState, Expression};
use crate::arena::AgentId;
use crate::complex::Complex;
use crate::mixture::{Mixture, MixtureError, SiteRef};
use crate::notation::{parse_rule, ParseError, RuleText};
use crate::pattern::{embed_complex, PatternComplex};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while compiling or applying a rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A created agent must be fully specified.
    #[error("created agent `{0}` uses a pattern wildcard")]
    WildcardInCreate(String),
    /// An agent or site the rule refers to cannot be located.
    #[error("malformed rule: {0}")]
    Malformed(String),
    #[error(transparent)]
    Mixture(#[from] MixtureError),
}

fn at_apply(err: MixtureError) -> RuleError {
    match err {
        MixtureError::InvalidBond(_) => RuleError::Mixture(err),
        other => RuleError::Malformed(other.to_string()),
    }
}

/// The agent an action acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgentRef {
    /// The left-hand agent at this index.
    Lhs(usize),
    /// The n-th agent created by this rule.
    Created(usize),
}

/// One atomic graph edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementaryAction {
    ModifyInternalState {
        target: AgentRef,
        site: String,
        state: Option<String>,
    },
    Bind {
        first: AgentRef,
        first_site: String,
        second: AgentRef,
        second_site: String,
    },
    /// Clears a bond. `partner` is `None` when the pattern leaves it unnamed.
    Unbind {
        target: AgentRef,
        site: String,
        partner: Option<(AgentRef, String)>,
    },
    /// Inserts a bond-free copy of `template`; bonds follow as `Bind`s.
    Create { template: Agent },
    Destroy { target: AgentRef },
}

/// What one application changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    /// Every site whose state or binding changed.
    pub modified: Vec<SiteRef>,
    pub created: Vec<AgentId>,
    pub removed: Vec<AgentId>,
}

impl Delta {
    /// Agents with a changed site that are still alive.
    pub fn modified_agents(&self) -> BTreeSet<AgentId> {
        let removed = self.removed_agents();
        self.modified
            .iter()
            .map(|s| s.agent)
            .filter(|a| !removed.contains(a))
            .collect()
    }

    pub fn removed_agents(&self) -> BTreeSet<AgentId> {
        self.removed.iter().copied().collect()
    }

    /// Modified or created agents that are still alive.
    pub fn touched_agents(&self) -> BTreeSet<AgentId> {
        let mut touched = self.modified_agents();
        let removed = self.removed_agents();
        touched.extend(self.created.iter().copied().filter(|a| !removed.contains(a)));
        touched
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.created.is_empty() && self.removed.is_empty()
    }
}

type Endpoint = (AgentRef, String);

/// Unordered pair of endpoints, stored smallest first.
fn bond_key(a: Endpoint, b: Endpoint) -> (Endpoint, Endpoint) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct Rule {
    lhs: Expression,
    rhs: Expression,
    rate: f64,
    rate_text: String,
    lhs_complexes: Vec<PatternComplex>,
    actions: Vec<ElementaryAction>,
    /// Left-hand indices destroyed or changed.
    lhs_modified: Vec<usize>,
    /// Right-hand indices created or changed.
    rhs_modified: Vec<usize>,
    frees_unnamed: bool,
    symmetry_factor: f64,
}

impl Rule {
    /// Builds a rule from two sides and a kinetic constant.
    pub fn new(lhs: Expression, rhs: Expression, rate: f64) -> Result<Self, RuleError> {
        Self::compile(RuleText {
            lhs,
            rhs,
            rate,
            rate_text: rate.to_string(),
        })
    }

    /// Derives the elementary actions and dependency sets of a parsed rule.
    pub fn compile(text: RuleText) -> Result<Self, RuleError> {
        let RuleText {
            lhs,
            rhs,
            rate,
            rate_text,
        } = text;

        // Positional pairing by name.
        let mut rhs_pair: Vec<Option<usize>> = vec![None; rhs.len()];
        let mut lhs_pair: Vec<Option<usize>> = vec![None; lhs.len()];
        for (i, agent) in lhs.agents().iter().enumerate() {
            if let Some(j) = (0..rhs.len())
                .find(|&j| rhs_pair[j].is_none() && rhs.agents()[j].name() == agent.name())
            {
                rhs_pair[j] = Some(i);
                lhs_pair[i] = Some(j);
            }
        }

        let mut actions = Vec::new();
        let mut destroyed = BTreeSet::new();
        for (i, pair) in lhs_pair.iter().enumerate() {
            if pair.is_none() {
                destroyed.insert(i);
                actions.push(ElementaryAction::Destroy {
                    target: AgentRef::Lhs(i),
                });
            }
        }

        let mut rhs_refs = Vec::with_capacity(rhs.len());
        let mut created = 0;
        for (j, agent) in rhs.agents().iter().enumerate() {
            match rhs_pair[j] {
                Some(i) => rhs_refs.push(AgentRef::Lhs(i)),
                None => {
                    if agent.has_wildcards() {
                        return Err(RuleError::WildcardInCreate(agent.to_string()));
                    }
                    actions.push(ElementaryAction::Create {
                        template: agent.unbound(),
                    });
                    rhs_refs.push(AgentRef::Created(created));
                    created += 1;
                }
            }
        }

        for (j, agent) in rhs.agents().iter().enumerate() {
            let Some(i) = rhs_pair[j] else { continue };
            let before = &lhs.agents()[i];
            for site in agent.sites() {
                let Some(state) = &site.internal_state else { continue };
                let old = before.site(&site.name).and_then(|s| s.internal_state.as_ref());
                if old != Some(state) {
                    actions.push(ElementaryAction::ModifyInternalState {
                        target: AgentRef::Lhs(i),
                        site: site.name.clone(),
                        state: Some(state.clone()),
                    });
                }
            }
        }

        // Bonds on each side, in terms of the same endpoint references.
        let lhs_links = links(&lhs, &|i| AgentRef::Lhs(i));
        let rhs_links = links(&rhs, &|j| rhs_refs[j]);
        let lhs_bonds: BTreeSet<_> = lhs_links
            .iter()
            .filter_map(|(a, b)| b.clone().map(|b| bond_key(a.clone(), b)))
            .collect();
        let rhs_bonds: BTreeSet<_> = rhs_links
            .iter()
            .filter_map(|(a, b)| b.clone().map(|b| bond_key(a.clone(), b)))
            .collect();

        let rhs_binding = |end: &Endpoint| -> Option<BindingState> {
            let AgentRef::Lhs(i) = end.0 else { return None };
            let j = lhs_pair[i]?;
            rhs.agents()[j].site(&end.1).map(|s| s.binding)
        };
        let is_destroyed = |end: &Endpoint| matches!(end.0, AgentRef::Lhs(i) if destroyed.contains(&i));

        // A left-hand bond breaks when either end is restated as something else.
        for (x, y) in &lhs_bonds {
            if is_destroyed(x) || is_destroyed(y) || rhs_bonds.contains(&(x.clone(), y.clone())) {
                continue;
            }
            let restated = |end: &Endpoint, other: &Endpoint| match rhs_binding(end) {
                Some(BindingState::Free) => true,
                Some(BindingState::Bond(_)) => rhs_links
                    .iter()
                    .any(|(e, p)| e == end && p.as_ref().is_some_and(|p| p != other)),
                _ => false,
            };
            if restated(x, y) || restated(y, x) {
                actions.push(ElementaryAction::Unbind {
                    target: x.0,
                    site: x.1.clone(),
                    partner: Some((y.0, y.1.clone())),
                });
            }
        }

        // Bonds whose partner the left-hand side leaves unnamed.
        let mut frees_unnamed = false;
        for (end, partner) in &lhs_links {
            if partner.is_some() || is_destroyed(end) {
                continue;
            }
            let rebinds = rhs_bonds.iter().any(|(a, b)| a == end || b == end);
            if matches!(rhs_binding(end), Some(BindingState::Free)) || rebinds {
                frees_unnamed = true;
                actions.push(ElementaryAction::Unbind {
                    target: end.0,
                    site: end.1.clone(),
                    partner: None,
                });
            }
        }
        frees_unnamed |= !destroyed.is_empty();

        for (x, y) in &rhs_bonds {
            if !lhs_bonds.contains(&(x.clone(), y.clone())) {
                actions.push(ElementaryAction::Bind {
                    first: x.0,
                    first_site: x.1.clone(),
                    second: y.0,
                    second_site: y.1.clone(),
                });
            }
        }

        // A right-hand label with one end can only restate an existing bond.
        for (end, partner) in &rhs_links {
            if partner.is_some() {
                continue;
            }
            let was_bound = match end.0 {
                AgentRef::Created(_) => false,
                AgentRef::Lhs(i) => lhs.agents()[i]
                    .site(&end.1)
                    .map(|s| !s.binding.is_free())
                    .unwrap_or(false),
            };
            if !was_bound {
                return Err(RuleError::Malformed(format!(
                    "site `{}` gains a bond with no partner on the right-hand side",
                    end.1
                )));
            }
        }

        let mut lhs_modified: BTreeSet<usize> = destroyed.clone();
        for action in &actions {
            let mut mark = |r: &AgentRef| {
                if let AgentRef::Lhs(i) = r {
                    lhs_modified.insert(*i);
                }
            };
            match action {
                ElementaryAction::ModifyInternalState { target, .. } => mark(target),
                ElementaryAction::Bind { first, second, .. } => {
                    mark(first);
                    mark(second);
                }
                ElementaryAction::Unbind { target, partner, .. } => {
                    mark(target);
                    if let Some((p, _)) = partner {
                        mark(p);
                    }
                }
                ElementaryAction::Create { .. } | ElementaryAction::Destroy { .. } => {}
            }
        }
        // Named partners of destroyed agents lose their bond too.
        for (x, y) in &lhs_bonds {
            for (dead, other) in [(x, y), (y, x)] {
                if is_destroyed(dead) {
                    if let AgentRef::Lhs(i) = other.0 {
                        lhs_modified.insert(i);
                    }
                }
            }
        }
        let rhs_modified = (0..rhs.len())
            .filter(|&j| match rhs_pair[j] {
                None => true,
                Some(i) => lhs_modified.contains(&i),
            })
            .collect();

        let lhs_complexes = PatternComplex::from_expression(&lhs);
        let symmetry_factor = symmetry_factor(&lhs_complexes);

        Ok(Self {
            lhs,
            rhs,
            rate,
            rate_text,
            lhs_complexes,
            actions,
            lhs_modified: lhs_modified.into_iter().collect(),
            rhs_modified,
            frees_unnamed,
            symmetry_factor,
        })
    }

    pub fn lhs(&self) -> &Expression {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expression {
        &self.rhs
    }

    /// Kinetic constant.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn symmetry_factor(&self) -> f64 {
        self.symmetry_factor
    }

    pub fn lhs_complexes(&self) -> &[PatternComplex] {
        &self.lhs_complexes
    }

    pub fn actions(&self) -> &[ElementaryAction] {
        &self.actions
    }

    /// Left-hand agents destroyed or changed, and right-hand agents created or
    /// changed.
    pub fn modified_agents(&self) -> (Vec<&Agent>, Vec<&Agent>) {
        (
            self.lhs_modified.iter().map(|&i| &self.lhs.agents()[i]).collect(),
            self.rhs_modified.iter().map(|&j| &self.rhs.agents()[j]).collect(),
        )
    }

    /// `true` if firing may free a site whose partner the rule does not name,
    /// through a destroy or an unbind of a `-`/`?` site.
    pub fn frees_unnamed_partners(&self) -> bool {
        self.frees_unnamed
    }

    /// Activity given the number of matches for each left-hand complex.
    pub fn activity(&self, match_counts: impl IntoIterator<Item = usize>) -> f64 {
        let product: f64 = match_counts.into_iter().map(|n| n as f64).product();
        self.rate / self.symmetry_factor * product
    }

    /// Applies the rule to one selected mixture complex per left-hand complex.
    pub fn apply(&self, mixture: &mut Mixture, selection: &[Complex]) -> Result<Delta, RuleError> {
        if selection.len() != self.lhs_complexes.len() {
            return Err(RuleError::Malformed(format!(
                "{} complexes selected for {} left-hand complexes",
                selection.len(),
                self.lhs_complexes.len()
            )));
        }

        let mut lhs_ids: Vec<Option<AgentId>> = vec![None; self.lhs.len()];
        for (n, (pattern, complex)) in self.lhs_complexes.iter().zip(selection).enumerate() {
            let embedding = embed_complex(pattern, mixture, complex).ok_or_else(|| {
                RuleError::Malformed(format!("left-hand complex {} does not embed into {}", n, complex))
            })?;
            for (position, &id) in embedding.targets().iter().enumerate() {
                if let Some(slot) = pattern.origin(position).and_then(|i| lhs_ids.get_mut(i)) {
                    *slot = Some(id);
                }
            }
        }

        let mut created: Vec<AgentId> = Vec::new();
        let mut delta = Delta::default();
        let resolve = |r: AgentRef, created: &[AgentId]| -> Result<AgentId, RuleError> {
            let found = match r {
                AgentRef::Lhs(i) => lhs_ids.get(i).copied().flatten(),
                AgentRef::Created(k) => created.get(k).copied(),
            };
            found.ok_or_else(|| RuleError::Malformed(format!("cannot locate agent {:?}", r)))
        };

        for action in &self.actions {
            match action {
                ElementaryAction::Destroy { target } => {
                    let id = resolve(*target, &created)?;
                    let (_, freed) = mixture.destroy(id).map_err(at_apply)?;
                    delta.removed.push(id);
                    delta.modified.extend(freed);
                }
                ElementaryAction::Create { template } => {
                    let id = mixture.create(template.clone()).map_err(at_apply)?;
                    created.push(id);
                    delta.created.push(id);
                }
                ElementaryAction::ModifyInternalState { target, site, state } => {
                    let id = resolve(*target, &created)?;
                    mixture
                        .modify_internal_state(id, site, state.clone())
                        .map_err(at_apply)?;
                    delta.modified.push(SiteRef::new(id, site.clone()));
                }
                ElementaryAction::Unbind { target, site, partner } => {
                    let id = resolve(*target, &created)?;
                    let current = mixture.binding_partner(id, site).map_err(at_apply)?;
                    if let Some((p, psite)) = partner {
                        let expected = SiteRef::new(resolve(*p, &created)?, psite.clone());
                        if current.as_ref() != Some(&expected) {
                            return Err(RuleError::Malformed(format!(
                                "site `{}` of {} is not bound to `{}` of {}",
                                site, id, psite, expected.agent
                            )));
                        }
                    }
                    // `?` may have matched a free site.
                    if current.is_none() {
                        continue;
                    }
                    let freed = mixture.unbind(id, site).map_err(at_apply)?;
                    delta.modified.push(SiteRef::new(id, site.clone()));
                    delta.modified.push(freed);
                }
                ElementaryAction::Bind {
                    first,
                    first_site,
                    second,
                    second_site,
                } => {
                    let a = resolve(*first, &created)?;
                    let b = resolve(*second, &created)?;
                    mixture
                        .bind(a, first_site, b, second_site)
                        .map_err(at_apply)?;
                    delta.modified.push(SiteRef::new(a, first_site.clone()));
                    delta.modified.push(SiteRef::new(b, second_site.clone()));
                }
            }
        }
        Ok(delta)
    }
}

/// Every labelled site of `expr` with its linked partner, if the label
/// appears twice.
fn links(expr: &Expression, refer: &dyn Fn(usize) -> AgentRef) -> Vec<(Endpoint, Option<Endpoint>)> {
    let name = |(a, s): (usize, usize)| -> Endpoint { (refer(a), expr.agents()[a].sites()[s].name.clone()) };
    let mut out = Vec::new();
    let by_label: BTreeMap<_, _> = expr.label_sites();
    for (a, agent) in expr.agents().iter().enumerate() {
        for (s, site) in agent.sites().iter().enumerate() {
            let partner = match site.binding {
                BindingState::Bond(label) => by_label
                    .get(&label)
                    .and_then(|ends| ends.iter().find(|&&e| e != (a, s)).copied())
                    .map(name),
                BindingState::Free => continue,
                BindingState::Bound | BindingState::Any => None,
            };
            out.push((name((a, s)), partner));
        }
    }
    out
}

/// `n!`, where `n` is one plus the number of LHS complex pairs in which
/// either side embeds into the other.
fn symmetry_factor(complexes: &[PatternComplex]) -> f64 {
    let mut n: u32 = 1;
    for (i, a) in complexes.iter().enumerate() {
        for b in &complexes[i + 1..] {
            if a.embeds_into(b) || b.embeds_into(a) {
                n += 1;
            }
        }
    }
    (1..=n).map(f64::from).product()
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lhs = self.lhs.to_string();
        let rhs = self.rhs.to_string();
        let rate = format!("[{}]", self.rate_text);
        let parts: Vec<&str> = [lhs.as_str(), "->", rhs.as_str(), rate.as_str()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        f.write_str(&parts.join(" "))
    }
}

impl FromStr for Rule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(parse_rule(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::get_complexes;

    fn rule(text: &str) -> Rule {
        text.parse().unwrap()
    }

    fn mixture(text: &str) -> Mixture {
        Mixture::from_expression(&text.parse().unwrap()).unwrap()
    }

    fn count(rule: &Rule, pred: fn(&ElementaryAction) -> bool) -> usize {
        rule.actions().iter().filter(|a| pred(a)).count()
    }

    #[test]
    fn round_trip_display() {
        let text = "A(a!1),A(a!1),B,C(s~u) -> A(a),A(a),B,C(s~u) [0.001]";
        assert_eq!(rule(text).to_string(), text);
        assert_eq!(rule("-> A(a) [2]").to_string(), "-> A(a) [2]");
        assert_eq!(rule("A(a) -> [1]").to_string(), "A(a) -> [1]");
    }

    #[test]
    fn dissociation_is_a_single_unbind() {
        let r = rule("A(a!1),A(a!1) -> A(a),A(a) [1]");
        assert_eq!(
            r.actions(),
            &[ElementaryAction::Unbind {
                target: AgentRef::Lhs(0),
                site: "a".into(),
                partner: Some((AgentRef::Lhs(1), "a".into())),
            }]
        );
        assert_eq!(r.lhs_complexes().len(), 1);
        assert_eq!(r.symmetry_factor(), 1.0);
        assert!(!r.frees_unnamed_partners());
    }

    #[test]
    fn state_change_is_a_single_modify() {
        let r = rule("A(a!1),A(a!1),B(c) -> A(a!1),A(a!1),B(c~p) [1]");
        assert_eq!(
            r.actions(),
            &[ElementaryAction::ModifyInternalState {
                target: AgentRef::Lhs(2),
                site: "c".into(),
                state: Some("p".into()),
            }]
        );
        let (lhs, rhs) = r.modified_agents();
        assert_eq!(lhs.len(), 1);
        assert_eq!(rhs[0].to_string(), "B(c~p)");
    }

    #[test]
    fn association_is_a_single_bind() {
        let r = rule("A(a),C(a) -> A(a!1),C(a!1) [1]");
        assert_eq!(count(&r, |a| matches!(a, ElementaryAction::Bind { .. })), 1);
        assert_eq!(r.actions().len(), 1);
        assert_eq!(r.lhs_complexes().len(), 2);
    }

    #[test]
    fn unpaired_agents_are_created_and_destroyed() {
        let r = rule("A(a),B -> A(a!1),C(c!1) [1]");
        assert!(matches!(r.actions()[0], ElementaryAction::Destroy { target: AgentRef::Lhs(1) }));
        assert!(matches!(&r.actions()[1], ElementaryAction::Create { template } if template.to_string() == "C(c)"));
        assert!(matches!(
            &r.actions()[2],
            ElementaryAction::Bind { first: AgentRef::Lhs(0), second: AgentRef::Created(0), .. }
        ));
        assert!(r.frees_unnamed_partners());
    }

    #[test]
    fn rebinding_unbinds_first() {
        let r = rule("A(x!1),B(y!1) -> A(x!1),B(y),C(z!1) [1]");
        let kinds: Vec<&str> = r
            .actions()
            .iter()
            .map(|a| match a {
                ElementaryAction::Create { .. } => "create",
                ElementaryAction::Unbind { .. } => "unbind",
                ElementaryAction::Bind { .. } => "bind",
                ElementaryAction::Destroy { .. } => "destroy",
                ElementaryAction::ModifyInternalState { .. } => "modify",
            })
            .collect();
        assert_eq!(kinds, vec!["create", "unbind", "bind"]);
    }

    #[test]
    fn unnamed_partner_gives_unary_unbind() {
        let r = rule("A(a!-) -> A(a) [1]");
        assert_eq!(
            r.actions(),
            &[ElementaryAction::Unbind {
                target: AgentRef::Lhs(0),
                site: "a".into(),
                partner: None,
            }]
        );
        assert!(r.frees_unnamed_partners());
    }

    #[test]
    fn wildcard_in_created_agent_is_rejected() {
        assert!(matches!(
            "-> A(a!-) [1]".parse::<Rule>(),
            Err(RuleError::WildcardInCreate(_))
        ));
    }

    #[test]
    fn new_bond_without_partner_is_rejected() {
        assert!(matches!("A(a) -> A(a!1) [1]".parse::<Rule>(), Err(RuleError::Malformed(_))));
    }

    #[test]
    fn symmetry_counts_identical_complexes() {
        assert_eq!(rule("A(a),A(a) -> A(a!1),A(a!1) [1]").symmetry_factor(), 2.0);
        assert_eq!(rule("A,A,A -> A,A [1]").symmetry_factor(), 24.0);
        assert_eq!(rule("A(a),B(b) -> A(a!1),B(b!1) [1]").symmetry_factor(), 1.0);
        assert_eq!(rule("A,A,B,B -> [1]").symmetry_factor(), 6.0);
        assert_eq!(rule("A(a!1),A(a!1) -> A(a),A(a) [1]").symmetry_factor(), 1.0);
    }

    #[test]
    fn symmetry_counts_subsumed_complexes() {
        assert_eq!(rule("A(a),A -> [1]").symmetry_factor(), 2.0);
        assert_eq!(rule("A(s~u),A(s~p) -> [1]").symmetry_factor(), 1.0);
        assert_eq!(rule("A(a!1),B(b!1),A(a!-) -> [1]").symmetry_factor(), 2.0);
        assert_eq!(rule("A(a!1),B(b!1),A(a) -> [1]").symmetry_factor(), 1.0);
    }

    #[test]
    fn activity_formula() {
        let r = rule("A(a),A(a) -> A(a!1),A(a!1) [3]");
        assert_eq!(r.activity([4, 4]), 3.0 / 2.0 * 16.0);
        assert_eq!(r.activity([0, 4]), 0.0);
        assert_eq!(rule("-> A [0.5]").activity(std::iter::empty()), 0.5);
        assert_eq!(rule("A(a),A -> [4]").activity([3, 5]), 4.0 / 2.0 * 15.0);
    }

    #[test]
    fn apply_dissociation() {
        let mut m = mixture("A(a!1),A(a!1),B,C(s~u)");
        let r = rule("A(a!1),A(a!1) -> A(a),A(a) [1]");
        let dimer = get_complexes(&m).unwrap().remove(0);
        let delta = r.apply(&mut m, &[dimer]).unwrap();
        assert_eq!(m.to_string(), "A(a),A(a),B,C(s~u)");
        assert_eq!(delta.modified.len(), 2);
        assert_eq!(delta.touched_agents().len(), 2);
        assert!(delta.created.is_empty() && delta.removed.is_empty());
    }

    #[test]
    fn apply_create_and_destroy() {
        let mut m = mixture("A(a),B(b!1),D(d!1)");
        let r = rule("A(a),B(b!-) -> A(a!1),C(c!1) [1]");
        let complexes = get_complexes(&m).unwrap();
        let delta = r.apply(&mut m, &complexes[..2]).unwrap();
        assert_eq!(m.to_string(), "A(a!2),D(d),C(c!2)");
        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.created.len(), 1);
        // The freed D counts as modified.
        let ids: Vec<_> = m.ids().collect();
        assert!(delta.modified_agents().contains(&ids[1]));
        assert!(m.check_bonds().is_ok());
    }

    #[test]
    fn repeated_names_pair_by_position() {
        // The bond moves from the first A to the second.
        let moved = rule("A(x!1),B(b!1),A(x) -> A(x),B(b!1),A(x!1) [1]");
        assert_eq!(
            moved.actions(),
            &[
                ElementaryAction::Unbind {
                    target: AgentRef::Lhs(0),
                    site: "x".into(),
                    partner: Some((AgentRef::Lhs(1), "b".into())),
                },
                ElementaryAction::Bind {
                    first: AgentRef::Lhs(1),
                    first_site: "b".into(),
                    second: AgentRef::Lhs(2),
                    second_site: "x".into(),
                },
            ]
        );
        let mut m = mixture("A(x!1),B(b!1),A(x)");
        let complexes = get_complexes(&m).unwrap();
        let delta = moved.apply(&mut m, &complexes).unwrap();
        assert_eq!(m.to_string(), "A(x),B(b!2),A(x!2)");
        assert_eq!(delta.touched_agents().len(), 3);
        assert!(m.check_bonds().is_ok());

        // Same agents restated in place: nothing to do.
        let kept = rule("A(x!1),B(b!1),A(x) -> A(x!1),B(b!1),A(x) [1]");
        assert!(kept.actions().is_empty());
        let mut m = mixture("A(x!1),B(b!1),A(x)");
        let complexes = get_complexes(&m).unwrap();
        let delta = kept.apply(&mut m, &complexes).unwrap();
        assert_eq!(m.to_string(), "A(x!1),B(b!1),A(x)");
        assert!(delta.touched_agents().is_empty());
    }

    #[test]
    fn apply_rejects_non_matching_selection() {
        let mut m = mixture("A(a),B(b)");
        let r = rule("A(a!1),B(b!1) -> A(a),B(b) [1]");
        let complexes = get_complexes(&m).unwrap();
        assert!(matches!(r.apply(&mut m, &complexes[..1]), Err(RuleError::Malformed(_))));
        assert!(matches!(r.apply(&mut m, &[]), Err(RuleError::Malformed(_))));
        assert_eq!(m.to_string(), "A(a),B(b)");
    }
}
