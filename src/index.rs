//! Incrementally maintained index of pattern matches.
//!
//! `MatchingIndex` holds two views of the same relation:
//!
//! - the **matching map**: for every rule and every left-hand pattern complex
//!   of that rule, the set of mixture complexes it currently matches;
//! - the **lift map**: for every live agent, the `(slot, complex)` entries it
//!   takes part in.
//!
//! The index is built from scratch once. After that, every event is folded in
//! by a negative pass (drop matches the event may have broken) followed by a
//! positive pass (add matches the event may have created).
//!
//! # Invariant
//! After any sequence of events folded in through `negative_update` then
//! `positive_update`, the index equals `MatchingIndex::build` on the live
//! mixture.
//!
//! # Determinism
//! All sets and maps are ordered, so iteration and selection by position are
//! reproducible for a given seed.

use crate::arena::AgentId;
use crate::complex::{get_complex, get_complexes, Complex};
use crate::mixture::{Mixture, MixtureError};
use crate::pattern::match_complex;
use crate::rule::Rule;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One left-hand pattern complex of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatternSlot {
    pub rule: usize,
    pub complex: usize,
}

impl PatternSlot {
    pub fn new(rule: usize, complex: usize) -> Self {
        Self { rule, complex }
    }
}

/// A lift-map entry: the agent's complex matches this slot.
pub type LiftEntry = (PatternSlot, Complex);

/// Matching map plus its per-agent inversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingIndex {
    matching: Vec<Vec<BTreeSet<Complex>>>,
    lift: BTreeMap<AgentId, BTreeSet<LiftEntry>>,
}

impl MatchingIndex {
    /// Tests every pattern complex of every rule against every mixture complex.
    pub fn build(mixture: &Mixture, rules: &[Rule]) -> Result<Self, MixtureError> {
        let mut index = Self {
            matching: rules
                .iter()
                .map(|r| vec![BTreeSet::new(); r.lhs_complexes().len()])
                .collect(),
            lift: mixture.ids().map(|id| (id, BTreeSet::new())).collect(),
        };
        let complexes = get_complexes(mixture)?;
        for (r, rule) in rules.iter().enumerate() {
            for (c, pattern) in rule.lhs_complexes().iter().enumerate() {
                for complex in &complexes {
                    if match_complex(pattern, mixture, complex) {
                        index.insert(PatternSlot::new(r, c), complex.clone());
                    }
                }
            }
        }
        Ok(index)
    }

    /// Complexes currently matched by `slot`.
    pub fn matches(&self, slot: PatternSlot) -> Option<&BTreeSet<Complex>> {
        self.matching.get(slot.rule)?.get(slot.complex)
    }

    /// Match count of each left-hand complex of `rule`, in order.
    pub fn match_counts(&self, rule: usize) -> Option<Vec<usize>> {
        self.matching
            .get(rule)
            .map(|slots| slots.iter().map(BTreeSet::len).collect())
    }

    /// Lift-map entries of `agent`, or `None` if the agent is not indexed.
    pub fn lift(&self, agent: AgentId) -> Option<&BTreeSet<LiftEntry>> {
        self.lift.get(&agent)
    }

    /// Number of agents with a lift-map entry.
    pub fn indexed_agents(&self) -> usize {
        self.lift.len()
    }

    /// Drops every recorded match that an event may have broken.
    ///
    /// Each entry reachable from the lift map of a modified or removed agent is
    /// re-tested: it survives only if all of its agents are alive, it is still
    /// exactly one live complex, and the pattern still matches it. Removed
    /// agents lose their lift-map entry. Returns the rules whose matches
    /// changed.
    pub fn negative_update(
        &mut self,
        mixture: &Mixture,
        rules: &[Rule],
        modified: &BTreeSet<AgentId>,
        removed: &BTreeSet<AgentId>,
    ) -> BTreeSet<usize> {
        let entries: BTreeSet<LiftEntry> = modified
            .iter()
            .chain(removed)
            .filter_map(|a| self.lift.get(a))
            .flat_map(|entries| entries.iter().cloned())
            .collect();

        let mut live: HashMap<Complex, bool> = HashMap::new();
        let mut changed = BTreeSet::new();
        for (slot, complex) in entries {
            let is_live = *live
                .entry(complex.clone())
                .or_insert_with(|| is_live_complex(mixture, &complex));
            let keeps = is_live
                && rules
                    .get(slot.rule)
                    .and_then(|r| r.lhs_complexes().get(slot.complex))
                    .is_some_and(|pattern| match_complex(pattern, mixture, &complex));
            if !keeps {
                log::trace!("index: purge {} from rule {} complex {}", complex, slot.rule, slot.complex);
                self.purge(slot, &complex);
                changed.insert(slot.rule);
            }
        }

        for agent in removed {
            self.lift.remove(agent);
        }
        changed
    }

    /// Adds matches an event may have created.
    ///
    /// Recomputes the complexes containing the touched agents and tests them
    /// against every left-hand complex of the candidate rules. Every touched
    /// agent ends up with a lift-map entry. Dead agents are skipped. Returns
    /// the rules that gained a match.
    pub fn positive_update(
        &mut self,
        mixture: &Mixture,
        rules: &[Rule],
        touched: &BTreeSet<AgentId>,
        candidates: &BTreeSet<usize>,
    ) -> Result<BTreeSet<usize>, MixtureError> {
        let mut complexes: BTreeSet<Complex> = BTreeSet::new();
        for &agent in touched {
            if !mixture.contains(agent) {
                continue;
            }
            self.lift.entry(agent).or_default();
            if complexes.iter().any(|c| c.contains(agent)) {
                continue;
            }
            complexes.insert(get_complex(mixture, agent)?);
        }

        let mut grown = BTreeSet::new();
        for &r in candidates {
            let Some(rule) = rules.get(r) else { continue };
            for (c, pattern) in rule.lhs_complexes().iter().enumerate() {
                for complex in &complexes {
                    if match_complex(pattern, mixture, complex) && self.insert(PatternSlot::new(r, c), complex.clone()) {
                        log::trace!("index: insert {} into rule {} complex {}", complex, r, c);
                        grown.insert(r);
                    }
                }
            }
        }
        Ok(grown)
    }

    fn insert(&mut self, slot: PatternSlot, complex: Complex) -> bool {
        let Some(set) = self
            .matching
            .get_mut(slot.rule)
            .and_then(|slots| slots.get_mut(slot.complex))
        else {
            return false;
        };
        if !set.insert(complex.clone()) {
            return false;
        }
        for &agent in complex.agents() {
            self.lift
                .entry(agent)
                .or_default()
                .insert((slot, complex.clone()));
        }
        true
    }

    fn purge(&mut self, slot: PatternSlot, complex: &Complex) {
        if let Some(set) = self
            .matching
            .get_mut(slot.rule)
            .and_then(|slots| slots.get_mut(slot.complex))
        {
            set.remove(complex);
        }
        let entry = (slot, complex.clone());
        for agent in complex.agents() {
            if let Some(entries) = self.lift.get_mut(agent) {
                entries.remove(&entry);
            }
        }
    }
}

/// `true` if every agent of `complex` is alive and together they form exactly
/// one live complex.
fn is_live_complex(mixture: &Mixture, complex: &Complex) -> bool {
    let Some(first) = complex.first() else {
        return false;
    };
    if !complex.agents().iter().all(|&a| mixture.contains(a)) {
        return false;
    }
    matches!(get_complex(mixture, first), Ok(live) if live == *complex)
}
