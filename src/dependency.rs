//! Static rule-to-rule dependencies.
//!
//! Computed once when the engine is built. The activation map tells the
//! positive pass of [`crate::index`] which rules can gain matches after a rule
//! fires; the inhibition map records which rules can lose them.
//!
//! Both maps are over-approximations decided agent by agent with
//! [`agents_compatible`]: a rule is listed whenever some concrete agent could
//! satisfy both the changed agent's pattern and one of the other rule's
//! left-hand agents. A rule that may free a site whose partner it does not
//! name (through a destroy or an unbind of `-`/`?`) also activates every rule
//! that asks for a free site.

use crate::agent::{Agent, BindingState};
use crate::pattern::agents_compatible;
use crate::rule::Rule;

/// Activation and inhibition maps, indexed by rule position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    activation: Vec<Vec<usize>>,
    inhibition: Vec<Vec<usize>>,
}

fn touches(changed: &[&Agent], lhs: &[Agent]) -> bool {
    changed
        .iter()
        .any(|a| lhs.iter().any(|b| agents_compatible(a, b)))
}

fn wants_free_site(rule: &Rule) -> bool {
    rule.lhs()
        .agents()
        .iter()
        .any(|a| a.sites().iter().any(|s| s.binding == BindingState::Free))
}

impl DependencyGraph {
    pub fn build(rules: &[Rule]) -> Self {
        let mut activation = Vec::with_capacity(rules.len());
        let mut inhibition = Vec::with_capacity(rules.len());
        for r1 in rules {
            let (lhs_changed, rhs_changed) = r1.modified_agents();
            let mut activates = Vec::new();
            let mut inhibits = Vec::new();
            for (j, r2) in rules.iter().enumerate() {
                let lhs2 = r2.lhs().agents();
                if touches(&rhs_changed, lhs2) || (r1.frees_unnamed_partners() && wants_free_site(r2)) {
                    activates.push(j);
                }
                if touches(&lhs_changed, lhs2) {
                    inhibits.push(j);
                }
            }
            activation.push(activates);
            inhibition.push(inhibits);
        }
        Self {
            activation,
            inhibition,
        }
    }

    /// Rules whose matches may appear after `rule` fires.
    pub fn activation(&self, rule: usize) -> Option<&[usize]> {
        self.activation.get(rule).map(Vec::as_slice)
    }

    /// Rules whose matches may disappear after `rule` fires.
    pub fn inhibition(&self, rule: usize) -> Option<&[usize]> {
        self.inhibition.get(rule).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.activation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activation.is_empty()
    }
}
