//! Structural pattern matching of agents and complexes.
//!
//! Patterns are partially specified agents (see [`crate::agent`]) grouped into
//! connected `PatternComplex`es. Matching a pattern complex against a mixture
//! complex is anchored: once the first pattern agent is placed, every other
//! pattern agent is forced by following bonds, so each anchor is tried in
//! linear time.
//!
//! # Citations
//! - Graph pattern matching: Ullmann, "An algorithm for subgraph isomorphism" (1976)
//! - Kappa embeddings: Danos & Laneve, "Formal molecular biology" (2004)

use crate::agent::{Agent, BindingState, Expression};
use crate::arena::AgentId;
use crate::complex::Complex;
use crate::mixture::Mixture;
use std::collections::HashSet;

/// Returns `true` if `candidate` satisfies every constraint of `pattern`.
///
/// Names must be equal and every site the pattern mentions must exist on the
/// candidate. An unset pattern state is unconstrained; a set one must equal the
/// candidate's. Pattern binding `?` accepts anything, free accepts only free,
/// and `-` or a label accepts any bond.
pub fn match_agent(pattern: &Agent, candidate: &Agent) -> bool {
    if pattern.name() != candidate.name() {
        return false;
    }
    pattern.sites().iter().all(|ps| {
        let Some(cs) = candidate.site(&ps.name) else {
            return false;
        };
        let state_ok = match &ps.internal_state {
            None => true,
            Some(state) => cs.internal_state.as_ref() == Some(state),
        };
        let binding_ok = match ps.binding {
            BindingState::Any => true,
            BindingState::Free => cs.binding.is_free(),
            BindingState::Bound | BindingState::Bond(_) => !cs.binding.is_free(),
        };
        state_ok && binding_ok
    })
}

/// Returns `true` if some concrete agent could satisfy both patterns.
///
/// Used for static dependency analysis, where both sides are patterns and the
/// answer must never be a false negative.
pub fn agents_compatible(a: &Agent, b: &Agent) -> bool {
    if a.name() != b.name() {
        return false;
    }
    a.sites().iter().all(|sa| {
        let Some(sb) = b.site(&sa.name) else {
            return true;
        };
        let state_ok = match (&sa.internal_state, &sb.internal_state) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        };
        let binding_ok = match (sa.binding, sb.binding) {
            (BindingState::Any, _) | (_, BindingState::Any) => true,
            (BindingState::Free, other) | (other, BindingState::Free) => other.is_free(),
            _ => true,
        };
        state_ok && binding_ok
    })
}

/// A connected group of pattern agents with their internal bonds resolved.
///
/// A label that appears twice inside the group becomes a link between the two
/// sites. A label that appears once is bound to something outside the group and
/// matches like `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternComplex {
    agents: Vec<Agent>,
    /// Index of each agent in the expression it came from.
    origin: Vec<usize>,
    /// `links[agent][site]` is the linked `(agent, site)` position, if any.
    links: Vec<Vec<Option<(usize, usize)>>>,
}

impl PatternComplex {
    /// Builds the pattern complex made of `indices` from `expr`.
    pub fn new(expr: &Expression, indices: &[usize]) -> Self {
        let agents: Vec<Agent> = indices.iter().map(|&i| expr.agents()[i].clone()).collect();
        let sub = Expression::new(agents.clone());
        let mut links: Vec<Vec<Option<(usize, usize)>>> =
            agents.iter().map(|a| vec![None; a.sites().len()]).collect();
        for ends in sub.label_sites().values() {
            if let &[x, y] = ends.as_slice() {
                links[x.0][x.1] = Some(y);
                links[y.0][y.1] = Some(x);
            }
        }
        Self {
            agents,
            origin: indices.to_vec(),
            links,
        }
    }

    /// Splits an expression into its connected pattern complexes.
    pub fn from_expression(expr: &Expression) -> Vec<PatternComplex> {
        expr.components()
            .iter()
            .map(|indices| Self::new(expr, indices))
            .collect()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Expression index of the agent at `position`.
    pub fn origin(&self, position: usize) -> Option<usize> {
        self.origin.get(position).copied()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Linked `(agent, site)` for the site at `(agent, site)`.
    pub fn link(&self, agent: usize, site: usize) -> Option<(usize, usize)> {
        self.links.get(agent)?.get(site).copied().flatten()
    }

    /// Returns `true` if `self` embeds into `other`, reading `other` as if it
    /// were a mixture complex.
    pub fn embeds_into(&self, other: &PatternComplex) -> bool {
        if self.is_empty() {
            return true;
        }
        if self.len() > other.len() {
            return false;
        }
        (0..other.len()).any(|start| self.embeds_from(other, start))
    }

    fn embeds_from(&self, other: &PatternComplex, start: usize) -> bool {
        if !match_agent(&self.agents[0], &other.agents[start]) {
            return false;
        }
        let mut image = vec![None; self.len()];
        let mut used = vec![false; other.len()];
        image[0] = Some(start);
        used[start] = true;
        let mut stack = vec![0];
        while let Some(p) = stack.pop() {
            let Some(img) = image[p] else {
                return false;
            };
            for (si, site) in self.agents[p].sites().iter().enumerate() {
                let Some((q, qsi)) = self.link(p, si) else {
                    continue;
                };
                let Some(osi) = other.agents[img].site_index(&site.name) else {
                    return false;
                };
                let Some((r, rsi)) = other.link(img, osi) else {
                    return false;
                };
                if other.agents[r].sites()[rsi].name != self.agents[q].sites()[qsi].name {
                    return false;
                }
                match image[q] {
                    Some(existing) if existing != r => return false,
                    Some(_) => {}
                    None => {
                        if used[r] || !match_agent(&self.agents[q], &other.agents[r]) {
                            return false;
                        }
                        image[q] = Some(r);
                        used[r] = true;
                        stack.push(q);
                    }
                }
            }
        }
        image.iter().all(Option::is_some)
    }
}

/// Assignment of every pattern agent to a distinct mixture agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedding {
    targets: Vec<AgentId>,
}

impl Embedding {
    pub fn targets(&self) -> &[AgentId] {
        &self.targets
    }
}

/// Returns `true` if `pattern` embeds into `candidate`.
pub fn match_complex(pattern: &PatternComplex, mixture: &Mixture, candidate: &Complex) -> bool {
    embed_complex(pattern, mixture, candidate).is_some()
}

/// Finds an injective, bond-preserving embedding of `pattern` into `candidate`.
///
/// Every candidate agent matching the pattern's first agent is tried as an
/// anchor; from an anchor the rest of the embedding is forced by following
/// linked sites to their bonded partners through the same site names.
///
/// # Determinism
/// Anchors are tried in ascending id order, so the embedding returned for a
/// given mixture is stable.
pub fn embed_complex(pattern: &PatternComplex, mixture: &Mixture, candidate: &Complex) -> Option<Embedding> {
    if pattern.len() > candidate.len() {
        return None;
    }
    let Some(anchor) = pattern.agents.first() else {
        return Some(Embedding { targets: Vec::new() });
    };
    candidate.agents().iter().find_map(|&start| {
        let agent = mixture.agent(start)?;
        if !match_agent(anchor, agent) {
            return None;
        }
        extend(pattern, mixture, start)
    })
}

fn extend(pattern: &PatternComplex, mixture: &Mixture, start: AgentId) -> Option<Embedding> {
    let mut image: Vec<Option<AgentId>> = vec![None; pattern.len()];
    let mut used = HashSet::from([start]);
    image[0] = Some(start);
    let mut stack = vec![0];

    while let Some(p) = stack.pop() {
        let concrete = image[p]?;
        for (si, site) in pattern.agents[p].sites().iter().enumerate() {
            let Some((q, qsi)) = pattern.link(p, si) else {
                continue;
            };
            let partner = mixture.binding_partner(concrete, &site.name).ok()??;
            if partner.site != pattern.agents[q].sites()[qsi].name {
                return None;
            }
            match image[q] {
                Some(existing) => {
                    if existing != partner.agent {
                        return None;
                    }
                }
                None => {
                    if used.contains(&partner.agent) {
                        return None;
                    }
                    if !match_agent(&pattern.agents[q], mixture.agent(partner.agent)?) {
                        return None;
                    }
                    image[q] = Some(partner.agent);
                    used.insert(partner.agent);
                    stack.push(q);
                }
            }
        }
    }

    let targets = image.into_iter().collect::<Option<Vec<_>>>()?;
    Some(Embedding { targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::{get_complex, get_complexes};

    fn agent(text: &str) -> Agent {
        text.parse().unwrap()
    }

    fn mixture(text: &str) -> Mixture {
        Mixture::from_expression(&text.parse().unwrap()).unwrap()
    }

    fn pattern(text: &str) -> PatternComplex {
        let mut complexes = PatternComplex::from_expression(&text.parse().unwrap());
        assert_eq!(complexes.len(), 1, "fixture must be connected");
        complexes.remove(0)
    }

    /// Reference matcher: tries every injective assignment.
    fn brute_force(p: &PatternComplex, m: &Mixture, c: &Complex) -> bool {
        fn go(p: &PatternComplex, m: &Mixture, c: &Complex, image: &mut Vec<AgentId>) -> bool {
            if image.len() == p.len() {
                return (0..p.len()).all(|a| {
                    p.agents()[a].sites().iter().enumerate().all(|(si, site)| match p.link(a, si) {
                        None => true,
                        Some((q, qsi)) => {
                            m.binding_partner(image[a], &site.name).unwrap()
                                == Some(crate::mixture::SiteRef::new(
                                    image[q],
                                    p.agents()[q].sites()[qsi].name.clone(),
                                ))
                        }
                    })
                });
            }
            let next = &p.agents()[image.len()];
            for &id in c.agents() {
                if image.contains(&id) || !match_agent(next, m.agent(id).unwrap()) {
                    continue;
                }
                image.push(id);
                if go(p, m, c, image) {
                    return true;
                }
                image.pop();
            }
            false
        }
        go(p, m, c, &mut Vec::new())
    }

    #[test]
    fn agent_state_and_binding_rules() {
        let candidate = agent("A(a~u!1,b,c~p)");
        assert!(match_agent(&agent("A"), &candidate));
        assert!(match_agent(&agent("A(a)"), &agent("A(a~u)")));
        assert!(!match_agent(&agent("A(a)"), &candidate), "free pattern vs bonded site");
        assert!(match_agent(&agent("A(a!-)"), &candidate));
        assert!(match_agent(&agent("A(a!7)"), &candidate));
        assert!(match_agent(&agent("A(a!?)"), &candidate));
        assert!(match_agent(&agent("A(b!?)"), &candidate));
        assert!(!match_agent(&agent("A(b!-)"), &candidate));
        assert!(match_agent(&agent("A(a~u!-,c)"), &candidate));
        assert!(!match_agent(&agent("A(c~u)"), &candidate));
        assert!(!match_agent(&agent("A(d)"), &candidate), "missing site");
        assert!(!match_agent(&agent("B"), &candidate));
    }

    #[test]
    fn unset_candidate_state_only_satisfies_unset_pattern() {
        assert!(!match_agent(&agent("A(s~u)"), &agent("A(s)")));
        assert!(match_agent(&agent("A(s)"), &agent("A(s)")));
    }

    #[test]
    fn pattern_matches_part_of_a_complex() {
        let m = mixture("A(b!1,c!2),B(a!1,d~u),C(a!2)");
        let p = pattern("A(c!-,b!1),B(a!1)");
        let complexes = get_complexes(&m).unwrap();
        assert_eq!(complexes.len(), 1);
        assert!(match_complex(&p, &m, &complexes[0]));
        let e = embed_complex(&p, &m, &complexes[0]).unwrap();
        let ids: Vec<_> = m.ids().collect();
        assert_eq!(e.targets(), &[ids[0], ids[1]]);

        // Bonded through the wrong site name.
        let wrong = pattern("A(c!1),B(a!1)");
        assert!(!match_complex(&wrong, &m, &complexes[0]));
    }

    #[test]
    fn smaller_candidate_never_matches() {
        let m = mixture("A(a!1),A(a!1),A(a)");
        let lone = get_complex(&m, m.ids().nth(2).unwrap()).unwrap();
        assert!(!match_complex(&pattern("A(a!1),A(a!1)"), &m, &lone));
        assert!(match_complex(&pattern("A(a)"), &m, &lone));
    }

    #[test]
    fn embedding_is_injective() {
        // A dimer pattern must not map both ends onto one agent with a self loop.
        let m = mixture("A(a!1,b!1)");
        let c = get_complex(&m, m.ids().next().unwrap()).unwrap();
        assert!(!match_complex(&pattern("A(a!1),A(a!1)"), &m, &c));
        assert!(match_complex(&pattern("A(a!1,b!1)"), &m, &c));
    }

    #[test]
    fn cycles_terminate() {
        let m = mixture("A(l!1,r!2),A(l!2,r!3),A(l!3,r!1)");
        let c = get_complex(&m, m.ids().next().unwrap()).unwrap();
        assert!(match_complex(&pattern("A(l!1,r!2),A(l!2,r!3),A(l!3,r!1)"), &m, &c));
        assert!(match_complex(&pattern("A(r!1),A(l!1)"), &m, &c));
        assert!(!match_complex(&pattern("A(l!1,r!2),A(l!2,r!1)"), &m, &c));
    }

    #[test]
    fn agrees_with_brute_force() {
        let mixtures = [
            "A(a!1,b!2),B(x!1,y~p),B(x!2,y~u)",
            "A(a!1),B(x!1,y!2),A(a!2)",
            "A(l!1,r!2),A(l!2,r!3),A(l!3,r!4),A(l!4,r!5),A(l!5,r!1)",
            "A(a!1,b),B(x!1,y!2),C(z!2,w~q)",
            "A(a,b),B(x,y~p)",
        ];
        let patterns = [
            "A(a!1),B(x!1)",
            "A(a!1,b!2),B(x!1),B(x!2,y~u)",
            "B(y~p)",
            "B(x!1,y!2),A(a!2)",
            "A(l!1),A(r!1)",
            "A(l!1,r!2),A(r!1),A(l!2)",
            "B(x!1),C(z!1,w~q)",
            "A(b!-)",
            "A(a!1,b!?),B(x!1,y!-)",
            "A(a,b)",
        ];
        for mtext in mixtures {
            let m = mixture(mtext);
            for c in get_complexes(&m).unwrap() {
                for ptext in patterns {
                    let p = pattern(ptext);
                    assert_eq!(
                        match_complex(&p, &m, &c),
                        brute_force(&p, &m, &c),
                        "pattern {} on {} in {}",
                        ptext,
                        c,
                        mtext
                    );
                }
            }
        }
    }

    #[test]
    fn compatibility_is_symmetric_over_approximation() {
        assert!(agents_compatible(&agent("A(a!1)"), &agent("A(a!-)")));
        assert!(agents_compatible(&agent("A(a)"), &agent("A(b~p)")));
        assert!(!agents_compatible(&agent("A(a)"), &agent("A(a!1)")));
        assert!(!agents_compatible(&agent("A(a!1)"), &agent("A(a)")));
        assert!(agents_compatible(&agent("A(a!?)"), &agent("A(a)")));
        assert!(!agents_compatible(&agent("A(s~u)"), &agent("A(s~p)")));
        assert!(!agents_compatible(&agent("A"), &agent("B")));
    }

    #[test]
    fn pattern_subsumption_follows_links() {
        assert!(pattern("A(a!1),B(b!1)").embeds_into(&pattern("B(b!5),A(a!5)")));
        assert!(!pattern("A(a!1),B(b!1)").embeds_into(&pattern("A(a!1),B(c!1)")));
        assert!(pattern("A").embeds_into(&pattern("A(a)")));
        assert!(!pattern("A(a)").embeds_into(&pattern("A")));
        assert!(!pattern("A(a)").embeds_into(&pattern("A(a!-)")));
        assert!(pattern("A(a!-)").embeds_into(&pattern("A(a!1),B(b!1)")));
        assert!(pattern("A(s)").embeds_into(&pattern("A(s~p)")));
        assert!(!pattern("A(s~u)").embeds_into(&pattern("A(s~p)")));
        assert!(!pattern("A(a!1),A(a!1)").embeds_into(&pattern("A(a)")));
    }
}
