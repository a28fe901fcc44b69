//! The simulation engine: one stochastic event at a time.
//!
//! `SimulationEngine` owns the mixture, the compiled rules, the matching
//! index, the dependency maps, the scheduler and the random source. Each call
//! to [`SimulationEngine::iterate`] draws a rule, selects one matched complex
//! per left-hand complex, applies the rule and folds the resulting delta back
//! into the index before refreshing the activities that may have moved.
//!
//! # Invariant
//! Between events the matching index equals a fresh build on the live mixture
//! and every activity equals the one recomputed from it.
//! [`SimulationEngine::verify_index`] checks exactly that.
//!
//! # Determinism
//! With a seeded configuration, two engines built from the same input produce
//! identical event sequences.

use crate::agent::Agent;
use crate::arena::AgentId;
use crate::checkpoint::Checkpoint;
use crate::complex::Complex;
use crate::dependency::DependencyGraph;
use crate::index::{MatchingIndex, PatternSlot};
use crate::mixture::{Mixture, MixtureError};
use crate::notation::{parse_agent, parse_description, ParseError};
use crate::pattern::match_agent;
use crate::rule::{Rule, RuleError};
use crate::scheduler::{Event, Scheduler, SchedulerError};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Consecutive void events tolerated before the run is declared deadlocked.
pub const DEFAULT_DEADLOCK_CRITERIA: usize = 20;

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub deadlock_criteria: usize,
    /// Seed for the event generator; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            deadlock_criteria: DEFAULT_DEADLOCK_CRITERIA,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Mixture(#[from] MixtureError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("deadlock: {0} consecutive void events")]
    Deadlock(usize),
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("matching index drifted from the mixture")]
    IndexCorrupted,
}

/// What one call to [`SimulationEngine::iterate`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventOutcome {
    /// Total activity is zero; nothing changed.
    NoEvent,
    /// The selected complexes clashed; only the clock and counters moved.
    Void { rule: usize },
    Fired { rule: usize, dt: f64 },
}

/// What [`SimulationEngine::apply_external_delta`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    Applied { created: Vec<AgentId>, removed: Vec<AgentId> },
    /// The peer asked the run to stop.
    Terminate,
}

pub struct SimulationEngine<R = StdRng> {
    mixture: Mixture,
    rules: Vec<Rule>,
    index: MatchingIndex,
    dependencies: DependencyGraph,
    scheduler: Scheduler,
    rng: R,
    config: SimulationConfig,
    time: f64,
    iterations: u64,
    void_events: usize,
}

impl SimulationEngine<StdRng> {
    /// Builds an engine whose generator is seeded from `config`.
    pub fn new(mixture: Mixture, rules: Vec<Rule>, config: SimulationConfig) -> Result<Self, SimulationError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(mixture, rules, config, rng)
    }

    /// Builds an engine from a system file.
    pub fn from_description(text: &str, config: SimulationConfig) -> Result<Self, SimulationError> {
        let description = parse_description(text)?;
        let mut mixture = Mixture::new();
        for init in &description.inits {
            for _ in 0..init.copies {
                mixture.create_all(init.expression.agents().to_vec())?;
            }
        }
        let rules = description
            .rules
            .into_iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(mixture, rules, config)
    }
}

impl<R: Rng> SimulationEngine<R> {
    pub fn with_rng(mixture: Mixture, rules: Vec<Rule>, config: SimulationConfig, rng: R) -> Result<Self, SimulationError> {
        mixture.check_bonds()?;
        let index = MatchingIndex::build(&mixture, &rules)?;
        let dependencies = DependencyGraph::build(&rules);
        debug!(
            "engine: {} agents, {} rules, {} activation edges, {} inhibition edges",
            mixture.len(),
            rules.len(),
            (0..rules.len())
                .filter_map(|r| dependencies.activation(r))
                .map(<[usize]>::len)
                .sum::<usize>(),
            (0..rules.len())
                .filter_map(|r| dependencies.inhibition(r))
                .map(<[usize]>::len)
                .sum::<usize>(),
        );
        let scheduler = Scheduler::new(rules.len());
        let mut engine = Self {
            mixture,
            rules,
            index,
            dependencies,
            scheduler,
            rng,
            config,
            time: 0.0,
            iterations: 0,
            void_events: 0,
        };
        let all: BTreeSet<usize> = (0..engine.rules.len()).collect();
        engine.update_activities(&all)?;
        Ok(engine)
    }

    /// Runs one event.
    pub fn iterate(&mut self) -> Result<EventOutcome, SimulationError> {
        let Some(Event { rule, dt }) = self.scheduler.draw(&mut self.rng) else {
            return Ok(EventOutcome::NoEvent);
        };
        self.time += dt;
        self.iterations += 1;
        trace!("event {}: rule {} after dt = {}", self.iterations, rule, dt);

        let selection = self.select_matchings(rule)?;
        if has_clash(&selection) {
            self.void_events += 1;
            debug!(
                "event {}: clash in rule {}, {} consecutive void events",
                self.iterations, rule, self.void_events
            );
            if self.void_events >= self.config.deadlock_criteria {
                return Err(SimulationError::Deadlock(self.void_events));
            }
            return Ok(EventOutcome::Void { rule });
        }
        self.void_events = 0;

        let delta = self.rules[rule].apply(&mut self.mixture, &selection)?;
        let mut changed = self.negative_update(&delta.modified_agents(), &delta.removed_agents());
        let mut candidates: BTreeSet<usize> = self
            .dependencies
            .activation(rule)
            .ok_or_else(|| SimulationError::Lookup(format!("no activation entry for rule {}", rule)))?
            .iter()
            .copied()
            .collect();
        candidates.extend(changed.iter().copied());
        changed.extend(self.positive_update(&delta.touched_agents(), &candidates)?);
        self.update_activities(&changed)?;
        Ok(EventOutcome::Fired { rule, dt })
    }

    /// Drops matches broken by changes to `modified` and the removal of
    /// `removed`. Returns the rules whose matches changed.
    pub fn negative_update(&mut self, modified: &BTreeSet<AgentId>, removed: &BTreeSet<AgentId>) -> BTreeSet<usize> {
        self.index
            .negative_update(&self.mixture, &self.rules, modified, removed)
    }

    /// Adds matches involving `touched` for the `candidates` rules. Returns the
    /// rules that gained a match.
    pub fn positive_update(
        &mut self,
        touched: &BTreeSet<AgentId>,
        candidates: &BTreeSet<usize>,
    ) -> Result<BTreeSet<usize>, SimulationError> {
        Ok(self
            .index
            .positive_update(&self.mixture, &self.rules, touched, candidates)?)
    }

    /// Recomputes the activity of each listed rule from the index.
    pub fn update_activities(&mut self, rules: &BTreeSet<usize>) -> Result<(), SimulationError> {
        for &r in rules {
            let rule = self
                .rules
                .get(r)
                .ok_or_else(|| SimulationError::Lookup(format!("unknown rule {}", r)))?;
            let counts = self
                .index
                .match_counts(r)
                .ok_or_else(|| SimulationError::Lookup(format!("rule {} is not indexed", r)))?;
            self.scheduler.set_activity(r, rule.activity(counts))?;
        }
        Ok(())
    }

    /// Folds an update from an external peer into the run.
    ///
    /// `Die` asks the run to stop. Otherwise the text is a sequence of
    /// `+Agent` (create) and `-Agent` (destroy the first live agent matching
    /// the pattern) items. Added agents are inserted as one batch, so they may
    /// be bonded to each other.
    pub fn apply_external_delta(&mut self, update: &str) -> Result<DeltaOutcome, SimulationError> {
        let update = update.trim();
        if update == "Die" {
            info!("external peer requested termination");
            return Ok(DeltaOutcome::Terminate);
        }

        let mut added: Vec<Agent> = Vec::new();
        let mut patterns: Vec<Agent> = Vec::new();
        for (sign, text) in split_signed(update)? {
            let agent = parse_agent(text)?;
            if sign == '+' {
                added.push(agent);
            } else {
                patterns.push(agent);
            }
        }

        let created = self.mixture.create_all(added)?;
        let mut removed = Vec::new();
        let mut freed = BTreeSet::new();
        for pattern in &patterns {
            let target = self
                .mixture
                .iter()
                .find(|(_, agent)| match_agent(pattern, agent))
                .map(|(id, _)| id);
            let Some(id) = target else {
                warn!("external delta: no live agent matches `{}`", pattern);
                continue;
            };
            let (_, partners) = self.mixture.destroy(id)?;
            freed.extend(partners.into_iter().map(|s| s.agent));
            removed.push(id);
        }
        debug!(
            "external delta: {} created, {} removed",
            created.len(),
            removed.len()
        );

        let removed_set: BTreeSet<AgentId> = removed.iter().copied().collect();
        freed.retain(|a| !removed_set.contains(a));
        let mut changed = self.negative_update(&freed, &removed_set);
        let mut touched = freed;
        touched.extend(created.iter().copied().filter(|a| !removed_set.contains(a)));
        let all: BTreeSet<usize> = (0..self.rules.len()).collect();
        changed.extend(self.positive_update(&touched, &all)?);
        self.update_activities(&changed)?;
        Ok(DeltaOutcome::Applied { created, removed })
    }

    /// Compares the incremental index and activities against a fresh build.
    pub fn verify_index(&self) -> Result<(), SimulationError> {
        let fresh = MatchingIndex::build(&self.mixture, &self.rules)?;
        if fresh != self.index {
            return Err(SimulationError::IndexCorrupted);
        }
        for (r, rule) in self.rules.iter().enumerate() {
            let counts = fresh
                .match_counts(r)
                .ok_or_else(|| SimulationError::Lookup(format!("rule {} is not indexed", r)))?;
            if self.scheduler.activity(r)? != rule.activity(counts) {
                return Err(SimulationError::IndexCorrupted);
            }
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.time, self.iterations, self.void_events, &self.mixture)
    }

    /// Uniformly picks one matched complex for each left-hand complex.
    fn select_matchings(&mut self, rule: usize) -> Result<Vec<Complex>, SimulationError> {
        let slots = self
            .rules
            .get(rule)
            .ok_or_else(|| SimulationError::Lookup(format!("unknown rule {}", rule)))?
            .lhs_complexes()
            .len();
        let mut selection = Vec::with_capacity(slots);
        for c in 0..slots {
            let matches = self
                .index
                .matches(PatternSlot::new(rule, c))
                .filter(|set| !set.is_empty())
                .ok_or_else(|| SimulationError::Lookup(format!("rule {} complex {} has no match", rule, c)))?;
            let pick = self.rng.gen_range(0..matches.len());
            let complex = matches
                .iter()
                .nth(pick)
                .cloned()
                .ok_or_else(|| SimulationError::Lookup(format!("rule {} complex {} has no match", rule, c)))?;
            selection.push(complex);
        }
        Ok(selection)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Consecutive void events since the last fired event.
    pub fn void_events(&self) -> usize {
        self.void_events
    }

    pub fn mixture(&self) -> &Mixture {
        &self.mixture
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn activities(&self) -> &[f64] {
        self.scheduler.activities()
    }

    pub fn matching_index(&self) -> &MatchingIndex {
        &self.index
    }

    pub fn activation_map(&self, rule: usize) -> Option<&[usize]> {
        self.dependencies.activation(rule)
    }

    pub fn inhibition_map(&self, rule: usize) -> Option<&[usize]> {
        self.dependencies.inhibition(rule)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

/// `true` if two slots selected the same complex.
fn has_clash(selection: &[Complex]) -> bool {
    let mut seen = BTreeSet::new();
    !selection.iter().all(|c| seen.insert(c))
}

/// Splits `+A(a)-B(b!-)` into signed agent texts, at parenthesis depth 0.
fn split_signed(update: &str) -> Result<Vec<(char, &str)>, ParseError> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<(char, usize)> = None;
    for (i, c) in update.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ParseError::Unbalanced(update.to_owned()))?;
            }
            '+' | '-' if depth == 0 => {
                if let Some((sign, start)) = current.take() {
                    items.push((sign, update[start..i].trim()));
                }
                current = Some((c, i + 1));
            }
            _ if current.is_none() && !c.is_whitespace() => {
                return Err(ParseError::InvalidName(update.to_owned()));
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced(update.to_owned()));
    }
    if let Some((sign, start)) = current {
        items.push((sign, update[start..].trim()));
    }
    Ok(items)
}
