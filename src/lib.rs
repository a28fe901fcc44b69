//! Sink: a stochastic simulator for rule-based Kappa reaction systems.
//!
//! This crate provides:
//! - a site graph of agents and bonds (the *mixture*) with stable agent ids;
//! - Kappa notation for agents, expressions, rules and system files;
//! - rule compilation into elementary graph edits;
//! - an incrementally maintained index of rule matches;
//! - event sampling with Gillespie's direct method.
//!
//! # Incremental Matching
//!
//! Every event touches a handful of agents, so the engine never rescans the
//! mixture. The matching map records, per rule and per left-hand complex, the
//! mixture complexes it matches; the lift map inverts it per agent. After an
//! event the entries of the touched agents are re-tested (negative update) and
//! only the rules the fired rule can activate are tested against the touched
//! complexes (positive update).
//!
//! # References
//!
//! - Danos, Laneve. "Formal molecular biology" (2004) – the κ-calculus
//! - Danos, Feret, Fontana, Krivine. "Scalable simulation of cellular signaling networks" (2007)
//! - Gillespie, D.T. "Exact stochastic simulation of coupled chemical reactions" (1977)
//!
//! # Example
//!
//! ```
//! use sink::prelude::*;
//!
//! let mixture = Mixture::from_expression(&"A(a!1),A(a!1),B".parse().unwrap()).unwrap();
//! let rules = vec!["A(a!1),A(a!1) -> A(a),A(a) [1]".parse::<Rule>().unwrap()];
//! let config = SimulationConfig { seed: Some(7), ..SimulationConfig::default() };
//! let mut engine = SimulationEngine::new(mixture, rules, config).unwrap();
//!
//! assert!(matches!(engine.iterate().unwrap(), EventOutcome::Fired { rule: 0, .. }));
//! assert_eq!(engine.mixture().to_string(), "A(a),A(a),B");
//! assert_eq!(engine.iterate().unwrap(), EventOutcome::NoEvent);
//! ```

pub mod agent;
pub mod arena;
pub mod checkpoint;
pub mod complex;
pub mod dependency;
pub mod fingerprint;
pub mod index;
pub mod mixture;
pub mod notation;
pub mod pattern;
pub mod rule;
pub mod scheduler;
pub mod system;

pub use agent::{Agent, BindingState, BondLabel, Expression, Site};
pub use arena::AgentId;
pub use checkpoint::{Checkpoint, CheckpointError};
pub use mixture::{Mixture, MixtureError, SiteRef};
pub use rule::{Delta, ElementaryAction, Rule, RuleError};
pub use system::{DeltaOutcome, EventOutcome, SimulationConfig, SimulationEngine, SimulationError};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::agent::{Agent, AgentError, BindingState, BondLabel, Expression, Site};
    pub use crate::arena::AgentId;
    pub use crate::checkpoint::{Checkpoint, CheckpointError};
    pub use crate::complex::{complex_census, get_complex, get_complexes, render_complex, Complex};
    pub use crate::dependency::DependencyGraph;
    pub use crate::fingerprint::HashValue;
    pub use crate::index::{MatchingIndex, PatternSlot};
    pub use crate::mixture::{Mixture, MixtureError, SiteRef};
    pub use crate::notation::{parse_description, Description, ParseError};
    pub use crate::pattern::{embed_complex, match_agent, match_complex, PatternComplex};
    pub use crate::rule::{Delta, ElementaryAction, Rule, RuleError};
    pub use crate::scheduler::{Event, Scheduler, SchedulerError};
    pub use crate::system::{DeltaOutcome, EventOutcome, SimulationConfig, SimulationEngine, SimulationError};
}
