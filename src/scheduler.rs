//! Gillespie direct-method event sampling.
//!
//! The scheduler only holds the per-rule activities. Drawing an event takes
//! the random source by reference, so the engine that owns the generator
//! decides how it is seeded and shared.
//!
//! # Citations
//! - Gillespie, "Exact stochastic simulation of coupled chemical reactions" (1977)

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("no activity registered for rule {0}")]
    UnknownRule(usize),
    #[error("activity {value} of rule {rule} is not a finite non-negative number")]
    InvalidActivity { rule: usize, value: f64 },
}

/// The next event: which rule fires and after how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub rule: usize,
    pub dt: f64,
}

/// Per-rule activities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scheduler {
    activities: Vec<f64>,
}

impl Scheduler {
    /// A scheduler for `rules` rules, all with zero activity.
    pub fn new(rules: usize) -> Self {
        Self {
            activities: vec![0.0; rules],
        }
    }

    pub fn set_activity(&mut self, rule: usize, value: f64) -> Result<(), SchedulerError> {
        if !value.is_finite() || value < 0.0 {
            return Err(SchedulerError::InvalidActivity { rule, value });
        }
        let slot = self
            .activities
            .get_mut(rule)
            .ok_or(SchedulerError::UnknownRule(rule))?;
        *slot = value;
        Ok(())
    }

    pub fn activity(&self, rule: usize) -> Result<f64, SchedulerError> {
        self.activities
            .get(rule)
            .copied()
            .ok_or(SchedulerError::UnknownRule(rule))
    }

    pub fn activities(&self) -> &[f64] {
        &self.activities
    }

    pub fn total(&self) -> f64 {
        self.activities.iter().sum()
    }

    /// Samples the next event, or `None` when no rule can fire.
    ///
    /// `dt = -ln(r1) / a0` and the rule is the first whose running activity
    /// sum reaches `r2 * a0`, with `r1`, `r2` uniform on (0, 1). If rounding
    /// leaves the target above the final sum, the last active rule is taken.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Event> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        let r1 = open_unit(rng);
        let r2 = open_unit(rng);
        let dt = -r1.ln() / total;
        let target = r2 * total;

        let mut cumsum = 0.0;
        let mut last_active = None;
        for (rule, &a) in self.activities.iter().enumerate() {
            if a <= 0.0 {
                continue;
            }
            cumsum += a;
            last_active = Some(rule);
            if cumsum >= target {
                return Some(Event { rule, dt });
            }
        }
        last_active.map(|rule| Event { rule, dt })
    }
}

/// Uniform on the open interval (0, 1).
fn open_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let u = rng.gen::<f64>();
        if u > 0.0 {
            return u;
        }
    }
}
