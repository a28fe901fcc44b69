//! Simulation snapshots.
//!
//! A checkpoint records the clock, the counters and the rendered mixture
//! together with its fingerprint. Encoding is CBOR. The fingerprint is
//! recomputed on [`Checkpoint::verify`], so a snapshot edited or truncated on
//! disk is rejected before it is trusted.

use crate::fingerprint::HashValue;
use crate::mixture::{Mixture, MixtureError};
use crate::notation::ParseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint encoding failed: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("checkpoint fingerprint {stored} does not match its mixture ({actual})")]
    Fingerprint { stored: HashValue, actual: HashValue },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Mixture(#[from] MixtureError),
}

/// Engine state at one point in simulated time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub time: f64,
    pub iterations: u64,
    pub void_events: usize,
    /// The mixture in its round-trip notation.
    pub mixture: String,
    pub fingerprint: HashValue,
}

impl Checkpoint {
    pub fn new(time: f64, iterations: u64, void_events: usize, mixture: &Mixture) -> Self {
        Self {
            time,
            iterations,
            void_events,
            mixture: mixture.to_string(),
            fingerprint: mixture.fingerprint(),
        }
    }

    /// Checks the stored fingerprint against the stored mixture text.
    pub fn verify(&self) -> Result<(), CheckpointError> {
        let actual = HashValue::hash_with_domain(b"MIXTURE", self.mixture.as_bytes());
        if actual != self.fingerprint {
            return Err(CheckpointError::Fingerprint {
                stored: self.fingerprint,
                actual,
            });
        }
        Ok(())
    }

    /// Rebuilds the mixture. Agent ids are reassigned densely from zero.
    pub fn restore_mixture(&self) -> Result<Mixture, CheckpointError> {
        self.verify()?;
        let expression = self.mixture.parse()?;
        Ok(Mixture::from_expression(&expression)?)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, CheckpointError> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_cbor::from_slice(bytes)?;
        checkpoint.verify()?;
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixture(text: &str) -> Mixture {
        Mixture::from_expression(&text.parse().unwrap()).unwrap()
    }

    #[test]
    fn cbor_round_trip_is_stable() {
        let cp = Checkpoint::new(1.5, 12, 0, &mixture("A(a!1),B(b!1),C(s~u)"));
        let bytes = cp.to_cbor().expect("serialization should succeed");
        let decoded = Checkpoint::from_cbor(&bytes).expect("deserialization should succeed");
        assert_eq!(decoded, cp);
        assert_eq!(decoded.to_cbor().unwrap(), bytes);
    }

    #[test]
    fn tampered_mixture_is_rejected() {
        let mut cp = Checkpoint::new(0.0, 0, 0, &mixture("A(a),B(b)"));
        cp.mixture = "A(a),B(b),B(b)".into();
        assert!(matches!(cp.verify(), Err(CheckpointError::Fingerprint { .. })));
        let bytes = cp.to_cbor().unwrap();
        assert!(Checkpoint::from_cbor(&bytes).is_err());
    }

    #[test]
    fn restore_reproduces_the_rendering() {
        let m = mixture("A(a!1),A(a!1),B,C(s~u)");
        let cp = Checkpoint::new(0.25, 3, 1, &m);
        let restored = cp.restore_mixture().unwrap();
        assert_eq!(restored.to_string(), m.to_string());
        assert_eq!(restored.fingerprint(), cp.fingerprint);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            Checkpoint::from_cbor(&[0xff, 0x00, 0x13]),
            Err(CheckpointError::Cbor(_))
        ));
    }
}
