//! Strategy generation boundary.
//!
//! A generator turns the user's selected components into a runnable strategy
//! artifact. The reference generator resolves built-in strategies by name.

use replaylab_core::fingerprint::Fingerprint;
use replaylab_core::strategies::{self, BUILTIN};
use replaylab_core::strategy::{Params, Strategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("no signal selected")]
    NoSignal,

    #[error("unknown strategy component: {0}")]
    UnknownComponent(String),

    #[error("generator supports one signal, got {0}")]
    TooManySignals(usize),

    #[error("strategy generation failed: {0}")]
    Failed(String),
}

/// Selected components and their parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub signals: Vec<String>,
    pub exits: Vec<String>,
    pub factors: Vec<String>,
    pub params: Params,
}

/// A reference to something the execution boundary can instantiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyArtifact {
    /// Name of the built-in strategy to run.
    pub strategy: String,
    pub params: Params,
    /// Exit and factor labels carried along for reporting.
    pub components: Vec<String>,
    pub fingerprint: Fingerprint,
}

impl StrategyArtifact {
    pub fn instantiate(&self) -> Result<Box<dyn Strategy>, GenerationError> {
        strategies::by_name(&self.strategy)
            .ok_or_else(|| GenerationError::UnknownComponent(self.strategy.clone()))
    }
}

pub trait StrategyGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<StrategyArtifact, GenerationError>;
}

/// Maps a single built-in signal id to its strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGenerator;

impl StrategyGenerator for ReferenceGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<StrategyArtifact, GenerationError> {
        let signal = match request.signals.as_slice() {
            [] => return Err(GenerationError::NoSignal),
            [one] => one,
            many => return Err(GenerationError::TooManySignals(many.len())),
        };
        if !BUILTIN.contains(&signal.as_str()) {
            return Err(GenerationError::UnknownComponent(signal.clone()));
        }

        let components: Vec<String> = request.exits.iter().chain(&request.factors).cloned().collect();
        let fingerprint = Fingerprint::of(&(signal, &request.params, &components))
            .map_err(|e| GenerationError::Failed(e.to_string()))?;

        Ok(StrategyArtifact {
            strategy: signal.clone(),
            params: request.params.clone(),
            components,
            fingerprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(signals: &[&str]) -> GenerationRequest {
        GenerationRequest {
            signals: signals.iter().map(|s| s.to_string()).collect(),
            ..GenerationRequest::default()
        }
    }

    #[test]
    fn builtin_signal_resolves() {
        let artifact = ReferenceGenerator.generate(&request(&["sma_cross"])).unwrap();
        assert_eq!(artifact.strategy, "sma_cross");
        assert_eq!(artifact.instantiate().unwrap().name(), "sma_cross");
    }

    #[test]
    fn unknown_and_missing_signals_fail() {
        assert_eq!(ReferenceGenerator.generate(&request(&[])), Err(GenerationError::NoSignal));
        assert_eq!(
            ReferenceGenerator.generate(&request(&["martingale"])),
            Err(GenerationError::UnknownComponent("martingale".into()))
        );
        assert_eq!(
            ReferenceGenerator.generate(&request(&["sma_cross", "rsi_reversion"])),
            Err(GenerationError::TooManySignals(2))
        );
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        let mut a = request(&["rsi_reversion"]);
        let b = a.clone();
        a.params.insert("period".into(), 7.0);
        let fa = ReferenceGenerator.generate(&a).unwrap().fingerprint;
        let fb = ReferenceGenerator.generate(&b).unwrap().fingerprint;
        assert_ne!(fa, fb);
    }
}
