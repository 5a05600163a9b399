//! Remaining-lifetime predictor.

use std::path::Path;

use tracing::trace;

use super::model::ModelArtifact;
use super::{EngineKind, FallbackNeeded, Features, Mode, ScoringEngine, Strategy};

pub const MIN_HEURISTIC_SECONDS: f64 = 60.0;
pub const MAX_HEURISTIC_SECONDS: f64 = 86_400.0;

/// `uptime * 0.05 + (100 - cpu) * 8 - memory * 2`, clamped to a minute..a day
/// and rounded.
pub fn heuristic_seconds(f: &Features) -> u64 {
    let estimate = f.uptime * 0.05 + (100.0 - f.cpu) * 8.0 - f.memory * 2.0;
    if estimate.is_nan() {
        return MIN_HEURISTIC_SECONDS as u64;
    }
    estimate
        .clamp(MIN_HEURISTIC_SECONDS, MAX_HEURISTIC_SECONDS)
        .round() as u64
}

/// Predicts how many more seconds a process will run.
///
/// Model output is floored at 1 second but has no upper bound.
#[derive(Debug)]
pub struct LifetimePredictor {
    strategy: Strategy,
}

impl LifetimePredictor {
    pub fn heuristic() -> Self {
        Self {
            strategy: Strategy::Heuristic,
        }
    }

    pub fn with_model(artifact: ModelArtifact) -> Self {
        Self {
            strategy: Strategy::ModelBacked(artifact),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self {
            strategy: Strategy::load(EngineKind::Lifetime, path),
        }
    }

    fn model_seconds(artifact: &ModelArtifact, features: &Features) -> Result<u64, FallbackNeeded> {
        let predicted = artifact.infer_value(&features.lifetime_vector())?;
        // `as` saturates at u64::MAX
        Ok(predicted.max(1.0) as u64)
    }
}

impl ScoringEngine for LifetimePredictor {
    type Output = u64;

    fn kind(&self) -> EngineKind {
        EngineKind::Lifetime
    }

    fn mode(&self) -> Mode {
        self.strategy.mode()
    }

    fn evaluate(&self, features: &Features) -> u64 {
        match &self.strategy {
            Strategy::Heuristic => heuristic_seconds(features),
            Strategy::ModelBacked(artifact) => Self::model_seconds(artifact, features)
                .unwrap_or_else(|fallback| {
                    trace!(error = %fallback.0, "lifetime model failed, using heuristic");
                    heuristic_seconds(features)
                }),
        }
    }
}
