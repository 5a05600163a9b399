//! Anomaly detector.
//!
//! Scores run from 0 to 100 where **higher means more normal**: the
//! heuristic grows with resource usage, and the model score is
//! `50 - 25 * z` of the calibrated decision function.

use std::path::Path;

use tracing::trace;

use super::model::ModelArtifact;
use super::{EngineKind, FallbackNeeded, Features, Mode, ScoringEngine, Strategy};

/// Standard deviations at or below this are treated as 1.
const MIN_STD: f64 = 1e-6;

/// Weighted resource usage scaled to 0..=100, rounded.
pub fn heuristic_score(f: &Features) -> u8 {
    let value = (f.cpu / 100.0) * 0.45
        + (f.memory / 100.0) * 0.30
        + (f.threads / 50.0) * 0.10
        + (f.io_read + f.io_write) / 1e6 * 0.15;
    let scaled = value * 100.0;
    if scaled.is_nan() {
        return 0;
    }
    scaled.clamp(0.0, 100.0).round() as u8
}

/// Maps a raw decision value to 0..=100 using calibration statistics.
pub fn calibrated_score(raw: f64, mean: f64, std: f64) -> u8 {
    let std = if std > MIN_STD { std } else { 1.0 };
    let z = (raw - mean) / std;
    let score = 50.0 - z * 25.0;
    if score.is_nan() {
        return 0;
    }
    // truncation, not rounding
    score.clamp(0.0, 100.0) as u8
}

/// Anomaly detector over `Features::anomaly_vector`.
///
/// A failed model evaluation scores 0.
#[derive(Debug)]
pub struct AnomalyDetector {
    strategy: Strategy,
}

impl AnomalyDetector {
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
            strategy: Strategy::load(EngineKind::Anomaly, path),
        }
    }

    fn model_score(artifact: &ModelArtifact, features: &Features) -> Result<u8, FallbackNeeded> {
        let raw = artifact.infer_value(&features.anomaly_vector())?;
        let calibration = artifact.calibration();
        Ok(calibrated_score(raw, calibration.mean, calibration.std))
    }
}

impl ScoringEngine for AnomalyDetector {
    type Output = u8;

    fn kind(&self) -> EngineKind {
        EngineKind::Anomaly
    }

    fn mode(&self) -> Mode {
        self.strategy.mode()
    }

    fn evaluate(&self, features: &Features) -> u8 {
        match &self.strategy {
            Strategy::Heuristic => heuristic_score(features),
            Strategy::ModelBacked(artifact) => Self::model_score(artifact, features)
                .unwrap_or_else(|fallback| {
                    trace!(error = %fallback.0, "anomaly model failed, scoring 0");
                    0
                }),
        }
    }
}
