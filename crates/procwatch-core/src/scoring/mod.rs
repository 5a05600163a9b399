//! Per-process scoring.
//!
//! Three engines derive a category, an anomaly score and a remaining-lifetime
//! estimate from the same `Features`. Each engine is either model-backed
//! (a `ModelArtifact` loaded from the model directory) or heuristic; a
//! model-backed engine falls back per call when inference fails.

pub mod anomaly;
pub mod categorizer;
pub mod lifetime;
pub mod model;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use anomaly::AnomalyDetector;
pub use categorizer::Categorizer;
pub use lifetime::LifetimePredictor;
pub use model::{ArtifactError, InferenceError, ModelArtifact, Prediction};

use crate::collector::ProcessSnapshot;

/// Artifact file names inside the model directory.
pub const CATEGORIZER_FILE: &str = "categorizer.json";
pub const ANOMALY_FILE: &str = "anomaly.json";
pub const LIFETIME_FILE: &str = "lifetime.json";

/// Scoring inputs of one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub threads: f64,
    pub io_read: f64,
    pub io_write: f64,
    pub ctx_vol: f64,
    pub ctx_invol: f64,
    pub uptime: f64,
}

impl Features {
    /// `[cpu, memory, threads, io_read, io_write, ctx_vol, ctx_invol, uptime]`
    pub fn categorizer_vector(&self) -> [f64; 8] {
        [
            self.cpu,
            self.memory,
            self.threads,
            self.io_read,
            self.io_write,
            self.ctx_vol,
            self.ctx_invol,
            self.uptime,
        ]
    }

    /// `[cpu, memory, threads, io_read, io_write, ctx_vol, ctx_invol]`
    pub fn anomaly_vector(&self) -> [f64; 7] {
        [
            self.cpu,
            self.memory,
            self.threads,
            self.io_read,
            self.io_write,
            self.ctx_vol,
            self.ctx_invol,
        ]
    }

    /// `[uptime, cpu, memory, threads, io_read, io_write]`
    pub fn lifetime_vector(&self) -> [f64; 6] {
        [
            self.uptime,
            self.cpu,
            self.memory,
            self.threads,
            self.io_read,
            self.io_write,
        ]
    }
}

impl From<&ProcessSnapshot> for Features {
    fn from(snap: &ProcessSnapshot) -> Self {
        Self {
            name: snap.name.clone(),
            cpu: snap.cpu_pct,
            memory: snap.mem_pct,
            threads: snap.thread_count as f64,
            io_read: snap.io_read_bytes as f64,
            io_write: snap.io_write_bytes as f64,
            ctx_vol: snap.ctx_voluntary as f64,
            ctx_invol: snap.ctx_involuntary as f64,
            uptime: snap.uptime_seconds as f64,
        }
    }
}

/// Functional category of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Browser,
    Script,
    System,
    Media,
    Database,
    Ide,
    Utility,
    Game,
    Security,
    Other,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Browser,
        Category::Script,
        Category::System,
        Category::Media,
        Category::Database,
        Category::Ide,
        Category::Utility,
        Category::Game,
        Category::Security,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Browser => "browser",
            Category::Script => "script",
            Category::System => "system",
            Category::Media => "media",
            Category::Database => "database",
            Category::Ide => "ide",
            Category::Utility => "utility",
            Category::Game => "game",
            Category::Security => "security",
            Category::Other => "other",
        }
    }

    /// Parses a label case-insensitively.
    pub fn from_label(label: &str) -> Option<Category> {
        let label = label.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All three scores of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub category: Category,
    /// 0..=100, higher is more normal.
    pub anomaly_score: u8,
    pub lifetime_seconds: u64,
}

/// Selects one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Categorizer,
    Anomaly,
    Lifetime,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Categorizer => "categorizer",
            EngineKind::Anomaly => "anomaly",
            EngineKind::Lifetime => "lifetime",
        }
    }
}

/// Output of a single engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Score {
    Category(Category),
    Anomaly(u8),
    Lifetime(u64),
}

/// Which variant an engine is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Heuristic,
    ModelBacked,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Heuristic => f.write_str("heuristic"),
            Mode::ModelBacked => f.write_str("model"),
        }
    }
}

/// Scoring variant of an engine. Fixed for the engine's lifetime.
#[derive(Debug)]
pub enum Strategy {
    Heuristic,
    ModelBacked(ModelArtifact),
}

impl Strategy {
    /// Loads the artifact at `path`, degrading to `Heuristic` on any error.
    pub fn load(engine: EngineKind, path: &Path) -> Self {
        match ModelArtifact::load(path) {
            Ok(artifact) => {
                info!(
                    engine = engine.as_str(),
                    kind = artifact.kind(),
                    scaler = artifact.has_scaler(),
                    "model loaded"
                );
                Strategy::ModelBacked(artifact)
            }
            Err(ArtifactError::Missing(path)) => {
                debug!(
                    engine = engine.as_str(),
                    path = %path.display(),
                    "no model artifact, using heuristic"
                );
                Strategy::Heuristic
            }
            Err(e) => {
                warn!(
                    engine = engine.as_str(),
                    path = %path.display(),
                    error = %e,
                    "failed to load model, using heuristic"
                );
                Strategy::Heuristic
            }
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Strategy::Heuristic => Mode::Heuristic,
            Strategy::ModelBacked(_) => Mode::ModelBacked,
        }
    }
}

/// A model-backed evaluation that must be answered by the fallback path.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackNeeded(pub InferenceError);

impl From<InferenceError> for FallbackNeeded {
    fn from(e: InferenceError) -> Self {
        FallbackNeeded(e)
    }
}

impl fmt::Display for FallbackNeeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fallback needed: {}", self.0)
    }
}

/// A scoring engine.
pub trait ScoringEngine: Send + Sync {
    type Output;

    fn kind(&self) -> EngineKind;

    fn mode(&self) -> Mode;

    /// Scores one process. Never fails.
    fn evaluate(&self, features: &Features) -> Self::Output;
}

/// The three engines, loaded together.
#[derive(Debug)]
pub struct Engines {
    pub categorizer: Categorizer,
    pub anomaly: AnomalyDetector,
    pub lifetime: LifetimePredictor,
}

impl Default for Engines {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl Engines {
    /// Loads every engine from `model_dir`. Never fails.
    pub fn load(model_dir: &Path) -> Self {
        let engines = Self {
            categorizer: Categorizer::from_path(&model_dir.join(CATEGORIZER_FILE)),
            anomaly: AnomalyDetector::from_path(&model_dir.join(ANOMALY_FILE)),
            lifetime: LifetimePredictor::from_path(&model_dir.join(LIFETIME_FILE)),
        };
        info!(
            categorizer = %engines.categorizer.mode(),
            anomaly = %engines.anomaly.mode(),
            lifetime = %engines.lifetime.mode(),
            "scoring engines ready"
        );
        engines
    }

    /// Engines without models.
    pub fn heuristic() -> Self {
        Self {
            categorizer: Categorizer::heuristic(),
            anomaly: AnomalyDetector::heuristic(),
            lifetime: LifetimePredictor::heuristic(),
        }
    }

    pub fn score(&self, features: &Features) -> ScoreResult {
        ScoreResult {
            category: self.categorizer.evaluate(features),
            anomaly_score: self.anomaly.evaluate(features),
            lifetime_seconds: self.lifetime.evaluate(features),
        }
    }

    pub fn evaluate(&self, kind: EngineKind, features: &Features) -> Score {
        match kind {
            EngineKind::Categorizer => Score::Category(self.categorizer.evaluate(features)),
            EngineKind::Anomaly => Score::Anomaly(self.anomaly.evaluate(features)),
            EngineKind::Lifetime => Score::Lifetime(self.lifetime.evaluate(features)),
        }
    }

    pub fn mode(&self, kind: EngineKind) -> Mode {
        match kind {
            EngineKind::Categorizer => self.categorizer.mode(),
            EngineKind::Anomaly => self.anomaly.mode(),
            EngineKind::Lifetime => self.lifetime.mode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn snapshot() -> ProcessSnapshot {
        ProcessSnapshot {
            pid: 7,
            name: "code".to_string(),
            user: None,
            cpu_pct: 5.0,
            mem_pct: 1.2,
            thread_count: 30,
            io_read_bytes: 1000,
            io_write_bytes: 500,
            ctx_voluntary: 20,
            ctx_involuntary: 5,
            start_time: Utc::now(),
            uptime_seconds: 300,
        }
    }

    #[test]
    fn test_feature_vector_order() {
        let f = Features::from(&snapshot());
        assert_eq!(
            f.categorizer_vector(),
            [5.0, 1.2, 30.0, 1000.0, 500.0, 20.0, 5.0, 300.0]
        );
        assert_eq!(f.anomaly_vector(), [5.0, 1.2, 30.0, 1000.0, 500.0, 20.0, 5.0]);
        assert_eq!(f.lifetime_vector(), [300.0, 5.0, 1.2, 30.0, 1000.0, 500.0]);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(Category::from_label("Browser"), Some(Category::Browser));
        assert_eq!(Category::from_label(" ide "), Some(Category::Ide));
        assert_eq!(Category::from_label("spreadsheet"), None);
        assert_eq!(Category::Database.to_string(), "database");
        assert_eq!(serde_json::to_value(Category::Game).unwrap(), json!("game"));
    }

    #[test]
    fn test_heuristic_engines_score() {
        let engines = Engines::heuristic();
        let result = engines.score(&Features::from(&snapshot()));
        assert_eq!(result.category, Category::Ide);
        assert_eq!(result.anomaly_score, 9);
        assert_eq!(result.lifetime_seconds, 773);

        assert_eq!(
            engines.evaluate(EngineKind::Lifetime, &Features::from(&snapshot())),
            Score::Lifetime(773)
        );
    }

    #[test]
    fn test_load_empty_dir_is_heuristic() {
        let dir = TempDir::new().unwrap();
        let engines = Engines::load(dir.path());
        for kind in [EngineKind::Categorizer, EngineKind::Anomaly, EngineKind::Lifetime] {
            assert_eq!(engines.mode(kind), Mode::Heuristic);
        }
    }

    #[test]
    fn test_load_mixed_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(LIFETIME_FILE),
            json!({"kind": "linear", "coefficients": [1.0, 0.0, 0.0, 0.0, 0.0, 0.0], "intercept": 0.0})
                .to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join(ANOMALY_FILE), "[1]").unwrap();

        let engines = Engines::load(dir.path());
        assert_eq!(engines.mode(EngineKind::Lifetime), Mode::ModelBacked);
        assert_eq!(engines.mode(EngineKind::Anomaly), Mode::Heuristic);
        assert_eq!(engines.mode(EngineKind::Categorizer), Mode::Heuristic);

        // the lifetime model echoes uptime
        assert_eq!(
            engines.evaluate(EngineKind::Lifetime, &Features::from(&snapshot())),
            Score::Lifetime(300)
        );
    }

    #[test]
    fn test_score_serializes_untagged() {
        assert_eq!(
            serde_json::to_value(Score::Category(Category::Media)).unwrap(),
            json!("media")
        );
        assert_eq!(serde_json::to_value(Score::Anomaly(42)).unwrap(), json!(42));
    }
}
