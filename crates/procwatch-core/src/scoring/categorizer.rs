//! Process categorizer.

use std::path::Path;

use tracing::trace;

use super::model::{InferenceError, ModelArtifact, Prediction};
use super::{Category, EngineKind, FallbackNeeded, Features, Mode, ScoringEngine, Strategy};

/// Name keywords, checked in order; the first match wins.
const KEYWORDS: &[(&str, Category)] = &[
    ("chrome", Category::Browser),
    ("firefox", Category::Browser),
    ("python", Category::Script),
    ("node", Category::Script),
    ("svchost", Category::System),
    ("system", Category::System),
    ("vlc", Category::Media),
    ("spotify", Category::Media),
    ("mysql", Category::Database),
    ("mongod", Category::Database),
    ("code", Category::Ide),
    ("pycharm", Category::Ide),
    ("onedrive", Category::Utility),
    ("backup", Category::Utility),
    ("steam", Category::Game),
    ("valorant", Category::Game),
    ("defender", Category::Security),
    ("kaspersky", Category::Security),
];

/// Categorizes by case-insensitive keyword match on the process name.
pub fn categorize_by_name(name: &str) -> Category {
    let name = name.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| name.contains(keyword))
        .map_or(Category::Other, |(_, category)| *category)
}

/// Assigns a functional category to a process.
///
/// Model-backed: a classifier over `Features::categorizer_vector`. Any
/// inference failure, or a label outside the known categories, falls back
/// to the name heuristic.
#[derive(Debug)]
pub struct Categorizer {
    strategy: Strategy,
}

impl Categorizer {
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
            strategy: Strategy::load(EngineKind::Categorizer, path),
        }
    }

    fn classify(
        &self,
        artifact: &ModelArtifact,
        features: &Features,
    ) -> Result<Category, FallbackNeeded> {
        match artifact.infer(&features.categorizer_vector())? {
            Prediction::Label(label) => Category::from_label(&label).ok_or_else(|| {
                FallbackNeeded(InferenceError::Malformed(format!(
                    "unknown category {:?}",
                    label
                )))
            }),
            Prediction::Value(_) => Err(FallbackNeeded(InferenceError::WrongOutput)),
        }
    }
}

impl ScoringEngine for Categorizer {
    type Output = Category;

    fn kind(&self) -> EngineKind {
        EngineKind::Categorizer
    }

    fn mode(&self) -> Mode {
        self.strategy.mode()
    }

    fn evaluate(&self, features: &Features) -> Category {
        match &self.strategy {
            Strategy::Heuristic => categorize_by_name(&features.name),
            Strategy::ModelBacked(artifact) => match self.classify(artifact, features) {
                Ok(category) => category,
                Err(fallback) => {
                    trace!(error = %fallback.0, "categorizer fell back to name heuristic");
                    categorize_by_name(&features.name)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> Features {
        Features {
            name: name.to_string(),
            ..Features::default()
        }
    }

    fn model(value: serde_json::Value) -> Categorizer {
        Categorizer::with_model(ModelArtifact::from_value(value).unwrap())
    }

    #[test]
    fn test_keyword_table() {
        let cases = [
            ("chrome.exe", Category::Browser),
            ("Firefox", Category::Browser),
            ("python3", Category::Script),
            ("node", Category::Script),
            ("svchost.exe", Category::System),
            ("systemd", Category::System),
            ("vlc", Category::Media),
            ("Spotify.exe", Category::Media),
            ("mysqld", Category::Database),
            ("mongod", Category::Database),
            ("code", Category::Ide),
            ("pycharm64.exe", Category::Ide),
            ("OneDrive.exe", Category::Utility),
            ("restic-backup", Category::Utility),
            ("steam", Category::Game),
            ("VALORANT.exe", Category::Game),
            ("MsMpEng-defender", Category::Security),
            ("kaspersky", Category::Security),
            ("bash", Category::Other),
            ("", Category::Other),
        ];
        for (name, expected) in cases {
            assert_eq!(categorize_by_name(name), expected, "{}", name);
        }
    }

    #[test]
    fn test_first_match_wins() {
        // contains both "node" and "code"
        assert_eq!(categorize_by_name("nodecode"), Category::Script);
        // contains both "chrome" and "python"
        assert_eq!(categorize_by_name("python-chrome-driver"), Category::Browser);
        // contains both "system" and "code"
        assert_eq!(categorize_by_name("systemcode"), Category::System);
    }

    #[test]
    fn test_heuristic_ignores_numeric_features() {
        let engine = Categorizer::heuristic();
        let mut busy = named("CHROME.EXE");
        busy.cpu = 99.0;
        busy.threads = 500.0;
        assert_eq!(engine.evaluate(&busy), Category::Browser);
        assert_eq!(engine.evaluate(&named("chrome.exe")), Category::Browser);
        assert_eq!(engine.mode(), Mode::Heuristic);
    }

    #[test]
    fn test_model_label_used() {
        let engine = model(json!({
            "kind": "linear_classifier",
            "classes": ["game", "security"],
            "coefficients": [[1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]],
            "intercepts": [-50.0]
        }));
        assert_eq!(engine.mode(), Mode::ModelBacked);

        let mut f = named("chrome");
        f.cpu = 80.0;
        assert_eq!(engine.evaluate(&f), Category::Security);
        f.cpu = 10.0;
        assert_eq!(engine.evaluate(&f), Category::Game);
    }

    #[test]
    fn test_unknown_label_falls_back_to_name() {
        let engine = model(json!({
            "kind": "linear_classifier",
            "classes": ["spreadsheet", "office"],
            "coefficients": [[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]],
            "intercepts": [1.0]
        }));
        assert_eq!(engine.evaluate(&named("firefox")), Category::Browser);
    }

    #[test]
    fn test_incompatible_model_falls_back_per_call() {
        // trained on 3 features, called with 8
        let engine = model(json!({
            "kind": "linear_classifier",
            "classes": ["game", "media"],
            "coefficients": [[1.0, 1.0, 1.0]],
            "intercepts": [0.0]
        }));
        assert_eq!(engine.evaluate(&named("python")), Category::Script);
        assert_eq!(engine.mode(), Mode::ModelBacked);
    }

    #[test]
    fn test_regressor_output_falls_back() {
        let engine = model(json!({
            "kind": "linear",
            "coefficients": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "intercept": 3.0
        }));
        assert_eq!(engine.evaluate(&named("steam")), Category::Game);
    }
}
