//! Pretrained model artifacts.
//!
//! An artifact is a JSON file holding either a bare model object tagged with
//! `kind`, or an array `[model, scaler | null, mean?, std?]`. Models are
//! exposed to the engines only through the `Inference` capability.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// Default calibration of the anomaly decision function.
pub const DEFAULT_CALIBRATION_MEAN: f64 = 0.0;
pub const DEFAULT_CALIBRATION_STD: f64 = 0.08;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Error loading a model artifact.
#[derive(Debug)]
pub enum ArtifactError {
    /// No artifact file at the path.
    Missing(PathBuf),
    Io(io::Error),
    Json(serde_json::Error),
    /// Valid JSON that is not an accepted artifact shape.
    Shape(String),
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::Missing(path) => write!(f, "no model artifact at {}", path.display()),
            ArtifactError::Io(e) => write!(f, "I/O error: {}", e),
            ArtifactError::Json(e) => write!(f, "invalid JSON: {}", e),
            ArtifactError::Shape(msg) => write!(f, "unsupported artifact shape: {}", msg),
        }
    }
}

impl std::error::Error for ArtifactError {}

impl From<io::Error> for ArtifactError {
    fn from(e: io::Error) -> Self {
        ArtifactError::Io(e)
    }
}

impl From<serde_json::Error> for ArtifactError {
    fn from(e: serde_json::Error) -> Self {
        ArtifactError::Json(e)
    }
}

/// Output of one inference call.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Value(f64),
    Label(String),
}

/// Error raised by a single inference call.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    Width { expected: usize, got: usize },
    NonFinite,
    /// The model produced a label where a value was needed, or vice versa.
    WrongOutput,
    Malformed(String),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::Width { expected, got } => {
                write!(f, "expected {} features, got {}", expected, got)
            }
            InferenceError::NonFinite => write!(f, "non-finite model output"),
            InferenceError::WrongOutput => write!(f, "unexpected prediction type"),
            InferenceError::Malformed(msg) => write!(f, "malformed model: {}", msg),
        }
    }
}

impl std::error::Error for InferenceError {}

/// Capability of a pretrained model: map one feature row to a prediction.
pub trait Inference: Send + Sync + fmt::Debug {
    /// Short model family name, for logs.
    fn kind(&self) -> &'static str;

    /// Number of features the model was trained on.
    fn width(&self) -> usize;

    fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError>;
}

fn check_width(expected: usize, features: &[f64]) -> Result<(), InferenceError> {
    if features.len() != expected {
        return Err(InferenceError::Width {
            expected,
            got: features.len(),
        });
    }
    Ok(())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn arg_max(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

// ============================================================
// Adapters
// ============================================================

/// Linear regressor or decision function: `w·x + b`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl Inference for LinearModel {
    fn kind(&self) -> &'static str {
        "linear"
    }

    fn width(&self) -> usize {
        self.coefficients.len()
    }

    fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        check_width(self.width(), features)?;
        Ok(Prediction::Value(
            dot(&self.coefficients, features) + self.intercept,
        ))
    }
}

/// One-vs-rest linear classifier. A single coefficient row with two classes
/// is the binary form: a positive score selects the second class.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearClassifier {
    pub classes: Vec<String>,
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearClassifier {
    fn validate(&self) -> Result<(), String> {
        let binary = self.coefficients.len() == 1 && self.classes.len() == 2;
        if !binary && self.coefficients.len() != self.classes.len() {
            return Err("one coefficient row per class required".to_string());
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err("one intercept per coefficient row required".to_string());
        }
        let width = self.coefficients.first().map_or(0, Vec::len);
        if width == 0 || self.coefficients.iter().any(|row| row.len() != width) {
            return Err("coefficient rows must be non-empty and equally wide".to_string());
        }
        Ok(())
    }
}

impl Inference for LinearClassifier {
    fn kind(&self) -> &'static str {
        "linear_classifier"
    }

    fn width(&self) -> usize {
        self.coefficients.first().map_or(0, Vec::len)
    }

    fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        check_width(self.width(), features)?;
        let scores: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| dot(w, features) + b)
            .collect();
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(InferenceError::NonFinite);
        }

        let idx = if scores.len() == 1 {
            usize::from(scores[0] > 0.0)
        } else {
            arg_max(&scores).unwrap_or(0)
        };
        self.classes
            .get(idx)
            .cloned()
            .map(Prediction::Label)
            .ok_or_else(|| InferenceError::Malformed("class index out of range".to_string()))
    }
}

/// Binary decision tree in flat array form. Node `i` is a leaf when
/// `left[i] < 0`; otherwise `x[feature[i]] <= threshold[i]` goes left.
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub left: Vec<i64>,
    pub right: Vec<i64>,
    /// Per node: regression value, class distribution, or (isolation trees)
    /// the number of training samples in the node.
    pub value: Vec<Vec<f64>>,
}

impl Tree {
    fn validate(&self, width: usize) -> Result<(), String> {
        let n = self.left.len();
        if n == 0 {
            return Err("empty tree".to_string());
        }
        if self.feature.len() != n
            || self.threshold.len() != n
            || self.right.len() != n
            || self.value.len() != n
        {
            return Err("tree arrays differ in length".to_string());
        }
        for i in 0..n {
            if self.left[i] >= 0 {
                let in_range = |c: i64| c > 0 && (c as usize) < n;
                if !in_range(self.left[i]) || !in_range(self.right[i]) {
                    return Err(format!("node {} has an invalid child", i));
                }
                if self.feature[i] < 0 || self.feature[i] as usize >= width {
                    return Err(format!("node {} splits on an unknown feature", i));
                }
            }
        }
        Ok(())
    }

    /// Returns the leaf reached by `x` and its depth.
    fn descend(&self, x: &[f64]) -> Result<(usize, usize), InferenceError> {
        let mut node = 0usize;
        // A valid tree reaches a leaf within `len` steps.
        for depth in 0..=self.left.len() {
            if self.left[node] < 0 {
                return Ok((node, depth));
            }
            let feature = self.feature[node] as usize;
            node = if x[feature] <= self.threshold[node] {
                self.left[node] as usize
            } else {
                self.right[node] as usize
            };
        }
        Err(InferenceError::Malformed("tree contains a cycle".to_string()))
    }
}

/// Ensemble of decision trees. Regresses (mean of leaf values) unless
/// `classes` is set, in which case leaf class distributions are averaged.
#[derive(Debug, Clone, Deserialize)]
pub struct Forest {
    pub n_features: usize,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub classes: Option<Vec<String>>,
}

impl Forest {
    fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
        }
        Ok(())
    }
}

impl Inference for Forest {
    fn kind(&self) -> &'static str {
        "forest"
    }

    fn width(&self) -> usize {
        self.n_features
    }

    fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        check_width(self.n_features, features)?;

        match &self.classes {
            None => {
                let mut sum = 0.0;
                for tree in &self.trees {
                    let (leaf, _) = tree.descend(features)?;
                    sum += tree.value[leaf].first().copied().unwrap_or(0.0);
                }
                Ok(Prediction::Value(sum / self.trees.len() as f64))
            }
            Some(classes) => {
                let mut votes = vec![0.0; classes.len()];
                for tree in &self.trees {
                    let (leaf, _) = tree.descend(features)?;
                    let dist = &tree.value[leaf];
                    let total: f64 = dist.iter().sum();
                    if dist.len() != classes.len() || total <= 0.0 {
                        return Err(InferenceError::Malformed(
                            "leaf distribution does not match classes".to_string(),
                        ));
                    }
                    for (vote, p) in votes.iter_mut().zip(dist) {
                        *vote += p / total;
                    }
                }
                let idx = arg_max(&votes).unwrap_or(0);
                Ok(Prediction::Label(classes[idx].clone()))
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of
/// `n` nodes.
fn average_path_length(n: f64) -> f64 {
    if n <= 1.0 {
        0.0
    } else if n <= 2.0 {
        1.0
    } else {
        2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
    }
}

/// Isolation forest. `infer` returns the decision function: negative values
/// are outliers.
#[derive(Debug, Clone, Deserialize)]
pub struct IsolationForest {
    pub n_features: usize,
    pub trees: Vec<Tree>,
    pub max_samples: usize,
    pub offset: f64,
}

impl IsolationForest {
    fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if self.max_samples < 2 {
            return Err("max_samples must be at least 2".to_string());
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
        }
        Ok(())
    }
}

impl Inference for IsolationForest {
    fn kind(&self) -> &'static str {
        "isolation_forest"
    }

    fn width(&self) -> usize {
        self.n_features
    }

    fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        check_width(self.n_features, features)?;

        let mut total_depth = 0.0;
        for tree in &self.trees {
            let (leaf, depth) = tree.descend(features)?;
            let leaf_samples = tree.value[leaf].first().copied().unwrap_or(1.0);
            total_depth += depth as f64 + average_path_length(leaf_samples);
        }
        let mean_depth = total_depth / self.trees.len() as f64;
        let score = -(2f64.powf(-mean_depth / average_path_length(self.max_samples as f64)));
        Ok(Prediction::Value(score - self.offset))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelSpec {
    Linear(LinearModel),
    LinearClassifier(LinearClassifier),
    Forest(Forest),
    IsolationForest(IsolationForest),
}

impl ModelSpec {
    fn into_inference(self) -> Result<Box<dyn Inference>, ArtifactError> {
        let model: Box<dyn Inference> = match self {
            ModelSpec::Linear(m) => {
                if m.coefficients.is_empty() {
                    return Err(ArtifactError::Shape("linear model without coefficients".into()));
                }
                Box::new(m)
            }
            ModelSpec::LinearClassifier(m) => {
                m.validate().map_err(ArtifactError::Shape)?;
                Box::new(m)
            }
            ModelSpec::Forest(m) => {
                m.validate().map_err(ArtifactError::Shape)?;
                Box::new(m)
            }
            ModelSpec::IsolationForest(m) => {
                m.validate().map_err(ArtifactError::Shape)?;
                Box::new(m)
            }
        };
        Ok(model)
    }
}

// ============================================================
// Preprocessing and calibration
// ============================================================

/// Per-feature standardization: `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        check_width(self.width(), features)?;
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| {
                let s = if *s == 0.0 { 1.0 } else { *s };
                (x - m) / s
            })
            .collect())
    }
}

/// Reference statistics of a model's raw output on normal data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub mean: f64,
    pub std: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            mean: DEFAULT_CALIBRATION_MEAN,
            std: DEFAULT_CALIBRATION_STD,
        }
    }
}

// ============================================================
// Artifact
// ============================================================

/// A loaded model with its optional scaler and calibration.
///
/// Immutable once loaded.
#[derive(Debug)]
pub struct ModelArtifact {
    model: Box<dyn Inference>,
    scaler: Option<StandardScaler>,
    calibration: Calibration,
}

impl ModelArtifact {
    /// Wraps an in-memory model.
    pub fn new(model: Box<dyn Inference>) -> Self {
        Self {
            model,
            scaler: None,
            calibration: Calibration::default(),
        }
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = calibration;
        self
    }

    /// Reads an artifact file.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArtifactError::Missing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ArtifactError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    /// Interprets a parsed artifact.
    pub fn from_value(value: Value) -> Result<Self, ArtifactError> {
        match value {
            Value::Object(_) => Ok(Self::new(parse_model(value)?)),
            Value::Array(items) if (2..=4).contains(&items.len()) => {
                let calibration = match items.as_slice() {
                    [_, _, Value::Number(mean), Value::Number(std)] => {
                        match (mean.as_f64(), std.as_f64()) {
                            (Some(mean), Some(std)) => Calibration { mean, std },
                            _ => Calibration::default(),
                        }
                    }
                    _ => Calibration::default(),
                };

                let mut items = items.into_iter();
                let model = parse_model(items.next().unwrap_or(Value::Null))?;
                let scaler = match items.next() {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(serde_json::from_value::<StandardScaler>(v)?),
                };

                if let Some(scaler) = &scaler
                    && (scaler.mean.len() != scaler.scale.len() || scaler.width() != model.width())
                {
                    return Err(ArtifactError::Shape(format!(
                        "scaler width {} does not match model width {}",
                        scaler.width(),
                        model.width()
                    )));
                }

                Ok(Self {
                    model,
                    scaler,
                    calibration,
                })
            }
            Value::Array(items) => Err(ArtifactError::Shape(format!(
                "expected 2 to 4 elements, got {}",
                items.len()
            ))),
            other => Err(ArtifactError::Shape(format!(
                "expected an object or an array, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.model.kind()
    }

    pub fn width(&self) -> usize {
        self.model.width()
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn has_scaler(&self) -> bool {
        self.scaler.is_some()
    }

    /// Scales `features` if a scaler is present, then runs the model.
    pub fn infer(&self, features: &[f64]) -> Result<Prediction, InferenceError> {
        let prediction = match &self.scaler {
            Some(scaler) => self.model.infer(&scaler.transform(features)?)?,
            None => self.model.infer(features)?,
        };
        if let Prediction::Value(v) = prediction
            && !v.is_finite()
        {
            return Err(InferenceError::NonFinite);
        }
        Ok(prediction)
    }

    /// Like `infer`, for models that must produce a number.
    pub fn infer_value(&self, features: &[f64]) -> Result<f64, InferenceError> {
        match self.infer(features)? {
            Prediction::Value(v) => Ok(v),
            Prediction::Label(_) => Err(InferenceError::WrongOutput),
        }
    }
}

fn parse_model(value: Value) -> Result<Box<dyn Inference>, ArtifactError> {
    if !value.is_object() {
        return Err(ArtifactError::Shape(format!(
            "model must be an object, got {}",
            json_type(&value)
        )));
    }
    serde_json::from_value::<ModelSpec>(value)?.into_inference()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Depth-1 regression tree: `x[feature] <= threshold` yields `low`.
    pub(crate) fn stump(feature: i64, threshold: f64, low: f64, high: f64) -> Value {
        json!({
            "feature": [feature, -2, -2],
            "threshold": [threshold, -2.0, -2.0],
            "left": [1, -1, -1],
            "right": [2, -1, -1],
            "value": [[0.0], [low], [high]]
        })
    }

    #[test]
    fn test_bare_model_and_tuple_are_equivalent() {
        let model = json!({"kind": "linear", "coefficients": [1.0, 2.0], "intercept": 0.5});
        let bare = ModelArtifact::from_value(model.clone()).unwrap();
        let tuple = ModelArtifact::from_value(json!([model, null, 0.0, 0.08])).unwrap();

        let x = [3.0, 4.0];
        assert_eq!(bare.infer(&x).unwrap(), Prediction::Value(11.5));
        assert_eq!(bare.infer(&x).unwrap(), tuple.infer(&x).unwrap());
        assert_eq!(bare.calibration(), tuple.calibration());
    }

    #[test]
    fn test_calibration_read_only_from_four_elements() {
        let model = json!({"kind": "linear", "coefficients": [1.0], "intercept": 0.0});

        let full = ModelArtifact::from_value(json!([model, null, -0.1, 0.2])).unwrap();
        assert_eq!(full.calibration(), Calibration { mean: -0.1, std: 0.2 });

        let three = ModelArtifact::from_value(json!([model, null, -0.1])).unwrap();
        assert_eq!(three.calibration(), Calibration::default());

        let malformed = ModelArtifact::from_value(json!([model, null, "x", 0.2])).unwrap();
        assert_eq!(malformed.calibration().mean, 0.0);
        assert_eq!(malformed.calibration().std, 0.08);
    }

    #[test]
    fn test_rejected_shapes() {
        let model = json!({"kind": "linear", "coefficients": [1.0], "intercept": 0.0});
        for value in [
            json!([model]),
            json!([model, null, 0.0, 1.0, 5.0]),
            json!(42),
            json!("linear"),
            json!({"kind": "svm"}),
            json!([{"coefficients": [1.0]}, null]),
            json!({"kind": "linear", "coefficients": [], "intercept": 0.0}),
        ] {
            assert!(
                ModelArtifact::from_value(value.clone()).is_err(),
                "accepted {}",
                value
            );
        }
    }

    #[test]
    fn test_scaler_applied_before_model() {
        let artifact = ModelArtifact::from_value(json!([
            {"kind": "linear", "coefficients": [1.0, 1.0], "intercept": 0.0},
            {"mean": [10.0, 0.0], "scale": [2.0, 0.0]}
        ]))
        .unwrap();
        assert!(artifact.has_scaler());

        // (14 - 10) / 2 + (3 - 0) / 1
        assert_eq!(artifact.infer_value(&[14.0, 3.0]).unwrap(), 5.0);
    }

    #[test]
    fn test_scaler_width_must_match_model() {
        let result = ModelArtifact::from_value(json!([
            {"kind": "linear", "coefficients": [1.0, 1.0], "intercept": 0.0},
            {"mean": [0.0, 0.0, 0.0], "scale": [1.0, 1.0, 1.0]}
        ]));
        assert!(matches!(result, Err(ArtifactError::Shape(_))));
    }

    #[test]
    fn test_width_mismatch_is_inference_error() {
        let artifact = ModelArtifact::from_value(
            json!({"kind": "linear", "coefficients": [1.0, 2.0], "intercept": 0.0}),
        )
        .unwrap();
        assert_eq!(
            artifact.infer(&[1.0]),
            Err(InferenceError::Width { expected: 2, got: 1 })
        );
    }

    #[test]
    fn test_linear_classifier_multiclass_and_binary() {
        let multi = ModelArtifact::from_value(json!({
            "kind": "linear_classifier",
            "classes": ["browser", "game", "other"],
            "coefficients": [[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]],
            "intercepts": [0.0, 0.0, 0.5]
        }))
        .unwrap();
        assert_eq!(multi.infer(&[2.0, 1.0]).unwrap(), Prediction::Label("browser".into()));
        assert_eq!(multi.infer(&[0.1, 0.2]).unwrap(), Prediction::Label("other".into()));
        assert_eq!(multi.infer_value(&[0.0, 0.0]), Err(InferenceError::WrongOutput));

        let binary = ModelArtifact::from_value(json!({
            "kind": "linear_classifier",
            "classes": ["script", "system"],
            "coefficients": [[1.0]],
            "intercepts": [-5.0]
        }))
        .unwrap();
        assert_eq!(binary.infer(&[9.0]).unwrap(), Prediction::Label("system".into()));
        assert_eq!(binary.infer(&[1.0]).unwrap(), Prediction::Label("script".into()));
    }

    #[test]
    fn test_forest_regression_averages_trees() {
        let artifact = ModelArtifact::from_value(json!({
            "kind": "forest",
            "n_features": 2,
            "trees": [stump(0, 10.0, 100.0, 200.0), stump(1, 0.5, 300.0, 400.0)]
        }))
        .unwrap();
        assert_eq!(artifact.infer_value(&[5.0, 1.0]).unwrap(), 250.0);
        assert_eq!(artifact.infer_value(&[50.0, 0.0]).unwrap(), 250.0);
        assert_eq!(artifact.infer_value(&[50.0, 1.0]).unwrap(), 300.0);
    }

    #[test]
    fn test_forest_classifier_votes() {
        let tree = json!({
            "feature": [0, -2, -2],
            "threshold": [1.0, -2.0, -2.0],
            "left": [1, -1, -1],
            "right": [2, -1, -1],
            "value": [[5.0, 5.0], [9.0, 1.0], [2.0, 8.0]]
        });
        let artifact = ModelArtifact::from_value(json!({
            "kind": "forest",
            "n_features": 1,
            "classes": ["media", "game"],
            "trees": [tree]
        }))
        .unwrap();
        assert_eq!(artifact.infer(&[0.0]).unwrap(), Prediction::Label("media".into()));
        assert_eq!(artifact.infer(&[3.0]).unwrap(), Prediction::Label("game".into()));
    }

    #[test]
    fn test_invalid_tree_rejected() {
        let cyclic = json!({
            "feature": [0, 0],
            "threshold": [1.0, 1.0],
            "left": [1, 0],
            "right": [1, 0],
            "value": [[0.0], [0.0]]
        });
        let result = ModelArtifact::from_value(json!({
            "kind": "forest", "n_features": 1, "trees": [cyclic]
        }));
        assert!(matches!(result, Err(ArtifactError::Shape(_))));

        let bad_feature = ModelArtifact::from_value(json!({
            "kind": "forest", "n_features": 1, "trees": [stump(3, 0.0, 1.0, 2.0)]
        }));
        assert!(bad_feature.is_err());
    }

    #[test]
    fn test_isolation_forest_decision_function() {
        // One split on feature 0: values <= 10 land in a leaf holding 255 of
        // 256 training samples, larger values are isolated immediately.
        let tree = json!({
            "feature": [0, -2, -2],
            "threshold": [10.0, -2.0, -2.0],
            "left": [1, -1, -1],
            "right": [2, -1, -1],
            "value": [[256.0], [255.0], [1.0]]
        });
        let artifact = ModelArtifact::from_value(json!({
            "kind": "isolation_forest",
            "n_features": 1,
            "max_samples": 256,
            "offset": -0.5,
            "trees": [tree]
        }))
        .unwrap();

        let normal = artifact.infer_value(&[1.0]).unwrap();
        let outlier = artifact.infer_value(&[100.0]).unwrap();
        assert!(normal > outlier);
        assert!(outlier < 0.0);

        // depth 1, c(1) = 0 → -(2^(-1/c(256))) + 0.5
        let expected = -(2f64.powf(-1.0 / average_path_length(256.0))) + 0.5;
        assert!((outlier - expected).abs() < 1e-12);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1.0), 0.0);
        assert_eq!(average_path_length(2.0), 1.0);
        assert!((average_path_length(256.0) - 10.2448).abs() < 1e-3);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelArtifact::load(&dir.path().join("anomaly.json"));
        assert!(matches!(result, Err(ArtifactError::Missing(_))));
    }

    #[test]
    fn test_invalid_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anomaly.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(ModelArtifact::load(&path), Err(ArtifactError::Json(_))));
    }
}
