use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::ConfigurationError;

const SECTION_WEIGHT_TOLERANCE: f64 = 0.001;
const MAX_IMPORTANCE_WEIGHT: f64 = 2.0;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub questions_path: Option<PathBuf>,
    pub text_similarity_path: Option<PathBuf>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_dir: default_output_dir(),
            questions_path: None,
            text_similarity_path: None,
        }
    }
}

fn default_input_path() -> PathBuf { PathBuf::from("data/candidates.json") }
fn default_output_dir() -> PathBuf { PathBuf::from("data/batches") }

/// How two candidates' importance weights for one question combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightCombine {
    Average,
    Max,
}

impl WeightCombine {
    pub fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            WeightCombine::Average => (a + b) / 2.0,
            WeightCombine::Max => a.max(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionWeights {
    #[serde(default = "default_lifestyle_weight")]
    pub lifestyle: f64,
    #[serde(default = "default_personality_weight")]
    pub personality: f64,
}

impl Default for SectionWeights {
    fn default() -> Self {
        Self {
            lifestyle: default_lifestyle_weight(),
            personality: default_personality_weight(),
        }
    }
}

impl SectionWeights {
    pub fn sum(&self) -> f64 {
        self.lifestyle + self.personality
    }
}

fn default_lifestyle_weight() -> f64 { 0.65 }
fn default_personality_weight() -> f64 { 0.35 }

/// Discrete importance scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImportanceScale {
    pub not_important: f64,
    pub somewhat: f64,
    pub important: f64,
    pub very_important: f64,
}

impl Default for ImportanceScale {
    fn default() -> Self {
        Self {
            not_important: 0.0,
            somewhat: 0.5,
            important: 1.0,
            very_important: 2.0,
        }
    }
}

/// Multipliers applied to directional ("more"/"less") questions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalMultipliers {
    /// Applied when the peer is on the wanted side; the result is capped
    /// at the question's full weight.
    pub satisfied: f64,
    pub unsatisfied: f64,
}

impl Default for DirectionalMultipliers {
    fn default() -> Self {
        Self {
            satisfied: 1.25,
            unsatisfied: 0.5,
        }
    }
}

/// Immutable configuration injected into every pipeline call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MatchingConfig {
    pub section_weights: SectionWeights,
    pub importance: ImportanceScale,
    /// Convention for a question's weighted value within one direction.
    pub question_weighting: WeightCombine,
    /// Convention for a question's influence on its section mean.
    pub section_weighting: WeightCombine,
    pub directional: DirectionalMultipliers,
    #[validate(range(min = 0.0, max = 1.0))]
    pub mutuality_alpha: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub relative_beta: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_pair_score: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub low_score_threshold: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub asymmetry_threshold: f64,
    #[validate(range(min = 1, max = 1000000))]
    pub weight_scale: u32,
    #[validate(range(min = 1))]
    pub top_k: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            section_weights: SectionWeights::default(),
            importance: ImportanceScale::default(),
            question_weighting: WeightCombine::Average,
            section_weighting: WeightCombine::Max,
            directional: DirectionalMultipliers::default(),
            mutuality_alpha: 0.65,
            relative_beta: 0.6,
            min_pair_score: 45.0,
            low_score_threshold: 0.3,
            asymmetry_threshold: 0.4,
            weight_scale: 1000,
            top_k: 5,
        }
    }
}

impl MatchingConfig {
    /// Validate once at load. Fails fast on any inconsistency.
    pub fn validated(self) -> Result<Self, ConfigurationError> {
        Validate::validate(&self)?;

        let sum = self.section_weights.sum();
        if (sum - 1.0).abs() > SECTION_WEIGHT_TOLERANCE
            || self.section_weights.lifestyle < 0.0
            || self.section_weights.personality < 0.0
        {
            return Err(ConfigurationError::SectionWeightsSum { sum });
        }

        let scale = &self.importance;
        let levels = [scale.not_important, scale.somewhat, scale.important, scale.very_important];
        if levels.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigurationError::ImportanceScale {
                detail: format!("levels {levels:?} are not ascending"),
            });
        }
        if levels[0] < 0.0 || levels[3] > MAX_IMPORTANCE_WEIGHT {
            return Err(ConfigurationError::ImportanceScale {
                detail: format!("levels {levels:?} fall outside [0, {MAX_IMPORTANCE_WEIGHT}]"),
            });
        }

        if self.directional.satisfied < 1.0 || !(0.0..=1.0).contains(&self.directional.unsatisfied) {
            return Err(ConfigurationError::DirectionalMultipliers {
                detail: format!("{:?}", self.directional),
            });
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with COMPAT__)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., COMPAT__MATCHING__MIN_PAIR_SCORE -> matching.min_pair_score
            .add_source(
                Environment::with_prefix("COMPAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("COMPAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Honour the short-form variables the batch jobs are launched with
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(path) = env::var("CANDIDATES_PATH") {
        builder = builder.set_override("batch.input_path", path)?;
    }
    if let Ok(dir) = env::var("BATCH_OUTPUT_DIR") {
        builder = builder.set_override("batch.output_dir", dir)?;
    }

    builder.build()
}
