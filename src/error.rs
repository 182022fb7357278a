use thiserror::Error;

/// Fatal configuration problems. Raised while loading settings or the
/// question table, before any matching run starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("section weights must sum to 1.0 (got {sum:.4})")]
    SectionWeightsSum { sum: f64 },

    #[error("importance scale must be ascending within [0, 2]: {detail}")]
    ImportanceScale { detail: String },

    #[error("directional multipliers must hold or boost when satisfied and shrink otherwise: {detail}")]
    DirectionalMultipliers { detail: String },

    #[error("question '{question}' has unknown type '{kind}'")]
    UnknownQuestionType { question: String, kind: String },

    #[error("question '{question}' has unknown section '{section}'")]
    UnknownSection { question: String, section: String },

    #[error("question '{question}' is defined more than once")]
    DuplicateQuestion { question: String },

    #[error("question '{question}' is malformed: {reason}")]
    MalformedQuestion { question: String, reason: String },

    #[error("invalid matching settings: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("failed to parse question table: {0}")]
    QuestionTableParse(#[from] toml::de::Error),

    #[error("failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A response field that none of the known legacy decoders understand.
/// Recoverable: the question is treated as unanswered for that candidate.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("candidate '{candidate}' question '{question}': {reason}")]
pub struct DataShapeError {
    pub candidate: String,
    pub question: String,
    pub reason: String,
}

/// The matching produced an invalid result. The run rejects its own output.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphInconsistencyError {
    #[error("candidate '{0}' appears in more than one match")]
    DuplicateCandidate(String),

    #[error("candidate '{0}' is matched with itself")]
    SelfPair(String),

    #[error("match {a}/{b} has out-of-range pair score {score}")]
    ScoreOutOfRange { a: String, b: String, score: f64 },

    #[error("matching referenced an edge that was never eligible: {a}/{b}")]
    UnknownEdge { a: String, b: String },
}

/// Failures in the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("batch not found: {0}")]
    NotFound(String),
}

/// Umbrella error for callers that drive a whole batch.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Graph(#[from] GraphInconsistencyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to decode input: {0}")]
    Input(#[from] serde_json::Error),

    #[error("failed to read input {path}: {source}")]
    InputIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
