use compat_engine::config::{LoggingSettings, Settings};
use compat_engine::error::EngineError;
use compat_engine::models::{QuestionTable, RawCandidate};
use compat_engine::services::{
    BatchRecord, JsonFileStore, MatchStore, NoTextSimilarity, PrecomputedTextSimilarity,
    TextSimilaritySource,
};
use compat_engine::Matcher;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn load_candidates(path: &Path) -> Result<Vec<RawCandidate>, EngineError> {
    let raw = std::fs::read_to_string(path).map_err(|source| EngineError::InputIo {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Free-text scores are optional; a missing or broken file only skips those questions.
fn load_text_similarity(path: Option<&Path>) -> Box<dyn TextSimilaritySource> {
    let Some(path) = path else {
        return Box::new(NoTextSimilarity);
    };
    match PrecomputedTextSimilarity::load(path) {
        Ok(source) => Box::new(source),
        Err(e) => {
            warn!("Text similarity unavailable ({}), free-text questions will be skipped", e);
            Box::new(NoTextSimilarity)
        }
    }
}

fn run_batch(settings: &Settings) -> Result<(), EngineError> {
    let table = match &settings.batch.questions_path {
        Some(path) => QuestionTable::load(path)?,
        None => QuestionTable::builtin()?,
    };
    let matcher = Matcher::new(settings.matching.clone(), table)?;
    info!(questions = matcher.table().len(), "Matcher initialized");

    let raws = load_candidates(&settings.batch.input_path)?;
    info!(candidates = raws.len(), path = %settings.batch.input_path.display(), "Candidates loaded");

    let text = load_text_similarity(settings.batch.text_similarity_path.as_deref());
    let outcome = matcher.run_raw(&raws, text.as_ref())?;

    let record = BatchRecord::from_outcome(&outcome, matcher.config().top_k);
    info!(shortlists = record.shortlists.len(), "Review shortlists prepared");

    let store = JsonFileStore::new(&settings.batch.output_dir);
    store.save(&record)?;

    let diagnostics = &outcome.diagnostics;
    info!(
        batch_id = %record.batch_id,
        matches = diagnostics.match_count,
        unmatched = diagnostics.unmatched_count,
        eligible_pairs = diagnostics.eligibility.eligible_pairs,
        dropped_responses = diagnostics.dropped_responses,
        execution_time_ms = diagnostics.execution_time_ms,
        "Batch complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load();
    let logging = settings.as_ref().map(|s| s.logging.clone()).unwrap_or_default();
    init_tracing(&logging);

    info!("Starting compatibility matching batch...");

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run_batch(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Batch failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
