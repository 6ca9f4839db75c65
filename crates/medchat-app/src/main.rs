//! Medchat application binary - composition root.
//!
//! Ties together all medchat crates into a single executable:
//! 1. Parse CLI args and load configuration from TOML
//! 2. Initialize tracing (stderr plus an optional log file)
//! 3. Load the reference term corpus with the configured embedder
//! 4. Open SQLite and wire the chat orchestrator
//! 5. Start the axum REST API server

mod cli;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use medchat_api::{start_server, AppState};
use medchat_chat::{ChatOrchestrator, CompletionClient, ResponseSanitizer};
use medchat_core::config::{ClassifierConfig, MedchatConfig};
use medchat_core::error::MedchatError;
use medchat_storage::{Database, TurnRepository, TurnStore, UserRepository};
use medchat_vector::{
    DynEmbeddingService, MockEmbedding, OnnxEmbeddingService, RelevanceClassifier, TermCorpus,
};

use cli::{expand_home, CliArgs, Command};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. When `log_file` is set, plain-text
/// events are appended there as well as written to stderr.
fn init_tracing(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

/// Build the embedder named by `classifier.embedding_backend`.
///
/// Returns `None` when the ONNX model cannot be loaded; the caller then
/// runs with an empty corpus so every message is treated as off-topic.
fn build_embedder(
    config: &ClassifierConfig,
) -> Result<Option<Arc<dyn DynEmbeddingService>>, MedchatError> {
    match config.embedding_backend.as_str() {
        "mock" => {
            tracing::warn!("Using hash-based mock embeddings; relevance is exact-match only");
            let embedder: Arc<dyn DynEmbeddingService> = Arc::new(MockEmbedding::new());
            Ok(Some(embedder))
        }
        "onnx" => {
            let model_dir = expand_home(&config.model_dir);
            match OnnxEmbeddingService::from_directory(&model_dir) {
                Ok(service) => {
                    tracing::info!(path = %model_dir.display(), "ONNX embedding model loaded");
                    let embedder: Arc<dyn DynEmbeddingService> = Arc::new(service);
                    Ok(Some(embedder))
                }
                Err(e) => {
                    tracing::error!(
                        path = %model_dir.display(),
                        error = %e,
                        "Failed to load embedding model; every message will be treated as off-topic"
                    );
                    Ok(None)
                }
            }
        }
        other => Err(MedchatError::Config(format!(
            "Unknown classifier.embedding_backend '{}' (expected \"onnx\" or \"mock\")",
            other
        ))),
    }
}

async fn build_classifier(config: &ClassifierConfig) -> Result<RelevanceClassifier, MedchatError> {
    let (corpus, embedder) = match build_embedder(config)? {
        Some(embedder) => {
            let terms_path = expand_home(&config.terms_path);
            let corpus = TermCorpus::load(&terms_path, embedder.as_ref()).await;
            tracing::info!(path = %terms_path.display(), terms = corpus.len(), "Term corpus loaded");
            (corpus, embedder)
        }
        None => (
            TermCorpus::empty(),
            Arc::new(MockEmbedding::new()) as Arc<dyn DynEmbeddingService>,
        ),
    };

    Ok(RelevanceClassifier::new(
        Arc::new(corpus),
        embedder,
        config.threshold,
    ))
}

fn open_database(config: &MedchatConfig) -> Result<Arc<Database>, MedchatError> {
    let db_path = expand_home(&config.storage.database_path);
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    Ok(Arc::new(db))
}

async fn serve(config: MedchatConfig) -> Result<(), MedchatError> {
    let classifier = build_classifier(&config.classifier).await?;
    let db = open_database(&config)?;

    let store: Arc<dyn TurnStore> = Arc::new(TurnRepository::new(Arc::clone(&db)));
    let completion = Arc::new(CompletionClient::new(&config.completion)?);
    let sanitizer = ResponseSanitizer::new(&config.sanitizer.allowed_tags);

    let orchestrator = ChatOrchestrator::new(
        classifier,
        store,
        completion,
        sanitizer,
        config.context.max_turns,
    );
    tracing::info!(
        model = %config.completion.model,
        max_turns = config.context.max_turns,
        "Chat orchestrator ready"
    );

    let state = AppState::new(config.clone(), db, orchestrator);
    start_server(&config, state).await
}

fn add_user(config: &MedchatConfig, username: &str) -> Result<(), MedchatError> {
    let db = open_database(config)?;
    let user = UserRepository::new(db).create(username)?;
    tracing::info!(user_id = user.id, username = %user.username, "User created");
    println!("{}", user.id);
    Ok(())
}

/// Write the default configuration to `path`.
///
/// Environment overrides are not applied, so credentials never land in
/// the file.
fn init_config(path: &Path, force: bool) -> Result<(), MedchatError> {
    if path.exists() && !force {
        return Err(MedchatError::Config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    MedchatConfig::default().save(path)?;
    println!("{}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = MedchatConfig::load_or_default(&config_file);
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    let log_file = config.general.log_file.as_deref().map(expand_home);
    init_tracing(&level, log_file.as_deref())?;

    if let Command::InitConfig { force } = args.command() {
        init_config(&config_file, force)?;
        return Ok(());
    }

    tracing::info!("Starting medchat v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    match args.command() {
        Command::Serve => serve(config).await?,
        Command::AddUser { username } => add_user(&config, &username)?,
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_config_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medchat").join("config.toml");

        init_config(&path, false).unwrap();
        let written = MedchatConfig::load(&path).unwrap();
        assert_eq!(written.server.port, 8000);
        assert!(written.completion.api_key.is_empty());

        assert!(matches!(
            init_config(&path, false),
            Err(MedchatError::Config(_))
        ));
        init_config(&path, true).unwrap();
    }
}
