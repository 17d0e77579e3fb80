use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use sha2::{Digest, Sha256};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use circle_domain::config::{Config, ConfigSeverity};
use circle_gateway::api;
use circle_gateway::cli::{Cli, Command, ConfigCommand};
use circle_gateway::runtime::session::SessionRegistry;
use circle_gateway::state::AppState;
use circle_llm::{EmbeddingClient, HttpEmbeddingClient, LlmClient, OllamaClient, WarmthManager};
use circle_sessions::PersonaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, _config_path) = circle_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = circle_gateway::cli::load_config()?;
            let valid = circle_gateway::cli::validate_config(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = circle_gateway::cli::load_config()?;
            circle_gateway::cli::show_config(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("circled {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initializes structured JSON tracing. OTLP export is wired in only when
/// `observability.otlp_endpoint` is set; otherwise this degrades to the
/// teacher's plain stdout JSON logger.
fn init_tracing(observability: &circle_domain::config::ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,circle_gateway=debug"));

    if let Some(endpoint) = observability.otlp_endpoint.as_deref() {
        use opentelemetry::trace::TracerProvider as _;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build();

        match exporter {
            Ok(exporter) => {
                let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", observability.service_name.clone()),
                    ]))
                    .build();
                let tracer = provider.tracer(observability.service_name.clone());
                opentelemetry::global::set_tracer_provider(provider);

                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .with(otel_layer)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("failed to install OTLP exporter: {e}; falling back to stdout logging");
            }
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

/// Starts the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("circle gateway starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Persona store ─────────────────────────────────────────────────
    let personas = Arc::new(
        PersonaStore::load(
            std::path::Path::new(&config.personas.templates_dir),
            std::path::Path::new(&config.personas.personas_dir),
        )
        .context("loading persona store")?,
    );
    tracing::info!(
        personas = personas.list_personas().len(),
        templates = personas.list_templates().len(),
        "persona store ready"
    );

    // ── LLM + embedding adapters ──────────────────────────────────────
    let llm: Arc<dyn LlmClient> = Arc::new(
        OllamaClient::new(
            config.llm.base_url.clone(),
            config.llm.timeout_secs,
            config.llm.max_retries,
            config.llm.liveness_timeout_secs,
            config.llm.warm_timeout_secs,
        )
        .context("initializing LLM client")?,
    );
    let embeddings: Arc<dyn EmbeddingClient> = Arc::new(HttpEmbeddingClient::new(
        config.llm.base_url.clone(),
        config.llm.embedding_model.clone(),
        config.llm.embedding_dimension,
    ));
    tracing::info!(base_url = %config.llm.base_url, "LLM and embedding clients ready");

    // ── Warmth manager ────────────────────────────────────────────────
    let warmth = Arc::new(WarmthManager::new(
        llm.clone(),
        Vec::new(),
        std::time::Duration::from_secs(config.llm.warmth_interval_secs),
    ));
    tracing::info!(
        interval_secs = config.llm.warmth_interval_secs,
        "warmth manager started"
    );

    // ── Session registry ──────────────────────────────────────────────
    let sessions = Arc::new(SessionRegistry::new());
    if let Err(e) = std::fs::create_dir_all(&config.sessions.state_dir) {
        tracing::warn!(path = %config.sessions.state_dir, error = %e, "failed to create session state dir");
    }
    tracing::info!(state_dir = %config.sessions.state_dir, "session registry ready");

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var = %env_var, "API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!(
                    env_var = %env_var,
                    "API bearer-token auth DISABLED — set {env_var} to enable"
                );
                None
            }
        }
    };

    let state = AppState {
        config: config.clone(),
        personas,
        llm,
        embeddings,
        sessions,
        warmth,
        api_token_hash,
    };

    // ── CORS layer ────────────────────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors_allowed_origins);

    // ── Concurrency limit (backpressure protection) ─────────────────
    tracing::info!(max_concurrent = config.server.max_concurrent, "concurrency limit set");

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(config.server.max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "circle gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Builds a [`CorsLayer`] from the configured allowed origins. A literal
/// `"*"` entry allows all origins (not recommended for production, flagged
/// as a config warning by `Config::validate`).
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let exact: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %o, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(exact))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
