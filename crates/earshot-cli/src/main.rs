use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand};
use earshot_core::{
    determine_action, determine_priority, load_config, BusinessContextStore, EarshotConfig,
    EngineDeps, GateServices, PostClassifier, ResponseGenerator, SessionManager,
};
use earshot_platforms::DefaultPlatformFactory;
use earshot_provider::create_provider;
use earshot_schema::{Author, EngagementCounters, Platform, Post};
use earshot_server::state::AppState;
use earshot_store::SqliteStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "earshot", version, about = "earshot social listening engine")]
struct Cli {
    #[arg(
        long,
        default_value = "config",
        help = "Config root directory (contains main.yaml)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP control surface and tenant listeners")]
    Serve {
        #[arg(long, help = "Override server.bind from main.yaml")]
        bind: Option<String>,
    },
    #[command(about = "Validate config files")]
    Validate,
    #[command(about = "Classify a post against a keyword set and print the verdict")]
    Classify {
        #[arg(help = "Post text")]
        text: String,
        #[arg(long = "keyword", short = 'k', help = "Keyword to match (repeatable)")]
        keywords: Vec<String>,
        #[arg(long, default_value = "twitter")]
        platform: Platform,
        #[arg(long, help = "Author is verified")]
        verified: bool,
        #[arg(long, default_value_t = 0)]
        likes: u64,
        #[arg(long, default_value_t = 0)]
        shares: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "earshot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config_root)?;
            println!(
                "Config valid. provider {:?}, {} default keywords, {} default platforms.",
                config.provider.kind,
                config.listening.default_keywords.len(),
                config.listening.default_platforms.len()
            );
        }
        Commands::Serve { bind } => {
            let mut config = load_config(&cli.config_root)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            serve(config).await?;
        }
        Commands::Classify {
            text,
            keywords,
            platform,
            verified,
            likes,
            shares,
        } => {
            let post = cli_post(platform, text, verified, likes, shares);
            let verdict = PostClassifier::new().classify(&post, &keywords)?;
            let report = serde_json::json!({
                "matched_keywords": verdict.matched_keywords,
                "relevance_score": verdict.relevance_score,
                "sentiment": verdict.sentiment,
                "suggested_action": verdict.suggested_action,
                "suggested_category": verdict.suggested_category,
                "trigger_action": determine_action(&verdict),
                "priority": determine_priority(verdict.relevance_score),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn serve(config: EarshotConfig) -> Result<()> {
    let sessions = Arc::new(build_sessions(&config)?);
    let state = AppState::new(sessions.clone());

    tracing::info!(
        app = %config.app.name,
        env = %config.app.env,
        "starting earshot"
    );
    earshot_server::serve(state, &config.server.bind, shutdown_signal()).await?;

    sessions.shutdown().await;
    tracing::info!("all listeners stopped");
    Ok(())
}

fn build_sessions(config: &EarshotConfig) -> Result<SessionManager> {
    let store = Arc::new(
        SqliteStore::open(Path::new(&config.database.path))
            .with_context(|| format!("opening store at {}", config.database.path))?,
    );
    let provider = create_provider(&config.provider.provider_config())?;
    let generator = ResponseGenerator::new(provider, config.provider.model.clone())
        .with_max_tokens(config.provider.max_tokens)
        .with_knowledge_hits(config.listening.knowledge_hits);
    let factory = DefaultPlatformFactory::new(config.platforms.clone(), store.clone(), store.clone());

    let deps = EngineDeps {
        integrations: store.clone(),
        factory: Arc::new(factory),
        audit: store.clone(),
        gate: GateServices {
            context: Arc::new(BusinessContextStore::new(store.clone())),
            generator: Arc::new(generator),
            audit: store.clone(),
            approvals: store,
        },
        classifier: PostClassifier::new(),
        retry_interval: Duration::from_secs(config.listening.retry_interval_secs),
        queue_capacity: config.listening.queue_capacity,
    };
    Ok(SessionManager::new(deps, config.listening.default_listener()))
}

fn cli_post(platform: Platform, text: String, verified: bool, likes: u64, shares: u64) -> Post {
    Post {
        id: "cli".into(),
        platform,
        author: Author {
            id: "cli".into(),
            handle: "cli".into(),
            display_name: "cli".into(),
            verified,
            followers: None,
            profile_image: None,
        },
        text,
        media: Vec::new(),
        metrics: EngagementCounters {
            likes,
            shares,
            comments: 0,
            impressions: None,
        },
        created_at: Utc::now(),
        conversation_id: None,
        in_reply_to_id: None,
        language: None,
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c.await.ok();
                tracing::info!("Received SIGINT, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("Received SIGINT, shutting down...");
    }
}
