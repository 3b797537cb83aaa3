//! wb-bridge: WhatsApp <-> Chatwoot bridge binary
//!
//! Relays customer messages from a WuzAPI WhatsApp gateway into a Chatwoot
//! inbox and agent replies back out, with echo suppression so neither
//! platform re-triggers the other.
//!
//! Usage:
//!   wb-bridge            - Start the webhook server
//!   wb-bridge --help     - Show help
//!   wb-bridge --version  - Show version

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use wb_api::AppState;
use wb_cache::{MemoryCache, RedisCache};
use wb_chatwoot::ChatwootClient;
use wb_core::cache::ConversationCache;
use wb_core::config::Config;
use wb_core::guard::TokenGuard;
use wb_core::sync::{SyncToChat, SyncToInbox};
use wb_wuzapi::WuzapiClient;

enum RunMode {
    Server,
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("wb-bridge {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("config error: {}", e))?;

    tracing::info!("starting wb-bridge...");
    tracing::info!("chatwoot: {} (inbox {})", config.chatwoot.url, config.chatwoot.inbox_id);
    tracing::info!("wuzapi: {}", config.wuzapi.url);

    run_server(config).await
}

fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

fn print_help() {
    println!("wb-bridge - WhatsApp <-> Chatwoot bridge");
    println!();
    println!("Usage:");
    println!("  wb-bridge            Start the webhook server");
    println!("  wb-bridge --help     Show this help message");
    println!("  wb-bridge --version  Show version");
    println!();
    println!("Configuration is read from ./wb-bridge.toml when present, with");
    println!("environment variables taking precedence:");
    println!("  HOST                    Bind address (default: 0.0.0.0)");
    println!("  PORT                    Webhook server port (default: 8000)");
    println!("  CHATWOOT_URL            Chatwoot base URL (required)");
    println!("  CHATWOOT_API_KEY        Chatwoot API access token (required)");
    println!("  CHATWOOT_ACCOUNT_ID     Chatwoot account id (default: 1)");
    println!("  CHATWOOT_INBOX_ID       Target inbox id (required)");
    println!("  WUZAPI_URL              WuzAPI base URL (required)");
    println!("  WUZAPI_USER_TOKEN       WuzAPI user token (required)");
    println!("  WUZAPI_INSTANCE_TOKEN   WuzAPI instance token (required)");
    println!("  REDIS_URL               Redis URL (default: redis://localhost:6379/0)");
    println!("  CONVERSATION_TTL_SECS   Conversation cache TTL (default: 3600)");
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let inbox = Arc::new(
        ChatwootClient::new(
            &config.chatwoot.url,
            &config.chatwoot.api_key,
            &config.chatwoot.account_id,
            &config.chatwoot.inbox_id,
        )
        .map_err(|e| anyhow::anyhow!("chatwoot client: {}", e))?,
    );

    let chat = Arc::new(
        WuzapiClient::new(
            &config.wuzapi.url,
            &config.wuzapi.user_token,
            &config.wuzapi.instance_token,
        )
        .map_err(|e| anyhow::anyhow!("wuzapi client: {}", e))?,
    );

    // Prefer Redis; the in-memory cache keeps the bridge relaying when
    // Redis is down, losing only warm conversation links on restart.
    let cache: Arc<dyn ConversationCache> =
        match RedisCache::connect(&config.cache.redis_url).await {
            Ok(redis) => Arc::new(redis),
            Err(e) => {
                tracing::warn!("redis unavailable ({}), using in-memory cache", e);
                Arc::new(MemoryCache::new())
            }
        };
    let cache_backend = cache.backend_name();
    tracing::info!("cache backend: {}", cache_backend);

    let conversation_ttl = std::time::Duration::from_secs(config.cache.conversation_ttl_secs);
    let to_inbox = Arc::new(SyncToInbox::new(
        inbox,
        chat.clone(),
        cache.clone(),
        conversation_ttl,
    ));
    let to_chat = Arc::new(SyncToChat::new(chat, cache));
    let guard = Arc::new(TokenGuard::new(&config.wuzapi.instance_token));

    let state = AppState {
        config,
        to_inbox,
        to_chat,
        guard,
        cache_backend,
    };

    let server = tokio::spawn(async move {
        if let Err(e) = wb_api::start_server(state).await {
            tracing::error!("webhook server error: {}", e);
        }
    });

    tracing::info!("wb-bridge initialized");
    tracing::info!("press Ctrl+C to exit");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");
    server.abort();

    Ok(())
}
