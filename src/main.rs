use finseries::api::{self, AppState};
use finseries::config::{AppConfig, load_config};
use finseries::notifier::TelegramNotifier;
use finseries::source::{EconSource, EodClient, FredClient, InstrumentMetaStore, MarketSource, RetryingClient};
use finseries::storage::SqliteStorage;
use finseries::updater;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("😱 Panic occurred: {:?}", panic_info);
    }));

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config: Arc<AppConfig> = match load_config(&config_path) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error ({}): {}", config_path, e);
            return;
        }
    };

    let http = match RetryingClient::new(
        Duration::from_secs(config.request_timeout_seconds),
        config.max_retries,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };
    let econ: Arc<dyn EconSource> = Arc::new(FredClient::new(http.clone(), config.fred_api_key.clone()));
    let market: Arc<dyn MarketSource> = Arc::new(EodClient::new(http, config.eod_api_key.clone()));

    // SQLite behind an async mutex, shared by the updater and the API
    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            return;
        }
    };

    let refresh_notify = Arc::new(Notify::new());
    let notifier = match &config.telegram {
        Some(tg) => match TelegramNotifier::new(tg.bot_token.clone(), tg.chat_id, refresh_notify.clone()) {
            Ok(n) => Some(Arc::new(n)),
            Err(e) => {
                warn!("Telegram notifier disabled: {}", e);
                None
            }
        },
        None => None,
    };

    if let Some(notifier) = &notifier {
        if let Err(e) = notifier.set_my_commands().await {
            warn!("Command registration failed: {}", e);
        }
        TelegramNotifier::spawn_listener(notifier.clone());
        info!("Sending startup message...");
        if let Err(e) = notifier.notify_text("🚀 finseries started!").await {
            warn!("Startup notification failed: {}", e);
        }
    }

    if config.update.enabled {
        tokio::spawn(updater::run_forever(
            config.update.clone(),
            econ.clone(),
            market.clone(),
            storage.clone(),
            refresh_notify.clone(),
            notifier.clone(),
        ));
    } else {
        info!("Scheduled updates disabled.");
    }

    let instruments: Arc<dyn InstrumentMetaStore> = storage;
    let state = AppState {
        econ,
        market,
        instruments,
    };
    if let Err(e) = api::serve(&config.bind_addr, state).await {
        error!("Server error: {}", e);
    }
}
