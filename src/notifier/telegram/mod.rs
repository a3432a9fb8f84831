pub mod command_handler;
pub mod listener;
pub mod sender;

use crate::model::NotifyError;
use reqwest::Client;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    pub bot_token: String,
    pub chat_id: i64,
    pub client: Client,
    pub offset: Arc<AtomicI64>,
    pub start_time: Instant,
    pub refresh_notify: Arc<Notify>,
    pub last_run: Mutex<Option<String>>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: i64, refresh_notify: Arc<Notify>) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Api(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            bot_token,
            chat_id,
            client,
            offset: Arc::new(AtomicI64::new(0)),
            start_time: Instant::now(),
            refresh_notify,
            last_run: Mutex::new(None),
        })
    }

    pub(crate) fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.bot_token, method)
    }

    pub async fn notify_text(&self, text: &str) -> Result<(), NotifyError> {
        sender::send_text(self, text).await
    }

    /// Remembers the outcome of an update run for `/status` and forwards it to the chat.
    pub async fn report_run(&self, message: &str) {
        *self.last_run.lock().await = Some(message.to_string());
        if let Err(e) = self.notify_text(message).await {
            warn!("Run report failed: {}", e);
        }
    }

    pub async fn listen_for_commands(&self) {
        listener::listen_for_commands(self).await;
    }

    pub async fn set_my_commands(&self) -> Result<(), NotifyError> {
        let commands = serde_json::json!({
            "commands": [
                { "command": "ping", "description": "Check connection" },
                { "command": "status", "description": "Last update run" },
                { "command": "help", "description": "Command list" },
                { "command": "refresh", "description": "Run an update now" },
                { "command": "uptime", "description": "Service uptime" }
            ]
        });
        self.client
            .post(self.method_url("setMyCommands"))
            .json(&commands)
            .send()
            .await
            .map_err(|e| NotifyError::Api(format!("setMyCommands failed: {}", e)))?;
        Ok(())
    }

    pub fn spawn_listener(notifier: Arc<TelegramNotifier>) {
        tokio::spawn(async move {
            info!("▶️ Starting Telegram listener...");
            notifier.listen_for_commands().await;
            info!("🛑 Telegram listener ended.");
        });
    }
}
