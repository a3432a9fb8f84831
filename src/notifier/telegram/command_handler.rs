// notifier/telegram/command_handler.rs

use crate::notifier::telegram::TelegramNotifier;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Status,
    Help,
    Refresh,
    Uptime,
    Unknown,
}

impl Command {
    /// Accepts `/cmd`, `/cmd@BotName` and trailing arguments.
    pub fn parse(text: &str) -> Self {
        let word = text.split_whitespace().next().unwrap_or_default();
        let name = word.split('@').next().unwrap_or_default();
        match name {
            "/ping" => Command::Ping,
            "/status" => Command::Status,
            "/help" => Command::Help,
            "/refresh" => Command::Refresh,
            "/uptime" => Command::Uptime,
            _ => Command::Unknown,
        }
    }
}

pub fn format_uptime(uptime: Duration) -> String {
    format!(
        "⏱ Uptime: {:02}:{:02}:{:02}",
        uptime.as_secs() / 3600,
        (uptime.as_secs() % 3600) / 60,
        uptime.as_secs() % 60
    )
}

/// Reply text for `command`. `/refresh` also wakes the update loop.
pub async fn reply_for(command: Command, notifier: &TelegramNotifier) -> String {
    match command {
        Command::Ping => "✅ I am online!".to_string(),
        Command::Status => match notifier.last_run.lock().await.as_deref() {
            Some(last) => format!("📊 Last update run:\n{}", last),
            None => "📊 No update run has finished yet.".to_string(),
        },
        Command::Help => "📋 Available commands:\n\
            /ping: check connection\n\
            /status: last update run\n\
            /help: command list\n\
            /refresh: run an update now\n\
            /uptime: service uptime"
            .to_string(),
        Command::Refresh => {
            info!("/refresh command received, triggering update...");
            notifier.refresh_notify.notify_one();
            "🔄 Update run triggered.".to_string()
        }
        Command::Uptime => format_uptime(notifier.start_time.elapsed()),
        Command::Unknown => "🤖 Unknown command. Type /help for a list of commands.".to_string(),
    }
}

/// Handles an incoming command and answers in the chat.
pub async fn handle_command(command_text: &str, notifier: &TelegramNotifier) {
    info!("Handling command: {}", command_text);
    let reply = reply_for(Command::parse(command_text), notifier).await;
    if let Err(e) = notifier.notify_text(&reply).await {
        warn!("{} reply error: {}", command_text, e);
    }
}
