// notifier/telegram/listener.rs

use crate::notifier::telegram::TelegramNotifier;
use crate::notifier::telegram::command_handler::handle_command;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
pub(crate) struct TelegramApiResponse {
    #[serde(default)]
    pub result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TelegramMessage {
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TelegramChat {
    pub id: i64,
}

/// Text of an update if it came from the configured chat.
pub(crate) fn command_text(update: &TelegramUpdate, chat_id: i64) -> Option<&str> {
    let message = update.message.as_ref()?;
    if message.chat.id != chat_id {
        return None;
    }
    message.text.as_deref()
}

/// Polls for Telegram updates and processes incoming commands.
pub async fn listen_for_commands(notifier: &TelegramNotifier) {
    let url = notifier.method_url("getUpdates");
    loop {
        let current_offset = notifier.offset.load(Ordering::SeqCst);
        let response = notifier
            .client
            .get(&url)
            .query(&[("offset", current_offset.to_string())])
            .send()
            .await;
        match response {
            Ok(resp) => match resp.json::<TelegramApiResponse>().await {
                Ok(api_response) => {
                    for update in api_response.result {
                        if let Some(text) = command_text(&update, notifier.chat_id) {
                            handle_command(text, notifier).await;
                        } else {
                            debug!("Ignoring update {}", update.update_id);
                        }
                        notifier.offset.store(update.update_id + 1, Ordering::SeqCst);
                    }
                }
                Err(e) => warn!("getUpdates decode error: {}", e.without_url()),
            },
            Err(e) => warn!("getUpdates failed: {}", e.without_url()),
        }
        sleep(Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_messages_from_the_configured_chat_count() {
        let response: TelegramApiResponse = serde_json::from_value(json!({
            "ok": true,
            "result": [
                {"update_id": 1, "message": {"chat": {"id": 42}, "text": "/ping"}},
                {"update_id": 2, "message": {"chat": {"id": 7}, "text": "/refresh"}},
                {"update_id": 3, "edited_message": {}},
                {"update_id": 4, "message": {"chat": {"id": 42}}}
            ]
        }))
        .unwrap();

        let texts: Vec<Option<&str>> = response.result.iter().map(|u| command_text(u, 42)).collect();
        assert_eq!(texts, vec![Some("/ping"), None, None, None]);
    }
}
