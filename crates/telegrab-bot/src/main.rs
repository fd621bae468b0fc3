use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use telegrab_bot::context::AppContext;
use telegrab_bot::selection;
use telegrab_bot::telegram::{Frontend, TelegramClient, Update};
use telegrab_core::config::Config;
use telegrab_core::platform;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = data_dir.join("telegrab.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // Allow RUST_LOG override; default to debug for app code but suppress
    // connection-level DEBUG from HTTP client internals.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    eprintln!("telegrab log: {}", log_path.display());
    info!("telegrab starting…");

    let config = Config::load().context("failed to load config")?;
    std::fs::create_dir_all(&config.paths.downloads_dir)?;

    let token = std::env::var(&config.bot.token_env)
        .with_context(|| format!("{} not set in environment", config.bot.token_env))?;

    let client = Arc::new(TelegramClient::new(&config.bot.api_url, &token)?);
    let poll_timeout = config.bot.poll_timeout_secs;
    let frontend: Arc<dyn Frontend> = Arc::clone(&client) as Arc<dyn Frontend>;
    let ctx = Arc::new(AppContext::new(config, frontend)?);

    info!("bot started, polling for updates");

    let mut offset: i64 = 0;
    loop {
        let updates = match client.get_updates(offset, poll_timeout).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("getUpdates failed: {e:#}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            dispatch(&ctx, update).await;
        }
    }
}

async fn dispatch(ctx: &Arc<AppContext>, update: Update) {
    if let Some(message) = update.message {
        let Some(text) = message.text.as_deref() else { return };
        let chat_id = message.chat.id;
        match text.trim() {
            "/start" => {
                if let Err(e) = ctx
                    .frontend
                    .send_text(chat_id, selection::WELCOME_TEXT, None)
                    .await
                {
                    error!("failed to send welcome: {e:#}");
                }
            }
            "/premium" => {
                if let Err(e) = ctx
                    .frontend
                    .send_text(chat_id, selection::PREMIUM_INFO_TEXT, None)
                    .await
                {
                    error!("failed to send premium info: {e:#}");
                }
            }
            text if text.starts_with('/') => {
                // Unknown command, ignore.
            }
            text => selection::handle_text(ctx, chat_id, text).await,
        }
    } else if let Some(query) = update.callback_query {
        selection::handle_callback(ctx, &query).await;
    }
}
