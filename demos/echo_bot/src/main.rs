//! Echo Bot Example
//!
//! Demonstrates routing, collectors and uploads:
//!
//! | Input | Behaviour |
//! |-------|-----------|
//! | any text | echoed back |
//! | `/collect` | collects your next 3 messages (30 s) and summarises them |
//! | `/vote` | posts a keyboard and tallies presses for 60 s |
//! | `/photo <path>` | uploads a local image |
//!
//! # Usage
//!
//! ```bash
//! GRAMLINE_BOT__TOKEN=123:abc cargo run --package echo-bot
//! cargo run --package echo-bot -- --config ./gramline.toml --drop-pending
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use gramline::core::model::Message;
use gramline::prelude::*;
use gramline::runtime::config::ConfigLoader;
use gramline::runtime::logging;
use serde_json::json;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "echo-bot", about = "Gramline echo bot demo")]
struct Args {
    /// Configuration file; defaults to gramline.toml in the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip updates that arrived while the bot was offline.
    #[arg(long)]
    drop_pending: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn on_text(client: Client, ctx: Context) {
    let Some(text) = ctx.text().map(str::to_owned) else {
        return;
    };

    let result = match text.split_once(' ').map_or((text.as_str(), ""), |(c, a)| (c, a)) {
        ("/start", _) => ctx
            .reply("Send me anything. Try /collect, /vote or /photo <path>.")
            .await
            .map(drop),
        ("/collect", _) => collect(&client, &ctx).await,
        ("/vote", _) => vote(&client, &ctx).await,
        ("/photo", path) if !path.is_empty() => ctx
            .send_photo(InputFile::path(path), Some("Uploaded by gramline"))
            .await
            .map(drop),
        _ => ctx.reply(text.as_str()).await.map(drop),
    };

    if let Err(e) = result {
        error!(update_id = ctx.update_id(), error = %e, "Handler failed");
    }
}

/// Collects the sender's next three messages in this chat.
async fn collect(client: &Client, ctx: &Context) -> Result<(), ApiError> {
    let (Some(chat_id), Some(user_id)) = (ctx.chat_id(), ctx.from_id()) else {
        return Ok(());
    };
    let options = CollectorOptions::builder()
        .filter(move |msg: &Context, _| msg.from_id() == Some(user_id))
        .max(3)
        .time(Duration::from_secs(30))
        .build();
    let collector = match options.and_then(|o| client.message_collector(chat_id, o)) {
        Ok(collector) => collector,
        Err(e) => {
            warn!(error = %e, "Could not start collector");
            return Ok(());
        }
    };
    ctx.reply("Listening for your next 3 messages...").await?;

    let (reason, collected) = collector.wait().await;
    let texts: Vec<&str> = collected.values().filter_map(Context::text).collect();
    ctx.send_message(format!(
        "Collected {} message(s), ended by {reason}: {}",
        collected.len(),
        texts.join(" | ")
    ))
    .await?;
    Ok(())
}

/// Posts a keyboard and tallies the presses on it.
async fn vote(client: &Client, ctx: &Context) -> Result<(), ApiError> {
    let Some(chat_id) = ctx.chat_id() else {
        return Ok(());
    };
    let keyboard = json!({"inline_keyboard": [[
        {"text": "Rust", "callback_data": "rust"},
        {"text": "Also Rust", "callback_data": "also-rust"}
    ]]});
    let poll: Message = client
        .api()
        .call(
            "sendMessage",
            Params::new()
                .with("chat_id", chat_id)
                .with("text", "Vote within 60 s")
                .with("reply_markup", keyboard),
        )
        .await?;

    let options = CollectorOptions::builder()
        .time(Duration::from_secs(60))
        .max_processed(50)
        .build();
    let collector = match options
        .and_then(|o| InlineKeyboardCollector::for_keyboard(client.bus(), Some(poll.message_id), o))
    {
        Ok(collector) => collector,
        Err(e) => {
            warn!(error = %e, "Could not start keyboard collector");
            return Ok(());
        }
    };
    collector.on_collect(|_, press| {
        let press = press.clone();
        tokio::spawn(async move {
            if let Err(e) = press.answer_callback_query(Some("Counted!")).await {
                warn!(error = %e, "Failed to answer press");
            }
        });
    });

    let (_, presses) = collector.wait().await;
    let mut tally: BTreeMap<String, usize> = BTreeMap::new();
    for press in presses.values() {
        if let Some(data) = press.callback_query().and_then(|q| q.data.clone()) {
            *tally.entry(data).or_default() += 1;
        }
    }
    ctx.send_message(format!("Results: {tally:?}")).await?;
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn register(client: &Client) -> Vec<Subscription> {
    let text_client = client.clone();
    vec![
        client.on("ready", |event| {
            if let BotEvent::Ready(me) = event {
                info!(id = me.id, username = ?me.username, "Echo bot is online");
            }
        }),
        client.on("rate_limit", |event| {
            if let BotEvent::RateLimit(signal) = event {
                warn!(method = %signal.method, retry_after = ?signal.retry_after, "Slow down");
            }
        }),
        client.on("error", |event| {
            if let BotEvent::Error(e) = event {
                warn!(error = %e, "Polling hiccup");
            }
        }),
        client.on_async("message:text", move |event| {
            let client = text_client.clone();
            async move {
                if let Some(ctx) = event.context() {
                    on_text(client, ctx.clone()).await;
                }
            }
        }),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::new().file(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;
    config.polling.drop_pending_updates |= args.drop_pending;
    logging::init_from_config(&config.logging);

    let client = Client::builder().config(config).build()?;
    let _subscriptions = register(&client);

    client.run_until_ctrl_c().await?;
    info!("Bye");
    Ok(())
}
