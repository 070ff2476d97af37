use crate::bot::progress::{progress_channel, run_progress_updates};
use crate::bot::resilient::{edit_message_safe_resilient, send_message_resilient};
use crate::config::PROGRESS_EDIT_INTERVAL_MS;
use anyhow::Result;
use media_relay_core::service::RelayService;
use media_relay_core::settings::RequesterId;
use std::sync::Arc;
use std::time::Duration;
use teloxide::{prelude::*, types::ParseMode, utils::command::BotCommands};
use tracing::{error, info};

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot and see instructions.")]
    Start,
    /// Show usage help
    #[command(description = "Show this help message.")]
    Help,
    /// Relay every media message between two links
    #[command(description = "Forward media: /forward <group_id>[/<topic_id>] <first_url> <last_url>")]
    Forward(String),
    /// Stop the running forward
    #[command(description = "Cancel the running forward.")]
    Cancel,
    /// Set the caption appended to single-item relays
    #[command(description = "Set the caption appended to relayed media.")]
    Caption(String),
    /// Remove the appended caption
    #[command(description = "Remove the appended caption.")]
    ClearCaption,
    /// Add a caption replacement rule
    #[command(description = "Replace caption text: /replace <old> => <new>")]
    Replace(String),
    /// Remove all replacement rules
    #[command(description = "Remove all replacement rules.")]
    ClearReplace,
    /// Choose where single-item relays go
    #[command(description = "Send single-item relays to: /setdest <group_id>[/<topic_id>] or /setdest me")]
    SetDest(String),
    /// Send single-item relays back to the requester
    #[command(description = "Send single-item relays back to you.")]
    ClearDest,
    /// Show the current settings
    #[command(description = "Show your current settings.")]
    Settings,
    /// Check bot health
    #[command(description = "Check bot health.")]
    Healthcheck,
}

/// Welcome text for `/start`.
pub const WELCOME_TEXT: &str = "🤖 <b>Telegram Forward Bot</b>\n\n\
<b>Commands:</b>\n\
<code>/forward target_id first_url last_url</code>\n\n\
<b>Example:</b>\n\
<code>/forward 3187801487/38 https://t.me/c/2387726302/7 https://t.me/c/2387726302/77</code>\n\n\
<b>Format:</b>\n\
• <code>target_id</code>: GroupID/TopicID (e.g., 3187801487/38)\n\
• <code>first_url</code>: First message URL\n\
• <code>last_url</code>: Last message URL\n\n\
The bot will forward all media files between the first and last URLs to the specified topic.\n\
Send any single message link to copy just that item (see /help).";

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Identity that owns settings and jobs for `msg`.
///
/// Messages without a sender (channel posts) are attributed to their chat,
/// so replies and single-item relays land where the message was posted.
#[must_use]
pub fn requester(msg: &Message) -> RequesterId {
    msg.from
        .as_ref()
        .map_or(RequesterId(msg.chat.id.0), |u| RequesterId(u.id.0.cast_signed()))
}

async fn reply(bot: &Bot, msg: &Message, text: &str) -> Result<()> {
    send_message_resilient(
        bot,
        msg.chat.id,
        html_escape::encode_text(text),
        Some(ParseMode::Html),
        Some(msg.id),
    )
    .await?;
    Ok(())
}

/// Start handler.
///
/// # Errors
///
/// Returns an error if the welcome message cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    info!("Start command received from user {}.", get_user_id_safe(&msg));
    send_message_resilient(&bot, msg.chat.id, WELCOME_TEXT, Some(ParseMode::Html), None).await?;
    Ok(())
}

/// Help handler, listing every command.
///
/// # Errors
///
/// Returns an error if the help message cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<()> {
    let text = format!(
        "🆘 Help Guide\n\n{}\n\n\
         Source URLs: https://t.me/c/channel_id/message_id or https://t.me/username/message_id\n\
         Target: group_id or group_id/topic_id\n\n\
         The bot must be able to read the source chat and post in the target.",
        Command::descriptions()
    );
    reply(&bot, &msg, &text).await
}

/// Healthcheck handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn healthcheck(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Healthcheck command received from user {user_id}.");
    bot.send_message(msg.chat.id, "OK").await?;
    info!("Responded 'OK' to healthcheck from user {user_id}.");
    Ok(())
}

/// Splits `/forward` arguments into target and the two links.
#[must_use]
pub fn split_forward_args(args: &str) -> Option<(&str, &str, &str)> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(target), Some(first), Some(last), None) => Some((target, first, last)),
        _ => None,
    }
}

/// `/forward` handler: validates the request and runs the job in the background.
///
/// The status message is edited with progress and finally with the summary.
///
/// # Errors
///
/// Returns an error if the status message cannot be sent.
pub async fn forward(bot: Bot, msg: Message, args: String, service: Arc<RelayService>) -> Result<()> {
    let Some((target, first_url, last_url)) = split_forward_args(&args) else {
        return reply(
            &bot,
            &msg,
            "❌ Invalid format. Use: /forward target_id first_url last_url",
        )
        .await;
    };

    let requester = requester(&msg);
    let job = match service.prepare_range(requester, target, first_url, last_url) {
        Ok(job) => job,
        Err(text) => return reply(&bot, &msg, &text).await,
    };

    let chat_id = msg.chat.id;
    let status = send_message_resilient(
        &bot,
        chat_id,
        "🔄 Processing your forward request...",
        None,
        Some(msg.id),
    )
    .await?;

    info!(
        %requester,
        source = %job.request().source,
        destination = %job.request().destination,
        "Forward started"
    );

    tokio::spawn(async move {
        let (observer, rx) = progress_channel();
        let updater = tokio::spawn(run_progress_updates(
            bot.clone(),
            chat_id,
            status.id,
            rx,
            Duration::from_millis(PROGRESS_EDIT_INTERVAL_MS),
        ));

        let summary = job.run(&observer).await;
        // closing the channel ends the updater after its in-flight edit
        drop(observer);
        if let Err(e) = updater.await {
            error!("Progress updater failed: {e}");
        }

        let text = html_escape::encode_text(&summary);
        if !edit_message_safe_resilient(&bot, chat_id, status.id, &text).await {
            if let Err(e) = send_message_resilient(
                &bot,
                chat_id,
                text.to_string(),
                Some(ParseMode::Html),
                Some(msg.id),
            )
            .await
            {
                error!("Failed to deliver forward summary: {e}");
            }
        }
        info!(%requester, "Forward finished");
    });

    Ok(())
}

/// `/cancel` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn cancel(bot: Bot, msg: Message, service: Arc<RelayService>) -> Result<()> {
    let text = service.cancel(requester(&msg));
    reply(&bot, &msg, &text).await
}

/// `/caption` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn caption(bot: Bot, msg: Message, text: String, service: Arc<RelayService>) -> Result<()> {
    let answer = service.set_caption(requester(&msg), &text).await;
    reply(&bot, &msg, &answer).await
}

/// `/clearcaption` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn clear_caption(bot: Bot, msg: Message, service: Arc<RelayService>) -> Result<()> {
    let answer = service.clear_caption(requester(&msg)).await;
    reply(&bot, &msg, &answer).await
}

/// `/replace` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn replace(bot: Bot, msg: Message, args: String, service: Arc<RelayService>) -> Result<()> {
    let answer = service.add_replacement(requester(&msg), &args).await;
    reply(&bot, &msg, &answer).await
}

/// `/clearreplace` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn clear_replace(bot: Bot, msg: Message, service: Arc<RelayService>) -> Result<()> {
    let answer = service.clear_replacements(requester(&msg)).await;
    reply(&bot, &msg, &answer).await
}

/// `/setdest` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn set_dest(bot: Bot, msg: Message, spec: String, service: Arc<RelayService>) -> Result<()> {
    let answer = service.set_destination(requester(&msg), &spec).await;
    reply(&bot, &msg, &answer).await
}

/// `/cleardest` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn clear_dest(bot: Bot, msg: Message, service: Arc<RelayService>) -> Result<()> {
    let answer = service.clear_destination(requester(&msg)).await;
    reply(&bot, &msg, &answer).await
}

/// `/settings` handler.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn settings(bot: Bot, msg: Message, service: Arc<RelayService>) -> Result<()> {
    let answer = service.describe_settings(requester(&msg)).await;
    reply(&bot, &msg, &answer).await
}

/// Single-item relay for a message containing a link.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_link(bot: Bot, msg: Message, service: Arc<RelayService>) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let requester = requester(&msg);
    info!(%requester, "Single-item relay requested");
    let answer = service.handle_single_item_link(requester, text).await;
    reply(&bot, &msg, &answer).await
}
