use crate::bot;
use crate::bot::handlers::{get_user_id_safe, Command};
use crate::bot::resilient::send_message_resilient;
use crate::config::BotSettings;
use crate::transport::TelegramTransport;
use media_relay_core::engine::{RelayConfig, RelayEngine};
use media_relay_core::link::find_message_link;
use media_relay_core::service::RelayService;
use media_relay_core::transport::MessagingTransport;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info, warn};

/// Run the Telegram transport runtime.
pub async fn run_bot(settings: Arc<BotSettings>) {
    let bot = Bot::new(settings.telegram.telegram_token.clone());
    let service = init_service(bot.clone(), &settings);
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service, settings])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn init_service(bot: Bot, settings: &BotSettings) -> Arc<RelayService> {
    if settings.telegram.scratch_chat_id.is_none() {
        warn!("SCRATCH_CHAT_ID is not set, range forwards will fail to read history");
    }
    let transport: Arc<dyn MessagingTransport> =
        Arc::new(TelegramTransport::new(bot, settings.telegram.as_ref()));
    let config = RelayConfig::from(settings.relay.as_ref());

    info!(
        "Relay engine initialized (spacing: {:?}, flood retries: {}, max span: {})",
        config.send_spacing, config.flood_retry_limit, config.max_range_span
    );

    Arc::new(RelayService::new(RelayEngine::new(transport, config)))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            dptree::filter(|msg: Message| msg.text().and_then(find_message_link).is_some())
                .endpoint(handle_link),
        )
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_other_text))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    service: Arc<RelayService>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => bot::handlers::start(bot, msg).await,
        Command::Help => bot::handlers::help(bot, msg).await,
        Command::Forward(args) => bot::handlers::forward(bot, msg, args, service).await,
        Command::Cancel => bot::handlers::cancel(bot, msg, service).await,
        Command::Caption(text) => bot::handlers::caption(bot, msg, text, service).await,
        Command::ClearCaption => bot::handlers::clear_caption(bot, msg, service).await,
        Command::Replace(args) => bot::handlers::replace(bot, msg, args, service).await,
        Command::ClearReplace => bot::handlers::clear_replace(bot, msg, service).await,
        Command::SetDest(spec) => bot::handlers::set_dest(bot, msg, spec, service).await,
        Command::ClearDest => bot::handlers::clear_dest(bot, msg, service).await,
        Command::Settings => bot::handlers::settings(bot, msg, service).await,
        Command::Healthcheck => bot::handlers::healthcheck(bot, msg).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_link(
    bot: Bot,
    msg: Message,
    service: Arc<RelayService>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot::handlers::handle_link(bot, msg, service).await {
        error!("Link handler error: {}", e);
    }
    respond(())
}

async fn handle_other_text(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    info!(
        "Ignoring text without a message link from user {}",
        get_user_id_safe(&msg)
    );
    if let Err(e) = send_message_resilient(
        &bot,
        msg.chat.id,
        "Send a message link or use /forward. See /help for details.",
        None,
        Some(msg.id),
    )
    .await
    {
        error!("Failed to send hint: {}", e);
    }
    respond(())
}
