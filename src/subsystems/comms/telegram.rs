//! Telegram comms channel: receives messages via the Telegram Bot API,
//! runs them through the command handler, and posts the reply to the
//! originating chat.
//!
//! A message is addressed to the bot when it arrives in a private chat or
//! mentions `@<bot username>`; addressed plain text continues the sender's
//! conversation.  In groups only `!commands` and mentions are answered.
//!
//! teloxide's dispatcher runs updates from different chats concurrently and
//! updates from the same chat in order, so one user's slow generation never
//! stalls another chat.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, InputFile};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{CommsEvent, CommsState};
use crate::commands::{self, Reply};
use crate::error::AppError;
use crate::session::UserId;
use crate::subsystems::runtime::{Component, ComponentFuture};

/// Telegram caps messages at 4096 characters; chunk a little below that.
const MAX_MESSAGE_LENGTH: usize = 4000;

const UPLOAD_FAILED: &str = "Sorry, I couldn't upload the generated image.";

pub struct TelegramChannel {
    channel_id: String,
    token: String,
    state: Arc<CommsState>,
}

impl TelegramChannel {
    pub fn new(channel_id: impl Into<String>, token: String, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), token, state }
    }
}

impl Component for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.channel_id, self.token, self.state, shutdown))
    }
}

async fn run_telegram(
    channel_id: String,
    token: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let bot = Bot::new(token);
    let me = bot
        .get_me()
        .await
        .map_err(|e| AppError::Comms(format!("telegram get_me failed: {e}")))?;
    let mention = me.user.username.as_deref().map(|u| format!("@{u}"));
    info!(%channel_id, bot = ?mention, "telegram channel connected");
    state.report_event(CommsEvent::ChannelReady { channel_id: channel_id.clone() });

    let handler_state = state.clone();
    let handler = Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let state = handler_state.clone();
        let mention = mention.clone();
        async move {
            on_message(&bot, &msg, &state, mention.as_deref()).await;
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot, handler).build();

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received, closing telegram channel");
        }
        _ = dispatcher.dispatch() => {
            warn!(%channel_id, "telegram dispatcher exited unexpectedly");
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

async fn on_message(bot: &Bot, msg: &Message, state: &CommsState, mention: Option<&str>) {
    let Some(text) = msg.text() else { return };
    let Some(user) = msg.from.as_ref() else { return };
    if user.is_bot {
        return;
    }

    let user_id = UserId::from(user.id.0);
    let mentioned = mention.filter(|m| commands::mentions(text, m));
    let addressed = msg.chat.is_private() || mentioned.is_some();
    if !addressed && commands::parse(text, state.command_prefix()).is_none() {
        return;
    }

    debug!(%user_id, chat_id = %msg.chat.id, "telegram received message");
    if let Err(e) = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await {
        debug!("typing indicator failed: {e}");
    }

    match state.handle_message(&user_id, text, addressed, mentioned).await {
        Some(Reply::Text(text)) => {
            for chunk in chunk_text(&text, MAX_MESSAGE_LENGTH) {
                if let Err(e) = bot.send_message(msg.chat.id, chunk).await {
                    warn!("failed to send telegram reply: {e}");
                }
            }
        }
        Some(Reply::Image { bytes, filename }) => send_image(bot, msg.chat.id, bytes, filename).await,
        None => {}
    }
}

/// Upload an image; on failure tell the chat instead of staying silent.
async fn send_image(bot: &Bot, chat_id: ChatId, bytes: Vec<u8>, filename: String) {
    let photo = InputFile::memory(bytes).file_name(filename);
    if let Err(e) = bot.send_photo(chat_id, photo).await {
        warn!("failed to send telegram photo: {e}");
        if let Err(e) = bot.send_message(chat_id, UPLOAD_FAILED).await {
            warn!("failed to send telegram upload-failure notice: {e}");
        }
    }
}

/// Split on character boundaries into pieces of at most `max` chars.
fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max.max(1)).map(|c| c.iter().collect()).collect()
}
