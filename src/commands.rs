//! Inbound text → [`Command`] → [`Reply`].
//!
//! Channels hand raw message text to [`handle`]; it parses the command,
//! runs it on the [`Dispatcher`], and renders either the result or a
//! user-facing error.  No `UpstreamError` escapes this module.

use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use crate::session::UserId;

pub const IMAGE_FILENAME: &str = "generated_image.png";

const CHAT_FAILED: &str = "Sorry, I couldn't generate a response at this time.";
const IMAGE_FAILED: &str = "Sorry, I couldn't generate an image at this time.";
const MODELS_FAILED: &str = "An error occurred while fetching the model list. Please try again later.";
const CLEARED: &str = "Your conversation history has been cleared.";
const EMPTY_RESPONSE: &str = "(empty response)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    Message(String),
    Photo(String),
    Clear,
    Models,
    /// Known command sent without its required argument.
    MissingArgument(&'static str),
    Unknown(String),
}

/// What the channel should post back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Image { bytes: Vec<u8>, filename: String },
}

/// Per-message context supplied by the channel.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub user_id: &'a UserId,
    pub text: &'a str,
    /// Private chat, console, or a message mentioning the bot.
    pub addressed: bool,
    /// `@username` of the bot on this platform, stripped from addressed chat.
    pub mention: Option<&'a str>,
}

/// Parse `text` as a command if it starts with `prefix`.
pub fn parse(text: &str, prefix: &str) -> Option<Command> {
    let body = text.trim_start().strip_prefix(prefix)?;
    let (name, arg) = match body.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }

    let with_arg = |usage: &'static str, build: fn(String) -> Command| {
        if arg.is_empty() {
            Command::MissingArgument(usage)
        } else {
            build(arg.to_string())
        }
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "chat" => with_arg("chat <message>", Command::Chat),
        "message" => with_arg("message <text>", Command::Message),
        "photo" => with_arg("photo <prompt>", Command::Photo),
        "clear" => Command::Clear,
        "models" => Command::Models,
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

/// Remove every `@username` mention (case-insensitive) and tidy whitespace.
pub fn strip_mention(text: &str, mention: &str) -> String {
    let needle = mention.to_lowercase();
    text.split_whitespace()
        .filter(|word| word.trim_end_matches([',', ':', '.', '!', '?']).to_lowercase() != needle)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `text` contains `mention` as a standalone word.
pub fn mentions(text: &str, mention: &str) -> bool {
    let needle = mention.to_lowercase();
    text.split_whitespace()
        .any(|word| word.trim_end_matches([',', ':', '.', '!', '?']).to_lowercase() == needle)
}

/// Handle one inbound message. `None` means the message was not for the bot.
pub async fn handle(dispatcher: &Dispatcher, prefix: &str, inbound: Inbound<'_>) -> Option<Reply> {
    let command = match parse(inbound.text, prefix) {
        Some(command) => command,
        None if inbound.addressed => {
            let text = match inbound.mention {
                Some(m) => strip_mention(inbound.text, m),
                None => inbound.text.trim().to_string(),
            };
            if text.is_empty() {
                return None;
            }
            // `@bot !clear` is still a command once the mention is gone.
            match parse(&text, prefix) {
                Some(command) => command,
                None => Command::Chat(text),
            }
        }
        None => return None,
    };

    debug!(user_id = %inbound.user_id, ?command, "handling command");
    Some(execute(dispatcher, prefix, inbound.user_id, command).await)
}

/// Run a parsed command and render its reply.
pub async fn execute(dispatcher: &Dispatcher, prefix: &str, user_id: &UserId, command: Command) -> Reply {
    match command {
        Command::Chat(message) => match dispatcher.chat(user_id, &message).await {
            Ok(reply) => text_reply(reply),
            Err(_) => Reply::Text(CHAT_FAILED.to_string()),
        },
        Command::Message(message) => match dispatcher.one_shot(&message).await {
            Ok(reply) => text_reply(reply),
            Err(_) => Reply::Text(CHAT_FAILED.to_string()),
        },
        Command::Photo(prompt) => match dispatcher.generate_image(&prompt).await {
            Ok(bytes) => {
                info!(%user_id, bytes = bytes.len(), "image generated");
                Reply::Image { bytes, filename: IMAGE_FILENAME.to_string() }
            }
            Err(_) => Reply::Text(IMAGE_FAILED.to_string()),
        },
        Command::Clear => {
            dispatcher.clear_history(user_id);
            Reply::Text(CLEARED.to_string())
        }
        Command::Models => match dispatcher.list_models().await {
            Ok(models) => Reply::Text(format_models(&models)),
            Err(_) => Reply::Text(MODELS_FAILED.to_string()),
        },
        Command::MissingArgument(usage) => Reply::Text(format!("Usage: {prefix}{usage}")),
        Command::Unknown(name) => {
            debug!(%name, "unknown command");
            Reply::Text(format!(
                "Sorry, I don't recognize that command. Try using {p}chat, {p}message, {p}photo, {p}clear, or {p}models.",
                p = prefix
            ))
        }
    }
}

fn text_reply(text: String) -> Reply {
    if text.trim().is_empty() {
        Reply::Text(EMPTY_RESPONSE.to_string())
    } else {
        Reply::Text(text)
    }
}

fn format_models(models: &[String]) -> String {
    if models.is_empty() {
        return "No models available.".to_string();
    }
    format!("Available models:\n```\n{}\n```", models.join("\n"))
}
