//! Shared state for the Comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and can only turn inbound text into
//! replies and report lifecycle events.  The dispatcher and session store
//! stay private behind it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::commands::{self, Inbound, Reply};
use crate::dispatch::Dispatcher;
use crate::session::UserId;

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel connected and is receiving messages.
    ChannelReady { channel_id: String },
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
}

pub struct CommsState {
    dispatcher: Arc<Dispatcher>,
    command_prefix: String,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(dispatcher: Arc<Dispatcher>, command_prefix: String, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { dispatcher, command_prefix, event_tx }
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    /// Turn one inbound message into the reply to post, if any.
    ///
    /// `addressed` marks messages meant for the bot even without a command
    /// prefix (private chats, the console, mentions).
    pub async fn handle_message(
        &self,
        user_id: &UserId,
        text: &str,
        addressed: bool,
        mention: Option<&str>,
    ) -> Option<Reply> {
        let inbound = Inbound { user_id, text, addressed, mention };
        commands::handle(&self.dispatcher, &self.command_prefix, inbound).await
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up or has already exited.
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
