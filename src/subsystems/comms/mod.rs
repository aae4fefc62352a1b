//! Comms subsystem: manages the chat channels.
//!
//! Each channel (console, Telegram) implements [`runtime::Component`] and is
//! spawned as an independent task by [`start`].  Channels capture their
//! shared [`Arc<CommsState>`] at construction time.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (ready, shut down).  It is drained by a short-lived
//! background task that ends once every channel has dropped its sender.

mod state;
#[cfg(feature = "channel-pty")]
pub mod pty;
#[cfg(feature = "channel-telegram")]
pub mod telegram;

pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Spawn all configured channels and return a [`SubsystemHandle`].
///
/// Synchronous: returns as soon as the tasks are spawned.
pub fn start(config: &Config, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> SubsystemHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(dispatcher, config.command_prefix.clone(), event_tx));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            let images_dir = config.work_dir.join("images");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone(), images_dir)));
        }
    }

    #[cfg(feature = "channel-telegram")]
    {
        if config.comms_telegram_should_load() {
            match config.comms.telegram.token.clone() {
                Some(token) => {
                    info!("loading telegram channel");
                    components.push(Box::new(telegram::TelegramChannel::new("telegram0", token, state.clone())));
                }
                None => warn!("TELEGRAM_BOT_TOKEN not set, telegram channel disabled"),
            }
        }
    }

    if components.is_empty() {
        warn!("no comms channels configured, nothing to do");
    }

    drop(state);
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelReady { ref channel_id } => {
                    info!(channel_id, "channel ready");
                }
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
            }
        }
    });

    spawn_components(components, shutdown)
}
