//! PTY (console) comms channel: reads lines from stdin, prints replies.
//!
//! Every line comes from the single local user `console` and counts as
//! addressed to the bot, so plain text continues the conversation and
//! `!commands` work as on any other channel.  Generated images are written
//! to `<work_dir>/images/` and their path printed.
//!
//! Runs until the `shutdown` token is cancelled (Ctrl-C) or stdin closes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{CommsEvent, CommsState};
use crate::commands::Reply;
use crate::error::AppError;
use crate::session::UserId;
use crate::subsystems::runtime::{Component, ComponentFuture};

const CONSOLE_USER: &str = "console";

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
    images_dir: PathBuf,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>, images_dir: PathBuf) -> Self {
        Self { channel_id: channel_id.into(), state, images_dir }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, self.images_dir, shutdown))
    }
}

async fn run_pty(
    channel_id: String,
    state: Arc<CommsState>,
    images_dir: PathBuf,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started");
    println!("─────────────────────────────────");
    println!(" relay-bot console  (Ctrl-C to quit)");
    println!(" {p}chat {p}message {p}photo {p}clear {p}models", p = state.command_prefix());
    println!("─────────────────────────────────");
    state.report_event(CommsEvent::ChannelReady { channel_id: channel_id.clone() });

    let user_id = UserId::from(CONSOLE_USER);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                let input = match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => input,
                };
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                debug!(%input, "pty received line");

                match state.handle_message(&user_id, input, true, None).await {
                    Some(Reply::Text(text)) => println!("{text}"),
                    Some(Reply::Image { bytes, .. }) => match save_image(&images_dir, &bytes).await {
                        Ok(path) => println!("[image saved to {}]", path.display()),
                        Err(e) => {
                            warn!("failed to save image: {e}");
                            println!("Sorry, I couldn't save the generated image.");
                        }
                    },
                    None => {}
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

async fn save_image(dir: &Path, bytes: &[u8]) -> Result<PathBuf, AppError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.png", uuid::Uuid::now_v7()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn image_written_under_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("images");
        let path = save_image(&dir, b"png-bytes").await.unwrap();
        assert!(path.starts_with(&dir));
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");
    }
}
