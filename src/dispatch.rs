//! Command dispatcher: the five bot operations.
//!
//! Owns the shared [`SessionStore`] handle and both upstream clients.  Every
//! method is independent; the only state touched is the caller's own session.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::image::ImageProvider;
use crate::llm::TextProvider;
use crate::session::{Role, SessionStore, Turn, UserId};

pub struct Dispatcher {
    sessions: Arc<SessionStore>,
    text: TextProvider,
    image: ImageProvider,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionStore>, text: TextProvider, image: ImageProvider) -> Self {
        Self { sessions, text, image }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Continue the user's conversation.
    ///
    /// The user turn is recorded before the upstream call and stays recorded
    /// if the call fails; the assistant turn is only added on success.
    pub async fn chat(&self, user_id: &UserId, message: &str) -> Result<String, UpstreamError> {
        let history = self.sessions.append_and_snapshot(user_id, Role::User, message);
        debug!(%user_id, turns = history.len(), "chat with history");

        match self.text.chat(&history).await {
            Ok(reply) => {
                self.sessions.append_turn(user_id, Role::Assistant, reply.clone());
                Ok(reply)
            }
            Err(e) => {
                warn!(%user_id, error = %e, "chat failed");
                Err(e)
            }
        }
    }

    /// One-shot query: no history read, none written.
    pub async fn one_shot(&self, message: &str) -> Result<String, UpstreamError> {
        self.text.generate(message).await.inspect_err(|e| {
            warn!(error = %e, "one-shot query failed");
        })
    }

    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, UpstreamError> {
        self.image.generate(prompt).await.inspect_err(|e| {
            warn!(provider = self.image.name(), error = %e, "image generation failed");
        })
    }

    pub fn clear_history(&self, user_id: &UserId) {
        self.sessions.clear(user_id);
        debug!(%user_id, "history cleared");
    }

    pub async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        self.text.list_models().await.inspect_err(|e| {
            warn!(error = %e, "listing models failed");
        })
    }

    /// Snapshot of a user's history, for diagnostics.
    pub fn history(&self, user_id: &UserId) -> Vec<Turn> {
        self.sessions.get_history(user_id)
    }
}
