use crate::api::error::AppError;
use crate::services::telegram::{BackendMessage, MessagingBackend};
use crate::services::transport::Transport;
use std::path::Path;
use std::sync::Arc;

/// Delivers staged files to the configured channel through either transport.
pub struct RelayClient {
    bot: Arc<dyn MessagingBackend>,
    session: Option<Arc<dyn MessagingBackend>>,
    channel_id: String,
    simple_limit: u64,
}

impl RelayClient {
    pub fn new(
        bot: Arc<dyn MessagingBackend>,
        session: Option<Arc<dyn MessagingBackend>>,
        channel_id: impl Into<String>,
        simple_limit: u64,
    ) -> Self {
        Self {
            bot,
            session,
            channel_id: channel_id.into(),
            simple_limit,
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub async fn deliver(
        &self,
        transport: Transport,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<BackendMessage, AppError> {
        match transport {
            Transport::Simple => self.relay_via_simple(path, filename, caption).await,
            Transport::Session => self.relay_via_session(path, filename, caption).await,
        }
    }

    /// Single `sendDocument` call with the bot credential. Refuses files above
    /// the simple transport limit without contacting the backend.
    pub async fn relay_via_simple(
        &self,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<BackendMessage, AppError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.simple_limit {
            return Err(AppError::PayloadTooLarge(format!(
                "File of {} bytes exceeds the simple transport limit of {} bytes",
                size, self.simple_limit
            )));
        }

        self.bot
            .send_document(&self.channel_id, path, filename, caption)
            .await
    }

    /// Streams through the shared session client, if one was established at startup.
    pub async fn relay_via_session(
        &self,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<BackendMessage, AppError> {
        let session = self.session.as_ref().ok_or_else(|| {
            AppError::TransportUnavailable(
                "Large file support requires a session client (set API_ID, API_HASH and SESSION_STRING)"
                    .to_string(),
            )
        })?;

        session
            .send_document(&self.channel_id, path, filename, caption)
            .await
    }

    /// Bot reachability, used by the health check.
    pub async fn bot_identity(&self) -> Result<String, AppError> {
        self.bot.identity().await
    }
}
