use crate::api::error::AppError;
use crate::config::RelayConfig;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;

const MAX_ERROR_BODY: usize = 256;

/// Acknowledgement returned by the messaging backend for a delivered document.
#[derive(Debug, Clone)]
pub struct BackendMessage {
    /// `document.file_id` of the delivered message, when the backend reported one
    pub artifact_id: Option<String>,
    /// Raw `result` object, kept for diagnostics
    pub raw: Value,
}

impl BackendMessage {
    pub fn from_result(raw: Value) -> Self {
        let artifact_id = raw
            .get("document")
            .and_then(|d| d.get("file_id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { artifact_id, raw }
    }
}

/// A credential able to post documents to a channel.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<BackendMessage, AppError>;

    /// Reachability probe, returns the account username.
    async fn identity(&self) -> Result<String, AppError>;
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

// reqwest errors carry the request URL, which embeds the bot token.
fn redact(e: reqwest::Error) -> AppError {
    AppError::BackendUnreachable(e.without_url())
}

fn method_url(base_url: &str, token: &str, method: &str) -> String {
    format!("{}/bot{}/{}", base_url.trim_end_matches('/'), token, method)
}

async fn read_envelope(response: reqwest::Response) -> Result<Value, AppError> {
    let status = response.status();
    let text = response.text().await.map_err(redact)?;

    match serde_json::from_str::<ApiEnvelope>(&text) {
        Ok(envelope) if envelope.ok => Ok(envelope.result.unwrap_or(Value::Null)),
        Ok(envelope) => Err(AppError::BackendRejected(format!(
            "{} (code {})",
            envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
            envelope.error_code.unwrap_or(i64::from(status.as_u16()))
        ))),
        Err(_) => {
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            Err(AppError::BackendRejected(format!(
                "unexpected response (HTTP {}): {}",
                status, snippet
            )))
        }
    }
}

async fn get_me(http: &reqwest::Client, url: String) -> Result<String, AppError> {
    let response = http.get(url).send().await.map_err(redact)?;
    let me = read_envelope(response).await?;
    Ok(me
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string())
}

/// Bot credential client against the public Bot API. Uploads are sent in one
/// buffered request, which the backend caps in size.
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.bot_api_url.clone(), config.bot_token.clone())
    }
}

#[async_trait]
impl MessagingBackend for BotApiClient {
    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<BackendMessage, AppError> {
        let bytes = tokio::fs::read(path).await?;
        let document = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", document);

        let response = self
            .http
            .post(method_url(&self.base_url, &self.token, "sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(redact)?;

        read_envelope(response).await.map(BackendMessage::from_result)
    }

    async fn identity(&self) -> Result<String, AppError> {
        get_me(&self.http, method_url(&self.base_url, &self.token, "getMe")).await
    }
}

/// Long-lived session against a self-hosted Bot API endpoint, which lifts the
/// public upload cap. Files are streamed from disk rather than buffered.
///
/// Established once at startup and never reconnected; a dropped session
/// needs a process restart.
pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
    session: String,
}

impl SessionClient {
    /// Returns `Ok(None)` when the session credentials are not configured.
    pub async fn connect(config: &RelayConfig) -> Result<Option<Self>, AppError> {
        let Some(session) = config.session_token() else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .pool_idle_timeout(None::<Duration>)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(redact)?;

        let client = Self {
            http,
            base_url: config.session_api_url.clone(),
            session: session.to_string(),
        };

        let username = client.identity().await?;
        tracing::info!("🔐 Session client established as @{}", username);
        Ok(Some(client))
    }
}

#[async_trait]
impl MessagingBackend for SessionClient {
    async fn send_document(
        &self,
        chat_id: &str,
        path: &Path,
        filename: &str,
        caption: &str,
    ) -> Result<BackendMessage, AppError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let document = Part::stream_with_length(body, len).file_name(filename.to_string());

        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", document);

        let response = self
            .http
            .post(method_url(&self.base_url, &self.session, "sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(redact)?;

        read_envelope(response).await.map(BackendMessage::from_result)
    }

    async fn identity(&self) -> Result<String, AppError> {
        get_me(&self.http, method_url(&self.base_url, &self.session, "getMe")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        axum::http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[test]
    fn test_artifact_id_extraction() {
        let message = BackendMessage::from_result(json!({
            "message_id": 7,
            "document": { "file_id": "BQACAgQAAx0", "file_name": "report.pdf" }
        }));
        assert_eq!(message.artifact_id.as_deref(), Some("BQACAgQAAx0"));
    }

    #[test]
    fn test_artifact_id_missing_is_none() {
        assert!(BackendMessage::from_result(json!({ "message_id": 7 })).artifact_id.is_none());
        assert!(BackendMessage::from_result(json!({ "document": {} })).artifact_id.is_none());
        assert!(BackendMessage::from_result(Value::Null).artifact_id.is_none());
    }

    #[test]
    fn test_method_url() {
        assert_eq!(
            method_url("https://api.telegram.org/", "123:abc", "getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }

    #[tokio::test]
    async fn test_envelope_ok() {
        let result = read_envelope(response(200, r#"{"ok":true,"result":{"username":"relay_bot"}}"#))
            .await
            .unwrap();
        assert_eq!(result["username"], "relay_bot");
    }

    #[tokio::test]
    async fn test_envelope_rejection_embeds_description() {
        let err = read_envelope(response(
            429,
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5"}"#,
        ))
        .await
        .unwrap_err();

        match err {
            AppError::BackendRejected(msg) => {
                assert!(msg.contains("Too Many Requests"));
                assert!(msg.contains("429"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_envelope_non_json_body() {
        let err = read_envelope(response(502, "<html>Bad Gateway</html>"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BackendRejected(msg) if msg.contains("HTTP 502")));
    }

    #[tokio::test]
    async fn test_session_not_configured() {
        let config = RelayConfig::default();
        assert!(SessionClient::connect(&config).await.unwrap().is_none());
    }
}
