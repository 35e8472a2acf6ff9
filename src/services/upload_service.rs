use crate::api::error::AppError;
use crate::config::RelayConfig;
use crate::services::relay::RelayClient;
use crate::services::staging::{StagedFile, StagingStore};
use crate::services::transport::Transport;
use crate::utils::format::{caption, format_size};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

/// Outcome of a successful relay, returned to the caller as-is.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RelayResult {
    pub success: bool,
    pub filename: String,
    pub filesize: u64,
    pub file_size_formatted: String,
    /// Backend artifact identifier, null when the backend did not report one
    pub file_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Default)]
struct UploadCounters {
    total: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub failed: u64,
    pub active: u64,
}

struct ActiveUpload<'a>(&'a AtomicU64);

impl<'a> ActiveUpload<'a> {
    fn enter(gauge: &'a AtomicU64) -> Self {
        gauge.fetch_add(1, Ordering::Relaxed);
        Self(gauge)
    }
}

impl Drop for ActiveUpload<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Per-request pipeline: stage, pick a transport, relay, clean up, respond.
pub struct UploadService {
    store: Arc<StagingStore>,
    relay: Arc<RelayClient>,
    max_file_size: u64,
    simple_transport_limit: u64,
    counters: UploadCounters,
}

impl UploadService {
    pub fn new(store: Arc<StagingStore>, relay: Arc<RelayClient>, config: &RelayConfig) -> Self {
        Self {
            store,
            relay,
            max_file_size: config.max_file_size,
            simple_transport_limit: config.simple_transport_limit,
            counters: UploadCounters::default(),
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        CounterSnapshot {
            total: self.counters.total.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::Relaxed),
        }
    }

    pub async fn process_upload(
        &self,
        payload: &[u8],
        filename: &str,
    ) -> Result<RelayResult, AppError> {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let _active = ActiveUpload::enter(&self.counters.active);

        let result = self.relay_upload(payload, filename).await;
        if result.is_err() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn relay_upload(&self, payload: &[u8], filename: &str) -> Result<RelayResult, AppError> {
        let size = payload.len() as u64;
        if size > self.max_file_size {
            tracing::warn!(filename, size, "Rejected upload above the size limit");
            return Err(AppError::PayloadTooLarge(format!(
                "File too large. Max: {} bytes",
                self.max_file_size
            )));
        }

        let staged = self.store.stage(payload, filename).await.inspect_err(|e| {
            tracing::error!(filename, size, "Failed to stage upload: {}", e);
        })?;
        let staged = StagedGuard::new(self.store.clone(), staged);

        let human_size = format_size(size);
        let caption = caption(filename, &human_size);
        let transport = Transport::select(size, self.simple_transport_limit);
        tracing::info!(
            filename,
            size,
            transport = %transport,
            staged = %staged.file.path.display(),
            "Relaying upload"
        );

        let relayed = self
            .relay
            .deliver(transport, &staged.file.path, filename, &caption)
            .await;

        staged.release().await;

        match relayed {
            Ok(message) => {
                tracing::info!(
                    filename,
                    size,
                    transport = %transport,
                    file_id = message.artifact_id.as_deref().unwrap_or("none"),
                    "✅ Upload relayed"
                );
                tracing::debug!("Backend acknowledgement: {}", message.raw);

                Ok(RelayResult {
                    success: true,
                    filename: filename.to_string(),
                    filesize: size,
                    file_size_formatted: human_size,
                    file_id: message.artifact_id,
                    message: "File uploaded successfully".to_string(),
                })
            }
            Err(e) => {
                tracing::error!(
                    filename,
                    size,
                    transport = %transport,
                    "❌ Relay failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

/// Holds a staged file for the duration of a relay. If the request future is
/// dropped before `release`, removal is handed to a background task.
struct StagedGuard {
    store: Arc<StagingStore>,
    file: StagedFile,
    armed: bool,
}

impl StagedGuard {
    fn new(store: Arc<StagingStore>, file: StagedFile) -> Self {
        Self {
            store,
            file,
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        remove_staged(&self.store, &self.file).await;
    }
}

impl Drop for StagedGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(
            filename = %self.file.original_filename,
            staged = %self.file.path.display(),
            "Upload dropped before the relay finished; discarding staged file"
        );

        let store = self.store.clone();
        let file = self.file.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_staged(&store, &file).await });
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_file(&file.path) {
                    tracing::error!("Failed to remove staged file {}: {}", file.path.display(), e);
                }
            }
        }
    }
}

/// Best-effort removal; never changes the response.
async fn remove_staged(store: &StagingStore, staged: &StagedFile) {
    match store.remove(&staged.path).await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(
            filename = %staged.original_filename,
            staged = %staged.path.display(),
            staged_secs = staged
                .created_at
                .elapsed()
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            "Staged file was already reclaimed before cleanup; the relay may have stalled"
        ),
        Err(e) => tracing::error!(
            filename = %staged.original_filename,
            staged = %staged.path.display(),
            "Failed to remove staged file: {}",
            e
        ),
    }
}
