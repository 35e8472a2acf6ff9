use crate::api::error::AppError;
use async_stream::try_stream;
use futures::{Stream, TryStreamExt};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;

/// A payload copied to the staging directory, owned by the request that staged it.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_filename: String,
    pub size: u64,
    pub created_at: SystemTime,
}

/// Directory listing entry for a staged file.
#[derive(Debug, Clone)]
pub struct StagedEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl StagedEntry {
    /// Time since last modification; zero when the clock reads earlier than mtime.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.modified).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingUsage {
    pub files: usize,
    pub bytes: u64,
}

/// Local staging namespace shared by request handlers and the janitor.
///
/// Names are `<uuid v4><original extension>` and files are opened with
/// `create_new`, so concurrent stages never share a path. Removal treats a
/// missing file as already done, which lets the orchestrator and the janitor
/// race on the same file without coordination.
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    /// Opens the store, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn is_available(&self) -> bool {
        fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Writes `payload` to a fresh file. A failed write leaves nothing behind.
    pub async fn stage(
        &self,
        payload: &[u8],
        original_filename: &str,
    ) -> Result<StagedFile, AppError> {
        let name = format!("{}{}", Uuid::new_v4(), extension_of(original_filename));
        let path = self.dir.join(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let written = async {
            file.write_all(payload).await?;
            file.flush().await?;
            file.metadata().await
        }
        .await;
        drop(file);

        match written {
            Ok(metadata) => Ok(StagedFile {
                path,
                original_filename: original_filename.to_string(),
                size: metadata.len(),
                created_at: metadata.modified().unwrap_or_else(|_| SystemTime::now()),
            }),
            Err(e) => {
                if let Err(cleanup) = self.remove(&path).await {
                    tracing::error!(
                        "Failed to discard partial staged file {}: {}",
                        path.display(),
                        cleanup
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Deletes a staged file. Returns `false` when it was already gone.
    pub async fn remove(&self, path: &Path) -> io::Result<bool> {
        if path.parent() != Some(self.dir.as_path()) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is outside the staging directory", path.display()),
            ));
        }

        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Snapshot of the regular files in the staging directory.
    ///
    /// The directory is read lazily as the stream is polled; calling again
    /// starts a new listing. Files removed mid-listing are skipped.
    pub fn list_all(&self) -> impl Stream<Item = io::Result<StagedEntry>> + '_ {
        try_stream! {
            let mut entries = fs::read_dir(&self.dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = match entry.metadata().await {
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    other => other?,
                };
                if !metadata.is_file() {
                    continue;
                }

                yield StagedEntry {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path(),
                    size: metadata.len(),
                    modified: metadata.modified()?,
                };
            }
        }
    }

    pub async fn usage(&self) -> io::Result<StagingUsage> {
        self.list_all()
            .try_fold(StagingUsage::default(), |mut usage, entry| async move {
                usage.files += 1;
                usage.bytes += entry.size;
                Ok(usage)
            })
            .await
    }
}

/// Extension of the client filename including the dot, or empty.
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}
