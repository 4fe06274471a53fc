use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload stream interrupted: {0}")]
    Stream(String),

    #[error("could not stage upload: {0}")]
    Io(#[from] std::io::Error),
}

/// A multipart file field spooled to local disk, so its size is known before
/// ingestion hashes it.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
}

impl StagedFile {
    pub async fn open(&self) -> std::io::Result<File> {
        File::open(&self.path).await
    }

    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "could not remove staged upload");
        }
    }
}

/// Streams `field` into `{staging_dir}/{random}` chunk by chunk. The partial
/// file is removed when the stream breaks.
pub async fn stream_to_staging(staging_dir: &Path, mut field: Field<'_>) -> Result<StagedFile, UploadError> {
    let file_name = field.file_name().unwrap_or("video.mp4").to_string();
    tokio::fs::create_dir_all(staging_dir).await?;
    let path = staging_dir.join(Uuid::new_v4().to_string());

    let mut out = BufWriter::new(File::create(&path).await?);
    let mut size = 0u64;

    while let Some(chunk) = field.next().await {
        let written = match chunk {
            Ok(chunk) => out.write_all(&chunk).await.map(|_| chunk.len()),
            Err(e) => {
                error!("Stream error: {}", e);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(UploadError::Stream(e.body_text()));
            }
        };

        match written {
            Ok(n) => size += n as u64,
            Err(e) => {
                error!("Staging error: {}", e);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
        }
    }
    out.flush().await?;

    Ok(StagedFile { path, file_name, size })
}
