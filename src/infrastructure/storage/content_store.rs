use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::settings::{AppConfig, ContentHashMode};

const STAGING_DIR: &str = ".staging";
const COPY_BUF_SIZE: usize = 64 * 1024;

/// A raw upload as it sits in the content store, waiting for the transcoder.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub content_hash: String,
    pub dir: PathBuf,
    pub source_path: PathBuf,
    pub bytes_written: u64,
}

/// Filesystem area keyed by content hash: `{video_root}/{hash}/...`.
#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
    hash_mode: ContentHashMode,
}

/// True for a single, non-special path component.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn invalid_name(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("unsafe path component {name:?}"))
}

/// sha256 over `"{filename}-{size}"`, lowercase hex.
pub fn metadata_hash(filename: &str, size: u64) -> String {
    format!("{:x}", Sha256::digest(format!("{filename}-{size}").as_bytes()))
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>, hash_mode: ContentHashMode) -> Self {
        Self {
            root: root.into(),
            hash_mode,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.video_root(), config.content_hash_mode)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, content_hash: &str) -> io::Result<PathBuf> {
        if !is_safe_component(content_hash) {
            return Err(invalid_name(content_hash));
        }
        Ok(self.root.join(content_hash))
    }

    pub fn path_for(&self, content_hash: &str, name: &str) -> io::Result<PathBuf> {
        if !is_safe_component(name) {
            return Err(invalid_name(name));
        }
        Ok(self.dir_for(content_hash)?.join(name))
    }

    /// Copies `reader` into `{hash}/{filename}`. With metadata hashing the
    /// key is known up front; with digest hashing the bytes are staged and
    /// hashed in one pass, then moved under their key.
    pub async fn store_upload<R>(&self, reader: &mut R, filename: &str, size: u64) -> io::Result<StoredUpload>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if !is_safe_component(filename) {
            return Err(invalid_name(filename));
        }

        match self.hash_mode {
            ContentHashMode::Metadata => {
                let content_hash = metadata_hash(filename, size);
                let dir = self.dir_for(&content_hash)?;
                fs::create_dir_all(&dir).await?;

                let source_path = dir.join(filename);
                let mut file = fs::File::create(&source_path).await?;
                let bytes_written = tokio::io::copy(reader, &mut file).await?;
                file.flush().await?;

                debug!(content_hash = %content_hash, bytes_written, "upload stored");
                Ok(StoredUpload {
                    content_hash,
                    dir,
                    source_path,
                    bytes_written,
                })
            }
            ContentHashMode::Digest => self.store_hashed(reader, filename).await,
        }
    }

    async fn store_hashed<R>(&self, reader: &mut R, filename: &str) -> io::Result<StoredUpload>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let staging_dir = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir).await?;
        let staged = staging_dir.join(Uuid::new_v4().to_string());

        let copied = async {
            let mut hasher = Sha256::new();
            let mut out = BufWriter::new(fs::File::create(&staged).await?);
            let mut buf = vec![0u8; COPY_BUF_SIZE];
            let mut bytes_written = 0u64;

            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n]).await?;
                bytes_written += n as u64;
            }
            out.flush().await?;
            Ok::<_, io::Error>((format!("{:x}", hasher.finalize()), bytes_written))
        }
        .await;

        let (content_hash, bytes_written) = match copied {
            Ok(done) => done,
            Err(e) => {
                let _ = fs::remove_file(&staged).await;
                return Err(e);
            }
        };

        let dir = self.dir_for(&content_hash)?;
        fs::create_dir_all(&dir).await?;
        let source_path = dir.join(filename);
        if let Err(e) = fs::rename(&staged, &source_path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(e);
        }

        debug!(content_hash = %content_hash, bytes_written, "upload stored");
        Ok(StoredUpload {
            content_hash,
            dir,
            source_path,
            bytes_written,
        })
    }

    pub async fn read(&self, content_hash: &str, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(content_hash, name)?).await
    }

    pub async fn write(&self, content_hash: &str, name: &str, body: &[u8]) -> io::Result<()> {
        fs::write(self.path_for(content_hash, name)?, body).await
    }

    /// Removes `{hash}/` and everything under it. A missing directory is fine.
    pub async fn remove_dir(&self, content_hash: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.dir_for(content_hash)?).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Removes one file; logs instead of failing when it is already gone.
    pub async fn remove_file(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "file already removed");
                Ok(())
            }
            other => other,
        }
    }

    /// Removes `{hash}/` only when nothing else lives there.
    pub async fn remove_dir_if_empty(&self, content_hash: &str) -> io::Result<()> {
        let dir = self.dir_for(content_hash)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if entries.next_entry().await?.is_none() {
            fs::remove_dir(&dir).await?;
        }
        Ok(())
    }
}
