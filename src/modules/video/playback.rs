use std::io;

use tracing::{debug, warn};
use uuid::Uuid;

use super::status::StatusTracker;
use crate::config::settings::Resolution;
use crate::error::VideoError;
use crate::infrastructure::storage::content_store::ContentStore;
use crate::infrastructure::transcoder::playlist::MASTER_PLAYLIST;

pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2ts";
pub const PLAYLIST_CONTENT_TYPE: &str = "application/x-mpegURL";

/// What a playback path asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackRequest {
    Segment { content_hash: String, name: String },
    Variant { content_hash: String, name: String },
    Master { uuid: String },
}

impl PlaybackRequest {
    /// `.ts` anywhere means a segment, `.m3u8` with at least two components a
    /// variant playlist. Anything else names an asset by uuid.
    pub fn classify(path: &str) -> Option<Self> {
        let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let last_two = || {
            let n = parts.len();
            (n >= 2).then(|| (parts[n - 2].to_string(), parts[n - 1].to_string()))
        };

        if path.contains(".ts") {
            let (content_hash, name) = last_two()?;
            Some(PlaybackRequest::Segment { content_hash, name })
        } else if path.contains(".m3u8") && parts.len() >= 2 {
            let (content_hash, name) = last_two()?;
            Some(PlaybackRequest::Variant { content_hash, name })
        } else {
            let uuid = parts.last().filter(|p| !p.is_empty())?;
            Some(PlaybackRequest::Master { uuid: uuid.to_string() })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

impl Resolved {
    pub fn is_playlist(&self) -> bool {
        self.content_type == PLAYLIST_CONTENT_TYPE
    }
}

/// Maps playback paths to files in the content store. Reads are plain file
/// reads with no cache in between.
#[derive(Clone)]
pub struct PlaybackResolver {
    store: ContentStore,
    tracker: StatusTracker,
    fallback: Vec<String>,
}

impl PlaybackResolver {
    /// `resolutions` in configuration order; that is the fallback order.
    pub fn new(store: ContentStore, tracker: StatusTracker, resolutions: &[Resolution]) -> Self {
        Self {
            store,
            tracker,
            fallback: resolutions.iter().map(Resolution::playlist_name).collect(),
        }
    }

    /// Segment and variant requests are served by content hash alone, whatever
    /// the asset's status. Only the master playlist checks that the asset is
    /// `Processed` and not disabled.
    pub async fn resolve(&self, path: &str) -> Result<Resolved, VideoError> {
        const OP: &str = "PlaybackResolver::resolve";

        match PlaybackRequest::classify(path).ok_or_else(|| VideoError::not_found(OP, path))? {
            PlaybackRequest::Segment { content_hash, name } => {
                let bytes = self.read(OP, path, &content_hash, &name).await?;
                Ok(Resolved {
                    bytes,
                    content_type: SEGMENT_CONTENT_TYPE,
                })
            }
            PlaybackRequest::Variant { content_hash, name } => {
                let bytes = self.read_variant(path, &content_hash, &name).await?;
                Ok(Resolved {
                    bytes,
                    content_type: PLAYLIST_CONTENT_TYPE,
                })
            }
            PlaybackRequest::Master { uuid } => {
                let uuid = Uuid::parse_str(&uuid).map_err(|_| VideoError::not_found(OP, path))?;
                let asset = self.tracker.get_playable_by_uuid(uuid).await?;
                let bytes = self.read(OP, path, &asset.content_hash, MASTER_PLAYLIST).await?;
                Ok(Resolved {
                    bytes,
                    content_type: PLAYLIST_CONTENT_TYPE,
                })
            }
        }
    }

    /// Exact file first, then the first configured rendition playlist that
    /// exists. The fallback does not check that it matches the quality asked
    /// for.
    async fn read_variant(&self, path: &str, content_hash: &str, name: &str) -> Result<Vec<u8>, VideoError> {
        const OP: &str = "PlaybackResolver::read_variant";

        match self.store.read(content_hash, name).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => return Err(VideoError::not_found(OP, path)),
            Err(e) => debug!(op = OP, content_hash, name, error = %e, "variant missing, trying fallbacks"),
        }

        for candidate in self.fallback.iter().filter(|c| c.as_str() != name) {
            if let Ok(bytes) = self.store.read(content_hash, candidate).await {
                warn!(op = OP, content_hash, requested = name, served = %candidate, "serving fallback rendition");
                return Ok(bytes);
            }
        }
        Err(VideoError::not_found(OP, path))
    }

    async fn read(&self, op: &'static str, path: &str, content_hash: &str, name: &str) -> Result<Vec<u8>, VideoError> {
        match self.store.read(content_hash, name).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::InvalidInput) => {
                Err(VideoError::not_found(op, path))
            }
            Err(e) => Err(VideoError::Storage {
                op,
                path: self.store.root().join(content_hash).join(name),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ContentHashMode;
    use crate::modules::video::memory::InMemoryVideoRepository;
    use crate::modules::video::model::NewVideo;
    use std::sync::Arc;

    struct Fixture {
        root: tempfile::TempDir,
        resolver: PlaybackResolver,
        tracker: StatusTracker,
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let store = ContentStore::new(root.path(), ContentHashMode::Metadata);
        let tracker = StatusTracker::new(Arc::new(InMemoryVideoRepository::new()), 0);
        let resolutions = [
            Resolution::new(640, 360, "360"),
            Resolution::new(854, 480, "480"),
            Resolution::new(1280, 720, "720"),
        ];
        Fixture {
            resolver: PlaybackResolver::new(store, tracker.clone(), &resolutions),
            tracker,
            root,
        }
    }

    impl Fixture {
        fn put(&self, hash: &str, name: &str, body: &[u8]) {
            let dir = self.root.path().join(hash);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(name), body).unwrap();
        }
    }

    #[test]
    fn classifies_paths() {
        assert_eq!(
            PlaybackRequest::classify("/abc/360_001.ts"),
            Some(PlaybackRequest::Segment {
                content_hash: "abc".to_string(),
                name: "360_001.ts".to_string()
            })
        );
        assert_eq!(
            PlaybackRequest::classify("videos/abc/480.m3u8"),
            Some(PlaybackRequest::Variant {
                content_hash: "abc".to_string(),
                name: "480.m3u8".to_string()
            })
        );
        assert_eq!(
            PlaybackRequest::classify("/0b7f6ad0-52b1-4a3c-9d61-6ac1d8d0a5a2"),
            Some(PlaybackRequest::Master {
                uuid: "0b7f6ad0-52b1-4a3c-9d61-6ac1d8d0a5a2".to_string()
            })
        );
        // A lone playlist name has no hash component and falls through to uuid lookup.
        assert!(matches!(
            PlaybackRequest::classify("playlist.m3u8"),
            Some(PlaybackRequest::Master { .. })
        ));
        assert_eq!(PlaybackRequest::classify("segment.ts"), None);
        assert_eq!(PlaybackRequest::classify(""), None);
    }

    #[tokio::test]
    async fn segment_reads_are_byte_identical() {
        let fx = fixture();
        fx.put("abc", "360_000.ts", &[0x47, 1, 2, 3]);

        let first = fx.resolver.resolve("abc/360_000.ts").await.unwrap();
        let second = fx.resolver.resolve("abc/360_000.ts").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.bytes, [0x47, 1, 2, 3]);
        assert_eq!(first.content_type, SEGMENT_CONTENT_TYPE);
        assert!(!first.is_playlist());
    }

    #[tokio::test]
    async fn files_are_served_by_hash_before_the_asset_is_processed() {
        let fx = fixture();
        let asset = fx
            .tracker
            .create(NewVideo {
                name: "wip".to_string(),
                description: String::new(),
                content_hash: "wip".to_string(),
                duration: 4.0,
            })
            .await
            .unwrap();
        fx.put("wip", "360.m3u8", b"#EXTM3U\n");
        fx.put("wip", "360_000.ts", &[0x47]);
        fx.put("wip", MASTER_PLAYLIST, b"#EXTM3U\n");

        assert!(fx.resolver.resolve("wip/360.m3u8").await.is_ok());
        assert!(fx.resolver.resolve("wip/360_000.ts").await.is_ok());
        let master = fx.resolver.resolve(&asset.uuid.to_string()).await.unwrap_err();
        assert!(master.is_not_found());
    }

    #[tokio::test]
    async fn missing_variant_falls_back_to_some_existing_rendition() {
        let fx = fixture();
        fx.put("abc", "360.m3u8", b"#EXTM3U\n#360\n");
        fx.put("abc", "480.m3u8", b"#EXTM3U\n#480\n");

        let resolved = fx.resolver.resolve("abc/720.m3u8").await.unwrap();

        // Which rendition comes back is not part of the contract.
        assert!(resolved.bytes == b"#EXTM3U\n#360\n" || resolved.bytes == b"#EXTM3U\n#480\n");
        assert!(resolved.is_playlist());
    }

    #[tokio::test]
    async fn exhausted_fallback_is_not_found() {
        let fx = fixture();
        fx.put("abc", "1080.m3u8", b"#EXTM3U\n");

        let err = fx.resolver.resolve("abc/720.m3u8").await.unwrap_err();
        assert!(matches!(err, VideoError::ResolutionNotFound { .. }));
        assert!(fx.resolver.resolve("abc/360_000.ts").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let fx = fixture();
        fx.put("abc", "360.m3u8", b"#EXTM3U\n");
        std::fs::write(fx.root.path().join("secret.ts"), b"nope").unwrap();

        for path in ["abc/../secret.ts", "../abc/..", "abc/..%2f.ts", "../360.m3u8"] {
            let err = fx.resolver.resolve(path).await.unwrap_err();
            assert!(err.is_not_found(), "{path}");
        }
    }

    #[tokio::test]
    async fn master_playlist_requires_a_processed_asset() {
        let fx = fixture();
        let asset = fx
            .tracker
            .create(NewVideo {
                name: "clip".to_string(),
                description: String::new(),
                content_hash: "abc".to_string(),
                duration: 1.0,
            })
            .await
            .unwrap();
        fx.put("abc", MASTER_PLAYLIST, b"#EXTM3U\nabc/360.m3u8\n");
        let path = format!("/{}", asset.uuid);

        assert!(fx.resolver.resolve(&path).await.unwrap_err().is_not_found());

        fx.tracker.mark_processed(asset.id).await.unwrap();
        let resolved = fx.resolver.resolve(&path).await.unwrap();
        assert_eq!(resolved.bytes, b"#EXTM3U\nabc/360.m3u8\n");
        assert_eq!(resolved.content_type, PLAYLIST_CONTENT_TYPE);

        assert!(fx.resolver.resolve("/not-a-uuid").await.unwrap_err().is_not_found());
    }
}
