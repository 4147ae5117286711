use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use whatsignal_common::{BridgeError, IdentifierHasher, StagedMedia};

use crate::config::BridgeConfig;

/// The five media kinds §4.F names, each with its own size/extension
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Gif,
    Document,
    Voice,
}

impl MediaKind {
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type {
            "image/gif" => MediaKind::Gif,
            m if m.starts_with("image/") => MediaKind::Image,
            m if m.starts_with("video/") => MediaKind::Video,
            m if m.starts_with("audio/") => MediaKind::Voice,
            _ => MediaKind::Document,
        }
    }

    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => &["jpg", "jpeg", "png", "webp"],
            MediaKind::Video => &["mp4", "3gp", "mov"],
            MediaKind::Gif => &["gif"],
            MediaKind::Document => &["pdf", "doc", "docx", "xls", "xlsx", "txt", "zip"],
            MediaKind::Voice => &["ogg", "oga", "mp3", "m4a", "aac"],
        }
    }
}

/// Downloads referenced media into a local cache directory under
/// size/type policy, guaranteeing the returned path stays inside the
/// cache root (§4.F).
pub struct MediaStager {
    http_client: reqwest::Client,
    config: BridgeConfig,
    hasher: Arc<IdentifierHasher>,
}

impl MediaStager {
    pub fn new(http_client: reqwest::Client, config: BridgeConfig, hasher: Arc<IdentifierHasher>) -> Self {
        Self { http_client, config, hasher }
    }

    fn max_size(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Image => self.config.max_image_bytes,
            MediaKind::Video => self.config.max_video_bytes,
            MediaKind::Gif => self.config.max_gif_bytes,
            MediaKind::Document => self.config.max_document_bytes,
            MediaKind::Voice => self.config.max_voice_bytes,
        }
    }

    /// Downloads `url` and stages it under `session`'s slice of the cache
    /// root. `hint_mime`/`hint_name` come from the originating payload
    /// when the gateway supplies them; otherwise they are derived from
    /// the HTTP response.
    pub async fn stage(
        &self,
        session: &str,
        url: &str,
        hint_mime: Option<&str>,
        hint_name: Option<&str>,
    ) -> Result<StagedMedia, BridgeError> {
        tokio::fs::create_dir_all(&self.config.media_cache_root)
            .await
            .map_err(|e| BridgeError::Storage(format!("failed to create media cache dir: {e}")))?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| BridgeError::TransientUpstream(format!("media download failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::TransientUpstream(format!("media download returned {status}")));
        }

        let mime_type = hint_mime
            .map(str::to_string)
            .or_else(|| {
                response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.split(';').next().unwrap_or(s).trim().to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let kind = MediaKind::from_mime(&mime_type);
        let max_size = self.max_size(kind);

        if let Some(len) = response.content_length() {
            if len > max_size {
                return Err(BridgeError::MediaPolicy(format!(
                    "media too large to forward: {len} bytes exceeds {max_size} byte limit"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::TransientUpstream(format!("media download failed: {e}")))?;

        if bytes.len() as u64 > max_size {
            return Err(BridgeError::MediaPolicy(format!(
                "media too large to forward: {} bytes exceeds {max_size} byte limit",
                bytes.len()
            )));
        }

        let extension = hint_name
            .and_then(|n| Path::new(n).extension().and_then(|e| e.to_str()))
            .or_else(|| url.rsplit('.').next().filter(|e| e.len() <= 5))
            .unwrap_or("bin")
            .to_ascii_lowercase();

        if !kind.allowed_extensions().contains(&extension.as_str()) {
            return Err(BridgeError::MediaPolicy(format!("unsupported media extension: {extension}")));
        }

        let session_hash = self.hasher.hash_hex(session);
        let filename =
            format!("{session_hash}-{}-{}.{extension}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0), hash_short(url));
        let dest = self.config.media_cache_root.join(&filename);

        assert_contained(&self.config.media_cache_root, &dest)?;

        let mut file = tokio::fs::File::create(&dest)
            .await
            .map_err(|e| BridgeError::Storage(format!("failed to create cached media file: {e}")))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| BridgeError::Storage(format!("failed to write cached media file: {e}")))?;

        Ok(StagedMedia {
            local_path: dest.to_string_lossy().into_owned(),
            mime_type,
            filename,
        })
    }

    /// Deletes every cached file whose modification time is older than
    /// `cutoff`. Returns the number of files removed (§4.L, scenario 6).
    pub async fn purge_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64, BridgeError> {
        let mut removed = 0u64;
        let mut entries = match tokio::fs::read_dir(&self.config.media_cache_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(BridgeError::Storage(format!("failed to list media cache dir: {e}"))),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BridgeError::Storage(format!("failed to read media cache entry: {e}")))?
        {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let modified: chrono::DateTime<chrono::Utc> = match metadata.modified() {
                Ok(m) => m.into(),
                Err(_) => continue,
            };
            if modified < cutoff && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Defends against path traversal: `dest` must resolve to a child of
/// `root` even after symlink resolution. Since `dest` may not exist yet,
/// only `root` is canonicalized and `dest`'s parent is required to equal it.
fn assert_contained(root: &Path, dest: &Path) -> Result<(), BridgeError> {
    let root = root
        .canonicalize()
        .map_err(|e| BridgeError::Storage(format!("media cache root is not accessible: {e}")))?;
    let parent = dest.parent().unwrap_or(Path::new("."));
    if parent != root {
        return Err(BridgeError::Storage("media path escapes cache root".to_string()));
    }
    Ok(())
}

fn hash_short(input: &str) -> String {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in input.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    format!("{h:016x}")
}
