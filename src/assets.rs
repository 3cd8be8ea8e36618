//! Asset upload collaborator.
//!
//! Image and audio payloads arrive inline (usually as `data:` URLs). An
//! [`AssetStore`] moves them out of the message record and hands back a URL.
//! Upload failure is never fatal to sending: [`upload_or_raw`] falls back to
//! storing the raw reference.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{ChatError, ChatResult};

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `raw` and return the URL it can be fetched from.
    async fn store_asset(&self, raw: &str) -> ChatResult<String>;
}

/// Writes decoded `data:` URL payloads into a content-addressed directory.
pub struct FsAssetStore {
    dir: PathBuf,
    base_url: String,
    max_bytes: usize,
}

impl FsAssetStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_bytes,
        }
    }
}

/// Split `data:<mime>;base64,<payload>` into its content type and payload.
fn parse_data_url(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let content_type = meta.strip_suffix(";base64")?;
    Some((content_type, payload))
}

fn content_type_to_ext(content_type: &str) -> &str {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    match base {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/webm" => "weba",
        "audio/mp4" => "m4a",
        _ => "bin",
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn store_asset(&self, raw: &str) -> ChatResult<String> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(raw.to_string());
        }

        let (content_type, payload) = parse_data_url(raw)
            .ok_or_else(|| ChatError::UploadFailed("not a base64 data URL".to_string()))?;
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ChatError::UploadFailed(format!("invalid base64: {e}")))?;
        if bytes.len() > self.max_bytes {
            return Err(ChatError::UploadFailed(format!(
                "asset is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }

        let hash = hex::encode(Sha256::digest(&bytes));
        let file_name = format!("{hash}.{}", content_type_to_ext(content_type));
        let path = self.dir.join(&file_name);

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ChatError::UploadFailed(e.to_string()))?;
        if tokio::fs::metadata(&path).await.is_err() {
            // Readers only ever see complete files: write aside, then rename.
            let staging = self
                .dir
                .join(format!(".{file_name}.{:016x}.tmp", rand::random::<u64>()));
            if let Err(e) = tokio::fs::write(&staging, &bytes).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(ChatError::UploadFailed(e.to_string()));
            }
            if let Err(e) = tokio::fs::rename(&staging, &path).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(ChatError::UploadFailed(e.to_string()));
            }
        }

        Ok(format!("{}/{}", self.base_url, file_name))
    }
}

/// Upload `raw` if a store is configured; on failure keep the raw reference.
pub async fn upload_or_raw(store: Option<&dyn AssetStore>, raw: String) -> String {
    let Some(store) = store else {
        return raw;
    };
    match store.store_asset(&raw).await {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("assets: upload failed, keeping raw reference: {}", e);
            raw
        }
    }
}
