//! Media Management API
//!
//! Upload and download of media files.
//!
//! ## Classification
//!
//! [`classify`] picks a [`MediaType`] from the file extension and falls back to
//! a fixed magic-byte table when the extension is absent or unrecognized.
//!
//! ## Local cache
//!
//! [`MediaApi::download_media`] is a read-through cache keyed by
//! `{cache_dir}/{media_id}.{ext}`. An existing file always wins and is never
//! re-fetched; new downloads are written to a temp file and renamed into place.
//!
//! ## Example
//!
//! ```ignore
//! let media_api = MediaApi::new(context);
//!
//! let media_id = media_api.upload_media("a.jpg", &bytes, MediaType::Image).await?;
//! let path = media_api.download_media_as(&media_id, MediaType::Image).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::{Part, ResponseFormat};
use crate::config::keys;
use crate::error::WechatError;
use crate::storage::persist_atomically;

use super::{WechatApi, WechatContext};

/// Media type accepted by the upload endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Image file (jpg, png, gif, bmp)
    Image,
    /// Voice file (amr, mp3, wav, speex)
    Voice,
    /// Video file (mp4)
    Video,
    /// Thumbnail (jpg)
    Thumb,
}

impl MediaType {
    /// Value of the `type` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Voice => "voice",
            MediaType::Video => "video",
            MediaType::Thumb => "thumb",
        }
    }

    /// File extension used for cached downloads
    pub fn format_name(&self) -> &'static str {
        match self {
            MediaType::Image | MediaType::Thumb => "jpg",
            MediaType::Voice => "amr",
            MediaType::Video => "mp4",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" => Some(MediaType::Image),
            "amr" | "mp3" | "wav" | "speex" => Some(MediaType::Voice),
            "mp4" => Some(MediaType::Video),
            "thumb" => Some(MediaType::Thumb),
            _ => None,
        }
    }

    /// Identify content by its leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        const SIGNATURES: &[(usize, &[u8], MediaType)] = &[
            (0, &[0xFF, 0xD8, 0xFF], MediaType::Image),
            (0, &[0x89, b'P', b'N', b'G'], MediaType::Image),
            (0, b"GIF8", MediaType::Image),
            (0, b"BM", MediaType::Image),
            (0, b"#!AMR", MediaType::Voice),
            (0, b"ID3", MediaType::Voice),
            (4, b"ftyp", MediaType::Video),
        ];

        for (offset, magic, media_type) in SIGNATURES {
            if data.len() >= offset + magic.len() && &data[*offset..offset + magic.len()] == *magic
            {
                return Some(*media_type);
            }
        }

        if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WAVE" {
            return Some(MediaType::Voice);
        }
        // MPEG audio frame sync without an ID3 header
        if data.len() >= 2 && data[0] == 0xFF && data[1] & 0xE0 == 0xE0 {
            return Some(MediaType::Voice);
        }
        None
    }
}

fn extension_of(file_name: &str) -> Option<&str> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}

/// Classify by extension first, then by content.
///
/// # Errors
/// `LocalValidation` when neither identifies a supported type.
pub fn classify(file_name: &str, data: &[u8]) -> Result<MediaType, WechatError> {
    extension_of(file_name)
        .and_then(MediaType::from_extension)
        .or_else(|| MediaType::sniff(data))
        .ok_or_else(|| {
            WechatError::validation(format!("cannot determine media type of `{file_name}`"))
        })
}

fn validate_media_id(media_id: &str) -> Result<(), WechatError> {
    if media_id.is_empty() {
        return Err(WechatError::validation("media_id must not be empty"));
    }
    if media_id.contains(|c: char| c == '/' || c == '\\') || media_id.starts_with('.') {
        return Err(WechatError::validation(format!(
            "media_id `{media_id}` cannot be used as a cache file name"
        )));
    }
    Ok(())
}

fn validate_extension(ext: &str) -> Result<(), WechatError> {
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(WechatError::validation(format!(
            "invalid cache file extension `{ext}`"
        )));
    }
    Ok(())
}

/// Media API
pub struct MediaApi {
    context: Arc<WechatContext>,
}

impl MediaApi {
    /// Create a new MediaApi instance
    pub fn new(context: Arc<WechatContext>) -> Self {
        Self { context }
    }

    /// Upload media and return its `media_id`
    ///
    /// POST /cgi-bin/media/upload?access_token=ACCESS_TOKEN&type=TYPE
    ///
    /// The bytes are sent as the `media` part of a multipart body.
    pub async fn upload_media(
        &self,
        file_name: &str,
        data: &[u8],
        media_type: MediaType,
    ) -> Result<String, WechatError> {
        if file_name.is_empty() {
            return Err(WechatError::validation("file name must not be empty"));
        }

        let descriptor = self
            .context
            .post(keys::MEDIA_UPLOAD)?
            .param("type", media_type.as_str())
            .part(Part {
                name: "media".to_string(),
                file_name: file_name.to_string(),
                data: data.to_vec(),
                mime: None,
            })
            .response(ResponseFormat::Json);

        let envelope = self.context.dispatch(&descriptor).await?;

        // Thumbnails come back under their own key.
        let media_id = match media_type {
            MediaType::Thumb => envelope
                .str_field("thumb_media_id")
                .or_else(|_| envelope.str_field("media_id"))?,
            _ => envelope.str_field("media_id")?,
        };
        log::debug!(
            "[{}] uploaded {} as {} ({})",
            self.api_name(),
            file_name,
            media_id,
            media_type.as_str()
        );
        Ok(media_id.to_string())
    }

    /// Upload media, classifying it with [`classify`].
    pub async fn upload_media_auto(
        &self,
        file_name: &str,
        data: &[u8],
    ) -> Result<String, WechatError> {
        let media_type = classify(file_name, data)?;
        self.upload_media(file_name, data, media_type).await
    }

    /// Read a local file and upload it.
    pub async fn upload_media_file(&self, path: impl AsRef<Path>) -> Result<String, WechatError> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                WechatError::validation(format!("`{}` has no file name", path.display()))
            })?;

        let data = tokio::task::spawn_blocking(move || std::fs::read(&path))
            .await
            .map_err(|e| WechatError::transport(format!("file read task failed: {e}")))??;

        self.upload_media_auto(&file_name, &data).await
    }

    /// Download media bytes
    ///
    /// GET /cgi-bin/media/get?access_token=ACCESS_TOKEN&media_id=MEDIA_ID
    pub async fn download_media_bytes(&self, media_id: &str) -> Result<Vec<u8>, WechatError> {
        validate_media_id(media_id)?;

        let descriptor = self
            .context
            .get(keys::MEDIA_DOWNLOAD)?
            .param("media_id", media_id)
            .response(ResponseFormat::Binary);

        self.context.dispatch(&descriptor).await?.into_bytes()
    }

    /// Cache path for `media_id` with extension `ext`.
    pub fn cache_path(&self, media_id: &str, ext: &str) -> Result<PathBuf, WechatError> {
        validate_media_id(media_id)?;
        validate_extension(ext)?;
        Ok(self
            .context
            .media_cache_dir()
            .join(format!("{media_id}.{ext}")))
    }

    /// Download media into the local cache and return its path.
    ///
    /// A cached file is returned without any network call.
    pub async fn download_media(&self, media_id: &str, ext: &str) -> Result<PathBuf, WechatError> {
        let path = self.cache_path(media_id, ext)?;
        let storage = Arc::clone(&self.context.storage);

        if storage.exists(&path) {
            log::debug!("[{}] cache hit {}", self.api_name(), path.display());
            return Ok(path);
        }

        let data = self.download_media_bytes(media_id).await?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || persist_atomically(storage.as_ref(), &target, &data))
            .await
            .map_err(|e| WechatError::transport(format!("cache write task failed: {e}")))??;

        log::debug!("[{}] cached {}", self.api_name(), path.display());
        Ok(path)
    }

    /// [`download_media`](Self::download_media) using the type's format name.
    pub async fn download_media_as(
        &self,
        media_id: &str,
        media_type: MediaType,
    ) -> Result<PathBuf, WechatError> {
        self.download_media(media_id, media_type.format_name()).await
    }
}

impl WechatApi for MediaApi {
    fn api_name(&self) -> &'static str {
        "media"
    }

    fn context(&self) -> &WechatContext {
        &self.context
    }
}
