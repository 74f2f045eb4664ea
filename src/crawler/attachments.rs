//! Attachment download and storage
//!
//! Images are fetched with retry through the proxy pool, decoded, re-encoded
//! into one canonical format and written as `NNNNNNNN.<ext>`, where the
//! number comes from a shared sequence counter.

use crate::config::AttachmentFormat;
use crate::crawler::http::fetch_bytes;
use crate::crawler::proxy::ProxyPool;
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::crawler::source::AttachmentSink;
use crate::state::SequenceCounter;
use crate::FetchError;
use async_trait::async_trait;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name for attachment sequence number `seq`
pub fn attachment_file_name(seq: u64, format: AttachmentFormat) -> String {
    format!("{:08}.{}", seq, format.extension())
}

/// Highest sequence number among files already in `dir`
///
/// Any file whose stem is all digits counts, whatever its extension, so
/// orphans from an interrupted run are never overwritten.
pub fn highest_sequence_on_disk(dir: &Path) -> std::io::Result<Option<u64>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut highest = None;
    for entry in entries {
        let path = entry?.path();
        let seq = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|stem| stem.parse::<u64>().ok());

        if let Some(seq) = seq {
            highest = highest.max(Some(seq));
        }
    }

    Ok(highest)
}

/// Decodes any supported raster image and re-encodes it as `format`
pub fn normalize_image(bytes: &[u8], format: AttachmentFormat) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());

    match format {
        // JPEG has no alpha channel
        AttachmentFormat::Jpeg => {
            image::DynamicImage::ImageRgb8(decoded.to_rgb8()).write_to(&mut out, ImageFormat::Jpeg)?
        }
        AttachmentFormat::Png => decoded.write_to(&mut out, ImageFormat::Png)?,
    }

    Ok(out.into_inner())
}

/// Directory of stored attachments plus the counter naming them
pub struct AttachmentStore {
    dir: PathBuf,
    format: AttachmentFormat,
    counter: Arc<SequenceCounter>,
}

impl AttachmentStore {
    /// Opens (creating if needed) the attachment directory
    ///
    /// The counter is raised past every numbered file already present.
    pub fn open(
        dir: impl Into<PathBuf>,
        format: AttachmentFormat,
        counter: Arc<SequenceCounter>,
    ) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        if let Some(highest) = highest_sequence_on_disk(&dir)? {
            let before = counter.peek();
            counter.raise_to(highest + 1);
            if counter.peek() != before {
                tracing::warn!(
                    "Attachment counter raised from {} to {} past files already on disk",
                    before,
                    highest + 1
                );
            }
        }

        Ok(Self {
            dir,
            format,
            counter,
        })
    }

    pub fn counter(&self) -> &Arc<SequenceCounter> {
        &self.counter
    }

    /// Allocates the next sequence number and writes `bytes` under it
    pub async fn write(&self, bytes: &[u8]) -> std::io::Result<String> {
        let seq = self.counter.next();
        let name = attachment_file_name(seq, self.format);
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        Ok(name)
    }
}

/// Downloads attachments with retry and stores them normalized
pub struct AttachmentFetcher {
    pool: Arc<ProxyPool>,
    policy: RetryPolicy,
    store: AttachmentStore,
}

impl AttachmentFetcher {
    pub fn new(pool: Arc<ProxyPool>, policy: RetryPolicy, store: AttachmentStore) -> Self {
        Self {
            pool,
            policy,
            store,
        }
    }

    pub fn store_handle(&self) -> &AttachmentStore {
        &self.store
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 1;
        loop {
            match fetch_bytes(&self.pool, url).await {
                Ok(body) => return Ok(body.bytes),
                Err(e) => match self.policy.decide(attempt, &e) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::warn!(
                            "Attachment attempt {}/{} failed for {}: {}; retrying in {:?}",
                            attempt,
                            self.policy.max_attempts,
                            url,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => return Err(e),
                },
            }
        }
    }
}

#[async_trait]
impl AttachmentSink for AttachmentFetcher {
    async fn store(&self, url: &str) -> Result<String, FetchError> {
        let raw = self.download(url).await?;

        let format = self.store.format;
        let normalized = tokio::task::spawn_blocking(move || normalize_image(&raw, format))
            .await
            .map_err(|e| FetchError::Permanent {
                url: url.to_string(),
                reason: format!("Image conversion task failed: {}", e),
                status: None,
            })?
            .map_err(|e| FetchError::Permanent {
                url: url.to_string(),
                reason: format!("Malformed image: {}", e),
                status: None,
            })?;

        let name = self
            .store
            .write(&normalized)
            .await
            .map_err(|e| FetchError::Permanent {
                url: url.to_string(),
                reason: format!("Failed to write attachment: {}", e),
                status: None,
            })?;

        tracing::debug!("Stored attachment {} as {}", url, name);
        Ok(name)
    }
}
