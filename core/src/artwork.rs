// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Artwork retrieval strategies.
//!
//! Integrations expose cover art differently: some only through their own accessor (often
//! because fetching needs integration specific credentials), others through a direct CDN URL
//! or a URL proxied by the host. A strategy tries one of these ways for one candidate source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use crate::resolver::ActiveSelection;

pub const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Base URL used for host-relative image paths when no other base is known.
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://127.0.0.1:8123";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("Image request timed out")]
    Timeout,

    #[error("Image request failed with status {0}")]
    Status(u16),

    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Image transport error: {0}")]
    Transport(String),
}

/// Raw image bytes with the content type declared by whoever served them.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedImage {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self { bytes, content_type }
    }
}

/// Image retrieval collaborator.
#[async_trait]
pub trait ImageRetriever: Send + Sync {
    /// Fetches artwork through a source specific accessor. `Ok(None)` when the source has none.
    async fn fetch_from_source(&self, _source: &str) -> Result<Option<FetchedImage>, ImageError> {
        Ok(None)
    }

    async fn fetch_url(&self, url: &str, timeout: Duration) -> Result<FetchedImage, ImageError>;

    /// Base URLs for host-relative paths, in the order they should be tried.
    fn base_urls(&self) -> Vec<String> {
        vec![DEFAULT_LOCAL_BASE_URL.to_string()]
    }
}

/// One way of obtaining artwork for a candidate source.
#[async_trait]
pub trait ArtworkStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        retriever: &dyn ImageRetriever,
        candidate: &ActiveSelection,
    ) -> Result<Option<FetchedImage>, ImageError>;
}

/// Asks the retriever for the source's own image accessor.
pub struct SourceAccessorStrategy;

#[async_trait]
impl ArtworkStrategy for SourceAccessorStrategy {
    fn name(&self) -> &'static str {
        "source_accessor"
    }

    async fn fetch(
        &self,
        retriever: &dyn ImageRetriever,
        candidate: &ActiveSelection,
    ) -> Result<Option<FetchedImage>, ImageError> {
        retriever.fetch_from_source(&candidate.source).await
    }
}

/// Fetches the image URL advertised in the source attributes.
pub struct AttributeUrlStrategy {
    timeout: Duration,
}

impl AttributeUrlStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for AttributeUrlStrategy {
    fn default() -> Self {
        Self::new(IMAGE_FETCH_TIMEOUT)
    }
}

#[async_trait]
impl ArtworkStrategy for AttributeUrlStrategy {
    fn name(&self) -> &'static str {
        "attribute_url"
    }

    async fn fetch(
        &self,
        retriever: &dyn ImageRetriever,
        candidate: &ActiveSelection,
    ) -> Result<Option<FetchedImage>, ImageError> {
        let Some(reference) = candidate.snapshot.image_reference() else { return Ok(None); };

        let urls = candidate_urls(&reference, &retriever.base_urls());
        if urls.is_empty() {
            return Err(ImageError::InvalidUrl(reference));
        }

        let mut last_error = None;
        for url in urls {
            match retriever.fetch_url(&url, self.timeout).await {
                Ok(image) if !image.bytes.is_empty() => return Ok(Some(image)),
                Ok(_) => debug!("Empty image body from {}", url),
                Err(e) => {
                    debug!("Image fetch from {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

/// Canonical strategy order: the source accessor first, the advertised URL as fallback.
pub fn default_strategies() -> Vec<Arc<dyn ArtworkStrategy>> {
    vec![Arc::new(SourceAccessorStrategy), Arc::new(AttributeUrlStrategy::default())]
}

/// URLs to try for an image reference.
///
/// Absolute references are used as they are; host-relative paths are joined with every base
/// URL in order. Anything else yields nothing.
pub fn candidate_urls(reference: &str, base_urls: &[String]) -> Vec<String> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return vec![reference.to_string()];
    }
    if !reference.starts_with('/') {
        return Vec::new();
    }
    let mut urls: Vec<String> = Vec::with_capacity(base_urls.len());
    for base in base_urls {
        let url = format!("{}{}", base.trim_end_matches('/'), reference);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}
