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

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use combined_player_core::artwork::{FetchedImage, ImageError, ImageRetriever, DEFAULT_LOCAL_BASE_URL};
use combined_player_core::source_state::SourceId;
use log::debug;
use reqwest::header::CONTENT_TYPE;

/// Integration specific image access for one source.
#[async_trait]
pub trait SourceImageAccessor: Send + Sync {
    async fn fetch_image(&self) -> Result<Option<FetchedImage>, ImageError>;
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> ImageError {
    if e.is_timeout() {
        ImageError::Timeout
    } else if let Some(status) = e.status() {
        ImageError::Status(status.as_u16())
    } else if e.is_builder() {
        ImageError::InvalidUrl(e.to_string())
    } else {
        ImageError::Transport(e.to_string())
    }
}

/// [`ImageRetriever`] over HTTP with optional per-source accessors.
///
/// Host-relative paths are tried against the internal URL, then the external URL, then the
/// loopback default.
pub struct HttpImageRetriever {
    client: reqwest::Client,
    internal_url: Option<String>,
    external_url: Option<String>,
    accessors: HashMap<SourceId, Arc<dyn SourceImageAccessor>>,
}

impl HttpImageRetriever {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client, internal_url: None, external_url: None, accessors: HashMap::new() }
    }

    pub fn with_internal_url(mut self, url: impl Into<String>) -> Self {
        self.internal_url = Some(url.into());
        self
    }

    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    pub fn with_source_accessor(mut self, source: impl Into<SourceId>, accessor: Arc<dyn SourceImageAccessor>) -> Self {
        self.accessors.insert(source.into(), accessor);
        self
    }
}

impl Default for HttpImageRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageRetriever for HttpImageRetriever {
    async fn fetch_from_source(&self, source: &str) -> Result<Option<FetchedImage>, ImageError> {
        match self.accessors.get(source) {
            Some(accessor) => accessor.fetch_image().await,
            None => Ok(None),
        }
    }

    async fn fetch_url(&self, url: &str, timeout: Duration) -> Result<FetchedImage, ImageError> {
        debug!("GET {}", url);
        let response = self.client.get(url).timeout(timeout).send().await.map_err(map_reqwest_error)?;
        let response = response.error_for_status().map_err(map_reqwest_error)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(FetchedImage::new(bytes.to_vec(), content_type))
    }

    fn base_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let configured = [self.internal_url.as_deref(), self.external_url.as_deref(), Some(DEFAULT_LOCAL_BASE_URL)];
        for url in configured.into_iter().flatten() {
            let url = url.trim_end_matches('/').to_string();
            if !url.is_empty() && !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }
}
