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

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use log::debug;
use serde::Serialize;

use crate::artwork::{default_strategies, ArtworkStrategy, ImageRetriever};
use crate::config::{slugify, ConfigEntry};
use crate::definitions::{ATTR_ENTITY_PICTURE, ATTR_FRIENDLY_NAME, DEFAULT_IMAGE_CONTENT_TYPE, IMAGE_ICON};
use crate::resolver::{ranked_candidates, resolve, ActiveSelection};
use crate::source_state::SourceId;
use crate::state_observer::StateObserver;

#[derive(Debug, Default)]
struct ImageCache {
    // outer None: nothing computed yet
    fingerprint: Option<Option<String>>,
    last_updated: Option<SystemTime>,
    content_type: Option<String>,
}

/// Diagnostics published next to the image.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageAttributes {
    pub entity_picture: Option<String>,
    pub active_source: Option<SourceId>,
    pub active_source_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub last_updated: Option<SystemTime>,
    pub content_type: String,
    pub attributes: ImageAttributes,
}

/// Companion image entity exposing the cover art of the active combined source.
pub struct CombinedImage {
    unique_id: String,
    object_id: String,
    name: RwLock<String>,
    sources: RwLock<Vec<SourceId>>,
    observer: Arc<dyn StateObserver>,
    retriever: Arc<dyn ImageRetriever>,
    strategies: Vec<Arc<dyn ArtworkStrategy>>,
    cache: Mutex<ImageCache>,
}

impl CombinedImage {
    pub fn new(entry: &ConfigEntry, observer: Arc<dyn StateObserver>, retriever: Arc<dyn ImageRetriever>) -> Self {
        Self::with_strategies(entry, observer, retriever, default_strategies())
    }

    pub fn with_strategies(
        entry: &ConfigEntry,
        observer: Arc<dyn StateObserver>,
        retriever: Arc<dyn ImageRetriever>,
        strategies: Vec<Arc<dyn ArtworkStrategy>>,
    ) -> Self {
        Self {
            unique_id: format!("{}_cover", entry.unique_id),
            object_id: format!("{}_cover", slugify(&entry.unique_id)),
            name: RwLock::new(cover_name(entry)),
            sources: RwLock::new(entry.effective_sources()),
            observer,
            retriever,
            strategies,
            cache: Mutex::new(ImageCache::default()),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn suggested_object_id(&self) -> &str {
        &self.object_id
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn icon(&self) -> &'static str {
        IMAGE_ICON
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn apply_entry(&self, entry: &ConfigEntry) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = cover_name(entry);
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = entry.effective_sources();
    }

    fn candidates(&self) -> Vec<ActiveSelection> {
        let sources = self.sources();
        ranked_candidates(&sources, |id| self.observer.state(id))
    }

    /// Identity of the artwork currently shown: the first ranked source advertising an image
    /// together with that image reference.
    pub fn fingerprint(&self) -> Option<String> {
        self.candidates().into_iter().find_map(|candidate| {
            candidate
                .snapshot
                .image_reference()
                .map(|reference| format!("{}|{}", candidate.source, reference))
        })
    }

    /// Recomputes the fingerprint and advances the last-updated time if it changed.
    ///
    /// Returns whether the time advanced.
    pub fn refresh(&self) -> bool {
        let fingerprint = self.fingerprint();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.fingerprint.as_ref() == Some(&fingerprint) {
            return false;
        }
        debug!("{}: artwork changed to {:?}", self.unique_id, fingerprint);
        cache.fingerprint = Some(fingerprint);
        cache.last_updated = Some(SystemTime::now());
        true
    }

    pub fn last_updated(&self) -> Option<SystemTime> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).last_updated
    }

    /// Content type of the last image returned by [`CombinedImage::fetch_image`].
    pub fn content_type(&self) -> String {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE_CONTENT_TYPE.to_string())
    }

    /// Walks the ranked sources and their strategies until one yields image bytes.
    ///
    /// Failing strategies are skipped. `None` means no active source has artwork right now.
    pub async fn fetch_image(&self) -> Option<Vec<u8>> {
        for candidate in self.candidates() {
            for strategy in &self.strategies {
                match strategy.fetch(self.retriever.as_ref(), &candidate).await {
                    Ok(Some(image)) if !image.bytes.is_empty() => {
                        debug!("{}: artwork for {} via {}", self.unique_id, candidate.source, strategy.name());
                        let content_type = image
                            .content_type
                            .filter(|ct| !ct.is_empty())
                            .unwrap_or_else(|| DEFAULT_IMAGE_CONTENT_TYPE.to_string());
                        self.cache.lock().unwrap_or_else(PoisonError::into_inner).content_type = Some(content_type);
                        return Some(image.bytes);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("{}: {} failed for {}: {}", self.unique_id, strategy.name(), candidate.source, e),
                }
            }
        }
        None
    }

    pub fn attributes(&self) -> ImageAttributes {
        let sources = self.sources();
        let Some(active) = resolve(&sources, |id| self.observer.state(id)) else {
            return ImageAttributes::default();
        };
        let attrs = &active.snapshot.attributes;
        ImageAttributes {
            entity_picture: attrs.get(ATTR_ENTITY_PICTURE),
            active_source_name: Some(attrs.get(ATTR_FRIENDLY_NAME).unwrap_or_else(|| active.source.clone())),
            active_source: Some(active.source),
        }
    }

    pub fn view(&self) -> ImageView {
        ImageView {
            unique_id: self.unique_id.clone(),
            name: self.name(),
            icon: self.icon(),
            last_updated: self.last_updated(),
            content_type: self.content_type(),
            attributes: self.attributes(),
        }
    }
}

fn cover_name(entry: &ConfigEntry) -> String {
    format!("{} Cover", entry.title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{FetchedImage, ImageError, DEFAULT_LOCAL_BASE_URL};
    use crate::config::{create_entry, EntryInput};
    use crate::source_state::AttributeBag;
    use crate::state_observer::StateStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct MockRetriever {
        by_source: HashMap<String, FetchedImage>,
        by_url: HashMap<String, Result<FetchedImage, ImageError>>,
        failing_accessor: Option<String>,
        requested_urls: Mutex<Vec<String>>,
    }

    impl MockRetriever {
        fn requested(&self) -> Vec<String> {
            std::mem::take(&mut self.requested_urls.lock().unwrap())
        }
    }

    #[async_trait]
    impl ImageRetriever for MockRetriever {
        async fn fetch_from_source(&self, source: &str) -> Result<Option<FetchedImage>, ImageError> {
            if self.failing_accessor.as_deref() == Some(source) {
                return Err(ImageError::Transport("accessor exploded".into()));
            }
            Ok(self.by_source.get(source).cloned())
        }

        async fn fetch_url(&self, url: &str, timeout: Duration) -> Result<FetchedImage, ImageError> {
            assert_eq!(timeout, Duration::from_secs(5));
            self.requested_urls.lock().unwrap().push(url.to_string());
            self.by_url.get(url).cloned().unwrap_or(Err(ImageError::Status(404)))
        }

        fn base_urls(&self) -> Vec<String> {
            vec!["http://10.0.0.5:8123".to_string(), DEFAULT_LOCAL_BASE_URL.to_string()]
        }
    }

    fn png(bytes: &[u8]) -> FetchedImage {
        FetchedImage::new(bytes.to_vec(), Some("image/png".to_string()))
    }

    fn build(sources: &[&str], retriever: MockRetriever) -> (CombinedImage, Arc<StateStore>) {
        let store = Arc::new(StateStore::new());
        let entry = create_entry(
            EntryInput { name: "Living Room".into(), sources: sources.iter().map(|s| s.to_string()).collect() },
            Vec::<&str>::new(),
        )
        .unwrap();
        (CombinedImage::new(&entry, store.clone(), Arc::new(retriever)), store)
    }

    #[test]
    fn identity_follows_entry() {
        let (image, _) = build(&["a"], MockRetriever::default());
        assert_eq!(image.unique_id(), "combined_living_room_cover");
        assert_eq!(image.suggested_object_id(), "combined_living_room_cover");
        assert_eq!(image.name(), "Living Room Cover");
    }

    #[tokio::test]
    async fn lower_tier_source_supplies_artwork_when_winner_has_none() {
        let mut retriever = MockRetriever::default();
        retriever.by_url.insert("https://cdn.example/img1".into(), Ok(png(b"img1")));
        let (image, store) = build(&["a", "b"], retriever);
        store.set_state("a", "playing", AttributeBag::new());
        store.set_state("b", "paused", AttributeBag::new().with("entity_picture", "https://cdn.example/img1"));

        assert_eq!(image.fetch_image().await, Some(b"img1".to_vec()));
        assert_eq!(image.content_type(), "image/png");
        assert_eq!(image.fingerprint().as_deref(), Some("b|https://cdn.example/img1"));
    }

    #[tokio::test]
    async fn source_accessor_is_tried_before_url() {
        let mut retriever = MockRetriever::default();
        retriever.by_source.insert("a".into(), FetchedImage::new(b"native".to_vec(), None));
        retriever.by_url.insert("https://cdn.example/a".into(), Ok(png(b"url")));
        let (image, store) = build(&["a"], retriever);
        store.set_state("a", "playing", AttributeBag::new().with("entity_picture", "https://cdn.example/a"));

        assert_eq!(image.fetch_image().await, Some(b"native".to_vec()));
        assert_eq!(image.content_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn failing_accessor_falls_back_to_relative_url_over_bases() {
        let proxy = "/api/media_player_proxy/media_player.a?cache=9";
        let mut retriever = MockRetriever {
            failing_accessor: Some("a".into()),
            ..Default::default()
        };
        retriever
            .by_url
            .insert(format!("{}{}", DEFAULT_LOCAL_BASE_URL, proxy), Ok(png(b"proxied")));
        let (image, store) = build(&["a"], retriever);
        store.set_state("a", "idle", AttributeBag::new().with("entity_picture", proxy));

        assert_eq!(image.fetch_image().await, Some(b"proxied".to_vec()));
    }

    #[tokio::test]
    async fn empty_bodies_and_errors_continue_the_scan() {
        let mut retriever = MockRetriever::default();
        retriever.by_url.insert("https://cdn.example/empty".into(), Ok(FetchedImage::new(Vec::new(), None)));
        retriever.by_url.insert("https://cdn.example/slow".into(), Err(ImageError::Timeout));
        retriever.by_url.insert("https://cdn.example/ok".into(), Ok(png(b"ok")));
        let (image, store) = build(&["a", "b", "c"], retriever);
        store.set_state("a", "playing", AttributeBag::new().with("entity_picture", "https://cdn.example/empty"));
        store.set_state("b", "playing", AttributeBag::new().with("media_image_url", "https://cdn.example/slow"));
        store.set_state("c", "on", AttributeBag::new().with("entity_picture", "https://cdn.example/ok"));

        assert_eq!(image.fetch_image().await, Some(b"ok".to_vec()));
    }

    #[tokio::test]
    async fn no_artwork_anywhere_is_none() {
        let (image, store) = build(&["a", "b", "c"], MockRetriever::default());
        store.set_state("a", "playing", AttributeBag::new().with("entity_picture", "https://cdn.example/missing"));
        store.set_state("b", "off", AttributeBag::new().with("entity_picture", "https://cdn.example/off"));
        store.set_state("c", "garbage", AttributeBag::new().with("entity_picture", "https://cdn.example/bad"));

        assert_eq!(image.fetch_image().await, None);
        assert_eq!(image.content_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn inactive_sources_are_never_fetched() {
        let mut retriever = MockRetriever::default();
        retriever.by_url.insert("https://cdn.example/off".into(), Ok(png(b"off")));
        let retriever = Arc::new(retriever);
        let store = Arc::new(StateStore::new());
        let entry = create_entry(EntryInput { name: "X".into(), sources: vec!["a".into()] }, Vec::<&str>::new()).unwrap();
        let image = CombinedImage::new(&entry, store.clone(), retriever.clone());
        store.set_state("a", "off", AttributeBag::new().with("entity_picture", "https://cdn.example/off"));

        assert_eq!(image.fetch_image().await, None);
        assert!(retriever.requested().is_empty());
    }

    #[test]
    fn last_updated_advances_only_when_fingerprint_changes() {
        let (image, store) = build(&["a", "b"], MockRetriever::default());
        store.set_state("a", "playing", AttributeBag::new().with("entity_picture", "/img/1"));

        assert!(image.refresh());
        let first = image.last_updated();
        assert!(first.is_some());

        assert!(!image.refresh());
        assert_eq!(image.last_updated(), first);

        // unrelated attribute change keeps the fingerprint
        store.update_attributes("a", |attrs| {
            attrs.insert("media_position", 12.0);
        });
        assert!(!image.refresh());
        assert_eq!(image.last_updated(), first);

        store.update_attributes("a", |attrs| {
            attrs.insert("entity_picture", "/img/2");
        });
        assert!(image.refresh());

        // different source, same reference still changes the fingerprint
        store.set_state("a", "off", AttributeBag::new());
        store.set_state("b", "playing", AttributeBag::new().with("entity_picture", "/img/2"));
        assert!(image.refresh());

        store.set_state("b", "off", AttributeBag::new());
        assert!(image.refresh());
        assert_eq!(image.fingerprint(), None);
        assert!(!image.refresh());
    }

    #[test]
    fn attributes_name_the_active_source() {
        let (image, store) = build(&["a", "b"], MockRetriever::default());
        assert_eq!(image.attributes(), ImageAttributes::default());

        store.set_state("a", "idle", AttributeBag::new());
        store.set_state(
            "b",
            "playing",
            AttributeBag::new().with("friendly_name", "Apple TV").with("entity_picture", "/pic"),
        );
        let attributes = image.attributes();
        assert_eq!(attributes.active_source.as_deref(), Some("b"));
        assert_eq!(attributes.active_source_name.as_deref(), Some("Apple TV"));
        assert_eq!(attributes.entity_picture.as_deref(), Some("/pic"));

        store.set_state("b", "off", AttributeBag::new());
        assert_eq!(image.attributes().active_source_name.as_deref(), Some("a"));
    }

    #[test]
    fn view_carries_name_and_icon() {
        let (image, _store) = build(&["a"], MockRetriever::default());
        let view = image.view();
        assert_eq!(view.name, "Living Room Cover");
        assert_eq!(view.icon, "mdi:image");
        assert_eq!(view.last_updated, None);
        assert_eq!(view.content_type, image.content_type());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["icon"], "mdi:image");
    }

    #[tokio::test]
    async fn requested_urls_follow_base_order() {
        let retriever = Arc::new(MockRetriever::default());
        let store = Arc::new(StateStore::new());
        let entry = create_entry(EntryInput { name: "X".into(), sources: vec!["a".into()] }, Vec::<&str>::new()).unwrap();
        let image = CombinedImage::new(&entry, store.clone(), retriever.clone());
        store.set_state("a", "playing", AttributeBag::new().with("entity_picture", "/p"));

        assert_eq!(image.fetch_image().await, None);
        assert_eq!(
            retriever.requested(),
            vec!["http://10.0.0.5:8123/p".to_string(), "http://127.0.0.1:8123/p".to_string()]
        );
    }
}
