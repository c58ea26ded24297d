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
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use tokio::sync::broadcast;

use crate::artwork::ImageRetriever;
use crate::combined_events::CombinedEvent;
use crate::combined_image::CombinedImage;
use crate::combined_player::CombinedPlayer;
use crate::combined_watch::{run_combined_watch, write_state};
use crate::command::CommandDispatcher;
use crate::config::{self, ConfigEntry, ConfigError, EntryId, EntryInput};
use crate::definitions::{OPTIONS_TRIGGER, SETUP_TRIGGER};
use crate::service::{MultiServiceHandle, ServiceHandle};
use crate::state_observer::StateObserver;

struct ManagedEntry {
    entry: ConfigEntry,
    player: Arc<CombinedPlayer>,
    image: Arc<CombinedImage>,
    watch: Option<ServiceHandle>,
}

/// Owns the configured entries, their two entities and the watch task feeding them.
pub struct CombinedManager {
    observer: Arc<dyn StateObserver>,
    dispatcher: Arc<dyn CommandDispatcher>,
    retriever: Arc<dyn ImageRetriever>,
    entries: Mutex<HashMap<EntryId, ManagedEntry>>,
    event_sender: broadcast::Sender<CombinedEvent>,
}

impl CombinedManager {
    pub fn new(
        observer: Arc<dyn StateObserver>,
        dispatcher: Arc<dyn CommandDispatcher>,
        retriever: Arc<dyn ImageRetriever>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self { observer, dispatcher, retriever, entries: Mutex::new(HashMap::new()), event_sender }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<EntryId, ManagedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CombinedEvent> {
        self.event_sender.subscribe()
    }

    /// Runs the create flow against the configured entries and sets the new entry up.
    pub fn create_entry(&self, input: EntryInput) -> Result<ConfigEntry, ConfigError> {
        let entry = {
            let entries = self.lock_entries();
            config::create_entry(input, entries.values().map(|m| m.entry.unique_id.as_str()))?
        };
        self.setup_entry(entry.clone())?;
        Ok(entry)
    }

    /// Creates both entities for an entry and starts watching its sources.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn setup_entry(&self, entry: ConfigEntry) -> Result<(), ConfigError> {
        entry.validate()?;

        let mut entries = self.lock_entries();
        if entries.values().any(|m| m.entry.entry_id == entry.entry_id || m.entry.unique_id == entry.unique_id) {
            return Err(ConfigError::AlreadyConfigured(entry.unique_id));
        }

        let player = Arc::new(CombinedPlayer::new(&entry, self.observer.clone(), self.dispatcher.clone()));
        let image = Arc::new(CombinedImage::new(&entry, self.observer.clone(), self.retriever.clone()));
        let watch = run_combined_watch(player.clone(), image.clone(), self.observer.clone(), self.event_sender.clone());
        info!("Entry {} set up with sources {:?}", entry.unique_id, entry.effective_sources());

        let entry_id = entry.entry_id;
        let title = entry.title.clone();
        entries.insert(
            entry_id,
            ManagedEntry { entry, player: player.clone(), image: image.clone(), watch: Some(watch) },
        );
        drop(entries);

        let _ = self.event_sender.send(CombinedEvent::Added { entry_id, title });
        write_state(&player, &image, SETUP_TRIGGER, &self.event_sender);
        Ok(())
    }

    /// Tears an entry down and releases its state subscription.
    pub async fn unload_entry(&self, entry_id: EntryId) -> Result<ConfigEntry, ConfigError> {
        let removed = self.lock_entries().remove(&entry_id).ok_or(ConfigError::EntryNotFound(entry_id))?;

        if let Some(watch) = removed.watch {
            if let Err(e) = watch.shutdown().await {
                warn!("Watch task of entry {} ended abnormally: {}", removed.entry.unique_id, e);
            }
        }
        info!("Entry {} unloaded", removed.entry.unique_id);
        let _ = self.event_sender.send(CombinedEvent::Removed { entry_id });
        Ok(removed.entry)
    }

    /// Runs the options flow and re-targets the entities at the new source list.
    pub async fn update_options(&self, entry_id: EntryId, input: EntryInput) -> Result<ConfigEntry, ConfigError> {
        let (updated, old_watch) = {
            let mut entries = self.lock_entries();
            let managed = entries.get_mut(&entry_id).ok_or(ConfigError::EntryNotFound(entry_id))?;
            let updated = config::update_options(&managed.entry, input)?;
            managed.entry = updated.clone();
            managed.player.apply_entry(&updated);
            managed.image.apply_entry(&updated);
            (updated, managed.watch.take())
        };

        if let Some(watch) = old_watch {
            if let Err(e) = watch.shutdown().await {
                warn!("Watch task of entry {} ended abnormally: {}", updated.unique_id, e);
            }
        }

        let (player, image) = {
            let mut entries = self.lock_entries();
            let Some(managed) = entries.get_mut(&entry_id) else {
                // Unloaded while the old watch was stopping.
                return Err(ConfigError::EntryNotFound(entry_id));
            };
            managed.watch = Some(run_combined_watch(
                managed.player.clone(),
                managed.image.clone(),
                self.observer.clone(),
                self.event_sender.clone(),
            ));
            (managed.player.clone(), managed.image.clone())
        };

        let sources = updated.effective_sources();
        info!("Entry {} now tracks {:?}", updated.unique_id, sources);
        let _ = self.event_sender.send(CombinedEvent::OptionsUpdated { entry_id, sources });
        write_state(&player, &image, OPTIONS_TRIGGER, &self.event_sender);
        Ok(updated)
    }

    pub fn entry(&self, entry_id: EntryId) -> Option<ConfigEntry> {
        self.lock_entries().get(&entry_id).map(|m| m.entry.clone())
    }

    pub fn entries(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> = self.lock_entries().values().map(|m| m.entry.clone()).collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title));
        entries
    }

    pub fn player(&self, entry_id: EntryId) -> Option<Arc<CombinedPlayer>> {
        self.lock_entries().get(&entry_id).map(|m| m.player.clone())
    }

    pub fn image(&self, entry_id: EntryId) -> Option<Arc<CombinedImage>> {
        self.lock_entries().get(&entry_id).map(|m| m.image.clone())
    }

    /// Looks an entry up by its title, ignoring case.
    pub fn find_by_title(&self, title: &str) -> Option<EntryId> {
        self.lock_entries()
            .values()
            .find(|m| m.entry.title.eq_ignore_ascii_case(title))
            .map(|m| m.entry.entry_id)
    }

    /// Stops every watch task. Entries stay configured.
    pub async fn shutdown(&self) {
        let mut handles = MultiServiceHandle::new();
        handles.extend(self.lock_entries().values_mut().filter_map(|m| m.watch.take()));
        info!("Stopping {} watch tasks", handles.len());
        if handles.shutdown().await.is_err() {
            warn!("Not every watch task stopped cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::{FetchedImage, ImageError};
    use crate::command::{CommandArgs, DispatchError, PlayerCommand};
    use crate::definitions::CombinedState;
    use crate::source_state::AttributeBag;
    use crate::state_observer::StateStore;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CommandDispatcher for RecordingDispatcher {
        async fn invoke(&self, source: &str, command: &str, _args: CommandArgs) -> Result<(), DispatchError> {
            self.calls.lock().unwrap().push((source.to_string(), command.to_string()));
            Ok(())
        }
    }

    struct StaticImages;

    #[async_trait]
    impl ImageRetriever for StaticImages {
        async fn fetch_url(&self, url: &str, _timeout: Duration) -> Result<FetchedImage, ImageError> {
            Ok(FetchedImage::new(url.as_bytes().to_vec(), Some("image/png".into())))
        }
    }

    struct Fixture {
        store: Arc<StateStore>,
        dispatcher: Arc<RecordingDispatcher>,
        manager: CombinedManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(StateStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let manager = CombinedManager::new(store.clone(), dispatcher.clone(), Arc::new(StaticImages));
        Fixture { store, dispatcher, manager }
    }

    fn input(name: &str, sources: &[&str]) -> EntryInput {
        EntryInput { name: name.to_string(), sources: sources.iter().map(|s| s.to_string()).collect() }
    }

    async fn wait_for<F: Fn(&CombinedEvent) -> bool>(rx: &mut broadcast::Receiver<CombinedEvent>, pred: F) -> CombinedEvent {
        timeout(Duration::from_secs(1), async {
            loop {
                let event = rx.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_entry_sets_up_both_entities() {
        let f = fixture();
        let mut rx = f.manager.subscribe();

        let entry = f.manager.create_entry(input("Living Room", &["tv", "speaker"])).unwrap();
        assert_eq!(entry.unique_id, "combined_living_room");
        assert!(matches!(wait_for(&mut rx, |_| true).await, CombinedEvent::Added { .. }));

        let player = f.manager.player(entry.entry_id).unwrap();
        let image = f.manager.image(entry.entry_id).unwrap();
        assert_eq!(player.name(), "Living Room");
        assert_eq!(image.name(), "Living Room Cover");
        assert_eq!(f.store.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn setup_writes_initial_state_once() {
        let f = fixture();
        f.store.set_state("tv", "paused", AttributeBag::new().with("media_title", "News").with("entity_picture", "/tv.png"));
        let mut rx = f.manager.subscribe();
        let entry = f.manager.create_entry(input("Den", &["tv", "speaker"])).unwrap();

        assert!(matches!(rx.recv().await.unwrap(), CombinedEvent::Added { .. }));
        let CombinedEvent::StateWritten { entry_id, trigger, player, image, image_changed } = rx.recv().await.unwrap() else {
            panic!("expected the initial state write");
        };
        assert_eq!(entry_id, entry.entry_id);
        assert_eq!(trigger, SETUP_TRIGGER);
        assert_eq!(player.state, CombinedState::Idle);
        assert_eq!(player.attributes.media_title.as_deref(), Some("News"));
        assert_eq!(image.attributes.active_source.as_deref(), Some("tv"));
        assert!(image_changed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn options_update_writes_state_for_new_sources() {
        let f = fixture();
        f.store.set_state("tv", "playing", AttributeBag::new());
        f.store.set_state("radio", "idle", AttributeBag::new());
        let entry = f.manager.create_entry(input("Den", &["tv"])).unwrap();
        let mut rx = f.manager.subscribe();

        f.manager.update_options(entry.entry_id, input("Den", &["radio"])).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), CombinedEvent::OptionsUpdated { .. }));
        let CombinedEvent::StateWritten { trigger, player, .. } = rx.recv().await.unwrap() else {
            panic!("expected a state write after the options update");
        };
        assert_eq!(trigger, OPTIONS_TRIGGER);
        assert_eq!(player.sources, vec!["radio".to_string()]);
        assert_eq!(player.active_source.as_deref(), Some("radio"));
        assert_eq!(player.state, CombinedState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let f = fixture();
        f.manager.create_entry(input("Living Room", &["tv"])).unwrap();
        let err = f.manager.create_entry(input("living room", &["speaker"])).unwrap_err();
        assert_eq!(err, ConfigError::AlreadyConfigured("combined_living_room".into()));
        assert_eq!(f.manager.entries().len(), 1);
    }

    #[tokio::test]
    async fn source_changes_drive_state_and_commands() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        let entry = f.manager.create_entry(input("Den", &["tv", "speaker"])).unwrap();

        f.store.set_state("speaker", "playing", AttributeBag::new().with("media_title", "Song"));
        let event = wait_for(&mut rx, |e| matches!(e, CombinedEvent::StateWritten { trigger, .. } if trigger == "speaker")).await;
        let CombinedEvent::StateWritten { player, .. } = event else { unreachable!() };
        assert_eq!(player.state, CombinedState::Playing);
        assert_eq!(player.attributes.media_title.as_deref(), Some("Song"));

        let combined = f.manager.player(entry.entry_id).unwrap();
        combined.dispatch(PlayerCommand::Pause).await.unwrap();
        assert_eq!(*f.dispatcher.calls.lock().unwrap(), vec![("speaker".to_string(), "media_pause".to_string())]);
    }

    #[tokio::test]
    async fn options_update_retargets_subscription() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        let entry = f.manager.create_entry(input("Den", &["tv"])).unwrap();

        let updated = f.manager.update_options(entry.entry_id, input("Den Combo", &["radio"])).await.unwrap();
        assert_eq!(updated.title, "Den Combo");
        assert_eq!(f.store.subscriber_count(), 1);
        wait_for(&mut rx, |e| matches!(e, CombinedEvent::OptionsUpdated { .. })).await;

        f.store.set_state("tv", "playing", AttributeBag::new());
        f.store.set_state("radio", "paused", AttributeBag::new());
        let event = wait_for(&mut rx, |e| {
            matches!(e, CombinedEvent::StateWritten { trigger, .. } if trigger != OPTIONS_TRIGGER)
        })
        .await;
        let CombinedEvent::StateWritten { trigger, player, .. } = event else { unreachable!() };
        assert_eq!(trigger, "radio");
        assert_eq!(player.name, "Den Combo");
        assert_eq!(player.active_source.as_deref(), Some("radio"));
        assert_eq!(player.state, CombinedState::Idle);
    }

    #[tokio::test]
    async fn options_update_requires_name() {
        let f = fixture();
        let entry = f.manager.create_entry(input("Den", &["tv"])).unwrap();
        let err = f.manager.update_options(entry.entry_id, input("  ", &["radio"])).await.unwrap_err();
        assert_eq!(err, ConfigError::NameRequired);
        assert_eq!(f.manager.player(entry.entry_id).unwrap().sources(), vec!["tv".to_string()]);
    }

    #[tokio::test]
    async fn unload_releases_subscription() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        let entry = f.manager.create_entry(input("Den", &["tv"])).unwrap();
        assert_eq!(f.store.subscriber_count(), 1);

        f.manager.unload_entry(entry.entry_id).await.unwrap();
        assert_eq!(f.store.subscriber_count(), 0);
        assert!(f.manager.player(entry.entry_id).is_none());
        wait_for(&mut rx, |e| matches!(e, CombinedEvent::Removed { .. })).await;

        let err = f.manager.unload_entry(entry.entry_id).await.unwrap_err();
        assert_eq!(err, ConfigError::EntryNotFound(entry.entry_id));
    }

    #[tokio::test]
    async fn shutdown_stops_all_watches() {
        let f = fixture();
        f.manager.create_entry(input("Den", &["tv"])).unwrap();
        f.manager.create_entry(input("Kitchen", &["radio"])).unwrap();
        assert_eq!(f.store.subscriber_count(), 2);

        f.manager.shutdown().await;
        assert_eq!(f.store.subscriber_count(), 0);
        assert_eq!(f.manager.entries().len(), 2);
    }
}
