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

use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use serde::Serialize;

use crate::command::{CommandDispatcher, DispatchError, PlayerCommand};
use crate::config::{ConfigEntry, EntryId};
use crate::definitions::*;
use crate::resolver::{resolve, ActiveSelection};
use crate::source_state::{AttributeValue, SourceId};
use crate::state_observer::StateObserver;

/// Media attributes mirrored from the active source. Every field is unset when there is no
/// active source or the active source does not report it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaAttributes {
    pub media_title: Option<String>,
    pub media_artist: Option<String>,
    pub media_album_name: Option<String>,
    pub media_content_type: Option<String>,
    pub media_duration: Option<f64>,
    pub media_position: Option<f64>,
    pub media_position_updated_at: Option<String>,
    pub media_series_title: Option<String>,
    pub media_season: Option<String>,
    pub media_episode: Option<String>,
    pub app_name: Option<String>,
    pub volume_level: Option<f64>,
    pub is_volume_muted: Option<bool>,
    pub source: Option<String>,
    pub source_list: Option<Vec<String>>,
    pub shuffle: Option<bool>,
    pub repeat: Option<RepeatMode>,
    pub supported_features: MediaPlayerFeature,
    pub entity_picture: Option<String>,
}

impl MediaAttributes {
    fn from_selection(selection: Option<&ActiveSelection>) -> Self {
        let Some(selection) = selection else { return Self::default(); };
        let attrs = &selection.snapshot.attributes;
        Self {
            media_title: attrs.get(ATTR_MEDIA_TITLE),
            media_artist: attrs.get(ATTR_MEDIA_ARTIST),
            media_album_name: attrs.get(ATTR_MEDIA_ALBUM_NAME),
            media_content_type: attrs.get(ATTR_MEDIA_CONTENT_TYPE),
            media_duration: attrs.get(ATTR_MEDIA_DURATION),
            media_position: attrs.get(ATTR_MEDIA_POSITION),
            media_position_updated_at: attrs.get(ATTR_MEDIA_POSITION_UPDATED_AT),
            media_series_title: attrs.get(ATTR_MEDIA_SERIES_TITLE),
            media_season: attrs.get(ATTR_MEDIA_SEASON),
            media_episode: attrs.get(ATTR_MEDIA_EPISODE),
            app_name: attrs.get(ATTR_APP_NAME),
            volume_level: attrs.get(ATTR_MEDIA_VOLUME_LEVEL),
            is_volume_muted: attrs.get(ATTR_MEDIA_VOLUME_MUTED),
            source: attrs.get(ATTR_INPUT_SOURCE),
            source_list: attrs.get(ATTR_INPUT_SOURCE_LIST),
            shuffle: attrs.get(ATTR_MEDIA_SHUFFLE),
            repeat: attrs.get(ATTR_MEDIA_REPEAT),
            supported_features: supported_features_of(selection),
            entity_picture: attrs.get(ATTR_ENTITY_PICTURE),
        }
    }
}

fn supported_features_of(selection: &ActiveSelection) -> MediaPlayerFeature {
    selection
        .snapshot
        .attributes
        .get::<u64>(ATTR_SUPPORTED_FEATURES)
        .and_then(|bits| u32::try_from(bits).ok())
        .map(MediaPlayerFeature::from_bits_retain)
        .unwrap_or_default()
}

/// Everything the combined player publishes when its state is written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub state: CombinedState,
    pub available: bool,
    pub attributes: MediaAttributes,
    pub active_source: Option<SourceId>,
    pub sources: Vec<SourceId>,
}

/// Virtual media player that mirrors whichever configured source is currently most active.
pub struct CombinedPlayer {
    entry_id: EntryId,
    unique_id: String,
    name: RwLock<String>,
    sources: RwLock<Vec<SourceId>>,
    observer: Arc<dyn StateObserver>,
    dispatcher: Arc<dyn CommandDispatcher>,
}

impl CombinedPlayer {
    pub fn new(entry: &ConfigEntry, observer: Arc<dyn StateObserver>, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            entry_id: entry.entry_id,
            unique_id: entry.entry_id.to_string(),
            name: RwLock::new(entry.title.clone()),
            sources: RwLock::new(entry.effective_sources()),
            observer,
            dispatcher,
        }
    }

    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn icon(&self) -> &'static str {
        PLAYER_ICON
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Re-reads name and effective sources from an updated entry.
    pub fn apply_entry(&self, entry: &ConfigEntry) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = entry.title.clone();
        *self.sources.write().unwrap_or_else(PoisonError::into_inner) = entry.effective_sources();
    }

    pub fn active_selection(&self) -> Option<ActiveSelection> {
        let sources = self.sources();
        resolve(&sources, |id| self.observer.state(id))
    }

    pub fn active_source(&self) -> Option<SourceId> {
        self.active_selection().map(|selection| selection.source)
    }

    /// The combined player never reports itself unavailable; no active source is reported as off.
    pub fn available(&self) -> bool {
        true
    }

    pub fn state(&self) -> CombinedState {
        CombinedState::from_status(self.active_selection().map(|selection| selection.status))
    }

    /// Reads a single attribute from the active source.
    pub fn attribute<T: AttributeValue>(&self, key: &str) -> Option<T> {
        self.active_selection().and_then(|selection| selection.snapshot.attributes.get(key))
    }

    pub fn attributes(&self) -> MediaAttributes {
        MediaAttributes::from_selection(self.active_selection().as_ref())
    }

    pub fn supported_features(&self) -> MediaPlayerFeature {
        self.active_selection().map(|s| supported_features_of(&s)).unwrap_or_default()
    }

    /// Snapshot of state, attributes and diagnostics from a single resolution.
    pub fn view(&self) -> PlayerView {
        let sources = self.sources();
        let selection = resolve(&sources, |id| self.observer.state(id));
        PlayerView {
            unique_id: self.unique_id.clone(),
            name: self.name(),
            icon: self.icon(),
            state: CombinedState::from_status(selection.as_ref().map(|s| s.status)),
            available: self.available(),
            attributes: MediaAttributes::from_selection(selection.as_ref()),
            active_source: selection.map(|s| s.source),
            sources,
        }
    }

    /// Forwards a command to the active source and waits until it completes.
    ///
    /// Without an active source the command is dropped. Failures of the source are returned to
    /// the caller unchanged.
    pub async fn dispatch(&self, command: PlayerCommand) -> Result<(), DispatchError> {
        let Some(target) = self.active_source() else {
            debug!("{}: no active source, ignoring {}", self.unique_id, command.name());
            return Ok(());
        };
        debug!("{}: forwarding {} to {}", self.unique_id, command.name(), target);
        self.dispatcher.invoke(&target, command.name(), command.args()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandArgs;
    use crate::config::{create_entry, EntryInput};
    use crate::source_state::AttributeBag;
    use crate::state_observer::StateStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct InvokeCall {
        source: String,
        command: String,
        args: CommandArgs,
    }

    #[derive(Default)]
    struct MockDispatcher {
        calls: Mutex<Vec<InvokeCall>>,
        fail_with: Option<DispatchError>,
    }

    impl MockDispatcher {
        fn take(&self) -> Vec<InvokeCall> {
            std::mem::take(&mut self.calls.lock().unwrap())
        }
    }

    #[async_trait]
    impl CommandDispatcher for MockDispatcher {
        async fn invoke(&self, source: &str, command: &str, args: CommandArgs) -> Result<(), DispatchError> {
            self.calls.lock().unwrap().push(InvokeCall {
                source: source.to_string(),
                command: command.to_string(),
                args,
            });
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn build(sources: &[&str], dispatcher: Arc<MockDispatcher>) -> (CombinedPlayer, Arc<StateStore>) {
        let store = Arc::new(StateStore::new());
        let entry = create_entry(
            EntryInput { name: "Living Room".into(), sources: sources.iter().map(|s| s.to_string()).collect() },
            Vec::<&str>::new(),
        )
        .unwrap();
        (CombinedPlayer::new(&entry, store.clone(), dispatcher), store)
    }

    #[test]
    fn mirrors_playing_source_over_paused_one() {
        let (player, store) = build(&["a", "b", "c"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "off", AttributeBag::new().with("media_title", "Off title"));
        store.set_state("b", "playing", AttributeBag::new().with("media_title", "Song B").with("volume_level", 0.4));
        store.set_state("c", "paused", AttributeBag::new().with("media_title", "Song C"));

        assert_eq!(player.state(), CombinedState::Playing);
        assert_eq!(player.active_source().as_deref(), Some("b"));
        let attributes = player.attributes();
        assert_eq!(attributes.media_title.as_deref(), Some("Song B"));
        assert_eq!(attributes.volume_level, Some(0.4));
        assert_eq!(attributes.media_artist, None);
    }

    #[test]
    fn paused_and_idle_report_idle_with_earliest_winning() {
        let (player, store) = build(&["a", "b"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "paused", AttributeBag::new());
        store.set_state("b", "idle", AttributeBag::new());
        assert_eq!(player.active_source().as_deref(), Some("a"));
        assert_eq!(player.state(), CombinedState::Idle);
    }

    #[test]
    fn nothing_active_reports_off_but_stays_available() {
        let (player, store) = build(&["a", "b"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "off", AttributeBag::new());
        store.set_state("b", "off", AttributeBag::new());
        assert_eq!(player.state(), CombinedState::Off);
        assert!(player.available());
        assert_eq!(player.attributes(), MediaAttributes::default());
        assert_eq!(player.supported_features(), MediaPlayerFeature::empty());
    }

    #[test]
    fn unrecognized_state_of_first_source_falls_through() {
        let (player, store) = build(&["a", "b"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "unavailable", AttributeBag::new());
        store.set_state("b", "on", AttributeBag::new().with("app_name", "Netflix"));
        assert_eq!(player.state(), CombinedState::On);
        assert_eq!(player.attributes().app_name.as_deref(), Some("Netflix"));
    }

    #[test]
    fn attributes_are_read_live() {
        let (player, store) = build(&["a"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "playing", AttributeBag::new().with("media_title", "First"));
        assert_eq!(player.attribute::<String>("media_title").as_deref(), Some("First"));

        store.update_attributes("a", |attrs| {
            attrs.insert("media_title", "Second");
        });
        assert_eq!(player.attribute::<String>("media_title").as_deref(), Some("Second"));
    }

    #[test]
    fn supported_features_tolerate_bad_values() {
        let (player, store) = build(&["a"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "playing", AttributeBag::new().with("supported_features", 16385));
        assert_eq!(player.supported_features(), MediaPlayerFeature::PLAY | MediaPlayerFeature::PAUSE);

        store.update_attributes("a", |attrs| {
            attrs.insert("supported_features", "garbage");
        });
        assert_eq!(player.supported_features(), MediaPlayerFeature::empty());
    }

    #[test]
    fn view_contains_diagnostics() {
        let (player, store) = build(&["a", "b"], Arc::new(MockDispatcher::default()));
        store.set_state("b", "buffering", AttributeBag::new().with("repeat", "all").with("source_list", json!(["TV", "Radio"])));

        let view = player.view();
        assert_eq!(view.name, "Living Room");
        assert_eq!(view.icon, "mdi:television-play");
        assert_eq!(view.state, CombinedState::Playing);
        assert_eq!(view.active_source.as_deref(), Some("b"));
        assert_eq!(view.sources, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(view.attributes.repeat, Some(RepeatMode::All));
        assert_eq!(view.attributes.source_list, Some(vec!["TV".to_string(), "Radio".to_string()]));
        assert_eq!(player.entry_id().to_string(), view.unique_id);
    }

    #[tokio::test]
    async fn commands_go_to_active_source() {
        let dispatcher = Arc::new(MockDispatcher::default());
        let (player, store) = build(&["a", "b"], dispatcher.clone());
        store.set_state("a", "idle", AttributeBag::new());
        store.set_state("b", "playing", AttributeBag::new());

        player.dispatch(PlayerCommand::SetVolume(0.3)).await.unwrap();
        player.dispatch(PlayerCommand::Pause).await.unwrap();

        let calls = dispatcher.take();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].source, "b");
        assert_eq!(calls[0].command, "volume_set");
        assert_eq!(calls[0].args["volume_level"], json!(0.3));
        assert_eq!(calls[1].command, "media_pause");

        // Once b stops, a is the winner
        store.set_raw_state("b", "off");
        player.dispatch(PlayerCommand::Play).await.unwrap();
        assert_eq!(dispatcher.take()[0].source, "a");
    }

    #[tokio::test]
    async fn commands_without_active_source_are_dropped() {
        let dispatcher = Arc::new(MockDispatcher {
            fail_with: Some(DispatchError::SourceNotFound("x".into())),
            ..Default::default()
        });
        let (player, store) = build(&["a", "b"], dispatcher.clone());
        store.set_state("a", "off", AttributeBag::new());
        store.set_state("b", "off", AttributeBag::new());

        assert_eq!(player.dispatch(PlayerCommand::Toggle).await, Ok(()));
        assert!(dispatcher.take().is_empty());
    }

    #[tokio::test]
    async fn dispatch_failures_propagate() {
        let error = DispatchError::Failed {
            source_id: "a".into(),
            command: "media_play".into(),
            reason: "device offline".into(),
        };
        let dispatcher = Arc::new(MockDispatcher { fail_with: Some(error.clone()), ..Default::default() });
        let (player, store) = build(&["a"], dispatcher);
        store.set_state("a", "paused", AttributeBag::new());

        assert_eq!(player.dispatch(PlayerCommand::Play).await, Err(error));
    }

    #[test]
    fn apply_entry_replaces_sources_and_name() {
        let (player, store) = build(&["a"], Arc::new(MockDispatcher::default()));
        store.set_state("a", "playing", AttributeBag::new());
        store.set_state("b", "idle", AttributeBag::new());

        let entry = create_entry(EntryInput { name: "Den".into(), sources: vec!["b".into()] }, Vec::<&str>::new()).unwrap();
        player.apply_entry(&entry);
        assert_eq!(player.name(), "Den");
        assert_eq!(player.active_source().as_deref(), Some("b"));
        assert_eq!(player.state(), CombinedState::Idle);
    }
}
