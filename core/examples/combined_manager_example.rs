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

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use combined_player_core::artwork::{FetchedImage, ImageError, ImageRetriever};
use combined_player_core::command::{CommandArgs, CommandDispatcher, DispatchError, PlayerCommand};
use combined_player_core::config::EntryInput;
use combined_player_core::source_state::AttributeBag;
use combined_player_core::{CombinedEvent, CombinedManager, StateStore};
use log::info;

struct LoggingDispatcher;

#[async_trait]
impl CommandDispatcher for LoggingDispatcher {
    async fn invoke(&self, source: &str, command: &str, args: CommandArgs) -> Result<(), DispatchError> {
        info!("{} <- {} {:?}", source, command, args);
        Ok(())
    }
}

struct NoArtwork;

#[async_trait]
impl ImageRetriever for NoArtwork {
    async fn fetch_url(&self, url: &str, _timeout: Duration) -> Result<FetchedImage, ImageError> {
        Err(ImageError::InvalidUrl(url.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let store = Arc::new(StateStore::new());
    let manager = CombinedManager::new(store.clone(), Arc::new(LoggingDispatcher), Arc::new(NoArtwork));

    let mut events = manager.subscribe();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CombinedEvent::StateWritten { trigger, player, .. } => {
                    info!("{} changed: {} is {} via {:?}", trigger, player.name, player.state, player.active_source);
                }
                other => info!("{:?}", other),
            }
        }
    });

    let entry = manager.create_entry(EntryInput {
        name: "Living Room".to_string(),
        sources: vec!["media_player.tv".to_string(), "media_player.speaker".to_string()],
    })?;

    store.set_state("media_player.tv", "on", AttributeBag::new());
    store.set_state(
        "media_player.speaker",
        "playing",
        AttributeBag::new().with("media_title", "Blue in Green").with("media_artist", "Miles Davis"),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some(player) = manager.player(entry.entry_id) {
        player.dispatch(PlayerCommand::Pause).await?;
    }

    manager.unload_entry(entry.entry_id).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();
    Ok(())
}
