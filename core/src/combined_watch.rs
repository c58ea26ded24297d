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

use log::{debug, info};
use tokio::select;
use tokio::sync::broadcast;

use crate::combined_events::CombinedEvent;
use crate::combined_image::CombinedImage;
use crate::combined_player::CombinedPlayer;
use crate::service::{spawn_service, ServiceHandle};
use crate::source_state::SourceId;
use crate::state_observer::{StateChangedEvent, StateObserver};

/// Re-derives both entities and broadcasts the result as one `StateWritten`.
pub(crate) fn write_state(
    player: &CombinedPlayer,
    image: &CombinedImage,
    trigger: impl Into<SourceId>,
    events: &broadcast::Sender<CombinedEvent>,
) {
    let image_changed = image.refresh();
    let _ = events.send(CombinedEvent::StateWritten {
        entry_id: player.entry_id(),
        trigger: trigger.into(),
        player: player.view(),
        image: image.view(),
        image_changed,
    });
}

fn on_state_changed(
    player: &CombinedPlayer,
    image: &CombinedImage,
    event: StateChangedEvent,
    events: &broadcast::Sender<CombinedEvent>,
) {
    debug!("{}: {} changed", player.unique_id(), event.source);
    write_state(player, image, event.source, events);
}

/// Subscribes to the player's current sources and re-derives both entities on every change.
///
/// The subscription is registered before this function returns and released when the
/// returned handle is shut down.
pub fn run_combined_watch(
    player: Arc<CombinedPlayer>,
    image: Arc<CombinedImage>,
    observer: Arc<dyn StateObserver>,
    events: broadcast::Sender<CombinedEvent>,
) -> ServiceHandle {
    let sources = player.sources();
    let mut subscription = observer.subscribe(&sources);
    info!("{}: watching {} sources", player.unique_id(), sources.len());

    spawn_service(format!("{} watch", player.unique_id()), move |mut stop| async move {
        loop {
            select! {
                biased;
                _ = stop.signaled() => {
                    debug!("{}: watch stop requested", player.unique_id());
                    break;
                }
                event = subscription.next() => match event {
                    Some(event) => on_state_changed(&player, &image, event, &events),
                    None => {
                        info!("{}: state notifications closed", player.unique_id());
                        break;
                    }
                }
            }
        }
        subscription.unsubscribe();
    })
}
