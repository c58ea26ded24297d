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

use crate::combined_image::ImageView;
use crate::combined_player::PlayerView;
use crate::config::EntryId;
use crate::source_state::SourceId;

/// Events emitted by the combined manager about entries and their entities.
#[derive(Debug, Clone)]
pub enum CombinedEvent {
    /// An entry was set up and its entities are live.
    Added { entry_id: EntryId, title: String },

    /// An entry was unloaded; its subscription has been released.
    Removed { entry_id: EntryId },

    /// Options of an entry changed; entities now track the new source list.
    OptionsUpdated { entry_id: EntryId, sources: Vec<SourceId> },

    /// A tracked source changed and the combined entities were re-derived.
    StateWritten {
        entry_id: EntryId,
        trigger: SourceId,
        player: PlayerView,
        image: ImageView,
        image_changed: bool,
    },
}
