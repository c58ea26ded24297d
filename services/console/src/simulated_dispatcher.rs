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

use async_trait::async_trait;
use combined_player_core::command::{CommandArgs, CommandDispatcher, DispatchError};
use combined_player_core::definitions::{
    PlayerStatus, ATTR_INPUT_SOURCE, ATTR_MEDIA_POSITION, ATTR_MEDIA_REPEAT, ATTR_MEDIA_SHUFFLE,
    ATTR_MEDIA_VOLUME_LEVEL, ATTR_MEDIA_VOLUME_MUTED,
};
use combined_player_core::source_state::AttributeBag;
use combined_player_core::{StateObserver, StateStore};
use log::info;
use serde_json::Value;

const VOLUME_STEP: f64 = 0.05;

/// Applies commands to the in-memory store as a well behaved source would.
pub struct SimulatedDispatcher {
    store: Arc<StateStore>,
}

impl SimulatedDispatcher {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }
}

fn copy_arg(args: &CommandArgs, arg: &str, attrs: &mut AttributeBag, key: &str) {
    if let Some(value) = args.get(arg) {
        attrs.insert(key, value.clone());
    }
}

fn step_volume(attrs: &mut AttributeBag, delta: f64) {
    let volume = attrs.get::<f64>(ATTR_MEDIA_VOLUME_LEVEL).unwrap_or(0.0);
    attrs.insert(ATTR_MEDIA_VOLUME_LEVEL, (volume + delta).clamp(0.0, 1.0));
}

#[async_trait]
impl CommandDispatcher for SimulatedDispatcher {
    async fn invoke(&self, source: &str, command: &str, args: CommandArgs) -> Result<(), DispatchError> {
        let current = self.store.state(source).ok_or_else(|| DispatchError::SourceNotFound(source.to_string()))?;
        info!("{} <- {} {}", source, command, Value::Object(args.clone()));

        let mut raw_state = current.raw_state.clone();
        let mut attrs = current.attributes.clone();
        match command {
            "media_play" | "play_media" => raw_state = PlayerStatus::Playing.to_string(),
            "media_pause" => raw_state = PlayerStatus::Paused.to_string(),
            "media_stop" => raw_state = PlayerStatus::Idle.to_string(),
            "turn_on" => raw_state = PlayerStatus::On.to_string(),
            "turn_off" => raw_state = PlayerStatus::Off.to_string(),
            "toggle" => {
                let status = if current.status() == Some(PlayerStatus::Off) { PlayerStatus::On } else { PlayerStatus::Off };
                raw_state = status.to_string();
            }
            "media_next_track" | "media_previous_track" => {
                attrs.insert(ATTR_MEDIA_POSITION, 0.0);
            }
            "volume_set" => copy_arg(&args, "volume_level", &mut attrs, ATTR_MEDIA_VOLUME_LEVEL),
            "volume_up" => step_volume(&mut attrs, VOLUME_STEP),
            "volume_down" => step_volume(&mut attrs, -VOLUME_STEP),
            "volume_mute" => copy_arg(&args, "is_volume_muted", &mut attrs, ATTR_MEDIA_VOLUME_MUTED),
            "media_seek" => copy_arg(&args, "seek_position", &mut attrs, ATTR_MEDIA_POSITION),
            "select_source" => copy_arg(&args, "source", &mut attrs, ATTR_INPUT_SOURCE),
            "shuffle_set" => copy_arg(&args, "shuffle", &mut attrs, ATTR_MEDIA_SHUFFLE),
            "repeat_set" => copy_arg(&args, "repeat", &mut attrs, ATTR_MEDIA_REPEAT),
            _ => {
                return Err(DispatchError::NotSupported { source_id: source.to_string(), command: command.to_string() })
            }
        }

        if command == "play_media" {
            copy_arg(&args, "media_content_id", &mut attrs, "media_content_id");
            copy_arg(&args, "media_content_type", &mut attrs, "media_content_type");
        }

        self.store.set_state(source, &raw_state, attrs);
        Ok(())
    }
}
