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

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::definitions::RepeatMode;

/// Arguments passed along with a command, keyed the way the source's command expects them.
pub type CommandArgs = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Source {0} not found")]
    SourceNotFound(String),

    #[error("Command {command} not supported by {source_id}")]
    NotSupported { source_id: String, command: String },

    #[error("Command {command} failed on {source_id}: {reason}")]
    Failed { source_id: String, command: String, reason: String },
}

/// Executes a named command against a specific source and waits until it completes.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn invoke(&self, source: &str, command: &str, args: CommandArgs) -> Result<(), DispatchError>;
}

/// Control commands accepted by the combined player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Stop,
    NextTrack,
    PreviousTrack,
    SetVolume(f64),
    VolumeUp,
    VolumeDown,
    Mute(bool),
    Seek(f64),
    PlayMedia { media_type: String, media_id: String, extra: CommandArgs },
    SelectSource(String),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
    TurnOn,
    TurnOff,
    Toggle,
}

impl PlayerCommand {
    /// Command name as understood by the source.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerCommand::Play => "media_play",
            PlayerCommand::Pause => "media_pause",
            PlayerCommand::Stop => "media_stop",
            PlayerCommand::NextTrack => "media_next_track",
            PlayerCommand::PreviousTrack => "media_previous_track",
            PlayerCommand::SetVolume(_) => "volume_set",
            PlayerCommand::VolumeUp => "volume_up",
            PlayerCommand::VolumeDown => "volume_down",
            PlayerCommand::Mute(_) => "volume_mute",
            PlayerCommand::Seek(_) => "media_seek",
            PlayerCommand::PlayMedia { .. } => "play_media",
            PlayerCommand::SelectSource(_) => "select_source",
            PlayerCommand::SetShuffle(_) => "shuffle_set",
            PlayerCommand::SetRepeat(_) => "repeat_set",
            PlayerCommand::TurnOn => "turn_on",
            PlayerCommand::TurnOff => "turn_off",
            PlayerCommand::Toggle => "toggle",
        }
    }

    pub fn args(&self) -> CommandArgs {
        let mut args = CommandArgs::new();
        match self {
            PlayerCommand::SetVolume(volume) => {
                args.insert("volume_level".into(), json!(volume));
            }
            PlayerCommand::Mute(mute) => {
                args.insert("is_volume_muted".into(), json!(mute));
            }
            PlayerCommand::Seek(position) => {
                args.insert("seek_position".into(), json!(position));
            }
            PlayerCommand::PlayMedia { media_type, media_id, extra } => {
                args.insert("media_content_type".into(), json!(media_type));
                args.insert("media_content_id".into(), json!(media_id));
                for (key, value) in extra {
                    args.insert(key.clone(), value.clone());
                }
            }
            PlayerCommand::SelectSource(source) => {
                args.insert("source".into(), json!(source));
            }
            PlayerCommand::SetShuffle(shuffle) => {
                args.insert("shuffle".into(), json!(shuffle));
            }
            PlayerCommand::SetRepeat(repeat) => {
                args.insert("repeat".into(), json!(repeat.as_str()));
            }
            _ => {}
        }
        args
    }
}
