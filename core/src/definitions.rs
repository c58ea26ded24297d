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

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Serialize, Serializer};

/// Service domain commands are addressed to on the host.
pub const DOMAIN_MEDIA_PLAYER: &str = "media_player";

/// `StateWritten` triggers for writes the manager makes itself rather than a source change.
pub const SETUP_TRIGGER: &str = "entry_setup";
pub const OPTIONS_TRIGGER: &str = "options_update";

pub const PLAYER_ICON: &str = "mdi:television-play";
pub const IMAGE_ICON: &str = "mdi:image";

pub const DEFAULT_IMAGE_CONTENT_TYPE: &str = "image/jpeg";

// Attribute keys read from a source's attribute bag
pub const ATTR_FRIENDLY_NAME: &str = "friendly_name";
pub const ATTR_ENTITY_PICTURE: &str = "entity_picture";
pub const ATTR_MEDIA_IMAGE_URL: &str = "media_image_url";
pub const ATTR_SUPPORTED_FEATURES: &str = "supported_features";
pub const ATTR_MEDIA_TITLE: &str = "media_title";
pub const ATTR_MEDIA_ARTIST: &str = "media_artist";
pub const ATTR_MEDIA_ALBUM_NAME: &str = "media_album_name";
pub const ATTR_MEDIA_CONTENT_TYPE: &str = "media_content_type";
pub const ATTR_MEDIA_DURATION: &str = "media_duration";
pub const ATTR_MEDIA_POSITION: &str = "media_position";
pub const ATTR_MEDIA_POSITION_UPDATED_AT: &str = "media_position_updated_at";
pub const ATTR_MEDIA_SERIES_TITLE: &str = "media_series_title";
pub const ATTR_MEDIA_SEASON: &str = "media_season";
pub const ATTR_MEDIA_EPISODE: &str = "media_episode";
pub const ATTR_APP_NAME: &str = "app_name";
pub const ATTR_MEDIA_VOLUME_LEVEL: &str = "volume_level";
pub const ATTR_MEDIA_VOLUME_MUTED: &str = "is_volume_muted";
pub const ATTR_INPUT_SOURCE: &str = "source";
pub const ATTR_INPUT_SOURCE_LIST: &str = "source_list";
pub const ATTR_MEDIA_SHUFFLE: &str = "shuffle";
pub const ATTR_MEDIA_REPEAT: &str = "repeat";

/// Image attributes in order of preference when looking for a source's artwork.
pub const IMAGE_ATTRIBUTES: [&str; 2] = [ATTR_ENTITY_PICTURE, ATTR_MEDIA_IMAGE_URL];

/// Raw playback state reported by a source media player.
///
/// Anything a source reports outside of these values (`unavailable`, `unknown`, ...)
/// fails to parse and is treated as an inactive source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    Off,
    On,
    Idle,
    Playing,
    Paused,
    Standby,
    Buffering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedStatus(pub String);

impl fmt::Display for UnrecognizedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unrecognized player state: {:?}", self.0)
    }
}

impl FromStr for PlayerStatus {
    type Err = UnrecognizedStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(PlayerStatus::Off),
            "on" => Ok(PlayerStatus::On),
            "idle" => Ok(PlayerStatus::Idle),
            "playing" => Ok(PlayerStatus::Playing),
            "paused" => Ok(PlayerStatus::Paused),
            "standby" => Ok(PlayerStatus::Standby),
            "buffering" => Ok(PlayerStatus::Buffering),
            _ => Err(UnrecognizedStatus(s.to_string())),
        }
    }
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Off => "off",
            PlayerStatus::On => "on",
            PlayerStatus::Idle => "idle",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Paused => "paused",
            PlayerStatus::Standby => "standby",
            PlayerStatus::Buffering => "buffering",
        }
    }

    /// Ranking tier of this status, `None` for statuses that never win selection.
    pub fn tier(&self) -> Option<PriorityTier> {
        match self {
            PlayerStatus::Playing | PlayerStatus::Buffering => Some(PriorityTier::Active),
            PlayerStatus::Paused | PlayerStatus::Idle => Some(PriorityTier::Suspended),
            PlayerStatus::On => Some(PriorityTier::Powered),
            PlayerStatus::Off | PlayerStatus::Standby => None,
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority groups used to rank sources, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    /// Playing or buffering.
    Active,
    /// Paused or idle.
    Suspended,
    /// Switched on, nothing loaded.
    Powered,
}

impl PriorityTier {
    pub const ORDER: [PriorityTier; 3] = [PriorityTier::Active, PriorityTier::Suspended, PriorityTier::Powered];

    pub fn contains(&self, status: PlayerStatus) -> bool {
        status.tier() == Some(*self)
    }
}

/// State reported by the combined player itself.
///
/// This is coarser than the ranking tiers: everything playing or buffering is reported as
/// playing and everything paused or idle is reported as idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CombinedState {
    #[default]
    Off,
    Idle,
    Playing,
    On,
}

impl CombinedState {
    pub fn from_status(status: Option<PlayerStatus>) -> Self {
        match status {
            Some(PlayerStatus::Playing) | Some(PlayerStatus::Buffering) => CombinedState::Playing,
            Some(PlayerStatus::Paused) | Some(PlayerStatus::Idle) => CombinedState::Idle,
            Some(PlayerStatus::On) => CombinedState::On,
            Some(PlayerStatus::Off) | Some(PlayerStatus::Standby) | None => CombinedState::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CombinedState::Off => "off",
            CombinedState::Idle => "idle",
            CombinedState::Playing => "playing",
            CombinedState::On => "on",
        }
    }
}

impl fmt::Display for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CombinedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatMode {
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        }
    }
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(RepeatMode::Off),
            "all" => Ok(RepeatMode::All),
            "one" => Ok(RepeatMode::One),
            _ => Err(format!("Invalid repeat mode: {}", s)),
        }
    }
}

impl Serialize for RepeatMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

bitflags! {
    /// Control features advertised by a media player.
    #[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
    pub struct MediaPlayerFeature: u32 {
        const PAUSE = 1;
        const SEEK = 2;
        const VOLUME_SET = 4;
        const VOLUME_MUTE = 8;
        const PREVIOUS_TRACK = 16;
        const NEXT_TRACK = 32;
        const TURN_ON = 128;
        const TURN_OFF = 256;
        const PLAY_MEDIA = 512;
        const VOLUME_STEP = 1024;
        const SELECT_SOURCE = 2048;
        const STOP = 4096;
        const CLEAR_PLAYLIST = 8192;
        const PLAY = 16384;
        const SHUFFLE_SET = 32768;
        const SELECT_SOUND_MODE = 65536;
        const BROWSE_MEDIA = 131072;
        const REPEAT_SET = 262144;
        const GROUPING = 524288;
        const MEDIA_ANNOUNCE = 1048576;
        const MEDIA_ENQUEUE = 2097152;
        const SEARCH_MEDIA = 4194304;
    }
}

impl Serialize for MediaPlayerFeature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}
