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

pub mod artwork;
pub mod combined_events;
pub mod combined_image;
pub mod combined_player;
pub mod command;
pub mod config;
pub mod definitions;
pub mod resolver;
pub mod service;
pub mod source_state;
pub mod state_observer;

mod combined_manager;
mod combined_watch;

pub use combined_manager::CombinedManager;
pub use combined_watch::run_combined_watch;
pub use combined_events::CombinedEvent;
pub use combined_image::CombinedImage;
pub use combined_player::CombinedPlayer;
pub use resolver::{resolve, ActiveSelection};
pub use state_observer::{StateObserver, StateStore};
