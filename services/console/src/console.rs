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

use anyhow::{anyhow, Result};
use combined_player_core::config::{options_defaults, EntryId, EntryInput};
use combined_player_core::source_state::AttributeBag;
use combined_player_core::{CombinedEvent, CombinedManager, StateObserver, StateStore};
use log::{info, warn};
use serde_json::json;

use crate::console_command::{ConsoleCommand, HELP};
use crate::settings::ConsoleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes console commands against the state store and the combined manager.
pub struct Console {
    store: Arc<StateStore>,
    manager: Arc<CombinedManager>,
}

impl Console {
    pub fn new(store: Arc<StateStore>, manager: Arc<CombinedManager>) -> Self {
        Self { store, manager }
    }

    /// Seeds sources and creates entries from the configuration. Invalid entries are skipped.
    pub fn apply_settings(&self, settings: &ConsoleSettings) {
        for (source, initial) in &settings.sources {
            self.store.set_state(source, &initial.state, initial.attribute_bag());
        }
        for input in &settings.entries {
            match self.manager.create_entry(input.clone()) {
                Ok(entry) => info!("Configured {} ({})", entry.title, entry.entry_id),
                Err(e) => warn!("Skipping entry {:?}: {}", input.name, e),
            }
        }
    }

    fn entry_id(&self, name: &str) -> Result<EntryId> {
        self.manager.find_by_title(name).ok_or_else(|| anyhow!("No entry named {:?}", name))
    }

    fn show(&self, entry_id: EntryId) -> Result<String> {
        let player = self.manager.player(entry_id).ok_or_else(|| anyhow!("Entry {} is gone", entry_id))?;
        let image = self.manager.image(entry_id).ok_or_else(|| anyhow!("Entry {} is gone", entry_id))?;
        let view = json!({ "player": player.view(), "image": image.view() });
        Ok(serde_json::to_string_pretty(&view)?)
    }

    pub async fn execute(&self, command: ConsoleCommand) -> Result<Flow> {
        match command {
            ConsoleCommand::SetState { source, state, attributes } => {
                self.store.set_state(&source, &state, AttributeBag::from(attributes));
            }
            ConsoleCommand::SetAttribute { source, key, value } => {
                if !self.store.update_attributes(&source, |attrs| {
                    attrs.insert(key, value);
                }) {
                    return Err(anyhow!("Unknown source {}", source));
                }
            }
            ConsoleCommand::RemoveSource(source) => self.store.remove_state(&source),
            ConsoleCommand::AddEntry { name, sources } => {
                let entry = self.manager.create_entry(EntryInput { name, sources })?;
                println!("added {} as {}", entry.title, entry.unique_id);
            }
            ConsoleCommand::UpdateOptions { name, new_name, sources } => {
                let entry_id = self.entry_id(&name)?;
                let current = self.manager.entry(entry_id).ok_or_else(|| anyhow!("Entry {} is gone", entry_id))?;
                let mut input = options_defaults(&current);
                input.name = new_name;
                if !sources.is_empty() {
                    input.sources = sources;
                }
                let entry = self.manager.update_options(entry_id, input).await?;
                println!("{} now tracks {:?}", entry.title, entry.effective_sources());
            }
            ConsoleCommand::Unload(name) => {
                let entry = self.manager.unload_entry(self.entry_id(&name)?).await?;
                println!("unloaded {}", entry.title);
            }
            ConsoleCommand::Player { name, command } => {
                let entry_id = self.entry_id(&name)?;
                let player = self.manager.player(entry_id).ok_or_else(|| anyhow!("Entry {} is gone", entry_id))?;
                player.dispatch(command).await?;
            }
            ConsoleCommand::Show(Some(name)) => println!("{}", self.show(self.entry_id(&name)?)?),
            ConsoleCommand::Show(None) => {
                for entry in self.manager.entries() {
                    println!("{}", self.show(entry.entry_id)?);
                }
            }
            ConsoleCommand::Art(name) => {
                let image = self.manager.image(self.entry_id(&name)?).ok_or_else(|| anyhow!("Entry is gone"))?;
                match image.fetch_image().await {
                    Some(bytes) => println!("{} bytes of {}", bytes.len(), image.content_type()),
                    None => println!("no artwork"),
                }
            }
            ConsoleCommand::List => {
                for entry in self.manager.entries() {
                    println!("{}  {}  {:?}", entry.entry_id, entry.title, self.source_names(&entry.effective_sources()));
                }
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Friendly names of the given sources, falling back to their ids.
    pub fn source_names(&self, sources: &[String]) -> Vec<String> {
        sources
            .iter()
            .map(|s| {
                self.store
                    .state(s)
                    .and_then(|snapshot| snapshot.attributes.get::<String>("friendly_name"))
                    .unwrap_or_else(|| s.clone())
            })
            .collect()
    }
}

/// One line summary of an event for the console output.
pub fn describe_event(event: &CombinedEvent) -> String {
    match event {
        CombinedEvent::Added { title, .. } => format!("[added] {}", title),
        CombinedEvent::Removed { entry_id } => format!("[removed] {}", entry_id),
        CombinedEvent::OptionsUpdated { sources, .. } => format!("[options] sources {:?}", sources),
        CombinedEvent::StateWritten { trigger, player, image_changed, .. } => {
            let mut line = format!(
                "[state] {} is {} (active: {}, trigger: {})",
                player.name,
                player.state,
                player.active_source.as_deref().unwrap_or("-"),
                trigger
            );
            if let Some(title) = &player.attributes.media_title {
                line.push_str(&format!(" \"{}\"", title));
            }
            if *image_changed {
                line.push_str(" [artwork changed]");
            }
            line
        }
    }
}
