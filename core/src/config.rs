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

//! Configuration entries and the create/options flows that validate them.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::source_state::SourceId;

/// Unique identifier of a configuration entry.
pub type EntryId = Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("name_required")]
    NameRequired,

    #[error("sources_required")]
    SourcesRequired,

    #[error("already_configured: {0}")]
    AlreadyConfigured(String),

    #[error("Entry {0} not found")]
    EntryNotFound(EntryId),
}

/// User input for both the create and the options flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceId>,
}

/// Data captured when the entry was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryData {
    pub name: String,
    pub sources: Vec<SourceId>,
}

/// Overrides saved by the options flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryOptions {
    pub name: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: EntryId,
    pub unique_id: String,
    pub title: String,
    pub data: EntryData,
    #[serde(default)]
    pub options: EntryOptions,
}

impl ConfigEntry {
    /// Sources in priority order; options win over the initial data when set.
    pub fn effective_sources(&self) -> Vec<SourceId> {
        if self.options.sources.is_empty() {
            self.data.sources.clone()
        } else {
            self.options.sources.clone()
        }
    }

    /// Checks that the entry can back a combined player.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.title.trim().is_empty() {
            return Err(ConfigError::NameRequired);
        }
        if self.effective_sources().is_empty() {
            return Err(ConfigError::SourcesRequired);
        }
        Ok(())
    }
}

/// Unique id derived from the entry name, used to refuse configuring the same player twice.
pub fn unique_id_for_name(name: &str) -> String {
    format!("combined_{}", name.to_lowercase().replace(' ', "_"))
}

/// Lowercase the text and replace every run of non-alphanumeric characters with `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// Create flow: validates the input and builds a new entry.
pub fn create_entry<'a>(
    input: EntryInput,
    configured_unique_ids: impl IntoIterator<Item = &'a str>,
) -> Result<ConfigEntry, ConfigError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::NameRequired);
    }
    if input.sources.is_empty() {
        return Err(ConfigError::SourcesRequired);
    }

    let unique_id = unique_id_for_name(&name);
    if configured_unique_ids.into_iter().any(|id| id == unique_id) {
        return Err(ConfigError::AlreadyConfigured(unique_id));
    }

    Ok(ConfigEntry {
        entry_id: Uuid::new_v4(),
        unique_id,
        title: name.clone(),
        data: EntryData { name, sources: input.sources },
        options: EntryOptions::default(),
    })
}

/// Options flow: returns the entry with new options applied.
///
/// The name is required; an empty source list keeps the sources of the initial data.
pub fn update_options(entry: &ConfigEntry, input: EntryInput) -> Result<ConfigEntry, ConfigError> {
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::NameRequired);
    }

    let mut updated = entry.clone();
    updated.title = name.clone();
    updated.options = EntryOptions { name: Some(name), sources: input.sources };
    Ok(updated)
}

/// Prefill for the options form: current options, falling back to the initial data.
pub fn options_defaults(entry: &ConfigEntry) -> EntryInput {
    EntryInput {
        name: entry.options.name.clone().unwrap_or_else(|| entry.data.name.clone()),
        sources: entry.effective_sources(),
    }
}
