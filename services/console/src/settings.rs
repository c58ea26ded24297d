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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use combined_player_core::config::EntryInput;
use combined_player_core::source_state::{AttributeBag, SourceId};
use log::info;
use serde::Deserialize;
use serde_json::{Map, Value};

/// State a simulated source starts with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitialState {
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl InitialState {
    pub fn attribute_bag(&self) -> AttributeBag {
        AttributeBag::from(self.attributes.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub internal_url: Option<String>,
    pub external_url: Option<String>,
    pub entries: Vec<EntryInput>,
    pub sources: BTreeMap<SourceId, InitialState>,
}

impl ConsoleSettings {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid configuration")
    }

    /// Loads settings from `path`. A missing file yields defaults unless it was requested explicitly.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            info!("No configuration at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Cannot load {}", path.display()))
    }
}
