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

use serde_json::{Map, Value};

use crate::definitions::{PlayerStatus, RepeatMode, IMAGE_ATTRIBUTES};

/// Identifier of a source media player owned by the host (e.g. `media_player.living_room`).
pub type SourceId = String;

/// Conversion from a raw attribute value.
///
/// A value of the wrong shape converts to `None`, the same as a missing attribute.
pub trait AttributeValue: Sized {
    fn from_attribute(value: &Value) -> Option<Self>;
}

impl AttributeValue for String {
    fn from_attribute(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            // seasons and episodes are reported as numbers by some integrations
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

impl AttributeValue for f64 {
    fn from_attribute(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl AttributeValue for u64 {
    fn from_attribute(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl AttributeValue for bool {
    fn from_attribute(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl AttributeValue for Vec<String> {
    fn from_attribute(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

impl AttributeValue for RepeatMode {
    fn from_attribute(value: &Value) -> Option<Self> {
        value.as_str()?.parse().ok()
    }
}

impl AttributeValue for Value {
    fn from_attribute(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Attribute bag of a source, as reported by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag(Map<String, Value>);

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: AttributeValue>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(T::from_attribute)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }
}

impl From<Map<String, Value>> for AttributeBag {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Current reported state of a source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSnapshot {
    pub raw_state: String,
    pub attributes: AttributeBag,
}

impl SourceSnapshot {
    pub fn new(raw_state: impl Into<String>, attributes: AttributeBag) -> Self {
        Self { raw_state: raw_state.into(), attributes }
    }

    /// Parsed playback status, `None` when the raw state is not a recognized value.
    pub fn status(&self) -> Option<PlayerStatus> {
        self.raw_state.parse().ok()
    }

    /// Best advertised image reference: a proxied or direct URL, absolute or host-relative.
    pub fn image_reference(&self) -> Option<String> {
        IMAGE_ATTRIBUTES
            .iter()
            .filter_map(|key| self.attributes.get::<String>(key))
            .find(|url| !url.is_empty())
    }
}
