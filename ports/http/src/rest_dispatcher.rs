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
use combined_player_core::command::{CommandArgs, CommandDispatcher, DispatchError};
use combined_player_core::definitions::DOMAIN_MEDIA_PLAYER;
use log::debug;
use reqwest::StatusCode;
use serde_json::Value;

/// Forwards commands as REST service calls: `POST <base>/api/services/media_player/<command>`
/// with the source id in the `entity_id` field of the body.
pub struct RestCommandDispatcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestCommandDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn service_url(&self, command: &str) -> String {
        format!("{}/api/services/{}/{}", self.base_url.trim_end_matches('/'), DOMAIN_MEDIA_PLAYER, command)
    }
}

#[async_trait]
impl CommandDispatcher for RestCommandDispatcher {
    async fn invoke(&self, source: &str, command: &str, args: CommandArgs) -> Result<(), DispatchError> {
        let failed = |reason: String| DispatchError::Failed {
            source_id: source.to_string(),
            command: command.to_string(),
            reason,
        };

        let mut body = args;
        body.insert("entity_id".to_string(), Value::String(source.to_string()));

        let url = self.service_url(command);
        debug!("POST {} {:?}", url, body);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(DispatchError::SourceNotFound(source.to_string())),
            StatusCode::BAD_REQUEST => Err(DispatchError::NotSupported {
                source_id: source.to_string(),
                command: command.to_string(),
            }),
            status if status.is_success() => Ok(()),
            status => Err(failed(format!("HTTP {}", status.as_u16()))),
        }
    }
}
