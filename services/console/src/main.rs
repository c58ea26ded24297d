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

mod cli;
mod console;
mod console_command;
mod settings;
mod simulated_dispatcher;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use combined_player_core::command::CommandDispatcher;
use combined_player_core::{CombinedManager, StateStore};
use combined_player_http_port::{HttpImageRetriever, RestCommandDispatcher};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::Cli;
use crate::console::{describe_event, Console, Flow};
use crate::console_command::{parse_line, HELP};
use crate::settings::ConsoleSettings;
use crate::simulated_dispatcher::SimulatedDispatcher;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let (config_path, required) = cli.config_path();
    let settings = ConsoleSettings::load(&config_path, required)?;

    let store = Arc::new(StateStore::new());

    let mut retriever = HttpImageRetriever::new();
    if let Some(url) = &settings.internal_url {
        retriever = retriever.with_internal_url(url);
    }
    if let Some(url) = &settings.external_url {
        retriever = retriever.with_external_url(url);
    }

    let dispatcher: Arc<dyn CommandDispatcher> = match &cli.rest_url {
        Some(url) => {
            info!("Forwarding commands to {}", url);
            let mut rest = RestCommandDispatcher::new(url);
            if let Some(token) = &cli.token {
                rest = rest.with_token(token);
            }
            Arc::new(rest)
        }
        None => Arc::new(SimulatedDispatcher::new(store.clone())),
    };

    let manager = Arc::new(CombinedManager::new(store.clone(), dispatcher, Arc::new(retriever)));
    let mut events = manager.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", describe_event(&event)),
                Err(RecvError::Lagged(skipped)) => info!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let console = Console::new(store, manager.clone());
    console.apply_settings(&settings);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match parse_line(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match console.execute(command).await {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => error!("{:#}", e),
                }
            }
        }
    }

    println!("Exiting...");
    manager.shutdown().await;
    printer.abort();
    Ok(())
}
