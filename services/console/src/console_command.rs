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

//! Line commands understood by the interactive console.

use combined_player_core::command::{CommandArgs, PlayerCommand};
use combined_player_core::definitions::RepeatMode;
use combined_player_core::source_state::SourceId;
use serde_json::{Map, Value};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  state <source> <state> [json attributes]   write a source state
  attr <source> <key> <json value>           change one source attribute
  remove <source>                            remove a source
  add <name> <source,source,...>             create a combined entry
  options <name> <new name> [sources]        update an entry's options
  unload <name>                              remove a combined entry
  cmd <name> <command> [args]                send a player command
  show [name]                                print combined entities
  art <name>                                 fetch the current cover image
  list                                       list configured entries
  help | quit";

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid value for {what}: {value}")]
    InvalidValue { what: &'static str, value: String },

    #[error("Unterminated quote")]
    UnterminatedQuote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    SetState { source: SourceId, state: String, attributes: Map<String, Value> },
    SetAttribute { source: SourceId, key: String, value: Value },
    RemoveSource(SourceId),
    AddEntry { name: String, sources: Vec<SourceId> },
    UpdateOptions { name: String, new_name: String, sources: Vec<SourceId> },
    Unload(String),
    Player { name: String, command: PlayerCommand },
    Show(Option<String>),
    Art(String),
    List,
    Help,
    Quit,
}

/// Splits on whitespace; double quotes group words. The tail after `max - 1` tokens is kept whole.
fn tokenize(line: &str, max: usize) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut rest = line.trim_start();
    while !rest.is_empty() {
        if tokens.len() + 1 == max {
            tokens.push(unquote(rest.trim_end()).to_string());
            break;
        }
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').ok_or(ParseError::UnterminatedQuote)?;
            tokens.push(quoted[..end].to_string());
            rest = quoted[end + 1..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            tokens.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }
    Ok(tokens)
}

fn arg(tokens: &[String], index: usize, what: &'static str) -> Result<String, ParseError> {
    tokens.get(index).cloned().ok_or(ParseError::MissingArgument(what))
}

fn parse_value<T: std::str::FromStr>(value: &str, what: &'static str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue { what, value: value.to_string() })
}

/// JSON when it parses, plain text otherwise.
fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

fn parse_sources(value: &str) -> Vec<SourceId> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn parse_player_command(name: &str, args: &[String]) -> Result<PlayerCommand, ParseError> {
    let first = || arg(args, 0, "command argument");
    let command = match name {
        "play" => PlayerCommand::Play,
        "pause" => PlayerCommand::Pause,
        "stop" => PlayerCommand::Stop,
        "next" => PlayerCommand::NextTrack,
        "previous" | "prev" => PlayerCommand::PreviousTrack,
        "volume" => PlayerCommand::SetVolume(parse_value(&first()?, "volume")?),
        "volume_up" => PlayerCommand::VolumeUp,
        "volume_down" => PlayerCommand::VolumeDown,
        "mute" => PlayerCommand::Mute(parse_value(&first()?, "mute")?),
        "seek" => PlayerCommand::Seek(parse_value(&first()?, "position")?),
        "source" => PlayerCommand::SelectSource(first()?),
        "shuffle" => PlayerCommand::SetShuffle(parse_value(&first()?, "shuffle")?),
        "repeat" => PlayerCommand::SetRepeat(parse_value::<RepeatMode>(&first()?, "repeat")?),
        "on" => PlayerCommand::TurnOn,
        "off" => PlayerCommand::TurnOff,
        "toggle" => PlayerCommand::Toggle,
        "play_media" => PlayerCommand::PlayMedia {
            media_type: first()?,
            media_id: arg(args, 1, "media id")?,
            extra: CommandArgs::new(),
        },
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let command = match verb {
        "" => return Err(ParseError::Empty),
        "state" => {
            let t = tokenize(rest, 3)?;
            let attributes = match t.get(2).map(|json| parse_json(json)) {
                Some(Value::Object(map)) => map,
                Some(_) => return Err(ParseError::InvalidValue { what: "attributes", value: t[2].clone() }),
                None => Map::new(),
            };
            ConsoleCommand::SetState { source: arg(&t, 0, "source")?, state: arg(&t, 1, "state")?, attributes }
        }
        "attr" => {
            let t = tokenize(rest, 3)?;
            ConsoleCommand::SetAttribute {
                source: arg(&t, 0, "source")?,
                key: arg(&t, 1, "key")?,
                value: parse_json(&arg(&t, 2, "value")?),
            }
        }
        "remove" => ConsoleCommand::RemoveSource(arg(&tokenize(rest, 1)?, 0, "source")?),
        "add" => {
            let t = tokenize(rest, 2)?;
            ConsoleCommand::AddEntry { name: arg(&t, 0, "name")?, sources: parse_sources(&arg(&t, 1, "sources")?) }
        }
        "options" => {
            let t = tokenize(rest, 3)?;
            ConsoleCommand::UpdateOptions {
                name: arg(&t, 0, "name")?,
                new_name: arg(&t, 1, "new name")?,
                sources: t.get(2).map(|s| parse_sources(s)).unwrap_or_default(),
            }
        }
        "unload" => ConsoleCommand::Unload(arg(&tokenize(rest, 1)?, 0, "name")?),
        "cmd" => {
            let t = tokenize(rest, 0)?;
            let name = arg(&t, 0, "name")?;
            let command = arg(&t, 1, "command")?;
            ConsoleCommand::Player { command: parse_player_command(&command, &t[2..])?, name }
        }
        "show" => ConsoleCommand::Show(tokenize(rest, 1)?.into_iter().next()),
        "art" => ConsoleCommand::Art(arg(&tokenize(rest, 1)?, 0, "name")?),
        "list" => ConsoleCommand::List,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}
