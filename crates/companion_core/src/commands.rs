//! Chat command parsing and the follow/stop-follow authorization rules.

use shared::{domain::EntityId, protocol::ChatEvent};
use thiserror::Error;
use tracing::{info, warn};

use crate::avatar::AvatarState;

pub const WORLD_DATA_PLACEHOLDER: &str = "World data command is not implemented yet.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR_INVALID_COMMAND")]
    InvalidCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandName {
    Follow,
    StopFollow,
    WorldData,
    Unrecognized(String),
}

impl CommandName {
    fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "f" => Self::Follow,
            "fs" => Self::StopFollow,
            "worlddata" => Self::WorldData,
            _ => Self::Unrecognized(token.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: CommandName,
    pub args: Vec<String>,
}

impl Command {
    /// Returns `None` for text that is not a command (see [`is_command`]).
    pub fn parse(text: &str) -> Option<Self> {
        if !is_command(text) {
            return None;
        }
        let mut tokens = text[1..].split(' ');
        let name = CommandName::from_token(tokens.next().unwrap_or_default());
        Some(Self {
            name,
            args: tokens.map(str::to_string).collect(),
        })
    }
}

/// A single leading `!` marks a command; `!!` escapes literal text.
pub fn is_command(text: &str) -> bool {
    text.starts_with('!') && text.len() > 1 && !text.starts_with("!!")
}

/// Applies `command` for `sender`, mutating `state` where the rules allow.
pub fn dispatch(
    command: &Command,
    sender: &ChatEvent,
    state: &mut AvatarState,
) -> Result<String, CommandError> {
    match &command.name {
        CommandName::Follow => Ok(follow(sender, state)),
        CommandName::StopFollow => Ok(stop_follow(sender, state)),
        CommandName::WorldData => Ok(WORLD_DATA_PLACEHOLDER.to_string()),
        CommandName::Unrecognized(_) => Err(CommandError::InvalidCommand),
    }
}

/// Runs the chat line in `message` if it is a command and returns the reply to send back.
pub fn handle_command(message: &ChatEvent, state: &mut AvatarState) -> Option<String> {
    let command = Command::parse(&message.msg)?;
    match dispatch(&command, message, state) {
        Ok(reply) => {
            info!("{reply}");
            Some(reply)
        }
        Err(err) => {
            warn!("Error: {err} for command: {}", message.msg);
            None
        }
    }
}

fn follow(sender: &ChatEvent, state: &mut AvatarState) -> String {
    let name = &sender.name;
    if state.target_id == sender.id {
        format!("I am already following you, {name}")
    } else if sender.is_admin() {
        state.target_id = sender.id;
        format!("Following you, {name}!")
    } else if state.is_following() {
        format!("I cannot follow you, {name}, as I am already following someone else.")
    } else {
        state.target_id = sender.id;
        format!("I will now follow you, {name}")
    }
}

fn stop_follow(sender: &ChatEvent, state: &mut AvatarState) -> String {
    let name = &sender.name;
    let is_self_target = state.target_id == sender.id;
    if is_self_target || (sender.is_admin() && state.is_following()) {
        state.target_id = EntityId::NONE;
        format!("Ok, {name}!")
    } else if !state.is_following() {
        format!("I am not following anyone, {name}")
    } else {
        format!("I am not following you, {name}")
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
