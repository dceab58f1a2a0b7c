//! Per-world session loop and the orchestrator that runs every world side by side.
//!
//! A world's session task is the only owner of that world's [`AvatarState`];
//! chat commands and pursuit ticks are applied one at a time from a single
//! `select!` loop, so there is never more than one writer.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use shared::{
    domain::WorldId,
    protocol::{ChatEvent, WorldSnapshot},
};
use tracing::{error, info, trace, warn};

use crate::{
    avatar::AvatarState,
    commands::handle_command,
    error::CompanionError,
    pursuit::{self, PursuitOutcome, PursuitParams},
    transport::{ChannelKind, WorldChannel, WorldConnector},
};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnd {
    pub world: WorldId,
    pub closed: ChannelKind,
    pub chat_lines: u64,
    pub ticks: u64,
    pub avatar: AvatarState,
}

#[derive(Debug)]
pub enum WorldOutcome {
    Closed(SessionEnd),
    Failed(CompanionError),
    Panicked(String),
}

#[derive(Debug)]
pub struct WorldReport {
    pub world: WorldId,
    pub outcome: WorldOutcome,
}

pub struct WorldSession {
    world: WorldId,
    chat: WorldChannel,
    state: WorldChannel,
    avatar: AvatarState,
    params: PursuitParams,
    chat_lines: u64,
    ticks: u64,
}

impl WorldSession {
    pub fn new(
        world: WorldId,
        chat: WorldChannel,
        state: WorldChannel,
        avatar: AvatarState,
        params: PursuitParams,
    ) -> Self {
        Self {
            world,
            chat,
            state,
            avatar,
            params,
            chat_lines: 0,
            ticks: 0,
        }
    }

    pub async fn open(
        connector: &dyn WorldConnector,
        world: WorldId,
        avatar: AvatarState,
        params: PursuitParams,
    ) -> Result<Self, CompanionError> {
        info!(world_id = world.0, "joining world");
        let chat = connector.connect(world, ChannelKind::Chat).await?;
        let state = connector.connect(world, ChannelKind::State).await?;
        info!(world_id = world.0, "chat and state channels open");
        Ok(Self::new(world, chat, state, avatar, params))
    }

    pub fn avatar(&self) -> &AvatarState {
        &self.avatar
    }

    /// Runs until either channel closes. Bad payloads are logged and skipped.
    pub async fn run(mut self) -> SessionEnd {
        let world = self.world;
        let closed = loop {
            let result = tokio::select! {
                payload = self.chat.recv() => match payload {
                    Some(payload) => self.on_chat(&payload).await,
                    None => break ChannelKind::Chat,
                },
                payload = self.state.recv() => match payload {
                    Some(payload) => self.on_state(&payload).await,
                    None => break ChannelKind::State,
                },
            };
            match result {
                Ok(()) => {}
                Err(CompanionError::ChannelClosed { channel, .. }) => break channel,
                Err(err) => warn!(world_id = world.0, "{err}"),
            }
        };
        info!(world_id = world.0, channel = %closed, "channel closed, leaving world");
        SessionEnd {
            world,
            closed,
            chat_lines: self.chat_lines,
            ticks: self.ticks,
            avatar: self.avatar,
        }
    }

    pub async fn on_chat(&mut self, payload: &str) -> Result<(), CompanionError> {
        let event: ChatEvent =
            serde_json::from_str(payload).map_err(|err| CompanionError::MalformedMessage {
                world: self.world,
                channel: ChannelKind::Chat,
                reason: err.to_string(),
            })?;
        if event.msg.is_empty() {
            return Ok(());
        }
        self.chat_lines += 1;

        let reply = handle_command(&event, &mut self.avatar);
        info!("[World#{}] <{}>: {}", self.world, event.name, event.msg);
        if let Some(reply) = reply {
            self.chat.send(reply).await?;
        }
        Ok(())
    }

    /// Steers toward the target (if present) and republishes the pose. The pose
    /// goes out even when the snapshot cannot be decoded.
    pub async fn on_state(&mut self, payload: &str) -> Result<(), CompanionError> {
        self.ticks += 1;
        let decoded = serde_json::from_str::<WorldSnapshot>(payload);
        if let Ok(snapshot) = &decoded {
            let outcome = pursuit::apply_snapshot(&mut self.avatar, snapshot, &self.params);
            if outcome == PursuitOutcome::Degenerate {
                warn!(
                    world_id = self.world.0,
                    target_id = self.avatar.target_id.0,
                    "target is on top of the bot; pose unchanged"
                );
            }
            trace!(world_id = self.world.0, ?outcome, "pursuit tick");
        }

        let update = serde_json::to_string(&self.avatar.to_update())?;
        self.state.send(update).await?;

        decoded
            .map(|_| ())
            .map_err(|err| CompanionError::MalformedMessage {
                world: self.world,
                channel: ChannelKind::State,
                reason: err.to_string(),
            })
    }
}

async fn run_world(
    connector: Arc<dyn WorldConnector>,
    world: WorldId,
    avatar: AvatarState,
    params: PursuitParams,
) -> Result<SessionEnd, CompanionError> {
    let session = WorldSession::open(connector.as_ref(), world, avatar, params).await?;
    Ok(session.run().await)
}

/// Fault boundary for one world. The outcome is logged here as soon as it is
/// known, so a failure surfaces while sibling worlds are still running.
async fn supervise_world(
    connector: Arc<dyn WorldConnector>,
    world: WorldId,
    avatar: AvatarState,
    params: PursuitParams,
) -> WorldOutcome {
    let attempt = AssertUnwindSafe(run_world(connector, world, avatar, params))
        .catch_unwind()
        .await;
    match attempt {
        Ok(Ok(end)) => WorldOutcome::Closed(end),
        Ok(Err(err)) => {
            error!(world_id = world.0, "world session failed: {err}");
            WorldOutcome::Failed(err)
        }
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            error!(world_id = world.0, "world session panicked: {reason}");
            WorldOutcome::Panicked(reason)
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one session task per world and waits for all of them to settle. A
/// failing or panicking world is reported on its own and never stops the rest.
pub async fn run_worlds(
    connector: Arc<dyn WorldConnector>,
    worlds: &[WorldId],
    template: &AvatarState,
    params: PursuitParams,
) -> Vec<WorldReport> {
    let handles: Vec<_> = worlds
        .iter()
        .map(|&world| {
            let task = supervise_world(Arc::clone(&connector), world, template.clone(), params);
            (world, tokio::spawn(task))
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (world, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                error!(world_id = world.0, "world session aborted: {join_err}");
                WorldOutcome::Panicked(join_err.to_string())
            }
        };
        reports.push(WorldReport { world, outcome });
    }
    reports
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
